use chrono::Utc;
use marktask_core::credentials::CredentialStore;
use marktask_core::kv::FileStore;
use marktask_core::task::Theme;
use marktask_core::taskstore::TaskStore;
use tempfile::tempdir;

#[test]
fn task_lifecycle_roundtrips_through_the_file_store() {
    let temp = tempdir().expect("tempdir");
    let store = FileStore::open(temp.path()).expect("open store");
    let tasks = TaskStore::new(&store);

    let now = Utc::now();
    let task = tasks
        .create("Write report", "quarterly numbers", Some(5), true, now)
        .expect("create task");
    assert!(!task.completed);
    assert_eq!(task.duration_minutes, Some(5));

    let done = tasks.complete(task.id, now).expect("complete");
    assert!(done.completed_at.is_some());

    let back = tasks.uncomplete(task.id).expect("uncomplete");
    assert!(back.completed_at.is_none());
    assert!(!back.completed);

    tasks.delete(task.id, now).expect("delete");

    // A fresh store over the same directory sees the identical state.
    let reopened = FileStore::open(temp.path()).expect("reopen store");
    let tasks = TaskStore::new(&reopened);
    assert!(tasks.active().expect("active").is_empty());
    assert!(tasks.completed().expect("completed").is_empty());

    let deleted = tasks.deleted().expect("deleted");
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].id, task.id);
    assert_eq!(deleted[0].title, "Write report");
    assert_eq!(deleted[0].description, "quarterly numbers");
    assert!(deleted[0].deleted_at.is_some());
}

#[test]
fn stored_lists_reload_in_insertion_order() {
    let temp = tempdir().expect("tempdir");
    let store = FileStore::open(temp.path()).expect("open store");
    let tasks = TaskStore::new(&store);

    let now = Utc::now();
    for title in ["first", "second", "third"] {
        tasks.create(title, "", None, false, now).expect("create");
    }

    let reopened = FileStore::open(temp.path()).expect("reopen store");
    let titles: Vec<String> = TaskStore::new(&reopened)
        .active()
        .expect("active")
        .into_iter()
        .map(|task| task.title)
        .collect();
    assert_eq!(titles, vec!["first", "second", "third"]);
}

#[test]
fn credentials_and_theme_persist_across_reopen() {
    let temp = tempdir().expect("tempdir");

    {
        let store = FileStore::open(temp.path()).expect("open store");
        let creds = CredentialStore::new(&store);
        creds
            .register_user("alice", "a@x.com", "pw1")
            .expect("register");

        let tasks = TaskStore::new(&store);
        assert_eq!(tasks.toggle_theme().expect("toggle"), Theme::Dark);
    }

    let reopened = FileStore::open(temp.path()).expect("reopen store");
    let creds = CredentialStore::new(&reopened);
    let hit = creds.find_user("a@x.com", "pw1").expect("lookup");
    assert_eq!(hit.map(|user| user.username), Some("alice".to_string()));

    let tasks = TaskStore::new(&reopened);
    assert_eq!(tasks.theme().expect("theme"), Theme::Dark);
}

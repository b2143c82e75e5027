use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::cli::Invocation;
use crate::config::{Config, parse_bool};
use crate::credentials::CredentialStore;
use crate::error::TaskError;
use crate::kv::KeyValueStore;
use crate::login::{CredentialProvider, LocalProvider, LoginFlow, RemoteProvider, SubmitOutcome};
use crate::render::Renderer;
use crate::scheduler::{Reminder, Scheduler};
use crate::task::Task;
use crate::taskstore::TaskStore;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add",
        "list",
        "completed",
        "deleted",
        "done",
        "undone",
        "delete",
        "info",
        "theme",
        "login",
        "signup",
        "logout",
        "whoami",
        "export",
        "_show",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(kv, cfg, renderer, scheduler, inv))]
pub fn dispatch<S: KeyValueStore>(
    kv: &S,
    cfg: &Config,
    renderer: &mut Renderer,
    scheduler: &dyn Scheduler,
    inv: Invocation,
) -> anyhow::Result<()> {
    let command = inv.command.as_str();
    debug!(command, args = ?inv.command_args, "dispatching command");

    match command {
        "add" => cmd_add(kv, cfg, scheduler, &inv.command_args),
        "list" => cmd_list(kv, renderer),
        "completed" => cmd_completed(kv, renderer),
        "deleted" => cmd_deleted(kv, renderer),
        "done" => cmd_done(kv, &inv.command_args),
        "undone" => cmd_undone(kv, &inv.command_args),
        "delete" => cmd_delete(kv, &inv.command_args),
        "info" => cmd_info(kv, renderer, &inv.command_args),
        "theme" => cmd_theme(kv),
        "login" => cmd_login(kv, cfg, &inv.command_args),
        "signup" => cmd_signup(kv, cfg, &inv.command_args),
        "logout" => cmd_logout(kv),
        "whoami" => cmd_whoami(kv, renderer),
        "export" => cmd_export(kv),
        "_show" => cmd_show(cfg),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

#[derive(Debug, Clone)]
enum Mod {
    Description(String),
    Duration(u32),
    Remind(bool),
}

/// Modifier tokens use the `key:value` / `key=value` grammar; everything else
/// joins the title. `--` forces the remaining tokens into the title.
fn parse_title_and_mods(args: &[String]) -> anyhow::Result<(String, Vec<Mod>)> {
    let mut title_parts = Vec::new();
    let mut mods = Vec::new();

    let mut literal = false;
    for arg in args {
        if arg == "--" {
            literal = true;
            continue;
        }

        if !literal && let Some(one_mod) = parse_one_mod(arg)? {
            mods.push(one_mod);
            continue;
        }

        title_parts.push(arg.clone());
    }

    Ok((title_parts.join(" "), mods))
}

fn parse_one_mod(tok: &str) -> anyhow::Result<Option<Mod>> {
    let (key, value) = if let Some((k, v)) = tok.split_once(':') {
        (k, v)
    } else if let Some((k, v)) = tok.split_once('=') {
        (k, v)
    } else {
        return Ok(None);
    };

    let key = key.to_ascii_lowercase();

    match key.as_str() {
        "desc" | "description" => Ok(Some(Mod::Description(value.to_string()))),
        "duration" => {
            let minutes = value
                .parse::<u32>()
                .with_context(|| format!("invalid duration (minutes): {value}"))?;
            Ok(Some(Mod::Duration(minutes)))
        }
        "remind" => Ok(Some(Mod::Remind(parse_bool(value)))),
        _ => Ok(None),
    }
}

#[instrument(skip(kv, cfg, scheduler, args))]
fn cmd_add<S: KeyValueStore>(
    kv: &S,
    cfg: &Config,
    scheduler: &dyn Scheduler,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command add");

    let (title, mods) = parse_title_and_mods(args)?;

    let mut description = String::new();
    let mut duration_minutes = None;
    let mut remind = true;
    for one_mod in &mods {
        match one_mod {
            Mod::Description(text) => description = text.clone(),
            Mod::Duration(minutes) => duration_minutes = Some(*minutes),
            Mod::Remind(enabled) => remind = *enabled,
        }
    }

    let store = TaskStore::new(kv);
    let task = store.create(&title, &description, duration_minutes, remind, Utc::now())?;
    println!("Created task {}.", task.id);

    let reminders_enabled = cfg.get_bool("reminders").unwrap_or(true);
    if let Some(minutes) = task.duration_minutes
        && task.remind
        && minutes > 0
        && reminders_enabled
    {
        // Fire-and-forget: the handle is dropped on purpose, and a reminder
        // does not survive process exit.
        let _ = scheduler.schedule_once(
            Duration::from_secs(u64::from(minutes) * 60),
            Reminder {
                task_id: task.id,
                title: task.title.clone(),
            },
        );
        println!("Reminder set for {minutes} minute(s).");
    }

    Ok(())
}

#[instrument(skip(kv, renderer))]
fn cmd_list<S: KeyValueStore>(kv: &S, renderer: &mut Renderer) -> anyhow::Result<()> {
    info!("command list");
    let tasks = TaskStore::new(kv).active()?;
    renderer.print_active_table(&tasks)?;
    Ok(())
}

#[instrument(skip(kv, renderer))]
fn cmd_completed<S: KeyValueStore>(kv: &S, renderer: &mut Renderer) -> anyhow::Result<()> {
    info!("command completed");
    let tasks = TaskStore::new(kv).completed()?;
    renderer.print_completed_table(&tasks)?;
    Ok(())
}

#[instrument(skip(kv, renderer))]
fn cmd_deleted<S: KeyValueStore>(kv: &S, renderer: &mut Renderer) -> anyhow::Result<()> {
    info!("command deleted");
    let tasks = TaskStore::new(kv).deleted()?;
    renderer.print_deleted_table(&tasks)?;
    Ok(())
}

fn parse_task_id(command: &str, args: &[String]) -> anyhow::Result<u64> {
    let raw = args
        .first()
        .ok_or_else(|| anyhow!("{command} requires a task id"))?;
    raw.parse::<u64>()
        .with_context(|| format!("invalid task id: {raw}"))
}

#[instrument(skip(kv, args))]
fn cmd_done<S: KeyValueStore>(kv: &S, args: &[String]) -> anyhow::Result<()> {
    info!("command done");
    let id = parse_task_id("done", args)?;
    let task = TaskStore::new(kv).complete(id, Utc::now())?;
    println!("Task \"{}\" marked as completed.", task.title);
    Ok(())
}

#[instrument(skip(kv, args))]
fn cmd_undone<S: KeyValueStore>(kv: &S, args: &[String]) -> anyhow::Result<()> {
    info!("command undone");
    let id = parse_task_id("undone", args)?;
    let task = TaskStore::new(kv).uncomplete(id)?;
    println!("Task \"{}\" returned to active.", task.title);
    Ok(())
}

#[instrument(skip(kv, args))]
fn cmd_delete<S: KeyValueStore>(kv: &S, args: &[String]) -> anyhow::Result<()> {
    info!("command delete");
    let id = parse_task_id("delete", args)?;
    let task = TaskStore::new(kv).delete(id, Utc::now())?;
    println!("Task \"{}\" moved to deleted.", task.title);
    Ok(())
}

#[instrument(skip(kv, renderer, args))]
fn cmd_info<S: KeyValueStore>(
    kv: &S,
    renderer: &mut Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command info");
    let id = parse_task_id("info", args)?;

    let store = TaskStore::new(kv);
    let hit = store
        .active()?
        .into_iter()
        .chain(store.completed()?)
        .chain(store.deleted()?)
        .find(|task| task.id == id)
        .ok_or(TaskError::TaskNotFound { id })?;

    renderer.print_task_info(&hit)?;
    Ok(())
}

#[instrument(skip(kv))]
fn cmd_theme<S: KeyValueStore>(kv: &S) -> anyhow::Result<()> {
    info!("command theme");
    let theme = TaskStore::new(kv).toggle_theme()?;
    println!("Theme is now {}.", theme.as_str());
    Ok(())
}

fn run_login_flow<S, P>(
    sessions: CredentialStore<'_, S>,
    provider: P,
    email: &str,
    password: &str,
) -> anyhow::Result<()>
where
    S: KeyValueStore,
    P: CredentialProvider,
{
    let mut flow = LoginFlow::new(provider, sessions);
    match flow.submit("", email, password)? {
        SubmitOutcome::LoggedIn(user) => {
            println!("Login success. Welcome back, {}.", user.username);
            Ok(())
        }
        SubmitOutcome::Rejected(rejection) => Err(rejection.into()),
        outcome => Err(anyhow!("unexpected login outcome: {outcome:?}")),
    }
}

fn run_signup_flow<S, P>(
    sessions: CredentialStore<'_, S>,
    provider: P,
    username: &str,
    email: &str,
    password: &str,
) -> anyhow::Result<()>
where
    S: KeyValueStore,
    P: CredentialProvider,
{
    let mut flow = LoginFlow::new(provider, sessions);
    flow.toggle_mode();
    match flow.submit(username, email, password)? {
        SubmitOutcome::SignedUp => {
            println!("Signup success. You can now log in.");
            Ok(())
        }
        SubmitOutcome::Rejected(rejection) => Err(rejection.into()),
        outcome => Err(anyhow!("unexpected signup outcome: {outcome:?}")),
    }
}

#[instrument(skip(kv, cfg, args))]
fn cmd_login<S: KeyValueStore>(kv: &S, cfg: &Config, args: &[String]) -> anyhow::Result<()> {
    info!("command login");

    let [email, password] = args else {
        return Err(anyhow!("login requires <email> <password>"));
    };

    let sessions = CredentialStore::new(kv);
    match cfg.get("auth.remote") {
        Some(base_url) => {
            let provider = RemoteProvider::new(base_url)?;
            run_login_flow(sessions, provider, email, password)
        }
        None => run_login_flow(sessions, LocalProvider::new(sessions), email, password),
    }
}

#[instrument(skip(kv, cfg, args))]
fn cmd_signup<S: KeyValueStore>(kv: &S, cfg: &Config, args: &[String]) -> anyhow::Result<()> {
    info!("command signup");

    let [username, email, password] = args else {
        return Err(anyhow!("signup requires <username> <email> <password>"));
    };

    let sessions = CredentialStore::new(kv);
    match cfg.get("auth.remote") {
        Some(base_url) => {
            let provider = RemoteProvider::new(base_url)?;
            run_signup_flow(sessions, provider, username, email, password)
        }
        None => run_signup_flow(
            sessions,
            LocalProvider::new(sessions),
            username,
            email,
            password,
        ),
    }
}

#[instrument(skip(kv))]
fn cmd_logout<S: KeyValueStore>(kv: &S) -> anyhow::Result<()> {
    info!("command logout");

    let sessions = CredentialStore::new(kv);
    if sessions.current_session()?.is_none() {
        println!("No active session.");
        return Ok(());
    }

    sessions.clear_session()?;
    println!("Logged out.");
    Ok(())
}

#[instrument(skip(kv, renderer))]
fn cmd_whoami<S: KeyValueStore>(kv: &S, renderer: &mut Renderer) -> anyhow::Result<()> {
    info!("command whoami");

    let sessions = CredentialStore::new(kv);
    match sessions.current_session()? {
        Some(user) => renderer.print_session(&user),
        None => {
            println!("Not logged in.");
            Ok(())
        }
    }
}

#[derive(Debug, Serialize)]
struct ExportPayload {
    todos: Vec<Task>,
    completed: Vec<Task>,
    deleted: Vec<Task>,
}

#[instrument(skip(kv))]
fn cmd_export<S: KeyValueStore>(kv: &S) -> anyhow::Result<()> {
    info!("command export");

    let store = TaskStore::new(kv);
    let payload = ExportPayload {
        todos: store.active()?,
        completed: store.completed()?,
        deleted: store.deleted()?,
    };

    let out = serde_json::to_string(&payload)?;
    println!("{out}");
    Ok(())
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    for (k, v) in cfg.iter() {
        println!("{k}={v}");
    }
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "Implemented commands: add, list, completed, deleted, done, undone, delete, info, \
         theme, login, signup, logout, whoami, export, help, version"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifier_tokens_split_from_title() {
        let args: Vec<String> = ["Write", "report", "duration:5", "remind:on", "desc:weekly"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let (title, mods) = parse_title_and_mods(&args).expect("parse");

        assert_eq!(title, "Write report");
        assert_eq!(mods.len(), 3);
        assert!(matches!(mods[0], Mod::Duration(5)));
        assert!(matches!(mods[1], Mod::Remind(true)));
        assert!(matches!(mods[2], Mod::Description(ref text) if text == "weekly"));
    }

    #[test]
    fn literal_marker_forces_title_words() {
        let args: Vec<String> = ["--", "duration:5"].iter().map(ToString::to_string).collect();
        let (title, mods) = parse_title_and_mods(&args).expect("parse");

        assert_eq!(title, "duration:5");
        assert!(mods.is_empty());
    }

    #[test]
    fn unknown_keys_stay_in_the_title() {
        let args: Vec<String> = ["fix", "http://example.com/page"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let (title, mods) = parse_title_and_mods(&args).expect("parse");

        assert_eq!(title, "fix http://example.com/page");
        assert!(mods.is_empty());
    }

    #[test]
    fn bad_duration_is_an_error() {
        let args: Vec<String> = ["task", "duration:soon"].iter().map(ToString::to_string).collect();
        assert!(parse_title_and_mods(&args).is_err());
    }

    #[test]
    fn abbreviations_expand_only_when_unique() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("th", &known), Some("theme"));
        assert_eq!(expand_command_abbrev("exp", &known), Some("export"));
        // "de" could be delete or deleted.
        assert_eq!(expand_command_abbrev("de", &known), None);
        assert_eq!(expand_command_abbrev("delete", &known), Some("delete"));
    }
}

use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::credentials::{CredentialStore, User};
use crate::error::AuthError;
use crate::kv::KeyValueStore;

/// Capability behind the login flow. The flow's transition rules are the same
/// for both implementations; only the lookup differs (local scan vs. network
/// round-trip).
pub trait CredentialProvider {
    fn login(&self, email: &str, password: &str) -> Result<User, AuthError>;
    fn signup(&self, username: &str, email: &str, password: &str) -> Result<(), AuthError>;
}

/// Provider backed by the local credential store.
#[derive(Debug)]
pub struct LocalProvider<'a, S> {
    store: CredentialStore<'a, S>,
}

impl<'a, S: KeyValueStore> LocalProvider<'a, S> {
    pub fn new(store: CredentialStore<'a, S>) -> Self {
        Self { store }
    }
}

impl<S: KeyValueStore> CredentialProvider for LocalProvider<'_, S> {
    fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        match self.store.find_user(email, password)? {
            Some(user) => Ok(user),
            None => Err(AuthError::InvalidCredentials),
        }
    }

    fn signup(&self, username: &str, email: &str, password: &str) -> Result<(), AuthError> {
        self.store.register_user(username, email, password)
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'r> {
    email: &'r str,
    password: &'r str,
}

#[derive(Debug, Serialize)]
struct SignupRequest<'r> {
    username: &'r str,
    email: &'r str,
    password: &'r str,
}

/// Provider backed by a remote auth endpoint. Failure bodies are surfaced as
/// the human-readable message; transport errors collapse into a generic
/// remote failure. The original had no request timeout, so one is set here.
#[derive(Debug)]
pub struct RemoteProvider {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl RemoteProvider {
    pub fn new(base_url: impl Into<String>) -> Result<Self, AuthError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|err| AuthError::Remote(err.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn post<B: Serialize>(&self, route: &str, body: &B) -> Result<reqwest::blocking::Response, AuthError> {
        let url = format!("{}/{route}", self.base_url);
        debug!(url = %url, "posting auth request");
        self.client
            .post(&url)
            .json(body)
            .send()
            .map_err(|err| {
                warn!(error = %err, "auth request failed");
                AuthError::Remote(err.to_string())
            })
    }

    fn failure_message(response: reqwest::blocking::Response) -> AuthError {
        let status = response.status();
        let body = response.text().unwrap_or_default();
        let message = body.trim();
        if message.is_empty() {
            AuthError::Remote(format!("auth endpoint returned {status}"))
        } else {
            AuthError::Remote(message.to_string())
        }
    }
}

impl CredentialProvider for RemoteProvider {
    #[instrument(skip(self, password))]
    fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let response = self.post("login", &LoginRequest { email, password })?;
        if !response.status().is_success() {
            return Err(Self::failure_message(response));
        }

        response
            .json::<User>()
            .map_err(|err| AuthError::Remote(format!("malformed auth response: {err}")))
    }

    #[instrument(skip(self, password))]
    fn signup(&self, username: &str, email: &str, password: &str) -> Result<(), AuthError> {
        let response = self.post(
            "signup",
            &SignupRequest {
                username,
                email,
                password,
            },
        )?;
        if !response.status().is_success() {
            return Err(Self::failure_message(response));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Login,
    Signup,
}

#[derive(Debug)]
pub enum SubmitOutcome {
    /// Credentials matched; the session pointer is set and the caller should
    /// move on to the task screen.
    LoggedIn(User),
    /// Account created; the flow is back in login mode and the user is NOT
    /// authenticated yet.
    SignedUp,
    /// User-facing rejection; the mode is unchanged.
    Rejected(AuthError),
}

/// Two-mode auth state machine. Infrastructure failures (the store itself
/// breaking) propagate as errors; everything user-facing comes back as a
/// [`SubmitOutcome`].
#[derive(Debug)]
pub struct LoginFlow<'a, S, P> {
    mode: Mode,
    provider: P,
    sessions: CredentialStore<'a, S>,
}

impl<'a, S: KeyValueStore, P: CredentialProvider> LoginFlow<'a, S, P> {
    pub fn new(provider: P, sessions: CredentialStore<'a, S>) -> Self {
        Self {
            mode: Mode::Login,
            provider,
            sessions,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            Mode::Login => Mode::Signup,
            Mode::Signup => Mode::Login,
        };
        debug!(mode = ?self.mode, "auth mode toggled");
    }

    #[instrument(skip(self, password))]
    pub fn submit(
        &mut self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<SubmitOutcome, AuthError> {
        match self.mode {
            Mode::Login => match self.provider.login(email, password) {
                Ok(user) => {
                    self.sessions.set_current_session(&user)?;
                    Ok(SubmitOutcome::LoggedIn(user))
                }
                Err(AuthError::Store(err)) => Err(AuthError::Store(err)),
                Err(rejection) => Ok(SubmitOutcome::Rejected(rejection)),
            },
            Mode::Signup => match self.provider.signup(username, email, password) {
                Ok(()) => {
                    self.mode = Mode::Login;
                    Ok(SubmitOutcome::SignedUp)
                }
                Err(AuthError::Store(err)) => Err(AuthError::Store(err)),
                Err(rejection) => Ok(SubmitOutcome::Rejected(rejection)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;

    #[test]
    fn login_hit_sets_session_and_signals_navigation() {
        let kv = MemoryStore::new();
        let creds = CredentialStore::new(&kv);
        creds
            .register_user("alice", "a@x.com", "pw1")
            .expect("register");

        let mut flow = LoginFlow::new(LocalProvider::new(creds), creds);
        let outcome = flow.submit("", "a@x.com", "pw1").expect("submit");

        assert!(matches!(outcome, SubmitOutcome::LoggedIn(ref user) if user.email == "a@x.com"));
        assert!(creds.current_session().expect("session").is_some());
    }

    #[test]
    fn login_miss_stays_in_login_mode() {
        let kv = MemoryStore::new();
        let creds = CredentialStore::new(&kv);

        let mut flow = LoginFlow::new(LocalProvider::new(creds), creds);
        let outcome = flow.submit("", "a@x.com", "nope").expect("submit");

        assert!(matches!(
            outcome,
            SubmitOutcome::Rejected(AuthError::InvalidCredentials)
        ));
        assert_eq!(flow.mode(), Mode::Login);
        assert!(creds.current_session().expect("session").is_none());
    }

    #[test]
    fn signup_success_returns_to_login_without_authenticating() {
        let kv = MemoryStore::new();
        let creds = CredentialStore::new(&kv);

        let mut flow = LoginFlow::new(LocalProvider::new(creds), creds);
        flow.toggle_mode();
        assert_eq!(flow.mode(), Mode::Signup);

        let outcome = flow.submit("alice", "a@x.com", "pw1").expect("submit");
        assert!(matches!(outcome, SubmitOutcome::SignedUp));
        assert_eq!(flow.mode(), Mode::Login);
        assert!(creds.current_session().expect("session").is_none());

        // The freshly created account can now log in.
        let outcome = flow.submit("", "a@x.com", "pw1").expect("submit");
        assert!(matches!(outcome, SubmitOutcome::LoggedIn(_)));
    }

    #[test]
    fn signup_conflict_stays_in_signup_mode() {
        let kv = MemoryStore::new();
        let creds = CredentialStore::new(&kv);
        creds
            .register_user("alice", "a@x.com", "pw1")
            .expect("register");

        let mut flow = LoginFlow::new(LocalProvider::new(creds), creds);
        flow.toggle_mode();

        let outcome = flow.submit("alice2", "a@x.com", "pw2").expect("submit");
        assert!(matches!(
            outcome,
            SubmitOutcome::Rejected(AuthError::DuplicateEmail { .. })
        ));
        assert_eq!(flow.mode(), Mode::Signup);
    }

    /// Provider double proving the flow never branches on which
    /// implementation sits behind the capability.
    struct ScriptedProvider {
        login_result: fn() -> Result<User, AuthError>,
    }

    impl CredentialProvider for ScriptedProvider {
        fn login(&self, _email: &str, _password: &str) -> Result<User, AuthError> {
            (self.login_result)()
        }

        fn signup(&self, _username: &str, _email: &str, _password: &str) -> Result<(), AuthError> {
            Err(AuthError::Remote("signup disabled".to_string()))
        }
    }

    #[test]
    fn remote_style_rejection_is_reported_not_fatal() {
        let kv = MemoryStore::new();
        let creds = CredentialStore::new(&kv);

        let provider = ScriptedProvider {
            login_result: || Err(AuthError::Remote("service unavailable".to_string())),
        };
        let mut flow = LoginFlow::new(provider, creds);

        let outcome = flow.submit("", "a@x.com", "pw").expect("submit");
        assert!(matches!(
            outcome,
            SubmitOutcome::Rejected(AuthError::Remote(_))
        ));
        assert_eq!(flow.mode(), Mode::Login);
    }
}

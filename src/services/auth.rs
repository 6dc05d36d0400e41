use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use rand::Rng;
use serde_derive::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    data::{Role, password_digest},
    store::{Store, StoreError},
};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid e-mail or password")]
    InvalidCredentials,
    #[error("This account cannot sign in as {0}")]
    WrongRole(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Deserialize, Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub email: String,
    pub name: String,
    pub role: Role,
}

pub trait Authenticator: Send + Sync {
    fn sign_in(&self, credentials: &Credentials) -> Result<Session, AuthError>;
}

/// Checks credentials against the accounts in the store.
pub struct AccountAuthenticator {
    store: Arc<dyn Store>,
}

impl AccountAuthenticator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

impl Authenticator for AccountAuthenticator {
    fn sign_in(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let email = credentials.email.trim();
        let Some(account) = self.store.account(email)? else {
            warn!(%email, "sign-in for unknown account");
            return Err(AuthError::InvalidCredentials);
        };
        if account.password_hash != password_digest(email, &credentials.password) {
            warn!(%email, "sign-in with wrong password");
            return Err(AuthError::InvalidCredentials);
        }
        // Administrators may act under any role.
        if account.role != Role::Admin && account.role != credentials.role {
            return Err(AuthError::WrongRole(credentials.role.label()));
        }
        info!(%email, role = %credentials.role, "signed in");

        Ok(Session {
            email: account.email,
            name: account.name,
            role: credentials.role,
        })
    }
}

/// How long a sign-in lasts, both for the cookie and on the server.
pub const SESSION_TTL: Duration = Duration::from_secs(8 * 60 * 60);

struct Entry {
    session: Session,
    opened: Instant,
}

/// Signed-in sessions keyed by an opaque cookie token. Sessions older than
/// the time to live are rejected and evicted.
pub struct Sessions {
    inner: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl Default for Sessions {
    fn default() -> Self {
        Self::new(SESSION_TTL)
    }
}

impl Sessions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn open(&self, session: Session) -> String {
        let bytes: [u8; 16] = rand::rng().random();
        let token: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        let now = Instant::now();

        let mut inner = self.lock();
        inner.retain(|_, entry| now.duration_since(entry.opened) < self.ttl);
        inner.insert(
            token.clone(),
            Entry {
                session,
                opened: now,
            },
        );
        token
    }

    pub fn get(&self, token: &str) -> Option<Session> {
        self.get_at(token, Instant::now())
    }

    fn get_at(&self, token: &str, now: Instant) -> Option<Session> {
        let mut inner = self.lock();
        let entry = inner.get(token)?;
        if now.saturating_duration_since(entry.opened) >= self.ttl {
            inner.remove(token);
            info!("session expired");
            return None;
        }
        Some(entry.session.clone())
    }

    pub fn close(&self, token: &str) -> Option<Session> {
        self.lock().remove(token).map(|entry| entry.session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data::seed::Seed, store::memory::MemoryStore};

    fn authenticator() -> AccountAuthenticator {
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("seed");
        let store = MemoryStore::from_seed(Seed::load(&dir).unwrap());
        AccountAuthenticator::new(Arc::new(store))
    }

    fn credentials(email: &str, password: &str, role: Role) -> Credentials {
        Credentials {
            email: email.to_string(),
            password: password.to_string(),
            role,
        }
    }

    #[test]
    fn test_sign_in() {
        let auth = authenticator();

        let session = auth
            .sign_in(&credentials(
                "admin@municipality.gov",
                "civic-demo-2024",
                Role::Admin,
            ))
            .unwrap();
        assert_eq!(session.name, "Portal Administrator");

        assert!(matches!(
            auth.sign_in(&credentials("admin@municipality.gov", "nope", Role::Admin)),
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.sign_in(&credentials("who@municipality.gov", "x", Role::Staff)),
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.sign_in(&credentials(
                "mike.johnson@municipality.gov",
                "public-works-2024",
                Role::Admin
            )),
            Err(AuthError::WrongRole(_))
        ));
    }

    #[test]
    fn test_sessions() {
        let sessions = Sessions::default();
        let session = Session {
            email: "a@b.gov".to_string(),
            name: "A".to_string(),
            role: Role::Staff,
        };

        let token = sessions.open(session.clone());
        assert_eq!(token.len(), 32);
        assert_eq!(sessions.get(&token), Some(session.clone()));
        assert_eq!(sessions.close(&token), Some(session));
        assert_eq!(sessions.get(&token), None);
    }

    #[test]
    fn test_sessions_expire() {
        let sessions = Sessions::new(Duration::from_secs(60));
        let session = Session {
            email: "a@b.gov".to_string(),
            name: "A".to_string(),
            role: Role::Staff,
        };

        let token = sessions.open(session.clone());
        let opened = Instant::now();
        assert_eq!(
            sessions.get_at(&token, opened + Duration::from_secs(30)),
            Some(session)
        );
        assert_eq!(sessions.get_at(&token, opened + Duration::from_secs(61)), None);
        assert!(sessions.lock().is_empty());
        assert_eq!(sessions.get(&token), None);
    }
}

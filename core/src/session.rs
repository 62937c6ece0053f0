/// Authenticated session handed to the engine at construction time.
///
/// The engine never reads tokens from ambient storage: the host application
/// creates a `Session`, wraps it in a `SessionHandle`, and invalidates the
/// handle on logout. Components holding the handle observe the invalidation
/// on their next access.
use std::fmt;
use std::sync::{Arc, RwLock};

/// Credentials of the locally authenticated user
#[derive(Clone)]
pub struct Session {
    pub user_id: i64,
    pub token: String,
}

impl Session {
    pub fn new(user_id: i64, token: impl Into<String>) -> Self {
        Self {
            user_id,
            token: token.into(),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Shared, invalidatable view of the current session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionHandle {
    pub fn new(session: Session) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(session))),
        }
    }

    /// Snapshot of the current session, `None` after logout
    pub fn current(&self) -> Option<Session> {
        self.inner.read().ok().and_then(|s| s.clone())
    }

    pub fn user_id(&self) -> Option<i64> {
        self.current().map(|s| s.user_id)
    }

    pub fn token(&self) -> Option<String> {
        self.current().map(|s| s.token)
    }

    pub fn is_active(&self) -> bool {
        self.current().is_some()
    }

    /// Drop the credentials. Subsequent pull requests fail gracefully.
    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = None;
        }
    }
}

// Shared controller session
//
// One `Session` per client (controller + site). Readers load it lock-free
// through `ArcSwapOption`; establishing or refreshing it happens under a
// single async mutex so a burst of 401s produces exactly one re-login.

use std::future::Future;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::error::Error;

/// An established controller session.
///
/// The session cookie itself lives in the client's cookie jar; this value
/// tracks the CSRF token UniFi OS requires on mutating requests and a
/// generation number used to detect concurrent refreshes.
#[derive(Debug, Clone)]
pub struct Session {
    generation: u64,
    csrf_token: Option<String>,
    established_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(csrf_token: Option<String>) -> Self {
        Self {
            generation: 0,
            csrf_token,
            established_at: Utc::now(),
        }
    }

    /// Monotonic counter, bumped on every (re-)authentication.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn csrf_token(&self) -> Option<&str> {
        self.csrf_token.as_deref()
    }

    pub fn established_at(&self) -> DateTime<Utc> {
        self.established_at
    }
}

pub(crate) struct SessionManager {
    current: ArcSwapOption<Session>,
    /// Guards refresh; holds the last generation handed out.
    refresh: Mutex<u64>,
}

impl SessionManager {
    pub(crate) fn new() -> Self {
        Self {
            current: ArcSwapOption::empty(),
            refresh: Mutex::new(0),
        }
    }

    pub(crate) fn current(&self) -> Option<Arc<Session>> {
        self.current.load_full()
    }

    /// Drop the session, but only if it is still the one the caller saw.
    pub(crate) fn invalidate(&self, generation: u64) {
        let current = self.current.load();
        if current.as_ref().is_some_and(|s| s.generation == generation) {
            debug!(generation, "invalidating session");
            self.current.store(None);
        }
    }

    /// Replace the CSRF token in place when the controller rotates it.
    pub(crate) fn rotate_csrf(&self, token: &str) {
        self.current.rcu(|current| {
            current.as_ref().map(|s| {
                let mut next = Session::clone(s);
                next.csrf_token = Some(token.to_owned());
                Arc::new(next)
            })
        });
        trace!("CSRF token rotated");
    }

    /// Establish a session unless someone else already did.
    ///
    /// `stale` is the generation the caller saw fail (or `None` to force a
    /// fresh login). If the current session is newer than `stale`, it is
    /// returned without calling `login`.
    pub(crate) async fn refresh<F, Fut>(&self, stale: Option<u64>, login: F) -> Result<Arc<Session>, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Session, Error>>,
    {
        let mut last_generation = self.refresh.lock().await;

        if let (Some(stale), Some(current)) = (stale, self.current()) {
            if current.generation > stale {
                trace!(generation = current.generation, "session already refreshed");
                return Ok(current);
            }
        }

        let mut session = login().await?;
        *last_generation += 1;
        session.generation = *last_generation;
        let session = Arc::new(session);
        self.current.store(Some(Arc::clone(&session)));
        debug!(generation = session.generation, "session established");
        Ok(session)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn refresh_assigns_increasing_generations() {
        let manager = SessionManager::new();
        let first = manager
            .refresh(None, || async { Ok(Session::new(None)) })
            .await
            .unwrap();
        let second = manager
            .refresh(None, || async { Ok(Session::new(None)) })
            .await
            .unwrap();
        assert_eq!(first.generation(), 1);
        assert_eq!(second.generation(), 2);
    }

    #[tokio::test]
    async fn stale_refresh_reuses_newer_session() {
        let manager = SessionManager::new();
        let logins = AtomicU32::new(0);

        let first = manager
            .refresh(None, || async {
                logins.fetch_add(1, Ordering::SeqCst);
                Ok(Session::new(None))
            })
            .await
            .unwrap();
        manager
            .refresh(Some(0), || async {
                logins.fetch_add(1, Ordering::SeqCst);
                Ok(Session::new(None))
            })
            .await
            .unwrap();

        assert_eq!(first.generation(), 1);
        assert_eq!(logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_ignores_other_generations() {
        let manager = SessionManager::new();
        manager
            .refresh(None, || async { Ok(Session::new(None)) })
            .await
            .unwrap();

        manager.invalidate(7);
        assert!(manager.current().is_some());

        manager.invalidate(1);
        assert!(manager.current().is_none());
    }

    #[tokio::test]
    async fn csrf_rotation_keeps_generation() {
        let manager = SessionManager::new();
        manager
            .refresh(None, || async { Ok(Session::new(Some("a".into()))) })
            .await
            .unwrap();

        manager.rotate_csrf("b");
        let session = manager.current().unwrap();
        assert_eq!(session.csrf_token(), Some("b"));
        assert_eq!(session.generation(), 1);
    }
}

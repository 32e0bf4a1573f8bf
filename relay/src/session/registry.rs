//! Bounded, time-expiring registry of live sessions.
//!
//! The registry owns each session; termination is signalled through the
//! session's `done` token, which a per-session reaper task consumes to drop
//! the entry. Registry operations only take the map lock and never block on
//! I/O.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use relay_types::ProtocolVersion;
use tokio::net::TcpStream;
use uuid::Uuid;

use crate::metrics::{METRICS_ID_RELAY_SESSIONS_EXPIRED, METRICS_ID_RELAY_SESSIONS_OPEN};
use crate::session::Session;

/// Errors raised by registry operations.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub(crate) enum Error {
    /// The SID was not found in the registry.
    #[error("no such SID")]
    NoSuchSid,
    /// The maximum session limit is reached.
    #[error("session limit reached")]
    SessionLimit,
}

/// A concurrent mapping from session id to live session.
///
/// Enforces a session-count cap and a per-session lifetime.
#[derive(Clone)]
pub(crate) struct SessionRegistry(Arc<Inner>);

struct Inner {
    max_sessions: i64,
    max_age: Option<Duration>,
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
}

impl SessionRegistry {
    /// Creates a registry enforcing the given limits.
    ///
    /// `max_sessions <= 0` disables the session cap; a `max_age` of `None`
    /// disables expiry.
    pub(crate) fn new(max_sessions: i64, max_age: Option<Duration>) -> Self {
        SessionRegistry(Arc::new(Inner {
            max_sessions,
            max_age,
            sessions: RwLock::new(HashMap::new()),
        }))
    }

    /// Creates and registers a session from an established SSH connection.
    ///
    /// Arms the expiry timer (when a lifetime is configured) and spawns the
    /// reaper that drops the entry once the session terminates.
    pub(crate) fn new_session(
        &self,
        ssh: TcpStream,
        version: ProtocolVersion,
    ) -> Result<Arc<Session>, Error> {
        let mut sessions = self.0.sessions.write();
        if self.0.max_sessions > 0 && sessions.len() as i64 >= self.0.max_sessions {
            return Err(Error::SessionLimit);
        }
        let session = Arc::new(Session::new(ssh, version));
        sessions.insert(session.sid(), Arc::clone(&session));
        metrics::gauge!(METRICS_ID_RELAY_SESSIONS_OPEN).increment(1);
        tracing::debug!(
            "{session}: new {} session, {}/{} active",
            session.version(),
            sessions.len(),
            self.0.max_sessions
        );

        if let Some(max_age) = self.0.max_age {
            let expiring = Arc::clone(&session);
            tracing::trace!("{expiring}: session expires in {max_age:?}");
            tokio::spawn(async move {
                let done = expiring.done();
                tokio::select! {
                    () = tokio::time::sleep(max_age) => {
                        metrics::counter!(METRICS_ID_RELAY_SESSIONS_EXPIRED).increment(1);
                        tracing::debug!("{expiring}: session expired");
                        expiring.close();
                    }
                    () = done.cancelled() => {}
                }
            });
        }

        let registry = self.clone();
        let reaped = Arc::clone(&session);
        tokio::spawn(async move {
            reaped.done().cancelled().await;
            // the connection handler may have de-registered the entry already
            let _ = registry.delete(reaped.sid());
        });
        Ok(session)
    }

    /// Retrieves the session with the given id.
    ///
    /// The returned session may already have terminated; the reaper removes
    /// entries asynchronously.
    pub(crate) fn get(&self, sid: Uuid) -> Result<Arc<Session>, Error> {
        self.0
            .sessions
            .read()
            .get(&sid)
            .cloned()
            .ok_or(Error::NoSuchSid)
    }

    /// De-registers the session with the given id.
    ///
    /// Safe to call concurrently with the reaper; the loser of the race
    /// observes [`Error::NoSuchSid`].
    pub(crate) fn delete(&self, sid: Uuid) -> Result<(), Error> {
        if self.0.sessions.write().remove(&sid).is_none() {
            return Err(Error::NoSuchSid);
        }
        metrics::gauge!(METRICS_ID_RELAY_SESSIONS_OPEN).decrement(1);
        tracing::trace!("{sid}: session de-registered");
        Ok(())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.0.sessions.read().len()
    }
}

use alloy_primitives::Address;
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

use super::{Session, SessionState, StoredSession, UserProfile};
use crate::events::{EventBus, QuestEvent};
use crate::storage::{keys, StorageAdapter};

/// A disconnect whose storage clear did not land. Storage is not trusted
/// again until the clear is retried successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PendingClear {
    /// The disconnected session, identified by its nonce
    Session(String),
    /// Nothing was in memory, so any persisted session is stale
    Any,
}

/// Owner of the single authenticated session.
///
/// All transitions go through the state lock, and storage is always written
/// before memory on connect and cleared before memory on disconnect. Observers
/// outside the manager therefore see either no session or a complete one.
pub struct SessionManager {
    storage: StorageAdapter,
    state: RwLock<SessionState>,
    pending_clear: Mutex<Option<PendingClear>>,
    watch_tx: watch::Sender<SessionState>,
    events: EventBus,
}

impl SessionManager {
    pub fn new(storage: StorageAdapter, events: EventBus) -> Self {
        let (watch_tx, _) = watch::channel(SessionState::Idle);
        Self {
            storage,
            state: RwLock::new(SessionState::Idle),
            pending_clear: Mutex::new(None),
            watch_tx,
            events,
        }
    }

    pub fn storage(&self) -> &StorageAdapter {
        &self.storage
    }

    pub fn state(&self) -> SessionState {
        self.state.read().clone()
    }

    pub fn session(&self) -> Option<Session> {
        self.state.read().session().cloned()
    }

    pub fn address(&self) -> Option<Address> {
        self.state.read().session().map(|s| s.address)
    }

    pub fn is_connected(&self) -> bool {
        self.state.read().is_connected()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.watch_tx.subscribe()
    }

    /// `Idle -> Detecting`. Any other state is left alone.
    pub fn begin_detection(&self) {
        let mut state = self.state.write();
        if *state == SessionState::Idle {
            self.transition(&mut state, SessionState::Detecting);
        }
    }

    /// Read the persisted `{session, user, connected}` triple. Anything short
    /// of a complete triple with the flag set reads as no session.
    ///
    /// While an earlier disconnect's clear is pending, the session it left
    /// behind reads as no session and the clear is retried. A session signed
    /// in since then (different nonce) is returned and ends the retry.
    pub fn persisted_session(&self) -> Option<Session> {
        let session = self.read_persisted()?;
        let mut pending = self.pending_clear.lock();
        match pending.as_ref() {
            None => Some(session),
            Some(PendingClear::Session(nonce)) if *nonce != session.nonce => {
                tracing::debug!("[session] Newer session in storage, dropping pending clear");
                *pending = None;
                Some(session)
            }
            Some(_) => {
                if self.storage.clear_session_keys() {
                    tracing::info!("[session] Cleared session left behind by an earlier disconnect");
                    *pending = None;
                } else {
                    tracing::debug!("[session] Pending storage clear still failing");
                }
                None
            }
        }
    }

    fn read_persisted(&self) -> Option<Session> {
        if self.storage.load::<bool>(keys::CONNECTED) != Some(true) {
            return None;
        }
        let stored = self.storage.load::<StoredSession>(keys::SESSION)?;
        let user = self.storage.load::<UserProfile>(keys::USER)?;
        Some(Session {
            address: stored.address,
            issued_at: stored.issued_at,
            nonce: stored.nonce,
            user,
        })
    }

    /// Restore from storage without any network call.
    ///
    /// A complete persisted triple always yields `Connected` with that
    /// identity, however often this runs. Without one, a manager that is still
    /// starting up settles in `Disconnected`; an already connected manager is
    /// left for the reconciler to repair. Returns whether the manager is
    /// connected afterwards.
    pub fn restore(&self) -> bool {
        let persisted = self.persisted_session();
        let mut state = self.state.write();

        match persisted {
            Some(session) => {
                if state
                    .session()
                    .is_some_and(|current| current.same_identity(&session))
                {
                    return true;
                }
                if !state.is_connected() {
                    self.transition(&mut state, SessionState::Restoring);
                }
                tracing::info!("[session] Restored session for {}", session.address);
                self.transition(&mut state, SessionState::Connected(session));
                true
            }
            None => {
                if matches!(*state, SessionState::Idle | SessionState::Detecting) {
                    tracing::debug!("[session] No persisted session");
                    self.transition(&mut state, SessionState::Disconnected);
                }
                state.is_connected()
            }
        }
    }

    /// Install a freshly authenticated session. Storage is written first and
    /// the connected flag last, so a reader of storage never sees the flag
    /// without the records behind it.
    pub fn connect(&self, session: Session) {
        let mut state = self.state.write();
        if self.persist(&session) {
            *self.pending_clear.lock() = None;
        }
        tracing::info!("[session] Connected as {}", session.address);
        self.transition(&mut state, SessionState::Connected(session));
    }

    /// Clear storage and then memory under one lock.
    ///
    /// A clear that fails is remembered and retried on every later storage
    /// read, so the disconnected session never comes back once storage
    /// recovers.
    pub fn disconnect(&self) {
        let mut state = self.state.write();
        if self.storage.clear_session_keys() {
            *self.pending_clear.lock() = None;
        } else {
            tracing::warn!("[session] Storage clear incomplete during disconnect, will retry");
            let pending = match state.session() {
                Some(session) => PendingClear::Session(session.nonce.clone()),
                None => PendingClear::Any,
            };
            *self.pending_clear.lock() = Some(pending);
        }
        if state.is_connected() {
            tracing::info!("[session] Disconnected");
        }
        self.transition(&mut state, SessionState::Disconnected);
    }

    /// Set `isVerified` on the current user and persist it.
    pub fn mark_verified(&self) -> Option<UserProfile> {
        let mut state = self.state.write();
        let SessionState::Connected(session) = &*state else {
            return None;
        };
        if session.user.is_verified {
            return Some(session.user.clone());
        }

        let mut updated = session.clone();
        updated.user.is_verified = true;
        self.storage.save(keys::USER, &updated.user);
        let user = updated.user.clone();
        self.transition(&mut state, SessionState::Connected(updated));
        Some(user)
    }

    /// Alias kept for callers that think in terms of "is the wallet still
    /// connected": re-runs restore.
    pub fn check_connection(&self) -> bool {
        self.restore()
    }

    // Reconciliation primitives. These never touch the network.

    /// Replace memory with a session observed in storage.
    pub(crate) fn adopt(&self, session: Session) -> bool {
        let mut state = self.state.write();
        if matches!(*state, SessionState::Idle | SessionState::Detecting) {
            return false;
        }
        if state
            .session()
            .is_some_and(|current| current.same_identity(&session))
        {
            return false;
        }
        tracing::info!("[session] Adopting session for {} from storage", session.address);
        self.transition(&mut state, SessionState::Connected(session));
        true
    }

    /// Drop the in-memory session after another context disconnected.
    pub(crate) fn clear_memory(&self) -> bool {
        let mut state = self.state.write();
        if !state.is_connected() {
            return false;
        }
        tracing::info!("[session] Session cleared by another context");
        self.transition(&mut state, SessionState::Disconnected);
        true
    }

    /// Rewrite storage from memory when storage lost the session.
    pub(crate) fn repair_storage(&self) -> bool {
        let state = self.state.read();
        let Some(session) = state.session() else {
            return false;
        };
        if self.persisted_session().is_some() {
            return false;
        }
        tracing::info!("[session] Rewriting lost session for {} to storage", session.address);
        self.persist(session);
        true
    }

    fn persist(&self, session: &Session) -> bool {
        let wrote = self.storage.save(keys::SESSION, &StoredSession::from(session))
            && self.storage.save(keys::USER, &session.user)
            && self.storage.save(keys::CONNECTED, &true);
        if !wrote {
            tracing::warn!("[session] Session not persisted; it will not survive a restart");
        }
        wrote
    }

    fn transition(&self, state: &mut SessionState, next: SessionState) {
        let was_connected = state.is_connected();
        let previous_address = state.session().map(|s| s.address);
        tracing::debug!("[session] {} -> {}", state.name(), next.name());
        *state = next;

        let address = state.session().map(|s| s.address);
        if was_connected != state.is_connected() || previous_address != address {
            self.events.emit(QuestEvent::SessionChanged {
                connected: state.is_connected(),
                address,
            });
        }
        self.watch_tx.send_replace(state.clone());
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state.read().name())
            .field("storage", &self.storage)
            .finish()
    }
}

//! Session-state provider injected into the engine, plus the auth-change
//! channel scoped to the session's owner.

#![allow(missing_docs)]

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::{Mutex, RwLock};

/// Read-only view of the authenticated viewer.
pub trait SessionProvider: Send + Sync {
    /// Display name of the signed-in viewer, `None` when signed out.
    fn viewer_name(&self) -> Option<String>;

    fn is_signed_in(&self) -> bool {
        self.viewer_name().is_some()
    }
}

/// Authentication transitions delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    SignedIn { viewer_name: String },
    ViewerRenamed { viewer_name: String },
    SignedOut,
}

#[derive(Debug, Default)]
struct SessionState {
    viewer_name: Option<String>,
}

/// Cloneable session handle. Clones share state and subscribers.
#[derive(Debug, Clone, Default)]
pub struct SharedSession {
    state: Arc<RwLock<SessionState>>,
    subscribers: Arc<Mutex<Vec<Sender<SessionChange>>>>,
}

impl SharedSession {
    /// A signed-out session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn signed_in(viewer_name: impl Into<String>) -> Self {
        let session = Self::new();
        session.state.write().viewer_name = Some(viewer_name.into());
        session
    }

    /// Receive every change made after this call.
    pub fn subscribe(&self) -> Receiver<SessionChange> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn sign_in(&self, viewer_name: impl Into<String>) {
        let viewer_name = viewer_name.into();
        self.state.write().viewer_name = Some(viewer_name.clone());
        self.broadcast(&SessionChange::SignedIn { viewer_name });
    }

    /// Rename the viewer. No-op while signed out.
    pub fn rename(&self, viewer_name: impl Into<String>) {
        let viewer_name = viewer_name.into();
        {
            let mut state = self.state.write();
            if state.viewer_name.is_none() {
                return;
            }
            state.viewer_name = Some(viewer_name.clone());
        }
        self.broadcast(&SessionChange::ViewerRenamed { viewer_name });
    }

    pub fn sign_out(&self) {
        let was_signed_in = self.state.write().viewer_name.take().is_some();
        if was_signed_in {
            self.broadcast(&SessionChange::SignedOut);
        }
    }

    fn broadcast(&self, change: &SessionChange) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(change.clone()).is_ok());
    }
}

impl SessionProvider for SharedSession {
    fn viewer_name(&self) -> Option<String> {
        self.state.read().viewer_name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let session = SharedSession::new();
        let view = session.clone();
        assert!(!view.is_signed_in());
        session.sign_in("Han");
        assert_eq!(view.viewer_name().as_deref(), Some("Han"));
    }

    #[test]
    fn subscribers_see_transitions_in_order() {
        let session = SharedSession::signed_in("Han");
        let rx = session.subscribe();
        session.rename("Han Jimin");
        session.sign_out();
        session.sign_out();

        let changes: Vec<SessionChange> = rx.try_iter().collect();
        assert_eq!(
            changes,
            vec![
                SessionChange::ViewerRenamed {
                    viewer_name: "Han Jimin".to_string()
                },
                SessionChange::SignedOut,
            ]
        );
    }

    #[test]
    fn rename_while_signed_out_is_ignored() {
        let session = SharedSession::new();
        let rx = session.subscribe();
        session.rename("Nobody");
        assert!(session.viewer_name().is_none());
        assert!(rx.try_recv().is_err());
    }
}

//! Synchronous runtime: executes [`FeedCmd`]s against a [`FeedBackend`]
//! and feeds the completions back into the engine until it settles.

#![allow(missing_docs)]

use std::collections::VecDeque;

use crossbeam_channel::{Receiver, TryRecvError};

use super::backend::FeedBackend;
use super::compose::ComposedSection;
use super::engine::{FeedCmd, FeedEngine, FeedMsg};
use super::events::EngineEvent;
use super::model::AnnouncementEntity;
use super::traversal::TraversalState;
use crate::core::errors::{FeedError, Result};
use crate::core::session::SessionChange;

pub struct FeedRuntime<B: FeedBackend> {
    engine: FeedEngine,
    backend: B,
    session_changes: Option<Receiver<SessionChange>>,
}

impl<B: FeedBackend> FeedRuntime<B> {
    #[must_use]
    pub fn new(engine: FeedEngine, backend: B) -> Self {
        Self {
            engine,
            backend,
            session_changes: None,
        }
    }

    /// Apply auth changes from `rx` before every user intent.
    #[must_use]
    pub fn with_session_changes(mut self, rx: Receiver<SessionChange>) -> Self {
        self.session_changes = Some(rx);
        self
    }

    #[must_use]
    pub const fn engine(&self) -> &FeedEngine {
        &self.engine
    }

    /// Direct access for hosts that deliver completions themselves.
    pub fn engine_mut(&mut self) -> &mut FeedEngine {
        &mut self.engine
    }

    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    pub fn subscribe(&mut self) -> Receiver<EngineEvent> {
        self.engine.subscribe()
    }

    #[must_use]
    pub fn composed_sections(&self) -> Vec<ComposedSection> {
        self.engine.composed_sections()
    }

    #[must_use]
    pub fn current_item(&self) -> Option<AnnouncementEntity> {
        self.engine.current_item()
    }

    #[must_use]
    pub const fn traversal_state(&self) -> TraversalState {
        self.engine.traversal_state()
    }

    // ── intents ──

    pub fn load(&mut self) -> Result<()> {
        self.intent(FeedMsg::Load)
    }

    pub fn select_association(&mut self, index: usize) -> Result<()> {
        self.intent(FeedMsg::SelectAssociation(index))
    }

    pub fn cancel_selection(&mut self) -> Result<()> {
        self.intent(FeedMsg::CancelSelection)
    }

    pub fn start_traversal(&mut self) -> Result<TraversalState> {
        self.intent(FeedMsg::StartTraversal)?;
        Ok(self.engine.traversal_state())
    }

    /// Acknowledge the item under the cursor and move past it.
    ///
    /// A failed acknowledgment leaves the traversal where it was and is
    /// returned as [`FeedError::AcknowledgeFailed`].
    pub fn acknowledge_current_and_advance(&mut self) -> Result<TraversalState> {
        self.intent(FeedMsg::AdvanceTraversal)?;
        Ok(self.engine.traversal_state())
    }

    pub fn exit_traversal(&mut self) -> Result<()> {
        self.intent(FeedMsg::ExitTraversal)
    }

    /// Drain pending auth changes into the engine. Returns how many were
    /// applied.
    ///
    /// Every buffered change is applied even when one fails or the channel
    /// has disconnected; the first error is returned afterwards.
    pub fn pump_session_changes(&mut self) -> Result<usize> {
        let Some(rx) = self.session_changes.as_ref() else {
            return Ok(0);
        };
        let mut changes = Vec::new();
        let disconnected = loop {
            match rx.try_recv() {
                Ok(change) => changes.push(change),
                Err(TryRecvError::Empty) => break false,
                Err(TryRecvError::Disconnected) => break true,
            }
        };

        let applied = changes.len();
        let mut first_error = None;
        for change in changes {
            if let Err(error) = self.dispatch(FeedMsg::SessionChanged(change)) {
                first_error.get_or_insert(error);
            }
        }
        if disconnected {
            self.session_changes = None;
            first_error.get_or_insert(FeedError::ChannelClosed {
                component: "session",
            });
        }
        first_error.map_or(Ok(applied), Err)
    }

    /// Apply pending auth changes, then `msg`. The intent always runs; a
    /// session error is reported ahead of its own.
    fn intent(&mut self, msg: FeedMsg) -> Result<()> {
        let pumped = self.pump_session_changes();
        let dispatched = self.dispatch(msg);
        pumped.and(dispatched)
    }

    /// Run `msg` and every completion it causes.
    ///
    /// The queue is always drained; the first error is returned afterwards.
    pub fn dispatch(&mut self, msg: FeedMsg) -> Result<()> {
        let mut queue = VecDeque::from([msg]);
        let mut first_error = None;
        while let Some(msg) = queue.pop_front() {
            match self.engine.update(msg) {
                Ok(cmd) => self.execute(cmd, &mut queue),
                Err(error) => {
                    first_error.get_or_insert(error);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn execute(&self, cmd: FeedCmd, queue: &mut VecDeque<FeedMsg>) {
        match cmd {
            FeedCmd::None => {}
            FeedCmd::Batch(cmds) => {
                for cmd in cmds {
                    self.execute(cmd, queue);
                }
            }
            FeedCmd::FetchAssociations { generation } => {
                queue.push_back(FeedMsg::AssociationsLoaded {
                    generation,
                    result: self.backend.fetch_association_list(),
                });
            }
            FeedCmd::FetchBookmarks { generation } => {
                queue.push_back(FeedMsg::BookmarksLoaded {
                    generation,
                    result: self.backend.fetch_bookmarks(),
                });
            }
            FeedCmd::FetchAnnouncements { epoch, key } => {
                queue.push_back(FeedMsg::AnnouncementsLoaded {
                    epoch,
                    result: self.backend.fetch_announcements(key),
                });
            }
            FeedCmd::FetchMissedDigest { epoch, key } => {
                queue.push_back(FeedMsg::MissedDigestLoaded {
                    epoch,
                    result: self.backend.fetch_missed_digest(key),
                });
            }
            FeedCmd::FetchUnreadQueue { session, key } => {
                queue.push_back(FeedMsg::UnreadQueueLoaded {
                    session,
                    result: self.backend.fetch_unread_queue(key),
                });
            }
            FeedCmd::AcknowledgeRead { session, id } => {
                queue.push_back(FeedMsg::ReadAcknowledged {
                    session,
                    id,
                    result: self.backend.acknowledge_read(id),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::session::SharedSession;
    use crate::feed::engine::EngineOptions;
    use crate::feed::fixture::{FixtureBackend, FixtureCall, FixtureData, UnreadFixture};
    use crate::feed::model::fixtures::{announcement, association_strip};
    use crate::feed::model::{AnnouncementId, FilterKey, SectionId};

    fn runtime(data: FixtureData) -> (FeedRuntime<FixtureBackend>, SharedSession) {
        let session = SharedSession::signed_in("Kim");
        let rx = session.subscribe();
        let engine = FeedEngine::new(EngineOptions::default(), Arc::new(session.clone()));
        let runtime =
            FeedRuntime::new(engine, FixtureBackend::new(data)).with_session_changes(rx);
        (runtime, session)
    }

    fn data() -> FixtureData {
        FixtureData {
            associations: association_strip(),
            announcements: [(FilterKey::All, vec![announcement(1), announcement(2)])].into(),
            missed_counts: [(FilterKey::All, 2)].into(),
            unread: [(
                FilterKey::All,
                UnreadFixture {
                    ids: vec![AnnouncementId(1), AnnouncementId(2)],
                    count: None,
                },
            )]
            .into(),
            ..FixtureData::default()
        }
    }

    #[test]
    fn load_settles_every_section() {
        let (mut runtime, _) = runtime(data());
        runtime.load().unwrap();
        let store = runtime.engine().store();
        assert_eq!(store.associations().unwrap().len(), 4);
        assert_eq!(store.announcements().unwrap().len(), 2);
        assert_eq!(store.missed_digest().unwrap().missed_count, 2);
        assert_eq!(store.bookmarks(), Some(Vec::new()));
    }

    #[test]
    fn failed_section_does_not_stop_the_others() {
        let (mut runtime, _) = runtime(data());
        runtime.backend().fail(FixtureCall::Associations);
        runtime.load().unwrap();
        let store = runtime.engine().store();
        assert!(store.associations().is_none());
        assert_eq!(store.announcements().unwrap().len(), 2);
    }

    #[test]
    fn traversal_runs_to_exhaustion() {
        let (mut runtime, _) = runtime(data());
        runtime.load().unwrap();
        assert_eq!(
            runtime.start_traversal().unwrap(),
            TraversalState::Presenting { cursor: 0 }
        );
        assert_eq!(
            runtime.acknowledge_current_and_advance().unwrap(),
            TraversalState::Presenting { cursor: 1 }
        );
        assert_eq!(
            runtime.acknowledge_current_and_advance().unwrap(),
            TraversalState::Exhausted
        );
        assert_eq!(runtime.backend().calls(FixtureCall::AcknowledgeRead), 2);
        assert!(!runtime.engine().store().is_present(SectionId::MissedDigest));
    }

    #[test]
    fn session_changes_are_applied_before_intents() {
        let (mut runtime, session) = runtime(data());
        runtime.load().unwrap();
        session.sign_out();
        runtime.load().unwrap();
        assert!(runtime.engine().store().associations().is_none());
        assert_eq!(runtime.engine().viewer_name(), "Guest");
    }

    #[test]
    fn dropped_session_still_runs_the_intent() {
        let session = SharedSession::signed_in("Kim");
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(tx);
        let engine = FeedEngine::new(EngineOptions::default(), Arc::new(session));
        let mut runtime =
            FeedRuntime::new(engine, FixtureBackend::new(data())).with_session_changes(rx);

        let err = runtime.load().unwrap_err();
        assert_eq!(err.code(), "CFE-3003");
        assert_eq!(runtime.backend().calls(FixtureCall::Associations), 1);
        assert_eq!(runtime.engine().store().associations().unwrap().len(), 4);

        runtime.load().unwrap();
        assert_eq!(runtime.backend().calls(FixtureCall::Associations), 2);
    }

    #[test]
    fn buffered_changes_apply_before_disconnect_is_reported() {
        let session = SharedSession::signed_in("Kim");
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(SessionChange::SignedIn {
            viewer_name: "Kim".to_string(),
        })
        .unwrap();
        tx.send(SessionChange::ViewerRenamed {
            viewer_name: "Kim Minji".to_string(),
        })
        .unwrap();
        drop(tx);
        let engine = FeedEngine::new(EngineOptions::default(), Arc::new(session));
        let mut runtime =
            FeedRuntime::new(engine, FixtureBackend::new(data())).with_session_changes(rx);

        let err = runtime.pump_session_changes().unwrap_err();
        assert_eq!(err.code(), "CFE-3003");
        assert_eq!(runtime.backend().calls(FixtureCall::Associations), 1);
        assert_eq!(
            runtime.engine().store().missed_digest().unwrap().viewer_name,
            "Kim Minji"
        );
        assert_eq!(runtime.pump_session_changes().unwrap(), 0);
    }
}

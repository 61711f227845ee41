//! Sequential unread traversal.
//!
//! ```text
//! Idle → Loading → Presenting(0) ⇄ Advancing(0) → Presenting(1) → … → Exhausted
//! ```
//!
//! The cursor only moves after the server confirmed the read for the item
//! under it. A failed acknowledgment leaves cursor and remaining count
//! exactly where they were.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

use super::backend::{FetchError, UnreadQueuePayload};
use super::model::{AnnouncementEntity, AnnouncementId, FilterKey, SectionId};
use crate::core::errors::{FeedError, Result};

/// What to do with an advance request while another is in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvancePolicy {
    /// Refuse with `AdvanceInFlight`.
    #[default]
    Reject,
    /// Remember at most one follow-up advance; it runs after the in-flight
    /// acknowledgment succeeds and is dropped if that one fails.
    Coalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TraversalState {
    Idle,
    Loading,
    Presenting { cursor: usize },
    Advancing { cursor: usize },
    Exhausted,
}

/// Queue of one traversal session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadQueue {
    pub filter: FilterKey,
    pub items: Vec<AnnouncementEntity>,
    pub cursor: usize,
    pub remaining_count: u32,
}

/// Where the traversal stands after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum TraversalStep {
    Presenting { cursor: usize, remaining: u32 },
    Exhausted { remaining: u32 },
}

/// Result of `begin_advance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceRequest {
    /// Acknowledge `id` server-side, then report back with `session`.
    Acknowledge { session: u64, id: AnnouncementId },
    /// Folded into the acknowledgment already in flight.
    Coalesced,
}

/// Result of a successful acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceOutcome {
    pub acknowledged: AnnouncementId,
    pub step: TraversalStep,
    /// A coalesced advance that must now be acknowledged.
    pub follow_up: Option<AnnouncementId>,
}

/// Cursor state machine over the unread queue.
#[derive(Debug, Clone)]
pub struct UnreadTraversalController {
    policy: AdvancePolicy,
    session: u64,
    state: TraversalState,
    filter: Option<FilterKey>,
    queue: Option<UnreadQueue>,
    queued_advance: bool,
}

impl UnreadTraversalController {
    #[must_use]
    pub fn new(policy: AdvancePolicy) -> Self {
        Self {
            policy,
            session: 0,
            state: TraversalState::Idle,
            filter: None,
            queue: None,
            queued_advance: false,
        }
    }

    #[must_use]
    pub const fn state(&self) -> TraversalState {
        self.state
    }

    #[must_use]
    pub const fn session(&self) -> u64 {
        self.session
    }

    #[must_use]
    pub const fn filter(&self) -> Option<FilterKey> {
        self.filter
    }

    #[must_use]
    pub fn cursor(&self) -> Option<usize> {
        self.queue.as_ref().map(|q| q.cursor)
    }

    #[must_use]
    pub fn remaining_count(&self) -> Option<u32> {
        self.queue.as_ref().map(|q| q.remaining_count)
    }

    #[must_use]
    pub fn queue(&self) -> Option<&UnreadQueue> {
        self.queue.as_ref()
    }

    /// Begin a session for `filter`. Any previous session is abandoned.
    /// Returns the session id the queue fetch must be tagged with.
    pub fn start(&mut self, filter: FilterKey) -> u64 {
        self.session += 1;
        self.state = TraversalState::Loading;
        self.filter = Some(filter);
        self.queue = None;
        self.queued_advance = false;
        self.session
    }

    /// End the current session. Late answers for it become stale.
    ///
    /// Returns `true` if a session was active.
    pub fn exit(&mut self) -> bool {
        let was_active = self.state != TraversalState::Idle;
        self.session += 1;
        self.state = TraversalState::Idle;
        self.filter = None;
        self.queue = None;
        self.queued_advance = false;
        was_active
    }

    /// Install the fetched queue.
    pub fn on_queue_loaded(
        &mut self,
        session: u64,
        result: std::result::Result<UnreadQueuePayload, FetchError>,
    ) -> Result<TraversalStep> {
        if session != self.session || self.state != TraversalState::Loading {
            return Err(FeedError::StaleResultDiscarded {
                details: format!("unread queue for session {session} (current {})", self.session),
            });
        }

        let payload = match result {
            Ok(payload) => payload,
            Err(error) => {
                self.state = TraversalState::Idle;
                self.filter = None;
                return Err(FeedError::FetchFailed {
                    section: SectionId::AnnouncementFeed,
                    details: error.to_string(),
                });
            }
        };

        let queue = UnreadQueue {
            filter: self.filter.unwrap_or_default(),
            items: payload.items,
            cursor: 0,
            remaining_count: payload.count,
        };
        let step = if queue.items.is_empty() {
            self.state = TraversalState::Exhausted;
            TraversalStep::Exhausted {
                remaining: queue.remaining_count,
            }
        } else {
            self.state = TraversalState::Presenting { cursor: 0 };
            TraversalStep::Presenting {
                cursor: 0,
                remaining: queue.remaining_count,
            }
        };
        self.queue = Some(queue);
        Ok(step)
    }

    /// The item under the cursor, while presenting or advancing.
    #[must_use]
    pub fn current_item(&self) -> Option<AnnouncementEntity> {
        match self.state {
            TraversalState::Presenting { cursor } | TraversalState::Advancing { cursor } => {
                self.queue.as_ref()?.items.get(cursor).cloned()
            }
            _ => None,
        }
    }

    /// Request acknowledgment of the current item.
    pub fn begin_advance(&mut self) -> Result<AdvanceRequest> {
        match self.state {
            TraversalState::Presenting { cursor } => {
                let id = self.item_id(cursor).ok_or(FeedError::NoActiveTraversal)?;
                self.state = TraversalState::Advancing { cursor };
                Ok(AdvanceRequest::Acknowledge {
                    session: self.session,
                    id,
                })
            }
            TraversalState::Advancing { cursor } => {
                let id = self.item_id(cursor).ok_or(FeedError::NoActiveTraversal)?;
                match self.policy {
                    AdvancePolicy::Reject => Err(FeedError::AdvanceInFlight { id }),
                    AdvancePolicy::Coalesce => {
                        self.queued_advance = true;
                        Ok(AdvanceRequest::Coalesced)
                    }
                }
            }
            TraversalState::Idle | TraversalState::Loading | TraversalState::Exhausted => {
                Err(FeedError::NoActiveTraversal)
            }
        }
    }

    /// Apply the server's answer for the in-flight acknowledgment.
    pub fn complete_advance(
        &mut self,
        session: u64,
        id: AnnouncementId,
        result: std::result::Result<(), FetchError>,
    ) -> Result<AdvanceOutcome> {
        let TraversalState::Advancing { cursor } = self.state else {
            return Err(self.stale(session, id));
        };
        if session != self.session || self.item_id(cursor) != Some(id) {
            return Err(self.stale(session, id));
        }

        if let Err(error) = result {
            self.state = TraversalState::Presenting { cursor };
            self.queued_advance = false;
            return Err(FeedError::AcknowledgeFailed {
                id,
                details: error.to_string(),
            });
        }

        let Some(queue) = self.queue.as_mut() else {
            return Err(FeedError::NoActiveTraversal);
        };
        queue.remaining_count = queue.remaining_count.saturating_sub(1);
        let remaining = queue.remaining_count;

        let step = if cursor + 1 < queue.items.len() {
            queue.cursor = cursor + 1;
            self.state = TraversalState::Presenting { cursor: cursor + 1 };
            TraversalStep::Presenting {
                cursor: cursor + 1,
                remaining,
            }
        } else {
            self.state = TraversalState::Exhausted;
            self.queued_advance = false;
            TraversalStep::Exhausted { remaining }
        };

        let follow_up = if std::mem::take(&mut self.queued_advance) {
            match self.begin_advance()? {
                AdvanceRequest::Acknowledge { id, .. } => Some(id),
                AdvanceRequest::Coalesced => None,
            }
        } else {
            None
        };

        Ok(AdvanceOutcome {
            acknowledged: id,
            step,
            follow_up,
        })
    }

    fn item_id(&self, cursor: usize) -> Option<AnnouncementId> {
        self.queue.as_ref()?.items.get(cursor).map(|a| a.id)
    }

    fn stale(&self, session: u64, id: AnnouncementId) -> FeedError {
        FeedError::StaleResultDiscarded {
            details: format!(
                "acknowledgment of {id} for session {session} (current {})",
                self.session
            ),
        }
    }
}

impl Default for UnreadTraversalController {
    fn default() -> Self {
        Self::new(AdvancePolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::model::fixtures::announcement;

    fn payload(ids: &[u64]) -> UnreadQueuePayload {
        UnreadQueuePayload {
            items: ids.iter().map(|&id| announcement(id)).collect(),
            count: u32::try_from(ids.len()).unwrap(),
        }
    }

    fn loaded(policy: AdvancePolicy, ids: &[u64]) -> UnreadTraversalController {
        let mut controller = UnreadTraversalController::new(policy);
        let session = controller.start(FilterKey::All);
        controller.on_queue_loaded(session, Ok(payload(ids))).unwrap();
        controller
    }

    fn ack(controller: &mut UnreadTraversalController, ok: bool) -> Result<AdvanceOutcome> {
        let AdvanceRequest::Acknowledge { session, id } = controller.begin_advance()? else {
            panic!("expected acknowledge request");
        };
        let result = if ok {
            Ok(())
        } else {
            Err(FetchError::Transport("offline".to_string()))
        };
        controller.complete_advance(session, id, result)
    }

    #[test]
    fn start_presents_first_item() {
        let controller = loaded(AdvancePolicy::Reject, &[10, 11, 12]);
        assert_eq!(controller.state(), TraversalState::Presenting { cursor: 0 });
        assert_eq!(controller.remaining_count(), Some(3));
        assert_eq!(controller.current_item().unwrap().id, AnnouncementId(10));
    }

    #[test]
    fn three_acks_exhaust_three_items() {
        let mut controller = loaded(AdvancePolicy::Reject, &[10, 11, 12]);
        for _ in 0..3 {
            ack(&mut controller, true).unwrap();
        }
        assert_eq!(controller.state(), TraversalState::Exhausted);
        assert_eq!(controller.remaining_count(), Some(0));
        assert!(controller.current_item().is_none());
    }

    #[test]
    fn failed_ack_on_second_item_keeps_position() {
        let mut controller = loaded(AdvancePolicy::Reject, &[10, 11, 12]);
        ack(&mut controller, true).unwrap();

        let err = ack(&mut controller, false).unwrap_err();
        assert!(matches!(
            err,
            FeedError::AcknowledgeFailed {
                id: AnnouncementId(11),
                ..
            }
        ));
        assert_eq!(controller.state(), TraversalState::Presenting { cursor: 1 });
        assert_eq!(controller.cursor(), Some(1));
        assert_eq!(controller.remaining_count(), Some(2));

        // Retry succeeds from the same item.
        let outcome = ack(&mut controller, true).unwrap();
        assert_eq!(outcome.acknowledged, AnnouncementId(11));
        assert_eq!(controller.cursor(), Some(2));
    }

    #[test]
    fn concurrent_advance_is_rejected() {
        let mut controller = loaded(AdvancePolicy::Reject, &[10, 11]);
        let first = controller.begin_advance().unwrap();
        let err = controller.begin_advance().unwrap_err();
        assert!(matches!(
            err,
            FeedError::AdvanceInFlight {
                id: AnnouncementId(10)
            }
        ));
        assert!(matches!(first, AdvanceRequest::Acknowledge { .. }));
    }

    #[test]
    fn coalesced_advance_follows_success() {
        let mut controller = loaded(AdvancePolicy::Coalesce, &[10, 11, 12]);
        let AdvanceRequest::Acknowledge { session, id } = controller.begin_advance().unwrap()
        else {
            panic!("expected acknowledge");
        };
        assert_eq!(
            controller.begin_advance().unwrap(),
            AdvanceRequest::Coalesced
        );
        assert_eq!(
            controller.begin_advance().unwrap(),
            AdvanceRequest::Coalesced
        );

        let outcome = controller.complete_advance(session, id, Ok(())).unwrap();
        assert_eq!(outcome.follow_up, Some(AnnouncementId(11)));
        assert_eq!(controller.state(), TraversalState::Advancing { cursor: 1 });
    }

    #[test]
    fn coalesced_advance_is_dropped_on_failure() {
        let mut controller = loaded(AdvancePolicy::Coalesce, &[10, 11]);
        let AdvanceRequest::Acknowledge { session, id } = controller.begin_advance().unwrap()
        else {
            panic!("expected acknowledge");
        };
        controller.begin_advance().unwrap();
        let err = controller
            .complete_advance(session, id, Err(FetchError::Rejected(503)))
            .unwrap_err();
        assert_eq!(err.code(), "CFE-2002");
        assert_eq!(controller.state(), TraversalState::Presenting { cursor: 0 });

        // Nothing queued: the next success does not chain.
        let outcome = ack(&mut controller, true).unwrap();
        assert_eq!(outcome.follow_up, None);
    }

    #[test]
    fn answers_for_exited_session_are_stale() {
        let mut controller = loaded(AdvancePolicy::Reject, &[10]);
        let AdvanceRequest::Acknowledge { session, id } = controller.begin_advance().unwrap()
        else {
            panic!("expected acknowledge");
        };
        assert!(controller.exit());
        let err = controller.complete_advance(session, id, Ok(())).unwrap_err();
        assert_eq!(err.code(), "CFE-2004");
        assert_eq!(controller.state(), TraversalState::Idle);
    }

    #[test]
    fn empty_queue_is_immediately_exhausted() {
        let mut controller = UnreadTraversalController::default();
        let session = controller.start(FilterKey::Department);
        let step = controller
            .on_queue_loaded(
                session,
                Ok(UnreadQueuePayload {
                    items: Vec::new(),
                    count: 0,
                }),
            )
            .unwrap();
        assert_eq!(step, TraversalStep::Exhausted { remaining: 0 });
        assert!(matches!(
            controller.begin_advance(),
            Err(FeedError::NoActiveTraversal)
        ));
    }

    #[test]
    fn remaining_never_goes_negative() {
        let mut controller = UnreadTraversalController::default();
        let session = controller.start(FilterKey::All);
        controller
            .on_queue_loaded(
                session,
                Ok(UnreadQueuePayload {
                    items: vec![announcement(1), announcement(2)],
                    count: 1,
                }),
            )
            .unwrap();
        ack(&mut controller, true).unwrap();
        ack(&mut controller, true).unwrap();
        assert_eq!(controller.remaining_count(), Some(0));
        assert_eq!(controller.state(), TraversalState::Exhausted);
    }

    #[test]
    fn failed_queue_fetch_returns_to_idle() {
        let mut controller = UnreadTraversalController::default();
        let session = controller.start(FilterKey::All);
        let err = controller
            .on_queue_loaded(session, Err(FetchError::Unauthorized))
            .unwrap_err();
        assert_eq!(err.code(), "CFE-2001");
        assert_eq!(controller.state(), TraversalState::Idle);
    }
}

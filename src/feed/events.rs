//! Engine-scoped publish/subscribe channel.
//!
//! Every subscriber gets its own unbounded crossbeam receiver. Dropped
//! receivers are pruned on the next publish.

#![allow(missing_docs)]

use crossbeam_channel::{Receiver, Sender, unbounded};
use serde::Serialize;

use super::backend::FetchError;
use super::model::{AnnouncementId, FilterKey, SectionId};
use super::reconcile::RenderUpdate;

/// Typed notifications for the render layer and the external router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    Render { update: RenderUpdate },
    SelectionChanged {
        index: usize,
        key: FilterKey,
        registered: bool,
    },
    /// A section kept its last known data because its fetch failed.
    FetchFailed {
        section: SectionId,
        error: FetchError,
    },
    TraversalStarted {
        filter: FilterKey,
        queued: usize,
        remaining: u32,
    },
    TraversalAdvanced {
        acknowledged: AnnouncementId,
        cursor: usize,
        remaining: u32,
    },
    TraversalExhausted { filter: FilterKey },
}

#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<Sender<EngineEvent>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<EngineEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn publish(&mut self, event: &EngineEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use campus_feed::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{FeedError, Result};
pub use crate::core::session::{SessionChange, SessionProvider, SharedSession};

// Model
pub use crate::feed::model::{
    AnnouncementEntity, AnnouncementId, AssociationEntity, AssociationKind, BookmarkEntity,
    EmptyFeedReason, FeedItem, FilterKey, MissedDigestEntity, SectionContent, SectionId,
};

// Composition
pub use crate::feed::compose::{ComposeContext, ComposePolicy, ComposedSection, compose};
pub use crate::feed::reconcile::{RenderUpdate, SectionDiff, SnapshotReconciler};
pub use crate::feed::store::SectionDataStore;

// Flows
pub use crate::feed::selection::{SelectionController, SelectionOutcome};
pub use crate::feed::traversal::{AdvancePolicy, TraversalState, UnreadTraversalController};

// Engine
pub use crate::feed::backend::{FeedBackend, FetchError, UnreadQueuePayload};
pub use crate::feed::engine::{EngineOptions, FeedCmd, FeedEngine, FeedMsg};
pub use crate::feed::events::EngineEvent;
pub use crate::feed::fixture::{FixtureBackend, FixtureData};
pub use crate::feed::runtime::FeedRuntime;

// Logger
pub use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle, spawn_logger};

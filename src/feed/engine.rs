//! Feed engine: the single state machine behind the announcement screens.
//!
//! `update()` takes one [`FeedMsg`], mutates the engine, publishes
//! [`EngineEvent`]s, and returns a [`FeedCmd`] describing the backend calls
//! the runtime must make. It performs zero I/O; completions come back as
//! messages and may arrive in any order.

#![allow(missing_docs)]

use std::sync::Arc;

use crossbeam_channel::Receiver;

use super::backend::{FetchError, UnreadQueuePayload};
use super::compose::{ComposeContext, ComposePolicy, ComposedSection, compose};
use super::events::{EngineEvent, EventBus};
use super::model::{
    AnnouncementEntity, AnnouncementId, AssociationEntity, BookmarkEntity, FilterKey,
    MissedDigestEntity, SectionContent, SectionId, selected_index,
};
use super::reconcile::{RenderUpdate, SnapshotReconciler};
use super::selection::{JoinMember, JoinProgress, SelectionController, SelectionOutcome};
use super::store::SectionDataStore;
use super::traversal::{
    AdvancePolicy, AdvanceRequest, TraversalState, TraversalStep, UnreadTraversalController,
};
use crate::core::config::Config;
use crate::core::errors::{FeedError, Result};
use crate::core::session::{SessionChange, SessionProvider};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};

// ──────────────────── messages and commands ────────────────────

/// Inputs to the engine: user intents and backend completions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMsg {
    /// Initial load or pull-to-refresh.
    Load,
    SelectAssociation(usize),
    CancelSelection,
    StartTraversal,
    AdvanceTraversal,
    ExitTraversal,
    AssociationsLoaded {
        generation: u64,
        result: std::result::Result<Vec<AssociationEntity>, FetchError>,
    },
    BookmarksLoaded {
        generation: u64,
        result: std::result::Result<Vec<BookmarkEntity>, FetchError>,
    },
    AnnouncementsLoaded {
        epoch: u64,
        result: std::result::Result<Vec<AnnouncementEntity>, FetchError>,
    },
    MissedDigestLoaded {
        epoch: u64,
        result: std::result::Result<u32, FetchError>,
    },
    UnreadQueueLoaded {
        session: u64,
        result: std::result::Result<UnreadQueuePayload, FetchError>,
    },
    ReadAcknowledged {
        session: u64,
        id: AnnouncementId,
        result: std::result::Result<(), FetchError>,
    },
    SessionChanged(SessionChange),
}

/// Backend work requested by `update`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedCmd {
    None,
    Batch(Vec<Self>),
    FetchAssociations { generation: u64 },
    FetchBookmarks { generation: u64 },
    FetchAnnouncements { epoch: u64, key: FilterKey },
    FetchMissedDigest { epoch: u64, key: FilterKey },
    FetchUnreadQueue { session: u64, key: FilterKey },
    AcknowledgeRead { session: u64, id: AnnouncementId },
}

impl FeedCmd {
    fn batch(mut cmds: Vec<Self>) -> Self {
        cmds.retain(|cmd| *cmd != Self::None);
        match cmds.len() {
            0 => Self::None,
            1 => cmds.pop().unwrap_or(Self::None),
            _ => Self::Batch(cmds),
        }
    }
}

// ──────────────────── options ────────────────────

/// Engine settings taken from [`Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub policy: ComposePolicy,
    pub advance_policy: AdvancePolicy,
    pub prepend_all_entry: bool,
    pub all_entry_label: String,
    pub anonymous_viewer_name: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for EngineOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            policy: cfg.compose.sections.clone(),
            advance_policy: cfg.traversal.advance_policy,
            prepend_all_entry: cfg.associations.prepend_all_entry,
            all_entry_label: cfg.associations.all_entry_label.clone(),
            anonymous_viewer_name: cfg.session.anonymous_viewer_name.clone(),
        }
    }
}

// ──────────────────── engine ────────────────────

pub struct FeedEngine {
    options: EngineOptions,
    store: SectionDataStore,
    reconciler: SnapshotReconciler,
    selection: SelectionController,
    traversal: UnreadTraversalController,
    session: Arc<dyn SessionProvider>,
    /// Bumped by every load and sign-out; list answers from older loads are
    /// stale.
    load_generation: u64,
    bus: EventBus,
    logger: Option<ActivityLoggerHandle>,
}

impl FeedEngine {
    #[must_use]
    pub fn new(options: EngineOptions, session: Arc<dyn SessionProvider>) -> Self {
        let traversal = UnreadTraversalController::new(options.advance_policy);
        Self {
            options,
            store: SectionDataStore::new(),
            reconciler: SnapshotReconciler::new(),
            selection: SelectionController::new(),
            traversal,
            session,
            load_generation: 0,
            bus: EventBus::new(),
            logger: None,
        }
    }

    #[must_use]
    pub fn with_logger(mut self, logger: ActivityLoggerHandle) -> Self {
        self.logger = Some(logger);
        self
    }

    // ── read side ──

    /// Receive every event published after this call.
    pub fn subscribe(&mut self) -> Receiver<EngineEvent> {
        self.bus.subscribe()
    }

    /// Freshly composed model for the current store contents.
    #[must_use]
    pub fn composed_sections(&self) -> Vec<ComposedSection> {
        let viewer_name = self.viewer_name();
        compose(
            &self.store,
            &ComposeContext {
                policy: &self.options.policy,
                viewer_name: &viewer_name,
            },
        )
    }

    #[must_use]
    pub const fn store(&self) -> &SectionDataStore {
        &self.store
    }

    #[must_use]
    pub const fn options(&self) -> &EngineOptions {
        &self.options
    }

    #[must_use]
    pub const fn load_generation(&self) -> u64 {
        self.load_generation
    }

    #[must_use]
    pub const fn selection_epoch(&self) -> u64 {
        self.selection.epoch()
    }

    #[must_use]
    pub const fn traversal(&self) -> &UnreadTraversalController {
        &self.traversal
    }

    #[must_use]
    pub const fn traversal_state(&self) -> TraversalState {
        self.traversal.state()
    }

    #[must_use]
    pub fn current_item(&self) -> Option<AnnouncementEntity> {
        self.traversal.current_item()
    }

    #[must_use]
    pub fn viewer_name(&self) -> String {
        self.session
            .viewer_name()
            .unwrap_or_else(|| self.options.anonymous_viewer_name.clone())
    }

    /// Filter key of the selected association, `All` when nothing is selected.
    #[must_use]
    pub fn current_filter(&self) -> FilterKey {
        self.store
            .selected_association()
            .map_or(FilterKey::All, |a| a.filter_key())
    }

    // ── update ──

    /// Apply one message. Returns the backend work it requires.
    ///
    /// Fetch failures and stale completions are absorbed (published or
    /// logged). User intents that cannot be honored and failed
    /// acknowledgments are returned as errors with the engine unchanged.
    pub fn update(&mut self, msg: FeedMsg) -> Result<FeedCmd> {
        match msg {
            FeedMsg::Load => Ok(self.load()),
            FeedMsg::SelectAssociation(index) => self.select_association(index),
            FeedMsg::CancelSelection => {
                self.selection.cancel();
                Ok(FeedCmd::None)
            }
            FeedMsg::StartTraversal => Ok(self.start_traversal()),
            FeedMsg::AdvanceTraversal => self.advance_traversal(),
            FeedMsg::ExitTraversal => {
                self.traversal.exit();
                Ok(FeedCmd::None)
            }
            FeedMsg::AssociationsLoaded { generation, result } => {
                if self.is_stale_load("association list", generation) {
                    return Ok(FeedCmd::None);
                }
                Ok(self.on_associations(result))
            }
            FeedMsg::BookmarksLoaded { generation, result } => {
                if !self.is_stale_load("bookmarks", generation) {
                    self.on_bookmarks(result);
                }
                Ok(FeedCmd::None)
            }
            FeedMsg::AnnouncementsLoaded { epoch, result } => {
                self.on_join_member(epoch, JoinMember::Announcements(result));
                Ok(FeedCmd::None)
            }
            FeedMsg::MissedDigestLoaded { epoch, result } => {
                self.on_join_member(epoch, JoinMember::MissedDigest(result));
                Ok(FeedCmd::None)
            }
            FeedMsg::UnreadQueueLoaded { session, result } => {
                self.on_unread_queue(session, result);
                Ok(FeedCmd::None)
            }
            FeedMsg::ReadAcknowledged {
                session,
                id,
                result,
            } => self.on_read_acknowledged(session, id, result),
            FeedMsg::SessionChanged(change) => Ok(self.on_session_change(change)),
        }
    }

    fn load(&mut self) -> FeedCmd {
        self.load_generation += 1;
        if !self.session.is_signed_in() {
            self.publish(&[]);
            return FeedCmd::None;
        }

        let generation = self.load_generation;
        let mut cmds = vec![
            FeedCmd::FetchAssociations { generation },
            FeedCmd::FetchBookmarks { generation },
        ];
        match self.store.selected_association() {
            Some(selected) if !selected.is_registered => {
                self.selection.cancel();
            }
            selected => {
                let key = selected.map_or(FilterKey::All, |a| a.filter_key());
                cmds.extend(self.open_join(key));
            }
        }
        self.publish(&[]);
        FeedCmd::batch(cmds)
    }

    fn is_stale_load(&self, what: &str, generation: u64) -> bool {
        if generation == self.load_generation {
            return false;
        }
        self.log(ActivityEvent::StaleDiscarded {
            details: format!(
                "{what} for load {generation} (current {})",
                self.load_generation
            ),
        });
        true
    }

    fn open_join(&mut self, key: FilterKey) -> [FeedCmd; 2] {
        let epoch = self.selection.open_join(key);
        [
            FeedCmd::FetchAnnouncements { epoch, key },
            FeedCmd::FetchMissedDigest { epoch, key },
        ]
    }

    fn select_association(&mut self, index: usize) -> Result<FeedCmd> {
        let outcome = self.selection.select_association(&mut self.store, index)?;
        match outcome {
            SelectionOutcome::ClearedUnregistered { index } => {
                let key = self.current_filter();
                self.announce_selection(index, key, false);
                self.publish(&[
                    SectionId::AssociationList,
                    SectionId::AnnouncementFeed,
                    SectionId::MissedDigest,
                ]);
                Ok(FeedCmd::None)
            }
            SelectionOutcome::FetchRequested { index, epoch, key } => {
                self.announce_selection(index, key, true);
                self.publish(&[SectionId::AssociationList]);
                Ok(FeedCmd::Batch(vec![
                    FeedCmd::FetchAnnouncements { epoch, key },
                    FeedCmd::FetchMissedDigest { epoch, key },
                ]))
            }
        }
    }

    fn announce_selection(&mut self, index: usize, key: FilterKey, registered: bool) {
        self.log(ActivityEvent::SelectionChanged {
            index,
            filter: key,
            epoch: self.selection.epoch(),
            registered,
        });
        self.bus.publish(&EngineEvent::SelectionChanged {
            index,
            key,
            registered,
        });
    }

    /// Store the fetched list, then make the feed and digest follow the
    /// selection it ends up with.
    fn on_associations(
        &mut self,
        result: std::result::Result<Vec<AssociationEntity>, FetchError>,
    ) -> FeedCmd {
        let fetched = match result {
            Ok(fetched) => fetched,
            Err(error) => {
                self.fetch_failed(SectionId::AssociationList, error);
                return FeedCmd::None;
            }
        };
        let previous = self.store.associations().unwrap_or_default();
        let normalized = self.normalize_associations(fetched, &previous);
        self.store.set_items(SectionContent::Associations(normalized));

        match self.selection.follow_selection(&mut self.store) {
            None => {
                self.publish(&[SectionId::AssociationList]);
                FeedCmd::None
            }
            Some(SelectionOutcome::ClearedUnregistered { .. }) => {
                self.publish(&[
                    SectionId::AssociationList,
                    SectionId::AnnouncementFeed,
                    SectionId::MissedDigest,
                ]);
                FeedCmd::None
            }
            Some(SelectionOutcome::FetchRequested { epoch, key, .. }) => {
                self.publish(&[SectionId::AssociationList]);
                FeedCmd::Batch(vec![
                    FeedCmd::FetchAnnouncements { epoch, key },
                    FeedCmd::FetchMissedDigest { epoch, key },
                ])
            }
        }
    }

    /// Prepend the "all" entry when configured and carry the selection over
    /// by identity; otherwise select the first entry.
    fn normalize_associations(
        &self,
        fetched: Vec<AssociationEntity>,
        previous: &[AssociationEntity],
    ) -> Vec<AssociationEntity> {
        let mut list = fetched;
        if self.options.prepend_all_entry && !list.iter().any(AssociationEntity::is_all_entry) {
            list.insert(0, AssociationEntity::all(self.options.all_entry_label.clone()));
        }

        let carried = previous
            .iter()
            .find(|a| a.is_selected)
            .and_then(|sel| {
                list.iter()
                    .position(|a| a.kind == sel.kind && a.name == sel.name)
            });
        let target = carried.or_else(|| selected_index(&list)).unwrap_or(0);
        list.iter()
            .enumerate()
            .map(|(i, a)| a.with_selected(i == target))
            .collect()
    }

    fn on_bookmarks(&mut self, result: std::result::Result<Vec<BookmarkEntity>, FetchError>) {
        match result {
            Ok(items) => {
                self.store.set_items(SectionContent::Bookmarks(items));
                self.publish(&[SectionId::Bookmarks, SectionId::EmptyBookmarksPlaceholder]);
            }
            Err(error) => self.fetch_failed(SectionId::Bookmarks, error),
        }
    }

    fn on_join_member(&mut self, epoch: u64, member: JoinMember) {
        match self.selection.deliver(epoch, member) {
            JoinProgress::Stale { epoch, current } => {
                self.log(ActivityEvent::StaleDiscarded {
                    details: format!("join result for epoch {epoch} (current {current})"),
                });
            }
            JoinProgress::Waiting => {}
            JoinProgress::Complete(joined) => {
                let unread = joined.missed_count.as_ref().ok().map(|count| *count > 0);
                let viewer_name = self.viewer_name();
                let report = joined.apply_to(&mut self.store, &viewer_name);
                let mut targets = report.updated;
                if let Some(has_unread) = unread {
                    if self.set_selected_unread(has_unread) {
                        targets.push(SectionId::AssociationList);
                    }
                }
                self.publish(&targets);
                for (section, error) in report.failed {
                    self.fetch_failed(section, error);
                }
            }
        }
    }

    fn start_traversal(&mut self) -> FeedCmd {
        let key = self.current_filter();
        let session = self.traversal.start(key);
        FeedCmd::FetchUnreadQueue { session, key }
    }

    fn on_unread_queue(
        &mut self,
        session: u64,
        result: std::result::Result<UnreadQueuePayload, FetchError>,
    ) {
        let fetch_error = result.as_ref().err().cloned();
        match self.traversal.on_queue_loaded(session, result) {
            Ok(step) => {
                let filter = self.traversal.filter().unwrap_or_default();
                let queued = self.traversal.queue().map_or(0, |q| q.items.len());
                let remaining = match step {
                    TraversalStep::Presenting { remaining, .. }
                    | TraversalStep::Exhausted { remaining } => remaining,
                };
                self.log(ActivityEvent::TraversalStarted {
                    filter,
                    session,
                    queued,
                    remaining,
                });
                self.bus.publish(&EngineEvent::TraversalStarted {
                    filter,
                    queued,
                    remaining,
                });
                if matches!(step, TraversalStep::Exhausted { .. }) {
                    self.on_exhausted(filter);
                }
            }
            Err(FeedError::StaleResultDiscarded { details }) => {
                self.log(ActivityEvent::StaleDiscarded { details });
            }
            Err(other) => match fetch_error {
                Some(error) => self.fetch_failed(SectionId::AnnouncementFeed, error),
                None => self.log_error(&other),
            },
        }
    }

    fn advance_traversal(&mut self) -> Result<FeedCmd> {
        match self.traversal.begin_advance()? {
            AdvanceRequest::Acknowledge { session, id } => {
                Ok(FeedCmd::AcknowledgeRead { session, id })
            }
            AdvanceRequest::Coalesced => Ok(FeedCmd::None),
        }
    }

    fn on_read_acknowledged(
        &mut self,
        session: u64,
        id: AnnouncementId,
        result: std::result::Result<(), FetchError>,
    ) -> Result<FeedCmd> {
        let outcome = match self.traversal.complete_advance(session, id, result) {
            Ok(outcome) => outcome,
            Err(FeedError::StaleResultDiscarded { details }) => {
                self.log(ActivityEvent::StaleDiscarded { details });
                return Ok(FeedCmd::None);
            }
            Err(error) => {
                if let FeedError::AcknowledgeFailed { id, .. } = &error {
                    self.log(ActivityEvent::AcknowledgeFailed {
                        id: *id,
                        message: error.to_string(),
                    });
                }
                return Err(error);
            }
        };

        let filter = self.traversal.filter().unwrap_or_default();
        let (cursor, remaining) = match outcome.step {
            TraversalStep::Presenting { cursor, remaining } => (cursor, remaining),
            TraversalStep::Exhausted { remaining } => {
                (self.traversal.cursor().unwrap_or_default(), remaining)
            }
        };
        self.log(ActivityEvent::ReadAcknowledged {
            id,
            filter,
            cursor,
            remaining,
        });
        self.bus.publish(&EngineEvent::TraversalAdvanced {
            acknowledged: id,
            cursor,
            remaining,
        });
        self.mirror_remaining(filter, remaining);
        if matches!(outcome.step, TraversalStep::Exhausted { .. }) {
            self.on_exhausted(filter);
        }

        Ok(outcome
            .follow_up
            .map_or(FeedCmd::None, |id| FeedCmd::AcknowledgeRead {
                session: self.traversal.session(),
                id,
            }))
    }

    /// Keep the digest count in step with the traversal while both describe
    /// the same filter.
    fn mirror_remaining(&mut self, filter: FilterKey, remaining: u32) {
        if filter != self.current_filter() || !self.store.is_present(SectionId::MissedDigest) {
            return;
        }
        self.store
            .set_items(SectionContent::MissedDigest(MissedDigestEntity {
                viewer_name: self.viewer_name(),
                missed_count: remaining,
            }));
        self.publish(&[SectionId::MissedDigest]);
    }

    fn on_exhausted(&mut self, filter: FilterKey) {
        if filter == self.current_filter() && self.set_selected_unread(false) {
            self.publish(&[SectionId::AssociationList]);
        }
        self.log(ActivityEvent::TraversalExhausted {
            filter,
            session: self.traversal.session(),
        });
        self.bus.publish(&EngineEvent::TraversalExhausted { filter });
    }

    /// Returns `true` when the flag actually changed.
    fn set_selected_unread(&mut self, has_unread: bool) -> bool {
        let Some(list) = self.store.associations() else {
            return false;
        };
        let Some(index) = selected_index(&list) else {
            return false;
        };
        if list[index].has_unread == has_unread {
            return false;
        }
        let next = list
            .iter()
            .enumerate()
            .map(|(i, a)| if i == index { a.with_unread(has_unread) } else { a.clone() })
            .collect();
        self.store.set_items(SectionContent::Associations(next));
        true
    }

    fn on_session_change(&mut self, change: SessionChange) -> FeedCmd {
        match change {
            SessionChange::SignedIn { .. } => {
                self.log(ActivityEvent::SessionChanged { signed_in: true });
                self.load()
            }
            SessionChange::ViewerRenamed { viewer_name } => {
                if let Some(mut digest) = self.store.missed_digest() {
                    digest.viewer_name = viewer_name;
                    self.store.set_items(SectionContent::MissedDigest(digest));
                }
                self.publish_patch();
                FeedCmd::None
            }
            SessionChange::SignedOut => {
                self.log(ActivityEvent::SessionChanged { signed_in: false });
                self.load_generation += 1;
                self.selection.reset();
                self.traversal.exit();
                self.store.clear();
                let next = self.composed_sections();
                let update = self.reconciler.rebuild(next);
                self.emit_render(update);
                FeedCmd::None
            }
        }
    }

    // ── publishing ──

    /// Publish the sections named in `targets`.
    ///
    /// A changed layout or header yields one full rebuild; otherwise each
    /// changed target gets a targeted replace and siblings are untouched.
    fn publish(&mut self, targets: &[SectionId]) {
        let next = self.composed_sections();
        let current = self.reconciler.current().map(<[ComposedSection]>::to_vec);
        let Some(current) = current.filter(|_| self.reconciler.same_layout(&next)) else {
            let update = self.reconciler.rebuild(next);
            self.emit_render(update);
            return;
        };

        let headers_changed = current
            .iter()
            .zip(&next)
            .any(|(old, new)| old.viewer_name != new.viewer_name);
        if headers_changed {
            let update = self.reconciler.rebuild(next);
            self.emit_render(update);
            return;
        }

        for section in targets {
            let Some(fresh) = next.iter().find(|s| s.id == *section) else {
                continue;
            };
            if current.iter().any(|s| s == fresh) {
                continue;
            }
            match self.reconciler.replace_section(*section, fresh.items.clone()) {
                Some(update) => self.emit_render(update),
                None => {
                    let update = self.reconciler.rebuild(next);
                    self.emit_render(update);
                    return;
                }
            }
        }
    }

    /// Publish everything that changed as one patch (or rebuild).
    pub fn publish_patch(&mut self) {
        let next = self.composed_sections();
        if let Some(update) = self.reconciler.reconcile(next) {
            self.emit_render(update);
        }
    }

    fn emit_render(&mut self, update: RenderUpdate) {
        self.bus.publish(&EngineEvent::Render { update });
    }

    fn fetch_failed(&mut self, section: SectionId, error: FetchError) {
        self.log(ActivityEvent::FetchFailed {
            section,
            message: error.to_string(),
        });
        self.bus.publish(&EngineEvent::FetchFailed { section, error });
    }

    fn log_error(&self, error: &FeedError) {
        self.log(ActivityEvent::Error {
            code: error.code().to_string(),
            message: error.to_string(),
        });
    }

    fn log(&self, event: ActivityEvent) {
        if let Some(logger) = &self.logger {
            logger.send(event);
        }
    }
}

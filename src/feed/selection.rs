//! Single-select over the association list and the correlated re-fetch.
//!
//! Selecting a registered association opens a *join*: the feed and the
//! missed-digest count are fetched under a fresh epoch and nothing is
//! published until both have answered. Results tagged with an older epoch
//! are stale and must be dropped.

#![allow(missing_docs)]

use super::backend::FetchError;
use super::model::{
    AnnouncementEntity, FilterKey, MissedDigestEntity, SectionContent, SectionId, select_only,
    selected_index,
};
use super::store::SectionDataStore;
use crate::core::errors::{FeedError, Result};

/// What a successful `select_association` set in motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// The selected association is unregistered; the feed and digest were
    /// cleared locally and no fetch is needed.
    ClearedUnregistered { index: usize },
    /// Feed and digest fetches must be issued under `epoch`.
    FetchRequested {
        index: usize,
        epoch: u64,
        key: FilterKey,
    },
}

/// One member of the feed + digest join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinMember {
    Announcements(std::result::Result<Vec<AnnouncementEntity>, FetchError>),
    MissedDigest(std::result::Result<u32, FetchError>),
}

/// Progress of the join after one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinProgress {
    /// The delivery belongs to a superseded or cancelled epoch.
    Stale { epoch: u64, current: u64 },
    /// The other member has not answered yet.
    Waiting,
    /// Both members answered.
    Complete(JoinedResults),
}

/// Both answers of a completed join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedResults {
    pub epoch: u64,
    pub key: FilterKey,
    pub announcements: std::result::Result<Vec<AnnouncementEntity>, FetchError>,
    pub missed_count: std::result::Result<u32, FetchError>,
}

/// Sections written and sections left untouched after applying a join.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinReport {
    pub updated: Vec<SectionId>,
    pub failed: Vec<(SectionId, FetchError)>,
}

impl JoinedResults {
    /// Write the successful members to the store. Failed members leave their
    /// section exactly as it was.
    pub fn apply_to(self, store: &mut SectionDataStore, viewer_name: &str) -> JoinReport {
        let mut report = JoinReport::default();
        match self.announcements {
            Ok(items) => {
                store.set_items(SectionContent::Announcements(items));
                report.updated.push(SectionId::AnnouncementFeed);
            }
            Err(error) => report.failed.push((SectionId::AnnouncementFeed, error)),
        }
        match self.missed_count {
            Ok(missed_count) => {
                store.set_items(SectionContent::MissedDigest(MissedDigestEntity {
                    viewer_name: viewer_name.to_string(),
                    missed_count,
                }));
                report.updated.push(SectionId::MissedDigest);
            }
            Err(error) => report.failed.push((SectionId::MissedDigest, error)),
        }
        report
    }
}

#[derive(Debug, Clone)]
struct PendingJoin {
    epoch: u64,
    key: FilterKey,
    announcements: Option<std::result::Result<Vec<AnnouncementEntity>, FetchError>>,
    missed_count: Option<std::result::Result<u32, FetchError>>,
}

/// Owns the selection epoch and the buffered half of an open join.
#[derive(Debug, Clone, Default)]
pub struct SelectionController {
    epoch: u64,
    pending: Option<PendingJoin>,
    /// Filter of the open or last completed join; `None` once the feed was
    /// cleared for an unregistered association.
    joined_key: Option<FilterKey>,
    /// Set by the first join or clear; list refreshes before that are not
    /// followed.
    following: bool,
}

impl SelectionController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current selection epoch.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub const fn joined_key(&self) -> Option<FilterKey> {
        self.joined_key
    }

    /// Whether a join is waiting for answers.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Select the association at `index`.
    ///
    /// Out-of-range indices leave the store untouched. Any open join is
    /// superseded.
    pub fn select_association(
        &mut self,
        store: &mut SectionDataStore,
        index: usize,
    ) -> Result<SelectionOutcome> {
        let associations = store.associations().unwrap_or_default();
        let next = select_only(&associations, index).ok_or(FeedError::InvalidSelection {
            index,
            len: associations.len(),
        })?;
        let selected = next[index].clone();
        store.set_items(SectionContent::Associations(next));

        if !selected.is_registered {
            self.clear_unregistered(store);
            return Ok(SelectionOutcome::ClearedUnregistered { index });
        }

        let key = selected.filter_key();
        let epoch = self.open_join(key);
        Ok(SelectionOutcome::FetchRequested { index, epoch, key })
    }

    /// Re-align the join with whatever the store now has selected, after the
    /// association list itself was replaced.
    ///
    /// Nothing happens before the first join, or when the join already
    /// describes the selected filter.
    pub fn follow_selection(&mut self, store: &mut SectionDataStore) -> Option<SelectionOutcome> {
        if !self.following {
            return None;
        }
        let associations = store.associations()?;
        let index = selected_index(&associations)?;
        let selected = &associations[index];

        if !selected.is_registered {
            if self.joined_key.is_none() {
                return None;
            }
            self.clear_unregistered(store);
            return Some(SelectionOutcome::ClearedUnregistered { index });
        }
        let key = selected.filter_key();
        if self.joined_key == Some(key) {
            return None;
        }
        let epoch = self.open_join(key);
        Some(SelectionOutcome::FetchRequested { index, epoch, key })
    }

    /// Forget the join and its filter.
    pub fn reset(&mut self) {
        self.supersede();
        self.joined_key = None;
        self.following = false;
    }

    fn clear_unregistered(&mut self, store: &mut SectionDataStore) {
        self.supersede();
        self.joined_key = None;
        self.following = true;
        store.remove_items(SectionId::AnnouncementFeed);
        store.remove_items(SectionId::MissedDigest);
    }

    /// Open a join for `key` without changing the selection (initial load,
    /// pull-to-refresh). Returns the new epoch.
    pub fn open_join(&mut self, key: FilterKey) -> u64 {
        self.supersede();
        self.joined_key = Some(key);
        self.following = true;
        self.pending = Some(PendingJoin {
            epoch: self.epoch,
            key,
            announcements: None,
            missed_count: None,
        });
        self.epoch
    }

    /// Abandon any open join. Late answers become stale.
    ///
    /// Returns `true` if a join was open.
    pub fn cancel(&mut self) -> bool {
        let was_pending = self.pending.is_some();
        self.supersede();
        was_pending
    }

    /// Feed one answer into the join.
    pub fn deliver(&mut self, epoch: u64, member: JoinMember) -> JoinProgress {
        let Some(pending) = self.pending.as_mut().filter(|p| p.epoch == epoch) else {
            return JoinProgress::Stale {
                epoch,
                current: self.epoch,
            };
        };

        match member {
            JoinMember::Announcements(result) => pending.announcements = Some(result),
            JoinMember::MissedDigest(result) => pending.missed_count = Some(result),
        }

        if pending.announcements.is_none() || pending.missed_count.is_none() {
            return JoinProgress::Waiting;
        }

        match self.pending.take() {
            Some(PendingJoin {
                epoch,
                key,
                announcements: Some(announcements),
                missed_count: Some(missed_count),
            }) => JoinProgress::Complete(JoinedResults {
                epoch,
                key,
                announcements,
                missed_count,
            }),
            _ => JoinProgress::Waiting,
        }
    }

    fn supersede(&mut self) {
        self.epoch += 1;
        self.pending = None;
    }
}

//! In-memory backend loaded from a JSON fixture.
//!
//! Drives the CLI and the integration tests. Calls are counted per kind and
//! failures can be injected per kind or per acknowledged id.

#![allow(missing_docs)]

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::backend::{FeedBackend, FetchError, UnreadQueuePayload};
use super::model::{
    AnnouncementEntity, AnnouncementId, AssociationEntity, BookmarkEntity, FilterKey,
};
use crate::core::errors::{FeedError, Result};

/// Backend operations, for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureCall {
    Associations,
    Announcements,
    MissedDigest,
    Bookmarks,
    UnreadQueue,
    AcknowledgeRead,
}

/// Unread ids for one filter plus the server's category count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadFixture {
    pub ids: Vec<AnnouncementId>,
    /// Defaults to `ids.len()`.
    #[serde(default)]
    pub count: Option<u32>,
}

/// Fixture document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureData {
    pub viewer_name: Option<String>,
    pub associations: Vec<AssociationEntity>,
    pub announcements: BTreeMap<FilterKey, Vec<AnnouncementEntity>>,
    pub missed_counts: BTreeMap<FilterKey, u32>,
    pub bookmarks: Vec<BookmarkEntity>,
    pub unread: BTreeMap<FilterKey, UnreadFixture>,
    /// Calls that always fail with a transport error.
    pub failing: BTreeSet<FixtureCall>,
    /// Ids whose next acknowledgment fails; each entry is consumed once.
    pub ack_failures: Vec<AnnouncementId>,
}

impl FixtureData {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| FeedError::Serialization {
            context: "fixture",
            details: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| FeedError::io(path, source))?;
        Self::from_json(&raw)
    }

    fn find_announcement(&self, id: AnnouncementId) -> Option<&AnnouncementEntity> {
        self.announcements
            .values()
            .flatten()
            .find(|a| a.id == id)
    }
}

#[derive(Debug, Default)]
struct FixtureState {
    data: FixtureData,
    calls: BTreeMap<FixtureCall, usize>,
}

/// [`FeedBackend`] over a [`FixtureData`] document.
#[derive(Debug, Default)]
pub struct FixtureBackend {
    state: Mutex<FixtureState>,
}

impl FixtureBackend {
    #[must_use]
    pub fn new(data: FixtureData) -> Self {
        Self {
            state: Mutex::new(FixtureState {
                data,
                calls: BTreeMap::new(),
            }),
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        FixtureData::from_json(raw).map(Self::new)
    }

    pub fn load(path: &Path) -> Result<Self> {
        FixtureData::load(path).map(Self::new)
    }

    /// Copy of the current fixture contents.
    #[must_use]
    pub fn data(&self) -> FixtureData {
        self.state.lock().data.clone()
    }

    #[must_use]
    pub fn calls(&self, call: FixtureCall) -> usize {
        self.state.lock().calls.get(&call).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.values().sum()
    }

    /// Make every later `call` fail until [`Self::recover`].
    pub fn fail(&self, call: FixtureCall) {
        self.state.lock().data.failing.insert(call);
    }

    pub fn recover(&self, call: FixtureCall) {
        self.state.lock().data.failing.remove(&call);
    }

    /// Fail the next acknowledgment of `id` once.
    pub fn fail_ack_once(&self, id: AnnouncementId) {
        self.state.lock().data.ack_failures.push(id);
    }

    /// Count `call` and apply injected failures.
    fn enter<T>(
        &self,
        call: FixtureCall,
        answer: impl FnOnce(&mut FixtureData) -> std::result::Result<T, FetchError>,
    ) -> std::result::Result<T, FetchError> {
        let mut state = self.state.lock();
        *state.calls.entry(call).or_default() += 1;
        if state.data.failing.contains(&call) {
            return Err(FetchError::Transport(format!("injected {call:?} failure")));
        }
        answer(&mut state.data)
    }
}

impl FeedBackend for FixtureBackend {
    fn fetch_association_list(&self) -> std::result::Result<Vec<AssociationEntity>, FetchError> {
        self.enter(FixtureCall::Associations, |data| Ok(data.associations.clone()))
    }

    fn fetch_announcements(
        &self,
        key: FilterKey,
    ) -> std::result::Result<Vec<AnnouncementEntity>, FetchError> {
        self.enter(FixtureCall::Announcements, |data| {
            Ok(data.announcements.get(&key).cloned().unwrap_or_default())
        })
    }

    fn fetch_missed_digest(&self, key: FilterKey) -> std::result::Result<u32, FetchError> {
        self.enter(FixtureCall::MissedDigest, |data| {
            Ok(data.missed_counts.get(&key).copied().unwrap_or(0))
        })
    }

    fn fetch_bookmarks(&self) -> std::result::Result<Vec<BookmarkEntity>, FetchError> {
        self.enter(FixtureCall::Bookmarks, |data| Ok(data.bookmarks.clone()))
    }

    fn fetch_unread_queue(
        &self,
        key: FilterKey,
    ) -> std::result::Result<UnreadQueuePayload, FetchError> {
        self.enter(FixtureCall::UnreadQueue, |data| {
            let unread = data.unread.get(&key).cloned().unwrap_or_default();
            let items = unread
                .ids
                .iter()
                .filter_map(|id| data.find_announcement(*id).cloned())
                .collect();
            let count = unread
                .count
                .unwrap_or_else(|| u32::try_from(unread.ids.len()).unwrap_or(u32::MAX));
            Ok(UnreadQueuePayload { items, count })
        })
    }

    fn acknowledge_read(&self, id: AnnouncementId) -> std::result::Result<(), FetchError> {
        self.enter(FixtureCall::AcknowledgeRead, |data| {
            if let Some(pos) = data.ack_failures.iter().position(|f| *f == id) {
                data.ack_failures.remove(pos);
                return Err(FetchError::Rejected(503));
            }
            for (key, unread) in &mut data.unread {
                let before = unread.ids.len();
                unread.ids.retain(|unread_id| *unread_id != id);
                if unread.ids.len() < before {
                    if let Some(count) = unread.count.as_mut() {
                        *count = count.saturating_sub(1);
                    }
                    if let Some(missed) = data.missed_counts.get_mut(key) {
                        *missed = missed.saturating_sub(1);
                    }
                }
            }
            Ok(())
        })
    }
}

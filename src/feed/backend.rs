//! Fetch collaborator contract.
//!
//! The engine never talks to the network itself. Hosts implement
//! [`FeedBackend`] and the runtime turns its results into engine messages.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::model::{
    AnnouncementEntity, AnnouncementId, AssociationEntity, BookmarkEntity, FilterKey,
};

/// Typed failure of one backend call. Transport detail stays opaque.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "details", rename_all = "snake_case")]
pub enum FetchError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("request rejected with status {0}")]
    Rejected(u16),
    #[error("session is not authorized")]
    Unauthorized,
}

/// Unread queue for one filter: items in traversal order plus the
/// server's category count (which may differ from the item count).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadQueuePayload {
    pub items: Vec<AnnouncementEntity>,
    pub count: u32,
}

impl UnreadQueuePayload {
    #[must_use]
    pub fn ids(&self) -> Vec<AnnouncementId> {
        self.items.iter().map(|a| a.id).collect()
    }
}

/// Network-facing operations the engine depends on.
pub trait FeedBackend {
    fn fetch_association_list(&self) -> Result<Vec<AssociationEntity>, FetchError>;

    fn fetch_announcements(&self, key: FilterKey) -> Result<Vec<AnnouncementEntity>, FetchError>;

    /// Number of announcements the viewer has not read under `key`.
    fn fetch_missed_digest(&self, key: FilterKey) -> Result<u32, FetchError>;

    fn fetch_bookmarks(&self) -> Result<Vec<BookmarkEntity>, FetchError>;

    fn fetch_unread_queue(&self, key: FilterKey) -> Result<UnreadQueuePayload, FetchError>;

    /// Mark one announcement read server-side.
    fn acknowledge_read(&self, id: AnnouncementId) -> Result<(), FetchError>;
}

impl<B: FeedBackend + ?Sized> FeedBackend for &B {
    fn fetch_association_list(&self) -> Result<Vec<AssociationEntity>, FetchError> {
        (**self).fetch_association_list()
    }

    fn fetch_announcements(&self, key: FilterKey) -> Result<Vec<AnnouncementEntity>, FetchError> {
        (**self).fetch_announcements(key)
    }

    fn fetch_missed_digest(&self, key: FilterKey) -> Result<u32, FetchError> {
        (**self).fetch_missed_digest(key)
    }

    fn fetch_bookmarks(&self) -> Result<Vec<BookmarkEntity>, FetchError> {
        (**self).fetch_bookmarks()
    }

    fn fetch_unread_queue(&self, key: FilterKey) -> Result<UnreadQueuePayload, FetchError> {
        (**self).fetch_unread_queue(key)
    }

    fn acknowledge_read(&self, id: AnnouncementId) -> Result<(), FetchError> {
        (**self).acknowledge_read(id)
    }
}

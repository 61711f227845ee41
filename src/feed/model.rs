//! Feed entities, section identifiers, and the per-section tagged unions.
//!
//! Entities are immutable values: every change derives a new collection
//! (see [`select_only`]) instead of mutating an entity in place.

#![allow(missing_docs)]

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ──────────────────── identifiers ────────────────────

/// Closed set of feed sections. Declaration order is display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionId {
    MissedDigest,
    AssociationList,
    AnnouncementFeed,
    Bookmarks,
    EmptyBookmarksPlaceholder,
}

impl SectionId {
    /// Every section, in display order.
    pub const ALL: [Self; 5] = [
        Self::MissedDigest,
        Self::AssociationList,
        Self::AnnouncementFeed,
        Self::Bookmarks,
        Self::EmptyBookmarksPlaceholder,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissedDigest => "missed_digest",
            Self::AssociationList => "association_list",
            Self::AnnouncementFeed => "announcement_feed",
            Self::Bookmarks => "bookmarks",
            Self::EmptyBookmarksPlaceholder => "empty_bookmarks_placeholder",
        }
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-assigned announcement identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnouncementId(pub u64);

impl fmt::Display for AnnouncementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Organizational level of an association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    General,
    College,
    Department,
}

/// Key the backend filters announcements, digests, and unread queues by.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FilterKey {
    #[default]
    All,
    General,
    College,
    Department,
}

impl FilterKey {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::General => "general",
            Self::College => "college",
            Self::Department => "department",
        }
    }
}

impl From<Option<AssociationKind>> for FilterKey {
    fn from(kind: Option<AssociationKind>) -> Self {
        match kind {
            None => Self::All,
            Some(AssociationKind::General) => Self::General,
            Some(AssociationKind::College) => Self::College,
            Some(AssociationKind::Department) => Self::Department,
        }
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────── entities ────────────────────

const fn default_true() -> bool {
    true
}

/// One entry of the association filter strip. `kind == None` is the "all" entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationEntity {
    pub name: String,
    #[serde(default)]
    pub logo_ref: Option<String>,
    #[serde(default)]
    pub kind: Option<AssociationKind>,
    #[serde(default)]
    pub is_selected: bool,
    #[serde(default)]
    pub has_unread: bool,
    #[serde(default = "default_true")]
    pub is_registered: bool,
}

impl AssociationEntity {
    /// The synthetic "all associations" entry.
    #[must_use]
    pub fn all(label: impl Into<String>) -> Self {
        Self {
            name: label.into(),
            logo_ref: None,
            kind: None,
            is_selected: false,
            has_unread: false,
            is_registered: true,
        }
    }

    #[must_use]
    pub fn filter_key(&self) -> FilterKey {
        FilterKey::from(self.kind)
    }

    #[must_use]
    pub const fn is_all_entry(&self) -> bool {
        self.kind.is_none()
    }

    #[must_use]
    pub fn with_selected(&self, is_selected: bool) -> Self {
        Self {
            is_selected,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_unread(&self, has_unread: bool) -> Self {
        Self {
            has_unread,
            ..self.clone()
        }
    }
}

/// A posted announcement. Identity is `id`; diffing compares the full value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncementEntity {
    pub id: AnnouncementId,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub image_refs: Vec<String>,
    pub posted_at: DateTime<Utc>,
    #[serde(default)]
    pub favorite_count: u32,
    #[serde(default)]
    pub bookmark_count: u32,
    #[serde(default)]
    pub watch_count: u32,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub is_bookmarked: bool,
    #[serde(default)]
    pub association_kind: Option<AssociationKind>,
}

/// A saved announcement shown in the bookmarks section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkEntity {
    #[serde(flatten)]
    pub post: AnnouncementEntity,
}

impl BookmarkEntity {
    #[must_use]
    pub const fn id(&self) -> AnnouncementId {
        self.post.id
    }
}

impl From<AnnouncementEntity> for BookmarkEntity {
    fn from(post: AnnouncementEntity) -> Self {
        Self { post }
    }
}

/// "You missed N announcements" banner. Never stored with a zero count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissedDigestEntity {
    pub viewer_name: String,
    pub missed_count: u32,
}

// ──────────────────── section content ────────────────────

/// What a section holds in the store, one variant per concrete entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "section", content = "items", rename_all = "snake_case")]
pub enum SectionContent {
    MissedDigest(MissedDigestEntity),
    Associations(Vec<AssociationEntity>),
    Announcements(Vec<AnnouncementEntity>),
    Bookmarks(Vec<BookmarkEntity>),
}

impl SectionContent {
    /// The section this content is stored under.
    #[must_use]
    pub const fn section(&self) -> SectionId {
        match self {
            Self::MissedDigest(_) => SectionId::MissedDigest,
            Self::Associations(_) => SectionId::AssociationList,
            Self::Announcements(_) => SectionId::AnnouncementFeed,
            Self::Bookmarks(_) => SectionId::Bookmarks,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::MissedDigest(digest) => usize::from(digest.missed_count > 0),
            Self::Associations(items) => items.len(),
            Self::Announcements(items) => items.len(),
            Self::Bookmarks(items) => items.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ──────────────────── display items ────────────────────

/// Why the announcement feed shows its synthetic empty item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyFeedReason {
    NoAnnouncements,
    Unregistered,
}

/// One row of a composed section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "item", rename_all = "snake_case")]
pub enum FeedItem {
    MissedDigest(MissedDigestEntity),
    Association(AssociationEntity),
    Announcement(AnnouncementEntity),
    EmptyFeed(EmptyFeedReason),
    Bookmark(BookmarkEntity),
    EmptyBookmarks,
}

/// Identity of a [`FeedItem`], independent of its mutable fields.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum ItemKey {
    MissedDigest,
    Association {
        kind: Option<AssociationKind>,
        name: String,
    },
    Announcement(AnnouncementId),
    EmptyFeed(EmptyFeedReason),
    Bookmark(AnnouncementId),
    EmptyBookmarks,
}

impl FeedItem {
    #[must_use]
    pub fn key(&self) -> ItemKey {
        match self {
            Self::MissedDigest(_) => ItemKey::MissedDigest,
            Self::Association(a) => ItemKey::Association {
                kind: a.kind,
                name: a.name.clone(),
            },
            Self::Announcement(a) => ItemKey::Announcement(a.id),
            Self::EmptyFeed(reason) => ItemKey::EmptyFeed(*reason),
            Self::Bookmark(b) => ItemKey::Bookmark(b.id()),
            Self::EmptyBookmarks => ItemKey::EmptyBookmarks,
        }
    }

    /// True for the synthetic placeholder rows.
    #[must_use]
    pub const fn is_placeholder(&self) -> bool {
        matches!(self, Self::EmptyFeed(_) | Self::EmptyBookmarks)
    }
}

/// Derive a new association collection where only `index` is selected.
///
/// Returns `None` when `index` is out of range; the input is never touched.
#[must_use]
pub fn select_only(associations: &[AssociationEntity], index: usize) -> Option<Vec<AssociationEntity>> {
    if index >= associations.len() {
        return None;
    }
    Some(
        associations
            .iter()
            .enumerate()
            .map(|(i, a)| a.with_selected(i == index))
            .collect(),
    )
}

/// Index of the selected association, if any.
#[must_use]
pub fn selected_index(associations: &[AssociationEntity]) -> Option<usize> {
    associations.iter().position(|a| a.is_selected)
}

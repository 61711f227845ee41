//! Section composer: derives the ordered list of visible sections.
//!
//! `compose` is pure and total over [`SectionId::ALL`]. The policy table
//! decides which sections a screen hosts; the store contents decide which
//! hosted sections are visible and what they hold.

#![allow(missing_docs)]

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::model::{EmptyFeedReason, FeedItem, SectionContent, SectionId};
use super::store::SectionDataStore;

/// Which sections a screen hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComposePolicy {
    hosted: BTreeSet<SectionId>,
}

impl ComposePolicy {
    /// Every section.
    #[must_use]
    pub fn full() -> Self {
        Self::hosting(SectionId::ALL)
    }

    /// The announcement home screen: digest, association strip, feed.
    #[must_use]
    pub fn home() -> Self {
        Self::hosting([
            SectionId::MissedDigest,
            SectionId::AssociationList,
            SectionId::AnnouncementFeed,
        ])
    }

    /// The saved-items screen.
    #[must_use]
    pub fn bookmarks() -> Self {
        Self::hosting([SectionId::Bookmarks, SectionId::EmptyBookmarksPlaceholder])
    }

    #[must_use]
    pub fn hosting(sections: impl IntoIterator<Item = SectionId>) -> Self {
        Self {
            hosted: sections.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn hosts(&self, section: SectionId) -> bool {
        self.hosted.contains(&section)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosted.is_empty()
    }
}

impl Default for ComposePolicy {
    fn default() -> Self {
        Self::full()
    }
}

/// Inputs to composition besides the store.
#[derive(Debug, Clone, Copy)]
pub struct ComposeContext<'a> {
    pub policy: &'a ComposePolicy,
    /// Display name used by the digest and bookmarks headers.
    pub viewer_name: &'a str,
}

/// One visible section with its rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposedSection {
    pub id: SectionId,
    /// Header parameter for viewer-scoped sections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewer_name: Option<String>,
    pub items: Vec<FeedItem>,
}

impl ComposedSection {
    fn new(id: SectionId, items: Vec<FeedItem>) -> Self {
        Self {
            id,
            viewer_name: None,
            items,
        }
    }

    fn with_viewer(mut self, viewer_name: &str) -> Self {
        self.viewer_name = Some(viewer_name.to_string());
        self
    }
}

/// Derive the ordered, mutually exclusive visible sections.
#[must_use]
pub fn compose(store: &SectionDataStore, ctx: &ComposeContext<'_>) -> Vec<ComposedSection> {
    SectionId::ALL
        .into_iter()
        .filter(|id| ctx.policy.hosts(*id))
        .filter_map(|id| compose_section(store, id, ctx.viewer_name))
        .collect()
}

fn compose_section(
    store: &SectionDataStore,
    id: SectionId,
    viewer_name: &str,
) -> Option<ComposedSection> {
    match id {
        SectionId::MissedDigest => store.missed_digest().map(|digest| {
            ComposedSection::new(id, vec![FeedItem::MissedDigest(digest)]).with_viewer(viewer_name)
        }),
        SectionId::AssociationList => store.associations().map(|items| {
            ComposedSection::new(id, items.into_iter().map(FeedItem::Association).collect())
        }),
        SectionId::AnnouncementFeed => Some(ComposedSection::new(id, feed_items(store))),
        SectionId::Bookmarks => store
            .bookmarks()
            .filter(|items| !items.is_empty())
            .map(|items| {
                ComposedSection::new(id, items.into_iter().map(FeedItem::Bookmark).collect())
                    .with_viewer(viewer_name)
            }),
        SectionId::EmptyBookmarksPlaceholder => {
            let has_bookmarks = store
                .items(SectionId::Bookmarks)
                .is_some_and(|content| !content.is_empty());
            (!has_bookmarks)
                .then(|| ComposedSection::new(id, vec![FeedItem::EmptyBookmarks]))
        }
    }
}

fn feed_items(store: &SectionDataStore) -> Vec<FeedItem> {
    let unregistered = store
        .selected_association()
        .is_some_and(|a| !a.is_registered);
    if unregistered {
        return vec![FeedItem::EmptyFeed(EmptyFeedReason::Unregistered)];
    }
    match store.items(SectionId::AnnouncementFeed) {
        Some(SectionContent::Announcements(items)) if !items.is_empty() => {
            items.into_iter().map(FeedItem::Announcement).collect()
        }
        _ => vec![FeedItem::EmptyFeed(EmptyFeedReason::NoAnnouncements)],
    }
}

/// Section identifiers of a composed model, in order.
#[must_use]
pub fn section_ids(sections: &[ComposedSection]) -> Vec<SectionId> {
    sections.iter().map(|s| s.id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::model::fixtures::{announcement, association, association_strip};
    use crate::feed::model::{AssociationEntity, AssociationKind, BookmarkEntity, MissedDigestEntity};

    fn ctx(policy: &ComposePolicy) -> ComposeContext<'_> {
        ComposeContext {
            policy,
            viewer_name: "Park",
        }
    }

    #[test]
    fn lone_all_entry_with_empty_feed_on_home() {
        let mut store = SectionDataStore::new();
        store.set_items(SectionContent::Associations(vec![
            AssociationEntity::all("All").with_selected(true),
        ]));
        store.set_items(SectionContent::Announcements(Vec::new()));

        let policy = ComposePolicy::home();
        let sections = compose(&store, &ctx(&policy));
        assert_eq!(
            section_ids(&sections),
            vec![SectionId::AssociationList, SectionId::AnnouncementFeed]
        );
        assert_eq!(
            sections[1].items,
            vec![FeedItem::EmptyFeed(EmptyFeedReason::NoAnnouncements)]
        );
    }

    #[test]
    fn empty_bookmarks_choose_placeholder() {
        let mut store = SectionDataStore::new();
        store.set_items(SectionContent::Bookmarks(Vec::new()));
        let policy = ComposePolicy::full();
        let ids = section_ids(&compose(&store, &ctx(&policy)));
        assert!(ids.contains(&SectionId::EmptyBookmarksPlaceholder));
        assert!(!ids.contains(&SectionId::Bookmarks));
    }

    #[test]
    fn absent_bookmarks_choose_placeholder() {
        let store = SectionDataStore::new();
        let policy = ComposePolicy::bookmarks();
        let sections = compose(&store, &ctx(&policy));
        assert_eq!(
            section_ids(&sections),
            vec![SectionId::EmptyBookmarksPlaceholder]
        );
        assert_eq!(sections[0].items, vec![FeedItem::EmptyBookmarks]);
    }

    #[test]
    fn non_empty_bookmarks_win() {
        let mut store = SectionDataStore::new();
        store.set_items(SectionContent::Bookmarks(vec![BookmarkEntity::from(
            announcement(4),
        )]));
        let policy = ComposePolicy::bookmarks();
        let sections = compose(&store, &ctx(&policy));
        assert_eq!(section_ids(&sections), vec![SectionId::Bookmarks]);
        assert_eq!(sections[0].viewer_name.as_deref(), Some("Park"));
    }

    #[test]
    fn full_store_orders_sections() {
        let mut store = SectionDataStore::new();
        store.set_items(SectionContent::Bookmarks(vec![BookmarkEntity::from(
            announcement(9),
        )]));
        store.set_items(SectionContent::Announcements(vec![announcement(1)]));
        store.set_items(SectionContent::Associations(association_strip()));
        store.set_items(SectionContent::MissedDigest(MissedDigestEntity {
            viewer_name: "Park".to_string(),
            missed_count: 2,
        }));

        let policy = ComposePolicy::full();
        assert_eq!(
            section_ids(&compose(&store, &ctx(&policy))),
            vec![
                SectionId::MissedDigest,
                SectionId::AssociationList,
                SectionId::AnnouncementFeed,
                SectionId::Bookmarks,
            ]
        );
    }

    #[test]
    fn unregistered_selection_shows_unregistered_placeholder() {
        let mut store = SectionDataStore::new();
        let mut dept = association("Physics", Some(AssociationKind::Department));
        dept.is_registered = false;
        dept.is_selected = true;
        store.set_items(SectionContent::Associations(vec![
            AssociationEntity::all("All"),
            dept,
        ]));
        store.set_items(SectionContent::Announcements(vec![announcement(1)]));

        let policy = ComposePolicy::home();
        let sections = compose(&store, &ctx(&policy));
        let feed = sections
            .iter()
            .find(|s| s.id == SectionId::AnnouncementFeed)
            .unwrap();
        assert_eq!(
            feed.items,
            vec![FeedItem::EmptyFeed(EmptyFeedReason::Unregistered)]
        );
    }

    #[test]
    fn unhosted_sections_never_appear() {
        let mut store = SectionDataStore::new();
        store.set_items(SectionContent::Associations(association_strip()));
        let policy = ComposePolicy::hosting([SectionId::AssociationList]);
        assert_eq!(
            section_ids(&compose(&store, &ctx(&policy))),
            vec![SectionId::AssociationList]
        );
    }
}

//! Keyed section store: the single owner of every feed collection.
//!
//! A section is either *absent* (no opinion yet, never rendered) or
//! *present*, possibly empty. Readers always receive clones.

#![allow(missing_docs)]

use std::collections::{BTreeMap, HashSet};

use super::model::{
    AnnouncementEntity, AssociationEntity, BookmarkEntity, ItemKey, MissedDigestEntity,
    SectionContent, SectionId,
};

/// Section identifier → current content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionDataStore {
    sections: BTreeMap<SectionId, SectionContent>,
}

impl SectionDataStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the collection for `content.section()`.
    ///
    /// Duplicate identities are dropped (first occurrence wins). A digest with
    /// a zero count is stored as absent.
    pub fn set_items(&mut self, content: SectionContent) {
        let section = content.section();
        match content {
            SectionContent::MissedDigest(digest) if digest.missed_count == 0 => {
                self.sections.remove(&section);
            }
            SectionContent::Associations(items) => {
                let items = dedup_by(items, |a| ItemKey::Association {
                    kind: a.kind,
                    name: a.name.clone(),
                });
                self.sections
                    .insert(section, SectionContent::Associations(items));
            }
            SectionContent::Announcements(items) => {
                let items = dedup_by(items, |a| ItemKey::Announcement(a.id));
                self.sections
                    .insert(section, SectionContent::Announcements(items));
            }
            SectionContent::Bookmarks(items) => {
                let items = dedup_by(items, |b| ItemKey::Bookmark(b.id()));
                self.sections.insert(section, SectionContent::Bookmarks(items));
            }
            digest @ SectionContent::MissedDigest(_) => {
                self.sections.insert(section, digest);
            }
        }
    }

    /// Return `section` to the absent state. Returns the previous content.
    pub fn remove_items(&mut self, section: SectionId) -> Option<SectionContent> {
        self.sections.remove(&section)
    }

    /// Copy of the content stored for `section`.
    #[must_use]
    pub fn items(&self, section: SectionId) -> Option<SectionContent> {
        self.sections.get(&section).cloned()
    }

    #[must_use]
    pub fn is_present(&self, section: SectionId) -> bool {
        self.sections.contains_key(&section)
    }

    /// Drop every section.
    pub fn clear(&mut self) {
        self.sections.clear();
    }

    #[must_use]
    pub fn associations(&self) -> Option<Vec<AssociationEntity>> {
        match self.sections.get(&SectionId::AssociationList) {
            Some(SectionContent::Associations(items)) => Some(items.clone()),
            _ => None,
        }
    }

    #[must_use]
    pub fn announcements(&self) -> Option<Vec<AnnouncementEntity>> {
        match self.sections.get(&SectionId::AnnouncementFeed) {
            Some(SectionContent::Announcements(items)) => Some(items.clone()),
            _ => None,
        }
    }

    #[must_use]
    pub fn bookmarks(&self) -> Option<Vec<BookmarkEntity>> {
        match self.sections.get(&SectionId::Bookmarks) {
            Some(SectionContent::Bookmarks(items)) => Some(items.clone()),
            _ => None,
        }
    }

    #[must_use]
    pub fn missed_digest(&self) -> Option<MissedDigestEntity> {
        match self.sections.get(&SectionId::MissedDigest) {
            Some(SectionContent::MissedDigest(digest)) => Some(digest.clone()),
            _ => None,
        }
    }

    /// The currently selected association, if the list is present.
    #[must_use]
    pub fn selected_association(&self) -> Option<AssociationEntity> {
        match self.sections.get(&SectionId::AssociationList) {
            Some(SectionContent::Associations(items)) => {
                items.iter().find(|a| a.is_selected).cloned()
            }
            _ => None,
        }
    }
}

fn dedup_by<T>(items: Vec<T>, key: impl Fn(&T) -> ItemKey) -> Vec<T> {
    let mut seen = HashSet::with_capacity(items.len());
    items.into_iter().filter(|item| seen.insert(key(item))).collect()
}

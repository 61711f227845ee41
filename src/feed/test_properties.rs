//! Property-based tests for the feed invariants.
//!
//! Arbitrary store contents, policies, selections, and acknowledgment
//! outcomes must never break section exclusivity, single selection, or the
//! traversal counting rules.

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;

use super::backend::{FetchError, UnreadQueuePayload};
use super::compose::{ComposeContext, ComposePolicy, compose, section_ids};
use super::engine::{EngineOptions, FeedCmd, FeedEngine, FeedMsg};
use super::model::fixtures::announcement;
use super::model::{
    AssociationEntity, AssociationKind, BookmarkEntity, FeedItem, FilterKey, MissedDigestEntity,
    SectionContent, SectionId,
};
use super::reconcile::diff_section;
use super::selection::{SelectionController, SelectionOutcome};
use super::store::SectionDataStore;
use super::traversal::{AdvancePolicy, AdvanceRequest, TraversalState, UnreadTraversalController};
use crate::core::session::SharedSession;

// ──────────────────── strategies ────────────────────

fn arb_kind() -> impl Strategy<Value = Option<AssociationKind>> {
    prop_oneof![
        Just(None),
        Just(Some(AssociationKind::General)),
        Just(Some(AssociationKind::College)),
        Just(Some(AssociationKind::Department)),
    ]
}

fn arb_association() -> impl Strategy<Value = AssociationEntity> {
    ("[A-Z][a-z]{2,8}", arb_kind(), any::<bool>()).prop_map(|(name, kind, is_registered)| {
        AssociationEntity {
            name,
            logo_ref: None,
            kind,
            is_selected: false,
            has_unread: false,
            is_registered,
        }
    })
}

fn arb_ids(max: u64) -> impl Strategy<Value = Vec<u64>> {
    prop::sample::subsequence((1..=max).collect::<Vec<_>>(), 0..=max as usize)
        .prop_shuffle()
}

fn arb_policy() -> impl Strategy<Value = ComposePolicy> {
    prop::sample::subsequence(SectionId::ALL.to_vec(), 0..=SectionId::ALL.len())
        .prop_map(ComposePolicy::hosting)
}

#[derive(Debug, Clone)]
struct StoreSeed {
    digest: Option<u32>,
    associations: Option<Vec<AssociationEntity>>,
    announcements: Option<Vec<u64>>,
    bookmarks: Option<Vec<u64>>,
}

fn arb_store_seed() -> impl Strategy<Value = StoreSeed> {
    (
        prop::option::of(0u32..20),
        prop::option::of(prop::collection::vec(arb_association(), 0..6)),
        prop::option::of(arb_ids(6)),
        prop::option::of(arb_ids(4)),
    )
        .prop_map(|(digest, associations, announcements, bookmarks)| StoreSeed {
            digest,
            associations,
            announcements,
            bookmarks,
        })
}

fn build_store(seed: &StoreSeed) -> SectionDataStore {
    let mut store = SectionDataStore::new();
    if let Some(missed_count) = seed.digest {
        store.set_items(SectionContent::MissedDigest(MissedDigestEntity {
            viewer_name: "Seo".to_string(),
            missed_count,
        }));
    }
    if let Some(list) = &seed.associations {
        let mut list = list.clone();
        if let Some(first) = list.first_mut() {
            first.is_selected = true;
        }
        store.set_items(SectionContent::Associations(list));
    }
    if let Some(ids) = &seed.announcements {
        store.set_items(SectionContent::Announcements(
            ids.iter().map(|&id| announcement(id)).collect(),
        ));
    }
    if let Some(ids) = &seed.bookmarks {
        store.set_items(SectionContent::Bookmarks(
            ids.iter()
                .map(|&id| BookmarkEntity::from(announcement(id)))
                .collect(),
        ));
    }
    store
}

fn feed(ids: &[u64]) -> Vec<FeedItem> {
    ids.iter()
        .map(|&id| FeedItem::Announcement(announcement(id)))
        .collect()
}

// ──────────────────── properties ────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Bookmarks and the empty-bookmarks placeholder never co-occur, and
    /// sections always come out in the fixed order.
    #[test]
    fn compose_sections_are_exclusive_and_ordered(
        seed in arb_store_seed(),
        policy in arb_policy(),
    ) {
        let store = build_store(&seed);
        let composed = compose(&store, &ComposeContext { policy: &policy, viewer_name: "Seo" });
        let ids = section_ids(&composed);

        prop_assert!(
            !(ids.contains(&SectionId::Bookmarks)
                && ids.contains(&SectionId::EmptyBookmarksPlaceholder))
        );
        let mut sorted = ids.clone();
        sorted.sort();
        prop_assert_eq!(&ids, &sorted);
        prop_assert!(ids.iter().all(|id| policy.hosts(*id)));
        if policy.hosts(SectionId::AnnouncementFeed) {
            prop_assert!(ids.contains(&SectionId::AnnouncementFeed));
        }
    }

    /// Identical store contents compose to identical models.
    #[test]
    fn compose_is_deterministic(seed in arb_store_seed()) {
        let policy = ComposePolicy::full();
        let ctx = ComposeContext { policy: &policy, viewer_name: "Seo" };
        let first = compose(&build_store(&seed), &ctx);
        let second = compose(&build_store(&seed), &ctx);
        prop_assert_eq!(first, second);
    }

    /// After an in-bounds selection exactly one entry is selected, at the
    /// requested index; unregistered targets leave feed and digest absent.
    #[test]
    fn selection_is_exclusive(
        list in prop::collection::vec(arb_association(), 1..8),
        pick in any::<prop::sample::Index>(),
    ) {
        let mut store = SectionDataStore::new();
        store.set_items(SectionContent::Associations(list));
        store.set_items(SectionContent::Announcements(vec![announcement(1)]));
        let stored = store.associations().unwrap_or_default();
        let index = pick.index(stored.len());

        let mut controller = SelectionController::new();
        let outcome = controller.select_association(&mut store, index).unwrap();

        let after = store.associations().unwrap_or_default();
        let selected: Vec<usize> = after
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_selected)
            .map(|(i, _)| i)
            .collect();
        prop_assert_eq!(selected, vec![index]);

        match outcome {
            SelectionOutcome::ClearedUnregistered { .. } => {
                prop_assert!(!after[index].is_registered);
                prop_assert!(store.announcements().is_none());
                prop_assert!(store.missed_digest().is_none());
            }
            SelectionOutcome::FetchRequested { key, .. } => {
                prop_assert!(after[index].is_registered);
                prop_assert_eq!(key, FilterKey::from(after[index].kind));
            }
        }
    }

    /// Out-of-range selections never touch the store.
    #[test]
    fn out_of_range_selection_is_inert(
        list in prop::collection::vec(arb_association(), 0..5),
        extra in 0usize..4,
    ) {
        let mut store = SectionDataStore::new();
        store.set_items(SectionContent::Associations(list));
        let before = store.clone();
        let len = before.associations().map_or(0, |l| l.len());

        let mut controller = SelectionController::new();
        prop_assert!(controller.select_association(&mut store, len + extra).is_err());
        prop_assert_eq!(store, before);
    }

    /// Each successful acknowledgment lowers the remaining count by one and
    /// moves the cursor forward; each failure changes nothing.
    #[test]
    fn traversal_counts_only_successes(
        len in 1usize..8,
        outcomes in prop::collection::vec(any::<bool>(), 1..30),
    ) {
        let ids: Vec<u64> = (1..=len as u64).collect();
        let mut controller = UnreadTraversalController::new(AdvancePolicy::Reject);
        let session = controller.start(FilterKey::All);
        controller
            .on_queue_loaded(session, Ok(UnreadQueuePayload {
                items: ids.iter().map(|&id| announcement(id)).collect(),
                count: u32::try_from(len).unwrap(),
            }))
            .unwrap();

        let mut successes = 0usize;
        for ok in outcomes {
            let Ok(AdvanceRequest::Acknowledge { session, id }) = controller.begin_advance() else {
                prop_assert_eq!(controller.state(), TraversalState::Exhausted);
                break;
            };
            let before = (controller.cursor(), controller.remaining_count());
            let result = if ok { Ok(()) } else { Err(FetchError::Transport("x".to_string())) };
            let answer = controller.complete_advance(session, id, result);
            if ok {
                prop_assert!(answer.is_ok());
                successes += 1;
            } else {
                prop_assert!(answer.is_err());
                prop_assert_eq!((controller.cursor(), controller.remaining_count()), before);
            }
            prop_assert_eq!(
                controller.remaining_count(),
                Some(u32::try_from(len - successes).unwrap())
            );
        }

        if successes == len {
            prop_assert_eq!(controller.state(), TraversalState::Exhausted);
            prop_assert_eq!(controller.remaining_count(), Some(0));
        }
    }

    /// A patch never deletes and inserts the same identity, and kept rows
    /// balance on both sides.
    #[test]
    fn section_diff_is_consistent(old in arb_ids(8), new in arb_ids(8)) {
        let diff = diff_section(SectionId::AnnouncementFeed, &feed(&old), &feed(&new));

        let deleted: HashSet<u64> = diff.deleted.iter().map(|&i| old[i]).collect();
        let inserted: HashSet<u64> = diff.inserted.iter().map(|&i| new[i]).collect();
        prop_assert!(deleted.is_disjoint(&inserted));
        prop_assert_eq!(old.len() - diff.deleted.len(), new.len() - diff.inserted.len());
        prop_assert!(diff.reloaded.is_empty());
        for &(o, n) in &diff.moved {
            prop_assert_eq!(old[o], new[n]);
        }
        if old == new {
            prop_assert!(diff.is_empty());
        }
    }

    /// Arbitrary user intents through the engine keep a single selection.
    #[test]
    fn engine_keeps_single_selection(
        list in prop::collection::vec(arb_association(), 1..6),
        picks in prop::collection::vec(0usize..8, 1..12),
    ) {
        let session = SharedSession::signed_in("Seo");
        let mut engine = FeedEngine::new(EngineOptions::default(), Arc::new(session));
        engine
            .update(FeedMsg::AssociationsLoaded { generation: 0, result: Ok(list) })
            .unwrap();

        for pick in picks {
            match engine.update(FeedMsg::SelectAssociation(pick)) {
                Ok(FeedCmd::Batch(_) | FeedCmd::None) | Err(_) => {}
                Ok(other) => prop_assert!(false, "unexpected command {:?}", other),
            }
            let strip = engine.store().associations().unwrap_or_default();
            prop_assert_eq!(strip.iter().filter(|a| a.is_selected).count(), 1);
        }
    }
}

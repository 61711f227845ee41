//! Snapshot reconciler: turns successive composed models into render updates.
//!
//! Three outputs:
//! 1. **Full rebuild**: first load, or the set of visible sections changed.
//! 2. **Targeted replace**: one section's rows are deleted and re-inserted;
//!    sibling sections are untouched.
//! 3. **Patch**: same section set, with per-section delete/insert/reload/move
//!    indices derived from item identity and full-value equality.

#![allow(missing_docs)]

use std::collections::HashMap;

use serde::Serialize;

use super::compose::{ComposedSection, section_ids};
use super::model::{FeedItem, ItemKey, SectionId};

// ──────────────────── outputs ────────────────────

/// Complete replacement model for the render layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub sections: Vec<ComposedSection>,
}

/// Delete-all-then-insert-all for one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionReplace {
    pub section: SectionId,
    /// Identities of the rows removed, in their old order.
    pub removed: Vec<ItemKey>,
    pub inserted: Vec<FeedItem>,
}

/// Structural changes for one section between two models.
///
/// `deleted` and `reloaded` index the old rows; `inserted` indexes the new
/// rows; `moved` pairs are `(old, new)`. An identity never appears in both
/// `deleted` and `inserted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionDiff {
    pub section: SectionId,
    pub deleted: Vec<usize>,
    pub inserted: Vec<usize>,
    pub reloaded: Vec<usize>,
    pub moved: Vec<(usize, usize)>,
}

impl SectionDiff {
    /// No changes for `section`.
    #[must_use]
    pub const fn unchanged(section: SectionId) -> Self {
        Self {
            section,
            deleted: Vec::new(),
            inserted: Vec::new(),
            reloaded: Vec::new(),
            moved: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty()
            && self.inserted.is_empty()
            && self.reloaded.is_empty()
            && self.moved.is_empty()
    }
}

/// One message to the render collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RenderUpdate {
    FullRebuild(Snapshot),
    TargetedReplace(SectionReplace),
    Patch { diffs: Vec<SectionDiff> },
}

// ──────────────────── reconciler ────────────────────

/// Remembers the last model handed to the render layer.
#[derive(Debug, Clone, Default)]
pub struct SnapshotReconciler {
    current: Option<Vec<ComposedSection>>,
}

impl SnapshotReconciler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The model the render layer currently shows.
    #[must_use]
    pub fn current(&self) -> Option<&[ComposedSection]> {
        self.current.as_deref()
    }

    /// Forget the published model; the next update is a full rebuild.
    pub fn reset(&mut self) {
        self.current = None;
    }

    /// Whether `next` shows the same ordered set of sections as the current model.
    #[must_use]
    pub fn same_layout(&self, next: &[ComposedSection]) -> bool {
        self.current
            .as_deref()
            .is_some_and(|current| section_ids(current) == section_ids(next))
    }

    /// Unconditional full rebuild.
    pub fn rebuild(&mut self, next: Vec<ComposedSection>) -> RenderUpdate {
        self.current = Some(next.clone());
        RenderUpdate::FullRebuild(Snapshot { sections: next })
    }

    /// Full rebuild when the layout changed, otherwise a patch.
    ///
    /// Returns `None` when nothing changed.
    pub fn reconcile(&mut self, next: Vec<ComposedSection>) -> Option<RenderUpdate> {
        if !self.same_layout(&next) {
            return Some(self.rebuild(next));
        }
        let current = self.current.as_deref().unwrap_or_default();
        let diffs: Vec<SectionDiff> = current
            .iter()
            .zip(&next)
            .map(|(old, new)| diff_section(old.id, &old.items, &new.items))
            .filter(|diff| !diff.is_empty())
            .collect();
        let headers_changed = current
            .iter()
            .zip(&next)
            .any(|(old, new)| old.viewer_name != new.viewer_name);

        if headers_changed {
            return Some(self.rebuild(next));
        }
        self.current = Some(next);
        (!diffs.is_empty()).then_some(RenderUpdate::Patch { diffs })
    }

    /// Replace the rows of one visible section.
    ///
    /// Returns `None` when `section` is not part of the current model; the
    /// caller must rebuild instead.
    pub fn replace_section(
        &mut self,
        section: SectionId,
        items: Vec<FeedItem>,
    ) -> Option<RenderUpdate> {
        let current = self.current.as_mut()?;
        let slot = current.iter_mut().find(|s| s.id == section)?;
        let removed = slot.items.iter().map(FeedItem::key).collect();
        slot.items.clone_from(&items);
        Some(RenderUpdate::TargetedReplace(SectionReplace {
            section,
            removed,
            inserted: items,
        }))
    }
}

// ──────────────────── diffing ────────────────────

/// Diff two row lists of the same section.
#[must_use]
pub fn diff_section(section: SectionId, old: &[FeedItem], new: &[FeedItem]) -> SectionDiff {
    let old_keys: Vec<ItemKey> = old.iter().map(FeedItem::key).collect();
    let new_keys: Vec<ItemKey> = new.iter().map(FeedItem::key).collect();

    let new_index: HashMap<&ItemKey, usize> =
        new_keys.iter().enumerate().map(|(i, k)| (k, i)).collect();
    let old_index: HashMap<&ItemKey, usize> =
        old_keys.iter().enumerate().map(|(i, k)| (k, i)).collect();

    let anchored = longest_common_subsequence(&old_keys, &new_keys);
    let mut anchored_old = vec![false; old.len()];
    for &(o, _) in &anchored {
        anchored_old[o] = true;
    }

    let mut diff = SectionDiff::unchanged(section);

    for (o, key) in old_keys.iter().enumerate() {
        match new_index.get(key) {
            None => diff.deleted.push(o),
            Some(&n) => {
                if !anchored_old[o] {
                    diff.moved.push((o, n));
                }
                if old[o] != new[n] {
                    diff.reloaded.push(o);
                }
            }
        }
    }
    diff.inserted = new_keys
        .iter()
        .enumerate()
        .filter(|(_, key)| !old_index.contains_key(key))
        .map(|(n, _)| n)
        .collect();
    diff
}

/// Largest middle segment, in table cells, that gets an exact LCS.
const MAX_LCS_CELLS: usize = 1 << 20;

/// Index pairs of one longest common subsequence of `a` and `b`.
///
/// The shared prefix and suffix are anchored directly. When the remaining
/// middle is still too large for the table, it is left unanchored and every
/// surviving row in it is reported as moved.
fn longest_common_subsequence(a: &[ItemKey], b: &[ItemKey]) -> Vec<(usize, usize)> {
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();

    let mut pairs: Vec<(usize, usize)> = (0..prefix).map(|i| (i, i)).collect();
    let (mid_a, mid_b) = (&a[prefix..a.len() - suffix], &b[prefix..b.len() - suffix]);
    let cells = (mid_a.len() + 1).saturating_mul(mid_b.len() + 1);
    if cells <= MAX_LCS_CELLS {
        pairs.extend(
            middle_lcs(mid_a, mid_b)
                .into_iter()
                .map(|(i, j)| (i + prefix, j + prefix)),
        );
    }
    let (tail_a, tail_b) = (a.len() - suffix, b.len() - suffix);
    pairs.extend((0..suffix).map(|k| (tail_a + k, tail_b + k)));
    pairs
}

fn middle_lcs(a: &[ItemKey], b: &[ItemKey]) -> Vec<(usize, usize)> {
    let (n, m) = (a.len(), b.len());
    let width = m + 1;
    // table[i * width + j] = LCS length of a[i..] and b[j..]
    let mut table = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i * width + j] = if a[i] == b[j] {
                table[(i + 1) * width + j + 1] + 1
            } else {
                table[(i + 1) * width + j].max(table[i * width + j + 1])
            };
        }
    }

    let mut pairs = Vec::with_capacity(table[0] as usize);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            pairs.push((i, j));
            i += 1;
            j += 1;
        } else if table[(i + 1) * width + j] >= table[i * width + j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    pairs
}

//! Reconciler - matches new children against the previous ones.
//!
//! For every child instance the reconciler picks the previous fiber to diff
//! against (its *alternate*), collects previous fibers with no counterpart
//! for deletion and marks keyed children whose relative order changed.
//!
//! # Matching
//!
//! - Keyed lists (any key on either side): match by key. An unkeyed item
//!   reuses the previous fiber at the same index if that one is unkeyed too.
//! - Unkeyed lists: match by position.
//! - Tags flagged `NO_TRANSPOSITIONS` are always matched by position.
//!
//! Moves are minimal: the children kept in place form the longest
//! increasing subsequence of previous positions, everything else moved.

mod lis;

pub(crate) use lis::longest_increasing_subsequence;

use std::collections::{HashMap, HashSet};

use crate::config::UnkeyedListPolicy;
use crate::element::{Instance, NodeFlags};
use crate::error::Diagnostic;
use crate::fiber::{FiberId, FiberTree, PlannedChild};
use crate::types::{EffectTag, Key};

/// How one child list is diffed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DiffOptions {
    pub(crate) dev: bool,
    pub(crate) unkeyed: UnkeyedListPolicy,
}

/// Fallout of planning one child list; the plan itself is stored on the
/// fiber.
#[derive(Debug, Default)]
pub(crate) struct ChildDiff {
    pub(crate) deleted: Vec<FiberId>,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

/// Diff the pending children of `id` against the children of its alternate
/// and store the plan on the fiber.
///
/// Fails with a `DuplicateKey` diagnostic in development mode.
pub(crate) fn plan_children(
    tree: &mut FiberTree,
    id: FiberId,
    options: DiffOptions,
) -> Result<ChildDiff, Diagnostic> {
    let Some(fiber) = tree.get(id) else {
        return Ok(ChildDiff::default());
    };
    let previous: Vec<FiberId> = match (fiber.tag, fiber.alternate) {
        (EffectTag::Update, Some(alternate)) => tree.children(alternate).collect(),
        _ => Vec::new(),
    };
    let previous_instances: Vec<&Instance> = previous
        .iter()
        .filter_map(|child| tree.get(*child).map(|f| &f.instance))
        .collect();
    let positional = fiber
        .instance
        .as_tag()
        .is_some_and(|tag| tag.flags.contains(NodeFlags::NO_TRANSPOSITIONS));

    let mut diff = diff_children(
        &previous_instances,
        &fiber.pending,
        positional,
        options,
        || fiber.name(),
    )?;
    let plan = diff
        .plan
        .iter()
        .map(|slot| PlannedChild {
            alternate: slot.alternate.map(|index| previous[index]),
            moved: slot.moved,
        })
        .collect();
    diff.deleted_indices.sort_unstable();
    let deleted = diff.deleted_indices.iter().map(|&index| previous[index]).collect();

    if let Some(fiber) = tree.get_mut(id) {
        fiber.plan = plan;
    }
    Ok(ChildDiff {
        deleted,
        diagnostics: diff.diagnostics,
    })
}

// =============================================================================
// Index-level diff
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct Slot {
    pub(crate) alternate: Option<usize>,
    pub(crate) moved: bool,
}

#[derive(Debug, Default)]
pub(crate) struct IndexDiff {
    pub(crate) plan: Vec<Slot>,
    pub(crate) deleted_indices: Vec<usize>,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

/// Diff two instance lists by index.
pub(crate) fn diff_children(
    previous: &[&Instance],
    next: &[Instance],
    positional: bool,
    options: DiffOptions,
    parent_name: impl Fn() -> String,
) -> Result<IndexDiff, Diagnostic> {
    let keyed = !positional
        && (next.iter().any(|child| child.key().is_some())
            || previous.iter().any(|child| child.key().is_some()));
    if keyed {
        diff_keyed(previous, next, options, parent_name)
    } else {
        Ok(diff_positional(previous, next, positional, options, parent_name))
    }
}

fn diff_positional(
    previous: &[&Instance],
    next: &[Instance],
    declared: bool,
    options: DiffOptions,
    parent_name: impl Fn() -> String,
) -> IndexDiff {
    let mut diff = IndexDiff::default();
    let resized = previous.len() != next.len() && !previous.is_empty() && !next.is_empty();

    if resized && !declared && options.dev {
        let diagnostic = Diagnostic::UnkeyedList {
            parent: parent_name(),
            prev: previous.len(),
            next: next.len(),
        };
        tracing::warn!(%diagnostic, "unkeyed list changed length");
        diff.diagnostics.push(diagnostic);
    }

    if resized && !declared && options.unkeyed == UnkeyedListPolicy::Remount {
        diff.plan = vec![Slot::default(); next.len()];
        diff.deleted_indices = (0..previous.len()).collect();
        return diff;
    }

    diff.plan = (0..next.len())
        .map(|index| Slot {
            alternate: (index < previous.len()).then_some(index),
            moved: false,
        })
        .collect();
    diff.deleted_indices = (next.len()..previous.len()).collect();
    diff
}

fn diff_keyed(
    previous: &[&Instance],
    next: &[Instance],
    options: DiffOptions,
    parent_name: impl Fn() -> String,
) -> Result<IndexDiff, Diagnostic> {
    let mut by_key: HashMap<&Key, usize> = HashMap::new();
    for (index, child) in previous.iter().enumerate() {
        if let Some(key) = child.key() {
            by_key.entry(key).or_insert(index);
        }
    }

    let mut seen: HashSet<&Key> = HashSet::new();
    let mut used = vec![false; previous.len()];
    let mut diff = IndexDiff {
        plan: vec![Slot::default(); next.len()],
        ..IndexDiff::default()
    };

    for (index, child) in next.iter().enumerate() {
        let matched = match child.key() {
            Some(key) => {
                if !seen.insert(key) {
                    let diagnostic = Diagnostic::DuplicateKey {
                        key: key.clone(),
                        parent: parent_name(),
                    };
                    if options.dev {
                        return Err(diagnostic);
                    }
                    // Later duplicates never reuse a previous fiber
                    tracing::warn!(%diagnostic, "duplicate key");
                    continue;
                }
                by_key.get(key).copied()
            }
            None => (index < previous.len() && previous[index].key().is_none()).then_some(index),
        };
        if let Some(old) = matched.filter(|old| !used[*old]) {
            used[old] = true;
            diff.plan[index].alternate = Some(old);
        }
    }

    let matched: Vec<(usize, usize)> = diff
        .plan
        .iter()
        .enumerate()
        .filter_map(|(index, slot)| slot.alternate.map(|old| (index, old)))
        .collect();
    let olds: Vec<usize> = matched.iter().map(|(_, old)| *old).collect();
    let stable = longest_increasing_subsequence(&olds);
    for ((index, _), keep) in matched.iter().zip(stable) {
        diff.plan[*index].moved = !keep;
    }

    diff.deleted_indices = used
        .iter()
        .enumerate()
        .filter_map(|(index, used)| (!used).then_some(index))
        .collect();
    Ok(diff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{tag, text};

    fn dev() -> DiffOptions {
        DiffOptions {
            dev: true,
            unkeyed: UnkeyedListPolicy::WarnAndReuse,
        }
    }

    fn keyed(keys: &[i64]) -> Vec<Instance> {
        keys.iter().map(|k| tag("li").key(*k).into()).collect()
    }

    fn run(prev: &[Instance], next: &[Instance], options: DiffOptions) -> Result<IndexDiff, Diagnostic> {
        let prev: Vec<&Instance> = prev.iter().collect();
        diff_children(&prev, next, false, options, || "ul".to_string())
    }

    fn moved(diff: &IndexDiff) -> Vec<usize> {
        diff.plan
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.moved.then_some(i))
            .collect()
    }

    #[test]
    fn test_identical_lists_keep_everything() {
        let list = keyed(&[1, 2, 3]);
        let diff = run(&list, &list, dev()).unwrap();
        assert!(moved(&diff).is_empty());
        assert!(diff.deleted_indices.is_empty());
        assert_eq!(diff.plan[2].alternate, Some(2));
    }

    #[test]
    fn test_removal_deletes_exactly_one() {
        let diff = run(&keyed(&[1, 2, 3]), &keyed(&[1, 3]), dev()).unwrap();
        assert_eq!(diff.deleted_indices, vec![1]);
        assert_eq!(diff.plan[1].alternate, Some(2));
        assert!(moved(&diff).is_empty());
    }

    #[test]
    fn test_swap_moves_two() {
        let prev: Vec<i64> = (0..1000).collect();
        let mut next = prev.clone();
        next.swap(1, 998);
        let diff = run(&keyed(&prev), &keyed(&next), dev()).unwrap();
        assert_eq!(moved(&diff), vec![1, 998]);
        assert!(diff.deleted_indices.is_empty());
    }

    #[test]
    fn test_move_to_front_moves_one() {
        let diff = run(&keyed(&[1, 2, 3, 4]), &keyed(&[4, 1, 2, 3]), dev()).unwrap();
        assert_eq!(moved(&diff), vec![0]);
    }

    #[test]
    fn test_unkeyed_item_in_keyed_list_matches_same_index() {
        let prev: Vec<Instance> = vec![tag("li").key(1).into(), text("a")];

        // Same index, unkeyed on both sides
        let next: Vec<Instance> = vec![tag("li").key(1).into(), text("b")];
        let diff = run(&prev, &next, dev()).unwrap();
        assert_eq!(diff.plan[1].alternate, Some(1));
        assert!(diff.deleted_indices.is_empty());

        // The fiber at the same index is keyed: nothing to reuse
        let next: Vec<Instance> = vec![text("b"), tag("li").key(1).into()];
        let diff = run(&prev, &next, dev()).unwrap();
        assert_eq!(diff.plan[0].alternate, None);
        assert_eq!(diff.plan[1].alternate, Some(0));
        assert_eq!(diff.deleted_indices, vec![1]);
    }

    #[test]
    fn test_duplicate_key_fails_in_dev() {
        let err = run(&[], &keyed(&[1, 2, 1]), dev()).unwrap_err();
        assert_eq!(
            err,
            Diagnostic::DuplicateKey {
                key: Key::Int(1),
                parent: "ul".into()
            }
        );
    }

    #[test]
    fn test_duplicate_key_first_wins_in_production() {
        let options = DiffOptions { dev: false, ..dev() };
        let diff = run(&keyed(&[1, 2]), &keyed(&[1, 2, 1]), options).unwrap();
        assert_eq!(diff.plan[0].alternate, Some(0));
        assert_eq!(diff.plan[2].alternate, None);
    }

    #[test]
    fn test_unkeyed_resize_warns_and_reuses() {
        let prev = vec![text("a"), text("b")];
        let next = vec![text("a"), text("b"), text("c")];
        let diff = run(&prev, &next, dev()).unwrap();
        assert_eq!(diff.diagnostics.len(), 1);
        assert_eq!(diff.plan[1].alternate, Some(1));
        assert_eq!(diff.plan[2].alternate, None);

        let shrink = run(&next, &prev, dev()).unwrap();
        assert_eq!(shrink.deleted_indices, vec![2]);
    }

    #[test]
    fn test_unkeyed_resize_remounts_under_policy() {
        let options = DiffOptions {
            dev: false,
            unkeyed: UnkeyedListPolicy::Remount,
        };
        let prev = vec![text("a"), text("b")];
        let next = vec![text("a")];
        let diff = run(&prev, &next, options).unwrap();
        assert!(diff.diagnostics.is_empty());
        assert_eq!(diff.plan[0].alternate, None);
        assert_eq!(diff.deleted_indices, vec![0, 1]);
    }

    #[test]
    fn test_mixed_keyed_and_unkeyed() {
        let prev: Vec<Instance> = vec![text("head"), tag("li").key(1).into(), tag("li").key(2).into()];
        let next: Vec<Instance> = vec![text("head"), tag("li").key(2).into(), tag("li").key(1).into()];
        let diff = run(&prev, &next, dev()).unwrap();
        assert_eq!(diff.plan[0].alternate, Some(0));
        assert_eq!(diff.plan[1].alternate, Some(2));
        assert_eq!(moved(&diff).len(), 1);
    }

    #[test]
    fn test_positional_ignores_keys() {
        let prev = keyed(&[1, 2]);
        let next = keyed(&[2, 1]);
        let prev: Vec<&Instance> = prev.iter().collect();
        let diff = diff_children(&prev, &next, true, dev(), || "ul".into()).unwrap();
        assert_eq!(diff.plan[0].alternate, Some(0));
        assert!(moved(&diff).is_empty());
    }
}

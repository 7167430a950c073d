//! Label and path resolution over pruned hash trees.
//!
//! A lookup is tri-valued: the tree can prove a path present (`Found`),
//! prove it absent (`Absent`), or hide the answer behind a pruned subtree
//! (`Unknown`). Distinguishing the latter two is what makes certified
//! absence proofs possible.

use crate::{flatten_forks, HashTree};

/// The result of resolving a path to a leaf value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupResult<'tree> {
    /// The tree proves that this path does not exist.
    Absent,
    /// A pruned subtree hides whether the path exists.
    Unknown,
    /// The path exists and ends in a leaf with these contents.
    Found(&'tree [u8]),
    /// The path exists but does not end in a leaf, so there is no value to
    /// return. Callers that expect a byte-string payload must not mistake a
    /// subtree for one.
    Error,
}

/// The result of resolving a path to a subtree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubtreeLookupResult<'tree> {
    /// The tree proves that this path does not exist.
    Absent,
    /// A pruned subtree hides whether the path exists.
    Unknown,
    /// The subtree rooted at this path.
    Found(&'tree HashTree),
}

/// The result of searching one fork level for a label.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchResult<'tree> {
    /// The label exists; its subtree is returned.
    Found(&'tree HashTree),
    /// The level proves the label absent: it is bracketed by definite
    /// neighbors, or the level holds no labels at all.
    Absent,
    /// A pruned node sits where the label would be.
    Unknown,
    /// The label sorts before every label at this level.
    Less,
    /// The label sorts after every label at this level.
    Greater,
}

/// Searches the fork level rooted at `tree` for `label`.
///
/// Forks group an ordered sequence of labeled nodes, interspersed with
/// pruned gaps; the search walks that flattened sequence. A gap is
/// "definite" when it is delimited by labeled nodes on both sides and no
/// pruned node could hide the queried label inside it.
pub fn find_label<'tree>(label: &[u8], tree: &'tree HashTree) -> SearchResult<'tree> {
    // Whether a pruned node could hide `label` in the gap we are currently
    // scanning past.
    let mut gap_possibly_hides_label = false;
    let mut seen_smaller_label = false;

    for node in flatten_forks(tree) {
        match node {
            HashTree::Labeled(node_label, subtree) => {
                match node_label.as_bytes().cmp(&label[..]) {
                    std::cmp::Ordering::Equal => return SearchResult::Found(subtree),
                    std::cmp::Ordering::Less => {
                        seen_smaller_label = true;
                        gap_possibly_hides_label = false;
                    }
                    std::cmp::Ordering::Greater => {
                        return if gap_possibly_hides_label {
                            SearchResult::Unknown
                        } else if seen_smaller_label {
                            SearchResult::Absent
                        } else {
                            SearchResult::Less
                        };
                    }
                }
            }
            HashTree::Pruned(_) => gap_possibly_hides_label = true,
            // An anonymous leaf carries no label and cannot re-establish a
            // bound across a pruned gap.
            HashTree::Leaf(_) => {}
            // flatten_forks never yields Empty or Fork nodes.
            HashTree::Empty | HashTree::Fork(_) => unreachable!(),
        }
    }

    if gap_possibly_hides_label {
        SearchResult::Unknown
    } else if seen_smaller_label {
        SearchResult::Greater
    } else {
        // No labeled node at this level at all: an empty or leaf-only level
        // proves the label absent.
        SearchResult::Absent
    }
}

pub(crate) fn lookup_path<'tree, 'p, P, S>(tree: &'tree HashTree, path: P) -> LookupResult<'tree>
where
    P: IntoIterator<Item = &'p S>,
    S: AsRef<[u8]> + ?Sized + 'p,
{
    let mut current = tree;
    for segment in path {
        match find_label(segment.as_ref(), current) {
            SearchResult::Found(subtree) => current = subtree,
            SearchResult::Unknown => return LookupResult::Unknown,
            SearchResult::Absent | SearchResult::Less | SearchResult::Greater => {
                return LookupResult::Absent
            }
        }
    }
    match current {
        HashTree::Leaf(data) => LookupResult::Found(data),
        HashTree::Pruned(_) => LookupResult::Unknown,
        _ => LookupResult::Error,
    }
}

pub(crate) fn lookup_subtree<'tree, 'p, P, S>(
    tree: &'tree HashTree,
    path: P,
) -> SubtreeLookupResult<'tree>
where
    P: IntoIterator<Item = &'p S>,
    S: AsRef<[u8]> + ?Sized + 'p,
{
    let mut current = tree;
    for segment in path {
        match find_label(segment.as_ref(), current) {
            SearchResult::Found(subtree) => current = subtree,
            SearchResult::Unknown => return SubtreeLookupResult::Unknown,
            SearchResult::Absent | SearchResult::Less | SearchResult::Greater => {
                return SubtreeLookupResult::Absent
            }
        }
    }
    SubtreeLookupResult::Found(current)
}

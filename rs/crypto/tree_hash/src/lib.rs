//! Hash trees as returned by the `read_state` endpoint of the IC.
//!
//! A [`HashTree`] is a pruned Merkle tree over the labeled state of a
//! subnet. Recomputing its root hash ([`HashTree::digest`]) and resolving
//! labeled paths under pruning ([`HashTree::lookup_path`]) are the two
//! operations certificate verification is built on.
//!
//! The hashing scheme is domain-separated: every node kind feeds a short
//! length-prefixed ASCII tag into SHA-256 before its payload, so digests of
//! different node kinds can never collide.

use sha2::{Digest as _, Sha256};
use std::fmt;

mod encoding;
mod lookup;

pub use lookup::{find_label, LookupResult, SearchResult, SubtreeLookupResult};

const DOMAIN_HASHTREE_EMPTY: &str = "ic-hashtree-empty";
const DOMAIN_HASHTREE_LEAF: &str = "ic-hashtree-leaf";
const DOMAIN_HASHTREE_LABELED: &str = "ic-hashtree-labeled";
const DOMAIN_HASHTREE_FORK: &str = "ic-hashtree-fork";

/// A SHA-256 digest of some hash-tree content.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest(pub [u8; Self::LEN]);

impl Digest {
    pub const LEN: usize = 32;

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest(0x{})", hex::encode(self.0))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; Self::LEN]> for Digest {
    fn from(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Digest {
    type Error = InvalidDigestLength;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; Self::LEN] = bytes
            .try_into()
            .map_err(|_| InvalidDigestLength(bytes.len()))?;
        Ok(Self(bytes))
    }
}

/// Returned when converting a byte slice that is not exactly 32 bytes long
/// into a [`Digest`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InvalidDigestLength(pub usize);

impl fmt::Display for InvalidDigestLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected a digest of 32 bytes, got {} bytes", self.0)
    }
}

impl std::error::Error for InvalidDigestLength {}

/// The label of an edge in a hash tree. Labels are opaque byte strings;
/// paths sent over the wire encode text segments as their UTF-8 bytes.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(Vec<u8>);

impl Label {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for Label {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl<T: Into<Vec<u8>>> From<T> for Label {
    fn from(bytes: T) -> Self {
        Self(bytes.into())
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_label(&self.0, f)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_label(&self.0, f)
    }
}

// Most labels are ASCII names; principals and request ids are not.
fn fmt_label(bytes: &[u8], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let printable = bytes
        .iter()
        .all(|b| b.is_ascii_graphic() || *b == b' ');
    if printable && !bytes.is_empty() {
        write!(f, "{}", String::from_utf8_lossy(bytes))
    } else {
        write!(f, "0x{}", hex::encode(bytes))
    }
}

/// A sequence of labels addressing a subtree or a leaf of a hash tree.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path(Vec<Label>);

impl Path {
    pub fn new(segments: Vec<Label>) -> Self {
        Self(segments)
    }
}

impl std::ops::Deref for Path {
    type Target = [Label];

    fn deref(&self) -> &[Label] {
        &self.0
    }
}

impl From<Vec<Label>> for Path {
    fn from(segments: Vec<Label>) -> Self {
        Self(segments)
    }
}

impl From<Label> for Path {
    fn from(segment: Label) -> Self {
        Self(vec![segment])
    }
}

impl FromIterator<Label> for Path {
    fn from_iter<I: IntoIterator<Item = Label>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A partial state tree as contained in a certificate.
///
/// Any subtree the replica chose not to include in the response is replaced
/// by a `Pruned` node carrying the subtree's precomputed digest, so the root
/// hash remains recomputable while the pruned content stays opaque.
#[derive(Clone, PartialEq, Eq)]
pub enum HashTree {
    Empty,
    Fork(Box<(HashTree, HashTree)>),
    Labeled(Label, Box<HashTree>),
    Leaf(Vec<u8>),
    Pruned(Digest),
}

impl HashTree {
    /// Recomputes the root hash of this tree.
    ///
    /// Pruned nodes contribute their stored digest verbatim, so the result
    /// is identical for a full tree and any of its pruned variants.
    pub fn digest(&self) -> Digest {
        match self {
            HashTree::Empty => empty_hash(),
            HashTree::Fork(lr) => fork_hash(&lr.0.digest(), &lr.1.digest()),
            HashTree::Labeled(label, subtree) => labeled_hash(label.as_bytes(), &subtree.digest()),
            HashTree::Leaf(data) => leaf_hash(data),
            HashTree::Pruned(digest) => *digest,
        }
    }

    pub fn lookup_path<'p, P, S>(&self, path: P) -> LookupResult<'_>
    where
        P: IntoIterator<Item = &'p S>,
        S: AsRef<[u8]> + ?Sized + 'p,
    {
        lookup::lookup_path(self, path)
    }

    pub fn lookup_subtree<'p, P, S>(&self, path: P) -> SubtreeLookupResult<'_>
    where
        P: IntoIterator<Item = &'p S>,
        S: AsRef<[u8]> + ?Sized + 'p,
    {
        lookup::lookup_subtree(self, path)
    }
}

/// Creates a fork over two subtrees.
pub fn fork(left: HashTree, right: HashTree) -> HashTree {
    HashTree::Fork(Box::new((left, right)))
}

/// Attaches a label to a subtree.
pub fn labeled(label: impl Into<Label>, subtree: HashTree) -> HashTree {
    HashTree::Labeled(label.into(), Box::new(subtree))
}

/// Creates a leaf holding the given bytes.
pub fn leaf(data: impl Into<Vec<u8>>) -> HashTree {
    HashTree::Leaf(data.into())
}

/// A SHA-256 hasher pre-fed with a length-prefixed domain separator.
///
/// The tag must be at most 255 bytes; all tags used here are short literals.
fn domain_sep(tag: &str) -> Sha256 {
    debug_assert!(tag.len() <= 255);
    let mut hasher = Sha256::new();
    hasher.update([tag.len() as u8]);
    hasher.update(tag.as_bytes());
    hasher
}

/// The root hash of an empty tree.
pub fn empty_hash() -> Digest {
    Digest(domain_sep(DOMAIN_HASHTREE_EMPTY).finalize().into())
}

/// The root hash of a leaf holding `data`.
pub fn leaf_hash(data: &[u8]) -> Digest {
    let mut hasher = domain_sep(DOMAIN_HASHTREE_LEAF);
    hasher.update(data);
    Digest(hasher.finalize().into())
}

/// The root hash of a labeled node over a subtree with root hash `seed`.
pub fn labeled_hash(label: &[u8], seed: &Digest) -> Digest {
    let mut hasher = domain_sep(DOMAIN_HASHTREE_LABELED);
    hasher.update(label);
    hasher.update(seed.as_bytes());
    Digest(hasher.finalize().into())
}

/// The root hash of a fork over subtrees with root hashes `left` and `right`.
pub fn fork_hash(left: &Digest, right: &Digest) -> Digest {
    let mut hasher = domain_sep(DOMAIN_HASHTREE_FORK);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Digest(hasher.finalize().into())
}

/// Collects the immediate children of a (possibly nested) fork structure.
///
/// Forks only ever group sibling nodes, so flattening them yields the list
/// of nodes at a single level of the tree, in label order.
pub fn flatten_forks(tree: &HashTree) -> Vec<&HashTree> {
    let mut nodes = Vec::new();
    collect_forks(tree, &mut nodes);
    nodes
}

fn collect_forks<'a>(tree: &'a HashTree, nodes: &mut Vec<&'a HashTree>) {
    match tree {
        HashTree::Empty => {}
        HashTree::Fork(lr) => {
            collect_forks(&lr.0, nodes);
            collect_forks(&lr.1, nodes);
        }
        other => nodes.push(other),
    }
}

impl fmt::Debug for HashTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_tree(self, f, 0)
    }
}

impl fmt::Display for HashTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_tree(self, f, 0)
    }
}

fn fmt_tree(tree: &HashTree, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    let indent = "  ".repeat(depth);
    match tree {
        HashTree::Empty => write!(f, "{indent}Empty"),
        HashTree::Fork(lr) => {
            writeln!(f, "{indent}Fork(")?;
            fmt_tree(&lr.0, f, depth + 1)?;
            writeln!(f, ",")?;
            fmt_tree(&lr.1, f, depth + 1)?;
            write!(f, "\n{indent})")
        }
        HashTree::Labeled(label, subtree) => {
            writeln!(f, "{indent}Labeled({label},")?;
            fmt_tree(subtree, f, depth + 1)?;
            write!(f, "\n{indent})")
        }
        HashTree::Leaf(data) => write!(f, "{indent}Leaf(0x{})", hex::encode(data)),
        HashTree::Pruned(digest) => write!(f, "{indent}Pruned(0x{})", hex::encode(digest.0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn interface_example_tree() -> HashTree {
        // The example tree from the public interface documentation:
        //   a -> { x -> "hello", y -> "world" }, b -> "good",
        //   c -> {}, d -> "morning"
        fork(
            fork(
                labeled(
                    "a",
                    fork(
                        fork(labeled("x", leaf(*b"hello")), HashTree::Empty),
                        labeled("y", leaf(*b"world")),
                    ),
                ),
                labeled("b", leaf(*b"good")),
            ),
            fork(
                labeled("c", HashTree::Empty),
                labeled("d", leaf(*b"morning")),
            ),
        )
    }

    #[test]
    fn leaf_digest_is_domain_separated_sha256() {
        assert_eq!(
            leaf(vec![0x01, 0x02, 0x03]).digest(),
            Digest(hex!(
                "5e3294903fd3c73721405cc07b3d32cebf0c31f65ba314294098ebbc4dfcee88"
            ))
        );
    }

    #[test]
    fn pruned_digest_is_returned_verbatim() {
        let digest = Digest([42u8; 32]);
        assert_eq!(HashTree::Pruned(digest).digest(), digest);
    }

    #[test]
    fn interface_example_tree_has_expected_root_hash() {
        assert_eq!(
            interface_example_tree().digest(),
            Digest(hex!(
                "eb5c5b2195e62d996b84c9bcc8259d19a83786a2f59e0878cec84c811f669aa0"
            ))
        );
    }

    #[test]
    fn pruning_preserves_the_root_hash() {
        let tree = interface_example_tree();
        let root = tree.digest();

        let HashTree::Fork(lr) = tree else {
            panic!("example tree must be a fork");
        };
        let pruned = fork(HashTree::Pruned(lr.0.digest()), lr.1.clone());
        assert_eq!(pruned.digest(), root);
    }

    #[test]
    fn helper_hashes_compose_like_node_digests() {
        let left = leaf(*b"hello");
        let right = labeled("lbl", leaf(*b"world"));
        assert_eq!(
            fork(left.clone(), right.clone()).digest(),
            fork_hash(&left.digest(), &right.digest())
        );
        assert_eq!(
            labeled("lbl", leaf(*b"world")).digest(),
            labeled_hash(b"lbl", &leaf_hash(b"world"))
        );
        assert_eq!(HashTree::Empty.digest(), empty_hash());
    }

    #[test]
    fn flatten_forks_yields_nodes_in_label_order() {
        let tree = interface_example_tree();
        let nodes = flatten_forks(&tree);
        let labels: Vec<_> = nodes
            .iter()
            .map(|node| match node {
                HashTree::Labeled(label, _) => label.clone(),
                other => panic!("unexpected node: {other:?}"),
            })
            .collect();
        assert_eq!(
            labels,
            vec!["a".into(), "b".into(), "c".into(), "d".into()]
        );
    }

    #[test]
    fn labels_display_as_text_or_hex() {
        assert_eq!(format!("{}", Label::from("time")), "time");
        assert_eq!(format!("{}", Label::from(vec![0x00, 0xff])), "0x00ff");
    }

    #[test]
    fn digest_debug_is_hex() {
        let digest = Digest([0xab; 32]);
        assert_eq!(
            format!("{digest:?}"),
            format!("Digest(0x{})", "ab".repeat(32))
        );
    }
}

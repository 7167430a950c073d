//! CBOR encoding of hash trees.
//!
//! A node is an array whose first element is a small integer tag:
//! `[0]` Empty, `[1, left, right]` Fork, `[2, label, subtree]` Labeled,
//! `[3, contents]` Leaf, `[4, digest]` Pruned. Labels, leaf contents, and
//! digests are CBOR byte strings.

use crate::{Digest, HashTree, Label};
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_bytes::{ByteBuf, Bytes};
use std::fmt;

impl Serialize for HashTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            HashTree::Empty => {
                let mut seq = serializer.serialize_seq(Some(1))?;
                seq.serialize_element(&0u8)?;
                seq.end()
            }
            HashTree::Fork(lr) => {
                let mut seq = serializer.serialize_seq(Some(3))?;
                seq.serialize_element(&1u8)?;
                seq.serialize_element(&lr.0)?;
                seq.serialize_element(&lr.1)?;
                seq.end()
            }
            HashTree::Labeled(label, subtree) => {
                let mut seq = serializer.serialize_seq(Some(3))?;
                seq.serialize_element(&2u8)?;
                seq.serialize_element(Bytes::new(label.as_bytes()))?;
                seq.serialize_element(subtree)?;
                seq.end()
            }
            HashTree::Leaf(data) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(&3u8)?;
                seq.serialize_element(Bytes::new(data))?;
                seq.end()
            }
            HashTree::Pruned(digest) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(&4u8)?;
                seq.serialize_element(Bytes::new(digest.as_bytes()))?;
                seq.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for HashTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(NodeVisitor)
    }
}

struct NodeVisitor;

impl<'de> Visitor<'de> for NodeVisitor {
    type Value = HashTree;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a hash tree node encoded as a tagged array")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<HashTree, A::Error> {
        let tag: u8 = required(&mut seq, 0)?;
        let node = match tag {
            0 => HashTree::Empty,
            1 => {
                let left: HashTree = required(&mut seq, 1)?;
                let right: HashTree = required(&mut seq, 2)?;
                HashTree::Fork(Box::new((left, right)))
            }
            2 => {
                let label: ByteBuf = required(&mut seq, 1)?;
                let subtree: HashTree = required(&mut seq, 2)?;
                HashTree::Labeled(Label::from(label.into_vec()), Box::new(subtree))
            }
            3 => {
                let data: ByteBuf = required(&mut seq, 1)?;
                HashTree::Leaf(data.into_vec())
            }
            4 => {
                let digest: ByteBuf = required(&mut seq, 1)?;
                let digest = Digest::try_from(&digest[..]).map_err(de::Error::custom)?;
                HashTree::Pruned(digest)
            }
            other => {
                return Err(de::Error::custom(format!(
                    "unknown hash tree node tag {other}"
                )))
            }
        };
        // A node array must not carry trailing elements.
        if seq.next_element::<de::IgnoredAny>()?.is_some() {
            return Err(de::Error::custom(format!(
                "trailing elements after hash tree node with tag {tag}"
            )));
        }
        Ok(node)
    }
}

fn required<'de, T: Deserialize<'de>, A: SeqAccess<'de>>(
    seq: &mut A,
    index: usize,
) -> Result<T, A::Error> {
    seq.next_element()?
        .ok_or_else(|| de::Error::invalid_length(index, &"a complete hash tree node"))
}

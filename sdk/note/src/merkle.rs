//! Anonymity Set
//!
//! A read-only view over the ordered list of published commitments.
//!
//! ```text
//!                    Root
//!                   /    \
//!                 H01    H23
//!                /  \   /   \
//!               C0  C1 C2   Z0     (Z = empty-subtree filler)
//! ```
//!
//! [`TreeSnapshot`] is built once per withdrawal attempt from the ledger's
//! deposit events and never mutated. [`TreeFrontier`] and [`RootHistory`] are
//! the ledger-side counterparts: append-only root tracking and the window of
//! roots a withdrawal may reference.

use std::collections::VecDeque;
use std::fmt;

use crate::error::{ProtocolError, Result};
use crate::field::FieldElement;
use crate::mimc::{hash_pair, zero_roots};

/// Default tree height (supports 2^20 deposits)
pub const DEFAULT_TREE_HEIGHT: usize = 20;

/// Largest supported tree height
pub const MAX_TREE_HEIGHT: usize = 32;

fn check_height(height: usize) -> Result<()> {
    if height == 0 || height > MAX_TREE_HEIGHT {
        return Err(ProtocolError::InvalidTreeHeight(height));
    }
    Ok(())
}

/// A membership witness for one leaf
#[derive(Clone, PartialEq, Eq)]
pub struct MembershipWitness {
    /// The committed leaf this witness is for
    pub leaf: FieldElement,
    /// Position of the leaf
    pub leaf_index: u64,
    /// Root the path climbs to
    pub root: FieldElement,
    /// Sibling hashes from leaf to root
    pub path_elements: Vec<FieldElement>,
    /// Position bits (0 = current node is left, 1 = right)
    pub path_indices: Vec<u8>,
}

impl MembershipWitness {
    /// Climb from the leaf to the root
    pub fn compute_root(&self) -> FieldElement {
        let mut current = self.leaf;
        for (sibling, bit) in self.path_elements.iter().zip(self.path_indices.iter()) {
            current = if *bit == 1 {
                hash_pair(sibling, &current)
            } else {
                hash_pair(&current, sibling)
            };
        }
        current
    }

    /// Check the path reproduces the recorded root
    pub fn verify(&self) -> bool {
        self.path_elements.len() == self.path_indices.len()
            && self.path_indices.iter().all(|b| *b <= 1)
            && self.compute_root() == self.root
    }

    pub fn depth(&self) -> usize {
        self.path_elements.len()
    }
}

// Path data is a private proof input; only the root is shown.
impl fmt::Debug for MembershipWitness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MembershipWitness")
            .field("root", &self.root)
            .field("depth", &self.depth())
            .finish_non_exhaustive()
    }
}

/// Immutable commitment tree built from a snapshot of deposit events
#[derive(Clone)]
pub struct TreeSnapshot {
    height: usize,
    /// layers[0] = leaves, layers[height] = [root] (empty for an empty tree)
    layers: Vec<Vec<FieldElement>>,
    zeros: Vec<FieldElement>,
}

impl TreeSnapshot {
    /// Build from `(leaf_index, commitment)` pairs in any order
    ///
    /// Events are sorted by leaf index first; the indices must then be
    /// exactly `0..n`.
    pub fn build<I>(height: usize, events: I) -> Result<Self>
    where
        I: IntoIterator<Item = (u64, FieldElement)>,
    {
        check_height(height)?;

        let mut events: Vec<(u64, FieldElement)> = events.into_iter().collect();
        events.sort_by_key(|(index, _)| *index);

        let capacity = 1u64 << height;
        if events.len() as u64 > capacity {
            return Err(ProtocolError::TreeFull { height, capacity });
        }

        let mut leaves = Vec::with_capacity(events.len());
        for (expected, (index, commitment)) in (0u64..).zip(events) {
            if index != expected {
                return Err(ProtocolError::NonContiguousLeaves {
                    expected,
                    found: index,
                });
            }
            leaves.push(commitment);
        }

        let zeros = zero_roots(height);
        let mut layers = Vec::with_capacity(height + 1);
        layers.push(leaves);

        for level in 0..height {
            let next: Vec<FieldElement> = layers[level]
                .chunks(2)
                .map(|pair| {
                    let right = pair.get(1).unwrap_or(&zeros[level]);
                    hash_pair(&pair[0], right)
                })
                .collect();
            layers.push(next);
        }

        let snapshot = Self {
            height,
            layers,
            zeros,
        };
        log::debug!(
            "Built anonymity set snapshot: {} leaves, height {}, root {}",
            snapshot.len(),
            height,
            snapshot.root()
        );
        Ok(snapshot)
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of populated leaves
    pub fn len(&self) -> u64 {
        self.leaves().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.leaves().is_empty()
    }

    pub fn leaves(&self) -> &[FieldElement] {
        &self.layers[0]
    }

    /// Root over the populated leaves and empty fillers
    pub fn root(&self) -> FieldElement {
        self.layers[self.height]
            .first()
            .copied()
            .unwrap_or(self.zeros[self.height])
    }

    /// Leaf index of a commitment
    pub fn locate(&self, commitment: &FieldElement) -> Result<u64> {
        self.leaves()
            .iter()
            .position(|leaf| leaf == commitment)
            .map(|i| i as u64)
            .ok_or_else(|| ProtocolError::CommitmentNotFound {
                commitment: commitment.to_hex(),
            })
    }

    /// Membership witness for a populated leaf
    pub fn path(&self, leaf_index: u64) -> Result<MembershipWitness> {
        let populated = self.len();
        if leaf_index >= populated {
            return Err(ProtocolError::IndexOutOfRange {
                index: leaf_index,
                populated,
            });
        }

        let mut path_elements = Vec::with_capacity(self.height);
        let mut path_indices = Vec::with_capacity(self.height);
        let mut index = leaf_index as usize;

        for level in 0..self.height {
            path_indices.push((index & 1) as u8);
            let sibling = self.layers[level]
                .get(index ^ 1)
                .copied()
                .unwrap_or(self.zeros[level]);
            path_elements.push(sibling);
            index >>= 1;
        }

        Ok(MembershipWitness {
            leaf: self.layers[0][leaf_index as usize],
            leaf_index,
            root: self.root(),
            path_elements,
            path_indices,
        })
    }
}

impl fmt::Debug for TreeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeSnapshot")
            .field("height", &self.height)
            .field("leaves", &self.len())
            .field("root", &self.root())
            .finish()
    }
}

/// Frontier for append-only root tracking
///
/// Stores the rightmost left-child at each level, enough to produce the new
/// root after every append in O(height).
#[derive(Debug, Clone)]
pub struct TreeFrontier {
    height: usize,
    frontier: Vec<Option<FieldElement>>,
    zeros: Vec<FieldElement>,
    next_position: u64,
    root: FieldElement,
}

impl TreeFrontier {
    /// Create an empty frontier
    pub fn new(height: usize) -> Result<Self> {
        check_height(height)?;
        let zeros = zero_roots(height);
        let root = zeros[height];
        Ok(Self {
            height,
            frontier: vec![None; height],
            zeros,
            next_position: 0,
            root,
        })
    }

    /// Append a leaf, returning its position
    pub fn append(&mut self, leaf: FieldElement) -> Result<u64> {
        let capacity = 1u64 << self.height;
        if self.next_position >= capacity {
            return Err(ProtocolError::TreeFull {
                height: self.height,
                capacity,
            });
        }

        let position = self.next_position;
        let mut current = leaf;
        let mut current_position = position;

        for level in 0..self.height {
            if current_position & 1 == 1 {
                // We're on the right, so there's a left sibling in frontier
                let left = self.frontier[level].unwrap_or(self.zeros[level]);
                current = hash_pair(&left, &current);
            } else {
                // We're on the left, store in frontier and use empty for right
                self.frontier[level] = Some(current);
                current = hash_pair(&current, &self.zeros[level]);
            }
            current_position >>= 1;
        }

        self.next_position += 1;
        self.root = current;
        Ok(position)
    }

    pub fn root(&self) -> FieldElement {
        self.root
    }

    pub fn next_position(&self) -> u64 {
        self.next_position
    }
}

/// Root history for the commitment tree
///
/// Stores recent roots so a withdrawal built against a slightly stale
/// snapshot is still accepted.
#[derive(Debug, Clone)]
pub struct RootHistory {
    /// Recent roots (most recent first)
    roots: VecDeque<FieldElement>,
    /// Maximum history size
    max_size: usize,
}

impl RootHistory {
    pub fn new(max_size: usize) -> Self {
        Self {
            roots: VecDeque::new(),
            max_size: max_size.max(1),
        }
    }

    /// Add a new root
    pub fn push(&mut self, root: FieldElement) {
        self.roots.push_front(root);
        self.roots.truncate(self.max_size);
    }

    /// Check if a root is valid (current or recent)
    pub fn is_known(&self, root: &FieldElement) -> bool {
        self.roots.contains(root)
    }

    /// Get the most recent root
    pub fn current(&self) -> Option<&FieldElement> {
        self.roots.front()
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

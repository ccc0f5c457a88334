//! Maps between keyed local blocks and global vectors.
use crate::interface::{InterfaceId, SubdomainId};
use nalgebra::{DVector, DVectorView, Scalar};
use num::Zero;
use std::collections::BTreeMap;
use std::ops::Range;

/// Bidirectional map between keyed local blocks and contiguous ranges of a global vector.
///
/// Blocks are laid out back to back in insertion order, so the ranges partition
/// `0 .. size()` without gaps or overlaps. Blocks may be empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DofMap<K> {
    blocks: Vec<(K, Range<usize>)>,
    positions: BTreeMap<K, usize>,
    size: usize,
}

impl<K: Ord + Copy> Default for DofMap<K> {
    fn default() -> Self {
        Self {
            blocks: Vec::new(),
            positions: BTreeMap::new(),
            size: 0,
        }
    }
}

impl<K: Ord + Copy> DofMap<K> {
    /// Lays out blocks of the given lengths contiguously in iteration order.
    ///
    /// # Panics
    ///
    /// Panics if a key appears more than once.
    pub fn from_block_lengths(lengths: impl IntoIterator<Item = (K, usize)>) -> Self {
        let mut map = Self::default();
        for (key, length) in lengths {
            map.push_block(key, length);
        }
        map
    }

    fn push_block(&mut self, key: K, length: usize) {
        let range = self.size..self.size + length;
        let previous = self.positions.insert(key, self.blocks.len());
        assert!(previous.is_none(), "Duplicate block key in DOF map");
        self.blocks.push((key, range));
        self.size += length;
    }

    /// Total number of global degrees of freedom.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.positions.contains_key(key)
    }

    /// Global range of the block with the given key (local to global).
    pub fn range(&self, key: &K) -> Option<Range<usize>> {
        self.positions
            .get(key)
            .map(|&position| self.blocks[position].1.clone())
    }

    /// Block key and local index of a global degree of freedom (global to local).
    pub fn locate(&self, global_index: usize) -> Option<(K, usize)> {
        if global_index >= self.size {
            return None;
        }
        // The first block ending after the index contains it, since ranges are contiguous
        let position = self
            .blocks
            .partition_point(|(_, range)| range.end <= global_index);
        self.blocks
            .get(position)
            .map(|(key, range)| (*key, global_index - range.start))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &Range<usize>)> {
        self.blocks.iter().map(|(key, range)| (key, range))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.blocks.iter().map(|(key, _)| key)
    }

    /// Splits a global vector into its local blocks.
    pub fn scatter<T: Scalar>(&self, global: DVectorView<T>) -> BTreeMap<K, DVector<T>> {
        assert_eq!(global.len(), self.size, "Global vector does not match DOF map size");
        self.blocks
            .iter()
            .map(|(key, range)| (*key, global.rows(range.start, range.len()).clone_owned()))
            .collect()
    }

    /// Assembles local blocks into a global vector. Missing blocks are left as zero.
    pub fn gather<T: Scalar + Zero>(&self, local: &BTreeMap<K, DVector<T>>) -> DVector<T> {
        let mut global = DVector::zeros(self.size);
        for (key, range) in &self.blocks {
            if let Some(block) = local.get(key) {
                assert_eq!(block.len(), range.len(), "Local block does not match its global range");
                global.rows_mut(range.start, range.len()).copy_from(block);
            }
        }
        global
    }
}

/// The global layout of the coarse (alpha) and interface (lambda) unknowns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalMapping {
    /// One block per floating subdomain, sized by its kernel dimension.
    pub alpha: DofMap<SubdomainId>,
    /// One block per canonical interface, sized by its number of interface dofs.
    pub lambda: DofMap<InterfaceId>,
}

impl GlobalMapping {
    pub fn alpha_size(&self) -> usize {
        self.alpha.size()
    }

    pub fn lambda_size(&self) -> usize {
        self.lambda.size()
    }
}

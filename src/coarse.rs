//! Block storage and scatter-assembly of the coarse (rigid body) problem.
use crate::interface::{InterfaceId, SubdomainId};
use crate::mapping::DofMap;
use feti_traits::Real;
use nalgebra::{DMatrix, DVector, Scalar};
use num::Zero;
use rustc_hash::FxHashMap;
use std::ops::AddAssign;

/// Column part of a coarse block key.
///
/// Coarse blocks are stored under `(row owner, BlockKey)`. Subdomain-keyed blocks are square
/// couplings between two floating subdomains (`GGT`), interface-keyed blocks couple the
/// rigid body modes of the row owner to the multipliers of one interface (`G`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BlockKey {
    Subdomain(SubdomainId),
    Interface(InterfaceId),
}

/// Keys of a column DOF map, resolved against the owner of the current block row.
pub trait ColumnKey: Ord + Copy {
    /// Returns the block key to look up for the given row owner, or `None` if no block of
    /// this column can belong to that row.
    fn block_key(&self, row: SubdomainId) -> Option<BlockKey>;
}

impl ColumnKey for SubdomainId {
    fn block_key(&self, _row: SubdomainId) -> Option<BlockKey> {
        Some(BlockKey::Subdomain(*self))
    }
}

impl ColumnKey for InterfaceId {
    fn block_key(&self, row: SubdomainId) -> Option<BlockKey> {
        self.contains(row).then_some(BlockKey::Interface(*self))
    }
}

pub type BlockMatrices<T> = FxHashMap<(SubdomainId, BlockKey), DMatrix<T>>;

/// Per-block contributions to the coarse problem: `G`, `GGT` and `e`.
#[derive(Debug, Clone)]
pub struct CoarseProblem<T: Scalar> {
    g_blocks: BlockMatrices<T>,
    ggt_blocks: BlockMatrices<T>,
    e_blocks: FxHashMap<SubdomainId, DVector<T>>,
}

impl<T: Scalar> Default for CoarseProblem<T> {
    fn default() -> Self {
        Self {
            g_blocks: Default::default(),
            ggt_blocks: Default::default(),
            e_blocks: Default::default(),
        }
    }
}

impl<T: Real> CoarseProblem<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the `G` block of `owner` at `interface`, replacing any previous block.
    pub fn update_g(&mut self, owner: SubdomainId, interface: InterfaceId, block: DMatrix<T>) {
        self.g_blocks
            .insert((owner, BlockKey::Interface(interface)), block);
    }

    pub fn update_ggt(&mut self, row: SubdomainId, col: SubdomainId, block: DMatrix<T>) {
        self.ggt_blocks
            .insert((row, BlockKey::Subdomain(col)), block);
    }

    /// Adds to the `GGT` block `(row, col)`, creating it if necessary.
    pub fn add_to_ggt(&mut self, row: SubdomainId, col: SubdomainId, block: DMatrix<T>) {
        self.ggt_blocks
            .entry((row, BlockKey::Subdomain(col)))
            .and_modify(|existing| *existing += &block)
            .or_insert(block);
    }

    pub fn update_e(&mut self, owner: SubdomainId, e: DVector<T>) {
        self.e_blocks.insert(owner, e);
    }

    pub fn g_block(&self, owner: SubdomainId, interface: InterfaceId) -> Option<&DMatrix<T>> {
        self.g_blocks
            .get(&(owner, BlockKey::Interface(interface)))
    }

    pub fn ggt_block(&self, row: SubdomainId, col: SubdomainId) -> Option<&DMatrix<T>> {
        self.ggt_blocks.get(&(row, BlockKey::Subdomain(col)))
    }

    pub fn e_block(&self, owner: SubdomainId) -> Option<&DVector<T>> {
        self.e_blocks.get(&owner)
    }

    pub fn g_blocks(&self) -> &BlockMatrices<T> {
        &self.g_blocks
    }

    pub fn ggt_blocks(&self) -> &BlockMatrices<T> {
        &self.ggt_blocks
    }

    /// `G` with shape `(alpha_size, lambda_size)`.
    pub fn assemble_g(&self, alpha_map: &DofMap<SubdomainId>, lambda_map: &DofMap<InterfaceId>) -> DMatrix<T> {
        let shape = (alpha_map.size(), lambda_map.size());
        assemble_block_matrix(&self.g_blocks, alpha_map, lambda_map, shape)
    }

    /// `G G^T` with shape `(alpha_size, alpha_size)`.
    pub fn assemble_ggt(&self, alpha_map: &DofMap<SubdomainId>) -> DMatrix<T> {
        let shape = (alpha_map.size(), alpha_map.size());
        assemble_block_matrix(&self.ggt_blocks, alpha_map, alpha_map, shape)
    }

    pub fn assemble_e(&self, alpha_map: &DofMap<SubdomainId>) -> DVector<T> {
        assemble_block_vector(&self.e_blocks, alpha_map, alpha_map.size())
    }
}

/// Places every block `(row, col)` at the global ranges given by the row and column maps.
///
/// Column keys are resolved per row owner through [`ColumnKey::block_key`], which filters
/// out interface blocks not owned by the row. Blocks absent from `blocks` are zero.
///
/// # Panics
///
/// Panics if a block does not match the size of its row and column ranges.
pub fn assemble_block_matrix<T, K>(
    blocks: &BlockMatrices<T>,
    row_map: &DofMap<SubdomainId>,
    col_map: &DofMap<K>,
    shape: (usize, usize),
) -> DMatrix<T>
where
    T: Scalar + Zero + AddAssign,
    K: ColumnKey,
{
    let mut matrix = DMatrix::zeros(shape.0, shape.1);
    for (row_key, rows) in row_map.iter() {
        for (col_key, cols) in col_map.iter() {
            let Some(block_key) = col_key.block_key(*row_key) else { continue };
            let Some(block) = blocks.get(&(*row_key, block_key)) else { continue };
            assert_eq!(
                block.shape(),
                (rows.len(), cols.len()),
                "Coarse block does not match the size of its global ranges"
            );
            let mut target = matrix.view_mut((rows.start, cols.start), (rows.len(), cols.len()));
            for (t, b) in target.iter_mut().zip(block.iter()) {
                *t += b.clone();
            }
        }
    }
    matrix
}

/// Scatter-adds keyed vectors into a vector of the given length.
pub fn assemble_block_vector<T>(
    blocks: &FxHashMap<SubdomainId, DVector<T>>,
    map: &DofMap<SubdomainId>,
    length: usize,
) -> DVector<T>
where
    T: Scalar + Zero + AddAssign,
{
    let mut vector = DVector::zeros(length);
    for (key, rows) in map.iter() {
        if let Some(block) = blocks.get(key) {
            assert_eq!(block.len(), rows.len(), "Coarse block does not match the size of its global range");
            for (t, b) in vector.rows_mut(rows.start, rows.len()).iter_mut().zip(block.iter()) {
                *t += b.clone();
            }
        }
    }
    vector
}

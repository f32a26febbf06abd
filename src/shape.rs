//! Shapes, blocks and selections.
//!
//! A variable has a global shape (empty for local variables), and each contributor writes one [`Block`] of it per step.
//! A reader selects a rectangular [`ArraySubset`] of the global shape.
//! All linearisation is row-major: the last dimension varies fastest.

use derive_more::Display;
use itertools::izip;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::array_subset::ArraySubset;

/// The kind of a variable, inferred from its dimensions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeId {
    /// A globally shaped array written as blocks.
    #[display("global_array")]
    GlobalArray,
    /// An array with no global shape. Each contributor writes an independent block.
    #[display("local_array")]
    LocalArray,
    /// A single value per step.
    #[display("global_value")]
    GlobalValue,
    /// A single value per contributor per step, read back as a 1-D array.
    #[display("local_value")]
    LocalValue,
}

impl ShapeId {
    /// Infer the shape id of a variable from its shape and block count.
    ///
    /// [`ShapeId::LocalValue`] is never inferred, it must be requested explicitly.
    #[must_use]
    pub fn infer(shape: &[u64], count: &[u64]) -> Self {
        if !shape.is_empty() {
            Self::GlobalArray
        } else if !count.is_empty() {
            Self::LocalArray
        } else {
            Self::GlobalValue
        }
    }

    /// Returns true if the variable holds one value per step or contributor.
    #[must_use]
    pub fn is_value(&self) -> bool {
        matches!(self, Self::GlobalValue | Self::LocalValue)
    }
}

/// A block of a variable contributed by one writer in one step.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize)]
#[display("start {start:?} count {count:?}")]
pub struct Block {
    /// The start of the block in global coordinates.
    pub start: Vec<u64>,
    /// The extent of the block in each dimension.
    pub count: Vec<u64>,
}

impl Block {
    /// Create a new block.
    #[must_use]
    pub fn new(start: Vec<u64>, count: Vec<u64>) -> Self {
        Self { start, count }
    }

    /// Return the number of elements in the block.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.count.iter().product()
    }

    /// Return the block as an [`ArraySubset`].
    ///
    /// A block with an empty start (a local array block) starts at the origin.
    #[must_use]
    pub fn to_subset(&self) -> ArraySubset {
        if self.start.len() == self.count.len() {
            ArraySubset::new_with_ranges(
                &std::iter::zip(&self.start, &self.count)
                    .map(|(&start, &count)| start..start.saturating_add(count))
                    .collect::<Vec<_>>(),
            )
        } else {
            ArraySubset::new_with_shape(self.count.clone())
        }
    }
}

/// The overlap of a block and a selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockIntersection {
    /// The overlap in global coordinates.
    pub global: ArraySubset,
    /// The overlap relative to the start of the block.
    pub in_block: ArraySubset,
    /// The overlap relative to the start of the selection.
    pub in_selection: ArraySubset,
}

/// An invalid shape error.
#[derive(Clone, Debug, Error)]
#[error("invalid shape for variable {name}: {reason}")]
pub struct InvalidShapeError {
    name: String,
    reason: String,
}

impl InvalidShapeError {
    /// Create a new invalid shape error.
    #[must_use]
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// The name of the offending variable.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A selection outside the extent of a variable.
#[derive(Clone, Debug, Error)]
#[error("selection {selection} of variable {name} is outside its shape {shape:?} at step {step}")]
pub struct SelectionRangeError {
    name: String,
    selection: ArraySubset,
    shape: Vec<u64>,
    step: u64,
}

impl SelectionRangeError {
    /// Create a new selection range error.
    #[must_use]
    pub fn new(name: impl Into<String>, selection: ArraySubset, shape: Vec<u64>, step: u64) -> Self {
        Self {
            name: name.into(),
            selection,
            shape,
            step,
        }
    }

    /// The name of the offending variable.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Returns true if `block` is a valid block of a variable with global shape `shape`.
///
/// For a global array, the ranks must agree, every `count[i] >= 1` and `start[i] + count[i] <= shape[i]`.
/// For a local array (empty `shape`), every `count[i] >= 1` and `start` must be empty or all zero.
/// A value has an empty shape and an empty block.
#[must_use]
pub fn validate_block(shape: &[u64], block: &Block) -> bool {
    if shape.is_empty() {
        let start_ok = block.start.is_empty()
            || (block.start.len() == block.count.len() && block.start.iter().all(|&s| s == 0));
        return start_ok && block.count.iter().all(|&c| c >= 1);
    }
    if block.start.len() != shape.len() || block.count.len() != shape.len() {
        return false;
    }
    izip!(shape, &block.start, &block.count).all(|(&size, &start, &count)| {
        count >= 1 && start.checked_add(count).is_some_and(|end| end <= size)
    })
}

/// Return the number of elements in a selection.
///
/// This is 1 for a rank-0 selection.
#[must_use]
pub fn selection_element_count(selection: &ArraySubset) -> u64 {
    selection.num_elements()
}

/// Compute the overlap of a block with a selection.
///
/// Returns [`None`] if they are disjoint or their ranks differ.
#[must_use]
pub fn block_intersect(block: &Block, selection: &ArraySubset) -> Option<BlockIntersection> {
    let block_subset = block.to_subset();
    let global = block_subset.overlap(selection).ok()?;
    if global.is_empty() {
        return None;
    }
    let in_block = global.relative_to(block_subset.start()).ok()?;
    let in_selection = global.relative_to(selection.start()).ok()?;
    Some(BlockIntersection {
        global,
        in_block,
        in_selection,
    })
}

/// Ravel N-dimensional indices to a linearised index.
#[must_use]
pub fn ravel_indices(indices: &[u64], shape: &[u64]) -> u64 {
    let mut index: u64 = 0;
    let mut count = 1;
    for (i, s) in std::iter::zip(indices, shape).rev() {
        index += i * count;
        count *= s;
    }
    index
}

/// Unravel a linearised index to N-dimensional indices.
#[must_use]
pub fn unravel_index(mut index: u64, shape: &[u64]) -> Vec<u64> {
    let mut indices = vec![0; shape.len()];
    for (indices_i, &dim) in std::iter::zip(indices.iter_mut().rev(), shape.iter().rev()) {
        if dim == 0 {
            continue;
        }
        *indices_i = index % dim;
        index /= dim;
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_id_infer() {
        assert_eq!(ShapeId::infer(&[10], &[10]), ShapeId::GlobalArray);
        assert_eq!(ShapeId::infer(&[], &[4]), ShapeId::LocalArray);
        assert_eq!(ShapeId::infer(&[], &[]), ShapeId::GlobalValue);
        assert!(ShapeId::LocalValue.is_value());
    }

    #[test]
    fn validate_block_global() {
        let shape = [10, 20];
        assert!(validate_block(&shape, &Block::new(vec![0, 0], vec![10, 20])));
        assert!(validate_block(&shape, &Block::new(vec![5, 10], vec![5, 10])));
        assert!(!validate_block(&shape, &Block::new(vec![5, 10], vec![6, 10])));
        assert!(!validate_block(&shape, &Block::new(vec![0, 0], vec![0, 20])));
        assert!(!validate_block(&shape, &Block::new(vec![0], vec![10])));
        assert!(!validate_block(&shape, &Block::new(vec![0, u64::MAX], vec![1, 2])));
    }

    #[test]
    fn validate_block_exhaustive_1d() {
        for size in 0..5u64 {
            for start in 0..6u64 {
                for count in 0..6u64 {
                    let expected = count >= 1 && start + count <= size;
                    assert_eq!(
                        validate_block(&[size], &Block::new(vec![start], vec![count])),
                        expected
                    );
                }
            }
        }
    }

    #[test]
    fn validate_block_local_and_value() {
        assert!(validate_block(&[], &Block::new(vec![], vec![3, 4])));
        assert!(validate_block(&[], &Block::new(vec![0, 0], vec![3, 4])));
        assert!(!validate_block(&[], &Block::new(vec![1, 0], vec![3, 4])));
        assert!(!validate_block(&[], &Block::new(vec![], vec![3, 0])));
        assert!(validate_block(&[], &Block::default()));
    }

    #[test]
    fn block_intersection() {
        let block = Block::new(vec![50, 0], vec![50, 50]);
        let selection = ArraySubset::new_with_ranges(&[40..60, 10..20]);
        let intersection = block_intersect(&block, &selection).unwrap();
        assert_eq!(
            intersection.global,
            ArraySubset::new_with_ranges(&[50..60, 10..20])
        );
        assert_eq!(
            intersection.in_block,
            ArraySubset::new_with_ranges(&[0..10, 10..20])
        );
        assert_eq!(
            intersection.in_selection,
            ArraySubset::new_with_ranges(&[10..20, 0..10])
        );
        assert_eq!(selection_element_count(&intersection.global), 100);

        let disjoint = ArraySubset::new_with_ranges(&[0..50, 0..50]);
        assert!(block_intersect(&block, &disjoint).is_none());
        assert!(block_intersect(&block, &ArraySubset::new_with_ranges(&[0..10])).is_none());
    }

    #[test]
    fn block_intersection_rank0() {
        let intersection = block_intersect(&Block::default(), &ArraySubset::default()).unwrap();
        assert_eq!(selection_element_count(&intersection.global), 1);
    }

    #[test]
    fn ravel_unravel() {
        let shape = [2, 3, 4];
        assert_eq!(ravel_indices(&[1, 2, 3], &shape), 23);
        assert_eq!(unravel_index(23, &shape), vec![1, 2, 3]);
        for index in 0..24 {
            assert_eq!(ravel_indices(&unravel_index(index, &shape), &shape), index);
        }
        assert_eq!(ravel_indices(&[], &[]), 0);
        assert!(unravel_index(0, &[]).is_empty());
    }
}

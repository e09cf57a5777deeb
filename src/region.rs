//! Genomic regions and the overlap state machine used while filtering
//! records after an index jump.

/// A genomic region, allowed to span multiple sequential references.
///
/// Bounds are zero-based. A bound is "specified" when both its reference
/// id and position are non-negative (the right position must be ≥ 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BamRegion {
    pub left_ref_id: i32,
    pub left_position: i32,
    pub right_ref_id: i32,
    pub right_position: i32,
}

impl Default for BamRegion {
    fn default() -> Self {
        BamRegion {
            left_ref_id: -1,
            left_position: -1,
            right_ref_id: -1,
            right_position: -1,
        }
    }
}

impl BamRegion {
    /// Region with a left bound only: everything from `(ref, pos)` onward.
    pub fn from(left_ref_id: i32, left_position: i32) -> Self {
        BamRegion {
            left_ref_id,
            left_position,
            right_ref_id: -1,
            right_position: -1,
        }
    }

    /// Fully bounded region.
    pub fn new(
        left_ref_id: i32,
        left_position: i32,
        right_ref_id: i32,
        right_position: i32,
    ) -> Self {
        BamRegion {
            left_ref_id,
            left_position,
            right_ref_id,
            right_position,
        }
    }

    pub fn clear(&mut self) {
        *self = BamRegion::default();
    }

    pub fn is_left_bound_specified(&self) -> bool {
        self.left_ref_id >= 0 && self.left_position >= 0
    }

    pub fn is_right_bound_specified(&self) -> bool {
        self.right_ref_id >= 0 && self.right_position >= 1
    }

    pub fn is_null(&self) -> bool {
        !self.is_left_bound_specified() && !self.is_right_bound_specified()
    }
}

/// Where a record falls relative to a region, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    /// Ends before the region; keep scanning.
    Before,
    /// Overlaps the region; deliver.
    Within,
    /// Starts after the region; end of the regional stream.
    After,
}

// schedule.rs — Per-edgeset schedule metadata
//
// A schedule record exists for an (edgeset, label) pair only when that pair
// is referenced by at least one traversal in the program. The record is the
// backend's entire view of the user's scheduling directives for that
// traversal: segmentation, NUMA placement, and the merge reduction used to
// fold NUMA replicas back into the shared buffer.
//
// Records are populated by the (external) front end, resolved into layout
// directives by lower.rs, and consulted read-only by traversal.rs/codegen.rs.

use serde::{Deserialize, Serialize};

use crate::mir::{ReduceOp, ScalarTy};

/// NUMA merge-reduce metadata: what is replicated per placement domain and
/// how replicas fold back into the shared buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeReduce {
    pub scalar_ty: ScalarTy,
    pub field: String,
    pub reduce_op: ReduceOp,
}

/// Schedule directives for one (edgeset, label) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    #[serde(default)]
    pub numa_aware: bool,
    /// Segment count for cache-partitioned traversal. Non-negative values
    /// are literal counts; a negative value `-i` means "read the count from
    /// runtime argument `i`". `None` leaves the edgeset monolithic.
    #[serde(default)]
    pub num_segments: Option<i32>,
    /// Present exactly when `numa_aware` is set.
    #[serde(default)]
    pub merge: Option<MergeReduce>,
}

impl ScheduleRecord {
    pub fn segmented(num_segments: i32) -> Self {
        ScheduleRecord {
            numa_aware: false,
            num_segments: Some(num_segments),
            merge: None,
        }
    }

    pub fn numa(num_segments: i32, scalar_ty: ScalarTy, field: impl Into<String>, reduce_op: ReduceOp) -> Self {
        ScheduleRecord {
            numa_aware: true,
            num_segments: Some(num_segments),
            merge: Some(MergeReduce {
                scalar_ty,
                field: field.into(),
                reduce_op,
            }),
        }
    }
}

// lower.rs — Physical layout lowering
//
// Resolves schedule metadata and property-collection shapes into concrete
// layout decisions: typedef interning for nested property vectors,
// segmented-build directives, NUMA replica directives, and the functor
// calling-convention set. Pure bookkeeping — no code text is produced
// here; codegen.rs acts on the decorations when it reaches the matching
// output section or the entry routine.
//
// Decisions are stored in decoration maps keyed by declaration name, not
// written back onto MIR nodes, so codegen can consume the registry
// read-only.
//
// Preconditions: registry populated by the front end.
// Postconditions: every nested property vector has an interned typedef
//   identity; every scheduled edgeset has its segment directive resolved.
// Failure modes: unsupported property shape, numa record without merge
//   metadata, typedef identity interned twice with different shapes.
// Side effects: none.

use std::collections::{HashMap, HashSet};

use crate::diag::{BackendError, Result};
use crate::mir::{FuncKind, ReduceOp, ScalarTy, Ty, VectorTy};
use crate::registry::ProgramRegistry;

// ── Directives ──────────────────────────────────────────────────────────────

/// Resolved segment count for a segmented-build call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentCount {
    Literal(u32),
    /// Read the count from the runtime-argument vector at this index,
    /// bounds-checked against `argc`.
    RuntimeArg(u32),
}

/// A segmented-graph build the entry routine must issue, once, before any
/// user statement. Later traversals reuse the segmentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentBuild {
    pub edgeset: String,
    pub label: String,
    pub count: SegmentCount,
    pub numa_aware: bool,
}

/// A per-placement-domain replica buffer the entry routine must allocate
/// and populate before user code, and free after it.
#[derive(Debug, Clone, PartialEq)]
pub struct NumaReplica {
    pub edgeset: String,
    pub label: String,
    pub field: String,
    pub scalar_ty: ScalarTy,
    pub reduce_op: ReduceOp,
    /// Derived global replica-array name (`local_<field>`).
    pub local_name: String,
}

/// One deduplicated typedef declaration for a fixed-range vector payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedefDecl {
    pub name: String,
    pub item: Ty,
    pub range: u32,
}

// ── Lowered layout ──────────────────────────────────────────────────────────

/// Decorations produced by the lowering pass, consumed read-only by codegen.
#[derive(Debug, Default)]
pub struct LoweredLayout {
    typedefs: Vec<TypedefDecl>,
    typedef_index: HashMap<String, usize>,
    /// Property-vector constant name → typedef name for its element.
    pub vector_typedefs: HashMap<String, String>,
    pub segment_builds: Vec<SegmentBuild>,
    pub numa_replicas: Vec<NumaReplica>,
    functors: HashSet<String>,
}

impl LoweredLayout {
    /// Typedef declarations in first-reference order.
    pub fn typedefs(&self) -> &[TypedefDecl] {
        &self.typedefs
    }

    /// Whether a function is emitted under the functor calling convention.
    pub fn is_functor(&self, name: &str) -> bool {
        self.functors.contains(name)
    }

    /// Intern a typedef identity for a fixed-range vector payload. Identical
    /// shapes collapse to one identity; the same identity re-requested with
    /// a different shape is an internal inconsistency.
    fn intern_typedef(&mut self, vec: &VectorTy) -> Result<String> {
        let name = vec.canonical_name();
        if let Some(&idx) = self.typedef_index.get(&name) {
            let existing = &self.typedefs[idx];
            if existing.item != *vec.item || existing.range != vec.range {
                return Err(BackendError::inconsistency(format!(
                    "typedef '{}' requested twice with different shapes",
                    name
                )));
            }
            return Ok(name);
        }
        self.typedef_index.insert(name.clone(), self.typedefs.len());
        self.typedefs.push(TypedefDecl {
            name: name.clone(),
            item: (*vec.item).clone(),
            range: vec.range,
        });
        Ok(name)
    }
}

// ── Entry point ─────────────────────────────────────────────────────────────

pub fn lower_layout(registry: &ProgramRegistry) -> Result<LoweredLayout> {
    let mut lowered = LoweredLayout::default();

    // Property-vector constants: nested fixed-range vectors get a typedef'd
    // array-of-small-array element; plain scalars stay flat. Purely
    // structural — no value inspection.
    for constant in &registry.constants {
        let Ty::Vector(vector) = &constant.ty else {
            continue;
        };
        match vector.item.as_ref() {
            Ty::Scalar(_) => {}
            Ty::Vector(inner) => {
                if inner.range == 0 {
                    return Err(BackendError::unsupported(
                        "unsized nested vector element",
                        &constant.name,
                    ));
                }
                let typedef = lowered.intern_typedef(inner)?;
                lowered
                    .vector_typedefs
                    .insert(constant.name.clone(), typedef);
            }
            _ => {
                return Err(BackendError::unsupported(
                    "property element shape",
                    &constant.name,
                ));
            }
        }
    }

    // Schedule records: resolve the segment-count sign convention and
    // collect NUMA replica directives.
    for (edgeset, label, record) in registry.schedules() {
        if let Some(n) = record.num_segments {
            let count = if n < 0 {
                SegmentCount::RuntimeArg((-n) as u32)
            } else {
                SegmentCount::Literal(n as u32)
            };
            lowered.segment_builds.push(SegmentBuild {
                edgeset: edgeset.to_string(),
                label: label.to_string(),
                count,
                numa_aware: record.numa_aware,
            });
        }
        if record.numa_aware {
            let merge = record.merge.as_ref().ok_or_else(|| {
                BackendError::inconsistency(format!(
                    "numa-aware schedule for '{}':'{}' has no merge metadata",
                    edgeset, label
                ))
            })?;
            lowered.numa_replicas.push(NumaReplica {
                edgeset: edgeset.to_string(),
                label: label.to_string(),
                field: merge.field.clone(),
                scalar_ty: merge.scalar_ty,
                reduce_op: merge.reduce_op,
                local_name: format!("local_{}", merge.field),
            });
        }
    }

    // Functor convention: every program-defined function except the entry
    // routine, so static call sites read `f()(args)` and inline.
    for func in registry.functions() {
        if func.kind != FuncKind::Entry {
            lowered.functors.insert(func.name.clone());
        }
    }

    Ok(lowered)
}

// ── Tests ───────────────────────────────────────────────────────────────────

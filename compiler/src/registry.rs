// registry.rs — Program registry
//
// The compilation-wide declaration store: functions, global constants,
// edgesets/vertexsets, per-edgeset-per-label schedule records, element
// sizing expressions, and a counter for synthesizing unique names. The
// front end populates one registry per compilation unit (serialized as
// JSON), lower.rs derives layout decorations from it, and codegen.rs
// reads it during the single emission pass.
//
// Preconditions: declaration names are unique (front-end contract; the
//   mutators re-check and fail with Inconsistency).
// Postconditions: none.
// Failure modes: lookups on unknown names fail with BackendError::Reference —
//   an upstream contract violation, always fatal.
// Side effects: none.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::diag::{BackendError, Result};
use crate::mir::{Expr, FuncDecl, FuncKind, GlobalDecl, Stmt, StructDecl};
use crate::schedule::ScheduleRecord;

/// The shared, mutable compilation-wide store. Maps are `BTreeMap` so every
/// iteration order is deterministic and the emitted output is reproducible.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProgramRegistry {
    functions: Vec<FuncDecl>,
    pub constants: Vec<GlobalDecl>,
    pub edgesets: Vec<GlobalDecl>,
    pub struct_types: Vec<StructDecl>,
    /// Graph element name → sizing expression (e.g. `Vertex` → `V`).
    element_counts: BTreeMap<String, Expr>,
    /// Vector/set name → graph element it is associated with.
    vector_elements: BTreeMap<String, String>,
    /// Edgeset name → schedule label → record.
    schedules: BTreeMap<String, BTreeMap<String, ScheduleRecord>>,
    /// Edgeset-loading statements run at the head of the entry routine.
    pub edgeset_alloc_stmts: Vec<Stmt>,
    /// Field-vector initialization statements run after allocation.
    pub field_init_stmts: Vec<Stmt>,
    #[serde(skip)]
    name_counter: u32,
}

impl ProgramRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Functions ───────────────────────────────────────────────────────

    pub fn add_function(&mut self, func: FuncDecl) -> Result<()> {
        if self.functions.iter().any(|f| f.name == func.name) {
            return Err(BackendError::inconsistency(format!(
                "function '{}' registered twice",
                func.name
            )));
        }
        self.functions.push(func);
        Ok(())
    }

    /// Program-defined functions (ordinary, entry, exported) in declaration order.
    pub fn functions(&self) -> impl Iterator<Item = &FuncDecl> {
        self.functions
            .iter()
            .filter(|f| f.kind != FuncKind::External)
    }

    /// External function declarations in declaration order.
    pub fn extern_functions(&self) -> impl Iterator<Item = &FuncDecl> {
        self.functions
            .iter()
            .filter(|f| f.kind == FuncKind::External)
    }

    pub fn lookup_function(&self, name: &str) -> Result<&FuncDecl> {
        self.functions
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| BackendError::reference(name))
    }

    /// Whether `name` is any registered function (including external ones).
    pub fn is_function(&self, name: &str) -> bool {
        self.functions.iter().any(|f| f.name == name)
    }

    pub fn is_extern_function(&self, name: &str) -> bool {
        self.functions
            .iter()
            .any(|f| f.name == name && f.kind == FuncKind::External)
    }

    pub fn entry_function(&self) -> Option<&FuncDecl> {
        self.functions.iter().find(|f| f.kind == FuncKind::Entry)
    }

    // ── Globals ─────────────────────────────────────────────────────────

    pub fn add_constant(&mut self, decl: GlobalDecl) -> Result<()> {
        self.check_global_name(&decl.name)?;
        self.constants.push(decl);
        Ok(())
    }

    pub fn add_edgeset(&mut self, decl: GlobalDecl) -> Result<()> {
        self.check_global_name(&decl.name)?;
        self.edgesets.push(decl);
        Ok(())
    }

    fn check_global_name(&self, name: &str) -> Result<()> {
        let taken = self.constants.iter().any(|c| c.name == name)
            || self.edgesets.iter().any(|e| e.name == name);
        if taken {
            return Err(BackendError::inconsistency(format!(
                "global '{}' registered twice",
                name
            )));
        }
        Ok(())
    }

    pub fn edgeset(&self, name: &str) -> Result<&GlobalDecl> {
        self.edgesets
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| BackendError::reference(name))
    }

    // ── Element sizing ──────────────────────────────────────────────────

    pub fn set_element_count(&mut self, element: impl Into<String>, count: Expr) {
        self.element_counts.insert(element.into(), count);
    }

    /// Sizing expression for a graph element (e.g. the vertex count).
    pub fn element_count(&self, element: &str) -> Result<&Expr> {
        self.element_counts
            .get(element)
            .ok_or_else(|| BackendError::reference(element))
    }

    pub fn set_element_of(&mut self, name: impl Into<String>, element: impl Into<String>) {
        self.vector_elements.insert(name.into(), element.into());
    }

    /// The graph element a property vector or vertexset ranges over.
    pub fn element_of(&self, name: &str) -> Result<&str> {
        self.vector_elements
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| BackendError::reference(name))
    }

    // ── Schedules ───────────────────────────────────────────────────────

    pub fn register_schedule(
        &mut self,
        edgeset: impl Into<String>,
        label: impl Into<String>,
        record: ScheduleRecord,
    ) {
        self.schedules
            .entry(edgeset.into())
            .or_default()
            .insert(label.into(), record);
    }

    pub fn schedule(&self, edgeset: &str, label: &str) -> Option<&ScheduleRecord> {
        self.schedules.get(edgeset)?.get(label)
    }

    /// All schedule records in deterministic (edgeset, label) order.
    pub fn schedules(&self) -> impl Iterator<Item = (&str, &str, &ScheduleRecord)> {
        self.schedules.iter().flat_map(|(edgeset, labels)| {
            labels
                .iter()
                .map(move |(label, record)| (edgeset.as_str(), label.as_str(), record))
        })
    }

    // ── Unique names ────────────────────────────────────────────────────

    /// Synthesize a unique temporary name. Monotonic within one compilation.
    pub fn fresh_name(&mut self, prefix: &str) -> String {
        let n = self.name_counter;
        self.name_counter += 1;
        format!("{}{}", prefix, n)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

// traversal.rs — Traversal function synthesizer
//
// Maps every edgeset-apply expression to the concrete traversal function
// variant the backend must declare, with a deterministic content-addressed
// name so repeated references to logically identical traversals collapse
// to one declaration plus N calls. Also owns the call-site argument order
// contract shared by all three apply positions (expression statement,
// assignment RHS, variable initializer) in codegen.rs.
//
// Preconditions: registry populated; schedule records registered for every
//   (edgeset, label) pair an apply references.
// Postconditions: catalog holds each needed variant exactly once, in
//   first-reference order.
// Failure modes: unknown edgeset, hybrid apply without a vertexset
//   frontier, hybrid apply without a push-side function.
// Side effects: none.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::diag::{BackendError, Result};
use crate::mir::{ApplyExpr, Direction, Expr, ReduceOp, ScalarTy, Stmt, Ty};
use crate::registry::ProgramRegistry;

// ── Variant model ───────────────────────────────────────────────────────────

/// How a from/to restriction is passed at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    VertexSet,
    Function,
}

/// NUMA merge step folded into the variant after its parallel region.
#[derive(Debug, Clone, PartialEq)]
pub struct NumaMerge {
    pub field: String,
    pub scalar_ty: ScalarTy,
    pub reduce_op: ReduceOp,
    pub local_name: String,
}

/// One synthesized traversal function. The name is a pure function of the
/// fields that shape the declaration, so re-deriving it at a call site
/// yields the identical name without re-synthesizing the body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyVariant {
    pub name: String,
    pub edgeset: String,
    pub apply_func: String,
    pub direction: Direction,
    pub parallel: bool,
    pub weighted: bool,
    pub from: Option<FilterKind>,
    pub to: Option<FilterKind>,
    pub has_push_to: bool,
    /// Schedule label when the edgeset traversal is segmented.
    pub segmented: Option<String>,
    pub numa: Option<NumaMerge>,
    pub tracking: bool,
}

impl ApplyVariant {
    /// Derive the variant for an apply expression from the registry's
    /// schedule metadata.
    pub fn derive(registry: &ProgramRegistry, apply: &ApplyExpr) -> Result<ApplyVariant> {
        let edgeset = registry.edgeset(&apply.target)?;
        let weighted = match &edgeset.ty {
            Ty::EdgeSet(es) => es.weight.is_some(),
            _ => {
                return Err(BackendError::inconsistency(format!(
                    "apply target '{}' is not an edgeset",
                    apply.target
                )))
            }
        };

        let filter_kind = |name: &str| {
            if registry.is_function(name) {
                FilterKind::Function
            } else {
                FilterKind::VertexSet
            }
        };
        let from = apply.from.as_deref().map(filter_kind);
        let to = apply.to.as_deref().map(filter_kind);

        if apply.direction == Direction::HybridDense {
            if from != Some(FilterKind::VertexSet) {
                return Err(BackendError::unsupported(
                    "hybrid apply without a vertexset frontier",
                    &apply.target,
                ));
            }
            if apply.push_apply_func.is_none() {
                return Err(BackendError::inconsistency(format!(
                    "hybrid apply over '{}' has no push-side function",
                    apply.target
                )));
            }
        }

        let (segmented, numa) = match &apply.label {
            Some(label) => match registry.schedule(&apply.target, label) {
                Some(record) => {
                    let segmented = record.num_segments.map(|_| label.clone());
                    let numa = match (&record.merge, record.numa_aware) {
                        (Some(merge), true) => Some(NumaMerge {
                            field: merge.field.clone(),
                            scalar_ty: merge.scalar_ty,
                            reduce_op: merge.reduce_op,
                            local_name: format!("local_{}", merge.field),
                        }),
                        _ => None,
                    };
                    (segmented, numa)
                }
                None => (None, None),
            },
            None => (None, None),
        };

        let name = variant_name(
            &apply.target,
            &apply.apply_func,
            apply.direction,
            apply.parallel,
            from,
            to,
            apply.push_to_func.is_some(),
            weighted,
            segmented.is_some(),
            numa.is_some(),
            apply.tracking,
        );

        Ok(ApplyVariant {
            name,
            edgeset: apply.target.clone(),
            apply_func: apply.apply_func.clone(),
            direction: apply.direction,
            parallel: apply.parallel,
            weighted,
            from,
            to,
            has_push_to: apply.push_to_func.is_some(),
            segmented,
            numa,
            tracking: apply.tracking,
        })
    }
}

/// Deterministic variant name. Every dimension that changes the synthesized
/// declaration contributes one token, so distinct shapes cannot collide and
/// identical shapes always agree.
#[allow(clippy::too_many_arguments)]
pub fn variant_name(
    edgeset: &str,
    apply_func: &str,
    direction: Direction,
    parallel: bool,
    from: Option<FilterKind>,
    to: Option<FilterKind>,
    has_push_to: bool,
    weighted: bool,
    segmented: bool,
    numa: bool,
    tracking: bool,
) -> String {
    let mut parts: Vec<&str> = vec![edgeset, apply_func, direction.token()];
    parts.push(if parallel { "parallel" } else { "serial" });
    match from {
        Some(FilterKind::VertexSet) => parts.push("from_vertexset"),
        Some(FilterKind::Function) => parts.push("from_filter"),
        None => {}
    }
    match to {
        Some(FilterKind::VertexSet) => parts.push("to_vertexset"),
        Some(FilterKind::Function) => parts.push("to_filter"),
        None => {}
    }
    if has_push_to {
        parts.push("push_filter");
    }
    if weighted {
        parts.push("weighted");
    }
    if segmented {
        parts.push("segmented");
    }
    if numa {
        parts.push("numa");
    }
    if tracking {
        parts.push("with_frontier");
    }
    parts.join("_")
}

// ── Catalog ─────────────────────────────────────────────────────────────────

/// The set of traversal variants the program needs, deduplicated by name in
/// first-reference order.
#[derive(Debug, Default)]
pub struct TraversalCatalog {
    variants: Vec<ApplyVariant>,
    index: HashMap<String, usize>,
}

impl TraversalCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the variant for an apply site, returning its name.
    pub fn register(&mut self, registry: &ProgramRegistry, apply: &ApplyExpr) -> Result<String> {
        let variant = ApplyVariant::derive(registry, apply)?;
        let name = variant.name.clone();
        if !self.index.contains_key(&name) {
            self.index.insert(name.clone(), self.variants.len());
            self.variants.push(variant);
        }
        Ok(name)
    }

    pub fn variants(&self) -> &[ApplyVariant] {
        &self.variants
    }
}

/// Walk every function body and pre-register the traversal variants the
/// code generator will reference.
pub fn collect_traversals(registry: &ProgramRegistry) -> Result<TraversalCatalog> {
    let mut catalog = TraversalCatalog::new();
    for func in registry.functions() {
        for stmt in &func.body {
            visit_stmt(&mut catalog, registry, stmt)?;
        }
    }
    Ok(catalog)
}

fn visit_stmt(catalog: &mut TraversalCatalog, registry: &ProgramRegistry, stmt: &Stmt) -> Result<()> {
    match stmt {
        Stmt::VarDecl { init, .. } => {
            if let Some(init) = init {
                visit_expr(catalog, registry, init)?;
            }
        }
        Stmt::Assign { lhs, rhs } => {
            visit_expr(catalog, registry, lhs)?;
            visit_expr(catalog, registry, rhs)?;
        }
        Stmt::Reduce { lhs, rhs, .. } => {
            visit_expr(catalog, registry, lhs)?;
            visit_expr(catalog, registry, rhs)?;
        }
        Stmt::CompareAndSwap {
            lhs,
            compare,
            value,
            ..
        } => {
            visit_expr(catalog, registry, lhs)?;
            visit_expr(catalog, registry, compare)?;
            visit_expr(catalog, registry, value)?;
        }
        Stmt::Expr(expr) | Stmt::Print(expr) => visit_expr(catalog, registry, expr)?,
        Stmt::If {
            cond,
            then_body,
            else_body,
        } => {
            visit_expr(catalog, registry, cond)?;
            for s in then_body.iter().chain(else_body) {
                visit_stmt(catalog, registry, s)?;
            }
        }
        Stmt::While { cond, body } => {
            visit_expr(catalog, registry, cond)?;
            for s in body {
                visit_stmt(catalog, registry, s)?;
            }
        }
        Stmt::For {
            lower, upper, body, ..
        } => {
            visit_expr(catalog, registry, lower)?;
            visit_expr(catalog, registry, upper)?;
            for s in body {
                visit_stmt(catalog, registry, s)?;
            }
        }
        Stmt::Break => {}
    }
    Ok(())
}

fn visit_expr(catalog: &mut TraversalCatalog, registry: &ProgramRegistry, expr: &Expr) -> Result<()> {
    match expr {
        Expr::EdgeSetApply(apply) => {
            catalog.register(registry, apply)?;
        }
        Expr::Binary { lhs, rhs, .. } | Expr::Cmp { lhs, rhs, .. } => {
            visit_expr(catalog, registry, lhs)?;
            visit_expr(catalog, registry, rhs)?;
        }
        Expr::Neg(operand) => visit_expr(catalog, registry, operand)?,
        Expr::Call { args, .. } => {
            for arg in args {
                visit_expr(catalog, registry, arg)?;
            }
        }
        Expr::ArrayRead { target, index } => {
            visit_expr(catalog, registry, target)?;
            visit_expr(catalog, registry, index)?;
        }
        Expr::StructRead { index, .. } => visit_expr(catalog, registry, index)?,
        Expr::EdgeSetLoad { path, .. } => visit_expr(catalog, registry, path)?,
        Expr::VertexSetAlloc { size, .. } => visit_expr(catalog, registry, size)?,
        Expr::VectorAlloc { size, .. } => {
            if let Some(size) = size {
                visit_expr(catalog, registry, size)?;
            }
        }
        Expr::Var(_)
        | Expr::IntLit(_)
        | Expr::FloatLit(_)
        | Expr::BoolLit(_)
        | Expr::StringLit(_)
        | Expr::ListAlloc { .. }
        | Expr::VertexSetApply { .. }
        | Expr::VertexSetWhere { .. } => {}
    }
    Ok(())
}

// ── Call-site arguments ─────────────────────────────────────────────────────

/// A function passed as a value: functor-instantiated when program-defined,
/// verbatim when external.
pub fn functor_argument(registry: &ProgramRegistry, name: &str) -> String {
    if registry.is_extern_function(name) {
        name.to_string()
    } else {
        format!("{}()", name)
    }
}

fn filter_argument(registry: &ProgramRegistry, name: &str) -> String {
    if registry.is_function(name) {
        functor_argument(registry, name)
    } else {
        // A vertexset restriction is passed by name.
        name.to_string()
    }
}

/// The ordered argument list for a traversal call. The order is the contract
/// shared with `emit_variant_decl`'s parameter list: from filter, to filter,
/// primary apply function, hybrid push filter, hybrid push function. The
/// edgeset itself is the call's receiver and is not included here.
pub fn call_arguments(registry: &ProgramRegistry, apply: &ApplyExpr) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(from) = &apply.from {
        args.push(filter_argument(registry, from));
    }
    if let Some(to) = &apply.to {
        args.push(filter_argument(registry, to));
    }
    args.push(functor_argument(registry, &apply.apply_func));
    if apply.direction == Direction::HybridDense {
        if let Some(push_to) = &apply.push_to_func {
            args.push(functor_argument(registry, push_to));
        }
        if let Some(push_apply) = &apply.push_apply_func {
            args.push(functor_argument(registry, push_apply));
        }
    }
    args
}

// ── Declaration emission ────────────────────────────────────────────────────

struct SignatureParts {
    template_params: Vec<&'static str>,
    params: Vec<String>,
}

fn signature_parts(variant: &ApplyVariant) -> SignatureParts {
    let mut template_params = Vec::new();
    let mut params = Vec::new();

    let graph_ty = if variant.weighted { "WGraph" } else { "Graph" };
    params.push(format!("{} & g", graph_ty));

    match variant.from {
        Some(FilterKind::VertexSet) => {
            params.push("VertexSubset<NodeID> * from_vertexset".to_string())
        }
        Some(FilterKind::Function) => {
            template_params.push("typename FROM_FUNC");
            params.push("FROM_FUNC from_func".to_string());
        }
        None => {}
    }
    match variant.to {
        Some(FilterKind::VertexSet) => {
            params.push("VertexSubset<NodeID> * to_vertexset".to_string())
        }
        Some(FilterKind::Function) => {
            template_params.push("typename TO_FUNC");
            params.push("TO_FUNC to_func".to_string());
        }
        None => {}
    }
    template_params.push("typename APPLY_FUNC");
    params.push("APPLY_FUNC apply_func".to_string());
    if variant.has_push_to {
        template_params.push("typename PUSH_TO_FUNC");
        params.push("PUSH_TO_FUNC push_to_func".to_string());
    }
    if variant.direction == Direction::HybridDense {
        template_params.push("typename PUSH_APPLY_FUNC");
        params.push("PUSH_APPLY_FUNC push_apply_func".to_string());
    }

    SignatureParts {
        template_params,
        params,
    }
}

/// Guard expression for the source-vertex restriction, if any.
fn from_guard(variant: &ApplyVariant) -> Option<String> {
    match variant.from {
        Some(FilterKind::VertexSet) => Some("from_vertexset->contains(s)".to_string()),
        Some(FilterKind::Function) => Some("from_func(s)".to_string()),
        None => None,
    }
}

fn to_guard(variant: &ApplyVariant, push_side: bool) -> Option<String> {
    if push_side && variant.has_push_to {
        return Some("push_to_func(d)".to_string());
    }
    match variant.to {
        Some(FilterKind::VertexSet) => Some("to_vertexset->contains(d)".to_string()),
        Some(FilterKind::Function) => Some("to_func(d)".to_string()),
        None => None,
    }
}

/// The per-edge application statement, with frontier tracking when requested.
fn apply_call(variant: &ApplyVariant, func: &str, socket_arg: bool) -> String {
    let mut args = String::from("s, d");
    if variant.weighted {
        args.push_str(", wn.w");
    }
    if socket_arg {
        args.push_str(", socketId");
    }
    if variant.tracking {
        format!("if ({}({})) next_frontier->add_vertex(d);", func, args)
    } else {
        format!("{}({});", func, args)
    }
}

fn neighbor_loop_open(variant: &ApplyVariant, source: &str, direction: Direction) -> String {
    let accessor = match direction {
        Direction::Pull => "in_neigh",
        _ => "out_neigh",
    };
    if variant.weighted {
        format!("for ( WNode wn : {}.{}({}) ) {{", source, accessor, pivot(direction))
    } else {
        format!(
            "for ( NodeID {} : {}.{}({}) ) {{",
            inner_var(direction),
            source,
            accessor,
            pivot(direction)
        )
    }
}

// Pull iterates destinations and scans in-neighbors; push iterates sources.
fn pivot(direction: Direction) -> &'static str {
    match direction {
        Direction::Pull => "d",
        _ => "s",
    }
}

fn inner_var(direction: Direction) -> &'static str {
    match direction {
        Direction::Pull => "s",
        _ => "d",
    }
}

struct BodyEmitter<'a> {
    out: &'a mut String,
    indent: usize,
}

impl<'a> BodyEmitter<'a> {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    /// One direction's full traversal loop nest.
    fn direction_loops(&mut self, variant: &ApplyVariant, direction: Direction, func: &str) {
        let outer_for = if variant.parallel { "parallel_for" } else { "for" };
        let socket_arg = variant.numa.is_some();

        if let Some(label) = &variant.segmented {
            self.line(&format!(
                "for ( int segmentId = 0; segmentId < g.get_num_segments(\"{}\"); segmentId++ ) {{",
                label
            ));
            self.indent += 1;
            self.line(&format!(
                "auto segment = g.get_segment(\"{}\", segmentId);",
                label
            ));
            if socket_arg {
                self.line(&format!(
                    "int socketId = g.get_segment_socket(\"{}\", segmentId);",
                    label
                ));
            }
            self.line(&format!(
                "{} ( NodeID {} = segment->start_vertex(); {} < segment->end_vertex(); {}++ ) {{",
                outer_for,
                pivot(direction),
                pivot(direction),
                pivot(direction)
            ));
            self.indent += 1;
            self.edge_scan(variant, direction, func, "(*segment)", socket_arg);
            self.indent -= 1;
            self.line("}");
            self.indent -= 1;
            self.line("}");
        } else {
            self.line(&format!(
                "{} ( NodeID {} = 0; {} < numVertices; {}++ ) {{",
                outer_for,
                pivot(direction),
                pivot(direction),
                pivot(direction)
            ));
            self.indent += 1;
            self.edge_scan(variant, direction, func, "g", socket_arg);
            self.indent -= 1;
            self.line("}");
        }
    }

    /// The neighbor scan inside one outer-loop iteration.
    fn edge_scan(
        &mut self,
        variant: &ApplyVariant,
        direction: Direction,
        func: &str,
        source: &str,
        socket_arg: bool,
    ) {
        // Outer-vertex guard: destination filter for pull, source for push.
        let outer_guard = match direction {
            Direction::Pull => to_guard(variant, false),
            _ => from_guard(variant),
        };
        if let Some(guard) = outer_guard {
            self.line(&format!("if (!({})) continue;", guard));
        }
        self.line(&neighbor_loop_open(variant, source, direction));
        self.indent += 1;
        if variant.weighted {
            self.line(&format!("NodeID {} = wn.v;", inner_var(direction)));
        }
        let inner_guard = match direction {
            Direction::Pull => from_guard(variant),
            _ => to_guard(variant, variant.direction == Direction::HybridDense),
        };
        if let Some(guard) = inner_guard {
            self.line(&format!("if (!({})) continue;", guard));
        }
        self.line(&apply_call(variant, func, socket_arg));
        self.indent -= 1;
        self.line("}");
    }

    /// Serial fold of NUMA replicas into the shared buffer. Runs strictly
    /// after the parallel region — never a second parallel region.
    fn numa_merge(&mut self, merge: &NumaMerge) {
        self.line("for ( int socketId = 0; socketId < omp_get_num_places(); socketId++ ) {");
        self.indent += 1;
        self.line("for ( NodeID n = 0; n < numVertices; n++ ) {");
        self.indent += 1;
        match merge.reduce_op {
            ReduceOp::Sum | ReduceOp::AtomicSum => self.line(&format!(
                "{}[n] += {}[socketId][n];",
                merge.field, merge.local_name
            )),
            ReduceOp::Min | ReduceOp::AtomicMin => {
                self.line(&format!(
                    "if (({}[socketId][n]) < ({}[n])) {{",
                    merge.local_name, merge.field
                ));
                self.indent += 1;
                self.line(&format!(
                    "{}[n] = {}[socketId][n];",
                    merge.field, merge.local_name
                ));
                self.indent -= 1;
                self.line("}");
            }
            // Max merges never reach here: lower.rs only records merges the
            // reduction emitter supports, and Max has no lowering at all.
            ReduceOp::Max => self.line("// unreachable: max merge has no lowering"),
        }
        self.indent -= 1;
        self.line("}");
        self.indent -= 1;
        self.line("}");
    }
}

/// Emit the full templated declaration for one traversal variant.
pub fn emit_variant_decl(out: &mut String, variant: &ApplyVariant) -> Result<()> {
    let sig = signature_parts(variant);

    let _ = writeln!(out, "template <{}>", sig.template_params.join(", "));
    let ret = if variant.tracking {
        "VertexSubset<NodeID> *"
    } else {
        "void"
    };
    let _ = writeln!(out, "{} {}({})", ret, variant.name, sig.params.join(", "));
    out.push_str("{\n");

    let mut body = BodyEmitter { out, indent: 1 };
    body.line("long numVertices = g.num_nodes();");
    if variant.tracking {
        body.line("VertexSubset<NodeID> * next_frontier = new VertexSubset<NodeID>(numVertices, 0);");
    }

    match variant.direction {
        Direction::Pull => body.direction_loops(variant, Direction::Pull, "apply_func"),
        Direction::Push => body.direction_loops(variant, Direction::Push, "apply_func"),
        Direction::HybridDense => {
            // Runtime density switch: dense frontiers pull, sparse push.
            body.line("if (from_vertexset->size() > (g.num_edges() / 20)) {");
            body.indent += 1;
            body.direction_loops(variant, Direction::Pull, "apply_func");
            body.indent -= 1;
            body.line("} else {");
            body.indent += 1;
            body.direction_loops(variant, Direction::Push, "push_apply_func");
            body.indent -= 1;
            body.line("}");
        }
    }

    if let Some(merge) = &variant.numa {
        body.numa_merge(merge);
    }
    if variant.tracking {
        body.line("return next_frontier;");
    }
    out.push_str("}\n");
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────────────

// codegen.rs — C++ code generation backend
//
// One deterministic pass over the lowered program, emitting the translation
// unit in a fixed section order: preamble → struct type declarations →
// deduplicated typedefs → global declarations → NUMA-local replica pointers
// → synthesized traversal functions → extern declarations → function bodies
// in declaration order → optional foreign-binding module.
//
// Ordinary functions are emitted under the functor calling convention (a
// zero-state callable struct) so the target compiler can inline through
// static call sites; the designated entry routine is emitted as native
// `main` and carries the program's setup/teardown sequences.
//
// Preconditions: layout lowering and traversal collection completed.
// Postconditions: returns the full C++ source as one string.
// Failure modes: any BackendError aborts emission; partial text is
//   discarded by the caller.
// Side effects: none.

use std::collections::HashSet;
use std::fmt::Write as _;

use crate::binding;
use crate::diag::{BackendError, Result};
use crate::lower::{LoweredLayout, SegmentCount};
use crate::mir::{Expr, FuncDecl, FuncKind, ReduceOp, Stmt, Ty};
use crate::registry::ProgramRegistry;
use crate::traversal::{self, ApplyVariant, TraversalCatalog};

// ── Public types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CodegenOptions {
    /// Emit pybind wrappers and the module-registration block.
    pub pybind: bool,
    pub module_name: String,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        CodegenOptions {
            pybind: false,
            module_name: "graph_module".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct GeneratedCode {
    pub cpp_source: String,
}

// ── Public entry point ──────────────────────────────────────────────────────

pub fn codegen(
    registry: &ProgramRegistry,
    lowered: &LoweredLayout,
    catalog: &TraversalCatalog,
    options: &CodegenOptions,
) -> Result<GeneratedCode> {
    let mut ctx = CodegenCtx::new(registry, lowered, catalog, options);
    ctx.emit_all()?;
    Ok(GeneratedCode {
        cpp_source: ctx.out,
    })
}

// ── Shared text helpers ─────────────────────────────────────────────────────

/// C++ spelling of a MIR type, including the trailing space/pointer the
/// surrounding declaration expects.
pub(crate) fn type_text(ty: &Ty) -> String {
    match ty {
        Ty::Scalar(s) => format!("{} ", s.cpp()),
        Ty::Vector(v) => match v.item.as_ref() {
            Ty::Vector(inner) => format!("{} * ", inner.canonical_name()),
            item => format!("{}* ", type_text(item)),
        },
        Ty::VertexSet { .. } => "VertexSubset<int> * ".to_string(),
        Ty::EdgeSet(es) => {
            if es.weight.is_some() {
                "WGraph ".to_string()
            } else {
                "Graph ".to_string()
            }
        }
        Ty::Struct { name } => format!("{} ", name),
        Ty::List { item } => format!("std::vector< {}> * ", type_text(item)),
        Ty::Element { .. } => "NodeID ".to_string(),
    }
}

/// Render an expression to C++ text. Edgeset applies never reach this —
/// the three statement positions that carry them route through
/// `emit_apply_call` instead.
pub(crate) fn expr_text(registry: &ProgramRegistry, expr: &Expr) -> Result<String> {
    Ok(match expr {
        Expr::Var(name) => name.clone(),
        Expr::IntLit(v) => format!("({})", v),
        Expr::FloatLit(v) => format!("((float) {})", v),
        Expr::BoolLit(v) => format!("(bool) {}", v),
        Expr::StringLit(s) => format!("\"{}\"", s),
        Expr::Binary { op, lhs, rhs } => format!(
            "({} {} {})",
            expr_text(registry, lhs)?,
            op.cpp(),
            expr_text(registry, rhs)?
        ),
        Expr::Cmp { op, lhs, rhs } => format!(
            "({}) {} ({})",
            expr_text(registry, lhs)?,
            op.cpp(),
            expr_text(registry, rhs)?
        ),
        Expr::Neg(operand) => format!("-{}", expr_text(registry, operand)?),
        Expr::Call {
            name,
            generic,
            args,
        } => {
            let mut text = name.clone();
            if let Some(generic) = generic {
                let _ = write!(text, "<{}>", type_text(generic).trim_end());
            }
            if registry.is_function(name) && !registry.is_extern_function(name) {
                text.push_str("()");
            }
            text.push('(');
            let rendered: Vec<String> = args
                .iter()
                .map(|a| expr_text(registry, a))
                .collect::<Result<_>>()?;
            text.push_str(&rendered.join(", "));
            text.push(')');
            text
        }
        Expr::ArrayRead { target, index } => {
            let index_text = expr_text(registry, index)?;
            // The raw runtime-argument vector is always read bounds-checked.
            if matches!(target.as_ref(), Expr::Var(name) if name == "argv") {
                format!("argv_safe({}, argv, argc)", index_text)
            } else {
                format!("{}[{}]", expr_text(registry, target)?, index_text)
            }
        }
        Expr::StructRead {
            target,
            index,
            field,
        } => format!("{}[{}].{}", target, expr_text(registry, index)?, field),
        Expr::EdgeSetLoad { path, weighted } => {
            let builtin = if *weighted {
                "builtin_loadWeightedEdgesFromFile"
            } else {
                "builtin_loadEdgesFromFile"
            };
            format!("{}({})", builtin, expr_text(registry, path)?)
        }
        Expr::VertexSetAlloc { element, size } => {
            let count = expr_text(registry, registry.element_count(element)?)?;
            format!(
                "new VertexSubset<int>({}, {})",
                count,
                expr_text(registry, size)?
            )
        }
        Expr::ListAlloc { item } => {
            format!("new std::vector< {}>()", type_text(item))
        }
        Expr::VectorAlloc {
            element,
            item,
            size,
        } => {
            let elem_text = match item {
                Ty::Vector(v) => v.canonical_name(),
                other => type_text(other).trim_end().to_string(),
            };
            let count = match (element, size) {
                (Some(element), _) => expr_text(registry, registry.element_count(element)?)?,
                (None, Some(size)) => expr_text(registry, size)?,
                (None, None) => {
                    return Err(BackendError::inconsistency(
                        "vector alloc with neither element nor size",
                    ))
                }
            };
            format!("new {}[ {} ]", elem_text, count)
        }
        Expr::VertexSetApply {
            target,
            func,
            parallel,
        } => {
            if registry.element_of(target).is_ok() {
                // Constant vertexset: a counted loop over the element range.
                let element = registry.element_of(target)?;
                let count = expr_text(registry, registry.element_count(element)?)?;
                let for_kind = if *parallel { "parallel_for" } else { "for" };
                format!(
                    "{} (int vertexsetapply_iter = 0; vertexsetapply_iter < {}; vertexsetapply_iter++) {{\n  {}(vertexsetapply_iter);\n}}",
                    for_kind,
                    count,
                    traversal::functor_argument(registry, func)
                )
            } else {
                format!(
                    "builtin_vertexset_apply({}, {})",
                    target,
                    traversal::functor_argument(registry, func)
                )
            }
        }
        Expr::VertexSetWhere {
            target,
            func,
            constant_set,
        } => {
            if *constant_set {
                let element = registry.element_of(target)?;
                let count = expr_text(registry, registry.element_count(element)?)?;
                format!(
                    "builtin_const_vertexset_filter<{}>({}(), {})",
                    func, func, count
                )
            } else {
                format!("builtin_vertexset_filter<{}>({}, {}())", func, target, func)
            }
        }
        Expr::EdgeSetApply(_) => {
            return Err(BackendError::inconsistency(
                "edgeset apply expression outside a statement position",
            ))
        }
    })
}

// ── Internal context ────────────────────────────────────────────────────────

struct CodegenCtx<'a> {
    registry: &'a ProgramRegistry,
    lowered: &'a LoweredLayout,
    catalog: &'a TraversalCatalog,
    options: &'a CodegenOptions,
    out: String,
    /// Structural type identities already declared. Consulted before every
    /// typedef emission; an identity is inserted exactly when its typedef
    /// is first emitted.
    declared_types: HashSet<String>,
}

impl<'a> CodegenCtx<'a> {
    fn new(
        registry: &'a ProgramRegistry,
        lowered: &'a LoweredLayout,
        catalog: &'a TraversalCatalog,
        options: &'a CodegenOptions,
    ) -> Self {
        CodegenCtx {
            registry,
            lowered,
            catalog,
            options,
            out: String::with_capacity(8192),
            declared_types: HashSet::new(),
        }
    }

    fn pad(&mut self, ind: usize) {
        for _ in 0..ind {
            self.out.push_str("  ");
        }
    }

    fn line(&mut self, ind: usize, text: &str) {
        self.pad(ind);
        self.out.push_str(text);
        self.out.push('\n');
    }

    // ── Top-level emit ──────────────────────────────────────────────────

    fn emit_all(&mut self) -> Result<()> {
        self.emit_preamble();
        self.emit_struct_type_decls();
        self.emit_typedefs();
        self.emit_global_decls()?;
        self.emit_numa_local_decls();
        self.emit_traversal_decls()?;
        self.emit_extern_decls();
        self.emit_functions()?;
        if self.options.pybind {
            binding::emit_module_registration(&mut self.out, self.registry, &self.options.module_name);
        }
        Ok(())
    }

    // ── Section 1: preamble ─────────────────────────────────────────────

    fn emit_preamble(&mut self) {
        self.out
            .push_str("// Generated by tgc (Trellis Graph Compiler)\n");
        self.out.push_str("#include <iostream>\n");
        self.out.push_str("#include <vector>\n");
        self.out.push_str("#include <algorithm>\n");
        self.out.push_str("#include \"trellis_rt.h\"\n");
        if self.options.pybind {
            self.out.push_str("#ifdef TGC_PYBIND_WRAPPERS\n");
            self.out.push_str("#include <pybind11/pybind11.h>\n");
            self.out.push_str("#include <pybind11/stl.h>\n");
            self.out.push_str("#include <pybind11/numpy.h>\n");
            self.out.push_str("namespace py = pybind11;\n");
            self.out.push_str("#endif\n");
        }
        self.out.push('\n');
    }

    // ── Section 2: struct type declarations ─────────────────────────────

    fn emit_struct_type_decls(&mut self) {
        for decl in &self.registry.struct_types {
            let _ = writeln!(self.out, "typedef struct {} {{", decl.name);
            for field in &decl.fields {
                let _ = writeln!(self.out, "  {}{};", type_text(&field.ty), field.name);
            }
            let _ = writeln!(self.out, "}} {};", decl.name);
        }
    }

    // ── Section 3: deduplicated typedefs ────────────────────────────────

    fn emit_typedefs(&mut self) {
        for typedef in self.lowered.typedefs() {
            if self.declared_types.insert(typedef.name.clone()) {
                let _ = writeln!(
                    self.out,
                    "typedef {}{} [ {} ];",
                    type_text(&typedef.item),
                    typedef.name,
                    typedef.range
                );
            }
        }
    }

    // ── Section 4: global declarations ──────────────────────────────────

    fn emit_global_decls(&mut self) -> Result<()> {
        for edgeset in &self.registry.edgesets {
            let _ = writeln!(self.out, "{}{};", type_text(&edgeset.ty), edgeset.name);
        }
        for constant in &self.registry.constants {
            match &constant.ty {
                Ty::Vector(vector) => {
                    // Nested elements declare through their typedef; flat
                    // scalars declare directly.
                    let elem_text = match self.lowered.vector_typedefs.get(&constant.name) {
                        Some(typedef) => format!("{} ", typedef),
                        None => type_text(&vector.item),
                    };
                    let _ = writeln!(
                        self.out,
                        "{}* __restrict {};",
                        elem_text, constant.name
                    );
                }
                // Vertexset constants materialize lazily; no declaration.
                Ty::VertexSet { .. } => {}
                ty => {
                    // Declaration only — the value is assigned in the entry
                    // routine so it can reference runtime arguments.
                    let _ = writeln!(self.out, "{}{};", type_text(ty), constant.name);
                }
            }
        }
        Ok(())
    }

    // ── Section 5: NUMA-local replica pointers ──────────────────────────

    fn emit_numa_local_decls(&mut self) {
        for replica in &self.lowered.numa_replicas {
            let _ = writeln!(
                self.out,
                "{} **{};",
                replica.scalar_ty.cpp(),
                replica.local_name
            );
        }
    }

    // ── Section 6: synthesized traversal functions ──────────────────────

    fn emit_traversal_decls(&mut self) -> Result<()> {
        for variant in self.catalog.variants() {
            traversal::emit_variant_decl(&mut self.out, variant)?;
        }
        Ok(())
    }

    // ── Section 7: extern declarations ──────────────────────────────────

    fn emit_extern_decls(&mut self) {
        for func in self.registry.extern_functions() {
            self.out.push_str("extern ");
            match &func.result {
                Some(result) => self.out.push_str(&type_text(&result.ty)),
                None => self.out.push_str("void "),
            }
            self.out.push_str(&func.name);
            self.out.push_str(" (");
            if func.args.is_empty() {
                self.out.push_str("void");
            } else {
                let args: Vec<String> = func
                    .args
                    .iter()
                    .map(|a| format!("{}{}", type_text(&a.ty), a.name))
                    .collect();
                self.out.push_str(&args.join(", "));
            }
            self.out.push_str(");\n");
        }
    }

    // ── Section 8: function bodies ──────────────────────────────────────

    fn emit_functions(&mut self) -> Result<()> {
        let registry = self.registry;
        for func in registry.functions() {
            match func.kind {
                FuncKind::Entry => self.emit_entry(func)?,
                FuncKind::Ordinary | FuncKind::Exported => self.emit_functor(func)?,
                FuncKind::External => unreachable!("extern functions filtered upstream"),
            }
        }
        Ok(())
    }

    fn emit_functor(&mut self, func: &FuncDecl) -> Result<()> {
        let _ = writeln!(self.out, "struct {}", func.name);
        self.out.push_str("{\n");

        self.pad(1);
        match &func.result {
            Some(result) => self.out.push_str(&type_text(&result.ty)),
            None => self.out.push_str("void "),
        }
        self.out.push_str("operator() (");
        let args: Vec<String> = func
            .args
            .iter()
            .map(|a| format!("{}{}", type_text(&a.ty), a.name))
            .collect();
        self.out.push_str(&args.join(", "));
        self.out.push_str(")\n");
        self.line(1, "{");

        // Exported functions are callable without the entry routine having
        // run, so scalar constants are re-initialized here.
        if func.kind == FuncKind::Exported {
            self.emit_scalar_inits(2)?;
        }

        // The return slot materializes as a leading local; callers consume
        // the value under this same name.
        if let Some(result) = &func.result {
            self.pad(2);
            let _ = writeln!(self.out, "{}{};", type_text(&result.ty), result.name);
        }

        for stmt in &func.body {
            self.emit_stmt(stmt, 2)?;
        }

        if let Some(result) = &func.result {
            self.pad(2);
            let _ = writeln!(self.out, "return {};", result.name);
        }

        self.line(1, "}");
        self.out.push_str("};\n");

        if func.kind == FuncKind::Exported && self.options.pybind {
            binding::emit_wrapper(&mut self.out, self.registry, func)?;
        }
        Ok(())
    }

    fn emit_scalar_inits(&mut self, ind: usize) -> Result<()> {
        let mut lines = Vec::new();
        for constant in &self.registry.constants {
            if let (Ty::Scalar(_), Some(init)) = (&constant.ty, &constant.init) {
                lines.push(format!(
                    "{} = {};",
                    constant.name,
                    expr_text(self.registry, init)?
                ));
            }
        }
        for l in lines {
            self.line(ind, &l);
        }
        Ok(())
    }

    // ── Entry routine ───────────────────────────────────────────────────

    fn emit_entry(&mut self, func: &FuncDecl) -> Result<()> {
        self.out.push_str("int main(int argc, char * argv[])\n{\n");

        // Setup order is fixed: loads → segmented builds → allocations →
        // field inits → NUMA replica setup. User statements follow.
        let registry = self.registry;
        for stmt in &registry.edgeset_alloc_stmts {
            self.emit_stmt(stmt, 1)?;
        }
        self.emit_segment_builds()?;
        self.emit_allocations()?;
        for stmt in &registry.field_init_stmts {
            self.emit_stmt(stmt, 1)?;
        }
        self.emit_numa_setup()?;

        for stmt in &func.body {
            self.emit_stmt(stmt, 1)?;
        }

        self.emit_numa_teardown()?;
        self.out.push_str("}\n");
        Ok(())
    }

    fn emit_segment_builds(&mut self) -> Result<()> {
        let lowered = self.lowered;
        for build in &lowered.segment_builds {
            let count_text = match build.count {
                SegmentCount::Literal(n) => n.to_string(),
                // Negative schedule counts read the runtime argument,
                // bounds-checked against argc.
                SegmentCount::RuntimeArg(i) => {
                    format!("atoi(argv_safe({}, argv, argc))", i)
                }
            };
            let numa_text = if build.numa_aware { ", true" } else { "" };
            let text = format!(
                "{}.buildPullSegmentedGraphs(\"{}\", {}{});",
                build.edgeset, build.label, count_text, numa_text
            );
            self.line(1, &text);
        }
        Ok(())
    }

    fn emit_allocations(&mut self) -> Result<()> {
        let mut lines = Vec::new();
        for constant in &self.registry.constants {
            match &constant.ty {
                Ty::Vector(vector) => {
                    if !constant.needs_allocation {
                        continue;
                    }
                    let element = vector.element.as_deref().ok_or_else(|| {
                        BackendError::unsupported("property vector without an element", &constant.name)
                    })?;
                    let count = expr_text(self.registry, self.registry.element_count(element)?)?;
                    let elem_text = match self.lowered.vector_typedefs.get(&constant.name) {
                        Some(typedef) => typedef.clone(),
                        None => type_text(&vector.item).trim_end().to_string(),
                    };
                    lines.push(format!(
                        "{} = new {}[ {} ];",
                        constant.name, elem_text, count
                    ));
                }
                Ty::VertexSet { .. } => {}
                Ty::Scalar(_) => {
                    if let Some(init) = &constant.init {
                        lines.push(format!(
                            "{} = {};",
                            constant.name,
                            expr_text(self.registry, init)?
                        ));
                    }
                }
                _ => {}
            }
        }
        for l in lines {
            self.line(1, &l);
        }
        Ok(())
    }

    fn emit_numa_setup(&mut self) -> Result<()> {
        let lowered = self.lowered;
        for replica in &lowered.numa_replicas {
            let element = self.registry.element_of(&replica.field)?.to_string();
            let count = expr_text(self.registry, self.registry.element_count(&element)?)?;
            let ty = replica.scalar_ty.cpp();

            self.line(
                1,
                &format!(
                    "{} = new {}*[omp_get_num_places()];",
                    replica.local_name, ty
                ),
            );
            self.line(
                1,
                "for (int socketId = 0; socketId < omp_get_num_places(); socketId++) {",
            );
            self.line(
                2,
                &format!(
                    "{}[socketId] = ({}*)numa_alloc_onnode(sizeof({}) * {}, socketId);",
                    replica.local_name, ty, ty, count
                ),
            );
            self.line(
                2,
                &format!("parallel_for (int n = 0; n < {}; n++) {{", count),
            );
            self.line(
                3,
                &format!("{}[socketId][n] = {}[n];", replica.local_name, replica.field),
            );
            self.line(2, "}");
            self.line(1, "}");
            self.line(1, "omp_set_nested(1);");
        }
        Ok(())
    }

    fn emit_numa_teardown(&mut self) -> Result<()> {
        let lowered = self.lowered;
        for replica in &lowered.numa_replicas {
            let element = self.registry.element_of(&replica.field)?.to_string();
            let count = expr_text(self.registry, self.registry.element_count(&element)?)?;
            let ty = replica.scalar_ty.cpp();

            self.line(
                1,
                "for (int socketId = 0; socketId < omp_get_num_places(); socketId++) {",
            );
            self.line(
                2,
                &format!(
                    "numa_free({}[socketId], sizeof({}) * {});",
                    replica.local_name, ty, count
                ),
            );
            self.line(1, "}");
        }
        Ok(())
    }

    // ── Statements ──────────────────────────────────────────────────────

    fn emit_stmt(&mut self, stmt: &Stmt, ind: usize) -> Result<()> {
        match stmt {
            Stmt::VarDecl { name, ty, init } => match init {
                Some(Expr::EdgeSetApply(apply)) => {
                    self.pad(ind);
                    self.out.push_str(&type_text(ty));
                    self.out.push_str(name);
                    self.out.push_str(" = ");
                    self.emit_apply_call(apply)?;
                }
                Some(init) => {
                    let text = format!(
                        "{}{} = {};",
                        type_text(ty),
                        name,
                        expr_text(self.registry, init)?
                    );
                    self.line(ind, &text);
                }
                None => {
                    let text = format!("{}{};", type_text(ty), name);
                    self.line(ind, &text);
                }
            },
            Stmt::Assign { lhs, rhs } => match rhs {
                Expr::EdgeSetApply(apply) => {
                    let lhs_text = expr_text(self.registry, lhs)?;
                    self.pad(ind);
                    self.out.push_str(&lhs_text);
                    self.out.push_str(" = ");
                    self.emit_apply_call(apply)?;
                }
                rhs => {
                    let text = format!(
                        "{} = {};",
                        expr_text(self.registry, lhs)?,
                        expr_text(self.registry, rhs)?
                    );
                    self.line(ind, &text);
                }
            },
            Stmt::Reduce {
                lhs,
                rhs,
                op,
                tracking,
            } => self.emit_reduce(lhs, rhs, *op, tracking.as_deref(), ind)?,
            Stmt::CompareAndSwap {
                lhs,
                compare,
                value,
                tracking,
            } => {
                let text = format!(
                    "{} = compare_and_swap({}, {}, {});",
                    tracking,
                    expr_text(self.registry, lhs)?,
                    expr_text(self.registry, compare)?,
                    expr_text(self.registry, value)?
                );
                self.line(ind, &text);
            }
            Stmt::Expr(expr) => match expr {
                Expr::EdgeSetApply(apply) => {
                    self.pad(ind);
                    self.emit_apply_call(apply)?;
                }
                Expr::VertexSetApply { .. } => {
                    let text = expr_text(self.registry, expr)?;
                    self.line(ind, &text);
                }
                expr => {
                    let text = format!("{};", expr_text(self.registry, expr)?);
                    self.line(ind, &text);
                }
            },
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let cond_text = expr_text(self.registry, cond)?;
                self.line(ind, &format!("if ({}) {{", cond_text));
                for s in then_body {
                    self.emit_stmt(s, ind + 1)?;
                }
                if else_body.is_empty() {
                    self.line(ind, "}");
                } else {
                    self.line(ind, "} else {");
                    for s in else_body {
                        self.emit_stmt(s, ind + 1)?;
                    }
                    self.line(ind, "}");
                }
            }
            Stmt::While { cond, body } => {
                let cond_text = expr_text(self.registry, cond)?;
                self.line(ind, &format!("while ({}) {{", cond_text));
                for s in body {
                    self.emit_stmt(s, ind + 1)?;
                }
                self.line(ind, "}");
            }
            Stmt::For {
                var,
                lower,
                upper,
                body,
            } => {
                let text = format!(
                    "for ( int {} = {}; {} < {}; {}++ ) {{",
                    var,
                    expr_text(self.registry, lower)?,
                    var,
                    expr_text(self.registry, upper)?,
                    var
                );
                self.line(ind, &text);
                for s in body {
                    self.emit_stmt(s, ind + 1)?;
                }
                self.line(ind, "}");
            }
            Stmt::Print(expr) => {
                let text = format!(
                    "std::cout << {} << std::endl;",
                    expr_text(self.registry, expr)?
                );
                self.line(ind, &text);
            }
            Stmt::Break => self.line(ind, "break;"),
        }
        Ok(())
    }

    /// The single traversal-call emitter shared by expression statements,
    /// assignment right-hand sides, and variable initializers — argument
    /// order and naming stay consistent everywhere.
    fn emit_apply_call(&mut self, apply: &crate::mir::ApplyExpr) -> Result<()> {
        let variant = ApplyVariant::derive(self.registry, apply)?;
        let args = traversal::call_arguments(self.registry, apply);
        self.out.push_str(&variant.name);
        self.out.push('(');
        self.out.push_str(&apply.target);
        for arg in &args {
            self.out.push_str(", ");
            self.out.push_str(arg);
        }
        self.out.push_str(");\n");
        Ok(())
    }

    fn emit_reduce(
        &mut self,
        lhs: &Expr,
        rhs: &Expr,
        op: ReduceOp,
        tracking: Option<&str>,
        ind: usize,
    ) -> Result<()> {
        let lhs_text = expr_text(self.registry, lhs)?;
        let rhs_text = expr_text(self.registry, rhs)?;
        match op {
            ReduceOp::Sum => {
                self.line(ind, &format!("{} += {};", lhs_text, rhs_text));
                if let Some(tracking) = tracking {
                    self.line(ind, &format!("{} = true;", tracking));
                }
            }
            ReduceOp::Min => {
                self.line(ind, &format!("if (({}) > ({})) {{", lhs_text, rhs_text));
                self.line(ind + 1, &format!("{} = {};", lhs_text, rhs_text));
                if let Some(tracking) = tracking {
                    self.line(ind + 1, &format!("{} = true;", tracking));
                }
                self.line(ind, "}");
            }
            // Deliberately unimplemented upstream; surface it instead of
            // guessing a lowering.
            ReduceOp::Max => {
                return Err(BackendError::unsupported("reduction 'max'", lhs_text));
            }
            ReduceOp::AtomicMin => {
                // The primitive reports whether it won; recording happens
                // after the operation so convergence checks observe it.
                match tracking {
                    Some(tracking) => self.line(
                        ind,
                        &format!("{} = writeMin(&{}, {});", tracking, lhs_text, rhs_text),
                    ),
                    None => self.line(ind, &format!("writeMin(&{}, {});", lhs_text, rhs_text)),
                }
            }
            ReduceOp::AtomicSum => {
                // Tracking is written before the atomic op so a racing
                // reader cannot observe the update without the flag.
                if let Some(tracking) = tracking {
                    self.line(ind, &format!("{} = true;", tracking));
                }
                self.line(ind, &format!("writeAdd(&{}, {});", lhs_text, rhs_text));
            }
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
// Unit tests: structural properties of emitted C++ strings (section order,
// reduction dispatch, entry-routine sequencing) without a C++ compiler.
// Complements compiler/tests/backend_tests.rs.

// binding.rs — Foreign binding emitter
//
// For each exported function, emits a pybind wrapper translating between
// the native runtime types and the foreign array/object calling
// convention: opaque graph handles are unpacked into CSR arrays and fed to
// the graph-construction builtins, numeric arrays are reinterpreted as raw
// native pointers without copying, and vector results are wrapped back
// into array descriptors with explicit shape and stride metadata. A
// trailing module-registration block lists every exported function once.
//
// The whole surface is both gated at build time (`--pybind`) and guarded
// with `#ifdef TGC_PYBIND_WRAPPERS` so the core output stays usable
// without the binding runtime present.
//
// Preconditions: wrapped functions are exported and emitted as functors.
// Postconditions: one wrapper per call; one registration block per module.
// Failure modes: result/argument vector shapes the convention cannot
//   express.
// Side effects: none.

use std::fmt::Write as _;

use crate::codegen::{expr_text, type_text};
use crate::diag::{BackendError, Result};
use crate::mir::{FuncDecl, FuncKind, Ty, VectorTy};
use crate::registry::ProgramRegistry;

/// Element type exposed to the foreign side for a vector: the scalar behind
/// one level of nesting.
fn array_elem_type(vector: &VectorTy) -> String {
    match vector.item.as_ref() {
        Ty::Vector(inner) => type_text(&inner.item).trim_end().to_string(),
        item => type_text(item).trim_end().to_string(),
    }
}

/// Sizing expression for a vector result: the element count when the vector
/// is a property, its fixed range otherwise.
fn vector_count(registry: &ProgramRegistry, vector: &VectorTy) -> Result<String> {
    match &vector.element {
        Some(element) => expr_text(registry, registry.element_count(element)?),
        None => {
            if vector.range == 0 {
                return Err(BackendError::unsupported(
                    "unsized vector in binding surface",
                    vector.canonical_name(),
                ));
            }
            Ok(vector.range.to_string())
        }
    }
}

pub fn emit_wrapper(out: &mut String, registry: &ProgramRegistry, func: &FuncDecl) -> Result<()> {
    out.push_str("#ifdef TGC_PYBIND_WRAPPERS\n");
    let _ = writeln!(out, "// pybind wrapper for {}", func.name);

    // Graph results are not supported; vector results surface as arrays.
    match &func.result {
        Some(result) => match &result.ty {
            Ty::Vector(vector) => {
                let _ = write!(out, "py::array_t<{}> ", array_elem_type(vector));
            }
            ty => out.push_str(&type_text(ty)),
        },
        None => out.push_str("void "),
    }
    let _ = write!(out, "{}__wrapper(", func.name);

    if func.args.is_empty() {
        out.push_str("void");
    } else {
        let params: Vec<String> = func
            .args
            .iter()
            .map(|arg| match &arg.ty {
                Ty::EdgeSet(_) => format!("py::object _{}", arg.name),
                Ty::Vector(vector) => {
                    format!("py::array_t<{}> _{}", array_elem_type(vector), arg.name)
                }
                ty => format!("{}{}", type_text(ty), arg.name),
            })
            .collect();
        out.push_str(&params.join(", "));
    }
    out.push_str(") {\n");

    // Translate graph and vector arguments before the actual call.
    for arg in &func.args {
        match &arg.ty {
            Ty::EdgeSet(edgeset) => {
                let n = &arg.name;
                match &edgeset.weight {
                    Some(weight) => {
                        let w = weight.cpp();
                        let _ = writeln!(
                            out,
                            "  py::array_t<{}> {}__data = _{}.attr(\"data\").cast<py::array_t<{}>>();",
                            w, n, n, w
                        );
                        emit_csr_index_casts(out, n);
                        let _ = writeln!(
                            out,
                            "  {}{} = builtin_loadWeightedEdgesFromCSR({}__data.data(), {}__indptr.data(), {}__indices.data(), {}__indptr.size()-1, {}__indices.size());",
                            type_text(&arg.ty), n, n, n, n, n, n
                        );
                    }
                    None => {
                        let _ = writeln!(
                            out,
                            "  py::array_t<int> {}__data = _{}.attr(\"data\").cast<py::array_t<int>>();",
                            n, n
                        );
                        emit_csr_index_casts(out, n);
                        let _ = writeln!(
                            out,
                            "  {}{} = builtin_loadEdgesFromCSR({}__indptr.data(), {}__indices.data(), {}__indptr.size()-1, {}__indices.size());",
                            type_text(&arg.ty), n, n, n, n, n
                        );
                    }
                }
            }
            Ty::Vector(_) => {
                // Raw reinterpretation — the foreign buffer is used in place.
                let vec_ty = type_text(&arg.ty);
                let _ = writeln!(
                    out,
                    "  {}{} = ({})_{}.data();",
                    vec_ty,
                    arg.name,
                    vec_ty.trim_end(),
                    arg.name
                );
            }
            _ => {}
        }
    }

    // The wrapped call. Exported functions are functors.
    out.push_str("  ");
    if let Some(result) = &func.result {
        let _ = write!(out, "{}__{} = ", type_text(&result.ty), result.name);
    }
    let _ = write!(out, "{}()(", func.name);
    let arg_names: Vec<&str> = func.args.iter().map(|a| a.name.as_str()).collect();
    out.push_str(&arg_names.join(", "));
    out.push_str(");\n");

    if let Some(result) = &func.result {
        match &result.ty {
            Ty::Vector(vector) => {
                let count = vector_count(registry, vector)?;
                match vector.item.as_ref() {
                    Ty::Vector(inner) => {
                        // Nested fixed-width rows: 2-D descriptor with row
                        // stride = range × element size.
                        let elem = type_text(&inner.item).trim_end().to_string();
                        let _ = writeln!(
                            out,
                            "  py::array_t<{}> {} = py::array_t<{}>(std::vector<size_t>{{(size_t){}, (size_t){}}}, std::vector<size_t>{{({} * sizeof({})), sizeof({})}}, ({}*)__{});",
                            elem, result.name, elem, count, inner.range, inner.range, elem, elem, elem, result.name
                        );
                    }
                    item => {
                        let elem = type_text(item).trim_end().to_string();
                        let _ = writeln!(
                            out,
                            "  py::array_t<{}> {} = py::array_t<{}>({{{}}}, {{sizeof({})}}, __{});",
                            elem, result.name, elem, count, elem, result.name
                        );
                    }
                }
            }
            ty => {
                let _ = writeln!(
                    out,
                    "  {}{} = __{};",
                    type_text(ty),
                    result.name,
                    result.name
                );
            }
        }
        let _ = writeln!(out, "  return {};", result.name);
    }

    out.push_str("}\n");
    out.push_str("#endif\n");
    Ok(())
}

fn emit_csr_index_casts(out: &mut String, n: &str) {
    let _ = writeln!(
        out,
        "  py::array_t<int> {}__indices = _{}.attr(\"indices\").cast<py::array_t<int>>();",
        n, n
    );
    let _ = writeln!(
        out,
        "  py::array_t<int> {}__indptr = _{}.attr(\"indptr\").cast<py::array_t<int>>();",
        n, n
    );
}

/// The trailing module block: one `def` per exported function.
pub fn emit_module_registration(out: &mut String, registry: &ProgramRegistry, module_name: &str) {
    out.push_str("#ifdef TGC_PYBIND_WRAPPERS\n");
    let _ = writeln!(out, "PYBIND11_MODULE({}, m) {{", module_name);
    for func in registry.functions() {
        if func.kind == FuncKind::Exported {
            let _ = writeln!(out, "  m.def(\"{}\", &{}__wrapper, \"\");", func.name, func.name);
        }
    }
    out.push_str("}\n");
    out.push_str("#endif\n");
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{EdgeSetTy, Expr, Param, ScalarTy};

    fn exported(name: &str, args: Vec<Param>, result: Option<Param>) -> FuncDecl {
        FuncDecl {
            name: name.to_string(),
            kind: FuncKind::Exported,
            args,
            result,
            body: Vec::new(),
        }
    }

    fn registry() -> ProgramRegistry {
        let mut reg = ProgramRegistry::new();
        reg.set_element_count("Vertex", Expr::var("V"));
        reg
    }

    fn property_vector(element: &str, scalar: ScalarTy) -> Ty {
        Ty::Vector(VectorTy {
            element: Some(element.to_string()),
            item: Box::new(Ty::Scalar(scalar)),
            range: 0,
        })
    }

    #[test]
    fn graph_argument_unpacks_csr() {
        let reg = registry();
        let func = exported(
            "run_pagerank",
            vec![Param {
                name: "g".to_string(),
                ty: Ty::EdgeSet(EdgeSetTy { weight: None }),
            }],
            None,
        );
        let mut out = String::new();
        emit_wrapper(&mut out, &reg, &func).unwrap();

        assert!(out.contains("void run_pagerank__wrapper(py::object _g)"));
        assert!(out.contains("_g.attr(\"indptr\").cast<py::array_t<int>>();"));
        assert!(out.contains(
            "Graph g = builtin_loadEdgesFromCSR(g__indptr.data(), g__indices.data(), g__indptr.size()-1, g__indices.size());"
        ));
        assert!(out.contains("run_pagerank()(g);"));
    }

    #[test]
    fn weighted_graph_uses_weighted_builtin() {
        let reg = registry();
        let func = exported(
            "run_sssp",
            vec![Param {
                name: "g".to_string(),
                ty: Ty::EdgeSet(EdgeSetTy {
                    weight: Some(ScalarTy::Int),
                }),
            }],
            None,
        );
        let mut out = String::new();
        emit_wrapper(&mut out, &reg, &func).unwrap();

        assert!(out.contains("py::array_t<int> g__data"));
        assert!(out.contains("WGraph g = builtin_loadWeightedEdgesFromCSR(g__data.data()"));
    }

    #[test]
    fn vector_argument_is_reinterpreted_without_copy() {
        let reg = registry();
        let func = exported(
            "seed",
            vec![Param {
                name: "init".to_string(),
                ty: property_vector("Vertex", ScalarTy::Double),
            }],
            None,
        );
        let mut out = String::new();
        emit_wrapper(&mut out, &reg, &func).unwrap();

        assert!(out.contains("py::array_t<double> _init"));
        assert!(out.contains("double * init = (double *)_init.data();"));
    }

    #[test]
    fn vector_result_carries_shape_and_stride() {
        let reg = registry();
        let func = exported(
            "ranks",
            Vec::new(),
            Some(Param {
                name: "out".to_string(),
                ty: property_vector("Vertex", ScalarTy::Double),
            }),
        );
        let mut out = String::new();
        emit_wrapper(&mut out, &reg, &func).unwrap();

        assert!(out.contains("py::array_t<double> ranks__wrapper(void)"));
        assert!(out.contains("double * __out = ranks()();"));
        assert!(out.contains("py::array_t<double>({V}, {sizeof(double)}, __out);"));
        assert!(out.contains("return out;"));
    }

    #[test]
    fn nested_vector_result_is_two_dimensional() {
        let reg = registry();
        let func = exported(
            "latent_out",
            Vec::new(),
            Some(Param {
                name: "out".to_string(),
                ty: Ty::Vector(VectorTy {
                    element: Some("Vertex".to_string()),
                    item: Box::new(Ty::Vector(VectorTy {
                        element: None,
                        item: Box::new(Ty::Scalar(ScalarTy::Float)),
                        range: 20,
                    })),
                    range: 0,
                }),
            }),
        );
        let mut out = String::new();
        emit_wrapper(&mut out, &reg, &func).unwrap();

        assert!(out.contains("std::vector<size_t>{(size_t)V, (size_t)20}"));
        assert!(out.contains("std::vector<size_t>{(20 * sizeof(float)), sizeof(float)}"));
    }

    #[test]
    fn module_block_lists_only_exported_functions() {
        let mut reg = registry();
        reg.add_function(exported("run_pagerank", Vec::new(), None)).unwrap();
        reg.add_function(FuncDecl {
            name: "update".to_string(),
            kind: FuncKind::Ordinary,
            args: Vec::new(),
            result: None,
            body: Vec::new(),
        })
        .unwrap();

        let mut out = String::new();
        emit_module_registration(&mut out, &reg, "pagerank_module");
        assert!(out.contains("PYBIND11_MODULE(pagerank_module, m) {"));
        assert!(out.contains("m.def(\"run_pagerank\", &run_pagerank__wrapper, \"\");"));
        assert!(!out.contains("m.def(\"update\""));
    }
}

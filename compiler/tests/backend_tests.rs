// End-to-end tests for the tgc backend.
//
// Each test builds a program registry through the library API (the same
// structure the front end serializes), runs the full pass sequence
// (lower → traversal collection → codegen), and checks structural
// properties of the emitted C++ — no C++ compiler involved.

use tgc::codegen::CodegenOptions;
use tgc::mir::*;
use tgc::pipeline::{run_backend, BackendOptions};
use tgc::registry::ProgramRegistry;
use tgc::schedule::ScheduleRecord;

// ── Builders ────────────────────────────────────────────────────────────────

fn func(name: &str, kind: FuncKind, body: Vec<Stmt>) -> FuncDecl {
    FuncDecl {
        name: name.to_string(),
        kind,
        args: Vec::new(),
        result: None,
        body,
    }
}

fn property(name: &str, item: Ty) -> GlobalDecl {
    GlobalDecl {
        name: name.to_string(),
        ty: Ty::Vector(VectorTy {
            element: Some("Vertex".to_string()),
            item: Box::new(item),
            range: 0,
        }),
        init: None,
        needs_allocation: true,
    }
}

fn fixed_vec(scalar: ScalarTy, range: u32) -> Ty {
    Ty::Vector(VectorTy {
        element: None,
        item: Box::new(Ty::Scalar(scalar)),
        range,
    })
}

fn apply(direction: Direction) -> ApplyExpr {
    ApplyExpr {
        target: "edges".to_string(),
        apply_func: "update".to_string(),
        from: None,
        to: None,
        direction,
        push_apply_func: None,
        push_to_func: None,
        parallel: true,
        label: None,
        tracking: false,
    }
}

fn base_registry() -> ProgramRegistry {
    let mut reg = ProgramRegistry::new();
    reg.add_edgeset(GlobalDecl {
        name: "edges".to_string(),
        ty: Ty::EdgeSet(EdgeSetTy { weight: None }),
        init: None,
        needs_allocation: false,
    })
    .unwrap();
    reg.set_element_count("Vertex", Expr::var("V"));
    reg.add_function(func("update", FuncKind::Ordinary, Vec::new()))
        .unwrap();
    reg
}

fn generate(reg: &ProgramRegistry) -> String {
    run_backend(reg, &BackendOptions::default())
        .unwrap()
        .cpp_source
}

// ── 1. Typedef dedup ────────────────────────────────────────────────────────

#[test]
fn structurally_identical_nested_vectors_share_one_typedef() {
    let mut reg = base_registry();
    reg.set_element_of("latent", "Vertex");
    reg.set_element_of("error", "Vertex");
    reg.set_element_of("bias", "Vertex");
    reg.add_constant(property("latent", fixed_vec(ScalarTy::Double, 20))).unwrap();
    reg.add_constant(property("error", fixed_vec(ScalarTy::Double, 20))).unwrap();
    reg.add_constant(property("bias", fixed_vec(ScalarTy::Float, 8))).unwrap();
    reg.add_function(func("main", FuncKind::Entry, Vec::new())).unwrap();

    let cpp = generate(&reg);
    assert_eq!(cpp.matches("typedef double vec_double_20 [ 20 ];").count(), 1);
    assert_eq!(cpp.matches("typedef float vec_float_8 [ 8 ];").count(), 1);
    assert!(cpp.contains("vec_double_20 * __restrict latent;"));
    assert!(cpp.contains("vec_double_20 * __restrict error;"));
    assert!(cpp.contains("vec_float_8 * __restrict bias;"));
}

// ── 2. Traversal-name determinism ───────────────────────────────────────────

#[test]
fn identical_applies_collapse_to_one_declaration_with_many_calls() {
    let mut reg = base_registry();
    reg.add_function(func(
        "run_once",
        FuncKind::Ordinary,
        vec![Stmt::Expr(Expr::EdgeSetApply(apply(Direction::Pull)))],
    ))
    .unwrap();
    reg.add_function(func(
        "main",
        FuncKind::Entry,
        vec![
            Stmt::Expr(Expr::EdgeSetApply(apply(Direction::Pull))),
            Stmt::Expr(Expr::EdgeSetApply(apply(Direction::Push))),
        ],
    ))
    .unwrap();

    let cpp = generate(&reg);
    // One declaration per shape.
    assert_eq!(
        cpp.matches("void edges_update_pull_parallel(Graph & g, APPLY_FUNC apply_func)").count(),
        1
    );
    assert_eq!(
        cpp.matches("void edges_update_push_parallel(Graph & g, APPLY_FUNC apply_func)").count(),
        1
    );
    // Two call sites reference the pull variant by the same name.
    assert_eq!(
        cpp.matches("edges_update_pull_parallel(edges, update());").count(),
        2
    );
}

// ── 3. Reduction dispatch ───────────────────────────────────────────────────

#[test]
fn tracked_sum_and_atomic_sum_order_the_tracking_write_differently() {
    let reduce = |op| Stmt::Reduce {
        lhs: Expr::var("score"),
        rhs: Expr::var("delta"),
        op,
        tracking: Some("changed".to_string()),
    };

    let mut reg = base_registry();
    reg.add_function(func("main", FuncKind::Entry, vec![reduce(ReduceOp::Sum)])).unwrap();
    let cpp = generate(&reg);
    let acc = cpp.find("score += delta;").unwrap();
    let flag = cpp.find("changed = true;").unwrap();
    assert!(acc < flag);

    let mut reg = base_registry();
    reg.add_function(func("main", FuncKind::Entry, vec![reduce(ReduceOp::AtomicSum)])).unwrap();
    let cpp = generate(&reg);
    let flag = cpp.find("changed = true;").unwrap();
    let atomic = cpp.find("writeAdd(&score, delta);").unwrap();
    assert!(flag < atomic);
}

#[test]
fn max_reduction_aborts_the_whole_pass() {
    let mut reg = base_registry();
    reg.add_function(func(
        "main",
        FuncKind::Entry,
        vec![Stmt::Reduce {
            lhs: Expr::var("best"),
            rhs: Expr::var("candidate"),
            op: ReduceOp::Max,
            tracking: None,
        }],
    ))
    .unwrap();

    let err = run_backend(&reg, &BackendOptions::default()).unwrap_err();
    assert_eq!(format!("{err}"), "unsupported reduction 'max' for 'best'");
}

// ── 4. Segment-count sign convention ────────────────────────────────────────

#[test]
fn segment_counts_emit_literals_or_checked_runtime_args() {
    let mut reg = base_registry();
    reg.register_schedule("edges", "s1", ScheduleRecord::segmented(3));
    reg.register_schedule("edges", "s2", ScheduleRecord::segmented(-2));
    reg.add_function(func("main", FuncKind::Entry, Vec::new())).unwrap();

    let cpp = generate(&reg);
    assert!(cpp.contains("edges.buildPullSegmentedGraphs(\"s1\", 3);"));
    assert!(cpp.contains(
        "edges.buildPullSegmentedGraphs(\"s2\", atoi(argv_safe(2, argv, argc)));"
    ));
}

// ── 5. NUMA lifecycle ───────────────────────────────────────────────────────

#[test]
fn numa_replicas_allocate_populate_then_free_around_user_code() {
    let mut reg = base_registry();
    reg.set_element_of("new_rank", "Vertex");
    reg.add_constant(property("new_rank", Ty::Scalar(ScalarTy::Double))).unwrap();
    reg.register_schedule(
        "edges",
        "s1",
        ScheduleRecord::numa(4, ScalarTy::Double, "new_rank", ReduceOp::Sum),
    );
    reg.add_function(func(
        "main",
        FuncKind::Entry,
        vec![Stmt::Expr(Expr::EdgeSetApply(apply(Direction::Pull)))],
    ))
    .unwrap();

    let cpp = generate(&reg);
    let alloc = cpp.find("local_new_rank = new double*[omp_get_num_places()];").unwrap();
    let populate = cpp.find("local_new_rank[socketId][n] = new_rank[n];").unwrap();
    let user = cpp.find("edges_update_pull_parallel(edges, update());").unwrap();
    let free = cpp.find("numa_free(local_new_rank[socketId], sizeof(double) * V);").unwrap();

    assert!(alloc < populate);
    assert!(populate < user);
    assert!(user < free);
}

// ── 6. Hybrid argument order ────────────────────────────────────────────────

#[test]
fn hybrid_call_passes_all_five_arguments_in_order() {
    let mut reg = base_registry();
    reg.add_function(func("update_push", FuncKind::Ordinary, Vec::new())).unwrap();
    reg.add_function(func("filter_ready", FuncKind::Ordinary, Vec::new())).unwrap();
    reg.add_function(func("push_filter_f", FuncKind::Ordinary, Vec::new())).unwrap();

    let hybrid = ApplyExpr {
        target: "edges".to_string(),
        apply_func: "update".to_string(),
        from: Some("frontier".to_string()),
        to: Some("filter_ready".to_string()),
        direction: Direction::HybridDense,
        push_apply_func: Some("update_push".to_string()),
        push_to_func: Some("push_filter_f".to_string()),
        parallel: true,
        label: None,
        tracking: true,
    };
    reg.add_function(func(
        "main",
        FuncKind::Entry,
        vec![
            Stmt::VarDecl {
                name: "frontier".to_string(),
                ty: Ty::VertexSet {
                    element: "Vertex".to_string(),
                },
                init: Some(Expr::VertexSetAlloc {
                    element: "Vertex".to_string(),
                    size: Box::new(Expr::var("V")),
                }),
            },
            Stmt::Assign {
                lhs: Expr::var("frontier"),
                rhs: Expr::EdgeSetApply(hybrid),
            },
        ],
    ))
    .unwrap();

    let cpp = generate(&reg);
    let name =
        "edges_update_hybrid_dense_parallel_from_vertexset_to_filter_push_filter_with_frontier";
    assert!(cpp.contains(&format!(
        "frontier = {}(edges, frontier, filter_ready(), update(), push_filter_f(), update_push());",
        name
    )));
    // Declaration parameter order mirrors the call.
    assert!(cpp.contains(&format!(
        "VertexSubset<NodeID> * {}(Graph & g, VertexSubset<NodeID> * from_vertexset, TO_FUNC to_func, APPLY_FUNC apply_func, PUSH_TO_FUNC push_to_func, PUSH_APPLY_FUNC push_apply_func)",
        name
    )));
}

// ── Binding surface gating ──────────────────────────────────────────────────

#[test]
fn pybind_surface_is_emitted_only_when_enabled() {
    let mut reg = base_registry();
    reg.add_function(func("run_update", FuncKind::Exported, Vec::new())).unwrap();
    reg.add_function(func("main", FuncKind::Entry, Vec::new())).unwrap();

    let off = generate(&reg);
    assert!(!off.contains("PYBIND11_MODULE"));
    assert!(!off.contains("run_update__wrapper"));

    let options = BackendOptions {
        codegen: CodegenOptions {
            pybind: true,
            module_name: "update_module".to_string(),
        },
        verbose: false,
    };
    let on = run_backend(&reg, &options).unwrap().cpp_source;
    assert!(on.contains("void run_update__wrapper(void)"));
    assert!(on.contains("PYBIND11_MODULE(update_module, m) {"));
    assert!(on.contains("m.def(\"run_update\", &run_update__wrapper, \"\");"));
    // The wrapper follows its function's body, before the module block.
    let functor = on.find("struct run_update").unwrap();
    let wrapper = on.find("run_update__wrapper(").unwrap();
    let module = on.find("PYBIND11_MODULE").unwrap();
    assert!(functor < wrapper);
    assert!(wrapper < module);
}

// ── Driver round trip ───────────────────────────────────────────────────────

#[test]
fn cli_compiles_a_serialized_registry() {
    let mut reg = base_registry();
    reg.add_function(func(
        "main",
        FuncKind::Entry,
        vec![Stmt::Expr(Expr::EdgeSetApply(apply(Direction::Pull)))],
    ))
    .unwrap();

    let json = serde_json::to_string(&reg).unwrap();
    let dir = std::env::temp_dir().join("tgc_cli_roundtrip");
    std::fs::create_dir_all(&dir).unwrap();
    let input = dir.join("program.json");
    let output = dir.join("program.cpp");
    std::fs::write(&input, &json).unwrap();

    let status = std::process::Command::new(env!("CARGO_BIN_EXE_tgc"))
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .status()
        .expect("failed to run tgc");
    assert!(status.success());

    let cpp = std::fs::read_to_string(&output).unwrap();
    assert!(cpp.starts_with("// Generated by tgc"));
    assert!(cpp.contains("edges_update_pull_parallel(edges, update());"));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn cli_build_info_reports_the_mir_hash() {
    let reg = base_registry();
    let json = serde_json::to_string(&reg).unwrap();
    let dir = std::env::temp_dir().join("tgc_cli_build_info");
    std::fs::create_dir_all(&dir).unwrap();
    let input = dir.join("program.json");
    std::fs::write(&input, &json).unwrap();

    let output = std::process::Command::new(env!("CARGO_BIN_EXE_tgc"))
        .arg(&input)
        .arg("--emit")
        .arg("build-info")
        .output()
        .expect("failed to run tgc");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let expected = tgc::pipeline::compute_provenance(&json);
    assert!(stdout.contains(&expected.mir_hash_hex()));

    std::fs::remove_dir_all(&dir).ok();
}

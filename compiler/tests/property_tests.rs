// Property-based tests for backend invariants.
//
// Two categories:
// 1. Traversal-variant naming: deterministic, injective over the shape
//    dimensions, and always a valid C identifier
// 2. Typedef identity: canonical names are structural
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use proptest::prelude::*;

use tgc::mir::{Direction, ScalarTy, Ty, VectorTy};
use tgc::traversal::{variant_name, FilterKind};

// ── Strategies ──────────────────────────────────────────────────────────────

fn arb_direction() -> impl Strategy<Value = Direction> {
    prop_oneof![
        Just(Direction::Push),
        Just(Direction::Pull),
        Just(Direction::HybridDense),
    ]
}

fn arb_filter() -> impl Strategy<Value = Option<FilterKind>> {
    prop_oneof![
        Just(None),
        Just(Some(FilterKind::VertexSet)),
        Just(Some(FilterKind::Function)),
    ]
}

/// A full shape tuple. Identifier parts are underscore-free so the joined
/// name parses unambiguously.
#[derive(Debug, Clone, PartialEq)]
struct Shape {
    edgeset: String,
    apply_func: String,
    direction: Direction,
    parallel: bool,
    from: Option<FilterKind>,
    to: Option<FilterKind>,
    has_push_to: bool,
    weighted: bool,
    segmented: bool,
    numa: bool,
    tracking: bool,
}

fn arb_shape() -> impl Strategy<Value = Shape> {
    (
        "[a-z]{1,8}",
        "[a-z]{1,8}",
        arb_direction(),
        any::<bool>(),
        arb_filter(),
        arb_filter(),
        any::<bool>(),
        any::<bool>(),
        (any::<bool>(), any::<bool>(), any::<bool>()),
    )
        .prop_map(
            |(edgeset, apply_func, direction, parallel, from, to, has_push_to, weighted, rest)| {
                let (segmented, numa, tracking) = rest;
                Shape {
                    edgeset,
                    apply_func,
                    direction,
                    parallel,
                    from,
                    to,
                    has_push_to,
                    weighted,
                    segmented,
                    numa,
                    tracking,
                }
            },
        )
}

fn name_of(s: &Shape) -> String {
    variant_name(
        &s.edgeset,
        &s.apply_func,
        s.direction,
        s.parallel,
        s.from,
        s.to,
        s.has_push_to,
        s.weighted,
        s.segmented,
        s.numa,
        s.tracking,
    )
}

// ── Naming properties ───────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn naming_is_deterministic(shape in arb_shape()) {
        prop_assert_eq!(name_of(&shape), name_of(&shape));
    }

    #[test]
    fn distinct_shapes_get_distinct_names(a in arb_shape(), b in arb_shape()) {
        if a != b {
            prop_assert_ne!(name_of(&a), name_of(&b));
        }
    }

    #[test]
    fn names_are_valid_c_identifiers(shape in arb_shape()) {
        let name = name_of(&shape);
        prop_assert!(!name.is_empty());
        prop_assert!(name.chars().next().unwrap().is_ascii_lowercase());
        prop_assert!(name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
    }
}

// ── Typedef identity properties ─────────────────────────────────────────────

fn arb_scalar() -> impl Strategy<Value = ScalarTy> {
    prop_oneof![
        Just(ScalarTy::Int),
        Just(ScalarTy::Float),
        Just(ScalarTy::Double),
        Just(ScalarTy::Bool),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn canonical_names_are_structural(scalar in arb_scalar(), range in 1u32..512) {
        let a = VectorTy {
            element: None,
            item: Box::new(Ty::Scalar(scalar)),
            range,
        };
        let b = a.clone();
        prop_assert_eq!(a.canonical_name(), b.canonical_name());
    }

    #[test]
    fn canonical_names_separate_shapes(
        s1 in arb_scalar(),
        s2 in arb_scalar(),
        r1 in 1u32..512,
        r2 in 1u32..512,
    ) {
        let a = VectorTy { element: None, item: Box::new(Ty::Scalar(s1)), range: r1 };
        let b = VectorTy { element: None, item: Box::new(Ty::Scalar(s2)), range: r2 };
        if s1 != s2 || r1 != r2 {
            prop_assert_ne!(a.canonical_name(), b.canonical_name());
        }
    }
}

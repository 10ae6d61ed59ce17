// mir.rs — Mid-level IR node families
//
// The typed, schedule-annotated program tree consumed by the backend. The
// front end serializes a program registry built from these nodes; the
// backend reads them and never mutates them — late-resolved layout
// decisions live in decoration maps (lower.rs) instead of on the nodes.
//
// Each node category (type, expression, statement) is a closed enum
// dispatched by exhaustive matching, so an unhandled new variant is a
// compile-time error rather than a silent fallthrough.
//
// Preconditions: produced by a front end that has already resolved and
//   type-checked the program.
// Postconditions: none (types only).
// Side effects: none.

use serde::{Deserialize, Serialize};

// ── Types ───────────────────────────────────────────────────────────────────

/// Scalar wire types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarTy {
    Int,
    Float,
    Double,
    Bool,
    Str,
}

impl ScalarTy {
    /// C++ spelling of the scalar type.
    pub fn cpp(&self) -> &'static str {
        match self {
            ScalarTy::Int => "int",
            ScalarTy::Float => "float",
            ScalarTy::Double => "double",
            ScalarTy::Bool => "bool",
            ScalarTy::Str => "string",
        }
    }
}

/// A property-vector type. `element` names the graph element the vector is
/// a property of (sized by the registry's element count); `range` is the
/// fixed length of an inner dense vector, 0 when element-sized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorTy {
    pub element: Option<String>,
    pub item: Box<Ty>,
    pub range: u32,
}

impl VectorTy {
    /// Canonical structural identity, used as the typedef name. Two vector
    /// types with the same payload and range collapse to one identity no
    /// matter where they are declared.
    pub fn canonical_name(&self) -> String {
        format!("vec_{}_{}", type_slug(&self.item), self.range)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSetTy {
    /// Weight scalar type; `None` for unweighted edgesets.
    pub weight: Option<ScalarTy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Ty {
    Scalar(ScalarTy),
    Vector(VectorTy),
    VertexSet { element: String },
    EdgeSet(EdgeSetTy),
    Struct { name: String },
    List { item: Box<Ty> },
    /// A graph element (e.g. `Vertex`); emitted as the runtime node id type.
    Element { name: String },
}

/// Flat structural slug for canonical typedef names.
fn type_slug(ty: &Ty) -> String {
    match ty {
        Ty::Scalar(s) => s.cpp().to_string(),
        Ty::Vector(v) => v.canonical_name(),
        Ty::VertexSet { .. } => "vertexset".to_string(),
        Ty::EdgeSet(_) => "edgeset".to_string(),
        Ty::Struct { name } => name.clone(),
        Ty::List { item } => format!("list_{}", type_slug(item)),
        Ty::Element { .. } => "nodeid".to_string(),
    }
}

// ── Expressions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    pub fn cpp(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CmpOp {
    pub fn cpp(&self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
        }
    }
}

/// Traversal direction chosen by the schedule for an edgeset apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Push,
    Pull,
    /// Push/pull combining with a runtime frontier-density switch.
    HybridDense,
}

impl Direction {
    pub fn token(&self) -> &'static str {
        match self {
            Direction::Push => "push",
            Direction::Pull => "pull",
            Direction::HybridDense => "hybrid_dense",
        }
    }
}

/// An edgeset traversal expression. `apply_func` is the primary per-edge
/// function (the pull-side function for hybrid applies); the push-side
/// fields are populated only for `Direction::HybridDense`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyExpr {
    pub target: String,
    pub apply_func: String,
    /// Source-side restriction: a vertexset variable or a filter function.
    pub from: Option<String>,
    /// Destination-side restriction: a vertexset variable or a filter function.
    pub to: Option<String>,
    pub direction: Direction,
    pub push_apply_func: Option<String>,
    pub push_to_func: Option<String>,
    pub parallel: bool,
    /// Schedule label for segment/NUMA metadata lookup on the target edgeset.
    pub label: Option<String>,
    /// Whether the traversal returns the frontier of modified vertices.
    pub tracking: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Var(String),
    IntLit(i64),
    FloatLit(f64),
    BoolLit(bool),
    StringLit(String),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Cmp {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Neg(Box<Expr>),
    Call {
        name: String,
        generic: Option<Ty>,
        args: Vec<Expr>,
    },
    /// Dense indexed read/write target. Reads of the runtime-argument
    /// vector are emitted bounds-checked (codegen.rs).
    ArrayRead {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    /// Field read out of an array-of-structs layout.
    StructRead {
        target: String,
        index: Box<Expr>,
        field: String,
    },
    EdgeSetLoad {
        path: Box<Expr>,
        weighted: bool,
    },
    VertexSetAlloc {
        element: String,
        size: Box<Expr>,
    },
    ListAlloc {
        item: Ty,
    },
    /// Vector allocation: sized by the element count when `element` is set,
    /// otherwise by the literal `size` of a fixed-range vector.
    VectorAlloc {
        element: Option<String>,
        item: Ty,
        size: Option<Box<Expr>>,
    },
    VertexSetApply {
        target: String,
        func: String,
        parallel: bool,
    },
    VertexSetWhere {
        target: String,
        func: String,
        constant_set: bool,
    },
    EdgeSetApply(ApplyExpr),
}

impl Expr {
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    pub fn int(v: i64) -> Self {
        Expr::IntLit(v)
    }
}

// ── Statements ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReduceOp {
    Sum,
    Min,
    Max,
    AtomicSum,
    AtomicMin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    VarDecl {
        name: String,
        ty: Ty,
        init: Option<Expr>,
    },
    Assign {
        lhs: Expr,
        rhs: Expr,
    },
    Reduce {
        lhs: Expr,
        rhs: Expr,
        op: ReduceOp,
        /// Convergence flag written when the reduction changes its target.
        tracking: Option<String>,
    },
    CompareAndSwap {
        lhs: Expr,
        compare: Expr,
        value: Expr,
        tracking: String,
    },
    Expr(Expr),
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    /// Counted loop over the integer range `[lower, upper)`.
    For {
        var: String,
        lower: Expr,
        upper: Expr,
        body: Vec<Stmt>,
    },
    Print(Expr),
    Break,
}

// ── Declarations ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FuncKind {
    Ordinary,
    /// The single privileged entry routine; emitted as native `main`.
    Entry,
    External,
    Exported,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Ty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncDecl {
    pub name: String,
    pub kind: FuncKind,
    pub args: Vec<Param>,
    /// Named result slot. The backend synthesizes a leading local bound to
    /// this name and an implicit trailing return of it.
    pub result: Option<Param>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<Param>,
}

/// A top-level constant: scalar, property vector, vertexset, or edgeset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalDecl {
    pub name: String,
    pub ty: Ty,
    pub init: Option<Expr>,
    /// Property vectors allocated in the entry routine rather than bound
    /// to an existing buffer.
    #[serde(default)]
    pub needs_allocation: bool,
}

// ── Tests ───────────────────────────────────────────────────────────────────

// tgc — Trellis Graph Compiler
//
// Library root. The backend consumes a schedule-annotated MIR registry
// produced by the (external) front end and emits a parallel C++ translation
// unit.

pub mod binding;
pub mod codegen;
pub mod diag;
pub mod lower;
pub mod mir;
pub mod pipeline;
pub mod registry;
pub mod schedule;
pub mod traversal;

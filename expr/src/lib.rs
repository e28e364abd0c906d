//! Expression layer of the descent AD engine.
//!
//! Arithmetic on [`Active`] scalars does not touch any tape. Each operator
//! builds a statically typed [`Expr`] tree whose nodes eagerly carry the
//! primal result and know how to produce the local partial derivatives of the
//! operation they represent. Only when a tree is assigned to an [`Active`]
//! scalar does the bound differentiation engine consume it: recording tapes
//! extract a Jacobian row or a statement handle, the tapeless forward mode
//! folds the tree into a tangent.
//!
//! The binding between a scalar and its engine is the [`AdKind`] type
//! parameter; the engines themselves live in `descent-tape`.

mod kind;
mod node;
pub mod ops;

pub use kind::{Active, AdKind};
pub use node::{
    ConstOperand, Expr, ExprNode, IntoExpr, LeafRef, ConstantSink, LeafSink, PartialsSink,
};
pub use ops::functions::{atan2, max, min, pow};
pub use ops::ElementaryFunctions;

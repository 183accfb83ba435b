//! Actions
//!
//! - `expr` - the expression language of guards, conditions and operands
//! - `ir` - the routine representation emitters render and the sandbox runs
//! - `compiler` - lowering of declared actions into routines

mod compiler;
mod expr;
mod ir;

pub use compiler::{targets_row, ActionCompiler, CompileError, CompileErrorKind, CALLER_ID};
pub use expr::{BinaryOp, Expr, ExprError, Func, Literal, Scope, UnaryOp};
pub use ir::{
    walk_ops, ChainWalk, DependencyLink, DependencyWalk, EventDescriptor, LookupDirection, Op, Param, RangeSpec, Routine,
    RoutineBody, RoutineKind, RowFilter, TableRef, VersionSpec, CYCLIC_DEPENDENCY,
    CYCLIC_TEMPLATE, DEPENDENCY_DEPTH_EXCEEDED, NOT_FOUND, TEMPLATE_DEPTH_EXCEEDED,
};

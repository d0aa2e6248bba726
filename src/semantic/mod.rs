//! Semantic analysis: symbol resolution and type checking.
//!
//! The front half of the pipeline. [`resolver::resolve`] builds the symbol
//! and scope arenas and binds every reference; [`checker::check`] types every
//! declaration and body and produces the bound tree that code generation
//! consumes.

pub mod bound;
pub mod checker;
pub mod resolver;
pub mod scope;
pub mod symbol;
pub mod ty;

pub use bound::BoundModule;
pub use checker::check;
pub use resolver::{resolve, Resolution};
pub use symbol::{SymbolArena, SymbolId};
pub use ty::Ty;

//! Error types for compilation and execution.
//!
//! Every phase is all-or-nothing: the first error detected aborts the phase
//! and the whole compile. The VM likewise halts on the first fault; there is
//! no recovery or continuation.

use thiserror::Error;

/// Errors produced by symbol resolution, type checking, or code generation.
///
/// Messages carry the symbol and type names involved so a failed compile can
/// be traced back to the offending construct without span bookkeeping.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// A name lookup walked the whole scope chain without a hit.
    #[error("undeclared symbol '{name}'")]
    UndeclaredSymbol { name: String },

    /// A declaration clashed with an existing name in the same scope.
    #[error("'{name}' is already declared in this scope")]
    DuplicateSymbol { name: String },

    /// An operator, assignment, call, or return violated the typing rules.
    #[error("type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        context: String,
        expected: String,
        found: String,
    },

    /// No candidate in an overload set matched the argument types exactly.
    #[error("no overload of '{name}' matches arguments ({args})")]
    NoMatchingOverload { name: String, args: String },

    /// More than one candidate in an overload set matched exactly.
    #[error("ambiguous call to overloaded '{name}' with arguments ({args})")]
    AmbiguousOverload { name: String, args: String },

    /// A declaration is too large for the bytecode's fixed-width operands.
    #[error("'{name}' exceeds the limit of {limit} {what}")]
    LimitExceeded {
        name: String,
        what: &'static str,
        limit: u32,
    },
}

impl CompileError {
    pub fn mismatch(
        context: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        CompileError::TypeMismatch {
            context: context.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Errors produced by the virtual machine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// A fatal fault: bad opcode operand, stack underflow, or a
    /// type-confused value for the operation. Execution halts.
    #[error("invalid operation '{opcode}' at {position}: {detail}")]
    InvalidOperation {
        opcode: String,
        position: usize,
        detail: String,
    },

    /// A call-by-name against a function the program does not contain.
    #[error("no function named '{name}' in program")]
    UnknownFunction { name: String },
}

//! The bound tree.
//!
//! Output of the type checker and input to code generation. Every node is
//! fully typed and carries symbol ids instead of names; field accesses carry
//! the field's slot index, and calls carry a resolved target, so code
//! generation never consults scopes or does name lookup.

use crate::ast::{BinaryOp, IncDecOp, UnaryOp};

use super::symbol::{Intrinsic, SymbolId};
use super::ty::Ty;

#[derive(Debug)]
pub struct BoundModule {
    /// Top-level variables, in declaration order. Their initializers run in
    /// this order before the first call into the module.
    pub globals: Vec<BoundGlobal>,
    pub functions: Vec<BoundFunction>,
    pub classes: Vec<BoundClass>,
}

#[derive(Debug)]
pub struct BoundGlobal {
    pub symbol: SymbolId,
    pub init: BoundExpr,
}

#[derive(Debug)]
pub struct BoundFunction {
    pub symbol: SymbolId,
    pub body: Vec<BoundStmt>,
}

#[derive(Debug)]
pub struct BoundClass {
    pub symbol: SymbolId,
    pub constructors: Vec<BoundFunction>,
    pub methods: Vec<BoundFunction>,
}

#[derive(Debug)]
pub enum BoundStmt {
    Expr(BoundExpr),
    Block(Vec<BoundStmt>),
    If {
        cond: BoundExpr,
        then_branch: Vec<BoundStmt>,
        else_branch: Option<Vec<BoundStmt>>,
    },
    While {
        cond: BoundExpr,
        body: Vec<BoundStmt>,
    },
    Return(Option<BoundExpr>),
    /// A local declaration. Declarations without an initializer get their
    /// type's default value synthesized here, so every local is initialized.
    VarInit { symbol: SymbolId, init: BoundExpr },
}

/// A compile-time constant value. `Void` is the default for object-typed
/// variables declared without an initializer.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    Double(f64),
    Str(String),
    Bool(bool),
    Void,
}

#[derive(Debug)]
pub enum BoundExpr {
    Constant {
        value: Constant,
        ty: Ty,
    },
    VarLoad {
        symbol: SymbolId,
        ty: Ty,
    },
    This {
        ty: Ty,
    },
    FieldLoad {
        receiver: Box<BoundExpr>,
        field: SymbolId,
        /// Slot of the field in its class's declaration order.
        index: u16,
        ty: Ty,
    },
    Unary {
        op: UnaryOp,
        operand: Box<BoundExpr>,
        ty: Ty,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<BoundExpr>,
        rhs: Box<BoundExpr>,
        ty: Ty,
    },
    /// Plain or compound assignment; evaluates to the stored value.
    Assign {
        op: Option<BinaryOp>,
        target: BoundTarget,
        value: Box<BoundExpr>,
        ty: Ty,
    },
    /// `++`/`--`; evaluates to the new value when prefix, the old when
    /// postfix.
    IncDec {
        op: IncDecOp,
        prefix: bool,
        target: BoundTarget,
        ty: Ty,
    },
    Call {
        target: BoundCallTarget,
        args: Vec<BoundExpr>,
        ty: Ty,
    },
}

/// An assignable place.
#[derive(Debug)]
pub enum BoundTarget {
    Var(SymbolId),
    Field {
        receiver: Box<BoundExpr>,
        field: SymbolId,
        index: u16,
    },
}

/// A resolved call target.
#[derive(Debug)]
pub enum BoundCallTarget {
    Function(SymbolId),
    /// Direct dispatch on a class-typed receiver.
    Method {
        receiver: Box<BoundExpr>,
        function: SymbolId,
    },
    /// Vtable dispatch on an interface-typed receiver.
    Virtual {
        receiver: Box<BoundExpr>,
        interface: SymbolId,
        slot: u16,
    },
    /// `ClassName(args)`: allocate, then run the chosen constructor.
    Constructor {
        class: SymbolId,
        function: SymbolId,
    },
    Intrinsic(Intrinsic),
}

impl BoundExpr {
    pub fn ty(&self) -> Ty {
        match self {
            BoundExpr::Constant { ty, .. }
            | BoundExpr::VarLoad { ty, .. }
            | BoundExpr::This { ty }
            | BoundExpr::FieldLoad { ty, .. }
            | BoundExpr::Unary { ty, .. }
            | BoundExpr::Binary { ty, .. }
            | BoundExpr::Assign { ty, .. }
            | BoundExpr::IncDec { ty, .. }
            | BoundExpr::Call { ty, .. } => *ty,
        }
    }
}

//! Expression nodes.

use super::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Logical not.
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncDecOp {
    Inc,
    Dec,
}

#[derive(Debug, Clone)]
pub enum Expr {
    IntLit {
        id: NodeId,
        value: i64,
    },
    DoubleLit {
        id: NodeId,
        value: f64,
    },
    StringLit {
        id: NodeId,
        value: String,
    },
    BoolLit {
        id: NodeId,
        value: bool,
    },
    /// A bare identifier; bound to a symbol by resolution pass 2.
    Name {
        id: NodeId,
        name: String,
    },
    /// The receiver inside a method or constructor body.
    This {
        id: NodeId,
    },
    /// `receiver.name` — field access or, as a call's callee, a method name.
    Field {
        id: NodeId,
        receiver: Box<Expr>,
        name: String,
    },
    Unary {
        id: NodeId,
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        id: NodeId,
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `target = value`, or `target op= value` when `op` is present.
    Assign {
        id: NodeId,
        op: Option<BinaryOp>,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    IncDec {
        id: NodeId,
        op: IncDecOp,
        prefix: bool,
        target: Box<Expr>,
    },
    Call {
        id: NodeId,
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn id(&self) -> NodeId {
        match self {
            Expr::IntLit { id, .. }
            | Expr::DoubleLit { id, .. }
            | Expr::StringLit { id, .. }
            | Expr::BoolLit { id, .. }
            | Expr::Name { id, .. }
            | Expr::This { id }
            | Expr::Field { id, .. }
            | Expr::Unary { id, .. }
            | Expr::Binary { id, .. }
            | Expr::Assign { id, .. }
            | Expr::IncDec { id, .. }
            | Expr::Call { id, .. } => *id,
        }
    }
}

//! Statement nodes.

use super::{Expr, NodeId, TypeRef};

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr(Expr),
    Block(Block),
    If(IfStmt),
    While(WhileStmt),
    Return(ReturnStmt),
    Var(VarDecl),
}

/// A braced statement list. Introduces a child scope, except for a function
/// body, which shares the function's own scope with its parameters.
#[derive(Debug, Clone)]
pub struct Block {
    pub id: NodeId,
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct IfStmt {
    pub id: NodeId,
    pub cond: Expr,
    pub then_branch: Block,
    pub else_branch: Option<Block>,
}

#[derive(Debug, Clone)]
pub struct WhileStmt {
    pub id: NodeId,
    pub cond: Expr,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub struct ReturnStmt {
    pub id: NodeId,
    pub value: Option<Expr>,
}

/// `var name[: type] [= init];` — local when inside a body, global at the
/// top level. The initializer is mandatory when no type is declared.
#[derive(Debug, Clone)]
pub struct VarDecl {
    pub id: NodeId,
    pub name: String,
    pub declared_type: Option<TypeRef>,
    pub init: Option<Expr>,
}

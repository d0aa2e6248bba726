//! The input syntax tree.
//!
//! Lexing and parsing are upstream concerns: the compiler consumes an
//! already-built tree of declarations, statements, and expressions with all
//! identifier and type references left unresolved. Every node carries a dense
//! [`NodeId`] so the resolver can annotate nodes through side tables instead
//! of mutating the tree; ids are handed out by [`AstBuilder`], which a parser
//! (or a test) threads through construction.

mod expr;
mod stmt;

pub use expr::{BinaryOp, Expr, IncDecOp, UnaryOp};
pub use stmt::{Block, IfStmt, ReturnStmt, Stmt, VarDecl, WhileStmt};

/// Identity of a syntax node, unique within one [`Module`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// An unresolved reference to a type by name.
#[derive(Debug, Clone)]
pub struct TypeRef {
    pub id: NodeId,
    pub name: String,
}

/// A whole translation unit: the list of top-level items.
#[derive(Debug, Clone)]
pub struct Module {
    pub items: Vec<Item>,
}

#[derive(Debug, Clone)]
pub enum Item {
    Function(FunctionDecl),
    Class(ClassDecl),
    Interface(InterfaceDecl),
    Global(VarDecl),
}

/// A function declaration: free function, method, or constructor.
///
/// Constructors are declared with the class's own name and no return type.
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub id: NodeId,
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<TypeRef>,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub id: NodeId,
    pub name: String,
    pub ty: TypeRef,
}

#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub id: NodeId,
    pub name: String,
    pub implements: Vec<TypeRef>,
    pub fields: Vec<FieldDecl>,
    pub constructors: Vec<FunctionDecl>,
    pub methods: Vec<FunctionDecl>,
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub id: NodeId,
    pub name: String,
    pub ty: TypeRef,
}

#[derive(Debug, Clone)]
pub struct InterfaceDecl {
    pub id: NodeId,
    pub name: String,
    pub methods: Vec<MethodSig>,
}

/// A bodiless method signature inside an interface.
#[derive(Debug, Clone)]
pub struct MethodSig {
    pub id: NodeId,
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<TypeRef>,
}

/// Allocates node ids and builds AST nodes.
///
/// The parser owns one of these per module; tests use it directly.
#[derive(Debug, Default)]
pub struct AstBuilder {
    next_id: u32,
}

impl AstBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    // Types and declarations

    pub fn ty(&mut self, name: &str) -> TypeRef {
        TypeRef {
            id: self.id(),
            name: name.to_string(),
        }
    }

    pub fn param(&mut self, name: &str, ty: TypeRef) -> Param {
        Param {
            id: self.id(),
            name: name.to_string(),
            ty,
        }
    }

    pub fn function(
        &mut self,
        name: &str,
        params: Vec<Param>,
        return_type: Option<TypeRef>,
        body: Block,
    ) -> FunctionDecl {
        FunctionDecl {
            id: self.id(),
            name: name.to_string(),
            params,
            return_type,
            body,
        }
    }

    pub fn field(&mut self, name: &str, ty: TypeRef) -> FieldDecl {
        FieldDecl {
            id: self.id(),
            name: name.to_string(),
            ty,
        }
    }

    pub fn class(
        &mut self,
        name: &str,
        implements: Vec<TypeRef>,
        fields: Vec<FieldDecl>,
        constructors: Vec<FunctionDecl>,
        methods: Vec<FunctionDecl>,
    ) -> ClassDecl {
        ClassDecl {
            id: self.id(),
            name: name.to_string(),
            implements,
            fields,
            constructors,
            methods,
        }
    }

    pub fn method_sig(
        &mut self,
        name: &str,
        params: Vec<Param>,
        return_type: Option<TypeRef>,
    ) -> MethodSig {
        MethodSig {
            id: self.id(),
            name: name.to_string(),
            params,
            return_type,
        }
    }

    pub fn interface(&mut self, name: &str, methods: Vec<MethodSig>) -> InterfaceDecl {
        InterfaceDecl {
            id: self.id(),
            name: name.to_string(),
            methods,
        }
    }

    pub fn var(
        &mut self,
        name: &str,
        declared_type: Option<TypeRef>,
        init: Option<Expr>,
    ) -> VarDecl {
        VarDecl {
            id: self.id(),
            name: name.to_string(),
            declared_type,
            init,
        }
    }

    // Statements

    pub fn block(&mut self, stmts: Vec<Stmt>) -> Block {
        Block {
            id: self.id(),
            stmts,
        }
    }

    pub fn expr_stmt(&mut self, expr: Expr) -> Stmt {
        Stmt::Expr(expr)
    }

    pub fn var_stmt(
        &mut self,
        name: &str,
        declared_type: Option<TypeRef>,
        init: Option<Expr>,
    ) -> Stmt {
        Stmt::Var(self.var(name, declared_type, init))
    }

    pub fn if_stmt(&mut self, cond: Expr, then_branch: Block, else_branch: Option<Block>) -> Stmt {
        Stmt::If(IfStmt {
            id: self.id(),
            cond,
            then_branch,
            else_branch,
        })
    }

    pub fn while_stmt(&mut self, cond: Expr, body: Block) -> Stmt {
        Stmt::While(WhileStmt {
            id: self.id(),
            cond,
            body,
        })
    }

    pub fn ret(&mut self, value: Option<Expr>) -> Stmt {
        Stmt::Return(ReturnStmt {
            id: self.id(),
            value,
        })
    }

    // Expressions

    pub fn int(&mut self, value: i64) -> Expr {
        Expr::IntLit {
            id: self.id(),
            value,
        }
    }

    pub fn double(&mut self, value: f64) -> Expr {
        Expr::DoubleLit {
            id: self.id(),
            value,
        }
    }

    pub fn string(&mut self, value: &str) -> Expr {
        Expr::StringLit {
            id: self.id(),
            value: value.to_string(),
        }
    }

    pub fn boolean(&mut self, value: bool) -> Expr {
        Expr::BoolLit {
            id: self.id(),
            value,
        }
    }

    pub fn name(&mut self, name: &str) -> Expr {
        Expr::Name {
            id: self.id(),
            name: name.to_string(),
        }
    }

    pub fn this(&mut self) -> Expr {
        Expr::This { id: self.id() }
    }

    pub fn field_access(&mut self, receiver: Expr, name: &str) -> Expr {
        Expr::Field {
            id: self.id(),
            receiver: Box::new(receiver),
            name: name.to_string(),
        }
    }

    pub fn unary(&mut self, op: UnaryOp, operand: Expr) -> Expr {
        Expr::Unary {
            id: self.id(),
            op,
            operand: Box::new(operand),
        }
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            id: self.id(),
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn assign(&mut self, target: Expr, value: Expr) -> Expr {
        Expr::Assign {
            id: self.id(),
            op: None,
            target: Box::new(target),
            value: Box::new(value),
        }
    }

    pub fn compound_assign(&mut self, op: BinaryOp, target: Expr, value: Expr) -> Expr {
        Expr::Assign {
            id: self.id(),
            op: Some(op),
            target: Box::new(target),
            value: Box::new(value),
        }
    }

    pub fn inc_dec(&mut self, op: IncDecOp, prefix: bool, target: Expr) -> Expr {
        Expr::IncDec {
            id: self.id(),
            op,
            prefix,
            target: Box::new(target),
        }
    }

    pub fn call(&mut self, callee: Expr, args: Vec<Expr>) -> Expr {
        Expr::Call {
            id: self.id(),
            callee: Box::new(callee),
            args,
        }
    }

    /// Convenience for the common `name(args)` shape.
    pub fn call_named(&mut self, name: &str, args: Vec<Expr>) -> Expr {
        let callee = self.name(name);
        self.call(callee, args)
    }

    /// Convenience for the common `receiver.method(args)` shape.
    pub fn call_method(&mut self, receiver: Expr, method: &str, args: Vec<Expr>) -> Expr {
        let callee = self.field_access(receiver, method);
        self.call(callee, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_hands_out_distinct_ids() {
        let mut b = AstBuilder::new();
        let a = b.int(1);
        let c = b.int(2);
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn call_named_wraps_a_name_callee() {
        let mut b = AstBuilder::new();
        let call = b.call_named("f", vec![]);
        match call {
            Expr::Call { callee, args, .. } => {
                assert!(matches!(*callee, Expr::Name { ref name, .. } if name == "f"));
                assert!(args.is_empty());
            }
            other => panic!("expected call, got {other:?}"),
        }
    }
}

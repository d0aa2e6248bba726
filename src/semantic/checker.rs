//! Type checking.
//!
//! Two passes over the resolved tree. Pass 1 computes every declared
//! signature: parameter and return types of functions, field types, global
//! types where declared, interface method signatures, and each class's
//! vtables (one ordered method list per implemented interface). Classes
//! without a constructor get a default one synthesized. Pass 2 checks every
//! body against those signatures and produces the bound tree. Bodies are
//! checked after all signatures exist, so declaration order between items
//! never matters; global initializers are the exception and are checked
//! first, in declaration order, because their types may be inferred.

use rustc_hash::FxHashMap;

use crate::ast::{
    BinaryOp, Block, Expr, FunctionDecl, InterfaceDecl, Item, Module, NodeId, Stmt, TypeRef,
    UnaryOp, VarDecl,
};
use crate::error::CompileError;

use super::bound::{
    BoundCallTarget, BoundClass, BoundExpr, BoundFunction, BoundGlobal, BoundModule, BoundStmt,
    BoundTarget, Constant,
};
use super::resolver::Resolution;
use super::symbol::{FunctionTraits, Symbol, SymbolArena, SymbolId, SymbolKind};
use super::ty::{FnSig, Ty};

/// Type-check a resolved module, producing the final symbol arena and the
/// bound tree.
pub fn check(
    module: &Module,
    resolution: Resolution,
) -> Result<(SymbolArena, BoundModule), CompileError> {
    let mut checker = Checker {
        symbols: resolution.symbols,
        refs: resolution.refs,
        decls: resolution.decls,
        synthesized_ctors: FxHashMap::default(),
    };
    checker.check_signatures(module)?;
    checker.check_vtables(module)?;
    let bound = checker.check_bodies(module)?;
    Ok((checker.symbols, bound))
}

struct Checker {
    symbols: SymbolArena,
    refs: FxHashMap<NodeId, SymbolId>,
    decls: FxHashMap<NodeId, SymbolId>,
    /// Classes declared without a constructor, mapped to their synthesized
    /// zero-argument one.
    synthesized_ctors: FxHashMap<SymbolId, SymbolId>,
}

/// Call instructions carry an 8-bit argument count that includes the
/// receiver, and local slots are 16-bit operands. Declarations are capped
/// here so the emitted counts always fit.
const MAX_PARAMS: usize = u8::MAX as usize - 1;
const MAX_LOCALS: usize = u16::MAX as usize;

/// Per-function context for body checking.
struct FnCtx {
    ret: Ty,
    this_ty: Option<Ty>,
    is_ctor: bool,
}

impl Checker {
    // =========================================================================
    // Pass 1: signatures
    // =========================================================================

    fn check_signatures(&mut self, module: &Module) -> Result<(), CompileError> {
        for item in &module.items {
            match item {
                Item::Function(f) => self.fill_function_sig(f, None)?,
                Item::Class(c) => {
                    let class = self.decls[&c.id];
                    for fd in &c.fields {
                        let ty = self.resolve_type(&fd.ty)?;
                        let field = self.decls[&fd.id];
                        self.set_var_ty(field, ty);
                    }
                    let mut interfaces = Vec::with_capacity(c.implements.len());
                    for t in &c.implements {
                        let ty = self.resolve_type(t)?;
                        match ty {
                            Ty::Interface(i) => interfaces.push(i),
                            _ => {
                                return Err(CompileError::mismatch(
                                    format!("implements clause of '{}'", c.name),
                                    "an interface",
                                    self.symbols.type_name(ty),
                                ));
                            }
                        }
                    }
                    if let SymbolKind::Class { interfaces: is, .. } =
                        &mut self.symbols.get_mut(class).kind
                    {
                        *is = interfaces;
                    }
                    for ct in &c.constructors {
                        self.fill_function_sig(ct, Some(Ty::Class(class)))?;
                    }
                    for m in &c.methods {
                        self.fill_function_sig(m, None)?;
                    }
                    if c.constructors.is_empty() {
                        self.synthesize_default_ctor(class, &c.name);
                    }
                }
                Item::Interface(i) => self.fill_interface_sigs(i)?,
                Item::Global(v) => {
                    if let Some(t) = &v.declared_type {
                        let ty = self.resolve_type(t)?;
                        let sym = self.decls[&v.id];
                        self.set_var_ty(sym, ty);
                    }
                }
            }
        }
        Ok(())
    }

    /// Resolve parameter and return types and store the signature on the
    /// function symbol. `ctor_of` overrides the return type for constructors.
    fn fill_function_sig(
        &mut self,
        f: &FunctionDecl,
        ctor_of: Option<Ty>,
    ) -> Result<(), CompileError> {
        let sym = self.decls[&f.id];
        if f.params.len() > MAX_PARAMS {
            return Err(CompileError::LimitExceeded {
                name: f.name.clone(),
                what: "parameters",
                limit: MAX_PARAMS as u32,
            });
        }
        let mut params = Vec::with_capacity(f.params.len());
        for p in &f.params {
            let ty = self.resolve_type(&p.ty)?;
            let psym = self.decls[&p.id];
            self.set_var_ty(psym, ty);
            params.push(ty);
        }
        let ret = match ctor_of {
            Some(class_ty) => class_ty,
            None => match &f.return_type {
                Some(t) => self.resolve_type(t)?,
                None => Ty::Void,
            },
        };
        if let SymbolKind::Function { sig, .. } = &mut self.symbols.get_mut(sym).kind {
            *sig = Some(FnSig { params, ret });
        }
        Ok(())
    }

    fn fill_interface_sigs(&mut self, i: &InterfaceDecl) -> Result<(), CompileError> {
        for m in &i.methods {
            let sym = self.decls[&m.id];
            if m.params.len() > MAX_PARAMS {
                return Err(CompileError::LimitExceeded {
                    name: m.name.clone(),
                    what: "parameters",
                    limit: MAX_PARAMS as u32,
                });
            }
            let mut params = Vec::with_capacity(m.params.len());
            for p in &m.params {
                let ty = self.resolve_type(&p.ty)?;
                let psym = self.decls[&p.id];
                self.set_var_ty(psym, ty);
                params.push(ty);
            }
            let ret = match &m.return_type {
                Some(t) => self.resolve_type(t)?,
                None => Ty::Void,
            };
            if let SymbolKind::Function { sig, .. } = &mut self.symbols.get_mut(sym).kind {
                *sig = Some(FnSig { params, ret });
            }
        }
        Ok(())
    }

    fn synthesize_default_ctor(&mut self, class: SymbolId, class_name: &str) {
        let ctor = self.symbols.alloc(Symbol {
            name: class_name.to_string(),
            parent: Some(class),
            kind: SymbolKind::Function {
                params: Vec::new(),
                sig: Some(FnSig {
                    params: Vec::new(),
                    ret: Ty::Class(class),
                }),
                traits: FunctionTraits::METHOD | FunctionTraits::CONSTRUCTOR,
                interface_slot: None,
                intrinsic: None,
            },
        });
        if let SymbolKind::Class { constructors, .. } = &mut self.symbols.get_mut(class).kind {
            constructors.push(ctor);
        }
        self.synthesized_ctors.insert(class, ctor);
    }

    /// For every class, match each implemented interface's methods against
    /// the class's own by name and exact signature, recording the vtable
    /// method list in interface slot order.
    fn check_vtables(&mut self, module: &Module) -> Result<(), CompileError> {
        for item in &module.items {
            let Item::Class(c) = item else { continue };
            let class = self.decls[&c.id];
            let (interfaces, methods) = match &self.symbols.get(class).kind {
                SymbolKind::Class {
                    interfaces,
                    methods,
                    ..
                } => (interfaces.clone(), methods.clone()),
                _ => continue,
            };
            let mut vtables = Vec::with_capacity(interfaces.len());
            for iface in interfaces {
                let iface_methods = match &self.symbols.get(iface).kind {
                    SymbolKind::Interface { methods } => methods.clone(),
                    _ => continue,
                };
                let mut table = Vec::with_capacity(iface_methods.len());
                for wanted in iface_methods {
                    let wanted_sig = self.symbols.sig(wanted).clone();
                    let wanted_name = self.symbols.name(wanted).to_string();
                    let found = methods.iter().copied().find(|m| {
                        self.symbols.name(*m) == wanted_name
                            && *self.symbols.sig(*m) == wanted_sig
                    });
                    match found {
                        Some(m) => table.push(m),
                        None => {
                            return Err(CompileError::mismatch(
                                format!(
                                    "implementation of '{}' by '{}'",
                                    self.symbols.name(iface),
                                    c.name
                                ),
                                format!(
                                    "method '{}({})'",
                                    wanted_name,
                                    self.symbols.type_names(&wanted_sig.params)
                                ),
                                "no matching method",
                            ));
                        }
                    }
                }
                vtables.push((iface, table));
            }
            if let SymbolKind::Class { vtables: v, .. } = &mut self.symbols.get_mut(class).kind {
                *v = vtables;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Pass 2: bodies
    // =========================================================================

    fn check_bodies(&mut self, module: &Module) -> Result<BoundModule, CompileError> {
        let mut globals = Vec::new();
        for item in &module.items {
            if let Item::Global(v) = item {
                globals.push(self.check_global(v)?);
            }
        }

        let mut functions = Vec::new();
        let mut classes = Vec::new();
        for item in &module.items {
            match item {
                Item::Function(f) => functions.push(self.check_function(f, None)?),
                Item::Class(c) => {
                    let class = self.decls[&c.id];
                    let this_ty = Ty::Class(class);
                    let mut constructors = Vec::with_capacity(c.constructors.len().max(1));
                    for ct in &c.constructors {
                        constructors.push(self.check_function(ct, Some(this_ty))?);
                    }
                    if let Some(ctor) = self.synthesized_ctors.get(&class) {
                        constructors.push(BoundFunction {
                            symbol: *ctor,
                            body: Vec::new(),
                        });
                    }
                    let mut methods = Vec::with_capacity(c.methods.len());
                    for m in &c.methods {
                        methods.push(self.check_function(m, Some(this_ty))?);
                    }
                    classes.push(BoundClass {
                        symbol: class,
                        constructors,
                        methods,
                    });
                }
                Item::Interface(_) | Item::Global(_) => {}
            }
        }
        Ok(BoundModule {
            globals,
            functions,
            classes,
        })
    }

    fn check_global(&mut self, v: &VarDecl) -> Result<BoundGlobal, CompileError> {
        let sym = self.decls[&v.id];
        let declared = self.symbols.var_ty(sym);
        let ctx = FnCtx {
            ret: Ty::Void,
            this_ty: None,
            is_ctor: false,
        };
        let init = match &v.init {
            Some(init) => {
                let bound = self.check_expr(init, &ctx)?;
                let found = bound.ty();
                match declared {
                    Some(want) if !self.symbols.is_assignable(found, want) => {
                        return Err(self.assign_mismatch(&v.name, want, found));
                    }
                    Some(_) => {}
                    None => self.set_var_ty(sym, found),
                }
                bound
            }
            None => {
                let Some(want) = declared else {
                    return Err(CompileError::mismatch(
                        format!("declaration of '{}'", v.name),
                        "a type or an initializer",
                        "neither",
                    ));
                };
                default_value(want)
            }
        };
        Ok(BoundGlobal { symbol: sym, init })
    }

    fn check_function(
        &mut self,
        f: &FunctionDecl,
        this_ty: Option<Ty>,
    ) -> Result<BoundFunction, CompileError> {
        let sym = self.decls[&f.id];
        let (ret, is_ctor) = match &self.symbols.get(sym).kind {
            SymbolKind::Function { sig, traits, .. } => {
                let is_ctor = traits.contains(FunctionTraits::CONSTRUCTOR);
                let ret = sig.as_ref().map(|s| s.ret).unwrap_or(Ty::Void);
                (ret, is_ctor)
            }
            _ => (Ty::Void, false),
        };
        let ctx = FnCtx {
            // A constructor body returns nothing; the receiver flows back
            // implicitly.
            ret: if is_ctor { Ty::Void } else { ret },
            this_ty,
            is_ctor,
        };
        let body = self.check_block(&f.body, &ctx)?;
        if count_locals(&body) > MAX_LOCALS {
            return Err(CompileError::LimitExceeded {
                name: f.name.clone(),
                what: "local variables",
                limit: MAX_LOCALS as u32,
            });
        }
        Ok(BoundFunction { symbol: sym, body })
    }

    fn check_block(&mut self, block: &Block, ctx: &FnCtx) -> Result<Vec<BoundStmt>, CompileError> {
        let mut out = Vec::with_capacity(block.stmts.len());
        for stmt in &block.stmts {
            out.push(self.check_stmt(stmt, ctx)?);
        }
        Ok(out)
    }

    fn check_stmt(&mut self, stmt: &Stmt, ctx: &FnCtx) -> Result<BoundStmt, CompileError> {
        match stmt {
            Stmt::Expr(e) => Ok(BoundStmt::Expr(self.check_expr(e, ctx)?)),
            Stmt::Block(b) => Ok(BoundStmt::Block(self.check_block(b, ctx)?)),
            Stmt::If(i) => {
                let cond = self.check_condition(&i.cond, "if condition", ctx)?;
                let then_branch = self.check_block(&i.then_branch, ctx)?;
                let else_branch = match &i.else_branch {
                    Some(b) => Some(self.check_block(b, ctx)?),
                    None => None,
                };
                Ok(BoundStmt::If {
                    cond,
                    then_branch,
                    else_branch,
                })
            }
            Stmt::While(w) => {
                let cond = self.check_condition(&w.cond, "while condition", ctx)?;
                let body = self.check_block(&w.body, ctx)?;
                Ok(BoundStmt::While { cond, body })
            }
            Stmt::Return(r) => {
                let value = match &r.value {
                    Some(v) => {
                        let bound = self.check_expr(v, ctx)?;
                        if bound.ty() != ctx.ret {
                            return Err(CompileError::mismatch(
                                "return value",
                                self.symbols.type_name(ctx.ret),
                                self.symbols.type_name(bound.ty()),
                            ));
                        }
                        Some(bound)
                    }
                    None => {
                        if ctx.ret != Ty::Void && !ctx.is_ctor {
                            return Err(CompileError::mismatch(
                                "return value",
                                self.symbols.type_name(ctx.ret),
                                "void",
                            ));
                        }
                        None
                    }
                };
                Ok(BoundStmt::Return(value))
            }
            Stmt::Var(v) => self.check_var_stmt(v, ctx),
        }
    }

    fn check_var_stmt(&mut self, v: &VarDecl, ctx: &FnCtx) -> Result<BoundStmt, CompileError> {
        let sym = self.decls[&v.id];
        let declared = match &v.declared_type {
            Some(t) => Some(self.resolve_type(t)?),
            None => None,
        };
        let init = match &v.init {
            Some(init) => {
                let bound = self.check_expr(init, ctx)?;
                let found = bound.ty();
                if found == Ty::Void {
                    return Err(CompileError::mismatch(
                        format!("initialization of '{}'", v.name),
                        "a value",
                        "void",
                    ));
                }
                match declared {
                    Some(want) => {
                        if !self.symbols.is_assignable(found, want) {
                            return Err(self.assign_mismatch(&v.name, want, found));
                        }
                        self.set_var_ty(sym, want);
                    }
                    None => self.set_var_ty(sym, found),
                }
                bound
            }
            None => {
                let Some(want) = declared else {
                    return Err(CompileError::mismatch(
                        format!("declaration of '{}'", v.name),
                        "a type or an initializer",
                        "neither",
                    ));
                };
                self.set_var_ty(sym, want);
                default_value(want)
            }
        };
        Ok(BoundStmt::VarInit { symbol: sym, init })
    }

    fn check_condition(
        &mut self,
        cond: &Expr,
        context: &str,
        ctx: &FnCtx,
    ) -> Result<BoundExpr, CompileError> {
        let bound = self.check_expr(cond, ctx)?;
        if bound.ty() != Ty::Bool {
            return Err(CompileError::mismatch(
                context,
                "boolean",
                self.symbols.type_name(bound.ty()),
            ));
        }
        Ok(bound)
    }

    fn check_expr(&mut self, expr: &Expr, ctx: &FnCtx) -> Result<BoundExpr, CompileError> {
        match expr {
            Expr::IntLit { value, .. } => Ok(BoundExpr::Constant {
                value: Constant::Int(*value),
                ty: Ty::Int,
            }),
            Expr::DoubleLit { value, .. } => Ok(BoundExpr::Constant {
                value: Constant::Double(*value),
                ty: Ty::Double,
            }),
            Expr::StringLit { value, .. } => Ok(BoundExpr::Constant {
                value: Constant::Str(value.clone()),
                ty: Ty::Str,
            }),
            Expr::BoolLit { value, .. } => Ok(BoundExpr::Constant {
                value: Constant::Bool(*value),
                ty: Ty::Bool,
            }),
            Expr::Name { id, name } => {
                let sym = self.refs[id];
                match &self.symbols.get(sym).kind {
                    SymbolKind::Variable { ty, .. } => match ty {
                        Some(ty) => Ok(BoundExpr::VarLoad {
                            symbol: sym,
                            ty: *ty,
                        }),
                        // Declared in this scope but textually later.
                        None => Err(CompileError::UndeclaredSymbol { name: name.clone() }),
                    },
                    _ => Err(CompileError::mismatch(
                        format!("use of '{name}'"),
                        "a variable",
                        "a function or type name",
                    )),
                }
            }
            Expr::This { .. } => match ctx.this_ty {
                Some(ty) => Ok(BoundExpr::This { ty }),
                None => Err(CompileError::UndeclaredSymbol {
                    name: "this".to_string(),
                }),
            },
            Expr::Field { receiver, name, .. } => {
                let receiver = self.check_expr(receiver, ctx)?;
                let (field, index, ty) = self.resolve_field(receiver.ty(), name)?;
                Ok(BoundExpr::FieldLoad {
                    receiver: Box::new(receiver),
                    field,
                    index,
                    ty,
                })
            }
            Expr::Unary { op, operand, .. } => {
                let operand = self.check_expr(operand, ctx)?;
                let ty = operand.ty();
                match op {
                    UnaryOp::Neg if ty.is_numeric() => {}
                    UnaryOp::Not if ty == Ty::Bool => {}
                    UnaryOp::Neg => {
                        return Err(CompileError::mismatch(
                            "unary '-'",
                            "int or double",
                            self.symbols.type_name(ty),
                        ));
                    }
                    UnaryOp::Not => {
                        return Err(CompileError::mismatch(
                            "unary '!'",
                            "boolean",
                            self.symbols.type_name(ty),
                        ));
                    }
                }
                Ok(BoundExpr::Unary {
                    op: *op,
                    operand: Box::new(operand),
                    ty,
                })
            }
            Expr::Binary { op, lhs, rhs, .. } => {
                let lhs = self.check_expr(lhs, ctx)?;
                let rhs = self.check_expr(rhs, ctx)?;
                let ty = self.binary_result(*op, lhs.ty(), rhs.ty())?;
                Ok(BoundExpr::Binary {
                    op: *op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    ty,
                })
            }
            Expr::Assign {
                op, target, value, ..
            } => {
                let target = self.check_target(target, ctx)?;
                let want = self.target_ty(&target);
                let value = self.check_expr(value, ctx)?;
                let found = match op {
                    // Compound assignment applies the operator to the
                    // target's current value, then stores the result.
                    Some(op) => self.binary_result(*op, want, value.ty())?,
                    None => value.ty(),
                };
                if !self.symbols.is_assignable(found, want) {
                    return Err(CompileError::mismatch(
                        "assignment",
                        self.symbols.type_name(want),
                        self.symbols.type_name(found),
                    ));
                }
                Ok(BoundExpr::Assign {
                    op: *op,
                    target,
                    value: Box::new(value),
                    ty: want,
                })
            }
            Expr::IncDec {
                op, prefix, target, ..
            } => {
                let target = self.check_target(target, ctx)?;
                let ty = self.target_ty(&target);
                if !ty.is_numeric() {
                    return Err(CompileError::mismatch(
                        "operator '++'/'--'",
                        "int or double",
                        self.symbols.type_name(ty),
                    ));
                }
                Ok(BoundExpr::IncDec {
                    op: *op,
                    prefix: *prefix,
                    target,
                    ty,
                })
            }
            Expr::Call { callee, args, .. } => self.check_call(callee, args, ctx),
        }
    }

    fn binary_result(&self, op: BinaryOp, l: Ty, r: Ty) -> Result<Ty, CompileError> {
        let found = || {
            format!(
                "{} and {}",
                self.symbols.type_name(l),
                self.symbols.type_name(r)
            )
        };
        match op {
            BinaryOp::Add => {
                if l == Ty::Str && r == Ty::Str {
                    Ok(Ty::Str)
                } else {
                    Ty::common_numeric(l, r).ok_or_else(|| {
                        CompileError::mismatch(
                            "operator '+'",
                            "numeric or string operands",
                            found(),
                        )
                    })
                }
            }
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                Ty::common_numeric(l, r).ok_or_else(|| {
                    CompileError::mismatch(
                        format!("operator '{}'", op_str(op)),
                        "numeric operands",
                        found(),
                    )
                })
            }
            BinaryOp::Mod => {
                if l == Ty::Int && r == Ty::Int {
                    Ok(Ty::Int)
                } else {
                    Err(CompileError::mismatch("operator '%'", "int operands", found()))
                }
            }
            BinaryOp::And | BinaryOp::Or => {
                if l == Ty::Bool && r == Ty::Bool {
                    Ok(Ty::Bool)
                } else {
                    Err(CompileError::mismatch(
                        format!("operator '{}'", op_str(op)),
                        "boolean operands",
                        found(),
                    ))
                }
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                let comparable = l == r
                    || Ty::common_numeric(l, r).is_some()
                    || self.symbols.is_assignable(l, r)
                    || self.symbols.is_assignable(r, l);
                if comparable {
                    Ok(Ty::Bool)
                } else {
                    Err(CompileError::mismatch(
                        format!("operator '{}'", op_str(op)),
                        "comparable operands",
                        found(),
                    ))
                }
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                match Ty::common_numeric(l, r) {
                    Some(_) => Ok(Ty::Bool),
                    None => Err(CompileError::mismatch(
                        format!("operator '{}'", op_str(op)),
                        "numeric operands",
                        found(),
                    )),
                }
            }
        }
    }

    fn check_target(&mut self, target: &Expr, ctx: &FnCtx) -> Result<BoundTarget, CompileError> {
        match target {
            Expr::Name { id, name } => {
                let sym = self.refs[id];
                match &self.symbols.get(sym).kind {
                    SymbolKind::Variable { ty: Some(_), .. } => Ok(BoundTarget::Var(sym)),
                    SymbolKind::Variable { ty: None, .. } => {
                        Err(CompileError::UndeclaredSymbol { name: name.clone() })
                    }
                    _ => Err(CompileError::mismatch(
                        "assignment",
                        "a variable or field",
                        format!("'{name}'"),
                    )),
                }
            }
            Expr::Field { receiver, name, .. } => {
                let receiver = self.check_expr(receiver, ctx)?;
                let (field, index, _) = self.resolve_field(receiver.ty(), name)?;
                Ok(BoundTarget::Field {
                    receiver: Box::new(receiver),
                    field,
                    index,
                })
            }
            _ => Err(CompileError::mismatch(
                "assignment",
                "a variable or field",
                "an expression",
            )),
        }
    }

    fn target_ty(&self, target: &BoundTarget) -> Ty {
        match target {
            BoundTarget::Var(sym) => self.symbols.var_ty(*sym).unwrap_or(Ty::Void),
            BoundTarget::Field { field, .. } => self.symbols.var_ty(*field).unwrap_or(Ty::Void),
        }
    }

    /// Find `name` among the fields of a class-typed receiver.
    fn resolve_field(&self, rty: Ty, name: &str) -> Result<(SymbolId, u16, Ty), CompileError> {
        let class = match rty {
            Ty::Class(c) => c,
            _ => {
                return Err(CompileError::mismatch(
                    format!("access to field '{name}'"),
                    "a class value",
                    self.symbols.type_name(rty),
                ));
            }
        };
        let fields = match &self.symbols.get(class).kind {
            SymbolKind::Class { fields, .. } => fields,
            _ => unreachable!("class type without class symbol"),
        };
        for (index, field) in fields.iter().enumerate() {
            if self.symbols.name(*field) == name {
                let ty = self.symbols.var_ty(*field).unwrap_or(Ty::Void);
                return Ok((*field, index as u16, ty));
            }
        }
        Err(CompileError::UndeclaredSymbol {
            name: format!("{}.{}", self.symbols.name(class), name),
        })
    }

    // =========================================================================
    // Calls and overload resolution
    // =========================================================================

    fn check_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        ctx: &FnCtx,
    ) -> Result<BoundExpr, CompileError> {
        let mut bound_args = Vec::with_capacity(args.len());
        for a in args {
            bound_args.push(self.check_expr(a, ctx)?);
        }
        let arg_tys: Vec<Ty> = bound_args.iter().map(BoundExpr::ty).collect();

        match callee {
            Expr::Name { id, name } => {
                let sym = self.refs[id];
                match &self.symbols.get(sym).kind {
                    SymbolKind::Function { .. } => {
                        self.check_concrete_args(sym, name, &arg_tys)?;
                        let ret = self.symbols.sig(sym).ret;
                        Ok(BoundExpr::Call {
                            target: self.direct_target(sym, None),
                            args: bound_args,
                            ty: ret,
                        })
                    }
                    SymbolKind::Overload { candidates } => {
                        let chosen = self.resolve_overload(name, &candidates.clone(), &arg_tys)?;
                        let ret = self.symbols.sig(chosen).ret;
                        Ok(BoundExpr::Call {
                            target: self.direct_target(chosen, None),
                            args: bound_args,
                            ty: ret,
                        })
                    }
                    SymbolKind::Class { constructors, .. } => {
                        let ctors = constructors.clone();
                        let chosen = if ctors.len() == 1 {
                            self.check_concrete_args(ctors[0], name, &arg_tys)?;
                            ctors[0]
                        } else {
                            self.resolve_overload(name, &ctors, &arg_tys)?
                        };
                        Ok(BoundExpr::Call {
                            target: BoundCallTarget::Constructor {
                                class: sym,
                                function: chosen,
                            },
                            args: bound_args,
                            ty: Ty::Class(sym),
                        })
                    }
                    _ => Err(CompileError::mismatch(
                        format!("call to '{name}'"),
                        "a function or class",
                        "a value",
                    )),
                }
            }
            Expr::Field { receiver, name, .. } => {
                let receiver = self.check_expr(receiver, ctx)?;
                self.check_method_call(receiver, name, bound_args, &arg_tys)
            }
            _ => Err(CompileError::mismatch(
                "call",
                "a function or method name",
                "an expression",
            )),
        }
    }

    fn check_method_call(
        &mut self,
        receiver: BoundExpr,
        name: &str,
        bound_args: Vec<BoundExpr>,
        arg_tys: &[Ty],
    ) -> Result<BoundExpr, CompileError> {
        let rty = receiver.ty();
        let (owner, members, virtual_dispatch) = match rty {
            Ty::Class(c) => match &self.symbols.get(c).kind {
                SymbolKind::Class { methods, .. } => (c, methods.clone(), false),
                _ => unreachable!("class type without class symbol"),
            },
            Ty::Interface(i) => match &self.symbols.get(i).kind {
                SymbolKind::Interface { methods } => (i, methods.clone(), true),
                _ => unreachable!("interface type without interface symbol"),
            },
            _ => {
                return Err(CompileError::mismatch(
                    format!("call to method '{name}'"),
                    "an object value",
                    self.symbols.type_name(rty),
                ));
            }
        };

        let candidates: Vec<SymbolId> = members
            .into_iter()
            .filter(|m| self.symbols.name(*m) == name)
            .collect();
        let chosen = match candidates.len() {
            0 => {
                return Err(CompileError::UndeclaredSymbol {
                    name: format!("{}.{}", self.symbols.name(owner), name),
                });
            }
            1 => {
                self.check_concrete_args(candidates[0], name, arg_tys)?;
                candidates[0]
            }
            _ => self.resolve_overload(name, &candidates, arg_tys)?,
        };
        let ret = self.symbols.sig(chosen).ret;

        let target = if virtual_dispatch {
            let slot = match &self.symbols.get(chosen).kind {
                SymbolKind::Function {
                    interface_slot: Some((_, slot)),
                    ..
                } => *slot,
                _ => unreachable!("interface method without a slot"),
            };
            BoundCallTarget::Virtual {
                receiver: Box::new(receiver),
                interface: owner,
                slot,
            }
        } else {
            self.direct_target(chosen, Some(receiver))
        };
        Ok(BoundExpr::Call {
            target,
            args: bound_args,
            ty: ret,
        })
    }

    /// Build the call target for a concretely chosen function: intrinsic,
    /// method, or plain function.
    fn direct_target(&self, function: SymbolId, receiver: Option<BoundExpr>) -> BoundCallTarget {
        if let SymbolKind::Function {
            intrinsic: Some(intrinsic),
            ..
        } = &self.symbols.get(function).kind
        {
            return BoundCallTarget::Intrinsic(*intrinsic);
        }
        match receiver {
            Some(receiver) => BoundCallTarget::Method {
                receiver: Box::new(receiver),
                function,
            },
            None => BoundCallTarget::Function(function),
        }
    }

    /// Arity and per-argument assignability for a single concrete callee.
    fn check_concrete_args(
        &self,
        function: SymbolId,
        name: &str,
        arg_tys: &[Ty],
    ) -> Result<(), CompileError> {
        let sig = self.symbols.sig(function);
        if sig.params.len() != arg_tys.len() {
            return Err(CompileError::NoMatchingOverload {
                name: name.to_string(),
                args: self.symbols.type_names(arg_tys),
            });
        }
        for (i, (want, found)) in sig.params.iter().zip(arg_tys).enumerate() {
            if !self.symbols.is_assignable(*found, *want) {
                return Err(CompileError::mismatch(
                    format!("argument {} of '{}'", i + 1, name),
                    self.symbols.type_name(*want),
                    self.symbols.type_name(*found),
                ));
            }
        }
        Ok(())
    }

    /// Overload resolution over a candidate set: keep candidates with the
    /// right arity whose parameters match the arguments *exactly*, with no
    /// widening. Zero survivors is no match; more than one is ambiguous.
    fn resolve_overload(
        &self,
        name: &str,
        candidates: &[SymbolId],
        arg_tys: &[Ty],
    ) -> Result<SymbolId, CompileError> {
        let mut matches = candidates.iter().copied().filter(|c| {
            let sig = self.symbols.sig(*c);
            sig.params.len() == arg_tys.len()
                && sig.params.iter().zip(arg_tys).all(|(p, a)| p == a)
        });
        let first = matches.next();
        let second = matches.next();
        match (first, second) {
            (Some(chosen), None) => Ok(chosen),
            (None, _) => Err(CompileError::NoMatchingOverload {
                name: name.to_string(),
                args: self.symbols.type_names(arg_tys),
            }),
            (Some(_), Some(_)) => Err(CompileError::AmbiguousOverload {
                name: name.to_string(),
                args: self.symbols.type_names(arg_tys),
            }),
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn resolve_type(&self, tref: &TypeRef) -> Result<Ty, CompileError> {
        let sym = self.refs[&tref.id];
        match &self.symbols.get(sym).kind {
            SymbolKind::Primitive { ty } => Ok(*ty),
            SymbolKind::Class { .. } => Ok(Ty::Class(sym)),
            SymbolKind::Interface { .. } => Ok(Ty::Interface(sym)),
            _ => Err(CompileError::mismatch(
                "type reference",
                "a type name",
                format!("'{}'", tref.name),
            )),
        }
    }

    fn set_var_ty(&mut self, sym: SymbolId, ty: Ty) {
        if let SymbolKind::Variable { ty: t, .. } = &mut self.symbols.get_mut(sym).kind {
            *t = Some(ty);
        }
    }

    fn assign_mismatch(&self, name: &str, want: Ty, found: Ty) -> CompileError {
        CompileError::mismatch(
            format!("initialization of '{name}'"),
            self.symbols.type_name(want),
            self.symbols.type_name(found),
        )
    }
}

fn op_str(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::And => "&&",
        BinaryOp::Or => "||",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
    }
}

/// Declared locals in a body, nested blocks included. Each declaration gets
/// its own frame slot, so this is the slot count codegen will emit.
fn count_locals(stmts: &[BoundStmt]) -> usize {
    stmts
        .iter()
        .map(|s| match s {
            BoundStmt::VarInit { .. } => 1,
            BoundStmt::Block(inner) => count_locals(inner),
            BoundStmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                count_locals(then_branch)
                    + else_branch.as_ref().map_or(0, |b| count_locals(b))
            }
            BoundStmt::While { body, .. } => count_locals(body),
            BoundStmt::Expr(_) | BoundStmt::Return(_) => 0,
        })
        .sum()
}

/// The default value of a type, for declarations without an initializer.
fn default_value(ty: Ty) -> BoundExpr {
    let value = match ty {
        Ty::Int => Constant::Int(0),
        Ty::Double => Constant::Double(0.0),
        Ty::Bool => Constant::Bool(false),
        Ty::Str => Constant::Str(String::new()),
        Ty::Void | Ty::Class(_) | Ty::Interface(_) => Constant::Void,
    };
    BoundExpr::Constant { value, ty }
}

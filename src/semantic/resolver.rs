//! Symbol resolution.
//!
//! Two passes over the syntax tree. Pass 1 creates scopes and declares every
//! name: for a function it pushes a fresh scope, declares parameters and
//! block-local variables inside it, and only afterwards declares the function
//! symbol in the *enclosing* scope, merging same-named functions into an
//! overload set. Pass 2 re-walks the tree, re-entering the scopes recorded by
//! pass 1, and binds every identifier expression and type reference to a
//! declared symbol. Because all declarations exist before any reference is
//! bound, forward references and recursion resolve naturally.

use rustc_hash::FxHashMap;

use crate::ast::{
    Block, ClassDecl, Expr, FunctionDecl, InterfaceDecl, Item, Module, NodeId, Param, Stmt,
    TypeRef, VarDecl,
};
use crate::error::CompileError;

use super::scope::{ScopeArena, ScopeId};
use super::symbol::{
    FunctionTraits, Intrinsic, Symbol, SymbolArena, SymbolId, SymbolKind,
};
use super::ty::{FnSig, Ty};

/// The output of symbol resolution: the arenas plus side tables annotating
/// syntax nodes with their symbols and scopes.
#[derive(Debug)]
pub struct Resolution {
    pub symbols: SymbolArena,
    pub scopes: ScopeArena,
    pub root: ScopeId,
    /// Identifier and type-reference nodes, bound to the symbol they name.
    pub refs: FxHashMap<NodeId, SymbolId>,
    /// Declaration nodes, mapped to the symbol they introduced.
    pub decls: FxHashMap<NodeId, SymbolId>,
    /// Function and block nodes, mapped to the scope they introduced.
    pub node_scopes: FxHashMap<NodeId, ScopeId>,
}

/// Resolve a module: build the scope tree and bind every reference.
pub fn resolve(module: &Module) -> Result<Resolution, CompileError> {
    let mut resolver = Resolver::new();
    resolver.declare_module(module)?;
    resolver.bind_module(module)?;
    Ok(Resolution {
        symbols: resolver.symbols,
        scopes: resolver.scopes,
        root: resolver.root,
        refs: resolver.refs,
        decls: resolver.decls,
        node_scopes: resolver.node_scopes,
    })
}

struct Resolver {
    symbols: SymbolArena,
    scopes: ScopeArena,
    root: ScopeId,
    refs: FxHashMap<NodeId, SymbolId>,
    decls: FxHashMap<NodeId, SymbolId>,
    node_scopes: FxHashMap<NodeId, ScopeId>,
}

impl Resolver {
    fn new() -> Self {
        let mut symbols = SymbolArena::new();
        let mut scopes = ScopeArena::new();
        let root = scopes.alloc(None);
        seed_builtins(&mut symbols, &mut scopes, root);
        Self {
            symbols,
            scopes,
            root,
            refs: FxHashMap::default(),
            decls: FxHashMap::default(),
            node_scopes: FxHashMap::default(),
        }
    }

    // =========================================================================
    // Pass 1: scope creation and declaration
    // =========================================================================

    fn declare_module(&mut self, module: &Module) -> Result<(), CompileError> {
        for item in &module.items {
            match item {
                Item::Function(f) => {
                    let sym = self.declare_function(f, FunctionTraits::empty(), None)?;
                    self.merge_function(self.root, &f.name, sym)?;
                }
                Item::Class(c) => self.declare_class(c)?,
                Item::Interface(i) => self.declare_interface(i)?,
                Item::Global(v) => self.declare_global(v)?,
            }
        }
        Ok(())
    }

    /// Build a function's scope and symbol. The symbol is *not* entered into
    /// any scope here; free functions go through [`merge_function`] and
    /// members live on their class symbol instead.
    ///
    /// [`merge_function`]: Resolver::merge_function
    fn declare_function(
        &mut self,
        f: &FunctionDecl,
        traits: FunctionTraits,
        parent: Option<SymbolId>,
    ) -> Result<SymbolId, CompileError> {
        let scope = self.scopes.alloc(Some(self.root));
        self.node_scopes.insert(f.id, scope);
        // The body block shares the function's scope with the parameters.
        self.node_scopes.insert(f.body.id, scope);

        let mut params = Vec::with_capacity(f.params.len());
        for p in &f.params {
            let sym = self.declare_param(p, scope)?;
            params.push(sym);
        }
        self.declare_block_locals(&f.body, scope)?;

        let sym = self.symbols.alloc(Symbol {
            name: f.name.clone(),
            parent,
            kind: SymbolKind::Function {
                params,
                sig: None,
                traits,
                interface_slot: None,
                intrinsic: None,
            },
        });
        self.decls.insert(f.id, sym);
        Ok(sym)
    }

    fn declare_param(&mut self, p: &Param, scope: ScopeId) -> Result<SymbolId, CompileError> {
        let sym = self.symbols.alloc(Symbol {
            name: p.name.clone(),
            parent: None,
            kind: SymbolKind::Variable {
                ty: None,
                is_param: true,
                is_global: false,
            },
        });
        self.scopes.declare(scope, &p.name, sym)?;
        self.decls.insert(p.id, sym);
        Ok(sym)
    }

    /// Declare the `var` names of a block into the given scope and recurse
    /// into nested blocks, each of which gets a child scope.
    fn declare_block_locals(&mut self, block: &Block, scope: ScopeId) -> Result<(), CompileError> {
        for stmt in &block.stmts {
            match stmt {
                Stmt::Var(v) => {
                    let sym = self.symbols.alloc(Symbol {
                        name: v.name.clone(),
                        parent: None,
                        kind: SymbolKind::Variable {
                            ty: None,
                            is_param: false,
                            is_global: false,
                        },
                    });
                    self.scopes.declare(scope, &v.name, sym)?;
                    self.decls.insert(v.id, sym);
                }
                Stmt::Block(b) => {
                    let child = self.scopes.alloc(Some(scope));
                    self.node_scopes.insert(b.id, child);
                    self.declare_block_locals(b, child)?;
                }
                Stmt::If(i) => {
                    let then_scope = self.scopes.alloc(Some(scope));
                    self.node_scopes.insert(i.then_branch.id, then_scope);
                    self.declare_block_locals(&i.then_branch, then_scope)?;
                    if let Some(e) = &i.else_branch {
                        let else_scope = self.scopes.alloc(Some(scope));
                        self.node_scopes.insert(e.id, else_scope);
                        self.declare_block_locals(e, else_scope)?;
                    }
                }
                Stmt::While(w) => {
                    let body_scope = self.scopes.alloc(Some(scope));
                    self.node_scopes.insert(w.body.id, body_scope);
                    self.declare_block_locals(&w.body, body_scope)?;
                }
                Stmt::Expr(_) | Stmt::Return(_) => {}
            }
        }
        Ok(())
    }

    /// Enter a function symbol into a scope, promoting same-named functions
    /// to an overload set.
    fn merge_function(
        &mut self,
        scope: ScopeId,
        name: &str,
        sym: SymbolId,
    ) -> Result<(), CompileError> {
        match self.scopes.lookup_local(scope, name) {
            None => self.scopes.declare(scope, name, sym),
            Some(existing) => match &self.symbols.get(existing).kind {
                SymbolKind::Function { .. } => {
                    let overload = self.symbols.alloc(Symbol {
                        name: name.to_string(),
                        parent: None,
                        kind: SymbolKind::Overload {
                            candidates: vec![existing, sym],
                        },
                    });
                    self.scopes.rebind(scope, name, overload);
                    Ok(())
                }
                SymbolKind::Overload { .. } => {
                    if let SymbolKind::Overload { candidates } =
                        &mut self.symbols.get_mut(existing).kind
                    {
                        candidates.push(sym);
                    }
                    Ok(())
                }
                _ => Err(CompileError::DuplicateSymbol {
                    name: name.to_string(),
                }),
            },
        }
    }

    fn declare_class(&mut self, c: &ClassDecl) -> Result<(), CompileError> {
        let class = self.symbols.alloc(Symbol {
            name: c.name.clone(),
            parent: None,
            kind: SymbolKind::Class {
                fields: Vec::new(),
                constructors: Vec::new(),
                methods: Vec::new(),
                interfaces: Vec::new(),
                vtables: Vec::new(),
            },
        });
        self.decls.insert(c.id, class);

        let mut fields = Vec::with_capacity(c.fields.len());
        for fd in &c.fields {
            if c.fields.iter().filter(|o| o.name == fd.name).count() > 1 {
                return Err(CompileError::DuplicateSymbol {
                    name: format!("{}.{}", c.name, fd.name),
                });
            }
            let sym = self.symbols.alloc(Symbol {
                name: fd.name.clone(),
                parent: Some(class),
                kind: SymbolKind::Variable {
                    ty: None,
                    is_param: false,
                    is_global: false,
                },
            });
            self.decls.insert(fd.id, sym);
            fields.push(sym);
        }

        let mut constructors = Vec::with_capacity(c.constructors.len());
        for ct in &c.constructors {
            let sym = self.declare_function(
                ct,
                FunctionTraits::METHOD | FunctionTraits::CONSTRUCTOR,
                Some(class),
            )?;
            constructors.push(sym);
        }

        let mut methods = Vec::with_capacity(c.methods.len());
        for m in &c.methods {
            let sym = self.declare_function(m, FunctionTraits::METHOD, Some(class))?;
            methods.push(sym);
        }

        if let SymbolKind::Class {
            fields: f,
            constructors: ct,
            methods: me,
            ..
        } = &mut self.symbols.get_mut(class).kind
        {
            *f = fields;
            *ct = constructors;
            *me = methods;
        }

        // The class name becomes visible only after its members are built,
        // the same policy as functions.
        self.scopes.declare(self.root, &c.name, class)
    }

    fn declare_interface(&mut self, i: &InterfaceDecl) -> Result<(), CompileError> {
        let iface = self.symbols.alloc(Symbol {
            name: i.name.clone(),
            parent: None,
            kind: SymbolKind::Interface {
                methods: Vec::new(),
            },
        });
        self.decls.insert(i.id, iface);

        let mut methods = Vec::with_capacity(i.methods.len());
        for (slot, m) in i.methods.iter().enumerate() {
            let mut params = Vec::with_capacity(m.params.len());
            for p in &m.params {
                let sym = self.symbols.alloc(Symbol {
                    name: p.name.clone(),
                    parent: None,
                    kind: SymbolKind::Variable {
                        ty: None,
                        is_param: true,
                        is_global: false,
                    },
                });
                self.decls.insert(p.id, sym);
                params.push(sym);
            }
            let sym = self.symbols.alloc(Symbol {
                name: m.name.clone(),
                parent: Some(iface),
                kind: SymbolKind::Function {
                    params,
                    sig: None,
                    traits: FunctionTraits::METHOD | FunctionTraits::VIRTUAL,
                    interface_slot: Some((iface, slot as u16)),
                    intrinsic: None,
                },
            });
            self.decls.insert(m.id, sym);
            methods.push(sym);
        }

        if let SymbolKind::Interface { methods: me } = &mut self.symbols.get_mut(iface).kind {
            *me = methods;
        }
        self.scopes.declare(self.root, &i.name, iface)
    }

    fn declare_global(&mut self, v: &VarDecl) -> Result<(), CompileError> {
        let sym = self.symbols.alloc(Symbol {
            name: v.name.clone(),
            parent: None,
            kind: SymbolKind::Variable {
                ty: None,
                is_param: false,
                is_global: true,
            },
        });
        self.scopes.declare(self.root, &v.name, sym)?;
        self.decls.insert(v.id, sym);
        Ok(())
    }

    // =========================================================================
    // Pass 2: reference binding
    // =========================================================================

    fn bind_module(&mut self, module: &Module) -> Result<(), CompileError> {
        for item in &module.items {
            match item {
                Item::Function(f) => self.bind_function(f)?,
                Item::Class(c) => {
                    for t in &c.implements {
                        self.bind_type_ref(t, self.root)?;
                    }
                    for fd in &c.fields {
                        self.bind_type_ref(&fd.ty, self.root)?;
                    }
                    for ct in &c.constructors {
                        self.bind_function(ct)?;
                    }
                    for m in &c.methods {
                        self.bind_function(m)?;
                    }
                }
                Item::Interface(i) => {
                    for m in &i.methods {
                        for p in &m.params {
                            self.bind_type_ref(&p.ty, self.root)?;
                        }
                        if let Some(rt) = &m.return_type {
                            self.bind_type_ref(rt, self.root)?;
                        }
                    }
                }
                Item::Global(v) => {
                    if let Some(t) = &v.declared_type {
                        self.bind_type_ref(t, self.root)?;
                    }
                    if let Some(init) = &v.init {
                        self.bind_expr(init, self.root)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn bind_function(&mut self, f: &FunctionDecl) -> Result<(), CompileError> {
        let scope = self.node_scopes[&f.id];
        for p in &f.params {
            self.bind_type_ref(&p.ty, scope)?;
        }
        if let Some(rt) = &f.return_type {
            self.bind_type_ref(rt, scope)?;
        }
        self.bind_block(&f.body)
    }

    fn bind_block(&mut self, block: &Block) -> Result<(), CompileError> {
        let scope = self.node_scopes[&block.id];
        for stmt in &block.stmts {
            self.bind_stmt(stmt, scope)?;
        }
        Ok(())
    }

    fn bind_stmt(&mut self, stmt: &Stmt, scope: ScopeId) -> Result<(), CompileError> {
        match stmt {
            Stmt::Expr(e) => self.bind_expr(e, scope),
            Stmt::Block(b) => self.bind_block(b),
            Stmt::If(i) => {
                self.bind_expr(&i.cond, scope)?;
                self.bind_block(&i.then_branch)?;
                if let Some(e) = &i.else_branch {
                    self.bind_block(e)?;
                }
                Ok(())
            }
            Stmt::While(w) => {
                self.bind_expr(&w.cond, scope)?;
                self.bind_block(&w.body)
            }
            Stmt::Return(r) => {
                if let Some(v) = &r.value {
                    self.bind_expr(v, scope)?;
                }
                Ok(())
            }
            Stmt::Var(v) => {
                if let Some(t) = &v.declared_type {
                    self.bind_type_ref(t, scope)?;
                }
                if let Some(init) = &v.init {
                    self.bind_expr(init, scope)?;
                }
                Ok(())
            }
        }
    }

    fn bind_expr(&mut self, expr: &Expr, scope: ScopeId) -> Result<(), CompileError> {
        match expr {
            Expr::IntLit { .. }
            | Expr::DoubleLit { .. }
            | Expr::StringLit { .. }
            | Expr::BoolLit { .. }
            | Expr::This { .. } => Ok(()),
            Expr::Name { id, name } => {
                let sym = self.scopes.lookup(scope, name).ok_or_else(|| {
                    CompileError::UndeclaredSymbol { name: name.clone() }
                })?;
                self.refs.insert(*id, sym);
                Ok(())
            }
            // The member name binds during type checking, once the receiver
            // type is known.
            Expr::Field { receiver, .. } => self.bind_expr(receiver, scope),
            Expr::Unary { operand, .. } => self.bind_expr(operand, scope),
            Expr::Binary { lhs, rhs, .. } => {
                self.bind_expr(lhs, scope)?;
                self.bind_expr(rhs, scope)
            }
            Expr::Assign { target, value, .. } => {
                self.bind_expr(target, scope)?;
                self.bind_expr(value, scope)
            }
            Expr::IncDec { target, .. } => self.bind_expr(target, scope),
            Expr::Call { callee, args, .. } => {
                self.bind_expr(callee, scope)?;
                for a in args {
                    self.bind_expr(a, scope)?;
                }
                Ok(())
            }
        }
    }

    fn bind_type_ref(&mut self, t: &TypeRef, scope: ScopeId) -> Result<(), CompileError> {
        let sym = self
            .scopes
            .lookup(scope, &t.name)
            .ok_or_else(|| CompileError::UndeclaredSymbol {
                name: t.name.clone(),
            })?;
        self.refs.insert(t.id, sym);
        Ok(())
    }
}

/// Seed the root scope with the built-in type names and the print intrinsic
/// overload sets.
fn seed_builtins(symbols: &mut SymbolArena, scopes: &mut ScopeArena, root: ScopeId) {
    for (name, ty) in [
        ("void", Ty::Void),
        ("int", Ty::Int),
        ("double", Ty::Double),
        ("boolean", Ty::Bool),
        ("string", Ty::Str),
    ] {
        let sym = symbols.alloc(Symbol {
            name: name.to_string(),
            parent: None,
            kind: SymbolKind::Primitive { ty },
        });
        scopes
            .declare(root, name, sym)
            .unwrap_or_else(|_| panic!("builtin '{name}' seeded twice"));
    }

    let print_set: [(&str, [(Intrinsic, Ty); 3]); 2] = [
        (
            "print",
            [
                (Intrinsic::PrintStr, Ty::Str),
                (Intrinsic::PrintInt, Ty::Int),
                (Intrinsic::PrintDouble, Ty::Double),
            ],
        ),
        (
            "printLine",
            [
                (Intrinsic::PrintLineStr, Ty::Str),
                (Intrinsic::PrintLineInt, Ty::Int),
                (Intrinsic::PrintLineDouble, Ty::Double),
            ],
        ),
    ];
    for (name, variants) in print_set {
        let mut candidates = Vec::with_capacity(variants.len());
        for (intrinsic, ty) in variants {
            let param = symbols.alloc(Symbol {
                name: "value".to_string(),
                parent: None,
                kind: SymbolKind::Variable {
                    ty: Some(ty),
                    is_param: true,
                    is_global: false,
                },
            });
            let func = symbols.alloc(Symbol {
                name: name.to_string(),
                parent: None,
                kind: SymbolKind::Function {
                    params: vec![param],
                    sig: Some(FnSig {
                        params: vec![ty],
                        ret: Ty::Void,
                    }),
                    traits: FunctionTraits::INTRINSIC,
                    interface_slot: None,
                    intrinsic: Some(intrinsic),
                },
            });
            candidates.push(func);
        }
        let overload = symbols.alloc(Symbol {
            name: name.to_string(),
            parent: None,
            kind: SymbolKind::Overload { candidates },
        });
        scopes
            .declare(root, name, overload)
            .unwrap_or_else(|_| panic!("builtin '{name}' seeded twice"));
    }
}

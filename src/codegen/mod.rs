//! Code generation.
//!
//! Lowers the bound tree to one flat instruction array. Every expression
//! leaves exactly one value on the operand stack and every statement leaves
//! none, so the stack is empty at statement boundaries.
//!
//! Emission runs in declaration order: free functions, then each class's
//! constructors and methods, then the synthesized global initializer.
//! Function calls are emitted against symbol ids and forward jumps against a
//! sentinel; a final patch pass rewrites both to absolute addresses once all
//! entry points are fixed, and fills each class's vtables with method
//! addresses.

use rustc_hash::FxHashMap;

use crate::ast::{BinaryOp, IncDecOp, UnaryOp};
use crate::bytecode::{
    BytecodeProgram, CallTarget, FieldDefault, FunctionInfo, Instruction, InterfaceInfo, TypeInfo,
    JUMP_SENTINEL,
};
use crate::semantic::bound::{
    BoundCallTarget, BoundExpr, BoundFunction, BoundModule, BoundStmt, BoundTarget, Constant,
};
use crate::semantic::symbol::{FunctionTraits, SymbolKind};
use crate::semantic::{SymbolArena, SymbolId, Ty};

/// Lower a checked module to bytecode.
pub fn generate(symbols: &SymbolArena, module: &BoundModule) -> BytecodeProgram {
    let mut generator = Generator::new(symbols);
    generator.intern_classes(module);
    generator.assign_global_slots(module);

    for f in &module.functions {
        generator.emit_function(f);
    }
    for c in &module.classes {
        for ct in &c.constructors {
            generator.emit_function(ct);
        }
        for m in &c.methods {
            generator.emit_function(m);
        }
    }
    generator.emit_global_init(module);
    generator.finish(module)
}

struct Generator<'a> {
    symbols: &'a SymbolArena,
    instructions: Vec<Instruction>,
    functions: Vec<FunctionInfo>,
    addresses: FxHashMap<SymbolId, u32>,
    types: Vec<TypeInfo>,
    type_index: FxHashMap<SymbolId, u16>,
    interfaces: Vec<InterfaceInfo>,
    iface_index: FxHashMap<SymbolId, u16>,
    /// (type table index, interface table index, method symbols per slot);
    /// converted to addresses by the patch pass.
    pending_vtables: Vec<(usize, u16, Vec<SymbolId>)>,
    global_slots: FxHashMap<SymbolId, u16>,
    global_init: Option<u32>,
}

/// Per-function emission state: slot maps and the back-patch position of the
/// entry `STACK_ALLOC`.
struct FnState {
    arg_slots: FxHashMap<SymbolId, u16>,
    local_slots: FxHashMap<SymbolId, u16>,
    stack_alloc_at: usize,
}

impl<'a> Generator<'a> {
    fn new(symbols: &'a SymbolArena) -> Self {
        Self {
            symbols,
            instructions: Vec::new(),
            functions: Vec::new(),
            addresses: FxHashMap::default(),
            types: Vec::new(),
            type_index: FxHashMap::default(),
            interfaces: Vec::new(),
            iface_index: FxHashMap::default(),
            pending_vtables: Vec::new(),
            global_slots: FxHashMap::default(),
            global_init: None,
        }
    }

    // =========================================================================
    // Tables
    // =========================================================================

    /// Build the type table in class declaration order, so `NEW_OBJ`
    /// operands are known before any body is emitted.
    fn intern_classes(&mut self, module: &BoundModule) {
        for c in &module.classes {
            let class = c.symbol;
            let (fields, vtables) = match &self.symbols.get(class).kind {
                SymbolKind::Class {
                    fields, vtables, ..
                } => (fields.clone(), vtables.clone()),
                _ => continue,
            };
            let index = self.types.len() as u16;
            self.type_index.insert(class, index);

            let field_names = fields
                .iter()
                .map(|f| self.symbols.name(*f).to_string())
                .collect();
            let field_defaults = fields
                .iter()
                .map(|f| match self.symbols.var_ty(*f) {
                    Some(Ty::Int) => FieldDefault::Int,
                    Some(Ty::Double) => FieldDefault::Double,
                    Some(Ty::Bool) => FieldDefault::Bool,
                    Some(Ty::Str) => FieldDefault::Str,
                    _ => FieldDefault::Void,
                })
                .collect();
            self.types.push(TypeInfo {
                name: self.symbols.name(class).to_string(),
                field_names,
                field_defaults,
                vtables: FxHashMap::default(),
            });

            for (iface, methods) in vtables {
                let iface_idx = self.intern_interface(iface);
                self.pending_vtables
                    .push((index as usize, iface_idx, methods));
            }
        }
    }

    fn intern_interface(&mut self, iface: SymbolId) -> u16 {
        if let Some(idx) = self.iface_index.get(&iface) {
            return *idx;
        }
        let idx = self.interfaces.len() as u16;
        self.interfaces.push(InterfaceInfo {
            name: self.symbols.name(iface).to_string(),
        });
        self.iface_index.insert(iface, idx);
        idx
    }

    fn assign_global_slots(&mut self, module: &BoundModule) {
        for (slot, g) in module.globals.iter().enumerate() {
            self.global_slots.insert(g.symbol, slot as u16);
        }
    }

    // =========================================================================
    // Functions
    // =========================================================================

    fn emit_function(&mut self, f: &BoundFunction) {
        let sym = f.symbol;
        let (params, traits) = match &self.symbols.get(sym).kind {
            SymbolKind::Function { params, traits, .. } => (params.clone(), *traits),
            _ => return,
        };
        let is_method = traits.contains(FunctionTraits::METHOD);
        let is_ctor = traits.contains(FunctionTraits::CONSTRUCTOR);

        let address = self.instructions.len() as u32;
        self.addresses.insert(sym, address);
        let sig = self.symbols.sig(sym);
        self.functions.push(FunctionInfo {
            name: self.qualified_name(sym),
            address,
            param_types: sig.params.iter().map(|t| self.symbols.type_name(*t)).collect(),
            return_type: self.symbols.type_name(sig.ret),
        });

        let mut state = FnState {
            arg_slots: FxHashMap::default(),
            local_slots: FxHashMap::default(),
            stack_alloc_at: self.instructions.len(),
        };
        // Slot 0 is the receiver of methods and constructors; declared
        // parameters follow in declaration order, matching push order at the
        // call site.
        let base = if is_method { 1 } else { 0 };
        for (i, p) in params.iter().enumerate() {
            state.arg_slots.insert(*p, (base + i) as u16);
        }
        self.instructions.push(Instruction::StackAlloc(0));

        for stmt in &f.body {
            self.emit_stmt(stmt, &mut state, is_ctor);
        }

        // Epilogue for the fall-through path.
        if is_ctor {
            self.instructions.push(Instruction::LoadArg(0));
        } else {
            self.instructions.push(Instruction::PushVoid);
        }
        self.instructions.push(Instruction::Return);

        // Local counts fit u16; the checker caps declared locals.
        debug_assert!(state.local_slots.len() <= u16::MAX as usize);
        self.instructions[state.stack_alloc_at] =
            Instruction::StackAlloc(state.local_slots.len() as u16);
    }

    /// Synthesize `@global_init`: every global's initializer, stored in
    /// declaration order.
    fn emit_global_init(&mut self, module: &BoundModule) {
        if module.globals.is_empty() {
            return;
        }
        let address = self.instructions.len() as u32;
        self.global_init = Some(address);
        self.functions.push(FunctionInfo {
            name: "@global_init".to_string(),
            address,
            param_types: vec![],
            return_type: "void".to_string(),
        });

        let mut state = FnState {
            arg_slots: FxHashMap::default(),
            local_slots: FxHashMap::default(),
            stack_alloc_at: self.instructions.len(),
        };
        self.instructions.push(Instruction::StackAlloc(0));
        for g in &module.globals {
            self.emit_expr(&g.init, &mut state);
            let slot = self.global_slots[&g.symbol];
            self.instructions.push(Instruction::StoreGlobal(slot));
        }
        self.instructions.push(Instruction::PushVoid);
        self.instructions.push(Instruction::Return);
        self.instructions[state.stack_alloc_at] =
            Instruction::StackAlloc(state.local_slots.len() as u16);
    }

    fn qualified_name(&self, sym: SymbolId) -> String {
        let symbol = self.symbols.get(sym);
        match symbol.parent {
            Some(class) => format!("{}::{}", self.symbols.name(class), symbol.name),
            None => symbol.name.clone(),
        }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn emit_stmt(&mut self, stmt: &BoundStmt, state: &mut FnState, is_ctor: bool) {
        match stmt {
            BoundStmt::Expr(e) => {
                self.emit_expr(e, state);
                self.instructions.push(Instruction::Pop);
            }
            BoundStmt::Block(stmts) => {
                for s in stmts {
                    self.emit_stmt(s, state, is_ctor);
                }
            }
            BoundStmt::VarInit { symbol, init } => {
                self.emit_expr(init, state);
                let slot = self.local_slot(state, *symbol);
                self.instructions.push(Instruction::StoreLocal(slot));
            }
            BoundStmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.emit_expr(cond, state);
                let to_else = self.emit_jump_if_false();
                for s in then_branch {
                    self.emit_stmt(s, state, is_ctor);
                }
                match else_branch {
                    Some(else_branch) => {
                        let to_end = self.emit_jump();
                        self.patch_jump(to_else);
                        for s in else_branch {
                            self.emit_stmt(s, state, is_ctor);
                        }
                        self.patch_jump(to_end);
                    }
                    None => self.patch_jump(to_else),
                }
            }
            BoundStmt::While { cond, body } => {
                let top = self.instructions.len() as u32;
                self.emit_expr(cond, state);
                let to_end = self.emit_jump_if_false();
                for s in body {
                    self.emit_stmt(s, state, is_ctor);
                }
                self.instructions.push(Instruction::Jump(top));
                self.patch_jump(to_end);
            }
            BoundStmt::Return(value) => {
                if is_ctor {
                    // A void-typed return value still runs for its effects;
                    // the receiver flows back regardless.
                    if let Some(v) = value {
                        self.emit_expr(v, state);
                        self.instructions.push(Instruction::Pop);
                    }
                    self.instructions.push(Instruction::LoadArg(0));
                } else {
                    match value {
                        Some(v) => self.emit_expr(v, state),
                        None => self.instructions.push(Instruction::PushVoid),
                    }
                }
                self.instructions.push(Instruction::Return);
            }
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn emit_expr(&mut self, expr: &BoundExpr, state: &mut FnState) {
        match expr {
            BoundExpr::Constant { value, .. } => self.emit_constant(value),
            BoundExpr::VarLoad { symbol, .. } => self.emit_var_load(state, *symbol),
            BoundExpr::This { .. } => self.instructions.push(Instruction::LoadArg(0)),
            BoundExpr::FieldLoad {
                receiver, index, ..
            } => {
                self.emit_expr(receiver, state);
                self.instructions.push(Instruction::LoadField(*index));
            }
            BoundExpr::Unary { op, operand, .. } => {
                self.emit_expr(operand, state);
                self.instructions.push(match op {
                    UnaryOp::Neg => Instruction::Neg,
                    UnaryOp::Not => Instruction::Not,
                });
            }
            BoundExpr::Binary { op, lhs, rhs, .. } => {
                self.emit_expr(lhs, state);
                self.emit_expr(rhs, state);
                self.instructions.push(binary_instruction(*op));
            }
            BoundExpr::Assign {
                op, target, value, ..
            } => self.emit_assign(op.as_ref(), target, value, state),
            BoundExpr::IncDec {
                op, prefix, target, ..
            } => self.emit_inc_dec(*op, *prefix, target, state),
            BoundExpr::Call { target, args, .. } => self.emit_call(target, args, state),
        }
    }

    fn emit_constant(&mut self, value: &Constant) {
        self.instructions.push(match value {
            Constant::Int(v) => Instruction::PushInt(*v),
            Constant::Double(v) => Instruction::PushDouble(*v),
            Constant::Str(v) => Instruction::PushString(v.clone()),
            Constant::Bool(v) => Instruction::PushBool(*v),
            Constant::Void => Instruction::PushVoid,
        });
    }

    /// The assigned value stays on the stack; assignment is an expression.
    fn emit_assign(
        &mut self,
        op: Option<&BinaryOp>,
        target: &BoundTarget,
        value: &BoundExpr,
        state: &mut FnState,
    ) {
        match target {
            BoundTarget::Var(sym) => {
                match op {
                    Some(op) => {
                        self.emit_var_load(state, *sym);
                        self.emit_expr(value, state);
                        self.instructions.push(binary_instruction(*op));
                    }
                    None => self.emit_expr(value, state),
                }
                self.instructions.push(Instruction::Dup);
                self.emit_var_store(state, *sym);
            }
            BoundTarget::Field {
                receiver, index, ..
            } => {
                match op {
                    Some(op) => {
                        // [obj] [obj cur] [obj cur rhs] [obj res] [res obj]
                        self.emit_expr(receiver, state);
                        self.instructions.push(Instruction::Dup);
                        self.instructions.push(Instruction::LoadField(*index));
                        self.emit_expr(value, state);
                        self.instructions.push(binary_instruction(*op));
                        self.instructions.push(Instruction::Swap);
                    }
                    None => {
                        self.emit_expr(value, state);
                        self.emit_expr(receiver, state);
                    }
                }
                self.instructions.push(Instruction::StoreField(*index));
            }
        }
    }

    fn emit_inc_dec(
        &mut self,
        op: IncDecOp,
        prefix: bool,
        target: &BoundTarget,
        state: &mut FnState,
    ) {
        let (step, undo) = match op {
            IncDecOp::Inc => (Instruction::Add, Instruction::Sub),
            IncDecOp::Dec => (Instruction::Sub, Instruction::Add),
        };
        match target {
            BoundTarget::Var(sym) => {
                self.emit_var_load(state, *sym);
                if prefix {
                    self.instructions.push(Instruction::PushInt(1));
                    self.instructions.push(step);
                    self.instructions.push(Instruction::Dup);
                    self.emit_var_store(state, *sym);
                } else {
                    self.instructions.push(Instruction::Dup);
                    self.instructions.push(Instruction::PushInt(1));
                    self.instructions.push(step);
                    self.emit_var_store(state, *sym);
                }
            }
            BoundTarget::Field {
                receiver, index, ..
            } => {
                // Store the new value like a prefix op; a postfix op then
                // undoes the step on the value left behind.
                self.emit_expr(receiver, state);
                self.instructions.push(Instruction::Dup);
                self.instructions.push(Instruction::LoadField(*index));
                self.instructions.push(Instruction::PushInt(1));
                self.instructions.push(step);
                self.instructions.push(Instruction::Swap);
                self.instructions.push(Instruction::StoreField(*index));
                if !prefix {
                    self.instructions.push(Instruction::PushInt(1));
                    self.instructions.push(undo);
                }
            }
        }
    }

    /// Argument counts fit `u8` (receiver included): the checker caps
    /// declared parameters and call arity always matches a declaration.
    fn emit_call(&mut self, target: &BoundCallTarget, args: &[BoundExpr], state: &mut FnState) {
        match target {
            BoundCallTarget::Function(function) => {
                for a in args {
                    self.emit_expr(a, state);
                }
                self.instructions.push(Instruction::Call {
                    target: CallTarget::Function(*function),
                    argc: args.len() as u8,
                });
            }
            BoundCallTarget::Method { receiver, function } => {
                self.emit_expr(receiver, state);
                for a in args {
                    self.emit_expr(a, state);
                }
                self.instructions.push(Instruction::Call {
                    target: CallTarget::Function(*function),
                    argc: args.len() as u8 + 1,
                });
            }
            BoundCallTarget::Virtual {
                receiver,
                interface,
                slot,
            } => {
                self.emit_expr(receiver, state);
                for a in args {
                    self.emit_expr(a, state);
                }
                let interface = self.intern_interface(*interface);
                self.instructions.push(Instruction::CallVirt {
                    interface,
                    slot: *slot,
                    argc: args.len() as u8 + 1,
                });
            }
            BoundCallTarget::Constructor { class, function } => {
                let type_idx = self.type_index[class];
                self.instructions.push(Instruction::NewObj(type_idx));
                for a in args {
                    self.emit_expr(a, state);
                }
                self.instructions.push(Instruction::Call {
                    target: CallTarget::Function(*function),
                    argc: args.len() as u8 + 1,
                });
            }
            BoundCallTarget::Intrinsic(intrinsic) => {
                for a in args {
                    self.emit_expr(a, state);
                }
                self.instructions.push(Instruction::CallIntrinsic(*intrinsic));
            }
        }
    }

    // =========================================================================
    // Slots, jumps, patching
    // =========================================================================

    fn emit_var_load(&mut self, state: &mut FnState, sym: SymbolId) {
        self.instructions.push(match self.var_slot(state, sym) {
            VarSlot::Global(s) => Instruction::LoadGlobal(s),
            VarSlot::Arg(s) => Instruction::LoadArg(s),
            VarSlot::Local(s) => Instruction::LoadLocal(s),
        });
    }

    fn emit_var_store(&mut self, state: &mut FnState, sym: SymbolId) {
        self.instructions.push(match self.var_slot(state, sym) {
            VarSlot::Global(s) => Instruction::StoreGlobal(s),
            VarSlot::Arg(s) => Instruction::StoreArg(s),
            VarSlot::Local(s) => Instruction::StoreLocal(s),
        });
    }

    fn var_slot(&self, state: &mut FnState, sym: SymbolId) -> VarSlot {
        if let Some(slot) = self.global_slots.get(&sym) {
            return VarSlot::Global(*slot);
        }
        if let Some(slot) = state.arg_slots.get(&sym) {
            return VarSlot::Arg(*slot);
        }
        VarSlot::Local(Self::local_slot_in(state, sym))
    }

    fn local_slot(&self, state: &mut FnState, sym: SymbolId) -> u16 {
        Self::local_slot_in(state, sym)
    }

    /// First use wins: a local's slot is fixed the first time it is touched.
    fn local_slot_in(state: &mut FnState, sym: SymbolId) -> u16 {
        let next = state.local_slots.len() as u16;
        *state.local_slots.entry(sym).or_insert(next)
    }

    fn emit_jump(&mut self) -> usize {
        self.instructions.push(Instruction::Jump(JUMP_SENTINEL));
        self.instructions.len() - 1
    }

    fn emit_jump_if_false(&mut self) -> usize {
        self.instructions
            .push(Instruction::JumpIfFalse(JUMP_SENTINEL));
        self.instructions.len() - 1
    }

    fn patch_jump(&mut self, at: usize) {
        let dest = self.instructions.len() as u32;
        match &mut self.instructions[at] {
            Instruction::Jump(a) | Instruction::JumpIfFalse(a) => *a = dest,
            other => unreachable!("patching a non-jump instruction {other}"),
        }
    }

    /// Rewrite symbol call targets to entry addresses and fill the vtable
    /// tables, now that every address is known.
    fn finish(mut self, _module: &BoundModule) -> BytecodeProgram {
        for instruction in &mut self.instructions {
            if let Instruction::Call {
                target: target @ CallTarget::Function(_),
                ..
            } = instruction
            {
                let CallTarget::Function(sym) = *target else {
                    unreachable!()
                };
                *target = CallTarget::Address(self.addresses[&sym]);
            }
        }
        for (type_idx, iface_idx, methods) in self.pending_vtables {
            let table = methods.iter().map(|m| self.addresses[m]).collect();
            self.types[type_idx].vtables.insert(iface_idx, table);
        }

        debug_assert!(self.instructions.iter().all(|i| {
            !matches!(
                i,
                Instruction::Jump(JUMP_SENTINEL) | Instruction::JumpIfFalse(JUMP_SENTINEL)
            )
        }));

        BytecodeProgram::new(
            self.instructions,
            self.functions,
            self.types,
            self.interfaces,
            self.global_slots.len() as u16,
            self.global_init,
        )
    }
}

enum VarSlot {
    Global(u16),
    Arg(u16),
    Local(u16),
}

fn binary_instruction(op: BinaryOp) -> Instruction {
    match op {
        BinaryOp::Add => Instruction::Add,
        BinaryOp::Sub => Instruction::Sub,
        BinaryOp::Mul => Instruction::Mul,
        BinaryOp::Div => Instruction::Div,
        BinaryOp::Mod => Instruction::Mod,
        BinaryOp::And => Instruction::And,
        BinaryOp::Or => Instruction::Or,
        BinaryOp::Eq => Instruction::Eq,
        BinaryOp::Ne => Instruction::Ne,
        BinaryOp::Lt => Instruction::Lt,
        BinaryOp::Le => Instruction::Le,
        BinaryOp::Gt => Instruction::Gt,
        BinaryOp::Ge => Instruction::Ge,
    }
}

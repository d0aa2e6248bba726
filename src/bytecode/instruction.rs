//! The instruction set.
//!
//! A stack machine over one flat instruction array. Jump operands are
//! absolute instruction indices; forward jumps are emitted with
//! [`JUMP_SENTINEL`] and patched once the destination is known. `CALL`
//! operands start life as symbol ids and are rewritten to entry addresses in
//! a final patch pass, after every function's address is fixed.

use std::fmt;

use crate::semantic::symbol::Intrinsic;
use crate::semantic::SymbolId;

/// Placeholder operand of a not-yet-patched forward jump.
pub const JUMP_SENTINEL: u32 = u32::MAX;

/// Operand of `CALL`: a function symbol before address patching, an absolute
/// entry address after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTarget {
    Function(SymbolId),
    Address(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    // Constants
    PushInt(i64),
    PushDouble(f64),
    PushString(String),
    PushBool(bool),
    PushVoid,

    // Variable and field access
    LoadLocal(u16),
    StoreLocal(u16),
    LoadArg(u16),
    StoreArg(u16),
    LoadGlobal(u16),
    StoreGlobal(u16),
    /// Pops the object, pushes the field at the slot.
    LoadField(u16),
    /// Pops the object, then the value; stores, then pushes the value back.
    StoreField(u16),

    // Operand stack shuffling
    Dup,
    Swap,
    Pop,

    // Arithmetic, comparison, logic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,

    // Control flow
    Jump(u32),
    JumpIfFalse(u32),

    /// Reserves the frame's local slots; the operand is back-patched with
    /// the function's final local count.
    StackAlloc(u16),

    // Calls
    Call {
        target: CallTarget,
        argc: u8,
    },
    /// Vtable dispatch: pops receiver and arguments, looks up the entry for
    /// (interface, slot) in the receiver's type.
    CallVirt {
        interface: u16,
        slot: u16,
        argc: u8,
    },
    CallIntrinsic(Intrinsic),

    /// Allocates an object of the type-table entry, fields defaulted.
    NewObj(u16),

    /// Pops the return value, tears down the frame, pushes the value in the
    /// caller.
    Return,
}

impl Instruction {
    /// The mnemonic, without operands.
    pub fn opcode(&self) -> &'static str {
        match self {
            Instruction::PushInt(_) => "PUSH_INT",
            Instruction::PushDouble(_) => "PUSH_DOUBLE",
            Instruction::PushString(_) => "PUSH_STRING",
            Instruction::PushBool(_) => "PUSH_BOOL",
            Instruction::PushVoid => "PUSH_VOID",
            Instruction::LoadLocal(_) => "LOAD_LOCAL",
            Instruction::StoreLocal(_) => "STORE_LOCAL",
            Instruction::LoadArg(_) => "LOAD_ARG",
            Instruction::StoreArg(_) => "STORE_ARG",
            Instruction::LoadGlobal(_) => "LOAD_GLOBAL",
            Instruction::StoreGlobal(_) => "STORE_GLOBAL",
            Instruction::LoadField(_) => "LOAD_FIELD",
            Instruction::StoreField(_) => "STORE_FIELD",
            Instruction::Dup => "DUP",
            Instruction::Swap => "SWAP",
            Instruction::Pop => "POP",
            Instruction::Add => "ADD",
            Instruction::Sub => "SUB",
            Instruction::Mul => "MUL",
            Instruction::Div => "DIV",
            Instruction::Mod => "MOD",
            Instruction::Neg => "NEG",
            Instruction::Eq => "EQ",
            Instruction::Ne => "NE",
            Instruction::Lt => "LT",
            Instruction::Le => "LE",
            Instruction::Gt => "GT",
            Instruction::Ge => "GE",
            Instruction::And => "AND",
            Instruction::Or => "OR",
            Instruction::Not => "NOT",
            Instruction::Jump(_) => "JUMP",
            Instruction::JumpIfFalse(_) => "JUMP_IF_FALSE",
            Instruction::StackAlloc(_) => "STACK_ALLOC",
            Instruction::Call { .. } => "CALL",
            Instruction::CallVirt { .. } => "CALL_VIRT",
            Instruction::CallIntrinsic(_) => "CALL_INTRINSIC",
            Instruction::NewObj(_) => "NEW_OBJ",
            Instruction::Return => "RETURN",
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::PushInt(v) => write!(f, "PUSH_INT {v}"),
            Instruction::PushDouble(v) => write!(f, "PUSH_DOUBLE {v}"),
            Instruction::PushString(v) => write!(f, "PUSH_STRING {v:?}"),
            Instruction::PushBool(v) => write!(f, "PUSH_BOOL {v}"),
            Instruction::LoadLocal(s) => write!(f, "LOAD_LOCAL {s}"),
            Instruction::StoreLocal(s) => write!(f, "STORE_LOCAL {s}"),
            Instruction::LoadArg(s) => write!(f, "LOAD_ARG {s}"),
            Instruction::StoreArg(s) => write!(f, "STORE_ARG {s}"),
            Instruction::LoadGlobal(s) => write!(f, "LOAD_GLOBAL {s}"),
            Instruction::StoreGlobal(s) => write!(f, "STORE_GLOBAL {s}"),
            Instruction::LoadField(s) => write!(f, "LOAD_FIELD {s}"),
            Instruction::StoreField(s) => write!(f, "STORE_FIELD {s}"),
            Instruction::Jump(a) if *a == JUMP_SENTINEL => write!(f, "JUMP ????"),
            Instruction::Jump(a) => write!(f, "JUMP {a}"),
            Instruction::JumpIfFalse(a) if *a == JUMP_SENTINEL => write!(f, "JUMP_IF_FALSE ????"),
            Instruction::JumpIfFalse(a) => write!(f, "JUMP_IF_FALSE {a}"),
            Instruction::StackAlloc(n) => write!(f, "STACK_ALLOC {n}"),
            Instruction::Call { target, argc } => match target {
                CallTarget::Function(sym) => write!(f, "CALL fn#{} {argc}", sym.0),
                CallTarget::Address(a) => write!(f, "CALL {a} {argc}"),
            },
            Instruction::CallVirt {
                interface,
                slot,
                argc,
            } => write!(f, "CALL_VIRT {interface}:{slot} {argc}"),
            Instruction::CallIntrinsic(i) => write!(f, "CALL_INTRINSIC {i:?}"),
            Instruction::NewObj(t) => write!(f, "NEW_OBJ {t}"),
            _ => f.write_str(self.opcode()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_operands() {
        assert_eq!(Instruction::PushInt(42).to_string(), "PUSH_INT 42");
        assert_eq!(Instruction::LoadLocal(3).to_string(), "LOAD_LOCAL 3");
        assert_eq!(
            Instruction::Call {
                target: CallTarget::Address(17),
                argc: 2
            }
            .to_string(),
            "CALL 17 2"
        );
        assert_eq!(Instruction::Return.to_string(), "RETURN");
    }

    #[test]
    fn unpatched_jumps_display_as_placeholders() {
        assert_eq!(Instruction::Jump(JUMP_SENTINEL).to_string(), "JUMP ????");
        assert_eq!(Instruction::Jump(9).to_string(), "JUMP 9");
    }
}

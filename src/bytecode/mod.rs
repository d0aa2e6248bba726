//! Bytecode representation: instruction set, compiled program, listings.

pub mod disasm;
pub mod instruction;
pub mod program;

pub use instruction::{CallTarget, Instruction, JUMP_SENTINEL};
pub use program::{BytecodeProgram, FieldDefault, FunctionInfo, InterfaceInfo, TypeInfo};

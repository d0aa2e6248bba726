//! Compiler and virtual machine for a small statically typed imperative
//! language with classes, interfaces, and function overloading.
//!
//! The pipeline has three stages, each all-or-nothing:
//!
//! 1. **Resolution** ([`semantic::resolve`]) builds the scope tree and binds
//!    every identifier and type reference to a symbol, in two passes so
//!    forward references and recursion work.
//! 2. **Checking** ([`semantic::check`]) computes every signature, enforces
//!    the typing rules, resolves overloads and interface implementations,
//!    and produces a fully typed bound tree.
//! 3. **Code generation** ([`codegen::generate`]) lowers the bound tree to
//!    stack bytecode with patched absolute jumps and call addresses.
//!
//! The resulting [`bytecode::BytecodeProgram`] is self-contained and runs on
//! [`vm::VirtualMachine`], a frame-per-call interpreter with reference-
//! counted heap objects and vtable dispatch for interface calls.
//!
//! ```
//! use basalt::ast::{AstBuilder, Item, Module};
//! use basalt::vm::{Value, VirtualMachine};
//!
//! let mut b = AstBuilder::new();
//! let ret_ty = b.ty("int");
//! let lit = b.int(41);
//! let one = b.int(1);
//! let sum = b.binary(basalt::ast::BinaryOp::Add, lit, one);
//! let ret = b.ret(Some(sum));
//! let body = b.block(vec![ret]);
//! let main = b.function("main", vec![], Some(ret_ty), body);
//! let module = Module { items: vec![Item::Function(main)] };
//!
//! let program = basalt::compile(&module).unwrap();
//! let mut vm = VirtualMachine::with_output(&program, Vec::new());
//! let result = vm.call("main", vec![]).unwrap();
//! assert!(result.eq_value(&Value::Int(42)));
//! ```

pub mod ast;
pub mod bytecode;
pub mod codegen;
pub mod error;
pub mod semantic;
pub mod vm;

pub use error::{CompileError, RuntimeError};

/// Run the full pipeline: resolve, check, generate.
pub fn compile(module: &ast::Module) -> Result<bytecode::BytecodeProgram, CompileError> {
    let resolution = semantic::resolve(module)?;
    let (symbols, bound) = semantic::check(module, resolution)?;
    Ok(codegen::generate(&symbols, &bound))
}

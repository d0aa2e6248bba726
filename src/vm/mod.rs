//! Bytecode execution: values, heap objects, and the interpreter.

pub mod machine;
pub mod object;
pub mod value;

pub use machine::{VirtualMachine, OUTERMOST};
pub use object::{ObjRef, RuntimeObject};
pub use value::Value;

//! Human-readable program listings.

use std::fmt::Write as _;

use super::program::BytecodeProgram;

impl BytecodeProgram {
    /// Render the whole program: type and interface tables, then each
    /// function with its instructions, one address-prefixed line apiece.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();

        if self.global_count > 0 {
            let _ = writeln!(out, "globals: {}", self.global_count);
        }
        for (i, iface) in self.interfaces.iter().enumerate() {
            let _ = writeln!(out, "interface #{i} {}", iface.name);
        }
        for (i, ty) in self.types.iter().enumerate() {
            let _ = writeln!(
                out,
                "type #{i} {} [{}]",
                ty.name,
                ty.field_names.join(", ")
            );
        }

        // Function headers are interleaved at their entry addresses.
        let mut next_fn = self.functions.iter().peekable();
        for (addr, instruction) in self.instructions.iter().enumerate() {
            while let Some(f) = next_fn.peek() {
                if f.address as usize != addr {
                    break;
                }
                let _ = writeln!(
                    out,
                    "\n{}({}): {}",
                    f.name,
                    f.param_types.join(", "),
                    f.return_type
                );
                next_fn.next();
            }
            let _ = writeln!(out, "  {addr:04}  {instruction}");
        }
        out
    }
}

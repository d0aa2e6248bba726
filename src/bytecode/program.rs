//! The compiled program.
//!
//! One flat instruction array plus the metadata tables the machine needs at
//! run time: function entries, object type layouts with vtables, interface
//! names, and the global slot count. Everything is index-based and
//! self-contained; the symbol arena does not survive past code generation.

use rustc_hash::FxHashMap;

use super::instruction::Instruction;

/// Entry-point metadata for one compiled function.
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    /// Qualified name: `area` for a free function, `Rect::area` for a
    /// method, `Rect::Rect` for a constructor.
    pub name: String,
    pub address: u32,
    /// Rendered parameter type names, receiver excluded.
    pub param_types: Vec<String>,
    pub return_type: String,
}

/// Default value of an object field, applied at allocation.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDefault {
    Int,
    Double,
    Bool,
    Str,
    /// Object-typed fields start out as void.
    Void,
}

/// Run-time layout of one class.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub name: String,
    pub field_names: Vec<String>,
    pub field_defaults: Vec<FieldDefault>,
    /// Interface table index to method entry addresses in slot order.
    pub vtables: FxHashMap<u16, Vec<u32>>,
}

#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    pub name: String,
}

#[derive(Debug)]
pub struct BytecodeProgram {
    pub instructions: Vec<Instruction>,
    /// In emission order; addresses are strictly increasing.
    pub functions: Vec<FunctionInfo>,
    pub types: Vec<TypeInfo>,
    pub interfaces: Vec<InterfaceInfo>,
    pub global_count: u16,
    /// Entry of the synthesized global initializer, run once before the
    /// first call into the program.
    pub global_init: Option<u32>,
    /// First function index per name, for entry lookup by name.
    by_name: FxHashMap<String, usize>,
}

impl BytecodeProgram {
    pub fn new(
        instructions: Vec<Instruction>,
        functions: Vec<FunctionInfo>,
        types: Vec<TypeInfo>,
        interfaces: Vec<InterfaceInfo>,
        global_count: u16,
        global_init: Option<u32>,
    ) -> Self {
        let mut by_name = FxHashMap::default();
        for (i, f) in functions.iter().enumerate() {
            by_name.entry(f.name.clone()).or_insert(i);
        }
        Self {
            instructions,
            functions,
            types,
            interfaces,
            global_count,
            global_init,
            by_name,
        }
    }

    /// The first function with this name, in emission order.
    pub fn function_named(&self, name: &str) -> Option<&FunctionInfo> {
        self.by_name.get(name).map(|i| &self.functions[*i])
    }

    /// Entry address of the first function with this name.
    pub fn entry_address(&self, name: &str) -> Option<u32> {
        self.function_named(name).map(|f| f.address)
    }
}

//! The symbol arena.
//!
//! All symbols live in one dense `Vec` addressed by [`SymbolId`]; scopes,
//! annotation tables, and the bound tree refer to symbols by id only. This
//! replaces identity-keyed maps over a graph of symbol objects with plain
//! integer indexing: ids are assigned in declaration order, so anything that
//! iterates symbols is deterministic.
//!
//! Symbols are created once. The only later mutation is filling in type
//! annotations (signatures, field and variable types, vtable method lists)
//! during the type-checking passes.

use bitflags::bitflags;

use super::ty::{FnSig, Ty};

/// Dense index of a symbol in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

impl SymbolId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

bitflags! {
    /// Traits of a function symbol.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FunctionTraits: u8 {
        /// Takes an implicit receiver as its first argument.
        const METHOD = 1 << 0;
        /// A constructor: allocated receiver in, receiver out.
        const CONSTRUCTOR = 1 << 1;
        /// A built-in executed by the VM without a bytecode body.
        const INTRINSIC = 1 << 2;
        /// Declared on an interface; dispatched through a vtable.
        const VIRTUAL = 1 << 3;
    }
}

/// The fixed set of built-in functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intrinsic {
    PrintStr,
    PrintInt,
    PrintDouble,
    PrintLineStr,
    PrintLineInt,
    PrintLineDouble,
}

impl Intrinsic {
    /// Whether the intrinsic appends a newline.
    pub fn is_line(self) -> bool {
        matches!(
            self,
            Intrinsic::PrintLineStr | Intrinsic::PrintLineInt | Intrinsic::PrintLineDouble
        )
    }
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    /// Containing symbol: the class of a member, the function of a parameter.
    pub parent: Option<SymbolId>,
    pub kind: SymbolKind,
}

#[derive(Debug, Clone)]
pub enum SymbolKind {
    /// A local, parameter, global, or field. The type is filled in during
    /// checking (pass 1 for parameters, fields, and typed globals; pass 2
    /// for inferred locals).
    Variable {
        ty: Option<Ty>,
        is_param: bool,
        is_global: bool,
    },
    /// A built-in type name.
    Primitive { ty: Ty },
    /// A class: member lists in declaration order, plus one vtable method
    /// list per implemented interface (filled during checking pass 1).
    Class {
        fields: Vec<SymbolId>,
        constructors: Vec<SymbolId>,
        methods: Vec<SymbolId>,
        interfaces: Vec<SymbolId>,
        vtables: Vec<(SymbolId, Vec<SymbolId>)>,
    },
    /// An interface: ordered method signatures.
    Interface { methods: Vec<SymbolId> },
    /// A callable. The signature is filled in during checking pass 1.
    Function {
        params: Vec<SymbolId>,
        sig: Option<FnSig>,
        traits: FunctionTraits,
        /// For interface methods: the declaring interface and method slot.
        interface_slot: Option<(SymbolId, u16)>,
        intrinsic: Option<Intrinsic>,
    },
    /// A non-empty ordered candidate set of functions sharing one name.
    /// Never a call target itself; only an input to overload resolution.
    Overload { candidates: Vec<SymbolId> },
}

#[derive(Debug, Default)]
pub struct SymbolArena {
    symbols: Vec<Symbol>,
}

impl SymbolArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(symbol);
        id
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.index()]
    }

    pub fn name(&self, id: SymbolId) -> &str {
        &self.get(id).name
    }

    /// The signature of a function symbol. Panics if called before checking
    /// pass 1 has filled it in, or on a non-function symbol.
    pub fn sig(&self, id: SymbolId) -> &FnSig {
        match &self.get(id).kind {
            SymbolKind::Function { sig: Some(sig), .. } => sig,
            _ => panic!("symbol '{}' has no signature", self.name(id)),
        }
    }

    pub fn var_ty(&self, id: SymbolId) -> Option<Ty> {
        match &self.get(id).kind {
            SymbolKind::Variable { ty, .. } => *ty,
            _ => None,
        }
    }

    /// Render a type name for diagnostics and disassembly headers.
    pub fn type_name(&self, ty: Ty) -> String {
        match ty {
            Ty::Void => "void".to_string(),
            Ty::Int => "int".to_string(),
            Ty::Double => "double".to_string(),
            Ty::Bool => "boolean".to_string(),
            Ty::Str => "string".to_string(),
            Ty::Class(id) | Ty::Interface(id) => self.name(id).to_string(),
        }
    }

    pub fn type_names(&self, tys: &[Ty]) -> String {
        tys.iter()
            .map(|t| self.type_name(*t))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn class_implements(&self, class: SymbolId, iface: SymbolId) -> bool {
        match &self.get(class).kind {
            SymbolKind::Class { interfaces, .. } => interfaces.contains(&iface),
            _ => false,
        }
    }

    /// Assignability: identical types, int-to-double widening, or a class
    /// value flowing into an interface it implements.
    pub fn is_assignable(&self, from: Ty, to: Ty) -> bool {
        if from == to {
            return true;
        }
        match (from, to) {
            (Ty::Int, Ty::Double) => true,
            (Ty::Class(c), Ty::Interface(i)) => self.class_implements(c, i),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variable(name: &str, ty: Ty) -> Symbol {
        Symbol {
            name: name.to_string(),
            parent: None,
            kind: SymbolKind::Variable {
                ty: Some(ty),
                is_param: false,
                is_global: false,
            },
        }
    }

    #[test]
    fn alloc_assigns_dense_ids() {
        let mut arena = SymbolArena::new();
        let a = arena.alloc(variable("a", Ty::Int));
        let b = arena.alloc(variable("b", Ty::Double));
        assert_eq!(a, SymbolId(0));
        assert_eq!(b, SymbolId(1));
        assert_eq!(arena.name(b), "b");
    }

    #[test]
    fn assignability_rules() {
        let mut arena = SymbolArena::new();
        let iface = arena.alloc(Symbol {
            name: "Shape".to_string(),
            parent: None,
            kind: SymbolKind::Interface { methods: vec![] },
        });
        let class = arena.alloc(Symbol {
            name: "Rect".to_string(),
            parent: None,
            kind: SymbolKind::Class {
                fields: vec![],
                constructors: vec![],
                methods: vec![],
                interfaces: vec![iface],
                vtables: vec![],
            },
        });
        let other = arena.alloc(Symbol {
            name: "Blob".to_string(),
            parent: None,
            kind: SymbolKind::Class {
                fields: vec![],
                constructors: vec![],
                methods: vec![],
                interfaces: vec![],
                vtables: vec![],
            },
        });

        assert!(arena.is_assignable(Ty::Int, Ty::Int));
        assert!(arena.is_assignable(Ty::Int, Ty::Double));
        assert!(!arena.is_assignable(Ty::Double, Ty::Int));
        assert!(arena.is_assignable(Ty::Class(class), Ty::Interface(iface)));
        assert!(!arena.is_assignable(Ty::Class(other), Ty::Interface(iface)));
        assert!(!arena.is_assignable(Ty::Interface(iface), Ty::Class(class)));
    }
}

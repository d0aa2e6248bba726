//! Static type representation.
//!
//! Types are a closed set: five primitives plus class and interface types,
//! which point at their declaring symbol. Equality is structural on the
//! variant and symbol id, so comparing types never needs the arena; only
//! rendering a name does.

use super::symbol::SymbolId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ty {
    Void,
    Int,
    Double,
    Bool,
    Str,
    Class(SymbolId),
    Interface(SymbolId),
}

impl Ty {
    pub fn is_numeric(self) -> bool {
        matches!(self, Ty::Int | Ty::Double)
    }

    /// The result type of a numeric binary operation: double wins.
    pub fn common_numeric(a: Ty, b: Ty) -> Option<Ty> {
        match (a, b) {
            (Ty::Int, Ty::Int) => Some(Ty::Int),
            (Ty::Int, Ty::Double) | (Ty::Double, Ty::Int) | (Ty::Double, Ty::Double) => {
                Some(Ty::Double)
            }
            _ => None,
        }
    }
}

/// A function signature: declared parameter types and return type.
/// The implicit receiver of methods and constructors is not part of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FnSig {
    pub params: Vec<Ty>,
    pub ret: Ty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_numeric_widens_to_double() {
        assert_eq!(Ty::common_numeric(Ty::Int, Ty::Int), Some(Ty::Int));
        assert_eq!(Ty::common_numeric(Ty::Int, Ty::Double), Some(Ty::Double));
        assert_eq!(Ty::common_numeric(Ty::Double, Ty::Int), Some(Ty::Double));
        assert_eq!(Ty::common_numeric(Ty::Double, Ty::Double), Some(Ty::Double));
    }

    #[test]
    fn common_numeric_rejects_non_numerics() {
        assert_eq!(Ty::common_numeric(Ty::Bool, Ty::Int), None);
        assert_eq!(Ty::common_numeric(Ty::Str, Ty::Str), None);
    }
}

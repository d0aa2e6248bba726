//! Run-time values.

use std::fmt;
use std::rc::Rc;

use super::object::ObjRef;

/// A dynamically tagged value. Numeric opcodes dispatch on the tags, so a
/// widened int never needs an explicit conversion instruction.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Double(f64),
    Bool(bool),
    Str(Rc<str>),
    Object(ObjRef),
    Void,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::Bool(_) => "boolean",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::Void => "void",
        }
    }

    /// Equality as the `EQ` opcode sees it: numeric across int and double,
    /// strings by content, objects by identity.
    pub fn eq_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Int(a), Value::Double(b)) | (Value::Double(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Void, Value::Void) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    /// Rendering used by the print intrinsics. Whole doubles keep one
    /// decimal place, so `12.0` prints as `12.0` rather than `12`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Double(v) if v.fract() == 0.0 && v.is_finite() => write!(f, "{v:.1}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v}"),
            Value::Object(_) => write!(f, "<object>"),
            Value::Void => write!(f, "<void>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_equality_crosses_tags() {
        assert!(Value::Int(3).eq_value(&Value::Double(3.0)));
        assert!(!Value::Int(3).eq_value(&Value::Double(3.5)));
        assert!(!Value::Int(1).eq_value(&Value::Bool(true)));
    }

    #[test]
    fn strings_compare_by_content() {
        let a = Value::Str(Rc::from("hi"));
        let b = Value::Str(Rc::from("hi"));
        assert!(a.eq_value(&b));
    }

    #[test]
    fn whole_doubles_display_with_a_decimal() {
        assert_eq!(Value::Double(12.0).to_string(), "12.0");
        assert_eq!(Value::Double(0.5).to_string(), "0.5");
        assert_eq!(Value::Int(12).to_string(), "12");
    }
}

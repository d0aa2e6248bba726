//! Heap objects.
//!
//! Objects are reference-counted cells; assigning an object value copies the
//! reference, never the fields. Each object remembers its type-table index
//! so vtable dispatch can recover the layout from any receiver.

use std::cell::RefCell;
use std::rc::Rc;

use crate::bytecode::{FieldDefault, TypeInfo};

use super::value::Value;

pub type ObjRef = Rc<RefCell<RuntimeObject>>;

#[derive(Debug)]
pub struct RuntimeObject {
    pub type_index: u16,
    pub fields: Vec<Value>,
}

/// Allocate an instance with every field at its default.
pub fn allocate(type_index: u16, info: &TypeInfo) -> ObjRef {
    let fields = info
        .field_defaults
        .iter()
        .map(|d| match d {
            FieldDefault::Int => Value::Int(0),
            FieldDefault::Double => Value::Double(0.0),
            FieldDefault::Bool => Value::Bool(false),
            FieldDefault::Str => Value::Str(Rc::from("")),
            FieldDefault::Void => Value::Void,
        })
        .collect();
    Rc::new(RefCell::new(RuntimeObject {
        type_index,
        fields,
    }))
}

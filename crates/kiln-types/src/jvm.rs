//! Opcode selection by descriptor.

use kiln_classfile::opcodes::{
    ALOAD, ARETURN, DLOAD, DRETURN, FLOAD, FRETURN, ILOAD, IRETURN, LLOAD, LRETURN, RETURN,
};
use kiln_classfile::{BaseType, FieldType, ReturnType};

use crate::ty::Primitive;

/// Return instruction for a return descriptor (`I`, `V`, `Ljava/lang/String;`)
/// or for a whole method descriptor (`()I`).
pub fn return_instruction(descriptor: &str) -> u8 {
    let ret = descriptor
        .rsplit_once(')')
        .map_or(descriptor, |(_, ret)| ret);
    match ret {
        "Z" | "B" | "C" | "S" | "I" => IRETURN,
        "J" => LRETURN,
        "F" => FRETURN,
        "D" => DRETURN,
        "V" => RETURN,
        _ => ARETURN,
    }
}

pub fn return_opcode(ty: &ReturnType) -> u8 {
    match ty {
        ReturnType::Void => RETURN,
        ReturnType::Type(field) => return_instruction(&field.descriptor()),
    }
}

pub fn load_opcode(ty: &FieldType) -> u8 {
    match ty {
        FieldType::Base(BaseType::Long) => LLOAD,
        FieldType::Base(BaseType::Float) => FLOAD,
        FieldType::Base(BaseType::Double) => DLOAD,
        FieldType::Base(_) => ILOAD,
        FieldType::Object(_) | FieldType::Array(_) => ALOAD,
    }
}

/// Primitive named by a field type, if any.
pub fn primitive_of(ty: &FieldType) -> Option<Primitive> {
    match ty {
        FieldType::Base(base) => Primitive::from_descriptor_char(base.descriptor_char()),
        _ => None,
    }
}

/// `(owner, name, descriptor)` of the static `valueOf` that boxes `primitive`.
pub fn box_method(primitive: Primitive) -> (&'static str, &'static str, String) {
    let owner = primitive.box_class();
    (
        owner,
        "valueOf",
        format!("({})L{owner};", primitive.descriptor_char()),
    )
}

//! Reading, writing and assembling JVM class files.

#![forbid(unsafe_code)]

pub mod access;
mod annotation;
mod classfile;
mod code;
mod constant_pool;
mod descriptor;
mod error;
pub mod opcodes;
mod reader;
mod signature;

pub use crate::annotation::{Annotation, ConstValue, ElementValue};
pub use crate::classfile::{Attribute, ClassFile, ClassMember, RecordComponent, JAVA_8};
pub use crate::code::{
    instruction_len, Code, CodeBuilder, ExceptionHandler, Frame, Instruction, Label,
    VerificationType,
};
pub use crate::constant_pool::{ConstantPool, CpInfo};
pub use crate::descriptor::{parse_field_descriptor, parse_method_descriptor};
pub use crate::descriptor::{BaseType, FieldType, MethodDescriptor, ReturnType};
pub use crate::error::{Error, Result};
pub use crate::signature::{
    parse_class_signature, parse_field_signature, parse_method_signature, ClassSignature,
    ClassTypeSignature, FieldTypeSignature, MethodSignature, SimpleClassTypeSignature,
    TypeArgument, TypeParameter, TypeSignature,
};

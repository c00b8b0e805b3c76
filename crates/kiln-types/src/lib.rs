//! The type model shared by the index and the enhancers: class names,
//! [`TypeRef`], substitution, and descriptor/signature rendering.

#![forbid(unsafe_code)]

mod bindings;
mod convert;
pub mod jvm;
mod name;
mod signature;
mod ty;

pub use crate::bindings::TypeBindings;
pub use crate::convert::{from_field_type, from_return_type, TypeVarScope};
pub use crate::name::ClassName;
pub use crate::signature::{
    has_unsupported_shape, method_descriptor, method_signature, to_descriptor, to_signature,
    TypeArgMapper, Unmapped,
};
pub use crate::ty::{Primitive, TypeRef, TypeVariable};

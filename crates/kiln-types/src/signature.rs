//! Rendering of [`TypeRef`]s as JVM descriptors and generic signatures.
//!
//! Two shapes are knowingly approximated when rendering signatures: owner
//! types of inner parameterized classes are dropped and bounded wildcards are
//! written as `*`. [`has_unsupported_shape`] reports when that happens.

use crate::ty::{TypeRef, TypeVariable};

/// Supplies replacement signature text for type-variable identifiers.
///
/// Returned strings are inserted verbatim, so a mapper used for descriptors
/// must return erased descriptors and one used for signatures must return
/// signatures.
pub trait TypeArgMapper {
    fn map(&self, identifier: &str) -> Option<String>;
}

impl<F> TypeArgMapper for F
where
    F: Fn(&str) -> Option<String>,
{
    fn map(&self, identifier: &str) -> Option<String> {
        self(identifier)
    }
}

/// Mapper that never overrides anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unmapped;

impl TypeArgMapper for Unmapped {
    fn map(&self, _identifier: &str) -> Option<String> {
        None
    }
}

/// Erased JVM descriptor of `ty`.
pub fn to_descriptor<M: TypeArgMapper + ?Sized>(ty: &TypeRef, mapper: &M) -> String {
    let mut out = String::new();
    render(&mut out, ty, mapper, true);
    out
}

/// Generic signature of `ty`.
pub fn to_signature<M: TypeArgMapper + ?Sized>(ty: &TypeRef, mapper: &M) -> String {
    let mut out = String::new();
    render(&mut out, ty, mapper, false);
    out
}

pub fn method_descriptor<M: TypeArgMapper + ?Sized>(
    parameters: &[TypeRef],
    return_type: &TypeRef,
    mapper: &M,
) -> String {
    let mut out = String::from("(");
    for param in parameters {
        render(&mut out, param, mapper, true);
    }
    out.push(')');
    render(&mut out, return_type, mapper, true);
    out
}

/// Generic method signature, including a `<...>` section when
/// `type_parameters` is non-empty.
///
/// `is_interface` decides whether a leading bound is written in the
/// interface-bound position (`T::Lfoo/Bar;`).
pub fn method_signature<M, I>(
    type_parameters: &[TypeVariable],
    parameters: &[TypeRef],
    return_type: &TypeRef,
    mapper: &M,
    is_interface: I,
) -> String
where
    M: TypeArgMapper + ?Sized,
    I: Fn(&TypeRef) -> bool,
{
    let mut out = String::new();
    if !type_parameters.is_empty() {
        out.push('<');
        for param in type_parameters {
            out.push_str(&param.identifier);
            if param.bounds.is_empty() {
                out.push_str(":Ljava/lang/Object;");
            }
            for (i, bound) in param.bounds.iter().enumerate() {
                if i == 0 && is_interface(bound) {
                    out.push(':');
                }
                out.push(':');
                render(&mut out, bound, mapper, false);
            }
        }
        out.push('>');
    }
    out.push('(');
    for param in parameters {
        render(&mut out, param, mapper, false);
    }
    out.push(')');
    render(&mut out, return_type, mapper, false);
    out
}

/// Whether rendering `ty` as a signature loses information: an owner type on
/// a parameterized class, or a wildcard with a bound.
pub fn has_unsupported_shape(ty: &TypeRef) -> bool {
    match ty {
        TypeRef::Class(_) | TypeRef::Primitive(_) | TypeRef::Void | TypeRef::TypeVariable(_) => {
            false
        }
        TypeRef::Array { component, .. } => has_unsupported_shape(component),
        TypeRef::Parameterized {
            owner, arguments, ..
        } => owner.is_some() || arguments.iter().any(has_unsupported_shape),
        TypeRef::Wildcard {
            extends_bound,
            super_bound,
        } => extends_bound.is_some() || super_bound.is_some(),
    }
}

fn render<M: TypeArgMapper + ?Sized>(out: &mut String, ty: &TypeRef, mapper: &M, erased: bool) {
    match ty {
        TypeRef::Array {
            component,
            dimensions,
        } => {
            for _ in 0..*dimensions {
                out.push('[');
            }
            render(out, component, mapper, erased);
        }
        TypeRef::Class(name) => {
            out.push('L');
            out.push_str(&name.internal_name());
            out.push(';');
        }
        TypeRef::Parameterized {
            name, arguments, ..
        } => {
            out.push('L');
            out.push_str(&name.internal_name());
            if !erased && !arguments.is_empty() {
                out.push('<');
                for arg in arguments {
                    render(out, arg, mapper, erased);
                }
                out.push('>');
            }
            out.push(';');
        }
        TypeRef::Primitive(p) => out.push(p.descriptor_char()),
        TypeRef::TypeVariable(var) => {
            if let Some(mapped) = mapper.map(&var.identifier) {
                out.push_str(&mapped);
            } else if erased {
                render(out, &var.first_bound(), mapper, erased);
            } else {
                out.push('T');
                out.push_str(&var.identifier);
                out.push(';');
            }
        }
        TypeRef::Void => out.push('V'),
        TypeRef::Wildcard { .. } => {
            if !erased {
                out.push('*');
            }
        }
    }
}

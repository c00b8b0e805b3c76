//! Conversion from parsed class-file signatures and descriptors to
//! [`TypeRef`].

use kiln_classfile::{
    ClassTypeSignature, FieldType, ReturnType, TypeArgument, TypeParameter, TypeSignature,
};

use crate::name::ClassName;
use crate::ty::{Primitive, TypeRef, TypeVariable};

/// Type variables visible at some point of a class file: the class's own
/// parameters, optionally followed by a method's.
///
/// Bounds are computed in declaration order, so a parameter may refer to
/// itself or to earlier ones (`T extends Comparable<T>`). Such references
/// resolve to an unbounded placeholder rather than recursing.
#[derive(Debug, Clone, Default)]
pub struct TypeVarScope {
    vars: Vec<TypeVariable>,
    own_start: usize,
}

impl TypeVarScope {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn for_class(parameters: &[TypeParameter]) -> Self {
        Self::empty().nested(parameters)
    }

    /// A scope for a generic method declared inside `self`.
    pub fn nested(&self, parameters: &[TypeParameter]) -> Self {
        let own_start = self.vars.len();
        let mut scope = Self {
            vars: self.vars.clone(),
            own_start,
        };
        scope
            .vars
            .extend(parameters.iter().map(|p| TypeVariable::unbounded(p.name.clone())));

        for (i, param) in parameters.iter().enumerate() {
            let mut bounds = Vec::new();
            if let Some(class_bound) = &param.class_bound {
                bounds.push(scope.type_signature(class_bound));
            }
            bounds.extend(param.interface_bounds.iter().map(|b| scope.type_signature(b)));
            if bounds.is_empty() {
                bounds.push(TypeRef::object());
            }
            scope.vars[own_start + i].bounds = bounds;
        }
        scope
    }

    /// Parameters declared at this level, excluding enclosing ones.
    pub fn declared(&self) -> &[TypeVariable] {
        &self.vars[self.own_start..]
    }

    pub fn lookup(&self, identifier: &str) -> Option<&TypeVariable> {
        self.vars.iter().rev().find(|v| v.identifier == identifier)
    }

    pub fn type_signature(&self, sig: &TypeSignature) -> TypeRef {
        match sig {
            TypeSignature::Base(base) => Primitive::from_descriptor_char(base.descriptor_char())
                .map_or(TypeRef::Void, TypeRef::Primitive),
            TypeSignature::Array(component) => TypeRef::array(self.type_signature(component), 1),
            TypeSignature::Class(class) => self.class_type(class),
            TypeSignature::TypeVariable(name) => TypeRef::TypeVariable(
                self.lookup(name)
                    .cloned()
                    .unwrap_or_else(|| TypeVariable::unbounded(name.clone())),
            ),
        }
    }

    /// Inner classes keep their enclosing parameterized type as owner when
    /// an outer segment carries arguments.
    pub fn class_type(&self, sig: &ClassTypeSignature) -> TypeRef {
        let mut name = String::new();
        let mut owner: Option<TypeRef> = None;
        let last = sig.segments.len().saturating_sub(1);

        for (i, segment) in sig.segments.iter().enumerate() {
            if i > 0 {
                name.push('$');
            }
            name.push_str(&segment.name);
            let arguments: Vec<TypeRef> = segment
                .type_arguments
                .iter()
                .map(|arg| self.type_argument(arg))
                .collect();

            if i == last {
                return if arguments.is_empty() && owner.is_none() {
                    TypeRef::Class(ClassName::new(name))
                } else {
                    TypeRef::Parameterized {
                        name: ClassName::new(name),
                        owner: owner.map(Box::new),
                        arguments,
                    }
                };
            }
            if !arguments.is_empty() || owner.is_some() {
                owner = Some(TypeRef::Parameterized {
                    name: ClassName::new(name.clone()),
                    owner: owner.map(Box::new),
                    arguments,
                });
            }
        }
        TypeRef::object()
    }

    pub fn type_argument(&self, arg: &TypeArgument) -> TypeRef {
        match arg {
            TypeArgument::Any => TypeRef::wildcard(),
            TypeArgument::Exact(ty) => self.type_signature(ty),
            TypeArgument::Extends(ty) => TypeRef::wildcard_extends(self.type_signature(ty)),
            TypeArgument::Super(ty) => TypeRef::wildcard_super(self.type_signature(ty)),
        }
    }
}

pub fn from_field_type(ty: &FieldType) -> TypeRef {
    match ty {
        FieldType::Base(base) => Primitive::from_descriptor_char(base.descriptor_char())
            .map_or(TypeRef::Void, TypeRef::Primitive),
        FieldType::Object(internal) => TypeRef::Class(ClassName::new(internal.as_str())),
        FieldType::Array(component) => TypeRef::array(from_field_type(component), 1),
    }
}

pub fn from_return_type(ty: &ReturnType) -> TypeRef {
    match ty {
        ReturnType::Void => TypeRef::Void,
        ReturnType::Type(field) => from_field_type(field),
    }
}

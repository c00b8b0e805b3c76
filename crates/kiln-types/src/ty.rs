use std::fmt;

use serde::{Deserialize, Serialize};

use crate::name::ClassName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl Primitive {
    pub fn descriptor_char(self) -> char {
        match self {
            Primitive::Boolean => 'Z',
            Primitive::Byte => 'B',
            Primitive::Char => 'C',
            Primitive::Short => 'S',
            Primitive::Int => 'I',
            Primitive::Long => 'J',
            Primitive::Float => 'F',
            Primitive::Double => 'D',
        }
    }

    pub fn from_descriptor_char(c: char) -> Option<Self> {
        Some(match c {
            'Z' => Primitive::Boolean,
            'B' => Primitive::Byte,
            'C' => Primitive::Char,
            'S' => Primitive::Short,
            'I' => Primitive::Int,
            'J' => Primitive::Long,
            'F' => Primitive::Float,
            'D' => Primitive::Double,
            _ => return None,
        })
    }

    /// Java keyword for the type.
    pub fn keyword(self) -> &'static str {
        match self {
            Primitive::Boolean => "boolean",
            Primitive::Byte => "byte",
            Primitive::Char => "char",
            Primitive::Short => "short",
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::Float => "float",
            Primitive::Double => "double",
        }
    }

    /// Internal name of the wrapper class.
    pub fn box_class(self) -> &'static str {
        match self {
            Primitive::Boolean => "java/lang/Boolean",
            Primitive::Byte => "java/lang/Byte",
            Primitive::Char => "java/lang/Character",
            Primitive::Short => "java/lang/Short",
            Primitive::Int => "java/lang/Integer",
            Primitive::Long => "java/lang/Long",
            Primitive::Float => "java/lang/Float",
            Primitive::Double => "java/lang/Double",
        }
    }

    /// Category-2 values take two local/stack slots.
    pub fn is_wide(self) -> bool {
        matches!(self, Primitive::Long | Primitive::Double)
    }
}

/// A declared type variable together with its bounds, in declaration order.
///
/// An empty bound list means `java.lang.Object`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeVariable {
    pub identifier: String,
    pub bounds: Vec<TypeRef>,
}

impl TypeVariable {
    pub fn new(identifier: impl Into<String>, bounds: Vec<TypeRef>) -> Self {
        Self {
            identifier: identifier.into(),
            bounds,
        }
    }

    pub fn unbounded(identifier: impl Into<String>) -> Self {
        Self::new(identifier, Vec::new())
    }

    pub fn first_bound(&self) -> TypeRef {
        self.bounds
            .first()
            .cloned()
            .unwrap_or_else(|| TypeRef::Class(ClassName::object()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeRef {
    Class(ClassName),
    /// `component` is never itself an array; nesting is counted in
    /// `dimensions`.
    Array {
        component: Box<TypeRef>,
        dimensions: u8,
    },
    Parameterized {
        name: ClassName,
        owner: Option<Box<TypeRef>>,
        arguments: Vec<TypeRef>,
    },
    TypeVariable(TypeVariable),
    Wildcard {
        extends_bound: Option<Box<TypeRef>>,
        super_bound: Option<Box<TypeRef>>,
    },
    Primitive(Primitive),
    Void,
}

impl TypeRef {
    pub fn class(name: impl Into<ClassName>) -> Self {
        TypeRef::Class(name.into())
    }

    pub fn object() -> Self {
        TypeRef::Class(ClassName::object())
    }

    /// Builds an array type, folding nested arrays into one dimension count.
    pub fn array(component: TypeRef, dimensions: u8) -> Self {
        match component {
            TypeRef::Array {
                component,
                dimensions: inner,
            } => TypeRef::Array {
                component,
                dimensions: inner.saturating_add(dimensions),
            },
            component => TypeRef::Array {
                component: Box::new(component),
                dimensions,
            },
        }
    }

    pub fn parameterized(name: impl Into<ClassName>, arguments: Vec<TypeRef>) -> Self {
        TypeRef::Parameterized {
            name: name.into(),
            owner: None,
            arguments,
        }
    }

    pub fn type_variable(identifier: impl Into<String>, bounds: Vec<TypeRef>) -> Self {
        TypeRef::TypeVariable(TypeVariable::new(identifier, bounds))
    }

    pub fn wildcard() -> Self {
        TypeRef::Wildcard {
            extends_bound: None,
            super_bound: None,
        }
    }

    pub fn wildcard_extends(bound: TypeRef) -> Self {
        TypeRef::Wildcard {
            extends_bound: Some(Box::new(bound)),
            super_bound: None,
        }
    }

    pub fn wildcard_super(bound: TypeRef) -> Self {
        TypeRef::Wildcard {
            extends_bound: None,
            super_bound: Some(Box::new(bound)),
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, TypeRef::Primitive(_))
    }

    pub fn as_primitive(&self) -> Option<Primitive> {
        match self {
            TypeRef::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    /// The raw class a reference type names, if it names one directly.
    pub fn raw_class(&self) -> Option<&ClassName> {
        match self {
            TypeRef::Class(name) | TypeRef::Parameterized { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Type arguments as written; empty for anything but parameterized types.
    pub fn arguments(&self) -> &[TypeRef] {
        match self {
            TypeRef::Parameterized { arguments, .. } => arguments,
            _ => &[],
        }
    }

    /// Index-style name of the type: the raw class for class and
    /// parameterized types, the erased bound for variables and wildcards,
    /// `[Ljava.lang.Integer;` for arrays, and the keyword for primitives.
    pub fn name(&self) -> String {
        match self {
            TypeRef::Class(name) | TypeRef::Parameterized { name, .. } => name.to_string(),
            TypeRef::Array {
                component,
                dimensions,
            } => {
                let mut out = "[".repeat(*dimensions as usize);
                match component.erasure() {
                    TypeRef::Primitive(p) => out.push(p.descriptor_char()),
                    erased => {
                        out.push('L');
                        out.push_str(&erased.name());
                        out.push(';');
                    }
                }
                out
            }
            TypeRef::TypeVariable(var) => var.first_bound().name(),
            TypeRef::Wildcard { extends_bound, .. } => extends_bound
                .as_deref()
                .map_or_else(|| ClassName::OBJECT.to_string(), TypeRef::name),
            TypeRef::Primitive(p) => p.keyword().to_string(),
            TypeRef::Void => "void".to_string(),
        }
    }

    /// The JVM erasure: parameterized types lose their arguments, type
    /// variables become their first bound and wildcards their upper bound.
    pub fn erasure(&self) -> TypeRef {
        match self {
            TypeRef::Class(_) | TypeRef::Primitive(_) | TypeRef::Void => self.clone(),
            TypeRef::Array {
                component,
                dimensions,
            } => TypeRef::array(component.erasure(), *dimensions),
            TypeRef::Parameterized { name, .. } => TypeRef::Class(name.clone()),
            TypeRef::TypeVariable(var) => var.first_bound().erasure(),
            TypeRef::Wildcard { extends_bound, .. } => extends_bound
                .as_deref()
                .map_or_else(TypeRef::object, TypeRef::erasure),
        }
    }
}

impl From<Primitive> for TypeRef {
    fn from(value: Primitive) -> Self {
        TypeRef::Primitive(value)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Class(name) => write!(f, "{name}"),
            TypeRef::Array {
                component,
                dimensions,
            } => {
                write!(f, "{component}")?;
                for _ in 0..*dimensions {
                    f.write_str("[]")?;
                }
                Ok(())
            }
            TypeRef::Parameterized {
                name,
                owner,
                arguments,
            } => {
                match owner {
                    // `Outer<A>.Inner` is printed with the owner's arguments.
                    Some(owner) => {
                        let simple = name.as_str().rsplit_once('$').map_or(name.as_str(), |(_, s)| s);
                        write!(f, "{owner}.{simple}")?;
                    }
                    None => write!(f, "{name}")?,
                }
                if !arguments.is_empty() {
                    f.write_str("<")?;
                    for (i, arg) in arguments.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    f.write_str(">")?;
                }
                Ok(())
            }
            TypeRef::TypeVariable(var) => f.write_str(&var.identifier),
            TypeRef::Wildcard {
                extends_bound,
                super_bound,
            } => match (extends_bound, super_bound) {
                (_, Some(lower)) => write!(f, "? super {lower}"),
                (Some(upper), None) => write!(f, "? extends {upper}"),
                (None, None) => f.write_str("?"),
            },
            TypeRef::Primitive(p) => f.write_str(p.keyword()),
            TypeRef::Void => f.write_str("void"),
        }
    }
}

use std::collections::HashMap;

use crate::ty::{TypeRef, TypeVariable};

/// Maps the type parameters of one class to the arguments supplied by the
/// subtype that reached it.
///
/// Parameters without a supplied argument (raw use) map to their own
/// variable, so they erase to their first bound later on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeBindings {
    map: HashMap<String, TypeRef>,
}

impl TypeBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_parameters(parameters: &[TypeVariable], supplied: &[TypeRef]) -> Self {
        let map = parameters
            .iter()
            .enumerate()
            .map(|(i, param)| {
                let bound = supplied
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| TypeRef::TypeVariable(param.clone()));
                (param.identifier.clone(), bound)
            })
            .collect();
        Self { map }
    }

    pub fn bind(&mut self, identifier: impl Into<String>, ty: TypeRef) {
        self.map.insert(identifier.into(), ty);
    }

    pub fn get(&self, identifier: &str) -> Option<&TypeRef> {
        self.map.get(identifier)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Rewrites `ty` for use one level up the hierarchy.
    ///
    /// Wildcards collapse to their bound (lower bound first) since the
    /// result is used as a concrete argument, not a use-site type.
    pub fn substitute(&self, ty: &TypeRef) -> TypeRef {
        match ty {
            TypeRef::Class(_) | TypeRef::Primitive(_) | TypeRef::Void => ty.clone(),
            TypeRef::Array {
                component,
                dimensions,
            } => TypeRef::array(self.substitute(component), *dimensions),
            TypeRef::TypeVariable(var) => self
                .map
                .get(&var.identifier)
                .cloned()
                .unwrap_or_else(|| ty.clone()),
            TypeRef::Parameterized {
                name,
                owner,
                arguments,
            } => TypeRef::Parameterized {
                name: name.clone(),
                owner: owner.as_deref().map(|o| Box::new(self.substitute(o))),
                arguments: self.substitute_all(arguments),
            },
            TypeRef::Wildcard {
                extends_bound,
                super_bound,
            } => match (super_bound, extends_bound) {
                (Some(lower), _) => self.substitute(lower),
                (None, Some(upper)) => self.substitute(upper),
                (None, None) => TypeRef::object(),
            },
        }
    }

    pub fn substitute_all(&self, types: &[TypeRef]) -> Vec<TypeRef> {
        types.iter().map(|ty| self.substitute(ty)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn var(name: &str) -> TypeRef {
        TypeRef::type_variable(name, vec![])
    }

    #[test]
    fn raw_use_keeps_the_placeholder() {
        let params = vec![
            TypeVariable::new("X", vec![TypeRef::class("com.acme.A")]),
            TypeVariable::unbounded("Y"),
        ];
        let bindings = TypeBindings::for_parameters(&params, &[TypeRef::class("java.lang.Long")]);
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings.get("X"), Some(&TypeRef::class("java.lang.Long")));
        assert_eq!(bindings.get("Y"), Some(&TypeRef::TypeVariable(params[1].clone())));
    }

    #[test]
    fn substitutes_inside_arrays_and_arguments() {
        let mut bindings = TypeBindings::new();
        bindings.bind("T", TypeRef::array(TypeRef::class("java.lang.Integer"), 1));

        let nested = TypeRef::parameterized(
            "java.util.Map",
            vec![var("T"), TypeRef::array(var("T"), 1), var("U")],
        );
        assert_eq!(
            bindings.substitute(&nested),
            TypeRef::parameterized(
                "java.util.Map",
                vec![
                    TypeRef::array(TypeRef::class("java.lang.Integer"), 1),
                    TypeRef::array(TypeRef::class("java.lang.Integer"), 2),
                    var("U"),
                ],
            )
        );
    }

    #[test]
    fn wildcards_collapse_to_a_bound() {
        let mut bindings = TypeBindings::new();
        bindings.bind("T", TypeRef::class("java.lang.String"));

        let both = TypeRef::Wildcard {
            extends_bound: Some(Box::new(TypeRef::class("java.lang.Number"))),
            super_bound: Some(Box::new(var("T"))),
        };
        assert_eq!(bindings.substitute(&both), TypeRef::class("java.lang.String"));
        assert_eq!(
            bindings.substitute(&TypeRef::wildcard_extends(TypeRef::class("java.lang.Number"))),
            TypeRef::class("java.lang.Number")
        );
        assert_eq!(bindings.substitute(&TypeRef::wildcard()), TypeRef::object());
    }
}

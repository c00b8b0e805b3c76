//! Resolution of the type arguments a class binds to a generic ancestor.

use kiln_types::{ClassName, TypeBindings, TypeRef};

use crate::error::ResolveError;
use crate::index::IndexView;
use crate::info::ClassInfo;

/// What to do when a supertype of an indexed class is not in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingClass {
    /// Treat the branch as "not found" and keep searching.
    #[default]
    Skip,
    /// Fail with [`ResolveError::MissingSupertype`].
    Fail,
}

#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a, I: ?Sized> {
    index: &'a I,
    missing: MissingClass,
}

impl<'a, I: IndexView + ?Sized> Resolver<'a, I> {
    pub fn new(index: &'a I) -> Self {
        Self {
            index,
            missing: MissingClass::default(),
        }
    }

    pub fn missing_classes(mut self, policy: MissingClass) -> Self {
        self.missing = policy;
        self
    }

    /// Type arguments bound to `target` when reached from `start`
    /// parameterized with `supplied`.
    ///
    /// Interfaces are searched depth-first in declaration order before the
    /// superclass, and the first match wins. `Ok(None)` means `target` is not
    /// an ancestor (or `start` itself is not indexed). A raw reference to
    /// `target` yields an empty argument list.
    pub fn find_arguments_to_super_type(
        &self,
        start: &ClassName,
        supplied: &[TypeRef],
        target: &ClassName,
    ) -> Result<Option<Vec<TypeRef>>, ResolveError> {
        if start.is_object() {
            return Ok(None);
        }
        let Some(class) = self.index.class_by_name(start.as_str()) else {
            tracing::debug!(
                target = "kiln.index",
                class = %start,
                "class not indexed; nothing to resolve"
            );
            return Ok(None);
        };
        let mut path = Vec::new();
        self.walk(class, supplied, target, &mut path)
    }

    fn walk(
        &self,
        class: &'a ClassInfo,
        supplied: &[TypeRef],
        target: &ClassName,
        path: &mut Vec<&'a ClassName>,
    ) -> Result<Option<Vec<TypeRef>>, ResolveError> {
        if path.contains(&&class.name) {
            return Err(ResolveError::Cycle {
                class: class.name.clone(),
            });
        }
        path.push(&class.name);
        let result = self.walk_supertypes(class, supplied, target, path);
        path.pop();
        result
    }

    fn walk_supertypes(
        &self,
        class: &'a ClassInfo,
        supplied: &[TypeRef],
        target: &ClassName,
        path: &mut Vec<&'a ClassName>,
    ) -> Result<Option<Vec<TypeRef>>, ResolveError> {
        let bindings = TypeBindings::for_parameters(&class.type_parameters, supplied);

        for interface in &class.interfaces {
            let Some(name) = interface.raw_class() else {
                continue;
            };
            let arguments = bindings.substitute_all(interface.arguments());
            if name == target {
                return Ok(Some(arguments));
            }
            if let Some(found) = self.ascend(class, name, &arguments, target, path)? {
                return Ok(Some(found));
            }
        }

        let Some(super_class) = &class.super_class else {
            return Ok(None);
        };
        let Some(super_name) = super_class.raw_class() else {
            return Ok(None);
        };
        let arguments = bindings.substitute_all(super_class.arguments());
        if super_name == target {
            return Ok(Some(arguments));
        }
        self.ascend(class, super_name, &arguments, target, path)
    }

    fn ascend(
        &self,
        from: &ClassInfo,
        name: &ClassName,
        arguments: &[TypeRef],
        target: &ClassName,
        path: &mut Vec<&'a ClassName>,
    ) -> Result<Option<Vec<TypeRef>>, ResolveError> {
        if name.is_object() {
            return Ok(None);
        }
        match self.index.class_by_name(name.as_str()) {
            Some(next) => self.walk(next, arguments, target, path),
            None => match self.missing {
                MissingClass::Skip => {
                    tracing::warn!(
                        target = "kiln.index",
                        class = %from.name,
                        missing = %name,
                        "supertype not indexed; skipping"
                    );
                    Ok(None)
                }
                MissingClass::Fail => Err(ResolveError::MissingSupertype {
                    class: from.name.clone(),
                    missing: name.clone(),
                }),
            },
        }
    }
}

/// [`Resolver::find_arguments_to_super_type`] with default settings.
pub fn find_arguments_to_super_type<I: IndexView + ?Sized>(
    index: &I,
    start: &ClassName,
    supplied: &[TypeRef],
    target: &ClassName,
) -> Result<Option<Vec<TypeRef>>, ResolveError> {
    Resolver::new(index).find_arguments_to_super_type(start, supplied, target)
}

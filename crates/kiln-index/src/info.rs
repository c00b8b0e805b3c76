use kiln_classfile::access::{
    ACC_FINAL, ACC_INTERFACE, ACC_NATIVE, ACC_PUBLIC, ACC_STATIC, ACC_SYNTHETIC,
};
use kiln_classfile::{
    parse_class_signature, parse_field_descriptor, parse_field_signature, parse_method_descriptor,
    parse_method_signature,
};
use kiln_classfile::{ClassFile, ClassMember, RecordComponent};
use kiln_types::{
    from_field_type, from_return_type, method_descriptor, ClassName, TypeRef, TypeVarScope,
    TypeVariable, Unmapped,
};
use serde::{Deserialize, Serialize};

use crate::error::IndexError;

const RECORD: &str = "java.lang.Record";

/// What the index knows about one class or interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: ClassName,
    pub access_flags: u16,
    pub type_parameters: Vec<TypeVariable>,
    /// `None` only for `java.lang.Object`.
    pub super_class: Option<TypeRef>,
    pub interfaces: Vec<TypeRef>,
    pub methods: Vec<MethodInfo>,
    pub annotations: Vec<ClassName>,
    /// Empty unless the class is a record.
    pub record_components: Vec<RecordComponentInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordComponentInfo {
    pub name: String,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub name: String,
    pub access_flags: u16,
    /// Erased descriptor as found in the class file.
    pub descriptor: String,
    pub type_parameters: Vec<TypeVariable>,
    pub parameters: Vec<TypeRef>,
    pub return_type: TypeRef,
    pub parameter_names: Option<Vec<String>>,
    pub annotations: Vec<ClassName>,
}

impl ClassInfo {
    /// A public class extending `java.lang.Object` with nothing declared.
    pub fn new(name: impl Into<ClassName>) -> Self {
        let name = name.into();
        let super_class = (!name.is_object()).then(TypeRef::object);
        Self {
            name,
            access_flags: ACC_PUBLIC,
            type_parameters: Vec::new(),
            super_class,
            interfaces: Vec::new(),
            methods: Vec::new(),
            annotations: Vec::new(),
            record_components: Vec::new(),
        }
    }

    /// A final record class with the given components.
    pub fn record(name: impl Into<ClassName>, components: Vec<RecordComponentInfo>) -> Self {
        let mut info = Self::new(name).extends(TypeRef::class(RECORD));
        info.access_flags |= ACC_FINAL;
        info.record_components = components;
        info
    }

    pub fn interface(name: impl Into<ClassName>) -> Self {
        let mut info = Self::new(name);
        info.access_flags |= ACC_INTERFACE;
        info
    }

    pub fn with_type_parameters(mut self, params: Vec<TypeVariable>) -> Self {
        self.type_parameters = params;
        self
    }

    pub fn extends(mut self, super_class: TypeRef) -> Self {
        self.super_class = Some(super_class);
        self
    }

    pub fn implements(mut self, interface: TypeRef) -> Self {
        self.interfaces.push(interface);
        self
    }

    pub fn with_method(mut self, method: MethodInfo) -> Self {
        self.methods.push(method);
        self
    }

    pub fn annotated(mut self, annotation: impl Into<ClassName>) -> Self {
        self.annotations.push(annotation.into());
        self
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & ACC_INTERFACE != 0
    }

    pub fn is_record(&self) -> bool {
        self.super_name().is_some_and(|s| s.as_str() == RECORD)
    }

    /// The constructor whose parameters are the record components, in order.
    pub fn canonical_constructor(&self) -> Option<&MethodInfo> {
        if !self.is_record() {
            return None;
        }
        let types: Vec<TypeRef> = self.record_components.iter().map(|c| c.ty.clone()).collect();
        self.method("<init>", &types)
    }

    pub fn super_name(&self) -> Option<&ClassName> {
        self.super_class.as_ref().and_then(TypeRef::raw_class)
    }

    pub fn interface_names(&self) -> impl Iterator<Item = &ClassName> {
        self.interfaces.iter().filter_map(TypeRef::raw_class)
    }

    pub fn has_annotation(&self, annotation: &str) -> bool {
        self.annotations.iter().any(|a| a.as_str() == annotation)
    }

    /// Finds a method by name and erased parameter types.
    pub fn method(&self, name: &str, parameters: &[TypeRef]) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| {
            m.name == name
                && m.parameters.len() == parameters.len()
                && m.parameters
                    .iter()
                    .zip(parameters)
                    .all(|(declared, wanted)| declared.erasure() == wanted.erasure())
        })
    }

    pub fn method_by_descriptor(&self, name: &str, descriptor: &str) -> Option<&MethodInfo> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    pub fn from_class_file(class: &ClassFile) -> Result<Self, IndexError> {
        let name = ClassName::new(class.this_class.as_str());
        let cp = &class.constant_pool;

        let (scope, super_class, interfaces) = match class.signature()? {
            Some(sig) => {
                let parsed = parse_class_signature(&sig).map_err(|source| IndexError::Signature {
                    class: name.clone(),
                    source,
                })?;
                let scope = TypeVarScope::for_class(&parsed.type_parameters);
                let super_class = class
                    .super_class
                    .as_ref()
                    .map(|_| scope.class_type(&parsed.super_class));
                let interfaces = parsed
                    .interfaces
                    .iter()
                    .map(|i| scope.class_type(i))
                    .collect();
                (scope, super_class, interfaces)
            }
            None => (
                TypeVarScope::empty(),
                class
                    .super_class
                    .as_deref()
                    .map(|s| TypeRef::Class(ClassName::new(s))),
                class
                    .interfaces
                    .iter()
                    .map(|i| TypeRef::Class(ClassName::new(i.as_str())))
                    .collect(),
            ),
        };

        let record_components = match class.record_components()? {
            Some(components) => components
                .iter()
                .map(|c| record_component(c, &scope, &name))
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let methods = class
            .methods
            .iter()
            .map(|m| MethodInfo::from_member(m, cp, &scope, &name))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            type_parameters: scope.declared().to_vec(),
            access_flags: class.access_flags,
            super_class,
            interfaces,
            methods,
            annotations: annotation_names(class.annotations()?),
            record_components,
            name,
        })
    }
}

impl MethodInfo {
    pub fn new(name: impl Into<String>, parameters: Vec<TypeRef>, return_type: TypeRef) -> Self {
        let descriptor = method_descriptor(&parameters, &return_type, &Unmapped);
        Self {
            name: name.into(),
            access_flags: ACC_PUBLIC,
            descriptor,
            type_parameters: Vec::new(),
            parameters,
            return_type,
            parameter_names: None,
            annotations: Vec::new(),
        }
    }

    pub fn with_flags(mut self, access_flags: u16) -> Self {
        self.access_flags = access_flags;
        self
    }

    pub fn with_type_parameters(mut self, params: Vec<TypeVariable>) -> Self {
        self.type_parameters = params;
        self
    }

    pub fn with_parameter_names(mut self, names: Vec<String>) -> Self {
        self.parameter_names = Some(names);
        self
    }

    pub fn annotated(mut self, annotation: impl Into<ClassName>) -> Self {
        self.annotations.push(annotation.into());
        self
    }

    pub fn has_flags(&self, flags: u16) -> bool {
        self.access_flags & flags == flags
    }

    pub fn is_static(&self) -> bool {
        self.has_flags(ACC_STATIC)
    }

    pub fn is_native(&self) -> bool {
        self.has_flags(ACC_NATIVE)
    }

    pub fn is_synthetic(&self) -> bool {
        self.has_flags(ACC_SYNTHETIC)
    }

    pub fn has_annotation(&self, annotation: &str) -> bool {
        self.annotations.iter().any(|a| a.as_str() == annotation)
    }

    fn from_member(
        member: &ClassMember,
        cp: &kiln_classfile::ConstantPool,
        class_scope: &TypeVarScope,
        owner: &ClassName,
    ) -> Result<Self, IndexError> {
        let erased = parse_method_descriptor(&member.descriptor)?;
        let erased_params: Vec<TypeRef> = erased.params.iter().map(from_field_type).collect();

        // Signatures of inner-class constructors and enum constructors omit
        // synthetic parameters; fall back to the descriptor when counts differ.
        let (type_parameters, parameters, return_type) = match member.signature(cp)? {
            Some(sig) => {
                let parsed = parse_method_signature(&sig).map_err(|source| IndexError::Signature {
                    class: owner.clone(),
                    source,
                })?;
                let scope = class_scope.nested(&parsed.type_parameters);
                let params: Vec<TypeRef> =
                    parsed.parameters.iter().map(|p| scope.type_signature(p)).collect();
                let ret = parsed
                    .return_type
                    .as_ref()
                    .map_or(TypeRef::Void, |r| scope.type_signature(r));
                if params.len() == erased_params.len() {
                    (scope.declared().to_vec(), params, ret)
                } else {
                    (scope.declared().to_vec(), erased_params, ret)
                }
            }
            None => (Vec::new(), erased_params, from_return_type(&erased.return_type)),
        };

        Ok(Self {
            name: member.name.clone(),
            access_flags: member.access_flags,
            descriptor: member.descriptor.clone(),
            type_parameters,
            parameters,
            return_type,
            parameter_names: member.parameter_names(cp)?,
            annotations: annotation_names(member.annotations(cp)?),
        })
    }
}

fn record_component(
    component: &RecordComponent,
    scope: &TypeVarScope,
    owner: &ClassName,
) -> Result<RecordComponentInfo, IndexError> {
    let ty = match &component.signature {
        Some(sig) => {
            let parsed = parse_field_signature(sig).map_err(|source| IndexError::Signature {
                class: owner.clone(),
                source,
            })?;
            scope.type_signature(&parsed)
        }
        None => from_field_type(&parse_field_descriptor(&component.descriptor)?),
    };
    Ok(RecordComponentInfo {
        name: component.name.clone(),
        ty,
    })
}

fn annotation_names(annotations: Vec<kiln_classfile::Annotation>) -> Vec<ClassName> {
    annotations
        .into_iter()
        .filter_map(|a| a.type_internal_name)
        .map(ClassName::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_classfile::{access, Attribute};
    use kiln_types::Primitive;
    use pretty_assertions::assert_eq;

    #[test]
    fn reads_generic_hierarchy_from_class_bytes() {
        let mut class = ClassFile::new(access::ACC_PUBLIC | access::ACC_SUPER, "com/acme/BoundedRepo", Some("java/lang/Object"));
        class.interfaces.push("com/acme/Repo".to_string());
        let sig = Attribute::signature(
            &mut class.constant_pool,
            "<X::Lcom/acme/A;>Ljava/lang/Object;Lcom/acme/Repo<TX;>;",
        )
        .unwrap();
        class.set_attribute(sig);

        let mut find = ClassMember::new(access::ACC_PUBLIC | access::ACC_NATIVE, "find", "(J)Ljava/lang/Object;");
        let msig = Attribute::signature(&mut class.constant_pool, "(J)TX;").unwrap();
        find.set_attribute(msig);
        class.methods.push(find);

        let bytes = class.to_bytes().unwrap();
        let info = ClassInfo::from_class_file(&ClassFile::parse(&bytes).unwrap()).unwrap();

        let x = TypeVariable::new("X", vec![TypeRef::class("com.acme.A")]);
        assert_eq!(info.name, ClassName::new("com.acme.BoundedRepo"));
        assert_eq!(info.type_parameters, vec![x.clone()]);
        assert_eq!(info.super_class, Some(TypeRef::object()));
        assert_eq!(
            info.interfaces,
            vec![TypeRef::parameterized("com.acme.Repo", vec![TypeRef::TypeVariable(x.clone())])]
        );

        let method = info
            .method("find", &[TypeRef::Primitive(Primitive::Long)])
            .unwrap();
        assert!(method.is_native());
        assert_eq!(method.return_type, TypeRef::TypeVariable(x));
        assert_eq!(method.descriptor, "(J)Ljava/lang/Object;");
    }

    #[test]
    fn method_lookup_compares_erasures() {
        let t = TypeRef::type_variable("T", vec![TypeRef::class("java.lang.Number")]);
        let info = ClassInfo::new("com.acme.Box").with_method(MethodInfo::new(
            "put",
            vec![t, TypeRef::parameterized("java.util.List", vec![TypeRef::class("java.lang.String")])],
            TypeRef::Void,
        ));
        assert!(info
            .method("put", &[TypeRef::class("java.lang.Number"), TypeRef::class("java.util.List")])
            .is_some());
        assert!(info.method("put", &[TypeRef::class("java.lang.Number")]).is_none());
        assert!(info
            .method_by_descriptor("put", "(Ljava/lang/Number;Ljava/util/List;)V")
            .is_some());
    }

    #[test]
    fn record_components_locate_the_canonical_constructor() {
        let mut class = ClassFile::new(access::ACC_FINAL | access::ACC_SUPER, "com/acme/Hello", Some("java/lang/Record"));
        let record = Attribute::record(
            &mut class.constant_pool,
            &[
                RecordComponent {
                    name: "name".into(),
                    descriptor: "Ljava/lang/String;".into(),
                    signature: None,
                },
                RecordComponent {
                    name: "count".into(),
                    descriptor: "I".into(),
                    signature: None,
                },
            ],
        )
        .unwrap();
        class.set_attribute(record);
        class.methods.push(ClassMember::new(access::ACC_PUBLIC, "<init>", "(Ljava/lang/String;)V"));
        class.methods.push(ClassMember::new(access::ACC_PUBLIC, "<init>", "(Ljava/lang/String;I)V"));

        let info = ClassInfo::from_class_file(&class).unwrap();
        assert!(info.is_record());
        assert_eq!(info.record_components[1].ty, TypeRef::Primitive(Primitive::Int));
        assert_eq!(
            info.canonical_constructor().map(|m| m.descriptor.as_str()),
            Some("(Ljava/lang/String;I)V")
        );
        assert!(ClassInfo::new("com.acme.Plain").canonical_constructor().is_none());
    }
}

//! Delegating bodies for native query methods on entities and repositories,
//! and `@GenerateBridge` bridges on repositories.

use kiln_classfile::access::{
    ACC_ABSTRACT, ACC_BRIDGE, ACC_NATIVE, ACC_PUBLIC, ACC_STATIC, ACC_SYNTHETIC, ACC_VARARGS,
};
use kiln_classfile::{parse_method_descriptor, ClassFile, ClassMember};
use kiln_config::{Accessor, PanacheConfig};
use kiln_index::{ClassInfo, MethodInfo};
use kiln_types::{
    has_unsupported_shape, method_descriptor, method_signature, to_descriptor, to_signature,
    ClassName, TypeRef, Unmapped,
};

use crate::dispatch::{apply_rule, install, ClassEnhancer, EnhanceContext, MemberRule};
use crate::error::EnhanceError;
use crate::plan::{
    class_operand, BodyPlan, Delegation, InvokeKind, Leading, MethodRef, SynthesizedMethod,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Receiver {
    /// Static entity methods; the accessor is a static method on the entity.
    Entity,
    /// Instance repository methods; the accessor is inherited.
    Repository,
}

/// Forwards native query methods to `<Owner><suffix>.<name>(session, args...)`.
struct DelegatingRule<'c> {
    receiver: Receiver,
    config: &'c PanacheConfig,
    accessor: Accessor,
}

impl<'c> DelegatingRule<'c> {
    fn new(receiver: Receiver, config: &'c PanacheConfig) -> Self {
        Self {
            receiver,
            config,
            accessor: config.accessor(),
        }
    }
}

impl MemberRule for DelegatingRule<'_> {
    fn is_candidate(&self, member: &ClassMember) -> bool {
        member.has_flags(ACC_PUBLIC | ACC_NATIVE)
            && !member.has_flags(ACC_SYNTHETIC)
            && member.has_flags(ACC_STATIC) == (self.receiver == Receiver::Entity)
    }

    fn qualifies(&self, method: &MethodInfo) -> bool {
        method
            .annotations
            .iter()
            .any(|a| self.config.is_query_annotation(a.as_str()))
    }

    fn plan(
        &self,
        class: &ClassInfo,
        method: &MethodInfo,
        member: &ClassMember,
    ) -> Result<SynthesizedMethod, EnhanceError> {
        let owner = class.name.internal_name();
        let accessor_kind = match self.receiver {
            Receiver::Entity => InvokeKind::Static,
            Receiver::Repository => InvokeKind::Virtual,
        };
        let accessor = MethodRef::new(
            accessor_kind,
            owner.as_str(),
            self.accessor.name.as_str(),
            self.accessor.method_descriptor(),
        );
        let target = MethodRef::new(
            InvokeKind::Static,
            format!("{owner}{}", self.config.metamodel_suffix),
            member.name.as_str(),
            format!("({}{}", self.accessor.descriptor, &member.descriptor[1..]),
        );
        Ok(SynthesizedMethod {
            owner: class.name.clone(),
            access_flags: member.access_flags,
            name: member.name.clone(),
            descriptor: member.descriptor.clone(),
            signature: None,
            parameter_names: method.parameter_names.clone(),
            body: BodyPlan::Delegate(Delegation {
                load_receiver: false,
                leading: Some(Leading::Accessor(accessor)),
                argument_casts: Vec::new(),
                target,
                return_cast: None,
            }),
        })
    }
}

/// Implements native static query methods of entity classes.
#[derive(Debug, Default)]
pub struct EntityEnhancer;

impl ClassEnhancer for EntityEnhancer {
    fn name(&self) -> &str {
        "panache-entity"
    }

    fn enhance(&self, cx: &EnhanceContext<'_>, class: &mut ClassFile) -> Result<(), EnhanceError> {
        let info = cx.class_info(&class.this_class)?;
        let rule = DelegatingRule::new(Receiver::Entity, &cx.config.panache);
        let count = apply_rule(&rule, class, info)?;
        tracing::debug!(target = "kiln.enhance", class = %info.name, count, "enhanced entity");
        Ok(())
    }
}

/// Implements native query methods of repositories and adds the contract's
/// bridge methods.
#[derive(Debug, Default)]
pub struct RepositoryEnhancer;

impl ClassEnhancer for RepositoryEnhancer {
    fn name(&self) -> &str {
        "panache-repository"
    }

    fn enhance(&self, cx: &EnhanceContext<'_>, class: &mut ClassFile) -> Result<(), EnhanceError> {
        let info = cx.class_info(&class.this_class)?;
        let rule = DelegatingRule::new(Receiver::Repository, &cx.config.panache);
        let count = apply_rule(&rule, class, info)?;
        let bridges = plan_bridges(cx, info)?;
        let bridge_count = bridges.len();
        install(class, bridges)?;
        tracing::debug!(
            target = "kiln.enhance",
            class = %info.name,
            count,
            bridges = bridge_count,
            "enhanced repository"
        );
        Ok(())
    }
}

/// Bridge methods `repository` needs for every `@GenerateBridge` method of
/// the repository contract it does not declare itself.
pub fn plan_bridges(
    cx: &EnhanceContext<'_>,
    repository: &ClassInfo,
) -> Result<Vec<SynthesizedMethod>, EnhanceError> {
    let config = &cx.config.panache;
    if repository.is_interface() || repository.access_flags & ACC_ABSTRACT != 0 {
        return Ok(Vec::new());
    }
    let contract_name = ClassName::new(config.repository_contract.as_str());
    let Some(contract) = cx.index.class_by_name(contract_name.as_str()) else {
        tracing::debug!(
            target = "kiln.enhance",
            contract = %contract_name,
            "repository contract not indexed; no bridges"
        );
        return Ok(Vec::new());
    };

    let bridged: Vec<&MethodInfo> = contract
        .methods
        .iter()
        .filter(|m| !m.is_static() && m.has_annotation(&config.generate_bridge_annotation))
        .collect();
    if bridged.is_empty() {
        return Ok(Vec::new());
    }

    let unresolvable = |reason: String| EnhanceError::UnresolvableTypeArgument {
        class: repository.name.clone(),
        contract: contract_name.clone(),
        reason,
    };
    let arguments = cx
        .resolver()
        .find_arguments_to_super_type(&repository.name, &[], &contract_name)?
        .ok_or_else(|| unresolvable("not an implementor".to_owned()))?;
    if arguments.len() != contract.type_parameters.len() {
        return Err(unresolvable(format!(
            "expected {} type arguments, found {}",
            contract.type_parameters.len(),
            arguments.len()
        )));
    }
    if let Some(TypeRef::TypeVariable(var)) = arguments
        .iter()
        .find(|a| matches!(a, TypeRef::TypeVariable(_)))
    {
        return Err(unresolvable(format!(
            "type argument {} is not concrete",
            var.identifier
        )));
    }
    let Some(entity) = arguments.first() else {
        return Err(unresolvable("contract declares no type parameters".to_owned()));
    };
    let entity_literal = class_operand(&to_descriptor(entity, &Unmapped));

    let position = |identifier: &str| {
        contract
            .type_parameters
            .iter()
            .position(|p| p.identifier == identifier)
    };
    let erased = |identifier: &str| position(identifier).map(|i| to_descriptor(&arguments[i], &Unmapped));
    let generic = |identifier: &str| position(identifier).map(|i| to_signature(&arguments[i], &Unmapped));
    let is_interface = |bound: &TypeRef| {
        bound
            .raw_class()
            .is_some_and(|name| cx.index.is_interface(name.as_str()))
    };

    let owner = repository.name.internal_name();
    let operations = ClassName::new(config.operations_class.as_str()).internal_name();
    let mut planned = Vec::new();
    for method in bridged {
        let mapped = method_descriptor(&method.parameters, &method.return_type, &erased);
        if repository.method_by_descriptor(&method.name, &mapped).is_some() {
            continue;
        }
        if method
            .parameters
            .iter()
            .chain(std::iter::once(&method.return_type))
            .any(has_unsupported_shape)
        {
            tracing::warn!(
                target = "kiln.enhance",
                class = %repository.name,
                method = %method.name,
                "bridge signature approximated"
            );
        }
        let signature = method_signature(
            &method.type_parameters,
            &method.parameters,
            &method.return_type,
            &generic,
            is_interface,
        );

        let mapped_desc = parse_method_descriptor(&mapped)?;
        let erased_desc = parse_method_descriptor(&method.descriptor)?;
        let mapped_return = mapped_desc.return_type.descriptor();
        let return_cast = (mapped_return != erased_desc.return_type.descriptor()
            && (mapped_return.starts_with('L') || mapped_return.starts_with('[')))
        .then(|| class_operand(&mapped_return));

        planned.push(SynthesizedMethod {
            owner: repository.name.clone(),
            access_flags: ACC_PUBLIC | (method.access_flags & ACC_VARARGS),
            name: method.name.clone(),
            descriptor: mapped.clone(),
            signature: (signature != mapped).then_some(signature),
            parameter_names: method.parameter_names.clone(),
            body: BodyPlan::Delegate(Delegation {
                load_receiver: false,
                leading: Some(Leading::ClassLiteral(entity_literal.clone())),
                argument_casts: Vec::new(),
                target: MethodRef::new(
                    InvokeKind::Static,
                    operations.as_str(),
                    method.name.as_str(),
                    format!("(Ljava/lang/Class;{}", &method.descriptor[1..]),
                ),
                return_cast,
            }),
        });

        // Callers compiled against the contract invoke the erased descriptor.
        if mapped != method.descriptor
            && repository
                .method_by_descriptor(&method.name, &method.descriptor)
                .is_none()
        {
            let casts = mapped_desc
                .params
                .iter()
                .zip(&erased_desc.params)
                .map(|(to, from)| {
                    let to = to.descriptor();
                    (to != from.descriptor()).then(|| class_operand(&to))
                })
                .collect();
            planned.push(SynthesizedMethod {
                owner: repository.name.clone(),
                access_flags: ACC_PUBLIC | ACC_BRIDGE | ACC_SYNTHETIC,
                name: method.name.clone(),
                descriptor: method.descriptor.clone(),
                signature: None,
                parameter_names: None,
                body: BodyPlan::Delegate(Delegation {
                    load_receiver: true,
                    leading: None,
                    argument_casts: casts,
                    target: MethodRef::new(
                        InvokeKind::Virtual,
                        owner.as_str(),
                        method.name.as_str(),
                        mapped.as_str(),
                    ),
                    return_cast: None,
                }),
            });
        }
    }
    Ok(planned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_config::KilnConfig;
    use kiln_index::{Index, Indexer};
    use kiln_types::TypeVariable;
    use pretty_assertions::assert_eq;

    const CONTRACT: &str = "io.quarkus.hibernate.orm.panache.PanacheRepositoryBase";
    const BRIDGE: &str = "io.quarkus.panache.common.impl.GenerateBridge";

    fn contract() -> ClassInfo {
        let entity = TypeRef::type_variable("Entity", vec![TypeRef::object()]);
        let id = TypeRef::type_variable("Id", vec![TypeRef::object()]);
        ClassInfo::interface(CONTRACT)
            .with_type_parameters(vec![
                TypeVariable::new("Entity", vec![TypeRef::object()]),
                TypeVariable::new("Id", vec![TypeRef::object()]),
            ])
            .with_method(
                MethodInfo::new("findById", vec![id], entity)
                    .with_flags(ACC_PUBLIC)
                    .with_parameter_names(vec!["id".into()])
                    .annotated(BRIDGE),
            )
            .with_method(
                MethodInfo::new("count", Vec::new(), TypeRef::Primitive(kiln_types::Primitive::Long))
                    .with_flags(ACC_PUBLIC)
                    .annotated(BRIDGE),
            )
            .with_method(MethodInfo::new("flush", Vec::new(), TypeRef::Void).with_flags(ACC_PUBLIC))
    }

    fn index_with(repository: ClassInfo) -> Index {
        let mut indexer = Indexer::new();
        indexer.add(contract());
        indexer.add(ClassInfo::new("t.Book"));
        indexer.add(repository);
        indexer.complete()
    }

    fn book_repository() -> ClassInfo {
        ClassInfo::new("t.BookRepository").implements(TypeRef::parameterized(
            CONTRACT,
            vec![TypeRef::class("t.Book"), TypeRef::class("java.lang.Long")],
        ))
    }

    #[test]
    fn bridges_use_resolved_arguments() {
        let index = index_with(book_repository());
        let config = KilnConfig::default();
        let cx = EnhanceContext::new(&index, &config);
        let repo = cx.class_info("t.BookRepository").unwrap();

        let bridges = plan_bridges(&cx, repo).unwrap();
        let shapes: Vec<(&str, &str, u16)> = bridges
            .iter()
            .map(|b| (b.name.as_str(), b.descriptor.as_str(), b.access_flags))
            .collect();
        assert_eq!(
            shapes,
            vec![
                ("findById", "(Ljava/lang/Long;)Lt/Book;", ACC_PUBLIC),
                (
                    "findById",
                    "(Ljava/lang/Object;)Ljava/lang/Object;",
                    ACC_PUBLIC | ACC_BRIDGE | ACC_SYNTHETIC
                ),
                ("count", "()J", ACC_PUBLIC),
            ]
        );

        let BodyPlan::Delegate(typed) = &bridges[0].body else {
            panic!("expected a delegating body");
        };
        assert_eq!(typed.leading, Some(Leading::ClassLiteral("t/Book".into())));
        assert_eq!(
            typed.target.descriptor,
            "(Ljava/lang/Class;Ljava/lang/Object;)Ljava/lang/Object;"
        );
        assert_eq!(typed.target.owner, "io/quarkus/hibernate/orm/panache/runtime/JpaOperations");
        assert_eq!(typed.return_cast.as_deref(), Some("t/Book"));
        assert_eq!(bridges[0].parameter_names, Some(vec!["id".to_string()]));

        let BodyPlan::Delegate(erased) = &bridges[1].body else {
            panic!("expected a delegating body");
        };
        assert!(erased.load_receiver);
        assert_eq!(erased.argument_casts, vec![Some("java/lang/Long".to_string())]);
        assert_eq!(erased.target.descriptor, "(Ljava/lang/Long;)Lt/Book;");
    }

    #[test]
    fn declared_methods_are_not_bridged() {
        let repo = book_repository().with_method(
            MethodInfo::new("count", Vec::new(), TypeRef::Primitive(kiln_types::Primitive::Long))
                .with_flags(ACC_PUBLIC),
        );
        let index = index_with(repo);
        let config = KilnConfig::default();
        let cx = EnhanceContext::new(&index, &config);

        let bridges = plan_bridges(&cx, cx.class_info("t.BookRepository").unwrap()).unwrap();
        assert!(bridges.iter().all(|b| b.name != "count"));
    }

    #[test]
    fn generic_repository_argument_is_rejected() {
        let repo = ClassInfo::new("t.BookRepository")
            .with_type_parameters(vec![TypeVariable::unbounded("E")])
            .implements(TypeRef::parameterized(
                CONTRACT,
                vec![
                    TypeRef::type_variable("E", vec![TypeRef::object()]),
                    TypeRef::class("java.lang.Long"),
                ],
            ));
        let index = index_with(repo);
        let config = KilnConfig::default();
        let cx = EnhanceContext::new(&index, &config);

        let err = plan_bridges(&cx, cx.class_info("t.BookRepository").unwrap()).unwrap_err();
        assert!(
            matches!(err, EnhanceError::UnresolvableTypeArgument { .. }),
            "{err:?}"
        );
        assert!(err.to_string().contains("t.BookRepository"), "{err}");
    }

    #[test]
    fn raw_repository_has_arity_mismatch() {
        let index = index_with(ClassInfo::new("t.BookRepository").implements(TypeRef::class(CONTRACT)));
        let config = KilnConfig::default();
        let cx = EnhanceContext::new(&index, &config);

        let err = plan_bridges(&cx, cx.class_info("t.BookRepository").unwrap()).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!(
                "cannot resolve type arguments of t.BookRepository for {CONTRACT}: expected 2 type arguments, found 0"
            )
        );
    }
}

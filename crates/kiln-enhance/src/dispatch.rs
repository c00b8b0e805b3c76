//! Per-class member dispatch and installation of synthesized methods.

use std::collections::HashSet;

use kiln_classfile::access::{ACC_ABSTRACT, ACC_NATIVE};
use kiln_classfile::{parse_method_descriptor, Attribute, ClassFile, ClassMember};
use kiln_config::{KilnConfig, MissingSupertypes};
use kiln_index::{ClassInfo, IndexView, MethodInfo, MissingClass, Resolver};
use kiln_types::{from_field_type, ClassName, TypeRef};

use crate::error::EnhanceError;
use crate::plan::SynthesizedMethod;
use crate::render::render;

/// Shared, read-only inputs of one build.
#[derive(Clone, Copy)]
pub struct EnhanceContext<'a> {
    pub index: &'a (dyn IndexView + Sync),
    pub config: &'a KilnConfig,
}

impl<'a> EnhanceContext<'a> {
    pub fn new(index: &'a (dyn IndexView + Sync), config: &'a KilnConfig) -> Self {
        Self { index, config }
    }

    /// A resolver honouring the configured missing-supertype policy.
    pub fn resolver(&self) -> Resolver<'a, dyn IndexView + Sync + 'a> {
        let policy = match self.config.index.missing_supertypes {
            MissingSupertypes::Skip => MissingClass::Skip,
            MissingSupertypes::Fail => MissingClass::Fail,
        };
        Resolver::new(self.index).missing_classes(policy)
    }

    /// Looks up a class by binary or internal name.
    pub fn class_info(&self, name: &str) -> Result<&'a ClassInfo, EnhanceError> {
        let name = ClassName::new(name);
        self.index
            .class_by_name(name.as_str())
            .ok_or(EnhanceError::ClassNotIndexed { class: name })
    }
}

/// Rewrites one class in place.
pub trait ClassEnhancer: Send + Sync {
    fn name(&self) -> &str;
    fn enhance(&self, cx: &EnhanceContext<'_>, class: &mut ClassFile) -> Result<(), EnhanceError>;
}

/// Decides, member by member, what a [`Dispatcher`] synthesizes.
pub trait MemberRule {
    /// Shape test on the raw member (flags only).
    fn is_candidate(&self, member: &ClassMember) -> bool;

    /// Whether the indexed method should get a body.
    fn qualifies(&self, method: &MethodInfo) -> bool;

    fn plan(
        &self,
        class: &ClassInfo,
        method: &MethodInfo,
        member: &ClassMember,
    ) -> Result<SynthesizedMethod, EnhanceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Scanning,
    Qualifying,
    ConditionCheck,
    Done,
}

/// Walks the methods of one class, strips `native` from every qualifying
/// member and queues a body for it.
pub struct Dispatcher<'r, R: ?Sized> {
    rule: &'r R,
    state: DispatchState,
    queued: Vec<SynthesizedMethod>,
}

impl<'r, R: MemberRule + ?Sized> Dispatcher<'r, R> {
    pub fn new(rule: &'r R) -> Self {
        Self {
            rule,
            state: DispatchState::Scanning,
            queued: Vec::new(),
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn visit_class(
        mut self,
        class: &mut ClassFile,
        info: &ClassInfo,
    ) -> Result<Vec<SynthesizedMethod>, EnhanceError> {
        for member in &mut class.methods {
            self.visit_member(member, info)?;
        }
        self.state = DispatchState::Done;
        Ok(self.queued)
    }

    fn visit_member(&mut self, member: &mut ClassMember, info: &ClassInfo) -> Result<(), EnhanceError> {
        if !self.rule.is_candidate(member) {
            return Ok(());
        }

        self.state = DispatchState::Qualifying;
        let desc = parse_method_descriptor(&member.descriptor)?;
        let arg_types: Vec<TypeRef> = desc.params.iter().map(from_field_type).collect();
        let method = info
            .method(&member.name, &arg_types)
            .ok_or_else(|| EnhanceError::MissingIndexedMethod {
                class: info.name.clone(),
                method: member.name.clone(),
                descriptor: member.descriptor.clone(),
                arg_types: arg_types
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            })?;

        self.state = DispatchState::ConditionCheck;
        if self.rule.qualifies(method) {
            member.access_flags &= !ACC_NATIVE;
            let planned = self.rule.plan(info, method, member)?;
            tracing::debug!(
                target = "kiln.enhance",
                class = %info.name,
                method = %member.name,
                descriptor = %member.descriptor,
                "queued synthesized body"
            );
            self.queued.push(planned);
        }
        self.state = DispatchState::Scanning;
        Ok(())
    }
}

/// Dispatches `rule` over `class` and installs what it queued.
pub fn apply_rule<R: MemberRule + ?Sized>(
    rule: &R,
    class: &mut ClassFile,
    info: &ClassInfo,
) -> Result<usize, EnhanceError> {
    let queued = Dispatcher::new(rule).visit_class(class, info)?;
    let count = queued.len();
    install(class, queued)?;
    Ok(count)
}

/// Gives every planned method its body: existing members (same name and
/// descriptor) are filled in, the rest are appended. Two plans for the same
/// member in one batch are a `DuplicateMember` error.
pub fn install(class: &mut ClassFile, methods: Vec<SynthesizedMethod>) -> Result<(), EnhanceError> {
    let mut planned = HashSet::new();
    for method in &methods {
        if !planned.insert((method.name.as_str(), method.descriptor.as_str())) {
            return Err(EnhanceError::DuplicateMember {
                class: ClassName::new(class.this_class.as_str()),
                member: format!("{}{}", method.name, method.descriptor),
            });
        }
    }
    for method in methods {
        let code = render(&method, &mut class.constant_pool)?;
        let cp = &mut class.constant_pool;
        let position = class
            .methods
            .iter()
            .position(|m| m.name == method.name && m.descriptor == method.descriptor);
        let member = match position {
            Some(i) => {
                let member = &mut class.methods[i];
                member.access_flags &= !(ACC_NATIVE | ACC_ABSTRACT);
                member
            }
            None => {
                let mut member =
                    ClassMember::new(method.access_flags, method.name.as_str(), method.descriptor.as_str());
                if let Some(signature) = &method.signature {
                    member.set_attribute(Attribute::signature(cp, signature)?);
                }
                class.methods.push(member);
                let last = class.methods.len() - 1;
                &mut class.methods[last]
            }
        };
        member.set_code(cp, &code)?;
        if let Some(names) = &method.parameter_names {
            member.set_attribute(Attribute::method_parameters(cp, names)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{BodyPlan, Delegation, InvokeKind, MethodRef};
    use kiln_classfile::access::{ACC_PUBLIC, ACC_SUPER};
    use kiln_types::Primitive;

    /// Forwards every native `int` method to a static helper.
    struct ForwardNatives;

    impl MemberRule for ForwardNatives {
        fn is_candidate(&self, member: &ClassMember) -> bool {
            member.has_flags(ACC_NATIVE)
        }

        fn qualifies(&self, method: &MethodInfo) -> bool {
            method.return_type == TypeRef::Primitive(Primitive::Int)
        }

        fn plan(
            &self,
            class: &ClassInfo,
            method: &MethodInfo,
            member: &ClassMember,
        ) -> Result<SynthesizedMethod, EnhanceError> {
            Ok(SynthesizedMethod {
                owner: class.name.clone(),
                access_flags: member.access_flags,
                name: method.name.clone(),
                descriptor: member.descriptor.clone(),
                signature: None,
                parameter_names: method.parameter_names.clone(),
                body: BodyPlan::Delegate(Delegation {
                    load_receiver: false,
                    leading: None,
                    argument_casts: Vec::new(),
                    target: MethodRef::new(InvokeKind::Static, "t/Helper", "count", "()I"),
                    return_cast: None,
                }),
            })
        }
    }

    fn class_with(methods: &[(&str, &str)]) -> ClassFile {
        let mut class = ClassFile::new(ACC_PUBLIC | ACC_SUPER, "t/Counter", Some("java/lang/Object"));
        for (name, desc) in methods {
            class
                .methods
                .push(ClassMember::new(ACC_PUBLIC | ACC_NATIVE, *name, *desc));
        }
        class
    }

    #[test]
    fn qualifying_members_lose_native_and_get_code() {
        let mut class = class_with(&[("count", "()I"), ("label", "()Ljava/lang/String;")]);
        let info = ClassInfo::from_class_file(&class).unwrap();

        let installed = apply_rule(&ForwardNatives, &mut class, &info).unwrap();
        assert_eq!(installed, 1);

        let count = class.method("count", "()I").unwrap();
        assert!(!count.has_flags(ACC_NATIVE));
        assert!(count.code(&class.constant_pool).unwrap().is_some());

        let label = class.method("label", "()Ljava/lang/String;").unwrap();
        assert!(label.has_flags(ACC_NATIVE));
        assert!(label.attribute("Code").is_none());
    }

    #[test]
    fn unindexed_native_member_is_fatal() {
        let mut class = class_with(&[("count", "(J)I")]);
        let info = ClassInfo::new("t.Counter");

        let err = Dispatcher::new(&ForwardNatives)
            .visit_class(&mut class, &info)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Could not find indexed method: t.Counter.count with descriptor (J)I and arg types [long]"
        );
    }

    #[test]
    fn empty_class_queues_nothing() {
        let mut class = class_with(&[]);
        let info = ClassInfo::from_class_file(&class).unwrap();
        let dispatcher = Dispatcher::new(&ForwardNatives);
        assert_eq!(dispatcher.state(), DispatchState::Scanning);
        assert!(dispatcher.visit_class(&mut class, &info).unwrap().is_empty());
    }

    #[test]
    fn install_rejects_two_plans_for_one_member() {
        let mut class = class_with(&[]);
        let info = ClassInfo::from_class_file(&class_with(&[("count", "()I")])).unwrap();
        let member = ClassMember::new(ACC_PUBLIC | ACC_NATIVE, "count", "()I");
        let method = &info.methods[0];
        let first = ForwardNatives.plan(&info, method, &member).unwrap();
        let second = ForwardNatives.plan(&info, method, &member).unwrap();

        let err = install(&mut class, vec![first, second]).unwrap_err();
        assert_eq!(err.to_string(), "t.Counter.count()I already exists");
        assert!(class.methods.is_empty());
    }
}

//! Build-scoped registry of context storage slots and the `ThreadLocal`
//! subclasses generated for them.

use std::collections::BTreeMap;

use kiln_classfile::access::{ACC_ABSTRACT, ACC_BRIDGE, ACC_PUBLIC, ACC_SUPER, ACC_SYNTHETIC};
use kiln_classfile::opcodes::{ALOAD, INVOKESPECIAL, RETURN};
use kiln_classfile::{Attribute, ClassFile, ClassMember, CodeBuilder};
use kiln_types::{to_descriptor, to_signature, ClassName, TypeRef, Unmapped};

use crate::dispatch::{install, EnhanceContext};
use crate::error::EnhanceError;
use crate::plan::{
    class_operand, BodyPlan, Delegation, InvokeKind, MethodRef, SlotAccess, SlotOperation,
    SynthesizedMethod,
};

const THREAD_LOCAL: &str = "java/lang/ThreadLocal";
const OBJECT_DESCRIPTOR: &str = "Ljava/lang/Object;";

/// One storage declaration and the slot it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSlot {
    pub declaration: ClassName,
    pub slot: u32,
    /// Generated `ThreadLocal` subclass serving this slot.
    pub generated: ClassName,
    pub value_type: TypeRef,
}

impl StorageSlot {
    /// Erased descriptor of the stored value.
    pub fn value_descriptor(&self) -> String {
        to_descriptor(&self.value_type, &Unmapped)
    }

    pub fn value_signature(&self) -> String {
        to_signature(&self.value_type, &Unmapped)
    }
}

/// Dense slot numbers for every storage declaration known to one build.
#[derive(Debug, Clone, Default)]
pub struct StorageRegistry {
    slots: Vec<StorageSlot>,
    thread_class: String,
    context_method: String,
}

impl StorageRegistry {
    /// Assigns slots in the order of `all_known_implementors` (by class
    /// name) and resolves each declaration's stored type.
    pub fn build(cx: &EnhanceContext<'_>) -> Result<Self, EnhanceError> {
        let config = &cx.config.storage;
        let declaration = ClassName::new(config.declaration.as_str());
        let resolver = cx.resolver();

        let mut slots: Vec<StorageSlot> = Vec::new();
        for class in cx.index.all_known_implementors(declaration.as_str()) {
            if class.access_flags & ACC_ABSTRACT != 0 {
                tracing::debug!(
                    target = "kiln.storage",
                    declaration = %class.name,
                    "abstract storage declaration; no slot"
                );
                continue;
            }
            let invalid = || EnhanceError::StorageValidation {
                class: class.name.clone(),
            };
            let arguments = resolver
                .find_arguments_to_super_type(&class.name, &[], &declaration)?
                .ok_or_else(invalid)?;
            let [value_type] = arguments.as_slice() else {
                return Err(invalid());
            };
            if matches!(value_type, TypeRef::TypeVariable(_)) {
                return Err(invalid());
            }
            let slot = u32::try_from(slots.len()).map_err(|_| invalid())?;
            let generated = ClassName::new(format!("{}{slot}", config.class_name_prefix));
            tracing::debug!(
                target = "kiln.storage",
                declaration = %class.name,
                slot,
                generated = %generated,
                "assigned storage slot"
            );
            slots.push(StorageSlot {
                declaration: class.name.clone(),
                slot,
                generated,
                value_type: value_type.clone(),
            });
        }

        Ok(Self {
            slots,
            thread_class: ClassName::new(config.thread_class.as_str()).internal_name(),
            context_method: config.context_method.clone(),
        })
    }

    pub fn slots(&self) -> &[StorageSlot] {
        &self.slots
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slot_of(&self, declaration: &str) -> Option<&StorageSlot> {
        self.slots
            .iter()
            .find(|s| s.declaration.as_str() == declaration)
    }

    /// Declaration class → generated `ThreadLocal` class.
    pub fn mappings(&self) -> BTreeMap<ClassName, ClassName> {
        self.slots
            .iter()
            .map(|s| (s.declaration.clone(), s.generated.clone()))
            .collect()
    }

    /// One `ThreadLocal` subclass per slot.
    pub fn generate_shims(&self) -> Result<Vec<(ClassName, ClassFile)>, EnhanceError> {
        self.slots
            .iter()
            .map(|slot| Ok((slot.generated.clone(), self.generate_shim(slot)?)))
            .collect()
    }

    fn generate_shim(&self, slot: &StorageSlot) -> Result<ClassFile, EnhanceError> {
        let name = slot.generated.internal_name();
        let value_desc = slot.value_descriptor();
        let value_sig = slot.value_signature();
        let value_operand = class_operand(&value_desc);

        let mut class = ClassFile::new(ACC_PUBLIC | ACC_SUPER, &name, Some(THREAD_LOCAL));
        let signature = Attribute::signature(
            &mut class.constant_pool,
            &format!("L{THREAD_LOCAL}<{value_sig}>;"),
        )?;
        class.set_attribute(signature);

        let mut init = ClassMember::new(ACC_PUBLIC, "<init>", "()V");
        let mut code = CodeBuilder::new(&mut class.constant_pool, 1);
        code.var_insn(ALOAD, 0)?;
        code.invoke(INVOKESPECIAL, THREAD_LOCAL, "<init>", "()V", false)?;
        code.insn(RETURN)?;
        let code = code.finish()?;
        init.set_code(&mut class.constant_pool, &code)?;
        class.methods.push(init);

        let access = |operation| {
            BodyPlan::Slot(SlotAccess {
                operation,
                slot: slot.slot,
                value_type: value_operand.clone(),
                thread_class: self.thread_class.clone(),
                context_method: self.context_method.clone(),
            })
        };
        let method = |access_flags, name: &str, descriptor: String, signature, body| SynthesizedMethod {
            owner: slot.generated.clone(),
            access_flags,
            name: name.to_owned(),
            descriptor,
            signature,
            parameter_names: None,
            body,
        };
        let get = format!("(){value_desc}");
        let set = format!("({value_desc})V");
        let bridge = ACC_PUBLIC | ACC_BRIDGE | ACC_SYNTHETIC;

        // An `Object` value already has the erased descriptors, so the typed
        // methods are the overrides and need no bridges.
        let erased = value_desc == OBJECT_DESCRIPTOR;
        let mut methods = vec![method(
            ACC_PUBLIC,
            "get",
            get.clone(),
            Some(format!("(){value_sig}")),
            access(SlotOperation::Get),
        )];
        if !erased {
            methods.push(method(
                bridge,
                "get",
                format!("(){OBJECT_DESCRIPTOR}"),
                None,
                BodyPlan::Delegate(Delegation {
                    load_receiver: true,
                    leading: None,
                    argument_casts: Vec::new(),
                    target: MethodRef::new(InvokeKind::Virtual, name.as_str(), "get", get),
                    return_cast: None,
                }),
            ));
        }
        methods.push(method(
            ACC_PUBLIC,
            "set",
            set.clone(),
            Some(format!("({value_sig})V")),
            access(SlotOperation::Set),
        ));
        if !erased {
            methods.push(method(
                bridge,
                "set",
                format!("({OBJECT_DESCRIPTOR})V"),
                None,
                BodyPlan::Delegate(Delegation {
                    load_receiver: true,
                    leading: None,
                    argument_casts: vec![Some(value_operand.clone())],
                    target: MethodRef::new(InvokeKind::Virtual, name.as_str(), "set", set),
                    return_cast: None,
                }),
            ));
        }
        methods.push(method(
            ACC_PUBLIC,
            "remove",
            "()V".to_owned(),
            None,
            access(SlotOperation::Remove),
        ));
        install(&mut class, methods)?;
        Ok(class)
    }
}

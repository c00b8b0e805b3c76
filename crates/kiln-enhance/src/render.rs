//! Turns [`BodyPlan`]s into `Code` attributes.

use kiln_classfile::opcodes::{
    AALOAD, AASTORE, ACONST_NULL, ALOAD, ANEWARRAY, ARETURN, ASTORE, CHECKCAST, DUP_X1, IFEQ,
    INSTANCEOF, INVOKEINTERFACE, INVOKESPECIAL, INVOKESTATIC, INVOKEVIRTUAL, NEW, PUTFIELD,
    RETURN, SWAP,
};
use kiln_classfile::{
    parse_method_descriptor, Code, CodeBuilder, ConstantPool, Frame, MethodDescriptor,
    VerificationType,
};
use kiln_types::jvm::{box_method, load_opcode, primitive_of, return_opcode};

use crate::error::EnhanceError;
use crate::plan::{
    BodyPlan, Delegation, InvokeKind, Leading, SlotAccess, SlotOperation, SynthesizedMethod,
    TemplateSetup,
};

const ARC: &str = "io/quarkus/arc/Arc";
const ARC_CONTAINER: &str = "io/quarkus/arc/ArcContainer";
const INSTANCE_HANDLE: &str = "io/quarkus/arc/InstanceHandle";
const TEMPLATE_PRODUCER: &str = "io/quarkus/qute/runtime/TemplateProducer";
const TEMPLATE: &str = "io/quarkus/qute/Template";
const THREAD: &str = "java/lang/Thread";
const THREAD_LOCAL: &str = "java/lang/ThreadLocal";

/// Renders the body of `method`.
pub fn render(method: &SynthesizedMethod, cp: &mut ConstantPool) -> Result<Code, EnhanceError> {
    let desc = parse_method_descriptor(&method.descriptor)?;
    let receiver = u16::from(!method.is_static());
    let mut code = CodeBuilder::new(cp, desc.argument_slots() + receiver);
    match &method.body {
        BodyPlan::Delegate(plan) => delegate(&mut code, plan, &desc, receiver)?,
        BodyPlan::Template(setup) => {
            template_setup(&mut code, setup, &desc, receiver)?;
            code.insn(ARETURN)?;
        }
        BodyPlan::Slot(access) => slot_access(&mut code, access, &desc)?,
    }
    Ok(code.finish()?)
}

/// `this.<field> = <template instance>`, as straight-line code for splicing
/// into the constructor described by `ctor_descriptor`.
pub fn render_field_store(
    setup: &TemplateSetup,
    ctor_descriptor: &str,
    owner: &str,
    field: &str,
    cp: &mut ConstantPool,
) -> Result<Code, EnhanceError> {
    let desc = parse_method_descriptor(ctor_descriptor)?;
    let mut code = CodeBuilder::new(cp, desc.argument_slots() + 1);
    code.var_insn(ALOAD, 0)?;
    template_setup(&mut code, setup, &desc, 1)?;
    code.field_insn(
        PUTFIELD,
        owner,
        field,
        &format!("L{};", setup.template_instance),
    )?;
    Ok(code.finish()?)
}

fn delegate(
    code: &mut CodeBuilder<'_>,
    plan: &Delegation,
    desc: &MethodDescriptor,
    first_slot: u16,
) -> Result<(), EnhanceError> {
    if plan.load_receiver {
        code.var_insn(ALOAD, 0)?;
    }
    match &plan.leading {
        Some(Leading::Accessor(accessor)) => {
            if accessor.kind != InvokeKind::Static {
                code.var_insn(ALOAD, 0)?;
            }
            invoke(code, accessor.kind, &accessor.owner, &accessor.name, &accessor.descriptor)?;
        }
        Some(Leading::ClassLiteral(class)) => code.ldc_class(class)?,
        None => {}
    }

    let mut slot = first_slot;
    for (i, param) in desc.params.iter().enumerate() {
        code.var_insn(load_opcode(param), slot)?;
        if let Some(Some(cast)) = plan.argument_casts.get(i) {
            code.type_insn(CHECKCAST, cast)?;
        }
        slot += param.slot_size();
    }

    let target = &plan.target;
    invoke(code, target.kind, &target.owner, &target.name, &target.descriptor)?;
    if let Some(cast) = &plan.return_cast {
        code.type_insn(CHECKCAST, cast)?;
    }
    code.insn(return_opcode(&desc.return_type))?;
    Ok(())
}

fn invoke(
    code: &mut CodeBuilder<'_>,
    kind: InvokeKind,
    owner: &str,
    name: &str,
    descriptor: &str,
) -> Result<(), EnhanceError> {
    code.invoke(kind.opcode(), owner, name, descriptor, kind == InvokeKind::Interface)?;
    Ok(())
}

/// Leaves the populated template instance on the stack.
fn template_setup(
    code: &mut CodeBuilder<'_>,
    setup: &TemplateSetup,
    desc: &MethodDescriptor,
    first_slot: u16,
) -> Result<(), EnhanceError> {
    let instance = setup.template_instance.as_str();

    code.invoke(INVOKESTATIC, ARC, "container", &format!("()L{ARC_CONTAINER};"), false)?;
    code.ldc_class(TEMPLATE_PRODUCER)?;
    code.push_int(0)?;
    code.type_insn(ANEWARRAY, "java/lang/annotation/Annotation")?;
    code.invoke(
        INVOKEINTERFACE,
        ARC_CONTAINER,
        "instance",
        &format!("(Ljava/lang/Class;[Ljava/lang/annotation/Annotation;)L{INSTANCE_HANDLE};"),
        true,
    )?;
    code.invoke(INVOKEINTERFACE, INSTANCE_HANDLE, "get", "()Ljava/lang/Object;", true)?;
    code.type_insn(CHECKCAST, TEMPLATE_PRODUCER)?;
    code.ldc_string(&setup.template_id)?;
    code.invoke(
        INVOKEVIRTUAL,
        TEMPLATE_PRODUCER,
        "getInjectableTemplate",
        &format!("(Ljava/lang/String;)L{TEMPLATE};"),
        false,
    )?;
    if let Some(fragment) = &setup.fragment_id {
        code.ldc_string(fragment)?;
        code.invoke(
            INVOKEINTERFACE,
            TEMPLATE,
            "getFragment",
            &format!("(Ljava/lang/String;)L{TEMPLATE}$Fragment;"),
            true,
        )?;
    }
    code.invoke(INVOKEINTERFACE, TEMPLATE, "instance", &format!("()L{instance};"), true)?;

    if let Some(adapter) = &setup.adapter {
        // new Wrapper(instance), with the instance already on the stack
        code.type_insn(NEW, &adapter.wrapper)?;
        code.insn(DUP_X1)?;
        code.insn(SWAP)?;
        code.invoke(
            INVOKESPECIAL,
            &adapter.wrapper,
            "<init>",
            &format!("(L{instance};)V"),
            false,
        )?;
    }

    let result = setup.result_type();
    let data = format!("(Ljava/lang/String;Ljava/lang/Object;)L{result};");
    let mut slot = first_slot;
    for (name, param) in setup.parameter_names.iter().zip(&desc.params) {
        code.ldc_string(name)?;
        code.var_insn(load_opcode(param), slot)?;
        if let Some(primitive) = primitive_of(param) {
            let (owner, method, descriptor) = box_method(primitive);
            code.invoke(INVOKESTATIC, owner, method, &descriptor, false)?;
        }
        code.invoke(INVOKEINTERFACE, result, "data", &data, true)?;
        slot += param.slot_size();
    }
    Ok(())
}

fn slot_access(
    code: &mut CodeBuilder<'_>,
    access: &SlotAccess,
    desc: &MethodDescriptor,
) -> Result<(), EnhanceError> {
    let thread_slot = desc.argument_slots() + 1;
    let slot = i32::try_from(access.slot)
        .map_err(|_| kiln_classfile::Error::Other("storage slot out of range"))?;
    let fallback = code.new_label();

    code.invoke(INVOKESTATIC, THREAD, "currentThread", &format!("()L{THREAD};"), false)?;
    code.var_insn(ASTORE, thread_slot)?;
    code.var_insn(ALOAD, thread_slot)?;
    code.type_insn(INSTANCEOF, &access.thread_class)?;
    code.jump(IFEQ, fallback)?;

    code.var_insn(ALOAD, thread_slot)?;
    code.type_insn(CHECKCAST, &access.thread_class)?;
    code.invoke(
        INVOKEINTERFACE,
        &access.thread_class,
        &access.context_method,
        "()[Ljava/lang/Object;",
        true,
    )?;
    code.push_int(slot)?;
    match access.operation {
        SlotOperation::Get => {
            code.insn(AALOAD)?;
            code.type_insn(CHECKCAST, &access.value_type)?;
            code.insn(ARETURN)?;
        }
        SlotOperation::Set => {
            code.var_insn(ALOAD, 1)?;
            code.insn(AASTORE)?;
            code.insn(RETURN)?;
        }
        SlotOperation::Remove => {
            code.insn(ACONST_NULL)?;
            code.insn(AASTORE)?;
            code.insn(RETURN)?;
        }
    }

    code.place(fallback)?;
    code.frame(
        fallback,
        Frame::Append(vec![VerificationType::Object(THREAD.to_string())]),
    );
    code.var_insn(ALOAD, 0)?;
    match access.operation {
        SlotOperation::Get => {
            code.invoke(INVOKESPECIAL, THREAD_LOCAL, "get", "()Ljava/lang/Object;", false)?;
            code.type_insn(CHECKCAST, &access.value_type)?;
            code.insn(ARETURN)?;
        }
        SlotOperation::Set => {
            code.var_insn(ALOAD, 1)?;
            code.invoke(INVOKESPECIAL, THREAD_LOCAL, "set", "(Ljava/lang/Object;)V", false)?;
            code.insn(RETURN)?;
        }
        SlotOperation::Remove => {
            code.invoke(INVOKESPECIAL, THREAD_LOCAL, "remove", "()V", false)?;
            code.insn(RETURN)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{AdapterPlan, MethodRef};
    use kiln_classfile::access::{ACC_PUBLIC, ACC_STATIC};
    use kiln_types::ClassName;
    use pretty_assertions::assert_eq;

    fn method(flags: u16, descriptor: &str, body: BodyPlan) -> SynthesizedMethod {
        SynthesizedMethod {
            owner: ClassName::new("t.Owner"),
            access_flags: flags,
            name: "m".into(),
            descriptor: descriptor.into(),
            signature: None,
            parameter_names: None,
            body,
        }
    }

    fn disassemble(method: &SynthesizedMethod) -> (Code, Vec<String>) {
        let mut cp = ConstantPool::new();
        let code = render(method, &mut cp).unwrap();
        let lines = code.disassemble(&cp).unwrap();
        (code, lines)
    }

    #[test]
    fn repository_delegation_skips_receiver_and_wide_slots() {
        let plan = BodyPlan::Delegate(Delegation {
            load_receiver: false,
            leading: Some(Leading::Accessor(MethodRef::new(
                InvokeKind::Virtual,
                "t/Repo",
                "getEntityManager",
                "()Ljakarta/persistence/EntityManager;",
            ))),
            argument_casts: Vec::new(),
            target: MethodRef::new(
                InvokeKind::Static,
                "t/Repo_",
                "find",
                "(Ljakarta/persistence/EntityManager;JLjava/lang/String;D)I",
            ),
            return_cast: None,
        });
        let (code, lines) = disassemble(&method(ACC_PUBLIC, "(JLjava/lang/String;D)I", plan));
        assert_eq!(
            lines,
            vec![
                "aload_0",
                "invokevirtual t/Repo.getEntityManager()Ljakarta/persistence/EntityManager;",
                "lload_1",
                "aload_3",
                "dload 4",
                "invokestatic t/Repo_.find(Ljakarta/persistence/EntityManager;JLjava/lang/String;D)I",
                "ireturn",
            ]
        );
        assert_eq!(code.max_stack, 6);
        assert_eq!(code.max_locals, 6);
    }

    #[test]
    fn entity_delegation_starts_at_slot_zero() {
        let plan = BodyPlan::Delegate(Delegation {
            load_receiver: false,
            leading: Some(Leading::Accessor(MethodRef::new(
                InvokeKind::Static,
                "t/Book",
                "getEntityManager",
                "()Ljakarta/persistence/EntityManager;",
            ))),
            argument_casts: Vec::new(),
            target: MethodRef::new(
                InvokeKind::Static,
                "t/Book_",
                "byIsbn",
                "(Ljakarta/persistence/EntityManager;Ljava/lang/String;)Ljava/util/List;",
            ),
            return_cast: None,
        });
        let (_, lines) = disassemble(&method(
            ACC_PUBLIC | ACC_STATIC,
            "(Ljava/lang/String;)Ljava/util/List;",
            plan,
        ));
        assert_eq!(
            lines,
            vec![
                "invokestatic t/Book.getEntityManager()Ljakarta/persistence/EntityManager;",
                "aload_0",
                "invokestatic t/Book_.byIsbn(Ljakarta/persistence/EntityManager;Ljava/lang/String;)Ljava/util/List;",
                "areturn",
            ]
        );
    }

    #[test]
    fn bridge_casts_arguments_and_result() {
        let plan = BodyPlan::Delegate(Delegation {
            load_receiver: true,
            leading: None,
            argument_casts: vec![Some("t/Book".into())],
            target: MethodRef::new(InvokeKind::Virtual, "t/Repo", "persist", "(Lt/Book;)Lt/Book;"),
            return_cast: None,
        });
        let (_, lines) = disassemble(&method(ACC_PUBLIC, "(Ljava/lang/Object;)Ljava/lang/Object;", plan));
        assert_eq!(
            lines,
            vec![
                "aload_0",
                "aload_1",
                "checkcast t/Book",
                "invokevirtual t/Repo.persist(Lt/Book;)Lt/Book;",
                "areturn",
            ]
        );
    }

    #[test]
    fn template_setup_boxes_primitives_and_adapts() {
        let setup = TemplateSetup {
            template_id: "Templates/hello".into(),
            fragment_id: Some("item".into()),
            template_instance: "io/quarkus/qute/TemplateInstance".into(),
            adapter: Some(AdapterPlan {
                instance: "t/MailInstance".into(),
                wrapper: "t/MailInstanceImpl".into(),
            }),
            parameter_names: vec!["count".into(), "name".into()],
        };
        let (code, lines) = disassemble(&method(
            ACC_PUBLIC | ACC_STATIC,
            "(JLjava/lang/String;)Lt/MailInstance;",
            BodyPlan::Template(setup),
        ));
        assert_eq!(
            lines,
            vec![
                "invokestatic io/quarkus/arc/Arc.container()Lio/quarkus/arc/ArcContainer;",
                "ldc class io/quarkus/qute/runtime/TemplateProducer",
                "iconst_0",
                "anewarray java/lang/annotation/Annotation",
                "invokeinterface io/quarkus/arc/ArcContainer.instance(Ljava/lang/Class;[Ljava/lang/annotation/Annotation;)Lio/quarkus/arc/InstanceHandle;",
                "invokeinterface io/quarkus/arc/InstanceHandle.get()Ljava/lang/Object;",
                "checkcast io/quarkus/qute/runtime/TemplateProducer",
                "ldc \"Templates/hello\"",
                "invokevirtual io/quarkus/qute/runtime/TemplateProducer.getInjectableTemplate(Ljava/lang/String;)Lio/quarkus/qute/Template;",
                "ldc \"item\"",
                "invokeinterface io/quarkus/qute/Template.getFragment(Ljava/lang/String;)Lio/quarkus/qute/Template$Fragment;",
                "invokeinterface io/quarkus/qute/Template.instance()Lio/quarkus/qute/TemplateInstance;",
                "new t/MailInstanceImpl",
                "dup_x1",
                "swap",
                "invokespecial t/MailInstanceImpl.<init>(Lio/quarkus/qute/TemplateInstance;)V",
                "ldc \"count\"",
                "lload_0",
                "invokestatic java/lang/Long.valueOf(J)Ljava/lang/Long;",
                "invokeinterface t/MailInstance.data(Ljava/lang/String;Ljava/lang/Object;)Lt/MailInstance;",
                "ldc \"name\"",
                "aload_2",
                "invokeinterface t/MailInstance.data(Ljava/lang/String;Ljava/lang/Object;)Lt/MailInstance;",
                "areturn",
            ]
        );
        assert_eq!(code.max_locals, 3);
    }

    #[test]
    fn slot_get_falls_back_to_thread_local() {
        let access = SlotAccess {
            operation: SlotOperation::Get,
            slot: 2,
            value_type: "java/util/List".into(),
            thread_class: "io/quarkus/runtime/storage/QuarkusThread".into(),
            context_method: "getQuarkusThreadContext".into(),
        };
        let (code, lines) = disassemble(&method(ACC_PUBLIC, "()Ljava/util/List;", BodyPlan::Slot(access)));
        assert_eq!(
            lines,
            vec![
                "invokestatic java/lang/Thread.currentThread()Ljava/lang/Thread;",
                "astore_1",
                "aload_1",
                "instanceof io/quarkus/runtime/storage/QuarkusThread",
                "ifeq 26",
                "aload_1",
                "checkcast io/quarkus/runtime/storage/QuarkusThread",
                "invokeinterface io/quarkus/runtime/storage/QuarkusThread.getQuarkusThreadContext()[Ljava/lang/Object;",
                "iconst_2",
                "aaload",
                "checkcast java/util/List",
                "areturn",
                "aload_0",
                "invokespecial java/lang/ThreadLocal.get()Ljava/lang/Object;",
                "checkcast java/util/List",
                "areturn",
            ]
        );
        assert_eq!(code.max_locals, 2);
        assert_eq!(code.attributes[0].name, "StackMapTable");
    }
}

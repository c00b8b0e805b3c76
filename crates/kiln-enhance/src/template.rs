//! Checked templates: native static methods and records that stand for a
//! template instance.

use std::collections::{BTreeMap, HashMap};

use kiln_classfile::access::{ACC_FINAL, ACC_NATIVE, ACC_PRIVATE, ACC_PUBLIC, ACC_STATIC};
use kiln_classfile::opcodes::{ALOAD, ARETURN, GETFIELD, RETURN};
use kiln_classfile::{ClassFile, ClassMember, CodeBuilder};
use kiln_config::TemplateConfig;
use kiln_index::{ClassInfo, IndexView, MethodInfo};
use kiln_types::ClassName;

use crate::dispatch::{apply_rule, ClassEnhancer, EnhanceContext, MemberRule};
use crate::error::EnhanceError;
use crate::plan::{AdapterPlan, BodyPlan, SynthesizedMethod, TemplateSetup};
use crate::render::render_field_store;

const WRAPPED_FIELD: &str = "$wrapped";
const WRAPPED_METHOD: &str = "wrapped";

/// Gives registered native methods a body that builds and returns a
/// template instance.
#[derive(Debug, Default, Clone)]
pub struct NativeTemplateEnhancer {
    methods: HashMap<(String, String), TemplateSetup>,
}

impl NativeTemplateEnhancer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` + `descriptor`; overloads are registered separately.
    pub fn implement(&mut self, name: &str, descriptor: &str, setup: TemplateSetup) {
        self.methods
            .insert((name.to_owned(), descriptor.to_owned()), setup);
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    fn setup(&self, name: &str, descriptor: &str) -> Option<&TemplateSetup> {
        self.methods.get(&(name.to_owned(), descriptor.to_owned()))
    }
}

impl MemberRule for NativeTemplateEnhancer {
    fn is_candidate(&self, member: &ClassMember) -> bool {
        member.has_flags(ACC_NATIVE) && self.setup(&member.name, &member.descriptor).is_some()
    }

    fn qualifies(&self, _method: &MethodInfo) -> bool {
        true
    }

    fn plan(
        &self,
        class: &ClassInfo,
        method: &MethodInfo,
        member: &ClassMember,
    ) -> Result<SynthesizedMethod, EnhanceError> {
        let setup = self
            .setup(&member.name, &member.descriptor)
            .cloned()
            .ok_or_else(|| EnhanceError::MissingIndexedMethod {
                class: class.name.clone(),
                method: member.name.clone(),
                descriptor: member.descriptor.clone(),
                arg_types: String::new(),
            })?;
        Ok(SynthesizedMethod {
            owner: class.name.clone(),
            access_flags: member.access_flags,
            name: member.name.clone(),
            descriptor: member.descriptor.clone(),
            signature: None,
            parameter_names: method.parameter_names.clone(),
            body: BodyPlan::Template(setup),
        })
    }
}

impl ClassEnhancer for NativeTemplateEnhancer {
    fn name(&self) -> &str {
        "checked-template"
    }

    fn enhance(&self, cx: &EnhanceContext<'_>, class: &mut ClassFile) -> Result<(), EnhanceError> {
        let info = cx.class_info(&class.this_class)?;
        let count = apply_rule(self, class, info)?;
        tracing::debug!(target = "kiln.enhance", class = %info.name, count, "implemented template methods");
        Ok(())
    }
}

/// Makes a record's canonical constructor build its template instance into
/// a `$wrapped` field, readable through `wrapped()`.
#[derive(Debug, Clone)]
pub struct RecordTemplateEnhancer {
    constructor: String,
    setup: TemplateSetup,
}

impl RecordTemplateEnhancer {
    pub fn new(constructor_descriptor: impl Into<String>, setup: TemplateSetup) -> Self {
        Self {
            constructor: constructor_descriptor.into(),
            setup,
        }
    }

    pub fn setup(&self) -> &TemplateSetup {
        &self.setup
    }
}

impl ClassEnhancer for RecordTemplateEnhancer {
    fn name(&self) -> &str {
        "record-template"
    }

    fn enhance(&self, _cx: &EnhanceContext<'_>, class: &mut ClassFile) -> Result<(), EnhanceError> {
        let name = ClassName::new(class.this_class.as_str());
        let owner = class.this_class.clone();
        let instance_desc = format!("L{};", self.setup.template_instance);
        let accessor_desc = format!("(){instance_desc}");

        if class.field(WRAPPED_FIELD).is_some() {
            return Err(EnhanceError::DuplicateMember {
                class: name,
                member: WRAPPED_FIELD.to_owned(),
            });
        }
        if class.method(WRAPPED_METHOD, &accessor_desc).is_some() {
            return Err(EnhanceError::DuplicateMember {
                class: name,
                member: format!("{WRAPPED_METHOD}{accessor_desc}"),
            });
        }

        let shape_error = |reason: &'static str| EnhanceError::UnsupportedConstructorShape {
            class: ClassName::new(owner.as_str()),
            descriptor: self.constructor.clone(),
            reason,
        };
        let position = class
            .methods
            .iter()
            .position(|m| m.name == "<init>" && m.descriptor == self.constructor)
            .ok_or_else(|| shape_error("constructor not found"))?;
        let mut code = class.methods[position]
            .code(&class.constant_pool)?
            .ok_or_else(|| shape_error("constructor has no code"))?;
        let instructions = code.instructions()?;
        let returns = instructions.iter().filter(|i| i.opcode == RETURN).count();
        if returns != 1 {
            return Err(shape_error("expected exactly one return"));
        }
        if instructions.last().map(|i| i.opcode) != Some(RETURN) {
            return Err(shape_error("return is not the last instruction"));
        }

        let snippet = render_field_store(
            &self.setup,
            &self.constructor,
            &owner,
            WRAPPED_FIELD,
            &mut class.constant_pool,
        )?;
        code.insert_before_last_instruction(&snippet)?;
        class.methods[position].set_code(&mut class.constant_pool, &code)?;

        class
            .fields
            .push(ClassMember::new(ACC_PRIVATE | ACC_FINAL, WRAPPED_FIELD, instance_desc.as_str()));

        let mut body = CodeBuilder::new(&mut class.constant_pool, 1);
        body.var_insn(ALOAD, 0)?;
        body.field_insn(GETFIELD, &owner, WRAPPED_FIELD, &instance_desc)?;
        body.insn(ARETURN)?;
        let body = body.finish()?;
        let mut accessor = ClassMember::new(ACC_PUBLIC, WRAPPED_METHOD, accessor_desc.as_str());
        accessor.set_code(&mut class.constant_pool, &body)?;
        class.methods.push(accessor);

        tracing::debug!(
            target = "kiln.enhance",
            class = %name,
            template = %self.setup.template_id,
            "wrapped record template"
        );
        Ok(())
    }
}

/// Every checked template found in an index.
#[derive(Debug, Default, Clone)]
pub struct CheckedTemplates {
    pub native: BTreeMap<ClassName, NativeTemplateEnhancer>,
    pub records: BTreeMap<ClassName, RecordTemplateEnhancer>,
}

impl CheckedTemplates {
    pub fn is_empty(&self) -> bool {
        self.native.is_empty() && self.records.is_empty()
    }
}

/// Finds native templates (static native methods of classes carrying the
/// checked-template annotation) and record templates (records implementing
/// the template instance type).
pub fn discover_templates(
    index: &(dyn IndexView + Sync),
    config: &TemplateConfig,
) -> Result<CheckedTemplates, EnhanceError> {
    let mut found = CheckedTemplates::default();
    let instance = ClassName::new(config.template_instance.as_str()).internal_name();

    for class in index.classes() {
        if !class.has_annotation(&config.checked_template_annotation) {
            continue;
        }
        let mut enhancer = NativeTemplateEnhancer::new();
        let prefix = enclosing_prefix(&class.name);
        for method in &class.methods {
            if !method.has_flags(ACC_STATIC | ACC_NATIVE) {
                continue;
            }
            let (base, fragment) = match method.name.split_once('$') {
                Some((base, fragment)) => (base, Some(fragment.to_owned())),
                None => (method.name.as_str(), None),
            };
            let setup = TemplateSetup {
                template_id: format!("{prefix}{base}"),
                fragment_id: fragment,
                template_instance: instance.clone(),
                adapter: adapter(config, method.return_type.raw_class()),
                parameter_names: parameter_names(class, method)?,
            };
            enhancer.implement(&method.name, &method.descriptor, setup);
        }
        if !enhancer.is_empty() {
            found.native.insert(class.name.clone(), enhancer);
        }
    }

    for class in index.all_known_implementors(config.template_instance.as_str()) {
        if !class.is_record() {
            continue;
        }
        let Some(constructor) = class.canonical_constructor() else {
            return Err(EnhanceError::UnsupportedConstructorShape {
                class: class.name.clone(),
                descriptor: String::new(),
                reason: "record has no canonical constructor",
            });
        };
        let base = class
            .name
            .simple_name()
            .rsplit('$')
            .next()
            .unwrap_or_default();
        let record_adapter = config
            .adapters
            .iter()
            .find(|a| index.all_known_implementors(&a.instance).iter().any(|c| c.name == class.name))
            .map(|a| AdapterPlan {
                instance: ClassName::new(a.instance.as_str()).internal_name(),
                wrapper: ClassName::new(a.wrapper.as_str()).internal_name(),
            });
        let setup = TemplateSetup {
            template_id: format!("{}{base}", enclosing_prefix(&class.name)),
            fragment_id: None,
            template_instance: instance.clone(),
            adapter: record_adapter,
            parameter_names: class.record_components.iter().map(|c| c.name.clone()).collect(),
        };
        found.records.insert(
            class.name.clone(),
            RecordTemplateEnhancer::new(constructor.descriptor.as_str(), setup),
        );
    }

    tracing::debug!(
        target = "kiln.enhance",
        native = found.native.len(),
        records = found.records.len(),
        "discovered checked templates"
    );
    Ok(found)
}

/// `Outer/` for `pkg.Outer$Templates`, empty for top-level classes.
fn enclosing_prefix(class: &ClassName) -> String {
    class
        .simple_name()
        .rsplit_once('$')
        .and_then(|(enclosing, _)| enclosing.rsplit('$').next())
        .map(|simple| format!("{simple}/"))
        .unwrap_or_default()
}

fn adapter(config: &TemplateConfig, return_type: Option<&ClassName>) -> Option<AdapterPlan> {
    let adapter = config.adapter_for(return_type?.as_str())?;
    Some(AdapterPlan {
        instance: ClassName::new(adapter.instance.as_str()).internal_name(),
        wrapper: ClassName::new(adapter.wrapper.as_str()).internal_name(),
    })
}

fn parameter_names(class: &ClassInfo, method: &MethodInfo) -> Result<Vec<String>, EnhanceError> {
    if method.parameters.is_empty() {
        return Ok(Vec::new());
    }
    match &method.parameter_names {
        Some(names) if names.len() == method.parameters.len() => Ok(names.clone()),
        _ => Err(EnhanceError::MissingParameterNames {
            class: class.name.clone(),
            method: method.name.clone(),
        }),
    }
}

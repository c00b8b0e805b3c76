//! Methods to synthesize, described as data.
//!
//! Enhancers only build these plans; [`crate::render`] turns them into `Code`
//! attributes.

use kiln_classfile::opcodes::{INVOKEINTERFACE, INVOKESPECIAL, INVOKESTATIC, INVOKEVIRTUAL};
use kiln_types::ClassName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeKind {
    Static,
    Virtual,
    Special,
    Interface,
}

impl InvokeKind {
    pub fn opcode(self) -> u8 {
        match self {
            InvokeKind::Static => INVOKESTATIC,
            InvokeKind::Virtual => INVOKEVIRTUAL,
            InvokeKind::Special => INVOKESPECIAL,
            InvokeKind::Interface => INVOKEINTERFACE,
        }
    }
}

/// A method call site. `owner` is an internal name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRef {
    pub kind: InvokeKind,
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl MethodRef {
    pub fn new(
        kind: InvokeKind,
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}

/// The extra first argument of a delegated call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Leading {
    /// Result of a no-argument accessor. A virtual accessor is called on
    /// `this`.
    Accessor(MethodRef),
    /// A class literal (internal name or array descriptor).
    ClassLiteral(String),
}

/// Forwards the method's own arguments to `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegation {
    /// Push `this` before anything else (for virtual targets on the owner).
    pub load_receiver: bool,
    pub leading: Option<Leading>,
    /// Per-argument `checkcast` operand; empty means no casts at all.
    pub argument_casts: Vec<Option<String>>,
    pub target: MethodRef,
    pub return_cast: Option<String>,
}

/// A template-instance conversion applied right after `instance()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterPlan {
    /// Internal name of the instance type the result is used as.
    pub instance: String,
    /// Internal name of the wrapper constructed around the instance.
    pub wrapper: String,
}

/// Builds a template instance and adds every parameter as data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSetup {
    pub template_id: String,
    pub fragment_id: Option<String>,
    /// Internal name of the template instance interface.
    pub template_instance: String,
    pub adapter: Option<AdapterPlan>,
    /// Names, in declaration order, of the parameters to pass as data.
    pub parameter_names: Vec<String>,
}

impl TemplateSetup {
    /// Internal name of the type left on the stack.
    pub fn result_type(&self) -> &str {
        self.adapter
            .as_ref()
            .map_or(self.template_instance.as_str(), |a| a.instance.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotOperation {
    Get,
    Set,
    Remove,
}

/// Reads or writes one slot of the current thread's context array, or falls
/// back to the `ThreadLocal` implementation for other threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotAccess {
    pub operation: SlotOperation,
    pub slot: u32,
    /// `checkcast` operand for values read from the slot.
    pub value_type: String,
    /// Internal name of the interface implemented by context-carrying threads.
    pub thread_class: String,
    pub context_method: String,
}

/// Operand of `checkcast`/`ldc` for a reference descriptor: the internal
/// name for `Lfoo/Bar;`, the descriptor itself for arrays.
pub fn class_operand(descriptor: &str) -> String {
    descriptor
        .strip_prefix('L')
        .and_then(|d| d.strip_suffix(';'))
        .unwrap_or(descriptor)
        .to_owned()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyPlan {
    Delegate(Delegation),
    /// Template setup followed by `areturn`.
    Template(TemplateSetup),
    Slot(SlotAccess),
}

/// One method to emit into `owner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedMethod {
    pub owner: ClassName,
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub parameter_names: Option<Vec<String>>,
    pub body: BodyPlan,
}

impl SynthesizedMethod {
    pub fn is_static(&self) -> bool {
        self.access_flags & kiln_classfile::access::ACC_STATIC != 0
    }
}

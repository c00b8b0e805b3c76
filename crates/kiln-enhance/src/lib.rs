//! Build-time bytecode enhancement: delegating bodies for native query
//! methods, repository bridges, checked templates and context storage shims.
//!
//! Enhancers describe what to emit as [`SynthesizedMethod`] plans; the
//! [`render`] module turns plans into `Code` attributes.

#![forbid(unsafe_code)]

mod dispatch;
mod error;
mod output;
mod panache;
mod pipeline;
mod plan;
pub mod render;
mod storage;
mod template;

pub use crate::dispatch::{
    apply_rule, install, ClassEnhancer, DispatchState, Dispatcher, EnhanceContext, MemberRule,
};
pub use crate::error::{BuildError, EnhanceError};
pub use crate::output::{ClassOutput, DirectoryOutput, MemoryOutput};
pub use crate::panache::{plan_bridges, EntityEnhancer, RepositoryEnhancer};
pub use crate::pipeline::{Build, BuildSummary, Enhanced};
pub use crate::plan::{
    class_operand, AdapterPlan, BodyPlan, Delegation, InvokeKind, Leading, MethodRef, SlotAccess,
    SlotOperation, SynthesizedMethod, TemplateSetup,
};
pub use crate::storage::{StorageRegistry, StorageSlot};
pub use crate::template::{
    discover_templates, CheckedTemplates, NativeTemplateEnhancer, RecordTemplateEnhancer,
};

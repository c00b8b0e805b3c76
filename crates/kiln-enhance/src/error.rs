use std::path::PathBuf;

use kiln_index::{IndexError, ResolveError};
use kiln_types::ClassName;
use thiserror::Error;

/// Failure while enhancing one class or generating one support class.
#[derive(Debug, Error)]
pub enum EnhanceError {
    /// A native member has no counterpart in the index: the index and the
    /// class being rewritten have diverged.
    #[error(
        "Could not find indexed method: {class}.{method} with descriptor {descriptor} and arg types [{arg_types}]"
    )]
    MissingIndexedMethod {
        class: ClassName,
        method: String,
        descriptor: String,
        arg_types: String,
    },
    #[error("{class} is not in the index")]
    ClassNotIndexed { class: ClassName },
    #[error("cannot resolve type arguments of {class} for {contract}: {reason}")]
    UnresolvableTypeArgument {
        class: ClassName,
        contract: ClassName,
        reason: String,
    },
    #[error("ThreadLocalStorage class must be a non-raw class implementing StorageDeclaration: {class}")]
    StorageValidation { class: ClassName },
    #[error("unsupported constructor shape in {class}{descriptor}: {reason}")]
    UnsupportedConstructorShape {
        class: ClassName,
        descriptor: String,
        reason: &'static str,
    },
    #[error("{class}.{method} has no parameter names; compile with -parameters")]
    MissingParameterNames { class: ClassName, method: String },
    #[error("{class}.{member} already exists")]
    DuplicateMember { class: ClassName, member: String },
    #[error("classfile error: {0}")]
    ClassFile(#[from] kiln_classfile::Error),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("class {class} was already written")]
    DuplicateOutput { class: ClassName },
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A failed build step, naming the class and the enhancer that failed.
#[derive(Debug, Error)]
#[error("enhancement of {class} by {enhancer} failed: {source}")]
pub struct BuildError {
    pub class: ClassName,
    pub enhancer: String,
    #[source]
    pub source: EnhanceError,
}

impl BuildError {
    pub fn new(class: ClassName, enhancer: impl Into<String>, source: EnhanceError) -> Self {
        Self {
            class,
            enhancer: enhancer.into(),
            source,
        }
    }
}

use kiln_types::ClassName;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("classfile error: {0}")]
    ClassFile(#[from] kiln_classfile::Error),
    #[error("invalid generic signature on {class}: {source}")]
    Signature {
        class: ClassName,
        #[source]
        source: kiln_classfile::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// A supertype named by an indexed class is missing from the index.
    #[error("indexing error: {missing} (supertype of {class}) is not in the index")]
    MissingSupertype { class: ClassName, missing: ClassName },
    #[error("indexing error: hierarchy of {class} is cyclic")]
    Cycle { class: ClassName },
}

//! A frozen whole-program class index and the generic-argument resolver
//! that walks it.

#![forbid(unsafe_code)]

mod error;
mod index;
mod info;
mod resolve;

pub use crate::error::{IndexError, ResolveError};
pub use crate::index::{Index, IndexView, Indexer};
pub use crate::info::{ClassInfo, MethodInfo, RecordComponentInfo};
pub use crate::resolve::{find_arguments_to_super_type, MissingClass, Resolver};

//! Compilation errors.
//!
//! Two severities matter to callers. [`UnsupportedConstruct`] is a user
//! program the back end cannot compile and is reported with the offending
//! type and method. [`InternalError`] means the front end handed over
//! inconsistent input; it aborts the compilation.

use std::io;
use std::path::PathBuf;

use ilc_graph::CacheError;
use ilc_ir::TypeSystemError;

use crate::header::ReadyToRunSectionType;

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Unsupported(#[from] UnsupportedConstruct),
    #[error("internal compiler error: {0}")]
    Internal(#[from] InternalError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    TypeSystem(#[from] TypeSystemError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Region(#[from] RegionError),
    #[error("failed to start closure workers: {0}")]
    Workers(#[from] rayon::ThreadPoolBuildError),
}

impl CompileError {
    /// True for errors that describe the input program rather than a
    /// compiler bug or an environment failure.
    pub fn is_reportable(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum UnsupportedConstruct {
    #[error("open instance delegate `{delegate}` over `{method}` is not supported")]
    OpenInstanceDelegate { delegate: String, method: String },
    #[error(
        "delegate `{delegate}` has no native-callable invoke thunk for `{method}`; \
         open delegates to native-callable methods need a non-generic delegate with a \
         native-compatible signature"
    )]
    NonNativeDelegateSignature { delegate: String, method: String },
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InternalError {
    #[error(
        "delegate `{delegate}` (invoke arity {invoke}) cannot bind `{method}` \
         (call arity {target})"
    )]
    DelegateArityMismatch {
        delegate: String,
        method: String,
        invoke: usize,
        target: usize,
    },
    #[error("delegate `{delegate}` targets virtual generic method `{method}`")]
    VirtualGenericMethodDelegate { delegate: String, method: String },
    #[error("node factory is already attached to a dependency graph")]
    AlreadyAttached,
    #[error("node factory was never attached to a dependency graph")]
    NotAttached,
    #[error("header section {section:?} registered twice")]
    DuplicateHeaderSection { section: ReadyToRunSectionType },
}

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("failed to read metadata blob '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(
        "metadata blob '{}' is truncated: expected {expected} bytes, read {found}",
        path.display()
    )]
    Truncated {
        path: PathBuf,
        expected: u64,
        found: u64,
    },
    #[error("metadata blob '{}' is larger than this target can address", path.display())]
    TooLarge { path: PathBuf },
    #[error("no input module carries metadata mappings for '{}'", path.display())]
    NoMappingModule { path: PathBuf },
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegionError {
    #[error(
        "child `{child}` of region `{region}` needs {alignment}-byte alignment \
         but would start at offset {offset}"
    )]
    MisalignedChild {
        region: String,
        child: String,
        offset: u32,
        alignment: u32,
    },
    #[error("region `{region}` exceeds 4 GiB")]
    Overflow { region: String },
}

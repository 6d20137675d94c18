//! Node factory and runtime tables for the ilc ahead-of-time back end.
//!
//! The [`NodeFactory`] maps every logical entity the compiler may emit
//! (method bodies, external references, unboxing stubs, generic shadows,
//! static-data descriptors, runtime tables) to exactly one dependency node.
//! [`Compilation`] closes over a root set with the parallel analyzer from
//! `ilc_graph`, emits the data payloads and lays out the runtime regions.
//!
//! Delegate construction has its own selector, [`DelegateCreationInfo`],
//! which picks the initializer, target symbol and invoke thunk for
//! `new D(obj, &M)`.

mod code;
mod compilation;
mod config;
mod delegate;
mod emit;
mod error;
mod factory;
mod header;
mod mangle;
mod metadata;
mod node;
mod partition;
mod region;

pub use code::{CodeProvider, DependencyRequest, StaticCodeProvider};
pub use compilation::{Compilation, CompilationOutput, EmittedNode};
pub use config::{ConfigError, FactoryConfig, TargetArch};
pub use delegate::DelegateCreationInfo;
pub use emit::{ObjectData, ObjectDataBuilder, RelocKind, Relocation};
pub use error::{CompileError, InternalError, MetadataError, RegionError, UnsupportedConstruct};
pub use factory::{Attachment, NodeFactory, UnitTables};
pub use header::{
    HeaderEntry, HeaderTable, ReadyToRunSectionType, READY_TO_RUN_MAGIC,
    READY_TO_RUN_MAJOR_VERSION, READY_TO_RUN_MINOR_VERSION,
};
pub use ilc_graph::AnalyzerConfig;
pub use mangle::{NameMangler, RegionBound, MANGLE_PREFIX};
pub use metadata::{read_metadata_blob, MetadataManager};
pub use node::{HelperKey, MethodKey, Node, NodeArena, NodeId, NodeKind, RegionKind};
pub use partition::{CompilationModuleGroup, ModuleSetGroup, SingleUnitGroup};
pub use region::{RegionChild, RegionLayout};

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Install a `tracing` subscriber for debug output.
///
/// Safe to call more than once, and a subscriber the host already installed
/// is kept. Does nothing unless `RUST_LOG` holds a valid filter, e.g.
/// `RUST_LOG=ilc_graph=debug,ilc_nodes=trace`. Lines carry the thread id so
/// closure rounds can be followed across workers.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        let Ok(filter) = EnvFilter::try_from_default_env() else {
            return;
        };
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .with(filter)
            .try_init();
    });
}

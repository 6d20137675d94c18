//! Dependency nodes.
//!
//! Every node lives once in the [`NodeArena`] and is addressed by a
//! [`NodeId`]. The factory's caches guarantee that a logical entity maps to
//! exactly one id, so id equality is node identity. Nodes that forward to
//! another body (shadow methods, fat pointers, unboxing adapters) hold the
//! target's id instead of a copy of it.

use std::fmt;
use std::sync::Arc;

use ilc_ir::{MethodId, TypeId, TypeSystemEntity};
use parking_lot::RwLock;

use crate::delegate::DelegateCreationInfo;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// A method together with the "entered through its unboxing stub" flag.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct MethodKey {
    pub method: MethodId,
    pub is_unboxing_stub: bool,
}

impl MethodKey {
    #[must_use]
    pub fn new(method: MethodId, is_unboxing_stub: bool) -> Self {
        Self {
            method,
            is_unboxing_stub,
        }
    }
}

/// Runtime tables that collect marked members after the closure.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RegionKind {
    GcStaticDesc,
    ThreadStaticGcDesc,
    ThreadStaticsOffset,
    GcStatics,
    ThreadStatics,
    EagerCctor,
}

impl RegionKind {
    pub const ALL: [Self; 6] = [
        Self::GcStaticDesc,
        Self::ThreadStaticGcDesc,
        Self::ThreadStaticsOffset,
        Self::GcStatics,
        Self::ThreadStatics,
        Self::EagerCctor,
    ];

    /// Base name of the region's start/end symbols.
    #[must_use]
    pub fn symbol_name(self) -> &'static str {
        match self {
            Self::GcStaticDesc => "GCStaticDesc",
            Self::ThreadStaticGcDesc => "ThreadStaticGCDesc",
            Self::ThreadStaticsOffset => "ThreadStaticOffsetRegion",
            Self::GcStatics => "GCStaticRegion",
            Self::ThreadStatics => "ThreadStaticRegion",
            Self::EagerCctor => "EagerCctor",
        }
    }

    /// Whether `kind` is an element of this region.
    #[must_use]
    pub fn accepts(self, kind: &NodeKind) -> bool {
        match (self, kind) {
            (Self::GcStaticDesc, NodeKind::GcStaticDesc { thread_static, .. }) => !thread_static,
            (Self::ThreadStaticGcDesc, NodeKind::GcStaticDesc { thread_static, .. }) => {
                *thread_static
            }
            (Self::ThreadStaticsOffset, NodeKind::ThreadStaticsOffset { .. })
            | (Self::GcStatics, NodeKind::GcStaticBase { .. })
            | (Self::ThreadStatics, NodeKind::ThreadStaticsBlock { .. })
            | (Self::EagerCctor, NodeKind::EagerCctorEntry { .. }) => true,
            _ => false,
        }
    }
}

/// Key of a cached ready-to-run helper.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum HelperKey {
    DelegateCtor(DelegateCreationInfo),
    GetGcStaticBase(TypeId),
    GetThreadStaticBase(TypeId),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// Body compiled into this unit. With `is_unboxing_stub` set it is the
    /// unboxing-and-instantiating stub of a shared method.
    MethodCode { key: MethodKey },
    /// Body owned by another unit, resolved at link time.
    ExternMethod { key: MethodKey },
    /// Hand-written runtime routine.
    RuntimeImport { method: MethodId },
    /// Unboxes `this` and tail-calls `target`.
    UnboxingStub { method: MethodId, target: NodeId },
    /// Concrete instantiation whose code is the shared `canonical` body.
    ShadowConcreteMethod { key: MethodKey, canonical: NodeId },
    /// Code pointer plus instantiation argument.
    FatFunctionPointer {
        key: MethodKey,
        target: NodeId,
        dictionary: NodeId,
    },
    ExternSymbol,
    GcStaticDesc { ty: TypeId, thread_static: bool },
    ThreadStaticsOffset { ty: TypeId },
    /// The type's thread statics inside the TLS area.
    ThreadStaticsBlock { ty: TypeId },
    GcStaticBase { ty: TypeId },
    EagerCctorEntry { cctor: MethodId },
    DictionaryLayout { owner: TypeSystemEntity },
    StandaloneGcStaticDescRegion { desc: NodeId },
    Region(RegionKind),
    ThreadStaticsIndex,
    TlsDirectory,
    ReadyToRunHeader,
    ModulesSection,
    TypeManagerIndirection,
    MetadataBlob,
    ReadyToRunHelper(HelperKey),
}

impl NodeKind {
    /// Short kind name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::MethodCode { .. } => "method-code",
            Self::ExternMethod { .. } => "extern-method",
            Self::RuntimeImport { .. } => "runtime-import",
            Self::UnboxingStub { .. } => "unboxing-stub",
            Self::ShadowConcreteMethod { .. } => "shadow-method",
            Self::FatFunctionPointer { .. } => "fat-pointer",
            Self::ExternSymbol => "extern-symbol",
            Self::GcStaticDesc { .. } => "gc-static-desc",
            Self::ThreadStaticsOffset { .. } => "thread-statics-offset",
            Self::ThreadStaticsBlock { .. } => "thread-statics-block",
            Self::GcStaticBase { .. } => "gc-static-base",
            Self::EagerCctorEntry { .. } => "eager-cctor",
            Self::DictionaryLayout { .. } => "dictionary-layout",
            Self::StandaloneGcStaticDescRegion { .. } => "standalone-gc-static-desc-region",
            Self::Region(_) => "region",
            Self::ThreadStaticsIndex => "tls-index",
            Self::TlsDirectory => "tls-directory",
            Self::ReadyToRunHeader => "header",
            Self::ModulesSection => "modules-section",
            Self::TypeManagerIndirection => "type-manager-indirection",
            Self::MetadataBlob => "metadata-blob",
            Self::ReadyToRunHelper(_) => "helper",
        }
    }

    /// Whether the node's symbol is defined outside this unit.
    #[must_use]
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            Self::ExternMethod { .. } | Self::RuntimeImport { .. } | Self::ExternSymbol
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    /// The node's symbol; the start symbol for regions.
    pub symbol: String,
    /// End symbol of region nodes.
    pub end_symbol: Option<String>,
}

/// Append-only node storage.
#[derive(Default)]
pub struct NodeArena {
    nodes: RwLock<Vec<Arc<Node>>>,
}

impl NodeArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn alloc(&self, kind: NodeKind, symbol: String, end_symbol: Option<String>) -> NodeId {
        tracing::trace!(kind = kind.name(), %symbol, "new node");
        let mut nodes = self.nodes.write();
        let id = u32::try_from(nodes.len())
            .unwrap_or_else(|_| panic!("node arena exceeded u32::MAX entries"));
        nodes.push(Arc::new(Node {
            kind,
            symbol,
            end_symbol,
        }));
        NodeId(id)
    }

    pub fn get(&self, id: NodeId) -> Arc<Node> {
        Arc::clone(&self.nodes.read()[id.index()])
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

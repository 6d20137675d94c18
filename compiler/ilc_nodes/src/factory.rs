//! The node factory.
//!
//! One [`NodeCache`] per node family turns logical entities into canonical
//! [`NodeId`]s. Constructors freely call back into other caches (an
//! entrypoint constructor asks for the locally-defined method node, an
//! unboxing stub asks for the entrypoint it forwards to); all caches share
//! one [`ConstructionTracker`] so a construction cycle is reported even when
//! it spans worker threads.
//!
//! # Unit tables
//!
//! The runtime tables of the unit (region nodes, TLS index and directory,
//! TLS boundary symbols, type-manager indirection) exist from construction.
//! [`attach_to_dependency_graph`](NodeFactory::attach_to_dependency_graph)
//! adds the header and modules section, roots every table and fills the
//! header once; the header never changes afterwards.

use std::sync::{Arc, OnceLock};

use ilc_graph::{ConstructionTracker, DependencyAnalyzer, DependencyContext, NodeCache};
use ilc_ir::{MethodId, TypeId, TypeSystem, TypeSystemEntity};

use crate::config::FactoryConfig;
use crate::delegate::DelegateCreationInfo;
use crate::error::{CompileError, InternalError};
use crate::header::{HeaderTable, ReadyToRunSectionType};
use crate::mangle::{NameMangler, RegionBound};
use crate::metadata::MetadataManager;
use crate::node::{HelperKey, MethodKey, Node, NodeArena, NodeId, NodeKind, RegionKind};
use crate::partition::CompilationModuleGroup;

/// Nodes every unit has, created with the factory.
#[derive(Clone, Debug)]
pub struct UnitTables {
    regions: [NodeId; 6],
    pub thread_statics_index: NodeId,
    pub tls_directory: NodeId,
    /// Start of the whole TLS area, defined by startup code.
    pub tls_start: NodeId,
    pub tls_end: NodeId,
    pub type_manager_indirection: NodeId,
}

impl UnitTables {
    pub fn region(&self, kind: RegionKind) -> NodeId {
        self.regions[kind as usize]
    }
}

/// State fixed by attaching to a dependency graph.
#[derive(Clone, Debug)]
pub struct Attachment {
    pub header_node: NodeId,
    pub modules_section: NodeId,
    pub metadata_blob: Option<NodeId>,
    pub header: HeaderTable,
}

pub struct NodeFactory {
    types: Arc<TypeSystem>,
    group: Arc<dyn CompilationModuleGroup>,
    config: FactoryConfig,
    mangler: NameMangler,
    metadata: MetadataManager,
    arena: NodeArena,
    tables: UnitTables,
    attachment: OnceLock<Attachment>,

    method_entrypoints: NodeCache<MethodId, NodeId>,
    unboxing_stubs: NodeCache<MethodId, NodeId>,
    non_extern_methods: NodeCache<MethodKey, NodeId>,
    shadow_methods: NodeCache<MethodKey, NodeId>,
    fat_pointers: NodeCache<MethodKey, NodeId>,
    dictionary_layouts: NodeCache<TypeSystemEntity, NodeId>,
    gc_static_descs: NodeCache<TypeId, NodeId>,
    thread_static_gc_descs: NodeCache<TypeId, NodeId>,
    thread_statics_offsets: NodeCache<TypeId, NodeId>,
    thread_statics_blocks: NodeCache<TypeId, NodeId>,
    gc_static_bases: NodeCache<TypeId, NodeId>,
    eager_cctors: NodeCache<MethodId, NodeId>,
    extern_symbols: NodeCache<String, NodeId>,
    standalone_gc_static_descs: NodeCache<NodeId, NodeId>,
    helpers: NodeCache<HelperKey, NodeId>,
}

impl NodeFactory {
    /// Create the factory and its unit tables. A configured metadata blob is
    /// read here, so I/O problems surface before any compilation work.
    pub fn new(
        types: Arc<TypeSystem>,
        group: Arc<dyn CompilationModuleGroup>,
        config: FactoryConfig,
    ) -> Result<Self, CompileError> {
        let mangler = NameMangler::new(&config);
        let metadata = MetadataManager::pick(
            &types,
            &group.input_modules(&types),
            config.metadata_file(),
        )?;

        let tracker = Arc::new(ConstructionTracker::new());
        let arena = NodeArena::new();
        let extern_symbols = tracked("extern symbols", &tracker);

        let regions = RegionKind::ALL.map(|kind| {
            let name = kind.symbol_name();
            arena.alloc(
                NodeKind::Region(kind),
                mangler.region_symbol(name, RegionBound::Start),
                Some(mangler.region_symbol(name, RegionBound::End)),
            )
        });
        let thread_statics_index = arena.alloc(
            NodeKind::ThreadStaticsIndex,
            mangler.thread_statics_index_symbol(),
            None,
        );
        let tls_directory =
            arena.alloc(NodeKind::TlsDirectory, mangler.tls_directory_symbol(), None);
        let tls_start = intern_extern(&extern_symbols, &arena, mangler.tls_start_symbol())?;
        let tls_end = intern_extern(&extern_symbols, &arena, mangler.tls_end_symbol())?;
        let type_manager_indirection = arena.alloc(
            NodeKind::TypeManagerIndirection,
            mangler.unit_symbol("typemanager_indirection"),
            None,
        );

        tracing::debug!(
            arch = %config.target(),
            prefix = config.compilation_unit_prefix(),
            metadata = !metadata.is_empty(),
            "node factory created"
        );

        Ok(Self {
            types,
            group,
            mangler,
            metadata,
            arena,
            tables: UnitTables {
                regions,
                thread_statics_index,
                tls_directory,
                tls_start,
                tls_end,
                type_manager_indirection,
            },
            attachment: OnceLock::new(),
            method_entrypoints: tracked("method entrypoints", &tracker),
            unboxing_stubs: tracked("unboxing stubs", &tracker),
            non_extern_methods: tracked("non-extern methods", &tracker),
            shadow_methods: tracked("shadow methods", &tracker),
            fat_pointers: tracked("fat function pointers", &tracker),
            dictionary_layouts: tracked("dictionary layouts", &tracker),
            gc_static_descs: tracked("gc static descs", &tracker),
            thread_static_gc_descs: tracked("thread static gc descs", &tracker),
            thread_statics_offsets: tracked("thread statics offsets", &tracker),
            thread_statics_blocks: tracked("thread statics blocks", &tracker),
            gc_static_bases: tracked("gc static bases", &tracker),
            eager_cctors: tracked("eager cctors", &tracker),
            extern_symbols,
            standalone_gc_static_descs: tracked("standalone gc static descs", &tracker),
            helpers: tracked("ready-to-run helpers", &tracker),
            config,
        })
    }

    // === Accessors ===

    pub fn types(&self) -> &TypeSystem {
        &self.types
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    pub fn mangler(&self) -> &NameMangler {
        &self.mangler
    }

    pub fn metadata(&self) -> &MetadataManager {
        &self.metadata
    }

    pub fn tables(&self) -> &UnitTables {
        &self.tables
    }

    pub fn node(&self, id: NodeId) -> Arc<Node> {
        self.arena.get(id)
    }

    pub fn symbol(&self, id: NodeId) -> String {
        self.arena.get(id).symbol.clone()
    }

    /// Nodes created so far, marked or not.
    pub fn node_count(&self) -> usize {
        self.arena.len()
    }

    pub fn attachment(&self) -> Result<&Attachment, InternalError> {
        self.attachment.get().ok_or(InternalError::NotAttached)
    }

    pub fn header_table(&self) -> Result<&HeaderTable, InternalError> {
        Ok(&self.attachment()?.header)
    }

    pub fn contains_type(&self, ty: TypeId) -> bool {
        self.group.contains_type(&self.types, ty)
    }

    pub fn contains_method(&self, method: MethodId) -> bool {
        self.group.contains_method(&self.types, method)
    }

    // === Methods ===

    /// The symbol a call to `method` binds to.
    ///
    /// Runtime imports bind to their hand-written routine, owned methods to
    /// the locally compiled body and everything else to an external
    /// reference.
    pub fn method_entrypoint(&self, method: MethodId, is_unboxing_stub: bool) -> Result<NodeId, CompileError> {
        if is_unboxing_stub {
            return self.unboxing_stub(method);
        }
        self.method_entrypoints.get_or_add(method, |&method| {
            let desc = self.types.method_desc(method);
            if desc.is_runtime_import() {
                let symbol = desc
                    .import_symbol
                    .clone()
                    .unwrap_or_else(|| self.mangler.method_symbol(&self.types, method));
                return Ok(self.arena.alloc(NodeKind::RuntimeImport { method }, symbol, None));
            }
            let key = MethodKey::new(method, false);
            if self.contains_method(method) {
                return self.non_extern_method_symbol(key);
            }
            Ok(self.arena.alloc(
                NodeKind::ExternMethod { key },
                self.mangler.method_symbol(&self.types, method),
                None,
            ))
        })
    }

    /// Entry through which boxed receivers reach `method`.
    ///
    /// Shared instance methods without a method instantiation need a stub
    /// that both unboxes `this` and supplies the instantiation argument; that
    /// stub is emitted with the method's body. Anything else gets a plain
    /// adapter that unboxes and tail-calls the regular entry.
    pub fn unboxing_stub(&self, method: MethodId) -> Result<NodeId, CompileError> {
        self.unboxing_stubs.get_or_add(method, |&method| {
            let desc = self.types.method_desc(method);
            if self.types.is_canonical_method(method) && !desc.has_instantiation() {
                let key = MethodKey::new(method, true);
                if self.contains_method(method) {
                    return self.non_extern_method_symbol(key);
                }
                return Ok(self.arena.alloc(
                    NodeKind::ExternMethod { key },
                    self.mangler.unboxing_symbol(&self.types, method),
                    None,
                ));
            }
            let target = self.method_entrypoint(method, false)?;
            Ok(self.arena.alloc(
                NodeKind::UnboxingStub { method, target },
                self.mangler.unboxing_symbol(&self.types, method),
                None,
            ))
        })
    }

    /// Body of `key` compiled into this unit.
    pub fn non_extern_method_symbol(&self, key: MethodKey) -> Result<NodeId, CompileError> {
        self.non_extern_methods.get_or_add(key, |&key| {
            let symbol = if key.is_unboxing_stub {
                self.mangler.unboxing_symbol(&self.types, key.method)
            } else {
                self.mangler.method_symbol(&self.types, key.method)
            };
            Ok(self.arena.alloc(NodeKind::MethodCode { key }, symbol, None))
        })
    }

    /// Concrete instantiation forwarding to its shared body.
    pub fn shadow_concrete_method(&self, key: MethodKey) -> Result<NodeId, CompileError> {
        self.shadow_methods.get_or_add(key, |&key| {
            let canonical_method = self.types.canonical_method(key.method);
            let canonical = self.method_entrypoint(canonical_method, key.is_unboxing_stub)?;
            Ok(self.arena.alloc(
                NodeKind::ShadowConcreteMethod { key, canonical },
                self.mangler
                    .shadow_method_symbol(&self.types, key.method, key.is_unboxing_stub),
                None,
            ))
        })
    }

    /// Shared code address paired with the instantiation argument of
    /// `method`.
    pub fn fat_function_pointer(&self, method: MethodId, is_unboxing_stub: bool) -> Result<NodeId, CompileError> {
        self.fat_pointers
            .get_or_add(MethodKey::new(method, is_unboxing_stub), |&key| {
                let canonical_method = self.types.canonical_method(key.method);
                let target = self.method_entrypoint(canonical_method, key.is_unboxing_stub)?;
                let dictionary = self.generic_dictionary_layout(key.method.into())?;
                Ok(self.arena.alloc(
                    NodeKind::FatFunctionPointer {
                        key,
                        target,
                        dictionary,
                    },
                    self.mangler
                        .fat_pointer_symbol(&self.types, key.method, key.is_unboxing_stub),
                    None,
                ))
            })
    }

    pub fn generic_dictionary_layout(&self, owner: TypeSystemEntity) -> Result<NodeId, CompileError> {
        self.dictionary_layouts.get_or_add(owner, |&owner| {
            Ok(self.arena.alloc(
                NodeKind::DictionaryLayout { owner },
                self.mangler.dictionary_layout_symbol(&self.types, owner),
                None,
            ))
        })
    }

    // === Type statics ===

    pub fn type_gc_static_desc_symbol(&self, ty: TypeId) -> Result<NodeId, CompileError> {
        self.gc_static_desc(ty, false)
    }

    pub fn type_thread_static_gc_desc_symbol(&self, ty: TypeId) -> Result<NodeId, CompileError> {
        self.gc_static_desc(ty, true)
    }

    fn gc_static_desc(&self, ty: TypeId, thread_static: bool) -> Result<NodeId, CompileError> {
        let symbol = || self.mangler.gc_static_desc_symbol(&self.types, ty, thread_static);
        if !self.contains_type(ty) {
            return self.extern_symbol(&symbol());
        }
        let cache = if thread_static {
            &self.thread_static_gc_descs
        } else {
            &self.gc_static_descs
        };
        cache.get_or_add(ty, |&ty| {
            Ok(self
                .arena
                .alloc(NodeKind::GcStaticDesc { ty, thread_static }, symbol(), None))
        })
    }

    pub fn type_thread_statics_offset_symbol(&self, ty: TypeId) -> Result<NodeId, CompileError> {
        let symbol = self.mangler.thread_statics_offset_symbol(&self.types, ty);
        if !self.contains_type(ty) {
            return self.extern_symbol(&symbol);
        }
        self.thread_statics_offsets.get_or_add(ty, |&ty| {
            Ok(self
                .arena
                .alloc(NodeKind::ThreadStaticsOffset { ty }, symbol, None))
        })
    }

    /// TLS index covering the thread statics of `ty`: this unit's index for
    /// owned types, the importing unit's otherwise.
    pub fn type_thread_statics_index_symbol(&self, ty: TypeId) -> Result<NodeId, CompileError> {
        if self.contains_type(ty) {
            return Ok(self.tables.thread_statics_index);
        }
        self.extern_symbol(&self.mangler.imported_thread_statics_index_symbol())
    }

    pub fn type_gc_static_base_symbol(&self, ty: TypeId) -> Result<NodeId, CompileError> {
        let symbol = self.mangler.gc_static_base_symbol(&self.types, ty);
        if !self.contains_type(ty) {
            return self.extern_symbol(&symbol);
        }
        self.gc_static_bases.get_or_add(ty, |&ty| {
            Ok(self.arena.alloc(NodeKind::GcStaticBase { ty }, symbol, None))
        })
    }

    /// Storage of the thread statics of an owned type.
    pub fn thread_statics_block(&self, ty: TypeId) -> Result<NodeId, CompileError> {
        self.thread_statics_blocks.get_or_add(ty, |&ty| {
            Ok(self.arena.alloc(
                NodeKind::ThreadStaticsBlock { ty },
                self.mangler.thread_statics_block_symbol(&self.types, ty),
                None,
            ))
        })
    }

    pub fn eager_cctor_entry(&self, cctor: MethodId) -> Result<NodeId, CompileError> {
        self.eager_cctors.get_or_add(cctor, |&cctor| {
            Ok(self.arena.alloc(
                NodeKind::EagerCctorEntry { cctor },
                self.mangler.eager_cctor_symbol(&self.types, cctor),
                None,
            ))
        })
    }

    // === Symbols and helpers ===

    /// Reference to a symbol defined outside this unit.
    pub fn extern_symbol(&self, name: &str) -> Result<NodeId, CompileError> {
        intern_extern(&self.extern_symbols, &self.arena, name.to_string())
    }

    /// A region holding just `desc`.
    pub fn standalone_gc_static_desc_region(&self, desc: NodeId) -> Result<NodeId, CompileError> {
        self.standalone_gc_static_descs.get_or_add(desc, |&desc| {
            let inner = self.symbol(desc);
            Ok(self.arena.alloc(
                NodeKind::StandaloneGcStaticDescRegion { desc },
                self.mangler.standalone_region_symbol(&inner, RegionBound::Start),
                Some(self.mangler.standalone_region_symbol(&inner, RegionBound::End)),
            ))
        })
    }

    pub fn ready_to_run_helper(&self, key: HelperKey) -> Result<NodeId, CompileError> {
        self.helpers.get_or_add(key, |&key| {
            let symbol = match key {
                HelperKey::DelegateCtor(info) => {
                    let thunk = info.thunk().map(|t| self.symbol(t));
                    self.mangler.delegate_ctor_symbol(
                        &self.symbol(info.constructor()),
                        &self.symbol(info.target()),
                        thunk.as_deref(),
                    )
                }
                HelperKey::GetGcStaticBase(ty) => {
                    self.mangler.static_base_helper_symbol(&self.types, ty, false)
                }
                HelperKey::GetThreadStaticBase(ty) => {
                    self.mangler.static_base_helper_symbol(&self.types, ty, true)
                }
            };
            Ok(self
                .arena
                .alloc(NodeKind::ReadyToRunHelper(key), symbol, None))
        })
    }

    /// Helper constructing a `delegate_type` delegate bound to `target`.
    pub fn delegate_ctor(&self, delegate_type: TypeId, target: MethodId) -> Result<NodeId, CompileError> {
        let info = DelegateCreationInfo::create(self, delegate_type, target)?;
        self.ready_to_run_helper(HelperKey::DelegateCtor(info))
    }

    // === Graph attachment ===

    /// Root the unit tables in `graph` and fill the header.
    pub fn attach_to_dependency_graph<C>(&self, graph: &mut DependencyAnalyzer<'_, C>) -> Result<(), CompileError>
    where
        C: DependencyContext<Node = NodeId>,
    {
        if self.attachment.get().is_some() {
            return Err(InternalError::AlreadyAttached.into());
        }

        let header_node = self.arena.alloc(
            NodeKind::ReadyToRunHeader,
            self.mangler.unit_symbol("ReadyToRunHeader"),
            None,
        );
        let modules_section =
            self.arena
                .alloc(NodeKind::ModulesSection, self.mangler.unit_symbol("Modules"), None);
        let t = &self.tables;

        graph.add_root(header_node, "ReadyToRunHeader is always generated");
        graph.add_root(modules_section, "ModulesSection is always generated");
        graph.add_root(t.region(RegionKind::EagerCctor), "EagerCctorTable is always generated");
        graph.add_root(
            t.type_manager_indirection,
            "TypeManagerIndirection is always generated",
        );
        graph.add_root(t.region(RegionKind::GcStatics), "GC StaticsRegion is always generated");
        graph.add_root(t.region(RegionKind::GcStaticDesc), "GC Static Desc is always generated");
        graph.add_root(
            t.region(RegionKind::ThreadStatics),
            "Thread Statics Region is always generated",
        );
        graph.add_root(
            t.region(RegionKind::ThreadStaticsOffset),
            "Thread Statics Offset Region is always generated",
        );
        graph.add_root(
            t.region(RegionKind::ThreadStaticGcDesc),
            "Thread Statics GC Desc Region is always generated",
        );
        graph.add_root(t.thread_statics_index, "Thread statics index is always generated");
        graph.add_root(t.tls_directory, "TLS Directory is always generated");

        let mut header = HeaderTable::new();
        for (section, kind) in [
            (ReadyToRunSectionType::EagerCctor, RegionKind::EagerCctor),
            (ReadyToRunSectionType::GcStaticRegion, RegionKind::GcStatics),
            (ReadyToRunSectionType::GcStaticDesc, RegionKind::GcStaticDesc),
            (ReadyToRunSectionType::ThreadStaticRegion, RegionKind::ThreadStatics),
            (
                ReadyToRunSectionType::ThreadStaticOffsetRegion,
                RegionKind::ThreadStaticsOffset,
            ),
            (
                ReadyToRunSectionType::ThreadStaticGcDescRegion,
                RegionKind::ThreadStaticGcDesc,
            ),
        ] {
            let region = self.node(t.region(kind));
            header.add(
                section,
                t.region(kind),
                region.symbol.clone(),
                region.end_symbol.clone(),
            )?;
        }
        header.add(
            ReadyToRunSectionType::TypeManagerIndirection,
            t.type_manager_indirection,
            self.symbol(t.type_manager_indirection),
            None,
        )?;
        header.add(
            ReadyToRunSectionType::ThreadStaticIndex,
            t.thread_statics_index,
            self.symbol(t.thread_statics_index),
            None,
        )?;

        let metadata_blob = match &self.metadata {
            MetadataManager::Empty => None,
            MetadataManager::Precomputed { .. } => {
                let start = self.mangler.region_symbol("EmbeddedMetadata", RegionBound::Start);
                let end = self.mangler.region_symbol("EmbeddedMetadata", RegionBound::End);
                let blob = self
                    .arena
                    .alloc(NodeKind::MetadataBlob, start.clone(), Some(end.clone()));
                graph.add_root(blob, "Metadata blob is always generated");
                header.add(ReadyToRunSectionType::EmbeddedMetadata, blob, start, Some(end))?;
                Some(blob)
            }
        };

        tracing::debug!(sections = header.len(), "attached unit tables");
        self.attachment
            .set(Attachment {
                header_node,
                modules_section,
                metadata_blob,
                header,
            })
            .map_err(|_| InternalError::AlreadyAttached)?;
        Ok(())
    }
}

fn tracked<K, V>(name: &'static str, tracker: &Arc<ConstructionTracker>) -> NodeCache<K, V>
where
    K: Eq + std::hash::Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    NodeCache::with_tracker(name, Arc::clone(tracker))
}

fn intern_extern(
    cache: &NodeCache<String, NodeId>,
    arena: &NodeArena,
    name: String,
) -> Result<NodeId, CompileError> {
    cache.get_or_add(name, |name| {
        Ok(arena.alloc(NodeKind::ExternSymbol, name.clone(), None))
    })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]

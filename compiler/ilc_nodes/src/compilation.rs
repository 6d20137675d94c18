//! The compilation driver: root, close, lay out.

use ilc_graph::{AnalyzerConfig, AnalyzerError, DependencyAnalyzer, DependencyContext, MarkedGraph};
use ilc_ir::MethodId;

use crate::code::{CodeProvider, DependencyRequest};
use crate::delegate::DelegateCreationInfo;
use crate::emit::ObjectData;
use crate::error::CompileError;
use crate::factory::NodeFactory;
use crate::header::HeaderTable;
use crate::node::{HelperKey, MethodKey, NodeId, NodeKind, RegionKind};
use crate::region::RegionLayout;

impl NodeFactory {
    /// Map a request made by some node to its canonical node.
    pub fn resolve(&self, request: DependencyRequest) -> Result<NodeId, CompileError> {
        match request {
            DependencyRequest::Call(method) => {
                if self.types().canonical_method(method) == method {
                    self.method_entrypoint(method, false)
                } else {
                    self.shadow_concrete_method(MethodKey::new(method, false))
                }
            }
            DependencyRequest::Delegate {
                delegate_type,
                target,
            } => self.delegate_ctor(delegate_type, target),
            DependencyRequest::GcStaticBase(ty) => {
                self.ready_to_run_helper(HelperKey::GetGcStaticBase(ty))
            }
            DependencyRequest::ThreadStaticBase(ty) => {
                self.ready_to_run_helper(HelperKey::GetThreadStaticBase(ty))
            }
            DependencyRequest::EagerClassConstructor(cctor) => self.eager_cctor_entry(cctor),
            DependencyRequest::Node(id) => Ok(id),
        }
    }

    /// Static dependencies of `id`. Method bodies ask `code`.
    pub fn dependencies(&self, id: NodeId, code: &dyn CodeProvider) -> Result<Vec<DependencyRequest>, CompileError> {
        let node = self.node(id);
        let types = self.types();
        let nodes = |ids: &[NodeId]| -> Vec<DependencyRequest> {
            ids.iter().copied().map(DependencyRequest::Node).collect()
        };

        let deps: Vec<DependencyRequest> = match &node.kind {
            NodeKind::MethodCode { key } if key.is_unboxing_stub => {
                nodes(&[self.method_entrypoint(key.method, false)?])
            }
            NodeKind::MethodCode { key } => {
                let mut deps = code.method_dependencies(types, key.method);
                if types.is_canonical_method(key.method) {
                    let layout = self.generic_dictionary_layout(key.method.into())?;
                    deps.push(DependencyRequest::Node(layout));
                }
                deps
            }
            NodeKind::UnboxingStub { target, .. } => nodes(&[*target]),
            NodeKind::ShadowConcreteMethod { key, canonical } => nodes(&[
                *canonical,
                self.generic_dictionary_layout(key.method.into())?,
            ]),
            NodeKind::FatFunctionPointer {
                target, dictionary, ..
            } => nodes(&[*target, *dictionary]),
            NodeKind::ThreadStaticsOffset { ty } => {
                nodes(&[self.thread_statics_block(*ty)?, self.tables().tls_start])
            }
            NodeKind::GcStaticBase { ty } => nodes(&[self.type_gc_static_desc_symbol(*ty)?]),
            NodeKind::EagerCctorEntry { cctor } => nodes(&[self.method_entrypoint(*cctor, false)?]),
            NodeKind::StandaloneGcStaticDescRegion { desc } => nodes(&[*desc]),
            NodeKind::TlsDirectory => {
                let t = self.tables();
                nodes(&[t.tls_start, t.tls_end, t.thread_statics_index])
            }
            NodeKind::ReadyToRunHeader => {
                let header = self.header_table()?;
                header.entries().map(|(_, e)| DependencyRequest::Node(e.node)).collect()
            }
            NodeKind::ModulesSection => nodes(&[self.attachment()?.header_node]),
            NodeKind::ReadyToRunHelper(HelperKey::DelegateCtor(info)) => delegate_nodes(info),
            NodeKind::ReadyToRunHelper(HelperKey::GetGcStaticBase(ty)) => {
                nodes(&[self.type_gc_static_base_symbol(*ty)?])
            }
            NodeKind::ReadyToRunHelper(HelperKey::GetThreadStaticBase(ty)) => {
                let mut deps = vec![
                    self.type_thread_statics_offset_symbol(*ty)?,
                    self.type_thread_statics_index_symbol(*ty)?,
                ];
                if types.type_desc(*ty).statics.has_thread_gc_statics() {
                    deps.push(self.type_thread_static_gc_desc_symbol(*ty)?);
                }
                nodes(&deps)
            }
            NodeKind::ExternMethod { .. }
            | NodeKind::RuntimeImport { .. }
            | NodeKind::ExternSymbol
            | NodeKind::GcStaticDesc { .. }
            | NodeKind::ThreadStaticsBlock { .. }
            | NodeKind::DictionaryLayout { .. }
            | NodeKind::Region(_)
            | NodeKind::ThreadStaticsIndex
            | NodeKind::TypeManagerIndirection
            | NodeKind::MetadataBlob => Vec::new(),
        };
        Ok(deps)
    }
}

fn delegate_nodes(info: &DelegateCreationInfo) -> Vec<DependencyRequest> {
    [Some(info.constructor()), Some(info.target()), info.thunk()]
        .into_iter()
        .flatten()
        .map(DependencyRequest::Node)
        .collect()
}

struct ClosureContext<'a> {
    factory: &'a NodeFactory,
    code: &'a dyn CodeProvider,
}

impl DependencyContext for ClosureContext<'_> {
    type Node = NodeId;
    type Request = DependencyRequest;
    type Error = CompileError;

    fn dependencies(&self, node: NodeId) -> Result<Vec<DependencyRequest>, CompileError> {
        self.factory.dependencies(node, self.code)
    }

    fn resolve(&self, request: DependencyRequest) -> Result<NodeId, CompileError> {
        self.factory.resolve(request)
    }
}

/// A marked node with its payload.
#[derive(Clone, Debug)]
pub struct EmittedNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub symbol: String,
    /// `None` for code, external and layout-only nodes.
    pub data: Option<ObjectData>,
}

#[derive(Clone, Debug)]
pub struct CompilationOutput {
    /// Marked nodes in emission order.
    pub nodes: Vec<EmittedNode>,
    pub header: HeaderTable,
    pub regions: Vec<RegionLayout>,
    /// Breadth-first rounds the closure took.
    pub rounds: usize,
}

impl CompilationOutput {
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.symbol.as_str())
    }

    pub fn find(&self, symbol: &str) -> Option<&EmittedNode> {
        self.nodes.iter().find(|n| n.symbol == symbol)
    }

    /// Layout of the region starting at `start_symbol`.
    pub fn region(&self, start_symbol: &str) -> Option<&RegionLayout> {
        self.regions.iter().find(|r| r.start_symbol == start_symbol)
    }
}

/// One closure over a factory.
///
/// A factory attaches to exactly one graph, so each factory compiles once.
pub struct Compilation<'a> {
    factory: &'a NodeFactory,
    code: &'a dyn CodeProvider,
    config: AnalyzerConfig,
}

impl<'a> Compilation<'a> {
    pub fn new(factory: &'a NodeFactory, code: &'a dyn CodeProvider, config: AnalyzerConfig) -> Self {
        Self {
            factory,
            code,
            config,
        }
    }

    /// Close over `roots` plus the unit tables, then emit and lay out every
    /// marked node.
    #[tracing::instrument(level = "debug", skip_all, fields(roots = roots.len()))]
    pub fn compile(&self, roots: &[MethodId]) -> Result<CompilationOutput, CompileError> {
        let context = ClosureContext {
            factory: self.factory,
            code: self.code,
        };
        let mut analyzer = DependencyAnalyzer::new(&context, self.config.clone());
        self.factory.attach_to_dependency_graph(&mut analyzer)?;
        for &method in roots {
            let node = self.factory.resolve(DependencyRequest::Call(method))?;
            analyzer.add_root(node, "compilation root");
        }

        let graph = analyzer.compute().map_err(|e| match e {
            AnalyzerError::WorkerPool(e) => CompileError::Workers(e),
            AnalyzerError::Context(e) => e,
        })?;

        let mut nodes = Vec::with_capacity(graph.len());
        for &id in graph.nodes() {
            let node = self.factory.node(id);
            nodes.push(EmittedNode {
                id,
                kind: node.kind.clone(),
                symbol: node.symbol.clone(),
                data: self.factory.object_data(id)?,
            });
        }
        let regions = self.layout_regions(&graph, &nodes)?;
        let header = self.factory.header_table()?.clone();

        tracing::info!(
            nodes = nodes.len(),
            regions = regions.len(),
            rounds = graph.rounds(),
            "compilation closed"
        );
        Ok(CompilationOutput {
            nodes,
            header,
            regions,
            rounds: graph.rounds(),
        })
    }

    fn layout_regions(
        &self,
        graph: &MarkedGraph<NodeId>,
        nodes: &[EmittedNode],
    ) -> Result<Vec<RegionLayout>, CompileError> {
        let alignment = self.factory.config().target().pointer_size();
        let mut layouts = Vec::new();

        for kind in RegionKind::ALL {
            let region = self.factory.tables().region(kind);
            if !graph.contains(region) {
                continue;
            }
            let members = nodes
                .iter()
                .filter(|n| kind.accepts(&n.kind))
                .filter_map(|n| Some((n.id, n.symbol.as_str(), n.data.as_ref()?)));
            layouts.push(self.layout(region, alignment, members)?);
        }

        for n in nodes {
            if let NodeKind::StandaloneGcStaticDescRegion { desc } = n.kind {
                let members = nodes
                    .iter()
                    .filter(|m| m.id == desc)
                    .filter_map(|m| Some((m.id, m.symbol.as_str(), m.data.as_ref()?)));
                layouts.push(self.layout(n.id, alignment, members)?);
            }
        }
        Ok(layouts)
    }

    fn layout<'n>(
        &self,
        region: NodeId,
        alignment: u32,
        members: impl Iterator<Item = (NodeId, &'n str, &'n ObjectData)>,
    ) -> Result<RegionLayout, CompileError> {
        let node = self.factory.node(region);
        let end = node.end_symbol.as_deref().unwrap_or_default();
        Ok(RegionLayout::build(region, &node.symbol, end, alignment, members)?)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]

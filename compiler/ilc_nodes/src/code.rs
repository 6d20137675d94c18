//! The code-generation seam.
//!
//! Code generation is not part of this crate. What the closure needs from it
//! is the list of things a method body references, expressed as
//! [`DependencyRequest`]s that the factory later resolves to nodes.

use ilc_ir::{MethodId, TypeId, TypeSystem};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::node::NodeId;

/// Something a node needs, before it is mapped to a canonical node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DependencyRequest {
    /// Direct call; shared instantiations resolve to a shadow method.
    Call(MethodId),
    /// `new Delegate(target)`; resolves to the delegate-constructor helper.
    Delegate {
        delegate_type: TypeId,
        target: MethodId,
    },
    GcStaticBase(TypeId),
    ThreadStaticBase(TypeId),
    /// Class constructor that must run at startup.
    EagerClassConstructor(MethodId),
    /// An already-resolved node.
    Node(NodeId),
}

pub trait CodeProvider: Send + Sync {
    /// References made by the body of `method`.
    fn method_dependencies(&self, types: &TypeSystem, method: MethodId) -> Vec<DependencyRequest>;
}

/// Method bodies given up front, keyed by method. An instantiated method
/// without its own entry uses the body of its typical definition.
#[derive(Debug, Default)]
pub struct StaticCodeProvider {
    bodies: RwLock<FxHashMap<MethodId, Vec<DependencyRequest>>>,
}

impl StaticCodeProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the body of `method`.
    pub fn set_body(&self, method: MethodId, requests: impl IntoIterator<Item = DependencyRequest>) {
        self.bodies.write().insert(method, requests.into_iter().collect());
    }

    #[must_use]
    pub fn with_body(
        self,
        method: MethodId,
        requests: impl IntoIterator<Item = DependencyRequest>,
    ) -> Self {
        self.set_body(method, requests);
        self
    }
}

impl CodeProvider for StaticCodeProvider {
    fn method_dependencies(&self, types: &TypeSystem, method: MethodId) -> Vec<DependencyRequest> {
        let bodies = self.bodies.read();
        bodies
            .get(&method)
            .or_else(|| bodies.get(&types.method_definition(method)))
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ilc_ir::{MethodDef, ModuleFlags, TypeDef};
    use pretty_assertions::assert_eq;

    #[test]
    fn instantiations_fall_back_to_definition_body() {
        let types = TypeSystem::new();
        let app = types.add_module("App", ModuleFlags::empty());
        let list = types.add_type(TypeDef::class(app, "List").with_generic_arity(1));
        let item = types.add_type(TypeDef::class(app, "Item"));
        let add = types.add_method(MethodDef::instance(list, "Add", 1));
        let grow = types.add_method(MethodDef::instance(list, "Grow", 0));
        let list_item = types.instantiate_type(list, &[item]);
        let add_item = list_item.and_then(|t| types.method_on_type(add, t));

        let code = StaticCodeProvider::new().with_body(add, [DependencyRequest::Call(grow)]);
        assert_eq!(
            add_item.map(|m| code.method_dependencies(&types, m)),
            Ok(vec![DependencyRequest::Call(grow)])
        );
        assert_eq!(code.method_dependencies(&types, grow), vec![]);
    }
}

//! Which entities this compilation unit owns.

use ilc_ir::{MethodId, ModuleId, TypeId, TypeSystem};
use rustc_hash::FxHashSet;

/// Ownership test the factory consults when choosing between a local
/// definition and an external reference.
pub trait CompilationModuleGroup: Send + Sync {
    fn contains_type(&self, types: &TypeSystem, ty: TypeId) -> bool;

    fn contains_method(&self, types: &TypeSystem, method: MethodId) -> bool {
        self.contains_type(types, types.method_desc(method).owning_type)
    }

    /// Modules compiled by this unit, in input order.
    fn input_modules(&self, types: &TypeSystem) -> Vec<ModuleId>;
}

/// Owns everything: whole-program compilation into one image.
#[derive(Debug, Default)]
pub struct SingleUnitGroup;

impl CompilationModuleGroup for SingleUnitGroup {
    fn contains_type(&self, _types: &TypeSystem, _ty: TypeId) -> bool {
        true
    }

    fn input_modules(&self, types: &TypeSystem) -> Vec<ModuleId> {
        types.modules()
    }
}

/// Owns the types (and instantiations of generic definitions) declared in a
/// fixed set of modules.
#[derive(Debug)]
pub struct ModuleSetGroup {
    modules: Vec<ModuleId>,
    members: FxHashSet<ModuleId>,
}

impl ModuleSetGroup {
    pub fn new(modules: impl IntoIterator<Item = ModuleId>) -> Self {
        let mut ordered = Vec::new();
        let mut members = FxHashSet::default();
        for module in modules {
            if members.insert(module) {
                ordered.push(module);
            }
        }
        Self {
            modules: ordered,
            members,
        }
    }
}

impl CompilationModuleGroup for ModuleSetGroup {
    fn contains_type(&self, types: &TypeSystem, ty: TypeId) -> bool {
        self.members.contains(&types.module_of_type(types.type_definition(ty)))
    }

    fn input_modules(&self, _types: &TypeSystem) -> Vec<ModuleId> {
        self.modules.clone()
    }
}

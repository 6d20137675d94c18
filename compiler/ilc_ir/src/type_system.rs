//! The type-system context: descriptor arenas, instantiation interning and
//! canonical (shared-code) forms.
//!
//! # Thread Safety
//!
//! Every operation takes `&self`. Arenas are append-only behind
//! `parking_lot::RwLock`; instantiation and delegate-info caches are
//! `DashMap`s, so the closure engine may derive instantiations from many
//! workers at once. Descriptors are handed out as `Arc`s and never change.
//!
//! # Canonical forms
//!
//! Only the *specific* canonical form is modelled: every reference-type
//! argument of an instantiation is replaced by the `__Canon` placeholder,
//! value-type arguments are kept (and canonicalized recursively). All
//! instantiations with the same canonical form share one code body.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;

use crate::delegate::{DelegateInfo, DelegateInitializer, DelegateThunkKind};
use crate::desc::{
    MethodDef, MethodDesc, ModuleDesc, ModuleFlags, TypeArgs, TypeDef, TypeDesc, TypeFlags,
};
use crate::ids::{MethodId, ModuleId, TypeId};

/// Name of the module that holds the well-known types.
pub const CORE_MODULE_NAME: &str = "System.Private.CoreLib";

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TypeSystemError {
    #[error("`{ty}` takes {expected} type argument(s) but {found} were supplied")]
    TypeArgumentCount {
        ty: String,
        expected: u16,
        found: usize,
    },
    #[error("`{method}` takes {expected} method type argument(s) but {found} were supplied")]
    MethodArgumentCount {
        method: String,
        expected: u16,
        found: usize,
    },
    #[error("`{method}` is already instantiated")]
    AlreadyInstantiated { method: String },
    #[error("`{method}` is not declared on `{ty}` or its generic definition")]
    MethodNotOnType { method: String, ty: String },
    #[error("`{ty}` is not a delegate type")]
    NotADelegate { ty: String },
}

/// Key of an interned method: typical definition, concrete owner and method
/// instantiation.
type MethodInstanceKey = (MethodId, TypeId, TypeArgs);

pub struct TypeSystem {
    modules: RwLock<Vec<Arc<ModuleDesc>>>,
    types: RwLock<Vec<Arc<TypeDesc>>>,
    methods: RwLock<Vec<Arc<MethodDesc>>>,
    type_instantiations: DashMap<(TypeId, TypeArgs), TypeId, FxBuildHasher>,
    method_instantiations: DashMap<MethodInstanceKey, MethodId, FxBuildHasher>,
    delegate_infos: DashMap<TypeId, Arc<DelegateInfo>, FxBuildHasher>,
    core_module: ModuleId,
    canon: TypeId,
    delegate_base: TypeId,
    initializers: [MethodId; 5],
}

impl TypeSystem {
    /// Create a type system seeded with the core module, the `__Canon`
    /// placeholder and the delegate base type with its initializers.
    pub fn new() -> Self {
        let core = Arc::new(ModuleDesc {
            name: CORE_MODULE_NAME.to_string(),
            flags: ModuleFlags::empty(),
        });
        let core_module = ModuleId::new(0);
        let mut canon_desc = type_desc_from_def(TypeDef::class(core_module, "__Canon"));
        canon_desc.flags |= TypeFlags::CANON;
        let delegate_desc = type_desc_from_def(TypeDef::class(core_module, "System.Delegate"));

        let canon = TypeId::new(0);
        let delegate_base = TypeId::new(1);
        let initializer_descs = DelegateInitializer::ALL.map(|kind| {
            Arc::new(method_desc_from_def(MethodDef::instance(
                delegate_base,
                kind.method_name(),
                kind.param_count(),
            )))
        });
        let initializer_ids =
            DelegateInitializer::ALL.map(|kind| MethodId::new(next_index(kind.slot())));

        Self {
            modules: RwLock::new(vec![core]),
            types: RwLock::new(vec![Arc::new(canon_desc), Arc::new(delegate_desc)]),
            methods: RwLock::new(initializer_descs.to_vec()),
            type_instantiations: DashMap::default(),
            method_instantiations: DashMap::default(),
            delegate_infos: DashMap::default(),
            core_module,
            canon,
            delegate_base,
            initializers: initializer_ids,
        }
    }

    // === Well-known entities ===

    pub fn core_module(&self) -> ModuleId {
        self.core_module
    }

    /// The `__Canon` placeholder substituted for reference-type arguments in
    /// shared code.
    pub fn canon_type(&self) -> TypeId {
        self.canon
    }

    pub fn delegate_base(&self) -> TypeId {
        self.delegate_base
    }

    /// The delegate-base method implementing `kind`.
    pub fn delegate_initializer(&self, kind: DelegateInitializer) -> MethodId {
        self.initializers[kind.slot()]
    }

    // === Definitions ===

    pub fn add_module(&self, name: impl Into<String>, flags: ModuleFlags) -> ModuleId {
        let mut modules = self.modules.write();
        let id = ModuleId::new(next_index(modules.len()));
        modules.push(Arc::new(ModuleDesc {
            name: name.into(),
            flags,
        }));
        id
    }

    pub fn add_type(&self, def: TypeDef) -> TypeId {
        self.alloc_type(type_desc_from_def(def))
    }

    pub fn add_method(&self, def: MethodDef) -> MethodId {
        self.alloc_method(method_desc_from_def(def))
    }

    // === Lookup ===

    pub fn module_desc(&self, id: ModuleId) -> Arc<ModuleDesc> {
        Arc::clone(&self.modules.read()[id.index()])
    }

    pub fn type_desc(&self, id: TypeId) -> Arc<TypeDesc> {
        Arc::clone(&self.types.read()[id.index()])
    }

    pub fn method_desc(&self, id: MethodId) -> Arc<MethodDesc> {
        Arc::clone(&self.methods.read()[id.index()])
    }

    pub fn modules(&self) -> Vec<ModuleId> {
        (0..self.modules.read().len())
            .map(|i| ModuleId::new(next_index(i)))
            .collect()
    }

    /// The generic definition of `ty`, or `ty` itself.
    pub fn type_definition(&self, ty: TypeId) -> TypeId {
        self.type_desc(ty).definition.unwrap_or(ty)
    }

    /// The typical definition of `method`, or `method` itself.
    pub fn method_definition(&self, method: MethodId) -> MethodId {
        self.method_desc(method).definition.unwrap_or(method)
    }

    pub fn module_of_type(&self, ty: TypeId) -> ModuleId {
        self.type_desc(ty).module
    }

    pub fn module_of_method(&self, method: MethodId) -> ModuleId {
        self.module_of_type(self.method_desc(method).owning_type)
    }

    /// Human-readable name used by diagnostics and symbol mangling.
    pub fn type_name(&self, ty: TypeId) -> String {
        self.type_desc(ty).name.clone()
    }

    pub fn method_name(&self, method: MethodId) -> String {
        let desc = self.method_desc(method);
        let mut name = format!("{}::{}", self.type_name(desc.owning_type), desc.name);
        if desc.has_instantiation() {
            name.push_str(&self.format_args(&desc.instantiation));
        }
        name
    }

    // === Instantiation ===

    /// Instantiate the generic definition `def` over `args`.
    pub fn instantiate_type(&self, def: TypeId, args: &[TypeId]) -> Result<TypeId, TypeSystemError> {
        let desc = self.type_desc(def);
        if !desc.is_generic_definition() || usize::from(desc.generic_arity) != args.len() {
            return Err(TypeSystemError::TypeArgumentCount {
                ty: desc.name.clone(),
                expected: if desc.definition.is_some() { 0 } else { desc.generic_arity },
                found: args.len(),
            });
        }
        Ok(self.intern_type(def, args.iter().copied().collect()))
    }

    /// Instantiate the method-level generic parameters of `method`.
    pub fn instantiate_method(
        &self,
        method: MethodId,
        args: &[TypeId],
    ) -> Result<MethodId, TypeSystemError> {
        let desc = self.method_desc(method);
        if desc.has_instantiation() {
            return Err(TypeSystemError::AlreadyInstantiated {
                method: self.method_name(method),
            });
        }
        if usize::from(desc.generic_arity) != args.len() {
            return Err(TypeSystemError::MethodArgumentCount {
                method: self.method_name(method),
                expected: desc.generic_arity,
                found: args.len(),
            });
        }
        let root = desc.definition.unwrap_or(method);
        Ok(self.intern_method(root, desc.owning_type, args.iter().copied().collect()))
    }

    /// The counterpart of `method` on `ty`, which must be the method's owning
    /// definition or an instantiation of it.
    pub fn method_on_type(&self, method: MethodId, ty: TypeId) -> Result<MethodId, TypeSystemError> {
        let desc = self.method_desc(method);
        let root = desc.definition.unwrap_or(method);
        let root_owner = self.method_desc(root).owning_type;
        if self.type_definition(ty) != root_owner {
            return Err(TypeSystemError::MethodNotOnType {
                method: self.method_name(method),
                ty: self.type_name(ty),
            });
        }
        Ok(self.intern_method(root, ty, desc.instantiation.clone()))
    }

    // === Canonical forms ===

    /// Specific canonical form of `ty`.
    pub fn canonical_type(&self, ty: TypeId) -> TypeId {
        let desc = self.type_desc(ty);
        let Some(def) = desc.definition else {
            return ty;
        };
        let args = self.canonicalize_args(&desc.instantiation);
        if args == desc.instantiation {
            ty
        } else {
            self.intern_type(def, args)
        }
    }

    /// Specific canonical form of `method`: the shared body the method's
    /// instantiation maps to.
    pub fn canonical_method(&self, method: MethodId) -> MethodId {
        let desc = self.method_desc(method);
        let Some(root) = desc.definition else {
            return method;
        };
        let owner = self.canonical_type(desc.owning_type);
        let args = self.canonicalize_args(&desc.instantiation);
        if owner == desc.owning_type && args == desc.instantiation {
            method
        } else {
            self.intern_method(root, owner, args)
        }
    }

    /// True when `ty` mentions `__Canon` anywhere in its instantiation.
    pub fn is_canonical_type(&self, ty: TypeId) -> bool {
        let desc = self.type_desc(ty);
        desc.is_canon() || desc.instantiation.iter().any(|&a| self.is_canonical_type(a))
    }

    /// True when `method` is shared code, through either its owner or its
    /// own instantiation.
    pub fn is_canonical_method(&self, method: MethodId) -> bool {
        let desc = self.method_desc(method);
        self.is_canonical_type(desc.owning_type)
            || desc.instantiation.iter().any(|&a| self.is_canonical_type(a))
    }

    // === Delegates ===

    /// Delegate data for the definition of `delegate_type`; computed once per
    /// definition.
    pub fn delegate_info(&self, delegate_type: TypeId) -> Result<Arc<DelegateInfo>, TypeSystemError> {
        let def = self.type_definition(delegate_type);
        if let Some(info) = self.delegate_infos.get(&def) {
            return Ok(Arc::clone(&info));
        }

        let desc = self.type_desc(def);
        let Some(invoke_param_count) = desc.delegate_arity.filter(|_| desc.is_delegate()) else {
            return Err(TypeSystemError::NotADelegate {
                ty: desc.name.clone(),
            });
        };

        let entry = self.delegate_infos.entry(def).or_insert_with(|| {
            tracing::trace!(delegate = %desc.name, "computing delegate info");
            let thunk = |kind: DelegateThunkKind| {
                self.add_method(MethodDef::instance(
                    def,
                    kind.method_name(),
                    invoke_param_count,
                ))
            };
            let native =
                desc.flags.contains(TypeFlags::NATIVE_SIGNATURE) && !desc.is_generic_definition();
            Arc::new(DelegateInfo {
                invoke_param_count,
                open_static: thunk(DelegateThunkKind::OpenStaticThunk),
                closed_static: thunk(DelegateThunkKind::ClosedStaticThunk),
                reverse_pinvoke: native.then(|| thunk(DelegateThunkKind::ReversePinvokeThunk)),
            })
        });
        Ok(Arc::clone(entry.value()))
    }

    // === Internals ===

    fn canonicalize_args(&self, args: &[TypeId]) -> TypeArgs {
        args.iter()
            .map(|&arg| {
                if self.type_desc(arg).is_value_type() {
                    self.canonical_type(arg)
                } else {
                    self.canon
                }
            })
            .collect()
    }

    fn format_args(&self, args: &[TypeId]) -> String {
        let names: SmallVec<[String; 4]> = args.iter().map(|&a| self.type_name(a)).collect();
        format!("<{}>", names.join(","))
    }

    fn intern_type(&self, def: TypeId, args: TypeArgs) -> TypeId {
        if let Some(id) = self.type_instantiations.get(&(def, args.clone())) {
            return *id;
        }
        let def_desc = self.type_desc(def);
        let desc = TypeDesc {
            name: format!("{}{}", def_desc.name, self.format_args(&args)),
            module: def_desc.module,
            flags: def_desc.flags,
            generic_arity: def_desc.generic_arity,
            definition: Some(def),
            instantiation: args.clone(),
            statics: def_desc.statics.clone(),
            delegate_arity: def_desc.delegate_arity,
        };
        *self
            .type_instantiations
            .entry((def, args))
            .or_insert_with(|| self.alloc_type(desc))
    }

    fn intern_method(&self, root: MethodId, owner: TypeId, args: TypeArgs) -> MethodId {
        let root_desc = self.method_desc(root);
        if owner == root_desc.owning_type && args.is_empty() {
            return root;
        }
        let key = (root, owner, args);
        if let Some(id) = self.method_instantiations.get(&key) {
            return *id;
        }
        let desc = MethodDesc {
            name: root_desc.name.clone(),
            owning_type: owner,
            flags: root_desc.flags,
            param_count: root_desc.param_count,
            generic_arity: root_desc.generic_arity,
            definition: Some(root),
            instantiation: key.2.clone(),
            import_symbol: root_desc.import_symbol.clone(),
        };
        *self
            .method_instantiations
            .entry(key)
            .or_insert_with(|| self.alloc_method(desc))
    }

    fn alloc_type(&self, desc: TypeDesc) -> TypeId {
        let mut types = self.types.write();
        let id = TypeId::new(next_index(types.len()));
        types.push(Arc::new(desc));
        id
    }

    fn alloc_method(&self, desc: MethodDesc) -> MethodId {
        let mut methods = self.methods.write();
        let id = MethodId::new(next_index(methods.len()));
        methods.push(Arc::new(desc));
        id
    }
}

impl Default for TypeSystem {
    fn default() -> Self {
        Self::new()
    }
}

fn next_index(len: usize) -> u32 {
    u32::try_from(len).unwrap_or_else(|_| panic!("type system arena exceeded u32::MAX entries"))
}

fn type_desc_from_def(def: TypeDef) -> TypeDesc {
    TypeDesc {
        name: def.name,
        module: def.module,
        flags: def.flags,
        generic_arity: def.generic_arity,
        definition: None,
        instantiation: TypeArgs::new(),
        statics: def.statics,
        delegate_arity: def.delegate_arity,
    }
}

fn method_desc_from_def(def: MethodDef) -> MethodDesc {
    MethodDesc {
        name: def.name,
        owning_type: def.owning_type,
        flags: def.flags,
        param_count: def.param_count,
        generic_arity: def.generic_arity,
        definition: None,
        instantiation: TypeArgs::new(),
        import_symbol: def.import_symbol,
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;

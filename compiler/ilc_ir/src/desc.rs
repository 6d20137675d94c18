//! Descriptor records.
//!
//! Descriptors are immutable once allocated. Definitions are supplied by the
//! metadata front end through [`TypeDef`] / [`MethodDef`]; instantiations are
//! derived by the [`TypeSystem`](crate::TypeSystem) on demand.

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::ids::{MethodId, ModuleId, TypeId};

bitflags! {
    /// Shape flags of a type.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct TypeFlags: u16 {
        /// Instances are unboxed values; instance methods take a byref `this`.
        const VALUE_TYPE = 1 << 0;
        /// Derives from the multicast delegate base.
        const DELEGATE = 1 << 1;
        /// The universal shared-code placeholder type (`__Canon`).
        const CANON = 1 << 2;
        /// Delegate invoke signature is representable with native calling
        /// conventions (required for reverse-native thunks).
        const NATIVE_SIGNATURE = 1 << 3;
    }
}

bitflags! {
    /// Shape flags of a method.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct MethodFlags: u16 {
        const STATIC = 1 << 0;
        const VIRTUAL = 1 << 1;
        /// Callable from native code through a reverse-native transition.
        const NATIVE_CALLABLE = 1 << 2;
        /// Body is a hand-written runtime routine; nothing is compiled.
        const RUNTIME_IMPORT = 1 << 3;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ModuleFlags: u8 {
        /// Module carries the mapping tables for a precomputed metadata blob.
        const HAS_METADATA_MAPPINGS = 1 << 0;
    }
}

pub type TypeArgs = SmallVec<[TypeId; 4]>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleDesc {
    pub name: String,
    pub flags: ModuleFlags,
}

/// Static field layout of a type, as far as the runtime tables care.
///
/// Slot numbers index pointer-sized slots of the type's GC statics block
/// (or of its thread-static block for the `thread_` fields).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StaticsLayout {
    pub gc_pointer_slots: Vec<u32>,
    pub thread_gc_pointer_slots: Vec<u32>,
    /// Size in bytes of the type's thread-static block; zero when the type
    /// has no thread statics.
    pub thread_statics_size: u32,
}

impl StaticsLayout {
    #[must_use]
    pub fn has_gc_statics(&self) -> bool {
        !self.gc_pointer_slots.is_empty()
    }

    #[must_use]
    pub fn has_thread_gc_statics(&self) -> bool {
        !self.thread_gc_pointer_slots.is_empty()
    }

    #[must_use]
    pub fn has_thread_statics(&self) -> bool {
        self.thread_statics_size > 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeDesc {
    pub name: String,
    pub module: ModuleId,
    pub flags: TypeFlags,
    /// Number of generic parameters of the definition.
    pub generic_arity: u16,
    /// Generic definition this type instantiates; `None` for definitions.
    pub definition: Option<TypeId>,
    pub instantiation: TypeArgs,
    pub statics: StaticsLayout,
    /// Length of the invoke signature, for delegate types.
    pub delegate_arity: Option<u16>,
}

impl TypeDesc {
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        self.flags.contains(TypeFlags::VALUE_TYPE)
    }

    #[must_use]
    pub fn is_delegate(&self) -> bool {
        self.flags.contains(TypeFlags::DELEGATE)
    }

    #[must_use]
    pub fn is_canon(&self) -> bool {
        self.flags.contains(TypeFlags::CANON)
    }

    #[must_use]
    pub fn is_generic_definition(&self) -> bool {
        self.generic_arity > 0 && self.definition.is_none()
    }

    #[must_use]
    pub fn has_instantiation(&self) -> bool {
        !self.instantiation.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodDesc {
    pub name: String,
    pub owning_type: TypeId,
    pub flags: MethodFlags,
    /// Explicit parameters, not counting an implicit `this`.
    pub param_count: u16,
    pub generic_arity: u16,
    /// The typical definition (on the generic type definition, without
    /// method instantiation). `None` for definitions themselves.
    pub definition: Option<MethodId>,
    pub instantiation: TypeArgs,
    /// Runtime routine symbol for runtime-imported methods.
    pub import_symbol: Option<String>,
}

impl MethodDesc {
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodFlags::STATIC)
    }

    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.flags.contains(MethodFlags::VIRTUAL)
    }

    #[must_use]
    pub fn is_native_callable(&self) -> bool {
        self.flags.contains(MethodFlags::NATIVE_CALLABLE)
    }

    #[must_use]
    pub fn is_runtime_import(&self) -> bool {
        self.flags.contains(MethodFlags::RUNTIME_IMPORT)
    }

    #[must_use]
    pub fn has_instantiation(&self) -> bool {
        !self.instantiation.is_empty()
    }

    /// Signature length as seen by a caller: explicit parameters plus the
    /// implicit `this` of instance methods.
    #[must_use]
    pub fn call_param_count(&self) -> usize {
        usize::from(self.param_count) + usize::from(!self.is_static())
    }
}

/// Front-end description of a type definition.
#[derive(Clone, Debug)]
pub struct TypeDef {
    pub(crate) name: String,
    pub(crate) module: ModuleId,
    pub(crate) flags: TypeFlags,
    pub(crate) generic_arity: u16,
    pub(crate) statics: StaticsLayout,
    pub(crate) delegate_arity: Option<u16>,
}

impl TypeDef {
    /// A reference type with no generic parameters and no statics.
    #[must_use]
    pub fn class(module: ModuleId, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module,
            flags: TypeFlags::empty(),
            generic_arity: 0,
            statics: StaticsLayout::default(),
            delegate_arity: None,
        }
    }

    #[must_use]
    pub fn value_type(module: ModuleId, name: impl Into<String>) -> Self {
        let mut def = Self::class(module, name);
        def.flags |= TypeFlags::VALUE_TYPE;
        def
    }

    /// A delegate type whose invoke method takes `invoke_arity` parameters.
    #[must_use]
    pub fn delegate(module: ModuleId, name: impl Into<String>, invoke_arity: u16) -> Self {
        let mut def = Self::class(module, name);
        def.flags |= TypeFlags::DELEGATE;
        def.delegate_arity = Some(invoke_arity);
        def
    }

    #[must_use]
    pub fn with_generic_arity(mut self, arity: u16) -> Self {
        self.generic_arity = arity;
        self
    }

    #[must_use]
    pub fn with_native_signature(mut self) -> Self {
        self.flags |= TypeFlags::NATIVE_SIGNATURE;
        self
    }

    #[must_use]
    pub fn with_statics(mut self, statics: StaticsLayout) -> Self {
        self.statics = statics;
        self
    }
}

/// Front-end description of a method definition.
#[derive(Clone, Debug)]
pub struct MethodDef {
    pub(crate) name: String,
    pub(crate) owning_type: TypeId,
    pub(crate) flags: MethodFlags,
    pub(crate) param_count: u16,
    pub(crate) generic_arity: u16,
    pub(crate) import_symbol: Option<String>,
}

impl MethodDef {
    #[must_use]
    pub fn instance(owning_type: TypeId, name: impl Into<String>, param_count: u16) -> Self {
        Self {
            name: name.into(),
            owning_type,
            flags: MethodFlags::empty(),
            param_count,
            generic_arity: 0,
            import_symbol: None,
        }
    }

    #[must_use]
    pub fn static_method(owning_type: TypeId, name: impl Into<String>, param_count: u16) -> Self {
        let mut def = Self::instance(owning_type, name, param_count);
        def.flags |= MethodFlags::STATIC;
        def
    }

    #[must_use]
    pub fn with_generic_arity(mut self, arity: u16) -> Self {
        self.generic_arity = arity;
        self
    }

    #[must_use]
    pub fn virtual_method(mut self) -> Self {
        self.flags |= MethodFlags::VIRTUAL;
        self
    }

    #[must_use]
    pub fn native_callable(mut self) -> Self {
        self.flags |= MethodFlags::NATIVE_CALLABLE;
        self
    }

    /// Mark the method as implemented by the runtime routine `symbol`.
    #[must_use]
    pub fn runtime_import(mut self, symbol: impl Into<String>) -> Self {
        self.flags |= MethodFlags::RUNTIME_IMPORT;
        self.import_symbol = Some(symbol.into());
        self
    }
}

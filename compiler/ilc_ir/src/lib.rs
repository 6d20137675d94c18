//! Descriptor model for the ilc closure engine.
//!
//! This crate stands in for the metadata reader: it owns method, type and
//! module descriptors and answers the questions the node factory asks of
//! them: the shape of a method or type, its canonical (shared-code) form and
//! the per-definition [`DelegateInfo`].
//!
//! Descriptors are addressed through copyable handles ([`MethodId`],
//! [`TypeId`], [`ModuleId`]) whose equality is descriptor identity.

mod delegate;
mod desc;
mod ids;
mod type_system;

pub use delegate::{DelegateInfo, DelegateInitializer, DelegateThunkKind};
pub use desc::{
    MethodDef, MethodDesc, MethodFlags, ModuleDesc, ModuleFlags, StaticsLayout, TypeArgs,
    TypeDef, TypeDesc, TypeFlags,
};
pub use ids::{MethodId, ModuleId, TypeId, TypeSystemEntity};
pub use type_system::{TypeSystem, TypeSystemError, CORE_MODULE_NAME};

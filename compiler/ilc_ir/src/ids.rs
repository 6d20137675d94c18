//! Compact handles into the [`TypeSystem`](crate::TypeSystem) arenas.
//!
//! Handles are plain indices: copying, hashing and comparing them is free,
//! and two handles are equal exactly when they name the same descriptor.

use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            #[inline]
            pub const fn new(index: u32) -> Self {
                Self(index)
            }

            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }

            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

define_id!(
    /// Handle to a [`ModuleDesc`](crate::ModuleDesc).
    ModuleId
);

define_id!(
    /// Handle to a [`TypeDesc`](crate::TypeDesc).
    ///
    /// Generic instantiations are interned, so `List<int>` requested twice
    /// yields the same `TypeId`.
    TypeId
);

define_id!(
    /// Handle to a [`MethodDesc`](crate::MethodDesc).
    MethodId
);

/// Either a method or a type; used where a cache is keyed by "whatever owns
/// a generic dictionary".
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum TypeSystemEntity {
    Method(MethodId),
    Type(TypeId),
}

impl From<MethodId> for TypeSystemEntity {
    fn from(id: MethodId) -> Self {
        Self::Method(id)
    }
}

impl From<TypeId> for TypeSystemEntity {
    fn from(id: TypeId) -> Self {
        Self::Type(id)
    }
}

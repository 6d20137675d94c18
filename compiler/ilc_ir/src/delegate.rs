//! Per-definition delegate data: invoke arity and pre-resolved thunks.

use std::fmt;

use crate::ids::MethodId;

/// Invocation thunks a delegate type definition provides.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DelegateThunkKind {
    /// Invokes a static target, passing every argument through.
    OpenStaticThunk,
    /// Invokes a static target with the bound first argument prepended.
    ClosedStaticThunk,
    /// Invokes a native-callable target through a reverse-native transition.
    ReversePinvokeThunk,
}

impl DelegateThunkKind {
    pub const ALL: [Self; 3] = [
        Self::OpenStaticThunk,
        Self::ClosedStaticThunk,
        Self::ReversePinvokeThunk,
    ];

    #[must_use]
    pub fn method_name(self) -> &'static str {
        match self {
            Self::OpenStaticThunk => "InvokeOpenStaticThunk",
            Self::ClosedStaticThunk => "InvokeClosedStaticThunk",
            Self::ReversePinvokeThunk => "InvokeReversePInvokeThunk",
        }
    }
}

/// Delegate-base initializer routines a delegate construction can call.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DelegateInitializer {
    OpenStaticThunk,
    ClosedStaticThunk,
    ReversePInvokeThunk,
    ClosedInstance,
    /// Checks for a fat function pointer and injects an unwrapping thunk.
    ClosedInstanceSlow,
}

impl DelegateInitializer {
    pub const ALL: [Self; 5] = [
        Self::OpenStaticThunk,
        Self::ClosedStaticThunk,
        Self::ReversePInvokeThunk,
        Self::ClosedInstance,
        Self::ClosedInstanceSlow,
    ];

    #[must_use]
    pub fn method_name(self) -> &'static str {
        match self {
            Self::OpenStaticThunk => "InitializeOpenStaticThunk",
            Self::ClosedStaticThunk => "InitializeClosedStaticThunk",
            Self::ReversePInvokeThunk => "InitializeReversePInvokeThunk",
            Self::ClosedInstance => "InitializeClosedInstance",
            Self::ClosedInstanceSlow => "InitializeClosedInstanceSlow",
        }
    }

    /// Explicit parameters of the initializer (object + function pointer,
    /// plus the thunk pointer for the static variants).
    #[must_use]
    pub fn param_count(self) -> u16 {
        match self {
            Self::ClosedInstance | Self::ClosedInstanceSlow => 2,
            Self::OpenStaticThunk | Self::ClosedStaticThunk | Self::ReversePInvokeThunk => 3,
        }
    }

    pub(crate) fn slot(self) -> usize {
        match self {
            Self::OpenStaticThunk => 0,
            Self::ClosedStaticThunk => 1,
            Self::ReversePInvokeThunk => 2,
            Self::ClosedInstance => 3,
            Self::ClosedInstanceSlow => 4,
        }
    }
}

impl fmt::Display for DelegateInitializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method_name())
    }
}

/// Static data of a delegate type definition, shared by every closed
/// instantiation of that definition.
///
/// Thunk methods live on the definition; callers holding an instantiated
/// delegate type re-specialize them with
/// [`TypeSystem::method_on_type`](crate::TypeSystem::method_on_type).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DelegateInfo {
    pub invoke_param_count: u16,
    pub(crate) open_static: MethodId,
    pub(crate) closed_static: MethodId,
    /// Absent when the invoke signature is not native-compatible or the
    /// delegate type is generic.
    pub(crate) reverse_pinvoke: Option<MethodId>,
}

impl DelegateInfo {
    #[must_use]
    pub fn thunk(&self, kind: DelegateThunkKind) -> Option<MethodId> {
        match kind {
            DelegateThunkKind::OpenStaticThunk => Some(self.open_static),
            DelegateThunkKind::ClosedStaticThunk => Some(self.closed_static),
            DelegateThunkKind::ReversePinvokeThunk => self.reverse_pinvoke,
        }
    }
}

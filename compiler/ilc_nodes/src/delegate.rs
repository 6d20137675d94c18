//! Delegate construction.
//!
//! `new D(obj, &M)` compiles to a call of one of the delegate base's
//! initializer routines. Which one, what function pointer it receives and
//! whether an invoke thunk is needed depends on whether `M` is static, on
//! whether the delegate closes over its first argument and on how `M` shares
//! code with other instantiations:
//!
//! | Target | Initializer | Target symbol | Thunk |
//! |--------|-------------|---------------|-------|
//! | static, open | `InitializeOpenStaticThunk` | entrypoint | open-static |
//! | static, open, native-callable | `InitializeReversePInvokeThunk` | entrypoint | reverse |
//! | static, closed | `InitializeClosedStaticThunk` | entrypoint | closed-static |
//! | instance | `InitializeClosedInstance` | entrypoint or shadow | none |
//! | instance, shared generic method | `InitializeClosedInstanceSlow` | fat pointer | none |
//!
//! Open instance delegates are rejected.

use ilc_ir::{DelegateInitializer, DelegateThunkKind, MethodId, TypeId};

use crate::error::{CompileError, InternalError, UnsupportedConstruct};
use crate::factory::NodeFactory;
use crate::node::{MethodKey, NodeId};

/// The nodes a delegate construction needs.
///
/// Two infos are equal when they name the same three nodes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct DelegateCreationInfo {
    constructor: NodeId,
    target: NodeId,
    thunk: Option<NodeId>,
}

impl DelegateCreationInfo {
    /// Entrypoint of the initializer routine.
    pub fn constructor(&self) -> NodeId {
        self.constructor
    }

    /// Function pointer handed to the initializer.
    pub fn target(&self) -> NodeId {
        self.target
    }

    pub fn thunk(&self) -> Option<NodeId> {
        self.thunk
    }

    /// Choose initializer, target symbol and thunk for binding
    /// `target_method` to a delegate of type `delegate_type`.
    pub fn create(
        factory: &NodeFactory,
        delegate_type: TypeId,
        target_method: MethodId,
    ) -> Result<Self, CompileError> {
        let types = factory.types();
        let target = types.method_desc(target_method);
        let info = types.delegate_info(delegate_type)?;

        let param_count_target = target.call_param_count();
        let param_count_closed = usize::from(info.invoke_param_count) + 1;
        let closed = if param_count_closed == param_count_target {
            true
        } else if param_count_closed == param_count_target + 1 {
            false
        } else {
            return Err(InternalError::DelegateArityMismatch {
                delegate: types.type_name(delegate_type),
                method: types.method_name(target_method),
                invoke: usize::from(info.invoke_param_count),
                target: param_count_target,
            }
            .into());
        };

        if target.is_static() {
            let (initializer, thunk_kind) = if closed {
                (
                    DelegateInitializer::ClosedStaticThunk,
                    DelegateThunkKind::ClosedStaticThunk,
                )
            } else if target.is_native_callable() {
                (
                    DelegateInitializer::ReversePInvokeThunk,
                    DelegateThunkKind::ReversePinvokeThunk,
                )
            } else {
                (
                    DelegateInitializer::OpenStaticThunk,
                    DelegateThunkKind::OpenStaticThunk,
                )
            };

            let Some(mut thunk) = info.thunk(thunk_kind) else {
                return Err(UnsupportedConstruct::NonNativeDelegateSignature {
                    delegate: types.type_name(delegate_type),
                    method: types.method_name(target_method),
                }
                .into());
            };
            if types.type_desc(delegate_type).has_instantiation() {
                thunk = types.method_on_type(thunk, delegate_type)?;
            }

            let created = Self {
                constructor: factory.method_entrypoint(types.delegate_initializer(initializer), false)?,
                target: factory.method_entrypoint(target_method, false)?,
                thunk: Some(factory.method_entrypoint(thunk, false)?),
            };
            log_selection(factory, delegate_type, target_method, initializer);
            return Ok(created);
        }

        if !closed {
            return Err(UnsupportedConstruct::OpenInstanceDelegate {
                delegate: types.type_name(delegate_type),
                method: types.method_name(target_method),
            }
            .into());
        }

        let use_unboxing = types.type_desc(target.owning_type).is_value_type();
        let target_canon = types.canonical_method(target_method);

        let (initializer, target_node) = if target.has_instantiation() {
            if target.is_virtual() {
                return Err(InternalError::VirtualGenericMethodDelegate {
                    delegate: types.type_name(delegate_type),
                    method: types.method_name(target_method),
                }
                .into());
            }
            if target_method == target_canon {
                (
                    DelegateInitializer::ClosedInstance,
                    factory.method_entrypoint(target_method, use_unboxing)?,
                )
            } else {
                (
                    DelegateInitializer::ClosedInstanceSlow,
                    factory.fat_function_pointer(target_method, use_unboxing)?,
                )
            }
        } else if target_method == target_canon {
            (
                DelegateInitializer::ClosedInstance,
                factory.method_entrypoint(target_method, use_unboxing)?,
            )
        } else {
            (
                DelegateInitializer::ClosedInstance,
                factory.shadow_concrete_method(MethodKey::new(target_method, use_unboxing))?,
            )
        };

        let created = Self {
            constructor: factory.method_entrypoint(types.delegate_initializer(initializer), false)?,
            target: target_node,
            thunk: None,
        };
        log_selection(factory, delegate_type, target_method, initializer);
        Ok(created)
    }
}

fn log_selection(
    factory: &NodeFactory,
    delegate_type: TypeId,
    target: MethodId,
    initializer: DelegateInitializer,
) {
    tracing::debug!(
        delegate = %factory.types().type_name(delegate_type),
        target = %factory.types().method_name(target),
        %initializer,
        "delegate construction"
    );
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;

use std::sync::Arc;

use ilc_ir::{MethodDef, ModuleFlags, TypeDef};
use pretty_assertions::assert_eq;

use super::*;
use crate::config::{FactoryConfig, TargetArch};
use crate::node::NodeKind;
use crate::partition::SingleUnitGroup;

struct Fixture {
    types: Arc<ilc_ir::TypeSystem>,
    factory: NodeFactory,
    string: TypeId,
    int: TypeId,
    util: TypeId,
    point: TypeId,
    list: TypeId,
    /// `delegate void Action(object)`
    action: TypeId,
    /// `delegate void Callback(int)` with a native-compatible signature.
    callback: TypeId,
    /// `delegate void Func<T>(object)`
    func: TypeId,
}

fn fixture() -> Fixture {
    let types = Arc::new(ilc_ir::TypeSystem::new());
    let app = types.add_module("App", ModuleFlags::empty());
    let string = types.add_type(TypeDef::class(app, "String"));
    let int = types.add_type(TypeDef::value_type(app, "Int32"));
    let util = types.add_type(TypeDef::class(app, "Util"));
    let point = types.add_type(TypeDef::value_type(app, "Point"));
    let list = types.add_type(TypeDef::class(app, "List").with_generic_arity(1));
    let action = types.add_type(TypeDef::delegate(app, "Action", 1));
    let callback = types.add_type(TypeDef::delegate(app, "Callback", 1).with_native_signature());
    let func = types.add_type(TypeDef::delegate(app, "Func", 1).with_generic_arity(1));

    let factory = NodeFactory::new(
        Arc::clone(&types),
        Arc::new(SingleUnitGroup),
        FactoryConfig::new(TargetArch::X64),
    )
    .unwrap();
    Fixture {
        types,
        factory,
        string,
        int,
        util,
        point,
        list,
        action,
        callback,
        func,
    }
}

impl Fixture {
    fn initializer(&self, kind: DelegateInitializer) -> NodeId {
        self.factory
            .method_entrypoint(self.types.delegate_initializer(kind), false)
            .unwrap()
    }

    fn thunk(&self, delegate: TypeId, kind: DelegateThunkKind) -> NodeId {
        let thunk = self.types.delegate_info(delegate).unwrap().thunk(kind).unwrap();
        self.factory.method_entrypoint(thunk, false).unwrap()
    }

    fn entry(&self, method: MethodId, unboxing: bool) -> NodeId {
        self.factory.method_entrypoint(method, unboxing).unwrap()
    }
}

// === Static targets ===

#[test]
fn open_static_uses_open_static_thunk() {
    let f = fixture();
    let target = f.types.add_method(MethodDef::static_method(f.util, "Run", 1));

    let info = DelegateCreationInfo::create(&f.factory, f.action, target).unwrap();
    assert_eq!(info.constructor(), f.initializer(DelegateInitializer::OpenStaticThunk));
    assert_eq!(info.target(), f.entry(target, false));
    assert_eq!(
        info.thunk(),
        Some(f.thunk(f.action, DelegateThunkKind::OpenStaticThunk))
    );
}

#[test]
fn closed_static_uses_closed_static_thunk() {
    let f = fixture();
    // extension-style: the bound object becomes the first argument
    let target = f.types.add_method(MethodDef::static_method(f.util, "Extend", 2));

    let info = DelegateCreationInfo::create(&f.factory, f.action, target).unwrap();
    assert_eq!(info.constructor(), f.initializer(DelegateInitializer::ClosedStaticThunk));
    assert_eq!(info.target(), f.entry(target, false));
    assert_eq!(
        info.thunk(),
        Some(f.thunk(f.action, DelegateThunkKind::ClosedStaticThunk))
    );
}

#[test]
fn native_callable_open_static_uses_reverse_thunk() {
    let f = fixture();
    let target = f
        .types
        .add_method(MethodDef::static_method(f.util, "OnEvent", 1).native_callable());

    let info = DelegateCreationInfo::create(&f.factory, f.callback, target).unwrap();
    assert_eq!(
        info.constructor(),
        f.initializer(DelegateInitializer::ReversePInvokeThunk)
    );
    assert_eq!(
        info.thunk(),
        Some(f.thunk(f.callback, DelegateThunkKind::ReversePinvokeThunk))
    );
}

#[test]
fn native_callable_without_native_signature_is_unsupported() {
    let f = fixture();
    let target = f
        .types
        .add_method(MethodDef::static_method(f.util, "OnEvent", 1).native_callable());

    let err = DelegateCreationInfo::create(&f.factory, f.action, target).unwrap_err();
    assert!(matches!(
        err,
        CompileError::Unsupported(UnsupportedConstruct::NonNativeDelegateSignature { .. })
    ));
    assert!(err.is_reportable());
}

#[test]
fn generic_delegate_thunk_is_specialized_to_the_instantiation() {
    let f = fixture();
    let func_of_string = f.types.instantiate_type(f.func, &[f.string]).unwrap();
    let target = f.types.add_method(MethodDef::static_method(f.util, "Run", 1));

    let info = DelegateCreationInfo::create(&f.factory, func_of_string, target).unwrap();
    let def_thunk = f
        .types
        .delegate_info(f.func)
        .unwrap()
        .thunk(DelegateThunkKind::OpenStaticThunk)
        .unwrap();
    let specialized = f.types.method_on_type(def_thunk, func_of_string).unwrap();
    assert_ne!(specialized, def_thunk);
    assert_eq!(info.thunk(), Some(f.entry(specialized, false)));
}

// === Instance targets ===

#[test]
fn instance_on_reference_type_binds_plain_entrypoint() {
    let f = fixture();
    let target = f.types.add_method(MethodDef::instance(f.util, "Handle", 1));

    let info = DelegateCreationInfo::create(&f.factory, f.action, target).unwrap();
    assert_eq!(info.constructor(), f.initializer(DelegateInitializer::ClosedInstance));
    assert_eq!(info.target(), f.entry(target, false));
    assert_eq!(info.thunk(), None);
}

#[test]
fn instance_on_value_type_binds_unboxing_entrypoint() {
    let f = fixture();
    let target = f.types.add_method(MethodDef::instance(f.point, "Handle", 1));

    let info = DelegateCreationInfo::create(&f.factory, f.action, target).unwrap();
    assert_eq!(info.constructor(), f.initializer(DelegateInitializer::ClosedInstance));
    assert_eq!(info.target(), f.entry(target, true));
    assert_ne!(info.target(), f.entry(target, false));
    assert!(matches!(
        f.factory.node(info.target()).kind,
        NodeKind::UnboxingStub { .. }
    ));
}

#[test]
fn shared_generic_method_binds_fat_pointer() {
    let f = fixture();
    let map = f
        .types
        .add_method(MethodDef::instance(f.util, "Map", 1).with_generic_arity(1));
    let map_of_string = f.types.instantiate_method(map, &[f.string]).unwrap();

    let info = DelegateCreationInfo::create(&f.factory, f.action, map_of_string).unwrap();
    assert_eq!(
        info.constructor(),
        f.initializer(DelegateInitializer::ClosedInstanceSlow)
    );
    assert_eq!(
        info.target(),
        f.factory.fat_function_pointer(map_of_string, false).unwrap()
    );
    assert_ne!(info.target(), f.entry(map_of_string, false));
}

#[test]
fn unshared_generic_method_binds_plain_entrypoint() {
    let f = fixture();
    let map = f
        .types
        .add_method(MethodDef::instance(f.util, "Map", 1).with_generic_arity(1));
    let map_of_int = f.types.instantiate_method(map, &[f.int]).unwrap();

    let info = DelegateCreationInfo::create(&f.factory, f.action, map_of_int).unwrap();
    assert_eq!(info.constructor(), f.initializer(DelegateInitializer::ClosedInstance));
    assert_eq!(info.target(), f.entry(map_of_int, false));
}

#[test]
fn method_on_shared_generic_type_binds_shadow() {
    let f = fixture();
    let add = f.types.add_method(MethodDef::instance(f.list, "Add", 1));
    let list_of_string = f.types.instantiate_type(f.list, &[f.string]).unwrap();
    let target = f.types.method_on_type(add, list_of_string).unwrap();

    let info = DelegateCreationInfo::create(&f.factory, f.action, target).unwrap();
    assert_eq!(info.constructor(), f.initializer(DelegateInitializer::ClosedInstance));
    let NodeKind::ShadowConcreteMethod { canonical, .. } = f.factory.node(info.target()).kind
    else {
        panic!("expected a shadow method");
    };
    assert_eq!(canonical, f.entry(f.types.canonical_method(target), false));
}

// === Rejected constructions ===

#[test]
fn open_instance_is_unsupported_and_creates_no_nodes() {
    let f = fixture();
    let target = f.types.add_method(MethodDef::instance(f.util, "Poll", 0));
    let before = f.factory.node_count();

    let err = DelegateCreationInfo::create(&f.factory, f.action, target).unwrap_err();
    assert!(matches!(
        err,
        CompileError::Unsupported(UnsupportedConstruct::OpenInstanceDelegate { .. })
    ));
    assert_eq!(f.factory.node_count(), before);
}

#[test]
fn arity_mismatch_is_internal() {
    let f = fixture();
    let target = f.types.add_method(MethodDef::static_method(f.util, "Many", 5));

    let err = DelegateCreationInfo::create(&f.factory, f.action, target).unwrap_err();
    assert!(matches!(
        err,
        CompileError::Internal(InternalError::DelegateArityMismatch {
            invoke: 1,
            target: 5,
            ..
        })
    ));
    assert!(!err.is_reportable());
}

#[test]
fn virtual_generic_method_is_internal() {
    let f = fixture();
    let visit = f.types.add_method(
        MethodDef::instance(f.util, "Visit", 1)
            .with_generic_arity(1)
            .virtual_method(),
    );
    let visit_of_int = f.types.instantiate_method(visit, &[f.int]).unwrap();

    let err = DelegateCreationInfo::create(&f.factory, f.action, visit_of_int).unwrap_err();
    assert!(matches!(
        err,
        CompileError::Internal(InternalError::VirtualGenericMethodDelegate { .. })
    ));
}

#[test]
fn non_delegate_type_is_rejected() {
    let f = fixture();
    let target = f.types.add_method(MethodDef::static_method(f.util, "Run", 1));
    let err = DelegateCreationInfo::create(&f.factory, f.util, target).unwrap_err();
    assert!(matches!(err, CompileError::TypeSystem(_)));
}

// === Identity ===

#[test]
fn repeated_creation_gives_equal_infos() {
    let f = fixture();
    let target = f.types.add_method(MethodDef::instance(f.point, "Handle", 1));
    let a = DelegateCreationInfo::create(&f.factory, f.action, target).unwrap();
    let count = f.factory.node_count();
    let b = DelegateCreationInfo::create(&f.factory, f.action, target).unwrap();
    assert_eq!(a, b);
    assert_eq!(f.factory.node_count(), count);

    let other = f.types.add_method(MethodDef::instance(f.point, "Other", 1));
    let c = DelegateCreationInfo::create(&f.factory, f.action, other).unwrap();
    assert_ne!(a, c);
}

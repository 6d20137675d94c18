use pretty_assertions::assert_eq;

use super::*;
use crate::desc::StaticsLayout;

struct Fixture {
    ts: TypeSystem,
    module: ModuleId,
    string: TypeId,
    int: TypeId,
    list: TypeId,
}

fn fixture() -> Fixture {
    let ts = TypeSystem::new();
    let module = ts.add_module("App", ModuleFlags::empty());
    let string = ts.add_type(TypeDef::class(module, "String"));
    let int = ts.add_type(TypeDef::value_type(module, "Int32"));
    let list = ts.add_type(TypeDef::class(module, "List").with_generic_arity(1));
    Fixture {
        ts,
        module,
        string,
        int,
        list,
    }
}

// === Well-known entities ===

#[test]
fn seeds_core_module_and_delegate_base() {
    let ts = TypeSystem::new();
    assert_eq!(ts.module_desc(ts.core_module()).name, CORE_MODULE_NAME);
    assert!(ts.type_desc(ts.canon_type()).is_canon());

    let init = ts.delegate_initializer(DelegateInitializer::ClosedInstanceSlow);
    let desc = ts.method_desc(init);
    assert_eq!(desc.name, "InitializeClosedInstanceSlow");
    assert_eq!(desc.owning_type, ts.delegate_base());
}

#[test]
fn every_initializer_is_distinct() {
    let ts = TypeSystem::new();
    let ids: Vec<_> = DelegateInitializer::ALL
        .iter()
        .map(|&k| ts.delegate_initializer(k))
        .collect();
    for (i, a) in ids.iter().enumerate() {
        for b in &ids[i + 1..] {
            assert_ne!(a, b);
        }
    }
}

// === Instantiation ===

#[test]
fn type_instantiation_is_interned() {
    let f = fixture();
    let a = f.ts.instantiate_type(f.list, &[f.string]).unwrap();
    let b = f.ts.instantiate_type(f.list, &[f.string]).unwrap();
    let c = f.ts.instantiate_type(f.list, &[f.int]).unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(f.ts.type_name(a), "List<String>");
    assert_eq!(f.ts.type_definition(a), f.list);
}

#[test]
fn type_instantiation_checks_arity() {
    let f = fixture();
    let err = f.ts.instantiate_type(f.list, &[f.int, f.int]).unwrap_err();
    assert_eq!(
        err,
        TypeSystemError::TypeArgumentCount {
            ty: "List".to_string(),
            expected: 1,
            found: 2,
        }
    );
    assert!(f.ts.instantiate_type(f.string, &[f.int]).is_err());
}

#[test]
fn method_on_instantiated_type_is_interned() {
    let f = fixture();
    let add = f.ts.add_method(MethodDef::instance(f.list, "Add", 1));
    let list_string = f.ts.instantiate_type(f.list, &[f.string]).unwrap();

    let a = f.ts.method_on_type(add, list_string).unwrap();
    let b = f.ts.method_on_type(add, list_string).unwrap();
    assert_eq!(a, b);
    assert_ne!(a, add);
    assert_eq!(f.ts.method_desc(a).owning_type, list_string);
    assert_eq!(f.ts.method_definition(a), add);
    assert_eq!(f.ts.method_on_type(a, f.list).unwrap(), add);
}

#[test]
fn method_on_unrelated_type_is_rejected() {
    let f = fixture();
    let add = f.ts.add_method(MethodDef::instance(f.list, "Add", 1));
    assert!(matches!(
        f.ts.method_on_type(add, f.string),
        Err(TypeSystemError::MethodNotOnType { .. })
    ));
}

#[test]
fn method_instantiation_checks_arity_and_double_instantiation() {
    let f = fixture();
    let owner = f.ts.add_type(TypeDef::class(f.module, "Util"));
    let id = f
        .ts
        .add_method(MethodDef::instance(owner, "Id", 1).with_generic_arity(1));

    let id_int = f.ts.instantiate_method(id, &[f.int]).unwrap();
    assert_eq!(f.ts.method_name(id_int), "Util::Id<Int32>");
    assert!(matches!(
        f.ts.instantiate_method(id, &[]),
        Err(TypeSystemError::MethodArgumentCount { .. })
    ));
    assert!(matches!(
        f.ts.instantiate_method(id_int, &[f.int]),
        Err(TypeSystemError::AlreadyInstantiated { .. })
    ));
}

// === Canonical forms ===

#[test]
fn reference_arguments_canonicalize_to_canon() {
    let f = fixture();
    let list_string = f.ts.instantiate_type(f.list, &[f.string]).unwrap();
    let list_canon = f.ts.instantiate_type(f.list, &[f.ts.canon_type()]).unwrap();
    assert_eq!(f.ts.canonical_type(list_string), list_canon);
    assert!(f.ts.is_canonical_type(list_canon));
    assert!(!f.ts.is_canonical_type(list_string));
}

#[test]
fn value_arguments_stay_specific() {
    let f = fixture();
    let list_int = f.ts.instantiate_type(f.list, &[f.int]).unwrap();
    assert_eq!(f.ts.canonical_type(list_int), list_int);
    assert_eq!(f.ts.canonical_type(f.string), f.string);
}

#[test]
fn nested_value_type_arguments_canonicalize_recursively() {
    let f = fixture();
    let pair = f
        .ts
        .add_type(TypeDef::value_type(f.module, "Pair").with_generic_arity(2));
    let pair_int_string = f.ts.instantiate_type(pair, &[f.int, f.string]).unwrap();
    let list_pair = f.ts.instantiate_type(f.list, &[pair_int_string]).unwrap();

    let canon = f.ts.canonical_type(list_pair);
    assert_eq!(f.ts.type_name(canon), "List<Pair<Int32,__Canon>>");
}

#[test]
fn canonical_method_maps_shared_instantiations_together() {
    let f = fixture();
    let other = f.ts.add_type(TypeDef::class(f.module, "Object"));
    let add = f.ts.add_method(MethodDef::instance(f.list, "Add", 1));
    let on_string = f
        .ts
        .method_on_type(add, f.ts.instantiate_type(f.list, &[f.string]).unwrap())
        .unwrap();
    let on_object = f
        .ts
        .method_on_type(add, f.ts.instantiate_type(f.list, &[other]).unwrap())
        .unwrap();

    let canon = f.ts.canonical_method(on_string);
    assert_ne!(canon, on_string);
    assert_eq!(canon, f.ts.canonical_method(on_object));
    assert!(f.ts.is_canonical_method(canon));
    assert_eq!(f.ts.canonical_method(canon), canon);
}

#[test]
fn non_generic_method_is_its_own_canonical_form() {
    let f = fixture();
    let m = f.ts.add_method(MethodDef::static_method(f.string, "Concat", 2));
    assert_eq!(f.ts.canonical_method(m), m);
    assert!(!f.ts.is_canonical_method(m));
}

// === Delegates ===

#[test]
fn delegate_info_is_computed_once_per_definition() {
    let f = fixture();
    let func = f
        .ts
        .add_type(TypeDef::delegate(f.module, "Func", 1).with_generic_arity(1));
    let func_int = f.ts.instantiate_type(func, &[f.int]).unwrap();
    let func_string = f.ts.instantiate_type(func, &[f.string]).unwrap();

    let a = f.ts.delegate_info(func_int).unwrap();
    let b = f.ts.delegate_info(func_string).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.invoke_param_count, 1);
    assert!(a.thunk(DelegateThunkKind::ReversePinvokeThunk).is_none());
}

#[test]
fn native_signature_delegate_gets_reverse_thunk() {
    let f = fixture();
    let callback = f
        .ts
        .add_type(TypeDef::delegate(f.module, "Callback", 2).with_native_signature());
    let info = f.ts.delegate_info(callback).unwrap();
    let thunk = info.thunk(DelegateThunkKind::ReversePinvokeThunk).unwrap();
    assert_eq!(f.ts.method_desc(thunk).owning_type, callback);
    assert_eq!(
        f.ts.method_desc(thunk).name,
        DelegateThunkKind::ReversePinvokeThunk.method_name()
    );
}

#[test]
fn generic_delegate_never_gets_reverse_thunk() {
    let f = fixture();
    let action = f.ts.add_type(
        TypeDef::delegate(f.module, "Action", 1)
            .with_generic_arity(1)
            .with_native_signature(),
    );
    let info = f.ts.delegate_info(action).unwrap();
    assert!(info.thunk(DelegateThunkKind::ReversePinvokeThunk).is_none());
}

#[test]
fn delegate_info_rejects_non_delegates() {
    let f = fixture();
    assert!(matches!(
        f.ts.delegate_info(f.string),
        Err(TypeSystemError::NotADelegate { .. })
    ));
}

// === Descriptors ===

#[test]
fn statics_layout_queries() {
    let f = fixture();
    let holder = f.ts.add_type(TypeDef::class(f.module, "Holder").with_statics(StaticsLayout {
        gc_pointer_slots: vec![0, 2],
        thread_gc_pointer_slots: vec![],
        thread_statics_size: 16,
    }));
    let desc = f.ts.type_desc(holder);
    assert!(desc.statics.has_gc_statics());
    assert!(desc.statics.has_thread_statics());
    assert!(!f.ts.type_desc(f.string).statics.has_gc_statics());
}

#[test]
fn call_param_count_includes_this() {
    let f = fixture();
    let inst = f.ts.add_method(MethodDef::instance(f.string, "Substring", 2));
    let stat = f.ts.add_method(MethodDef::static_method(f.string, "Join", 2));
    assert_eq!(f.ts.method_desc(inst).call_param_count(), 3);
    assert_eq!(f.ts.method_desc(stat).call_param_count(), 2);
}

mod proptest_interning {
    use super::fixture;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn instantiation_is_idempotent(picks in proptest::collection::vec(0usize..3, 1..16)) {
            let f = fixture();
            let args = [f.int, f.string, f.ts.canon_type()];
            let first: Vec<_> = picks
                .iter()
                .map(|&i| f.ts.instantiate_type(f.list, &[args[i]]).unwrap())
                .collect();
            let second: Vec<_> = picks
                .iter()
                .map(|&i| f.ts.instantiate_type(f.list, &[args[i]]).unwrap())
                .collect();
            prop_assert_eq!(first, second);
        }
    }
}

//! Tests for the plan registry

use crate::*;
use pretty_assertions::assert_eq;
use std::any::TypeId;
use std::sync::Arc;

crate::contract! {
    pub trait Orders {
        fn get_orders(&self, customer: i32) -> Vec<i32>;
        #[procedure(name = "usp_Count", schema = "sales")]
        fn count(&self) -> i32;
        async fn get_orders_async(&self, customer: i32) -> Vec<i32>;
    }
}

crate::contract! {
    pub trait Empty {}
}

struct Concrete;

impl Contract for Concrete {
    fn describe() -> ContractDescription {
        ContractDescription::concrete("Concrete")
            .method(MethodSignature::new("Ping", TypeDesc::Unit))
    }
}

struct Broken;

impl Contract for Broken {
    fn describe() -> ContractDescription {
        ContractDescription::interface("Broken")
            .method(MethodSignature::new("Fine", TypeDesc::Unit))
            .method(MethodSignature::new(
                "TooWide",
                TypeDesc::Tuple(vec![TypeDesc::sequence(<i32 as SqlType>::describe()); 8]),
            ))
    }
}

#[test]
fn test_macro_description() {
    let description = <dyn Orders as Contract>::describe();

    assert_eq!(description.name, "Orders");
    assert_eq!(description.kind, ContractKind::Interface);
    let names: Vec<_> = description.methods.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["get_orders", "count", "get_orders_async"]);

    let count = &description.methods[1];
    assert_eq!(
        count.annotations,
        vec![
            ("name".to_string(), "usp_Count".to_string()),
            ("schema".to_string(), "sales".to_string()),
        ]
    );
    assert!(description.methods[2].is_async);
    assert_eq!(
        description.methods[0].params,
        vec![ParamSignature::of::<i32>("customer")]
    );
}

#[test]
fn test_dispatch_table_compiles_every_method() {
    let registry = PlanRegistry::default();
    let table = registry.dispatch_table::<dyn Orders>().unwrap();

    assert_eq!(table.contract(), "Orders");
    assert_eq!(table.len(), 3);
    assert_eq!(registry.plan_count(), 3);
    assert_eq!(
        table.get("count").unwrap().command_text(),
        "[sales].[usp_Count]"
    );
    assert_eq!(
        table.get("get_orders_async").unwrap().command_text(),
        "[dbo].[get_orders]"
    );
    assert!(table.get("missing").is_none());
}

#[test]
fn test_zero_method_contract() {
    let registry = PlanRegistry::default();
    let table = registry.dispatch_table::<dyn Empty>().unwrap();

    assert!(table.is_empty());
    assert_eq!(table.methods().count(), 0);
    assert_eq!(registry.plan_count(), 0);
}

#[test]
fn test_repeated_lookups_share_plans() {
    let registry = PlanRegistry::default();
    let first = registry.dispatch_table::<dyn Orders>().unwrap();
    let second = registry.dispatch_table::<dyn Orders>().unwrap();

    assert!(Arc::ptr_eq(&first, &second));

    let description = <dyn Orders as Contract>::describe();
    let plan = registry
        .plan(TypeId::of::<dyn Orders>(), &description, &description.methods[0])
        .unwrap();
    assert!(Arc::ptr_eq(&plan, first.get("get_orders").unwrap()));
}

#[test]
fn test_concurrent_first_use_observes_one_plan() {
    let registry = Arc::new(PlanRegistry::default());

    let tables: Vec<Arc<DispatchTable>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                scope.spawn(move || registry.dispatch_table::<dyn Orders>().unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let canonical = registry.dispatch_table::<dyn Orders>().unwrap();
    for table in &tables {
        for method in ["get_orders", "count", "get_orders_async"] {
            assert!(Arc::ptr_eq(
                table.get(method).unwrap(),
                canonical.get(method).unwrap()
            ));
        }
    }
    assert_eq!(registry.plan_count(), 3);
}

#[test]
fn test_concrete_contract_rejected() {
    let registry = PlanRegistry::default();
    let err = registry.dispatch_table::<Concrete>().unwrap_err();

    assert!(matches!(
        err,
        SprocError::ContractShape(ShapeError {
            reason: ShapeErrorReason::NotAnInterface,
            ..
        })
    ));
    assert_eq!(registry.plan_count(), 0);
}

#[test]
fn test_shape_error_is_not_cached() {
    let registry = PlanRegistry::default();

    for _ in 0..2 {
        let err = registry.dispatch_table::<Broken>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ContractShape);
    }
    // the well-formed method stays cached, the contract never gets a table
    assert_eq!(registry.plan_count(), 1);
}

#[test]
fn test_registries_are_isolated() {
    let sales = PlanRegistry::new(ProxyConfig::default().with_default_schema("sales")).unwrap();
    let table = sales.dispatch_table::<dyn Orders>().unwrap();

    assert_eq!(
        table.get("get_orders").unwrap().command_text(),
        "[sales].[get_orders]"
    );
    assert_eq!(PlanRegistry::default().plan_count(), 0);
}

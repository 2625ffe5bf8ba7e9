//! End-to-end tests for contract proxies over the mock connection

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use sproc::testing::{MockConnection, MockFailure, MockResponse};
use sproc::{
    Connection, ConnectionExt, DbType, DecodeError, ErrorKind, ProxyConfig, ProxyFactory,
    ResultSet, ShapeError, ShapeErrorReason, SprocError, Value, contract, generate_proxy, record,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("sproc=debug")
        .try_init();
}

record! {
    #[derive(Debug, Clone, PartialEq)]
    pub struct Customer {
        pub id: i32,
        pub name: String,
        pub joined: Option<NaiveDate>,
    }
}

record! {
    #[table_type(name = "OrderLineList", schema = "sales")]
    #[derive(Debug, Clone, PartialEq)]
    pub struct OrderLine {
        pub sku: String,
        pub quantity: i32,
    }
}

record! {
    #[derive(Debug, Clone, PartialEq)]
    pub struct Filter {
        pub region: String,
        pub active: bool,
    }
}

contract! {
    /// Customer procedures
    pub trait Customers {
        fn no_arguments(&self);

        /// Returns the procedure's status code
        fn return_value(&self) -> i32;

        fn with_argument(&self, name: &str);

        fn find_customers(&self, filter: Filter) -> Vec<Customer>;

        fn customer_names(&self) -> Vec<String>;

        #[procedure(name = "usp_CustomerReport", schema = "reporting")]
        fn report(&self, since: NaiveDate) -> (Vec<Customer>, Vec<i64>);

        fn totals(&self, customer: i32, total: &mut i64, #[return_value] status: &mut i32);

        #[procedure(schema = "sales")]
        fn add_lines(&self, order: i32, lines: Vec<OrderLine>) -> Vec<OrderLine>;

        async fn find_customers_async(&self, filter: Filter) -> Vec<Customer>;

        async fn touch_async(&self, id: i32) -> i32;
    }
}

record! {
    #[derive(Debug, Clone, PartialEq)]
    pub struct Item {
        pub id: i32,
    }
}

contract! {
    pub trait Inventory {
        fn items(&self, total: &mut i32) -> Vec<Item>;

        fn check(&self, return_value: i32) -> i32;
    }
}

contract! {
    pub trait AsyncOutputs {
        async fn load_async(&self, total: &mut i32);
    }
}

contract! {
    pub trait Nothing {}
}

fn customer_set(rows: &[(i32, &str)]) -> ResultSet {
    ResultSet::from_values(
        &["Id", "Name", "Joined"],
        rows.iter()
            .map(|(id, name)| vec![Value::Int32(*id), Value::String(name.to_string()), Value::Null])
            .collect(),
    )
}

fn proxy(connection: &MockConnection) -> sproc::Proxy<dyn Customers> {
    connection.shared().generate_proxy::<dyn Customers>().unwrap()
}

// ============================================================================
// Proxy creation
// ============================================================================

#[test]
fn test_missing_connection_is_precondition_error() {
    let err = generate_proxy::<dyn Customers>(None, Duration::from_secs(30)).unwrap_err();

    assert!(matches!(err, SprocError::Precondition(_)));
    assert_eq!(err.kind(), ErrorKind::Precondition);
}

#[test]
fn test_zero_method_contract_proxy() {
    let connection = MockConnection::new();
    let proxy = connection.shared().generate_proxy::<dyn Nothing>().unwrap();

    assert!(proxy.dispatch_table().is_empty());
    assert_eq!(connection.commands_created(), 0);
}

#[test]
fn test_async_output_contract_rejected() {
    let connection = MockConnection::new();
    let err = connection
        .shared()
        .generate_proxy::<dyn AsyncOutputs>()
        .unwrap_err();

    match err {
        SprocError::ContractShape(ShapeError {
            contract,
            method,
            reason,
        }) => {
            assert_eq!(contract, "AsyncOutputs");
            assert_eq!(method, "load_async");
            assert_eq!(reason, ShapeErrorReason::AsyncOutputParameter("total".into()));
        }
        other => panic!("expected a shape error, got {other:?}"),
    }
}

#[test]
fn test_proxies_share_dispatch_table() {
    let connection = MockConnection::new();
    let first = proxy(&connection);
    let second = proxy(&connection);

    assert!(Arc::ptr_eq(first.dispatch_table(), second.dispatch_table()));
    assert_eq!(first.timeout(), Duration::from_secs(30));
}

#[test]
fn test_factory_with_own_config() {
    let connection = MockConnection::new();
    let factory = ProxyFactory::new(
        ProxyConfig::default()
            .with_default_schema("app")
            .with_command_timeout_secs(3),
    )
    .unwrap();
    let proxy = factory.create::<dyn Customers>(connection.shared()).unwrap();

    proxy.no_arguments().unwrap();

    let executed = connection.last_executed().unwrap();
    assert_eq!(executed.text, "[app].[no_arguments]");
    assert_eq!(executed.timeout, Duration::from_secs(3));
}

// ============================================================================
// Calls
// ============================================================================

#[test]
fn test_no_arguments() {
    init_tracing();
    let connection = MockConnection::new();

    proxy(&connection).no_arguments().unwrap();

    let executed = connection.last_executed().unwrap();
    assert_eq!(executed.text, "[dbo].[no_arguments]");
    assert!(executed.parameters.is_empty());
}

#[test]
fn test_return_value() {
    let connection = MockConnection::new();
    connection.respond("[dbo].[return_value]", MockResponse::new().with_return_value(1));

    assert_eq!(proxy(&connection).return_value().unwrap(), 1);
}

#[test]
fn test_single_string_argument() {
    let connection = MockConnection::new();

    proxy(&connection).with_argument("foo").unwrap();

    let executed = connection.last_executed().unwrap();
    assert_eq!(executed.parameters.len(), 1);
    assert_eq!(executed.parameters[0].name, "name");
    assert_eq!(executed.parameters[0].value, Value::String("foo".into()));
}

#[test]
fn test_record_argument_and_record_rows() {
    let connection = MockConnection::new();
    connection.respond(
        "[dbo].[find_customers]",
        MockResponse::new().with_result_set(customer_set(&[(1, "Ada"), (2, "Bo")])),
    );

    let customers = proxy(&connection)
        .find_customers(Filter {
            region: "EU".into(),
            active: true,
        })
        .unwrap();

    assert_eq!(
        customers,
        vec![
            Customer {
                id: 1,
                name: "Ada".into(),
                joined: None
            },
            Customer {
                id: 2,
                name: "Bo".into(),
                joined: None
            },
        ]
    );
    let executed = connection.last_executed().unwrap();
    let names: Vec<_> = executed.parameters.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["region", "active"]);
    assert_eq!(executed.parameters[1].value, Value::Bool(true));
}

#[test]
fn test_scalar_rows() {
    let connection = MockConnection::new();
    connection.respond(
        "[dbo].[customer_names]",
        MockResponse::new().with_result_set(ResultSet::from_values(
            &["Name"],
            vec![vec![Value::String("Ada".into())], vec![Value::String("Bo".into())]],
        )),
    );

    assert_eq!(
        proxy(&connection).customer_names().unwrap(),
        vec!["Ada".to_string(), "Bo".to_string()]
    );
}

#[test]
fn test_multiple_result_sets() {
    let connection = MockConnection::new();
    connection.respond(
        "[reporting].[usp_CustomerReport]",
        MockResponse::new()
            .with_result_set(customer_set(&[(1, "Ada")]))
            .with_result_set(ResultSet::from_values(
                &["Total"],
                vec![vec![Value::Int64(10)], vec![Value::Int32(5)]],
            )),
    );

    let (customers, totals) = proxy(&connection)
        .report(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        .unwrap();

    assert_eq!(customers.len(), 1);
    assert_eq!(totals, vec![10, 5]);
}

#[test]
fn test_row_type_mismatch() {
    let connection = MockConnection::new();
    connection.respond(
        "[dbo].[find_customers]",
        MockResponse::new().with_result_set(ResultSet::from_values(
            &["Id", "Name", "Joined"],
            vec![vec![
                Value::String("one".into()),
                Value::String("Ada".into()),
                Value::Null,
            ]],
        )),
    );

    let err = proxy(&connection)
        .find_customers(Filter {
            region: "EU".into(),
            active: false,
        })
        .unwrap_err();

    assert!(matches!(
        err,
        SprocError::Decode(DecodeError::TypeMismatch { ref column, .. }) if column == "id"
    ));
}

#[test]
fn test_output_and_return_value_parameters() {
    let connection = MockConnection::new();
    connection.respond(
        "[dbo].[totals]",
        MockResponse::new()
            .with_output("total", Value::Int64(1200))
            .with_return_value(0),
    );

    let mut total = 0i64;
    let mut status = -1;
    proxy(&connection).totals(7, &mut total, &mut status).unwrap();

    assert_eq!(total, 1200);
    assert_eq!(status, 0);
    assert_eq!(
        sproc::render_call(
            proxy(&connection).dispatch_table().get("totals").unwrap(),
            &[
                sproc::Argument::into_arg(7i32),
                sproc::Argument::into_arg(&mut total),
                sproc::Argument::into_arg(&mut status),
            ],
        )
        .unwrap(),
        "[dbo].[totals](@customer = 7, [Out] @total, @status)"
    );
}

#[test]
fn test_failed_call_leaves_outputs() {
    let connection = MockConnection::new();
    connection.respond(
        "[dbo].[totals]",
        MockResponse::new()
            .with_output("total", Value::Int64(1200))
            .failing(MockFailure::Timeout("timed out after 30s".into())),
    );

    let mut total = 5i64;
    let mut status = 9;
    let err = proxy(&connection)
        .totals(7, &mut total, &mut status)
        .unwrap_err();

    assert!(matches!(err, SprocError::Timeout(_)));
    assert_eq!(total, 5);
    assert_eq!(status, 9);
}

#[test]
fn test_row_decode_failure_leaves_outputs() {
    let connection = MockConnection::new();
    connection.respond(
        "[dbo].[items]",
        MockResponse::new()
            .with_output("total", Value::Int32(42))
            .with_result_set(ResultSet::from_values(
                &["id"],
                vec![vec![Value::String("x".into())]],
            )),
    );
    let inventory = connection.shared().generate_proxy::<dyn Inventory>().unwrap();

    let mut total = 5;
    let err = inventory.items(&mut total).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Decode);
    assert_eq!(total, 5);

    connection.respond(
        "[dbo].[items]",
        MockResponse::new()
            .with_output("total", Value::Int32(42))
            .with_result_set(ResultSet::from_values(&["id"], vec![vec![Value::Int32(3)]])),
    );
    assert_eq!(inventory.items(&mut total).unwrap(), vec![Item { id: 3 }]);
    assert_eq!(total, 42);
}

#[test]
fn test_parameter_named_return_value_keeps_status() {
    let connection = MockConnection::new();
    connection.respond("[dbo].[check]", MockResponse::new().with_return_value(1));
    let inventory = connection.shared().generate_proxy::<dyn Inventory>().unwrap();

    assert_eq!(inventory.check(77).unwrap(), 1);

    let executed = connection.last_executed().unwrap();
    assert_eq!(executed.parameters.len(), 2);
    assert_eq!(executed.parameters[0].name, "return_value");
    assert_eq!(executed.parameters[0].value, Value::Int32(77));
}

#[test]
fn test_table_valued_parameter_round_trip() {
    let connection = MockConnection::new();
    let lines = vec![
        OrderLine {
            sku: "A-1".into(),
            quantity: 2,
        },
        OrderLine {
            sku: "B-2".into(),
            quantity: 1,
        },
    ];
    connection.respond(
        "[sales].[add_lines]",
        MockResponse::new().with_result_set(ResultSet::from_values(
            &["Sku", "Quantity"],
            vec![
                vec![Value::String("A-1".into()), Value::Int32(2)],
                vec![Value::String("B-2".into()), Value::Int32(1)],
            ],
        )),
    );

    let echoed = proxy(&connection).add_lines(42, lines.clone()).unwrap();
    assert_eq!(echoed, lines);

    let executed = connection.last_executed().unwrap();
    let parameter = executed.parameter("lines").unwrap();
    assert_eq!(parameter.db_type, DbType::Structured);
    let table = parameter.table.as_ref().unwrap();
    assert_eq!(table.qualified_type_name(), "[sales].[OrderLineList]");
    assert_eq!(
        table.columns,
        vec![
            ("sku".to_string(), DbType::String),
            ("quantity".to_string(), DbType::Int32),
        ]
    );
    assert_eq!(table.rows.len(), 2);
}

// ============================================================================
// Async calls
// ============================================================================

#[tokio::test]
async fn test_async_call_strips_suffix() {
    let connection = MockConnection::new();
    connection.respond(
        "[dbo].[find_customers]",
        MockResponse::new().with_result_set(customer_set(&[(3, "Cy")])),
    );
    let proxy = proxy(&connection);

    let customers = proxy
        .find_customers_async(Filter {
            region: "US".into(),
            active: true,
        })
        .await
        .unwrap();

    assert_eq!(customers[0].name, "Cy");
    let executed = connection.last_executed().unwrap();
    assert_eq!(executed.text, "[dbo].[find_customers]");
    assert!(executed.asynchronous);
}

#[tokio::test]
async fn test_async_return_value_and_failure() {
    let connection = MockConnection::new();
    let proxy = proxy(&connection);

    connection.respond("[dbo].[touch]", MockResponse::new().with_return_value(4));
    assert_eq!(proxy.touch_async(1).await.unwrap(), 4);

    connection.respond(
        "[dbo].[touch]",
        MockResponse::new().failing(MockFailure::Driver("connection reset".into())),
    );
    let err = proxy.touch_async(1).await.unwrap_err();
    assert!(err.is_execution());
}

#[tokio::test]
async fn test_concurrent_async_calls_share_plans() {
    let connection = MockConnection::new();
    connection.respond("[dbo].[touch]", MockResponse::new().with_return_value(1));
    let shared: Arc<dyn Connection> = connection.shared();

    let handles: Vec<_> = (0..8)
        .map(|id| {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                let proxy = shared.generate_proxy::<dyn Customers>().unwrap();
                proxy.touch_async(id).await.unwrap()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap(), 1);
    }
    assert_eq!(connection.executed().len(), 8);
}

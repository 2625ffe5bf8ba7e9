//! Tests for proxy configuration

use crate::*;
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::time::Duration;

#[test]
fn test_default_config() {
    let config = ProxyConfig::default();

    assert_eq!(config.default_schema(), "dbo");
    assert_eq!(config.async_suffixes(), &["_async".to_string(), "Async".to_string()]);
    assert_eq!(config.command_timeout(), Duration::from_secs(30));
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_from_toml() {
    let config = ProxyConfig::from_toml_str(indoc! {r#"
        default_schema = "sales"
        async_suffixes = ["Later"]
        command_timeout_secs = 5
    "#})
    .unwrap();

    assert_eq!(config.default_schema(), "sales");
    assert_eq!(config.async_suffixes(), &["Later".to_string()]);
    assert_eq!(config.command_timeout(), Duration::from_secs(5));
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let config = ProxyConfig::from_toml_str("command_timeout_secs = 90").unwrap();

    assert_eq!(config.default_schema(), "dbo");
    assert_eq!(config.async_suffixes().len(), 2);
    assert_eq!(config.command_timeout(), Duration::from_secs(90));
}

#[test]
fn test_invalid_configs_rejected() {
    let cases = [
        "default_schema = \"  \"",
        "async_suffixes = [\"\"]",
        "command_timeout_secs = 0",
        "command_timeout_secs = \"soon\"",
    ];
    for source in cases {
        let err = ProxyConfig::from_toml_str(source).unwrap_err();
        assert!(
            matches!(err, SprocError::Configuration(_)),
            "{source} gave {err:?}"
        );
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }
}

#[test]
fn test_registries_reject_invalid_builder_configs() {
    let cases = [
        ProxyConfig::default().with_default_schema(""),
        ProxyConfig::default().with_command_timeout_secs(0),
        ProxyConfig::default().with_async_suffixes([""]),
    ];
    for config in cases {
        let err = PlanRegistry::new(config.clone()).unwrap_err();
        assert!(matches!(err, SprocError::Configuration(_)), "{config:?} gave {err:?}");
        assert_eq!(err.kind(), ErrorKind::Precondition);

        let err = ProxyFactory::new(config).unwrap_err();
        assert!(matches!(err, SprocError::Configuration(_)));
    }

    assert!(PlanRegistry::new(ProxyConfig::default().with_default_schema("audit")).is_ok());
}

#[test]
fn test_builder_chain() {
    let config = ProxyConfig::default()
        .with_default_schema("audit")
        .with_async_suffixes(["_later"])
        .with_command_timeout_secs(1);

    assert_eq!(config.default_schema(), "audit");
    assert_eq!(config.async_suffixes(), &["_later".to_string()]);
    assert_eq!(config.command_timeout(), Duration::from_secs(1));
}

// ============================================================================
// Async suffix stripping
// ============================================================================

#[test]
fn test_strip_async_suffix() {
    let config = ProxyConfig::default();

    assert_eq!(config.strip_async_suffix("get_orders_async"), "get_orders");
    assert_eq!(config.strip_async_suffix("GetOrdersAsync"), "GetOrders");
    assert_eq!(config.strip_async_suffix("GetOrdersASYNC"), "GetOrders");
    assert_eq!(config.strip_async_suffix("get_orders"), "get_orders");
}

#[test]
fn test_strip_async_suffix_never_empties_name() {
    let config = ProxyConfig::default();

    assert_eq!(config.strip_async_suffix("Async"), "Async");
    assert_eq!(config.strip_async_suffix("_async"), "_async");
}

#[test]
fn test_strip_async_suffix_first_match_wins() {
    let config = ProxyConfig::default().with_async_suffixes(["Async", "_async"]);

    // "Async" matches "_async" case-insensitively and leaves the underscore
    assert_eq!(config.strip_async_suffix("load_async"), "load_");
}

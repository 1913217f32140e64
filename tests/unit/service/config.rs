use super::*;
use crate::params::Scope;

#[test]
fn empty_object_is_the_default_config() {
    let cfg = ServiceConfig::from_json_str("{}").unwrap();
    assert_eq!(cfg, ServiceConfig::default());
    assert_eq!(cfg.growth.fallback_cagr, 0.02);
    assert_eq!(cfg.render_timeout(), Duration::from_secs(5));
    assert_eq!(cfg.theme().name, "light");
}

#[test]
fn nested_sections_fill_in_missing_fields() {
    let cfg = ServiceConfig::from_json_str(
        r#"{"bind":"127.0.0.1:9000","pool_size":2,"growth":{"fallback_cagr":0.015},"fonts":{"load_system_fonts":false},"theme":"dark"}"#,
    )
    .unwrap();
    assert_eq!(cfg.pool_size, 2);
    assert_eq!(cfg.growth.fallback_cagr, 0.015);
    assert!(!cfg.fonts.load_system_fonts);
    assert!(cfg.fonts.files.is_empty());
    assert_eq!(cfg.theme().name, "dark");

    let source = cfg.module_source();
    assert_eq!(source.pool_size, 2);
    assert!(!source.load_system_fonts);
    assert_eq!(source.max_pages, cfg.memory_max_pages);
}

#[test]
fn unknown_keys_are_rejected() {
    let err = ServiceConfig::from_json_str(r#"{"pool":4}"#).unwrap_err();
    assert_eq!(err.kind(), "validation");
    let err = ServiceConfig::from_json_str(r#"{"growth":{"fallback":0.01}}"#).unwrap_err();
    assert_eq!(err.kind(), "validation");
}

#[test]
fn out_of_range_values_fail_validation() {
    for json in [
        r#"{"bind":"not-an-address"}"#,
        r#"{"pool_size":0}"#,
        r#"{"render_timeout_ms":0}"#,
        r#"{"growth":{"fallback_cagr":0.5}}"#,
        r#"{"memory_max_pages":1}"#,
        r#"{"memory_max_pages":70000}"#,
        r#"{"theme":"sepia"}"#,
    ] {
        let err = ServiceConfig::from_json_str(json).unwrap_err();
        assert_eq!(err.kind(), "validation", "{json}");
    }
}

#[test]
fn defaults_query_overrides_builtin_state() {
    let cfg = ServiceConfig::from_json_str(r#"{"defaults":"c=bra&t=deu&tg=0.01&h=40&by=2020"}"#)
        .unwrap();
    let state = cfg.default_state();
    assert_eq!(state.chaser.as_str(), "BRA");
    assert_eq!(state.target.as_str(), "DEU");
    assert_eq!(state.target_growth, 0.01);
    assert_eq!(state.horizon_years, 40);
    assert_eq!(state.base_year, 2020);
    assert_eq!(state.scope, Scope::Country);
}

#[test]
fn defaults_may_not_move_omitted_fields() {
    for defaults in ["tm=static", "v=table", "ms=0", "ac=0", "at=false", "scope=region"] {
        let json = format!(r#"{{"defaults":"{defaults}"}}"#);
        let err = ServiceConfig::from_json_str(&json).unwrap_err();
        assert_eq!(err.kind(), "validation", "{defaults}");
        assert!(err.to_string().contains("built-in value"), "{err}");
    }
}

#[test]
fn shared_urls_round_trip_under_configured_defaults() {
    let cfg = ServiceConfig::from_json_str(r#"{"defaults":"c=CHN&t=DEU&h=60&gy=10"}"#).unwrap();
    let defaults = cfg.default_state();
    for q in [
        "tm=growing&tg=0.03&v=chart&ms=1&scope=country",
        "tm=static&v=table&ms=0&ac=0&at=0",
        "scope=region&cr=IN-KA&tr=US-TX&cg=0.07",
    ] {
        let s = decode(q, &defaults);
        assert_eq!(decode(&crate::params::encode(&s), &defaults), s, "{q}");
    }
}

#[test]
fn missing_file_is_a_validation_error() {
    let err = ServiceConfig::from_path("/definitely/not/here.json").unwrap_err();
    assert_eq!(err.kind(), "validation");
    assert!(err.to_string().contains("open config JSON"));
}

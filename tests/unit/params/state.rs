use super::*;

#[test]
fn entity_code_normalizes_case_and_rejects_others() {
    assert_eq!(EntityCode::parse(" usa ").unwrap().as_str(), "USA");
    assert!(EntityCode::parse("US").is_none());
    assert!(EntityCode::parse("USAA").is_none());
    assert!(EntityCode::parse("U5A").is_none());
    assert!(EntityCode::parse("").is_none());
}

#[test]
fn metric_code_length_and_charset() {
    assert!(MetricCode::parse("NY_GDP_PCAP_KD").is_some());
    assert_eq!(MetricCode::parse("gdp2").unwrap().as_str(), "GDP2");
    assert!(MetricCode::parse("G").is_none());
    assert!(MetricCode::parse(&"A".repeat(64)).is_some());
    assert!(MetricCode::parse(&"A".repeat(65)).is_none());
    assert!(MetricCode::parse("GDP-PC").is_none());
}

#[test]
fn region_code_grammar() {
    for ok in ["US", "DEU", "US-CA", "FR-IL1", "GB1", "us-tx"] {
        assert!(RegionCode::parse(ok).is_some(), "{ok} should parse");
    }
    for bad in ["U", "ABCD", "US-C", "US-CAL", "US-CA12", "US_CA", "1US", "US-"] {
        assert!(RegionCode::parse(bad).is_none(), "{bad} should be rejected");
    }
}

#[test]
fn static_mode_pins_effective_growth() {
    let s = ComparisonState {
        target_mode: TargetMode::Static,
        target_growth: 0.04,
        ..ComparisonState::default()
    };
    assert_eq!(s.effective_target_growth(), 0.0);
}

#[test]
fn lookup_codes_follow_scope() {
    let mut s = ComparisonState::default();
    assert_eq!(s.lookup_codes(), ("IND", "USA"));
    s.scope = Scope::Region;
    assert_eq!(s.lookup_codes(), ("IN-MH", "US-CA"));
}

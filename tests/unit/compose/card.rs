use super::*;
use crate::converge::{ProjectionOpts, project_and_converge};

fn names() -> ResolvedNames {
    ResolvedNames {
        chaser: "India".to_string(),
        target: "United States".to_string(),
        metric: "GDP per capita".to_string(),
    }
}

fn values() -> ResolvedValues {
    ResolvedValues {
        chaser: Some(Observation::new(2023, 2_500.0)),
        target: Some(Observation::new(2023, 65_000.0)),
        chaser_history: vec![
            Observation::new(2019, 2_100.0),
            Observation::new(2021, 2_250.0),
            Observation::new(2023, 2_500.0),
        ],
        target_history: vec![
            Observation::new(2019, 60_000.0),
            Observation::new(2023, 65_000.0),
        ],
        chaser_growth: None,
        target_growth: None,
    }
}

fn projection(state: &ComparisonState) -> Convergence {
    project_and_converge(
        2_500.0,
        65_000.0,
        state.chaser_growth,
        state.effective_target_growth(),
        state.base_year,
        ProjectionOpts::default(),
    )
    .unwrap()
}

#[test]
fn composition_is_deterministic() {
    let state = ComparisonState::default();
    let p = projection(&state);
    let a = compose_svg(&state, &names(), &values(), Some(&p), &Theme::light());
    let b = compose_svg(&state, &names(), &values(), Some(&p), &Theme::light());
    assert_eq!(a, b);
    assert!(a.svg.starts_with("<svg "));
    assert!(a.svg.ends_with("</svg>"));
    assert!(a.svg.contains(r#"viewBox="0 0 1200 630""#));
}

#[test]
fn background_covers_the_whole_canvas() {
    let state = ComparisonState::default();
    let doc = compose_svg(&state, &names(), &values(), None, &Theme::dark());
    let expected = format!(
        r#"<rect id="background" x="0" y="0" width="1200" height="630" fill="{}"/>"#,
        Theme::dark().background.to_hex()
    );
    assert!(doc.svg.contains(&expected), "{}", doc.svg);
}

#[test]
fn headline_reports_convergence_year() {
    let state = ComparisonState::default();
    let p = projection(&state);
    let year = p.convergence_year.unwrap();
    let doc = compose_svg(&state, &names(), &values(), Some(&p), &Theme::light());
    assert!(doc.headline.starts_with("India catches up with United States in "));
    assert!(doc.headline.ends_with(&format!("({year})")));
    assert!(doc.chaser_path.starts_with('M'));
    assert!(doc.target_path.contains('L'));
    assert!(doc.svg.contains(r#"id="chaser-line""#));
    assert!(doc.svg.contains(r#"id="convergence""#));
    assert!(!doc.is_degraded());
}

#[test]
fn never_and_already_ahead_headlines() {
    let mut state = ComparisonState::default();
    state.chaser_growth = 0.01;
    let p = projection(&state);
    let doc = compose_svg(&state, &names(), &values(), Some(&p), &Theme::dark());
    assert_eq!(doc.headline, "India does not catch up with United States");
    assert!(!doc.svg.contains(r#"id="convergence""#));

    let ahead = project_and_converge(70_000.0, 65_000.0, 0.02, 0.02, 2023, ProjectionOpts::default())
        .unwrap();
    let doc = compose_svg(&state, &names(), &values(), Some(&ahead), &Theme::light());
    assert_eq!(doc.headline, "India is already ahead of United States");
}

#[test]
fn interpolated_text_is_escaped() {
    let state = ComparisonState::default();
    let p = projection(&state);
    let names = ResolvedNames {
        chaser: "<script>".to_string(),
        target: "A & B".to_string(),
        metric: "\"quoted\"".to_string(),
    };
    let doc = compose_svg(&state, &names, &values(), Some(&p), &Theme::light());
    assert!(!doc.svg.contains("<script>"));
    assert!(doc.svg.contains("&lt;script&gt;"));
    assert!(doc.svg.contains("A &amp; B"));
    assert!(doc.svg.contains("&quot;quoted&quot;"));
    // The document keeps the raw text; only the SVG is escaped.
    assert!(doc.headline.contains("A & B"));
}

#[test]
fn degraded_card_keeps_structure() {
    let state = ComparisonState::default();
    let regular = compose_svg(
        &state,
        &names(),
        &values(),
        Some(&projection(&state)),
        &Theme::light(),
    );
    let missing = ResolvedValues {
        chaser: None,
        ..values()
    };
    let degraded = compose_svg(&state, &names(), &missing, None, &Theme::light());

    assert_eq!(degraded.headline, UNAVAILABLE_HEADLINE);
    assert!(degraded.is_degraded());
    assert!(degraded.chaser_path.is_empty());
    for id in ["background", "header", "chaser-card", "target-card", "chart", "footer"] {
        let needle = format!(r#"id="{id}""#);
        assert!(regular.svg.contains(&needle), "{id}");
        assert!(degraded.svg.contains(&needle), "{id}");
    }
    assert!(degraded.svg.contains("No projection available"));
    assert!(degraded.svg.contains("n/a"));
}

#[test]
fn empty_projection_is_degraded() {
    let state = ComparisonState::default();
    let mut p = projection(&state);
    p.series.clear();
    let doc = compose_svg(&state, &names(), &values(), Some(&p), &Theme::light());
    assert!(doc.is_degraded());
}

#[test]
fn table_view_lists_years() {
    let mut state = ComparisonState::default();
    state.view = ViewMode::Table;
    let p = projection(&state);
    let doc = compose_svg(&state, &names(), &values(), Some(&p), &Theme::light());
    assert!(!doc.svg.contains(r#"id="chaser-line""#));
    assert!(doc.svg.contains(">Year</text>"));
    assert!(doc.svg.contains(">2023</text>"));
    // Paths are still reported for callers that want them.
    assert!(doc.chaser_path.starts_with('M'));
}

#[test]
fn milestones_follow_toggle() {
    let mut state = ComparisonState::default();
    let p = projection(&state);
    assert!(!p.milestones.is_empty());
    let on = compose_svg(&state, &names(), &values(), Some(&p), &Theme::light());
    assert!(on.svg.contains(r#"class="milestone""#));
    state.show_milestones = false;
    let off = compose_svg(&state, &names(), &values(), Some(&p), &Theme::light());
    assert!(!off.svg.contains(r#"class="milestone""#));
}

#[test]
fn footer_names_growth_sources() {
    let state = ComparisonState::default();
    let p = projection(&state);
    let mut v = values();
    v.chaser_growth = Some(ResolvedGrowth {
        rate: 0.05,
        source: GrowthSource::Historical,
    });
    v.target_growth = Some(ResolvedGrowth {
        rate: 0.02,
        source: GrowthSource::Fallback,
    });
    let doc = compose_svg(&state, &names(), &v, Some(&p), &Theme::light());
    assert!(doc.svg.contains("India +5.0% (historical)"));
    assert!(doc.svg.contains("United States +2.0% (assumed)"));
    assert!(doc.svg.contains("Needed to catch up within 25 years"));
}

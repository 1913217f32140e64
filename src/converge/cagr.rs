use crate::foundation::core::Observation;

/// Growth assumed when neither an explicit rate nor a usable history exists.
///
/// Overridden by `growth.fallback_cagr` in the service configuration.
pub const DEFAULT_FALLBACK_CAGR: f64 = 0.02;

/// Where a growth rate came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthSource {
    /// Supplied by the caller.
    Explicit,
    /// Compound annual growth between the earliest and latest observation.
    Historical,
    /// The configured fallback.
    Fallback,
}

/// A growth rate with its provenance.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct ResolvedGrowth {
    /// Annual rate as a fraction.
    pub rate: f64,
    /// Provenance.
    pub source: GrowthSource,
}

/// `(latest / earliest)^(1 / span) - 1` over the usable observations.
///
/// `None` with fewer than two usable points or a zero year span.
pub fn historical_cagr(history: &[Observation]) -> Option<f64> {
    let mut usable = history.iter().copied().filter(|o| o.is_usable());
    let first = usable.next()?;
    let (earliest, latest) = usable.fold((first, first), |(lo, hi), o| {
        (
            if o.year < lo.year { o } else { lo },
            if o.year > hi.year { o } else { hi },
        )
    });

    let span = latest.year - earliest.year;
    if span <= 0 {
        return None;
    }
    let rate = (latest.value / earliest.value).powf(1.0 / f64::from(span)) - 1.0;
    rate.is_finite().then_some(rate)
}

/// Explicit rate if present, else the historical CAGR, else `fallback`.
pub fn resolve_growth(
    explicit: Option<f64>,
    history: &[Observation],
    fallback: f64,
) -> ResolvedGrowth {
    if let Some(rate) = explicit.filter(|r| r.is_finite()) {
        return ResolvedGrowth {
            rate,
            source: GrowthSource::Explicit,
        };
    }
    match historical_cagr(history) {
        Some(rate) => ResolvedGrowth {
            rate,
            source: GrowthSource::Historical,
        },
        None => ResolvedGrowth {
            rate: fallback,
            source: GrowthSource::Fallback,
        },
    }
}

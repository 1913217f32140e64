use std::borrow::Cow;

/// Escape text for XML character data and attribute values.
pub fn escape_xml(input: &str) -> Cow<'_, str> {
    if !input.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(input);
    }
    let mut out = String::with_capacity(input.len() + 16);
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Compact value with a magnitude suffix: `950`, `12.3k`, `4.5M`, `1.2B`, `3T`.
pub fn format_compact(v: f64) -> String {
    if !v.is_finite() {
        return "n/a".to_string();
    }
    const SUFFIXES: [(f64, &str); 4] = [(1e12, "T"), (1e9, "B"), (1e6, "M"), (1e3, "k")];
    let abs = v.abs();
    for (scale, suffix) in SUFFIXES {
        if abs >= scale {
            return format!("{}{suffix}", trim_fraction(format!("{:.1}", v / scale)));
        }
    }
    if abs >= 100.0 {
        format!("{v:.0}")
    } else {
        trim_fraction(format!("{v:.2}"))
    }
}

/// Signed percentage with one decimal: `+5.0%`, `-1.2%`.
pub fn format_percent(rate: f64) -> String {
    let pct = rate * 100.0;
    // Keeps `-0.0` from rendering as `-0.0%`.
    let pct = if pct.abs() < 0.05 { 0.0 } else { pct };
    format!("{pct:+.1}%")
}

/// Whole years for headlines: `less than a year`, `1 year`, `14 years`.
pub fn format_years(years: f64) -> String {
    let n = years.round();
    if n < 1.0 {
        "less than a year".to_string()
    } else if n == 1.0 {
        "1 year".to_string()
    } else {
        format!("{n:.0} years")
    }
}

/// Cut `s` to at most `max_chars` characters, marking the cut with an ellipsis.
pub fn truncate(s: &str, max_chars: usize) -> Cow<'_, str> {
    if s.chars().count() <= max_chars {
        return Cow::Borrowed(s);
    }
    let keep = max_chars.saturating_sub(1);
    let mut out: String = s.chars().take(keep).collect();
    out.push('…');
    Cow::Owned(out)
}

fn trim_fraction(s: String) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

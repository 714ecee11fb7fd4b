use std::time::Duration;

const MS_PER_S: f64 = 1_000.0;

/// Renders a millisecond value the way report columns show it.
///
/// Values of one second or more are shown in seconds with millisecond precision
/// (`3.422S`); smaller values in milliseconds with nanosecond precision
/// (`0.000023ms`). Trailing zeros are dropped.
#[must_use]
pub fn format_millis(ms: f64) -> String {
    if !ms.is_finite() {
        return "-".to_string();
    }

    // Pick the unit from the value as displayed, so 999.9999999 renders as `1S`.
    let displayed = (ms * 1e6).round() / 1e6;
    if displayed.abs() >= MS_PER_S {
        let s = format!("{:.3}", ms / MS_PER_S);
        return format!("{}S", trim_fraction(&s));
    }

    let s = format!("{ms:.6}");
    format!("{}ms", trim_fraction(&s))
}

#[must_use]
pub fn format_duration(d: Duration) -> String {
    format_millis(duration_ms(d))
}

#[must_use]
pub fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * MS_PER_S
}

/// Fixed two-decimal rendering for rates; non-finite values render as `0`.
#[must_use]
pub fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.2}")
    } else {
        "0".to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if !s.contains('.') {
        return s;
    }
    let s = s.trim_end_matches('0');
    let s = s.strip_suffix('.').unwrap_or(s);
    if s == "-0" { "0" } else { s }
}

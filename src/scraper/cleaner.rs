// ── Numeric normalizers ───────────────────────────────────────────────────────

/// Parse a locale-formatted price or index value.
/// "1 234,56 €" → 1234.56 | "(72,5)" → 72.5 | "N/A" → None
///
/// Strips whitespace, the euro sign and parentheses, converts the decimal
/// comma to a dot, then parses. Anything left over that is not a number
/// (empty string, letters) yields `None`; this never panics.
pub fn parse_localized_number(s: &str) -> Option<f64> {
    let cleaned: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '€' && *c != '(' && *c != ')')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok().filter(|v: &f64| v.is_finite())
}

/// Coerce a quality-indicator value the way the ETL stage expects:
/// decimal comma → dot, then take the first digit run (with dots) and
/// parse it. "72,5 (very high)" → 72.5 | "High" → None
pub fn parse_indicator_value(s: &str) -> Option<f64> {
    let normalized = s.replace(',', ".");
    let start = normalized.find(|c: char| c.is_ascii_digit())?;
    let run: String = normalized[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    run.trim_end_matches('.').parse().ok()
}

/// Round to two decimals. The price average contract downstream filters
/// and joins rely on.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Display strings for metrics shown on graph nodes.

const BYTE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Formats a byte count with 1024-based units, e.g. `1.5 KB`.
///
/// Missing and zero values both render as `0 B`.
pub fn format_bytes(bytes: Option<u64>) -> String {
    let mut value = match bytes {
        Some(bytes) if bytes > 0 => bytes as f64,
        _ => return "0 B".to_string(),
    };
    let mut unit = 0;
    while value >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{} {}", trim_decimals(value), BYTE_UNITS[unit])
}

/// Formats milliseconds as `12.50ms` below one second and `1.25s` above.
pub fn format_time(ms: Option<f64>) -> String {
    match ms {
        None => "N/A".to_string(),
        Some(ms) if ms < 1000.0 => format!("{ms:.2}ms"),
        Some(ms) => format!("{:.2}s", ms / 1000.0),
    }
}

/// Formats a byte count as megabytes with two decimals.
pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0)
}

/// Groups digits in thousands, e.g. `1,234,567`.
pub fn format_count(count: u64) -> String {
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

// Two decimals at most, trailing zeros dropped.
fn trim_decimals(value: f64) -> String {
    let fixed = format!("{value:.2}");
    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
}

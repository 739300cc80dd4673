const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

/// Render a byte count with the largest fitting unit and at most two decimals.
///
/// The unit is picked by decimal magnitude (`log10 / 3`) while the value is
/// divided by powers of 1024, so 1000 bytes prints as `0.98 KB`.
pub fn human_size(bytes: u64) -> String {
    let rank = if bytes == 0 {
        0
    } else {
        (((bytes as f64).log10() / 3.0).floor() as usize).min(UNITS.len() - 1)
    };
    let value = bytes as f64 / 1024f64.powi(rank as i32);

    let formatted = format!("{:.2}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');

    format!("{} {}", trimmed, UNITS[rank])
}

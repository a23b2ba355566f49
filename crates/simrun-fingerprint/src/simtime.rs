//! Simulation time quantities such as `10s`, `100ms` or `1h 30min`

const UNITS: &[(&str, f64)] = &[
    ("s", 1.0),
    ("ms", 1e-3),
    ("us", 1e-6),
    ("ns", 1e-9),
    ("ps", 1e-12),
    ("min", 60.0),
    ("h", 3600.0),
    ("d", 86400.0),
];

/// Convert a simulation time quantity to seconds
///
/// A bare number is taken as seconds. Several terms may be written in
/// sequence, e.g. `1h 30min`, and are summed. Returns `None` for anything
/// that is not a quantity.
pub fn parse_sim_time(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(seconds) = text.parse::<f64>() {
        return Some(seconds);
    }

    let mut total = 0.0;
    let mut rest = text;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+' || c == 'e'))
            .unwrap_or(rest.len());
        let value: f64 = rest[..number_len].parse().ok()?;
        rest = rest[number_len..].trim_start();

        let unit_len = rest.find(|c: char| !c.is_ascii_alphabetic()).unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        let scale = UNITS.iter().find(|(name, _)| *name == unit)?.1;
        total += value * scale;
        rest = rest[unit_len..].trim_start();
    }
    Some(total)
}

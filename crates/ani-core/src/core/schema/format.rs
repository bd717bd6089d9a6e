//! Compact, deterministic JSON rendering.
//!
//! Containers holding only primitives stay on one line when they are short; everything else
//! is expanded with four-space indentation. Keys are sorted and floats use twelve significant
//! digits, so documents written by the driver are stable across runs and platforms.

use serde_json::{Map, Number, Value};

/// Spaces per nesting level.
pub const INDENT_WIDTH: usize = 4;
/// Maximum width of the single-line rendering of a container's elements.
pub const MAX_WIDTH: usize = 80;
/// Maximum number of elements in a container that can be put on a single line.
pub const MAX_ITEMS: usize = 4;
/// Significant digits used for floating-point numbers.
pub const SIGNIFICANT_DIGITS: usize = 12;

/// Renders a JSON value with the compact layout.
pub fn to_compact_string(value: &Value) -> String {
    render(value, 0)
}

fn render(value: &Value, depth: usize) -> String {
    match value {
        Value::Array(items) => render_array(items, depth),
        Value::Object(map) => render_object(map, depth),
        Value::Number(n) => format_number(n),
        Value::String(s) => render_string(s),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
    }
}

fn render_array(items: &[Value], depth: usize) -> String {
    if let Some(inner) = single_line_inner(items.iter().map(|v| (None, v))) {
        return format!("[{}]", inner);
    }

    let indent = indentation(depth + 1);
    let lines: Vec<String> = items
        .iter()
        .map(|item| format!("{}{}", indent, render(item, depth + 1)))
        .collect();
    format!("[\n{}\n{}]", lines.join(",\n"), indentation(depth))
}

fn render_object(map: &Map<String, Value>, depth: usize) -> String {
    if map.is_empty() {
        return "{}".to_string();
    }

    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    if let Some(inner) = single_line_inner(entries.iter().map(|(k, v)| (Some(k.as_str()), *v))) {
        return format!("{{ {} }}", inner);
    }

    let indent = indentation(depth + 1);
    let lines: Vec<String> = entries
        .iter()
        .map(|(key, value)| {
            format!(
                "{}{}: {}",
                indent,
                render_string(key),
                render(value, depth + 1)
            )
        })
        .collect();
    format!("{{\n{}\n{}}}", lines.join(",\n"), indentation(depth))
}

/// Returns the comma-joined rendering of the elements if the container qualifies for a
/// single line, `None` otherwise.
fn single_line_inner<'a>(
    elements: impl ExactSizeIterator<Item = (Option<&'a str>, &'a Value)>,
) -> Option<String> {
    if elements.len() > MAX_ITEMS {
        return None;
    }

    let mut parts = Vec::with_capacity(elements.len());
    for (key, value) in elements {
        if is_container(value) {
            return None;
        }
        let rendered = render(value, 0);
        parts.push(match key {
            Some(k) => format!("{}: {}", render_string(k), rendered),
            None => rendered,
        });
    }

    let inner = parts.join(", ");
    (inner.chars().count() <= MAX_WIDTH).then_some(inner)
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}

fn indentation(depth: usize) -> String {
    " ".repeat(depth * INDENT_WIDTH)
}

fn render_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}

fn format_number(n: &Number) -> String {
    if n.is_f64() {
        n.as_f64().map(format_float).unwrap_or_else(|| n.to_string())
    } else {
        n.to_string()
    }
}

/// Formats a float like C's `%.12g`.
///
/// Uses fixed notation when the decimal exponent is in `[-4, 12)` and scientific notation
/// otherwise; trailing zeros and a trailing decimal point are removed in both cases.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let scientific = format!("{:.*e}", SIGNIFICANT_DIGITS - 1, value);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (scientific.as_str(), 0),
    };

    if exponent < -4 || exponent >= SIGNIFICANT_DIGITS as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{}{:02}",
            strip_trailing_zeros(mantissa),
            sign,
            exponent.abs()
        )
    } else {
        let decimals = (SIGNIFICANT_DIGITS as i32 - 1 - exponent) as usize;
        strip_trailing_zeros(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn strip_trailing_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

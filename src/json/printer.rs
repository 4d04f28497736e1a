//! JSON printer: a fixed escape set, `{ k: v, ... }` / `[ v, ... ]`
//! spacing, and `%.30g`-style number formatting. Printed object order is
//! insertion order, the same order the JSON value model promises on
//! lookup.

use std::fmt::{self, Write};

use super::Value;

fn print_string(s: &str, out: &mut dyn Write) -> fmt::Result {
    out.write_char('"')?;
    for c in s.chars() {
        match c {
            '"' => out.write_str("\\\"")?,
            '\\' => out.write_str("\\\\")?,
            '/' => out.write_str("\\/")?,
            '\u{8}' => out.write_str("\\b")?,
            '\u{c}' => out.write_str("\\f")?,
            '\n' => out.write_str("\\n")?,
            '\r' => out.write_str("\\r")?,
            '\t' => out.write_str("\\t")?,
            other => out.write_char(other)?,
        }
    }
    out.write_char('"')
}

/// Formats a number the way `%.30g` would: up to 30 significant digits,
/// trailing zeros trimmed, integral values printed without a decimal point.
fn print_number(n: f64, out: &mut dyn Write) -> fmt::Result {
    if n.is_nan() || n.is_infinite() {
        // Not valid JSON; the writer/reader never produce these today
        // (finite D-Bus numeric types only), but guard rather than emit
        // invalid output.
        return out.write_str("null");
    }
    if n == n.trunc() && n.abs() < 1e18 {
        write!(out, "{}", n as i64)
    } else {
        // Rust has no native "%g"; `{}` on f64 already produces the
        // shortest decimal that round-trips exactly, which is a subset of
        // what "up to 30 significant digits" allows.
        write!(out, "{}", n)
    }
}

fn print_value(value: &Value, out: &mut dyn Write) -> fmt::Result {
    match value {
        Value::String(s) => print_string(s, out),
        Value::Number(n) => print_number(*n, out),
        Value::Bool(true) => out.write_str("true"),
        Value::Bool(false) => out.write_str("false"),
        Value::Null => out.write_str("null"),
        Value::Object(entries) => {
            out.write_str("{ ")?;
            for (i, (k, v)) in entries.iter().enumerate() {
                if i > 0 {
                    out.write_str(", ")?;
                }
                print_string(k, out)?;
                out.write_str(": ")?;
                print_value(v, out)?;
            }
            out.write_str(" }")
        }
        Value::Array(elements) => {
            out.write_str("[ ")?;
            for (i, v) in elements.iter().enumerate() {
                if i > 0 {
                    out.write_str(", ")?;
                }
                print_value(v, out)?;
            }
            out.write_str(" ]")
        }
    }
}

/// Prints `value` to `out`. The only failure mode is the sink itself
/// failing (e.g. a `String` target never fails; a `std::io::Write` adapter
/// might).
pub fn print(value: &Value, out: &mut impl Write) -> fmt::Result {
    print_value(value, out)
}

/// Convenience wrapper returning the printed form as an owned `String`.
pub fn to_string(value: &Value) -> String {
    let mut s = String::new();
    print(value, &mut s).expect("String writes are infallible");
    s
}

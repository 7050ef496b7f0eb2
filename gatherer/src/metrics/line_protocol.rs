//! Tag/field line format shared by the console and InfluxDB sinks:
//!
//! ```text
//! measurement[,tag=val,...] field=val[,field=val...][ timestamp]
//! ```

use super::{
    FieldValue,
    FilteredRecord,
};
use std::{
    borrow::Cow,
    collections::BTreeMap,
    fmt,
};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LineProtocolError {
    #[error("no fields in metric `{0}`")]
    NoFields(String),
}

/// How integer fields are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// Integers in their plain textual form.
    Console,
    /// Integers carry the `i` suffix InfluxDB needs to store them as integers.
    Influx,
}

const MEASUREMENT_SPECIAL: &[char] = &[' ', ','];
const KEY_SPECIAL: &[char] = &[' ', ',', '='];

fn escape<'a>(value: &'a str, special: &[char]) -> Cow<'a, str> {
    if !value.contains(special) {
        return Cow::Borrowed(value);
    }
    let mut escaped = String::with_capacity(value.len() + 4);
    for c in value.chars() {
        if special.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    Cow::Owned(escaped)
}

pub fn escape_measurement(value: &str) -> Cow<'_, str> {
    escape(value, MEASUREMENT_SPECIAL)
}

/// Escaping for tag keys, tag values and field keys.
pub fn escape_key(value: &str) -> Cow<'_, str> {
    escape(value, KEY_SPECIAL)
}

fn write_string_field<W: fmt::Write + ?Sized>(out: &mut W, value: &str) -> fmt::Result {
    out.write_char('"')?;
    for c in value.chars() {
        match c {
            '"' => out.write_str("\\\"")?,
            '\\' => out.write_str("\\\\")?,
            '\n' => out.write_str("\\n")?,
            c => out.write_char(c)?,
        }
    }
    out.write_char('"')
}

/// Shortest natural form: whole numbers without a fraction, exponent
/// notation only for very small or very large magnitudes.
fn write_float<W: fmt::Write + ?Sized>(out: &mut W, value: f64) -> fmt::Result {
    let magnitude = value.abs();
    if value.is_finite() && magnitude != 0.0 && !(1e-4..1e21).contains(&magnitude) {
        write!(out, "{value:e}")
    } else {
        write!(out, "{value}")
    }
}

fn write_field_value<W: fmt::Write + ?Sized>(out: &mut W, value: &FieldValue, flavor: Flavor) -> fmt::Result {
    match (value, flavor) {
        (FieldValue::String(s), _) => write_string_field(out, s),
        (FieldValue::Integer(i), Flavor::Console) => write!(out, "{i}"),
        (FieldValue::Integer(i), Flavor::Influx) => write!(out, "{i}i"),
        (FieldValue::Float(v), _) => write_float(out, *v),
        (FieldValue::Boolean(b), _) => write!(out, "{b}"),
    }
}

/// Writes one record without the trailing newline. `extra_tags` override
/// record tags of the same key.
pub fn write_line<W: fmt::Write + ?Sized>(
    out: &mut W,
    record: &FilteredRecord,
    extra_tags: &BTreeMap<String, String>,
    flavor: Flavor,
    timestamp: Option<i64>,
) -> fmt::Result {
    out.write_str(&escape_measurement(&record.measurement))?;

    let mut tags: BTreeMap<&str, &str> = record.tags.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    tags.extend(extra_tags.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    for (key, value) in tags {
        write!(out, ",{}={}", escape_key(key), escape_key(value))?;
    }

    let mut separator = ' ';
    for (key, value) in &record.fields {
        out.write_char(separator)?;
        separator = ',';
        write!(out, "{}=", escape_key(key))?;
        write_field_value(out, value, flavor)?;
    }

    if let Some(timestamp) = timestamp {
        write!(out, " {timestamp}")?;
    }
    Ok(())
}

/// Renders one newline-terminated line. Records without fields have no
/// valid representation and are rejected.
pub fn encode_line(
    record: &FilteredRecord,
    extra_tags: &BTreeMap<String, String>,
    flavor: Flavor,
    timestamp: Option<i64>,
) -> Result<String, LineProtocolError> {
    if record.fields.is_empty() {
        return Err(LineProtocolError::NoFields(record.measurement.clone()));
    }
    let mut line = String::new();
    let _ = write_line(&mut line, record, extra_tags, flavor, timestamp);
    line.push('\n');
    Ok(line)
}

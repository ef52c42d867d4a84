// ABOUTME: Unwraps JSON values that were string-encoded more than once
// ABOUTME: Finds the single correctly-typed layer to persist for a stored value

use serde::de::{self, Deserialize, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde_json::Number;
use std::fmt;
use thiserror::Error;

/// Largest integer magnitude that survives a round-trip through an IEEE-754
/// double without losing precision (2^53 - 1).
pub const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_991;

/// A value read from, or written to, a JSON column.
///
/// `Structured` holds the JSON text of an object or array. Structured values
/// are never stored as anything other than their own text layer.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    Text(String),
    Number(Number),
    Boolean(bool),
    Structured(String),
}

impl fmt::Display for StoredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoredValue::Text(s) | StoredValue::Structured(s) => f.write_str(s),
            StoredValue::Number(n) => write!(f, "{}", n),
            StoredValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

/// Conditions that abort the whole repair run
#[derive(Debug, Error, PartialEq)]
pub enum UnwrapError {
    #[error("Unknown type: {kind}")]
    UnsupportedType { kind: &'static str },

    #[error("Number too big: {value}")]
    NumberTooBig { value: String },
}

/// Normalize a raw JSON-column value by peeling off string-encoding layers
///
/// Runs a fixpoint loop over a current candidate and the last candidate that
/// was confirmed to be valid JSON:
/// - not valid JSON: return the last good candidate
/// - object or array: return the current candidate's text
/// - string: one encoding layer, keep unwrapping
/// - boolean: return the boolean
/// - number: return it, unless its magnitude exceeds [`MAX_SAFE_INTEGER`],
///   in which case the last good (still encoded) candidate is returned
/// - null: fatal, the value cannot be classified
///
/// Each string layer is strictly shorter than the text it was decoded from,
/// so the loop runs at most once per byte of the raw value.
///
/// # Examples
///
/// ```
/// # use sqlite_json_repair::unwrap::{normalize, StoredValue};
/// let raw = StoredValue::Text(r#""\"5\"""#.to_string());
/// assert_eq!(normalize(raw).unwrap(), StoredValue::Number(5.into()));
/// ```
pub fn normalize(raw: StoredValue) -> Result<StoredValue, UnwrapError> {
    let mut last_good = raw.clone();
    let mut current = raw;

    loop {
        let Some(parsed) = parse_layer(&current) else {
            return Ok(last_good);
        };

        match parsed {
            Layer::Structured => return Ok(into_structured(current)),
            Layer::String(inner) => {
                last_good = current;
                current = StoredValue::Text(inner);
            }
            Layer::Bool(b) => return Ok(StoredValue::Boolean(b)),
            Layer::Number(n) => {
                if exceeds_safe_integer(&n) {
                    tracing::debug!("Keeping encoded form of {} to avoid precision loss", n);
                    return Ok(last_good);
                }
                return Ok(StoredValue::Number(n));
            }
            Layer::Null => return Err(UnwrapError::UnsupportedType { kind: "null" }),
        }
    }
}

/// Reject values whose numeric reading is beyond the safe-integer threshold
///
/// Applies to numbers and to text that reads as a plain decimal number or
/// `Infinity` (for example raw unquoted digits that [`normalize`] had to keep
/// as-is). Words such as `inf` are not numbers and always pass. Independent
/// of the precision check inside [`normalize`].
pub fn check_magnitude(value: &StoredValue) -> Result<(), UnwrapError> {
    let too_big = match value {
        StoredValue::Number(n) => exceeds_safe_integer(n),
        StoredValue::Text(s) => numeric_text_value(s).is_some_and(exceeds_safe_magnitude),
        StoredValue::Boolean(_) | StoredValue::Structured(_) => false,
    };

    if too_big {
        return Err(UnwrapError::NumberTooBig {
            value: value.to_string(),
        });
    }

    Ok(())
}

/// Reject a stored REAL that is not finite
///
/// SQLite can hold infinities in REAL cells. They have no JSON form, so the
/// unwrapper never sees them, but they are still far beyond the threshold.
pub fn check_real_magnitude(value: f64) -> Result<(), UnwrapError> {
    if exceeds_safe_magnitude(value) {
        return Err(UnwrapError::NumberTooBig {
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Normalize a value and apply the magnitude guard to the result
pub fn repair_value(raw: StoredValue) -> Result<StoredValue, UnwrapError> {
    let normalized = normalize(raw)?;
    check_magnitude(&normalized)?;
    Ok(normalized)
}

/// Top-level shape of one decoded JSON layer
///
/// Objects and arrays are validated but not built, so nesting depth only
/// costs stack inside `serde_stacker`.
enum Layer {
    Structured,
    String(String),
    Bool(bool),
    Number(Number),
    Null,
}

impl<'de> Deserialize<'de> for Layer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(LayerVisitor)
    }
}

struct LayerVisitor;

impl<'de> Visitor<'de> for LayerVisitor {
    type Value = Layer;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Layer, E> {
        Ok(Layer::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Layer, E> {
        Ok(Layer::Number(v.into()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Layer, E> {
        Ok(Layer::Number(v.into()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Layer, E> {
        Number::from_f64(v)
            .map(Layer::Number)
            .ok_or_else(|| E::custom("non-finite number"))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Layer, E> {
        Ok(Layer::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Layer, E> {
        Ok(Layer::String(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Layer, E> {
        Ok(Layer::Null)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Layer, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(Layer::Structured)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Layer, A::Error> {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(Layer::Structured)
    }
}

fn parse_layer(candidate: &StoredValue) -> Option<Layer> {
    match candidate {
        StoredValue::Text(s) | StoredValue::Structured(s) => parse_json_text(s),
        StoredValue::Number(n) => Some(Layer::Number(n.clone())),
        StoredValue::Boolean(b) => Some(Layer::Bool(*b)),
    }
}

fn parse_json_text(text: &str) -> Option<Layer> {
    let mut de = serde_json::Deserializer::from_str(text);
    de.disable_recursion_limit();
    let layer = Layer::deserialize(serde_stacker::Deserializer::new(&mut de)).ok()?;
    de.end().ok()?;
    Some(layer)
}

/// Numeric reading of text that is written as a decimal number or `Infinity`
///
/// Accepts an optional sign, digits with an optional fraction, and an
/// optional exponent (`-12`, `.5`, `3.`, `1e21`). Surrounding whitespace is
/// ignored. Anything else, including `inf`, `NaN` and hex, is not numeric.
fn numeric_text_value(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let unsigned = trimmed.strip_prefix(['+', '-']).unwrap_or(trimmed);

    if unsigned == "Infinity" {
        return Some(f64::INFINITY);
    }

    let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
        Some(pos) => (&unsigned[..pos], Some(&unsigned[pos + 1..])),
        None => (unsigned, None),
    };

    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !all_digits(int_part) || !all_digits(frac_part) {
        return None;
    }

    if let Some(exp) = exponent {
        let exp_digits = exp.strip_prefix(['+', '-']).unwrap_or(exp);
        if exp_digits.is_empty() || !all_digits(exp_digits) {
            return None;
        }
    }

    trimmed.parse::<f64>().ok()
}

fn exceeds_safe_magnitude(value: f64) -> bool {
    value.abs() > MAX_SAFE_INTEGER as f64
}

fn into_structured(candidate: StoredValue) -> StoredValue {
    match candidate {
        StoredValue::Text(s) => StoredValue::Structured(s),
        other => other,
    }
}

fn exceeds_safe_integer(n: &Number) -> bool {
    if let Some(u) = n.as_u64() {
        u > MAX_SAFE_INTEGER
    } else if let Some(i) = n.as_i64() {
        i.unsigned_abs() > MAX_SAFE_INTEGER
    } else {
        n.as_f64().map_or(true, exceeds_safe_magnitude)
    }
}

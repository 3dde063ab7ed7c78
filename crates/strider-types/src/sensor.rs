//! Sensor vectors: tagged field values and the fixed schema they are parsed
//! against.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::StriderError;

// ─────────────────────────────────────────────────────────────────────────────
// SensorValue
// ─────────────────────────────────────────────────────────────────────────────

/// One field of a sensor vector.
///
/// Most robots report plain integers (bump bits, IR flags, cliff readings),
/// but attribute-style agents also report characters, reals and short text
/// codes, so every field carries its own tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum SensorValue {
    Int(i64),
    Char(char),
    Real(f64),
    Text(String),
}

impl SensorValue {
    /// Parse a single field token.
    ///
    /// Integers win over reals; `'x'` is a character; anything else that is
    /// not a finite number is kept verbatim as text.
    pub fn parse_field(token: &str) -> Self {
        if let Ok(i) = token.parse::<i64>() {
            return SensorValue::Int(i);
        }
        if let Ok(f) = token.parse::<f64>()
            && f.is_finite()
        {
            return SensorValue::Real(f);
        }
        let chars: Vec<char> = token.chars().collect();
        if chars.len() == 3 && chars[0] == '\'' && chars[2] == '\'' {
            return SensorValue::Char(chars[1]);
        }
        SensorValue::Text(token.to_string())
    }

    /// `true` when the field reads as "on": non-zero numbers, any character
    /// other than `'0'`, and non-empty text other than `"0"`.
    pub fn is_truthy(&self) -> bool {
        match self {
            SensorValue::Int(i) => *i != 0,
            SensorValue::Char(c) => *c != '0',
            SensorValue::Real(f) => *f != 0.0,
            SensorValue::Text(s) => !s.is_empty() && s != "0",
        }
    }

    /// Integer view of the field: reals are truncated, characters and text
    /// count as `1` when truthy and `0` otherwise.
    pub fn as_int(&self) -> i64 {
        match self {
            SensorValue::Int(i) => *i,
            SensorValue::Real(f) => *f as i64,
            other => i64::from(other.is_truthy()),
        }
    }
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorValue::Int(i) => write!(f, "{i}"),
            SensorValue::Char(c) => write!(f, "'{c}'"),
            SensorValue::Real(r) => write!(f, "{r}"),
            SensorValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for SensorValue {
    fn from(value: i64) -> Self {
        SensorValue::Int(value)
    }
}

/// Build an all-integer sensor vector.
pub fn int_sensors(values: &[i64]) -> Vec<SensorValue> {
    values.iter().copied().map(SensorValue::Int).collect()
}

/// Compact rendering of a sensor vector, e.g. `[0 1 0 0]`.
pub fn interpret_sensors_short(sensors: &[SensorValue]) -> String {
    let fields: Vec<String> = sensors.iter().map(ToString::to_string).collect();
    format!("[{}]", fields.join(" "))
}

// ─────────────────────────────────────────────────────────────────────────────
// SensorSchema
// ─────────────────────────────────────────────────────────────────────────────

/// Fixed layout every sensor vector must follow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorSchema {
    /// Exact number of fields in every reading.
    pub num_sensors: usize,
    /// Field whose truthiness marks a reward (goal) state.
    pub reward_field: usize,
    /// Field holding an accumulated score, when the robot reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_field: Option<usize>,
}

impl Default for SensorSchema {
    fn default() -> Self {
        Self {
            num_sensors: 8,
            reward_field: 0,
            score_field: None,
        }
    }
}

impl SensorSchema {
    /// Schema with `num_sensors` fields and the reward flag in field 0.
    pub fn new(num_sensors: usize) -> Self {
        Self {
            num_sensors,
            ..Self::default()
        }
    }

    /// Parse a raw sensor string.
    ///
    /// Fields are separated by whitespace and/or commas.  A single token made
    /// of exactly `num_sensors` `0`/`1` characters is read as a packed bit
    /// string.  Any other field count is rejected: readings are never
    /// truncated or padded.
    pub fn parse(&self, raw: &str) -> Result<Vec<SensorValue>, StriderError> {
        let tokens: Vec<&str> = raw
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .collect();

        if tokens.len() == 1 && self.num_sensors > 1 {
            let packed = tokens[0];
            if packed.len() == self.num_sensors && packed.chars().all(|c| c == '0' || c == '1') {
                return Ok(packed
                    .chars()
                    .map(|c| SensorValue::Int(i64::from(c == '1')))
                    .collect());
            }
        }

        if tokens.len() != self.num_sensors {
            return Err(StriderError::MalformedInput(format!(
                "expected {} sensor fields, got {}",
                self.num_sensors,
                tokens.len()
            )));
        }
        Ok(tokens.into_iter().map(SensorValue::parse_field).collect())
    }

    /// Check that an already-built vector fits the schema.
    pub fn validate(&self, sensors: &[SensorValue]) -> Result<(), StriderError> {
        if sensors.len() != self.num_sensors {
            return Err(StriderError::InvalidArgument(format!(
                "sensor vector has {} fields, schema requires {}",
                sensors.len(),
                self.num_sensors
            )));
        }
        Ok(())
    }
}

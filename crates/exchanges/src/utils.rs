//! Small parsing helpers shared across the per-exchange decoders, several
//! of which send trade price/quantity fields as JSON strings rather than
//! numbers.

use serde::Deserialize;

pub fn parse_str_f64<'de, D: serde::Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
	let s = String::deserialize(d)?;
	s.parse().map_err(serde::de::Error::custom)
}

/// As `parse_str_f64`, but accepts either a JSON string or a bare number
/// (Gate.io and Bitget are inconsistent about which they send).
pub fn parse_flexible_f64(value: &serde_json::Value) -> Option<f64> {
	match value {
		serde_json::Value::String(s) => s.parse().ok(),
		serde_json::Value::Number(n) => n.as_f64(),
		_ => None,
	}
}

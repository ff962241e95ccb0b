//! JSON codec.
//!
//! Implemented by converting [`Value`] to and from `serde_json::Value`
//! rather than hand-rolling a JSON grammar. `serde_json`'s `preserve_order`
//! feature (backed by `indexmap`) gives the ordered-map semantics the wire
//! format relies on. Integer literals within `i64` range deserialize to
//! [`Value::Int`], everything else numeric to [`Value::Float`] — matching
//! `serde_json::Number`'s own int/float distinction.

use crate::value::{Map, Value};
use serde_json::Value as Json;

#[derive(Debug, thiserror::Error)]
pub enum JsonError {
	#[error("malformed JSON: {0}")]
	Malformed(#[from] serde_json::Error),
	#[error("JSON number out of range: {0}")]
	NumberOutOfRange(serde_json::Number),
}

pub fn encode(value: &Value) -> String {
	serde_json::to_string(&to_json(value)).expect("Value -> serde_json::Value never fails")
}

pub fn decode(text: &str) -> Result<Value, JsonError> {
	let json: Json = serde_json::from_str(text)?;
	from_json(json)
}

fn to_json(value: &Value) -> Json {
	match value {
		Value::Null => Json::Null,
		Value::Int(v) => Json::Number((*v).into()),
		Value::Float(v) => serde_json::Number::from_f64(*v).map(Json::Number).unwrap_or(Json::Null),
		Value::Bool(v) => Json::Bool(*v),
		Value::String(v) => Json::String(v.clone()),
		Value::Array(items) => Json::Array(items.iter().map(to_json).collect()),
		Value::Object(map) => {
			let mut obj = serde_json::Map::new();
			for (k, v) in map {
				obj.insert(k.clone(), to_json(v));
			}
			Json::Object(obj)
		}
	}
}

fn from_json(json: Json) -> Result<Value, JsonError> {
	Ok(match json {
		Json::Null => Value::Null,
		Json::Bool(b) => Value::Bool(b),
		Json::Number(n) => {
			if let Some(i) = n.as_i64() {
				Value::Int(i)
			} else if let Some(f) = n.as_f64() {
				Value::Float(f)
			} else {
				return Err(JsonError::NumberOutOfRange(n));
			}
		}
		Json::String(s) => Value::String(s),
		Json::Array(items) => Value::Array(items.into_iter().map(from_json).collect::<Result<_, _>>()?),
		Json::Object(obj) => {
			let mut map = Map::new();
			for (k, v) in obj {
				map.insert(k, from_json(v)?);
			}
			Value::Object(map)
		}
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::kgr_object;

	#[test]
	fn roundtrip_scalars() {
		for v in [Value::Null, Value::Int(42), Value::Float(1.5), Value::Bool(true), Value::String("hi".into())] {
			let encoded = encode(&v);
			assert_eq!(decode(&encoded).unwrap(), v);
		}
	}

	#[test]
	fn roundtrip_nested_object_preserves_order() {
		let v = kgr_object!("z" => 1_i64, "a" => Value::Array(vec![Value::from(1_i64), Value::from(2_i64)]));
		let encoded = encode(&v);
		let decoded = decode(&encoded).unwrap();
		assert_eq!(decoded, v);
		let obj = decoded.as_object().unwrap();
		assert_eq!(obj.keys().collect::<Vec<_>>(), vec!["z", "a"]);
	}

	#[test]
	fn six_short_escapes_survive_roundtrip() {
		let v = Value::String("\"\\/\u{8}\u{c}\n\r\t".to_string());
		assert_eq!(decode(&encode(&v)).unwrap(), v);
	}

	#[test]
	fn malformed_json_is_rejected() {
		assert!(decode("{not json").is_err());
	}
}

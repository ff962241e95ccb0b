use indexmap::IndexMap;

/// Insertion-ordered string-keyed map, as required by the binary codec's
/// observable field order.
pub type Map = IndexMap<String, Value>;

/// The dynamic value carried across every pipe and every framed RPC
/// message.
///
/// Equality is structural. Map ordering is insertion order, and is part of
/// [`PartialEq`] since the binary codec makes it observable.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
	#[default]
	Null,
	Int(i64),
	Float(f64),
	Bool(bool),
	String(String),
	Array(Vec<Value>),
	Object(Map),
}

/// Type tag returned by [`Value::kind`], used by RPC parameter decoding to
/// report `TypeMismatch` with a useful message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
	Null,
	Int,
	Float,
	Bool,
	String,
	Array,
	Object,
}

impl Value {
	pub fn kind(&self) -> ValueType {
		match self {
			Value::Null => ValueType::Null,
			Value::Int(_) => ValueType::Int,
			Value::Float(_) => ValueType::Float,
			Value::Bool(_) => ValueType::Bool,
			Value::String(_) => ValueType::String,
			Value::Array(_) => ValueType::Array,
			Value::Object(_) => ValueType::Object,
		}
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Value::Null)
	}

	pub fn as_int(&self) -> Option<i64> {
		match self {
			Value::Int(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_float(&self) -> Option<f64> {
		match self {
			Value::Float(v) => Some(*v),
			Value::Int(v) => Some(*v as f64),
			_ => None,
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Value::Bool(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::String(v) => Some(v.as_str()),
			_ => None,
		}
	}

	pub fn as_array(&self) -> Option<&[Value]> {
		match self {
			Value::Array(v) => Some(v.as_slice()),
			_ => None,
		}
	}

	pub fn as_object(&self) -> Option<&Map> {
		match self {
			Value::Object(v) => Some(v),
			_ => None,
		}
	}

	/// Convenience accessor for `self.as_object()?.get(key)`, used pervasively
	/// when decoding RPC params.
	pub fn field(&self, key: &str) -> Option<&Value> {
		self.as_object()?.get(key)
	}
}

impl From<i64> for Value {
	fn from(v: i64) -> Self {
		Value::Int(v)
	}
}

impl From<f64> for Value {
	fn from(v: f64) -> Self {
		Value::Float(v)
	}
}

impl From<bool> for Value {
	fn from(v: bool) -> Self {
		Value::Bool(v)
	}
}

impl From<String> for Value {
	fn from(v: String) -> Self {
		Value::String(v)
	}
}

impl From<&str> for Value {
	fn from(v: &str) -> Self {
		Value::String(v.to_owned())
	}
}

impl From<Vec<Value>> for Value {
	fn from(v: Vec<Value>) -> Self {
		Value::Array(v)
	}
}

impl From<Map> for Value {
	fn from(v: Map) -> Self {
		Value::Object(v)
	}
}

/// Builds a [`Value::Object`] from `(key, value)` pairs, preserving the
/// order they're given in.
#[macro_export]
macro_rules! kgr_object {
	($($key:expr => $value:expr),* $(,)?) => {{
		let mut map = $crate::Map::new();
		$(map.insert($key.to_string(), $crate::Value::from($value));)*
		$crate::Value::Object(map)
	}};
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn field_lookup_on_object() {
		let v = kgr_object!("a" => 1_i64, "b" => "x");
		assert_eq!(v.field("a").and_then(Value::as_int), Some(1));
		assert_eq!(v.field("b").and_then(Value::as_str), Some("x"));
		assert_eq!(v.field("missing"), None);
	}

	#[test]
	fn map_preserves_insertion_order() {
		let v = kgr_object!("z" => 1_i64, "a" => 2_i64);
		let obj = v.as_object().unwrap();
		let keys: Vec<_> = obj.keys().collect();
		assert_eq!(keys, vec!["z", "a"]);
	}

	#[test]
	fn float_coerces_from_int() {
		assert_eq!(Value::Int(3).as_float(), Some(3.0));
		assert_eq!(Value::Float(3.5).as_float(), Some(3.5));
	}
}

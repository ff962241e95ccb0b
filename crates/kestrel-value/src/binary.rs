//! Compact binary codec: a single-byte tag followed by a payload, per
//! spec.md §4.1. Narrowest-fitting integer width is chosen on encode.

use crate::value::{Map, Value};
use bytes::{Buf, BufMut, Bytes, BytesMut};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BinaryError {
	#[error("message exceeds maximum encodable length")]
	MessageTooLarge,
	#[error("malformed binary message: {0}")]
	Malformed(String),
	#[error("unexpected end of binary message")]
	UnexpectedEof,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
	Null = 1,
	Int8 = 2,
	Int16 = 3,
	Int32 = 4,
	Int64 = 5,
	Float = 6,
	BoolTrue = 7,
	BoolFalse = 8,
	String = 9,
	Array = 10,
	Object = 11,
}

impl Tag {
	fn from_byte(byte: u8) -> Result<Self, BinaryError> {
		Ok(match byte {
			1 => Tag::Null,
			2 => Tag::Int8,
			3 => Tag::Int16,
			4 => Tag::Int32,
			5 => Tag::Int64,
			6 => Tag::Float,
			7 => Tag::BoolTrue,
			8 => Tag::BoolFalse,
			9 => Tag::String,
			10 => Tag::Array,
			11 => Tag::Object,
			other => return Err(BinaryError::Malformed(format!("unknown tag {other}"))),
		})
	}
}

pub fn encode(value: &Value) -> Result<Vec<u8>, BinaryError> {
	let mut buf = BytesMut::new();
	write_value(&mut buf, value)?;
	Ok(buf.to_vec())
}

pub fn decode(bytes: &[u8]) -> Result<Value, BinaryError> {
	let mut cursor = Bytes::copy_from_slice(bytes);
	let value = read_value(&mut cursor)?;
	Ok(value)
}

fn write_value(buf: &mut BytesMut, value: &Value) -> Result<(), BinaryError> {
	match value {
		Value::Null => buf.put_u8(Tag::Null as u8),
		Value::Int(v) => write_int(buf, *v),
		Value::Float(v) => {
			buf.put_u8(Tag::Float as u8);
			buf.put_f64_le(*v);
		}
		Value::Bool(v) => buf.put_u8(if *v { Tag::BoolTrue as u8 } else { Tag::BoolFalse as u8 }),
		Value::String(s) => {
			buf.put_u8(Tag::String as u8);
			let len: u32 = s.len().try_into().map_err(|_| BinaryError::MessageTooLarge)?;
			buf.put_u32_le(len);
			buf.put_slice(s.as_bytes());
		}
		Value::Array(items) => {
			buf.put_u8(Tag::Array as u8);
			let len: u32 = items.len().try_into().map_err(|_| BinaryError::MessageTooLarge)?;
			buf.put_u32_le(len);
			for item in items {
				write_value(buf, item)?;
			}
		}
		Value::Object(map) => {
			buf.put_u8(Tag::Object as u8);
			let len: u32 = map.len().try_into().map_err(|_| BinaryError::MessageTooLarge)?;
			buf.put_u32_le(len);
			for (key, v) in map {
				let klen: u32 = key.len().try_into().map_err(|_| BinaryError::MessageTooLarge)?;
				buf.put_u32_le(klen);
				buf.put_slice(key.as_bytes());
				write_value(buf, v)?;
			}
		}
	}
	Ok(())
}

fn write_int(buf: &mut BytesMut, v: i64) {
	if let Ok(v8) = i8::try_from(v) {
		buf.put_u8(Tag::Int8 as u8);
		buf.put_i8(v8);
	} else if let Ok(v16) = i16::try_from(v) {
		buf.put_u8(Tag::Int16 as u8);
		buf.put_i16_le(v16);
	} else if let Ok(v32) = i32::try_from(v) {
		buf.put_u8(Tag::Int32 as u8);
		buf.put_i32_le(v32);
	} else {
		buf.put_u8(Tag::Int64 as u8);
		buf.put_i64_le(v);
	}
}

fn read_value(buf: &mut Bytes) -> Result<Value, BinaryError> {
	let tag = Tag::from_byte(take_u8(buf)?)?;
	Ok(match tag {
		Tag::Null => Value::Null,
		Tag::Int8 => Value::Int(take_buf(buf, 1)?.get_i8() as i64),
		Tag::Int16 => Value::Int(take_buf(buf, 2)?.get_i16_le() as i64),
		Tag::Int32 => Value::Int(take_buf(buf, 4)?.get_i32_le() as i64),
		Tag::Int64 => Value::Int(take_buf(buf, 8)?.get_i64_le()),
		Tag::Float => Value::Float(take_buf(buf, 8)?.get_f64_le()),
		Tag::BoolTrue => Value::Bool(true),
		Tag::BoolFalse => Value::Bool(false),
		Tag::String => {
			let len = take_u32(buf)? as usize;
			let raw = take_buf(buf, len)?;
			Value::String(String::from_utf8(raw.to_vec()).map_err(|_| BinaryError::Malformed("invalid utf-8 string".into()))?)
		}
		Tag::Array => {
			let len = take_u32(buf)? as usize;
			let mut items = Vec::with_capacity(len.min(1 << 16));
			for _ in 0..len {
				items.push(read_value(buf)?);
			}
			Value::Array(items)
		}
		Tag::Object => {
			let len = take_u32(buf)? as usize;
			let mut map = Map::with_capacity(len.min(1 << 16));
			for _ in 0..len {
				let klen = take_u32(buf)? as usize;
				let kraw = take_buf(buf, klen)?;
				let key = String::from_utf8(kraw.to_vec()).map_err(|_| BinaryError::Malformed("invalid utf-8 key".into()))?;
				map.insert(key, read_value(buf)?);
			}
			Value::Object(map)
		}
	})
}

fn take_u8(buf: &mut Bytes) -> Result<u8, BinaryError> {
	if buf.remaining() < 1 {
		return Err(BinaryError::UnexpectedEof);
	}
	Ok(buf.get_u8())
}

fn take_u32(buf: &mut Bytes) -> Result<u32, BinaryError> {
	Ok(take_buf(buf, 4)?.get_u32_le())
}

fn take_buf(buf: &mut Bytes, n: usize) -> Result<Bytes, BinaryError> {
	if buf.remaining() < n {
		return Err(BinaryError::UnexpectedEof);
	}
	Ok(buf.split_to(n))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::kgr_object;

	#[test]
	fn narrowest_int_width_is_chosen() {
		assert_eq!(encode(&Value::Int(5)).unwrap().len(), 2); // tag + i8
		assert_eq!(encode(&Value::Int(300)).unwrap().len(), 3); // tag + i16
		assert_eq!(encode(&Value::Int(1 << 20)).unwrap().len(), 5); // tag + i32
		assert_eq!(encode(&Value::Int(1 << 40)).unwrap().len(), 9); // tag + i64
	}

	#[test]
	fn roundtrip_all_variants() {
		let v = kgr_object!(
			"n" => Value::Null,
			"i" => Value::Int(-12345),
			"f" => Value::Float(2.5),
			"b" => Value::Bool(true),
			"s" => "hello",
			"a" => Value::Array(vec![Value::Int(1), Value::Int(2)]),
		);
		let encoded = encode(&v).unwrap();
		assert_eq!(decode(&encoded).unwrap(), v);
	}

	#[test]
	fn truncated_message_is_unexpected_eof() {
		let encoded = encode(&Value::String("hello".into())).unwrap();
		let truncated = &encoded[..encoded.len() - 2];
		assert_eq!(decode(truncated), Err(BinaryError::UnexpectedEof));
	}

	#[test]
	fn unknown_tag_byte_is_malformed() {
		assert!(matches!(decode(&[0xFF]), Err(BinaryError::Malformed(_))));
	}
}

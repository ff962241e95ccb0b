//! Dynamic RPC value type and its codecs.
//!
//! [`Value`] is the wire value carried by every pipe and every framed
//! message: a closed sum over null, integer, float, bool, string, array and
//! ordered map. [`json`] and [`binary`] implement the two codecs described
//! by the RPC bus; both round-trip through [`Value`] without ever touching
//! a concrete transport.

mod binary;
mod json;
mod value;

pub use binary::{BinaryError, decode as binary_decode, encode as binary_encode};
pub use json::{JsonError, decode as json_decode, encode as json_encode};
pub use value::{Map, Value, ValueType};

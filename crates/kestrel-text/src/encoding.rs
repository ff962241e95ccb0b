//! The encoding seam: every serializer and every byte↔codepoint traversal
//! in the workspace goes through [`Encoding`] instead of hardcoding UTF-8
//! offsets, per spec.md §4.3.

/// A byte-string codec that knows how to iterate and index codepoints.
///
/// `kestrel-text` ships exactly one implementation, [`Utf8Encoding`] — the
/// mandatory system reference encoding — but the trait is the extension
/// point a concrete backend (e.g. a Latin-1 or UTF-16 adapter) would
/// implement.
pub trait Encoding: Send + Sync {
	/// Human-readable name, used in `EncodingConverter` error messages and
	/// in `/document/manager` responses.
	fn name(&self) -> &str;

	/// Calls `f(start_byte, length_bytes, codepoint)` for every codepoint in
	/// `bytes`, in order, stopping early if `f` returns `false`.
	fn iterate_codepoints(&self, bytes: &[u8], f: &mut dyn FnMut(usize, usize, char) -> bool);

	/// Number of codepoints in `bytes`.
	fn codepoint_count(&self, bytes: &[u8]) -> u64 {
		let mut count = 0u64;
		self.iterate_codepoints(bytes, &mut |_, _, _| {
			count += 1;
			true
		});
		count
	}

	/// Byte `(start, length)` of the `index`-th codepoint, or `None` if
	/// `index` is out of range.
	fn get_codepoint(&self, bytes: &[u8], index: u64) -> Option<(usize, usize)> {
		let mut found = None;
		let mut current = 0u64;
		self.iterate_codepoints(bytes, &mut |start, len, _| {
			if current == index {
				found = Some((start, len));
				return false;
			}
			current += 1;
			true
		});
		found
	}

	/// Decodes `bytes` to UTF-8 text, for the small set of conversions that
	/// need a concrete `String` (e.g. rendering a fragment's content).
	fn decode(&self, bytes: &[u8]) -> String;

	/// Encodes UTF-8 text into this encoding's byte representation.
	fn encode(&self, text: &str) -> Vec<u8>;
}

/// The one built-in, always-registered [`Encoding`]. Every document created
/// without an explicit upstream encoding uses this.
#[derive(Debug, Default, Clone, Copy)]
pub struct Utf8Encoding;

impl Encoding for Utf8Encoding {
	fn name(&self) -> &str {
		"utf-8"
	}

	fn iterate_codepoints(&self, bytes: &[u8], f: &mut dyn FnMut(usize, usize, char) -> bool) {
		let text = match std::str::from_utf8(bytes) {
			Ok(t) => t,
			Err(_) => return,
		};
		for (start, ch) in text.char_indices() {
			if !f(start, ch.len_utf8(), ch) {
				break;
			}
		}
	}

	fn decode(&self, bytes: &[u8]) -> String {
		String::from_utf8_lossy(bytes).into_owned()
	}

	fn encode(&self, text: &str) -> Vec<u8> {
		text.as_bytes().to_vec()
	}
}

/// Transcodes bytes from one [`Encoding`] to another, routing through the
/// system reference encoding (UTF-8) when no direct path exists — which, in
/// this workspace, is always, since [`Utf8Encoding`] is the only built-in.
pub struct EncodingConverter<'a> {
	from: &'a dyn Encoding,
	to: &'a dyn Encoding,
}

impl<'a> EncodingConverter<'a> {
	pub fn new(from: &'a dyn Encoding, to: &'a dyn Encoding) -> Self {
		EncodingConverter { from, to }
	}

	pub fn convert(&self, bytes: &[u8]) -> Vec<u8> {
		let text = self.from.decode(bytes);
		self.to.encode(&text)
	}
}

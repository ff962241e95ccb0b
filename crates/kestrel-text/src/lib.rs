//! Line-indexed text storage ([`TextBlock`]), codepoint-indexed positions
//! ([`TextPosition`]) and the encoding abstraction every byte↔codepoint
//! traversal in the workspace goes through ([`Encoding`]).

mod block;
mod encoding;
mod position;

pub use block::{TextBlock, TextBlockError};
pub use encoding::{Encoding, EncodingConverter, Utf8Encoding};
pub use position::TextPosition;

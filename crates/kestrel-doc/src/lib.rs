//! The document model: [`Transaction`]s applied through a
//! [`TransactionStream`] undo journal, [`Tagger`]s that decorate text
//! ranges, and [`Document`]/[`DocumentSet`] tying text, encoding and
//! taggers together.

mod document;
mod subscribe;
mod tagger;
mod transaction;

pub use document::{Document, DocumentError, DocumentSet, Newline};
pub use subscribe::Unsubscribe;
pub use tagger::{CacheTagger, LazyTagger, NullTagger, TabTagger, TagFragment, TagIterator, Tagger, TextPositionRange};
pub use transaction::{StreamEvent, Transaction, TransactionError, TransactionStream, TransactionStreamId};

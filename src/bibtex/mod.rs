//! BibTeX rendering, reading and writing.
//!
//! - [`entry`] - record to [`BibEntry`] conversion
//! - [`escape`] - text cleanup and sentence case
//! - [`key`] - citation keys and collision suffixes
//! - [`reader`] - nom-based parser for existing files and Scholar exports
//! - [`writer`] - file header, full writes and append mode

pub mod entry;
pub mod escape;
pub mod key;
pub mod reader;
pub mod writer;

pub use entry::{format_authors, BibEntry, BibRenderer, EntryKind, RenderOutcome};
pub use escape::{escape_text, sentence_case, unescape_latex};
pub use key::{base_key, KeyAllocator};
pub use reader::{existing_keys, parse_bibliography, ParsedEntry};
pub use writer::{append_entries, write_bibliography};

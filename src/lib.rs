//! DTF order-book capture decoder.
//!
//! DTF files store quotes and trades for one instrument as 12-byte records
//! holding timestamp and sequence deltas, rebased by inline refresh records.
//!
//! - `record`: file layout, header, decoded `Event` and the reference state
//! - `decoder`: in-memory decoding, eager (`decode`) or lazy (`Decoder`)
//! - `reader`: the same decoding over any `std::io::Read`
//! - `table`: timestamp-sorted view with `(timestamp, sequence)` lookup
//! - `book`: level-2 book replayed from quote events
//!
//! The binaries (`src/main.rs` and `src/bin/player.rs`) dump decoded events
//! and replay them into the book.
pub mod record;
pub mod decoder;
pub mod reader;
pub mod table;
pub mod book;

#[cfg(test)]
pub(crate) mod testutil;

pub use decoder::{decode, decode_file, Decoder, FormatError};
pub use reader::DtfReader;
pub use record::{Event, FileHeader, ReferenceState};
pub use table::EventTable;

//! On-disk representation of the append-only log archive.
//!
//! An archive is a single byte sequence laid out as:
//!
//! ```text
//! [magic>|<end]{10} [block]... [<count][<flag][<size]{3..40} ...
//! ```
//!
//! A 10-byte file header carries the `Sour.is` magic and the `end` pointer,
//! followed by one or more commits. Each commit is a run of block records
//! terminated by a commit trailer, and the header's `end` pointer names the
//! offset (within the data region) where the newest commit's trailer stops.
//! Every block record is
//!
//! ```text
//! [hash>|<end]{10} [payload]{size} [<flag][<size]{2..20}
//! ```
//!
//! All trailer fields, and the header's `end`, are unsigned varints stored
//! with their bytes reversed, so a parser that knows where a record *ends*
//! can decode them by reading backwards. Forward parsers get the
//! complement: the trailing varint in each 10-byte header says how far to
//! skip to reach the next record.

use snafu::Snafu;

pub mod block;
pub mod commit;
mod flags;
pub mod header;
pub mod varint;

pub use flags::RecordType;

/// Decoding failures shared by every frame in the format.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DecodeError {
    #[snafu(display("magic bytes mismatch"))]
    BadMagic,

    #[snafu(display("truncated varint"))]
    BadVarint,

    #[snafu(display("trailer too short ({len} bytes, need at least {min})"))]
    ShortTrailer { len: usize, min: usize },

    #[snafu(display("record flag {flag:#x} is not a {expected} record"))]
    WrongRecordType { flag: u64, expected: &'static str },

    #[snafu(display("block length mismatch: header spans {end} bytes, trailer accounts for {actual}"))]
    LengthMismatch { end: u64, actual: u64 },

    #[snafu(display("block spans {end} bytes but only {left} remain in the commit"))]
    Overrun { end: u64, left: u64 },

    #[snafu(display("commit chain steps past the start of data"))]
    BrokenChain,
}

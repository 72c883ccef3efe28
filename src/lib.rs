//! An append-only, log-structured archive.
//!
//! The archive is a single seekable byte sequence: opaque blocks, each
//! framed by a hash-tagged header and a reversed-varint trailer, grouped
//! into commits. Readers need nothing but positional reads, so an archive
//! works the same from a local file or over HTTP byte ranges; writers
//! stream blocks in a single pass and publish them atomically by rewriting
//! the 10-byte file header.
//!
//! The byte layout lives in the [`repr`] crate; this crate provides the
//! [`write::Writer`] and [`read::Archive`] state machines, the
//! [`rev::ReverseWindow`] adapter that decodes the reversed trailers, and
//! the [`http::HttpReader`] remote source.

use slog::Drain;

mod errors;
pub mod http;
pub mod read;
pub mod rev;
pub mod section;
pub mod serve;
pub mod write;

pub use errors::{Error, ErrorKind, Result};
pub use read::{Archive, BlockInfo};
pub use write::{append_log_file, write_log_file, Writer};

fn default_logger() -> slog::Logger {
    slog::Logger::root(slog_stdlog::StdLog.fuse(), slog::o!())
}

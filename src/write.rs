use crate::errors::{IoSnafu, Result};
use crate::read::parse_tail;
use fnv::FnvHasher;
use positioned_io::{RandomAccessFile, ReadAt, WriteAt};
use repr::commit::{self, Commit};
use repr::{block, header, RecordType};
use snafu::ResultExt;
use std::fs::OpenOptions;
use std::hash::Hasher;
use std::io;
use std::path::Path;

use slog::{debug, info, o, Logger};

const DATA_START: u64 = header::LEN as u64;

/// Payloads are streamed to the sink in chunks of this size.
const CHUNK: usize = 1024;

/// A single write session against an archive. Blocks are streamed in with
/// [`add`](Writer::add) and published all at once by
/// [`commit`](Writer::commit); until the commit lands, readers keep seeing
/// the previous state of the archive.
pub struct Writer<W> {
    sink: W,
    /// Bytes of data written so far, committed sessions included.
    end: u64,
    /// Bytes of block records written by this session.
    size: u64,
    /// Cumulative block count, previous sessions included.
    count: u64,
    /// Back-link for the chained trailer form. Stays zero for sessions
    /// that start where the previous commit ended.
    prev: u64,
    logger: Logger,
}

impl Writer<RandomAccessFile> {
    /// Creates `path` (truncating any previous content) and starts a
    /// session on a fresh archive.
    pub fn create_path<P: AsRef<Path>>(p: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(p.as_ref())
            .context(IoSnafu {
                what: "create archive",
            })?;
        let file = RandomAccessFile::try_new(file).context(IoSnafu {
            what: "create archive",
        })?;
        let logger = crate::default_logger().new(o!("file" => p.as_ref().display().to_string()));
        Self::create_with_logger(file, logger)
    }

    /// Opens `path` read/write and starts a session after its last commit.
    pub fn append_path<P: AsRef<Path>>(p: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(p.as_ref())
            .context(IoSnafu {
                what: "open archive",
            })?;
        let file = RandomAccessFile::try_new(file).context(IoSnafu {
            what: "open archive",
        })?;
        let logger = crate::default_logger().new(o!("file" => p.as_ref().display().to_string()));
        Self::append_with_logger(file, logger)
    }
}

impl<W: WriteAt> Writer<W> {
    /// Starts a session on an empty sink, writing the bare magic so a
    /// crash before the first commit still leaves a readable (empty)
    /// archive.
    pub fn create(sink: W) -> Result<Self> {
        Self::create_with_logger(sink, crate::default_logger())
    }

    pub fn create_with_logger(mut sink: W, logger: Logger) -> Result<Self> {
        sink.write_all_at(0, &header::encode(0)).context(IoSnafu {
            what: "write archive header",
        })?;
        Ok(Writer {
            sink,
            end: 0,
            size: 0,
            count: 0,
            prev: 0,
            logger,
        })
    }

    /// Appends one block. The payload is streamed through the format hash
    /// on its way to the sink; once it ends, the trailer is written and
    /// the reserved header is patched with the digest and the record
    /// length. Returns the payload size.
    pub fn add<R: io::Read>(&mut self, mut payload: R) -> Result<u64> {
        let start = DATA_START + self.end;

        self.sink
            .write_all_at(start, &[0u8; block::HEADER_LEN])
            .context(IoSnafu {
                what: "reserve block header",
            })?;
        self.end += block::HEADER_LEN as u64;
        self.size += block::HEADER_LEN as u64;

        let mut hasher = FnvHasher::default();
        let mut cursor = start + block::HEADER_LEN as u64;
        let mut written = 0u64;
        let mut buf = [0u8; CHUNK];
        loop {
            let n = match payload.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(e).context(IoSnafu {
                        what: "read block payload",
                    })?
                }
            };
            hasher.write(&buf[..n]);
            self.sink.write_all_at(cursor, &buf[..n]).context(IoSnafu {
                what: "write block payload",
            })?;
            cursor += n as u64;
            written += n as u64;
        }

        let mut trailer = Vec::with_capacity(block::TRAILER_MAX);
        block::append_trailer(&mut trailer, written, RecordType::SEGMENT);
        self.sink.write_all_at(cursor, &trailer).context(IoSnafu {
            what: "write block trailer",
        })?;

        let record_end = written + trailer.len() as u64;
        let head = block::encode_header(&hasher.finish().to_be_bytes(), record_end);
        self.sink.write_all_at(start, &head).context(IoSnafu {
            what: "patch block header",
        })?;

        self.end += record_end;
        self.size += record_end;
        self.count += 1;

        debug!(self.logger, "appended block";
            "index" => self.count - 1,
            "payload" => written
        );
        Ok(written)
    }

    /// Ends the session: writes the commit trailer and republishes the
    /// file header so the new blocks become visible. This header rewrite
    /// is the atomic publication point; everything before it is invisible
    /// to readers.
    pub fn commit(mut self) -> Result<W> {
        let commit = Commit {
            size: self.size,
            count: self.count,
            prev: self.prev,
            ..Commit::default()
        };
        let mut trailer = Vec::with_capacity(commit::TRAILER_MAX);
        commit.append_trailer(&mut trailer);

        self.sink
            .write_all_at(DATA_START + self.end, &trailer)
            .context(IoSnafu {
                what: "write commit trailer",
            })?;
        self.end += trailer.len() as u64;

        self.sink
            .write_all_at(0, &header::encode(self.end))
            .context(IoSnafu {
                what: "publish archive header",
            })?;

        info!(self.logger, "committed";
            "blocks" => self.count,
            "session_bytes" => self.size,
            "end" => self.end
        );
        Ok(self.sink)
    }
}

impl<W: ReadAt + WriteAt> Writer<W> {
    /// Starts a session chained after the newest commit of an existing
    /// archive. The cumulative block count carries over; the session's
    /// byte size starts at zero.
    pub fn append(sink: W) -> Result<Self> {
        Self::append_with_logger(sink, crate::default_logger())
    }

    pub fn append_with_logger(sink: W, logger: Logger) -> Result<Self> {
        let (end, commit) = parse_tail(&sink)?;
        debug!(logger, "resume archive"; "end" => end, "blocks" => commit.count);
        Ok(Writer {
            sink,
            end,
            size: 0,
            count: commit.count,
            prev: 0,
            logger,
        })
    }
}

/// Writes a fresh archive holding one commit with every payload produced
/// by `blocks`, in order. Returns the sink.
pub fn write_log_file<W, I>(sink: W, blocks: I) -> Result<W>
where
    W: WriteAt,
    I: IntoIterator,
    I::Item: io::Read,
{
    let mut w = Writer::create(sink)?;
    for b in blocks {
        w.add(b)?;
    }
    w.commit()
}

/// Appends one commit holding every payload produced by `blocks` to an
/// existing archive. Returns the sink.
pub fn append_log_file<W, I>(sink: W, blocks: I) -> Result<W>
where
    W: ReadAt + WriteAt,
    I: IntoIterator,
    I::Item: io::Read,
{
    let mut w = Writer::append(sink)?;
    for b in blocks {
        w.add(b)?;
    }
    w.commit()
}

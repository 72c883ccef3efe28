use crate::errors::{Error, IoSnafu, Result};
use crate::rev::ReverseWindow;
use crate::section::{read_full, Section};
use fnv::FnvHasher;
use positioned_io::{RandomAccessFile, ReadAt};
use repr::commit::{self, Commit};
use repr::{block, header, DecodeError};
use snafu::ResultExt;
use std::cell::RefCell;
use std::hash::Hasher;
use std::io;
use std::path::Path;

use slog::{debug, o, Logger};

const DATA_START: u64 = header::LEN as u64;

/// Identity of one block as yielded by the iterators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    index: u64,
    tag: [u8; block::TAG_LEN],
    tag_len: usize,
}

impl BlockInfo {
    /// Zero-based position of the block in write order across all commits.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// The hash tag stored in the block header. Shorter than eight bytes
    /// when the header's length varint overlaid the tag's tail.
    pub fn hash_tag(&self) -> &[u8] {
        &self.tag[..self.tag_len]
    }

    /// Streams `payload` through the format hash and compares the digest
    /// against the stored tag. The iterators never do this on their own;
    /// consumers that care run it over the payload reader they were
    /// handed.
    pub fn verify<R: io::Read>(&self, payload: &mut R) -> Result<bool> {
        let mut hasher = FnvHasher::default();
        let mut buf = [0u8; 1024];
        loop {
            let n = match payload.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context(IoSnafu { what: "read payload" })?,
            };
            hasher.write(&buf[..n]);
        }
        let digest = hasher.finish().to_be_bytes();
        Ok(digest[..self.tag_len] == self.tag[..self.tag_len])
    }
}

/// Reads the file header and the newest commit trailer. Shared with the
/// writer, which needs the same two frames to chain an append session.
pub(crate) fn parse_tail<R: ReadAt + ?Sized>(src: &R) -> Result<(u64, Commit)> {
    let mut head = [0u8; header::LEN];
    let n = read_full(src, 0, &mut head).context(IoSnafu {
        what: "read archive header",
    })?;
    if n < head.len() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("archive is {n} bytes"),
        ))
        .context(IoSnafu {
            what: "read archive header",
        })
        .map_err(Error::from);
    }

    let end = header::decode(&head)?;
    if end == 0 {
        return Ok((0, Commit::default()));
    }

    let w = ReverseWindow::new(src, DATA_START, end);
    let mut buf = [0u8; commit::TRAILER_MAX];
    let n = w.read_at(0, &mut buf).context(IoSnafu {
        what: "read commit trailer",
    })?;
    let commit = Commit::decode(&buf[..n])?;

    Ok((end, commit))
}

/// An open archive over any positional-read source.
#[derive(Debug)]
pub struct Archive<R> {
    src: R,
    end: u64,
    commit: Commit,
    err: RefCell<Option<Error>>,
    logger: Logger,
}

impl Archive<RandomAccessFile> {
    pub fn open<P: AsRef<Path>>(p: P) -> Result<Self> {
        Self::open_with_logger(p, crate::default_logger())
    }

    pub fn open_with_logger<P: AsRef<Path>>(p: P, logger: Logger) -> Result<Self> {
        Self::_open_with_logger(p.as_ref(), logger)
    }

    fn _open_with_logger(path: &Path, logger: Logger) -> Result<Self> {
        let logger = logger.new(o!("file" => path.display().to_string()));
        let file = RandomAccessFile::open(path).context(IoSnafu {
            what: "open archive",
        })?;
        Self::with_logger(file, logger)
    }
}

impl<R: ReadAt> Archive<R> {
    pub fn new(src: R) -> Result<Self> {
        Self::with_logger(src, crate::default_logger())
    }

    pub fn with_logger(src: R, logger: Logger) -> Result<Self> {
        let (end, commit) = parse_tail(&src)?;

        debug!(logger, "read archive tail";
            "end" => end,
            "blocks" => commit.count,
            "commit_size" => commit.size
        );

        Ok(Self {
            src,
            end,
            commit,
            err: RefCell::new(None),
            logger,
        })
    }

    /// Total number of blocks across all commits.
    pub fn count(&self) -> u64 {
        self.commit.count
    }

    /// Total byte length of the archive, header included.
    pub fn size(&self) -> u64 {
        DATA_START + self.end
    }

    /// True when nothing has been committed yet.
    pub fn is_empty(&self) -> bool {
        self.end == 0
    }

    pub fn get_ref(&self) -> &R {
        &self.src
    }

    /// Takes the error that stopped the last iteration, if any.
    pub fn take_err(&self) -> Option<Error> {
        self.err.borrow_mut().take()
    }

    /// Iterates blocks in write order, starting at `start` (an index).
    /// Blocks before `start` are skipped without touching their payloads.
    pub fn iter(&self, start: u64) -> Iter<'_, R> {
        match self.commits() {
            Ok(mut commits) => {
                commits.reverse();
                Iter {
                    ar: self,
                    commits,
                    ci: 0,
                    cursor: 0,
                    index: 0,
                    start,
                    done: false,
                }
            }
            Err(e) => {
                *self.err.borrow_mut() = Some(e);
                Iter {
                    ar: self,
                    commits: Vec::new(),
                    ci: 0,
                    cursor: 0,
                    index: 0,
                    start,
                    done: true,
                }
            }
        }
    }

    /// Iterates blocks newest first, yielding at most `take` of them.
    pub fn rev(&self, take: u64) -> Rev<'_, R> {
        match self.commits() {
            Ok(commits) => {
                let rem = commits.first().map_or(0, |l| l.commit.size);
                Rev {
                    ar: self,
                    commits,
                    ci: 0,
                    rem,
                    index: self.commit.count,
                    left: take,
                    done: false,
                }
            }
            Err(e) => {
                *self.err.borrow_mut() = Some(e);
                Rev {
                    ar: self,
                    commits: Vec::new(),
                    ci: 0,
                    rem: 0,
                    index: 0,
                    left: 0,
                    done: true,
                }
            }
        }
    }

    /// Walks the commit chain newest to oldest, locating each commit's
    /// body along the way. Each step back covers the previous commit's
    /// span (`prev` + its trailer); the walk ends when the span between
    /// the data start and the current trailer is exhausted.
    fn commits(&self) -> Result<Vec<Located>> {
        let mut out = Vec::new();
        if self.end == 0 {
            return Ok(out);
        }

        let mut cur = self.commit;
        let mut trailer_end = self.end;
        loop {
            let body_rel = trailer_end
                .checked_sub(cur.size + cur.trailer_len as u64)
                .ok_or(DecodeError::BrokenChain)?;
            out.push(Located {
                commit: cur,
                body_start: DATA_START + body_rel,
            });

            let rest = trailer_end
                .checked_sub(cur.prev + cur.trailer_len as u64)
                .ok_or(DecodeError::BrokenChain)?;
            if rest == 0 {
                break;
            }

            let w = ReverseWindow::new(&self.src, DATA_START, rest);
            let mut buf = [0u8; commit::TRAILER_MAX];
            let n = w.read_at(0, &mut buf).context(IoSnafu {
                what: "read commit trailer",
            })?;
            cur = Commit::decode(&buf[..n])?;
            trailer_end = rest;
        }

        debug!(self.logger, "walked commit chain"; "commits" => out.len());
        Ok(out)
    }
}

/// A commit plus the absolute offset of its first block record.
#[derive(Debug, Clone, Copy)]
struct Located {
    commit: Commit,
    body_start: u64,
}

fn read_block<'a, R: ReadAt>(
    ar: &'a Archive<R>,
    at: u64,
    index: u64,
) -> Result<(BlockInfo, Section<'a, R>, u64)> {
    let mut head = [0u8; block::HEADER_LEN];
    let n = read_full(&ar.src, at, &mut head).context(IoSnafu {
        what: "read block header",
    })?;
    if n < head.len() {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof))
            .context(IoSnafu {
                what: "read block header",
            })
            .map_err(Error::from);
    }
    let head = block::decode_header(&head)?;

    let w = ReverseWindow::new(&ar.src, at + block::HEADER_LEN as u64, head.end);
    let mut buf = [0u8; block::TRAILER_MAX];
    let n = w.read_at(0, &mut buf).context(IoSnafu {
        what: "read block trailer",
    })?;
    let trailer = block::decode_trailer(&buf[..n])?;

    if trailer.payload_size + trailer.len as u64 != head.end {
        return Err(DecodeError::LengthMismatch {
            end: head.end,
            actual: trailer.payload_size + trailer.len as u64,
        }
        .into());
    }

    let info = BlockInfo {
        index,
        tag: head.tag,
        tag_len: head.tag_len,
    };
    let payload = Section::new(
        &ar.src,
        at + block::HEADER_LEN as u64,
        trailer.payload_size,
    );
    Ok((info, payload, block::HEADER_LEN as u64 + head.end))
}

/// Forward block iterator. Stops early on a malformed record, latching
/// the error on the archive.
pub struct Iter<'a, R> {
    ar: &'a Archive<R>,
    commits: Vec<Located>,
    ci: usize,
    cursor: u64,
    index: u64,
    start: u64,
    done: bool,
}

impl<'a, R: ReadAt> Iterator for Iter<'a, R> {
    type Item = (BlockInfo, Section<'a, R>);

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let Some(loc) = self.commits.get(self.ci).copied() else {
                self.done = true;
                break;
            };

            // All of this commit's blocks sit below the requested start.
            if self.start >= loc.commit.count {
                self.index = loc.commit.count;
                self.ci += 1;
                self.cursor = 0;
                continue;
            }

            if self.cursor >= loc.commit.size {
                self.ci += 1;
                self.cursor = 0;
                continue;
            }

            let left = loc.commit.size - self.cursor;
            match read_block(self.ar, loc.body_start + self.cursor, self.index) {
                Ok((info, payload, advance)) => {
                    if advance > left {
                        *self.ar.err.borrow_mut() = Some(
                            DecodeError::Overrun {
                                end: advance - block::HEADER_LEN as u64,
                                left,
                            }
                            .into(),
                        );
                        self.done = true;
                        break;
                    }
                    self.cursor += advance;
                    self.index += 1;
                    if info.index < self.start {
                        continue;
                    }
                    return Some((info, payload));
                }
                Err(e) => {
                    *self.ar.err.borrow_mut() = Some(e);
                    self.done = true;
                }
            }
        }
        None
    }
}

/// Reverse block iterator: newest commit first, and within each commit the
/// trailers are decoded from the top of the body downwards.
pub struct Rev<'a, R> {
    ar: &'a Archive<R>,
    commits: Vec<Located>,
    ci: usize,
    rem: u64,
    index: u64,
    left: u64,
    done: bool,
}

impl<'a, R: ReadAt> Rev<'a, R> {
    fn read_prev(&mut self, loc: Located) -> Result<(BlockInfo, Section<'a, R>)> {
        let w = ReverseWindow::new(&self.ar.src, loc.body_start, self.rem);
        let mut buf = [0u8; block::TRAILER_MAX];
        let n = w.read_at(0, &mut buf).context(IoSnafu {
            what: "read block trailer",
        })?;
        let trailer = block::decode_trailer(&buf[..n])?;

        let span = block::HEADER_LEN as u64 + trailer.payload_size + trailer.len as u64;
        let rem = self.rem.checked_sub(span).ok_or(DecodeError::Overrun {
            end: span,
            left: self.rem,
        })?;
        let index = self
            .index
            .checked_sub(1)
            .ok_or(DecodeError::BrokenChain)?;

        let (info, payload, _) = read_block(self.ar, loc.body_start + rem, index)?;

        self.rem = rem;
        self.index = index;
        Ok((info, payload))
    }
}

impl<'a, R: ReadAt> Iterator for Rev<'a, R> {
    type Item = (BlockInfo, Section<'a, R>);

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done && self.left > 0 {
            let Some(loc) = self.commits.get(self.ci).copied() else {
                self.done = true;
                break;
            };

            if self.rem == 0 {
                self.ci += 1;
                self.rem = self.commits.get(self.ci).map_or(0, |l| l.commit.size);
                continue;
            }

            match self.read_prev(loc) {
                Ok(item) => {
                    self.left -= 1;
                    return Some(item);
                }
                Err(e) => {
                    *self.ar.err.borrow_mut() = Some(e);
                    self.done = true;
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write::{append_log_file, write_log_file};
    use positioned_io::WriteAt;

    #[derive(Default)]
    struct MemBuf(Vec<u8>);

    impl WriteAt for MemBuf {
        fn write_at(&mut self, pos: u64, buf: &[u8]) -> io::Result<usize> {
            let end = pos as usize + buf.len();
            if self.0.len() < end {
                self.0.resize(end, 0);
            }
            self.0[pos as usize..end].copy_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl ReadAt for MemBuf {
        fn read_at(&self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
            if pos >= self.0.len() as u64 {
                return Ok(0);
            }
            let rest = &self.0[pos as usize..];
            let n = buf.len().min(rest.len());
            buf[..n].copy_from_slice(&rest[..n]);
            Ok(n)
        }
    }

    #[test]
    fn chain_walk_finds_one_commit_per_session() {
        let buf = write_log_file(MemBuf::default(), [[1u8, 2].as_slice()]).unwrap();
        let buf = append_log_file(buf, [[3u8].as_slice()]).unwrap();
        let buf = append_log_file(buf, [[4u8, 5, 6].as_slice()]).unwrap();

        let ar = Archive::new(buf).unwrap();
        let commits = ar.commits().unwrap();
        assert_eq!(commits.len(), 3);

        // Newest first, cumulative counts descending.
        assert_eq!(commits[0].commit.count, 3);
        assert_eq!(commits[1].commit.count, 2);
        assert_eq!(commits[2].commit.count, 1);

        // Bodies tile the data region without gaps.
        assert_eq!(commits[2].body_start, 10);
        let first_span = commits[2].commit.size + commits[2].commit.trailer_len as u64;
        assert_eq!(commits[1].body_start, 10 + first_span);
    }

    #[test]
    fn empty_first_session_terminates_the_walk() {
        let buf = write_log_file(MemBuf::default(), Vec::<&[u8]>::new()).unwrap();
        let buf = append_log_file(buf, [[1u8, 2, 3, 4].as_slice()]).unwrap();

        let ar = Archive::new(buf).unwrap();
        let commits = ar.commits().unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[1].commit.size, 0);
        assert_eq!(ar.count(), 1);
    }
}

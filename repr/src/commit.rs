//! Commit trailers.
//!
//! A write session ends with a commit trailer: the reversed encodings of
//! `size` (byte length of the session's block records), `flag`, `count`
//! (cumulative blocks in the archive), and, only when the flag carries
//! PREV_COMMIT, `prev` (distance back to the previous commit's trailer).
//! When `prev` is absent it aliases to `size`, which is exactly the step a
//! chain walker needs to reach the previous trailer of an archive whose
//! commits sit back to back.

use crate::{varint, DecodeError, RecordType};

pub const TRAILER_MIN: usize = 3;
pub const TRAILER_MAX: usize = 4 * varint::MAX_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Commit {
    /// Byte length of this commit's block records, trailer excluded.
    pub size: u64,
    /// Cumulative number of blocks in the archive after this commit.
    pub count: u64,
    /// Distance from this trailer back to the previous commit's trailer;
    /// equals `size` when no explicit back-link was stored.
    pub prev: u64,
    pub flag: RecordType,
    /// Encoded byte length of this trailer.
    pub trailer_len: usize,
}

impl Default for Commit {
    fn default() -> Self {
        Commit {
            size: 0,
            count: 0,
            prev: 0,
            flag: RecordType::empty(),
            trailer_len: 0,
        }
    }
}

impl Commit {
    /// Appends the encoded trailer. A zero `prev` produces the plain
    /// COMMIT form; nonzero produces PREV_COMMIT with the back-link.
    pub fn append_trailer(&self, buf: &mut Vec<u8>) {
        let flag = if self.prev == 0 {
            RecordType::COMMIT
        } else {
            RecordType::PREV_COMMIT
        };

        let at = buf.len();
        varint::append(buf, self.size);
        varint::append(buf, flag.bits());
        varint::append(buf, self.count);
        if self.prev != 0 {
            varint::append(buf, self.prev);
        }
        buf[at..].reverse();
    }

    /// Decodes a trailer from bytes already read backwards from the
    /// commit's end (so `size` comes first).
    pub fn decode(reversed: &[u8]) -> Result<Commit, DecodeError> {
        if reversed.len() < TRAILER_MIN {
            return Err(DecodeError::ShortTrailer {
                len: reversed.len(),
                min: TRAILER_MIN,
            });
        }

        let (size, mut at) = varint::decode(reversed).ok_or(DecodeError::BadVarint)?;
        let (bits, n) = varint::decode(&reversed[at..]).ok_or(DecodeError::BadVarint)?;
        at += n;
        let (count, n) = varint::decode(&reversed[at..]).ok_or(DecodeError::BadVarint)?;
        at += n;

        let flag = RecordType::from_bits_retain(bits);
        if !flag.contains(RecordType::COMMIT) {
            return Err(DecodeError::WrongRecordType {
                flag: bits,
                expected: "commit",
            });
        }

        let mut prev = size;
        if flag.contains(RecordType::PREV_COMMIT) {
            let (p, n) = varint::decode(&reversed[at..]).ok_or(DecodeError::BadVarint)?;
            prev = p;
            at += n;
        }

        Ok(Commit {
            size,
            count,
            prev,
            flag,
            trailer_len: at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(commit: Commit) -> Commit {
        let mut buf = Vec::new();
        commit.append_trailer(&mut buf);
        buf.reverse();
        Commit::decode(&buf).unwrap()
    }

    #[test]
    fn first_commit() {
        let mut buf = Vec::new();
        Commit {
            size: 16,
            count: 1,
            ..Commit::default()
        }
        .append_trailer(&mut buf);
        // On disk: reverse(varint(16), varint(COMMIT), varint(1)).
        assert_eq!(buf, [0x01, 0x02, 0x10]);

        buf.reverse();
        let parsed = Commit::decode(&buf).unwrap();
        assert_eq!(parsed.size, 16);
        assert_eq!(parsed.count, 1);
        assert_eq!(parsed.flag, RecordType::COMMIT);
        // Absent back-link aliases to the body size.
        assert_eq!(parsed.prev, 16);
        assert_eq!(parsed.trailer_len, 3);
    }

    #[test]
    fn chained_commit_carries_back_link() {
        let parsed = round_trip(Commit {
            size: 16,
            count: 2,
            prev: 19,
            ..Commit::default()
        });
        assert_eq!(parsed.size, 16);
        assert_eq!(parsed.count, 2);
        assert_eq!(parsed.prev, 19);
        assert!(parsed.flag.contains(RecordType::PREV_COMMIT));
        assert_eq!(parsed.trailer_len, 4);
    }

    #[test]
    fn empty_session() {
        let mut buf = Vec::new();
        Commit::default().append_trailer(&mut buf);
        assert_eq!(buf, [0x00, 0x02, 0x00]);
    }

    #[test]
    fn rejects_block_flag() {
        // size=4, flag=SEGMENT, count irrelevant
        assert!(matches!(
            Commit::decode(&[0x04, 0x01, 0x00]),
            Err(DecodeError::WrongRecordType { .. })
        ));
    }
}

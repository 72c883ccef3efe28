//! Backwards reads over a bounded window.
//!
//! Every trailer in the format is written in reversed-byte order so it can
//! be decoded from a known endpoint. [`ReverseWindow`] is the adapter that
//! makes this painless: it presents a window `[offset, offset + len)` of an
//! underlying source such that a read at its own offset 0 yields the
//! window's *last* bytes, reversed. Decoders then run forward over what
//! they got.

use crate::section::read_full;
use positioned_io::ReadAt;
use std::io;

#[derive(Debug)]
pub struct ReverseWindow<'a, R: ?Sized> {
    src: &'a R,
    offset: u64,
    len: u64,
}

impl<'a, R: ReadAt + ?Sized> ReverseWindow<'a, R> {
    pub fn new(src: &'a R, offset: u64, len: u64) -> Self {
        ReverseWindow { src, offset, len }
    }
}

impl<R: ReadAt + ?Sized> ReadAt for ReverseWindow<'_, R> {
    /// Reads the bytes at source offsets
    /// `[offset + len - buf.len() - pos, offset + len - pos)`, reversed in
    /// place. A request that underflows the window start is truncated to
    /// what the window holds; one entirely past the window reads nothing.
    fn read_at(&self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        if pos >= self.len {
            return Ok(0);
        }

        let end = self.len - pos;
        let start = end.saturating_sub(buf.len() as u64);
        let n = (end - start) as usize;

        let got = read_full(self.src, self.offset + start, &mut buf[..n])?;
        if got < n {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "source ends inside the window",
            ));
        }
        buf[..n].reverse();
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Mem(Vec<u8>);

    impl ReadAt for Mem {
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

    // Window [3, 7) over the source 0..10 serves 6,5,4,3.
    fn window(mem: &Mem) -> ReverseWindow<'_, Mem> {
        ReverseWindow::new(mem, 3, 4)
    }

    #[test]
    fn reads_tail_first() {
        let mem = Mem((0..10).collect());
        let w = window(&mem);

        let mut buf = [0u8; 4];
        assert_eq!(w.read_at(0, &mut buf).unwrap(), 4);
        assert_eq!(buf, [6, 5, 4, 3]);
    }

    #[test]
    fn offset_steps_backwards() {
        let mem = Mem((0..10).collect());
        let w = window(&mem);

        let mut buf = [0u8; 4];
        for (pos, want) in [(1u64, vec![5, 4, 3]), (2, vec![4, 3]), (3, vec![3])] {
            let n = w.read_at(pos, &mut buf).unwrap();
            assert_eq!(&buf[..n], &want[..], "pos {pos}");
        }
        assert_eq!(w.read_at(4, &mut buf).unwrap(), 0);
        assert_eq!(w.read_at(100, &mut buf).unwrap(), 0);
    }

    #[test]
    fn short_buffers_take_the_newest_bytes() {
        let mem = Mem((0..10).collect());
        let w = window(&mem);

        let mut buf = [0u8; 2];
        assert_eq!(w.read_at(0, &mut buf).unwrap(), 2);
        assert_eq!(buf, [6, 5]);

        // Shifted so the request underflows the window start: truncated.
        let mut buf = [0u8; 2];
        assert_eq!(w.read_at(3, &mut buf).unwrap(), 1);
        assert_eq!(buf[0], 3);
    }

    #[test]
    fn source_ending_inside_window_is_an_error() {
        let mem = Mem((0..5).collect());
        let w = ReverseWindow::new(&mem, 3, 4);

        let mut buf = [0u8; 4];
        let err = w.read_at(0, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}

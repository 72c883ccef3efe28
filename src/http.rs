//! Random access over HTTP byte ranges.
//!
//! [`HttpReader`] is a positional-read source whose backing store is a
//! remote archive served with range-request support, so
//! [`Archive`](crate::read::Archive) works against it unchanged. Servers
//! that ignore the `Range` header and answer `200` get their whole
//! response spilled to a temporary file, which then serves every
//! subsequent read locally.

use crate::errors::{BadUrlSnafu, Error, HttpStatusSnafu, HttpTransportSnafu, IoSnafu, Result};
use parking_lot::Mutex;
use positioned_io::ReadAt;
use reqwest::blocking::Client;
use reqwest::header::RANGE;
use reqwest::StatusCode;
use snafu::ResultExt;
use std::fs::File;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpReader {
    client: Client,
    url: Url,
    /// Cursor for the sequential [`io::Read`]/[`io::Seek`] face.
    pos: u64,
    /// Whole-response copy, once a server answers 200 to a range request.
    spill: Mutex<Option<File>>,
    bytes_read: AtomicU64,
}

impl HttpReader {
    pub fn open(url: &str) -> Result<Self> {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    /// `timeout` bounds every request this reader makes; it is the
    /// caller's cancellation lever.
    pub fn with_timeout(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url).context(BadUrlSnafu)?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context(HttpTransportSnafu)?;
        Ok(HttpReader {
            client,
            url,
            pos: 0,
            spill: Mutex::new(None),
            bytes_read: AtomicU64::new(0),
        })
    }

    /// Bytes received over the network so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    fn fetch(&self, pos: u64, buf: &mut [u8]) -> Result<usize> {
        let end = pos + buf.len() as u64 - 1;
        let resp = self
            .client
            .get(self.url.clone())
            .header(RANGE, format!("bytes={pos}-{end}"))
            .send()
            .context(HttpTransportSnafu)?;

        match resp.status() {
            StatusCode::RANGE_NOT_SATISFIABLE => Ok(0),
            StatusCode::PARTIAL_CONTENT => {
                let n = read_body(resp, buf).context(IoSnafu {
                    what: "read response body",
                })?;
                self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
                Ok(n)
            }
            StatusCode::OK => {
                // The server ignored the range; keep the whole body.
                let mut file = tempfile::tempfile().context(IoSnafu {
                    what: "spill response body",
                })?;
                let mut body = resp;
                let n = io::copy(&mut body, &mut file).context(IoSnafu {
                    what: "spill response body",
                })?;
                self.bytes_read.fetch_add(n, Ordering::Relaxed);

                let got = file.read_at(pos, buf).context(IoSnafu {
                    what: "read spilled response",
                })?;
                *self.spill.lock() = Some(file);
                Ok(got)
            }
            status => HttpStatusSnafu {
                status: status.as_u16(),
                url: self.url.to_string(),
            }
            .fail()
            .map_err(Error::from),
        }
    }
}

fn read_body(mut resp: reqwest::blocking::Response, buf: &mut [u8]) -> io::Result<usize> {
    use io::Read;

    let mut done = 0;
    while done < buf.len() {
        match resp.read(&mut buf[done..]) {
            Ok(0) => break,
            Ok(n) => done += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(done)
}

impl ReadAt for HttpReader {
    fn read_at(&self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if let Some(file) = &*self.spill.lock() {
            return file.read_at(pos, buf);
        }

        self.fetch(pos, buf).map_err(io::Error::other)
    }
}

impl io::Read for HttpReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.read_at(self.pos, buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl io::Seek for HttpReader {
    fn seek(&mut self, from: io::SeekFrom) -> io::Result<u64> {
        match from {
            io::SeekFrom::Start(pos) => self.pos = pos,
            io::SeekFrom::Current(delta) => {
                self.pos = self
                    .pos
                    .checked_add_signed(delta)
                    .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidInput))?;
            }
            io::SeekFrom::End(_) => {
                // The remote length is unknown without another request.
                return Err(io::Error::from(io::ErrorKind::Unsupported));
            }
        }
        Ok(self.pos)
    }
}

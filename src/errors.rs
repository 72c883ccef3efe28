use snafu::Snafu;
use std::io;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub struct Error(ErrorInner);

/// Coarse classification of an [`Error`], mirroring where it came from.
/// Out-of-range positional reads are not an error: bounded sources report
/// them as end-of-input.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed header, trailer, or varint.
    Decode,
    /// The underlying positional source or sink failed.
    Io,
    /// The remote backing store misbehaved.
    Http,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self.0 {
            ErrorInner::Decode { .. } => ErrorKind::Decode,
            ErrorInner::Io { .. } => ErrorKind::Io,
            ErrorInner::BadUrl { .. }
            | ErrorInner::HttpTransport { .. }
            | ErrorInner::HttpStatus { .. } => ErrorKind::Http,
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub(crate) enum ErrorInner {
    #[snafu(display("{what}: {source}"))]
    Io { what: &'static str, source: io::Error },

    #[snafu(display("decode: {source}"))]
    Decode { source: repr::DecodeError },

    #[snafu(display("bad archive url: {source}"))]
    BadUrl { source: url::ParseError },

    #[snafu(display("http transport: {source}"))]
    HttpTransport { source: reqwest::Error },

    #[snafu(display("unexpected http status {status} for {url}"))]
    HttpStatus { status: u16, url: String },
}

impl From<repr::DecodeError> for Error {
    fn from(e: repr::DecodeError) -> Self {
        Self(ErrorInner::Decode { source: e })
    }
}

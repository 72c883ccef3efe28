//! HTTP byte-range server for an archive.
//!
//! A thin collaborator for the `serve` subcommand: it holds the archive
//! bytes in memory and answers `GET /` with single-range support, which is
//! everything [`HttpReader`](crate::http::HttpReader) needs from the other
//! end.

use crate::errors::{IoSnafu, Result};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use snafu::ResultExt;
use std::net::SocketAddr;
use std::sync::Arc;

use slog::{info, Logger};

/// Serves `bytes` on `addr` until the process is killed.
pub fn run(addr: SocketAddr, bytes: Vec<u8>, logger: Logger) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context(IoSnafu {
            what: "start runtime",
        })?;

    rt.block_on(async move {
        let listener = tokio::net::TcpListener::bind(addr).await.context(IoSnafu {
            what: "bind listener",
        })?;
        info!(logger, "serving archive";
            "addr" => addr.to_string(),
            "bytes" => bytes.len()
        );
        axum::serve(listener, router(Arc::new(bytes)))
            .await
            .context(IoSnafu { what: "serve" })?;
        Ok(())
    })
}

pub fn router(bytes: Arc<Vec<u8>>) -> Router {
    Router::new().route("/", get(get_archive)).with_state(bytes)
}

async fn get_archive(State(bytes): State<Arc<Vec<u8>>>, headers: HeaderMap) -> Response {
    let total = bytes.len() as u64;

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(|spec| parse_range(spec, total));

    match range {
        // No Range header, or one we cannot parse: whole body.
        None | Some(ByteRange::Malformed) => {
            ([(header::ACCEPT_RANGES, "bytes")], bytes.to_vec()).into_response()
        }
        Some(ByteRange::Satisfiable(start, end)) => (
            StatusCode::PARTIAL_CONTENT,
            [
                (
                    header::CONTENT_RANGE,
                    format!("bytes {start}-{end}/{total}"),
                ),
                (header::ACCEPT_RANGES, "bytes".to_string()),
            ],
            bytes[start as usize..=end as usize].to_vec(),
        )
            .into_response(),
        Some(ByteRange::Unsatisfiable) => (
            StatusCode::RANGE_NOT_SATISFIABLE,
            [(header::CONTENT_RANGE, format!("bytes */{total}"))],
            Vec::new(),
        )
            .into_response(),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ByteRange {
    Satisfiable(u64, u64),
    Unsatisfiable,
    Malformed,
}

/// Parses a single-range `bytes=` spec against a resource of `total`
/// bytes. Multi-range requests are answered with their first range only.
fn parse_range(spec: &str, total: u64) -> ByteRange {
    let Some(ranges) = spec.strip_prefix("bytes=") else {
        return ByteRange::Malformed;
    };
    let (range, _) = ranges.split_once(',').unwrap_or((ranges, ""));
    let Some((a, b)) = range.trim().split_once('-') else {
        return ByteRange::Malformed;
    };

    if a.is_empty() {
        // Suffix form: the last `b` bytes.
        let Ok(suffix) = b.parse::<u64>() else {
            return ByteRange::Malformed;
        };
        if suffix == 0 || total == 0 {
            return ByteRange::Unsatisfiable;
        }
        return ByteRange::Satisfiable(total.saturating_sub(suffix), total - 1);
    }

    let Ok(start) = a.parse::<u64>() else {
        return ByteRange::Malformed;
    };
    if start >= total {
        return ByteRange::Unsatisfiable;
    }
    let end = if b.is_empty() {
        total - 1
    } else {
        match b.parse::<u64>() {
            Ok(end) => end.min(total - 1),
            Err(_) => return ByteRange::Malformed,
        }
    };
    if end < start {
        return ByteRange::Malformed;
    }
    ByteRange::Satisfiable(start, end)
}

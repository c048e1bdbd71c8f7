// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The file handler: serve one request out of the content cache.
//!
//! The cache lease taken here lives on the connection task's stack, so it
//! is released on completion and on reaping alike. Cache misses do their
//! filesystem work (file read, listing scan and render) on the blocking
//! pool while the task suspends, keeping the worker's event loop free for
//! its other connections. Error statuses follow the filesystem surface:
//! permission problems are 403, fd exhaustion is 503, a missing target
//! is 404.

use std::io::SeekFrom;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use loft_cache::{build_artifact, Artifact, ArtifactError, Variant};
use loft_core::{http_date, HttpStatus};
use loft_http::{ContentRange, Method, RangeWindow, Request, ResponseHead};

use crate::worker::Shared;

/// Linux errno values for a full file table; `open` failing with either
/// maps to 503 rather than killing the request pipeline.
const ENFILE: i32 = 23;
const EMFILE: i32 = 24;

/// Header date strings cached per worker, formatted at most once per
/// second. Refreshed by the reaper tick and at connection admission, so
/// they stay current through idle stretches without per-response
/// formatting.
#[derive(Debug, Clone)]
pub(crate) struct Dates {
    pub date: Rc<str>,
    pub expires: Rc<str>,
    unix: i64,
}

/// `Expires` leads `Date` by one week.
const EXPIRES_AHEAD_SECS: i64 = 7 * 24 * 60 * 60;

impl Dates {
    pub fn now() -> Self {
        Self::at(unix_now())
    }

    fn at(now: i64) -> Self {
        Self {
            date: http_date(now).into(),
            expires: http_date(now + EXPIRES_AHEAD_SECS).into(),
            unix: now,
        }
    }

    /// Re-format the strings when the second has rolled over.
    pub fn refresh(&mut self) {
        let now = unix_now();
        if now != self.unix {
            *self = Self::at(now);
        }
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Serve one parsed request. Returns whether the connection may carry
/// another request; socket failures bubble up as `Err` and drop the
/// connection without a response.
pub(crate) async fn serve_request<S>(
    stream: &mut S,
    out: &mut Vec<u8>,
    req: &Request,
    shared: &Arc<Shared>,
    dates: &Dates,
) -> std::io::Result<bool>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Fresh hits stay inline; a miss runs the build (and its filesystem
    // work) on the blocking pool, suspending this task until it is done
    let lease = match shared.cache.get(&req.path, Instant::now()) {
        Some(lease) => lease,
        None => {
            let task_shared = Arc::clone(shared);
            let key = req.path.clone();
            let built = tokio::task::spawn_blocking(move || {
                task_shared.cache.lookup(&key, Instant::now(), || {
                    build_artifact(&task_shared.root, &key)
                })
            })
            .await;
            match built {
                Ok(Ok(lease)) => lease,
                Ok(Err(ArtifactError::NotFound)) => {
                    return error_response(stream, out, HttpStatus::NotFound, req, dates).await;
                }
                Ok(Err(ArtifactError::Io(e))) => {
                    let status = io_error_status(&e, HttpStatus::InternalError);
                    debug!(path = %req.path, error = %e, status = status.code(), "artifact build failed");
                    return error_response(stream, out, status, req, dates).await;
                }
                Err(e) => {
                    debug!(path = %req.path, error = %e, "artifact build task died");
                    return error_response(stream, out, HttpStatus::InternalError, req, dates)
                        .await;
                }
            }
        }
    };
    let artifact: &Artifact = &lease;

    if let Some(since) = req.if_modified_since {
        if artifact.last_modified_unix() <= since {
            let mut head = ResponseHead::new(HttpStatus::NotModified);
            head.keep_alive = req.keep_alive;
            head.date = &dates.date;
            head.last_modified = Some(artifact.last_modified_http());
            write_head(stream, out, &head).await?;
            return Ok(req.keep_alive);
        }
    }

    match artifact.variant() {
        Variant::Small {
            uncompressed,
            compressed,
        } => {
            serve_buffer(
                stream,
                out,
                req,
                dates,
                artifact,
                uncompressed,
                compressed.as_deref(),
                true,
            )
            .await
        }
        Variant::Listing { html } => {
            serve_buffer(stream, out, req, dates, artifact, html, None, false).await
        }
        Variant::Large { rel, size } => {
            serve_large(stream, out, req, shared, dates, artifact, rel, *size).await
        }
    }
}

/// In-memory payloads: the head and body go out back to back. A byte
/// range is cut straight from the buffer and disables the deflate copy
/// (`Content-Encoding` does not compose with a partial window); whole
/// responses use the compressed copy when the client opted in.
#[allow(clippy::too_many_arguments)]
async fn serve_buffer<S>(
    stream: &mut S,
    out: &mut Vec<u8>,
    req: &Request,
    dates: &Dates,
    artifact: &Artifact,
    uncompressed: &[u8],
    compressed: Option<&[u8]>,
    accept_ranges: bool,
) -> std::io::Result<bool>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let size = uncompressed.len() as u64;
    let window = match req.range {
        Some(range) => range.window(size),
        None => RangeWindow::Whole,
    };

    let (status, payload, deflate, content_range) = match window {
        RangeWindow::Whole => match compressed {
            Some(c) if req.accepts_deflate => (HttpStatus::Ok, c, true, None),
            _ => (HttpStatus::Ok, uncompressed, false, None),
        },
        RangeWindow::Partial { from, len } => (
            HttpStatus::PartialContent,
            &uncompressed[from as usize..(from + len) as usize],
            false,
            Some(ContentRange {
                first: from,
                last: from + len - 1,
                size,
            }),
        ),
        RangeWindow::Unsatisfiable => {
            return error_response(stream, out, HttpStatus::RangeNotSatisfiable, req, dates).await;
        }
    };

    let mut head = ResponseHead::new(status);
    head.keep_alive = req.keep_alive;
    head.date = &dates.date;
    head.expires = &dates.expires;
    head.last_modified = Some(artifact.last_modified_http());
    head.content_type = Some(artifact.mime());
    head.content_length = Some(payload.len() as u64);
    head.content_range = content_range;
    head.deflate = deflate;
    head.accept_ranges = accept_ranges;
    write_head(stream, out, &head).await?;

    if req.method == Method::Get {
        stream.write_all(payload).await?;
        stream.flush().await?;
    }
    Ok(req.keep_alive)
}

/// Streamed payloads: resolve the byte window, open the file at serve
/// time, send the head with a streaming hint, then copy the window.
#[allow(clippy::too_many_arguments)]
async fn serve_large<S>(
    stream: &mut S,
    out: &mut Vec<u8>,
    req: &Request,
    shared: &Shared,
    dates: &Dates,
    artifact: &Artifact,
    rel: &std::path::Path,
    size: u64,
) -> std::io::Result<bool>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let window = match req.range {
        Some(range) => range.window(size),
        None => RangeWindow::Whole,
    };
    let (status, from, len, content_range) = match window {
        RangeWindow::Whole => (HttpStatus::Ok, 0, size, None),
        RangeWindow::Partial { from, len } => (
            HttpStatus::PartialContent,
            from,
            len,
            Some(ContentRange {
                first: from,
                last: from + len - 1,
                size,
            }),
        ),
        RangeWindow::Unsatisfiable => {
            return error_response(stream, out, HttpStatus::RangeNotSatisfiable, req, dates).await;
        }
    };

    let mut file = match tokio::fs::File::open(shared.root.dir().join(rel)).await {
        Ok(f) => f,
        Err(e) => {
            let status = io_error_status(&e, HttpStatus::NotFound);
            debug!(path = %rel.display(), error = %e, status = status.code(), "open failed");
            return error_response(stream, out, status, req, dates).await;
        }
    };

    let mut head = ResponseHead::new(status);
    head.keep_alive = req.keep_alive;
    head.date = &dates.date;
    head.expires = &dates.expires;
    head.last_modified = Some(artifact.last_modified_http());
    head.content_type = Some(artifact.mime());
    head.content_length = Some(len);
    head.content_range = content_range;
    head.accept_ranges = true;
    write_head(stream, out, &head).await?;

    if req.method == Method::Head {
        return Ok(req.keep_alive);
    }

    if from > 0 {
        file.seek(SeekFrom::Start(from)).await?;
    }
    let copied = tokio::io::copy(&mut (&mut file).take(len), stream).await?;
    stream.flush().await?;
    if copied < len {
        // File shrank under us; close so the peer sees the truncation
        debug!(path = %rel.display(), copied, expected = len, "short file transfer");
        return Ok(false);
    }
    Ok(req.keep_alive)
}

/// Error page with the connection kept alive when the request allows it.
async fn error_response<S>(
    stream: &mut S,
    out: &mut Vec<u8>,
    status: HttpStatus,
    req: &Request,
    dates: &Dates,
) -> std::io::Result<bool>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let body = error_body(status);
    let mut head = ResponseHead::new(status);
    head.keep_alive = req.keep_alive;
    head.date = &dates.date;
    head.content_type = Some("text/html");
    head.content_length = Some(body.len() as u64);
    write_head(stream, out, &head).await?;

    if req.method == Method::Get {
        stream.write_all(body.as_bytes()).await?;
        stream.flush().await?;
    }
    Ok(req.keep_alive)
}

/// 405 for a method the parser refused; always closes.
pub(crate) async fn method_not_allowed<S>(
    stream: &mut S,
    out: &mut Vec<u8>,
    dates: &Dates,
) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let status = HttpStatus::MethodNotAllowed;
    let body = error_body(status);
    let mut head = ResponseHead::new(status);
    head.date = &dates.date;
    head.content_type = Some("text/html");
    head.content_length = Some(body.len() as u64);
    write_head(stream, out, &head).await?;
    stream.write_all(body.as_bytes()).await?;
    stream.flush().await
}

async fn write_head<S>(
    stream: &mut S,
    out: &mut Vec<u8>,
    head: &ResponseHead<'_>,
) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    out.clear();
    head.write_to(out);
    stream.write_all(out).await
}

fn error_body(status: HttpStatus) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><title>{status}</title></head>\n<body><h1>{status}</h1></body></html>\n"
    )
}

/// Classify a filesystem failure: permission problems are 403, a full
/// file table is 503, a vanished target is 404, anything else is the
/// caller's fallback (404 when opening a resolved file, 500 for a failed
/// artifact build).
fn io_error_status(e: &std::io::Error, fallback: HttpStatus) -> HttpStatus {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => HttpStatus::Forbidden,
        std::io::ErrorKind::NotFound => HttpStatus::NotFound,
        _ => match e.raw_os_error() {
            Some(ENFILE) | Some(EMFILE) => HttpStatus::Unavailable,
            _ => fallback,
        },
    }
}

#[cfg(test)]
#[path = "serve_tests.rs"]
mod tests;

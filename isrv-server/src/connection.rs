//! # Request Task
//!
//! One connection, one request line, one response line.
//!
//! ```text
//! read line ─► parse ─► cacheable? ─ yes ─► cache hit? ─ yes ─► write cached ─► close
//!                          │                    │ no
//!                          │ no                 ▼
//!                          └──────────────► execute ─► write ─► cache (if cacheable) ─► close
//! ```
//!
//! Failures stay inside the task: they are logged and the connection is
//! dropped, nothing propagates to the acceptor or the pool.

use std::net::SocketAddr;
use std::time::Instant;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use isrv_common::protocol::{MAX_LINE_LEN, RESPONSE_BAD_ARGUMENTS, RESPONSE_ERROR};
use isrv_common::{IsrvError, IsrvResult};

use crate::command::Command;
use crate::protocol::{LineError, LineParser};
use crate::server::Server;

/// Serves a single accepted connection; the socket closes when this returns.
///
/// `generation` is the run whose acceptor took the connection.
pub async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    server: Server,
    generation: u64,
) {
    let started = Instant::now();
    let metrics = server.metrics();
    metrics.record_request_start();

    if let Err(err) = serve(&mut stream, &server, generation).await {
        match err {
            IsrvError::LineTooLong(_) => metrics.record_protocol_error(),
            _ => metrics.record_io_error(),
        }
        warn!(%peer, error = %err, "error while processing the client request");
    }

    metrics.record_request_end(started.elapsed());
}

/// Runs the request protocol over any byte stream.
pub async fn serve<S>(stream: &mut S, server: &Server, generation: u64) -> IsrvResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Some(line) = read_request_line(stream).await? else {
        debug!("client closed the connection without a request");
        return Ok(());
    };

    let command = Command::parse(&line);
    debug!(verb = command.name(), "dispatching request");

    let key = command.cache_key();
    if let Some(key) = &key {
        if let Some(cached) = server.cache().get(key) {
            debug!(%key, "cache hit");
            return write_response(stream, &cached).await;
        }
    }

    let result = command.execute(server, generation).await;
    if result == RESPONSE_ERROR || result == RESPONSE_BAD_ARGUMENTS {
        server.metrics().record_protocol_error();
    }
    write_response(stream, &result).await?;

    if let Some(key) = key {
        server.cache().put(key, result);
    }
    Ok(())
}

async fn read_request_line<R>(reader: &mut R) -> IsrvResult<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(256);
    let mut parser = LineParser::new(MAX_LINE_LEN);
    loop {
        match parser.parse(&mut buf) {
            Ok(Some(line)) => return Ok(Some(line)),
            Ok(None) => {}
            Err(LineError::TooLong(limit)) => return Err(IsrvError::LineTooLong(limit)),
        }
        if reader.read_buf(&mut buf).await? == 0 {
            return Ok(parser.finish(&mut buf));
        }
    }
}

async fn write_response<W>(writer: &mut W, response: &str) -> IsrvResult<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(response.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    writer.shutdown().await?;
    Ok(())
}

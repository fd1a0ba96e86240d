//! GETFILE over TCP: the client transport, the per-connection response
//! handle, and the accept loop that feeds the dispatcher

use anyhow::{Context, Result};
use std::io::{self, BufReader, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use crate::error::{HandlerError, TransferError};
use crate::handle::HandleSlot;
use crate::protocol::{
    build_request, build_response_header, parse_request, parse_response_header, read_header,
    Status,
};
use crate::shutdown::ShutdownSignal;
use crate::stream::CHUNK_SIZE;
use crate::transfer::{FetchContext, ResponseHandle, Transport};

pub mod timeouts {
    use std::time::Duration;

    pub const CONNECT: Duration = Duration::from_secs(5);

    // A peer that has not finished its request header by then is dropped.
    // Headers are read on the accept thread, so this bounds how long one
    // idle peer holds up the connections behind it.
    pub const REQUEST_HEADER: Duration = Duration::from_secs(1);

    // How often a non-blocking accept loop rechecks the shutdown signal.
    pub const ACCEPT_POLL: Duration = Duration::from_millis(50);
}

fn tune_socket(stream: &TcpStream) {
    let _ = stream.set_nodelay(true);
}

fn invalid_data(e: anyhow::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e.to_string())
}

#[derive(Clone, Debug)]
pub struct TcpTransport {
    pub connect_timeout: Duration,
    /// Applied to reads and writes once connected; `None` blocks forever.
    pub io_timeout: Option<Duration>,
}

impl Default for TcpTransport {
    fn default() -> Self {
        TcpTransport {
            connect_timeout: timeouts::CONNECT,
            io_timeout: None,
        }
    }
}

impl TcpTransport {
    fn connect(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(s) => return Ok(s),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no address for {}", host))
        }))
    }
}

impl Transport for TcpTransport {
    fn perform(&self, ctx: &mut FetchContext<'_>) -> Result<(), TransferError> {
        let endpoint = ctx.endpoint().clone();
        let stream = self
            .connect(&endpoint.host, endpoint.port)
            .map_err(TransferError::Transport)?;
        tune_socket(&stream);
        stream
            .set_read_timeout(self.io_timeout)
            .and_then(|_| stream.set_write_timeout(self.io_timeout))
            .map_err(TransferError::Transport)?;

        (&stream)
            .write_all(&build_request(ctx.path()))
            .map_err(TransferError::Transport)?;

        let mut reader = BufReader::with_capacity(CHUNK_SIZE, &stream);
        let header = read_header(&mut reader).map_err(TransferError::Transport)?;
        let (status, len) = parse_response_header(&header)
            .map_err(|e| TransferError::Transport(invalid_data(e)))?;
        ctx.set_response(status, len);
        if status != Status::Ok {
            return Ok(());
        }

        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut remaining = len;
        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            let n = match reader.read(&mut buf[..want]) {
                Ok(0) => {
                    return Err(TransferError::ShortIo {
                        expected: len,
                        actual: len - remaining,
                    })
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransferError::Transport(e)),
            };
            ctx.deliver(&buf[..n]).map_err(TransferError::Resource)?;
            remaining -= n as u64;
        }
        Ok(())
    }
}

/// Response side of one accepted connection.
pub struct TcpResponse {
    stream: TcpStream,
}

impl TcpResponse {
    pub fn new(stream: TcpStream) -> Self {
        TcpResponse { stream }
    }
}

impl ResponseHandle for TcpResponse {
    fn send_header(&mut self, status: Status, len: u64) -> io::Result<()> {
        self.stream.write_all(&build_response_header(status, len))
    }

    fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        self.stream.write_all(data)?;
        Ok(data.len())
    }

    fn abort(self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    fn finish(mut self) {
        let _ = self.stream.flush();
        let _ = self.stream.shutdown(Shutdown::Write);
    }
}

/// Accept connections until `shutdown` is triggered. Each request header is
/// parsed here, then `handler` gets the connection in a `HandleSlot`; it is
/// expected to detach and return quickly.
///
/// Accepting is serial: a peer that connects and sends nothing delays later
/// connections by up to `timeouts::REQUEST_HEADER`.
pub fn serve<F>(listener: TcpListener, mut handler: F, shutdown: &ShutdownSignal) -> Result<()>
where
    F: FnMut(&mut HandleSlot<TcpResponse>, &str) -> Result<(), HandlerError>,
{
    listener
        .set_nonblocking(true)
        .context("Failed to make listener non-blocking")?;
    while !shutdown.is_triggered() {
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = handle_conn(stream, &mut handler) {
                    eprintln!("connection error from {}: {}", peer, e);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(timeouts::ACCEPT_POLL),
            Err(e) => {
                eprintln!("accept error: {}", e);
                thread::sleep(timeouts::ACCEPT_POLL);
            }
        }
    }
    Ok(())
}

fn handle_conn<F>(mut stream: TcpStream, handler: &mut F) -> Result<()>
where
    F: FnMut(&mut HandleSlot<TcpResponse>, &str) -> Result<(), HandlerError>,
{
    // Accepted sockets inherit non-blocking mode on some platforms.
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(timeouts::REQUEST_HEADER))?;
    tune_socket(&stream);

    let header = read_header(&mut BufReader::new(&stream)).context("reading request header")?;
    let path = match parse_request(&header) {
        Ok(p) => p,
        Err(e) => {
            let _ = stream.write_all(&build_response_header(Status::Invalid, 0));
            let _ = stream.shutdown(Shutdown::Both);
            return Err(e);
        }
    };
    stream.set_read_timeout(None)?;

    let mut slot = HandleSlot::new(TcpResponse::new(stream));
    if let Err(e) = handler(&mut slot, &path) {
        if let Some(mut h) = slot.take() {
            let _ = h.send_header(Status::Error, 0);
            h.abort();
        }
        return Err(e).with_context(|| format!("handler refused {}", path));
    }
    Ok(())
}

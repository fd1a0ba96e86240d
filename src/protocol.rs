//! GETFILE header format shared by the client transport and the daemon
//!
//! Request:  `GETFILE GET <path>\r\n\r\n`
//! Response: `GETFILE <STATUS>[ <len>]\r\n\r\n`, followed by exactly `len`
//! body bytes when the status is `OK`.

use anyhow::{anyhow, bail, Result};
use std::fmt;
use std::io::{self, BufRead, Read};

pub const SCHEME: &str = "GETFILE";
pub const METHOD: &str = "GET";
pub const TERMINATOR: &[u8; 4] = b"\r\n\r\n";

// Upper bound on a header, terminator included. Guards the accept thread
// against peers that never send a terminator.
pub const MAX_HEADER_LEN: usize = 4096;

pub mod defaults {
    pub const CLIENT_PORT: u16 = 29458;
    pub const SERVER_PORT: u16 = 10880;
    pub const SERVER: &str = "127.0.0.1";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Ok,
    FileNotFound,
    Error,
    Invalid,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::FileNotFound => "FILE_NOT_FOUND",
            Status::Error => "ERROR",
            Status::Invalid => "INVALID",
        }
    }

    pub fn parse(s: &str) -> Option<Status> {
        match s {
            "OK" => Some(Status::Ok),
            "FILE_NOT_FOUND" => Some(Status::FileNotFound),
            "ERROR" => Some(Status::Error),
            "INVALID" => Some(Status::Invalid),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn build_request(path: &str) -> Vec<u8> {
    format!("{} {} {}\r\n\r\n", SCHEME, METHOD, path).into_bytes()
}

/// Parse a request header (terminator already stripped) into its path.
pub fn parse_request(header: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(header).map_err(|_| anyhow!("request header is not utf8"))?;
    let mut parts = text.split(' ');
    let (scheme, method, path) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(s), Some(m), Some(p), None) => (s, m, p),
        _ => bail!("malformed request header: {:?}", text),
    };
    if scheme != SCHEME {
        bail!("unknown scheme {:?}", scheme);
    }
    if method != METHOD {
        bail!("unsupported method {:?}", method);
    }
    if !path.starts_with('/') {
        bail!("request path must be absolute: {:?}", path);
    }
    Ok(path.to_string())
}

/// Only `OK` carries a length on the wire.
pub fn build_response_header(status: Status, len: u64) -> Vec<u8> {
    match status {
        Status::Ok => format!("{} {} {}\r\n\r\n", SCHEME, status, len).into_bytes(),
        _ => format!("{} {}\r\n\r\n", SCHEME, status).into_bytes(),
    }
}

pub fn parse_response_header(header: &[u8]) -> Result<(Status, u64)> {
    let text = std::str::from_utf8(header).map_err(|_| anyhow!("response header is not utf8"))?;
    let mut parts = text.split(' ');
    if parts.next() != Some(SCHEME) {
        bail!("unknown scheme in response {:?}", text);
    }
    let status = parts
        .next()
        .and_then(Status::parse)
        .ok_or_else(|| anyhow!("unknown status in response {:?}", text))?;
    let len = match (status, parts.next()) {
        (Status::Ok, Some(n)) => n
            .parse::<u64>()
            .map_err(|_| anyhow!("bad length in response {:?}", text))?,
        (Status::Ok, None) => bail!("OK response without length"),
        (_, None) => 0,
        (_, Some(_)) => bail!("unexpected length on {} response", status),
    };
    if parts.next().is_some() {
        bail!("trailing data in response header {:?}", text);
    }
    Ok((status, len))
}

/// Read one header up to and including the terminator and return it without
/// the terminator. Body bytes that follow stay buffered in `r`. At most
/// `MAX_HEADER_LEN` plus the terminator and one byte is consumed.
pub fn read_header<R: BufRead>(r: &mut R) -> io::Result<Vec<u8>> {
    let limit = (MAX_HEADER_LEN + TERMINATOR.len() + 1) as u64;
    let mut bounded = r.by_ref().take(limit);
    let mut buf = Vec::with_capacity(64);
    loop {
        let n = bounded.read_until(b'\n', &mut buf)?;
        if buf.ends_with(TERMINATOR) {
            buf.truncate(buf.len() - TERMINATOR.len());
            return Ok(buf);
        }
        if buf.len() > MAX_HEADER_LEN {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "header too long"));
        }
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before header terminator",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Read};

    #[test]
    fn request_header_parses_back_to_path() {
        let raw = build_request("/courses/ud923/filecorpus/road.jpg");
        let mut r = BufReader::new(&raw[..]);
        let header = read_header(&mut r).unwrap();
        assert_eq!(
            parse_request(&header).unwrap(),
            "/courses/ud923/filecorpus/road.jpg"
        );
    }

    #[test]
    fn malformed_requests_are_rejected() {
        assert!(parse_request(b"GETFILE GET").is_err());
        assert!(parse_request(b"GETFILE PUT /a").is_err());
        assert!(parse_request(b"HTTP GET /a").is_err());
        assert!(parse_request(b"GETFILE GET relative").is_err());
        assert!(parse_request(b"GETFILE GET /a extra").is_err());
        assert!(parse_request(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn response_headers() {
        assert_eq!(build_response_header(Status::Ok, 42), b"GETFILE OK 42\r\n\r\n");
        assert_eq!(
            build_response_header(Status::FileNotFound, 0),
            b"GETFILE FILE_NOT_FOUND\r\n\r\n"
        );
        assert_eq!(parse_response_header(b"GETFILE OK 42").unwrap(), (Status::Ok, 42));
        assert_eq!(
            parse_response_header(b"GETFILE ERROR").unwrap(),
            (Status::Error, 0)
        );
        assert!(parse_response_header(b"GETFILE OK").is_err());
        assert!(parse_response_header(b"GETFILE OK -1").is_err());
        assert!(parse_response_header(b"GETFILE MAYBE").is_err());
        assert!(parse_response_header(b"GETFILE ERROR 12").is_err());
    }

    #[test]
    fn body_after_header_stays_buffered() {
        let mut raw = build_response_header(Status::Ok, 5);
        raw.extend_from_slice(b"hello");
        let mut r = BufReader::new(&raw[..]);
        let header = read_header(&mut r).unwrap();
        assert_eq!(parse_response_header(&header).unwrap(), (Status::Ok, 5));
        let mut body = String::new();
        r.read_to_string(&mut body).unwrap();
        assert_eq!(body, "hello");
    }

    #[test]
    fn truncated_or_oversized_headers_fail() {
        let mut r = BufReader::new(&b"GETFILE OK 5\r\n"[..]);
        assert_eq!(
            read_header(&mut r).unwrap_err().kind(),
            io::ErrorKind::UnexpectedEof
        );

        let long = vec![b'a'; MAX_HEADER_LEN + 10];
        let mut r = BufReader::new(&long[..]);
        assert_eq!(
            read_header(&mut r).unwrap_err().kind(),
            io::ErrorKind::InvalidData
        );
    }

    struct Counting<R> {
        inner: R,
        consumed: usize,
    }

    impl<R: Read> Read for Counting<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.inner.read(buf)?;
            self.consumed += n;
            Ok(n)
        }
    }

    #[test]
    fn endless_header_without_newline_stops_at_limit() {
        let mut r = BufReader::with_capacity(
            256,
            Counting {
                inner: io::repeat(b'a'),
                consumed: 0,
            },
        );
        assert_eq!(
            read_header(&mut r).unwrap_err().kind(),
            io::ErrorKind::InvalidData
        );
        assert!(r.get_ref().consumed <= MAX_HEADER_LEN + 256 + TERMINATOR.len() + 1);
    }

    #[test]
    fn status_text() {
        assert_eq!(Status::FileNotFound.to_string(), "FILE_NOT_FOUND");
        assert_eq!(Status::parse("INVALID"), Some(Status::Invalid));
        assert_eq!(Status::parse("ok"), None);
    }
}

//! Chunked streaming from a content source to an attached response handle

use std::io;
use thiserror::Error;

use crate::content::ContentSource;
use crate::error::TransferError;
use crate::handle::Attached;
use crate::transfer::ResponseHandle;

/// Bytes read and sent per step. Not visible on the wire.
pub const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("read failed at offset {offset}: {source}")]
    Read {
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("unexpected end of content at offset {offset}: wanted {wanted} bytes, got {got}")]
    UnexpectedEof { offset: u64, wanted: usize, got: usize },

    #[error("send failed at offset {offset}: {source}")]
    Send {
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("short send at offset {offset}: handed {handed} bytes, sent {sent}")]
    ShortWrite {
        offset: u64,
        handed: usize,
        sent: usize,
    },
}

impl From<StreamError> for TransferError {
    fn from(e: StreamError) -> Self {
        match e {
            StreamError::Read { source, .. } => TransferError::Resource(source),
            StreamError::UnexpectedEof { wanted, got, .. } => TransferError::ShortIo {
                expected: wanted as u64,
                actual: got as u64,
            },
            StreamError::Send { source, .. } => TransferError::Transport(source),
            StreamError::ShortWrite { handed, sent, .. } => TransferError::ShortIo {
                expected: handed as u64,
                actual: sent as u64,
            },
        }
    }
}

/// Send exactly `source.len()` bytes in chunks of at most `chunk_size`.
///
/// Interrupted reads are retried. A read that comes back short, or a send
/// that takes fewer bytes than it was given, stops the stream; nothing from
/// the short read is sent. The caller aborts the handle on `Err`.
pub fn stream_content<H, C>(
    handle: &mut Attached<H>,
    source: &C,
    chunk_size: usize,
) -> Result<u64, StreamError>
where
    H: ResponseHandle,
    C: ContentSource + ?Sized,
{
    let total = source.len();
    let chunk = chunk_size.max(1);
    let cap = usize::try_from(total).map_or(chunk, |t| t.min(chunk));
    let mut buf = vec![0u8; cap];
    let mut sent = 0u64;

    while sent < total {
        let wanted = (total - sent).min(chunk as u64) as usize;
        let got = match source.read_at(&mut buf[..wanted], sent) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(StreamError::Read {
                    offset: sent,
                    source: e,
                })
            }
        };
        if got < wanted {
            return Err(StreamError::UnexpectedEof {
                offset: sent,
                wanted,
                got,
            });
        }

        match handle.send(&buf[..got]) {
            Ok(n) if n == got => {}
            Ok(n) => {
                return Err(StreamError::ShortWrite {
                    offset: sent,
                    handed: got,
                    sent: n,
                })
            }
            Err(e) => {
                return Err(StreamError::Send {
                    offset: sent,
                    source: e,
                })
            }
        }
        sent += got as u64;
    }

    Ok(sent)
}

//! Request/response framing for skill connections.
//!
//! A request is the first complete JSON object on the stream. The decoder
//! does not wait for a newline or for the peer to half-close: a resumable
//! bracket scan finds where the object closes, then `serde_json` parses
//! exactly those bytes. Clients that append a newline, or half-close after
//! writing, are handled the same way. The size cap applies to the object
//! itself, complete or not.
//!
//! A response is one JSON object followed by `\n`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tokio_util::codec::Framed;
//! use allpath_runner::ipc::codec::RequestCodec;
//!
//! let mut framed = Framed::new(stream, RequestCodec::new(max_request_bytes));
//! let request = framed.next().await;
//! framed.send(result).await?;
//! ```

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::models::{Request, SkillResult};
use crate::{AppError, Result};

/// Default cap on a single request payload: 1 MiB.
pub const MAX_REQUEST_BYTES: usize = 1_048_576;

/// Codec decoding [`Request`]s and encoding [`SkillResult`]s.
#[derive(Debug, Clone, Copy)]
pub struct RequestCodec {
    max_bytes: usize,
    scan: ObjectScan,
}

impl Default for RequestCodec {
    fn default() -> Self {
        Self::new(MAX_REQUEST_BYTES)
    }
}

impl RequestCodec {
    /// Codec rejecting payloads larger than `max_bytes`.
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            scan: ObjectScan::default(),
        }
    }

    /// Configured payload cap.
    #[must_use]
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Drop everything buffered and start over with an error.
    fn reject(&mut self, src: &mut BytesMut, msg: String) -> AppError {
        src.clear();
        self.scan = ObjectScan::default();
        AppError::Codec(msg)
    }

    fn too_large(&mut self, src: &mut BytesMut) -> AppError {
        let msg = format!("request too large: exceeded {} bytes", self.max_bytes);
        self.reject(src, msg)
    }
}

impl Decoder for RequestCodec {
    type Item = Request;
    type Error = AppError;

    /// Decode the first complete JSON object in `src`.
    ///
    /// Returns `Ok(None)` while the object is still open. Returns
    /// `Err(AppError::Codec(..))` on a syntax error, a schema mismatch, or
    /// a payload beyond the cap, whether or not it is complete.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Request>> {
        if self.scan.is_fresh() {
            let blank = src.iter().take_while(|byte| byte.is_ascii_whitespace()).count();
            src.advance(blank);
            match src.first().copied() {
                None => return Ok(None),
                Some(b'{') => {}
                Some(_) => {
                    return Err(self.reject(src, "invalid request: expected a JSON object".into()))
                }
            }
        }

        let Some(end) = self.scan.advance(src) else {
            if src.len() > self.max_bytes {
                return Err(self.too_large(src));
            }
            return Ok(None);
        };
        if end > self.max_bytes {
            return Err(self.too_large(src));
        }

        let payload = src.split_to(end);
        let request: Request = serde_json::from_slice(&payload).map_err(|err| {
            if err.is_data() {
                AppError::Codec(format!("invalid request: {err}"))
            } else {
                AppError::Codec(format!("malformed request: {err}"))
            }
        })?;
        request.validate()?;
        Ok(Some(request))
    }

    /// Decode at end of stream; a partial value is a truncation error.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Request>> {
        if let Some(request) = self.decode(src)? {
            return Ok(Some(request));
        }
        if src.iter().all(u8::is_ascii_whitespace) {
            self.scan = ObjectScan::default();
            return Ok(None);
        }

        let msg = match serde_json::from_slice::<serde_json::Value>(src) {
            Err(err) if !err.is_eof() => format!("malformed request: {err}"),
            _ => "truncated request: connection closed mid-payload".to_owned(),
        };
        Err(self.reject(src, msg))
    }
}

impl Encoder<SkillResult> for RequestCodec {
    type Error = AppError;

    /// Encode `item` as one `\n`-terminated JSON object.
    fn encode(&mut self, item: SkillResult, dst: &mut BytesMut) -> Result<()> {
        let body = serde_json::to_vec(&item)?;
        dst.reserve(body.len() + 1);
        dst.put_slice(&body);
        dst.put_u8(b'\n');
        Ok(())
    }
}

/// Resumable bracket scanner locating the end of the leading JSON object.
///
/// Each call picks up where the previous one stopped, so a request split
/// across many reads is scanned once in total.
#[derive(Debug, Clone, Copy, Default)]
struct ObjectScan {
    scanned: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl ObjectScan {
    fn is_fresh(&self) -> bool {
        self.scanned == 0
    }

    /// Length of the first complete object in `buf`, if it has closed.
    fn advance(&mut self, buf: &[u8]) -> Option<usize> {
        for (index, &byte) in buf.iter().enumerate().skip(self.scanned) {
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }
            match byte {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        *self = Self::default();
                        return Some(index + 1);
                    }
                }
                _ => {}
            }
        }
        self.scanned = buf.len();
        None
    }
}

//! AMP frame codec for the PM2 daemon sockets.
//!
//! PM2 speaks the axon messaging protocol on both `rpc.sock` and `pub.sock`.
//! Each message is one AMP frame:
//!
//! ```text
//! +--------------------+-------------+-----------+-----+
//! | version<<4 | argc  | u32be len_1 | arg_1 ... | ... |
//! +--------------------+-------------+-----------+-----+
//! ```
//!
//! Argument payloads carry a type prefix: `j:` for JSON, `s:` for UTF-8
//! strings. Anything else is an opaque blob, as is a typed payload that
//! does not decode.
//!
//! Use [`AmpCodec`] with [`tokio_util::codec::FramedRead`] for inbound
//! streams. Outbound frames are encoded into a `BytesMut` and written whole.

use bytes::{BufMut, Bytes, BytesMut};
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::{AppError, Result};

/// Protocol version carried in the high nibble of the header byte.
pub const AMP_VERSION: u8 = 1;

/// Maximum number of arguments in one frame (the argc nibble).
pub const MAX_ARGS: usize = 15;

/// Maximum size of a single argument: 16 MiB.
///
/// A length prefix above this limit is treated as a corrupt stream rather
/// than buffered.
pub const MAX_ARG_BYTES: usize = 16 * 1024 * 1024;

const HEADER_LEN: usize = 1;
const LEN_PREFIX: usize = 4;

/// One decoded frame argument.
#[derive(Debug, Clone, PartialEq)]
pub enum AmpArg {
    /// `j:`-prefixed JSON document.
    Json(Value),
    /// `s:`-prefixed string.
    Str(String),
    /// Untyped payload.
    Blob(Bytes),
}

impl AmpArg {
    /// Borrow the string payload, if this is a string argument.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Take the JSON payload, if this is a JSON argument.
    #[must_use]
    pub fn into_json(self) -> Option<Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    fn encode_payload(&self) -> Result<Vec<u8>> {
        match self {
            Self::Json(value) => {
                let mut out = b"j:".to_vec();
                serde_json::to_writer(&mut out, value)?;
                Ok(out)
            }
            Self::Str(s) => {
                let mut out = Vec::with_capacity(s.len() + 2);
                out.extend_from_slice(b"s:");
                out.extend_from_slice(s.as_bytes());
                Ok(out)
            }
            Self::Blob(b) => Ok(b.to_vec()),
        }
    }

    /// Interpret a typed payload. A `j:` or `s:` payload that fails to
    /// decode is kept as a [`AmpArg::Blob`] of the full raw bytes, so one bad
    /// argument never poisons the stream.
    fn decode_payload(raw: Bytes) -> Self {
        if let Some(json) = raw.strip_prefix(b"j:") {
            match serde_json::from_slice(json) {
                Ok(value) => return Self::Json(value),
                Err(err) => {
                    warn!(%err, len = raw.len(), "undecodable json argument, keeping raw bytes");
                    return Self::Blob(raw);
                }
            }
        }
        if let Some(text) = raw.strip_prefix(b"s:") {
            match std::str::from_utf8(text) {
                Ok(s) => return Self::Str(s.to_owned()),
                Err(err) => {
                    warn!(%err, len = raw.len(), "string argument not utf-8, keeping raw bytes");
                    return Self::Blob(raw);
                }
            }
        }
        Self::Blob(raw)
    }
}

/// Codec for AMP frames; each item is the full argument list of a frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct AmpCodec;

impl AmpCodec {
    /// Create a new codec.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for AmpCodec {
    type Item = Vec<AmpArg>;
    type Error = AppError;

    /// Decode the next complete frame from `src`.
    ///
    /// Returns `Ok(None)` while the frame is still incomplete. Only framing
    /// faults (bad version, oversized length) are errors; they leave the
    /// stream out of sync.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let Some(&header) = src.first() else {
            return Ok(None);
        };

        let version = header >> 4;
        if version != AMP_VERSION {
            return Err(AppError::Protocol(format!(
                "unsupported amp version {version}"
            )));
        }

        let argc = usize::from(header & 0x0f);
        let mut offset = HEADER_LEN;
        let mut spans = Vec::with_capacity(argc);

        for _ in 0..argc {
            let Some(prefix) = src.get(offset..offset + LEN_PREFIX) else {
                return Ok(None);
            };
            let len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
            let len = usize::try_from(len)
                .map_err(|_| AppError::Protocol("argument length overflows usize".into()))?;
            if len > MAX_ARG_BYTES {
                return Err(AppError::Protocol(format!(
                    "argument too long: {len} bytes exceeds {MAX_ARG_BYTES}"
                )));
            }

            offset += LEN_PREFIX;
            let end = offset + len;
            if src.len() < end {
                src.reserve(end - src.len());
                return Ok(None);
            }
            spans.push(offset..end);
            offset = end;
        }

        let frame = src.split_to(offset).freeze();
        Ok(Some(
            spans
                .into_iter()
                .map(|span| AmpArg::decode_payload(frame.slice(span)))
                .collect(),
        ))
    }
}

impl Encoder<Vec<AmpArg>> for AmpCodec {
    type Error = AppError;

    /// Encode `args` as one frame into `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] if there are more than [`MAX_ARGS`]
    /// arguments or an argument exceeds [`MAX_ARG_BYTES`].
    fn encode(&mut self, args: Vec<AmpArg>, dst: &mut BytesMut) -> Result<()> {
        if args.len() > MAX_ARGS {
            return Err(AppError::Protocol(format!(
                "too many arguments: {} exceeds {MAX_ARGS}",
                args.len()
            )));
        }

        let payloads = args
            .iter()
            .map(AmpArg::encode_payload)
            .collect::<Result<Vec<_>>>()?;

        if let Some(oversized) = payloads.iter().find(|p| p.len() > MAX_ARG_BYTES) {
            return Err(AppError::Protocol(format!(
                "argument too long: {} bytes exceeds {MAX_ARG_BYTES}",
                oversized.len()
            )));
        }

        let argc = u8::try_from(payloads.len())
            .map_err(|_| AppError::Protocol("argument count overflows header".into()))?;
        let body: usize = payloads.iter().map(|p| LEN_PREFIX + p.len()).sum();
        dst.reserve(HEADER_LEN + body);
        dst.put_u8((AMP_VERSION << 4) | argc);

        for payload in payloads {
            let len = u32::try_from(payload.len())
                .map_err(|_| AppError::Protocol("argument length overflows u32".into()))?;
            dst.put_u32(len);
            dst.extend_from_slice(&payload);
        }

        Ok(())
    }
}

//! Length-prefixed framing over a TCP byte stream
//!
//! Wire layout of one frame:
//!
//! ```text
//! +0   tag "length"        (6 bytes ASCII)
//! +6   payload length      (4 bytes big-endian u32)
//! +10  encrypted flag      (1 byte, 0 or 1)
//! +11  payload             (payload length bytes)
//! ```
//!
//! The stream has no message boundaries of its own, so a reader always takes
//! exactly [`HEADER_LEN`] bytes first and only then knows how much body follows.

use crate::error::FramingError;
use log::{debug, trace};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const MAGIC: &[u8; 6] = b"length";
pub const HEADER_LEN: usize = 11;

/// Largest payload a reader will allocate for
pub const MAX_PAYLOAD_LEN: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub payload_len: u32,
    pub encrypted: bool,
}

impl FrameHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[..6].copy_from_slice(MAGIC);
        bytes[6..10].copy_from_slice(&self.payload_len.to_be_bytes());
        bytes[10] = u8::from(self.encrypted);
        bytes
    }

    /// Parses a header. The tag is checked before anything else, so a wrong
    /// tag is reported as such whatever the length and flag bytes hold.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FramingError> {
        if bytes.len() != HEADER_LEN {
            return Err(FramingError::BadHeaderLength {
                expected: HEADER_LEN,
                actual: bytes.len(),
            });
        }

        let mut tag = [0u8; 6];
        tag.copy_from_slice(&bytes[..6]);
        if &tag != MAGIC {
            return Err(FramingError::BadMagic(tag));
        }

        let payload_len = u32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
        let encrypted = match bytes[10] {
            0 => false,
            1 => true,
            other => return Err(FramingError::BadFlag(other)),
        };

        Ok(Self {
            payload_len,
            encrypted,
        })
    }
}

/// One unit of wire data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub encrypted: bool,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(payload: Vec<u8>, encrypted: bool) -> Self {
        Self { encrypted, payload }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        encode(&self.payload, self.encrypted)
    }
}

/// Prepends the frame header to `payload`
pub fn encode(payload: &[u8], encrypted: bool) -> Vec<u8> {
    let header = FrameHeader {
        payload_len: payload.len() as u32,
        encrypted,
    };

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&header.to_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

/// Decodes an 11-byte header into `(payload_len, encrypted)`
pub fn decode(header: &[u8]) -> Result<(u32, bool), FramingError> {
    let header = FrameHeader::from_bytes(header)?;
    Ok((header.payload_len, header.encrypted))
}

/// Reads until `buf` is full or the peer closes. Returns the number of bytes read.
async fn read_fully<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize, FramingError>
where
    R: AsyncRead + Unpin,
{
    let mut total_read = 0;

    while total_read < buf.len() {
        let read = reader.read(&mut buf[total_read..]).await?;
        if read == 0 {
            break;
        }
        total_read += read;
        trace!("read {} bytes ({}/{})", read, total_read, buf.len());
    }

    Ok(total_read)
}

/// Reads one frame, header then body.
///
/// Returns `Ok(None)` when the peer closed the stream cleanly on a frame
/// boundary. A close anywhere else is [`FramingError::UnexpectedEof`].
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, FramingError>
where
    R: AsyncRead + Unpin,
{
    let mut header_bytes = [0u8; HEADER_LEN];
    let read = read_fully(reader, &mut header_bytes).await?;
    if read == 0 {
        return Ok(None);
    }
    if read < HEADER_LEN {
        return Err(FramingError::UnexpectedEof {
            read,
            expected: HEADER_LEN,
        });
    }

    let header = FrameHeader::from_bytes(&header_bytes)?;
    let payload_len = header.payload_len as usize;
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(FramingError::PayloadTooLarge {
            size: payload_len,
            limit: MAX_PAYLOAD_LEN,
        });
    }

    let mut payload = vec![0u8; payload_len];
    let read = read_fully(reader, &mut payload).await?;
    if read < payload_len {
        return Err(FramingError::UnexpectedEof {
            read,
            expected: payload_len,
        });
    }

    debug!(
        "received frame: {} byte payload, encrypted={}",
        payload_len, header.encrypted
    );
    Ok(Some(Frame::new(payload, header.encrypted)))
}

/// Writes raw bytes, looping over short writes
pub async fn write_bytes<W>(writer: &mut W, data: &[u8]) -> Result<(), FramingError>
where
    W: AsyncWrite + Unpin,
{
    let mut total_written = 0;

    while total_written < data.len() {
        let written = writer.write(&data[total_written..]).await?;
        if written == 0 {
            return Err(FramingError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!(
                    "writer closed after {} of {} bytes",
                    total_written,
                    data.len()
                ),
            )));
        }
        total_written += written;
        trace!("wrote {} bytes ({}/{})", written, total_written, data.len());
    }

    writer.flush().await?;
    Ok(())
}

pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), FramingError>
where
    W: AsyncWrite + Unpin,
{
    write_bytes(writer, &frame.to_bytes()).await
}

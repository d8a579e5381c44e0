//! Binary LiveSync wire protocol
//!
//! Every operation is a length-prefixed frame:
//! `[u32 BE length of opcode+payload][u8 opcode][payload]`.
//!
//! The connection opens with a one-byte version handshake: the client
//! writes [`PROTOCOL_VERSION`]; the device echoes the same byte or closes.
//! A batch is streamed as `CreateOrUpdateFile`/`DeleteFile` (or one
//! `WriteArchive`) frames followed by `DoSync`; the device applies the
//! whole batch, persists its manifest, and answers with a single `Ack`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use hotpush_core::prelude::*;

/// Protocol version sent as the handshake byte.
pub const PROTOCOL_VERSION: u8 = 1;

/// Upper bound on a single frame; anything larger is a protocol error.
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// `Ack` status byte for a fully applied batch.
pub const ACK_SUCCESS: u8 = 0;

const OP_CREATE_OR_UPDATE_FILE: u8 = 1;
const OP_DELETE_FILE: u8 = 2;
const OP_WRITE_ARCHIVE: u8 = 3;
const OP_DO_SYNC: u8 = 4;
const OP_READ_MANIFEST: u8 = 5;
const OP_MANIFEST_DATA: u8 = 6;
const OP_ACK: u8 = 7;

/// One protocol frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Create or overwrite a file under the app's sync root.
    CreateOrUpdateFile { device_path: String, content: Vec<u8> },
    /// Delete a file under the app's sync root.
    DeleteFile { device_path: String },
    /// A zipped full tree, unpacked into the sync root by the device.
    WriteArchive { archive: Vec<u8> },
    /// Commit marker: apply everything streamed since the handshake.
    DoSync,
    /// Ask the device for its current hash manifest.
    ReadManifest,
    /// Device reply to `ReadManifest`; `None` when no manifest exists.
    ManifestData { manifest: Option<Vec<u8>> },
    /// Device reply to `DoSync`; status [`ACK_SUCCESS`] or an error code.
    Ack { status: u8 },
}

impl Frame {
    pub fn opcode(&self) -> u8 {
        match self {
            Frame::CreateOrUpdateFile { .. } => OP_CREATE_OR_UPDATE_FILE,
            Frame::DeleteFile { .. } => OP_DELETE_FILE,
            Frame::WriteArchive { .. } => OP_WRITE_ARCHIVE,
            Frame::DoSync => OP_DO_SYNC,
            Frame::ReadManifest => OP_READ_MANIFEST,
            Frame::ManifestData { .. } => OP_MANIFEST_DATA,
            Frame::Ack { .. } => OP_ACK,
        }
    }

    /// Encode as a complete length-prefixed frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        match self {
            Frame::CreateOrUpdateFile {
                device_path,
                content,
            } => {
                put_bytes(&mut payload, device_path.as_bytes());
                put_bytes(&mut payload, content);
            }
            Frame::DeleteFile { device_path } => {
                put_bytes(&mut payload, device_path.as_bytes());
            }
            Frame::WriteArchive { archive } => {
                put_bytes(&mut payload, archive);
            }
            Frame::DoSync | Frame::ReadManifest => {}
            Frame::ManifestData { manifest } => {
                put_bytes(&mut payload, manifest.as_deref().unwrap_or(&[]));
            }
            Frame::Ack { status } => payload.push(*status),
        }

        let mut frame = Vec::with_capacity(5 + payload.len());
        frame.extend_from_slice(&(payload.len() as u32 + 1).to_be_bytes());
        frame.push(self.opcode());
        frame.extend_from_slice(&payload);
        frame
    }

    /// Decode a frame body (opcode + payload, without the length prefix).
    pub fn decode(opcode: u8, payload: &[u8]) -> Result<Frame> {
        let mut cursor = Cursor::new(payload);
        let frame = match opcode {
            OP_CREATE_OR_UPDATE_FILE => {
                let device_path = cursor.take_string()?;
                let content = cursor.take_bytes()?;
                Frame::CreateOrUpdateFile {
                    device_path,
                    content,
                }
            }
            OP_DELETE_FILE => Frame::DeleteFile {
                device_path: cursor.take_string()?,
            },
            OP_WRITE_ARCHIVE => Frame::WriteArchive {
                archive: cursor.take_bytes()?,
            },
            OP_DO_SYNC => Frame::DoSync,
            OP_READ_MANIFEST => Frame::ReadManifest,
            OP_MANIFEST_DATA => {
                let bytes = cursor.take_bytes()?;
                Frame::ManifestData {
                    manifest: if bytes.is_empty() { None } else { Some(bytes) },
                }
            }
            OP_ACK => Frame::Ack {
                status: cursor.take_u8()?,
            },
            other => return Err(Error::protocol(format!("unknown opcode {other}"))),
        };
        cursor.expect_empty()?;
        Ok(frame)
    }
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

/// Bounds-checked payload reader.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take_u8(&mut self) -> Result<u8> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or_else(|| Error::protocol("truncated payload"))?;
        self.pos += 1;
        Ok(byte)
    }

    fn take_u32(&mut self) -> Result<u32> {
        let end = self.pos + 4;
        let slice = self
            .data
            .get(self.pos..end)
            .ok_or_else(|| Error::protocol("truncated payload"))?;
        self.pos = end;
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(slice);
        Ok(u32::from_be_bytes(bytes))
    }

    fn take_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.take_u32()? as usize;
        let end = self.pos + len;
        let slice = self
            .data
            .get(self.pos..end)
            .ok_or_else(|| Error::protocol("truncated payload"))?;
        self.pos = end;
        Ok(slice.to_vec())
    }

    fn take_string(&mut self) -> Result<String> {
        let bytes = self.take_bytes()?;
        String::from_utf8(bytes).map_err(|_| Error::protocol("path is not valid UTF-8"))
    }

    fn expect_empty(&self) -> Result<()> {
        if self.pos == self.data.len() {
            Ok(())
        } else {
            Err(Error::protocol("trailing bytes in payload"))
        }
    }
}

/// Write one frame to the stream.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&frame.encode()).await?;
    Ok(())
}

/// Read one frame from the stream.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);

    if len == 0 {
        return Err(Error::protocol("zero-length frame"));
    }
    if len > MAX_FRAME_LEN {
        return Err(Error::protocol(format!("frame of {len} bytes exceeds limit")));
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    Frame::decode(body[0], &body[1..])
}

//! Recording Formats
//!
//! Three on-disk representations of a session's command stream:
//!
//! - binary: a versioned header followed by length-prefixed postcard
//!   frames, one per sequenced command. This is the format the index and
//!   player operate on.
//! - text: one JSON object per line, for inspection and diffing.
//! - debug dump: direction-tagged frames that also keep commands the
//!   server refused, for protocol debugging.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use easel_protocol::SequencedCommand;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// File magic for binary recordings
pub const RECORDING_MAGIC: &[u8; 8] = b"EASELREC";
/// File magic for debug dumps
pub const DUMP_MAGIC: &[u8; 8] = b"EASELDMP";
/// Current recording container version
pub const RECORDING_VERSION: u16 = 1;

/// Size of the magic + version header
pub const HEADER_LEN: u64 = 10;

/// Upper bound on a single frame; anything larger is treated as
/// corruption rather than allocated
const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

fn write_header<W: Write>(writer: &mut W, magic: &[u8; 8]) -> Result<()> {
    writer.write_all(magic)?;
    writer.write_all(&RECORDING_VERSION.to_le_bytes())?;
    Ok(())
}

fn read_header<R: Read>(reader: &mut R, magic: &[u8; 8]) -> Result<()> {
    let mut header = [0u8; HEADER_LEN as usize];
    reader
        .read_exact(&mut header)
        .map_err(|_| Error::CorruptRecording("truncated header".into()))?;
    if &header[..8] != magic {
        return Err(Error::CorruptRecording("bad magic".into()));
    }
    let version = u16::from_le_bytes([header[8], header[9]]);
    if version != RECORDING_VERSION {
        return Err(Error::CorruptRecording(format!(
            "unsupported version {version}"
        )));
    }
    Ok(())
}

fn write_frame<W: Write>(writer: &mut W, body: &[u8]) -> Result<u64> {
    writer.write_all(&(body.len() as u32).to_le_bytes())?;
    writer.write_all(body)?;
    Ok(4 + body.len() as u64)
}

/// Read one length-prefixed frame body; `None` on clean end of stream
fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_bytes = [0u8; 4];
    let mut filled = 0;
    while filled < 4 {
        let n = reader.read(&mut len_bytes[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(Error::CorruptRecording("truncated frame header".into()));
        }
        filled += n;
    }
    let len = u32::from_le_bytes(len_bytes);
    if len > MAX_FRAME_BYTES {
        return Err(Error::CorruptRecording(format!(
            "frame length {len} exceeds limit"
        )));
    }
    let mut body = vec![0u8; len as usize];
    reader
        .read_exact(&mut body)
        .map_err(|_| Error::CorruptRecording("truncated frame body".into()))?;
    Ok(Some(body))
}

/// Writer for the binary recording format
pub struct BinaryRecorder<W: Write> {
    writer: W,
    offset: u64,
}

impl BinaryRecorder<BufWriter<File>> {
    /// Create a recording file, truncating any existing one
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> BinaryRecorder<W> {
    /// Start a recording on an arbitrary writer
    pub fn new(mut writer: W) -> Result<Self> {
        write_header(&mut writer, RECORDING_MAGIC)?;
        Ok(Self {
            writer,
            offset: HEADER_LEN,
        })
    }

    /// Append a command; returns the byte offset its frame starts at
    pub fn record(&mut self, command: &SequencedCommand) -> Result<u64> {
        let body =
            postcard::to_allocvec(command).map_err(|e| Error::Serialization(e.to_string()))?;
        let frame_offset = self.offset;
        self.offset += write_frame(&mut self.writer, &body)?;
        Ok(frame_offset)
    }

    /// Current end-of-recording offset
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Flush buffered frames to the underlying writer
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Reader for the binary recording format
pub struct BinaryReader<R: Read> {
    reader: R,
    offset: u64,
}

impl BinaryReader<BufReader<File>> {
    /// Open a recording file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read> BinaryReader<R> {
    /// Start reading from an arbitrary reader, validating the header
    pub fn new(mut reader: R) -> Result<Self> {
        read_header(&mut reader, RECORDING_MAGIC)?;
        Ok(Self {
            reader,
            offset: HEADER_LEN,
        })
    }

    /// Read the next command together with the offset its frame started
    /// at; `None` at the end of the recording
    pub fn next_frame(&mut self) -> Result<Option<(u64, SequencedCommand)>> {
        let frame_offset = self.offset;
        let Some(body) = read_frame(&mut self.reader)? else {
            return Ok(None);
        };
        self.offset += 4 + body.len() as u64;
        let command =
            postcard::from_bytes(&body).map_err(|e| Error::CorruptRecording(e.to_string()))?;
        Ok(Some((frame_offset, command)))
    }

    /// Offset of the next frame to be read
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl<R: Read + Seek> BinaryReader<R> {
    /// Position the reader at a frame offset previously returned by
    /// [`BinaryRecorder::record`] or [`BinaryReader::next_frame`]
    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        if offset < HEADER_LEN {
            return Err(Error::CorruptRecording(format!(
                "offset {offset} points into the header"
            )));
        }
        self.reader.seek(SeekFrom::Start(offset))?;
        self.offset = offset;
        Ok(())
    }
}

/// Writer for the line-oriented text format
pub struct TextRecorder<W: Write> {
    writer: W,
}

impl<W: Write> TextRecorder<W> {
    /// Start a text recording
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Append one command as a JSON line
    pub fn record(&mut self, command: &SequencedCommand) -> Result<()> {
        let json =
            serde_json::to_string(command).map_err(|e| Error::Serialization(e.to_string()))?;
        self.writer.write_all(json.as_bytes())?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    /// Flush buffered lines
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Convert a binary recording into the text format; returns the number
/// of commands written
pub fn transcribe<R: Read, W: Write>(reader: &mut BinaryReader<R>, writer: W) -> Result<u64> {
    let mut text = TextRecorder::new(writer);
    let mut count = 0;
    while let Some((_, command)) = reader.next_frame()? {
        text.record(&command)?;
        count += 1;
    }
    text.flush()?;
    Ok(count)
}

/// Direction of a dumped frame relative to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameDirection {
    /// Received from a client
    Inbound,
    /// Broadcast to clients
    Outbound,
}

/// One frame of a debug dump
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpFrame {
    /// Direction relative to the server
    pub direction: FrameDirection,
    /// Whether the command was sequenced (refused commands are dumped
    /// too, which a normal recording never contains)
    pub accepted: bool,
    /// The command
    pub command: SequencedCommand,
}

/// Writer for the debug dump format
pub struct DumpRecorder<W: Write> {
    writer: W,
}

impl DumpRecorder<BufWriter<File>> {
    /// Create a dump file, truncating any existing one
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> DumpRecorder<W> {
    /// Start a dump on an arbitrary writer
    pub fn new(mut writer: W) -> Result<Self> {
        write_header(&mut writer, DUMP_MAGIC)?;
        Ok(Self { writer })
    }

    /// Append a frame
    pub fn record(&mut self, frame: &DumpFrame) -> Result<()> {
        let body = postcard::to_allocvec(frame).map_err(|e| Error::Serialization(e.to_string()))?;
        write_frame(&mut self.writer, &body)?;
        Ok(())
    }

    /// Flush buffered frames
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Reader for the debug dump format
pub struct DumpReader<R: Read> {
    reader: R,
}

impl DumpReader<BufReader<File>> {
    /// Open a dump file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read> DumpReader<R> {
    /// Start reading from an arbitrary reader, validating the header
    pub fn new(mut reader: R) -> Result<Self> {
        read_header(&mut reader, DUMP_MAGIC)?;
        Ok(Self { reader })
    }

    /// Read the next frame; `None` at the end of the dump
    pub fn next_frame(&mut self) -> Result<Option<DumpFrame>> {
        let Some(body) = read_frame(&mut self.reader)? else {
            return Ok(None);
        };
        let frame =
            postcard::from_bytes(&body).map_err(|e| Error::CorruptRecording(e.to_string()))?;
        Ok(Some(frame))
    }
}

/// SHA-256 of a file's contents, used to tie an index sidecar to its
/// recording
pub fn sha256_file(path: impl AsRef<Path>) -> Result<[u8; 32]> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().into())
}

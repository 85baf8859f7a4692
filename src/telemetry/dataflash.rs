//! ArduPilot DataFlash decoder.
//!
//! Every frame starts with `0xA3 0x95` and a one-byte type id. The layout of
//! each type is announced in-band by `FMT` frames (type 128), so the decoder
//! needs no external schema. Frames of unknown type and bytes that do not
//! start a frame are skipped by advancing one byte and looking for the next
//! header.

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};

use super::frame_reader::FrameReader;
use super::record::{Record, Scalar};
use super::DecodeStats;

pub const HEAD1: u8 = 0xA3;
pub const HEAD2: u8 = 0x95;
pub const FMT_TYPE: u8 = 128;

const HEADER_LEN: usize = 3;
const FMT_LENGTH: usize = 89;

/// One field encoding from a `FMT` format string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    /// int16 scaled by 0.01
    Centi16,
    /// uint16 scaled by 0.01
    UCenti16,
    /// int32 scaled by 0.01
    Centi32,
    /// uint32 scaled by 0.01
    UCenti32,
    /// int32 latitude/longitude in 1e-7 degrees
    LatLon,
    Char4,
    Char16,
    Char64,
    Int16Array,
}

impl FieldKind {
    fn from_char(c: char) -> Option<Self> {
        let kind = match c {
            'b' => Self::I8,
            'B' | 'M' => Self::U8,
            'h' => Self::I16,
            'H' => Self::U16,
            'i' => Self::I32,
            'I' => Self::U32,
            'q' => Self::I64,
            'Q' => Self::U64,
            'f' => Self::F32,
            'd' => Self::F64,
            'c' => Self::Centi16,
            'C' => Self::UCenti16,
            'e' => Self::Centi32,
            'E' => Self::UCenti32,
            'L' => Self::LatLon,
            'n' => Self::Char4,
            'N' => Self::Char16,
            'Z' => Self::Char64,
            'a' => Self::Int16Array,
            _ => return None,
        };
        Some(kind)
    }

    fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 | Self::Centi16 | Self::UCenti16 => 2,
            Self::I32
            | Self::U32
            | Self::F32
            | Self::Centi32
            | Self::UCenti32
            | Self::LatLon
            | Self::Char4 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
            Self::Char16 => 16,
            Self::Char64 | Self::Int16Array => 64,
        }
    }

    /// `bytes` is exactly `self.size()` long.
    fn decode(self, bytes: &[u8]) -> Scalar {
        match self {
            Self::I8 => Scalar::Int(bytes[0] as i8 as i64),
            Self::U8 => Scalar::Int(bytes[0] as i64),
            Self::I16 => Scalar::Int(LittleEndian::read_i16(bytes) as i64),
            Self::U16 => Scalar::Int(LittleEndian::read_u16(bytes) as i64),
            Self::I32 => Scalar::Int(LittleEndian::read_i32(bytes) as i64),
            Self::U32 => Scalar::Int(LittleEndian::read_u32(bytes) as i64),
            Self::I64 => Scalar::Int(LittleEndian::read_i64(bytes)),
            Self::U64 => Scalar::from_u64(LittleEndian::read_u64(bytes)),
            Self::F32 => Scalar::Float(LittleEndian::read_f32(bytes) as f64),
            Self::F64 => Scalar::Float(LittleEndian::read_f64(bytes)),
            Self::Centi16 => Scalar::Float(LittleEndian::read_i16(bytes) as f64 / 100.0),
            Self::UCenti16 => Scalar::Float(LittleEndian::read_u16(bytes) as f64 / 100.0),
            Self::Centi32 => Scalar::Float(LittleEndian::read_i32(bytes) as f64 / 100.0),
            Self::UCenti32 => Scalar::Float(LittleEndian::read_u32(bytes) as f64 / 100.0),
            Self::LatLon => Scalar::Float(LittleEndian::read_i32(bytes) as f64 / 1e7),
            Self::Char4 | Self::Char16 | Self::Char64 => Scalar::Text(c_string(bytes)),
            Self::Int16Array => {
                let values: Vec<String> = bytes
                    .chunks_exact(2)
                    .map(|c| LittleEndian::read_i16(c).to_string())
                    .collect();
                Scalar::Text(format!("[{}]", values.join(", ")))
            }
        }
    }
}

/// NUL-terminated, lossily decoded text.
pub(crate) fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim_end().to_string()
}

/// Layout of one message type as announced by a `FMT` frame.
#[derive(Debug)]
struct MessageFormat {
    name: String,
    length: usize,
    fields: Vec<(String, FieldKind)>,
}

impl MessageFormat {
    fn fmt_format() -> Self {
        Self::parse("FMT", FMT_LENGTH, "BBnNZ", "Type,Length,Name,Format,Columns")
            .unwrap_or(Self {
                name: "FMT".to_string(),
                length: FMT_LENGTH,
                fields: Vec::new(),
            })
    }

    /// Validate a definition. Returns `None` for unknown format characters,
    /// a label count mismatch, or a declared length that disagrees with the
    /// computed frame size.
    fn parse(name: &str, length: usize, format: &str, columns: &str) -> Option<Self> {
        let kinds: Vec<FieldKind> = format
            .chars()
            .map(FieldKind::from_char)
            .collect::<Option<_>>()?;
        let labels: Vec<&str> = if columns.is_empty() {
            Vec::new()
        } else {
            columns.split(',').map(str::trim).collect()
        };
        if labels.len() != kinds.len() || name.is_empty() {
            return None;
        }
        let size: usize = kinds.iter().map(|k| k.size()).sum();
        if size + HEADER_LEN != length {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            length,
            fields: labels
                .into_iter()
                .map(String::from)
                .zip(kinds)
                .collect(),
        })
    }

    fn decode(&self, payload: &[u8]) -> Record {
        let mut record = Record::with_capacity(self.name.clone(), self.fields.len());
        let mut offset = 0;
        for (label, kind) in &self.fields {
            let size = kind.size();
            record.push(label.clone(), kind.decode(&payload[offset..offset + size]));
            offset += size;
        }
        record
    }
}

/// Lazy record iterator over a DataFlash stream.
pub struct DataFlashDecoder<R> {
    reader: FrameReader<R>,
    formats: HashMap<u8, Arc<MessageFormat>>,
    stats: DecodeStats,
    resyncing: bool,
    finished: bool,
}

impl<R: Read> DataFlashDecoder<R> {
    pub fn new(reader: FrameReader<R>) -> Self {
        let mut formats = HashMap::new();
        formats.insert(FMT_TYPE, Arc::new(MessageFormat::fmt_format()));
        Self {
            reader,
            formats,
            stats: DecodeStats::default(),
            resyncing: false,
            finished: false,
        }
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    fn skip_byte(&mut self) {
        if !self.resyncing {
            self.stats.skipped_frames += 1;
            self.resyncing = true;
        }
        self.reader.consume(1);
    }

    /// Register the format announced by a decoded FMT record.
    fn register_format(&mut self, record: &Record) {
        let (Some(Scalar::Int(type_id)), Some(Scalar::Int(length))) =
            (record.get("Type"), record.get("Length"))
        else {
            return;
        };
        let text = |key: &str| match record.get(key) {
            Some(Scalar::Text(s)) => s.clone(),
            _ => String::new(),
        };
        let Ok(type_id) = u8::try_from(*type_id) else {
            return;
        };
        if type_id == FMT_TYPE {
            return;
        }
        let name = text("Name");
        match MessageFormat::parse(&name, *length as usize, &text("Format"), &text("Columns")) {
            Some(format) => {
                self.formats.insert(type_id, Arc::new(format));
            }
            None => {
                tracing::debug!(type_id, name = %name, "Ignoring invalid FMT definition");
                self.stats.skipped_frames += 1;
            }
        }
    }
}

impl<R: Read> Iterator for DataFlashDecoder<R> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        while !self.finished {
            match self.reader.fill(HEADER_LEN) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    tracing::warn!(error = %e, offset = self.reader.offset(), "Read error, ending DataFlash stream");
                    break;
                }
            }

            let head = self.reader.peek(HEADER_LEN);
            if head[0] != HEAD1 || head[1] != HEAD2 {
                self.skip_byte();
                continue;
            }
            let type_id = head[2];
            let Some(format) = self.formats.get(&type_id).cloned() else {
                self.skip_byte();
                continue;
            };

            match self.reader.fill(format.length) {
                Ok(true) => {}
                // Truncated tail frame
                Ok(false) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Read error, ending DataFlash stream");
                    break;
                }
            }

            let frame = self.reader.peek(format.length);
            let record = format.decode(&frame[HEADER_LEN..]);
            self.reader.consume(format.length);
            self.resyncing = false;

            if type_id == FMT_TYPE {
                self.register_format(&record);
            }
            self.stats.records += 1;
            return Some(record);
        }

        if !self.finished {
            self.finished = true;
            if self.reader.available() > 0 {
                self.stats.skipped_frames += 1;
            }
            tracing::debug!(
                records = self.stats.records,
                skipped = self.stats.skipped_frames,
                "DataFlash stream finished"
            );
        }
        None
    }
}

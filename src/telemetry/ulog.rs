//! PX4 ULog decoder.
//!
//! A ULog file is a 16-byte header followed by messages of the form
//! `size:u16, type:u8, payload[size]`. Data layouts are declared by `F`
//! messages and bound to numeric ids by `A` (subscription) messages; `D`
//! messages then carry payloads for a subscribed id.

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};

use super::dataflash::c_string;
use super::frame_reader::FrameReader;
use super::record::{Record, Scalar};
use super::{DecodeError, DecodeStats};

pub const MAGIC: [u8; 7] = [b'U', b'L', b'o', b'g', 0x01, 0x12, 0x35];
pub const HEADER_LEN: usize = 16;

const SYNC_MAGIC: [u8; 8] = [0x2F, 0x73, 0x13, 0x20, 0x25, 0x0C, 0xBB, 0x12];
const MSG_HEADER_LEN: usize = 3;
const MAX_NESTING: usize = 8;
/// A message payload is at most `u16::MAX` bytes, so no array can be longer.
const MAX_ARRAY_LEN: usize = u16::MAX as usize;

pub const LOGGING_TAG: &str = "LOGGING";
pub const PARAMETER_TAG: &str = "PARAMETER";
pub const INFO_TAG: &str = "INFO";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BasicType {
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
    Bool,
    Char,
}

impl BasicType {
    fn parse(name: &str) -> Option<Self> {
        let ty = match name {
            "int8_t" => Self::I8,
            "uint8_t" => Self::U8,
            "int16_t" => Self::I16,
            "uint16_t" => Self::U16,
            "int32_t" => Self::I32,
            "uint32_t" => Self::U32,
            "int64_t" => Self::I64,
            "uint64_t" => Self::U64,
            "float" => Self::F32,
            "double" => Self::F64,
            "bool" => Self::Bool,
            "char" => Self::Char,
            _ => return None,
        };
        Some(ty)
    }

    fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 | Self::Bool | Self::Char => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    fn decode(self, bytes: &[u8]) -> Scalar {
        match self {
            Self::I8 => Scalar::Int(bytes[0] as i8 as i64),
            Self::U8 => Scalar::Int(bytes[0] as i64),
            Self::Bool => Scalar::Bool(bytes[0] != 0),
            Self::Char => Scalar::Text(c_string(&bytes[..1])),
            Self::I16 => Scalar::Int(LittleEndian::read_i16(bytes) as i64),
            Self::U16 => Scalar::Int(LittleEndian::read_u16(bytes) as i64),
            Self::I32 => Scalar::Int(LittleEndian::read_i32(bytes) as i64),
            Self::U32 => Scalar::Int(LittleEndian::read_u32(bytes) as i64),
            Self::I64 => Scalar::Int(LittleEndian::read_i64(bytes)),
            Self::U64 => Scalar::from_u64(LittleEndian::read_u64(bytes)),
            Self::F32 => Scalar::Float(LittleEndian::read_f32(bytes) as f64),
            Self::F64 => Scalar::Float(LittleEndian::read_f64(bytes)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FieldType {
    Basic(BasicType),
    Nested(String),
}

#[derive(Debug, Clone)]
struct FieldDef {
    name: String,
    ty: FieldType,
    array_len: Option<usize>,
}

impl FieldDef {
    /// Parse `type[n] name` or `type name`.
    fn parse(decl: &str) -> Option<Self> {
        let (ty, name) = decl.trim().split_once(' ')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let (ty, array_len) = match ty.split_once('[') {
            Some((base, rest)) => {
                let len: usize = rest.strip_suffix(']')?.parse().ok()?;
                if len > MAX_ARRAY_LEN {
                    return None;
                }
                (base, Some(len))
            }
            None => (ty, None),
        };
        let ty = match BasicType::parse(ty) {
            Some(basic) => FieldType::Basic(basic),
            None => FieldType::Nested(ty.to_string()),
        };
        Some(Self {
            name: name.to_string(),
            ty,
            array_len,
        })
    }

    fn is_padding(&self) -> bool {
        self.name.starts_with("_padding")
    }
}

/// Parse an `F` message body: `name:type field;type field;...`.
fn parse_format(body: &str) -> Option<(String, Vec<FieldDef>)> {
    let (name, fields) = body.split_once(':')?;
    let fields = fields
        .split(';')
        .filter(|s| !s.trim().is_empty())
        .map(FieldDef::parse)
        .collect::<Option<Vec<_>>>()?;
    Some((name.to_string(), fields))
}

#[derive(Debug)]
struct Subscription {
    tag: String,
    format: String,
}

/// Lazy record iterator over a ULog stream.
pub struct UlogDecoder<R> {
    reader: FrameReader<R>,
    formats: HashMap<String, Arc<Vec<FieldDef>>>,
    subscriptions: HashMap<u16, Subscription>,
    stats: DecodeStats,
    finished: bool,
}

impl<R: Read> UlogDecoder<R> {
    /// Consume and validate the file header.
    pub fn new(mut reader: FrameReader<R>) -> Result<Self, DecodeError> {
        if !reader.fill(HEADER_LEN)? {
            return Err(DecodeError::UnrecognizedHeader(
                "truncated ULog header".to_string(),
            ));
        }
        let header = reader.peek(HEADER_LEN);
        if header[..MAGIC.len()] != MAGIC {
            return Err(DecodeError::UnrecognizedHeader(
                "missing ULog magic".to_string(),
            ));
        }
        let version = header[7];
        let start_us = LittleEndian::read_u64(&header[8..16]);
        tracing::debug!(version, start_us, "ULog header");
        reader.consume(HEADER_LEN);

        Ok(Self {
            reader,
            formats: HashMap::new(),
            subscriptions: HashMap::new(),
            stats: DecodeStats::default(),
            finished: false,
        })
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Skip forward to the byte after the next sync magic. Returns `false`
    /// when the stream ends first.
    fn resync(&mut self) -> bool {
        self.stats.skipped_frames += 1;
        loop {
            match self.reader.fill(SYNC_MAGIC.len()) {
                Ok(true) => {}
                _ => return false,
            }
            if self.reader.peek(SYNC_MAGIC.len()) == SYNC_MAGIC {
                self.reader.consume(SYNC_MAGIC.len());
                return true;
            }
            self.reader.consume(1);
        }
    }

    /// Handle one message. Returns a record for message kinds that produce one.
    fn handle(&mut self, msg_type: u8, payload: &[u8]) -> Option<Record> {
        match msg_type {
            b'F' => {
                let body = String::from_utf8_lossy(payload);
                match parse_format(&body) {
                    Some((name, fields)) => {
                        self.formats.insert(name, Arc::new(fields));
                    }
                    None => self.stats.skipped_frames += 1,
                }
                None
            }
            b'A' => {
                if payload.len() < 4 {
                    self.stats.skipped_frames += 1;
                    return None;
                }
                let multi_id = payload[0];
                let msg_id = LittleEndian::read_u16(&payload[1..3]);
                let format = c_string(&payload[3..]);
                let tag = if multi_id > 0 {
                    format!("{}_{}", format, multi_id)
                } else {
                    format.clone()
                };
                self.subscriptions.insert(msg_id, Subscription { tag, format });
                None
            }
            b'R' => {
                if payload.len() >= 2 {
                    self.subscriptions
                        .remove(&LittleEndian::read_u16(&payload[..2]));
                }
                None
            }
            b'D' => self.decode_data(payload),
            b'L' => {
                if payload.len() < 9 {
                    self.stats.skipped_frames += 1;
                    return None;
                }
                let mut record = Record::new(LOGGING_TAG);
                record.push("log_level", payload[0] as i64);
                record.push("timestamp", Scalar::from_u64(LittleEndian::read_u64(&payload[1..9])));
                record.push("message", c_string(&payload[9..]));
                Some(record)
            }
            b'C' => {
                if payload.len() < 11 {
                    self.stats.skipped_frames += 1;
                    return None;
                }
                let mut record = Record::new(LOGGING_TAG);
                record.push("log_level", payload[0] as i64);
                record.push("tag", LittleEndian::read_u16(&payload[1..3]) as i64);
                record.push("timestamp", Scalar::from_u64(LittleEndian::read_u64(&payload[3..11])));
                record.push("message", c_string(&payload[11..]));
                Some(record)
            }
            b'P' => self.decode_key_value(PARAMETER_TAG, payload),
            b'I' => self.decode_key_value(INFO_TAG, payload),
            // Flag bits, multi-info, sync, dropout, default params
            _ => None,
        }
    }

    fn decode_data(&mut self, payload: &[u8]) -> Option<Record> {
        if payload.len() < 2 {
            self.stats.skipped_frames += 1;
            return None;
        }
        let msg_id = LittleEndian::read_u16(&payload[..2]);
        let Some(sub) = self.subscriptions.get(&msg_id) else {
            self.stats.skipped_frames += 1;
            return None;
        };
        let Some(fields) = self.formats.get(&sub.format).cloned() else {
            self.stats.skipped_frames += 1;
            return None;
        };

        let mut record = Record::with_capacity(sub.tag.clone(), fields.len());
        let mut offset = 2;
        if self
            .flatten_fields(&fields, payload, &mut offset, "", &mut record, 0)
            .is_none()
        {
            self.stats.skipped_frames += 1;
            return None;
        }
        Some(record)
    }

    /// Decode `fields` from `data` starting at `offset` into `record`,
    /// prefixing names with `prefix`. `None` means the payload was too short
    /// a nested format is unknown, or an array element consumed nothing.
    fn flatten_fields(
        &self,
        fields: &[FieldDef],
        data: &[u8],
        offset: &mut usize,
        prefix: &str,
        record: &mut Record,
        depth: usize,
    ) -> Option<()> {
        if depth > MAX_NESTING {
            return None;
        }
        for field in fields {
            let name = format!("{}{}", prefix, field.name);
            match &field.ty {
                FieldType::Basic(basic) => {
                    let count = field.array_len.unwrap_or(1);
                    let size = basic.size().checked_mul(count)?;
                    let end = offset.checked_add(size)?;
                    if field.is_padding() {
                        // Trailing padding may be omitted from the payload.
                        *offset = end.min(data.len());
                        continue;
                    }
                    let bytes = data.get(*offset..end)?;
                    *offset = end;
                    match (basic, field.array_len) {
                        (BasicType::Char, Some(_)) => record.push(name, c_string(bytes)),
                        (_, Some(_)) => {
                            for (i, chunk) in bytes.chunks_exact(basic.size()).enumerate() {
                                record.push(format!("{}_{}", name, i), basic.decode(chunk));
                            }
                        }
                        (_, None) => record.push(name, basic.decode(bytes)),
                    }
                }
                FieldType::Nested(type_name) => {
                    let nested = self.formats.get(type_name)?;
                    match field.array_len {
                        Some(len) => {
                            for i in 0..len {
                                let child = format!("{}_{}_", name, i);
                                let start = *offset;
                                self.flatten_fields(
                                    nested,
                                    data,
                                    offset,
                                    &child,
                                    record,
                                    depth + 1,
                                )?;
                                if *offset == start {
                                    return None;
                                }
                            }
                        }
                        None => {
                            let child = format!("{}_", name);
                            self.flatten_fields(nested, data, offset, &child, record, depth + 1)?;
                        }
                    }
                }
            }
        }
        Some(())
    }

    /// `P` and `I` messages: `key_len:u8, key:"type name", value`.
    fn decode_key_value(&mut self, tag: &str, payload: &[u8]) -> Option<Record> {
        let key_len = *payload.first()? as usize;
        let decl = payload
            .get(1..1 + key_len)
            .map(|k| String::from_utf8_lossy(k).into_owned());
        let Some(def) = decl.as_deref().and_then(FieldDef::parse) else {
            self.stats.skipped_frames += 1;
            return None;
        };
        let value_bytes = &payload[1 + key_len..];

        let value = match (&def.ty, def.array_len) {
            (FieldType::Basic(BasicType::Char), Some(_)) => Scalar::Text(c_string(value_bytes)),
            (FieldType::Basic(basic), None) if value_bytes.len() >= basic.size() => {
                basic.decode(&value_bytes[..basic.size()])
            }
            _ => {
                self.stats.skipped_frames += 1;
                return None;
            }
        };

        let mut record = Record::new(tag);
        record.push("name", def.name);
        record.push("value", value);
        Some(record)
    }
}

fn is_known_message(msg_type: u8) -> bool {
    matches!(
        msg_type,
        b'B' | b'F' | b'I' | b'M' | b'P' | b'Q' | b'A' | b'R' | b'D' | b'L' | b'C' | b'S' | b'O'
    )
}

impl<R: Read> Iterator for UlogDecoder<R> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        while !self.finished {
            match self.reader.fill(MSG_HEADER_LEN) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Read error, ending ULog stream");
                    break;
                }
            }
            let header = self.reader.peek(MSG_HEADER_LEN);
            let size = LittleEndian::read_u16(&header[..2]) as usize;
            let msg_type = header[2];

            if !is_known_message(msg_type) {
                if self.resync() {
                    continue;
                }
                break;
            }

            match self.reader.fill(MSG_HEADER_LEN + size) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Read error, ending ULog stream");
                    break;
                }
            }
            let payload = self.reader.peek(MSG_HEADER_LEN + size)[MSG_HEADER_LEN..].to_vec();
            self.reader.consume(MSG_HEADER_LEN + size);

            if let Some(record) = self.handle(msg_type, &payload) {
                self.stats.records += 1;
                return Some(record);
            }
        }

        if !self.finished {
            self.finished = true;
            tracing::debug!(
                records = self.stats.records,
                skipped = self.stats.skipped_frames,
                formats = self.formats.len(),
                "ULog stream finished"
            );
        }
        None
    }
}

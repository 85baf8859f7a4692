//! Builders for synthetic log streams used in tests.

use super::dataflash::{FMT_TYPE, HEAD1, HEAD2};
use super::ulog::MAGIC;

/// A value to encode according to the declared format character.
#[derive(Debug, Clone, Copy)]
pub enum Field {
    I(i64),
    F(f64),
    S(&'static str),
}

impl Field {
    fn as_i64(self) -> i64 {
        match self {
            Field::I(v) => v,
            Field::F(v) => v as i64,
            Field::S(_) => 0,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Field::I(v) => v as f64,
            Field::F(v) => v,
            Field::S(_) => 0.0,
        }
    }
}

fn padded(text: &str, len: usize) -> Vec<u8> {
    let mut out = text.as_bytes().to_vec();
    out.resize(len, 0);
    out
}

#[derive(Default)]
pub struct DataFlashWriter {
    buf: Vec<u8>,
    formats: std::collections::HashMap<u8, String>,
}

impl DataFlashWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn computed_length(format: &str) -> u8 {
        let size: usize = format
            .chars()
            .map(|c| match c {
                'b' | 'B' | 'M' => 1,
                'h' | 'H' | 'c' | 'C' => 2,
                'i' | 'I' | 'f' | 'e' | 'E' | 'L' | 'n' => 4,
                'q' | 'Q' | 'd' => 8,
                'N' => 16,
                'Z' | 'a' => 64,
                _ => 0,
            })
            .sum();
        (size + 3) as u8
    }

    /// Emit a FMT frame describing `type_id`.
    pub fn define(&mut self, type_id: u8, name: &str, format: &str, columns: &str) {
        let length = Self::computed_length(format);
        self.define_with_length(type_id, name, format, columns, length);
    }

    pub fn define_with_length(
        &mut self,
        type_id: u8,
        name: &str,
        format: &str,
        columns: &str,
        length: u8,
    ) {
        self.buf.extend_from_slice(&[HEAD1, HEAD2, FMT_TYPE, type_id, length]);
        self.buf.extend(padded(name, 4));
        self.buf.extend(padded(format, 16));
        self.buf.extend(padded(columns, 64));
        self.formats.insert(type_id, format.to_string());
    }

    /// Emit a data frame; `values` follow the declared format.
    pub fn write(&mut self, type_id: u8, values: &[Field]) {
        let format = self.formats.get(&type_id).cloned().unwrap_or_default();
        self.buf.extend_from_slice(&[HEAD1, HEAD2, type_id]);
        for (c, value) in format.chars().zip(values.iter().copied()) {
            match c {
                'b' | 'B' | 'M' => self.buf.push(value.as_i64() as u8),
                'h' | 'H' | 'c' | 'C' => {
                    self.buf.extend((value.as_i64() as i16).to_le_bytes())
                }
                'i' | 'I' | 'e' | 'E' | 'L' => {
                    self.buf.extend((value.as_i64() as i32).to_le_bytes())
                }
                'q' | 'Q' => self.buf.extend(value.as_i64().to_le_bytes()),
                'f' => self.buf.extend((value.as_f64() as f32).to_le_bytes()),
                'd' => self.buf.extend(value.as_f64().to_le_bytes()),
                'n' | 'N' | 'Z' => {
                    let len = match c {
                        'n' => 4,
                        'N' => 16,
                        _ => 64,
                    };
                    let text = match value {
                        Field::S(s) => s,
                        _ => "",
                    };
                    self.buf.extend(padded(text, len));
                }
                'a' => self.buf.extend([0u8; 64]),
                _ => {}
            }
        }
    }

    pub fn raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

pub struct UlogWriter {
    buf: Vec<u8>,
}

impl UlogWriter {
    pub fn new() -> Self {
        let mut buf = MAGIC.to_vec();
        buf.push(1);
        buf.extend(0u64.to_le_bytes());
        Self { buf }
    }

    fn message(&mut self, msg_type: u8, payload: &[u8]) {
        self.buf.extend((payload.len() as u16).to_le_bytes());
        self.buf.push(msg_type);
        self.buf.extend_from_slice(payload);
    }

    pub fn format(&mut self, definition: &str) {
        self.message(b'F', definition.as_bytes());
    }

    pub fn subscribe(&mut self, multi_id: u8, msg_id: u16, name: &str) {
        let mut payload = vec![multi_id];
        payload.extend(msg_id.to_le_bytes());
        payload.extend_from_slice(name.as_bytes());
        self.message(b'A', &payload);
    }

    pub fn data(&mut self, msg_id: u16, data: &[u8]) {
        let mut payload = msg_id.to_le_bytes().to_vec();
        payload.extend_from_slice(data);
        self.message(b'D', &payload);
    }

    pub fn logging(&mut self, level: u8, timestamp: u64, text: &str) {
        let mut payload = vec![level];
        payload.extend(timestamp.to_le_bytes());
        payload.extend_from_slice(text.as_bytes());
        self.message(b'L', &payload);
    }

    pub fn param_f32(&mut self, name: &str, value: f32) {
        let key = format!("float {}", name);
        let mut payload = vec![key.len() as u8];
        payload.extend_from_slice(key.as_bytes());
        payload.extend(value.to_le_bytes());
        self.message(b'P', &payload);
    }

    pub fn info_str(&mut self, name: &str, value: &str) {
        let key = format!("char[{}] {}", value.len(), name);
        let mut payload = vec![key.len() as u8];
        payload.extend_from_slice(key.as_bytes());
        payload.extend_from_slice(value.as_bytes());
        self.message(b'I', &payload);
    }

    pub fn raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

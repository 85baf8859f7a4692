//! Telemetry log decoding.
//!
//! [`decode`] sniffs the stream header, picks the matching format decoder
//! and hands back a lazy, single-pass iterator of [`Record`]s. Only a stream
//! that cannot be opened at all is an error; corrupt frames inside a valid
//! stream are skipped and counted in [`DecodeStats`].

mod dataflash;
mod frame_reader;
mod record;
mod ulog;

#[cfg(test)]
pub(crate) mod test_support;

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

pub use dataflash::DataFlashDecoder;
pub use frame_reader::FrameReader;
pub use record::{Record, Scalar};
pub use ulog::{UlogDecoder, INFO_TAG, LOGGING_TAG, PARAMETER_TAG};

/// Bytes needed to recognise any supported format.
const SNIFF_LEN: usize = ulog::HEADER_LEN;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("log stream is empty")]
    EmptyStream,

    #[error("unrecognized log header: {0}")]
    UnrecognizedHeader(String),

    #[error("failed to read log: {0}")]
    Io(#[from] std::io::Error),
}

/// Counters collected while decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecodeStats {
    pub records: u64,
    pub skipped_frames: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    DataFlash,
    Ulog,
}

impl LogFormat {
    pub fn detect(header: &[u8]) -> Option<Self> {
        if header.starts_with(&ulog::MAGIC) {
            Some(Self::Ulog)
        } else if header.starts_with(&[dataflash::HEAD1, dataflash::HEAD2]) {
            Some(Self::DataFlash)
        } else {
            None
        }
    }
}

/// Record iterator for whichever format was detected.
pub enum RecordStream<R> {
    DataFlash(DataFlashDecoder<R>),
    Ulog(UlogDecoder<R>),
}

impl<R: Read> RecordStream<R> {
    pub fn format(&self) -> LogFormat {
        match self {
            Self::DataFlash(_) => LogFormat::DataFlash,
            Self::Ulog(_) => LogFormat::Ulog,
        }
    }

    pub fn stats(&self) -> DecodeStats {
        match self {
            Self::DataFlash(d) => d.stats(),
            Self::Ulog(d) => d.stats(),
        }
    }
}

impl<R: Read> Iterator for RecordStream<R> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        match self {
            Self::DataFlash(d) => d.next(),
            Self::Ulog(d) => d.next(),
        }
    }
}

/// Open a byte stream for decoding.
pub fn decode<R: Read>(source: R) -> Result<RecordStream<R>, DecodeError> {
    let mut reader = FrameReader::new(source);
    reader.fill(SNIFF_LEN)?;
    if reader.available() == 0 {
        return Err(DecodeError::EmptyStream);
    }

    let header = reader.peek(SNIFF_LEN);
    match LogFormat::detect(header) {
        Some(LogFormat::DataFlash) => Ok(RecordStream::DataFlash(DataFlashDecoder::new(reader))),
        Some(LogFormat::Ulog) => Ok(RecordStream::Ulog(UlogDecoder::new(reader)?)),
        None => {
            let preview: Vec<String> = header.iter().take(8).map(|b| format!("{:02x}", b)).collect();
            Err(DecodeError::UnrecognizedHeader(format!(
                "leading bytes [{}] match no supported log format",
                preview.join(" ")
            )))
        }
    }
}

/// Open a log file for decoding.
pub fn decode_file(path: &Path) -> Result<RecordStream<BufReader<File>>, DecodeError> {
    let file = File::open(path)?;
    decode(BufReader::new(file))
}

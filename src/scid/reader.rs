//! Streaming SCID record reader

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use regex::Regex;

use super::{datetime_to_raw, ScidError, Tick, HEADER_SIZE, RECORD_SIZE};

static CONTRACT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z]{2,3}[A-Z]\d{2})").unwrap());

/// Parsed 56-byte SCID file header
#[derive(Debug, Clone)]
pub struct Header {
    /// Magic identifier, normally "SCID"
    pub file_type_id: String,
    pub header_size: u32,
    pub record_size: u32,
    pub version: u16,
    pub unused1: u16,
    pub utc_start_index: u32,
}

impl Header {
    /// Read and parse the header from the start of a stream.
    ///
    /// Fails with [`ScidError::ShortHeader`] if fewer than 56 bytes are
    /// available.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, ScidError> {
        let mut buf = [0u8; HEADER_SIZE];
        reader.read_exact(&mut buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => ScidError::ShortHeader,
            _ => ScidError::Io(e),
        })?;

        Ok(Header {
            file_type_id: String::from_utf8_lossy(&buf[0..4])
                .trim_end_matches('\0')
                .to_string(),
            header_size: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            record_size: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            version: u16::from_le_bytes([buf[12], buf[13]]),
            unused1: u16::from_le_bytes([buf[14], buf[15]]),
            utc_start_index: u32::from_le_bytes([buf[16], buf[17], buf[18], buf[19]]),
            // Remaining 36 bytes are reserved.
        })
    }
}

/// Extract the contract symbol from a SCID filename.
///
/// # Examples
/// - "ESZ24_FUT_CME.scid" → "ESZ24"
/// - "NQH25.scid" → "NQH25"
pub fn contract_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();

    if let Some(m) = CONTRACT_RE.captures(stem).and_then(|c| c.get(1)) {
        return m.as_str().to_string();
    }

    // Fallback: first underscore-separated segment.
    stem.split('_').next().unwrap_or(stem).to_string()
}

/// Streaming reader over the tick records of a single SCID file.
///
/// Forward-only. Records outside the configured raw-time range are skipped
/// before a [`Tick`] is built; a trailing fragment shorter than one record
/// ends iteration as EOF.
pub struct ScidReader<R: Read> {
    reader: R,
    header: Header,
    contract: Arc<str>,
    start_raw: Option<u64>,
    end_raw: Option<u64>,
    position: u64,
}

impl ScidReader<BufReader<File>> {
    /// Open a SCID file, parse its header, and derive the contract symbol
    /// from the filename.
    pub fn open(path: &Path) -> Result<Self, ScidError> {
        let contract = contract_from_path(path);
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), contract)
    }
}

impl<R: Read> ScidReader<R> {
    /// Wrap an already-open stream positioned at the start of the file.
    pub fn from_reader(mut reader: R, contract: impl Into<Arc<str>>) -> Result<Self, ScidError> {
        let header = Header::read(&mut reader)?;
        Ok(Self {
            reader,
            header,
            contract: contract.into(),
            start_raw: None,
            end_raw: None,
            position: HEADER_SIZE as u64,
        })
    }

    /// Restrict decoding to instants in `[start, end)`. Unset bounds are
    /// unbounded.
    pub fn with_range(mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        self.start_raw = start.map(datetime_to_raw);
        self.end_raw = end.map(datetime_to_raw);
        self
    }

    /// File header parsed at open time.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Contract symbol assigned to every decoded tick.
    pub fn contract(&self) -> &str {
        &self.contract
    }

    /// Current byte offset into the file, suitable for checkpointing.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn in_range(&self, raw_time: u64) -> bool {
        if let Some(start) = self.start_raw {
            if raw_time < start {
                return false;
            }
        }
        if let Some(end) = self.end_raw {
            if raw_time >= end {
                return false;
            }
        }
        true
    }
}

impl<R: Read + Seek> ScidReader<R> {
    /// Resume reading at a byte offset recorded by a previous run. Offsets
    /// at or before the header are ignored.
    pub fn seek_to(&mut self, offset: u64) -> Result<(), ScidError> {
        if offset > HEADER_SIZE as u64 {
            self.reader.seek(SeekFrom::Start(offset))?;
            self.position = offset;
        }
        Ok(())
    }
}

impl<R: Read> Iterator for ScidReader<R> {
    type Item = Result<Tick, ScidError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut buf = [0u8; RECORD_SIZE];

        loop {
            match self.reader.read_exact(&mut buf) {
                Ok(()) => {}
                // Short trailing fragment is a natural end of data.
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => return None,
                Err(e) => return Some(Err(ScidError::Io(e))),
            }
            self.position += RECORD_SIZE as u64;

            let raw_time = u64::from_le_bytes(buf[0..8].try_into().unwrap());
            if !self.in_range(raw_time) {
                continue;
            }

            return Some(Ok(Tick {
                raw_time,
                open: f32::from_le_bytes(buf[8..12].try_into().unwrap()),
                high: f32::from_le_bytes(buf[12..16].try_into().unwrap()),
                low: f32::from_le_bytes(buf[16..20].try_into().unwrap()),
                close: f32::from_le_bytes(buf[20..24].try_into().unwrap()),
                num_trades: u32::from_le_bytes(buf[24..28].try_into().unwrap()),
                volume: u32::from_le_bytes(buf[28..32].try_into().unwrap()),
                bid_volume: u32::from_le_bytes(buf[32..36].try_into().unwrap()),
                ask_volume: u32::from_le_bytes(buf[36..40].try_into().unwrap()),
                contract: self.contract.clone(),
            }));
        }
    }
}

//! On-disk layout of DTF files and the values decoded from them.
//!
//! A DTF file is a fixed 95-byte header followed by a stream of two kinds of
//! records:
//!
//! | Record    | Size | Layout                                                        |
//! |-----------|------|---------------------------------------------------------------|
//! | Data      | 12   | `delta_ts:u16 \| delta_seq:u8 \| flags:u8 \| price:f32 \| size:f32` |
//! | Refresh   | 15   | `0x01 \| ref_ts:u64 \| ref_seq:u32 \| countdown:u16`             |
//!
//! All multi-byte fields are big-endian. Data records only carry deltas; the
//! absolute values come from the latest refresh (or from the header before the
//! first refresh), tracked by [`ReferenceState`].
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::decoder::FormatError;

/// File signature, bytes 0..5.
pub const MAGIC: [u8; 5] = [0x44, 0x54, 0x46, 0x90, 0x01];
/// First byte after the header.
pub const RECORD_OFFSET: usize = 95;
/// Size of a data record.
pub const RECORD_LEN: usize = 12;
/// Size of a refresh record, marker byte included.
pub const REFRESH_LEN: usize = 15;
/// Refresh payload without the marker byte.
pub const REFRESH_PAYLOAD_LEN: usize = REFRESH_LEN - 1;
/// Leading byte of a refresh record.
pub const REFRESH_MARKER: u8 = 0x01;

/// Flags bit set on bid-side events.
pub const FLAG_IS_BID: u8 = 0b0000_0001;
/// Flags bit set on trades.
pub const FLAG_IS_TRADE: u8 = 0b0000_0010;

const SYMBOL_RANGE: std::ops::Range<usize> = 5..25;
const RECORD_COUNT_AT: usize = 25;
const MAX_TS_AT: usize = 33;
const REF_TS_AT: usize = 81;
const REF_SEQ_AT: usize = 89;
const COUNTDOWN_AT: usize = 93;

fn be_u16(b: &[u8], o: usize) -> u16 { let mut tmp = [0u8; 2]; tmp.copy_from_slice(&b[o..o + 2]); u16::from_be_bytes(tmp) }
fn be_u32(b: &[u8], o: usize) -> u32 { let mut tmp = [0u8; 4]; tmp.copy_from_slice(&b[o..o + 4]); u32::from_be_bytes(tmp) }
fn be_u64(b: &[u8], o: usize) -> u64 { let mut tmp = [0u8; 8]; tmp.copy_from_slice(&b[o..o + 8]); u64::from_be_bytes(tmp) }
fn be_f32(b: &[u8], o: usize) -> f32 { f32::from_bits(be_u32(b, o)) }

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
    /// Instrument identifier, NUL padding stripped.
    pub symbol: String,
    /// Declared number of records. Advisory; never checked against the stream.
    pub record_count: u64,
    /// Declared last timestamp in milliseconds. Advisory.
    pub max_timestamp: u64,
    pub initial_ref_timestamp: u64,
    pub initial_ref_seq: u32,
    /// Data records allowed before the first refresh may appear.
    pub initial_next_record_countdown: u16,
}

impl FileHeader {
    /// Parse the fixed header at the start of `bytes`.
    ///
    /// `path` only labels errors. Anything shorter than the magic, or not
    /// starting with it, is [`FormatError::BadMagic`]; a correct magic with
    /// fewer than [`RECORD_OFFSET`] bytes is [`FormatError::TruncatedHeader`].
    pub fn parse(path: &str, bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() < MAGIC.len() || bytes[..MAGIC.len()] != MAGIC {
            return Err(FormatError::BadMagic { path: path.to_string() });
        }
        if bytes.len() < RECORD_OFFSET {
            return Err(FormatError::TruncatedHeader { path: path.to_string(), len: bytes.len() });
        }
        let symbol = String::from_utf8_lossy(&bytes[SYMBOL_RANGE])
            .trim_end_matches('\0')
            .trim()
            .to_string();
        Ok(Self {
            symbol,
            record_count: be_u64(bytes, RECORD_COUNT_AT),
            max_timestamp: be_u64(bytes, MAX_TS_AT),
            initial_ref_timestamp: be_u64(bytes, REF_TS_AT),
            initial_ref_seq: be_u32(bytes, REF_SEQ_AT),
            initial_next_record_countdown: be_u16(bytes, COUNTDOWN_AT),
        })
    }
}

/// One decoded quote or trade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Seconds since the Unix epoch, millisecond resolution.
    pub timestamp: f64,
    pub sequence: u64,
    pub is_trade: bool,
    pub is_bid: bool,
    pub price: f64,
    pub size: f64,
}

impl Event {
    /// Timestamp as a UTC calendar time, rounded to the stored millisecond.
    pub fn datetime(&self) -> Result<OffsetDateTime, time::error::ComponentRange> {
        let ms = (self.timestamp * 1_000.0).round() as i128;
        OffsetDateTime::from_unix_timestamp_nanos(ms * 1_000_000)
    }
}

/// Baseline the deltas of data records are applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceState {
    pub ref_ts: u64,
    pub ref_seq: u32,
    pub countdown: u16,
    /// 1-based index of the next data record since the last refresh.
    pub records_since_refresh: u32,
}

impl ReferenceState {
    pub fn from_header(h: &FileHeader) -> Self {
        Self {
            ref_ts: h.initial_ref_timestamp,
            ref_seq: h.initial_ref_seq,
            countdown: h.initial_next_record_countdown,
            records_since_refresh: 1,
        }
    }

    /// Whether a record starting with `lead` is a refresh record.
    ///
    /// Once the countdown is spent, a leading `0x01` always wins: a data record
    /// at that position whose first byte (the high byte of `delta_ts`) is
    /// `0x01` is read as a refresh. Encoders must avoid producing it.
    pub fn is_refresh(&self, lead: u8) -> bool {
        self.records_since_refresh > u32::from(self.countdown) && lead == REFRESH_MARKER
    }

    /// Replace the baseline with a refresh payload (marker byte excluded).
    pub fn apply_refresh(&mut self, payload: &[u8; REFRESH_PAYLOAD_LEN]) {
        self.ref_ts = be_u64(payload, 0);
        self.ref_seq = be_u32(payload, 8);
        self.countdown = be_u16(payload, 12);
        self.records_since_refresh = 1;
    }

    /// Decode one data record against the current baseline and count it.
    pub fn decode_record(&mut self, rec: &[u8; RECORD_LEN]) -> Event {
        let delta_ts = be_u16(rec, 0);
        let delta_seq = rec[2];
        let flags = rec[3];
        self.records_since_refresh = self.records_since_refresh.saturating_add(1);
        Event {
            timestamp: self.ref_ts.wrapping_add(u64::from(delta_ts)) as f64 * 0.001,
            sequence: u64::from(self.ref_seq) + u64::from(delta_seq),
            is_trade: flags & FLAG_IS_TRADE == FLAG_IS_TRADE,
            is_bid: flags & FLAG_IS_BID == FLAG_IS_BID,
            price: f64::from(be_f32(rec, 4)),
            size: f64::from(be_f32(rec, 8)),
        }
    }
}

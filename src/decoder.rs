//! In-memory DTF decoder.
//!
//! [`Decoder`] validates the header and then walks the buffer lazily, one
//! [`Event`] per data record, consuming refresh records inline. All scan state
//! lives in the iterator, so cloning a fresh decoder restarts the pass.
//!
//! Known format edge case: once the countdown of the current baseline is
//! spent, a record whose first byte is `0x01` is always taken as a refresh.
//! A data record with `delta_ts` high byte `0x01` at that position would be
//! misread; the format relies on encoders emitting a refresh there.
use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, trace};

use crate::record::{
    Event, FileHeader, RECORD_LEN, RECORD_OFFSET, REFRESH_LEN, REFRESH_PAYLOAD_LEN, ReferenceState,
};

/// Label used in errors when decoding a buffer with no file behind it.
pub const MEMORY_SOURCE: &str = "<memory>";

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("{path} is not a valid DTF file")]
    BadMagic { path: String },
    #[error("{path}: header truncated at {len} bytes, expected {max}", max = RECORD_OFFSET)]
    TruncatedHeader { path: String, len: usize },
    #[error("read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    bytes: &'a [u8],
    header: FileHeader,
    state: ReferenceState,
    pos: usize,
    refreshes: u64,
}

impl<'a> Decoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<Self, FormatError> {
        Self::with_source(MEMORY_SOURCE, bytes)
    }

    /// Like [`Decoder::new`], with `source` naming the buffer in errors.
    pub fn with_source(source: &str, bytes: &'a [u8]) -> Result<Self, FormatError> {
        let header = FileHeader::parse(source, bytes)?;
        debug!(
            source,
            symbol = %header.symbol,
            declared = header.record_count,
            ref_ts = header.initial_ref_timestamp,
            ref_seq = header.initial_ref_seq,
            countdown = header.initial_next_record_countdown,
            "dtf header"
        );
        let state = ReferenceState::from_header(&header);
        Ok(Self { bytes, header, state, pos: RECORD_OFFSET, refreshes: 0 })
    }

    pub fn header(&self) -> &FileHeader { &self.header }

    /// Baseline the next data record will be decoded against.
    pub fn state(&self) -> ReferenceState { self.state }

    /// Refresh records consumed so far.
    pub fn refreshes(&self) -> u64 { self.refreshes }

    /// Byte offset of the next unread record.
    pub fn position(&self) -> usize { self.pos }
}

impl Iterator for Decoder<'_> {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        let bytes = self.bytes;
        if bytes.len() - self.pos < RECORD_LEN {
            return None;
        }
        if self.state.is_refresh(bytes[self.pos]) {
            // A refresh cut short leaves no room for another data record.
            let Some(payload) = bytes.get(self.pos + 1..self.pos + REFRESH_LEN) else {
                self.pos = bytes.len();
                return None;
            };
            let mut buf = [0u8; REFRESH_PAYLOAD_LEN];
            buf.copy_from_slice(payload);
            self.state.apply_refresh(&buf);
            trace!(
                at = self.pos,
                ref_ts = self.state.ref_ts,
                ref_seq = self.state.ref_seq,
                countdown = self.state.countdown,
                "reference refresh"
            );
            self.pos += REFRESH_LEN;
            self.refreshes += 1;
            // The record after a refresh is always data, whatever its lead byte.
            if bytes.len() - self.pos < RECORD_LEN {
                return None;
            }
        }
        let mut rec = [0u8; RECORD_LEN];
        rec.copy_from_slice(&bytes[self.pos..self.pos + RECORD_LEN]);
        self.pos += RECORD_LEN;
        Some(self.state.decode_record(&rec))
    }
}

/// Decode a whole buffer.
pub fn decode(bytes: &[u8]) -> Result<Vec<Event>, FormatError> {
    let mut dec = Decoder::new(bytes)?;
    let events: Vec<Event> = dec.by_ref().collect();
    log_summary(&dec, events.len());
    Ok(events)
}

/// Read `path` and decode it. The path labels any [`FormatError`].
pub fn decode_file(path: impl AsRef<Path>) -> Result<(FileHeader, Vec<Event>), FormatError> {
    let path = path.as_ref();
    let label = path.display().to_string();
    let bytes = fs::read(path).map_err(|source| FormatError::Io { path: label.clone(), source })?;
    let mut dec = Decoder::with_source(&label, &bytes)?;
    let events: Vec<Event> = dec.by_ref().collect();
    log_summary(&dec, events.len());
    Ok((dec.header, events))
}

fn log_summary(dec: &Decoder<'_>, decoded: usize) {
    let declared = dec.header.record_count;
    debug!(decoded, declared, refreshes = dec.refreshes, trailing = dec.bytes.len() - dec.pos, "dtf decoded");
    if declared != decoded as u64 {
        debug!(decoded, declared, "decoded count differs from header record_count");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FLAG_IS_BID, FLAG_IS_TRADE, MAGIC};
    use crate::testutil::DtfBuilder;

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = DtfBuilder::new("X", 0, 0, 0).record(0, 0, 0, 1.0, 1.0).build();
        assert!(decode(&bytes).is_ok());
        for i in 0..MAGIC.len() {
            let mut bad = bytes.clone();
            bad[i] ^= 0xFF;
            match decode(&bad) {
                Err(FormatError::BadMagic { path }) => assert_eq!(path, MEMORY_SOURCE),
                other => panic!("expected BadMagic, got {other:?}"),
            }
        }
        bytes.truncate(4);
        assert!(matches!(decode(&bytes), Err(FormatError::BadMagic { .. })));
        assert!(matches!(decode(&[]), Err(FormatError::BadMagic { .. })));
    }

    #[test]
    fn header_only_file_has_no_events() {
        let bytes = DtfBuilder::new("ETH", 5, 5, 5).record_count(3).build();
        let dec = Decoder::new(&bytes).unwrap();
        assert_eq!(dec.header().record_count, 3);
        assert_eq!(dec.header().symbol, "ETH");
        assert_eq!(decode(&bytes).unwrap(), vec![]);
    }

    #[test]
    fn single_record_reconstruction() {
        let bytes = DtfBuilder::new("BTC", 1_000_000, 10, 5)
            .record(250, 3, FLAG_IS_TRADE | FLAG_IS_BID, 1.5, 2.25)
            .build();
        let events = decode(&bytes).unwrap();
        assert_eq!(events, vec![Event {
            timestamp: 1000.25,
            sequence: 13,
            is_trade: true,
            is_bid: true,
            price: 1.5,
            size: 2.25,
        }]);
    }

    #[test]
    fn refresh_resets_baseline() {
        let bytes = DtfBuilder::new("BTC", 1_000_000, 10, 1)
            .record(5, 1, 0, 100.0, 1.0)
            .refresh(2_000_000, 500, 2)
            .record(7, 2, FLAG_IS_TRADE, 101.0, 3.0)
            .build();
        let mut dec = Decoder::new(&bytes).unwrap();
        let first = dec.next().unwrap();
        assert_eq!((first.timestamp, first.sequence), (1000.005, 11));
        let second = dec.next().unwrap();
        assert_eq!((second.timestamp, second.sequence), (2000.007, 502));
        assert!(second.is_trade && !second.is_bid);
        assert_eq!(dec.refreshes(), 1);
        assert_eq!(dec.state().records_since_refresh, 2);
        assert_eq!(dec.state().countdown, 2);
        assert!(dec.next().is_none());
        assert_eq!(dec.position(), bytes.len());
    }

    #[test]
    fn marker_before_countdown_is_data() {
        // 0x01 as the leading byte is delta_ts >= 256 while the countdown holds.
        let bytes = DtfBuilder::new("BTC", 0, 0, 2)
            .record(0x0100, 0, 0, 1.0, 1.0)
            .record(0x0102, 0, 0, 1.0, 1.0)
            .build();
        let events = decode(&bytes).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].timestamp, 0.256);
        assert_eq!(events[1].timestamp, 0.258);
    }

    #[test]
    fn marker_after_countdown_is_refresh() {
        // Same data record once the countdown is spent reads as a refresh.
        let bytes = DtfBuilder::new("BTC", 0, 0, 0)
            .record(0x0100, 0, 0, 1.0, 1.0)
            .record(0x0002, 0, 0, 1.0, 1.0)
            .build();
        let mut dec = Decoder::new(&bytes).unwrap();
        let events: Vec<_> = dec.by_ref().collect();
        assert_eq!(dec.refreshes(), 1);
        // 15 bytes consumed by the refresh leave 9 bytes, not a full record.
        assert!(events.is_empty());
    }

    #[test]
    fn record_after_refresh_is_always_data() {
        // countdown 0 spends the new baseline at once, but the record right
        // after the refresh still decodes as data even with a 0x01 lead byte
        let bytes = DtfBuilder::new("BTC", 0, 0, 0)
            .refresh(1_000, 1, 0)
            .record(0x0105, 2, 0, 1.0, 1.0)
            .refresh(5_000, 9, 4)
            .record(3, 1, FLAG_IS_BID, 2.0, 2.0)
            .build();
        let mut dec = Decoder::new(&bytes).unwrap();
        let first = dec.next().unwrap();
        assert_eq!((first.timestamp, first.sequence), (1_261.0 * 0.001, 3));
        assert_eq!(dec.refreshes(), 1);
        let second = dec.next().unwrap();
        assert_eq!((second.timestamp, second.sequence), (5.003, 10));
        assert!(second.is_bid);
        assert_eq!(dec.refreshes(), 2);
        assert!(dec.next().is_none());
    }

    #[test]
    fn marker_after_refresh_with_zero_countdown() {
        let bytes = DtfBuilder::new("BTC", 0, 0, 0)
            .refresh(1_000, 1, 0)
            .record(0x0105, 2, 0, 1.0, 1.0)
            .build();
        let events = decode(&bytes).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sequence, 3);
        assert_eq!(events[0].timestamp, 1_261.0 * 0.001);
    }

    #[test]
    fn truncated_refresh_stops_cleanly() {
        let mut bytes = DtfBuilder::new("BTC", 0, 0, 0).refresh(9, 9, 9).build();
        bytes.truncate(bytes.len() - 2);
        let mut dec = Decoder::new(&bytes).unwrap();
        assert!(dec.next().is_none());
        assert_eq!(dec.refreshes(), 0);
        assert!(dec.next().is_none());
    }

    #[test]
    fn partial_trailing_record_is_dropped() {
        let full = DtfBuilder::new("BTC", 1_000, 0, 10)
            .record(1, 1, 0, 10.0, 1.0)
            .record(2, 2, FLAG_IS_BID, 11.0, 2.0)
            .build();
        let expected = decode(&full).unwrap();
        let with_tail = DtfBuilder::new("BTC", 1_000, 0, 10)
            .record(1, 1, 0, 10.0, 1.0)
            .record(2, 2, FLAG_IS_BID, 11.0, 2.0)
            .record(3, 3, 0, 12.0, 3.0)
            .build();
        for cut in 1..RECORD_LEN {
            let truncated = &with_tail[..with_tail.len() - cut];
            assert_eq!(decode(truncated).unwrap(), expected, "cut {cut}");
        }
    }

    #[test]
    fn decoding_twice_is_identical() {
        let bytes = DtfBuilder::new("BTC", 123_456, 7, 1)
            .record(1, 1, 0, 1.1, 2.2)
            .refresh(999_999, 70, 1)
            .record(2, 2, FLAG_IS_TRADE, 3.3, 4.4)
            .build();
        let a = decode(&bytes).unwrap();
        let b = decode(&bytes).unwrap();
        let bits = |v: &[Event]| v.iter().map(|e| (e.timestamp.to_bits(), e.sequence, e.price.to_bits(), e.size.to_bits())).collect::<Vec<_>>();
        assert_eq!(bits(&a), bits(&b));

        let dec = Decoder::new(&bytes).unwrap();
        let restarted: Vec<_> = dec.clone().collect();
        assert_eq!(restarted, dec.collect::<Vec<_>>());
    }

    #[test]
    fn decode_file_labels_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.dtf");
        fs::write(&path, b"NOPE!").unwrap();
        match decode_file(&path) {
            Err(FormatError::BadMagic { path: p }) => assert_eq!(p, path.display().to_string()),
            other => panic!("expected BadMagic, got {other:?}"),
        }
        let missing = dir.path().join("missing.dtf");
        assert!(matches!(decode_file(&missing), Err(FormatError::Io { .. })));
    }
}

//! Byte-level builder for synthetic DTF buffers used by unit tests.
use crate::record::{MAGIC, RECORD_OFFSET, REFRESH_MARKER};

pub(crate) struct DtfBuilder {
    bytes: Vec<u8>,
}

impl DtfBuilder {
    pub(crate) fn new(symbol: &str, ref_ts: u64, ref_seq: u32, countdown: u16) -> Self {
        let mut bytes = vec![0u8; RECORD_OFFSET];
        bytes[..5].copy_from_slice(&MAGIC);
        let sym = symbol.as_bytes();
        bytes[5..5 + sym.len().min(20)].copy_from_slice(&sym[..sym.len().min(20)]);
        bytes[81..89].copy_from_slice(&ref_ts.to_be_bytes());
        bytes[89..93].copy_from_slice(&ref_seq.to_be_bytes());
        bytes[93..95].copy_from_slice(&countdown.to_be_bytes());
        Self { bytes }
    }

    pub(crate) fn record_count(mut self, n: u64) -> Self {
        self.bytes[25..33].copy_from_slice(&n.to_be_bytes());
        self
    }

    pub(crate) fn record(mut self, delta_ts: u16, delta_seq: u8, flags: u8, price: f32, size: f32) -> Self {
        self.bytes.extend_from_slice(&delta_ts.to_be_bytes());
        self.bytes.push(delta_seq);
        self.bytes.push(flags);
        self.bytes.extend_from_slice(&price.to_be_bytes());
        self.bytes.extend_from_slice(&size.to_be_bytes());
        self
    }

    pub(crate) fn refresh(mut self, ref_ts: u64, ref_seq: u32, countdown: u16) -> Self {
        self.bytes.push(REFRESH_MARKER);
        self.bytes.extend_from_slice(&ref_ts.to_be_bytes());
        self.bytes.extend_from_slice(&ref_seq.to_be_bytes());
        self.bytes.extend_from_slice(&countdown.to_be_bytes());
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        self.bytes
    }
}

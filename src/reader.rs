//! Streaming DTF decoder over any [`Read`].
//!
//! Produces exactly the events [`crate::decoder::decode`] produces for the
//! same bytes while holding no more than one refresh record of lookahead.
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use tracing::{debug, trace};

use crate::decoder::FormatError;
use crate::record::{
    Event, FileHeader, RECORD_LEN, RECORD_OFFSET, REFRESH_LEN, REFRESH_PAYLOAD_LEN, ReferenceState,
};

/// Label used in errors when the reader was not opened from a path.
pub const STREAM_SOURCE: &str = "<stream>";

/// Read until `buf` is full or the reader is exhausted; returns bytes read.
fn read_up_to<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut n = 0;
    while n < buf.len() {
        match r.read(&mut buf[n..]) {
            Ok(0) => break,
            Ok(k) => n += k,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(n)
}

pub struct DtfReader<R> {
    inner: R,
    path: String,
    header: FileHeader,
    state: ReferenceState,
    buf: [u8; REFRESH_LEN],
    filled: usize,
    refreshes: u64,
    done: bool,
}

impl DtfReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FormatError> {
        let path = path.as_ref();
        let label = path.display().to_string();
        let file = File::open(path).map_err(|source| FormatError::Io { path: label.clone(), source })?;
        Self::with_source(&label, BufReader::new(file))
    }
}

impl<R: Read> DtfReader<R> {
    pub fn new(inner: R) -> Result<Self, FormatError> {
        Self::with_source(STREAM_SOURCE, inner)
    }

    /// Read and validate the header; `source` labels errors.
    pub fn with_source(source: &str, mut inner: R) -> Result<Self, FormatError> {
        let mut head = [0u8; RECORD_OFFSET];
        let n = read_up_to(&mut inner, &mut head)
            .map_err(|e| FormatError::Io { path: source.to_string(), source: e })?;
        let header = FileHeader::parse(source, &head[..n])?;
        debug!(source, symbol = %header.symbol, declared = header.record_count, "dtf stream header");
        let state = ReferenceState::from_header(&header);
        Ok(Self {
            inner,
            path: source.to_string(),
            header,
            state,
            buf: [0u8; REFRESH_LEN],
            filled: 0,
            refreshes: 0,
            done: false,
        })
    }

    pub fn header(&self) -> &FileHeader { &self.header }

    pub fn state(&self) -> ReferenceState { self.state }

    pub fn refreshes(&self) -> u64 { self.refreshes }

    /// Top up the lookahead to `want` bytes; false if the stream ended first.
    fn fill(&mut self, want: usize) -> io::Result<bool> {
        if self.filled < want {
            let n = read_up_to(&mut self.inner, &mut self.buf[self.filled..want])?;
            self.filled += n;
        }
        Ok(self.filled >= want)
    }

    fn consume(&mut self, n: usize) {
        self.buf.copy_within(n..self.filled, 0);
        self.filled -= n;
    }

    fn next_event(&mut self) -> io::Result<Option<Event>> {
        if !self.fill(RECORD_LEN)? {
            return Ok(None);
        }
        if self.state.is_refresh(self.buf[0]) {
            if !self.fill(REFRESH_LEN)? {
                return Ok(None);
            }
            let mut payload = [0u8; REFRESH_PAYLOAD_LEN];
            payload.copy_from_slice(&self.buf[1..REFRESH_LEN]);
            self.state.apply_refresh(&payload);
            self.consume(REFRESH_LEN);
            self.refreshes += 1;
            trace!(ref_ts = self.state.ref_ts, ref_seq = self.state.ref_seq, countdown = self.state.countdown, "reference refresh");
            // The record after a refresh is always data, whatever its lead byte.
            if !self.fill(RECORD_LEN)? {
                return Ok(None);
            }
        }
        let mut rec = [0u8; RECORD_LEN];
        rec.copy_from_slice(&self.buf[..RECORD_LEN]);
        self.consume(RECORD_LEN);
        Ok(Some(self.state.decode_record(&rec)))
    }
}

impl<R: Read> Iterator for DtfReader<R> {
    type Item = Result<Event, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_event() {
            Ok(Some(ev)) => Some(Ok(ev)),
            Ok(None) => {
                self.done = true;
                debug!(path = %self.path, refreshes = self.refreshes, trailing = self.filled, "dtf stream finished");
                None
            }
            Err(source) => {
                self.done = true;
                Some(Err(FormatError::Io { path: self.path.clone(), source }))
            }
        }
    }
}

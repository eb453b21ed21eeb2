//! Level-2 order book rebuilt from DTF quote events.
//!
//! A quote carries the full size resting at one price on one side, so
//! applying it replaces that level; a zero size clears it. Trades are
//! informational and leave the book untouched.
use std::cmp::Ordering;

use crate::record::Event;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Level {
    pub price: f64,
    pub size: f64,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Book {
    /// Bid side, best (highest) price at index 0.
    pub bids: Vec<Level>,
    /// Ask side, best (lowest) price at index 0.
    pub asks: Vec<Level>,
    /// Trades seen while replaying.
    pub trades: u64,
    /// Timestamp of the last applied event.
    pub last_timestamp: Option<f64>,
}

impl Book {
    /// Apply one decoded event.
    pub fn apply(&mut self, ev: &Event) {
        self.last_timestamp = Some(ev.timestamp);
        if ev.is_trade {
            self.trades += 1;
            return;
        }
        if ev.is_bid {
            Self::set_level(&mut self.bids, ev.price, ev.size, |a, b| b.total_cmp(&a));
        } else {
            Self::set_level(&mut self.asks, ev.price, ev.size, |a, b| a.total_cmp(&b));
        }
    }

    /// Insert, replace or remove `price` on a side kept sorted by `order`.
    fn set_level(side: &mut Vec<Level>, price: f64, size: f64, order: impl Fn(f64, f64) -> Ordering) {
        match side.binary_search_by(|l| order(l.price, price)) {
            Ok(idx) if size == 0.0 => { side.remove(idx); }
            Ok(idx) => side[idx].size = size,
            Err(_) if size == 0.0 => {}
            Err(idx) => side.insert(idx, Level { price, size }),
        }
    }

    pub fn best_bid(&self) -> Option<Level> { self.bids.first().copied() }

    pub fn best_ask(&self) -> Option<Level> { self.asks.first().copied() }

    /// Best `n` levels per side as `(bids, asks)`.
    pub fn top(&self, n: usize) -> (&[Level], &[Level]) {
        (&self.bids[..n.min(self.bids.len())], &self.asks[..n.min(self.asks.len())])
    }

    pub fn spread(&self) -> Option<f64> {
        Some(self.best_ask()?.price - self.best_bid()?.price)
    }
}

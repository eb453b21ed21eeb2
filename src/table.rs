//! Sorted view over decoded events.
//!
//! Decoders emit events in file order, which is not guaranteed to be
//! timestamp order. [`EventTable`] stably sorts by timestamp alone (ties keep
//! file order) and offers lookups keyed by `(timestamp, sequence)`.
use std::cmp::Ordering;

use crate::record::Event;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventTable {
    rows: Vec<Event>,
}

impl EventTable {
    pub fn from_events(mut rows: Vec<Event>) -> Self {
        // sort_by is stable
        rows.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        Self { rows }
    }

    pub fn len(&self) -> usize { self.rows.len() }

    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    pub fn iter(&self) -> std::slice::Iter<'_, Event> { self.rows.iter() }

    pub fn as_slice(&self) -> &[Event] { &self.rows }

    pub fn into_vec(self) -> Vec<Event> { self.rows }

    /// Index of the first row with `timestamp >= ts`.
    fn lower_bound(&self, ts: f64) -> usize {
        self.rows.partition_point(|e| e.timestamp.total_cmp(&ts) == Ordering::Less)
    }

    /// First row in sorted order matching the compound key.
    pub fn get(&self, timestamp: f64, sequence: u64) -> Option<&Event> {
        self.rows[self.lower_bound(timestamp)..]
            .iter()
            .take_while(|e| e.timestamp.total_cmp(&timestamp) == Ordering::Equal)
            .find(|e| e.sequence == sequence)
    }

    /// Rows with `start <= timestamp < end`.
    pub fn between(&self, start: f64, end: f64) -> &[Event] {
        let lo = self.lower_bound(start);
        let hi = self.lower_bound(end).max(lo);
        &self.rows[lo..hi]
    }

    pub fn trades(&self) -> impl Iterator<Item = &Event> + '_ {
        self.rows.iter().filter(|e| e.is_trade)
    }

    pub fn quotes(&self) -> impl Iterator<Item = &Event> + '_ {
        self.rows.iter().filter(|e| !e.is_trade)
    }

    pub fn first_timestamp(&self) -> Option<f64> { self.rows.first().map(|e| e.timestamp) }

    pub fn last_timestamp(&self) -> Option<f64> { self.rows.last().map(|e| e.timestamp) }
}

impl FromIterator<Event> for EventTable {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        Self::from_events(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a EventTable {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter { self.rows.iter() }
}

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use uuid::Uuid;

use crate::models::{Instrument, PricePoint};

/// Points kept per instrument before the oldest are evicted
pub const DEFAULT_CAPACITY: usize = 100;

/// Thread-safe in-memory buffer of OHLC points per instrument
///
/// Maintains a sliding window: append-only, time-ordered, oldest evicted
/// first once the capacity is reached.
#[derive(Clone)]
pub struct PriceHistoryBuffer {
    data: Arc<RwLock<HashMap<Uuid, VecDeque<PricePoint>>>>,
    capacity: usize,
}

impl PriceHistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    /// Append a tick for an instrument, deriving OHLC from the last close
    ///
    /// When the instrument has no recorded history yet, its stored current
    /// price acts as the previous close. Suppressing redundant ticks
    /// (new price == current price) is the scheduler's job, not ours.
    pub fn append(&self, instrument: &Instrument, new_price: f64) -> PricePoint {
        let mut data = self.data.write().unwrap();
        let points = data.entry(instrument.id).or_default();

        let previous_close = points
            .back()
            .map(|p| p.close)
            .unwrap_or(instrument.current_price);
        let point = PricePoint::from_tick(previous_close, new_price, Utc::now());

        points.push_back(point.clone());
        while points.len() > self.capacity {
            points.pop_front();
        }

        point
    }

    /// All retained points for an instrument, oldest first
    pub fn points(&self, instrument_id: Uuid) -> Vec<PricePoint> {
        let data = self.data.read().unwrap();
        data.get(&instrument_id)
            .map(|deque| deque.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Closing prices of the most recent `n` points, oldest first
    pub fn recent_closes(&self, instrument_id: Uuid, n: usize) -> Vec<f64> {
        let data = self.data.read().unwrap();
        data.get(&instrument_id)
            .map(|deque| deque.iter().rev().take(n).rev().map(|p| p.close).collect())
            .unwrap_or_default()
    }

    pub fn len(&self, instrument_id: Uuid) -> usize {
        let data = self.data.read().unwrap();
        data.get(&instrument_id).map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, instrument_id: Uuid) -> bool {
        self.len(instrument_id) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_instrument(price: f64) -> Instrument {
        Instrument {
            id: Uuid::new_v4(),
            symbol: "AAPL".to_string(),
            name: "Apple Inc.".to_string(),
            current_price: price,
            volatility: None,
        }
    }

    #[test]
    fn test_first_append_uses_current_price_as_open() {
        let buffer = PriceHistoryBuffer::new(100);
        let instrument = test_instrument(150.0);

        let point = buffer.append(&instrument, 152.0);

        assert_eq!(point.open, 150.0);
        assert_eq!(point.high, 152.0);
        assert_eq!(point.low, 150.0);
        assert_eq!(point.close, 152.0);
        assert_eq!(buffer.len(instrument.id), 1);
    }

    #[test]
    fn test_chained_appends_use_previous_close() {
        let buffer = PriceHistoryBuffer::new(100);
        let instrument = test_instrument(100.0);

        buffer.append(&instrument, 105.0);
        let point = buffer.append(&instrument, 103.0);

        assert_eq!(point.open, 105.0);
        assert_eq!(point.high, 105.0);
        assert_eq!(point.low, 103.0);
        assert_eq!(point.close, 103.0);
    }

    #[test]
    fn test_capacity_evicts_oldest_first() {
        let buffer = PriceHistoryBuffer::new(5);
        let instrument = test_instrument(100.0);

        for i in 0..10 {
            buffer.append(&instrument, 100.0 + i as f64);
        }

        let points = buffer.points(instrument.id);
        assert_eq!(points.len(), 5);
        // Retained points are exactly the most recent, in arrival order
        assert_eq!(points[0].close, 105.0);
        assert_eq!(points[4].close, 109.0);
    }

    #[test]
    fn test_recent_closes_ordering() {
        let buffer = PriceHistoryBuffer::new(100);
        let instrument = test_instrument(100.0);

        for i in 0..10 {
            buffer.append(&instrument, 100.0 + i as f64);
        }

        let closes = buffer.recent_closes(instrument.id, 3);
        assert_eq!(closes, vec![107.0, 108.0, 109.0]);
    }

    #[test]
    fn test_timestamps_are_monotone() {
        let buffer = PriceHistoryBuffer::new(100);
        let instrument = test_instrument(100.0);

        for i in 0..20 {
            buffer.append(&instrument, 100.0 + i as f64);
        }

        let points = buffer.points(instrument.id);
        for pair in points.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[test]
    fn test_instruments_are_independent() {
        let buffer = PriceHistoryBuffer::new(100);
        let a = test_instrument(100.0);
        let b = test_instrument(50.0);

        buffer.append(&a, 101.0);
        buffer.append(&a, 102.0);
        buffer.append(&b, 49.0);

        assert_eq!(buffer.len(a.id), 2);
        assert_eq!(buffer.len(b.id), 1);
    }

    #[test]
    fn test_shared_handle_across_threads() {
        use std::thread;

        let buffer = PriceHistoryBuffer::new(100);
        let instrument = test_instrument(100.0);
        let buffer_clone = buffer.clone();
        let instrument_clone = instrument.clone();

        let handle = thread::spawn(move || {
            for i in 0..50 {
                buffer_clone.append(&instrument_clone, 100.0 + i as f64);
            }
        });

        for i in 50..100 {
            buffer.append(&instrument, 100.0 + i as f64);
        }

        handle.join().unwrap();
        assert_eq!(buffer.len(instrument.id), 100);
    }
}

//! Per-second accumulator owned by the sampler.

use chrono::{DateTime, Utc};

/// Running sum of the readings taken within one wall-clock second.
#[derive(Debug, Clone, PartialEq)]
pub struct SecondBucket {
    sum: f64,
    count: u32,
    second_key: i64,
}

impl SecondBucket {
    /// Start an empty bucket for the second containing `t`.
    pub fn starting_at(t: DateTime<Utc>) -> Self {
        Self {
            sum: 0.0,
            count: 0,
            second_key: second_key(t),
        }
    }

    /// Whole Unix second this bucket covers.
    pub fn second_key(&self) -> i64 {
        self.second_key
    }

    /// Whether `t` falls in a different second than this bucket.
    pub fn is_stale_at(&self, t: DateTime<Utc>) -> bool {
        second_key(t) != self.second_key
    }

    pub fn add(&mut self, voltage: f64) {
        self.sum += voltage;
        self.count += 1;
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Mean of the accumulated readings, `None` when empty.
    pub fn average(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

fn second_key(t: DateTime<Utc>) -> i64 {
    t.timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_empty_bucket_has_no_average() {
        let bucket = SecondBucket::starting_at(t0());
        assert_eq!(bucket.average(), None);
        assert_eq!(bucket.count(), 0);
    }

    #[test]
    fn test_average() {
        let mut bucket = SecondBucket::starting_at(t0());
        bucket.add(1.0);
        bucket.add(2.0);
        bucket.add(4.5);
        assert_eq!(bucket.average(), Some(2.5));
    }

    #[test]
    fn test_staleness_follows_whole_seconds() {
        let bucket = SecondBucket::starting_at(t0() + Duration::milliseconds(100));
        assert!(!bucket.is_stale_at(t0() + Duration::milliseconds(999)));
        assert!(bucket.is_stale_at(t0() + Duration::milliseconds(1000)));
        assert!(bucket.is_stale_at(t0() - Duration::milliseconds(1)));
    }
}

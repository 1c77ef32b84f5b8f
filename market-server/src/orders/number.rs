//! Order number generation
//!
//! Format: `ORD-{YYYYMMDD}-{NNNNNN}`, date in the business timezone, suffix
//! random. Uniqueness is checked against the `order_numbers` table inside the
//! persistence transaction; a collision draws a fresh candidate.

use crate::utils::time::date_stamp;
use chrono_tz::Tz;
use rand::Rng;

/// Candidates drawn before giving up
pub const MAX_ALLOCATION_ATTEMPTS: u32 = 5;

/// Source of order number candidates
pub trait OrderNumberSource: Send + Sync {
    fn candidate(&self, now: i64, timezone: Tz) -> String;
}

/// Random six-digit daily suffix
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomOrderNumbers;

impl OrderNumberSource for RandomOrderNumbers {
    fn candidate(&self, now: i64, timezone: Tz) -> String {
        let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
        format!("ORD-{}-{:06}", date_stamp(now, timezone), suffix)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Replays a fixed list of candidates, repeating the last one
    pub(crate) struct ScriptedNumbers(pub Mutex<Vec<String>>);

    impl ScriptedNumbers {
        pub(crate) fn new(numbers: &[&str]) -> Self {
            Self(Mutex::new(numbers.iter().rev().map(|s| s.to_string()).collect()))
        }
    }

    impl OrderNumberSource for ScriptedNumbers {
        fn candidate(&self, _now: i64, _timezone: Tz) -> String {
            let mut numbers = self.0.lock();
            if numbers.len() > 1 {
                numbers.pop().unwrap_or_default()
            } else {
                numbers.last().cloned().unwrap_or_default()
            }
        }
    }

    #[test]
    fn test_random_number_format() {
        // 2026-03-10 12:00 UTC
        let now = 1_773_144_000_000;
        let number = RandomOrderNumbers.candidate(now, Tz::UTC);
        assert!(number.starts_with("ORD-20260310-"), "{}", number);
        assert_eq!(number.len(), "ORD-20260310-000000".len());
    }
}

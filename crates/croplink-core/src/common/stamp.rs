//! # Generation stamps
//!
//! Every report file name ends with a [`GenerationStamp`]: a millisecond
//! timestamp plus a sequence number. Stamps drawn from one
//! [`StampGenerator`] are strictly increasing, so two renders for the same
//! report key never collide, even when they start within the same
//! millisecond.
//!
//! The textual form is fixed width (`YYYYMMDDTHHMMSSmmmZ-SSSS`, UTC), which
//! makes lexicographic order of file names equal to generation order.
//!
//! The generator packs `(millis, sequence)` into a single `u64` and advances
//! it with a compare-and-swap loop, the same layout a Snowflake ID uses.

use chrono::{DateTime, NaiveDate, Utc};
use core::{cmp, fmt, str::FromStr};
use portable_atomic::{AtomicU64, Ordering};

/// Bits reserved for the per-millisecond sequence.
pub const SEQUENCE_BITS: u32 = 12;

/// Largest sequence value within one millisecond.
pub const MAX_SEQUENCE: u16 = (1 << SEQUENCE_BITS) - 1;

/// Length of the textual stamp, e.g. `20230131T142501123Z-0000`.
pub const STAMP_LEN: usize = 24;

/// A source of wall-clock milliseconds since the Unix epoch.
pub trait TimeSource: Send + Sync {
    fn current_millis(&self) -> u64;
}

/// Reads the system clock through `chrono`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn current_millis(&self) -> u64 {
        u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// Time-ordered suffix of a report file name.
///
/// Field order matters: the derived `Ord` compares milliseconds first, then
/// the sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenerationStamp {
    millis: u64,
    sequence: u16,
}

impl GenerationStamp {
    #[must_use]
    pub const fn new(millis: u64, sequence: u16) -> Self {
        Self { millis, sequence }
    }

    #[must_use]
    pub const fn millis(&self) -> u64 {
        self.millis
    }

    #[must_use]
    pub const fn sequence(&self) -> u16 {
        self.sequence
    }

    const fn to_raw(self) -> u64 {
        (self.millis << SEQUENCE_BITS) | self.sequence as u64
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn from_raw(raw: u64) -> Self {
        Self {
            millis: raw >> SEQUENCE_BITS,
            sequence: (raw & MAX_SEQUENCE as u64) as u16,
        }
    }

    /// Wall-clock time of the stamp, or `None` if it is out of range.
    #[must_use]
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        i64::try_from(self.millis)
            .ok()
            .and_then(DateTime::from_timestamp_millis)
    }
}

impl fmt::Display for GenerationStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dt = self.datetime().unwrap_or_default();
        write!(
            f,
            "{}{:03}Z-{:04}",
            dt.format("%Y%m%dT%H%M%S"),
            self.millis % 1000,
            self.sequence
        )
    }
}

/// Returned when a file name suffix is not a well-formed stamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InvalidStamp;

impl fmt::Display for InvalidStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid generation stamp")
    }
}

impl core::error::Error for InvalidStamp {}

impl FromStr for GenerationStamp {
    type Err = InvalidStamp;

    /// Parses the exact fixed-width form produced by `Display`. Anything
    /// else, including stamps with extra padding, is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let b = s.as_bytes();
        if !s.is_ascii() || b.len() != STAMP_LEN || b[8] != b'T' || b[18] != b'Z' || b[19] != b'-' {
            return Err(InvalidStamp);
        }
        let digits = |range: core::ops::Range<usize>| -> Result<u32, InvalidStamp> {
            let part = &s[range];
            if part.bytes().all(|c| c.is_ascii_digit()) {
                part.parse().map_err(|_| InvalidStamp)
            } else {
                Err(InvalidStamp)
            }
        };

        let year = i32::try_from(digits(0..4)?).map_err(|_| InvalidStamp)?;
        let date = NaiveDate::from_ymd_opt(year, digits(4..6)?, digits(6..8)?).ok_or(InvalidStamp)?;
        let dt = date
            .and_hms_milli_opt(digits(9..11)?, digits(11..13)?, digits(13..15)?, digits(15..18)?)
            .ok_or(InvalidStamp)?
            .and_utc();
        let millis = u64::try_from(dt.timestamp_millis()).map_err(|_| InvalidStamp)?;
        let sequence = u16::try_from(digits(20..24)?).map_err(|_| InvalidStamp)?;
        if sequence > MAX_SEQUENCE {
            return Err(InvalidStamp);
        }
        Ok(Self { millis, sequence })
    }
}

/// Outcome of a single generation attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StampStatus {
    Ready { stamp: GenerationStamp },
    /// Retry after `yield_for` milliseconds; `0` means another thread won
    /// the race and the caller can retry immediately.
    Pending { yield_for: u64 },
}

/// Lock-free generator of strictly increasing [`GenerationStamp`]s.
///
/// If the wall clock steps backwards the generator keeps counting from the
/// last issued millisecond instead of waiting for the clock to catch up.
#[derive(Debug)]
pub struct StampGenerator<T = SystemClock>
where
    T: TimeSource,
{
    state: AtomicU64,
    time: T,
}

impl Default for StampGenerator<SystemClock> {
    fn default() -> Self {
        Self::new(SystemClock)
    }
}

impl<T> StampGenerator<T>
where
    T: TimeSource,
{
    pub const fn new(time: T) -> Self {
        Self {
            state: AtomicU64::new(0),
            time,
        }
    }

    /// Attempts to issue the next stamp without blocking.
    pub fn try_next(&self) -> StampStatus {
        let current_raw = self.state.load(Ordering::Relaxed);
        let current = GenerationStamp::from_raw(current_raw);
        let now = cmp::max(self.time.current_millis(), current.millis);

        let next = if current_raw == 0 || now > current.millis {
            GenerationStamp::new(now, 0)
        } else if current.sequence < MAX_SEQUENCE {
            GenerationStamp::new(now, current.sequence + 1)
        } else {
            return StampStatus::Pending { yield_for: 1 };
        };

        if self
            .state
            .compare_exchange(
                current_raw,
                next.to_raw(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            )
            .is_ok()
        {
            StampStatus::Ready { stamp: next }
        } else {
            StampStatus::Pending { yield_for: 0 }
        }
    }

    /// Issues the next stamp, yielding the thread while the current
    /// millisecond is exhausted or another thread wins the race.
    pub fn next_stamp(&self) -> GenerationStamp {
        loop {
            match self.try_next() {
                StampStatus::Ready { stamp } => break stamp,
                StampStatus::Pending { yield_for: 0 } => core::hint::spin_loop(),
                StampStatus::Pending { .. } => std::thread::yield_now(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::AtomicU64 as StdAtomicU64;

    struct MockTime {
        millis: StdAtomicU64,
    }

    impl MockTime {
        fn at(millis: u64) -> Self {
            Self {
                millis: StdAtomicU64::new(millis),
            }
        }

        fn set(&self, millis: u64) {
            self.millis.store(millis, std::sync::atomic::Ordering::SeqCst);
        }
    }

    impl TimeSource for MockTime {
        fn current_millis(&self) -> u64 {
            self.millis.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    impl TimeSource for Arc<MockTime> {
        fn current_millis(&self) -> u64 {
            self.as_ref().current_millis()
        }
    }

    // 2023-01-31T14:25:01.123Z
    const T0: u64 = 1_675_175_101_123;

    #[test]
    fn sequence_increments_within_same_tick() {
        let generator = StampGenerator::new(MockTime::at(T0));
        let a = generator.next_stamp();
        let b = generator.next_stamp();
        let c = generator.next_stamp();

        assert_eq!(a, GenerationStamp::new(T0, 0));
        assert_eq!(b, GenerationStamp::new(T0, 1));
        assert_eq!(c, GenerationStamp::new(T0, 2));
        assert!(a < b && b < c);
    }

    #[test]
    fn sequence_resets_when_clock_advances() {
        let time = Arc::new(MockTime::at(T0));
        let generator = StampGenerator::new(Arc::clone(&time));
        generator.next_stamp();
        generator.next_stamp();
        time.set(T0 + 5);
        assert_eq!(generator.next_stamp(), GenerationStamp::new(T0 + 5, 0));
    }

    #[test]
    fn clock_going_backwards_stays_monotonic() {
        let time = Arc::new(MockTime::at(T0));
        let generator = StampGenerator::new(Arc::clone(&time));
        let before = generator.next_stamp();
        time.set(T0 - 1_000);
        let after = generator.next_stamp();
        assert!(after > before);
        assert_eq!(after.millis(), T0);
    }

    #[test]
    fn pending_when_sequence_exhausted() {
        let generator = StampGenerator::new(MockTime::at(T0));
        for i in 0..=MAX_SEQUENCE {
            match generator.try_next() {
                StampStatus::Ready { stamp } => assert_eq!(stamp.sequence(), i),
                StampStatus::Pending { .. } => panic!("unexpected pending at {i}"),
            }
        }
        assert_eq!(generator.try_next(), StampStatus::Pending { yield_for: 1 });
    }

    #[test]
    fn concurrent_stamps_are_unique() {
        let generator = Arc::new(StampGenerator::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let generator = Arc::clone(&generator);
                std::thread::spawn(move || {
                    (0..2_000)
                        .map(|_| generator.next_stamp())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            let stamps = handle.join().unwrap();
            assert!(stamps.windows(2).all(|w| w[0] < w[1]));
            for stamp in stamps {
                assert!(seen.insert(stamp), "duplicate stamp {stamp}");
            }
        }
        assert_eq!(seen.len(), 16_000);
    }

    #[test]
    fn display_is_fixed_width_utc() {
        let stamp = GenerationStamp::new(T0, 7);
        let text = stamp.to_string();
        assert_eq!(text, "20230131T142501123Z-0007");
        assert_eq!(text.len(), STAMP_LEN);
        assert_eq!(text.parse::<GenerationStamp>(), Ok(stamp));
    }

    #[test]
    fn text_order_matches_stamp_order() {
        let stamps = [
            GenerationStamp::new(T0, 10),
            GenerationStamp::new(T0, 9),
            GenerationStamp::new(T0 + 1, 0),
            GenerationStamp::new(T0 - 86_400_000, MAX_SEQUENCE),
        ];
        let mut by_text: Vec<_> = stamps.iter().map(ToString::to_string).collect();
        by_text.sort();
        let mut by_value = stamps.to_vec();
        by_value.sort();
        let by_value: Vec<_> = by_value.iter().map(ToString::to_string).collect();
        assert_eq!(by_text, by_value);
    }

    #[test]
    fn rejects_malformed_stamps() {
        for bad in [
            "",
            "20230131T142501123Z",
            "20230131T142501123Z-00007",
            "20231331T142501123Z-0000",
            "20230131T142501123Z-9999",
            "2023013lT142501123Z-0000",
            "20230131 142501123Z-0000",
            "+2023013T142501123Z-0000",
        ] {
            assert_eq!(bad.parse::<GenerationStamp>(), Err(InvalidStamp), "{bad}");
        }
    }
}

//! Test records and the id strategies used to key them.

use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Number of random bytes behind each payload.
pub const PAYLOAD_BYTES: usize = 64;

/// Offset between the Gregorian reform (1582-10-15) and the unix epoch in
/// 100 ns ticks.
const GREGORIAN_OFFSET_TICKS: u64 = 122_192_928_000_000_000;

/// How record ids are derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum IdStrategy {
    /// Random version 4 UUID.
    #[default]
    RandomV4,
    /// Timestamp-prefixed UUID; ids sort in `created_at` order.
    TimeOrdered,
}

impl IdStrategy {
    /// Derive an id for a record created at `created_at` with payload bytes
    /// `payload`.
    ///
    /// `TimeOrdered` is a pure function of its inputs: the high half holds the
    /// timestamp, the low half is taken from the payload.
    pub fn generate<R: Rng>(
        &self,
        created_at: DateTime<Utc>,
        payload: &[u8; PAYLOAD_BYTES],
        rng: &mut R,
    ) -> Uuid {
        match self {
            IdStrategy::RandomV4 => {
                let mut bytes = [0u8; 16];
                rng.fill(&mut bytes);
                bytes[6] = (bytes[6] & 0x0f) | 0x40; // Version 4
                bytes[8] = (bytes[8] & 0x3f) | 0x80; // Variant RFC 4122
                Uuid::from_bytes(bytes)
            }
            IdStrategy::TimeOrdered => time_ordered_uuid(created_at, payload),
        }
    }
}

fn time_ordered_uuid(created_at: DateTime<Utc>, payload: &[u8; PAYLOAD_BYTES]) -> Uuid {
    let unix_ticks = created_at
        .timestamp_nanos_opt()
        .map(|nanos| nanos.div_euclid(100))
        .unwrap_or_default();
    let ticks = u64::try_from(unix_ticks)
        .unwrap_or_default()
        .saturating_add(GREGORIAN_OFFSET_TICKS);

    let mut bytes = [0u8; 16];
    let high = ticks.to_be_bytes();
    bytes[0] = (high[0] & 0x0f) | 0x10; // Version 1 nibble
    bytes[1..8].copy_from_slice(&high[1..8]);
    bytes[8..16].copy_from_slice(&payload[..8]);
    bytes[8] = (bytes[8] & 0x3f) | 0x80; // Variant RFC 4122
    Uuid::from_bytes(bytes)
}

/// A row written by the insert loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Upper-case hex of [`PAYLOAD_BYTES`] random bytes.
    pub payload: String,
}

impl TestRecord {
    /// Build one record.
    pub fn generate<R: Rng>(strategy: IdStrategy, created_at: DateTime<Utc>, rng: &mut R) -> Self {
        let mut bytes = [0u8; PAYLOAD_BYTES];
        rng.fill(&mut bytes);
        let id = strategy.generate(created_at, &bytes, rng);
        Self {
            id,
            created_at,
            payload: hex::encode_upper(bytes),
        }
    }

    /// Build `count` records whose timestamps are `start + step`,
    /// `start + 2 * step`, and so on.
    pub fn range<R: Rng>(
        strategy: IdStrategy,
        count: u64,
        start: DateTime<Utc>,
        step: Duration,
        rng: &mut R,
    ) -> Vec<Self> {
        let step = TimeDelta::from_std(step).unwrap_or(TimeDelta::MAX);
        let mut records = Vec::with_capacity(usize::try_from(count).unwrap_or_default());
        let mut created_at = start;
        for _ in 0..count {
            created_at = created_at.checked_add_signed(step).unwrap_or(created_at);
            records.push(Self::generate(strategy, created_at, rng));
        }
        records
    }
}

/// Produces consecutive insert batches, each continuing from the last
/// timestamp handed out.
#[derive(Debug, Clone)]
pub struct RecordGenerator {
    strategy: IdStrategy,
    step: Duration,
    last_created_at: DateTime<Utc>,
}

impl RecordGenerator {
    pub fn new(strategy: IdStrategy, start: DateTime<Utc>, step: Duration) -> Self {
        Self {
            strategy,
            step,
            last_created_at: start,
        }
    }

    /// Generate the next `count` records.
    pub fn next_batch<R: Rng>(&mut self, count: u64, rng: &mut R) -> Vec<TestRecord> {
        let batch = TestRecord::range(self.strategy, count, self.last_created_at, self.step, rng);
        if let Some(last) = batch.last() {
            self.last_created_at = last.created_at;
        }
        batch
    }

    /// Timestamp the next batch continues from.
    pub fn last_created_at(&self) -> DateTime<Utc> {
        self.last_created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_range_timestamps() {
        let mut rng = StdRng::seed_from_u64(1);
        let records = TestRecord::range(
            IdStrategy::RandomV4,
            3,
            start(),
            Duration::from_millis(100),
            &mut rng,
        );

        let times: Vec<_> = records.iter().map(|r| r.created_at).collect();
        assert_eq!(
            times,
            vec![
                start() + TimeDelta::milliseconds(100),
                start() + TimeDelta::milliseconds(200),
                start() + TimeDelta::milliseconds(300),
            ]
        );
    }

    #[test]
    fn test_payload_format() {
        let mut rng = StdRng::seed_from_u64(2);
        let record = TestRecord::generate(IdStrategy::RandomV4, start(), &mut rng);

        assert_eq!(record.payload.len(), PAYLOAD_BYTES * 2);
        assert!(record
            .payload
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        assert_eq!(record.id.get_version_num(), 4);
    }

    #[test]
    fn test_payload_decodes_to_id_tail() {
        let mut rng = StdRng::seed_from_u64(5);
        let record = TestRecord::generate(IdStrategy::TimeOrdered, start(), &mut rng);

        let bytes = hex::decode(&record.payload).unwrap();
        assert_eq!(bytes.len(), PAYLOAD_BYTES);
        assert_eq!(hex::encode_upper(&bytes), record.payload);
        assert_eq!(&record.id.as_bytes()[9..16], &bytes[1..8]);
    }

    #[test]
    fn test_generator_continues_from_last_batch() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut generator =
            RecordGenerator::new(IdStrategy::RandomV4, start(), Duration::from_secs(1));

        let first = generator.next_batch(2, &mut rng);
        let second = generator.next_batch(2, &mut rng);

        assert_eq!(first[1].created_at, start() + TimeDelta::seconds(2));
        assert_eq!(second[0].created_at, start() + TimeDelta::seconds(3));
        assert_eq!(generator.last_created_at(), start() + TimeDelta::seconds(4));

        let empty = generator.next_batch(0, &mut rng);
        assert!(empty.is_empty());
        assert_eq!(generator.last_created_at(), start() + TimeDelta::seconds(4));
    }

    #[test]
    fn test_time_ordered_ids_sort_by_timestamp() {
        let mut rng = StdRng::seed_from_u64(4);
        let records = TestRecord::range(
            IdStrategy::TimeOrdered,
            50,
            start(),
            Duration::from_millis(1),
            &mut rng,
        );

        for pair in records.windows(2) {
            assert!(pair[0].id < pair[1].id);
        }
        let id = records[0].id.as_bytes();
        assert_eq!(id[0] >> 4, 1);
        assert_eq!(id[8] & 0xc0, 0x80);
    }

    #[test]
    fn test_time_ordered_is_deterministic() {
        let payload = [7u8; PAYLOAD_BYTES];
        let mut rng_a = StdRng::seed_from_u64(10);
        let mut rng_b = StdRng::seed_from_u64(99);

        let a = IdStrategy::TimeOrdered.generate(start(), &payload, &mut rng_a);
        let b = IdStrategy::TimeOrdered.generate(start(), &payload, &mut rng_b);
        assert_eq!(a, b);
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let mut rng_a = StdRng::seed_from_u64(42);
        let mut rng_b = StdRng::seed_from_u64(42);
        let step = Duration::from_secs(1);
        let a = TestRecord::range(IdStrategy::RandomV4, 5, start(), step, &mut rng_a);
        let b = TestRecord::range(IdStrategy::RandomV4, 5, start(), step, &mut rng_b);
        assert_eq!(a, b);
    }
}

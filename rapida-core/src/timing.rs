use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Instant relative to the Unix epoch, split into whole seconds and the
/// remaining milliseconds (always 0..=999).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnixTimestamp {
    pub seconds: i64,
    pub milliseconds: i64,
}

impl UnixTimestamp {
    pub fn from_millis(ms: i64) -> Self {
        Self {
            seconds: ms.div_euclid(1000),
            milliseconds: ms.rem_euclid(1000),
        }
    }

    pub fn as_millis(&self) -> i64 {
        self.seconds * 1000 + self.milliseconds
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    pub start_time: UnixTimestamp,
    pub end_time: UnixTimestamp,
}

impl Timing {
    /// `end < start` is carried through as-is.
    pub fn from_millis(start_ms: i64, end_ms: i64) -> Self {
        Self {
            start_time: UnixTimestamp::from_millis(start_ms),
            end_time: UnixTimestamp::from_millis(end_ms),
        }
    }

    pub fn elapsed_ms(&self) -> i64 {
        self.end_time.as_millis() - self.start_time.as_millis()
    }
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn splits_seconds_and_millis() {
        let ts = UnixTimestamp::from_millis(1_700_000_123_456);
        assert_eq!(ts.seconds, 1_700_000_123);
        assert_eq!(ts.milliseconds, 456);
    }

    #[test]
    fn round_trips_for_sampled_instants() {
        for ms in [0_i64, 1, 999, 1000, 1001, 59_999, 1_699_999_999_999, -1, -1500] {
            let ts = UnixTimestamp::from_millis(ms);
            assert!((0..1000).contains(&ts.milliseconds), "{ms}");
            assert_eq!(ts.seconds * 1000 + ts.milliseconds, ms);
        }
    }

    #[test]
    fn end_before_start_is_propagated() {
        let t = Timing::from_millis(5_000, 4_250);
        assert_eq!(t.start_time, UnixTimestamp { seconds: 5, milliseconds: 0 });
        assert_eq!(t.end_time, UnixTimestamp { seconds: 4, milliseconds: 250 });
        assert_eq!(t.elapsed_ms(), -750);
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let t = Timing::from_millis(1_001, 2_002);
        assert_eq!(
            serde_json::to_value(t).unwrap(),
            json!({
                "startTime": {"seconds": 1, "milliseconds": 1},
                "endTime": {"seconds": 2, "milliseconds": 2}
            })
        );
    }

    #[test]
    fn now_is_after_2020() {
        assert!(now_ms() > 1_577_836_800_000);
    }
}

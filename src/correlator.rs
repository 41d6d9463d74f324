use core::future::Future;

use embassy_time::{with_timeout, Duration, Instant};

use crate::{TwtError, TwtResult};

/// A source for both clocks, that the schedule has to correlate.
///
/// The TSF lives in the radio and has to be requested, while the local clock can be read at
/// any time.
pub trait TimeSource {
    /// The local monotonic clock in microseconds.
    fn now_us(&self) -> u64 {
        Instant::now().as_micros()
    }
    /// Request the current TSF from the hardware.
    ///
    /// A TSF of zero is treated as if the hardware didn't answer.
    fn query_tsf(&self) -> impl Future<Output = TwtResult<u64>>;
}

/// Query the TSF, giving up after `timeout_us`.
pub(crate) async fn query_tsf_with_timeout<T: TimeSource>(
    time_source: &T,
    timeout_us: u64,
) -> TwtResult<u64> {
    match with_timeout(Duration::from_micros(timeout_us), time_source.query_tsf()).await {
        Ok(Ok(0)) | Err(_) => Err(TwtError::TimestampTimeout),
        Ok(result) => result,
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// The mapping between TSF and local time.
///
/// Both clocks are sampled at the start of the schedule and then once per base interval. The
/// differences are measured against where the clocks should be after `epoch` ideal intervals.
pub struct ClockAnchors {
    pub start_tsf: u64,
    pub start_time_us: u64,
    /// TSF at the most recent epoch boundary.
    pub tsf: u64,
    /// Local time at the most recent epoch boundary.
    pub time_us: u64,
    /// How far the TSF is ahead of the ideal schedule.
    pub tsf_diff: i64,
    /// How far the local clock is ahead of the ideal schedule.
    pub time_diff: i64,
    /// Number of base intervals since the start.
    pub epoch: u64,
}
impl ClockAnchors {
    pub const fn new(tsf: u64, time_us: u64) -> Self {
        Self {
            start_tsf: tsf,
            start_time_us: time_us,
            tsf,
            time_us,
            tsf_diff: 0,
            time_diff: 0,
            epoch: 0,
        }
    }
    /// The TSF to assume, if the hardware doesn't answer.
    pub const fn fallback_tsf(&self, interval_us: u64) -> u64 {
        self.tsf + interval_us
    }
    /// Move on to the next epoch, with the clocks sampled at its boundary.
    pub fn advance(&mut self, tsf: u64, time_us: u64, interval_us: u64) {
        self.epoch += 1;
        let ideal = self.epoch * interval_us;
        self.tsf_diff = tsf.wrapping_sub(self.start_tsf).wrapping_sub(ideal) as i64;
        self.time_diff = time_us.wrapping_sub(self.start_time_us).wrapping_sub(ideal) as i64;
        self.tsf = tsf;
        self.time_us = time_us;
    }
    /// The local time at which the next epoch boundary should be sampled.
    ///
    /// This is anchored to the start of the schedule, so the error of a single tick doesn't
    /// accumulate. If the TSF runs ahead, the deadline moves forward by the same amount.
    pub fn next_deadline_us(&self, interval_us: u64) -> u64 {
        let ideal = self.start_time_us + (self.epoch + 1) * interval_us;
        ideal.saturating_add_signed(0i64.saturating_sub(self.tsf_diff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: u64 = 1_000_000;

    #[test]
    fn ideal_ticks_have_no_drift() {
        let mut anchors = ClockAnchors::new(50_000_000, 3_000_000);
        for epoch in 1..=3 {
            let fallback = anchors.fallback_tsf(INTERVAL);
            anchors.advance(fallback, 3_000_000 + epoch * INTERVAL, INTERVAL);
        }
        assert_eq!(anchors.epoch, 3);
        assert_eq!(anchors.tsf, 53_000_000);
        assert_eq!(anchors.tsf_diff, 0);
        assert_eq!(anchors.time_diff, 0);
        assert_eq!(anchors.next_deadline_us(INTERVAL), 7_000_000);
    }

    #[test]
    fn drift_shifts_deadline() {
        let mut anchors = ClockAnchors::new(50_000_000, 3_000_000);
        // TSF ran 200 µs fast, the local tick came 50 µs late.
        anchors.advance(51_000_200, 4_000_050, INTERVAL);
        assert_eq!(anchors.tsf_diff, 200);
        assert_eq!(anchors.time_diff, 50);
        assert_eq!(anchors.next_deadline_us(INTERVAL), 4_999_800);

        anchors.advance(51_999_900, 5_000_000, INTERVAL);
        assert_eq!(anchors.tsf_diff, -100);
        assert_eq!(anchors.next_deadline_us(INTERVAL), 6_000_100);
    }
}

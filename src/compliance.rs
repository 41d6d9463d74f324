//! Tracking how well stations stick to their agreed service periods.
//!
//! Every wake and sleep transition of a station is compared against the ideal instant of its
//! slot in the current epoch. The offset is positive, if the station was early.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// How a single transition related to the ideal instant.
pub enum TransitionTiming {
    /// Within the compliance margin.
    OnTime,
    /// Before the ideal instant, but by no more than a service period.
    Early,
    /// After the ideal instant, but by no more than a service period.
    Late,
    /// Off by more than a service period. Carries the offset in microseconds.
    Bad(i64),
}
impl TransitionTiming {
    fn classify(offset_us: i64, service_period_us: u64, margin_us: u64) -> Self {
        let distance = offset_us.unsigned_abs();
        if distance > service_period_us {
            Self::Bad(offset_us)
        } else if distance <= margin_us {
            Self::OnTime
        } else if offset_us > 0 {
            Self::Early
        } else {
            Self::Late
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Counters for one kind of transition.
pub struct TransitionCounters {
    pub ok: u32,
    pub early: u32,
    pub late: u32,
    pub bad: u32,
    /// Offset of the most recent bad transition.
    pub last_bad_offset_us: i64,
}
impl TransitionCounters {
    fn record(&mut self, timing: TransitionTiming) {
        match timing {
            TransitionTiming::OnTime => self.ok += 1,
            TransitionTiming::Early => self.early += 1,
            TransitionTiming::Late => self.late += 1,
            TransitionTiming::Bad(offset_us) => {
                self.bad += 1;
                self.last_bad_offset_us = offset_us;
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Compliance statistics of one flow.
pub struct ComplianceStat {
    pub wake: TransitionCounters,
    pub sleep: TransitionCounters,
    /// Running mean of the realized service duration.
    pub average_service_us: u64,
    pub sample_count: u64,
    in_service: bool,
    service_start_us: u64,
}

/// Where a slot lies in local time during the current epoch.
pub(crate) struct SlotTiming {
    /// Local time of the last epoch boundary.
    pub epoch_time_us: u64,
    pub index: usize,
    pub last_index: usize,
    pub service_period_us: u64,
    pub interval_us: u64,
    pub margin_us: u64,
}
impl SlotTiming {
    fn ideal_wake_us(&self, now_us: u64) -> i64 {
        let mut ideal = (self.epoch_time_us + self.index as u64 * self.service_period_us) as i64;
        let slack = self.interval_us.saturating_sub(self.service_period_us) as i64;
        // The first slot of the next epoch can begin before the epoch boundary has been observed.
        if self.index == 0 && now_us as i64 - ideal > slack {
            ideal += self.interval_us as i64;
        }
        ideal
    }
    fn ideal_sleep_us(&self, now_us: u64) -> i64 {
        let mut ideal =
            (self.epoch_time_us + (self.index as u64 + 1) * self.service_period_us) as i64;
        let slack = self.interval_us.saturating_sub(self.service_period_us) as i64;
        // The last slot ends on the epoch boundary, which may already have been observed.
        if self.index == self.last_index && ideal - now_us as i64 > slack {
            ideal -= self.interval_us as i64;
        }
        ideal
    }
}

impl ComplianceStat {
    /// Whether the station is currently inside its service period.
    pub fn in_service(&self) -> bool {
        self.in_service
    }
    /// Record the station waking up at `now_us`.
    ///
    /// Returns [None] if the station was already awake.
    pub(crate) fn on_wake(&mut self, timing: &SlotTiming, now_us: u64) -> Option<TransitionTiming> {
        if self.in_service {
            return None;
        }
        self.in_service = true;
        self.service_start_us = now_us;
        let offset_us = timing.ideal_wake_us(now_us) - now_us as i64;
        let result =
            TransitionTiming::classify(offset_us, timing.service_period_us, timing.margin_us);
        self.wake.record(result);
        Some(result)
    }
    /// Record the station going to sleep at `now_us`.
    ///
    /// Returns [None] if the station wasn't awake.
    pub(crate) fn on_sleep(
        &mut self,
        timing: &SlotTiming,
        now_us: u64,
    ) -> Option<TransitionTiming> {
        if !self.in_service {
            return None;
        }
        self.in_service = false;
        let service_us = now_us.saturating_sub(self.service_start_us);
        self.average_service_us = ((self.average_service_us as u128
            * self.sample_count as u128
            + service_us as u128)
            / (self.sample_count as u128 + 1)) as u64;
        self.sample_count += 1;
        self.service_start_us = 0;
        let offset_us = timing.ideal_sleep_us(now_us) - now_us as i64;
        let result =
            TransitionTiming::classify(offset_us, timing.service_period_us, timing.margin_us);
        self.sleep.record(result);
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(index: usize, service_period_us: u64) -> SlotTiming {
        SlotTiming {
            epoch_time_us: 10_000_000,
            index,
            last_index: 3,
            service_period_us,
            interval_us: 1_000_000,
            margin_us: 10_000,
        }
    }

    #[test]
    fn wake_classification() {
        let timing = timing(1, 100_000);
        let cases = [
            (10_100_000, TransitionTiming::OnTime),
            (10_050_000, TransitionTiming::Early),
            (10_150_000, TransitionTiming::Late),
            (10_300_000, TransitionTiming::Bad(-200_000)),
        ];
        let mut stat = ComplianceStat::default();
        for (now_us, expected) in cases {
            assert_eq!(stat.on_wake(&timing, now_us), Some(expected));
            stat.on_sleep(&timing, now_us + 50_000);
        }
        assert_eq!(
            stat.wake,
            TransitionCounters {
                ok: 1,
                early: 1,
                late: 1,
                bad: 1,
                last_bad_offset_us: -200_000
            }
        );
    }

    #[test]
    fn repeated_transitions_are_ignored() {
        let timing = timing(1, 100_000);
        let mut stat = ComplianceStat::default();
        assert_eq!(stat.on_sleep(&timing, 10_000_000), None);
        assert!(stat.on_wake(&timing, 10_100_000).is_some());
        assert_eq!(stat.on_wake(&timing, 10_120_000), None);
        assert!(stat.in_service());
        assert_eq!(stat.wake.ok, 1);
    }

    #[test]
    fn average_service_duration() {
        let timing = timing(1, 100_000);
        let mut stat = ComplianceStat::default();
        stat.on_wake(&timing, 10_100_000);
        assert_eq!(
            stat.on_sleep(&timing, 10_200_000),
            Some(TransitionTiming::OnTime)
        );
        assert_eq!(stat.average_service_us, 100_000);
        stat.on_wake(&timing, 10_100_000);
        stat.on_sleep(&timing, 10_150_000);
        assert_eq!(stat.average_service_us, 75_000);
        assert_eq!(stat.sample_count, 2);
        assert_eq!(stat.sleep.early, 1);
    }

    #[test]
    fn first_slot_of_next_epoch() {
        // The station wakes for the next epoch, before the correlator has ticked.
        let timing = timing(0, 100_000);
        let mut stat = ComplianceStat::default();
        assert_eq!(
            stat.on_wake(&timing, 10_950_000),
            Some(TransitionTiming::Early)
        );
    }

    #[test]
    fn last_slot_of_previous_epoch() {
        // The correlator has already ticked, when the last station goes to sleep.
        let timing = SlotTiming {
            epoch_time_us: 11_000_000,
            ..timing(3, 250_000)
        };
        let mut stat = ComplianceStat::default();
        stat.on_wake(&timing, 10_750_000);
        assert_eq!(
            stat.on_sleep(&timing, 11_005_000),
            Some(TransitionTiming::OnTime)
        );
    }

    #[test]
    fn sleep_classification() {
        let timing = timing(1, 100_000);
        let cases = [
            (10_200_000, TransitionTiming::OnTime),
            (10_250_000, TransitionTiming::Late),
            (10_150_000, TransitionTiming::Early),
            (10_450_000, TransitionTiming::Bad(-250_000)),
        ];
        let mut stat = ComplianceStat::default();
        for (now_us, expected) in cases {
            stat.on_wake(&timing, 10_100_000);
            assert_eq!(stat.on_sleep(&timing, now_us), Some(expected));
        }
        assert_eq!(
            stat.sleep,
            TransitionCounters {
                ok: 1,
                early: 1,
                late: 1,
                bad: 1,
                last_bad_offset_us: -250_000
            }
        );
        assert_eq!(stat.wake.ok, 4);
    }

    #[test]
    fn service_period_longer_than_interval() {
        let timing = SlotTiming {
            index: 0,
            last_index: 0,
            service_period_us: 1_234_567,
            interval_us: 1_234_560,
            ..timing(0, 0)
        };
        let mut stat = ComplianceStat::default();
        assert_eq!(
            stat.on_wake(&timing, 10_000_000),
            Some(TransitionTiming::OnTime)
        );
        assert_eq!(
            stat.on_sleep(&timing, 11_234_567),
            Some(TransitionTiming::OnTime)
        );
    }
}

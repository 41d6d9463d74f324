use macro_bits::serializable_enum;

use crate::{interval::TwtInterval, TwtError, TwtResult};

pub const TWT_MSEC: u64 = 1000;
pub const TWT_SECOND: u64 = 1000 * TWT_MSEC;

serializable_enum! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    /// How stations are distributed over the slots.
    pub enum SchedulingAlgorithm: u8 {
        /// Fill all slots evenly, before putting a second station into any of them.
        #[default]
        Balanced => 0,
        /// Fill the first slot with free room.
        Fcfs => 1
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Parameters for setting up the [Schedule](crate::Schedule).
///
/// Of [Self::service_period_us], [Self::slot_count] and [Self::interval_us], one may be left at
/// zero, in which case it's derived from the other two.
pub struct ScheduleConfig {
    /// The length of one slot.
    pub service_period_us: u64,
    /// The total number of stations, that can be served.
    pub slot_count: u32,
    /// The base wake interval.
    pub interval_us: u64,
    /// How many stations share a slot. Zero is treated as one.
    pub group_size: u32,
    pub algorithm: SchedulingAlgorithm,
    /// Minimum lead time between a negotiation and the wake time handed out in it.
    pub wake_lead_us: u64,
    /// Deviations from the ideal wake or sleep instant up to this are considered on time.
    pub compliance_margin_us: u64,
    /// How long to wait for the hardware to answer a TSF query.
    pub tsf_query_timeout_us: u64,
}
impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            service_period_us: 0,
            slot_count: 0,
            interval_us: 0,
            group_size: 1,
            algorithm: SchedulingAlgorithm::Balanced,
            wake_lead_us: TWT_SECOND,
            compliance_margin_us: TWT_SECOND,
            tsf_query_timeout_us: 100 * TWT_MSEC,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// A [ScheduleConfig] with all derived values filled in.
pub(crate) struct ResolvedConfig {
    pub service_period_us: u64,
    pub slot_count: u32,
    pub group_size: u32,
    /// The base interval as it's actually representable on the wire.
    pub interval: TwtInterval,
    pub algorithm: SchedulingAlgorithm,
    pub wake_lead_us: u64,
    pub compliance_margin_us: u64,
    pub tsf_query_timeout_us: u64,
}
impl ResolvedConfig {
    pub fn interval_us(&self) -> u64 {
        self.interval.as_micros()
    }
    /// The number of slot entries in the pool.
    pub fn entry_count(&self) -> usize {
        (self.slot_count / self.group_size) as usize
    }
}

impl ScheduleConfig {
    /// Derive the missing parameter and check, that everything fits together.
    pub(crate) fn resolve(&self) -> TwtResult<ResolvedConfig> {
        let group_size = self.group_size.max(1);
        let (mut sp, mut num, mut interval) =
            (self.service_period_us, self.slot_count, self.interval_us);
        let zeroes = [sp, num as u64, interval]
            .iter()
            .filter(|value| **value == 0)
            .count();
        if zeroes > 1 {
            return Err(TwtError::ConfigInvalid);
        }
        if interval == 0 {
            interval = sp
                .checked_mul((num / group_size) as u64)
                .ok_or(TwtError::ConfigInvalid)?;
        } else if num == 0 {
            num = u32::try_from(interval / sp)
                .ok()
                .and_then(|entries| entries.checked_mul(group_size))
                .ok_or(TwtError::ConfigInvalid)?;
        } else if sp == 0 {
            sp = interval / (num / group_size).max(1) as u64;
        } else if sp.saturating_mul((num / group_size) as u64) > interval {
            return Err(TwtError::ConfigInvalid);
        }
        if sp == 0 || num / group_size == 0 || interval == 0 {
            return Err(TwtError::ConfigInvalid);
        }
        let entries = (num / group_size) as u64;
        let interval = TwtInterval::encode(interval)?;
        if self.service_period_us == 0 {
            sp = interval.as_micros() / entries;
        }
        // The encoded interval may be shorter than the requested one.
        if sp == 0
            || interval.as_micros() == 0
            || sp
                .checked_mul(entries)
                .map_or(true, |slots| slots > interval.as_micros())
        {
            return Err(TwtError::ConfigInvalid);
        }
        Ok(ResolvedConfig {
            service_period_us: sp,
            slot_count: num,
            group_size,
            interval,
            algorithm: self.algorithm,
            wake_lead_us: self.wake_lead_us,
            compliance_margin_us: self.compliance_margin_us,
            tsf_query_timeout_us: self.tsf_query_timeout_us,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(service_period_us: u64, slot_count: u32, interval_us: u64) -> ScheduleConfig {
        ScheduleConfig {
            service_period_us,
            slot_count,
            interval_us,
            ..Default::default()
        }
    }

    #[test]
    fn interval_is_derived() {
        let resolved = config(250_000, 4, 0).resolve().unwrap();
        assert_eq!(resolved.interval_us(), 1_000_000);
        assert_eq!(resolved.entry_count(), 4);
    }

    #[test]
    fn slot_count_is_derived() {
        let resolved = ScheduleConfig {
            group_size: 2,
            ..config(250_000, 0, 1_000_000)
        }
        .resolve()
        .unwrap();
        assert_eq!(resolved.slot_count, 8);
        assert_eq!(resolved.entry_count(), 4);
    }

    #[test]
    fn service_period_is_derived() {
        let resolved = ScheduleConfig {
            group_size: 4,
            ..config(0, 4, 1_000_000)
        }
        .resolve()
        .unwrap();
        assert_eq!(resolved.service_period_us, 1_000_000);
        assert_eq!(resolved.entry_count(), 1);
    }

    #[test]
    fn zero_group_size_is_one() {
        let resolved = ScheduleConfig {
            group_size: 0,
            ..config(250_000, 4, 0)
        }
        .resolve()
        .unwrap();
        assert_eq!(resolved.group_size, 1);
    }

    #[test]
    fn invalid_combinations() {
        assert_eq!(config(0, 0, 1_000_000).resolve(), Err(TwtError::ConfigInvalid));
        assert_eq!(config(0, 0, 0).resolve(), Err(TwtError::ConfigInvalid));
        // Four slots of 300 ms don't fit into one second.
        assert_eq!(
            config(300_000, 4, 1_000_000).resolve(),
            Err(TwtError::ConfigInvalid)
        );
        // Not even a single group.
        assert_eq!(
            ScheduleConfig {
                group_size: 8,
                ..config(0, 4, 1_000_000)
            }
            .resolve(),
            Err(TwtError::ConfigInvalid)
        );
        assert_eq!(
            config(u64::MAX / 4, 4, 0).resolve(),
            Err(TwtError::IntervalOutOfRange)
        );
    }

    #[test]
    fn interval_is_made_representable() {
        let resolved = config(100_000, 0, 1_234_567).resolve().unwrap();
        assert_eq!(
            resolved.interval_us(),
            TwtInterval::encode(1_234_567).unwrap().as_micros()
        );
    }

    #[test]
    fn slots_fit_encoded_interval() {
        // 1_000_004 µs is encoded as 1_000_000 µs, which can't hold four slots of 250_001 µs.
        assert_eq!(
            config(250_001, 4, 1_000_004).resolve(),
            Err(TwtError::ConfigInvalid)
        );
        assert_eq!(
            config(250_001, 4, 0).resolve(),
            Err(TwtError::ConfigInvalid)
        );
        // A single slot longer than the encoded interval of 1_234_560 µs.
        assert_eq!(
            config(1_234_567, 1, 1_234_567).resolve(),
            Err(TwtError::ConfigInvalid)
        );

        let resolved = config(0, 1, 1_234_567).resolve().unwrap();
        assert_eq!(resolved.interval_us(), 1_234_560);
        assert_eq!(resolved.service_period_us, resolved.interval_us());
        let resolved = config(0, 4, 1_234_567).resolve().unwrap();
        assert!(resolved.service_period_us * 4 <= resolved.interval_us());
    }
}

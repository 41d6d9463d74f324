use crate::{TwtError, TwtResult};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// A wake interval in the compact form used by the TWT element.
///
/// The interval in microseconds is `mantissa << exponent`. Going from microseconds to this form
/// is lossy, since only 21 bits are available on the wire. The error is bounded by
/// `1 << exponent`, so long intervals lose precision in their low bits. This is a limitation of
/// the protocol, not of the codec.
pub struct TwtInterval {
    pub mantissa: u16,
    pub exponent: u8,
}
impl TwtInterval {
    /// The exponent subfield is five bits wide.
    pub const MAX_EXPONENT: u8 = 31;

    pub const fn new(mantissa: u16, exponent: u8) -> Self {
        Self { mantissa, exponent }
    }
    /// Find the representation closest to `interval_us`.
    ///
    /// For every exponent, both `interval_us >> exponent` and the next larger mantissa are
    /// tried, so that rounding down as well as rounding up is considered at each scale.
    pub fn encode(interval_us: u64) -> TwtResult<Self> {
        let mut best: Option<(Self, u64)> = None;
        for exponent in 0..=Self::MAX_EXPONENT {
            let lower = interval_us >> exponent;
            if lower > u16::MAX as u64 {
                continue;
            }
            let diff = (lower << exponent).abs_diff(interval_us);
            if best.map_or(true, |(_, min_diff)| diff < min_diff) {
                best = Some((Self::new(lower as u16, exponent), diff));
            }
            let upper = lower + 1;
            if upper > u16::MAX as u64 {
                continue;
            }
            let diff = (upper << exponent).abs_diff(interval_us);
            if best.map_or(true, |(_, min_diff)| diff <= min_diff) {
                best = Some((Self::new(upper as u16, exponent), diff));
            }
        }
        best.map(|(interval, _)| interval)
            .ok_or(TwtError::IntervalOutOfRange)
    }
    /// The interval in microseconds.
    pub const fn as_micros(&self) -> u64 {
        (self.mantissa as u64) << self.exponent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_values_are_found() {
        let interval = TwtInterval::encode(1_000_000).unwrap();
        assert_eq!(interval.as_micros(), 1_000_000);
        assert_eq!(interval, TwtInterval::new(62500, 4));

        assert_eq!(TwtInterval::encode(0).unwrap().as_micros(), 0);
        assert_eq!(TwtInterval::encode(65535).unwrap(), TwtInterval::new(65535, 0));
    }

    #[test]
    fn lossy_values_stay_within_bound() {
        for interval_us in [65537u64, 1_234_567, 999_999_999, 86_400_000_000] {
            let encoded = TwtInterval::encode(interval_us).unwrap();
            assert!(encoded.as_micros().abs_diff(interval_us) <= 1 << encoded.exponent);
        }
    }

    #[test]
    fn rounding_up_is_considered() {
        // 65536 << 1 doesn't fit, but rounding up at a larger exponent is just as close.
        let encoded = TwtInterval::encode(131_071).unwrap();
        assert_eq!(encoded.as_micros().abs_diff(131_071), 1);
        assert!(encoded.mantissa as u64 <= u16::MAX as u64);
    }

    #[test]
    fn decode_encode_round_trip_is_bounded() {
        for (mantissa, exponent) in [(1u16, 0u8), (62500, 4), (65535, 31), (12345, 17), (3, 30)] {
            let exact = TwtInterval::new(mantissa, exponent).as_micros();
            let encoded = TwtInterval::encode(exact).unwrap();
            assert!(encoded.as_micros().abs_diff(exact) <= 1 << exponent);
        }
    }

    #[test]
    fn absurd_intervals_fail() {
        assert_eq!(
            TwtInterval::encode(u64::MAX),
            Err(TwtError::IntervalOutOfRange)
        );
        assert_eq!(
            TwtInterval::encode((u16::MAX as u64 + 1) << 31),
            Err(TwtError::IntervalOutOfRange)
        );
    }
}

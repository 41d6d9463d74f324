#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Everything that can go wrong inside the TWT scheduler.
///
/// Only [TwtError::ConfigInvalid] and [TwtError::IntervalOutOfRange] are fatal, and only at
/// construction time. Everything else is local to a single flow or slot and surfaces as a
/// rejected agreement or a no-op.
pub enum TwtError {
    /// The schedule parameters are zero or don't fit together.
    ConfigInvalid,
    /// The interval can't be expressed as a 16 bit mantissa and a 5 bit exponent.
    IntervalOutOfRange,
    /// Every slot in the pool is already fully occupied.
    NoCapacity,
    /// The hardware didn't answer the TSF query in time.
    TimestampTimeout,
    /// The flow already exists with different parameters.
    DuplicateFlowConflict,
    /// The schedule isn't running.
    NotRunning,
    /// Allocating the bookkeeping for a flow failed.
    AllocationFailure,
    /// Only implicit agreements are supported.
    ExplicitUnsupported,
    /// The wake interval is shorter than the service duration.
    IntervalShorterThanDuration,
    /// The flow ID exceeds the number of flows a station may have.
    FlowIdOutOfRange,
    /// The BSS max idle period is shorter than a single base interval.
    MaxIdleTooShort,
    /// There is no agreement staged from the association request.
    NoStagedAgreement,
    /// An agreement from the association request is still waiting for the response.
    SetupInProgress,
}

pub type TwtResult<T> = Result<T, TwtError>;

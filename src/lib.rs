//! # `halow-twt`
//! This is the Target Wake Time (TWT) scheduler of an IEEE 802.11ah access point.
//! It negotiates periodic wake agreements with stations, packs them into shared service period
//! slots and keeps its own wake timer in step with the TSF of the radio.
//! ## Overview
//! This chapter will give a short overview of how the scheduler is structured.
//!
//! ### Schedule
//! The base interval is divided into a fixed number of slots, each one service period long.
//! Every slot can hold up to `group_size` stations, which all wake at the same time. The pool
//! of slots is allocated once, when the [TwtScheduler] is created, and never grows. Stations may
//! also ask for intervals, which are a multiple of the base interval. That multiple has to be a
//! power of two no larger than eight, otherwise the request is answered with a dictated
//! interval, that does fit.
//!
//! ### Negotiation
//! Setup frames from the stations are handed to [TwtScheduler::handle_setup], which decides on
//! the request and rewrites the parameter set in place into the response. An accepted agreement
//! carries the TSF, at which the station should wake for the first time. Agreements from the
//! association request are handled by [TwtScheduler::handle_assoc_request], where the response
//! is staged in the [StationTwtState] until the association response is built.
//!
//! ### Clock correlation
//! All wake times are expressed in TSF, but the scheduler itself only has a local clock. Once
//! every base interval, [TwtScheduler::run] asks the [TimeSource] for the TSF. The query may
//! be slow or not be answered at all, in which case the TSF is assumed to have advanced by
//! exactly one interval. The difference between the observed and the ideal TSF is used to move
//! the next tick forward or backward, so that the two clocks don't drift apart.
//!
//! ### Compliance
//! The driver reports every wake and sleep transition of a station. These are compared against
//! the ideal instants of the slot, which gives an idea of how well the stations keep to their
//! agreements.

#![cfg_attr(not(test), no_std)]
pub(crate) mod fmt;

extern crate alloc;

mod compliance;
mod config;
mod correlator;
mod error;
mod frame;
mod interval;
mod negotiation;
mod schedule;
mod slot;
mod station;
mod sync;

pub use compliance::{ComplianceStat, TransitionCounters, TransitionTiming};
pub use config::{ScheduleConfig, SchedulingAlgorithm, TWT_MSEC, TWT_SECOND};
pub use correlator::{ClockAnchors, TimeSource};
pub use error::{TwtError, TwtResult};
pub use frame::{TwtAssocElement, TwtControl, TwtParameters, TwtRequestType, TwtSetupCommand};
pub use interval::TwtInterval;
pub use negotiation::{SetupDecision, SetupRequest};
pub use schedule::{
    DebugFlags, DriftSnapshot, FlowSnapshot, Schedule, ScheduleInfo, ScheduleState,
    SlotSnapshot, TwtScheduler,
};
pub use slot::{FlowAssignment, SlotEntry, SlotPool, MAX_MULTIPLE};
pub use station::{StationId, StationTwtState, TwtFlow, MAX_FLOWS_PER_STATION};
pub use sync::TsfResponseSignal;

cfg_if::cfg_if! {
    if #[cfg(feature = "critical_section")] {
        type DefaultRawMutex = embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    } else {
        type DefaultRawMutex = embassy_sync::blocking_mutex::raw::NoopRawMutex;
    }
}

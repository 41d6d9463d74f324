use alloc::vec::Vec;

use embassy_futures::select::{select, Either};
use embassy_sync::{mutex::Mutex, signal::Signal};
use embassy_time::Timer;
use macro_bits::{bit, check_bit};

use crate::{
    compliance::{ComplianceStat, SlotTiming, TransitionTiming},
    config::ResolvedConfig,
    correlator::{query_tsf_with_timeout, ClockAnchors},
    interval::TwtInterval,
    slot::SlotPool,
    station::{StationId, StationTwtState, MAX_FLOWS_PER_STATION},
    DefaultRawMutex, ScheduleConfig, SchedulingAlgorithm, TimeSource, TwtError, TwtResult,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScheduleState {
    #[default]
    Stopped,
    Running,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Runtime switches for extra logging.
pub struct DebugFlags {
    /// Log every TWT setup element, that passes through the handlers.
    pub dump_elements: bool,
    /// Log the clock anchors on every tick.
    pub log_drift: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScheduleInfo {
    pub state: ScheduleState,
    pub slot_count: u32,
    pub group_size: u32,
    pub service_period_us: u64,
    pub interval: TwtInterval,
    pub algorithm: SchedulingAlgorithm,
    pub live_flows: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriftSnapshot {
    pub anchors: ClockAnchors,
    /// How far the TSF has drifted relative to the local clock.
    pub skew_us: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotSnapshot {
    pub index: usize,
    pub multiple: Option<u8>,
    pub occupancy: usize,
    /// Station and flow ID of every occupant.
    pub members: Vec<(StationId, u8)>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlowSnapshot {
    pub station: StationId,
    pub flow_id: u8,
    pub slot: usize,
    pub multiple: u8,
    pub stat: ComplianceStat,
}

/// All state shared between negotiation and the correlator.
pub struct Schedule {
    pub(crate) config: ResolvedConfig,
    pub(crate) state: ScheduleState,
    pub(crate) anchors: ClockAnchors,
    /// Local time at which the correlator ticks next.
    pub(crate) timer_deadline_us: Option<u64>,
    /// Incremented on every start and stop, so results from an old run can be told apart.
    pub(crate) generation: u32,
    pub(crate) pool: SlotPool,
    pub(crate) debug_flags: DebugFlags,
}
impl Schedule {
    pub fn new(config: &ScheduleConfig) -> TwtResult<Self> {
        let config = config.resolve().inspect_err(|err| {
            error!("Invalid TWT schedule parameters: {:?}", err);
        })?;
        let pool = SlotPool::new(config.entry_count(), config.group_size as usize)?;
        info!(
            "TWT init (num: {} sp: {} interval: {} mantissa: {} exponent: {} algo: {})",
            config.slot_count,
            config.service_period_us,
            config.interval_us(),
            config.interval.mantissa,
            config.interval.exponent,
            config.algorithm.into_bits()
        );
        Ok(Self {
            config,
            state: ScheduleState::Stopped,
            anchors: ClockAnchors::default(),
            timer_deadline_us: None,
            generation: 0,
            pool,
            debug_flags: DebugFlags::default(),
        })
    }
    pub fn state(&self) -> ScheduleState {
        self.state
    }
    pub fn is_running(&self) -> bool {
        self.state == ScheduleState::Running
    }
    pub fn pool(&self) -> &SlotPool {
        &self.pool
    }
    pub fn anchors(&self) -> &ClockAnchors {
        &self.anchors
    }
    fn begin(&mut self, tsf: u64, now_us: u64) {
        self.anchors = ClockAnchors::new(tsf, now_us);
        self.generation = self.generation.wrapping_add(1);
        self.state = ScheduleState::Running;
        self.timer_deadline_us = Some(self.anchors.next_deadline_us(self.config.interval_us()));
    }
    fn end(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.state = ScheduleState::Stopped;
        self.timer_deadline_us = None;
    }
    pub(crate) fn apply_tick(&mut self, tsf: u64, now_us: u64) {
        let interval_us = self.config.interval_us();
        self.anchors.advance(tsf, now_us, interval_us);
        if self.debug_flags.log_drift {
            debug!(
                "[{}] tsf: {} time: {} tsf_diff: {} time_diff: {}",
                self.anchors.epoch,
                self.anchors.tsf,
                self.anchors.time_us,
                self.anchors.tsf_diff,
                self.anchors.time_diff
            );
        }
        if self.timer_deadline_us.is_some() {
            self.timer_deadline_us = Some(self.anchors.next_deadline_us(interval_us));
        }
    }
    /// The wake TSF for an occupant of the slot at `index`.
    pub(crate) fn next_wake(&self, index: usize, now_us: u64) -> u64 {
        self.pool.entries()[index].next_wake(&self.anchors, &self.config, now_us)
    }
    fn slot_timing(&self, index: usize) -> SlotTiming {
        SlotTiming {
            epoch_time_us: self.anchors.time_us,
            index,
            last_index: self.pool.entries().len().saturating_sub(1),
            service_period_us: self.config.service_period_us,
            interval_us: self.config.interval_us(),
            margin_us: self.config.compliance_margin_us,
        }
    }
    fn record_transition(
        &mut self,
        station: &StationTwtState,
        flow_id: u8,
        awake: bool,
        now_us: u64,
    ) -> Option<TransitionTiming> {
        let slot = station.flow(flow_id)?.slot;
        let timing = self.slot_timing(slot);
        let assignment = self.pool.assignment_mut(slot, station.id(), flow_id)?;
        let result = if awake {
            assignment.stat.on_wake(&timing, now_us)
        } else {
            assignment.stat.on_sleep(&timing, now_us)
        }?;
        trace!(
            "Station {} flow {} {} at {}: {:?}",
            station.id().aid,
            flow_id,
            if awake { "woke" } else { "slept" },
            now_us,
            result
        );
        Some(result)
    }
}

/// The TWT scheduler of an access point.
///
/// Negotiation calls and the correlator share a single [Schedule] behind an async mutex. The
/// correlator runs in [Self::run], which has to be polled for as long as the schedule is
/// running.
pub struct TwtScheduler<T: TimeSource> {
    pub(crate) schedule: Mutex<DefaultRawMutex, Schedule>,
    stop_signal: Signal<DefaultRawMutex, ()>,
    pub(crate) time_source: T,
}
impl<T: TimeSource> TwtScheduler<T> {
    /// Create a stopped scheduler.
    ///
    /// The slot pool is allocated here and lives as long as the scheduler.
    pub fn new(config: &ScheduleConfig, time_source: T) -> TwtResult<Self> {
        Ok(Self {
            schedule: Mutex::new(Schedule::new(config)?),
            stop_signal: Signal::new(),
            time_source,
        })
    }
    pub fn time_source(&self) -> &T {
        &self.time_source
    }
    /// Start acting as TWT responder.
    ///
    /// `bss_max_idle_us` is the BSS max idle period of the AP. Zero means there's no limit,
    /// otherwise it has to cover at least one base interval. Starting a running schedule does
    /// nothing.
    pub async fn start(&self, bss_max_idle_us: u64) -> TwtResult<()> {
        let timeout_us = {
            let schedule = self.schedule.lock().await;
            if schedule.is_running() {
                return Ok(());
            }
            if bss_max_idle_us != 0 && bss_max_idle_us < schedule.config.interval_us() {
                error!(
                    "BSS max idle period {} is shorter than the TWT interval {}.",
                    bss_max_idle_us,
                    schedule.config.interval_us()
                );
                return Err(TwtError::MaxIdleTooShort);
            }
            schedule.config.tsf_query_timeout_us
        };
        // The lock isn't held, while we wait for the hardware.
        let tsf = query_tsf_with_timeout(&self.time_source, timeout_us)
            .await
            .inspect_err(|_| error!("Failed to get the TSF, TWT isn't started."))?;
        let now_us = self.time_source.now_us();

        let mut schedule = self.schedule.lock().await;
        if schedule.is_running() {
            return Ok(());
        }
        schedule.begin(tsf, now_us);
        info!("TWT start (tsf: {} time: {})", tsf, now_us);
        Ok(())
    }
    /// Stop the schedule.
    ///
    /// Any tick, that is still waiting for the hardware, is discarded once it returns.
    pub async fn stop(&self) {
        let mut schedule = self.schedule.lock().await;
        if !schedule.is_running() {
            return;
        }
        schedule.end();
        self.stop_signal.signal(());
        info!("TWT stop");
    }
    /// Drive the clock correlator.
    ///
    /// This returns once the schedule is stopped, and has to be called again after the next
    /// [Self::start].
    pub async fn run(&self) {
        self.stop_signal.reset();
        let generation = {
            let schedule = self.schedule.lock().await;
            if !schedule.is_running() {
                return;
            }
            schedule.generation
        };
        loop {
            let deadline_us = {
                let schedule = self.schedule.lock().await;
                match schedule.timer_deadline_us {
                    Some(deadline_us) if schedule.generation == generation => deadline_us,
                    _ => return,
                }
            };
            let delay_us = deadline_us.saturating_sub(self.time_source.now_us());
            match select(Timer::after_micros(delay_us), self.stop_signal.wait()).await {
                Either::First(_) => self.tick(generation).await,
                Either::Second(_) => {
                    debug!("Correlator stopped.");
                    return;
                }
            }
        }
    }
    /// Sample both clocks at an epoch boundary.
    pub(crate) async fn tick(&self, generation: u32) {
        let (fallback_tsf, timeout_us) = {
            let schedule = self.schedule.lock().await;
            if schedule.generation != generation || !schedule.is_running() {
                return;
            }
            (
                schedule.anchors.fallback_tsf(schedule.config.interval_us()),
                schedule.config.tsf_query_timeout_us,
            )
        };
        let tsf = match query_tsf_with_timeout(&self.time_source, timeout_us).await {
            Ok(tsf) => tsf,
            Err(_) => {
                warn!("TSF query timed out, assuming {}.", fallback_tsf);
                fallback_tsf
            }
        };
        let now_us = self.time_source.now_us();

        let mut schedule = self.schedule.lock().await;
        if schedule.generation != generation {
            debug!("Discarding TSF {} from a stopped schedule.", tsf);
            return;
        }
        schedule.apply_tick(tsf, now_us);
    }
    /// Remove the flow from its slot.
    ///
    /// Tearing down a flow, that doesn't exist, does nothing.
    pub async fn teardown(&self, station: &mut StationTwtState, flow_id: u8) {
        let mut schedule = self.schedule.lock().await;
        schedule.teardown(station, flow_id);
    }
    /// Remove all flows of a departing station.
    pub async fn teardown_all(&self, station: &mut StationTwtState) {
        let mut schedule = self.schedule.lock().await;
        let mask = station.flowid_mask();
        for flow_id in 0..MAX_FLOWS_PER_STATION as u8 {
            if check_bit!(mask, bit!(flow_id)) {
                schedule.teardown(station, flow_id);
            }
        }
    }
    /// The station woke up for its service period.
    pub async fn on_wake(
        &self,
        station: &StationTwtState,
        flow_id: u8,
    ) -> Option<TransitionTiming> {
        self.on_transition(station, flow_id, true).await
    }
    /// The station went back to sleep.
    pub async fn on_sleep(
        &self,
        station: &StationTwtState,
        flow_id: u8,
    ) -> Option<TransitionTiming> {
        self.on_transition(station, flow_id, false).await
    }
    /// A station with a single flow changed its power management mode.
    pub async fn on_power_save_change(
        &self,
        station: &StationTwtState,
        awake: bool,
    ) -> Option<TransitionTiming> {
        self.on_transition(station, 0, awake).await
    }
    async fn on_transition(
        &self,
        station: &StationTwtState,
        flow_id: u8,
        awake: bool,
    ) -> Option<TransitionTiming> {
        let mut schedule = self.schedule.lock().await;
        if !schedule.is_running() {
            return None;
        }
        let now_us = self.time_source.now_us();
        schedule.record_transition(station, flow_id, awake, now_us)
    }
    pub async fn set_debug_flags(&self, debug_flags: DebugFlags) {
        self.schedule.lock().await.debug_flags = debug_flags;
    }
    pub async fn info(&self) -> ScheduleInfo {
        let schedule = self.schedule.lock().await;
        ScheduleInfo {
            state: schedule.state,
            slot_count: schedule.config.slot_count,
            group_size: schedule.config.group_size,
            service_period_us: schedule.config.service_period_us,
            interval: schedule.config.interval,
            algorithm: schedule.config.algorithm,
            live_flows: schedule.pool.live_flows(),
        }
    }
    /// The current clock correlation, if the schedule is running.
    pub async fn drift(&self) -> Option<DriftSnapshot> {
        let schedule = self.schedule.lock().await;
        schedule.is_running().then(|| DriftSnapshot {
            anchors: schedule.anchors,
            skew_us: schedule.anchors.tsf_diff - schedule.anchors.time_diff,
        })
    }
    pub async fn slot_table(&self) -> Vec<SlotSnapshot> {
        let schedule = self.schedule.lock().await;
        schedule
            .pool
            .entries()
            .iter()
            .map(|entry| SlotSnapshot {
                index: entry.index(),
                multiple: entry.multiple(),
                occupancy: entry.occupancy(),
                members: entry
                    .flows()
                    .map(|flow| (flow.station, flow.flow_id))
                    .collect(),
            })
            .collect()
    }
    pub async fn flow_stats(&self) -> Vec<FlowSnapshot> {
        let schedule = self.schedule.lock().await;
        schedule
            .pool
            .entries()
            .iter()
            .flat_map(|entry| {
                entry.flows().map(|flow| FlowSnapshot {
                    station: flow.station,
                    flow_id: flow.flow_id,
                    slot: entry.index(),
                    multiple: flow.multiple,
                    stat: flow.stat,
                })
            })
            .collect()
    }
}

//! Admission of TWT agreements and the handlers for the setup frames carrying them.

use crate::{
    frame::{TwtAssocElement, TwtParameters, TwtSetupCommand},
    interval::TwtInterval,
    schedule::Schedule,
    slot::{FlowAssignment, MAX_MULTIPLE},
    station::{StationId, StationTwtState, TwtFlow, MAX_FLOWS_PER_STATION},
    TimeSource, TwtError, TwtResult, TwtScheduler,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// The parts of a TWT setup request, that admission looks at.
pub struct SetupRequest {
    pub flow_id: u8,
    pub interval: TwtInterval,
    /// Nominal minimum wake duration in units of 256 µs.
    pub min_wake_duration: u8,
    pub implicit: bool,
}
impl SetupRequest {
    pub fn from_parameters(parameters: &TwtParameters) -> Self {
        Self {
            flow_id: parameters.flow_id(),
            interval: parameters.interval(),
            min_wake_duration: parameters.min_wake_duration,
            implicit: parameters.request_type.implicit(),
        }
    }
    pub fn wake_duration_us(&self) -> u64 {
        (self.min_wake_duration as u64) << 8
    }
    fn matches(&self, flow: &TwtFlow) -> bool {
        self.min_wake_duration == flow.min_wake_duration && self.interval == flow.interval
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// The outcome of admission.
pub enum SetupDecision {
    /// The flow was placed into a slot and should first wake at `wake_tsf`.
    Accept { wake_tsf: u64 },
    /// The requested interval doesn't fit the schedule. The station may propose these terms
    /// instead, nothing has been reserved yet.
    Dictate {
        interval: TwtInterval,
        min_wake_duration: u8,
    },
    Reject(TwtError),
}
impl SetupDecision {
    pub fn setup_command(&self) -> TwtSetupCommand {
        match self {
            Self::Accept { .. } => TwtSetupCommand::Accept,
            Self::Dictate { .. } => TwtSetupCommand::Dictate,
            Self::Reject(_) => TwtSetupCommand::Reject,
        }
    }
    /// Turn the request parameters into the response.
    pub fn write_response(&self, parameters: &mut TwtParameters) {
        parameters.set_response(self.setup_command());
        match *self {
            Self::Accept { wake_tsf } => parameters.target_wake_time = wake_tsf,
            Self::Dictate {
                interval,
                min_wake_duration,
            } => {
                parameters.set_interval(interval);
                parameters.min_wake_duration = min_wake_duration;
            }
            Self::Reject(_) => {}
        }
    }
}

fn dump_parameters(label: &str, station: &StationId, parameters: &TwtParameters) {
    let request_type = parameters.request_type;
    debug!(
        "{} from {:?} ({}): request: {} cmd: {} implicit: {} unannounced: {} flowid: {} exp: {} protected: {}",
        label,
        station.address,
        station.aid,
        request_type.request(),
        request_type.setup_command().into_bits(),
        request_type.implicit(),
        request_type.flow_type(),
        request_type.flow_id(),
        request_type.wake_interval_exponent(),
        request_type.protection()
    );
    debug!(
        "{} wake time: {} duration: {} mantissa: {}",
        label,
        parameters.target_wake_time,
        parameters.min_wake_duration,
        parameters.mantissa
    );
}

impl Schedule {
    /// Decide on a setup request and, if it's accepted, place the flow into a slot.
    pub(crate) fn admit(
        &mut self,
        station: &mut StationTwtState,
        request: &SetupRequest,
        now_us: u64,
    ) -> SetupDecision {
        match self.try_admit(station, request, now_us) {
            Ok(decision) => decision,
            Err(err) => {
                info!(
                    "TWT REJECT (aid: {} flowid: {} reason: {:?})",
                    station.id().aid,
                    request.flow_id,
                    err
                );
                SetupDecision::Reject(err)
            }
        }
    }
    fn try_admit(
        &mut self,
        station: &mut StationTwtState,
        request: &SetupRequest,
        now_us: u64,
    ) -> TwtResult<SetupDecision> {
        if !self.is_running() {
            return Err(TwtError::NotRunning);
        }
        if !request.implicit {
            return Err(TwtError::ExplicitUnsupported);
        }
        let flow_interval_us = request.interval.as_micros();
        if flow_interval_us < request.wake_duration_us() {
            return Err(TwtError::IntervalShorterThanDuration);
        }
        if request.flow_id as usize >= MAX_FLOWS_PER_STATION {
            return Err(TwtError::FlowIdOutOfRange);
        }

        if let Some(flow) = station.flow_mut(request.flow_id) {
            if !request.matches(flow) {
                return Err(TwtError::DuplicateFlowConflict);
            }
            // The previous response might have been lost, so just hand out the next wake time.
            let wake_tsf = self.next_wake(flow.slot, now_us);
            flow.next_wake_tsf = wake_tsf;
            info!(
                "TWT ACCEPT duplicate (aid: {} flowid: {} wake: {})",
                station.id().aid,
                request.flow_id,
                wake_tsf
            );
            return Ok(SetupDecision::Accept { wake_tsf });
        }

        let base_us = self.config.interval_us();
        let mut dictate = flow_interval_us % base_us != 0;
        let mut multiple = flow_interval_us / base_us;
        if multiple == 0 {
            multiple = 1;
            dictate = true;
        }
        let max_idle_us = station.max_idle_us();
        if max_idle_us != 0 && max_idle_us < flow_interval_us {
            if max_idle_us < base_us {
                return Err(TwtError::MaxIdleTooShort);
            }
            while multiple > 1 && multiple * base_us > max_idle_us {
                multiple -= 1;
            }
            dictate = true;
        }
        if multiple > MAX_MULTIPLE as u64 {
            multiple = MAX_MULTIPLE as u64;
            dictate = true;
        }
        while !multiple.is_power_of_two() {
            multiple -= 1;
            dictate = true;
        }

        if dictate {
            let interval = TwtInterval::encode(multiple * base_us)?;
            info!(
                "TWT DICTATE (aid: {} flowid: {} interval: {} multi: {})",
                station.id().aid,
                request.flow_id,
                interval.as_micros(),
                multiple
            );
            return Ok(SetupDecision::Dictate {
                interval,
                min_wake_duration: request.min_wake_duration,
            });
        }

        let slot = self.pool.acquire(
            self.config.algorithm,
            FlowAssignment::new(*station.id(), request.flow_id, multiple as u8),
        )?;
        let wake_tsf = self.next_wake(slot, now_us);
        station.insert_flow(TwtFlow {
            id: request.flow_id,
            min_wake_duration: request.min_wake_duration,
            interval: request.interval,
            next_wake_tsf: wake_tsf,
            slot,
        });
        info!(
            "TWT ACCEPT (aid: {} flowid: {} slot: {} wake: {})",
            station.id().aid,
            request.flow_id,
            slot,
            wake_tsf
        );
        Ok(SetupDecision::Accept { wake_tsf })
    }
    pub(crate) fn teardown(&mut self, station: &mut StationTwtState, flow_id: u8) {
        let Some(flow) = station.remove_flow(flow_id) else {
            return;
        };
        self.pool.release(flow.slot, station.id(), flow_id);
    }
}

impl<T: TimeSource> TwtScheduler<T> {
    /// Run admission for a decoded setup request.
    pub async fn negotiate_setup(
        &self,
        station: &mut StationTwtState,
        request: &SetupRequest,
    ) -> SetupDecision {
        let mut schedule = self.schedule.lock().await;
        let now_us = self.time_source.now_us();
        schedule.admit(station, request, now_us)
    }
    /// Handle the parameter set of a TWT setup frame.
    ///
    /// The parameters are rewritten in place into the response. If we aren't acting as TWT
    /// responder, [None] is returned and no response should be sent.
    pub async fn handle_setup(
        &self,
        station: &mut StationTwtState,
        parameters: &mut TwtParameters,
    ) -> Option<SetupDecision> {
        let mut schedule = self.schedule.lock().await;
        if !schedule.is_running() {
            return None;
        }
        let dump = schedule.debug_flags.dump_elements;
        if dump {
            dump_parameters("TWT setup", station.id(), parameters);
        }
        let request = SetupRequest::from_parameters(parameters);
        let now_us = self.time_source.now_us();
        let decision = schedule.admit(station, &request, now_us);
        decision.write_response(parameters);
        if dump {
            dump_parameters("TWT response", station.id(), parameters);
        }
        Some(decision)
    }
    pub async fn handle_teardown(&self, station: &mut StationTwtState, flow_id: u8) {
        info!("TWT Teardown from {:?} ({})", station.id().address, station.id().aid);
        self.teardown(station, flow_id).await;
    }
    /// Handle the TWT element of an association request.
    ///
    /// The response is staged in the station, until the association response is built with
    /// [Self::take_assoc_response]. If the schedule isn't running, a rejection is staged.
    pub async fn handle_assoc_request(
        &self,
        station: &mut StationTwtState,
        element: &TwtAssocElement,
    ) -> TwtResult<SetupDecision> {
        if station.staged_agreement().is_some() {
            return Err(TwtError::SetupInProgress);
        }
        let mut response = *element;
        let decision = match self.handle_setup(station, &mut response.parameters).await {
            Some(decision) => decision,
            None => {
                let decision = SetupDecision::Reject(TwtError::NotRunning);
                decision.write_response(&mut response.parameters);
                decision
            }
        };
        station.stage(response);
        Ok(decision)
    }
    /// Take the staged TWT element for the association response.
    pub fn take_assoc_response(&self, station: &mut StationTwtState) -> TwtResult<TwtAssocElement> {
        station.take_staged().ok_or_else(|| {
            error!("No associated TWT for {}.", station.id().aid);
            TwtError::NoStagedAgreement
        })
    }
}

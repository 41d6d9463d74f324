use alloc::vec::Vec;

use crate::{
    compliance::ComplianceStat, config::ResolvedConfig, correlator::ClockAnchors,
    station::StationId, SchedulingAlgorithm, TwtError, TwtResult,
};

/// The largest number of base intervals a flow may span.
pub const MAX_MULTIPLE: u8 = 8;

#[derive(Clone, Debug, PartialEq, Eq)]
/// A flow, that has been placed into a slot.
pub struct FlowAssignment {
    pub flow_id: u8,
    pub station: StationId,
    /// Number of base intervals between two wake times of this flow.
    pub multiple: u8,
    pub stat: ComplianceStat,
}
impl FlowAssignment {
    pub fn new(station: StationId, flow_id: u8, multiple: u8) -> Self {
        Self {
            flow_id,
            station,
            multiple,
            stat: ComplianceStat::default(),
        }
    }
    fn is(&self, station: &StationId, flow_id: u8) -> bool {
        self.station == *station && self.flow_id == flow_id
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A shared wake occasion inside the base interval.
pub struct SlotEntry {
    index: usize,
    multiple: Option<u8>,
    flows: Vec<FlowAssignment>,
}
impl SlotEntry {
    const fn new(index: usize) -> Self {
        Self {
            index,
            multiple: None,
            flows: Vec::new(),
        }
    }
    /// Position in the pool. The slot starts `index * service_period` after the epoch boundary.
    pub fn index(&self) -> usize {
        self.index
    }
    /// The largest multiple of all occupants, or [None] if the slot is empty.
    pub fn multiple(&self) -> Option<u8> {
        self.multiple
    }
    pub fn occupancy(&self) -> usize {
        self.flows.len()
    }
    pub fn flows(&self) -> impl Iterator<Item = &FlowAssignment> + '_ {
        self.flows.iter()
    }
    /// The TSF at which an occupant of this slot should wake next.
    ///
    /// If the slot in the current epoch is too close to, or behind, `now_us` to still get a
    /// response frame out, the slot in the next epoch is used instead.
    pub(crate) fn next_wake(
        &self,
        anchors: &ClockAnchors,
        config: &ResolvedConfig,
        now_us: u64,
    ) -> u64 {
        let interval = config.interval_us();
        let base_tsf = anchors.start_tsf + interval * anchors.epoch;
        let offset = self.index as u64 * config.service_period_us;
        let lead = if now_us + config.wake_lead_us > anchors.time_us + offset {
            interval
        } else {
            0
        };
        base_tsf + lead + offset
    }
    fn refresh_multiple(&mut self) {
        self.multiple = self.flows.iter().map(|flow| flow.multiple).max();
    }
}

/// The fixed set of slots, that flows are distributed over.
///
/// The entries are allocated once, when the pool is created. Only the per flow bookkeeping
/// inside them grows and shrinks.
pub struct SlotPool {
    entries: Vec<SlotEntry>,
    group_size: usize,
    /// No slot has fewer occupants than this.
    min_occupancy: usize,
    live_flows: usize,
}
impl SlotPool {
    pub fn new(entry_count: usize, group_size: usize) -> TwtResult<Self> {
        let mut entries = Vec::new();
        entries
            .try_reserve_exact(entry_count)
            .map_err(|_| TwtError::AllocationFailure)?;
        entries.extend((0..entry_count).map(SlotEntry::new));
        Ok(Self {
            entries,
            group_size,
            min_occupancy: 0,
            live_flows: 0,
        })
    }
    pub fn entries(&self) -> &[SlotEntry] {
        &self.entries
    }
    pub fn entry(&self, index: usize) -> Option<&SlotEntry> {
        self.entries.get(index)
    }
    pub fn group_size(&self) -> usize {
        self.group_size
    }
    /// Total number of flows across all slots.
    pub fn live_flows(&self) -> usize {
        self.live_flows
    }
    fn position_with_occupancy(&self, occupancy: usize) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.occupancy() == occupancy)
    }
    /// Find the first slot with the lowest occupancy.
    fn find_balanced(&mut self) -> Option<usize> {
        if self.min_occupancy >= self.group_size {
            return None;
        }
        if let Some(index) = self.position_with_occupancy(self.min_occupancy) {
            return Some(index);
        }
        // Every slot has moved past the watermark.
        self.min_occupancy += 1;
        trace!("Raised minimum slot occupancy to {}.", self.min_occupancy);
        if self.min_occupancy >= self.group_size {
            return None;
        }
        self.position_with_occupancy(self.min_occupancy)
    }
    fn find_fcfs(&self) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.occupancy() < self.group_size)
    }
    /// Place the flow into a slot chosen by `algorithm` and return the index of that slot.
    pub fn acquire(
        &mut self,
        algorithm: SchedulingAlgorithm,
        assignment: FlowAssignment,
    ) -> TwtResult<usize> {
        let index = match algorithm {
            SchedulingAlgorithm::Fcfs => self.find_fcfs(),
            _ => self.find_balanced(),
        };
        let Some(index) = index else {
            error!("No more unused entry, Total used: {}", self.live_flows);
            return Err(TwtError::NoCapacity);
        };
        let entry = &mut self.entries[index];
        entry
            .flows
            .try_reserve(1)
            .map_err(|_| TwtError::AllocationFailure)?;
        entry.flows.push(assignment);
        entry.refresh_multiple();
        self.live_flows += 1;
        info!(
            "Alloc TWT entry (index: {}, multi: {}), Total alloced: {}",
            index,
            entry.multiple.unwrap_or_default(),
            self.live_flows
        );
        Ok(index)
    }
    /// Remove the flow from the slot at `index`.
    ///
    /// Returns the assignment, if the flow was actually in that slot.
    pub fn release(
        &mut self,
        index: usize,
        station: &StationId,
        flow_id: u8,
    ) -> Option<FlowAssignment> {
        let entry = self.entries.get_mut(index)?;
        let position = entry
            .flows
            .iter()
            .position(|flow| flow.is(station, flow_id))?;
        let assignment = entry.flows.remove(position);
        entry.refresh_multiple();
        self.live_flows -= 1;
        if entry.occupancy() < self.min_occupancy {
            self.min_occupancy = entry.occupancy();
        }
        info!(
            "Delete TWT flow (aid: {} flowid: {}), slot {} now has {} flows.",
            station.aid,
            flow_id,
            index,
            entry.occupancy()
        );
        if entry.occupancy() == 0 {
            info!("Delete TWT entry (index: {}), Total used: {}", index, self.live_flows);
        }
        Some(assignment)
    }
    pub fn assignment_mut(
        &mut self,
        index: usize,
        station: &StationId,
        flow_id: u8,
    ) -> Option<&mut FlowAssignment> {
        self.entries
            .get_mut(index)?
            .flows
            .iter_mut()
            .find(|flow| flow.is(station, flow_id))
    }
}

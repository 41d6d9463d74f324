use macro_bits::{bit, check_bit};

use crate::{frame::TwtAssocElement, interval::TwtInterval};

/// The number of TWT flows a single station may set up.
pub const MAX_FLOWS_PER_STATION: usize = 1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Identifies an associated station.
pub struct StationId {
    pub aid: u16,
    pub address: [u8; 6],
}
impl StationId {
    pub const fn new(aid: u16, address: [u8; 6]) -> Self {
        Self { aid, address }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// An accepted TWT agreement.
pub struct TwtFlow {
    pub id: u8,
    /// Nominal minimum wake duration in units of 256 µs.
    pub min_wake_duration: u8,
    pub interval: TwtInterval,
    /// The wake time handed out in the most recent response.
    pub next_wake_tsf: u64,
    pub(crate) slot: usize,
}
impl TwtFlow {
    /// The slot this flow was placed in.
    pub fn slot(&self) -> usize {
        self.slot
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
/// The TWT state the driver keeps for each associated station.
pub struct StationTwtState {
    id: StationId,
    max_idle_period: u16,
    flowid_mask: u8,
    flows: [TwtFlow; MAX_FLOWS_PER_STATION],
    staged: Option<TwtAssocElement>,
}
impl StationTwtState {
    /// Create the state for a newly associated station.
    ///
    /// `max_idle_period` is the BSS max idle period the station negotiated, in units of 1000 TU.
    pub const fn new(id: StationId, max_idle_period: u16) -> Self {
        Self {
            id,
            max_idle_period,
            flowid_mask: 0,
            flows: [TwtFlow {
                id: 0,
                min_wake_duration: 0,
                interval: TwtInterval::new(0, 0),
                next_wake_tsf: 0,
                slot: 0,
            }; MAX_FLOWS_PER_STATION],
            staged: None,
        }
    }
    pub fn id(&self) -> &StationId {
        &self.id
    }
    pub fn set_max_idle_period(&mut self, max_idle_period: u16) {
        self.max_idle_period = max_idle_period;
    }
    /// The BSS max idle period in microseconds. Zero means there's no limit.
    pub fn max_idle_us(&self) -> u64 {
        ((self.max_idle_period as u64) << 10) * 1000
    }
    /// A bitmask of all active flow IDs.
    pub fn flowid_mask(&self) -> u8 {
        self.flowid_mask
    }
    pub fn has_flows(&self) -> bool {
        self.flowid_mask != 0
    }
    pub fn flow(&self, flow_id: u8) -> Option<&TwtFlow> {
        if (flow_id as usize) < MAX_FLOWS_PER_STATION && check_bit!(self.flowid_mask, bit!(flow_id))
        {
            Some(&self.flows[flow_id as usize])
        } else {
            None
        }
    }
    pub(crate) fn flow_mut(&mut self, flow_id: u8) -> Option<&mut TwtFlow> {
        if (flow_id as usize) < MAX_FLOWS_PER_STATION && check_bit!(self.flowid_mask, bit!(flow_id))
        {
            Some(&mut self.flows[flow_id as usize])
        } else {
            None
        }
    }
    /// Iterate over the IDs of all active flows.
    pub fn flow_ids(&self) -> impl Iterator<Item = u8> + '_ {
        (0..MAX_FLOWS_PER_STATION as u8).filter(|flow_id| check_bit!(self.flowid_mask, bit!(*flow_id)))
    }
    /// Store the flow and mark its ID as active.
    ///
    /// The caller has to ensure, that the ID is in range.
    pub(crate) fn insert_flow(&mut self, flow: TwtFlow) {
        self.flows[flow.id as usize] = flow;
        self.flowid_mask |= bit!(flow.id);
    }
    pub(crate) fn remove_flow(&mut self, flow_id: u8) -> Option<TwtFlow> {
        let flow = *self.flow(flow_id)?;
        self.flowid_mask &= !bit!(flow_id);
        Some(flow)
    }
    /// The agreement from the association request, that still has to go into the response.
    pub fn staged_agreement(&self) -> Option<&TwtAssocElement> {
        self.staged.as_ref()
    }
    pub(crate) fn stage(&mut self, element: TwtAssocElement) {
        self.staged = Some(element);
    }
    pub(crate) fn take_staged(&mut self) -> Option<TwtAssocElement> {
        self.staged.take()
    }
}

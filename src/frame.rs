//! The boundary between the scheduler and the TWT element on the wire.
//!
//! Building and parsing the surrounding action and association frames happens elsewhere. This
//! module only knows about the fields inside the individual TWT parameter set, so that all the
//! shifting and masking of subfields lives in one place.

use bitfield_struct::bitfield;
use macro_bits::serializable_enum;

use crate::interval::TwtInterval;

serializable_enum! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    /// The setup command carried in the request type field.
    pub enum TwtSetupCommand: u8 {
        #[default]
        Request => 0,
        Suggest => 1,
        Demand => 2,
        Grouping => 3,
        Accept => 4,
        Alternate => 5,
        Dictate => 6,
        Reject => 7
    }
}

#[bitfield(u16)]
#[derive(PartialEq, Eq)]
/// The request type field of an individual TWT parameter set.
pub struct TwtRequestType {
    /// Set by the requesting STA, cleared in the response.
    pub request: bool,
    #[bits(3)]
    pub setup_command: TwtSetupCommand,
    pub trigger: bool,
    /// Implicit agreements advance their target wake time by one interval every period.
    pub implicit: bool,
    /// Announced or unannounced flow.
    pub flow_type: bool,
    #[bits(3)]
    pub flow_id: u8,
    #[bits(5)]
    pub wake_interval_exponent: u8,
    pub protection: bool,
}

#[bitfield(u8)]
#[derive(PartialEq, Eq)]
/// The control field of the TWT element.
pub struct TwtControl {
    pub ndp_paging_indicator: bool,
    pub responder_pm_mode: bool,
    #[bits(2)]
    pub negotiation_type: u8,
    pub information_frame_disabled: bool,
    pub wake_duration_unit: bool,
    #[bits(2)]
    pub __: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// An individual TWT parameter set.
pub struct TwtParameters {
    pub request_type: TwtRequestType,
    /// The target wake time as an absolute TSF value.
    pub target_wake_time: u64,
    /// Nominal minimum wake duration in units of 256 µs.
    pub min_wake_duration: u8,
    pub mantissa: u16,
    pub channel: u8,
}
impl TwtParameters {
    /// The length of the parameter set on the wire.
    pub const LENGTH: usize = 14;
    /// The unit of [Self::min_wake_duration] as a shift.
    const WAKE_DURATION_SHIFT: u32 = 8;

    /// Parse the parameter set from the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let bytes: &[u8; Self::LENGTH] = bytes.get(..Self::LENGTH)?.try_into().ok()?;
        let mut target_wake_time = [0u8; 8];
        target_wake_time.copy_from_slice(&bytes[2..10]);
        Some(Self {
            request_type: TwtRequestType::from_bits(u16::from_le_bytes([bytes[0], bytes[1]])),
            target_wake_time: u64::from_le_bytes(target_wake_time),
            min_wake_duration: bytes[10],
            mantissa: u16::from_le_bytes([bytes[11], bytes[12]]),
            channel: bytes[13],
        })
    }
    /// Serialize the parameter set.
    pub fn to_bytes(&self) -> [u8; Self::LENGTH] {
        let mut bytes = [0u8; Self::LENGTH];
        bytes[0..2].copy_from_slice(&self.request_type.into_bits().to_le_bytes());
        bytes[2..10].copy_from_slice(&self.target_wake_time.to_le_bytes());
        bytes[10] = self.min_wake_duration;
        bytes[11..13].copy_from_slice(&self.mantissa.to_le_bytes());
        bytes[13] = self.channel;
        bytes
    }
    /// The wake interval, which is split across the mantissa and the request type.
    pub fn interval(&self) -> TwtInterval {
        TwtInterval::new(self.mantissa, self.request_type.wake_interval_exponent())
    }
    /// Overwrite the wake interval.
    pub fn set_interval(&mut self, interval: TwtInterval) {
        self.mantissa = interval.mantissa;
        self.request_type
            .set_wake_interval_exponent(interval.exponent);
    }
    /// The nominal minimum wake duration in microseconds.
    pub fn wake_duration_us(&self) -> u64 {
        (self.min_wake_duration as u64) << Self::WAKE_DURATION_SHIFT
    }
    pub fn flow_id(&self) -> u8 {
        self.request_type.flow_id()
    }
    pub fn setup_command(&self) -> TwtSetupCommand {
        self.request_type.setup_command()
    }
    /// Turn the request into a response carrying `command`.
    pub fn set_response(&mut self, command: TwtSetupCommand) {
        self.request_type.set_request(false);
        self.request_type.set_setup_command(command);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// The TWT element as it's carried in association frames.
pub struct TwtAssocElement {
    pub control: TwtControl,
    pub parameters: TwtParameters,
}
impl TwtAssocElement {
    pub const LENGTH: usize = 1 + TwtParameters::LENGTH;

    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let (control, parameters) = bytes.split_first()?;
        Some(Self {
            control: TwtControl::from_bits(*control),
            parameters: TwtParameters::parse(parameters)?,
        })
    }
    pub fn to_bytes(&self) -> [u8; Self::LENGTH] {
        let mut bytes = [0u8; Self::LENGTH];
        bytes[0] = self.control.into_bits();
        bytes[1..].copy_from_slice(&self.parameters.to_bytes());
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETUP_REQUEST: [u8; TwtParameters::LENGTH] = [
        0x21, 0x10, // Request, implicit, flow 0, exponent 4
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // Target wake time
        0x64, // 100 * 256 µs
        0x24, 0xf4, // Mantissa 62500
        0x00,
    ];

    #[test]
    fn parse_setup_request() {
        let parameters = TwtParameters::parse(&SETUP_REQUEST).unwrap();
        assert!(parameters.request_type.request());
        assert!(parameters.request_type.implicit());
        assert_eq!(parameters.setup_command(), TwtSetupCommand::Request);
        assert_eq!(parameters.flow_id(), 0);
        assert_eq!(parameters.interval(), TwtInterval::new(62500, 4));
        assert_eq!(parameters.interval().as_micros(), 1_000_000);
        assert_eq!(parameters.wake_duration_us(), 25_600);
        assert_eq!(parameters.to_bytes(), SETUP_REQUEST);
    }

    #[test]
    fn response_rewrites_only_the_subfields() {
        let mut parameters = TwtParameters::parse(&SETUP_REQUEST).unwrap();
        parameters.set_response(TwtSetupCommand::Dictate);
        parameters.set_interval(TwtInterval::new(62500, 5));

        let bytes = parameters.to_bytes();
        let parsed = TwtParameters::parse(&bytes).unwrap();
        assert!(!parsed.request_type.request());
        assert!(parsed.request_type.implicit());
        assert_eq!(parsed.setup_command(), TwtSetupCommand::Dictate);
        assert_eq!(parsed.interval().as_micros(), 2_000_000);
        // Setup command lives in bits 1..4, the exponent in bits 10..15.
        assert_eq!(u16::from_le_bytes([bytes[0], bytes[1]]), (6 << 1) | (1 << 5) | (5 << 10));
    }

    #[test]
    fn truncated_input_is_rejected() {
        assert!(TwtParameters::parse(&SETUP_REQUEST[..13]).is_none());
        assert!(TwtAssocElement::parse(&[]).is_none());
    }

    #[test]
    fn assoc_element_carries_control() {
        let mut bytes = [0u8; TwtAssocElement::LENGTH];
        bytes[0] = 0b0010_0000;
        bytes[1..].copy_from_slice(&SETUP_REQUEST);
        let element = TwtAssocElement::parse(&bytes).unwrap();
        assert!(element.control.wake_duration_unit());
        assert_eq!(element.to_bytes(), bytes);
    }
}

//https://www.avsforum.com/attachments/hdmi-cec-v1-3a-specifications-pdf.2579760/

use crate::error::CecError;
use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// A physical address `a.b.c.d`, one nibble per level of the HDMI tree.
/// e.g. 0x3300 -> 3.3.0.0
pub type CecPhysicalAddress = u16;

/// Physical address of a device that is not connected (or not yet known).
pub const CEC_PHYS_ADDR_INVALID: CecPhysicalAddress = 0xffff;

/// Use this if there is no vendor ID, or to disable reporting one.
pub const CEC_VENDOR_ID_NONE: u32 = 0xffffffff;

/**
 * The maximum number of logical addresses one adapter can claim.
 * CEC 2.0 allows two, some hardware does more. We support 4.
 */
pub const CEC_MAX_LOG_ADDRS: usize = 4;

/// Extension bit of the RC Profile and Device Feature operands.
pub const CEC_OP_FEAT_EXT: u8 = 0x80;

/// CDC sub-opcode (byte 4 of a [CecOpcode::CdcMessage]): HPD Set State
pub const CEC_MSG_CDC_HPD_SET_STATE: u8 = 0x10;
/// CDC sub-opcode (byte 4 of a [CecOpcode::CdcMessage]): HPD Report State
pub const CEC_MSG_CDC_HPD_REPORT_STATE: u8 = 0x11;

/// HPD error: none
pub const CEC_OP_HPD_ERROR_NONE: u8 = 0;
/// HPD error: the initiator is not in a state to process the request
pub const CEC_OP_HPD_ERROR_INITIATOR_WRONG_STATE: u8 = 2;

bitflags! {
    /// capabilities of the CEC adapter
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct Capabilities: u32 {
        /// The application configures the adapter state. See [CecAdapter::set_enabled](crate::CecAdapter::set_enabled)
        const STATE = 1 << 0;
        /// The application configures the physical address. See [CecAdapter::set_phys](crate::CecAdapter::set_phys)
        const PHYS_ADDR = 1 << 1;
        /// The application configures the logical addresses. See [CecAdapter::set_log](crate::CecAdapter::set_log)
        const LOG_ADDRS = 1 << 2;
        /// The application can transmit messages
        const TRANSMIT = 1 << 3;
        /// The application can receive messages
        const RECEIVE = 1 << 4;
        /// The application configures the vendor ID
        const VENDOR_ID = 1 << 5;
        /// Passthrough all messages instead of processing them.
        const PASSTHROUGH = 1 << 6;
        /// Supports remote control
        const RC = 1 << 7;
        /// Supports the Audio Return Channel
        const ARC = 1 << 8;
        /// Supports Capability Discovery and Control
        const CDC = 1 << 9;
    }
}

bitflags! {
    /// Per logical address flags of a [LogAddrRequest](crate::LogAddrRequest)
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CecLogAddrFlags : u8 {
        /// Directed messages the core does not handle are passed on
        /// to the application instead of being answered with a feature abort.
        const HANDLE_MSGS = 1 << 0;
    }
}

/// CEC Version Operand for [CecOpcode::CecVersion]
#[repr(u8)]
#[non_exhaustive]
#[derive(Debug, Eq, PartialEq, PartialOrd, Ord, TryFromPrimitive, IntoPrimitive, Copy, Clone)]
pub enum Version {
    V1_3A = 4,
    V1_4 = 5,
    V2_0 = 6,
}

/// Primary Device Type Operand (prim_devtype)
#[derive(Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Copy, Clone)]
#[repr(u8)]
pub enum CecPrimDevType {
    TV = 0,
    RECORD = 1,
    TUNER = 3,
    PLAYBACK = 4,
    AUDIOSYSTEM = 5,
    SWITCH = 6,
    PROCESSOR = 7,
}

/// The logical address types that the CEC device wants to claim
#[derive(Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Copy, Clone)]
#[repr(u8)]
pub enum CecLogAddrType {
    TV = 0,
    RECORD = 1,
    TUNER = 2,
    PLAYBACK = 3,
    AUDIOSYSTEM = 4,
    SPECIFIC = 5,
    UNREGISTERED = 6,
}

impl CecLogAddrType {
    /// Logical addresses to poll for this type, in order of preference.
    pub fn candidates(self) -> &'static [u8] {
        match self {
            CecLogAddrType::TV => &[0],
            CecLogAddrType::RECORD => &[1, 2, 9, 12, 13],
            CecLogAddrType::TUNER => &[3, 6, 7, 10, 12, 13],
            CecLogAddrType::PLAYBACK => &[4, 8, 11, 12, 13],
            CecLogAddrType::AUDIOSYSTEM => &[5, 12, 13],
            CecLogAddrType::SPECIFIC => &[14, 12, 13],
            CecLogAddrType::UNREGISTERED => &[],
        }
    }
}

bitflags! {
    /// All Device Types Operand (all_device_types), CEC 2.0
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AllDevTypes : u8 {
        const TV = 0x80;
        const RECORD = 0x40;
        const TUNER = 0x20;
        const PLAYBACK = 0x10;
        const AUDIOSYSTEM = 0x08;
        const SWITCH = 0x04;
    }
}

/**
 * The logical addresses defined by CEC 2.0
 *
 * Switches should use UNREGISTERED.
 * Processors should use SPECIFIC.
 */
#[derive(Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Clone, Copy)]
#[repr(u8)]
pub enum CecLogicalAddress {
    Tv = 0,
    Record1 = 1,
    Record2 = 2,
    Tuner1 = 3,
    Playback1 = 4,
    Audiosystem = 5,
    Tuner2 = 6,
    Tuner3 = 7,
    Playback2 = 8,
    Record3 = 9,
    Tuner4 = 10,
    Playback3 = 11,
    Backup1 = 12,
    Backup2 = 13,
    Specific = 14,
    ///as initiator address
    UnregisteredBroadcast = 15,
}

impl CecLogicalAddress {
    /// Every nibble maps to a variant.
    pub fn from_nibble(v: u8) -> Self {
        match Self::try_from(v & 0xf) {
            Ok(la) => la,
            Err(_) => CecLogicalAddress::UnregisteredBroadcast,
        }
    }
}

bitflags! {
    /// The bitmask of all logical addresses this adapter has claimed.
    ///
    /// If this adapter is not configured at all, then the mask is empty.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CecLogAddrMask: u16 {
        const Tv            = (1 << 0);
        const Record1       = (1 << 1);
        const Record2       = (1 << 2);
        const Record3       = (1 << 9);
        const Tuner1        = (1 << 3);
        const Tuner2        = (1 << 6);
        const Tuner3        = (1 << 7);
        const Tuner4        = (1 << 10);
        const Playback1     = (1 << 4);
        const Playback2     = (1 << 8);
        const Playback3     = (1 << 11);
        const Audiosystem   = (1 << 5);
        const Backup1       = (1 << 12);
        const Backup2       = (1 << 13);
        const Specific      = (1 << 14);
        /// adapter is Unregistered
        const Unregistered  = (1 << 15);
    }
}
impl CecLogAddrMask {
    #[inline]
    pub fn is_playback(&self) -> bool {
        self.intersects(Self::Playback1 | Self::Playback2 | Self::Playback3)
    }
    #[inline]
    pub fn is_record(&self) -> bool {
        self.intersects(Self::Record1 | Self::Record2 | Self::Record3)
    }
    #[inline]
    pub fn is_tuner(&self) -> bool {
        self.intersects(Self::Tuner1 | Self::Tuner2 | Self::Tuner3 | Self::Tuner4)
    }
}

/// Opcodes the core looks at, plus the common ones applications send.
///
/// Frames carry a raw byte. Use `CecOpcode::try_from(byte)` to classify it.
#[derive(Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Clone, Copy)]
#[repr(u8)]
pub enum CecOpcode {
    /* One Touch Play */
    /// __Parameters:__ 2byte - physical address of active source
    ActiveSource = 0x82,
    ImageViewOn = 0x04,
    TextViewOn = 0x0d,
    /* Routing Control */
    InactiveSource = 0x9d,
    RequestActiveSource = 0x85,
    RoutingChange = 0x80,
    RoutingInformation = 0x81,
    SetStreamPath = 0x86,
    /* Standby */
    Standby = 0x36,
    /* System Information */
    /// __Parameters:__ [Version]
    CecVersion = 0x9e,
    /// core message, answered with [CecOpcode::CecVersion]
    GetCecVersion = 0x9f,
    /// core message, answered with [CecOpcode::ReportPhysicalAddr]
    GivePhysicalAddr = 0x83,
    GetMenuLanguage = 0x91,
    /// __Parameters:__
    /// - 2b physical address
    /// - 1b [CecPrimDevType]
    ReportPhysicalAddr = 0x84,
    SetMenuLanguage = 0x32,
    /// CEC 2.0
    ReportFeatures = 0xa6,
    /// CEC 2.0 core message, answered with [CecOpcode::ReportFeatures]
    GiveFeatures = 0xa5,
    /* Deck Control */
    DeckControl = 0x42,
    DeckStatus = 0x1b,
    GiveDeckStatus = 0x1a,
    Play = 0x41,
    /* Vendor Specific Commands */
    /// __Parameters:__ 3 byte vendor ID
    DeviceVendorId = 0x87,
    /// core message, answered with [CecOpcode::DeviceVendorId]
    GiveDeviceVendorId = 0x8c,
    VendorCommand = 0x89,
    VendorCommandWithId = 0xa0,
    VendorRemoteButtonDown = 0x8a,
    VendorRemoteButtonUp = 0x8b,
    /* OSD */
    SetOsdString = 0x64,
    /// core message, answered with [CecOpcode::SetOsdName]
    GiveOsdName = 0x46,
    SetOsdName = 0x47,
    /* Device Menu Control */
    MenuRequest = 0x8d,
    MenuStatus = 0x8e,
    /// __Parameters:__ 1 byte UI command
    UserControlPressed = 0x44,
    UserControlReleased = 0x45,
    /* Power Status */
    GiveDevicePowerStatus = 0x8f,
    /// __Parameters:__ 1 byte [CecPowerStatus]
    ReportPowerStatus = 0x90,
    /* General Protocol */
    /// __Parameters:__
    /// - the aborted opcode
    /// - [CecAbortReason]
    FeatureAbort = 0x00,
    /// core message, answered with a "refused" feature abort
    Abort = 0xff,
    /* System Audio Control */
    GiveAudioStatus = 0x71,
    GiveSystemAudioModeStatus = 0x7d,
    ReportAudioStatus = 0x7a,
    SetSystemAudioMode = 0x72,
    SystemAudioModeRequest = 0x70,
    SystemAudioModeStatus = 0x7e,
    /* Audio Return Channel Control */
    InitiateArc = 0xc0,
    ReportArcInitiated = 0xc1,
    ReportArcTerminated = 0xc2,
    RequestArcInitiation = 0xc3,
    RequestArcTermination = 0xc4,
    TerminateArc = 0xc5,
    /* Capability Discovery and Control */
    CdcMessage = 0xf8,
}

/// used by [CecOpcode::FeatureAbort]
#[derive(Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Clone, Copy)]
#[repr(u8)]
pub enum CecAbortReason {
    /// Unrecognized opcode
    Unrecognized = 0,
    /// Not in correct mode to respond
    WrongMode = 1,
    /// Cannot provide source
    NoSource = 2,
    /// Invalid operand
    InvalidOp = 3,
    Refused = 4,
    Other = 5,
}

/// Payload of [CecOpcode::ReportPowerStatus]
#[derive(Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum CecPowerStatus {
    On = 0,
    Standby = 1,
    InTransitionStandbyToOn = 2,
    InTransitionOnToStandby = 3,
}

/**
 * A fixed size, zero padded ASCII string as used for OSD names.
 * ```
 * # use cec_core::OSDStr;
 * let name: OSDStr::<15> = "pi4".try_into().unwrap();
 * assert_eq!(name.as_ref(), "pi4");
 * ```
 */
#[derive(Clone, PartialEq, Eq)]
pub struct OSDStr<const MAX: usize>([u8; MAX]);

impl<const MAX: usize> OSDStr<MAX> {
    /// The bytes up to (not including) the first NUL.
    pub fn as_bytes(&self) -> &[u8] {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(MAX);
        &self.0[..end]
    }
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl<const MAX: usize> TryFrom<&str> for OSDStr<MAX> {
    type Error = CecError;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if !value.is_ascii() || value.len() > MAX {
            return Err(CecError::InvalidArgument("OSD string must be short ASCII"));
        }
        let mut osd = OSDStr::default();
        osd.0[..value.len()].copy_from_slice(value.as_bytes());
        Ok(osd)
    }
}

// from a frame payload, silently truncated
impl<const MAX: usize> From<&[u8]> for OSDStr<MAX> {
    fn from(value: &[u8]) -> Self {
        let mut osd = OSDStr::default();
        let len = MAX.min(value.len());
        osd.0[..len].copy_from_slice(&value[..len]);
        osd
    }
}

impl<const MAX: usize> AsRef<str> for OSDStr<MAX> {
    fn as_ref(&self) -> &str {
        std::str::from_utf8(self.as_bytes()).unwrap_or_default()
    }
}
impl<const MAX: usize> std::fmt::Display for OSDStr<MAX> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}
impl<const MAX: usize> std::fmt::Debug for OSDStr<MAX> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.as_ref())
    }
}
impl<const MAX: usize> Default for OSDStr<MAX> {
    fn default() -> Self {
        Self([0; MAX])
    }
}

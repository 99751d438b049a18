use crate::types::{
    CecAbortReason, CecLogicalAddress, CecOpcode, CecPhysicalAddress, CecPowerStatus,
    CecPrimDevType, OSDStr, Version, CEC_MSG_CDC_HPD_REPORT_STATE, CEC_MSG_CDC_HPD_SET_STATE,
    CEC_OP_FEAT_EXT,
};
use bitflags::bitflags;
use num_enum::TryFromPrimitiveError;

pub const CEC_MAX_MSG_SIZE: usize = 16;

// ---  cec status field  ---
bitflags! {
    /// Outcome of a transmit.
    ///
    /// Empty while the message is still queued or on the wire.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TxStatus: u8 {
        /// Acknowledged (and, if requested, replied to)
        const OK            = (1 << 0);
        const ARB_LOST      = (1 << 1);
        /// No acknowledge within the transmit window.
        /// During address claiming this means the polled address is free.
        const RETRY_TIMEOUT = (1 << 2);
        /// The destination answered with [CecOpcode::FeatureAbort]
        const FEATURE_ABORT = (1 << 3);
        /// Sent, but the requested reply did not arrive in time
        const REPLY_TIMEOUT = (1 << 4);
        /// The driver refused to start the transmit
        const ERROR         = (1 << 5);
    }
}

/// A CEC frame plus the bookkeeping the adapter fills in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CecMsg {
    /// Length in bytes of the message, 1..=16.
    pub len: u32,
    /// The timeout (in ms) that is used to timeout a blocking receive.
    /// 0 means wait forever.
    pub timeout: u32,
    /// The message payload.
    /// Includes initiator, destination and opcode.
    pub msg: [u8; CEC_MAX_MSG_SIZE],
    /// If non-zero, wait for a reply with this opcode.
    ///
    /// Cleared on completion. On [TxStatus::FEATURE_ABORT] and
    /// [TxStatus::OK] after a reply, `len`/`msg` hold the received reply.
    pub reply: u8,
    sequence: u32,
    status: TxStatus,
    ts: u64,
}

impl Default for CecMsg {
    fn default() -> Self {
        Self {
            len: 0,
            timeout: 0,
            msg: [0; CEC_MAX_MSG_SIZE],
            reply: 0,
            sequence: 0,
            status: TxStatus::empty(),
            ts: 0,
        }
    }
}

impl CecMsg {
    /// A bare header, which on its own is a poll.
    pub fn init(from: CecLogicalAddress, to: CecLogicalAddress) -> CecMsg {
        let f: u8 = from.into();
        let t: u8 = to.into();
        let mut m = Self {
            len: 1,
            ..Default::default()
        };
        m.msg[0] = f << 4 | t;
        m
    }
    /// Poll `log_addr` from the unregistered address.
    pub fn poll(log_addr: u8) -> CecMsg {
        let mut m = Self {
            len: 1,
            ..Default::default()
        };
        m.msg[0] = 0xf0 | (log_addr & 0xf);
        m
    }
    /// Build from raw bytes, e.g. a frame read off the wire.
    pub fn from_bytes(bytes: &[u8]) -> Option<CecMsg> {
        if bytes.is_empty() || bytes.len() > CEC_MAX_MSG_SIZE {
            return None;
        }
        let mut m = Self {
            len: bytes.len() as u32,
            ..Default::default()
        };
        m.msg[..bytes.len()].copy_from_slice(bytes);
        Some(m)
    }
    /// Header for an answer to `orig`:
    /// its destination becomes the initiator and vice versa.
    pub fn reply_to(orig: &CecMsg) -> CecMsg {
        let mut m = Self {
            len: 1,
            ..Default::default()
        };
        m.msg[0] = (orig.msg[0] & 0xf) << 4 | orig.msg[0] >> 4;
        m
    }
    /// Set opcode and parameters. Parameters beyond 14 bytes do not fit a frame.
    pub fn set_opcode<O: Into<u8>>(&mut self, opcode: O, params: &[u8]) -> crate::Result<()> {
        if params.len() > CEC_MAX_MSG_SIZE - 2 {
            return Err(crate::CecError::InvalidArgument("too many parameters"));
        }
        self.msg[1] = opcode.into();
        self.msg[2..2 + params.len()].copy_from_slice(params);
        self.len = 2 + params.len() as u32;
        Ok(())
    }
    // internal builders only pass short parameter lists
    fn with(mut self, opcode: CecOpcode, params: &[u8]) -> Self {
        let n = params.len().min(CEC_MAX_MSG_SIZE - 2);
        self.msg[1] = opcode.into();
        self.msg[2..2 + n].copy_from_slice(&params[..n]);
        self.len = 2 + n as u32;
        self
    }
    fn broadcast(mut self) -> Self {
        self.msg[0] |= 0xf;
        self
    }

    /// return the initiator's logical address
    pub fn initiator(&self) -> CecLogicalAddress {
        CecLogicalAddress::from_nibble(self.msg[0] >> 4)
    }
    /// return the destination's logical address
    pub fn destination(&self) -> CecLogicalAddress {
        CecLogicalAddress::from_nibble(self.msg[0] & 0xf)
    }
    #[inline]
    pub(crate) fn initiator_raw(&self) -> u8 {
        self.msg[0] >> 4
    }
    #[inline]
    pub(crate) fn destination_raw(&self) -> u8 {
        self.msg[0] & 0xf
    }
    /// return the opcode of the message, None for poll
    pub fn opcode(&self) -> Option<Result<CecOpcode, TryFromPrimitiveError<CecOpcode>>> {
        self.opcode_raw().map(CecOpcode::try_from)
    }
    /// the opcode byte, None for poll
    pub fn opcode_raw(&self) -> Option<u8> {
        if self.len > 1 {
            Some(self.msg[1])
        } else {
            None
        }
    }
    pub fn parameters(&self) -> &[u8] {
        if self.len > 2 {
            &self.msg[2..self.len as usize]
        } else {
            &[]
        }
    }
    /// The valid bytes of the frame
    pub fn as_bytes(&self) -> &[u8] {
        &self.msg[..(self.len as usize).min(CEC_MAX_MSG_SIZE)]
    }
    /// return true if this is a broadcast message
    pub fn is_broadcast(&self) -> bool {
        (self.msg[0] & 0xf) == 0xf
    }
    /// a poll has no opcode
    pub fn is_poll(&self) -> bool {
        self.len == 1
    }
    pub fn is_cdc(&self) -> bool {
        self.len > 1 && self.msg[1] == u8::from(CecOpcode::CdcMessage)
    }
    /// Assigned when the message is queued for transmit. 0 for received messages.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }
    pub(crate) fn set_sequence(&mut self, sequence: u32) {
        self.sequence = sequence;
    }
    pub fn tx_status(&self) -> TxStatus {
        self.status
    }
    pub(crate) fn set_tx_status(&mut self, status: TxStatus) {
        self.status = status;
    }
    /// Nanoseconds since the adapter was created, set on completion or receipt.
    pub fn timestamp(&self) -> u64 {
        self.ts
    }
    pub(crate) fn set_timestamp(&mut self, ts: u64) {
        self.ts = ts;
    }
    pub fn is_ok(&self) -> bool {
        self.status == TxStatus::OK
    }
}

// core message builders
impl CecMsg {
    pub(crate) fn cec_version(self, version: Version) -> Self {
        self.with(CecOpcode::CecVersion, &[version.into()])
    }
    pub(crate) fn report_physical_addr(
        self,
        phys_addr: CecPhysicalAddress,
        prim_devtype: CecPrimDevType,
    ) -> Self {
        let pa = phys_addr.to_be_bytes();
        self.broadcast()
            .with(CecOpcode::ReportPhysicalAddr, &[pa[0], pa[1], prim_devtype.into()])
    }
    pub(crate) fn device_vendor_id(self, vendor_id: u32) -> Self {
        let v = vendor_id.to_be_bytes();
        self.broadcast().with(CecOpcode::DeviceVendorId, &v[1..])
    }
    pub(crate) fn report_power_status(self, status: CecPowerStatus) -> Self {
        self.with(CecOpcode::ReportPowerStatus, &[status.into()])
    }
    pub(crate) fn set_osd_name<const MAX: usize>(self, name: &OSDStr<MAX>) -> Self {
        self.with(CecOpcode::SetOsdName, name.as_bytes())
    }
    pub(crate) fn feature_abort(self, opcode: u8, reason: CecAbortReason) -> Self {
        self.with(CecOpcode::FeatureAbort, &[opcode, reason.into()])
    }
    pub(crate) fn initiate_arc(self) -> Self {
        self.with(CecOpcode::InitiateArc, &[])
    }
    pub(crate) fn terminate_arc(self) -> Self {
        self.with(CecOpcode::TerminateArc, &[])
    }
    pub(crate) fn report_arc_initiated(self) -> Self {
        self.with(CecOpcode::ReportArcInitiated, &[])
    }
    pub(crate) fn report_arc_terminated(self) -> Self {
        self.with(CecOpcode::ReportArcTerminated, &[])
    }
    /// Report Features: version, all device types, then the RC profile
    /// and device feature blocks, each ending at a byte without [CEC_OP_FEAT_EXT].
    pub(crate) fn report_features(self, version: Version, all_device_types: u8, features: &[u8]) -> Self {
        let mut params = Vec::with_capacity(2 + features.len());
        params.push(version.into());
        params.push(all_device_types);
        let mut op_is_dev_features = false;
        for &f in features {
            params.push(f);
            if f & CEC_OP_FEAT_EXT == 0 {
                if op_is_dev_features {
                    break;
                }
                op_is_dev_features = true;
            }
        }
        self.broadcast().with(CecOpcode::ReportFeatures, &params)
    }
    pub(crate) fn cdc_hpd(self, phys_addr: CecPhysicalAddress, set_state: bool, hpd: u8) -> Self {
        let pa = phys_addr.to_be_bytes();
        let sub = if set_state {
            CEC_MSG_CDC_HPD_SET_STATE
        } else {
            CEC_MSG_CDC_HPD_REPORT_STATE
        };
        self.broadcast().with(CecOpcode::CdcMessage, &[pa[0], pa[1], sub, hpd])
    }
}

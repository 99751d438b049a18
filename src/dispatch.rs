//! Everything that happens to a frame received from the bus.
//!
//! A frame first gets a chance to complete the transmit waiting for a reply.
//! Then the core answers what it can answer by itself and queues the rest
//! for the application.

use crate::adapter::{AdapterState, CecEventType, Shared};
use crate::hardware::RxDisposition;
use crate::message::{CecMsg, TxStatus, CEC_MAX_MSG_SIZE};
use crate::types::{
    Capabilities, CecAbortReason, CecLogAddrFlags, CecLogicalAddress, CecOpcode,
    CecPhysicalAddress, CecPowerStatus, CecPrimDevType, OSDStr, Version,
    CEC_MSG_CDC_HPD_SET_STATE, CEC_PHYS_ADDR_INVALID,
    CEC_VENDOR_ID_NONE,
};
use tracing::{debug, trace, warn};

/**
 * Whether two physical addresses are directly connected:
 * one is the parent port of the other.
 * ```
 * # use cec_core::phys_addrs_adjacent;
 * assert!(phys_addrs_adjacent(0x0000, 0x1000));
 * assert!(phys_addrs_adjacent(0x1200, 0x1000));
 * assert!(!phys_addrs_adjacent(0x1000, 0x2000));
 * assert!(!phys_addrs_adjacent(0x1000, 0x1000));
 * ```
 */
pub fn phys_addrs_adjacent(pa1: CecPhysicalAddress, pa2: CecPhysicalAddress) -> bool {
    if pa1 == CEC_PHYS_ADDR_INVALID || pa2 == CEC_PHYS_ADDR_INVALID {
        return false;
    }
    let Some(i) = (0..4u32).find(|i| {
        let shift = 12 - 4 * i;
        (pa1 >> shift) & 0xf != (pa2 >> shift) & 0xf
    }) else {
        return false;
    };
    let shift = 12 - 4 * i;
    let rest = (1u16 << shift) - 1;
    if pa1 & rest != 0 || pa2 & rest != 0 {
        return false;
    }
    ((pa1 >> shift) & 0xf == 0) ^ ((pa2 >> shift) & 0xf == 0)
}

/// What the core needs to know about the adapter to process one frame.
struct RxContext {
    passthrough: bool,
    cec_version: Version,
    phys_addr: CecPhysicalAddress,
    vendor_id: u32,
    pwr_state: CecPowerStatus,
    osd_name: OSDStr<14>,
    /// binding index of the destination
    la_idx: Option<usize>,
    dest_flags: CecLogAddrFlags,
    devtype: CecPrimDevType,
    first_log_addr: Option<u8>,
    adjacent: bool,
}

/// Outcome of the core's own handling of a frame.
enum Builtin {
    /// answered or dropped, the application never sees it
    Consumed,
    /// not fully handled, subject to the HANDLE_MSGS check
    Forward,
    /// the core does no processing at all
    Skipped,
}

impl Shared {
    pub(crate) fn received(&self, mut msg: CecMsg) {
        if msg.len == 0 || msg.len as usize > CEC_MAX_MSG_SIZE {
            warn!(adapter = %self.name, len = msg.len, "dropping frame with bad length");
            return;
        }
        let mut is_reply = false;
        let mut blocking = false;
        {
            let mut guard = self.lock();
            let inner = &mut *guard;
            msg.set_timestamp(self.now_ns());
            msg.set_sequence(0);
            trace!(adapter = %self.name, frame = ?msg.as_bytes(), "received");

            if msg.len > 1 && inner.state == AdapterState::Wait {
                if let Some(head) = inner.tx_queue.front_mut() {
                    let dst = &head.msg;
                    let valid_reply = if dst.is_cdc() {
                        msg.is_cdc() && msg.len > 4 && msg.msg[4] == dst.reply
                    } else {
                        msg.msg[1] == dst.reply
                    };
                    let is_abort = msg.msg[1] == u8::from(CecOpcode::FeatureAbort);
                    if msg.initiator_raw() == dst.destination_raw() && (valid_reply || is_abort) {
                        let status = if is_abort {
                            TxStatus::FEATURE_ABORT
                        } else {
                            dst.tx_status()
                        };
                        msg.set_sequence(dst.sequence());
                        let mut reply = msg.clone();
                        reply.reply = 0;
                        reply.timeout = dst.timeout;
                        reply.set_tx_status(status);
                        head.msg = reply;
                        head.done = true;
                        is_reply = true;
                        blocking = head.blocking;
                        trace!(adapter = %self.name, seq = msg.sequence(), ?status, "got reply");
                        self.wake_worker(inner);
                    }
                }
            }
        }
        if !is_reply || !blocking {
            self.receive_notify(&msg);
        }
        if is_reply && !blocking {
            self.post_event(CecEventType::GotReply, msg.sequence());
        }
    }

    fn rx_context(&self, msg: &CecMsg) -> RxContext {
        let inner = self.lock();
        let dest = msg.destination_raw();
        let init = msg.initiator_raw();
        let la_idx = inner.log_addr2idx(dest);
        let known = |la: u8| {
            inner
                .phys_addrs
                .get(la as usize)
                .copied()
                .unwrap_or(CEC_PHYS_ADDR_INVALID)
        };
        RxContext {
            passthrough: inner.passthrough,
            cec_version: inner.cec_version,
            phys_addr: inner.phys_addr,
            vendor_id: inner.vendor_id,
            pwr_state: inner.pwr_state,
            osd_name: inner.osd_name.clone(),
            la_idx,
            dest_flags: la_idx
                .and_then(|i| inner.bindings.get(i))
                .map(|b| b.flags)
                .unwrap_or_default(),
            devtype: inner.log_addr2dev(dest),
            first_log_addr: inner.bindings.first().map(|b| b.log_addr),
            adjacent: phys_addrs_adjacent(known(dest), known(init)),
        }
    }

    /// Queue a core generated answer. Best effort.
    fn respond(&self, msg: CecMsg) {
        if let Err(e) = self.transmit_msg(msg, false) {
            debug!(adapter = %self.name, error = %e, "could not send answer");
        }
    }
    fn feature_abort(&self, msg: &CecMsg, reason: CecAbortReason) {
        self.respond(CecMsg::reply_to(msg).feature_abort(msg.msg[1], reason));
    }

    fn receive_notify(&self, msg: &CecMsg) {
        if msg.len <= 1 {
            return;
        }
        let cx = self.rx_context(msg);
        let is_broadcast = msg.is_broadcast();
        let is_directed = cx.la_idx.is_some();
        let init = msg.initiator_raw();
        let dest = msg.destination_raw();
        let from_unregistered = init == 0xf;

        if !is_directed && !is_broadcast && !cx.passthrough {
            return;
        }
        debug!(adapter = %self.name, frame = ?msg.as_bytes(), "processing");

        if self.hw.received(msg) == RxDisposition::Handled {
            return;
        }

        if !cx.passthrough {
            if !is_directed && !is_broadcast {
                return;
            }
            match self.process_builtin(msg, &cx, is_broadcast, from_unregistered) {
                Builtin::Consumed => return,
                Builtin::Forward => {
                    if is_directed && !cx.dest_flags.contains(CecLogAddrFlags::HANDLE_MSGS) {
                        self.feature_abort(msg, CecAbortReason::Unrecognized);
                        return;
                    }
                }
                Builtin::Skipped => {}
            }
        }

        // hand it to the application
        if !self.capabilities.contains(Capabilities::RECEIVE) {
            if is_directed {
                self.feature_abort(msg, CecAbortReason::Unrecognized);
            }
            return;
        }
        let mut inner = self.lock();
        if inner.rx_queue.push(msg.clone()).is_err() {
            warn!(adapter = %self.name, frame = ?msg.as_bytes(), "receive queue full, dropping");
            return;
        }
        self.waitq.notify_all();
        drop(inner);
        trace!(adapter = %self.name, dest, "queued for the application");
    }

    /// Core message handling.
    fn process_builtin(
        &self,
        msg: &CecMsg,
        cx: &RxContext,
        is_broadcast: bool,
        from_unregistered: bool,
    ) -> Builtin {
        let opcode = CecOpcode::try_from(msg.msg[1]).ok();
        let init = msg.initiator_raw();
        let dest = msg.destination_raw();

        // drop frames sent the wrong way
        match opcode {
            Some(
                CecOpcode::GetCecVersion
                | CecOpcode::GiveDeviceVendorId
                | CecOpcode::Abort
                | CecOpcode::GiveDevicePowerStatus
                | CecOpcode::UserControlPressed
                | CecOpcode::UserControlReleased
                | CecOpcode::GiveFeatures
                | CecOpcode::GivePhysicalAddr
                | CecOpcode::GiveOsdName
                | CecOpcode::InitiateArc
                | CecOpcode::TerminateArc
                | CecOpcode::RequestArcInitiation
                | CecOpcode::RequestArcTermination,
            ) => {
                if is_broadcast || from_unregistered {
                    return Builtin::Consumed;
                }
            }
            Some(CecOpcode::ReportPhysicalAddr | CecOpcode::CdcMessage) => {
                if !is_broadcast {
                    return Builtin::Consumed;
                }
            }
            _ => {}
        }

        // 1.4 devices leave everything to the application
        if cx.cec_version < Version::V2_0 {
            return Builtin::Skipped;
        }
        let Some(opcode) = opcode else {
            return Builtin::Forward;
        };

        let reply = CecMsg::reply_to(msg);
        let caps = self.capabilities;
        match opcode {
            CecOpcode::GetCecVersion => {
                self.respond(reply.cec_version(cx.cec_version));
            }
            CecOpcode::GivePhysicalAddr => {
                if cx.devtype == CecPrimDevType::SWITCH && dest == 15 {
                    return Builtin::Consumed;
                }
                self.respond(reply.report_physical_addr(cx.phys_addr, cx.devtype));
            }
            CecOpcode::ReportPhysicalAddr => {
                if msg.len >= 4 && init < 15 {
                    let pa = u16::from_be_bytes([msg.msg[2], msg.msg[3]]);
                    self.lock().phys_addrs[init as usize] = pa;
                    debug!(adapter = %self.name, la = init, phys_addr = format_args!("{:#06x}", pa), "physical address reported");
                }
                return Builtin::Forward;
            }
            CecOpcode::GiveDeviceVendorId => {
                if !caps.contains(Capabilities::VENDOR_ID) || cx.vendor_id == CEC_VENDOR_ID_NONE {
                    self.feature_abort(msg, CecAbortReason::Unrecognized);
                } else {
                    self.respond(reply.device_vendor_id(cx.vendor_id));
                }
            }
            CecOpcode::Abort => {
                if cx.devtype != CecPrimDevType::SWITCH {
                    self.feature_abort(msg, CecAbortReason::Refused);
                }
            }
            CecOpcode::GiveDevicePowerStatus => {
                if cx.devtype != CecPrimDevType::SWITCH {
                    self.respond(reply.report_power_status(cx.pwr_state));
                }
            }
            CecOpcode::GiveOsdName => {
                if cx.osd_name.is_empty() {
                    self.feature_abort(msg, CecAbortReason::Unrecognized);
                } else {
                    self.respond(reply.set_osd_name(&cx.osd_name));
                }
            }
            // keys reach the key path and the application alike
            CecOpcode::UserControlPressed => {
                if !caps.contains(Capabilities::RC) {
                    self.feature_abort(msg, CecAbortReason::Unrecognized);
                    return Builtin::Consumed;
                }
                if msg.len >= 3 {
                    match msg.msg[2] {
                        // play function, may carry an operand
                        0x60 => {
                            let code = if msg.len >= 4 {
                                u16::from(msg.msg[2]) << 8 | u16::from(msg.msg[3])
                            } else {
                                u16::from(msg.msg[2])
                            };
                            self.hw.rc_keydown(code);
                        }
                        // functions with operands the key path can't carry
                        0x67..=0x6a => {}
                        key => self.hw.rc_keydown(key.into()),
                    }
                }
                return Builtin::Forward;
            }
            CecOpcode::UserControlReleased => {
                if !caps.contains(Capabilities::RC) {
                    self.feature_abort(msg, CecAbortReason::Unrecognized);
                    return Builtin::Consumed;
                }
                self.hw.rc_keyup();
                return Builtin::Forward;
            }
            CecOpcode::GiveFeatures => {
                if let Some(idx) = cx.la_idx {
                    self.report_features(idx);
                }
            }
            CecOpcode::RequestArcInitiation
            | CecOpcode::RequestArcTermination
            | CecOpcode::ReportArcInitiated
            | CecOpcode::ReportArcTerminated
            | CecOpcode::InitiateArc
            | CecOpcode::TerminateArc => {
                self.process_arc(msg, opcode, cx, reply);
            }
            CecOpcode::CdcMessage => {
                self.process_cdc_hpd(msg, cx);
            }
            _ => return Builtin::Forward,
        }
        Builtin::Consumed
    }

    fn process_arc(&self, msg: &CecMsg, opcode: CecOpcode, cx: &RxContext, reply: CecMsg) {
        if !self.capabilities.contains(Capabilities::ARC) {
            self.feature_abort(msg, CecAbortReason::Unrecognized);
            return;
        }
        // the sink receives the ARC transmitter commands, the source the rest
        let sink_side = matches!(opcode, CecOpcode::InitiateArc | CecOpcode::TerminateArc);
        if self.is_sink != sink_side || !cx.adjacent {
            self.feature_abort(msg, CecAbortReason::Refused);
            return;
        }
        match opcode {
            CecOpcode::RequestArcInitiation => self.respond(reply.initiate_arc()),
            CecOpcode::RequestArcTermination => self.respond(reply.terminate_arc()),
            CecOpcode::InitiateArc => match self.hw.sink_initiate_arc() {
                Ok(()) => self.respond(reply.report_arc_initiated()),
                Err(e) => debug!(adapter = %self.name, error = %e, "ARC not initiated"),
            },
            CecOpcode::TerminateArc => match self.hw.sink_terminate_arc() {
                Ok(()) => self.respond(reply.report_arc_terminated()),
                Err(e) => debug!(adapter = %self.name, error = %e, "ARC not terminated"),
            },
            CecOpcode::ReportArcInitiated => self.hw.source_arc_initiated(),
            CecOpcode::ReportArcTerminated => self.hw.source_arc_terminated(),
            _ => {}
        }
    }

    fn process_cdc_hpd(&self, msg: &CecMsg, cx: &RxContext) {
        if !self.capabilities.contains(Capabilities::CDC) || msg.len < 6 {
            return;
        }
        // sources act on the sink's request, reports only complete a transmit
        if msg.msg[4] != CEC_MSG_CDC_HPD_SET_STATE || self.is_sink {
            return;
        }
        let input_port = u16::from(msg.msg[5] >> 4);
        let mut cdc_phys_addr = u16::from_be_bytes([msg.msg[2], msg.msg[3]]);
        // the sink's address extended by the port gives ours
        for shift in (0..16).step_by(4) {
            if cdc_phys_addr & (0xf000 >> shift) != 0 {
                continue;
            }
            cdc_phys_addr |= input_port << (12 - shift);
            break;
        }
        if cdc_phys_addr != cx.phys_addr {
            return;
        }
        let Some(la) = cx.first_log_addr else {
            return;
        };
        let hpd_state = msg.msg[5] & 0xf;
        let hpd_error = self.hw.source_cdc_hpd(hpd_state);
        let report = CecMsg::init(
            CecLogicalAddress::from_nibble(la),
            CecLogicalAddress::UnregisteredBroadcast,
        )
        .cdc_hpd(cx.phys_addr, false, (hpd_state << 4) | (hpd_error & 0xf));
        self.respond(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacency_is_symmetric() {
        let addrs = [0x0000, 0x1000, 0x1100, 0x1200, 0x2000, 0x1110, 0x1111, 0xffff];
        for &a in &addrs {
            for &b in &addrs {
                assert_eq!(phys_addrs_adjacent(a, b), phys_addrs_adjacent(b, a), "{a:#x} {b:#x}");
            }
            assert!(!phys_addrs_adjacent(a, a));
        }
    }

    #[test]
    fn parent_and_child() {
        assert!(phys_addrs_adjacent(0x0000, 0x2000));
        assert!(phys_addrs_adjacent(0x1000, 0x1100));
        assert!(phys_addrs_adjacent(0x1110, 0x1111));
        // grandchild
        assert!(!phys_addrs_adjacent(0x0000, 0x1100));
        // siblings
        assert!(!phys_addrs_adjacent(0x1100, 0x1200));
        assert!(!phys_addrs_adjacent(0xffff, 0x1000));
    }
}

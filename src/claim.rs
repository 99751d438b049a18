//! Logical address claiming.
//!
//! Each requested device type polls its candidate addresses in order.
//! A poll that nobody acknowledges means the address is free.

use crate::adapter::{AdapterState, CecEventType, Inner, Shared};
use crate::error::{CecError, Result};
use crate::message::{CecMsg, TxStatus};
use crate::types::{
    AllDevTypes, CecLogAddrFlags, CecLogAddrMask, CecLogAddrType, CecLogicalAddress,
    CecPhysicalAddress, CecPrimDevType, OSDStr, Version, CEC_MAX_LOG_ADDRS, CEC_OP_FEAT_EXT,
    CEC_PHYS_ADDR_INVALID,
};
use std::sync::{mpsc, Arc};
use tracing::{debug, trace, warn};

/// Size of the RC profile and device feature operands
pub const CEC_MAX_FEATURES: usize = 12;

/// One logical address to claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogAddrRequest {
    pub log_addr_type: CecLogAddrType,
    pub primary_device_type: CecPrimDevType,
    /// CEC 2.0 only
    pub all_device_types: AllDevTypes,
    /// CEC 2.0: RC profile bytes, then device feature bytes.
    /// Each block ends at the first byte without [CEC_OP_FEAT_EXT].
    pub features: [u8; CEC_MAX_FEATURES],
    pub flags: CecLogAddrFlags,
    /// The address that was claimed. Filled in by the adapter.
    pub log_addr: Option<CecLogicalAddress>,
}

impl LogAddrRequest {
    pub fn new(log_addr_type: CecLogAddrType, primary_device_type: CecPrimDevType) -> Self {
        Self {
            log_addr_type,
            primary_device_type,
            all_device_types: AllDevTypes::empty(),
            features: [0; CEC_MAX_FEATURES],
            flags: CecLogAddrFlags::empty(),
            log_addr: None,
        }
    }
    pub fn with_all_device_types(mut self, types: AllDevTypes) -> Self {
        self.all_device_types = types;
        self
    }
    pub fn with_features(mut self, features: &[u8]) -> Self {
        let n = features.len().min(CEC_MAX_FEATURES);
        self.features = [0; CEC_MAX_FEATURES];
        self.features[..n].copy_from_slice(&features[..n]);
        self
    }
    pub fn with_flags(mut self, flags: CecLogAddrFlags) -> Self {
        self.flags = flags;
        self
    }
}

/**
 * Logical addresses to claim, see [CecAdapter::set_log](crate::CecAdapter::set_log),
 * or claimed, see [CecAdapter::get_log](crate::CecAdapter::get_log).
 * ```
 * # use cec_core::*;
 * let log = CecLogAddrs::single(CecLogAddrType::PLAYBACK, CecPrimDevType::PLAYBACK)
 *     .with_osd_name("pi4")
 *     .unwrap();
 * assert_eq!(log.log_addrs.len(), 1);
 * assert_eq!(log.cec_version, Version::V2_0);
 * ```
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CecLogAddrs {
    pub cec_version: Version,
    pub osd_name: OSDStr<14>,
    /// At most [CEC_MAX_LOG_ADDRS]
    pub log_addrs: Vec<LogAddrRequest>,
}

impl Default for CecLogAddrs {
    fn default() -> Self {
        Self {
            cec_version: Version::V2_0,
            osd_name: OSDStr::default(),
            log_addrs: Vec::new(),
        }
    }
}

impl CecLogAddrs {
    /// Request a single address of the given type. The device type
    /// also goes into [LogAddrRequest::all_device_types].
    pub fn single(log_addr_type: CecLogAddrType, primary_device_type: CecPrimDevType) -> Self {
        let all = match primary_device_type {
            CecPrimDevType::TV => AllDevTypes::TV,
            CecPrimDevType::RECORD => AllDevTypes::RECORD,
            CecPrimDevType::TUNER => AllDevTypes::TUNER,
            CecPrimDevType::PLAYBACK => AllDevTypes::PLAYBACK,
            CecPrimDevType::AUDIOSYSTEM => AllDevTypes::AUDIOSYSTEM,
            CecPrimDevType::SWITCH | CecPrimDevType::PROCESSOR => AllDevTypes::SWITCH,
        };
        Self {
            log_addrs: vec![LogAddrRequest::new(log_addr_type, primary_device_type)
                .with_all_device_types(all)
                .with_flags(CecLogAddrFlags::HANDLE_MSGS)],
            ..Default::default()
        }
    }
    pub fn with_osd_name(mut self, name: &str) -> Result<Self> {
        self.osd_name = name.try_into()?;
        Ok(self)
    }
    pub fn with_version(mut self, version: Version) -> Self {
        self.cec_version = version;
        self
    }
    /// The claimed addresses
    pub fn addresses(&self) -> Vec<CecLogicalAddress> {
        self.log_addrs.iter().filter_map(|r| r.log_addr).collect()
    }
    /// The claimed addresses as a mask
    pub fn log_addr_mask(&self) -> CecLogAddrMask {
        self.addresses()
            .into_iter()
            .fold(CecLogAddrMask::empty(), |m, la| {
                m | CecLogAddrMask::from_bits_retain(1 << u8::from(la))
            })
    }

    pub(crate) fn from_adapter(inner: &Inner) -> Self {
        Self {
            cec_version: inner.cec_version,
            osd_name: inner.osd_name.clone(),
            log_addrs: inner
                .bindings
                .iter()
                .map(|b| LogAddrRequest {
                    log_addr_type: b.log_addr_type,
                    primary_device_type: b.primary_device_type,
                    all_device_types: b.all_device_types,
                    features: b.features,
                    flags: b.flags,
                    log_addr: Some(CecLogicalAddress::from_nibble(b.log_addr)),
                })
                .collect(),
        }
    }
}

/// A claimed logical address and what it announces.
#[derive(Debug, Clone)]
pub(crate) struct Binding {
    pub log_addr: u8,
    pub log_addr_type: CecLogAddrType,
    pub primary_device_type: CecPrimDevType,
    pub all_device_types: AllDevTypes,
    pub features: [u8; CEC_MAX_FEATURES],
    pub flags: CecLogAddrFlags,
}

/// Both feature blocks must end within the operand.
fn features_terminated(features: &[u8; CEC_MAX_FEATURES]) -> bool {
    let mut op_is_dev_features = false;
    for &f in features {
        if f & CEC_OP_FEAT_EXT == 0 {
            if op_is_dev_features {
                return true;
            }
            op_is_dev_features = true;
        }
    }
    false
}

pub(crate) fn validate_log_addrs(log: &CecLogAddrs, phys_addr: CecPhysicalAddress) -> Result<()> {
    if log.log_addrs.len() > CEC_MAX_LOG_ADDRS {
        return Err(CecError::InvalidArgument("too many logical addresses"));
    }
    if log.cec_version != Version::V1_4 && log.cec_version != Version::V2_0 {
        return Err(CecError::InvalidArgument("CEC version must be 1.4 or 2.0"));
    }
    if log.log_addrs.len() > 1
        && log
            .log_addrs
            .iter()
            .any(|r| r.log_addr_type == CecLogAddrType::UNREGISTERED)
    {
        return Err(CecError::InvalidArgument(
            "unregistered can only be requested alone",
        ));
    }
    if log.cec_version >= Version::V2_0
        && !log.log_addrs.iter().all(|r| features_terminated(&r.features))
    {
        return Err(CecError::InvalidArgument("malformed features"));
    }
    if phys_addr == CEC_PHYS_ADDR_INVALID
        && (log.log_addrs.len() > 1
            || log
                .log_addrs
                .first()
                .is_some_and(|r| r.log_addr_type != CecLogAddrType::UNREGISTERED))
    {
        return Err(CecError::InvalidArgument(
            "without a physical address only unregistered can be claimed",
        ));
    }
    Ok(())
}

impl Shared {
    pub(crate) fn claim_log_addrs(
        self: &Arc<Self>,
        mut log: CecLogAddrs,
        block: bool,
    ) -> Result<CecLogAddrs> {
        let phys_addr = {
            let mut inner = self.lock();
            if inner.state == AdapterState::Disabled {
                return Err(CecError::NotConfigured);
            }
            if log.log_addrs.len() > CEC_MAX_LOG_ADDRS {
                return Err(CecError::InvalidArgument("too many logical addresses"));
            }
            if log.log_addrs.is_empty() {
                debug!(adapter = %self.name, "unconfigure logical addresses");
                inner.clear_queues();
                inner.state = AdapterState::Unconfigured;
                self.kthread_waitq.notify_all();
                self.waitq.notify_all();
                return Ok(log);
            }
            inner.phys_addr
        };
        validate_log_addrs(&log, phys_addr)?;
        for r in &mut log.log_addrs {
            r.log_addr = None;
        }

        let (tx, rx) = if block {
            let (tx, rx) = mpsc::sync_channel(1);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        {
            let mut inner = self.lock();
            if inner.state > AdapterState::Unconfigured {
                return Err(CecError::Busy);
            }
            if inner.state == AdapterState::Disabled {
                return Err(CecError::NotConfigured);
            }
            inner.state = AdapterState::Idle;
            inner.osd_name = log.osd_name.clone();
            inner.cec_version = log.cec_version;
            inner.bindings.clear();
            let generation = inner.generation;

            let shared = self.clone();
            let request = log.clone();
            let handle = std::thread::Builder::new()
                .name(format!("{}-log-addrs", self.name))
                .spawn(move || shared.config_thread(request, generation, tx))?;
            inner.claimer = Some(handle);
        }

        match rx {
            None => Ok(log),
            Some(rx) => rx.recv().map_err(|_| CecError::Interrupted)?,
        }
    }

    fn config_thread(
        &self,
        mut log: CecLogAddrs,
        generation: u64,
        done: Option<mpsc::SyncSender<Result<CecLogAddrs>>>,
    ) {
        let res = self.config_log_addrs(&mut log, generation);
        match &res {
            Ok(()) => debug!(adapter = %self.name, addrs = ?log.addresses(), "logical addresses configured"),
            Err(e) => warn!(adapter = %self.name, error = %e, "claiming logical addresses failed"),
        }
        self.post_event(CecEventType::Ready, 0);
        if let Some(done) = done {
            let res = res.map(|()| CecLogAddrs::from_adapter(&self.lock()));
            let _ = done.send(res);
        }
    }

    fn check_interrupted(&self, generation: u64) -> Result<()> {
        let inner = self.lock();
        if inner.stop || inner.generation != generation {
            Err(CecError::Interrupted)
        } else {
            Ok(())
        }
    }

    fn config_log_addrs(&self, log: &mut CecLogAddrs, generation: u64) -> Result<()> {
        let phys_addr = self.lock().phys_addr;
        // TV at a non-root position must claim as a specific device
        if phys_addr != 0 {
            for r in &mut log.log_addrs {
                if r.log_addr_type == CecLogAddrType::TV {
                    r.log_addr_type = CecLogAddrType::SPECIFIC;
                }
            }
        }
        debug!(adapter = %self.name, phys_addr = format_args!("{:#06x}", phys_addr), n = log.log_addrs.len(), "claiming logical addresses");

        let mut taken: u16 = 0;
        for req in log.log_addrs.iter_mut() {
            for &la in req.log_addr_type.candidates() {
                self.check_interrupted(generation)?;
                if taken & (1 << la) != 0 {
                    continue;
                }
                let poll = self.transmit_msg(CecMsg::poll(la), true)?;
                let status = poll.tx_status();
                if status.contains(TxStatus::ERROR) {
                    return Err(CecError::Transmit(status));
                }
                if status != TxStatus::RETRY_TIMEOUT {
                    trace!(adapter = %self.name, la, ?status, "logical address in use");
                    continue;
                }
                taken |= 1 << la;
                let idx = {
                    let mut inner = self.lock();
                    if inner.stop || inner.generation != generation {
                        return Err(CecError::Interrupted);
                    }
                    inner.bindings.push(Binding {
                        log_addr: la,
                        log_addr_type: req.log_addr_type,
                        primary_device_type: req.primary_device_type,
                        all_device_types: req.all_device_types,
                        features: req.features,
                        flags: req.flags & CecLogAddrFlags::HANDLE_MSGS,
                    });
                    inner.phys_addrs[la as usize] = phys_addr;
                    inner.bindings.len() - 1
                };
                req.log_addr = Some(CecLogicalAddress::from_nibble(la));
                self.hw.claim_logical_address(la)?;
                debug!(adapter = %self.name, la, idx, "claimed logical address");
                self.report_features(idx);
                self.report_phys_addr(idx);
                self.hw.claimed_address(idx);
                break;
            }
        }

        let unclaimed = {
            let mut inner = self.lock();
            if inner.stop || inner.generation != generation {
                return Err(CecError::Interrupted);
            }
            let unclaimed = inner.bindings.is_empty();
            if unclaimed {
                inner.bindings.push(Binding {
                    log_addr: 15,
                    log_addr_type: CecLogAddrType::UNREGISTERED,
                    primary_device_type: CecPrimDevType::SWITCH,
                    all_device_types: AllDevTypes::SWITCH,
                    features: [0; CEC_MAX_FEATURES],
                    flags: CecLogAddrFlags::empty(),
                });
            }
            unclaimed
        };
        if unclaimed {
            debug!(adapter = %self.name, "no logical address free, using unregistered");
            self.hw.claim_logical_address(15)?;
            self.report_phys_addr(0);
            self.hw.claimed_address(0);
        }
        Ok(())
    }

    /// Broadcast Report Features for binding `idx`. CEC 2.0 only.
    pub(crate) fn report_features(&self, idx: usize) {
        let msg = {
            let inner = self.lock();
            if inner.cec_version < Version::V2_0 {
                return;
            }
            let Some(b) = inner.bindings.get(idx) else {
                return;
            };
            CecMsg::init(
                CecLogicalAddress::from_nibble(b.log_addr),
                CecLogicalAddress::UnregisteredBroadcast,
            )
            .report_features(inner.cec_version, b.all_device_types.bits(), &b.features)
        };
        if let Err(e) = self.transmit_msg(msg, false) {
            warn!(adapter = %self.name, error = %e, "could not report features");
        }
    }

    /// Broadcast Report Physical Address for binding `idx`.
    pub(crate) fn report_phys_addr(&self, idx: usize) {
        let msg = {
            let inner = self.lock();
            let Some(b) = inner.bindings.get(idx) else {
                return;
            };
            CecMsg::init(
                CecLogicalAddress::from_nibble(b.log_addr),
                CecLogicalAddress::UnregisteredBroadcast,
            )
            .report_physical_addr(inner.phys_addr, b.primary_device_type)
        };
        if let Err(e) = self.transmit_msg(msg, false) {
            warn!(adapter = %self.name, error = %e, "could not report physical address");
        }
    }
}

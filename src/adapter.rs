use crate::claim::{Binding, CecLogAddrs};
use crate::config::AdapterConfig;
use crate::error::{CecError, Result};
use crate::hardware::CecHardware;
use crate::message::{CecMsg, TxStatus};
use crate::queue::{BoundedQueue, EventRing};
use crate::types::{
    Capabilities, CecLogicalAddress, CecOpcode, CecPhysicalAddress, CecPowerStatus,
    CecPrimDevType, OSDStr, Version, CEC_OP_HPD_ERROR_INITIATOR_WRONG_STATE,
    CEC_PHYS_ADDR_INVALID, CEC_VENDOR_ID_NONE,
};
use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::sync::{mpsc, Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

pub const CEC_TX_QUEUE_SZ: usize = 4;
pub const CEC_RX_QUEUE_SZ: usize = 4;
pub const CEC_EV_QUEUE_SZ: usize = 40;

/// UI command code of the power key, see [CecAdapter::keypress]
pub const CEC_UI_CMD_POWER: u8 = 0x40;

/// Adapter life cycle.
///
/// `Disabled → Unconfigured → Idle ⇄ Transmitting ⇄ Wait`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AdapterState {
    Disabled,
    /// Enabled, no logical address.
    Unconfigured,
    Idle,
    /// A frame is on the wire.
    Transmitting,
    /// A frame was sent, its reply is outstanding.
    Wait,
}

/// Kind of a [CecEvent]
#[derive(Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Clone, Copy)]
#[repr(u32)]
pub enum CecEventType {
    Connect = 1,
    /// Logical address claiming finished
    Ready = 2,
    Disconnect = 3,
    /// A reply to a non-blocking transmit arrived. See [CecEvent::sequence]
    GotReply = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CecEvent {
    /// Nanoseconds since the adapter was created
    pub ts: u64,
    pub kind: CecEventType,
    /// For [CecEventType::GotReply]: the sequence of the transmit
    pub sequence: u32,
}

/// information about the CEC adapter
#[derive(Debug, Clone)]
pub struct CecCaps {
    name: String,
    available_log_addrs: u8,
    capabilities: Capabilities,
}
impl CecCaps {
    /// name of the adapter
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
    /// number of available logical addresses
    #[inline]
    pub fn available_log_addrs(&self) -> u8 {
        self.available_log_addrs
    }
    /// capabilities of the CEC adapter
    #[inline]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}

bitflags! {
    /// What an operation would find right now, see [CecAdapter::readiness]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Readiness: u8 {
        /// room in the transmit queue
        const WRITABLE = 1 << 0;
        /// a received message is waiting
        const READABLE = 1 << 1;
        /// an event is waiting
        const PRIORITY = 1 << 2;
    }
}

pub(crate) struct TxEntry {
    pub msg: CecMsg,
    /// Blocking callers wait on the other end.
    pub notify: Option<mpsc::SyncSender<CecMsg>>,
    pub blocking: bool,
    /// Set by the bus side when the current step (transmit or reply wait) finished.
    pub done: bool,
}

pub(crate) struct Inner {
    pub state: AdapterState,
    pub tx_queue: BoundedQueue<TxEntry, CEC_TX_QUEUE_SZ>,
    pub rx_queue: BoundedQueue<CecMsg, CEC_RX_QUEUE_SZ>,
    pub ev_queue: EventRing<CecEvent, CEC_EV_QUEUE_SZ>,

    pub phys_addr: CecPhysicalAddress,
    pub vendor_id: u32,
    pub cec_version: Version,
    pub passthrough: bool,
    pub osd_name: OSDStr<14>,
    pub pwr_state: CecPowerStatus,
    pub bindings: Vec<Binding>,
    /// Physical address of every logical address 0..=14, as far as known.
    pub phys_addrs: [CecPhysicalAddress; 15],
    pub sequence: u32,

    /// wake-up for the transmit worker
    pub kthread_wake: bool,
    pub stop: bool,
    /// Bumped whenever queues and bindings are torn down.
    /// Waiters that see it change were interrupted.
    pub generation: u64,
    pub claimer: Option<JoinHandle<()>>,
}

impl Inner {
    fn new(power_status: CecPowerStatus) -> Self {
        Self {
            state: AdapterState::Disabled,
            tx_queue: BoundedQueue::new(),
            rx_queue: BoundedQueue::new(),
            ev_queue: EventRing::new(),
            phys_addr: CEC_PHYS_ADDR_INVALID,
            vendor_id: CEC_VENDOR_ID_NONE,
            cec_version: Version::V2_0,
            passthrough: false,
            osd_name: OSDStr::default(),
            pwr_state: power_status,
            bindings: Vec::new(),
            phys_addrs: [CEC_PHYS_ADDR_INVALID; 15],
            sequence: 1,
            kthread_wake: false,
            stop: false,
            generation: 0,
            claimer: None,
        }
    }
    pub fn log_addr2idx(&self, log_addr: u8) -> Option<usize> {
        self.bindings.iter().position(|b| b.log_addr == log_addr)
    }
    /// primary device type behind `log_addr`, or that of the first binding
    pub fn log_addr2dev(&self, log_addr: u8) -> CecPrimDevType {
        let idx = self.log_addr2idx(log_addr).unwrap_or(0);
        self.bindings
            .get(idx)
            .map(|b| b.primary_device_type)
            .unwrap_or(CecPrimDevType::TV)
    }
    pub fn next_sequence(&mut self) -> u32 {
        let seq = self.sequence;
        self.sequence = self.sequence.wrapping_add(1).max(1);
        seq
    }
    /// Drop all queued work and claimed addresses.
    /// Blocked transmitters see their completion channel close.
    pub fn clear_queues(&mut self) {
        self.tx_queue.clear();
        self.rx_queue.clear();
        self.ev_queue.clear();
        self.bindings.clear();
        self.generation += 1;
    }
}

pub(crate) struct Shared {
    pub name: String,
    pub capabilities: Capabilities,
    pub available_log_addrs: u8,
    pub is_sink: bool,
    pub hw: Box<dyn CecHardware>,
    inner: Mutex<Inner>,
    /// the transmit worker sleeps here
    pub kthread_waitq: Condvar,
    /// blocked receivers and readiness waiters sleep here
    pub waitq: Condvar,
    epoch: Instant,
}

impl Shared {
    pub fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
    pub fn now_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
    pub fn wake_worker(&self, inner: &mut Inner) {
        inner.kthread_wake = true;
        self.kthread_waitq.notify_one();
    }

    pub fn enable(&self, enable: bool) -> Result<()> {
        let mut inner = self.lock();
        self.hw.enable(enable)?;
        inner.clear_queues();
        inner.phys_addrs = [CEC_PHYS_ADDR_INVALID; 15];
        inner.state = if enable {
            AdapterState::Unconfigured
        } else {
            AdapterState::Disabled
        };
        debug!(adapter = %self.name, enable, "adapter state changed");
        self.waitq.notify_all();
        Ok(())
    }

    pub fn receive_msg(&self, timeout_ms: u32, block: bool) -> Result<CecMsg> {
        let deadline =
            (timeout_ms > 0).then(|| Instant::now() + Duration::from_millis(timeout_ms.into()));
        let mut inner = self.lock();
        let generation = inner.generation;
        loop {
            if let Some(msg) = inner.rx_queue.pop() {
                return Ok(msg);
            }
            if !block {
                return Err(CecError::WouldBlock);
            }
            if inner.stop || inner.generation != generation {
                return Err(CecError::Interrupted);
            }
            inner = match deadline {
                None => self.waitq.wait(inner).unwrap_or_else(PoisonError::into_inner),
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return Err(CecError::Timeout);
                    }
                    self.waitq
                        .wait_timeout(inner, d - now)
                        .map(|(g, _)| g)
                        .unwrap_or_else(|e| e.into_inner().0)
                }
            };
        }
    }

    pub fn post_event(&self, kind: CecEventType, sequence: u32) {
        let ts = self.now_ns();
        let mut inner = self.lock();
        if let Some(lost) = inner.ev_queue.push(CecEvent { ts, kind, sequence }) {
            trace!(adapter = %self.name, ?lost, "event queue full, dropped oldest event");
        }
        self.waitq.notify_all();
    }
}

/// The hardware side's way back into the adapter.
///
/// Holds no strong reference: calls after the adapter was dropped do nothing.
#[derive(Clone)]
pub struct BusHandle(Weak<Shared>);

impl BusHandle {
    /// The frame handed to [CecHardware::begin_transmit] finished with `status`.
    pub fn transmit_done(&self, status: TxStatus) {
        if let Some(shared) = self.0.upgrade() {
            shared.transmit_done(status);
        }
    }
    /// A frame was received from the bus.
    pub fn received(&self, msg: &CecMsg) {
        if let Some(shared) = self.0.upgrade() {
            shared.received(msg.clone());
        }
    }
    /// Queue an event for the application, e.g. a hotplug [CecEventType::Connect].
    pub fn post_event(&self, kind: CecEventType) {
        if let Some(shared) = self.0.upgrade() {
            shared.post_event(kind, 0);
        }
    }
}

/**
 * A CEC adapter: queues, transmit state machine, address claiming and
 * core message processing on top of a [CecHardware] driver.
 *
 * ```no_run
 * # use cec_core::*;
 * # fn demo(hw: impl CecHardware) -> cec_core::Result<()> {
 * let cec = CecAdapter::new(AdapterConfig::new("hdmi0"), hw)?;
 * cec.set_enabled(true)?;
 * cec.set_phys(0x1000)?;
 * cec.set_log(CecLogAddrs::single(CecLogAddrType::PLAYBACK, CecPrimDevType::PLAYBACK))?;
 * cec.transmit_opcode(CecLogicalAddress::Playback1, CecLogicalAddress::Tv, CecOpcode::ImageViewOn)?;
 * # Ok(())
 * # }
 * ```
 */
pub struct CecAdapter {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl CecAdapter {
    /// Create a disabled adapter and start its transmit worker.
    pub fn new<H: CecHardware>(config: AdapterConfig, hw: H) -> Result<Self> {
        config.validate()?;
        let shared = Arc::new(Shared {
            name: config.name.clone(),
            capabilities: config.capabilities,
            available_log_addrs: config.available_log_addrs,
            is_sink: config.is_sink,
            hw: Box::new(hw),
            inner: Mutex::new(Inner::new(config.power_status)),
            kthread_waitq: Condvar::new(),
            waitq: Condvar::new(),
            epoch: Instant::now(),
        });
        let worker = {
            let shared = shared.clone();
            std::thread::Builder::new()
                .name(format!("{}-tx", config.name))
                .spawn(move || shared.run_transmit_worker())?
        };
        debug!(adapter = %config.name, caps = ?config.capabilities, "adapter created");
        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Entry points for the driver's completion and receive paths.
    pub fn bus_handle(&self) -> BusHandle {
        BusHandle(Arc::downgrade(&self.shared))
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    fn require(&self, cap: Capabilities) -> Result<()> {
        if self.shared.capabilities.contains(cap) {
            Ok(())
        } else {
            Err(CecError::NotSupported)
        }
    }

    /// query information on the adapters capabilities. See [CecCaps]
    pub fn get_capas(&self) -> CecCaps {
        CecCaps {
            name: self.shared.name.clone(),
            available_log_addrs: self.shared.available_log_addrs,
            capabilities: self.shared.capabilities,
        }
    }
    pub fn state(&self) -> AdapterState {
        self.shared.lock().state
    }
    pub fn is_enabled(&self) -> bool {
        self.state() != AdapterState::Disabled
    }
    /// Power the adapter up or down, as the driver.
    /// Disabling drops all queued messages, events and logical addresses.
    pub fn enable(&self, enable: bool) -> Result<()> {
        self.shared.enable(enable)
    }
    /// Power the adapter up or down. Needs [Capabilities::STATE].
    pub fn set_enabled(&self, enable: bool) -> Result<()> {
        self.require(Capabilities::STATE)?;
        if self.is_enabled() == enable {
            return Ok(());
        }
        self.shared.enable(enable)
    }

    /// Query physical address
    /// e.g. 0x3300 -> 3.3.0.0
    pub fn get_phys(&self) -> CecPhysicalAddress {
        self.shared.lock().phys_addr
    }
    /// Set the physical address. Needs [Capabilities::PHYS_ADDR].
    ///
    /// Fails with [CecError::Busy] once logical addresses are claimed.
    pub fn set_phys(&self, phys_addr: CecPhysicalAddress) -> Result<()> {
        self.require(Capabilities::PHYS_ADDR)?;
        let mut inner = self.shared.lock();
        if inner.phys_addr == phys_addr {
            return Ok(());
        }
        if inner.state > AdapterState::Unconfigured {
            return Err(CecError::Busy);
        }
        inner.phys_addr = phys_addr;
        Ok(())
    }

    /// Query logical addresses
    pub fn get_log(&self) -> CecLogAddrs {
        CecLogAddrs::from_adapter(&self.shared.lock())
    }
    /**
     * Claim logical addresses and wait until claiming finished.
     * Needs [Capabilities::LOG_ADDRS].
     *
     * Returns the addresses actually claimed, which may be fewer than requested.
     * An empty request clears all addresses and drops back to unconfigured.
     * Fails with [CecError::Busy] if addresses are held already.
     */
    pub fn set_log(&self, log: CecLogAddrs) -> Result<CecLogAddrs> {
        self.claim_log_addrs(log, true)
    }
    /// As [CecAdapter::set_log], `block == false` returns once claiming started.
    /// A [CecEventType::Ready] event is posted when it finished.
    pub fn claim_log_addrs(&self, log: CecLogAddrs, block: bool) -> Result<CecLogAddrs> {
        self.require(Capabilities::LOG_ADDRS)?;
        if !log.log_addrs.is_empty() && self.state() > AdapterState::Unconfigured {
            return Err(CecError::Busy);
        }
        self.shared.claim_log_addrs(log, block)
    }

    pub fn get_vendor_id(&self) -> u32 {
        self.shared.lock().vendor_id
    }
    /// Set the 24 bit vendor ID, or [CEC_VENDOR_ID_NONE]. Needs [Capabilities::VENDOR_ID].
    pub fn set_vendor_id(&self, vendor_id: u32) -> Result<()> {
        self.require(Capabilities::VENDOR_ID)?;
        if vendor_id != CEC_VENDOR_ID_NONE && vendor_id & 0xff00_0000 != 0 {
            return Err(CecError::InvalidArgument("vendor ID is a 24 bit value"));
        }
        let mut inner = self.shared.lock();
        if inner.vendor_id == vendor_id {
            return Ok(());
        }
        if inner.state > AdapterState::Unconfigured {
            return Err(CecError::Busy);
        }
        inner.vendor_id = vendor_id;
        Ok(())
    }

    pub fn get_passthrough(&self) -> bool {
        self.shared.lock().passthrough
    }
    /// In passthrough mode the core answers nothing and hands every frame
    /// to the application. Needs [Capabilities::PASSTHROUGH].
    pub fn set_passthrough(&self, on: bool) -> Result<()> {
        self.require(Capabilities::PASSTHROUGH)?;
        self.shared.lock().passthrough = on;
        Ok(())
    }

    pub fn power_status(&self) -> CecPowerStatus {
        self.shared.lock().pwr_state
    }
    pub fn set_power_status(&self, status: CecPowerStatus) {
        self.shared.lock().pwr_state = status;
    }

    /**
     * Queue `msg` for transmit. Needs [Capabilities::TRANSMIT].
     *
     * The message gets a fresh [sequence](CecMsg::sequence). Set [CecMsg::reply]
     * to also wait for a reply with that opcode.
     * With `block` the call returns the completed message: check
     * [CecMsg::tx_status], and after a reply `msg`/`len` hold the reply.
     * Without `block` it returns the queued message right away.
     */
    pub fn transmit(&self, msg: CecMsg, block: bool) -> Result<CecMsg> {
        self.require(Capabilities::TRANSMIT)?;
        self.shared.transmit_msg(msg, block)
    }
    /**
     * Receive a single message. Needs [Capabilities::RECEIVE].
     *
     * With `block` wait at most `timeout_ms` (0: forever),
     * otherwise fail with [CecError::WouldBlock] if there is nothing.
     */
    pub fn receive(&self, timeout_ms: u32, block: bool) -> Result<CecMsg> {
        self.require(Capabilities::RECEIVE)?;
        if self.state() <= AdapterState::Unconfigured {
            return Err(CecError::NotConfigured);
        }
        self.shared.receive_msg(timeout_ms, block)
    }
    /// receive a single message.
    /// block forever
    #[inline]
    pub fn rec(&self) -> Result<CecMsg> {
        self.rec_for(0)
    }
    /// receive a single message.
    /// block for at most `timeout` ms.
    #[inline]
    pub fn rec_for(&self, timeout: u32) -> Result<CecMsg> {
        self.receive(timeout, true)
    }
    /// Take the oldest pending event.
    pub fn get_event(&self) -> Result<CecEvent> {
        let mut inner = self.shared.lock();
        if inner.state <= AdapterState::Unconfigured {
            return Err(CecError::NotConfigured);
        }
        inner.ev_queue.pop().ok_or(CecError::NotReady)
    }
    /// Queue an event for the application.
    pub fn post_event(&self, kind: CecEventType, sequence: u32) {
        self.shared.post_event(kind, sequence)
    }
    /// Which of transmit, receive and get_event would not block right now.
    pub fn readiness(&self) -> Readiness {
        let inner = self.shared.lock();
        let mut r = Readiness::empty();
        r.set(Readiness::WRITABLE, !inner.tx_queue.is_full());
        r.set(Readiness::READABLE, !inner.rx_queue.is_empty());
        r.set(Readiness::PRIORITY, !inner.ev_queue.is_empty());
        r
    }

    /**
     * Sink: tell the source at `input_port` about a hotplug change via CDC.
     * Returns the HPD error code, [CEC_OP_HPD_ERROR_INITIATOR_WRONG_STATE]
     * while no logical address is claimed.
     */
    pub fn sink_cdc_hpd(&self, input_port: u8, cdc_hpd_state: u8) -> Result<u8> {
        let (log_addr, phys_addr) = {
            let inner = self.shared.lock();
            if inner.state <= AdapterState::Unconfigured {
                return Ok(CEC_OP_HPD_ERROR_INITIATOR_WRONG_STATE);
            }
            match inner.bindings.first() {
                Some(b) => (b.log_addr, inner.phys_addr),
                None => return Ok(CEC_OP_HPD_ERROR_INITIATOR_WRONG_STATE),
            }
        };
        let mut msg = CecMsg::init(
            CecLogicalAddress::from_nibble(log_addr),
            CecLogicalAddress::UnregisteredBroadcast,
        )
        .cdc_hpd(phys_addr, true, (input_port << 4) | (cdc_hpd_state & 0xf));
        msg.reply = crate::types::CEC_MSG_CDC_HPD_REPORT_STATE;
        self.shared.transmit_msg(msg, false)?;
        Ok(crate::types::CEC_OP_HPD_ERROR_NONE)
    }

    /// wake a remote cec device from standby
    pub fn turn_on(&self, from: CecLogicalAddress, to: CecLogicalAddress) -> Result<()> {
        if to == CecLogicalAddress::Tv {
            self.transmit_opcode(from, to, CecOpcode::ImageViewOn)
        } else {
            self.keypress(from, to, CEC_UI_CMD_POWER)
        }
    }
    /// send a button press to a remote cec device
    pub fn keypress(&self, from: CecLogicalAddress, to: CecLogicalAddress, key: u8) -> Result<()> {
        self.transmit_data(from, to, CecOpcode::UserControlPressed, &[key])?;
        self.transmit_opcode(from, to, CecOpcode::UserControlReleased)
    }
    /// send a cec command without parameters to a remote device
    ///
    /// transmitting from an address this adapter has not claimed is InvalidArgument
    pub fn transmit_opcode(
        &self,
        from: CecLogicalAddress,
        to: CecLogicalAddress,
        opcode: CecOpcode,
    ) -> Result<()> {
        self.transmit_data(from, to, opcode, &[])
    }
    /// send a cec command with parameters to a remote device.
    /// The format of `data` depends on the `opcode`.
    pub fn transmit_data(
        &self,
        from: CecLogicalAddress,
        to: CecLogicalAddress,
        opcode: CecOpcode,
        data: &[u8],
    ) -> Result<()> {
        let mut msg = CecMsg::init(from, to);
        msg.set_opcode(opcode, data)?;
        let msg = self.transmit(msg, true)?;
        msg_to_result(&msg)
    }
    /**
     * send a cec command with parameters and wait for a reply with opcode `wait_for`. Then return its payload.
     * ```no_run
     * # use cec_core::{CecAdapter, CecLogicalAddress, CecOpcode};
     * # fn demo(cec: &CecAdapter) -> cec_core::Result<()> {
     * let audio = cec.request_data(CecLogicalAddress::Playback1, CecLogicalAddress::Audiosystem,
     *     CecOpcode::GiveAudioStatus, b"", CecOpcode::ReportAudioStatus)?;
     * println!("Muted: {}", audio[0] & 0x80);
     * println!("Vol: {}%", audio[0] & 0x7f);
     * # Ok(())
     * # }
     * ```
     */
    pub fn request_data(
        &self,
        from: CecLogicalAddress,
        to: CecLogicalAddress,
        opcode: CecOpcode,
        data: &[u8],
        wait_for: CecOpcode,
    ) -> Result<Vec<u8>> {
        let mut msg = CecMsg::init(from, to);
        msg.set_opcode(opcode, data)?;
        msg.reply = wait_for.into();
        let msg = self.transmit(msg, true)?;
        msg_to_result(&msg)?;
        Ok(msg.parameters().to_vec())
    }
}

/// Turn a completed message into a Result
fn msg_to_result(msg: &CecMsg) -> Result<()> {
    if msg.is_ok() {
        Ok(())
    } else {
        Err(CecError::Transmit(msg.tx_status()))
    }
}

impl Drop for CecAdapter {
    fn drop(&mut self) {
        let (claimer, enabled) = {
            let mut inner = self.shared.lock();
            inner.stop = true;
            (inner.claimer.take(), inner.state != AdapterState::Disabled)
        };
        if enabled {
            if let Err(e) = self.shared.enable(false) {
                warn!(adapter = %self.shared.name, error = %e, "disabling adapter failed");
                self.shared.lock().clear_queues();
            }
        }
        self.shared.kthread_waitq.notify_all();
        self.shared.waitq.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        if let Some(claimer) = claimer {
            let _ = claimer.join();
        }
        debug!(adapter = %self.shared.name, "adapter deleted");
    }
}

#![allow(dead_code)]
//! A scripted CEC bus for the integration tests.
//!
//! Frames handed to the hardware go to a bus thread, which acknowledges them
//! for the devices that are present, answers from a reply table and records
//! them, all through a [BusHandle] like an interrupt handler would.

use cec_core::*;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HwCall {
    Enable(bool),
    Claim(u8),
    CancelTransmit,
    KeyDown(u16),
    KeyUp,
    SinkInitiateArc,
    SinkTerminateArc,
    SourceArcInitiated,
    SourceArcTerminated,
    CdcHpd(u8),
}

#[derive(Default)]
pub struct Bus {
    handle: OnceLock<BusHandle>,
    /// logical addresses that acknowledge
    present: Mutex<Vec<u8>>,
    /// (destination, opcode) -> answer frame
    replies: Mutex<Vec<(u8, u8, Vec<u8>)>>,
    sent: Mutex<Vec<Vec<u8>>>,
    calls: Mutex<Vec<HwCall>>,
    /// drop frames without completing them
    silent: AtomicBool,
}

impl Bus {
    pub fn set_present(&self, las: &[u8]) {
        *self.present.lock().unwrap() = las.to_vec();
    }
    pub fn reply(&self, to: u8, opcode: u8, frame: &[u8]) {
        self.replies
            .lock()
            .unwrap()
            .push((to, opcode, frame.to_vec()));
    }
    pub fn set_silent(&self, silent: bool) {
        self.silent.store(silent, Ordering::SeqCst);
    }
    /// a frame from another device
    pub fn inject(&self, frame: &[u8]) {
        let msg = CecMsg::from_bytes(frame).unwrap();
        self.handle.get().unwrap().received(&msg);
    }
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }
    pub fn calls(&self) -> Vec<HwCall> {
        self.calls.lock().unwrap().clone()
    }
    pub fn clear_sent(&self) {
        self.sent.lock().unwrap().clear();
    }
    /// Wait until `frame` was put on the bus.
    pub fn wait_sent(&self, frame: &[u8]) -> bool {
        wait_until(Duration::from_secs(3), || {
            self.sent.lock().unwrap().iter().any(|f| f == frame)
        })
    }
    fn call(&self, c: HwCall) {
        self.calls.lock().unwrap().push(c);
    }

    fn run(&self, rx: mpsc::Receiver<CecMsg>) {
        for msg in rx {
            if self.silent.load(Ordering::SeqCst) {
                continue;
            }
            let Some(handle) = self.handle.get() else {
                continue;
            };
            let dest = msg.msg[0] & 0xf;
            let acked = dest == 0xf || self.present.lock().unwrap().contains(&dest);
            handle.transmit_done(if acked {
                TxStatus::OK
            } else {
                TxStatus::RETRY_TIMEOUT
            });
            self.sent.lock().unwrap().push(msg.as_bytes().to_vec());
            if !acked || msg.len < 2 {
                continue;
            }
            let answer = self
                .replies
                .lock()
                .unwrap()
                .iter()
                .find(|(to, op, _)| *to == dest && *op == msg.msg[1])
                .map(|(_, _, f)| f.clone());
            if let Some(answer) = answer {
                // the other device takes a moment
                std::thread::sleep(Duration::from_millis(30));
                handle.received(&CecMsg::from_bytes(&answer).unwrap());
            }
        }
    }
}

pub struct MockHw {
    bus: Arc<Bus>,
    wire: Mutex<mpsc::Sender<CecMsg>>,
}

impl CecHardware for MockHw {
    fn enable(&self, on: bool) -> io::Result<()> {
        self.bus.call(HwCall::Enable(on));
        Ok(())
    }
    fn claim_logical_address(&self, log_addr: u8) -> io::Result<()> {
        self.bus.call(HwCall::Claim(log_addr));
        Ok(())
    }
    fn begin_transmit(&self, msg: &CecMsg) -> io::Result<()> {
        self.wire
            .lock()
            .unwrap()
            .send(msg.clone())
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))
    }
    fn cancel_transmit(&self) {
        self.bus.call(HwCall::CancelTransmit);
    }
    fn sink_initiate_arc(&self) -> io::Result<()> {
        self.bus.call(HwCall::SinkInitiateArc);
        Ok(())
    }
    fn sink_terminate_arc(&self) -> io::Result<()> {
        self.bus.call(HwCall::SinkTerminateArc);
        Ok(())
    }
    fn source_arc_initiated(&self) {
        self.bus.call(HwCall::SourceArcInitiated);
    }
    fn source_arc_terminated(&self) {
        self.bus.call(HwCall::SourceArcTerminated);
    }
    fn source_cdc_hpd(&self, hpd_state: u8) -> u8 {
        self.bus.call(HwCall::CdcHpd(hpd_state));
        CEC_OP_HPD_ERROR_NONE
    }
    fn rc_keydown(&self, code: u16) {
        self.bus.call(HwCall::KeyDown(code));
    }
    fn rc_keyup(&self) {
        self.bus.call(HwCall::KeyUp);
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A disabled adapter on an empty bus
pub fn setup(config: AdapterConfig) -> (CecAdapter, Arc<Bus>) {
    init_tracing();
    let bus = Arc::new(Bus::default());
    let (tx, rx) = mpsc::channel();
    {
        let bus = bus.clone();
        std::thread::spawn(move || bus.run(rx));
    }
    let hw = MockHw {
        bus: bus.clone(),
        wire: Mutex::new(tx),
    };
    let cec = CecAdapter::new(config, hw).unwrap();
    let _ = bus.handle.set(cec.bus_handle());
    (cec, bus)
}

pub fn all_caps() -> AdapterConfig {
    AdapterConfig::new("test").with_capabilities(Capabilities::all())
}

/// Enabled at 1.0.0.0 with Playback 1 claimed, a TV present at 0.
pub fn playback(config: AdapterConfig) -> (CecAdapter, Arc<Bus>) {
    let (cec, bus) = setup(config);
    bus.set_present(&[0]);
    cec.set_enabled(true).unwrap();
    cec.set_phys(0x1000).unwrap();
    let log = CecLogAddrs::single(CecLogAddrType::PLAYBACK, CecPrimDevType::PLAYBACK)
        .with_osd_name("pi4")
        .unwrap();
    let log = cec.set_log(log).unwrap();
    assert_eq!(log.addresses(), vec![CecLogicalAddress::Playback1]);
    // announcements went out
    assert!(bus.wait_sent(&[0x4f, 0x84, 0x10, 0x00, 0x04]));
    wait_until(Duration::from_secs(2), || {
        cec.readiness().contains(Readiness::WRITABLE) && cec.state() == AdapterState::Idle
    });
    (cec, bus)
}

pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut cond: F) -> bool {
    let end = Instant::now() + timeout;
    while Instant::now() < end {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

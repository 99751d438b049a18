mod common;

use cec_core::*;
use common::*;
use std::time::{Duration, Instant};

#[test]
fn starts_disabled() {
    let (cec, bus) = setup(all_caps());
    assert_eq!(cec.state(), AdapterState::Disabled);
    assert_eq!(cec.get_phys(), CEC_PHYS_ADDR_INVALID);
    assert_eq!(cec.get_vendor_id(), CEC_VENDOR_ID_NONE);
    assert!(cec.get_log().log_addrs.is_empty());
    cec.set_enabled(true).unwrap();
    assert_eq!(cec.state(), AdapterState::Unconfigured);
    // already enabled
    cec.set_enabled(true).unwrap();
    assert_eq!(bus.calls(), vec![HwCall::Enable(true)]);
}

#[test]
fn capabilities_are_reported() {
    let cfg = AdapterConfig::new("hdmi1")
        .with_capabilities(Capabilities::TRANSMIT | Capabilities::RECEIVE)
        .with_available_log_addrs(3);
    let (cec, _bus) = setup(cfg);
    let caps = cec.get_capas();
    assert_eq!(caps.name(), "hdmi1");
    assert_eq!(caps.available_log_addrs(), 3);
    assert_eq!(
        caps.capabilities(),
        Capabilities::TRANSMIT | Capabilities::RECEIVE
    );
    assert!(matches!(cec.set_enabled(true), Err(CecError::NotSupported)));
    assert!(matches!(cec.set_phys(0x1000), Err(CecError::NotSupported)));
    assert!(matches!(cec.set_vendor_id(1), Err(CecError::NotSupported)));
    assert!(matches!(cec.set_passthrough(true), Err(CecError::NotSupported)));
}

#[test]
fn bad_config_is_rejected() {
    let hw_cfg = AdapterConfig::new("x").with_available_log_addrs(0);
    struct Nop;
    impl CecHardware for Nop {
        fn enable(&self, _: bool) -> std::io::Result<()> {
            Ok(())
        }
        fn claim_logical_address(&self, _: u8) -> std::io::Result<()> {
            Ok(())
        }
        fn begin_transmit(&self, _: &CecMsg) -> std::io::Result<()> {
            Ok(())
        }
        fn cancel_transmit(&self) {}
    }
    assert!(matches!(
        CecAdapter::new(hw_cfg, Nop),
        Err(CecError::InvalidArgument(_))
    ));
}

#[test]
fn receive_without_message() {
    let (cec, _bus) = playback(all_caps());
    assert!(matches!(cec.receive(0, false), Err(CecError::WouldBlock)));
    let start = Instant::now();
    assert!(matches!(cec.rec_for(100), Err(CecError::Timeout)));
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[test]
fn receive_before_configuration() {
    let (cec, _bus) = setup(all_caps());
    cec.set_enabled(true).unwrap();
    assert!(matches!(cec.rec_for(10), Err(CecError::NotConfigured)));
    assert!(matches!(cec.get_event(), Err(CecError::NotConfigured)));
}

#[test]
fn receive_queue_drops_when_full() {
    let (cec, bus) = playback(all_caps());
    for i in 0..(CEC_RX_QUEUE_SZ as u8 + 2) {
        bus.inject(&[0x0f, 0x89, i]);
    }
    let got: Vec<u8> = std::iter::from_fn(|| cec.receive(0, false).ok())
        .map(|m| m.msg[2])
        .collect();
    assert_eq!(got, (0..CEC_RX_QUEUE_SZ as u8).collect::<Vec<_>>());
}

#[test]
fn event_queue_keeps_latest() {
    let (cec, _bus) = playback(all_caps());
    while cec.get_event().is_ok() {}
    for seq in 0..50 {
        cec.post_event(CecEventType::GotReply, seq);
    }
    let seqs: Vec<u32> = std::iter::from_fn(|| cec.get_event().ok())
        .map(|e| e.sequence)
        .collect();
    assert_eq!(seqs, (10..50).collect::<Vec<_>>());
    assert!(matches!(cec.get_event(), Err(CecError::NotReady)));
}

#[test]
fn hotplug_events_from_driver() {
    let (cec, _bus) = playback(all_caps());
    while cec.get_event().is_ok() {}
    cec.bus_handle().post_event(CecEventType::Disconnect);
    let ev = cec.get_event().unwrap();
    assert_eq!(ev.kind, CecEventType::Disconnect);
    assert_ne!(ev.ts, 0);
}

#[test]
fn disable_interrupts_receiver() {
    let (cec, _bus) = playback(all_caps());
    std::thread::scope(|s| {
        let t = s.spawn(|| cec.rec());
        std::thread::sleep(Duration::from_millis(100));
        cec.set_enabled(false).unwrap();
        assert!(matches!(t.join().unwrap(), Err(CecError::Interrupted)));
    });
    assert!(cec.get_log().log_addrs.is_empty());
}

#[test]
fn handle_outlives_adapter() {
    let (cec, _bus) = playback(all_caps());
    let handle = cec.bus_handle();
    drop(cec);
    handle.transmit_done(TxStatus::OK);
    handle.received(&CecMsg::from_bytes(&[0x04, 0x9f]).unwrap());
    handle.post_event(CecEventType::Connect);
}

#[test]
fn turn_on_tv() {
    let (cec, bus) = playback(all_caps());
    cec.turn_on(CecLogicalAddress::Playback1, CecLogicalAddress::Tv)
        .unwrap();
    assert!(bus.wait_sent(&[0x40, 0x04]));
}

#[test]
fn keypress_sends_press_and_release() {
    let (cec, bus) = playback(all_caps());
    bus.set_present(&[0, 5]);
    cec.keypress(CecLogicalAddress::Playback1, CecLogicalAddress::Audiosystem, 0x41)
        .unwrap();
    assert!(bus.wait_sent(&[0x45, 0x44, 0x41]));
    assert!(bus.wait_sent(&[0x45, 0x45]));
}

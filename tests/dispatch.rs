mod common;

use cec_core::*;
use common::*;
use std::time::Duration;

#[test]
fn answers_get_cec_version() {
    let (_cec, bus) = playback(all_caps());
    bus.inject(&[0x04, 0x9f]);
    assert!(bus.wait_sent(&[0x40, 0x9e, 0x06]));
}

#[test]
fn answers_give_physical_address() {
    let (_cec, bus) = playback(all_caps());
    bus.inject(&[0x04, 0x83]);
    bus.clear_sent();
    bus.inject(&[0x04, 0x83]);
    assert!(bus.wait_sent(&[0x4f, 0x84, 0x10, 0x00, 0x04]));
}

#[test]
fn answers_osd_name_and_power() {
    let (cec, bus) = playback(all_caps());
    bus.inject(&[0x04, 0x46]);
    assert!(bus.wait_sent(&[0x40, 0x47, b'p', b'i', b'4']));
    bus.inject(&[0x04, 0x8f]);
    assert!(bus.wait_sent(&[0x40, 0x90, 0x00]));
    cec.set_power_status(CecPowerStatus::Standby);
    bus.inject(&[0x04, 0x8f]);
    assert!(bus.wait_sent(&[0x40, 0x90, 0x01]));
}

#[test]
fn vendor_id() {
    let (cec, bus) = setup(all_caps());
    bus.set_present(&[0]);
    cec.set_enabled(true).unwrap();
    cec.set_phys(0x1000).unwrap();
    cec.set_vendor_id(0x000c03).unwrap();
    cec.set_log(CecLogAddrs::single(
        CecLogAddrType::PLAYBACK,
        CecPrimDevType::PLAYBACK,
    ))
    .unwrap();
    bus.inject(&[0x04, 0x8c]);
    assert!(bus.wait_sent(&[0x4f, 0x87, 0x00, 0x0c, 0x03]));
}

#[test]
fn no_vendor_id_is_feature_abort() {
    let (_cec, bus) = playback(all_caps());
    bus.inject(&[0x04, 0x8c]);
    assert!(bus.wait_sent(&[0x40, 0x00, 0x8c, 0x00]));
}

#[test]
fn abort_is_refused() {
    let (_cec, bus) = playback(all_caps());
    bus.inject(&[0x04, 0xff]);
    assert!(bus.wait_sent(&[0x40, 0x00, 0xff, 0x04]));
}

#[test]
fn wrong_direction_is_dropped() {
    let (cec, bus) = playback(all_caps());
    // directed-only opcode as broadcast
    bus.inject(&[0x0f, 0x9f]);
    // broadcast-only opcode as directed
    bus.inject(&[0x04, 0x84, 0x20, 0x00, 0x04]);
    std::thread::sleep(Duration::from_millis(100));
    assert!(!bus.sent().iter().any(|f| f.first() == Some(&0x40)));
    assert!(matches!(cec.receive(0, false), Err(CecError::WouldBlock)));
}

#[test]
fn other_messages_go_to_the_application() {
    let (cec, _bus) = playback(all_caps());
    let handle = cec.bus_handle();
    handle.received(&CecMsg::from_bytes(&[0x04, 0x36]).unwrap());
    let msg = cec.rec_for(500).unwrap();
    assert_eq!(msg.as_bytes(), &[0x04, 0x36]);
    assert!(matches!(msg.opcode(), Some(Ok(CecOpcode::Standby))));
    assert_ne!(msg.timestamp(), 0);
}

#[test]
fn not_for_us() {
    let (cec, _bus) = playback(all_caps());
    cec.bus_handle()
        .received(&CecMsg::from_bytes(&[0x05, 0x36]).unwrap());
    std::thread::sleep(Duration::from_millis(50));
    assert!(matches!(cec.receive(0, false), Err(CecError::WouldBlock)));
}

#[test]
fn unhandled_directed_is_aborted() {
    let (cec, bus) = setup(all_caps());
    bus.set_present(&[0]);
    cec.set_enabled(true).unwrap();
    cec.set_phys(0x1000).unwrap();
    let mut log = CecLogAddrs::single(CecLogAddrType::PLAYBACK, CecPrimDevType::PLAYBACK);
    log.log_addrs[0].flags = CecLogAddrFlags::empty();
    cec.set_log(log).unwrap();

    bus.inject(&[0x04, 0x36]);
    assert!(bus.wait_sent(&[0x40, 0x00, 0x36, 0x00]));
    assert!(matches!(cec.receive(0, false), Err(CecError::WouldBlock)));
    // broadcasts still arrive
    bus.inject(&[0x0f, 0x36]);
    assert_eq!(cec.rec_for(500).unwrap().as_bytes(), &[0x0f, 0x36]);
}

#[test]
fn version_1_4_leaves_frames_to_the_application() {
    let (cec, bus) = setup(all_caps());
    bus.set_present(&[0]);
    cec.set_enabled(true).unwrap();
    cec.set_phys(0x1000).unwrap();
    let mut log = CecLogAddrs::single(CecLogAddrType::PLAYBACK, CecPrimDevType::PLAYBACK)
        .with_version(Version::V1_4);
    log.log_addrs[0].flags = CecLogAddrFlags::empty();
    cec.set_log(log).unwrap();
    assert!(bus.wait_sent(&[0x4f, 0x84, 0x10, 0x00, 0x04]));
    bus.clear_sent();

    bus.inject(&[0x04, 0x36]);
    assert_eq!(cec.rec_for(500).unwrap().as_bytes(), &[0x04, 0x36]);
    // no built-in answer either
    bus.inject(&[0x04, 0x9f]);
    assert_eq!(cec.rec_for(500).unwrap().as_bytes(), &[0x04, 0x9f]);
    std::thread::sleep(Duration::from_millis(50));
    assert!(bus.sent().is_empty());
}

#[test]
fn passthrough_skips_core() {
    let (cec, bus) = playback(all_caps());
    cec.set_passthrough(true).unwrap();
    bus.clear_sent();
    bus.inject(&[0x04, 0x9f]);
    assert_eq!(cec.rec_for(500).unwrap().as_bytes(), &[0x04, 0x9f]);
    std::thread::sleep(Duration::from_millis(50));
    assert!(bus.sent().is_empty());
}

#[test]
fn remote_control_keys() {
    let (cec, bus) = playback(all_caps());
    bus.inject(&[0x04, 0x44, 0x41]);
    bus.inject(&[0x04, 0x45]);
    bus.inject(&[0x04, 0x44, 0x60, 0x05]);
    // keys with operands the key path can't express
    bus.inject(&[0x04, 0x44, 0x67, 0x01, 0x02, 0x03, 0x04]);
    assert!(wait_until(Duration::from_secs(1), || bus.calls().contains(&HwCall::KeyUp)));
    let keys: Vec<_> = bus
        .calls()
        .into_iter()
        .filter(|c| matches!(c, HwCall::KeyDown(_) | HwCall::KeyUp))
        .collect();
    assert_eq!(
        keys,
        vec![HwCall::KeyDown(0x41), HwCall::KeyUp, HwCall::KeyDown(0x6005)]
    );
    // the application sees every key frame as well
    let got: Vec<Vec<u8>> = std::iter::from_fn(|| cec.receive(0, false).ok())
        .map(|m| m.as_bytes().to_vec())
        .collect();
    assert_eq!(
        got,
        vec![
            vec![0x04, 0x44, 0x41],
            vec![0x04, 0x45],
            vec![0x04, 0x44, 0x60, 0x05],
            vec![0x04, 0x44, 0x67, 0x01, 0x02, 0x03, 0x04],
        ]
    );
}

#[test]
fn remote_control_needs_capability() {
    let caps = Capabilities::all() - Capabilities::RC;
    let (_cec, bus) = playback(AdapterConfig::new("no-rc").with_capabilities(caps));
    bus.inject(&[0x04, 0x44, 0x41]);
    assert!(bus.wait_sent(&[0x40, 0x00, 0x44, 0x00]));
    assert!(!bus.calls().iter().any(|c| matches!(c, HwCall::KeyDown(_))));
}

#[test]
fn without_receive_directed_is_aborted() {
    let caps = Capabilities::all() - Capabilities::RECEIVE;
    let (_cec, bus) = playback(AdapterConfig::new("tx-only").with_capabilities(caps));
    bus.inject(&[0x04, 0x36]);
    assert!(bus.wait_sent(&[0x40, 0x00, 0x36, 0x00]));
}

#[test]
fn learns_physical_addresses_and_reports_features() {
    let (cec, bus) = playback(all_caps());
    bus.inject(&[0x0f, 0x84, 0x00, 0x00, 0x00]);
    // reported addresses are passed on too
    assert_eq!(cec.rec_for(500).unwrap().msg[1], 0x84);
    bus.clear_sent();
    bus.inject(&[0x04, 0xa5]);
    assert!(bus.wait_sent(&[0x4f, 0xa6, 0x06, 0x10, 0x00, 0x00]));
}

/// A TV with ARC at 0.0.0.0
fn arc_sink() -> (CecAdapter, std::sync::Arc<Bus>) {
    let (cec, bus) = setup(all_caps().with_sink(true));
    bus.set_present(&[5]);
    cec.set_enabled(true).unwrap();
    cec.set_phys(0x0000).unwrap();
    let log = cec
        .set_log(CecLogAddrs::single(CecLogAddrType::TV, CecPrimDevType::TV))
        .unwrap();
    assert_eq!(log.addresses(), vec![CecLogicalAddress::Tv]);
    (cec, bus)
}

#[test]
fn sink_initiates_arc_for_adjacent_source() {
    let (_cec, bus) = arc_sink();
    bus.inject(&[0x5f, 0x84, 0x10, 0x00, 0x05]);
    bus.inject(&[0x50, 0xc0]);
    assert!(bus.wait_sent(&[0x05, 0xc1]));
    assert!(bus.calls().contains(&HwCall::SinkInitiateArc));
    bus.inject(&[0x50, 0xc5]);
    assert!(bus.wait_sent(&[0x05, 0xc2]));
    assert!(bus.calls().contains(&HwCall::SinkTerminateArc));
}

#[test]
fn sink_refuses_arc_for_distant_source() {
    let (_cec, bus) = arc_sink();
    bus.inject(&[0x5f, 0x84, 0x11, 0x00, 0x05]);
    bus.inject(&[0x50, 0xc0]);
    assert!(bus.wait_sent(&[0x05, 0x00, 0xc0, 0x04]));
    assert!(!bus.calls().contains(&HwCall::SinkInitiateArc));
}

#[test]
fn sink_refuses_source_side_arc_messages() {
    let (_cec, bus) = arc_sink();
    bus.inject(&[0x5f, 0x84, 0x10, 0x00, 0x05]);
    bus.inject(&[0x50, 0xc3]);
    assert!(bus.wait_sent(&[0x05, 0x00, 0xc3, 0x04]));
}

#[test]
fn sink_cdc_hotplug() {
    let (cec, bus) = setup(all_caps().with_sink(true));
    cec.set_enabled(true).unwrap();
    assert_eq!(
        cec.sink_cdc_hpd(1, 1).unwrap(),
        CEC_OP_HPD_ERROR_INITIATOR_WRONG_STATE
    );
    cec.set_phys(0x0000).unwrap();
    cec.set_log(CecLogAddrs::single(CecLogAddrType::TV, CecPrimDevType::TV))
        .unwrap();
    assert_eq!(cec.sink_cdc_hpd(1, 1).unwrap(), CEC_OP_HPD_ERROR_NONE);
    assert!(bus.wait_sent(&[0x0f, 0xf8, 0x00, 0x00, 0x10, 0x11]));
}

#[test]
fn source_answers_cdc_hotplug() {
    let (_cec, bus) = playback(all_caps());
    // the sink at 0.0.0.0 sets input 1, which is us
    bus.inject(&[0x0f, 0xf8, 0x00, 0x00, 0x10, 0x11]);
    assert!(bus.wait_sent(&[0x4f, 0xf8, 0x10, 0x00, 0x11, 0x10]));
    assert!(bus.calls().contains(&HwCall::CdcHpd(1)));
}

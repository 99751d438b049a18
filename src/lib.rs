#![cfg_attr(docsrs, feature(doc_cfg))]
/*!
 * The protocol engine of an [HDMI-CEC](https://www.kernel.org/doc/html/v4.9/media/uapi/cec/cec-api.html) adapter in pure rust.
 *
 * A driver implements [CecHardware] for its bus and reports completions and
 * received frames through a [BusHandle]. The [CecAdapter] on top of it
 * queues transmits, waits for replies, claims logical addresses and answers
 * the core CEC messages (version, physical address, vendor ID, OSD name, ARC, ...)
 * on its own. Everything else goes to the application.
 *
 * ```no_run
 * # use cec_core::*;
 * # fn demo(hw: impl CecHardware) -> cec_core::Result<()> {
 * let cec = CecAdapter::new(AdapterConfig::new("hdmi0"), hw)?;
 * cec.set_enabled(true)?;
 * cec.set_phys(0x1000)?;
 * let log = cec.set_log(CecLogAddrs::single(CecLogAddrType::PLAYBACK, CecPrimDevType::PLAYBACK))?;
 * let me = log.addresses()[0];
 * cec.transmit_opcode(me, CecLogicalAddress::Audiosystem, CecOpcode::Standby)?;
 * let msg = cec.rec()?;
 * # Ok(())
 * # }
 * ```
 *
 * Logging goes through [tracing]. Install a subscriber to see it.
 */
mod adapter;
mod claim;
mod config;
mod dispatch;
mod error;
mod hardware;
mod message;
mod queue;
mod transmit;
mod types;

pub use adapter::{
    AdapterState, BusHandle, CecAdapter, CecCaps, CecEvent, CecEventType, Readiness,
    CEC_EV_QUEUE_SZ, CEC_RX_QUEUE_SZ, CEC_TX_QUEUE_SZ, CEC_UI_CMD_POWER,
};
pub use claim::{CecLogAddrs, LogAddrRequest, CEC_MAX_FEATURES};
pub use config::AdapterConfig;
pub use dispatch::phys_addrs_adjacent;
pub use error::{CecError, Result};
pub use hardware::{CecHardware, RxDisposition};
pub use message::{CecMsg, TxStatus, CEC_MAX_MSG_SIZE};
pub use queue::{BoundedQueue, EventRing};
pub use transmit::{CEC_REPLY_TIMEOUT_MS, CEC_XFER_TIMEOUT, CEC_XFER_TIMEOUT_POLL};
pub use types::{
    AllDevTypes, Capabilities, CecAbortReason, CecLogAddrFlags, CecLogAddrMask, CecLogAddrType,
    CecLogicalAddress, CecOpcode, CecPhysicalAddress, CecPowerStatus, CecPrimDevType, OSDStr,
    Version, CEC_MAX_LOG_ADDRS, CEC_MSG_CDC_HPD_REPORT_STATE, CEC_MSG_CDC_HPD_SET_STATE,
    CEC_OP_FEAT_EXT, CEC_OP_HPD_ERROR_INITIATOR_WRONG_STATE, CEC_OP_HPD_ERROR_NONE,
    CEC_PHYS_ADDR_INVALID, CEC_VENDOR_ID_NONE,
};

#[cfg(feature = "tokio")]
#[cfg_attr(docsrs, doc(cfg(feature = "tokio")))]
pub mod tokio;

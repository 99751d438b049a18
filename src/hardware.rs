use crate::message::CecMsg;
use crate::types::CEC_OP_HPD_ERROR_NONE;
use std::io::Result;

/// What the driver's [CecHardware::received] hook did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxDisposition {
    /// The driver consumed the frame, the core does nothing further.
    Handled,
    /// Run core processing and, if unconsumed, queue it for the application.
    NotHandled,
}

/**
 * The driver side of an adapter: the physical bus and its glue.
 *
 * [enable](CecHardware::enable), [begin_transmit](CecHardware::begin_transmit) and
 * [cancel_transmit](CecHardware::cancel_transmit) are called with the adapter lock held.
 * They must not call back into the adapter before returning. Report the outcome of a
 * transmit later, from another context, through [BusHandle::transmit_done](crate::BusHandle::transmit_done).
 *
 * The remaining hooks run without the adapter lock and have defaults,
 * so a driver only implements what its capabilities promise.
 */
pub trait CecHardware: Send + Sync + 'static {
    /// Power the adapter up or down.
    fn enable(&self, on: bool) -> Result<()>;
    /// Start acknowledging frames addressed to `log_addr`.
    fn claim_logical_address(&self, log_addr: u8) -> Result<()>;
    /// Put `msg` on the wire. Completion is reported asynchronously.
    fn begin_transmit(&self, msg: &CecMsg) -> Result<()>;
    /// The running transmit did not complete in time. Abort it.
    fn cancel_transmit(&self);

    /// A logical address was claimed and announced. `idx` is its slot.
    fn claimed_address(&self, _idx: usize) {}
    /// Look at a received frame before the core does.
    fn received(&self, _msg: &CecMsg) -> RxDisposition {
        RxDisposition::NotHandled
    }
    /// Sink: switch the ARC transmitter on. An error suppresses the report.
    fn sink_initiate_arc(&self) -> Result<()> {
        Ok(())
    }
    /// Sink: switch the ARC transmitter off. An error suppresses the report.
    fn sink_terminate_arc(&self) -> Result<()> {
        Ok(())
    }
    /// Source: the sink reported ARC as initiated.
    fn source_arc_initiated(&self) {}
    /// Source: the sink reported ARC as terminated.
    fn source_arc_terminated(&self) {}
    /// Source: apply a CDC hotplug state, return the HPD error code.
    fn source_cdc_hpd(&self, _hpd_state: u8) -> u8 {
        CEC_OP_HPD_ERROR_NONE
    }
    /// Remote control key went down. For play functions with an operand
    /// the code carries the operand in its low byte.
    fn rc_keydown(&self, _code: u16) {}
    /// The last remote control key went up.
    fn rc_keyup(&self) {}
}

impl<T: CecHardware + ?Sized> CecHardware for Box<T> {
    fn enable(&self, on: bool) -> Result<()> {
        (**self).enable(on)
    }
    fn claim_logical_address(&self, log_addr: u8) -> Result<()> {
        (**self).claim_logical_address(log_addr)
    }
    fn begin_transmit(&self, msg: &CecMsg) -> Result<()> {
        (**self).begin_transmit(msg)
    }
    fn cancel_transmit(&self) {
        (**self).cancel_transmit()
    }
    fn claimed_address(&self, idx: usize) {
        (**self).claimed_address(idx)
    }
    fn received(&self, msg: &CecMsg) -> RxDisposition {
        (**self).received(msg)
    }
    fn sink_initiate_arc(&self) -> Result<()> {
        (**self).sink_initiate_arc()
    }
    fn sink_terminate_arc(&self) -> Result<()> {
        (**self).sink_terminate_arc()
    }
    fn source_arc_initiated(&self) {
        (**self).source_arc_initiated()
    }
    fn source_arc_terminated(&self) {
        (**self).source_arc_terminated()
    }
    fn source_cdc_hpd(&self, hpd_state: u8) -> u8 {
        (**self).source_cdc_hpd(hpd_state)
    }
    fn rc_keydown(&self, code: u16) {
        (**self).rc_keydown(code)
    }
    fn rc_keyup(&self) {
        (**self).rc_keyup()
    }
}

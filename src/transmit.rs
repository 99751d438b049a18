//! Transmit queue and the worker thread that drives it.
//!
//! Only the worker moves the adapter between `Idle`, `Transmitting` and `Wait`.
//! The bus side marks the head entry done and wakes it.

use crate::adapter::{AdapterState, Inner, Shared, TxEntry};
use crate::error::{CecError, Result};
use crate::message::{CecMsg, TxStatus, CEC_MAX_MSG_SIZE};
use std::sync::{mpsc, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// How long to wait for the ack of a poll
pub const CEC_XFER_TIMEOUT_POLL: Duration = Duration::from_millis(200);
/// How long to wait for the ack of any other frame
pub const CEC_XFER_TIMEOUT: Duration = Duration::from_millis(1000);
/// How long to wait for a reply, in ms
pub const CEC_REPLY_TIMEOUT_MS: u32 = 1000;

impl Shared {
    /// Validate and queue `msg`. With `block`, wait for its completion.
    pub(crate) fn transmit_msg(&self, mut msg: CecMsg, block: bool) -> Result<CecMsg> {
        if msg.len == 0 || msg.len as usize > CEC_MAX_MSG_SIZE {
            return Err(CecError::InvalidArgument("invalid message length"));
        }
        if msg.reply != 0 && (msg.is_poll() || (msg.is_broadcast() && !msg.is_cdc())) {
            return Err(CecError::InvalidArgument(
                "no reply to a poll or a non-CDC broadcast",
            ));
        }
        if msg.len > 1 && !msg.is_broadcast() && msg.initiator_raw() == msg.destination_raw() {
            return Err(CecError::InvalidArgument("initiator is also the destination"));
        }
        msg.set_tx_status(TxStatus::empty());
        msg.set_timestamp(0);
        if msg.reply != 0 {
            msg.timeout = CEC_REPLY_TIMEOUT_MS;
        }

        let (notify, done) = if block {
            let (tx, rx) = mpsc::sync_channel(1);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        {
            let mut inner = self.lock();
            if inner.stop {
                return Err(CecError::Interrupted);
            }
            if inner.state <= AdapterState::Unconfigured {
                return Err(CecError::NotConfigured);
            }
            let init = msg.initiator_raw();
            if init != 0xf && inner.log_addr2idx(init).is_none() {
                return Err(CecError::InvalidArgument("initiator is not a claimed address"));
            }
            if inner.tx_queue.is_full() {
                trace!(adapter = %self.name, "transmit queue full");
                return Err(CecError::Busy);
            }
            let seq = inner.next_sequence();
            msg.set_sequence(seq);
            trace!(adapter = %self.name, seq, frame = ?msg.as_bytes(), reply = msg.reply, "queue transmit");
            let entry = TxEntry {
                msg: msg.clone(),
                notify,
                blocking: block,
                done: false,
            };
            if inner.tx_queue.push(entry).is_err() {
                return Err(CecError::Busy);
            }
            if inner.state == AdapterState::Idle {
                self.wake_worker(&mut inner);
            }
        }

        match done {
            None => Ok(msg),
            Some(rx) => rx.recv().map_err(|_| CecError::Interrupted),
        }
    }

    /// Completion of the frame handed to the driver.
    pub(crate) fn transmit_done(&self, status: TxStatus) {
        let ts = self.now_ns();
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.state != AdapterState::Transmitting {
            trace!(adapter = %self.name, ?status, state = ?inner.state, "stray transmit_done");
            return;
        }
        let Some(head) = inner.tx_queue.front_mut() else {
            return;
        };
        trace!(adapter = %self.name, seq = head.msg.sequence(), ?status, "transmit done");
        head.msg.set_tx_status(status);
        head.msg.set_timestamp(ts);
        if status != TxStatus::OK {
            head.msg.reply = 0;
        }
        head.done = true;
        self.wake_worker(inner);
    }

    /// Sleep until woken or until `deadline`. Returns whether the deadline passed.
    fn worker_sleep<'a>(
        &'a self,
        mut inner: MutexGuard<'a, Inner>,
        deadline: Option<Instant>,
    ) -> (MutexGuard<'a, Inner>, bool) {
        loop {
            if inner.stop {
                return (inner, false);
            }
            if inner.kthread_wake {
                inner.kthread_wake = false;
                return (inner, false);
            }
            inner = match deadline {
                None => self
                    .kthread_waitq
                    .wait(inner)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return (inner, true);
                    }
                    self.kthread_waitq
                        .wait_timeout(inner, d - now)
                        .map(|(g, _)| g)
                        .unwrap_or_else(|e| e.into_inner().0)
                }
            };
        }
    }

    pub(crate) fn run_transmit_worker(&self) {
        debug!(adapter = %self.name, "transmit worker started");
        let mut deadline: Option<Instant> = None;
        let mut guard = self.lock();
        loop {
            let (woken, timed_out) = self.worker_sleep(guard, deadline);
            guard = woken;
            if guard.stop {
                break;
            }
            let mut completed = None;
            let inner = &mut *guard;
            let in_flight = matches!(
                inner.state,
                AdapterState::Transmitting | AdapterState::Wait
            );

            if in_flight && inner.tx_queue.is_empty() {
                // queues were cleared underneath us
                inner.state = AdapterState::Idle;
                deadline = None;
            } else if in_flight {
                let state = inner.state;
                let mut finished = false;
                if let Some(head) = inner.tx_queue.front_mut() {
                    if timed_out {
                        if state == AdapterState::Transmitting {
                            debug!(adapter = %self.name, seq = head.msg.sequence(), "transmit timed out");
                            self.hw.cancel_transmit();
                            head.msg.set_tx_status(TxStatus::RETRY_TIMEOUT);
                        } else {
                            debug!(adapter = %self.name, seq = head.msg.sequence(), "no reply in time");
                            head.msg.set_tx_status(TxStatus::REPLY_TIMEOUT);
                        }
                        head.msg.reply = 0;
                        head.msg.set_timestamp(self.now_ns());
                        finished = true;
                    } else if head.done {
                        if state == AdapterState::Transmitting
                            && head.msg.reply != 0
                            && head.msg.tx_status() == TxStatus::OK
                        {
                            trace!(adapter = %self.name, seq = head.msg.sequence(), reply = head.msg.reply, "waiting for reply");
                            head.done = false;
                            inner.state = AdapterState::Wait;
                            deadline = Some(
                                Instant::now()
                                    + Duration::from_millis(head.msg.timeout.into()),
                            );
                        } else {
                            finished = true;
                        }
                    }
                }
                if finished {
                    inner.state = AdapterState::Idle;
                    deadline = None;
                    completed = inner.tx_queue.pop();
                    self.waitq.notify_all();
                }
            }

            if let Some(entry) = completed {
                trace!(adapter = %self.name, seq = entry.msg.sequence(), status = ?entry.msg.tx_status(), "transmit complete");
                if let Some(notify) = entry.notify {
                    drop(guard);
                    // capacity 1, never blocks
                    let _ = notify.send(entry.msg);
                    guard = self.lock();
                    if guard.stop {
                        break;
                    }
                }
            }
            let inner = &mut *guard;
            if inner.state == AdapterState::Idle {
                if let Some(head) = inner.tx_queue.front_mut() {
                    head.done = false;
                    let timeout = if head.msg.is_poll() {
                        CEC_XFER_TIMEOUT_POLL
                    } else {
                        CEC_XFER_TIMEOUT
                    };
                    deadline = Some(Instant::now() + timeout);
                    inner.state = AdapterState::Transmitting;
                    trace!(adapter = %self.name, seq = head.msg.sequence(), frame = ?head.msg.as_bytes(), "begin transmit");
                    if let Err(e) = self.hw.begin_transmit(&head.msg) {
                        warn!(adapter = %self.name, error = %e, "driver refused transmit");
                        head.msg.set_tx_status(TxStatus::ERROR);
                        head.msg.reply = 0;
                        head.done = true;
                        inner.kthread_wake = true;
                    }
                }
            }
            if !matches!(
                inner.state,
                AdapterState::Transmitting | AdapterState::Wait
            ) {
                deadline = None;
            }
        }
        debug!(adapter = %self.name, "transmit worker stopped");
    }
}

use crate::message::TxStatus;
use std::io::ErrorKind;

/// Errors reported by the adapter API.
///
/// Transmit results such as "not acknowledged" or "no reply" are not errors
/// of the call itself: they are reported in [CecMsg::tx_status](crate::CecMsg::tx_status).
#[derive(Debug, thiserror::Error)]
pub enum CecError {
    /// Malformed message, illegal reply request, bad address or device type,
    /// malformed feature bytes.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// Queue full, or the configuration is fixed while addresses are claimed.
    #[error("resource busy")]
    Busy,
    /// The adapter is disabled or has no logical address.
    #[error("adapter not configured")]
    NotConfigured,
    /// Non-blocking receive on an empty queue.
    #[error("no message available")]
    WouldBlock,
    /// No event pending.
    #[error("no event available")]
    NotReady,
    /// A blocking receive ran into its timeout.
    #[error("timed out")]
    Timeout,
    /// A blocking call was ended by disabling or dropping the adapter.
    #[error("interrupted")]
    Interrupted,
    /// The adapter lacks the capability for this operation.
    #[error("operation not supported by this adapter")]
    NotSupported,
    /// A message was handled by the bus but did not complete successfully.
    #[error("transmit failed: {0:?}")]
    Transmit(TxStatus),
    /// Hardware layer or OS failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CecError>;

impl From<CecError> for std::io::Error {
    fn from(value: CecError) -> Self {
        let kind = match &value {
            CecError::InvalidArgument(_) => ErrorKind::InvalidInput,
            CecError::Busy => ErrorKind::ResourceBusy,
            CecError::NotConfigured => ErrorKind::NotConnected,
            CecError::WouldBlock | CecError::NotReady => ErrorKind::WouldBlock,
            CecError::Timeout => ErrorKind::TimedOut,
            CecError::Interrupted => ErrorKind::Interrupted,
            CecError::NotSupported => ErrorKind::Unsupported,
            CecError::Transmit(_) => ErrorKind::Other,
            CecError::Io(e) => e.kind(),
        };
        match value {
            CecError::Io(e) => e,
            other => std::io::Error::new(kind, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_kinds() {
        let e: std::io::Error = CecError::Busy.into();
        assert_eq!(e.kind(), ErrorKind::ResourceBusy);
        let e: std::io::Error = CecError::Timeout.into();
        assert_eq!(e.kind(), ErrorKind::TimedOut);
        let e: std::io::Error = CecError::Io(ErrorKind::BrokenPipe.into()).into();
        assert_eq!(e.kind(), ErrorKind::BrokenPipe);
    }
}

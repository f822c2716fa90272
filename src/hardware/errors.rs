//! 硬件错误规范化
//!
//! Maps every vendor-native failure onto the canonical [`WalletsErrorKind`]
//! taxonomy. The native error is kept as the normalized error's source.

use crate::core::errors::{WalletsError, WalletsErrorKind};
use crate::hardware::gridplus::client::LatticeError;
use crate::hardware::ledger::apdu::LedgerError;
use crate::hardware::transport::TransportError;
use crate::hardware::trezor::client::TrezorFailure;

pub const LEDGER_TIMEOUT_MESSAGE: &str = "The request timed out.";
pub const LEDGER_WRONG_APP_MESSAGE: &str =
    "Incorrect network application selected on your Ledger device. Please select the application for the correct network.";
pub const U2F_NOT_SUPPORTED_MESSAGE: &str =
    "The U2F standard that hardware wallets use does not seem to be supported by your browser. Please try again using Google Chrome.";

/// U2F client error code for a timed out request.
const U2F_TIMEOUT_CODE: u32 = 5;

/// Status words returned when the Ethereum app is not the one running.
const WRONG_APP_STATUS: [u16; 5] = [0x6804, 0x6D00, 0x6700, 0x6E00, 0x6511];
/// Status word for a request rejected on the device.
const DENIED_STATUS: u16 = 0x6985;

/// Failure in any of the shapes a backend can produce.
#[derive(Debug)]
pub enum NativeError {
    Ledger(LedgerError),
    Trezor(TrezorFailure),
    GridPlus(LatticeError),
    Transport(TransportError),
    /// Already normalized; passes through unchanged.
    Normalized(WalletsError),
}

impl From<LedgerError> for NativeError {
    fn from(err: LedgerError) -> Self {
        NativeError::Ledger(err)
    }
}

impl From<TrezorFailure> for NativeError {
    fn from(err: TrezorFailure) -> Self {
        NativeError::Trezor(err)
    }
}

impl From<LatticeError> for NativeError {
    fn from(err: LatticeError) -> Self {
        NativeError::GridPlus(err)
    }
}

impl From<TransportError> for NativeError {
    fn from(err: TransportError) -> Self {
        NativeError::Transport(err)
    }
}

impl From<WalletsError> for NativeError {
    fn from(err: WalletsError) -> Self {
        NativeError::Normalized(err)
    }
}

/// Map a native failure onto the canonical taxonomy.
pub fn normalize(err: impl Into<NativeError>) -> WalletsError {
    match err.into() {
        NativeError::Ledger(err) => normalize_ledger(err),
        NativeError::Trezor(err) => normalize_trezor(err),
        NativeError::GridPlus(err) => normalize_gridplus(err),
        NativeError::Transport(err) => normalize_transport(err),
        NativeError::Normalized(err) => err,
    }
}

fn normalize_ledger(err: LedgerError) -> WalletsError {
    let (kind, message) = match &err {
        LedgerError::U2f { code, .. } if *code == U2F_TIMEOUT_CODE => {
            (WalletsErrorKind::Timeout, LEDGER_TIMEOUT_MESSAGE.to_string())
        }
        LedgerError::U2f { message, .. } => (WalletsErrorKind::Unknown, message.clone()),
        LedgerError::U2fNotSupported => (
            WalletsErrorKind::TransportNotSupported,
            U2F_NOT_SUPPORTED_MESSAGE.to_string(),
        ),
        LedgerError::Status { status, .. } if WRONG_APP_STATUS.contains(status) => (
            WalletsErrorKind::WrongApplicationSelected,
            LEDGER_WRONG_APP_MESSAGE.to_string(),
        ),
        LedgerError::Status { status, .. } if *status == DENIED_STATUS => {
            (WalletsErrorKind::Cancelled, err.to_string())
        }
        other => (WalletsErrorKind::Unknown, other.to_string()),
    };
    WalletsError::new(kind, message).with_source(err)
}

fn normalize_trezor(err: TrezorFailure) -> WalletsError {
    let kind = match err.error.as_str() {
        "Iframe blocked" => WalletsErrorKind::IframeBlocked,
        "Iframe timeout" => WalletsErrorKind::Timeout,
        "Cancelled" | "Popup closed" | "Permissions not granted" => WalletsErrorKind::Cancelled,
        _ => match err.code.as_deref() {
            Some("Failure_ActionCancelled") | Some("Failure_PinCancelled") => WalletsErrorKind::Cancelled,
            _ => WalletsErrorKind::Unknown,
        },
    };
    WalletsError::new(kind, err.error.clone()).with_source(err)
}

fn normalize_gridplus(err: LatticeError) -> WalletsError {
    let message = err.to_string();
    let kind = if message.contains("Timeout") {
        WalletsErrorKind::Timeout
    } else if message.contains("Declined") {
        WalletsErrorKind::Cancelled
    } else {
        WalletsErrorKind::Unknown
    };
    WalletsError::new(kind, message).with_source(err)
}

fn normalize_transport(err: TransportError) -> WalletsError {
    let kind = match &err {
        TransportError::OpenFailed(_) | TransportError::NotSupported(_) => {
            WalletsErrorKind::TransportNotSupported
        }
        TransportError::Timeout => WalletsErrorKind::Timeout,
        TransportError::Disconnected(_) | TransportError::Io(_) => WalletsErrorKind::Unknown,
    };
    WalletsError::new(kind, err.to_string()).with_source(err)
}

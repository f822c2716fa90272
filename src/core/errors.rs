use serde::Serialize;
use std::error::Error as StdError;
use std::fmt;

/// Boxed native error kept as the cause of a [`WalletsError`].
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Crate-wide result type.
pub type Result<T, E = WalletsError> = std::result::Result<T, E>;

/// Canonical failure kinds shared by every backend.
///
/// The set is closed and flat: backend-native failures are mapped onto one of
/// these before they reach a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletsErrorKind {
    /// Anything that does not match a known native shape.
    Unknown,
    /// The device or the authorization surface did not answer in time.
    Timeout,
    /// The user declined, closed the popup or cancelled on the device.
    Cancelled,
    /// A transaction is missing a field the backend needs (chain ID, nonce).
    MissingArguments,
    /// Malformed path, out-of-range index or malformed key material.
    InvalidArgument,
    /// Device unlocked but the wrong application is open.
    WrongApplicationSelected,
    /// No usable transport for the device on this platform.
    TransportNotSupported,
    /// The vendor bridge frame could not be loaded.
    IframeBlocked,
    /// The external authorization surface could not be opened.
    PopupBlocked,
    /// The backend cannot perform this operation (e.g. private key export).
    NotSupported,
}

impl WalletsErrorKind {
    /// Default human readable message for the kind.
    pub fn default_message(&self) -> &'static str {
        match self {
            WalletsErrorKind::Unknown => "An unknown error occurred",
            WalletsErrorKind::Timeout => "The request timed out.",
            WalletsErrorKind::Cancelled => "The request was cancelled.",
            WalletsErrorKind::MissingArguments => "Missing chainId or nonce on transaction",
            WalletsErrorKind::InvalidArgument => "Invalid argument",
            WalletsErrorKind::WrongApplicationSelected => {
                "Incorrect network application selected on your device. Please select the application for the correct network."
            }
            WalletsErrorKind::TransportNotSupported => {
                "No supported transport is available for this device."
            }
            WalletsErrorKind::IframeBlocked => "Iframe blocked",
            WalletsErrorKind::PopupBlocked => "Popup blocked",
            WalletsErrorKind::NotSupported => "Method not implemented.",
        }
    }
}

impl fmt::Display for WalletsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WalletsErrorKind::Unknown => "unknown",
            WalletsErrorKind::Timeout => "timeout",
            WalletsErrorKind::Cancelled => "cancelled",
            WalletsErrorKind::MissingArguments => "missing arguments",
            WalletsErrorKind::InvalidArgument => "invalid argument",
            WalletsErrorKind::WrongApplicationSelected => "wrong application selected",
            WalletsErrorKind::TransportNotSupported => "transport not supported",
            WalletsErrorKind::IframeBlocked => "iframe blocked",
            WalletsErrorKind::PopupBlocked => "popup blocked",
            WalletsErrorKind::NotSupported => "not supported",
        };
        f.write_str(name)
    }
}

/// Normalized error returned by every public operation.
///
/// Carries the canonical kind, a message suitable for direct display and the
/// original native error (if any) as its source.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct WalletsError {
    kind: WalletsErrorKind,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl WalletsError {
    /// Create an error with an explicit message.
    pub fn new(kind: WalletsErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create an error using the kind's default message.
    pub fn from_kind(kind: WalletsErrorKind) -> Self {
        Self::new(kind, kind.default_message())
    }

    /// Attach the native error as the cause.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(WalletsErrorKind::InvalidArgument, message)
    }

    pub fn missing_arguments(message: impl Into<String>) -> Self {
        Self::new(WalletsErrorKind::MissingArguments, message)
    }

    pub fn not_supported() -> Self {
        Self::from_kind(WalletsErrorKind::NotSupported)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(WalletsErrorKind::Unknown, message)
    }

    pub fn kind(&self) -> WalletsErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// 是否为用户主动取消
    pub fn is_cancelled(&self) -> bool {
        self.kind == WalletsErrorKind::Cancelled
    }
}

impl From<bip39::Error> for WalletsError {
    fn from(err: bip39::Error) -> Self {
        WalletsError::invalid_argument(format!("Invalid mnemonic phrase: {}", err)).with_source(err)
    }
}

impl From<hex::FromHexError> for WalletsError {
    fn from(err: hex::FromHexError) -> Self {
        WalletsError::invalid_argument(format!("Invalid hex string: {}", err)).with_source(err)
    }
}

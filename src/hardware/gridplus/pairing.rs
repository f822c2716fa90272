//! GridPlus pairing
//!
//! Credentials come from the GridPlus connector page opened in an external
//! authorization surface. The flow is a small state machine:
//!
//! ```text
//! Unpaired -> AwaitingUserCredentials -> Paired
//!                 |                  \-> Cancelled (surface closed)
//!                 \-> Failed (surface could not be opened)
//! ```
//!
//! While awaiting, the surface is polled for closure on a fixed interval and
//! inbound messages are checked; anything that is not a credentials message
//! from the connector origin is ignored.

use crate::core::errors::{WalletsError, WalletsErrorKind};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Message posted to the surface once it is open.
pub const CREDENTIALS_REQUEST: &str = "GET_LATTICE_CREDS";

/// Pairing credentials returned by the connector page.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct GridPlusCredentials {
    #[serde(rename = "deviceID")]
    pub device_id: String,
    pub password: String,
}

impl fmt::Debug for GridPlusCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridPlusCredentials")
            .field("device_id", &self.device_id)
            .field("password", &"***")
            .finish()
    }
}

/// Message received from the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub origin: String,
    pub data: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingState {
    Unpaired,
    AwaitingUserCredentials,
    Paired,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PairingError {
    #[error("Popup blocked")]
    PopupBlocked,
    #[error("Popup closed")]
    Closed,
}

impl From<PairingError> for WalletsError {
    fn from(err: PairingError) -> Self {
        let kind = match err {
            PairingError::PopupBlocked => WalletsErrorKind::PopupBlocked,
            PairingError::Closed => WalletsErrorKind::Cancelled,
        };
        WalletsError::new(kind, err.to_string()).with_source(err)
    }
}

/// External page the user authorizes the pairing in (a browser popup, a
/// webview).
pub trait AuthorizationSurface: Send {
    /// Open `url`; inbound messages arrive on the returned channel. Dropping
    /// the sender counts as closing the surface.
    fn open(&mut self, url: &str) -> Result<mpsc::Receiver<InboundMessage>, PairingError>;

    fn post_message(&mut self, message: &str, target_origin: &str);

    fn is_closed(&self) -> bool;
}

/// One pairing attempt.
pub struct PairingFlow<'a> {
    surface: &'a mut dyn AuthorizationSurface,
    base_url: String,
    name: String,
    poll_interval: Duration,
    state: PairingState,
}

impl<'a> PairingFlow<'a> {
    pub fn new(surface: &'a mut dyn AuthorizationSurface, base_url: &str, name: &str, poll_interval: Duration) -> Self {
        Self {
            surface,
            base_url: base_url.to_string(),
            name: name.to_string(),
            poll_interval,
            state: PairingState::Unpaired,
        }
    }

    pub fn state(&self) -> PairingState {
        self.state
    }

    pub fn url(&self) -> String {
        format!("{}?keyring={}", self.base_url, self.name)
    }

    /// Resolves once with the credentials, or with why none were obtained.
    pub async fn run(&mut self) -> Result<GridPlusCredentials, PairingError> {
        let url = self.url();
        info!("正在等待 Lattice 配对: {}", url);

        let mut inbound = match self.surface.open(&url) {
            Ok(inbound) => inbound,
            Err(err) => {
                self.state = PairingState::Failed;
                return Err(err);
            }
        };
        self.state = PairingState::AwaitingUserCredentials;
        self.surface.post_message(CREDENTIALS_REQUEST, &self.base_url);

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                message = inbound.recv() => match message {
                    Some(message) => {
                        if let Some(credentials) = self.accept(&message) {
                            self.state = PairingState::Paired;
                            info!("✅ Lattice 配对成功");
                            return Ok(credentials);
                        }
                    }
                    None => {
                        self.state = PairingState::Cancelled;
                        return Err(PairingError::Closed);
                    }
                },
                _ = ticker.tick() => {
                    if self.surface.is_closed() {
                        debug!("Authorization surface closed");
                        self.state = PairingState::Cancelled;
                        return Err(PairingError::Closed);
                    }
                }
            }
        }
    }

    fn accept(&self, message: &InboundMessage) -> Option<GridPlusCredentials> {
        if message.origin != self.base_url {
            warn!("Ignoring message from unexpected origin {}", message.origin);
            return None;
        }
        match serde_json::from_str::<GridPlusCredentials>(&message.data) {
            Ok(credentials) => Some(credentials),
            Err(e) => {
                warn!("Ignoring invalid credentials message: {}", e);
                None
            }
        }
    }
}

//! Link + session supervision for the field node.
//!
//! State is `LinkDown → LinkUpSessionDown → LinkUpSessionUp`. The manager owns
//! the link driver and the current session handle; the main loop borrows the
//! session through `session_mut` each iteration and hands any transport error
//! back through `report_failure`, then calls `recover`.

use std::time::Duration;

use rand::Rng;

use crate::error::{ConnectivityError, TransportError};
use crate::field::link::LinkDriver;
use crate::transport::{BrokerConnector, BrokerSession};

pub const DEFAULT_LINK_ATTEMPTS: u32 = 20;
pub const DEFAULT_LINK_POLL: Duration = Duration::from_millis(500);
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    LinkDown,
    LinkUpSessionDown,
    LinkUpSessionUp,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::LinkDown => "link down",
            ConnectionState::LinkUpSessionDown => "link up, session down",
            ConnectionState::LinkUpSessionUp => "link up, session up",
        };
        f.write_str(s)
    }
}

/// Bounded link bring-up: `attempts` checks, `poll_interval` apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkSettings {
    pub attempts: u32,
    pub poll_interval: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_LINK_ATTEMPTS,
            poll_interval: DEFAULT_LINK_POLL,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSettings {
    pub client_id_prefix: String,
    pub inbound_topic: String,
    pub status_topic: String,
    /// Published on `status_topic` right after subscribing.
    pub ready_message: String,
}

/// `<prefix><random u16>`, so quick restarts never reuse an identity the
/// broker may still hold.
pub fn generate_client_id<R: Rng + ?Sized>(prefix: &str, rng: &mut R) -> String {
    format!("{}{}", prefix, rng.gen::<u16>())
}

pub struct ConnectivityManager<L: LinkDriver, C: BrokerConnector> {
    link: L,
    connector: C,
    link_settings: LinkSettings,
    session_settings: SessionSettings,
    backoff: Duration,
    state: ConnectionState,
    session: Option<C::Session>,
}

impl<L: LinkDriver, C: BrokerConnector> ConnectivityManager<L, C> {
    pub fn new(
        link: L,
        connector: C,
        link_settings: LinkSettings,
        session_settings: SessionSettings,
        backoff: Duration,
    ) -> Self {
        Self {
            link,
            connector,
            link_settings,
            session_settings,
            backoff,
            state: ConnectionState::LinkDown,
            session: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Startup bring-up. Either failure is fatal to the caller at startup.
    pub fn start(&mut self) -> Result<(), ConnectivityError> {
        self.bring_up_link()?;
        self.bring_up_session()
    }

    /// Bring the link up, polling for at most `attempts × poll_interval`.
    pub fn bring_up_link(&mut self) -> Result<(), ConnectivityError> {
        if self.link.is_up() {
            self.mark_link_up();
            return Ok(());
        }

        log::info!("Connecting link {}", self.link.describe());
        if let Err(e) = self.link.begin() {
            self.mark_link_down();
            return Err(e);
        }

        let LinkSettings {
            attempts,
            poll_interval,
        } = self.link_settings;
        for _ in 0..attempts {
            if self.link.is_up() {
                break;
            }
            std::thread::sleep(poll_interval);
        }

        if self.link.is_up() {
            log::info!("Link connected: {}", self.link.describe());
            self.mark_link_up();
            Ok(())
        } else {
            log::warn!("Failed to connect link {}", self.link.describe());
            self.mark_link_down();
            Err(ConnectivityError::LinkBringupTimeout {
                attempts,
                waited: poll_interval.saturating_mul(attempts),
            })
        }
    }

    /// Open a session under a fresh identity, subscribe, announce readiness.
    pub fn bring_up_session(&mut self) -> Result<(), ConnectivityError> {
        if !self.link.is_up() {
            self.mark_link_down();
            return Err(ConnectivityError::LinkDown);
        }
        self.drop_session();

        let client_id =
            generate_client_id(&self.session_settings.client_id_prefix, &mut rand::thread_rng());
        let mut session = self.connector.connect(&client_id)?;
        let announced = session
            .subscribe(&self.session_settings.inbound_topic)
            .and_then(|()| {
                session.publish(
                    &self.session_settings.status_topic,
                    self.session_settings.ready_message.as_bytes(),
                )
            });
        if let Err(e) = announced {
            session.close();
            self.state = ConnectionState::LinkUpSessionDown;
            return Err(e.into());
        }

        log::info!(
            "Session up as {}, subscribed to {}",
            client_id,
            self.session_settings.inbound_topic
        );
        self.session = Some(session);
        self.state = ConnectionState::LinkUpSessionUp;
        Ok(())
    }

    /// The live session, or `NotConnected`.
    pub fn session_mut(&mut self) -> Result<&mut C::Session, TransportError> {
        match self.session.as_mut() {
            Some(session) if session.is_connected() => Ok(session),
            _ => Err(TransportError::NotConnected),
        }
    }

    /// Re-read link state. A link that went away takes the session with it.
    pub fn refresh(&mut self) -> ConnectionState {
        if !self.link.is_up() {
            if self.state != ConnectionState::LinkDown {
                log::warn!("Link {} went down", self.link.describe());
            }
            self.mark_link_down();
        } else if self.state == ConnectionState::LinkUpSessionUp
            && !self.session.as_ref().is_some_and(|s| s.is_connected())
        {
            self.drop_session();
            self.state = ConnectionState::LinkUpSessionDown;
        }
        self.state
    }

    /// Downgrade after a failed session operation.
    pub fn report_failure(&mut self, error: &TransportError) {
        log::warn!("Error in main loop: {}", error);
        self.drop_session();
        self.state = if self.link.is_up() {
            ConnectionState::LinkUpSessionDown
        } else {
            ConnectionState::LinkDown
        };
    }

    /// Back off, repair the link if needed, then try a new session. Failures
    /// are logged and left for the next round.
    pub fn recover(&mut self) -> ConnectionState {
        log::info!("Attempting to reconnect...");
        std::thread::sleep(self.backoff);

        if !self.link.is_up() {
            if let Err(e) = self.bring_up_link() {
                log::warn!("Link recovery failed: {}", e);
                return self.state;
            }
        } else if self.state == ConnectionState::LinkDown {
            self.mark_link_up();
        }

        if self.state != ConnectionState::LinkUpSessionUp {
            if let Err(e) = self.bring_up_session() {
                log::warn!("Session bring-up failed: {}", e);
            }
        }
        self.state
    }

    /// Close the session, if any. Used on shutdown.
    pub fn shutdown(&mut self) {
        self.drop_session();
        if self.state == ConnectionState::LinkUpSessionUp {
            self.state = ConnectionState::LinkUpSessionDown;
        }
    }

    fn drop_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
    }

    fn mark_link_up(&mut self) {
        if self.state == ConnectionState::LinkDown {
            self.state = ConnectionState::LinkUpSessionDown;
        }
    }

    fn mark_link_down(&mut self) {
        self.drop_session();
        self.state = ConnectionState::LinkDown;
    }
}

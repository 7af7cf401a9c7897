//! Connection lifecycle for the oximeter
//!
//! `Disconnected -> Connecting -> Discovering -> Subscribed -> Polling`, and
//! back to `Disconnected` on any transport failure, inactivity or shutdown.
//! Between sessions the manager flushes the bus, announces `Reconnecting`
//! and waits out the pending reconnect delay.

use super::session::{DeviceSession, LinkState};
use crate::config::BridgeConfig;
use crate::error::BridgeResult;
use crate::link_span;
use crate::protocol::{decode, Frame, TopicMap, CCCD_PREFIX, ENABLE_NOTIFICATIONS, SERVICE_UUID};
use crate::sensor::{InactivityPolicy, OperatingState, ReadingClassifier, Verdict};
use crate::transport::{DeviceLink, GattDescriptor, Publisher};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Upper bound on buffered frames drained after the first one in a cycle
pub const MAX_FRAMES_PER_CYCLE: usize = 64;

/// Best-effort disconnect must not hold up shutdown
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a connected session (or the attempt to establish one) failed
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Transport failure: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Service {0} not found on device")]
    ServiceNotFound(Uuid),
    #[error("No descriptor with prefix {0} in service")]
    DescriptorNotFound(&'static str),
}

impl CycleError {
    pub fn transport<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CycleError::Transport(Box::new(error))
    }
}

/// How one session ended
#[derive(Debug)]
enum SessionEnd {
    Shutdown,
    Inactive,
    Failed(CycleError),
}

/// Resolves once shutdown is requested; a dropped sender counts as a request
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Run `fut` unless shutdown wins the race first
async fn until_shutdown<F: Future>(
    shutdown: &mut watch::Receiver<bool>,
    fut: F,
) -> Option<F::Output> {
    if *shutdown.borrow() {
        return None;
    }
    tokio::select! {
        biased;
        _ = shutdown_requested(shutdown) => None,
        output = fut => Some(output),
    }
}

/// Drives one [`DeviceLink`] and feeds its frames to a [`ReadingClassifier`]
pub struct LinkManager<L, P>
where
    L: DeviceLink,
    P: Publisher + ?Sized,
{
    link: L,
    classifier: ReadingClassifier<P>,
    session: DeviceSession,
    read_period: Duration,
    notification_timeout: Duration,
}

impl<L, P> LinkManager<L, P>
where
    L: DeviceLink,
    P: Publisher + ?Sized,
{
    pub fn new(link: L, publisher: Arc<P>, topics: TopicMap, config: &BridgeConfig) -> Self {
        let timing = &config.timing;
        Self {
            link,
            classifier: ReadingClassifier::new(
                publisher,
                topics,
                InactivityPolicy::from_timing(timing),
            ),
            session: DeviceSession::new(&config.device.address, timing.reconnect_delay()),
            read_period: timing.read_period(),
            notification_timeout: timing.notification_timeout(),
        }
    }

    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    pub fn classifier(&self) -> &ReadingClassifier<P> {
        &self.classifier
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Supervise the device until shutdown is requested.
    ///
    /// Reconnects forever; only shutdown ends the loop. The bus is flushed
    /// before returning.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> BridgeResult<()> {
        info!(address = %self.session.address(), "Link manager started");

        loop {
            let span = link_span!(address = %self.session.address());
            let end = self.run_session(&mut shutdown).instrument(span).await;

            self.disconnect_quietly().await;

            match end {
                SessionEnd::Shutdown => break,
                SessionEnd::Inactive => info!("Disconnected after inactivity"),
                SessionEnd::Failed(e) => error!("Device session failed: {}", e),
            }

            self.classifier.flush().await;
            self.classifier.announce(OperatingState::Reconnecting).await;

            let delay = self.session.take_reconnect_delay();
            info!("Reconnecting in {:?}", delay);
            if until_shutdown(&mut shutdown, tokio::time::sleep(delay))
                .await
                .is_none()
            {
                break;
            }
            self.classifier.flush().await;
        }

        info!("Shutdown requested, clearing sensor state");
        self.classifier.flush().await;
        Ok(())
    }

    async fn run_session(&mut self, shutdown: &mut watch::Receiver<bool>) -> SessionEnd {
        self.session.begin_attempt();
        let address = self.session.address().to_string();

        info!("Connecting to {}", address);
        match until_shutdown(shutdown, self.link.connect(&address)).await {
            None => return SessionEnd::Shutdown,
            Some(Err(e)) => return SessionEnd::Failed(CycleError::transport(e)),
            Some(Ok(())) => {}
        }

        self.session.set_link_state(LinkState::Discovering);
        let descriptor = match until_shutdown(shutdown, self.discover()).await {
            None => return SessionEnd::Shutdown,
            Some(Err(e)) => return SessionEnd::Failed(e),
            Some(Ok(descriptor)) => descriptor,
        };
        debug!(descriptor = %descriptor.uuid, "Using notification descriptor");
        self.session.set_link_state(LinkState::Subscribed);

        loop {
            self.session.set_link_state(LinkState::Polling);
            match until_shutdown(shutdown, self.poll_once(&descriptor)).await {
                None => return SessionEnd::Shutdown,
                Some(Err(e)) => return SessionEnd::Failed(e),
                Some(Ok(Verdict::InactivityTimeout)) => return SessionEnd::Inactive,
                Some(Ok(Verdict::Continue)) => {}
            }

            let period = self.read_period;
            if until_shutdown(shutdown, tokio::time::sleep(period))
                .await
                .is_none()
            {
                return SessionEnd::Shutdown;
            }
        }
    }

    /// Locate the notification descriptor; the last CCCD in the service wins
    async fn discover(&mut self) -> Result<GattDescriptor, CycleError> {
        let service = self
            .link
            .find_service(SERVICE_UUID)
            .await
            .map_err(CycleError::transport)?
            .ok_or(CycleError::ServiceNotFound(SERVICE_UUID))?;

        service
            .descriptors_with_prefix(CCCD_PREFIX)
            .last()
            .cloned()
            .ok_or(CycleError::DescriptorNotFound(CCCD_PREFIX))
    }

    /// One polling cycle: re-enable notifications, wait for a frame and
    /// drain whatever else the transport has buffered.
    async fn poll_once(&mut self, descriptor: &GattDescriptor) -> Result<Verdict, CycleError> {
        self.link
            .write_descriptor(descriptor, &ENABLE_NOTIFICATIONS, true)
            .await
            .map_err(CycleError::transport)?;

        let first = self
            .link
            .wait_for_notification(self.notification_timeout)
            .await
            .map_err(CycleError::transport)?;

        let Some(first) = first else {
            return Ok(self
                .classifier
                .record_idle_cycle(&mut self.session)
                .await);
        };

        let mut verdict = self.route(&first).await;
        let mut handled = 1;
        while verdict == Verdict::Continue && handled < MAX_FRAMES_PER_CYCLE {
            match self
                .link
                .wait_for_notification(Duration::ZERO)
                .await
                .map_err(CycleError::transport)?
            {
                Some(raw) => {
                    verdict = self.route(&raw).await;
                    handled += 1;
                }
                None => break,
            }
        }
        Ok(verdict)
    }

    async fn route(&mut self, raw: &[u8]) -> Verdict {
        let frame = decode(raw);
        if frame == Frame::Ignored {
            debug!(len = raw.len(), "Ignoring frame {:02x?}", raw);
        }
        self.classifier
            .handle_frame(&frame, &mut self.session)
            .await
    }

    async fn disconnect_quietly(&mut self) {
        match tokio::time::timeout(DISCONNECT_TIMEOUT, self.link.disconnect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Disconnect failed: {}", e),
            Err(_) => warn!("Disconnect timed out after {:?}", DISCONNECT_TIMEOUT),
        }
        self.session.set_link_state(LinkState::Disconnected);
    }
}

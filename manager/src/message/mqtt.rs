//! MQTT build-event bus

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::MessageError;
use crate::message::topics::{Topics, BUILD_IMAGE_EXCHANGE};
use crate::message::{wire, Message, ReleaseHandle, Subscription};
use crate::models::deploy::BuildStep;
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// MQTT broker address
#[derive(Debug, Clone)]
pub struct MqttAddress {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
    /// Optional path to a PEM-encoded CA certificate for broker verification.
    /// When `None` and `use_tls` is `true`, the system certificate store is used.
    pub ca_cert_path: Option<String>,
}

impl Default for MqttAddress {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            use_tls: false,
            ca_cert_path: None,
        }
    }
}

/// Connection options of the build-event bus
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub address: MqttAddress,
    /// Stable client id; the broker keeps the session (and undelivered QoS 1
    /// messages) under it across reconnects.
    pub client_id: String,
    pub persistent_session: bool,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    /// Topic prefix every per-deploy build topic lives under
    pub exchange: String,
    pub keep_alive: Duration,
    /// Backoff between failed polls of the event loop
    pub reconnect: CooldownOptions,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            address: MqttAddress::default(),
            client_id: "deploy-manager".to_string(),
            persistent_session: true,
            username: None,
            password: None,
            exchange: BUILD_IMAGE_EXCHANGE.to_string(),
            keep_alive: Duration::from_secs(30),
            reconnect: CooldownOptions::default(),
        }
    }
}

type Routes = Arc<StdMutex<HashMap<String, mpsc::UnboundedSender<BuildStep>>>>;

fn lock(routes: &Routes) -> MutexGuard<'_, HashMap<String, mpsc::UnboundedSender<BuildStep>>> {
    routes.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Build-event bus backed by an MQTT broker.
///
/// A single event loop task receives every publish under the exchange and
/// routes it to the consumer registered for the deploy id in the topic.
pub struct MqttMessage {
    client: AsyncClient,
    eventloop: Mutex<Option<EventLoop>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    routes: Routes,
    exchange: String,
    reconnect: CooldownOptions,
    shutdown_tx: broadcast::Sender<()>,
}

impl MqttMessage {
    /// Create a new bus client. Nothing is sent until [`Message::init`].
    pub fn new(config: &MqttConfig) -> Result<Self, MessageError> {
        if config.address.host.is_empty() {
            return Err(MessageError::Connection(
                "MQTT host is not configured".to_string(),
            ));
        }
        let client_id = config.client_id.trim();
        if client_id.is_empty() && config.persistent_session {
            return Err(MessageError::Connection(
                "MQTT client id is required for a persistent session".to_string(),
            ));
        }
        if config.exchange.is_empty() || config.exchange.contains(['+', '#']) {
            return Err(MessageError::Connection(format!(
                "invalid build exchange {:?}",
                config.exchange
            )));
        }

        let mut options = MqttOptions::new(client_id, &config.address.host, config.address.port);
        options.set_keep_alive(config.keep_alive);
        options.set_clean_session(!config.persistent_session);

        if let Some(ref username) = config.username {
            let password = config
                .password
                .as_ref()
                .map(|p| p.expose_secret().to_string())
                .unwrap_or_default();
            options.set_credentials(username, password);
        }

        if config.address.use_tls {
            options.set_transport(tls_transport(&config.address)?);
        }

        let (client, eventloop) = AsyncClient::new(options, 32);
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            client,
            eventloop: Mutex::new(Some(eventloop)),
            dispatcher: Mutex::new(None),
            routes: Arc::new(StdMutex::new(HashMap::new())),
            exchange: config.exchange.clone(),
            reconnect: config.reconnect.clone(),
            shutdown_tx,
        })
    }

    /// Number of deploys currently consuming build events
    pub fn active_subscriptions(&self) -> usize {
        lock(&self.routes).len()
    }

    /// Disconnect from the broker and stop the event loop. Every open build
    /// event stream ends.
    pub async fn close(&self) {
        lock(&self.routes).clear();

        if let Err(e) = self.client.disconnect().await {
            warn!("MQTT disconnect failed: {}", e);
        }
        let _ = self.shutdown_tx.send(());

        if let Some(handle) = self.dispatcher.lock().await.take() {
            if let Err(e) = handle.await {
                error!("MQTT dispatcher ended abnormally: {}", e);
            }
        }
        info!("MQTT disconnected");
    }
}

#[async_trait]
impl Message for MqttMessage {
    async fn init(&self) -> Result<(), MessageError> {
        let Some(eventloop) = self.eventloop.lock().await.take() else {
            debug!("MQTT event loop already running");
            return Ok(());
        };

        let handle = tokio::spawn(dispatch(
            eventloop,
            self.routes.clone(),
            self.exchange.clone(),
            self.reconnect.clone(),
            self.shutdown_tx.subscribe(),
        ));
        *self.dispatcher.lock().await = Some(handle);

        info!("Build events exchange ready: {}", self.exchange);
        Ok(())
    }

    async fn consume_build_events(&self, deploy_id: &str) -> Result<Subscription, MessageError> {
        if !Topics::is_valid_deploy_id(deploy_id) {
            return Err(MessageError::Subscribe(format!(
                "deploy id {deploy_id:?} cannot be used in a topic"
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut routes = lock(&self.routes);
            if routes.contains_key(deploy_id) {
                return Err(MessageError::AlreadySubscribed(deploy_id.to_string()));
            }
            routes.insert(deploy_id.to_string(), tx);
        }

        let topic = Topics::build_events(&self.exchange, deploy_id);
        if let Err(e) = self.client.subscribe(&topic, QoS::AtLeastOnce).await {
            lock(&self.routes).remove(deploy_id);
            return Err(MessageError::Subscribe(e.to_string()));
        }
        info!("Subscribed to: {}", topic);

        let events = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .boxed();

        let client = self.client.clone();
        let routes = self.routes.clone();
        let id = deploy_id.to_string();
        let release = ReleaseHandle::new(deploy_id, move || async move {
            lock(&routes).remove(&id);
            client
                .unsubscribe(&topic)
                .await
                .map_err(|e| MessageError::Release(e.to_string()))?;
            debug!("Unsubscribed from: {}", topic);
            Ok(())
        });

        Ok(Subscription { events, release })
    }
}

async fn dispatch(
    mut eventloop: EventLoop,
    routes: Routes,
    exchange: String,
    reconnect: CooldownOptions,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut failures = 0u32;
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("MQTT dispatcher stopping");
                break;
            }
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    route(&routes, &exchange, &publish.topic, &publish.payload);
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    failures = 0;
                    info!("MQTT connected");
                }
                Ok(Event::Incoming(Packet::SubAck(_))) => {
                    debug!("Subscription acknowledged");
                }
                Ok(_) => {}
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let delay = calc_exp_backoff(&reconnect, failures);
                    warn!("MQTT poll error: {} (retrying in {:?})", e, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Hand one publish to the consumer of its deploy
fn route(routes: &Routes, exchange: &str, topic: &str, payload: &[u8]) {
    let Some(deploy_id) = Topics::parse_deploy_id(exchange, topic) else {
        debug!("Ignoring message on topic: {}", topic);
        return;
    };

    let event = wire::decode(payload);
    let mut routes = lock(routes);
    match routes.get(deploy_id) {
        Some(tx) => {
            if tx.send(event).is_err() {
                routes.remove(deploy_id);
            }
        }
        None => debug!("No consumer for build events of {}", deploy_id),
    }
}

fn tls_transport(address: &MqttAddress) -> Result<rumqttc::Transport, MessageError> {
    use rumqttc::{TlsConfiguration, Transport};
    use rustls::ClientConfig;

    let mut root_cert_store = rustls::RootCertStore::empty();

    if let Some(ref ca_path) = address.ca_cert_path {
        let ca_pem = std::fs::read(ca_path).map_err(|e| {
            MessageError::Connection(format!("Failed to read CA cert {ca_path}: {e}"))
        })?;
        let mut cursor = std::io::Cursor::new(ca_pem);
        for cert in rustls_pemfile::certs(&mut cursor).flatten() {
            let _ = root_cert_store.add(cert);
        }
    } else {
        for cert in rustls_native_certs::load_native_certs().unwrap_or_default() {
            let _ = root_cert_store.add(cert);
        }
    }

    let client_config = ClientConfig::builder()
        .with_root_certificates(root_cert_store)
        .with_no_client_auth();

    Ok(Transport::tls_with_config(TlsConfiguration::Rustls(
        Arc::new(client_config),
    )))
}

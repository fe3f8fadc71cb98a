use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use agent_config::AgentConfig;
use agent_core::{traits::Transport, AgentError, AgentResult};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, TlsConfiguration};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

type Subscriptions = Arc<RwLock<HashMap<String, mpsc::Sender<Vec<u8>>>>>;

/// MQTT 传输
///
/// 后台任务驱动 rumqttc 事件循环，按主题把入站消息转发到订阅通道。重连后自动
/// 重新订阅。发布使用 QoS 1。
pub struct MqttTransport {
    client: AsyncClient,
    subscriptions: Subscriptions,
    channel_capacity: usize,
    event_loop: JoinHandle<()>,
}

impl MqttTransport {
    pub fn connect(options: MqttOptions, channel_capacity: usize) -> Self {
        let (client, event_loop) = AsyncClient::new(options, channel_capacity);
        let subscriptions: Subscriptions = Arc::new(RwLock::new(HashMap::new()));
        let handle = tokio::spawn(drive_event_loop(
            event_loop,
            client.clone(),
            Arc::clone(&subscriptions),
        ));
        Self {
            client,
            subscriptions,
            channel_capacity,
            event_loop: handle,
        }
    }

    pub fn from_config(config: &AgentConfig) -> AgentResult<Self> {
        let mqtt = config.mqtt();
        let client_id = config.mqtt_client_id();
        let mut options = MqttOptions::new(client_id.clone(), mqtt.broker.clone(), mqtt.port);
        options.set_keep_alive(Duration::from_secs(mqtt.keep_alive_seconds));

        if let Some(ca_path) = &mqtt.ca_cert_path {
            let ca = read_pem(ca_path)?;
            let client_auth = match (&mqtt.client_cert_path, &mqtt.client_key_path) {
                (Some(cert), Some(key)) => Some((read_pem(cert)?, read_pem(key)?)),
                _ => None,
            };
            options.set_transport(rumqttc::Transport::tls_with_config(
                TlsConfiguration::Simple {
                    ca,
                    alpn: None,
                    client_auth,
                },
            ));
        }

        info!(
            broker = %mqtt.broker,
            port = mqtt.port,
            client_id = %client_id,
            tls = mqtt.uses_tls(),
            "connecting to MQTT broker"
        );
        Ok(Self::connect(options, mqtt.channel_capacity))
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.event_loop.abort();
    }
}

fn read_pem(path: &str) -> AgentResult<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| AgentError::Configuration(format!("failed to read {path}: {e}")))
}

async fn drive_event_loop(mut event_loop: EventLoop, client: AsyncClient, subscriptions: Subscriptions) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let sender = subscriptions.read().await.get(&publish.topic).cloned();
                match sender {
                    Some(tx) => {
                        if tx.send(publish.payload.to_vec()).await.is_err() {
                            debug!(topic = %publish.topic, "subscriber dropped, message discarded");
                        }
                    }
                    None => debug!(topic = %publish.topic, "message on unsubscribed topic"),
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("MQTT connection established");
                let topics: Vec<String> = subscriptions.read().await.keys().cloned().collect();
                for topic in topics {
                    if let Err(e) = client.try_subscribe(topic.clone(), QoS::AtLeastOnce) {
                        warn!(topic = %topic, error = %e, "failed to restore subscription");
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "MQTT connection error, retrying in {:?}", RECONNECT_DELAY);
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> AgentResult<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| AgentError::Transport(format!("MQTT publish to {topic} failed: {e}")))
    }

    async fn subscribe(&self, topic: &str) -> AgentResult<mpsc::Receiver<Vec<u8>>> {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        self.subscriptions.write().await.insert(topic.to_string(), tx);
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| AgentError::Transport(format!("MQTT subscribe to {topic} failed: {e}")))?;
        info!(topic, "subscribed to MQTT topic");
        Ok(rx)
    }
}

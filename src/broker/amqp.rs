//! AMQP 0-9-1 transport built on `lapin`

use crate::broker::transport::{
    BrokerChannel, BrokerConnection, BrokerConnector, Delivery, DeliveryStream, FailureSignal,
    QueueDeclaration,
};
use crate::broker::{BrokerError, BrokerResult};
use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ConfirmSelectOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use std::sync::Arc;

pub const DEFAULT_HEARTBEAT_SECS: u16 = 60;
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 10_000;

/// Reply code sent with a normal channel or connection close
const REPLY_SUCCESS: u16 = 200;
const PERSISTENT_DELIVERY_MODE: u8 = 2;
const PREFETCH_COUNT: u16 = 1;

/// Opens lapin connections to one broker URI
#[derive(Debug, Clone)]
pub struct AmqpConnector {
    uri: String,
    heartbeat_secs: u16,
    connection_timeout_ms: u64,
}

impl AmqpConnector {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            heartbeat_secs: DEFAULT_HEARTBEAT_SECS,
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
        }
    }

    pub fn with_heartbeat(mut self, secs: u16) -> Self {
        self.heartbeat_secs = secs;
        self
    }

    pub fn with_connection_timeout(mut self, millis: u64) -> Self {
        self.connection_timeout_ms = millis;
        self
    }

    /// URI with heartbeat and connection timeout appended as query parameters
    pub fn connection_uri(&self) -> String {
        let separator = if self.uri.contains('?') { '&' } else { '?' };
        format!(
            "{}{}heartbeat={}&connection_timeout={}",
            self.uri, separator, self.heartbeat_secs, self.connection_timeout_ms
        )
    }
}

#[async_trait]
impl BrokerConnector for AmqpConnector {
    async fn connect(&self, signal: FailureSignal) -> BrokerResult<Arc<dyn BrokerConnection>> {
        let connection =
            Connection::connect(&self.connection_uri(), ConnectionProperties::default())
                .await
                .map_err(BrokerError::connection)?;

        connection.on_error(move |error| {
            signal.notify(format!("connection error: {error}"));
        });

        log::trace!("AMQP connection established to {}", self.endpoint());
        Ok(Arc::new(AmqpConnection { connection }))
    }

    fn endpoint(&self) -> String {
        redact_credentials(&self.uri)
    }
}

/// Drop the `user:password@` part of a URI
pub fn redact_credentials(uri: &str) -> String {
    let Some(scheme_end) = uri.find("://") else {
        return uri.to_string();
    };
    let authority_start = scheme_end + 3;
    let rest = &uri[authority_start..];
    let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{}{}", &uri[..authority_start], &rest[at + 1..]),
        None => uri.to_string(),
    }
}

struct AmqpConnection {
    connection: Connection,
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    async fn open_channel(&self) -> BrokerResult<Arc<dyn BrokerChannel>> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(BrokerError::channel)?;
        channel
            .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
            .await
            .map_err(BrokerError::channel)?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(BrokerError::channel)?;
        Ok(Arc::new(AmqpChannel { channel }))
    }

    async fn close(&self) -> BrokerResult<()> {
        if !self.connection.status().connected() {
            return Ok(());
        }
        self.connection
            .close(REPLY_SUCCESS, "closing")
            .await
            .map_err(BrokerError::connection)
    }
}

struct AmqpChannel {
    channel: Channel,
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn declare_queue(
        &self,
        queue: &str,
        declaration: &QueueDeclaration,
    ) -> BrokerResult<()> {
        let ttl = u32::try_from(declaration.message_ttl_ms()).unwrap_or(u32::MAX);
        let mut arguments = FieldTable::default();
        arguments.insert("x-message-ttl".into(), AMQPValue::LongUInt(ttl));

        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: declaration.durable,
                    ..QueueDeclareOptions::default()
                },
                arguments,
            )
            .await
            .map_err(BrokerError::channel)?;
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &[u8], persistent: bool) -> BrokerResult<()> {
        let mut properties = BasicProperties::default().with_content_type("application/json".into());
        if persistent {
            properties = properties.with_delivery_mode(PERSISTENT_DELIVERY_MODE);
        }

        let confirmation = self
            .channel
            .basic_publish("", queue, BasicPublishOptions::default(), payload, properties)
            .await
            .map_err(BrokerError::channel)?
            .await
            .map_err(BrokerError::channel)?;

        if confirmation.is_nack() {
            return Err(BrokerError::channel(format!(
                "broker refused message for queue '{queue}'"
            )));
        }
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> BrokerResult<DeliveryStream> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(BrokerError::channel)?;

        Ok(consumer
            .map(|next| {
                next.map(|delivery| Box::new(AmqpDelivery { delivery }) as Box<dyn Delivery>)
                    .map_err(BrokerError::channel)
            })
            .boxed())
    }

    async fn close(&self) -> BrokerResult<()> {
        if !self.channel.status().connected() {
            return Ok(());
        }
        self.channel
            .close(REPLY_SUCCESS, "closing")
            .await
            .map_err(BrokerError::channel)
    }
}

struct AmqpDelivery {
    delivery: lapin::message::Delivery,
}

#[async_trait]
impl Delivery for AmqpDelivery {
    fn payload(&self) -> &[u8] {
        &self.delivery.data
    }

    async fn ack(&self) -> BrokerResult<()> {
        self.delivery
            .acker
            .ack(BasicAckOptions::default())
            .await
            .map_err(BrokerError::channel)
    }

    async fn nack(&self, requeue: bool) -> BrokerResult<()> {
        self.delivery
            .acker
            .nack(BasicNackOptions {
                requeue,
                ..BasicNackOptions::default()
            })
            .await
            .map_err(BrokerError::channel)
    }
}

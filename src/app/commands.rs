//! Subcommand implementations

use crate::app::cli::{AppConfig, Command, QueueBackend, DEFAULT_QUEUE};
use crate::app::consumer::MessageConsumer;
use crate::app::error::{AppError, AppResult};
use crate::broker::probe::wait_for_broker;
use crate::broker::{ConnectionState, ConnectionSupervisor, DurableQueueAdapter};
use crate::core::shutdown::ShutdownCoordinator;
use crate::message::Message;
use crate::queue::{InMemoryQueueAdapter, QueuePort};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

/// Pause between the demo's sample messages
const DEMO_INTERVAL: Duration = Duration::from_secs(1);

/// The demo's sample conversation: (content, sender, recipient)
const DEMO_MESSAGES: [(&str, &str, &str); 3] = [
    ("Hello, world!", "user1", "user2"),
    ("How are you?", "user2", "user1"),
    ("All good!", "user1", "user2"),
];

/// Queue port selected by the configuration
pub struct QueueBackendHandle {
    pub port: Arc<dyn QueuePort>,
    /// Present for the durable backend only
    pub supervisor: Option<ConnectionSupervisor>,
}

pub fn build_backend(config: &AppConfig) -> QueueBackendHandle {
    match config.queue.backend {
        QueueBackend::Memory => QueueBackendHandle {
            port: Arc::new(InMemoryQueueAdapter::new()),
            supervisor: None,
        },
        QueueBackend::Durable => {
            let adapter = DurableQueueAdapter::new(
                Arc::new(config.connector()),
                config.backoff_policy(),
            )
            .with_declaration(config.queue_declaration());
            let supervisor = adapter.supervisor().clone();
            QueueBackendHandle {
                port: Arc::new(adapter),
                supervisor: Some(supervisor),
            }
        }
    }
}

/// Trigger shutdown once the supervisor reaches `Terminated`
///
/// The returned flag tells the command to exit with a failure status.
pub fn watch_for_termination(
    supervisor: &ConnectionSupervisor,
    coordinator: ShutdownCoordinator,
) -> Arc<AtomicBool> {
    let terminated = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&terminated);
    let mut transitions = supervisor.subscribe_transitions();
    let supervisor = supervisor.clone();

    tokio::spawn(async move {
        loop {
            let reached = match transitions.recv().await {
                Ok(transition) => transition.to == ConnectionState::Terminated,
                Err(RecvError::Lagged(_)) => supervisor.state() == ConnectionState::Terminated,
                Err(RecvError::Closed) => return,
            };
            if reached {
                log::error!("Message broker connection terminated; shutting down");
                flag.store(true, Ordering::Release);
                coordinator.trigger_shutdown();
                return;
            }
        }
    });

    terminated
}

pub async fn run(config: &AppConfig, command: Command) -> AppResult<()> {
    match command {
        Command::Publish {
            queue,
            sender,
            recipient,
            content,
        } => publish(config, &queue, Message::new(content, sender, recipient)).await,
        Command::Consume { queue } => consume(config, &queue, false).await,
        Command::Demo => consume(config, DEFAULT_QUEUE, true).await,
        Command::Check => check(config).await,
    }
}

async fn publish(config: &AppConfig, queue: &str, message: Message) -> AppResult<()> {
    if config.queue.backend == QueueBackend::Memory {
        log::warn!("The in-memory backend keeps messages only until this process exits");
    }

    let backend = build_backend(config);
    let id = message.id.clone();
    let published = backend.port.publish(queue, message).await;
    backend.port.close().await?;
    published?;

    log::info!("Message {} published to queue '{}'", id, queue);
    println!("{}", id);
    Ok(())
}

async fn check(config: &AppConfig) -> AppResult<()> {
    if config.queue.backend == QueueBackend::Memory {
        log::info!("The in-memory backend needs no message broker");
        return Ok(());
    }

    let connector = config.connector();
    wait_for_broker(&connector, config.broker.probe_attempts, config.probe_delay()).await?;
    println!(
        "Message broker at {} is available",
        crate::broker::amqp::redact_credentials(&config.broker.url)
    );
    Ok(())
}

/// Run a consumer until a shutdown signal, or with `demo` send the sample messages
async fn consume(config: &AppConfig, queue: &str, demo: bool) -> AppResult<()> {
    if config.queue.backend == QueueBackend::Durable {
        let connector = config.connector();
        wait_for_broker(&connector, config.broker.probe_attempts, config.probe_delay()).await?;
    }

    let backend = build_backend(config);
    let port = Arc::clone(&backend.port);

    ShutdownCoordinator::guard(|coordinator, mut shutdown_rx| async move {
        let terminated = backend
            .supervisor
            .as_ref()
            .map(|supervisor| watch_for_termination(supervisor, coordinator.clone()));

        let consumer = MessageConsumer::new(Arc::clone(&port), queue);
        let mut outcome = consumer.start().await.map_err(AppError::from);

        if outcome.is_ok() {
            if demo {
                log::info!("Sending sample messages...");
                tokio::select! {
                    sent = send_samples(port.as_ref(), queue) => outcome = sent,
                    _ = shutdown_rx.recv() => log::info!("Demo interrupted"),
                }
            } else {
                let _ = shutdown_rx.recv().await;
            }
        }

        if let Err(e) = port.close().await {
            return Err(AppError::from(e));
        }
        log::info!("Queue closed after {} delivered message(s)", consumer.delivered());

        if terminated.is_some_and(|flag| flag.load(Ordering::Acquire)) {
            return Err(AppError::BrokerTerminated);
        }
        outcome
    })
    .await
}

async fn send_samples(port: &dyn QueuePort, queue: &str) -> AppResult<()> {
    for (content, sender, recipient) in DEMO_MESSAGES {
        port.publish(queue, Message::new(content, sender, recipient))
            .await?;
        tokio::time::sleep(DEMO_INTERVAL).await;
    }
    Ok(())
}

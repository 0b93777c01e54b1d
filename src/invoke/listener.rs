//! Out-of-band log listeners.
//!
//! A listener subscribes to a fresh inbox on a [`LogTransport`] before the
//! outbound call is made. A reader task forwards log lines to a [`LogSink`]
//! and resolves a single completion signal when the remote side reports it is
//! done, or when the stream breaks. Log lines carry no ordering guarantee
//! relative to completion: lines arriving after the completion signal are
//! still forwarded, and waiting for completion never waits for them.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// How the remote side delivers log lines for an inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    PubSub,
    Websocket,
}

impl StreamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PubSub => "pubsub",
            Self::Websocket => "websocket",
        }
    }
}

/// One message published to an inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMessage {
    Log(String),
    /// The invocation finished. `error` is set when the function reported failure.
    Done { error: Option<String> },
    /// The transport gave up on this subscription.
    Closed { reason: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ListenerError {
    #[error("Failed to subscribe to {inbox}: {message}")]
    Subscribe { inbox: String, message: String },
}

/// An active subscription: the raw message stream for one inbox.
pub struct Subscription {
    pub messages: mpsc::UnboundedReceiver<TransportMessage>,
}

/// The pub/sub capability used for log delivery.
#[async_trait]
pub trait LogTransport: Send + Sync {
    fn stream_type(&self) -> StreamType;

    async fn listen(&self, inbox: &str) -> Result<Subscription, ListenerError>;
}

/// What a log consumer receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    Line(String),
    /// No more lines will follow.
    Closed,
}

/// Where forwarded log lines go.
#[derive(Debug, Clone, Default)]
pub enum LogSink {
    Channel(mpsc::UnboundedSender<LogEvent>),
    /// Emit each line as a tracing event.
    #[default]
    Tracing,
}

impl LogSink {
    fn line(&self, line: String) {
        match self {
            Self::Channel(tx) => {
                let _ = tx.send(LogEvent::Line(line));
            }
            Self::Tracing => tracing::info!(target: "stackmate::function", "{}", line),
        }
    }

    fn close(&self) {
        if let Self::Channel(tx) = self {
            let _ = tx.send(LogEvent::Closed);
        }
    }
}

/// How a listener finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerOutcome {
    /// The remote side reported success.
    Completed,
    /// The invoked function reported an error. Authoritative.
    RemoteError(String),
    /// The stream broke before a completion message arrived.
    TransportError(String),
}

/// A running log listener bound to one inbox.
pub struct LogListener {
    inbox: String,
    stream_type: StreamType,
    completion: oneshot::Receiver<ListenerOutcome>,
    reader: JoinHandle<()>,
}

impl LogListener {
    /// Subscribe to a fresh inbox and start the reader task.
    pub async fn start(transport: &dyn LogTransport, sink: LogSink) -> Result<Self, ListenerError> {
        let inbox = new_inbox();
        let subscription = transport.listen(&inbox).await?;
        let (done_tx, done_rx) = oneshot::channel();
        let reader = tokio::spawn(read_messages(subscription.messages, sink, done_tx));
        tracing::debug!(%inbox, "Log listener started");
        Ok(Self {
            inbox,
            stream_type: transport.stream_type(),
            completion: done_rx,
            reader,
        })
    }

    pub fn inbox(&self) -> &str {
        &self.inbox
    }

    pub fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    /// Wait for the completion signal. Late log lines keep flowing to the
    /// sink in the background.
    pub async fn wait(self) -> ListenerOutcome {
        match self.completion.await {
            Ok(outcome) => outcome,
            Err(_) => ListenerOutcome::TransportError("log reader stopped unexpectedly".to_string()),
        }
    }

    /// Stop reading. Used when the outbound call failed and nobody will wait.
    pub fn abort(self) {
        self.reader.abort();
    }
}

async fn read_messages(
    mut messages: mpsc::UnboundedReceiver<TransportMessage>,
    sink: LogSink,
    done: oneshot::Sender<ListenerOutcome>,
) {
    let mut done = Some(done);
    let mut resolve = |outcome: ListenerOutcome| {
        if let Some(tx) = done.take() {
            let _ = tx.send(outcome);
        }
    };

    while let Some(message) = messages.recv().await {
        match message {
            TransportMessage::Log(line) => sink.line(line),
            TransportMessage::Done { error: None } => resolve(ListenerOutcome::Completed),
            TransportMessage::Done { error: Some(error) } => {
                resolve(ListenerOutcome::RemoteError(error))
            }
            TransportMessage::Closed { reason } => {
                resolve(ListenerOutcome::TransportError(reason));
                break;
            }
        }
    }

    resolve(ListenerOutcome::TransportError(
        "log stream disconnected".to_string(),
    ));
    sink.close();
}

/// A fresh, unique subject to receive one invocation's logs on.
pub fn new_inbox() -> String {
    format!("_INBOX.{}", Uuid::new_v4().simple())
}

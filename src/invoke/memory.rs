use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::listener::{ListenerError, LogTransport, StreamType, Subscription, TransportMessage};

/// In-process pub/sub transport.
///
/// Holds both sides of the log protocol: [`LogTransport::listen`] for the
/// caller, and `publish_log` / `complete` / `disconnect` for whatever plays
/// the remote function. Clones share the same subscriptions.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    subscribers: Arc<Mutex<HashMap<String, mpsc::UnboundedSender<TransportMessage>>>>,
    refuse: Arc<AtomicBool>,
    stream_type: StreamType,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            refuse: Arc::new(AtomicBool::new(false)),
            stream_type: StreamType::PubSub,
        }
    }

    pub fn with_stream_type(mut self, stream_type: StreamType) -> Self {
        self.stream_type = stream_type;
        self
    }

    /// Make every subsequent `listen` fail, as if the broker were unreachable.
    pub fn refuse_subscriptions(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::Release);
    }

    fn subscribers(&self) -> MutexGuard<'_, HashMap<String, mpsc::UnboundedSender<TransportMessage>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn inboxes(&self) -> Vec<String> {
        self.subscribers().keys().cloned().collect()
    }

    /// Publish a log line. Returns false if nobody listens on `inbox`.
    pub fn publish_log(&self, inbox: &str, line: impl Into<String>) -> bool {
        self.send(inbox, TransportMessage::Log(line.into()))
    }

    /// Signal completion and end the subscription.
    pub fn complete(&self, inbox: &str, error: Option<String>) -> bool {
        let sent = self.send(inbox, TransportMessage::Done { error });
        self.subscribers().remove(inbox);
        sent
    }

    /// Break the subscription with a transport-level error.
    pub fn disconnect(&self, inbox: &str, reason: impl Into<String>) -> bool {
        let sent = self.send(
            inbox,
            TransportMessage::Closed {
                reason: reason.into(),
            },
        );
        self.subscribers().remove(inbox);
        sent
    }

    fn send(&self, inbox: &str, message: TransportMessage) -> bool {
        self.subscribers()
            .get(inbox)
            .map(|tx| tx.send(message).is_ok())
            .unwrap_or(false)
    }
}

#[async_trait]
impl LogTransport for MemoryTransport {
    fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    async fn listen(&self, inbox: &str) -> Result<Subscription, ListenerError> {
        if self.refuse.load(Ordering::Acquire) {
            return Err(ListenerError::Subscribe {
                inbox: inbox.to_string(),
                message: "transport unavailable".to_string(),
            });
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers().insert(inbox.to_string(), tx);
        Ok(Subscription { messages: rx })
    }
}

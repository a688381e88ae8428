use crate::events::ExecutorEvent;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ExecutorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutorEvent> {
        self.tx.subscribe()
    }

    /// Number of receivers reached; zero when nobody listens.
    pub fn publish(&self, event: ExecutorEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }
}

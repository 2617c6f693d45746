use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;
use parking_lot::Mutex;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::models::SendEvent;
use crate::services::traits::EventSink;

const SUBSCRIBER_BUFFER: usize = 100;

/// Fans send events out to any number of stream subscribers. A subscriber
/// that fell behind loses events instead of slowing the gate down.
#[derive(Default)]
pub struct ChannelEventSink {
    subscribers: Mutex<Vec<mpsc::Sender<SendEvent>>>,
}

impl ChannelEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Pin<Box<dyn Stream<Item = SendEvent> + Send>> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.subscribers.lock().push(tx);
        Box::pin(ReceiverStream::new(rx))
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn emit(&self, event: SendEvent) -> Result<()> {
        tracing::debug!("Send event: {:?}", event);

        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Event subscriber lagging, dropped {:?}", event);
                true
            }
            // receiver dropped
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        Ok(())
    }
}

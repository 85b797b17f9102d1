use async_graphql::futures_util::stream::{self, Stream};
use georoute_shared::progress::{ProgressEvent, ProgressStage};
use tokio::sync::broadcast::{self, error::RecvError};

const HUB_CAPACITY: usize = 256;

/// Fan-out of progress events to every listener, filtered per request id.
#[derive(Clone)]
pub struct ProgressHub {
    sender: broadcast::Sender<ProgressEvent>,
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(HUB_CAPACITY);
        ProgressHub { sender }
    }

    pub fn publish(&self, event: ProgressEvent) {
        tracing::debug!(
            request_id = %event.request_id,
            stage = ?event.stage,
            progress = event.progress,
            "progress"
        );
        // No listeners is fine: progress is display-only.
        let _ = self.sender.send(event);
    }

    pub fn report(&self, request_id: &str, stage: ProgressStage, progress: f64, message: &str) {
        self.publish(ProgressEvent::new(request_id, stage, progress, message));
    }

    /// Events for `request_id`, ending after the first terminal stage.
    pub fn subscribe(&self, request_id: String) -> impl Stream<Item = ProgressEvent> + Send + 'static {
        let receiver = self.sender.subscribe();
        stream::unfold(
            (receiver, request_id, false),
            |(mut receiver, request_id, finished)| async move {
                if finished {
                    return None;
                }
                loop {
                    match receiver.recv().await {
                        Ok(event) if event.request_id == request_id => {
                            let finished = event.stage.is_terminal();
                            return Some((event, (receiver, request_id, finished)));
                        }
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(%request_id, skipped, "progress listener lagged");
                        }
                        Err(RecvError::Closed) => return None,
                    }
                }
            },
        )
    }
}

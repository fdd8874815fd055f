use super::*;

mod event;
mod file;

pub use {
    event::{BlockFoundEvent, Event, ShareEvent, UnknownMethodEvent},
    file::FileSink,
};

const EVENT_CHANNEL_CAPACITY: usize = 10_000;

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn record(&mut self, event: Event) -> Result;

    async fn flush(&mut self) -> Result {
        Ok(())
    }

    async fn close(&mut self) -> Result {
        self.flush().await
    }
}

/// Handle for emitting events. Emitting never blocks share processing: when
/// the sink falls behind, events are dropped with a warning.
#[derive(Clone, Debug, Default)]
pub struct EventSender {
    tx: Option<mpsc::Sender<Event>>,
}

impl EventSender {
    pub fn disabled() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    pub fn emit(&self, event: Event) {
        let Some(tx) = &self.tx else {
            return;
        };

        if let Err(err) = tx.try_send(event) {
            warn!("Dropping event: {err}");
        }
    }
}

/// Spawns a task draining events into `sink` in emission order.
pub fn spawn_event_sink(
    mut sink: Box<dyn EventSink>,
    cancel: CancellationToken,
    tasks: &mut JoinSet<()>,
) -> EventSender {
    let (tx, mut rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    tasks.spawn(async move {
        loop {
            tokio::select! {
                biased;

                event = rx.recv() => {
                    let Some(event) = event else {
                        break;
                    };

                    if let Err(err) = sink.record(event).await {
                        warn!("Error recording event: {err}");
                    }

                    if rx.is_empty()
                        && let Err(err) = sink.flush().await
                    {
                        warn!("Error flushing events: {err}");
                    }
                }

                _ = cancel.cancelled() => {
                    while let Ok(event) = rx.try_recv() {
                        if let Err(err) = sink.record(event).await {
                            warn!("Error recording event during shutdown: {err}");
                        }
                    }
                    break;
                }
            }
        }

        if let Err(err) = sink.close().await {
            warn!("Error closing event sink: {err}");
        }
    });

    EventSender { tx: Some(tx) }
}

pub async fn build_event_sink(
    events_file: Option<&Path>,
    cancel: CancellationToken,
    tasks: &mut JoinSet<()>,
) -> Result<EventSender> {
    let Some(path) = events_file else {
        return Ok(EventSender::disabled());
    };

    let sink = FileSink::new(path).await?;

    info!("Recording events to {}", path.display());

    Ok(spawn_event_sink(Box::new(sink), cancel, tasks))
}

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;

use crate::bus::{Publication, Sink};
use crate::engine::wait_for_shutdown;

/// Hands publications to the sink in the order the engine produced them
///
/// The engine never waits on the sink; this task absorbs any latency.
pub(crate) struct EgressTask {
    rx: UnboundedReceiver<Publication>,
    sink: Box<dyn Sink>,
    shutdown: watch::Receiver<bool>,
}

impl EgressTask {
    pub(crate) fn new(
        rx: UnboundedReceiver<Publication>,
        sink: Box<dyn Sink>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self { rx, sink, shutdown }
    }

    pub(crate) async fn run(&mut self) {
        loop {
            let publication = tokio::select! {
                x = self.rx.recv() => x,
                _ = wait_for_shutdown(self.shutdown.clone()) => break,
            };
            match publication {
                Some(x) => self.publish(x).await,
                None => return,
            }
        }

        // flush whatever was produced before shutdown
        while let Ok(publication) = self.rx.try_recv() {
            self.publish(publication).await;
        }
    }

    async fn publish(&mut self, publication: Publication) {
        tracing::debug!("publish {} ({} bytes)", publication.topic, publication.payload.len());
        self.sink.publish(publication).get().await;
    }
}

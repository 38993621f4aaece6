use crate::engine::Engine;
use crate::error::Shutdown;
use crate::settings::PollSettings;

/// Keeps the controller polled while nothing else is queued
///
/// A new cycle is planned only once the scheduler is empty, so idle scans
/// never pile up behind a slow or failing link.
pub(crate) struct MonitorTask {
    engine: Engine,
    settings: PollSettings,
}

impl MonitorTask {
    pub(crate) fn new(engine: Engine, settings: PollSettings) -> Self {
        Self { engine, settings }
    }

    pub(crate) async fn run(&self) -> Shutdown {
        loop {
            if self.engine.scheduler().is_closed() {
                return Shutdown;
            }

            if self.engine.scheduler().is_empty() {
                for command in self.engine.monitor_plan() {
                    if !self.engine.enqueue(command) {
                        return Shutdown;
                    }
                    tokio::time::sleep(self.settings.scan_delay).await;
                }
            }

            tokio::time::sleep(self.settings.scan_delay).await;
        }
    }
}

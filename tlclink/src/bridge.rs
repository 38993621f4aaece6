use std::future::Future;

use crate::bus::{Sink, Topics};
use crate::egress::EgressTask;
use crate::engine::{Engine, Firmware};
use crate::error::{CommandParseError, InvalidRequest};
use crate::ingress::BusCommand;
use crate::link::{LinkTask, PortSource};
use crate::listener::{Listener, NullListener, PortState};
use crate::monitor::MonitorTask;
use crate::retry::RetryStrategy;
use crate::settings::BridgeConfig;
use crate::task::TransportTask;

/// Handle to a running bridge
///
/// Bus messages are fed in through this handle. Dropping it, or calling
/// [`Bridge::shutdown`], discards queued commands and stops every task.
pub struct Bridge {
    engine: Engine,
}

impl Bridge {
    pub(crate) fn create_handle_and_task(
        source: PortSource,
        config: BridgeConfig,
        retry: Box<dyn RetryStrategy>,
        sink: Box<dyn Sink>,
        listener: Option<Box<dyn Listener<PortState>>>,
    ) -> (Self, impl Future<Output = ()>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let engine = Engine::new(config.topics, tx);

        let transport = TransportTask::new(engine.clone(), config.link, config.decode);
        let link = LinkTask::new(
            source,
            retry,
            listener.unwrap_or_else(NullListener::create),
            transport,
            engine.clone(),
        );
        let monitor = MonitorTask::new(engine.clone(), config.poll);
        let egress = EgressTask::new(rx, sink, engine.shutdown_signal());

        let task = async move {
            // each task owns its engine handle so it is released on completion
            let link = async move {
                let mut link = link;
                link.run().await
            };
            let monitor = async move { monitor.run().await };
            let egress = async move {
                let mut egress = egress;
                egress.run().await
            };
            tokio::join!(link, monitor, egress);
            tracing::info!("bridge shut down");
        };

        (Self { engine }, task)
    }

    /// parse and act on a message received on one of the subscribed topics
    pub fn handle_message(&self, topic: &str, payload: &str) -> Result<(), CommandParseError> {
        self.engine.handle_message(topic, payload)
    }

    /// act on an already parsed bus command
    pub fn apply(&self, command: BusCommand) -> Result<(), InvalidRequest> {
        self.engine.apply(command)
    }

    /// firmware identification read from the controller, once available
    pub fn firmware(&self) -> Firmware {
        self.engine.firmware()
    }

    /// topics the bridge subscribes and publishes on
    pub fn topics(&self) -> &Topics {
        self.engine.topics()
    }

    /// discard queued commands and stop every task
    pub fn shutdown(&self) {
        self.engine.shutdown();
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.engine.shutdown();
    }
}

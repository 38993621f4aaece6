use std::time::Duration;

use crate::engine::{wait_for_shutdown, Engine};
use crate::error::Shutdown;
use crate::listener::{Listener, PortState};
use crate::phys::PhysLayer;
use crate::retry::RetryStrategy;
use crate::task::{SessionError, TransportTask};

#[cfg(feature = "serial")]
use crate::serial::SerialSettings;

/// Where the byte stream to the controller comes from
pub(crate) enum PortSource {
    /// a serial port, re-opened after every failure
    #[cfg(feature = "serial")]
    Serial {
        path: String,
        settings: SerialSettings,
    },
    /// a stream supplied by the caller, usable once
    Stream(Option<PhysLayer>),
}

impl PortSource {
    fn open(&mut self) -> Result<PhysLayer, std::io::Error> {
        match self {
            #[cfg(feature = "serial")]
            PortSource::Serial { path, settings } => {
                let serial = crate::serial::open(path, *settings)?;
                Ok(PhysLayer::new_serial(serial))
            }
            PortSource::Stream(stream) => stream.take().ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "the supplied stream cannot be re-opened",
                )
            }),
        }
    }
}

/// Keeps a port open and runs the transport on it
pub(crate) struct LinkTask {
    source: PortSource,
    retry: Box<dyn RetryStrategy>,
    listener: Box<dyn Listener<PortState>>,
    transport: TransportTask,
    engine: Engine,
}

impl LinkTask {
    pub(crate) fn new(
        source: PortSource,
        retry: Box<dyn RetryStrategy>,
        listener: Box<dyn Listener<PortState>>,
        transport: TransportTask,
        engine: Engine,
    ) -> Self {
        Self {
            source,
            retry,
            listener,
            transport,
            engine,
        }
    }

    pub(crate) async fn run(&mut self) -> Shutdown {
        let result = self.open_and_run().await;
        self.listener.update(PortState::Shutdown).get().await;
        result
    }

    async fn open_and_run(&mut self) -> Shutdown {
        loop {
            match self.source.open() {
                Ok(mut phys) => {
                    self.retry.reset();
                    tracing::info!("opened port");
                    self.listener.update(PortState::Open).get().await;
                    self.engine.request_firmware();
                    // run an open port until shutdown or failure
                    if let SessionError::Shutdown = self.transport.run(&mut phys).await {
                        return Shutdown;
                    }
                    // prevents rapid retry if the port opens and immediately fails
                    let delay = self.retry.after_link_failure();
                    tracing::warn!("waiting {:?} to reopen port", delay);
                    if let Err(Shutdown) = self.sleep_for(delay).await {
                        return Shutdown;
                    }
                }
                Err(err) => {
                    let delay = self.retry.after_failed_open();
                    tracing::warn!(
                        "unable to open serial port, retrying in {:?} - error: {}",
                        delay,
                        err
                    );
                    if let Err(Shutdown) = self.sleep_for(delay).await {
                        return Shutdown;
                    }
                }
            }
        }
    }

    async fn sleep_for(&mut self, delay: Duration) -> Result<(), Shutdown> {
        self.listener.update(PortState::Wait(delay)).get().await;
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = wait_for_shutdown(self.engine.shutdown_signal()) => Err(Shutdown),
        }
    }
}

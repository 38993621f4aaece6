use tracing::Instrument;

use crate::command::Command;
use crate::decode::DecodeLevel;
use crate::engine::Engine;
use crate::error::{RequestError, Shutdown};
use crate::frame::{Frame, FrameCodec};
use crate::phys::PhysLayer;
use crate::settings::LinkSettings;

/**
* We execute commands on an open port until one of the following occurs
*/
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum SessionError {
    /// the stream errors on every attempt of a command
    IoError(std::io::ErrorKind),
    /// the scheduler was closed
    Shutdown,
}

impl From<Shutdown> for SessionError {
    fn from(_: Shutdown) -> Self {
        SessionError::Shutdown
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            SessionError::IoError(err) => {
                write!(f, "I/O error: {err}")
            }
            SessionError::Shutdown => {
                write!(f, "Shutdown was requested")
            }
        }
    }
}

/// Progress of the command currently on the wire
#[derive(Debug)]
enum AttemptState {
    Idle,
    Writing,
    AwaitingResponse,
    Success,
    Failed(RequestError),
}

/// Sole consumer of the scheduler; owns the half-duplex link while a port is open
pub(crate) struct TransportTask {
    engine: Engine,
    codec: FrameCodec,
    settings: LinkSettings,
    decode: DecodeLevel,
    transaction: u32,
}

impl TransportTask {
    pub(crate) fn new(engine: Engine, settings: LinkSettings, decode: DecodeLevel) -> Self {
        Self {
            engine,
            codec: FrameCodec::new(settings.rtu_id),
            settings,
            decode,
            transaction: 0,
        }
    }

    /// drain the scheduler until the port fails or the engine shuts down
    pub(crate) async fn run(&mut self, io: &mut PhysLayer) -> SessionError {
        loop {
            if let Err(err) = self.poll(io).await {
                tracing::warn!("ending session: {}", err);
                return err;
            }
        }
    }

    async fn poll(&mut self, io: &mut PhysLayer) -> Result<(), SessionError> {
        let command = self.engine.scheduler().dequeue().await?;
        self.run_command(io, command).await
    }

    pub(crate) async fn run_command(
        &mut self,
        io: &mut PhysLayer,
        command: Command,
    ) -> Result<(), SessionError> {
        self.transaction = self.transaction.wrapping_add(1);
        let transaction = self.transaction;
        self.execute(io, &command)
            .instrument(tracing::info_span!("Transaction", id = transaction))
            .await
    }

    async fn execute(&mut self, io: &mut PhysLayer, command: &Command) -> Result<(), SessionError> {
        if self.decode.app.enabled() {
            tracing::info!("APP TX - {}", command);
        }

        // the same bytes are written on every attempt
        let bytes = match self.codec.encode_with_level(
            command.id().get_value(),
            command.payload(),
            self.decode.frame,
        ) {
            Ok(x) => x,
            Err(err) => {
                tracing::error!("unable to encode {}: {}", command, err);
                return Ok(());
            }
        };

        let mut failures: usize = 0;
        let mut state = AttemptState::Idle;
        loop {
            state = match state {
                AttemptState::Idle => AttemptState::Writing,
                AttemptState::Writing => match io.write(&bytes, self.decode.physical).await {
                    Ok(()) => AttemptState::AwaitingResponse,
                    Err(err) => AttemptState::Failed(err.into()),
                },
                AttemptState::AwaitingResponse => match self.read_frame(io, command).await {
                    Ok(frame) => {
                        self.engine.on_success();
                        self.engine
                            .handle_response(command, frame.body(), self.decode.app);
                        AttemptState::Success
                    }
                    Err(err) => AttemptState::Failed(err),
                },
                AttemptState::Success => return Ok(()),
                AttemptState::Failed(err) => {
                    failures += 1;
                    tracing::warn!(
                        "{} attempt {} of {} failed: {}",
                        command,
                        failures,
                        self.settings.max_retry,
                        err
                    );
                    if failures < self.settings.max_retry {
                        AttemptState::Writing
                    } else {
                        return self.give_up(command, err).await;
                    }
                }
            };
        }
    }

    async fn read_frame(&self, io: &mut PhysLayer, command: &Command) -> Result<Frame, RequestError> {
        let raw = io
            .read_response(self.settings.read_window(), self.decode.physical)
            .await?;
        let frame = self
            .codec
            .decode_with_level(&raw, command.id().get_value(), self.decode.frame)?;
        Ok(frame)
    }

    async fn give_up(&self, command: &Command, err: RequestError) -> Result<(), SessionError> {
        tracing::error!(
            "{} abandoned after {} attempts",
            command,
            self.settings.max_retry
        );
        self.engine.on_persistent_failure();

        if let RequestError::Io(kind) = err {
            return Err(SessionError::IoError(kind));
        }

        tokio::time::sleep(self.settings.failure_pause).await;
        Ok(())
    }
}

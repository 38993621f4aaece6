use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::bus::Channel;
use crate::command::{Command, CommandId};
use crate::engine::EngineState;
use crate::error::ResponseError;
use crate::status;

/// What happens to a validated response, one variant per kind of command
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Handler {
    /// feed the weighment state machine
    Weighment,
    /// decode and publish the digital output map
    OutputStatus,
    /// decode and publish the digital input map
    InputStatus,
    /// store the firmware version string
    FirmwareVersion,
    /// store the firmware release date string
    FirmwareReleaseDate,
    /// writes and session control, logged only
    Acknowledge,
}

impl Handler {
    fn for_command(id: CommandId) -> Self {
        match id {
            CommandId::WagonWeight => Handler::Weighment,
            CommandId::OutputStatusRead => Handler::OutputStatus,
            CommandId::InputStatusRead => Handler::InputStatus,
            CommandId::FirmwareVersionRead => Handler::FirmwareVersion,
            CommandId::FirmwareReleaseDateRead => Handler::FirmwareReleaseDate,
            CommandId::WeighbridgeIdRead
            | CommandId::AxleBlockRead(_)
            | CommandId::ScoreboardWrite
            | CommandId::OutputControlWrite
            | CommandId::OutputResetWrite
            | CommandId::InputStatusWrite
            | CommandId::Terminate
            | CommandId::InitAxleEliminate => Handler::Acknowledge,
        }
    }

    /// `body` is the command id followed by the payload
    pub(crate) fn handle(
        self,
        state: &mut EngineState,
        command: &Command,
        body: &[u8],
        now: NaiveDateTime,
    ) -> Result<(), ResponseError> {
        match self {
            Handler::Weighment => {
                if command.epoch != state.epoch() {
                    tracing::info!("ignoring {} issued before the session was reset", command);
                    return Ok(());
                }
                let outcome = state.session.handle(body, state.status_mode, now)?;
                state.apply_outcome(outcome);
            }
            Handler::OutputStatus => {
                let map = status::decode_output(body, state.status_control)?;
                state.publish(Channel::OutputStatus, &map);
            }
            Handler::InputStatus => {
                let map = status::decode_input(body)?;
                state.publish(Channel::InputStatus, &map);
            }
            Handler::FirmwareVersion => {
                let version = ascii(body);
                tracing::info!("firmware version: {}", version);
                state.firmware.version = Some(version);
            }
            Handler::FirmwareReleaseDate => {
                let date = ascii(body);
                tracing::info!("firmware release date: {}", date);
                state.firmware.release_date = Some(date);
            }
            Handler::Acknowledge => {
                tracing::info!("{} acknowledged", command.id());
            }
        }
        Ok(())
    }
}

// each byte after the command id is one character
fn ascii(body: &[u8]) -> String {
    body.iter().skip(1).map(|x| char::from(*x)).collect()
}

/// Lookup from command id to handler, built once per engine
pub(crate) struct DispatchTable {
    handlers: HashMap<CommandId, Handler>,
}

impl DispatchTable {
    pub(crate) fn new() -> Self {
        Self {
            handlers: CommandId::ALL
                .iter()
                .map(|id| (*id, Handler::for_command(*id)))
                .collect(),
        }
    }

    pub(crate) fn get(&self, id: CommandId) -> Handler {
        self.handlers
            .get(&id)
            .copied()
            .unwrap_or(Handler::Acknowledge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_command_has_a_handler() {
        let table = DispatchTable::new();
        assert_eq!(table.handlers.len(), CommandId::ALL.len());
        assert_eq!(table.get(CommandId::WagonWeight), Handler::Weighment);
        assert_eq!(table.get(CommandId::OutputStatusRead), Handler::OutputStatus);
        assert_eq!(table.get(CommandId::InputStatusRead), Handler::InputStatus);
        assert_eq!(table.get(CommandId::Terminate), Handler::Acknowledge);
        assert_eq!(table.get(CommandId::AxleBlockRead(4)), Handler::Acknowledge);
    }

    #[test]
    fn firmware_text_skips_command_id() {
        assert_eq!(ascii(b"\x50TLC V2.1"), "TLC V2.1");
        assert_eq!(ascii(&[0x51]), "");
    }
}

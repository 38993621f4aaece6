use crate::bus::{IngressChannel, Topics};
use crate::constants::output;
use crate::error::{CommandParseError, InvalidRequest};

const INITIATE: &str = "Initiate";
const TERMINATE: &str = "Terminate";
const RESET: &str = "RESET";
const SCOREBOARD: &str = "SCOREBOARD";

/// A command received from the message bus
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BusCommand {
    /// start weighing a rake, eliminating a number of leading axles
    Initiate {
        /// axles the controller should ignore
        axles: u8,
    },
    /// stop weighing
    Terminate,
    /// open the status page: report platform weight instead of wagons
    StatusInitiate,
    /// close the status page
    StatusTerminate,
    /// reset every output
    ResetOutputs,
    /// announce scoreboard availability
    Scoreboard(String),
    /// drive one output pin
    SetOutput {
        /// pin number, 1 to 16
        pin: u8,
        /// high or low pulse
        on: bool,
    },
    /// deliver stored records again from the first stored serial at or after a corrected serial
    SendFrom(i32),
}

fn parse_int<T: std::str::FromStr>(text: &str) -> Result<T, CommandParseError> {
    text.trim()
        .parse()
        .map_err(|_| CommandParseError::BadInteger(text.to_string()))
}

impl BusCommand {
    /// parse the text payload received on a topic
    pub fn from_topic(topics: &Topics, topic: &str, payload: &str) -> Result<Self, CommandParseError> {
        match topics.classify(topic) {
            Some(channel) => Self::parse(channel, payload),
            None => Err(CommandParseError::UnknownTopic(topic.to_string())),
        }
    }

    /// parse the text payload received on an ingress channel
    pub fn parse(channel: IngressChannel, payload: &str) -> Result<Self, CommandParseError> {
        let payload = payload.trim();
        let mut fields = payload.split(',');
        let first = fields.next().unwrap_or_default();
        let second = fields.next();

        match channel {
            IngressChannel::Command => match (first, second) {
                (INITIATE, None) => Ok(BusCommand::Initiate { axles: 0 }),
                (INITIATE, Some(axles)) => Ok(BusCommand::Initiate {
                    axles: parse_int(axles)?,
                }),
                _ if payload == TERMINATE => Ok(BusCommand::Terminate),
                _ => Err(CommandParseError::UnknownPayload(payload.to_string())),
            },
            IngressChannel::Status => match payload {
                INITIATE => Ok(BusCommand::StatusInitiate),
                TERMINATE => Ok(BusCommand::StatusTerminate),
                _ => Err(CommandParseError::UnknownPayload(payload.to_string())),
            },
            IngressChannel::WagonRequest => Ok(BusCommand::SendFrom(parse_int(payload)?)),
            IngressChannel::StatusControl => match first {
                RESET => Ok(BusCommand::ResetOutputs),
                SCOREBOARD => match second {
                    Some(text) => Ok(BusCommand::Scoreboard(text.to_string())),
                    None => Err(CommandParseError::MissingField("scoreboard text")),
                },
                _ => {
                    let state = second.ok_or(CommandParseError::MissingField("pin state"))?;
                    let pin: u8 = parse_int(first)?;
                    if !(output::MIN_PIN..=output::MAX_PIN).contains(&pin) {
                        return Err(InvalidRequest::PinOutOfRange(pin).into());
                    }
                    let on = match state.trim() {
                        "true" => true,
                        "false" => false,
                        other => return Err(CommandParseError::BadPinState(other.to_string())),
                    };
                    Ok(BusCommand::SetOutput { pin, on })
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_session_commands() {
        assert_eq!(
            BusCommand::parse(IngressChannel::Command, "Initiate"),
            Ok(BusCommand::Initiate { axles: 0 })
        );
        assert_eq!(
            BusCommand::parse(IngressChannel::Command, "Initiate,3"),
            Ok(BusCommand::Initiate { axles: 3 })
        );
        assert_eq!(
            BusCommand::parse(IngressChannel::Command, "Terminate"),
            Ok(BusCommand::Terminate)
        );
        assert_eq!(
            BusCommand::parse(IngressChannel::Command, "Initiate,many"),
            Err(CommandParseError::BadInteger("many".to_string()))
        );
        assert_eq!(
            BusCommand::parse(IngressChannel::Command, "Terminate,1"),
            Err(CommandParseError::UnknownPayload("Terminate,1".to_string()))
        );
    }

    #[test]
    fn parses_status_commands() {
        assert_eq!(
            BusCommand::parse(IngressChannel::Status, "Initiate"),
            Ok(BusCommand::StatusInitiate)
        );
        assert_eq!(
            BusCommand::parse(IngressChannel::Status, "Terminate\n"),
            Ok(BusCommand::StatusTerminate)
        );
        assert!(BusCommand::parse(IngressChannel::Status, "Pause").is_err());
    }

    #[test]
    fn parses_status_control_commands() {
        assert_eq!(
            BusCommand::parse(IngressChannel::StatusControl, "RESET"),
            Ok(BusCommand::ResetOutputs)
        );
        assert_eq!(
            BusCommand::parse(IngressChannel::StatusControl, "SCOREBOARD,SB1"),
            Ok(BusCommand::Scoreboard("SB1".to_string()))
        );
        assert_eq!(
            BusCommand::parse(IngressChannel::StatusControl, "SCOREBOARD"),
            Err(CommandParseError::MissingField("scoreboard text"))
        );
        assert_eq!(
            BusCommand::parse(IngressChannel::StatusControl, "3,true"),
            Ok(BusCommand::SetOutput { pin: 3, on: true })
        );
        assert_eq!(
            BusCommand::parse(IngressChannel::StatusControl, "16,false"),
            Ok(BusCommand::SetOutput { pin: 16, on: false })
        );
        assert_eq!(
            BusCommand::parse(IngressChannel::StatusControl, "17,false"),
            Err(CommandParseError::BadRequest(InvalidRequest::PinOutOfRange(17)))
        );
        assert_eq!(
            BusCommand::parse(IngressChannel::StatusControl, "2,on"),
            Err(CommandParseError::BadPinState("on".to_string()))
        );
    }

    #[test]
    fn parses_wagon_requests_by_topic() {
        let topics = Topics::default();
        assert_eq!(
            BusCommand::from_topic(&topics, "/Merit/MBMAGH01/Weighment/sendFrom/", "12"),
            Ok(BusCommand::SendFrom(12))
        );
        assert_eq!(
            BusCommand::from_topic(&topics, "/Merit/MBMAGH01/Nope/", "12"),
            Err(CommandParseError::UnknownTopic(
                "/Merit/MBMAGH01/Nope/".to_string()
            ))
        );
    }
}

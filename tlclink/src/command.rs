use crate::constants::{frame::MAX_PAYLOAD_LENGTH, output, wagon};
use crate::error::InvalidRequest;

/// Every command id understood by the controller
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandId {
    /// read the current and actual digital output words
    OutputStatusRead,
    /// read the current and actual digital input words
    InputStatusRead,
    /// read the firmware version string
    FirmwareVersionRead,
    /// read the firmware release date string
    FirmwareReleaseDateRead,
    /// read the weighbridge id
    WeighbridgeIdRead,
    /// read a block of 50 axle weights (block 0 covers axles 1 to 50)
    AxleBlockRead(u8),
    /// announce scoreboard availability
    ScoreboardWrite,
    /// query the weight of a wagon
    WagonWeight,
    /// drive a single output pin
    OutputControlWrite,
    /// reset every output
    OutputResetWrite,
    /// write the input status
    InputStatusWrite,
    /// end the weighment
    Terminate,
    /// start a weighment, eliminating a number of leading axles
    InitAxleEliminate,
}

const AXLE_BLOCK_FIRST: u8 = 0x82;
const AXLE_BLOCK_LAST: u8 = 0x8B;

impl CommandId {
    /// every command id, in ascending wire order
    pub const ALL: [CommandId; 22] = [
        CommandId::OutputStatusRead,
        CommandId::InputStatusRead,
        CommandId::OutputControlWrite,
        CommandId::InputStatusWrite,
        CommandId::OutputResetWrite,
        CommandId::FirmwareVersionRead,
        CommandId::FirmwareReleaseDateRead,
        CommandId::WeighbridgeIdRead,
        CommandId::ScoreboardWrite,
        CommandId::WagonWeight,
        CommandId::Terminate,
        CommandId::InitAxleEliminate,
        CommandId::AxleBlockRead(0),
        CommandId::AxleBlockRead(1),
        CommandId::AxleBlockRead(2),
        CommandId::AxleBlockRead(3),
        CommandId::AxleBlockRead(4),
        CommandId::AxleBlockRead(5),
        CommandId::AxleBlockRead(6),
        CommandId::AxleBlockRead(7),
        CommandId::AxleBlockRead(8),
        CommandId::AxleBlockRead(9),
    ];

    /// map a raw id to a known command
    pub fn get(value: u8) -> Option<Self> {
        match value {
            0x04 => Some(CommandId::OutputStatusRead),
            0x0A => Some(CommandId::InputStatusRead),
            0x1E => Some(CommandId::OutputControlWrite),
            0x1F => Some(CommandId::InputStatusWrite),
            0x49 => Some(CommandId::OutputResetWrite),
            0x50 => Some(CommandId::FirmwareVersionRead),
            0x51 => Some(CommandId::FirmwareReleaseDateRead),
            0x53 => Some(CommandId::WeighbridgeIdRead),
            0x54 => Some(CommandId::ScoreboardWrite),
            0x5A => Some(CommandId::WagonWeight),
            0x5B => Some(CommandId::Terminate),
            0x5D => Some(CommandId::InitAxleEliminate),
            AXLE_BLOCK_FIRST..=AXLE_BLOCK_LAST => {
                Some(CommandId::AxleBlockRead(value - AXLE_BLOCK_FIRST))
            }
            _ => None,
        }
    }

    /// the raw id written to the wire
    pub fn get_value(self) -> u8 {
        match self {
            CommandId::OutputStatusRead => 0x04,
            CommandId::InputStatusRead => 0x0A,
            CommandId::OutputControlWrite => 0x1E,
            CommandId::InputStatusWrite => 0x1F,
            CommandId::OutputResetWrite => 0x49,
            CommandId::FirmwareVersionRead => 0x50,
            CommandId::FirmwareReleaseDateRead => 0x51,
            CommandId::WeighbridgeIdRead => 0x53,
            CommandId::ScoreboardWrite => 0x54,
            CommandId::WagonWeight => 0x5A,
            CommandId::Terminate => 0x5B,
            CommandId::InitAxleEliminate => 0x5D,
            CommandId::AxleBlockRead(block) => {
                AXLE_BLOCK_FIRST + block.min(AXLE_BLOCK_LAST - AXLE_BLOCK_FIRST)
            }
        }
    }
}

impl std::fmt::Display for CommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            CommandId::OutputStatusRead => f.write_str("OUTPUT STATUS READ"),
            CommandId::InputStatusRead => f.write_str("INPUT STATUS READ"),
            CommandId::OutputControlWrite => f.write_str("OUTPUT CONTROL WRITE"),
            CommandId::InputStatusWrite => f.write_str("INPUT STATUS WRITE"),
            CommandId::OutputResetWrite => f.write_str("OUTPUT RESET WRITE"),
            CommandId::FirmwareVersionRead => f.write_str("FIRMWARE VERSION READ"),
            CommandId::FirmwareReleaseDateRead => f.write_str("FIRMWARE RELEASE DATE READ"),
            CommandId::WeighbridgeIdRead => f.write_str("WEIGHBRIDGE ID READ"),
            CommandId::ScoreboardWrite => f.write_str("SCOREBOARD WRITE"),
            CommandId::WagonWeight => f.write_str("WAGON WEIGHT"),
            CommandId::Terminate => f.write_str("TERMINATE"),
            CommandId::InitAxleEliminate => f.write_str("INIT AXLE ELIMINATE"),
            CommandId::AxleBlockRead(block) => {
                let first = u16::from(*block) * 50 + 1;
                write!(f, "AXLE {first} TO {} READ", first + 49)
            }
        }
    }
}

/// Scheduling tier of a command; `High` always drains before `Low`
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    /// weighment polls, session control and operator writes
    High = 1,
    /// idle scans
    Low = 2,
}

/// A command waiting to be written to the controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub(crate) id: CommandId,
    pub(crate) payload: Vec<u8>,
    pub(crate) priority: Priority,
    // session epoch at the time the command was issued
    pub(crate) epoch: u64,
}

impl Command {
    /// build a command, rejecting payloads the length field cannot describe
    pub fn new(id: CommandId, payload: Vec<u8>, priority: Priority) -> Result<Self, InvalidRequest> {
        if payload.len() > MAX_PAYLOAD_LENGTH {
            return Err(InvalidRequest::PayloadTooLarge(
                payload.len(),
                MAX_PAYLOAD_LENGTH,
            ));
        }
        Ok(Self {
            id,
            payload,
            priority,
            epoch: 0,
        })
    }

    fn without_payload(id: CommandId, priority: Priority) -> Self {
        Self {
            id,
            payload: Vec::new(),
            priority,
            epoch: 0,
        }
    }

    /// query the weight of a wagon, wagon 0 being the idle scan
    pub fn wagon_weight(number: u8, priority: Priority) -> Self {
        Self {
            id: CommandId::WagonWeight,
            payload: vec![
                number,
                wagon::TEST_WAGON,
                wagon::RESOLUTION[0],
                wagon::RESOLUTION[1],
            ],
            priority,
            epoch: 0,
        }
    }

    /// read the digital output words
    pub fn output_status(priority: Priority) -> Self {
        Self::without_payload(CommandId::OutputStatusRead, priority)
    }

    /// read the digital input words
    pub fn input_status(priority: Priority) -> Self {
        Self::without_payload(CommandId::InputStatusRead, priority)
    }

    /// read the firmware version
    pub fn firmware_version() -> Self {
        Self::without_payload(CommandId::FirmwareVersionRead, Priority::High)
    }

    /// read the firmware release date
    pub fn firmware_release_date() -> Self {
        Self::without_payload(CommandId::FirmwareReleaseDateRead, Priority::High)
    }

    /// start a weighment, eliminating `axles` leading axles
    pub fn init(axles: u8) -> Self {
        Self {
            id: CommandId::InitAxleEliminate,
            payload: vec![axles],
            priority: Priority::High,
            epoch: 0,
        }
    }

    /// end the weighment
    pub fn terminate() -> Self {
        Self::without_payload(CommandId::Terminate, Priority::High)
    }

    /// reset every output
    pub fn output_reset() -> Self {
        Self::without_payload(CommandId::OutputResetWrite, Priority::High)
    }

    /// pulse an output pin high (`on`) or low
    pub fn output_control(pin: u8, on: bool) -> Result<Self, InvalidRequest> {
        if !(output::MIN_PIN..=output::MAX_PIN).contains(&pin) {
            return Err(InvalidRequest::PinOutOfRange(pin));
        }
        let state = if on {
            output::HIGH_PULSE
        } else {
            output::LOW_PULSE
        };
        Ok(Self {
            id: CommandId::OutputControlWrite,
            payload: vec![pin, state],
            priority: Priority::High,
            epoch: 0,
        })
    }

    /// announce scoreboard availability, followed by the weighbridge id
    pub fn scoreboard(text: &str, host_id: &str) -> Result<Self, InvalidRequest> {
        let mut payload = Vec::with_capacity(text.len() + host_id.len());
        payload.extend_from_slice(text.as_bytes());
        payload.extend_from_slice(host_id.as_bytes());
        Self::new(CommandId::ScoreboardWrite, payload, Priority::High)
    }

    /// the command id
    pub fn id(&self) -> CommandId {
        self.id
    }

    /// the payload following the command id
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// the scheduling tier
    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub(crate) fn with_epoch(mut self, epoch: u64) -> Self {
        self.epoch = epoch;
        self
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.id {
            CommandId::WagonWeight => match self.payload.first() {
                Some(wagon) => write!(f, "{} (wagon: {wagon})", self.id),
                None => write!(f, "{}", self.id),
            },
            _ => write!(f, "{}", self.id),
        }
    }
}

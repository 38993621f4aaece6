use scursor::ReadCursor;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::ResponseError;

/// Signal names of the digital output word, indexed by bit position
pub const OUTPUT_SIGNALS: [&str; 16] = [
    "SystemReady",
    "OverSpeedLampRelay",
    "AlarmHooter",
    "pin4",
    "pin5",
    "pin6",
    "pin7",
    "pin8",
    "SystemReadyLamp",
    "OverSpeedLamp",
    "AdvanceOverSpeedLamp",
    "UnknownVehicle",
    "ADFailure",
    "pin14",
    "pin15",
    "pin16",
];

/// Signal names of the digital input word, indexed by bit position
pub const INPUT_SIGNALS: [&str; 16] = [
    "TrackSwitch1A",
    "TrackSwitch1B",
    "TrackSwitch2A",
    "TrackSwitch2B",
    "TrackSwitch3A",
    "TrackSwitch3B",
    "TrackSwitch4A",
    "TrackSwitch4B",
    "StartWeigh",
    "EndWeigh",
    "Aos_In_Dir_5A",
    "Aos_In_Dir_5B",
    "Aos_Out_Dir_6B",
    "Aos_Out_Dir_6A",
    "pin15",
    "pin16",
];

/// The two words carried by a status read response
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StatusWords {
    /// the state the controller has been asked to drive
    pub current: u16,
    /// the state read back from the hardware
    pub actual: u16,
}

impl StatusWords {
    const LENGTH: usize = 5;

    /// parse `[cmd, current LSB, current MSB, actual LSB, actual MSB]`
    pub fn parse(body: &[u8]) -> Result<Self, ResponseError> {
        if body.len() < Self::LENGTH {
            return Err(ResponseError::InsufficientBytes {
                required: Self::LENGTH,
                actual: body.len(),
            });
        }
        let mut cursor = ReadCursor::new(body);
        // command id
        cursor.read_u8()?;
        let current = cursor.read_u16_le()?;
        let actual = cursor.read_u16_le()?;
        Ok(Self { current, actual })
    }
}

/// Named bits of one status word, serialized as a JSON object
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StatusMap {
    word: u16,
    names: &'static [&'static str; 16],
}

impl StatusMap {
    /// decode `word` using the names of each bit position
    pub fn new(word: u16, names: &'static [&'static str; 16]) -> Self {
        Self { word, names }
    }

    /// the raw word
    pub fn word(&self) -> u16 {
        self.word
    }

    /// value of the named signal, if the name is known
    pub fn get(&self, name: &str) -> Option<u8> {
        self.names
            .iter()
            .position(|x| *x == name)
            .map(|bit| self.bit(bit))
    }

    /// iterate over the signals in bit order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u8)> + '_ {
        self.names
            .iter()
            .enumerate()
            .map(|(bit, name)| (*name, self.bit(bit)))
    }

    fn bit(&self, position: usize) -> u8 {
        ((self.word >> position) & 1) as u8
    }
}

impl Serialize for StatusMap {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.names.len() + 1))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, &value)?;
        }
        map.serialize_entry("Message", "")?;
        map.end()
    }
}

/// Decode an output status response
///
/// While the operator is driving outputs directly the "current" word is
/// reported, otherwise the "actual" word read back from the hardware.
pub fn decode_output(body: &[u8], control_mode: bool) -> Result<StatusMap, ResponseError> {
    let words = StatusWords::parse(body)?;
    let word = if control_mode {
        words.current
    } else {
        words.actual
    };
    Ok(StatusMap::new(word, &OUTPUT_SIGNALS))
}

/// Decode an input status response, always from the "actual" word
pub fn decode_input(body: &[u8]) -> Result<StatusMap, ResponseError> {
    let words = StatusWords::parse(body)?;
    Ok(StatusMap::new(words.actual, &INPUT_SIGNALS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_bits_by_position() {
        let map = StatusMap::new(0b1000_0000_0000_0101, &OUTPUT_SIGNALS);
        assert_eq!(map.get("SystemReady"), Some(1));
        assert_eq!(map.get("OverSpeedLampRelay"), Some(0));
        assert_eq!(map.get("AlarmHooter"), Some(1));
        assert_eq!(map.get("pin16"), Some(1));
        assert_eq!(map.get("pin15"), Some(0));
        assert_eq!(map.get("NoSuchSignal"), None);
    }

    #[test]
    fn output_word_follows_control_mode() {
        // current = 0x0001, actual = 0x0800
        let body = [0x04, 0x01, 0x00, 0x00, 0x08];
        let automatic = decode_output(&body, false).unwrap();
        assert_eq!(automatic.get("SystemReady"), Some(0));
        assert_eq!(automatic.get("UnknownVehicle"), Some(1));

        let controlled = decode_output(&body, true).unwrap();
        assert_eq!(controlled.get("SystemReady"), Some(1));
        assert_eq!(controlled.get("UnknownVehicle"), Some(0));
    }

    #[test]
    fn input_always_uses_actual_word() {
        let body = [0x0A, 0xFF, 0xFF, 0x00, 0x03];
        let map = decode_input(&body).unwrap();
        assert_eq!(map.word(), 0x0300);
        assert_eq!(map.get("TrackSwitch1A"), Some(0));
        assert_eq!(map.get("StartWeigh"), Some(1));
        assert_eq!(map.get("EndWeigh"), Some(1));
    }

    #[test]
    fn short_response_is_rejected() {
        assert_eq!(
            decode_input(&[0x0A, 0x00]),
            Err(ResponseError::InsufficientBytes {
                required: 5,
                actual: 2
            })
        );
    }

    #[test]
    fn serializes_in_bit_order_with_message() {
        let map = StatusMap::new(0x0001, &INPUT_SIGNALS);
        let json = serde_json::to_string(&map).unwrap();
        assert!(json.starts_with("{\"TrackSwitch1A\":1,\"TrackSwitch1B\":0,"));
        assert!(json.ends_with("\"pin15\":0,\"pin16\":0,\"Message\":\"\"}"));
    }
}

use crate::checksum::{checksum, Checksum};
use crate::constants::frame::*;
use crate::decode::FrameDecodeLevel;
use crate::error::{FrameError, InternalError, InvalidRequest, RequestError};
use crate::phys::format_bytes;

use scursor::WriteCursor;

/// A validated frame with stuffing, header and checksum removed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    // command id followed by the payload
    body: Vec<u8>,
}

impl Frame {
    /// the command id carried by the frame
    pub fn command(&self) -> u8 {
        // the decoder never produces an empty body
        self.body.first().copied().unwrap_or_default()
    }

    /// the payload following the command id
    pub fn payload(&self) -> &[u8] {
        self.body.get(1..).unwrap_or_default()
    }

    /// the command id and payload, as covered by the length field
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// Encodes commands into stuffed, checksummed frames and validates received frames
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameCodec {
    rtu_id: u8,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_RTU_ID)
    }
}

impl FrameCodec {
    /// create a codec for the controller with the specified RTU id
    pub fn new(rtu_id: u8) -> Self {
        Self { rtu_id }
    }

    /// RTU id written to and expected in every frame
    pub fn rtu_id(&self) -> u8 {
        self.rtu_id
    }

    /// Build `[START, RTU, LEN_LO, LEN_HI, CMD, payload.., CK_LO, CK_HI]` and apply stuffing
    pub fn encode(&self, command: u8, payload: &[u8]) -> Result<Vec<u8>, RequestError> {
        self.encode_with_level(command, payload, FrameDecodeLevel::Nothing)
    }

    pub(crate) fn encode_with_level(
        &self,
        command: u8,
        payload: &[u8],
        level: FrameDecodeLevel,
    ) -> Result<Vec<u8>, RequestError> {
        if payload.len() > MAX_PAYLOAD_LENGTH {
            return Err(InvalidRequest::PayloadTooLarge(payload.len(), MAX_PAYLOAD_LENGTH).into());
        }

        let mut buffer = [0u8; MAX_FRAME_LENGTH];
        let (length, crc) = {
            let mut cursor = WriteCursor::new(&mut buffer);
            cursor.write_u8(START)?;
            cursor.write_u8(self.rtu_id)?;
            // length counts the command byte
            cursor.write_u16_le(payload.len() as u16 + 1)?;
            cursor.write_u8(command)?;
            for byte in payload {
                cursor.write_u8(*byte)?;
            }
            let end = cursor.position();
            let crc = checksum(
                cursor
                    .get(0..end)
                    .ok_or(InternalError::InsufficientWriteSpace)?,
            );
            cursor.write_u16_le(crc)?;
            (cursor.position(), crc)
        };

        let frame = buffer
            .get(0..length)
            .ok_or(InternalError::InsufficientWriteSpace)?;

        if level.enabled() {
            tracing::info!(
                "FRAME TX - {}",
                FrameDisplay::new(level, self.rtu_id, command, payload, crc)
            );
        }

        Ok(stuff(frame))
    }

    /// Remove stuffing and validate a received frame against the command that was sent
    ///
    /// Checks are applied in order: start byte, RTU id, command id, length, checksum
    pub fn decode(&self, raw: &[u8], expected_command: u8) -> Result<Frame, FrameError> {
        self.decode_with_level(raw, expected_command, FrameDecodeLevel::Nothing)
    }

    pub(crate) fn decode_with_level(
        &self,
        raw: &[u8],
        expected_command: u8,
        level: FrameDecodeLevel,
    ) -> Result<Frame, FrameError> {
        if raw.is_empty() {
            return Err(FrameError::Empty);
        }

        let frame = unstuff(raw)?;

        match frame.first() {
            Some(&START) => {}
            other => return Err(FrameError::HeaderMismatch(other.copied())),
        }

        let rtu_id = frame.get(1).copied();
        if rtu_id != Some(self.rtu_id) {
            return Err(FrameError::RtuMismatch {
                expected: self.rtu_id,
                received: rtu_id,
            });
        }

        let length = match (frame.get(2), frame.get(3)) {
            (Some(lo), Some(hi)) => u16::from_le_bytes([*lo, *hi]) as usize,
            _ => {
                return Err(FrameError::LengthMismatch {
                    expected: COMMAND_OFFSET + CHECKSUM_LENGTH,
                    actual: frame.len(),
                })
            }
        };

        let command = frame.get(COMMAND_OFFSET).copied();
        if command != Some(expected_command) {
            return Err(FrameError::CommandMismatch {
                expected: expected_command,
                received: command,
            });
        }

        let end_of_body = COMMAND_OFFSET + length;
        // a zero length cannot cover the command byte
        if length == 0 || frame.len() != end_of_body + CHECKSUM_LENGTH {
            return Err(FrameError::LengthMismatch {
                expected: end_of_body + CHECKSUM_LENGTH,
                actual: frame.len(),
            });
        }

        // lengths were checked above, these slices are in bounds
        let (covered, trailer) = frame.split_at(end_of_body);
        let received = u16::from_le_bytes([trailer[0], trailer[1]]);
        let expected = {
            let mut running = Checksum::new();
            running.update(&covered[..COMMAND_OFFSET]);
            running.update(&covered[COMMAND_OFFSET..]);
            running.finalize()
        };
        if received != expected {
            return Err(FrameError::ChecksumMismatch { received, expected });
        }

        let body = covered[COMMAND_OFFSET..].to_vec();

        if level.enabled() {
            tracing::info!(
                "FRAME RX - {}",
                FrameDisplay::new(level, self.rtu_id, expected_command, &body[1..], received)
            );
        }

        Ok(Frame { body })
    }
}

/// Escape every START or ESCAPE byte that follows the leading byte
pub fn stuff(frame: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(frame.len() + 4);
    let mut bytes = frame.iter();
    if let Some(first) = bytes.next() {
        output.push(*first);
    }
    for byte in bytes {
        if *byte == START || *byte == ESCAPE {
            output.push(ESCAPE);
        }
        output.push(*byte);
    }
    output
}

/// Collapse each `[ESCAPE, START]` or `[ESCAPE, ESCAPE]` pair into its second byte
///
/// An escape followed by any other byte, or by nothing, is malformed
pub fn unstuff(raw: &[u8]) -> Result<Vec<u8>, FrameError> {
    let mut output = Vec::with_capacity(raw.len());
    let mut bytes = raw.iter();
    while let Some(byte) = bytes.next() {
        if *byte != ESCAPE {
            output.push(*byte);
            continue;
        }
        match bytes.next() {
            Some(next) if *next == START || *next == ESCAPE => output.push(*next),
            _ => return Err(FrameError::MalformedFrame),
        }
    }
    Ok(output)
}

pub(crate) struct FrameDisplay<'a> {
    level: FrameDecodeLevel,
    rtu_id: u8,
    command: u8,
    payload: &'a [u8],
    checksum: u16,
}

impl<'a> FrameDisplay<'a> {
    pub(crate) fn new(
        level: FrameDecodeLevel,
        rtu_id: u8,
        command: u8,
        payload: &'a [u8],
        checksum: u16,
    ) -> Self {
        Self {
            level,
            rtu_id,
            command,
            payload,
            checksum,
        }
    }
}

impl std::fmt::Display for FrameDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "rtu: {:#04X} cmd: {:#04X} len: {} checksum: {:#06X}",
            self.rtu_id,
            self.command,
            self.payload.len() + 1,
            self.checksum
        )?;
        if self.level.payload_enabled() {
            format_bytes(f, self.payload)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAGON_WEIGHT: u8 = 0x5A;

    fn codec() -> FrameCodec {
        FrameCodec::default()
    }

    #[test]
    fn encodes_firmware_version_read() {
        assert_eq!(
            codec().encode(0x50, &[]).unwrap(),
            vec![0x7E, 0x01, 0x01, 0x00, 0x50, 0xA9, 0x60]
        );
    }

    #[test]
    fn encodes_wagon_scan() {
        assert_eq!(
            codec().encode(WAGON_WEIGHT, &[0, 0, 20, 0]).unwrap(),
            vec![0x7E, 0x01, 0x05, 0x00, 0x5A, 0x00, 0x00, 0x14, 0x00, 0x3C, 0x8F]
        );
    }

    #[test]
    fn escapes_reserved_bytes_after_the_first() {
        let stuffed = codec().encode(0x54, &[0x7E, 0x10, 0x33]).unwrap();
        assert_eq!(&stuffed[..9], &[0x7E, 0x01, 0x04, 0x00, 0x54, 0x10, 0x7E, 0x10, 0x10]);
        assert_eq!(stuffed[9], 0x33);
        // only the leading start byte is unescaped
        assert_eq!(stuffed.iter().filter(|b| **b == START).count(), 2);
    }

    #[test]
    fn round_trips_payloads_of_every_length() {
        for len in 0..=MAX_PAYLOAD_LENGTH {
            let payload: Vec<u8> = (0..len).map(|x| (x * 7 + 0x70) as u8).collect();
            let encoded = codec().encode(0x1E, &payload).unwrap();
            let frame = codec().decode(&encoded, 0x1E).unwrap();
            assert_eq!(frame.command(), 0x1E);
            assert_eq!(frame.payload(), payload.as_slice());
        }
    }

    #[test]
    fn rejects_oversized_payload() {
        let payload = [0u8; MAX_PAYLOAD_LENGTH + 1];
        assert_eq!(
            codec().encode(0x54, &payload),
            Err(RequestError::BadRequest(InvalidRequest::PayloadTooLarge(
                MAX_PAYLOAD_LENGTH + 1,
                MAX_PAYLOAD_LENGTH
            )))
        );
    }

    #[test]
    fn unstuff_reverses_stuff() {
        let inputs: [&[u8]; 4] = [
            &[0x7E],
            &[0x7E, 0x7E, 0x7E],
            &[0x7E, 0x10, 0x10, 0x7E, 0x01],
            &[0x7E, 0x01, 0x02, 0x03, 0x10],
        ];
        for input in inputs {
            let stuffed = stuff(input);
            assert_eq!(unstuff(&stuffed).unwrap(), input);
        }
    }

    #[test]
    fn unstuff_reverses_stuff_for_dense_sequences() {
        const ALPHABET: [u8; 4] = [START, ESCAPE, 0x00, 0x55];

        fn check(input: &[u8]) {
            let stuffed = stuff(input);
            let reserved = input[1..]
                .iter()
                .filter(|b| **b == START || **b == ESCAPE)
                .count();
            assert_eq!(stuffed.len(), input.len() + reserved);
            assert_eq!(unstuff(&stuffed).unwrap(), input, "input: {input:02X?}");
        }

        let mut seed: u32 = 0x1234_5678;
        for len in 0..64 {
            for _ in 0..16 {
                let mut input = vec![START];
                for _ in 0..len {
                    seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                    input.push(ALPHABET[(seed >> 16) as usize % ALPHABET.len()]);
                }
                check(&input);
            }
        }

        for run in 1..16 {
            let mut input = vec![START, 0x01];
            input.extend(vec![ESCAPE; run]);
            check(&input);
            input.push(START);
            check(&input);
            input.push(0x22);
            input.push(ESCAPE);
            check(&input);
        }
    }

    #[test]
    fn trailing_escape_is_malformed() {
        assert_eq!(unstuff(&[0x7E, 0x01, 0x10]), Err(FrameError::MalformedFrame));
    }

    #[test]
    fn escape_before_ordinary_byte_is_malformed() {
        assert_eq!(unstuff(&[0x7E, 0x10, 0x05]), Err(FrameError::MalformedFrame));
    }

    #[test]
    fn empty_read_is_reported_as_empty() {
        assert_eq!(codec().decode(&[], 0x50), Err(FrameError::Empty));
    }

    #[test]
    fn detects_header_mismatch() {
        let mut frame = codec().encode(0x50, &[]).unwrap();
        frame[0] = 0x7F;
        assert_eq!(
            codec().decode(&frame, 0x50),
            Err(FrameError::HeaderMismatch(Some(0x7F)))
        );
    }

    #[test]
    fn detects_rtu_mismatch() {
        let frame = FrameCodec::new(0x02).encode(0x50, &[]).unwrap();
        assert_eq!(
            codec().decode(&frame, 0x50),
            Err(FrameError::RtuMismatch {
                expected: 0x01,
                received: Some(0x02)
            })
        );
    }

    #[test]
    fn detects_command_mismatch() {
        let frame = codec().encode(0x51, &[]).unwrap();
        assert_eq!(
            codec().decode(&frame, 0x50),
            Err(FrameError::CommandMismatch {
                expected: 0x50,
                received: Some(0x51)
            })
        );
    }

    #[test]
    fn detects_truncated_frame() {
        let frame = codec().encode(0x0A, &[1, 2, 3, 4]).unwrap();
        assert_eq!(
            codec().decode(&frame[..frame.len() - 1], 0x0A),
            Err(FrameError::LengthMismatch {
                expected: 11,
                actual: 10
            })
        );
    }

    #[test]
    fn single_bit_flips_in_payload_are_detected() {
        let payload = [0x2B, 0x42, 0x0F, 0x00, 0x01, 0x05, 0x03];
        let mut plain = vec![0x7E, 0x01, payload.len() as u8 + 1, 0x00, WAGON_WEIGHT];
        plain.extend_from_slice(&payload);
        let crc = checksum(&plain);
        plain.extend_from_slice(&crc.to_le_bytes());

        for index in COMMAND_OFFSET + 1..COMMAND_OFFSET + 1 + payload.len() {
            for bit in 0..8 {
                let mut corrupted = plain.clone();
                corrupted[index] ^= 1 << bit;
                let result = codec().decode(&stuff(&corrupted), WAGON_WEIGHT);
                assert!(
                    matches!(result, Err(FrameError::ChecksumMismatch { .. })),
                    "byte {index} bit {bit}: {result:?}"
                );
            }
        }
    }
}

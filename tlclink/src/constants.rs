/// Byte-level framing constants
pub mod frame {
    /// first byte of every frame
    pub const START: u8 = 0x7E;
    /// stuffing escape, precedes any START or ESCAPE after the first byte
    pub const ESCAPE: u8 = 0x10;
    /// RTU id of the controller unless configured otherwise
    pub const DEFAULT_RTU_ID: u8 = 0x01;
    /// offset of the command id within an unstuffed frame
    pub const COMMAND_OFFSET: usize = 4;
    /// length of the trailing checksum
    pub const CHECKSUM_LENGTH: usize = 2;
    /// largest payload (excluding the command byte) accepted by the encoder
    pub const MAX_PAYLOAD_LENGTH: usize = 255;
    /// largest unstuffed frame the encoder produces
    pub const MAX_FRAME_LENGTH: usize = COMMAND_OFFSET + 1 + MAX_PAYLOAD_LENGTH + CHECKSUM_LENGTH;
}

/// Wagon weight command parameters and response layout
pub mod wagon {
    /// test wagon flag sent in every wagon weight query
    pub const TEST_WAGON: u8 = 0;
    /// weight resolution requested in every wagon weight query (LSB, MSB)
    pub const RESOLUTION: [u8; 2] = [20, 0];
    /// wagon number used by idle scans
    pub const SCAN_WAGON: u8 = 0;
    /// decoded payload length when the response carries a wagon
    pub const WAGON_PAYLOAD_LENGTH: usize = 45;
    /// decoded payload length of an idle scan response
    pub const SCAN_PAYLOAD_LENGTH: usize = 30;
    /// added to a raw magnitude to recover a negative weight
    pub const NEGATIVE_WEIGHT_OFFSET: u32 = 16_777_216;
    /// divisor applied to raw weights
    pub const WEIGHT_DIVISOR: f64 = 100.0;
    /// divisor applied to raw speeds
    pub const SPEED_DIVISOR: f64 = 10.0;
    /// axle sample meaning the axle has not been initialised yet
    pub const AXLE_NOT_INITIALIZED: i16 = -4;
    /// axle sample meaning weighing of the axle is still in progress
    pub const AXLE_IN_PROGRESS: i16 = -3;
}

/// Output control write parameters
pub mod output {
    /// lowest controllable output pin
    pub const MIN_PIN: u8 = 1;
    /// highest controllable output pin
    pub const MAX_PIN: u8 = 16;
    /// drive the pin high with a pulse
    pub const HIGH_PULSE: u8 = 0x40;
    /// drive the pin low with a pulse
    pub const LOW_PULSE: u8 = 0x80;
    /// drive the pin high permanently
    pub const HIGH_PERMANENT: u8 = 0x10;
    /// drive the pin low permanently
    pub const LOW_PERMANENT: u8 = 0x20;
}

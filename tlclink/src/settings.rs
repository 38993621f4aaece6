use std::time::Duration;

use crate::bus::Topics;
use crate::constants::frame::DEFAULT_RTU_ID;
use crate::decode::DecodeLevel;
use crate::phys::ReadWindow;

/// Parameters of the request/response exchange with the controller
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LinkSettings {
    /// RTU id written to and expected in every frame
    pub rtu_id: u8,
    /// time allowed for a complete response
    pub response_window: Duration,
    /// a gap this long after the first byte ends the response
    pub inter_char_gap: Duration,
    /// responses are cut off after this many bytes
    pub max_response_size: usize,
    /// consecutive failed attempts before a command is abandoned
    pub max_retry: usize,
    /// pause after a command is abandoned
    pub failure_pause: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            rtu_id: DEFAULT_RTU_ID,
            response_window: Duration::from_millis(500),
            inter_char_gap: Duration::from_millis(50),
            max_response_size: 150,
            max_retry: 10,
            failure_pause: Duration::from_secs(1),
        }
    }
}

impl LinkSettings {
    pub(crate) fn read_window(&self) -> ReadWindow {
        ReadWindow {
            window: self.response_window,
            inter_char: self.inter_char_gap,
            max_size: self.max_response_size,
        }
    }
}

/// Pacing of the idle monitor
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PollSettings {
    /// delay between successive idle queries
    pub scan_delay: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            scan_delay: Duration::from_millis(250),
        }
    }
}

/// Everything a bridge needs besides its port, sink and listener
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BridgeConfig {
    /// request/response exchange with the controller
    pub link: LinkSettings,
    /// idle monitor pacing
    pub poll: PollSettings,
    /// bus topics of the weighbridge
    pub topics: Topics,
    /// protocol decoding in the log
    pub decode: DecodeLevel,
}

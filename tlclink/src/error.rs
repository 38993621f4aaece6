/// The task processing commands has been shut down
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Shutdown;

impl std::fmt::Display for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("the task processing commands has been shut down")
    }
}

impl std::error::Error for Shutdown {}

/// Errors that can be produced when validating a received frame
///
/// Every variant is recoverable by retrying the same command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameError {
    /// nothing was received within the response window
    Empty,
    /// the first byte was not the start byte
    HeaderMismatch(Option<u8>),
    /// the RTU id did not match the configured id
    RtuMismatch {
        /// expected RTU id
        expected: u8,
        /// received RTU id, if present
        received: Option<u8>,
    },
    /// the command id did not match the command that was sent
    CommandMismatch {
        /// id of the command that was sent
        expected: u8,
        /// id found in the response, if present
        received: Option<u8>,
    },
    /// the frame length did not agree with its length field
    LengthMismatch {
        /// length implied by the length field
        expected: usize,
        /// actual length after unstuffing
        actual: usize,
    },
    /// the trailing checksum did not match the computed checksum
    ChecksumMismatch {
        /// checksum carried by the frame
        received: u16,
        /// checksum computed over the frame
        expected: u16,
    },
    /// an escape byte was not followed by a byte that requires escaping
    MalformedFrame,
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            FrameError::Empty => f.write_str("no bytes received"),
            FrameError::HeaderMismatch(Some(x)) => {
                write!(f, "header mismatch, received start byte {x:#04X}")
            }
            FrameError::HeaderMismatch(None) => f.write_str("header mismatch, frame is empty"),
            FrameError::RtuMismatch { expected, received } => {
                write!(f, "RTU id mismatch, expected {expected:#04X} received {received:?}")
            }
            FrameError::CommandMismatch { expected, received } => {
                write!(f, "command mismatch, expected {expected:#04X} received {received:?}")
            }
            FrameError::LengthMismatch { expected, actual } => {
                write!(f, "length mismatch, expected {expected} bytes received {actual}")
            }
            FrameError::ChecksumMismatch { received, expected } => {
                write!(
                    f,
                    "checksum mismatch, received {received:#06X} computed {expected:#06X}"
                )
            }
            FrameError::MalformedFrame => f.write_str("malformed byte stuffing"),
        }
    }
}

impl std::error::Error for FrameError {}

/// Errors that occur while building a command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidRequest {
    /// payload is longer than the frame length field allows
    PayloadTooLarge(usize, usize),
    /// output pin is outside the controllable range
    PinOutOfRange(u8),
}

impl std::fmt::Display for InvalidRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            InvalidRequest::PayloadTooLarge(len, max) => {
                write!(f, "payload of {len} bytes exceeds the maximum of {max}")
            }
            InvalidRequest::PinOutOfRange(pin) => write!(
                f,
                "output pin {pin} is outside the range {}..={}",
                crate::constants::output::MIN_PIN,
                crate::constants::output::MAX_PIN
            ),
        }
    }
}

impl std::error::Error for InvalidRequest {}

/// Errors that can occur while executing a single attempt of a command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestError {
    /// the underlying byte stream failed
    Io(std::io::ErrorKind),
    /// a response was received but failed validation
    Frame(FrameError),
    /// no response was received within the window
    ReadTimeout,
    /// the request could not be built
    BadRequest(InvalidRequest),
    /// an internal error that indicates a bug
    Internal(InternalError),
    /// the task processing commands has been shut down
    Shutdown,
}

impl RequestError {
    /// true if the error indicates the byte stream itself is no longer usable
    pub fn is_io(&self) -> bool {
        matches!(self, RequestError::Io(_))
    }
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RequestError::Io(kind) => write!(f, "I/O error: {kind}"),
            RequestError::Frame(err) => write!(f, "bad frame: {err}"),
            RequestError::ReadTimeout => f.write_str("response timeout"),
            RequestError::BadRequest(err) => write!(f, "bad request: {err}"),
            RequestError::Internal(err) => write!(f, "internal error: {err}"),
            RequestError::Shutdown => std::fmt::Display::fmt(&Shutdown, f),
        }
    }
}

impl std::error::Error for RequestError {}

impl From<std::io::Error> for RequestError {
    fn from(err: std::io::Error) -> Self {
        RequestError::Io(err.kind())
    }
}

impl From<FrameError> for RequestError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Empty => RequestError::ReadTimeout,
            _ => RequestError::Frame(err),
        }
    }
}

impl From<InvalidRequest> for RequestError {
    fn from(err: InvalidRequest) -> Self {
        RequestError::BadRequest(err)
    }
}

impl From<InternalError> for RequestError {
    fn from(err: InternalError) -> Self {
        RequestError::Internal(err)
    }
}

impl From<scursor::WriteError> for RequestError {
    fn from(_: scursor::WriteError) -> Self {
        RequestError::Internal(InternalError::InsufficientWriteSpace)
    }
}

impl From<Shutdown> for RequestError {
    fn from(_: Shutdown) -> Self {
        RequestError::Shutdown
    }
}

/// Errors that indicate faulty logic in the library itself
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InternalError {
    /// attempted to write more bytes than the frame buffer holds
    InsufficientWriteSpace,
}

impl std::fmt::Display for InternalError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            InternalError::InsufficientWriteSpace => {
                f.write_str("attempted to write more bytes than the frame buffer holds")
            }
        }
    }
}

impl std::error::Error for InternalError {}

/// Errors produced while parsing a decoded response payload
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseError {
    /// the payload ended before all required fields were read
    InsufficientBytes {
        /// minimum number of bytes required
        required: usize,
        /// number of bytes present
        actual: usize,
    },
    /// a field extended past the end of the payload
    Truncated,
}

impl std::fmt::Display for ResponseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ResponseError::InsufficientBytes { required, actual } => write!(
                f,
                "response requires at least {required} bytes but only {actual} are present"
            ),
            ResponseError::Truncated => f.write_str("field extends past the end of the response"),
        }
    }
}

impl std::error::Error for ResponseError {}

impl From<scursor::ReadError> for ResponseError {
    fn from(_: scursor::ReadError) -> Self {
        ResponseError::Truncated
    }
}

/// Errors produced while parsing a bus message into a command
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandParseError {
    /// the topic is not one of the subscribed channels
    UnknownTopic(String),
    /// the payload is not understood on its channel
    UnknownPayload(String),
    /// a field that should be an integer was not
    BadInteger(String),
    /// the pin state was neither `true` nor `false`
    BadPinState(String),
    /// a field required by the payload was missing
    MissingField(&'static str),
    /// the command was well formed but cannot be encoded
    BadRequest(InvalidRequest),
}

impl std::fmt::Display for CommandParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            CommandParseError::UnknownTopic(x) => write!(f, "unknown topic: {x}"),
            CommandParseError::UnknownPayload(x) => write!(f, "unknown payload: {x}"),
            CommandParseError::BadInteger(x) => write!(f, "not an integer: {x}"),
            CommandParseError::BadPinState(x) => {
                write!(f, "pin state must be 'true' or 'false': {x}")
            }
            CommandParseError::MissingField(x) => write!(f, "missing field: {x}"),
            CommandParseError::BadRequest(err) => std::fmt::Display::fmt(err, f),
        }
    }
}

impl std::error::Error for CommandParseError {}

impl From<InvalidRequest> for CommandParseError {
    fn from(err: InvalidRequest) -> Self {
        CommandParseError::BadRequest(err)
    }
}

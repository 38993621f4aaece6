use crate::decode::PhysDecodeLevel;
use std::fmt::Write;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

/// Any byte stream that can stand in for the serial link
pub(crate) trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub(crate) struct PhysLayer {
    layer: PhysLayerImpl,
}

// encapsulates all possible physical layers as an enum
pub(crate) enum PhysLayerImpl {
    #[cfg(feature = "serial")]
    Serial(tokio_serial::SerialStream),
    // serial-over-TCP gateways and in-memory test links
    Stream(Box<dyn AsyncStream>),
}

impl std::fmt::Debug for PhysLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self.layer {
            #[cfg(feature = "serial")]
            PhysLayerImpl::Serial(_) => f.write_str("Serial"),
            PhysLayerImpl::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// How long to wait for a response and how much of it to accept
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct ReadWindow {
    /// total time allowed for the response
    pub(crate) window: Duration,
    /// once bytes start arriving, a gap longer than this ends the response
    pub(crate) inter_char: Duration,
    /// the response is cut off after this many bytes
    pub(crate) max_size: usize,
}

impl PhysLayer {
    #[cfg(feature = "serial")]
    pub(crate) fn new_serial(stream: tokio_serial::SerialStream) -> Self {
        Self {
            layer: PhysLayerImpl::Serial(stream),
        }
    }

    pub(crate) fn new_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            layer: PhysLayerImpl::Stream(Box::new(stream)),
        }
    }

    async fn read(&mut self, buffer: &mut [u8]) -> Result<usize, std::io::Error> {
        match &mut self.layer {
            #[cfg(feature = "serial")]
            PhysLayerImpl::Serial(x) => x.read(buffer).await,
            PhysLayerImpl::Stream(x) => x.read(buffer).await,
        }
    }

    /// Read one response, returning whatever arrived when the window or
    /// inter-character gap expires. An empty result means nothing arrived.
    pub(crate) async fn read_response(
        &mut self,
        settings: ReadWindow,
        decode_level: PhysDecodeLevel,
    ) -> Result<Vec<u8>, std::io::Error> {
        let mut buffer = vec![0u8; settings.max_size];
        let mut received = 0;
        let deadline = Instant::now() + settings.window;

        while received < settings.max_size {
            let limit = if received == 0 {
                deadline
            } else {
                std::cmp::min(deadline, Instant::now() + settings.inter_char)
            };

            let Some(remaining) = buffer.get_mut(received..) else {
                break;
            };

            match tokio::time::timeout_at(limit, self.read(remaining)).await {
                Err(_) => break,
                Ok(Ok(0)) => {
                    if received == 0 {
                        return Err(std::io::ErrorKind::UnexpectedEof.into());
                    }
                    break;
                }
                Ok(Ok(count)) => received += count,
                Ok(Err(err)) => return Err(err),
            }
        }

        buffer.truncate(received);

        if decode_level.enabled() {
            tracing::info!("PHYS RX - {}", PhysDisplay::new(decode_level, &buffer));
        }

        Ok(buffer)
    }

    pub(crate) async fn write(
        &mut self,
        data: &[u8],
        decode_level: PhysDecodeLevel,
    ) -> Result<(), std::io::Error> {
        if decode_level.enabled() {
            tracing::info!("PHYS TX - {}", PhysDisplay::new(decode_level, data));
        }

        match &mut self.layer {
            #[cfg(feature = "serial")]
            PhysLayerImpl::Serial(x) => x.write_all(data).await,
            PhysLayerImpl::Stream(x) => {
                x.write_all(data).await?;
                x.flush().await
            }
        }
    }
}

pub(crate) struct PhysDisplay<'a> {
    level: PhysDecodeLevel,
    data: &'a [u8],
}

impl<'a> PhysDisplay<'a> {
    pub(crate) fn new(level: PhysDecodeLevel, data: &'a [u8]) -> Self {
        PhysDisplay { level, data }
    }
}

impl std::fmt::Display for PhysDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} bytes", self.data.len())?;
        if self.level.data_enabled() {
            format_bytes(f, self.data)?;
        }
        Ok(())
    }
}

const BYTES_PER_DECODE_LINE: usize = 18;

pub(crate) fn format_bytes(f: &mut std::fmt::Formatter, bytes: &[u8]) -> std::fmt::Result {
    for chunk in bytes.chunks(BYTES_PER_DECODE_LINE) {
        writeln!(f)?;
        let mut first = true;
        for byte in chunk {
            if !first {
                f.write_char(' ')?;
            }
            first = false;
            write!(f, "{byte:02X?}")?;
        }
    }
    Ok(())
}

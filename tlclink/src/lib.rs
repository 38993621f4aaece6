//! An async bridge between the serial protocol of a railway track weighing
//! controller (TLC) and a publish/subscribe message bus, using
//! [Tokio](https://docs.rs/tokio) and Rust's `async/await` syntax.
//!
//! # Features
//!
//! * Panic-free frame encoding and decoding with byte stuffing and checksum validation
//! * Two-tier command scheduling: weighment traffic always preempts idle scans
//! * Bounded retry of every command with a single failure report once the budget is spent
//! * Automatic serial port management with a configurable re-open strategy
//! * Wagon-by-wagon weighment with ordered, replayable delivery of completed records
//! * Digital input and output status maps
//! * Protocol decoding at the application, frame and physical layers through `tracing`
//!
//! # Bus channels
//!
//! Every topic has the form `/Merit/<host id>/<channel>/`.
//!
//! | Direction | Channel              | Content                                        |
//! |-----------|----------------------|------------------------------------------------|
//! | ingress   | `COMMAND`            | `Initiate[,axles]` or `Terminate`              |
//! | ingress   | `Status`             | `Initiate` or `Terminate`                      |
//! | ingress   | `Weighment/sendFrom` | serial to redeliver completed records from     |
//! | ingress   | `Status/Control`     | `RESET`, `SCOREBOARD,<text>` or `<pin>,<bool>` |
//! | egress    | `Weighment`          | wagon records and idle telemetry               |
//! | egress    | `InputStatus`        | digital input map                              |
//! | egress    | `OutputStatus`       | digital output map                             |
//! | egress    | `WeightStatus`       | platform weight while the status page is open  |
//! | egress    | `ErrorStatus`        | communication failure reports                  |
//!
//! # Example
//!
//! ```no_run
//! use tlclink::*;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Publication>();
//!
//! let bridge = spawn_bridge_task(
//!     "/dev/ttyUSB0",
//!     SerialSettings::default(),
//!     BridgeConfig::default(),
//!     default_retry_strategy(),
//!     Box::new(tx),
//!     None,
//! );
//!
//! bridge.handle_message("/Merit/MBMAGH01/COMMAND/", "Initiate,2")?;
//!
//! while let Some(publication) = rx.recv().await {
//!     println!("{} {}", publication.topic, publication.payload);
//! }
//! # Ok(())
//! # }
//! ```

pub use crate::bridge::*;
pub use crate::bus::*;
pub use crate::checksum::*;
pub use crate::command::*;
pub use crate::decode::*;
pub use crate::engine::Firmware;
pub use crate::error::*;
pub use crate::frame::*;
pub use crate::ingress::*;
pub use crate::listener::*;
pub use crate::maybe_async::*;
pub use crate::retry::*;
pub use crate::serial::*;
pub use crate::settings::*;
pub use crate::status::*;
pub use crate::weighment::*;

/// Protocol constants
pub mod constants;

mod bridge;
mod bus;
mod checksum;
mod command;
mod decode;
mod dispatch;
mod egress;
mod engine;
mod error;
mod frame;
mod ingress;
mod link;
mod listener;
mod maybe_async;
mod monitor;
mod phys;
mod retry;
mod scheduler;
mod serial;
mod settings;
mod status;
mod task;
mod weighment;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::link::PortSource;
use crate::phys::PhysLayer;

/// Spawns a bridge task onto the runtime that keeps the serial port open,
/// drains the command queue and publishes results to `sink`. The task
/// completes when the returned [`Bridge`] is dropped or shut down.
///
/// * `path` - Path of the serial device, e.g. `/dev/ttyUSB0` or `COM3`
/// * `serial_settings` - Baud rate and character format of the port
/// * `config` - Link timing, monitor pacing, topics and decode levels
/// * `retry` - Controls how long to wait before re-opening the port
/// * `sink` - Receives every publication, in order
/// * `listener` - Optional callback informed of port state changes
#[cfg(feature = "serial")]
pub fn spawn_bridge_task(
    path: &str,
    serial_settings: SerialSettings,
    config: BridgeConfig,
    retry: Box<dyn RetryStrategy>,
    sink: Box<dyn Sink>,
    listener: Option<Box<dyn Listener<PortState>>>,
) -> Bridge {
    let (bridge, task) = create_bridge_handle_and_task(
        path,
        serial_settings,
        config,
        retry,
        sink,
        listener,
    );
    tokio::spawn(task);
    bridge
}

/// Creates a bridge task, but does not spawn it. Most users will prefer
/// [`spawn_bridge_task`], unless they are using the library from outside the
/// Tokio runtime and need to spawn it using a Runtime handle instead of the
/// `tokio::spawn` function.
#[cfg(feature = "serial")]
pub fn create_bridge_handle_and_task(
    path: &str,
    serial_settings: SerialSettings,
    config: BridgeConfig,
    retry: Box<dyn RetryStrategy>,
    sink: Box<dyn Sink>,
    listener: Option<Box<dyn Listener<PortState>>>,
) -> (Bridge, impl std::future::Future<Output = ()>) {
    Bridge::create_handle_and_task(
        PortSource::Serial {
            path: path.to_string(),
            settings: serial_settings,
        },
        config,
        retry,
        sink,
        listener,
    )
}

/// Spawns a bridge task that talks to the controller over an already
/// connected byte stream, such as a serial-over-TCP gateway. The stream is
/// used once; if it fails the bridge keeps reporting the link as down.
pub fn spawn_stream_bridge_task<S>(
    stream: S,
    config: BridgeConfig,
    sink: Box<dyn Sink>,
    listener: Option<Box<dyn Listener<PortState>>>,
) -> Bridge
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (bridge, task) = Bridge::create_handle_and_task(
        PortSource::Stream(Some(PhysLayer::new_stream(stream))),
        config,
        default_retry_strategy(),
        sink,
        listener,
    );
    tokio::spawn(task);
    bridge
}

//! Command-line bridge for a track weighing controller
//!
//! Bus messages are read from stdin as `<topic> <payload>` lines and every
//! publication is written to stdout in the same form.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{ArgGroup, Parser, ValueEnum};
use tokio::io::AsyncBufReadExt;

use tlclink::*;

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("unable to connect to {0}: {1}")]
    Connect(SocketAddr, std::io::Error),
    #[error("unable to read stdin: {0}")]
    Input(#[from] std::io::Error),
}

#[derive(Parser)]
#[command(name = "tlclink-bridge")]
#[command(about = "Bridges a track weighing controller to line-oriented bus messages")]
#[command(version)]
#[command(group(ArgGroup::new("link").required(true).args(["port", "tcp"])))]
struct Cli {
    #[arg(short = 'p', long, help = "Serial device of the controller, e.g. /dev/ttyUSB0")]
    port: Option<String>,

    #[arg(long, help = "Address of a serial-over-TCP gateway instead of a local port")]
    tcp: Option<SocketAddr>,

    #[arg(short = 'b', long, default_value = "19200", help = "Baud rate of the serial port")]
    baud: u32,

    #[arg(long, value_enum, default_value = "none", help = "Parity of the serial port")]
    parity: ParityArg,

    #[arg(long, default_value = "MBMAGH01", help = "Weighbridge id used in every topic")]
    host_id: String,

    #[arg(short = 'i', long, default_value = "1", help = "RTU id of the controller")]
    rtu: u8,

    #[arg(long, default_value = "10", help = "Attempts per command before a failure is reported")]
    max_retry: usize,

    #[arg(long, default_value = "250", help = "Delay between idle scans in milliseconds")]
    scan_delay: u64,

    #[arg(long, value_enum, default_value = "command-id", help = "Application layer decoding")]
    app: AppArg,

    #[arg(long, value_enum, default_value = "nothing", help = "Frame decoding")]
    frame: FrameArg,

    #[arg(long, value_enum, default_value = "nothing", help = "Physical layer decoding")]
    phys: PhysArg,
}

#[derive(Copy, Clone, ValueEnum)]
enum ParityArg {
    None,
    Odd,
    Even,
}

#[derive(Copy, Clone, ValueEnum)]
enum AppArg {
    Nothing,
    CommandId,
    DataValues,
}

#[derive(Copy, Clone, ValueEnum)]
enum FrameArg {
    Nothing,
    Header,
    Payload,
}

#[derive(Copy, Clone, ValueEnum)]
enum PhysArg {
    Nothing,
    Length,
    Data,
}

impl From<ParityArg> for Parity {
    fn from(from: ParityArg) -> Self {
        match from {
            ParityArg::None => Parity::None,
            ParityArg::Odd => Parity::Odd,
            ParityArg::Even => Parity::Even,
        }
    }
}

impl From<AppArg> for AppDecodeLevel {
    fn from(from: AppArg) -> Self {
        match from {
            AppArg::Nothing => AppDecodeLevel::Nothing,
            AppArg::CommandId => AppDecodeLevel::CommandId,
            AppArg::DataValues => AppDecodeLevel::DataValues,
        }
    }
}

impl From<FrameArg> for FrameDecodeLevel {
    fn from(from: FrameArg) -> Self {
        match from {
            FrameArg::Nothing => FrameDecodeLevel::Nothing,
            FrameArg::Header => FrameDecodeLevel::Header,
            FrameArg::Payload => FrameDecodeLevel::Payload,
        }
    }
}

impl From<PhysArg> for PhysDecodeLevel {
    fn from(from: PhysArg) -> Self {
        match from {
            PhysArg::Nothing => PhysDecodeLevel::Nothing,
            PhysArg::Length => PhysDecodeLevel::Length,
            PhysArg::Data => PhysDecodeLevel::Data,
        }
    }
}

impl Cli {
    fn config(&self) -> BridgeConfig {
        BridgeConfig {
            link: LinkSettings {
                rtu_id: self.rtu,
                max_retry: self.max_retry,
                ..LinkSettings::default()
            },
            poll: PollSettings {
                scan_delay: Duration::from_millis(self.scan_delay),
            },
            topics: Topics::new(&self.host_id),
            decode: DecodeLevel::new(self.app.into(), self.frame.into(), self.phys.into()),
        }
    }

    fn serial_settings(&self) -> SerialSettings {
        SerialSettings {
            baud_rate: self.baud,
            parity: self.parity.into(),
            ..SerialSettings::default()
        }
    }
}

struct StdoutSink;

impl Sink for StdoutSink {
    fn publish(&mut self, publication: Publication) -> MaybeAsync<()> {
        println!("{} {}", publication.topic, publication.payload);
        MaybeAsync::ready(())
    }
}

struct PortListener;

impl Listener<PortState> for PortListener {
    fn update(&mut self, state: PortState) -> MaybeAsync<()> {
        tracing::info!("port state: {state:?}");
        MaybeAsync::ready(())
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging, stdout is reserved for publications
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(ref e) = run().await {
        eprintln!("error: {e}");
    }

    Ok(())
}

async fn run() -> Result<(), Error> {
    let cli = Cli::parse();

    let bridge = match (&cli.tcp, &cli.port) {
        (Some(addr), _) => {
            let stream = tokio::net::TcpStream::connect(addr)
                .await
                .map_err(|err| Error::Connect(*addr, err))?;
            spawn_stream_bridge_task(
                stream,
                cli.config(),
                Box::new(StdoutSink),
                Some(Box::new(PortListener)),
            )
        }
        (None, port) => spawn_bridge_task(
            port.as_deref().unwrap_or_default(),
            cli.serial_settings(),
            cli.config(),
            default_retry_strategy(),
            Box::new(StdoutSink),
            Some(Box::new(PortListener)),
        ),
    };

    for topic in bridge.topics().subscriptions() {
        tracing::info!("accepting {topic}");
    }

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (topic, payload) = line.split_once(' ').unwrap_or((line, ""));
        if let Err(err) = bridge.handle_message(topic, payload) {
            tracing::warn!("{topic}: {err}");
        }
    }

    tracing::info!("stdin closed, shutting down");
    bridge.shutdown();
    Ok(())
}

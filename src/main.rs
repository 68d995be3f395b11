use std::time::Duration;

use clap::{Parser, Subcommand};
use loramac_rs::loramac::{Ipv6Packet, LoraMacConfig, MacEngine, PhyDriver, RadioConfig, RoutingStack};
use loramac_rs::util::hex::parse_hex_lenient;
use loramac_rs::{init_logger, Frame, FrameHeader};
use tokio_serial::SerialPortBuilderExt;

#[derive(Parser)]
#[command(name = "loramac-cli")]
#[command(about = "CLI tool for the LoRaMAC bridge")]
struct Cli {
    /// Serial device the radio module is attached to.
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    port: String,

    #[arg(short, long, default_value = "57600")]
    baudrate: u32,

    /// Node id; the root address starts as `{node_id, node_id}`.
    #[arg(short, long, default_value = "2")]
    node_id: u16,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join the LoRa root and stay up, logging traffic.
    Run,
    /// Join the LoRa root, then idle (alias for `run`, kept as a distinct
    /// subcommand since joining without further activity is a common
    /// bring-up step).
    Join,
    /// Join, then transmit one payload as a confirmed DATA frame.
    Send {
        /// Payload bytes as a hex string, e.g. "deadbeef".
        hex_payload: String,
    },
}

/// A routing-stack stand-in that logs bridge events instead of delivering
/// packets into a real IPv6 stack, since the stack itself is out of scope.
struct LoggingRouting;

impl RoutingStack for LoggingRouting {
    fn on_joined(&mut self, prefix: u8) {
        log::info!("joined LoRa network, prefix={prefix}");
    }

    fn deliver(&mut self, packet: Ipv6Packet) {
        log::info!("delivered packet: {} payload bytes", packet.payload.len());
    }
}

#[tokio::main]
async fn main() -> Result<(), loramac_rs::LoraMacError> {
    init_logger();
    let cli = Cli::parse();

    let serial = tokio_serial::new(&cli.port, cli.baudrate)
        .data_bits(tokio_serial::DataBits::Eight)
        .stop_bits(tokio_serial::StopBits::One)
        .parity(tokio_serial::Parity::None)
        .timeout(Duration::from_secs(5))
        .open_native_async()
        .map_err(|e| loramac_rs::LoraMacError::SerialPortError(e.to_string()))?;

    let phy = PhyDriver::new(serial);
    let (engine, handle) = MacEngine::init_root(
        cli.node_id,
        phy,
        LoggingRouting,
        LoraMacConfig::default(),
        RadioConfig::default(),
    );

    match cli.command {
        Commands::Run | Commands::Join => {
            engine.run().await;
        }
        Commands::Send { hex_payload } => {
            let payload = parse_hex_lenient(&hex_payload)
                .map_err(|e| loramac_rs::LoraMacError::MalformedLine(e.to_string()))?;

            tokio::spawn(engine.run());
            // Give the engine a moment to join before the send is accepted.
            tokio::time::sleep(Duration::from_secs(2)).await;

            // `src` is stamped by the engine itself once the frame reaches
            // `send()`, so any placeholder address here is fine — it never
            // reaches the wire.
            let frame = Frame::new(
                FrameHeader {
                    confirmed: true,
                    seqno: 0,
                    has_next: false,
                    command: loramac_rs::Command::Data,
                    src: loramac_rs::Addr::ROOT,
                    dst: loramac_rs::Addr::ROOT,
                },
                payload,
            )?;
            handle.submit(frame).await?;
            log::info!("payload submitted");
        }
    }

    Ok(())
}

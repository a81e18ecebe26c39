//! synchron - Blade node runner
//!
//! Runs the blade node control core on a workstation: the protocol engine
//! talks to a host over a serial port or TCP, flash staging goes to an
//! in-memory chip emulator, and the slice scheduler follows a simulated
//! rotor. Useful for exercising host tooling without hardware.

mod cli;
mod config;
mod sim;

use clap::Parser;
use cli::{Cli, Commands, LinkArgs};
use config::NodeConfig;
use sim::{LogRenderer, SimulatedRotor};
use std::time::{Duration, Instant};
use synchron_core::flash::FlashPipeline;
use synchron_core::node::BladeNode;
use synchron_core::slice::SliceScheduler;
use synchron_core::transport::Transport;
use synchron_core::wire::ProtocolEngine;
use synchron_dummy::{DummyConfig, DummyFlash};
use synchron_serial::{SerialTransport, TcpTransport};

/// How often link and scheduler counters are logged
const STATS_INTERVAL: Duration = Duration::from_secs(10);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logger; -v/-vv override RUST_LOG
    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = cli.log_level() {
        logger.filter_level(level);
    }
    logger.init();

    match cli.command {
        Commands::Run {
            link,
            baud,
            rpm,
            config,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(baud) = baud {
                config.link.baud = baud;
            }
            if let Some(rpm) = rpm {
                config.rotor.rpm = rpm;
            }
            run(&config, &link)
        }
        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<NodeConfig, config::ConfigError> {
    match path {
        Some(path) => NodeConfig::load(path),
        None => Ok(NodeConfig::default()),
    }
}

fn run(config: &NodeConfig, link: &LinkArgs) -> Result<(), Box<dyn std::error::Error>> {
    let poll_timeout = config.poll_timeout();
    if let Some(device) = &link.serial {
        let mut transport = SerialTransport::open(device, Some(config.link.baud), poll_timeout)?;
        // Bytes queued before the node came up belong to no session
        transport.clear()?;
        serve(config, transport)
    } else if let Some(addr) = &link.listen {
        let transport = TcpTransport::listen(addr.as_str(), poll_timeout)?;
        serve(config, transport)
    } else if let Some(addr) = &link.connect {
        let transport = TcpTransport::connect(addr.as_str(), poll_timeout)?;
        serve(config, transport)
    } else {
        Err("no host link given".into())
    }
}

fn serve<T: Transport>(config: &NodeConfig, transport: T) -> Result<(), Box<dyn std::error::Error>> {
    let geometry = config.geometry()?;
    let expected_id = config.expected_id()?;

    let chip = DummyFlash::new(DummyConfig {
        jedec_id: expected_id,
        geometry,
        ..Default::default()
    });
    let flash = FlashPipeline::new(chip, geometry, config.timings())?
        .with_write_verification(config.flash.verify_writes);
    let engine: ProtocolEngine<DummyFlash, LogRenderer> =
        ProtocolEngine::new(flash, LogRenderer::default(), config.identity()?);
    let scheduler = SliceScheduler::new(config.scheduler()?)?;
    let rotor = SimulatedRotor::new(config.rotor.rpm);

    log::info!(
        "Node {} {}: {} slices per revolution, rotor at {} rpm",
        engine.identity().target(),
        engine.identity().firmware(),
        scheduler.slices_per_rev(),
        config.rotor.rpm
    );

    let mut node = BladeNode::new(engine, scheduler, transport, rotor).with_expected_id(expected_id);
    node.startup();

    let mut last_report = Instant::now();
    loop {
        node.run_once();

        if last_report.elapsed() >= STATS_INTERVAL {
            last_report = Instant::now();
            let link = node.engine().stats();
            let slices = node.scheduler().stats();
            log::debug!(
                "frames {} ok / {} bad, {} resync bytes, {} responses, {} link errors",
                link.frames_ok,
                link.crc_errors,
                link.resync_bytes,
                link.responses,
                node.link_errors()
            );
            log::debug!(
                "slices {} emitted / {} skipped / {} rejected, {} revolutions, {} live frames",
                slices.emitted,
                slices.skipped,
                slices.rejected,
                node.engine().renderer().revolutions(),
                node.engine().renderer().frames()
            );
        }
    }
}

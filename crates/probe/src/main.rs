//! hostlink-probe
//!
//! Command-line front end for the session layer. Lists attached USB devices,
//! or opens one, dumps its device and configuration descriptors, and optionally
//! exercises an interface claim/release cycle.

mod config;
mod output;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use common::setup_logging;
use config::{DeviceFilter, ProbeConfig, parse_bus_address, parse_hex_id};
use output::ProbeReport;
use protocol::DeviceIdentity;
use session::HostSession;
use std::io::{self, Write};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "hostlink-probe")]
#[command(
    author,
    version,
    about = "hostlink probe - Inspect USB devices through the host session layer"
)]
#[command(long_about = "
Enumerates USB devices and dumps their descriptors using synchronous
control transfers. Optionally claims an interface, detaching the kernel
driver first, and hands it back on exit.

EXAMPLES:
    # List every attached device
    hostlink-probe

    # List devices from one vendor
    hostlink-probe --vendor 0x0403

    # Dump descriptors of bus 1, device 7
    hostlink-probe --device 1:7

    # Claim interface 0, detaching the kernel driver, and print JSON
    hostlink-probe --device 1:7 --interface 0 --detach --json

CONFIGURATION:
    The probe looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/hostlink/probe.toml
    3. /etc/hostlink/probe.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Only match this vendor id (hex)
    #[arg(long, value_name = "VID", value_parser = parse_hex_id)]
    vendor: Option<u16>,

    /// Only match this product id (hex)
    #[arg(long, value_name = "PID", value_parser = parse_hex_id)]
    product: Option<u16>,

    /// Open the device at BUS:ADDR and dump its descriptors
    #[arg(short, long, value_name = "BUS:ADDR", value_parser = parse_bus_address)]
    device: Option<(u8, u8)>,

    /// Claim and release this interface while probing
    #[arg(short, long, value_name = "N")]
    interface: Option<u8>,

    /// Detach the kernel driver before claiming
    #[arg(long)]
    detach: bool,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

impl Args {
    /// Command-line values take precedence over the configuration file
    fn apply(&self, config: &mut ProbeConfig) -> Result<()> {
        if let Some(ref level) = self.log_level {
            config.probe.log_level = level.clone();
        }
        if self.json {
            config.probe.json = true;
        }
        if self.vendor.is_some() || self.product.is_some() {
            config.usb.filters = vec![format!(
                "{}:{}",
                filter_part(self.vendor),
                filter_part(self.product)
            )];
        }
        if self.interface.is_some() {
            config.usb.interface = self.interface;
        }
        if self.detach {
            config.usb.detach_kernel_driver = true;
        }

        config.validate().context("Invalid command-line options")
    }
}

fn filter_part(id: Option<u16>) -> String {
    match id {
        Some(id) => format!("0x{:04x}", id),
        None => "*".to_string(),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = ProbeConfig::default();
        let path = ProbeConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let mut config = if let Some(ref path) = args.config {
        ProbeConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        ProbeConfig::load_or_default()
    };
    args.apply(&mut config)?;

    setup_logging(&config.probe.log_level).context("Failed to setup logging")?;
    info!("hostlink-probe v{}", env!("CARGO_PKG_VERSION"));

    let filters = config.usb.device_filters()?;
    let session = HostSession::create().context("Failed to initialize USB host session")?;

    let result = match args.device {
        Some((bus, address)) => probe_device(&session, &config, &filters, bus, address),
        None => list_devices(&session, &config, &filters),
    };

    session.destroy();
    result
}

/// Scan once per filter and merge the results
fn scan_filtered(session: &HostSession, filters: &[DeviceFilter]) -> Result<Vec<DeviceIdentity>> {
    if filters.is_empty() {
        return session.scan(0, 0).context("Failed to enumerate USB devices");
    }

    let mut devices: Vec<DeviceIdentity> = Vec::new();
    for filter in filters {
        let found = session
            .scan(filter.vendor_id, filter.product_id)
            .context("Failed to enumerate USB devices")?;
        for identity in found {
            if !devices.iter().any(|d| d.same_device(&identity)) {
                devices.push(identity);
            }
        }
    }
    Ok(devices)
}

fn list_devices(
    session: &HostSession,
    config: &ProbeConfig,
    filters: &[DeviceFilter],
) -> Result<()> {
    let devices = scan_filtered(session, filters)?;
    output::write_devices(&mut io::stdout().lock(), &devices, config.probe.json)
}

fn probe_device(
    session: &HostSession,
    config: &ProbeConfig,
    filters: &[DeviceFilter],
    bus: u8,
    address: u8,
) -> Result<()> {
    let identity = scan_filtered(session, filters)?
        .into_iter()
        .find(|d| d.bus_number == bus && d.device_address == address)
        .ok_or_else(|| anyhow!("No matching device at {:03}:{:03}", bus, address))?;

    let usb = &config.usb;
    let mut link = session
        .open(&identity)
        .with_context(|| format!("Failed to open device {}", identity))?;

    let descriptor = link
        .read_device_descriptor(usb.timeout_ms)
        .context("Failed to read device descriptor")?;
    let block = link
        .read_config_descriptor(usb.config_index, usb.timeout_ms)
        .with_context(|| {
            format!(
                "Failed to read configuration descriptor {}",
                usb.config_index
            )
        })?;

    let mut report = ProbeReport::new(
        link.identity().clone(),
        descriptor,
        usb.config_index,
        &block,
    );

    if let Some(iface) = usb.interface {
        link
            .claim(iface, usb.detach_kernel_driver)
            .with_context(|| format!("Failed to claim interface {}", iface))?;
        let released = link
            .release(iface)
            .with_context(|| format!("Failed to release interface {}", iface))?;
        report
            .warnings
            .extend(released.warnings().iter().map(ToString::to_string));
        report.claimed_interface = Some(iface);
    }

    let closed = link.close();
    for warning in closed.warnings() {
        warn!("Cleanup of {}: {}", identity, warning);
    }
    report
        .warnings
        .extend(closed.warnings().iter().map(ToString::to_string));

    // Drain any completions left behind by the closed handle
    session.poll(0).context("Failed to handle USB events")?;

    let mut stdout = io::stdout().lock();
    output::write_report(&mut stdout, &report, config.probe.json)?;
    stdout.flush()?;
    Ok(())
}

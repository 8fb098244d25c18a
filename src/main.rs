use clap::Parser;
use serial_tcp_bridge::config::{Config, ConfigLoader, LogFormat};
use serial_tcp_bridge::logging::init_logging;
use serial_tcp_bridge::port::{list_ports, SerialPortAdapter, SyncSerialPort};
use serial_tcp_bridge::{serve, BridgeError};
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Share one serial device between many TCP clients.",
    long_about = "Opens a serial device and accepts TCP connections. Every command a client sends is \
                  written to the device and the device's reply is returned to that client, one \
                  round-trip at a time. Idle clients are sent `ping` and expected to answer `pong`. \
                  Without a serial device the available ports are listed instead."
)]
struct Args {
    /// Serial device to open, e.g. /dev/ttyUSB0 or COM3. Omit to list devices.
    #[arg(long)]
    serial: Option<String>,

    /// Serial baud rate.
    #[arg(long)]
    baud: Option<u32>,

    /// TCP port to listen on.
    #[arg(long)]
    port: Option<u16>,

    /// Address to bind the TCP listener to.
    #[arg(long)]
    host: Option<String>,

    /// Configuration file; skips the usual search locations.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter when RUST_LOG is unset, e.g. "debug".
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format.
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// List serial devices and exit.
    #[arg(long)]
    list: bool,
}

impl Args {
    /// Command-line flags win over file and environment values.
    fn apply(&self, config: &mut Config) {
        if let Some(serial) = &self.serial {
            // "nil" is the conventional "no device" value.
            config.serial.port = (serial != "nil").then(|| serial.clone());
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loader = match &args.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    let config_path = loader.config_path.clone();
    let mut config = loader.into_config();
    args.apply(&mut config);
    config.validate()?;

    init_logging(&config.logging)?;
    if let Some(path) = config_path {
        info!(path = %path.display(), "configuration loaded");
    }

    let device = match config.serial.resolved_port() {
        Some(device) if !args.list => device,
        _ => return print_ports(),
    };

    let port_config = config.serial.port_configuration();
    let port = match SyncSerialPort::open(&device, &port_config) {
        Ok(port) => port,
        Err(e) => {
            error!(port = %device, error = %e, "cannot open serial port");
            return Err(BridgeError::from(e).into());
        }
    };
    info!(
        port = port.name(),
        baud = port_config.baud_rate,
        read_timeout_ms = config.serial.read_timeout_ms,
        "serial port open"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    serve(&config, Box::new(port), shutdown).await?;
    info!("bridge stopped");
    Ok(())
}

fn print_ports() -> Result<(), Box<dyn std::error::Error>> {
    let ports = list_ports()?;
    if ports.is_empty() {
        error!("no serial ports found");
        return Err("no serial ports found".into());
    }
    for port in ports {
        print!("{port}");
    }
    Ok(())
}

// --- Graceful Shutdown Handler ---
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("signal received, starting graceful shutdown");
}

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use ic7610_rs::device::{self, DeviceSelector, UsbTransport};
use ic7610_rs::drain::DEFAULT_CHUNK_SIZE;
use ic7610_rs::protocol::{DATA_INTERFACE, MAX_PACKET_SIZE};
use ic7610_rs::{Session, SessionConfig, SinkTarget};

const MIB: u64 = 1024 * 1024;

/// Receive I/Q data from the IC-7610's USB 3 port.
///
/// With no arguments the IQ output state is queried and printed. With FILE the
/// stream is written to that file; with HOST PORT it is sent over TCP.
/// Stop streaming with Ctrl+C.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// FILE, or HOST PORT.
    #[arg(num_args = 0.., value_names = ["FILE|HOST", "PORT"])]
    target: Vec<String>,
    /// USB vendor id of the radio's FT60x bridge (hex).
    #[arg(long, default_value = "0403", value_parser = parse_hex_u16)]
    vid: u16,
    /// USB product id of the radio's FT60x bridge (hex).
    #[arg(long, default_value = "601f", value_parser = parse_hex_u16)]
    pid: u16,
    /// Which of the matching devices to open.
    #[arg(long, default_value_t = 0)]
    index: usize,
    /// USB interface holding the FIFO pipes.
    #[arg(long, default_value_t = DATA_INTERFACE)]
    interface: u8,
    /// Reply timeout on the command pipe, in milliseconds.
    #[arg(long, default_value_t = 100)]
    reply_timeout_ms: u64,
    /// Bytes requested per read from the I/Q pipe.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, value_parser = parse_chunk_size)]
    chunk_size: usize,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(short, long)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

impl Cli {
    /// Maps the positional arguments to a sink. Errors are clap usage errors.
    fn sink_target(&self) -> Result<Option<SinkTarget>, clap::Error> {
        match self.target.as_slice() {
            [] => Ok(None),
            [path] => Ok(Some(SinkTarget::File(PathBuf::from(path)))),
            [host, port] => match port.parse::<u16>() {
                Ok(port) => Ok(Some(SinkTarget::Tcp {
                    host: host.clone(),
                    port,
                })),
                Err(e) => Err(Cli::command().error(ErrorKind::InvalidValue, format!("invalid port '{}': {}", port, e))),
            },
            _ => Err(Cli::command().error(ErrorKind::TooManyValues, "expected at most FILE or HOST PORT")),
        }
    }

    fn selector(&self) -> DeviceSelector {
        DeviceSelector {
            vid: self.vid,
            pid: self.pid,
            index: self.index,
            interface: self.interface,
        }
    }

    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            reply_timeout: Duration::from_millis(self.reply_timeout_ms),
            chunk_size: self.chunk_size,
        }
    }
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid hex id '{}': {}", s, e))
}

fn parse_chunk_size(s: &str) -> Result<usize, String> {
    let size = s.parse::<usize>().map_err(|e| e.to_string())?;
    if size == 0 || size % MAX_PACKET_SIZE != 0 {
        return Err(format!("chunk size must be a non-zero multiple of {} bytes", MAX_PACKET_SIZE));
    }
    Ok(size)
}

/// Console logging on stderr, plus a plain-text copy in `log_file` when given.
/// The returned guard flushes the file writer when dropped.
fn init_tracing(level: LevelFilter, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let file_writer = log_file
        .map(|path| {
            File::create(path)
                .map(tracing_appender::non_blocking)
                .with_context(|| format!("Failed to create log file at: {:?}", path))
        })
        .transpose()?;
    let (writer, guard) = file_writer.unzip();

    // RUST_LOG overrides -v/-q; -v adds raw frame bytes.
    tracing_subscriber::registry()
        .with(EnvFilter::builder().with_default_directive(level.into()).from_env_lossy())
        .with(fmt::layer().with_writer(io::stderr).with_target(false).without_time())
        .with(writer.map(|w| fmt::layer().with_writer(w).with_ansi(false).with_target(false)))
        .init();

    if let Some(path) = log_file {
        info!("Logging to file: {:?}", path);
    }
    Ok(guard)
}

fn spawn_signal_watcher(cancel: CancellationToken) {
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl+C received, stopping after the current read.");
                cancel.cancel();
            }
            Err(e) => warn!("Unable to listen for Ctrl+C: {}", e),
        }
    });
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let target = cli.sink_target().unwrap_or_else(|e| e.exit());
    let guard = init_tracing(cli.verbose.tracing_level_filter(), cli.log_file.as_deref())?;

    if let Err(e) = run(&cli, target).await {
        error!("Application failed: {:?}", e);
        drop(guard);
        process::exit(1);
    }
    Ok(())
}

async fn run(cli: &Cli, target: Option<SinkTarget>) -> Result<()> {
    if let Err(e) = device::log_devices() {
        warn!("Could not list USB devices: {}", e);
    }

    let transport = UsbTransport::open_by_index(cli.selector()).context("Failed to open FTDI device")?;

    let cancel = CancellationToken::new();
    spawn_signal_watcher(cancel.clone());

    let mut last_mib = None;
    let mut session = Session::new(transport, cli.session_config()).on_progress(move |total| {
        let mib = total / MIB;
        if last_mib != Some(mib) {
            last_mib = Some(mib);
            print!("\rRX {} MiB ", mib);
            let _ = io::stdout().flush();
        }
    });

    let streaming = target.is_some();
    let outcome = session.run(target, &cancel).await;
    if streaming {
        println!();
    }
    let report = outcome?;

    match report.iq_output {
        Some(reply) => println!("{}", reply),
        None => println!("IQ data output: unknown (no reply from radio)"),
    }
    Ok(())
}

//! tunecast-server: Watch live ATSC TV in a browser.
//!
//! Tunes a single DVB device to a channel from `channels.conf`, transcodes
//! the program with a media pipeline, and streams it to browsers over WebRTC.

use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};
use tunecast_protocol::{parse_channels_conf, Channel};

mod logging;
mod pipeline;
mod tuner;
mod watch;
mod web;

use pipeline::VideoPipeline;
use tuner::Tuner;

const DEFAULT_LISTEN: &str = "0.0.0.0:9200";
const DEFAULT_CHANNELS: &str = "/etc/tunecast/channels.conf";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_RETENTION_DAYS: u64 = 7;
const DEFAULT_CONFIG_FILE: &str = "tunecast.toml";

/// tunecast-server - Watch live ATSC TV in a browser
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address for the HTTP server to listen on [default: 0.0.0.0:9200]
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Path to the channels.conf file listing available channels
    /// [default: /etc/tunecast/channels.conf]
    #[arg(short, long)]
    channels: Option<PathBuf>,

    /// Video pipeline implementation; use "vaapi" for VA-API hardware
    /// acceleration [default: default]
    #[arg(long)]
    video_pipeline: Option<String>,

    /// Configuration file path [default: ./tunecast.toml if present]
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory where log files are stored [default: logs]
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Number of days to keep log files [default: 7]
    #[arg(long)]
    log_retention_days: Option<u64>,
}

/// Configuration file format.
#[derive(Debug, serde::Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    server: ServerSection,
    #[serde(default)]
    tuner: TunerSection,
    #[serde(default)]
    logging: LoggingSection,
}

#[derive(Debug, serde::Deserialize, Default)]
struct ServerSection {
    listen: Option<SocketAddr>,
}

#[derive(Debug, serde::Deserialize, Default)]
struct TunerSection {
    channels: Option<PathBuf>,
    video_pipeline: Option<String>,
}

#[derive(Debug, serde::Deserialize, Default)]
struct LoggingSection {
    log_dir: Option<PathBuf>,
    retention_days: Option<u64>,
    level: Option<String>,
}

/// Effective settings after merging the command line over the config file.
#[derive(Debug, PartialEq)]
struct Settings {
    listen: SocketAddr,
    channels: PathBuf,
    video_pipeline: VideoPipeline,
    log_dir: PathBuf,
    log_retention_days: u64,
    log_level: Option<String>,
}

impl Settings {
    fn merge(args: &Args, file: ConfigFile) -> Result<Self, Box<dyn std::error::Error>> {
        let listen = match args.listen.or(file.server.listen) {
            Some(addr) => addr,
            None => DEFAULT_LISTEN.parse()?,
        };
        let video_pipeline = args
            .video_pipeline
            .as_deref()
            .or(file.tuner.video_pipeline.as_deref())
            .map(VideoPipeline::from_name)
            .unwrap_or_default();

        Ok(Self {
            listen,
            channels: args
                .channels
                .clone()
                .or(file.tuner.channels)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CHANNELS)),
            video_pipeline,
            log_dir: args
                .log_dir
                .clone()
                .or(file.logging.log_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
            log_retention_days: args
                .log_retention_days
                .or(file.logging.retention_days)
                .unwrap_or(DEFAULT_RETENTION_DAYS),
            log_level: file.logging.level,
        })
    }
}

fn load_config(path: &Path) -> Result<ConfigFile, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: ConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

fn read_channels_conf(path: &Path) -> Result<Vec<Channel>, Box<dyn std::error::Error>> {
    let file = File::open(path)?;
    Ok(parse_channels_conf(BufReader::new(file))?)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let term = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let term = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = term => {},
    }

    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Config file: explicit path > auto-detect > defaults
    let config_path = args.config.clone().or_else(|| {
        let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
        default_path.exists().then_some(default_path)
    });
    let file_config = match &config_path {
        Some(path) => match load_config(path) {
            Ok(c) => {
                eprintln!("Loaded config from: {}", path.display());
                c
            }
            Err(e) => {
                eprintln!("Failed to load config file {}: {}", path.display(), e);
                return Err(e);
            }
        },
        None => ConfigFile::default(),
    };
    let settings = Settings::merge(&args, file_config)?;

    let _log_guard = logging::init_logging(
        &settings.log_dir,
        settings.log_retention_days,
        args.verbose,
        settings.log_level.as_deref(),
    )?;

    info!("tunecast-server starting...");
    info!("  Listen address: {}", settings.listen);
    info!("  Channels: {}", settings.channels.display());
    info!("  Video pipeline: {}", settings.video_pipeline);

    let channels = match read_channels_conf(&settings.channels) {
        Ok(channels) => channels,
        Err(e) => {
            error!("Unable to read {}: {}", settings.channels.display(), e);
            return Err(e);
        }
    };
    if channels.is_empty() {
        warn!("No channels found in {}", settings.channels.display());
    } else {
        info!("Loaded {} channels", channels.len());
    }

    let backend = pipeline::default_backend()?;
    let tuner = Arc::new(Tuner::new(channels, backend, settings.video_pipeline));

    let served = web::start_web_server(settings.listen, Arc::clone(&tuner), shutdown_signal()).await;
    if let Err(e) = &served {
        error!("Web server error: {}", e);
    }

    release_tuner(tuner).await;

    served
}

/// Stop the tuner so the device is released before exiting.
async fn release_tuner(tuner: Arc<Tuner>) {
    if let Some(channel) = tuner.status().channel() {
        info!("Stopping playback of {}", channel.name);
    }

    let stopped = tokio::task::spawn_blocking(move || tuner.stop()).await;
    match stopped {
        Ok(Ok(())) => info!("Tuner stopped"),
        Ok(Err(e)) => warn!("Failed to stop tuner: {}", e),
        Err(e) => warn!("Tuner stop task failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let args = Args::parse_from(["tunecast-server"]);
        let settings = Settings::merge(&args, ConfigFile::default()).unwrap();

        assert_eq!(settings.listen, "0.0.0.0:9200".parse::<std::net::SocketAddr>().unwrap());
        assert_eq!(settings.channels, PathBuf::from("/etc/tunecast/channels.conf"));
        assert_eq!(settings.video_pipeline, VideoPipeline::Default);
        assert_eq!(settings.log_dir, PathBuf::from("logs"));
        assert_eq!(settings.log_retention_days, 7);
        assert_eq!(settings.log_level, None);
    }

    #[test]
    fn test_settings_command_line_wins() {
        let file: ConfigFile = toml::from_str(
            r#"
            [server]
            listen = "127.0.0.1:8000"

            [tuner]
            channels = "/srv/channels.conf"
            video_pipeline = "vaapi"

            [logging]
            retention_days = 30
            level = "warn"
            "#,
        )
        .unwrap();
        let args = Args::parse_from([
            "tunecast-server",
            "--listen",
            "127.0.0.1:9300",
            "--video-pipeline",
            "default",
        ]);

        let settings = Settings::merge(&args, file).unwrap();
        assert_eq!(settings.listen, "127.0.0.1:9300".parse::<std::net::SocketAddr>().unwrap());
        assert_eq!(settings.channels, PathBuf::from("/srv/channels.conf"));
        assert_eq!(settings.video_pipeline, VideoPipeline::Default);
        assert_eq!(settings.log_retention_days, 30);
        assert_eq!(settings.log_level.as_deref(), Some("warn"));
    }

    #[tokio::test]
    async fn test_release_tuner_stops_pipeline() {
        use crate::pipeline::fake::FakeBackend;
        use crate::tuner::Status;
        use tunecast_protocol::Modulation;

        let backend = FakeBackend::new();
        let channel = Channel {
            name: "KCTS-HD".to_string(),
            frequency: 189_000_000,
            modulation: Modulation::Vsb8,
            video_pid: 49,
            audio_pid: 52,
            program_id: 3,
        };
        let tuner = Arc::new(Tuner::new(
            vec![channel.clone()],
            Box::new(backend.clone()),
            VideoPipeline::Default,
        ));

        tuner.tune("KCTS-HD").unwrap();
        assert_eq!(tuner.status(), Status::Playing(channel));
        assert_eq!(backend.live(), 1);

        release_tuner(Arc::clone(&tuner)).await;
        assert_eq!(tuner.status(), Status::stopped());
        assert_eq!(backend.live(), 0);
    }

    #[test]
    fn test_config_rejects_unknown_sections() {
        assert!(toml::from_str::<ConfigFile>("[database]\npath = \"x\"").is_err());
    }
}

use anyhow::bail;
use clap::Parser;
use std::path::PathBuf;

/// Runtime configuration for the `croplink-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first), with defaults suitable for local use.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "croplink-server",
    version,
    about = "Renders commodity history reports to xlsx and serves them for download"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:8080"))]
    pub server_addr: String,

    /// Directory generated reports are written to and served from.
    ///
    /// Created on startup if missing. Nothing in the service deletes files
    /// from it; stale reports are left to external housekeeping.
    ///
    /// Environment variable: `REPORT_DIR`
    #[arg(long, env = "REPORT_DIR", default_value = "reports")]
    pub report_dir: PathBuf,

    /// Externally visible base URL used to build `download_url`.
    ///
    /// Environment variable: `PUBLIC_BASE_URL`
    #[arg(long, env = "PUBLIC_BASE_URL", default_value_t = String::from("http://localhost:8080"))]
    pub public_base_url: String,

    /// Number of render workers.
    ///
    /// `0` spawns one detached task per render with no upper bound on
    /// concurrent renders. Any other value bounds concurrency and rejects
    /// triggers with 503 once every worker queue is full.
    ///
    /// Environment variable: `RENDER_WORKERS`
    #[arg(long, env = "RENDER_WORKERS", default_value_t = 4)]
    pub render_workers: usize,

    /// Pending renders each worker accepts before it counts as full.
    ///
    /// Environment variable: `RENDER_QUEUE_DEPTH`
    #[arg(long, env = "RENDER_QUEUE_DEPTH", default_value_t = 16)]
    pub render_queue_depth: usize,

    /// Seconds to wait for workers to acknowledge shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 10)]
    pub shutdown_timeout: u64,

    /// JSON file with the time series served as the system of record.
    ///
    /// Environment variable: `SEED_FILE`
    #[arg(long, env = "SEED_FILE")]
    pub seed_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub report_dir: PathBuf,
    pub public_base_url: String,
    pub render_workers: usize,
    pub render_queue_depth: usize,
    pub shutdown_timeout: u64,
    pub seed_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_addr: "0.0.0.0:8080".to_string(),
            report_dir: PathBuf::from("reports"),
            public_base_url: "http://localhost:8080".to_string(),
            render_workers: 4,
            render_queue_depth: 16,
            shutdown_timeout: 10,
            seed_file: None,
        }
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.render_workers > 0 && args.render_queue_depth == 0 {
            bail!("RENDER_QUEUE_DEPTH must be greater than 0 when RENDER_WORKERS is set");
        }

        let public_base_url = args.public_base_url.trim_end_matches('/').to_string();
        if !(public_base_url.starts_with("http://") || public_base_url.starts_with("https://")) {
            bail!("PUBLIC_BASE_URL must start with http:// or https:// (got `{public_base_url}`)");
        }

        if args.report_dir.as_os_str().is_empty() {
            bail!("REPORT_DIR must not be empty");
        }

        Ok(Self {
            server_addr: args.server_addr,
            report_dir: args.report_dir,
            public_base_url,
            render_workers: args.render_workers,
            render_queue_depth: args.render_queue_depth,
            shutdown_timeout: args.shutdown_timeout,
            seed_file: args.seed_file,
        })
    }
}

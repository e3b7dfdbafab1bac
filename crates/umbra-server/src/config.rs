use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};

/// Tunables for the rate limiter and the logistic PoW-iteration curve
/// it drives (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// Sliding window over which requests-per-identity are counted.
    pub window_secs: u64,
    /// Requests admitted within `window_secs` before an identity is
    /// marked limited.
    pub max_requests: u64,
    /// Entries older than this are pruned from the tracker regardless
    /// of window occupancy.
    pub tracker_ttl_secs: u64,
    /// Argon2id iteration count floor (lightly-loaded identities).
    pub pow_iterations_min: u32,
    /// Argon2id iteration count ceiling (identities saturating the
    /// window).
    pub pow_iterations_max: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            window_secs: 600,
            max_requests: 32,
            tracker_ttl_secs: 1800,
            pow_iterations_min: 2,
            pow_iterations_max: 7,
        }
    }
}

/// Argon2id parameters for the client-facing PoW challenge and for the
/// session-token-cipher-key derivation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowConfig {
    pub memory_mb: u32,
    pub parallelism: u32,
    pub challenge_len: usize,
    pub target_fail_prob: f64,
}

impl Default for PowConfig {
    fn default() -> Self {
        Self {
            memory_mb: 12,
            parallelism: 1,
            challenge_len: 1,
            target_fail_prob: 1e-4,
        }
    }
}

/// Server-wide configuration, loadable from TOML and overridable by CLI
/// flags / environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub session_expiry_secs: u64,
    pub janitor_interval_secs: u64,
    pub rate_limiter: RateLimiterConfig,
    pub pow: PowConfig,
    pub log_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:7777".to_string(),
            session_expiry_secs: 300,
            janitor_interval_secs: 60,
            rate_limiter: RateLimiterConfig::default(),
            pow: PowConfig::default(),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl ServerConfig {
    pub fn load(path: Option<&PathBuf>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config at {}: {e}", path.display()))?;
        let cfg: Self = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parsing config at {}: {e}", path.display()))?;
        Ok(cfg)
    }
}

#[derive(Debug, Parser)]
#[command(name = "umbra-server", version, about = "Umbra session-bootstrap server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity: 0 = warn, 1 = info, 2 = debug, 3 = trace.
    #[arg(long, global = true, default_value_t = 1)]
    pub verbosity: u8,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the handshake server.
    Run(RunArgs),
    /// Print the effective configuration and exit.
    Config(RunArgs),
    /// Print version information.
    Version,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to a TOML config file. CLI flags below override its values.
    #[arg(long, env = "UMBRA_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "UMBRA_BIND_ADDR")]
    pub bind_addr: Option<String>,

    #[arg(long, env = "UMBRA_SESSION_EXPIRY_SECS")]
    pub session_expiry_secs: Option<u64>,

    #[arg(long, env = "UMBRA_JANITOR_INTERVAL_SECS")]
    pub janitor_interval_secs: Option<u64>,

    #[arg(long, env = "UMBRA_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

impl RunArgs {
    pub fn apply(&self, mut cfg: ServerConfig) -> ServerConfig {
        if let Some(v) = &self.bind_addr {
            cfg.bind_addr = v.clone();
        }
        if let Some(v) = self.session_expiry_secs {
            cfg.session_expiry_secs = v;
        }
        if let Some(v) = self.janitor_interval_secs {
            cfg.janitor_interval_secs = v;
        }
        if let Some(v) = &self.log_dir {
            cfg.log_dir = v.clone();
        }
        cfg
    }
}

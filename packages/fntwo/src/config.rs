use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// App config (figment-deserialized from defaults / config.toml / env / flags)
// =============================================================================
//
// Four equivalent ways to set a value, lowest precedence first:
//
//   defaults
//   config.toml:     [vmc]
//                    port = 39541
//   env var:         FNTWO_VMC__PORT=39541   (double underscore = nesting)
//   flag:            --vmc-port 39541
//
//   (single underscore stays within field names: FNTWO_UPDATE_FREQUENCY=30)

/// An `ip:port` pair under `[vmc]` or `[web]`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListenConfig {
    pub ip: IpAddr,
    pub port: u16,
}

impl ListenConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

/// Camera fan-out tunables (lives under `[pool]` in config.toml).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Per-subscriber camera queue; the oldest queued camera is dropped when full
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    16
}

/// Highest accepted pose push rate, in ticks per second
pub const MAX_UPDATE_FREQUENCY: u32 = 1000;

/// Fully resolved configuration. Also served as-is from `/api/config/app`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where the VMC receiver listens
    pub vmc: ListenConfig,
    /// Where the HTTP server listens
    pub web: ListenConfig,
    /// Pose pushes per second on `/live/read/model`
    pub update_frequency: u32,
    /// Receiver made active at startup
    pub receiver: String,
    pub scene_file: PathBuf,
    pub vrm_file: PathBuf,
    #[serde(default)]
    pub pool: PoolConfig,
}

impl AppConfig {
    /// Defaults with file paths under `data_dir`
    pub fn defaults(data_dir: &Path) -> Self {
        Self {
            vmc: ListenConfig {
                ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                port: 39540,
            },
            web: ListenConfig {
                ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
                port: 3579,
            },
            update_frequency: 60,
            receiver: "vmc".to_string(),
            scene_file: data_dir.join("scene.json"),
            vrm_file: data_dir.join("default.vrm"),
            pool: PoolConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_UPDATE_FREQUENCY).contains(&self.update_frequency) {
            bail!(
                "update_frequency must be between 1 and {} (got {})",
                MAX_UPDATE_FREQUENCY,
                self.update_frequency
            );
        }
        if self.receiver.trim().is_empty() {
            bail!("receiver name must not be empty");
        }
        Ok(())
    }

    /// Time between two pose pushes
    pub fn update_interval(&self) -> Duration {
        let freq = self.update_frequency.clamp(1, MAX_UPDATE_FREQUENCY);
        Duration::from_nanos(1_000_000_000 / u64::from(freq))
    }
}

/// Command-line values that override every other layer when given.
#[derive(Clone, Debug, Default, clap::Args)]
pub struct Overrides {
    /// Address the VMC receiver binds to
    #[arg(long)]
    pub vmc_ip: Option<IpAddr>,

    /// Port the VMC receiver binds to
    #[arg(long)]
    pub vmc_port: Option<u16>,

    /// Address the web server binds to
    #[arg(long)]
    pub web_ip: Option<IpAddr>,

    /// Port the web server binds to
    #[arg(long)]
    pub web_port: Option<u16>,

    /// Pose updates sent to each viewer per second
    #[arg(long)]
    pub update_frequency: Option<u32>,

    /// Receiver to activate at startup
    #[arg(long)]
    pub receiver: Option<String>,

    /// Scene file to load and save
    #[arg(long)]
    pub scene_file: Option<PathBuf>,

    /// VRM model file to serve
    #[arg(long)]
    pub vrm_file: Option<PathBuf>,
}

impl Overrides {
    fn apply(&self, figment: figment::Figment) -> figment::Figment {
        use figment::providers::Serialized;

        let mut figment = figment;
        if let Some(ip) = self.vmc_ip {
            figment = figment.merge(Serialized::default("vmc.ip", ip));
        }
        if let Some(port) = self.vmc_port {
            figment = figment.merge(Serialized::default("vmc.port", port));
        }
        if let Some(ip) = self.web_ip {
            figment = figment.merge(Serialized::default("web.ip", ip));
        }
        if let Some(port) = self.web_port {
            figment = figment.merge(Serialized::default("web.port", port));
        }
        if let Some(freq) = self.update_frequency {
            figment = figment.merge(Serialized::default("update_frequency", freq));
        }
        if let Some(receiver) = &self.receiver {
            figment = figment.merge(Serialized::default("receiver", receiver));
        }
        if let Some(path) = &self.scene_file {
            figment = figment.merge(Serialized::default("scene_file", path));
        }
        if let Some(path) = &self.vrm_file {
            figment = figment.merge(Serialized::default("vrm_file", path));
        }
        figment
    }
}

/// Build a figment that layers: defaults → config.toml → FNTWO_* env vars → flags.
///
/// Env vars use double-underscore for nesting into sections:
///   `FNTWO_WEB__PORT=8080`  →  `web.port = 8080`
///   `FNTWO_POOL__QUEUE_CAPACITY=4`  →  `pool.queue_capacity = 4`
pub fn load_config(config_file: &Path, data_dir: &Path, overrides: &Overrides) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let figment = Figment::from(Serialized::defaults(AppConfig::defaults(data_dir)))
        .merge(Toml::file(config_file))
        .merge(Env::prefixed("FNTWO_").split("__"));
    overrides.apply(figment)
}

/// Extract and validate the final config
pub fn resolve(config_file: &Path, data_dir: &Path, overrides: &Overrides) -> Result<AppConfig> {
    let config: AppConfig = load_config(config_file, data_dir, overrides)
        .extract()
        .with_context(|| format!("Invalid configuration (file: {})", config_file.display()))?;
    config.validate()?;
    Ok(config)
}

// =============================================================================
// Directory layout (not tunable via figment)
// =============================================================================

#[derive(Clone, Debug)]
pub struct AppDirs {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl AppDirs {
    /// Platform config and data directories, each joined with `fntwo`
    pub fn discover() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .context("Could not determine the config directory")?
            .join("fntwo");
        let data_dir = dirs::data_dir()
            .context("Could not determine the data directory")?
            .join("fntwo");
        Ok(Self {
            config_dir,
            data_dir,
        })
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn create_data_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))
    }
}

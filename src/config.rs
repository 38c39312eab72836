//! # Configuration Loader
//!
//! Resolves the subscriber settings from three layers, later ones winning:
//!
//! ```text
//! built-in defaults  <  config.toml  <  command-line flags
//! ```
//!
//! The TOML file is optional. It is read from `~/.config/uplinksub/config.toml`
//! unless `-config <path>` points somewhere else:
//!
//! ```toml
//! raw = false
//!
//! [mqtt]
//! broker = "ssl://eu1.cloud.thethings.network:8883"
//! username = "my-app@ttn"
//! password = "NNSXS...."
//! topic = "v3/+/devices/+/up"
//! keep_alive_secs = 30
//! ```
//!
//! Nothing here validates the broker address; that happens when connecting.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::builder::BoolishValueParser;
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::mqtt::config::{default_client_id, MqttConfig};

const CONFIG_DIR: &str = ".config/uplinksub";
const CONFIG_FILE: &str = "config.toml";

/// Flags that keep their multi-letter name when written with a single dash.
const LONG_FLAGS: &[&str] = &[
    "broker",
    "username",
    "password",
    "topic",
    "raw",
    "client-id",
    "config",
    "help",
    "version",
];

/// Flags whose value is the following argument unless given with `=`.
const VALUE_FLAGS: &[&str] = &[
    "b",
    "u",
    "p",
    "t",
    "i",
    "broker",
    "username",
    "password",
    "topic",
    "client-id",
    "config",
];

/// Subscribe to an MQTT topic and print device uplinks.
#[derive(Parser, Debug, Default, Clone, PartialEq)]
#[command(name = "uplinksub", version)]
pub struct Args {
    /// Broker URL [default: 127.0.0.1:1883]
    #[arg(short = 'b', long, value_name = "ADDR", allow_hyphen_values = true)]
    pub broker: Option<String>,

    /// Username
    #[arg(short = 'u', long, allow_hyphen_values = true)]
    pub username: Option<String>,

    /// Password
    #[arg(short = 'p', long, allow_hyphen_values = true)]
    pub password: Option<String>,

    /// Topic to subscribe to [default: #]
    #[arg(short = 't', long, allow_hyphen_values = true)]
    pub topic: Option<String>,

    /// Dump raw message
    #[arg(
        long,
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub raw: Option<bool>,

    /// MQTT client identifier [default: uplinksub-<pid>]
    #[arg(short = 'i', long, allow_hyphen_values = true)]
    pub client_id: Option<String>,

    /// Configuration file [default: ~/.config/uplinksub/config.toml]
    #[arg(long, value_name = "PATH", allow_hyphen_values = true)]
    pub config: Option<PathBuf>,
}

impl Args {
    /// Parses the process arguments. `-h` prints usage and exits with status 0.
    pub fn parse_normalized() -> Self {
        Self::parse_from(normalize_flags(std::env::args_os()))
    }
}

/// Rewrites Go-style flags (`-raw`, `-help`, `--b value`) into the spelling
/// clap expects. The first element is the program name and is kept as is.
pub fn normalize_flags<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut normalized = Vec::new();
    let mut expecting_value = false;
    let mut passthrough = false;

    for (index, arg) in args.into_iter().map(Into::into).enumerate() {
        if index == 0 || passthrough || expecting_value {
            expecting_value = false;
            normalized.push(arg);
            continue;
        }

        let Some(text) = arg.to_str() else {
            normalized.push(arg);
            continue;
        };

        if text == "--" {
            passthrough = true;
            normalized.push(arg);
            continue;
        }

        let (rewritten, name) = if let Some(rest) = text.strip_prefix("--") {
            let name = flag_name(rest);
            if name.chars().count() == 1 {
                (format!("-{}", rest), name)
            } else {
                (text.to_string(), name)
            }
        } else if let Some(rest) = text.strip_prefix('-') {
            let name = flag_name(rest);
            if LONG_FLAGS.contains(&name) {
                (format!("--{}", rest), name)
            } else {
                (text.to_string(), name)
            }
        } else {
            normalized.push(arg);
            continue;
        };

        expecting_value = VALUE_FLAGS.contains(&name) && !rewritten.contains('=');
        normalized.push(OsString::from(rewritten));
    }

    normalized
}

fn flag_name(flag: &str) -> &str {
    flag.split_once('=').map_or(flag, |(name, _)| name)
}

/// Contents of `config.toml`. Every field is optional.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub raw: Option<bool>,
    pub mqtt: FileMqttConfig,
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileMqttConfig {
    pub broker: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic: Option<String>,
    pub client_id: Option<String>,
    pub keep_alive_secs: Option<u64>,
}

impl FileConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| eyre!("Failed to parse config file: {}", e))
    }

    /// Reads an explicitly requested file; a missing file is an error.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
        info!("Loaded configuration from {}", path.display());
        Self::from_toml(&content)
    }

    /// Reads the per-user file if there is one.
    pub async fn load_default() -> Result<Self> {
        let path = default_config_path();
        if !tokio::fs::try_exists(&path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?
        {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(&path).await
    }
}

pub fn default_config_path() -> PathBuf {
    let mut path = get_home_dir();
    path.push(CONFIG_DIR);
    path.push(CONFIG_FILE);
    path
}

fn get_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using current directory");
        PathBuf::from(".")
    })
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriberConfig {
    pub mqtt: MqttConfig,
    pub raw: bool,
}

impl SubscriberConfig {
    pub async fn resolve(args: Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path).await?,
            None => FileConfig::load_default().await?,
        };
        Ok(Self::merge(file, args))
    }

    pub fn merge(file: FileConfig, args: Args) -> Self {
        let defaults = MqttConfig::default();
        let FileMqttConfig {
            broker,
            username,
            password,
            topic,
            client_id,
            keep_alive_secs,
        } = file.mqtt;

        let client_id = args
            .client_id
            .or(client_id)
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(default_client_id);

        SubscriberConfig {
            mqtt: MqttConfig {
                broker: args.broker.or(broker).unwrap_or(defaults.broker),
                username: args.username.or(username).unwrap_or(defaults.username),
                password: args.password.or(password).unwrap_or(defaults.password),
                topic: args.topic.or(topic).unwrap_or(defaults.topic),
                client_id,
                keep_alive_secs: keep_alive_secs.unwrap_or(defaults.keep_alive_secs),
            },
            raw: args.raw.or(file.raw).unwrap_or(false),
        }
    }
}

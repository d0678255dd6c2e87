use clap::Parser;
use srvdeck_core::console::TimestampSource;
use srvdeck_core::protocol::{FrameEncoding, DEFAULT_MAX_FRAME_BYTES};
use std::env;
use thiserror::Error;
use url::Url;

pub const DEFAULT_URL: &str = "ws://127.0.0.1:18249";
const DEFAULT_LOG_DIR: &str = ".srvdeck/logs";

#[derive(Parser, Debug, Default)]
#[command(name = "srvdeck", about = "Terminal console for a remote server manager")]
pub struct Args {
    /// Websocket endpoint of the server manager.
    #[arg(long, default_value = "")]
    pub url: String,
    /// Outbound frame encoding: text or base64.
    #[arg(long, default_value = "")]
    pub encoding: String,
    /// Timestamp source for console lines: render or origin.
    #[arg(long, default_value = "")]
    pub timestamps: String,
    #[arg(long)]
    pub max_frame_bytes: Option<usize>,
    #[arg(long, default_value = "")]
    pub log_dir: String,
    #[arg(long)]
    pub debug: bool,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub url: Url,
    pub encoding: FrameEncoding,
    pub timestamps: TimestampSource,
    pub max_frame_bytes: usize,
    pub log_dir: String,
    pub log_level: String,
    pub log_stdout: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid url {value}: {source}")]
    InvalidUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported url scheme {0} (expected ws or wss)")]
    UnsupportedScheme(String),
    #[error("{0}")]
    InvalidEncoding(String),
    #[error("{0}")]
    InvalidTimestamps(String),
    #[error("invalid max frame bytes: {0}")]
    InvalidFrameLimit(String),
}

pub fn load_config(args: Args) -> Result<Config, ConfigError> {
    load_config_from(args, |key| env::var(key).ok())
}

/// Flags win over environment variables, which win over defaults.
pub fn load_config_from<F>(args: Args, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let url = resolve_url(&args.url, &lookup)?;
    let encoding: FrameEncoding = pick(&args.encoding, "SRVDECK_FRAME_ENCODING", &lookup)
        .map(|value| value.parse().map_err(ConfigError::InvalidEncoding))
        .transpose()?
        .unwrap_or_default();
    let timestamps: TimestampSource = pick(&args.timestamps, "SRVDECK_TIMESTAMPS", &lookup)
        .map(|value| value.parse().map_err(ConfigError::InvalidTimestamps))
        .transpose()?
        .unwrap_or_default();
    let max_frame_bytes = resolve_max_frame_bytes(args.max_frame_bytes, &lookup)?;
    let log_dir = pick(&args.log_dir, "SRVDECK_LOG_DIR", &lookup)
        .unwrap_or_else(|| DEFAULT_LOG_DIR.to_string());
    let log_level = if args.debug {
        "debug".to_string()
    } else {
        non_empty(lookup("SRVDECK_LOG_LEVEL")).unwrap_or_else(|| "info".to_string())
    };
    let log_stdout = lookup("SRVDECK_LOG_STDOUT")
        .and_then(|value| parse_bool_flag(&value))
        .unwrap_or(false);
    Ok(Config {
        url,
        encoding,
        timestamps,
        max_frame_bytes,
        log_dir,
        log_level,
        log_stdout,
    })
}

fn resolve_url<F>(flag: &str, lookup: &F) -> Result<Url, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = pick(flag, "SRVDECK_URL", lookup).unwrap_or_else(|| DEFAULT_URL.to_string());
    let url = Url::parse(&value).map_err(|source| ConfigError::InvalidUrl {
        value: value.clone(),
        source,
    })?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ConfigError::UnsupportedScheme(other.to_string())),
    }
}

fn resolve_max_frame_bytes<F>(flag: Option<usize>, lookup: &F) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let limit = match flag {
        Some(limit) => limit,
        None => match non_empty(lookup("SRVDECK_MAX_FRAME_BYTES")) {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidFrameLimit(value.clone()))?,
            None => DEFAULT_MAX_FRAME_BYTES,
        },
    };
    if limit == 0 {
        return Err(ConfigError::InvalidFrameLimit("0".to_string()));
    }
    Ok(limit)
}

fn pick<F>(flag: &str, key: &str, lookup: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if !flag.trim().is_empty() {
        return Some(flag.to_string());
    }
    non_empty(lookup(key))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_flags_or_env() {
        let config = load_config_from(Args::default(), env_of(&[])).expect("config");
        assert_eq!(config.url.as_str(), "ws://127.0.0.1:18249/");
        assert_eq!(config.encoding, FrameEncoding::Text);
        assert_eq!(config.timestamps, TimestampSource::Render);
        assert_eq!(config.max_frame_bytes, DEFAULT_MAX_FRAME_BYTES);
        assert_eq!(config.log_dir, DEFAULT_LOG_DIR);
        assert_eq!(config.log_level, "info");
        assert!(!config.log_stdout);
    }

    #[test]
    fn env_fills_in_missing_flags() {
        let env = env_of(&[
            ("SRVDECK_URL", "wss://deck.example:9000/ws"),
            ("SRVDECK_FRAME_ENCODING", "base64"),
            ("SRVDECK_TIMESTAMPS", "origin"),
            ("SRVDECK_MAX_FRAME_BYTES", "1024"),
            ("SRVDECK_LOG_LEVEL", "warn"),
            ("SRVDECK_LOG_STDOUT", "yes"),
        ]);
        let config = load_config_from(Args::default(), env).expect("config");
        assert_eq!(config.url.as_str(), "wss://deck.example:9000/ws");
        assert_eq!(config.encoding, FrameEncoding::Base64);
        assert_eq!(config.timestamps, TimestampSource::Origin);
        assert_eq!(config.max_frame_bytes, 1024);
        assert_eq!(config.log_level, "warn");
        assert!(config.log_stdout);
    }

    #[test]
    fn flags_override_env() {
        let args = Args {
            url: "ws://localhost:1/".to_string(),
            encoding: "text".to_string(),
            debug: true,
            max_frame_bytes: Some(64),
            ..Args::default()
        };
        let env = env_of(&[
            ("SRVDECK_URL", "ws://ignored:2/"),
            ("SRVDECK_FRAME_ENCODING", "base64"),
            ("SRVDECK_LOG_LEVEL", "warn"),
        ]);
        let config = load_config_from(args, env).expect("config");
        assert_eq!(config.url.as_str(), "ws://localhost:1/");
        assert_eq!(config.encoding, FrameEncoding::Text);
        assert_eq!(config.max_frame_bytes, 64);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn rejects_bad_values() {
        let http = Args {
            url: "http://localhost/".to_string(),
            ..Args::default()
        };
        assert!(matches!(
            load_config_from(http, env_of(&[])),
            Err(ConfigError::UnsupportedScheme(scheme)) if scheme == "http"
        ));
        assert!(matches!(
            load_config_from(Args::default(), env_of(&[("SRVDECK_URL", "not a url")])),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            load_config_from(Args::default(), env_of(&[("SRVDECK_FRAME_ENCODING", "xml")])),
            Err(ConfigError::InvalidEncoding(_))
        ));
        assert!(matches!(
            load_config_from(Args::default(), env_of(&[("SRVDECK_MAX_FRAME_BYTES", "lots")])),
            Err(ConfigError::InvalidFrameLimit(_))
        ));
        let zero = Args {
            max_frame_bytes: Some(0),
            ..Args::default()
        };
        assert!(matches!(
            load_config_from(zero, env_of(&[])),
            Err(ConfigError::InvalidFrameLimit(_))
        ));
    }
}

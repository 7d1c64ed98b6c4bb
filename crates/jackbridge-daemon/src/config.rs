//! Daemon configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail, ensure};
use directories::ProjectDirs;
use jackbridge_core::{DeviceMap, Preset};
use jackbridge_jack::transport::default_pipe_path;
use jackbridge_jack::{BridgeShell, MethodKind, ProcessConfig, TransportConfig};
use jackbridge_state::{RestorePolicy, StateStore};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Daemon settings
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Router connection settings
    #[serde(default)]
    pub router: RouterConfig,
    /// Router process control
    #[serde(default)]
    pub process: ProcessSection,
    /// Snapshot persistence
    #[serde(default)]
    pub state: StateConfig,
    /// Health monitoring
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Logical endpoint aliases (`input_1 = "system:capture_1"`)
    #[serde(default)]
    pub devices: BTreeMap<String, String>,
    /// Named presets
    #[serde(default)]
    pub presets: BTreeMap<String, PresetConfig>,
}

/// Daemon-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self { log_level: default_log_level() }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Router connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Host running the socket listener
    #[serde(default = "default_host")]
    pub host: String,
    /// Directory of the JACK tools (empty: `PATH`)
    #[serde(default)]
    pub tools_path: String,
    /// `auto`, `direct`, `socket`, `pipe` or `bridge`
    #[serde(default = "default_method")]
    pub method: String,
    /// Per-call timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Listener TCP port
    #[serde(default = "default_socket_port")]
    pub socket_port: u16,
    /// Pipe path (optional, uses default if not set)
    pub pipe_path: Option<PathBuf>,
    /// Shell used by the bridge method
    #[serde(default)]
    pub bridge_shell: BridgeShell,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            tools_path: String::new(),
            method: default_method(),
            timeout_ms: default_timeout_ms(),
            socket_port: default_socket_port(),
            pipe_path: None,
            bridge_shell: BridgeShell::default(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_method() -> String {
    "auto".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_socket_port() -> u16 {
    6666
}

/// Router process control settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSection {
    /// Process names that count as the router
    #[serde(default = "default_process_names")]
    pub names: Vec<String>,
    /// Program to start the router with
    pub start_program: Option<String>,
    #[serde(default)]
    pub start_args: Vec<String>,
    /// Pause between stop and start
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
    /// How long a restarted router may take to appear
    #[serde(default = "default_restart_window_ms")]
    pub restart_window_ms: u64,
}

impl Default for ProcessSection {
    fn default() -> Self {
        Self {
            names: default_process_names(),
            start_program: None,
            start_args: Vec::new(),
            grace_ms: default_grace_ms(),
            restart_window_ms: default_restart_window_ms(),
        }
    }
}

fn default_process_names() -> Vec<String> {
    vec!["jackd".to_string(), "jackdbus".to_string()]
}

fn default_grace_ms() -> u64 {
    2000
}

fn default_restart_window_ms() -> u64 {
    10_000
}

/// Snapshot persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// State file path (optional, uses default if not set)
    pub path: Option<PathBuf>,
    /// Save after every successful mutation
    #[serde(default = "default_true")]
    pub auto_save: bool,
    /// Restore the saved state on startup
    #[serde(default = "default_true")]
    pub auto_restore: bool,
    #[serde(default = "default_restore_attempts")]
    pub restore_attempts: u32,
    #[serde(default = "default_restore_interval_ms")]
    pub restore_interval_ms: u64,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: None,
            auto_save: true,
            auto_restore: true,
            restore_attempts: default_restore_attempts(),
            restore_interval_ms: default_restore_interval_ms(),
        }
    }
}

fn default_restore_attempts() -> u32 {
    60
}

fn default_restore_interval_ms() -> u64 {
    1000
}

/// Health monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Probe interval
    #[serde(default = "default_monitor_interval_ms")]
    pub interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { interval_ms: default_monitor_interval_ms() }
    }
}

fn default_monitor_interval_ms() -> u64 {
    5000
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Write logs to the console
    #[serde(default = "default_true")]
    pub console_enabled: bool,
    /// Write logs to a daily rolling file
    #[serde(default)]
    pub file_enabled: bool,
    /// Log file path (optional, uses the data directory if not set)
    pub file_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { console_enabled: true, file_enabled: false, file_path: None }
    }
}

/// A preset as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PresetConfig {
    pub description: Option<String>,
    /// `[from, to]` endpoint pairs
    #[serde(default)]
    pub connections: Vec<(String, String)>,
}

fn default_true() -> bool {
    true
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

impl Config {
    /// Apply environment overrides on top of the file values.
    ///
    /// Unparsable numbers keep the previous value.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(host) = var("JACK_SERVER_HOST") {
            self.router.host = host;
        }
        if let Some(path) = var("JACK_TOOLS_PATH") {
            self.router.tools_path = path;
        }
        if let Some(timeout) = var("JACK_TIMEOUT").and_then(|v| v.trim().parse().ok()) {
            self.router.timeout_ms = timeout;
        }
        if let Some(method) = var("JACK_BRIDGE_METHOD") {
            self.router.method = method;
        }
        if let Some(port) = var("JACK_BRIDGE_PORT").and_then(|v| v.trim().parse().ok()) {
            self.router.socket_port = port;
        }
        if let Some(path) = var("JACK_BRIDGE_STATE_FILE") {
            self.state.path = Some(PathBuf::from(path));
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.daemon.log_level = level;
        }
        if let Some(path) = var("LOG_FILE_PATH") {
            self.logging.file_path = Some(PathBuf::from(path));
        }
        if let Some(enabled) = var("LOG_FILE_ENABLED") {
            self.logging.file_enabled = parse_bool(&enabled);
        }
        if let Some(enabled) = var("LOG_CONSOLE_ENABLED") {
            self.logging.console_enabled = parse_bool(&enabled);
        }
    }

    /// Reject settings the daemon cannot run with.
    ///
    /// # Errors
    /// Describes the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.router.timeout_ms > 0, "router.timeout_ms must be positive");
        ensure!(self.router.socket_port > 0, "router.socket_port must be positive");
        ensure!(self.state.restore_attempts > 0, "state.restore_attempts must be positive");
        ensure!(self.monitor.interval_ms > 0, "monitor.interval_ms must be positive");
        self.preferred_method()?;

        let devices = self.device_map();
        for (name, preset) in &self.presets {
            devices
                .resolve_pairs(preset.connections.iter().map(|(f, t)| (f.as_str(), t.as_str())))
                .with_context(|| format!("preset {name:?} is invalid"))?;
        }
        Ok(())
    }

    /// The configured delivery method, `None` for `auto`.
    ///
    /// # Errors
    /// Fails on an unknown method name.
    pub fn preferred_method(&self) -> Result<Option<MethodKind>> {
        match self.router.method.trim() {
            "" | "auto" => Ok(None),
            other => match other.parse::<MethodKind>() {
                Ok(method) => Ok(Some(method)),
                Err(e) => bail!("router.method: {e}"),
            },
        }
    }

    /// Per-call timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.router.timeout_ms)
    }

    /// Transport settings.
    ///
    /// # Errors
    /// Fails on an unknown method name.
    pub fn transport_config(&self) -> Result<TransportConfig> {
        Ok(TransportConfig {
            host: self.router.host.clone(),
            tools_path: self.router.tools_path.clone(),
            preferred: self.preferred_method()?,
            timeout: self.timeout(),
            socket_port: self.router.socket_port,
            pipe_path: self.router.pipe_path.clone().unwrap_or_else(default_pipe_path),
            bridge_shell: self.router.bridge_shell,
        })
    }

    /// Process monitor settings.
    #[must_use]
    pub fn process_config(&self) -> ProcessConfig {
        ProcessConfig {
            names: self.process.names.clone(),
            start_program: self.process.start_program.clone(),
            start_args: self.process.start_args.clone(),
            grace: Duration::from_millis(self.process.grace_ms),
            restart_window: Duration::from_millis(self.process.restart_window_ms),
            ..ProcessConfig::default()
        }
    }

    /// Restore bounds.
    #[must_use]
    pub fn restore_policy(&self) -> RestorePolicy {
        RestorePolicy {
            attempts: self.state.restore_attempts,
            interval: Duration::from_millis(self.state.restore_interval_ms),
        }
    }

    /// Alias table.
    #[must_use]
    pub fn device_map(&self) -> DeviceMap {
        DeviceMap::new(self.devices.iter().map(|(a, p)| (a.as_str(), p.as_str())))
    }

    /// Presets with their names filled in.
    #[must_use]
    pub fn presets(&self) -> Vec<Preset> {
        self.presets
            .iter()
            .map(|(name, p)| Preset {
                name: name.clone(),
                description: p.description.clone(),
                connections: p.connections.clone(),
            })
            .collect()
    }

    /// State file location.
    ///
    /// # Errors
    /// Fails if no path is configured and no data directory exists.
    pub fn state_path(&self) -> Result<PathBuf> {
        match &self.state.path {
            Some(path) => Ok(path.clone()),
            None => StateStore::default_path().context("Could not determine state file path"),
        }
    }
}

/// Load configuration from file or defaults, then apply the environment.
pub fn load_config() -> Result<Config> {
    let config_path = config_path()?;

    let mut config = if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {config_path:?}"))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {config_path:?}"))?
    } else {
        info!(?config_path, "Config file not found, using defaults");
        Config::default()
    };

    config.apply_env(|name| std::env::var(name).ok());
    Ok(config)
}

/// Get the configuration file path.
fn config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("JACKBRIDGE_CONFIG") {
        return Ok(PathBuf::from(path));
    }
    let dirs = ProjectDirs::from("com", "jackbridge", "JackBridge")
        .context("Could not determine config directory")?;
    Ok(dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const SAMPLE: &str = r#"
[router]
host = "host.docker.internal"
tools_path = "C:/PROGRA~1/JACK2/tools"
method = "socket"
timeout_ms = 2500
bridge_shell = "wsl"

[state]
auto_restore = false

[devices]
input_1 = "system:capture_1"
input_2 = "system:capture_2"
main_out_l = "system:playback_1"
main_out_r = "system:playback_2"

[presets.stereo]
description = "Both inputs to the mains"
connections = [["input_1", "main_out_l"], ["input_2", "main_out_l"], ["input_2", "main_out_r"]]
"#;

    #[test]
    fn test_parse_sample() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.preferred_method().unwrap(), Some(MethodKind::Socket));
        assert_eq!(config.timeout(), Duration::from_millis(2500));
        assert_eq!(config.router.socket_port, 6666);
        assert_eq!(config.router.bridge_shell, BridgeShell::Wsl);
        assert!(config.state.auto_save);
        assert!(!config.state.auto_restore);

        let presets = config.presets();
        assert_eq!(presets[0].name, "stereo");
        assert_eq!(presets[0].resolve(&config.device_map()).unwrap().len(), 3);
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.preferred_method().unwrap(), None);
        assert_eq!(config.restore_policy(), RestorePolicy::default());
        assert!(config.logging.console_enabled);
        assert!(!config.logging.file_enabled);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("JACK_SERVER_HOST", "10.0.0.5"),
            ("JACK_TIMEOUT", "750"),
            ("JACK_BRIDGE_PORT", "not-a-port"),
            ("JACK_BRIDGE_METHOD", "pipe"),
            ("JACK_BRIDGE_STATE_FILE", "/tmp/jb-state.json"),
            ("LOG_FILE_ENABLED", "yes"),
            ("LOG_CONSOLE_ENABLED", "0"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|name| env.get(name).map(ToString::to_string));

        assert_eq!(config.router.host, "10.0.0.5");
        assert_eq!(config.router.timeout_ms, 750);
        assert_eq!(config.router.socket_port, 6666);
        assert_eq!(config.preferred_method().unwrap(), Some(MethodKind::Pipe));
        assert_eq!(config.state_path().unwrap(), PathBuf::from("/tmp/jb-state.json"));
        assert!(config.logging.file_enabled);
        assert!(!config.logging.console_enabled);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.router.timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.router.method = "carrier-pigeon".into();
        assert!(config.validate().is_err());

        let mut config: Config = toml::from_str(SAMPLE).unwrap();
        config.presets.insert(
            "broken".into(),
            PresetConfig { description: None, connections: vec![("input_9".into(), "main_out_l".into())] },
        );
        let err = config.validate().unwrap_err();
        assert!(format!("{err:#}").contains("input_9"));
    }
}

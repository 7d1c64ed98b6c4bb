//! Detection and control of the router process on its host.

use std::future::Future;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::command::TargetOs;
use crate::error::{ProcessError, ProcessResult};
use crate::result::ExecutionResult;
use crate::transport::run_program;

/// Runs host-level process control commands.
pub trait ProcessRunner: Send + Sync {
    /// Run a command to completion.
    fn run(&self, program: &str, args: &[String]) -> impl Future<Output = ExecutionResult> + Send;

    /// Start a long-running program without waiting for it.
    ///
    /// # Errors
    /// Returns the spawn error.
    fn spawn_detached(&self, program: &str, args: &[String]) -> std::io::Result<()>;
}

/// Runs commands on this host, each bounded by a timeout.
#[derive(Debug, Clone)]
pub struct HostRunner {
    timeout: Duration,
}

impl HostRunner {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ProcessRunner for HostRunner {
    async fn run(&self, program: &str, args: &[String]) -> ExecutionResult {
        let started = Instant::now();
        match tokio::time::timeout(self.timeout, run_program(program, args)).await {
            Ok(result) => result,
            Err(_) => ExecutionResult::timeout(started.elapsed()),
        }
    }

    fn spawn_detached(&self, program: &str, args: &[String]) -> std::io::Result<()> {
        tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|child| debug!(program, pid = ?child.id(), "Spawned detached process"))
    }
}

/// Process monitor settings.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Process names that count as the router
    pub names: Vec<String>,
    /// Program started by [`ProcessMonitor::start`]
    pub start_program: Option<String>,
    pub start_args: Vec<String>,
    /// Pause between stop and start on restart
    pub grace: Duration,
    /// How long a restarted router may take to show up
    pub restart_window: Duration,
    /// Spacing of liveness checks inside the restart window
    pub poll_interval: Duration,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            names: vec!["jackd".to_string(), "jackdbus".to_string()],
            start_program: None,
            start_args: Vec::new(),
            grace: Duration::from_secs(2),
            restart_window: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Detects, starts and stops the router process.
pub struct ProcessMonitor<P> {
    config: ProcessConfig,
    runner: P,
    target: TargetOs,
}

fn image_name(name: &str) -> String {
    if name.to_ascii_lowercase().ends_with(".exe") { name.to_string() } else { format!("{name}.exe") }
}

impl<P: ProcessRunner> ProcessMonitor<P> {
    /// Create a monitor for processes on this host's OS family.
    #[must_use]
    pub fn new(config: ProcessConfig, runner: P) -> Self {
        Self { config, runner, target: TargetOs::host() }
    }

    /// Target a different OS family (e.g. a Windows host reached from WSL).
    #[must_use]
    pub fn with_target(mut self, target: TargetOs) -> Self {
        self.target = target;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// Whether any configured process name is running.
    pub async fn is_running(&self) -> bool {
        for name in &self.config.names {
            if self.probe(name).await {
                debug!(name, "Router process found");
                return true;
            }
        }
        false
    }

    async fn probe(&self, name: &str) -> bool {
        match self.target {
            TargetOs::Unix => {
                let args = vec!["-x".to_string(), name.to_string()];
                self.runner.run("pgrep", &args).await.success
            }
            TargetOs::Windows => {
                let image = image_name(name);
                let args = vec!["/FI".to_string(), format!("IMAGENAME eq {image}"), "/NH".to_string()];
                let result = self.runner.run("tasklist", &args).await;
                result.success
                    && result.stdout.to_ascii_lowercase().contains(&image.to_ascii_lowercase())
            }
        }
    }

    /// Start the configured program.
    ///
    /// # Errors
    /// [`ProcessError::NotConfigured`] without a start program, or the spawn
    /// error.
    pub fn start(&self) -> ProcessResult<()> {
        let program = self.config.start_program.as_deref().ok_or(ProcessError::NotConfigured)?;
        self.runner
            .spawn_detached(program, &self.config.start_args)
            .map_err(|source| ProcessError::Spawn { program: program.to_string(), source })?;
        info!(program, args = ?self.config.start_args, "Router process started");
        Ok(())
    }

    /// Stop every configured process name. Returns how many names matched.
    ///
    /// # Errors
    /// [`ProcessError::CommandFailed`] if a stop command could not be run.
    pub async fn stop(&self) -> ProcessResult<usize> {
        let mut stopped = 0;
        for name in &self.config.names {
            let result = match self.target {
                TargetOs::Unix => {
                    self.runner.run("pkill", &["-x".to_string(), name.clone()]).await
                }
                TargetOs::Windows => {
                    let args = vec!["/IM".to_string(), image_name(name), "/F".to_string()];
                    self.runner.run("taskkill", &args).await
                }
            };

            if result.success {
                stopped += 1;
            } else if result.is_transport_failure() {
                return Err(ProcessError::CommandFailed(format!(
                    "stopping {name}: {}",
                    result.error_message()
                )));
            }
        }
        info!(stopped, "Router processes stopped");
        Ok(stopped)
    }

    /// Stop, wait the grace period, start, then wait for the process to
    /// appear within the restart window.
    ///
    /// # Errors
    /// Any stop/start error, or [`ProcessError::RestartTimeout`].
    pub async fn restart(&self) -> ProcessResult<()> {
        self.stop().await?;
        tokio::time::sleep(self.config.grace).await;
        self.start()?;

        let deadline = Instant::now() + self.config.restart_window;
        loop {
            if self.is_running().await {
                info!("Router process restarted");
                return Ok(());
            }
            if Instant::now() >= deadline {
                let window_ms = u64::try_from(self.config.restart_window.as_millis()).unwrap_or(u64::MAX);
                warn!(window_ms, "Router process did not come back after restart");
                return Err(ProcessError::RestartTimeout { window_ms });
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use assert_matches::assert_matches;
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct FakeRunner {
        running: AtomicBool,
        starts_on_spawn: bool,
        log: Mutex<Vec<String>>,
    }

    impl ProcessRunner for FakeRunner {
        async fn run(&self, program: &str, args: &[String]) -> ExecutionResult {
            self.log.lock().push(format!("{program} {}", args.join(" ")));
            let running = self.running.load(Ordering::SeqCst);
            let (code, stdout) = match program {
                "pgrep" => (i32::from(!(running && args[1] == "jackd")), String::new()),
                "tasklist" if running => (0, "jackd.exe  1234 Console  1  10,000 K".to_string()),
                "tasklist" => (0, "INFO: No tasks are running which match the specified criteria.".to_string()),
                "pkill" | "taskkill" => {
                    let was = self.running.swap(false, Ordering::SeqCst);
                    (i32::from(!was), String::new())
                }
                _ => (127, String::new()),
            };
            ExecutionResult::from_exit(code, stdout, String::new(), Duration::ZERO)
        }

        fn spawn_detached(&self, program: &str, args: &[String]) -> std::io::Result<()> {
            self.log.lock().push(format!("spawn {program} {}", args.join(" ")));
            if self.starts_on_spawn {
                self.running.store(true, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    fn config() -> ProcessConfig {
        ProcessConfig {
            start_program: Some("jackd".to_string()),
            start_args: vec!["-d".to_string(), "dummy".to_string()],
            grace: Duration::from_millis(5),
            restart_window: Duration::from_millis(50),
            poll_interval: Duration::from_millis(5),
            ..ProcessConfig::default()
        }
    }

    #[tokio::test]
    async fn test_is_running_unix() {
        let runner = FakeRunner { running: AtomicBool::new(true), ..FakeRunner::default() };
        let monitor = ProcessMonitor::new(config(), runner).with_target(TargetOs::Unix);
        assert!(monitor.is_running().await);

        monitor.runner.running.store(false, Ordering::SeqCst);
        assert!(!monitor.is_running().await);
        assert!(monitor.runner.log.lock().contains(&"pgrep -x jackdbus".to_string()));
    }

    #[tokio::test]
    async fn test_is_running_windows() {
        let runner = FakeRunner { running: AtomicBool::new(true), ..FakeRunner::default() };
        let monitor = ProcessMonitor::new(config(), runner).with_target(TargetOs::Windows);
        assert!(monitor.is_running().await);
        assert_eq!(monitor.runner.log.lock()[0], "tasklist /FI IMAGENAME eq jackd.exe /NH");

        monitor.runner.running.store(false, Ordering::SeqCst);
        assert!(!monitor.is_running().await);
    }

    #[tokio::test]
    async fn test_restart_succeeds() {
        let runner = FakeRunner {
            running: AtomicBool::new(true),
            starts_on_spawn: true,
            ..FakeRunner::default()
        };
        let monitor = ProcessMonitor::new(config(), runner).with_target(TargetOs::Unix);

        monitor.restart().await.unwrap();
        assert!(monitor.runner.log.lock().contains(&"spawn jackd -d dummy".to_string()));
    }

    #[tokio::test]
    async fn test_restart_times_out() {
        let runner = FakeRunner { running: AtomicBool::new(true), ..FakeRunner::default() };
        let monitor = ProcessMonitor::new(config(), runner).with_target(TargetOs::Unix);

        assert_matches!(monitor.restart().await, Err(ProcessError::RestartTimeout { window_ms: 50 }));
    }

    #[test]
    fn test_start_without_program() {
        let monitor = ProcessMonitor::new(ProcessConfig::default(), FakeRunner::default());
        assert_matches!(monitor.start(), Err(ProcessError::NotConfigured));
    }

    #[test]
    fn test_image_name() {
        assert_eq!(image_name("jackd"), "jackd.exe");
        assert_eq!(image_name("JackRouter.EXE"), "JackRouter.EXE");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_host_runner_times_out() {
        let runner = HostRunner::new(Duration::from_millis(50));
        let result = runner.run("sleep", &["5".to_string()]).await;
        assert_eq!(result.exit_code, -1);
        assert_eq!(result.stderr, "timeout");
    }
}

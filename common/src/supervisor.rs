// Dependent service supervision
//
// Starts the trending service when it is not reachable, waits for it to
// answer its health check and terminates it on shutdown. A service that was
// already running when we started is never touched.

use crate::config::DependentServiceConfig;
use crate::errors::SupervisorError;
use crate::retry::{ExponentialBackoff, RetryStrategy};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Readiness probe for the dependent service
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn is_ready(&self) -> bool;
}

/// Starts the dependent service as a child process
pub trait ServiceLauncher: Send + Sync {
    fn launch(&self) -> Result<Box<dyn ManagedProcess>, SupervisorError>;

    /// Human-readable description of what gets launched
    fn describe(&self) -> String;
}

/// A child process owned by this orchestrator
#[async_trait]
pub trait ManagedProcess: Send + Sync {
    fn id(&self) -> Option<u32>;

    /// Request graceful termination, force-killing after `grace`
    async fn terminate(&mut self, grace: Duration) -> Result<(), SupervisorError>;
}

/// Lifetime of the dependent service as seen by this process
pub enum ServiceHandle {
    /// Already running (or not launchable); not owned, never terminated
    External,
    Owned(Box<dyn ManagedProcess>),
}

impl ServiceHandle {
    pub fn is_owned(&self) -> bool {
        matches!(self, ServiceHandle::Owned(_))
    }
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceHandle::External => f.write_str("ServiceHandle::External"),
            ServiceHandle::Owned(process) => f
                .debug_tuple("ServiceHandle::Owned")
                .field(&process.id())
                .finish(),
        }
    }
}

/// Supervisor for the dependent trending service
pub struct DependentServiceSupervisor {
    backoff: Box<dyn RetryStrategy>,
    probe_timeout: Duration,
    terminate_grace: Duration,
    shutdown: Option<watch::Receiver<bool>>,
}

impl DependentServiceSupervisor {
    pub fn new(
        backoff: Box<dyn RetryStrategy>,
        probe_timeout: Duration,
        terminate_grace: Duration,
    ) -> Self {
        Self {
            backoff,
            probe_timeout,
            terminate_grace,
            shutdown: None,
        }
    }

    /// Abandon launching and readiness polling once `signal` turns true
    pub fn with_shutdown_signal(mut self, signal: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(signal);
        self
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    async fn shutdown_signalled(&self) {
        if let Some(rx) = &self.shutdown {
            let mut rx = rx.clone();
            let signalled = rx.wait_for(|stop| *stop).await.is_ok();
            if signalled {
                return;
            }
        }
        // No signal source, or its sender is gone without signalling
        std::future::pending::<()>().await
    }

    pub fn from_config(config: &DependentServiceConfig) -> Self {
        let backoff = ExponentialBackoff::with_config(
            Duration::from_millis(config.probe_base_delay_ms),
            Duration::from_secs(2),
            0.1,
            config.probe_max_attempts,
        );
        Self::new(
            Box::new(backoff),
            Duration::from_secs(config.probe_timeout_seconds),
            Duration::from_secs(config.terminate_grace_seconds),
        )
    }

    /// Make sure the dependent service is running
    ///
    /// Launches at most once. Not reaching readiness within the probe window
    /// is logged and tolerated: the owned handle is still returned, also when
    /// shutdown interrupts the wait. Nothing is launched once shutdown has
    /// been requested.
    #[instrument(skip_all, fields(launcher = %launcher.describe()))]
    pub async fn ensure_running(
        &self,
        health: &dyn HealthCheck,
        launcher: &dyn ServiceLauncher,
    ) -> Result<ServiceHandle, SupervisorError> {
        if health.is_ready().await {
            info!("Dependent service already running");
            return Ok(ServiceHandle::External);
        }

        if self.shutdown_requested() {
            info!("Shutdown requested, not launching dependent service");
            return Ok(ServiceHandle::External);
        }

        info!("Dependent service not running, launching it");
        let process = launcher.launch()?;
        info!(pid = ?process.id(), "Dependent service launched");

        match self.wait_until_ready(health).await {
            Ok(attempts) => info!(attempts = attempts, "Dependent service ready"),
            Err(e) => warn!(error = %e, "Continuing without a ready dependent service"),
        }

        Ok(ServiceHandle::Owned(process))
    }

    /// Poll the health check with backoff until ready or the window closes
    pub async fn wait_until_ready(&self, health: &dyn HealthCheck) -> Result<u32, SupervisorError> {
        let started = Instant::now();
        let mut attempt = 0u32;

        loop {
            let elapsed = started.elapsed();
            if elapsed >= self.probe_timeout {
                break;
            }

            if health.is_ready().await {
                return Ok(attempt + 1);
            }
            debug!(attempt = attempt, "Dependent service not ready yet");

            let Some(delay) = self.backoff.next_delay(attempt) else {
                attempt += 1;
                break;
            };
            attempt += 1;

            let remaining = self.probe_timeout.saturating_sub(started.elapsed());
            tokio::select! {
                _ = tokio::time::sleep(delay.min(remaining)) => {}
                _ = self.shutdown_signalled() => {
                    info!(attempts = attempt, "Shutdown requested, no longer waiting for dependent service");
                    return Err(SupervisorError::Interrupted);
                }
            }
        }

        Err(SupervisorError::DependencyUnready {
            attempts: attempt,
            elapsed_ms: started.elapsed().as_millis(),
        })
    }

    /// Release the handle; only owned processes are terminated
    pub async fn shutdown(&self, handle: ServiceHandle) -> Result<(), SupervisorError> {
        match handle {
            ServiceHandle::External => {
                debug!("Dependent service not owned, leaving it running");
                Ok(())
            }
            ServiceHandle::Owned(mut process) => {
                info!(pid = ?process.id(), "Terminating dependent service");
                process.terminate(self.terminate_grace).await?;
                info!("Dependent service terminated");
                Ok(())
            }
        }
    }
}

/// Health check against `<base>/repositories?since=daily`
pub struct HttpHealthCheck {
    client: reqwest::Client,
    url: String,
}

impl HttpHealthCheck {
    pub fn new(base_url: &str) -> Result<Self, SupervisorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| SupervisorError::LaunchFailed {
                command: "health check client".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            url: format!("{}/repositories?since=daily", base_url.trim_end_matches('/')),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl HealthCheck for HttpHealthCheck {
    async fn is_ready(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(e) => {
                debug!(url = %self.url, error = %e, "Health check request failed");
                false
            }
        }
    }
}

/// Launches a shell command (e.g. `npm start`) in a working directory
pub struct CommandLauncher {
    command: String,
    working_dir: PathBuf,
}

impl CommandLauncher {
    pub fn new(command: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            working_dir: working_dir.into(),
        }
    }

    pub fn from_config(config: &DependentServiceConfig) -> Self {
        Self::new(config.command.clone(), config.working_dir.clone())
    }

    fn shell_command(&self) -> Command {
        #[cfg(unix)]
        {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(&self.command);
            // Own process group so termination reaches npm's children too
            cmd.process_group(0);
            cmd
        }
        #[cfg(not(unix))]
        {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(&self.command);
            cmd
        }
    }
}

impl ServiceLauncher for CommandLauncher {
    fn launch(&self) -> Result<Box<dyn ManagedProcess>, SupervisorError> {
        let mut cmd = self.shell_command();
        cmd.current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| SupervisorError::LaunchFailed {
            command: self.command.clone(),
            reason: e.to_string(),
        })?;

        forward_output(&mut child);

        Ok(Box::new(ChildProcess { child }))
    }

    fn describe(&self) -> String {
        format!("{} (in {})", self.command, self.working_dir.display())
    }
}

// Child output goes to our log instead of interleaving with JSON lines
fn forward_output(child: &mut Child) {
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(target: "dependent_service", "{}", line);
            }
        });
    }

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(target: "dependent_service", "{}", line);
            }
        });
    }
}

/// Owned child process handle
pub struct ChildProcess {
    child: Child,
}

#[async_trait]
impl ManagedProcess for ChildProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn terminate(&mut self, grace: Duration) -> Result<(), SupervisorError> {
        if let Ok(Some(status)) = self.child.try_wait() {
            debug!(status = %status, "Dependent service already exited");
            return Ok(());
        }

        #[cfg(unix)]
        {
            if let Some(pid) = self.child.id() {
                // Negative pid targets the whole process group
                let _ = Command::new("kill")
                    .args(["-TERM", "--", &format!("-{}", pid)])
                    .output()
                    .await;
            }
        }
        #[cfg(not(unix))]
        {
            let _ = self.child.start_kill();
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(status = %status, "Dependent service exited");
                Ok(())
            }
            Ok(Err(e)) => Err(SupervisorError::TerminateFailed(e.to_string())),
            Err(_) => {
                warn!("Graceful termination timed out, force killing");
                match self.child.kill().await {
                    Ok(()) => Ok(()),
                    // Exited between the timeout and the kill
                    Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
                    Err(e) => Err(SupervisorError::TerminateFailed(e.to_string())),
                }
            }
        }
    }
}

//! First-launch readiness probe
//!
//! The server is started once so it generates its default files, polled
//! until its HTTP endpoint answers, and then stopped. The probe races three
//! events: the server exiting, the poller reporting ready, and the deadline.
//!
//! ```text
//! Starting ──> Probing ──┬──> Ready     (endpoint returned 200, server killed)
//!                        ├──> TimedOut  (deadline first, server killed)
//!                        └──> Crashed   (server exited on its own)
//! ```

use crate::error::{EntrypointError, EntrypointResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// How the server is launched, shared by the probe and the final run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl ServerCommand {
    pub fn new(program: impl Into<PathBuf>, cwd: &Path) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.to_path_buf(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).current_dir(&self.cwd);
        cmd
    }

    /// Run in the foreground with inherited stdio until the server exits
    pub async fn run_attached(&self) -> EntrypointResult<()> {
        info!("Starting server: {}", self.command_line());
        let status = self
            .command()
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| EntrypointError::command_failed(self.command_line(), e))?;

        if status.success() {
            info!("Server exited");
            Ok(())
        } else {
            Err(EntrypointError::subprocess(
                "run server",
                self.command_line(),
                status.code().unwrap_or(-1),
                "",
            ))
        }
    }
}

/// Decides whether the launched server is ready
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn is_ready(&self) -> bool;
}

/// Ready when a GET to the endpoint returns 200
pub struct HttpHealthCheck {
    url: String,
    agent: ureq::Agent,
}

impl HttpHealthCheck {
    /// `timeout` bounds each individual request
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            url: url.into(),
            agent,
        }
    }
}

#[async_trait]
impl HealthCheck for HttpHealthCheck {
    async fn is_ready(&self) -> bool {
        let agent = self.agent.clone();
        let url = self.url.clone();
        let result = tokio::task::spawn_blocking(move || {
            agent.get(&url).call().map(|r| r.status().as_u16())
        })
        .await;

        match result {
            Ok(Ok(200)) => true,
            Ok(Ok(status)) => {
                debug!("Health check returned {}", status);
                false
            }
            Ok(Err(e)) => {
                debug!("Health check failed: {}", e);
                false
            }
            Err(e) => {
                warn!("Health check task failed: {}", e);
                false
            }
        }
    }
}

/// Probe lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Starting,
    Probing,
    Ready,
    TimedOut,
    Crashed,
}

/// Terminal result of one probe run
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub state: ProbeState,
    /// Exit code if the server exited on its own
    pub exit_code: Option<i32>,
    /// Captured server stderr
    pub stderr: String,
}

/// Launches the server and waits for it to become ready
pub struct ReadinessProbe {
    check: Arc<dyn HealthCheck>,
    interval: Duration,
    timeout: Duration,
}

enum Event {
    Exited(Option<i32>),
    Ready,
    Deadline,
}

impl ReadinessProbe {
    pub fn new(check: Arc<dyn HealthCheck>, interval: Duration, timeout: Duration) -> Self {
        Self {
            check,
            // tokio intervals panic on a zero period
            interval: interval.max(Duration::from_millis(1)),
            timeout,
        }
    }

    /// Run the probe, turning anything but `Ready` into an error
    pub async fn initialize(&self, server: &ServerCommand) -> EntrypointResult<()> {
        let report = self.probe(server).await?;
        match report.state {
            ProbeState::Ready => Ok(()),
            ProbeState::TimedOut => Err(EntrypointError::Timeout {
                what: "server initialization".to_string(),
                after: self.timeout,
            }),
            _ => Err(EntrypointError::subprocess(
                "initialize server",
                server.command_line(),
                report.exit_code.unwrap_or(-1),
                report.stderr.trim(),
            )),
        }
    }

    /// Run the probe and report its terminal state.
    ///
    /// Returns only after the server has fully exited and the poller has stopped.
    pub async fn probe(&self, server: &ServerCommand) -> EntrypointResult<ProbeReport> {
        debug!("Probe state: {:?}", ProbeState::Starting);
        let mut child = server
            .command()
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EntrypointError::command_failed(server.command_line(), e))?;

        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(mut pipe) = stderr {
                let _ = pipe.read_to_string(&mut buf).await;
            }
            buf
        });

        let (done_tx, done_rx) = watch::channel(false);
        let (ready_tx, mut ready_rx) = oneshot::channel();
        let poller = tokio::spawn(poll(
            Arc::clone(&self.check),
            self.interval,
            done_rx,
            ready_tx,
        ));

        info!("Waiting for server to become ready");
        debug!("Probe state: {:?}", ProbeState::Probing);
        let deadline = sleep(self.timeout);
        tokio::pin!(deadline);

        let event = tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| EntrypointError::io("waiting for server", e))?;
                Event::Exited(status.code())
            }
            Ok(()) = &mut ready_rx => Event::Ready,
            _ = &mut deadline => Event::Deadline,
        };

        let (state, exit_code) = match event {
            Event::Exited(code) => {
                warn!("Server exited before becoming ready (code {:?})", code);
                (ProbeState::Crashed, code)
            }
            Event::Ready => {
                info!("Server initialized");
                stop(&mut child).await?;
                (ProbeState::Ready, None)
            }
            Event::Deadline => {
                warn!("Server not ready after {}s", self.timeout.as_secs());
                stop(&mut child).await?;
                (ProbeState::TimedOut, None)
            }
        };

        let _ = done_tx.send(true);
        poller
            .await
            .map_err(|e| EntrypointError::Internal(format!("probe poller failed: {}", e)))?;
        let stderr = stderr_task.await.unwrap_or_default();

        debug!("Probe state: {:?}", state);
        Ok(ProbeReport {
            state,
            exit_code,
            stderr,
        })
    }
}

/// Kill the server and wait for it to exit
async fn stop(child: &mut Child) -> EntrypointResult<()> {
    debug!("Stopping first-launch server");
    if let Err(e) = child.start_kill() {
        debug!("Kill failed, server already gone: {}", e);
    }
    child
        .wait()
        .await
        .map_err(|e| EntrypointError::io("waiting for server shutdown", e))?;
    Ok(())
}

/// Poll `check` every `interval` until it passes or `done` fires.
/// The first poll happens one interval after start.
async fn poll(
    check: Arc<dyn HealthCheck>,
    interval: Duration,
    mut done: watch::Receiver<bool>,
    ready: oneshot::Sender<()>,
) {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = done.changed() => return,
            _ = ticker.tick() => {}
        }
        if check.is_ready().await {
            let _ = ready.send(());
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpListener};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Becomes ready on the `after`-th call; never if `after` is zero
    struct CountingCheck {
        calls: AtomicUsize,
        after: usize,
    }

    impl CountingCheck {
        fn new(after: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                after,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HealthCheck for CountingCheck {
        async fn is_ready(&self) -> bool {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.after != 0 && n >= self.after
        }
    }

    fn shell(script: &str) -> ServerCommand {
        ServerCommand::new("sh", &std::env::temp_dir())
            .arg("-c")
            .arg(script)
    }

    fn sleeper() -> ServerCommand {
        ServerCommand::new("sleep", &std::env::temp_dir()).arg("30")
    }

    fn probe(check: Arc<CountingCheck>, timeout: Duration) -> ReadinessProbe {
        ReadinessProbe::new(check, Duration::from_millis(20), timeout)
    }

    /// Local HTTP endpoint answering every request with `status`
    fn http_stub(status: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let mut request = Vec::new();
                let mut buf = [0u8; 512];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });
        addr
    }

    #[tokio::test]
    async fn http_check_ready_on_200() {
        let addr = http_stub("200 OK");
        let interval = Duration::from_millis(200);
        let check = Arc::new(HttpHealthCheck::new(format!("http://{}/", addr), interval));
        let started = std::time::Instant::now();

        let report = ReadinessProbe::new(check, interval, Duration::from_secs(10))
            .probe(&sleeper())
            .await
            .unwrap();

        assert_eq!(report.state, ProbeState::Ready);
        assert!(started.elapsed() < interval * 2, "took {:?}", started.elapsed());
    }

    #[tokio::test]
    async fn http_check_times_out_on_503() {
        let addr = http_stub("503 Service Unavailable");
        let interval = Duration::from_millis(50);
        let check = Arc::new(HttpHealthCheck::new(format!("http://{}/", addr), interval));

        let report = ReadinessProbe::new(check, interval, Duration::from_millis(400))
            .probe(&sleeper())
            .await
            .unwrap();

        assert_eq!(report.state, ProbeState::TimedOut);
    }

    #[tokio::test]
    async fn zero_interval_still_polls() {
        let check = CountingCheck::new(2);
        let report = ReadinessProbe::new(check.clone(), Duration::ZERO, Duration::from_secs(10))
            .probe(&sleeper())
            .await
            .unwrap();

        assert_eq!(report.state, ProbeState::Ready);
        assert_eq!(check.calls(), 2);
    }

    #[tokio::test]
    async fn ready_stops_server() {
        let check = CountingCheck::new(3);
        let started = std::time::Instant::now();

        let report = probe(check.clone(), Duration::from_secs(10))
            .probe(&sleeper())
            .await
            .unwrap();

        assert_eq!(report.state, ProbeState::Ready);
        assert_eq!(check.calls(), 3);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn timeout_when_never_ready() {
        let check = CountingCheck::new(0);
        let probe = probe(check, Duration::from_millis(200));

        let report = probe.probe(&sleeper()).await.unwrap();
        assert_eq!(report.state, ProbeState::TimedOut);

        let err = probe.initialize(&sleeper()).await.unwrap_err();
        assert!(matches!(err, EntrypointError::Timeout { .. }));
        assert_eq!(err.category(), "timeout");
    }

    #[tokio::test]
    async fn crash_captures_stderr() {
        let check = CountingCheck::new(0);
        let report = probe(check, Duration::from_secs(10))
            .probe(&shell("echo boom >&2; exit 2"))
            .await
            .unwrap();

        assert_eq!(report.state, ProbeState::Crashed);
        assert_eq!(report.exit_code, Some(2));
        assert_eq!(report.stderr.trim(), "boom");
    }

    #[tokio::test]
    async fn clean_exit_before_ready_is_crash() {
        let err = probe(CountingCheck::new(0), Duration::from_secs(10))
            .initialize(&shell("exit 0"))
            .await
            .unwrap_err();

        match err {
            EntrypointError::Subprocess { step, code, .. } => {
                assert_eq!(step, "initialize server");
                assert_eq!(code, 0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn poller_stops_after_server_exits() {
        let check = CountingCheck::new(0);
        probe(check.clone(), Duration::from_secs(10))
            .probe(&shell("sleep 0.1"))
            .await
            .unwrap();

        let seen = check.calls();
        sleep(Duration::from_millis(150)).await;
        assert_eq!(check.calls(), seen);
    }

    #[tokio::test]
    async fn missing_binary_fails_to_spawn() {
        let server = ServerCommand::new("/nonexistent/SPT.Server.exe", &std::env::temp_dir());
        let err = probe(CountingCheck::new(1), Duration::from_secs(1))
            .initialize(&server)
            .await
            .unwrap_err();
        assert!(matches!(err, EntrypointError::CommandFailed { .. }));
    }

    #[tokio::test]
    async fn run_attached_reports_exit_code() {
        shell("exit 0").run_attached().await.unwrap();

        let err = shell("exit 4").run_attached().await.unwrap_err();
        assert!(matches!(err, EntrypointError::Subprocess { code: 4, .. }));
    }
}

//! Engine process supervision and pipe transport.
//!
//! One engine process is launched per adapter. Lines for its stdin go through
//! a bounded queue drained by a writer task, so a slow engine makes senders
//! wait instead of losing lines. Its stdout is forwarded line by line to the
//! caller; its stderr is diagnostic and only logged. A supervisor task waits
//! for the process to exit, reads the model it was told to write on exit and
//! removes the temporary launch directory.
//!
//! ```text
//! Starting -> Running -> InputClosed -> Exited
//!                 \________________________/  (process died on its own)
//! ```

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument, Span};

use crate::config::StreamConfig;
use crate::constants::engine::{FINAL_MODEL_FILE, INITIAL_MODEL_FILE};
use crate::constants::protocol::PREDICTIONS_TO_STDOUT;
use crate::error::{Error, Result};
use crate::namespace::NamespaceAllocator;
use crate::snapshot::SnapshotPaths;

/// Lifecycle of the engine process as seen by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransportState {
    Starting,
    Running,
    InputClosed,
    Exited,
}

/// Build the engine's argument list.
///
/// Namespaces named in interaction pairs are allocated here, before any
/// example is encoded, so they receive the first characters.
pub fn engine_args(
    config: &StreamConfig,
    namespaces: &mut NamespaceAllocator,
    final_model: &Path,
    initial_model: Option<&Path>,
) -> Result<Vec<String>> {
    let mut args = vec![
        "--bit_precision".to_string(),
        config.bit_precision.to_string(),
        "--final_regressor".to_string(),
        final_model.display().to_string(),
        "--predictions".to_string(),
        PREDICTIONS_TO_STDOUT.to_string(),
        "--loss_function".to_string(),
        config.loss_function.clone(),
    ];

    if let Some(tau) = config.effective_quantile_tau() {
        args.push("--quantile_tau".to_string());
        args.push(tau.to_string());
    }
    if let Some(path) = initial_model {
        args.push("--initial_regressor".to_string());
        args.push(path.display().to_string());
    }
    if let Some(l1) = config.l1 {
        args.push("--l1".to_string());
        args.push(l1.to_string());
    }
    if let Some(l2) = config.l2 {
        args.push("--l2".to_string());
        args.push(l2.to_string());
    }
    if let Some(rate) = config.learning_rate {
        args.push("--learning_rate".to_string());
        args.push(rate.to_string());
    }
    if config.save_resume {
        args.push("--save_resume".to_string());
    }
    for (first, second) in &config.quadratic {
        let a = namespaces.allocate(Some(first))?;
        let b = namespaces.allocate(Some(second))?;
        args.push("--quadratic".to_string());
        args.push(format!("{}{}", a, b));
    }

    Ok(args)
}

/// Handle on a running engine process.
pub struct EngineTransport {
    input: Mutex<Option<mpsc::Sender<String>>>,
    state_tx: Arc<watch::Sender<TransportState>>,
    state_rx: watch::Receiver<TransportState>,
    final_model: Arc<Mutex<Option<Vec<u8>>>>,
    exit_status: Arc<Mutex<Option<ExitStatus>>>,
    final_model_path: PathBuf,
    snapshot_paths: SnapshotPaths,
}

impl EngineTransport {
    /// Launch the engine. Must run inside a tokio runtime.
    ///
    /// Returns the transport and the engine's stdout lines. The line channel
    /// closes once the process has exited and its output has been drained.
    pub async fn launch(
        config: &StreamConfig,
        namespaces: &mut NamespaceAllocator,
        span: Span,
    ) -> Result<(Self, mpsc::UnboundedReceiver<String>)> {
        let (state_tx, state_rx) = watch::channel(TransportState::Starting);

        let workdir = tempfile::Builder::new().prefix("vwstream-").tempdir()?;
        let final_model_path = workdir.path().join(FINAL_MODEL_FILE);

        let initial_model_path = match &config.initial_model {
            Some(bytes) => {
                let path = workdir.path().join(INITIAL_MODEL_FILE);
                debug!("Writing initialization model to temporary file: {}", path.display());
                tokio::fs::write(&path, bytes).await?;
                Some(path)
            }
            None => None,
        };

        let args = engine_args(
            config,
            namespaces,
            &final_model_path,
            initial_model_path.as_deref(),
        )?;

        info!(
            engine = %config.engine_path.display(),
            "Launching engine process: {}",
            args.join(" ")
        );

        let mut child = Command::new(&config.engine_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Spawn(format!("{}: {}", config.engine_path.display(), e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Spawn("Failed to get stdin from process".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn("Failed to get stdout from process".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Spawn("Failed to get stderr from process".into()))?;

        let (input_tx, input_rx) = mpsc::channel(config.input_queue_capacity.max(1));
        let (lines_tx, lines_rx) = mpsc::unbounded_channel();

        tokio::spawn(pump_input(stdin, input_rx).instrument(span.clone()));

        let stdout_lines = lines_tx.clone();
        let stdout_task: JoinHandle<()> = tokio::spawn(
            async move {
                let mut lines = BufReader::new(stdout).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => {
                            if stdout_lines.send(line).is_err() {
                                debug!("Output receiver dropped, discarding engine output");
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!("Error reading engine stdout: {}", e);
                            break;
                        }
                    }
                }
            }
            .instrument(span.clone()),
        );

        let stderr_task: JoinHandle<()> = tokio::spawn(
            async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("VW(STDERR): {}", line);
                }
            }
            .instrument(span.clone()),
        );

        let state_tx = Arc::new(state_tx);
        let final_model = Arc::new(Mutex::new(None));
        let exit_status = Arc::new(Mutex::new(None));

        let snapshot_paths = SnapshotPaths::new(workdir.path());

        // Published before the supervisor exists so it can never overwrite Exited
        state_tx.send_modify(|state| *state = TransportState::Running);

        let supervisor = Supervisor {
            workdir,
            final_model_path: final_model_path.clone(),
            state_tx: state_tx.clone(),
            final_model: final_model.clone(),
            exit_status: exit_status.clone(),
        };
        tokio::spawn(
            async move {
                let status = child.wait().await;
                supervisor
                    .on_exit(status, stdout_task, stderr_task, lines_tx)
                    .await;
            }
            .instrument(span),
        );

        Ok((
            Self {
                input: Mutex::new(Some(input_tx)),
                state_tx,
                state_rx,
                final_model,
                exit_status,
                final_model_path,
                snapshot_paths,
            },
            lines_rx,
        ))
    }

    pub fn state(&self) -> TransportState {
        *self.state_rx.borrow()
    }

    /// Queue one line for the engine's stdin, waiting while the queue is full.
    pub async fn send_line(&self, line: String) -> Result<()> {
        let sender = self
            .input
            .lock()
            .clone()
            .ok_or(Error::TransportClosedWrite)?;

        if self.state() == TransportState::Exited {
            return Err(Error::TransportClosedWrite);
        }

        sender
            .send(line)
            .await
            .map_err(|_| Error::TransportClosedWrite)
    }

    /// Signal that nothing more will be sent. The engine keeps running until
    /// it has worked through its input.
    pub fn close_input(&self) {
        if self.input.lock().take().is_some() {
            debug!("Closing engine input");
            self.state_tx.send_if_modified(|state| {
                if *state == TransportState::Running {
                    *state = TransportState::InputClosed;
                    true
                } else {
                    false
                }
            });
        }
    }

    /// Resolves once the process has exited and its exit handling is done.
    pub async fn wait_exited(&self) {
        let mut rx = self.state_rx.clone();
        // A dropped sender means the supervisor is gone, which only happens
        // after exit handling.
        let _ = rx.wait_for(|state| *state == TransportState::Exited).await;
    }

    /// Model the engine wrote on exit, once it has exited.
    pub fn final_model(&self) -> Option<Vec<u8>> {
        self.final_model.lock().clone()
    }

    /// Where the engine writes its model on exit.
    pub fn final_model_path(&self) -> &Path {
        &self.final_model_path
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        *self.exit_status.lock()
    }

    /// Fresh path for a snapshot inside the adapter's private directory.
    pub fn next_snapshot_path(&self) -> PathBuf {
        self.snapshot_paths.next_path()
    }
}

async fn write_line(stdin: &mut ChildStdin, line: &str) -> std::io::Result<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}

async fn pump_input(mut stdin: ChildStdin, mut rx: mpsc::Receiver<String>) {
    while let Some(line) = rx.recv().await {
        debug!("VW(send): {}", line);
        if let Err(e) = write_line(&mut stdin, &line).await {
            error!("Failed to write to engine stdin: {}", e);
            return;
        }
    }
    if let Err(e) = stdin.shutdown().await {
        debug!("Engine stdin already closed: {}", e);
    }
}

/// Exit handling, owned by the task that waits on the child.
struct Supervisor {
    workdir: TempDir,
    final_model_path: PathBuf,
    state_tx: Arc<watch::Sender<TransportState>>,
    final_model: Arc<Mutex<Option<Vec<u8>>>>,
    exit_status: Arc<Mutex<Option<ExitStatus>>>,
}

impl Supervisor {
    async fn on_exit(
        self,
        status: std::io::Result<ExitStatus>,
        stdout_task: JoinHandle<()>,
        stderr_task: JoinHandle<()>,
        lines_tx: mpsc::UnboundedSender<String>,
    ) {
        match status {
            Ok(status) => {
                info!("VW(exit): {}", status);
                *self.exit_status.lock() = Some(status);
            }
            Err(e) => error!("Failed waiting for engine process: {}", e),
        }

        // Predictions written just before exit may still be in the pipe
        if let Err(e) = stdout_task.await {
            warn!("Engine stdout reader failed: {}", e);
        }
        if let Err(e) = stderr_task.await {
            warn!("Engine stderr reader failed: {}", e);
        }

        match tokio::fs::read(&self.final_model_path).await {
            Ok(bytes) => {
                debug!(bytes = bytes.len(), "Read final model");
                *self.final_model.lock() = Some(bytes);
            }
            Err(e) => warn!(
                "No final model at {}: {}",
                self.final_model_path.display(),
                e
            ),
        }

        let workdir = self.workdir.path().to_path_buf();
        if let Err(e) = self.workdir.close() {
            warn!("Failed to remove {}: {}", workdir.display(), e);
        }

        self.state_tx
            .send_modify(|state| *state = TransportState::Exited);
        drop(lines_tx);
    }
}

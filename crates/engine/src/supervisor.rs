//! Process supervision for external pipeline tools.
//!
//! [`Supervisor::start`] validates the stage's required parameters,
//! spawns the program with piped stdio, and returns a [`SupervisedRun`]
//! that streams stdout/stderr lines in arrival order and resolves with
//! the exit status. Termination is requested through the run's
//! [`ProcessHandle`] and is best-effort: the signal reaches the spawned
//! process only, not subprocesses it may have created itself.
//!
//! In [`EngineMode::Replay`] the supervisor replays a canned transcript
//! instead of creating a process, which keeps the test suite independent
//! of the real tools.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use terranode_core::error::TaskError;

use crate::tools::{Tool, ToolParams};

// ---------------------------------------------------------------------------
// EngineMode
// ---------------------------------------------------------------------------

/// How the supervisor executes tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    /// Spawn the real external programs.
    Live,
    /// Replay canned transcripts; no process is ever created.
    Replay,
}

impl EngineMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Replay => "replay",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, TaskError> {
        match s {
            "live" => Ok(Self::Live),
            "replay" => Ok(Self::Replay),
            _ => Err(TaskError::Configuration(format!(
                "Invalid engine mode: '{s}'. Must be one of: live, replay"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// One fully-specified tool invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub tool: Tool,
    /// Stage parameters checked against the tool's required set.
    pub params: ToolParams,
    /// Arguments appended verbatim after the template (engine options).
    pub extra_args: Vec<String>,
    /// Working directory for the child process.
    pub cwd: Option<PathBuf>,
    /// Override for the dynamic library search path. The bundled tools
    /// ship their own shared objects and must not pick up system copies.
    pub lib_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(tool: Tool, params: ToolParams) -> Self {
        Self {
            tool,
            params,
            extra_args: Vec::new(),
            cwd: None,
            lib_dir: None,
        }
    }

    pub fn with_extra_args(mut self, extra_args: Vec<String>) -> Self {
        self.extra_args = extra_args;
        self
    }

    pub fn with_cwd(mut self, cwd: PathBuf) -> Self {
        self.cwd = Some(cwd);
        self
    }

    pub fn with_lib_dir(mut self, lib_dir: Option<PathBuf>) -> Self {
        self.lib_dir = lib_dir;
        self
    }
}

// ---------------------------------------------------------------------------
// ProcessHandle
// ---------------------------------------------------------------------------

/// Cloneable handle to a supervised process, used for termination.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pid: Option<u32>,
    cancel: CancellationToken,
}

impl ProcessHandle {
    /// OS process id, if a real process was spawned.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Request termination. Best-effort: the kill signal is delivered to
    /// the tracked process; anything it spawned on its own is out of
    /// reach by contract.
    pub fn terminate(&self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// SupervisedRun
// ---------------------------------------------------------------------------

/// A running (or replayed) tool invocation.
///
/// Consume output with [`next_line`](Self::next_line) until it returns
/// `None`, then [`wait`](Self::wait) for the exit result.
#[derive(Debug)]
pub struct SupervisedRun {
    handle: ProcessHandle,
    output: mpsc::UnboundedReceiver<String>,
    exit: oneshot::Receiver<Result<(), TaskError>>,
}

impl SupervisedRun {
    pub fn handle(&self) -> ProcessHandle {
        self.handle.clone()
    }

    /// Next captured output line (stdout and stderr interleaved in
    /// arrival order), or `None` once both streams are closed.
    pub async fn next_line(&mut self) -> Option<String> {
        self.output.recv().await
    }

    /// Await process exit. `Ok(())` on exit code 0; any other code is a
    /// [`TaskError::ProcessExit`] carrying the code.
    pub async fn wait(self) -> Result<(), TaskError> {
        self.exit.await.map_err(|_| {
            TaskError::Io(std::io::Error::other("process supervisor exited unexpectedly"))
        })?
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

/// Spawns and supervises external tool invocations.
pub struct Supervisor {
    mode: EngineMode,
}

impl Supervisor {
    pub fn new(mode: EngineMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> EngineMode {
        self.mode
    }

    /// Validate parameters and start the invocation.
    ///
    /// Parameter validation happens in both modes, before any process is
    /// created; a missing required parameter never spawns anything.
    pub fn start(&self, invocation: Invocation) -> Result<SupervisedRun, TaskError> {
        let args = invocation.tool.build_args(&invocation.params)?;

        match self.mode {
            EngineMode::Replay => Ok(self.start_replay(&invocation)),
            EngineMode::Live => self.start_live(invocation, args),
        }
    }

    // ---- live mode ----

    fn start_live(
        &self,
        invocation: Invocation,
        args: Vec<String>,
    ) -> Result<SupervisedRun, TaskError> {
        let mut cmd = Command::new(invocation.tool.program());
        cmd.args(&args)
            .args(&invocation.extra_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Backstop: the child dies with its supervising task.
            .kill_on_drop(true);

        if let Some(cwd) = &invocation.cwd {
            cmd.current_dir(cwd);
        }
        if let Some(lib_dir) = &invocation.lib_dir {
            cmd.env("LD_LIBRARY_PATH", lib_dir);
        }

        let mut child = cmd.spawn().map_err(TaskError::ProcessSpawn)?;

        let cancel = CancellationToken::new();
        let handle = ProcessHandle {
            pid: child.id(),
            cancel: cancel.clone(),
        };

        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let stderr_tx = line_tx.clone();
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        tokio::spawn(stream_lines(stdout_pipe, line_tx));
        tokio::spawn(stream_lines(stderr_pipe, stderr_tx));

        let (exit_tx, exit_rx) = oneshot::channel();
        let tool = invocation.tool;
        tokio::spawn(async move {
            let waited = tokio::select! {
                status = child.wait() => Some(status),
                _ = cancel.cancelled() => None,
            };

            let result = match waited {
                Some(Ok(status)) => {
                    let code = status.code().unwrap_or(TaskError::TERMINATED);
                    if code == 0 {
                        Ok(())
                    } else {
                        Err(TaskError::ProcessExit { code })
                    }
                }
                Some(Err(e)) => Err(TaskError::Io(e)),
                None => {
                    tracing::info!(tool = %tool, "Termination requested, killing process");
                    if let Err(e) = child.kill().await {
                        tracing::warn!(tool = %tool, error = %e, "Failed to kill process");
                    }
                    Err(TaskError::ProcessExit {
                        code: TaskError::TERMINATED,
                    })
                }
            };

            let _ = exit_tx.send(result);
        });

        Ok(SupervisedRun {
            handle,
            output: line_rx,
            exit: exit_rx,
        })
    }

    // ---- replay mode ----

    fn start_replay(&self, invocation: &Invocation) -> SupervisedRun {
        let (line_tx, line_rx) = mpsc::unbounded_channel();
        for line in replay_transcript(invocation.tool) {
            // Receiver cannot be gone yet; ignore the error regardless.
            let _ = line_tx.send(line.to_string());
        }
        drop(line_tx);

        let (exit_tx, exit_rx) = oneshot::channel();
        let _ = exit_tx.send(Ok(()));

        SupervisedRun {
            handle: ProcessHandle {
                pid: None,
                cancel: CancellationToken::new(),
            },
            output: line_rx,
            exit: exit_rx,
        }
    }
}

/// Forward every line of one child pipe into the shared output channel.
async fn stream_lines<R>(pipe: Option<R>, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else { return };
    let mut lines = BufReader::new(pipe).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tx.send(line).is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                tracing::debug!(error = %e, "Output stream closed with error");
                return;
            }
        }
    }
}

/// Fixed transcript replayed per tool in [`EngineMode::Replay`].
fn replay_transcript(tool: Tool) -> &'static [&'static str] {
    match tool {
        Tool::Odm => &[
            "[INFO] Initializing reconstruction",
            "PROGRESS: 10",
            "[INFO] Structure from motion",
            "PROGRESS: 35",
            "[INFO] Dense matching",
            "PROGRESS: 70",
            "[INFO] Texturing and orthorectification",
            "PROGRESS: 100",
            "[INFO] Reconstruction complete",
        ],
        Tool::PdalTranslate => &["(pdal) translated 1 file"],
        Tool::EntwineBuild => &["1/1 done", "Index complete"],
        Tool::PdalInfo => &["{\"summary\": {\"num_points\": 1000000}}"],
        Tool::DracoEncode => &["Encoded mesh", "Compression ratio: 11.2"],
        Tool::GdalTranslateCog => &["Input file size is 4096, 4096", "0...10...100 - done."],
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn params(pairs: &[(&str, &str)]) -> ToolParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn replay_streams_transcript_then_succeeds() {
        let supervisor = Supervisor::new(EngineMode::Replay);
        let invocation = Invocation::new(
            Tool::Odm,
            params(&[("project-path", "/data/tasks/demo")]),
        );

        let mut run = supervisor.start(invocation).unwrap();
        let mut lines = Vec::new();
        while let Some(line) = run.next_line().await {
            lines.push(line);
        }

        assert_eq!(lines, replay_transcript(Tool::Odm));
        assert!(run.wait().await.is_ok());
    }

    #[tokio::test]
    async fn replay_has_no_os_process() {
        let supervisor = Supervisor::new(EngineMode::Replay);
        let run = supervisor
            .start(Invocation::new(
                Tool::PdalInfo,
                params(&[("input", "model.laz")]),
            ))
            .unwrap();
        assert_eq!(run.handle().pid(), None);
    }

    #[tokio::test]
    async fn missing_parameter_fails_before_any_spawn() {
        // Live mode: validation must reject before process creation, so
        // this cannot fail with a spawn error even though the program
        // does not exist on the test host.
        let supervisor = Supervisor::new(EngineMode::Live);
        let err = supervisor
            .start(Invocation::new(Tool::DracoEncode, ToolParams::new()))
            .unwrap_err();
        assert_matches!(err, TaskError::Configuration(_));
    }

    #[tokio::test]
    async fn terminate_on_replay_handle_is_harmless() {
        let supervisor = Supervisor::new(EngineMode::Replay);
        let mut run = supervisor
            .start(Invocation::new(
                Tool::EntwineBuild,
                params(&[("input", "a.laz"), ("output", "ept")]),
            ))
            .unwrap();
        run.handle().terminate();
        while run.next_line().await.is_some() {}
        assert!(run.wait().await.is_ok());
    }

    #[test]
    fn engine_mode_round_trip() {
        assert_eq!(EngineMode::from_str("live").unwrap(), EngineMode::Live);
        assert_eq!(EngineMode::from_str("replay").unwrap(), EngineMode::Replay);
        assert!(EngineMode::from_str("dry-run").is_err());
    }
}

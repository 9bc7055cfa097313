//! Generation capability backed by an external command.
//!
//! The command line runs through `sh -c`; the prompt is written to its
//! stdin and its stdout is the response. The child is killed when the
//! request timeout expires.

use std::io::{self, Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use super::traits::{GenerationError, GenerationRequest, Generator};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long to wait for the pipes to close after the child is gone.
const PIPE_GRACE: Duration = Duration::from_millis(200);

/// Runs a shell command per generation request.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    command: String,
}

impl CommandGenerator {
    /// Create a generator for a shell command line.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// The command line.
    pub fn command(&self) -> &str {
        &self.command
    }

    fn spawn(&self, request: &GenerationRequest) -> Result<Child, GenerationError> {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&self.command)
            .env("SHELVE_MAX_TOKENS", request.max_tokens.to_string())
            .env("SHELVE_TEMPERATURE", request.temperature.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group, so a timeout takes down anything the shell started.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        command
            .spawn()
            .map_err(|e| GenerationError::Unavailable(format!("{}: {}", self.command, e)))
    }
}

/// Read a pipe to the end on its own thread.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<io::Result<Vec<u8>>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let result = match pipe {
            Some(mut pipe) => pipe.read_to_end(&mut buf).map(|_| buf),
            None => Ok(buf),
        };
        let _ = tx.send(result);
    });
    rx
}

/// Kill the child and its process group, then reap it.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        let _ = Command::new("kill")
            .arg("-KILL")
            .arg(format!("-{}", child.id()))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
    let _ = child.kill();
    let _ = child.wait();
}

impl Generator for CommandGenerator {
    fn name(&self) -> &str {
        "command"
    }

    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let mut child = self.spawn(request)?;
        let timed_out = || GenerationError::Timeout(request.timeout.as_millis() as u64);

        // Pipes are serviced on threads so a child that fills one can still
        // make progress while we poll for exit. The stdin writer ends with
        // EPIPE once the child is gone.
        let stdin = child.stdin.take();
        let prompt = request.prompt.clone();
        thread::spawn(move || {
            if let Some(mut stdin) = stdin {
                let _ = stdin.write_all(prompt.as_bytes());
            }
        });
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + request.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        kill_tree(&mut child);
                        let _ = stdout.recv_timeout(PIPE_GRACE);
                        let _ = stderr.recv_timeout(PIPE_GRACE);
                        return Err(timed_out());
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    kill_tree(&mut child);
                    return Err(GenerationError::Transport(e.to_string()));
                }
            }
        };

        // Something the shell left running may still hold the pipes open.
        let wait = deadline
            .saturating_duration_since(Instant::now())
            .max(PIPE_GRACE);
        let output = match stdout.recv_timeout(wait) {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => return Err(GenerationError::Transport(format!("reading stdout: {}", e))),
            Err(RecvTimeoutError::Timeout) => {
                kill_tree(&mut child);
                return Err(timed_out());
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(GenerationError::Transport("stdout reader failed".to_string()))
            }
        };

        if !status.success() {
            let err = match stderr.recv_timeout(PIPE_GRACE) {
                Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
                _ => String::new(),
            };
            return Err(GenerationError::Transport(format!(
                "{} exited with {}: {}",
                self.command,
                status,
                err.trim()
            )));
        }

        String::from_utf8(output)
            .map_err(|e| GenerationError::Transport(format!("stdout is not valid UTF-8: {}", e)))
    }
}

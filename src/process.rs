// src/process.rs

//! External tool invocation
//!
//! Every configure script, compiler driver, patch and strip call goes
//! through [`ToolRunner`]. Tools run with stdin closed, their output is
//! streamed to the log line by line, and the last lines are kept so a
//! failure report can show what the tool printed before it died. A tool
//! that outlives the configured timeout is killed.

use std::collections::{BTreeMap, VecDeque};
use std::io::{BufRead, BufReader, Read};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use wait_timeout::ChildExt;

/// Number of output lines kept for failure reports
pub const OUTPUT_TAIL_LINES: usize = 40;

/// Errors from running an external tool
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{program} not found on PATH")]
    NotFound { program: String },

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {secs} seconds")]
    TimedOut {
        program: String,
        secs: u64,
        tail: Vec<String>,
    },

    #[error("{program} exited with status {code}")]
    Failed {
        program: String,
        code: i32,
        tail: Vec<String>,
    },
}

impl ToolError {
    /// Last lines the tool printed, if it got that far
    pub fn output_tail(&self) -> &[String] {
        match self {
            Self::TimedOut { tail, .. } | Self::Failed { tail, .. } => tail,
            _ => &[],
        }
    }
}

/// Output of a successful tool run
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub tail: Vec<String>,
}

/// Runs external tools with a bounded timeout
#[derive(Debug, Clone)]
pub struct ToolRunner {
    timeout: Duration,
    verbose: bool,
    label: String,
}

impl ToolRunner {
    pub fn new(timeout: Duration, verbose: bool) -> Self {
        Self {
            timeout,
            verbose,
            label: String::new(),
        }
    }

    /// A runner whose log lines are prefixed with `label`
    pub fn labelled(&self, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..self.clone()
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `program` in `cwd` with `env` layered over the inherited
    /// environment
    ///
    /// A bare program name is looked up on the `PATH` from `env` when it
    /// sets one, else on the inherited `PATH`.
    pub fn run<S: AsRef<str>>(
        &self,
        program: &str,
        args: &[S],
        cwd: &Path,
        env: &BTreeMap<String, String>,
    ) -> std::result::Result<ToolOutput, ToolError> {
        let resolved = self.resolve_program(program, cwd, env)?;
        let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();

        debug!("{}running {} {:?} in {}", self.prefix(), program, args, cwd.display());

        let mut command = Command::new(&resolved);
        command
            .args(&args)
            .current_dir(cwd)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group, so a timeout also reaches the tool's children
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|source| ToolError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let tail = Arc::new(Mutex::new(VecDeque::with_capacity(OUTPUT_TAIL_LINES)));
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(self.spawn_reader(stdout, Arc::clone(&tail)));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(self.spawn_reader(stderr, Arc::clone(&tail)));
        }

        let waited = child.wait_timeout(self.timeout);
        let status = match waited {
            Ok(Some(status)) => Some(status),
            Ok(None) => {
                kill_tree(&mut child);
                None
            }
            Err(source) => {
                kill_tree(&mut child);
                return Err(ToolError::Spawn {
                    program: program.to_string(),
                    source,
                });
            }
        };

        for reader in readers {
            let _ = reader.join();
        }
        let tail: Vec<String> = tail
            .lock()
            .map(|lines| lines.iter().cloned().collect())
            .unwrap_or_default();

        match status {
            Some(status) if status.success() => Ok(ToolOutput { tail }),
            Some(status) => Err(ToolError::Failed {
                program: program.to_string(),
                code: status.code().unwrap_or(-1),
                tail,
            }),
            None => Err(ToolError::TimedOut {
                program: program.to_string(),
                secs: self.timeout.as_secs(),
                tail,
            }),
        }
    }

    fn resolve_program(
        &self,
        program: &str,
        cwd: &Path,
        env: &BTreeMap<String, String>,
    ) -> std::result::Result<PathBuf, ToolError> {
        let not_found = || ToolError::NotFound {
            program: program.to_string(),
        };

        if program.contains('/') {
            let path = if Path::new(program).is_absolute() {
                PathBuf::from(program)
            } else {
                cwd.join(program)
            };
            return if path.exists() { Ok(path) } else { Err(not_found()) };
        }

        let search_path = env
            .get("PATH")
            .cloned()
            .or_else(|| std::env::var("PATH").ok());
        which::which_in(program, search_path, cwd).map_err(|_| not_found())
    }

    fn spawn_reader<R: Read + Send + 'static>(
        &self,
        stream: R,
        tail: Arc<Mutex<VecDeque<String>>>,
    ) -> thread::JoinHandle<()> {
        let verbose = self.verbose;
        let prefix = self.prefix();
        thread::spawn(move || {
            let mut reader = BufReader::new(stream);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\n', '\r'])
                    .to_string();
                if verbose {
                    info!("{}{}", prefix, line);
                } else {
                    debug!("{}{}", prefix, line);
                }
                if let Ok(mut tail) = tail.lock() {
                    if tail.len() == OUTPUT_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
        })
    }

    fn prefix(&self) -> String {
        if self.label.is_empty() {
            String::new()
        } else {
            format!("[{}] ", self.label)
        }
    }
}

/// Kill the tool and everything it started, then reap it
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Ok(pid) = i32::try_from(child.id()) {
            let _ = killpg(Pid::from_raw(pid), Signal::SIGKILL);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

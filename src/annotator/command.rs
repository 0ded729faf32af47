//! Annotator backed by an external program.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Annotator, Artifact};
use crate::error::AnnotationError;

/// Child processes started by `process` and not yet reaped.
#[derive(Debug, Default)]
struct Running {
    next_id: AtomicU64,
    children: Mutex<HashMap<u64, Child>>,
}

impl Running {
    fn insert(&self, child: Child) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.children.lock().insert(id, child);
        id
    }

    /// `None` if the child was killed by `cancel`.
    fn remove(&self, id: u64) -> Option<Child> {
        self.children.lock().remove(&id)
    }
}

/// Pipes the input text to a program's stdin and uses its stdout as the artifact.
#[derive(Debug, Clone)]
pub struct CommandAnnotator {
    program: PathBuf,
    args: Vec<String>,
    name: String,
    running: Arc<Running>,
}

impl CommandAnnotator {
    /// Create an annotator that runs `program` with `args`.
    ///
    /// # Errors
    ///
    /// Returns an error if the program name is empty or cannot be found.
    pub fn new(program: &str, args: &[String]) -> Result<Self, AnnotationError> {
        if program.trim().is_empty() {
            return Err(AnnotationError::Init("annotator program is empty".to_string()));
        }

        let program = resolve_program(program).ok_or_else(|| {
            AnnotationError::Init(format!("annotator program '{program}' not found"))
        })?;
        let name = program.file_name().map_or_else(
            || program.display().to_string(),
            |n| n.to_string_lossy().into_owned(),
        );

        tracing::debug!(program = %program.display(), ?args, "Command annotator configured");

        Ok(Self {
            program,
            args: args.to_vec(),
            name,
            running: Arc::default(),
        })
    }

    /// Number of child processes currently running.
    #[must_use]
    pub fn active_processes(&self) -> usize {
        self.running.children.lock().len()
    }

    fn failure(&self, what: &str, e: impl std::fmt::Display) -> AnnotationError {
        AnnotationError::Process(format!("{} {what}: {e}", self.name))
    }
}

impl Annotator for CommandAnnotator {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, text: &str) -> Result<Artifact, AnnotationError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.failure("failed to spawn", e))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let id = self.running.insert(child);

        // stdin and stderr get their own threads while stdout is drained here.
        let input = text.to_owned();
        let feeder = std::thread::spawn(move || -> std::io::Result<()> {
            if let Some(mut stdin) = stdin {
                stdin.write_all(input.as_bytes())?;
            }
            Ok(())
        });
        let errors = std::thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                // Partial stderr is still useful in the error message.
                let _ = stderr.read_to_end(&mut buf);
            }
            buf
        });

        let mut body = Vec::new();
        let read = stdout.map_or(Ok(0), |mut out| out.read_to_end(&mut body));

        let Some(mut child) = self.running.remove(id) else {
            return Err(AnnotationError::Process(format!(
                "{} was killed before finishing",
                self.name
            )));
        };
        let status = child.wait().map_err(|e| self.failure("did not complete", e))?;
        read.map_err(|e| self.failure("output could not be read", e))?;

        match feeder.join() {
            Ok(Ok(())) => {}
            // The child may legitimately exit without reading all input.
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => return Err(self.failure("did not accept input", e)),
            Err(_) => {
                return Err(AnnotationError::Process(
                    "stdin writer thread panicked".to_string(),
                ))
            }
        }
        let stderr = errors.join().unwrap_or_default();

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(AnnotationError::Process(format!(
                "{} exited with {}: {}",
                self.name,
                status,
                stderr.trim()
            )));
        }

        let body = String::from_utf8(body).map_err(|e| self.failure("wrote non-UTF-8 output", e))?;

        Ok(Artifact::new(body))
    }

    fn cancel(&self) {
        let children: Vec<Child> = self
            .running
            .children
            .lock()
            .drain()
            .map(|(_, child)| child)
            .collect();

        for mut child in children {
            let pid = child.id();
            if let Err(e) = child.kill() {
                tracing::debug!(pid, error = %e, "Annotator process already exited");
            }
            if let Err(e) = child.wait() {
                tracing::debug!(pid, error = %e, "Failed to reap annotator process");
            }
            tracing::warn!(pid, annotator = %self.name, "Killed annotator process");
        }
    }
}

/// Locate `program` directly or on `PATH`.
fn resolve_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_program_rejected() {
        let err = CommandAnnotator::new("  ", &[]).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_missing_program_rejected() {
        let err = CommandAnnotator::new("/nonexistent/bin/annotate", &[]).unwrap_err();
        assert!(matches!(err, AnnotationError::Init(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_cat_echoes_input() {
        let annotator = CommandAnnotator::new("cat", &[]).unwrap();
        assert_eq!(annotator.name(), "cat");

        let artifact = annotator.process("Hello world.").unwrap();
        assert_eq!(artifact.body, "Hello world.");
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_error() {
        let script = ["-c".to_string(), "echo boom >&2; exit 3".to_string()];
        let annotator = CommandAnnotator::new("sh", &script).unwrap();
        let err = annotator.process("ignored").unwrap_err();
        assert!(matches!(err, AnnotationError::Process(_)));
        assert!(err.to_string().contains("boom"));
    }

    #[cfg(unix)]
    #[test]
    fn test_cancel_kills_running_child() {
        let annotator = Arc::new(CommandAnnotator::new("sleep", &["5".to_string()]).unwrap());
        let worker = {
            let annotator = Arc::clone(&annotator);
            std::thread::spawn(move || annotator.process("ignored"))
        };

        for _ in 0..200 {
            if annotator.active_processes() == 1 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(annotator.active_processes(), 1);

        let started = std::time::Instant::now();
        annotator.cancel();
        let err = worker.join().unwrap().unwrap_err();

        assert!(started.elapsed() < std::time::Duration::from_secs(2));
        assert!(err.to_string().contains("killed"));
        assert_eq!(annotator.active_processes(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_finished_child_is_reaped() {
        let annotator = CommandAnnotator::new("cat", &[]).unwrap();
        annotator.process("one").unwrap();
        annotator.process("two").unwrap();
        assert_eq!(annotator.active_processes(), 0);
    }
}

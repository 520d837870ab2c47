// Process runner: executes external commands synchronously relative to a
// scoped working directory. The directory stack lives on the `Shell`
// value instead of the process-wide cwd, and `DirGuard` pops it on every
// exit path.

use anyhow::{Context, Result};
use std::cell::RefCell;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

use crate::error::ReleaseError;

/// A fully resolved command: program, arguments and the directory it runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Result of running an `Invocation`. `stdout` is only filled when the
/// caller asked for capture; `code` is `None` when killed by a signal.
#[derive(Debug, Clone, Default)]
pub struct Execution {
    pub success: bool,
    pub code: Option<i32>,
    pub status: String,
    pub stdout: String,
}

/// Backend that actually runs commands. Swapped out in tests.
pub trait Executor {
    fn execute(&self, invocation: &Invocation, capture: bool) -> Result<Execution>;
}

/// Runs commands with `std::process::Command`, inheriting stderr (and
/// stdout when not capturing) so output streams to the console.
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn execute(&self, invocation: &Invocation, capture: bool) -> Result<Execution> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args).current_dir(&invocation.cwd);

        if capture {
            let output = cmd
                .stderr(Stdio::inherit())
                .output()
                .with_context(|| format!("Failed to spawn `{}`", invocation))?;
            Ok(Execution {
                success: output.status.success(),
                code: output.status.code(),
                status: output.status.to_string(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            })
        } else {
            let status = cmd
                .status()
                .with_context(|| format!("Failed to spawn `{}`", invocation))?;
            Ok(Execution {
                success: status.success(),
                code: status.code(),
                status: status.to_string(),
                stdout: String::new(),
            })
        }
    }
}

pub struct Shell {
    executor: Box<dyn Executor>,
    root: PathBuf,
    scopes: RefCell<Vec<PathBuf>>,
}

/// Restores the previous working directory of its `Shell` when dropped.
#[must_use = "the directory is restored as soon as the guard is dropped"]
pub struct DirGuard<'a> {
    shell: &'a Shell,
}

impl Drop for DirGuard<'_> {
    fn drop(&mut self) {
        self.shell.scopes.borrow_mut().pop();
    }
}

impl Shell {
    /// Shell rooted at `root` that runs real commands.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_executor(root, SystemExecutor)
    }

    /// A relative `root` is anchored at the process cwd once, here, so paths
    /// handed to commands running in other directories stay valid.
    pub fn with_executor(root: impl Into<PathBuf>, executor: impl Executor + 'static) -> Self {
        let root = root.into();
        let root = if root.is_relative() {
            std::env::current_dir().map(|cwd| cwd.join(&root)).unwrap_or(root)
        } else {
            root
        };
        Shell {
            executor: Box::new(executor),
            root,
            scopes: RefCell::new(Vec::new()),
        }
    }

    /// Current (possibly scoped) working directory.
    pub fn cwd(&self) -> PathBuf {
        self.scopes
            .borrow()
            .last()
            .cloned()
            .unwrap_or_else(|| self.root.clone())
    }

    /// Resolve `rel` against the current working directory.
    pub fn path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.cwd().join(rel)
    }

    /// Enter `dir` (relative to the current directory) until the returned
    /// guard goes out of scope.
    pub fn lcd(&self, dir: impl AsRef<Path>) -> DirGuard<'_> {
        let next = self.path(dir);
        debug!(dir = %next.display(), "entering directory");
        self.scopes.borrow_mut().push(next);
        DirGuard { shell: self }
    }

    fn invocation(&self, program: &str, args: &[&str]) -> Invocation {
        Invocation {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            cwd: self.cwd(),
        }
    }

    fn execute(&self, program: &str, args: &[&str], capture: bool) -> Result<(Invocation, Execution)> {
        let invocation = self.invocation(program, args);
        debug!(command = %invocation, cwd = %invocation.cwd.display(), capture, "running");
        let execution = self.executor.execute(&invocation, capture)?;
        Ok((invocation, execution))
    }

    /// Run a command with its output streamed to the console. A nonzero
    /// exit is an error.
    pub fn run(&self, program: &str, args: &[&str]) -> Result<()> {
        let (invocation, execution) = self.execute(program, args, false)?;
        if !execution.success {
            return Err(ReleaseError::CommandFailed {
                command: invocation.to_string(),
                status: execution.status,
            }
            .into());
        }
        Ok(())
    }

    /// Run a command and return its stdout with surrounding whitespace
    /// trimmed. A nonzero exit is an error.
    pub fn capture(&self, program: &str, args: &[&str]) -> Result<String> {
        let (invocation, execution) = self.execute(program, args, true)?;
        if !execution.success {
            return Err(ReleaseError::CommandFailed {
                command: invocation.to_string(),
                status: execution.status,
            }
            .into());
        }
        Ok(execution.stdout.trim().to_string())
    }

    /// Like `capture`, but exiting with `absent_code` yields `None`. Any
    /// other failure is still an error.
    pub fn try_capture(&self, program: &str, args: &[&str], absent_code: i32) -> Result<Option<String>> {
        let (invocation, execution) = self.execute(program, args, true)?;
        if execution.success {
            return Ok(Some(execution.stdout.trim().to_string()));
        }
        if execution.code == Some(absent_code) {
            debug!(command = %invocation, status = %execution.status, "command failed, tolerated");
            return Ok(None);
        }
        Err(ReleaseError::CommandFailed {
            command: invocation.to_string(),
            status: execution.status,
        }
        .into())
    }

    /// `mkdir -p`
    pub fn create_dir_all(&self, rel: impl AsRef<Path>) -> Result<()> {
        let path = self.path(rel);
        fs::create_dir_all(&path).with_context(|| format!("Failed to create {}", path.display()))
    }

    pub fn copy(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<()> {
        let (from, to) = (self.path(from), self.path(to));
        fs::copy(&from, &to)
            .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))?;
        Ok(())
    }

    /// `rm -rf` on a directory. A missing directory is not an error.
    pub fn remove_dir_all(&self, rel: impl AsRef<Path>) -> Result<()> {
        let path = self.path(rel);
        match fs::remove_dir_all(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }

    /// `rm -f`. Only "not found" is swallowed.
    pub fn remove_file(&self, rel: impl AsRef<Path>) -> io::Result<()> {
        match fs::remove_file(self.path(rel)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Recorder {
        calls: Rc<RefCell<Vec<(Invocation, bool)>>>,
        stdout: String,
        success: bool,
    }

    impl Executor for Recorder {
        fn execute(&self, invocation: &Invocation, capture: bool) -> Result<Execution> {
            self.calls.borrow_mut().push((invocation.clone(), capture));
            Ok(Execution {
                success: self.success,
                code: Some(if self.success { 0 } else { 1 }),
                status: if self.success { "exit status: 0".into() } else { "exit status: 1".into() },
                stdout: self.stdout.clone(),
            })
        }
    }

    fn recorder(stdout: &str, success: bool) -> Recorder {
        Recorder {
            stdout: stdout.into(),
            success,
            ..Default::default()
        }
    }

    #[test]
    fn capture_trims_output() {
        let shell = Shell::with_executor("/project", recorder("  abc123\n\n", true));
        assert_eq!(shell.capture("git", &["rev-parse", "HEAD"]).unwrap(), "abc123");
    }

    #[test]
    fn nonzero_exit_is_command_failed() {
        let shell = Shell::with_executor("/project", recorder("", false));
        let err = shell.run("make", &["html"]).unwrap_err();
        match err.downcast_ref::<ReleaseError>() {
            Some(ReleaseError::CommandFailed { command, .. }) => assert_eq!(command, "make html"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(shell.capture("make", &["html"]).is_err());
        assert_eq!(shell.try_capture("make", &["html"], 1).unwrap(), None);
        assert!(shell.try_capture("make", &["html"], 2).is_err());
    }

    #[test]
    fn lcd_scopes_commands_and_restores() {
        let rec = recorder("", true);
        let calls = rec.calls.clone();
        let shell = Shell::with_executor("/project", rec);

        {
            let _demo = shell.lcd("demo");
            shell.run("make", &["html"]).unwrap();
            {
                let _nested = shell.lcd("build");
                assert_eq!(shell.cwd(), PathBuf::from("/project/demo/build"));
            }
            assert_eq!(shell.cwd(), PathBuf::from("/project/demo"));
        }
        assert_eq!(shell.cwd(), PathBuf::from("/project"));

        let calls = calls.borrow();
        assert_eq!(calls[0].0.cwd, PathBuf::from("/project/demo"));
        assert!(!calls[0].1);
    }

    #[test]
    fn lcd_restores_on_error_path() {
        let shell = Shell::with_executor("/project", recorder("", false));
        let result = (|| -> Result<()> {
            let _guard = shell.lcd("demo");
            shell.run("make", &["html"])?;
            Ok(())
        })();
        assert!(result.is_err());
        assert_eq!(shell.cwd(), PathBuf::from("/project"));
    }

    #[test]
    fn relative_root_is_anchored_at_cwd() {
        let shell = Shell::with_executor("theme", recorder("", true));
        let cwd = std::env::current_dir().unwrap();
        assert!(shell.cwd().is_absolute());
        assert_eq!(shell.cwd(), cwd.join("theme"));
        let _assets = shell.lcd("sphinx_bootstrap_theme/bootstrap");
        assert_eq!(shell.path("x.zip"), cwd.join("theme/sphinx_bootstrap_theme/bootstrap/x.zip"));
    }

    #[test]
    fn removals_tolerate_missing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let shell = Shell::new(dir.path());
        shell.remove_dir_all("nope").unwrap();
        shell.remove_file("nope.txt").unwrap();

        shell.create_dir_all("build/nested").unwrap();
        fs::write(dir.path().join("build/nested/a.zip"), b"zip").unwrap();
        shell.remove_dir_all("build").unwrap();
        assert!(!dir.path().join("build").exists());
    }

    #[test]
    fn system_executor_streams_and_captures() {
        let dir = tempfile::tempdir().unwrap();
        let shell = Shell::new(dir.path());
        assert_eq!(shell.capture("sh", &["-c", "echo '  hello  '"]).unwrap(), "hello");
        assert!(shell.run("sh", &["-c", "exit 3"]).is_err());
        assert_eq!(shell.try_capture("sh", &["-c", "exit 1"], 1).unwrap(), None);
        assert!(shell.try_capture("sh", &["-c", "exit 3"], 1).is_err());
    }
}

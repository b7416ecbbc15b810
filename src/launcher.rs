use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use tracing::{info, warn};

/// Starts an agent server when the configured one is not answering.
pub trait ServerLauncher: Send + Sync {
    fn launch(&mut self) -> io::Result<()>;
}

/// Launches the server binary as a child process and stops it on drop.
#[derive(Debug)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    child: Option<Child>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            child: None,
        }
    }

    pub fn with_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut().map(Child::try_wait) {
            Some(Ok(None)) => true,
            Some(Ok(Some(_)) | Err(_)) | None => false,
        }
    }
}

impl ServerLauncher for ProcessLauncher {
    fn launch(&mut self) -> io::Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        info!(program = %self.program.display(), pid = child.id(), "launched agent server");
        self.child = Some(child);
        Ok(())
    }
}

impl Drop for ProcessLauncher {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(error) = child.kill() {
                warn!(%error, "failed to stop launched agent server");
            }
            let _ = child.wait();
        }
    }
}

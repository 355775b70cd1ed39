//! Launching the external pipeline.

use itertools::Itertools;
use log::info;
use shell_escape::escape;
use std::ffi::OsString;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};

/// One fully-formed external process launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineInvocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// Added to the inherited environment of the child.
    pub envs: Vec<(String, OsString)>,
}

impl PipelineInvocation {
    /// Render as a copy-pasteable shell command line.
    pub fn command_line(&self) -> String {
        let env_prefix = self
            .envs
            .iter()
            .map(|(key, value)| format!("{key}={}", escape(value.to_string_lossy())));
        let command = std::iter::once(escape(self.program.to_string_lossy()).into_owned()).chain(
            self.args
                .iter()
                .map(|arg| escape(arg.to_string_lossy()).into_owned()),
        );
        env_prefix.chain(command).join(" ")
    }
}

/// Run a pipeline invocation and report how it exited.
pub trait ProcessLauncher {
    fn launch(&self, invocation: &PipelineInvocation) -> std::io::Result<ExitStatus>;
}

/// Spawn the pipeline as a child process and wait for it.
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn launch(&self, invocation: &PipelineInvocation) -> std::io::Result<ExitStatus> {
        info!("running {}", invocation.command_line());
        Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(invocation.envs.iter().map(|(k, v)| (k, v)))
            .status()
    }
}

/// Print the command that would be run instead of running it.
pub struct DryRunLauncher;

impl ProcessLauncher for DryRunLauncher {
    fn launch(&self, invocation: &PipelineInvocation) -> std::io::Result<ExitStatus> {
        println!("Dry Run Mode");
        println!();
        println!("pipeline command: {}", invocation.command_line());
        Ok(ExitStatus::from_raw(0))
    }
}

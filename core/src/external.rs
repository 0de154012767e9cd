//! Blocking invocation of external executables.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use crate::prelude::{EnmError, EnmResult};
use crate::telemetry::LogManager;

/// Program plus arguments, run to completion with no timeout.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ExternalCommand {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_os_string()));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    /// Shell-like rendering for logs and error messages.
    pub fn display(&self) -> String {
        let mut rendered = self.program.display().to_string();
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            rendered.push(' ');
            if arg.contains(' ') {
                rendered.push('"');
                rendered.push_str(&arg);
                rendered.push('"');
            } else {
                rendered.push_str(&arg);
            }
        }
        rendered
    }

    /// Runs the command and waits; a non-zero exit is an `ExternalTool` error.
    pub fn run(&self) -> EnmResult<Output> {
        let logger = LogManager::new("external");
        logger.detail(&self.display());

        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|e| EnmError::ExternalTool {
                command: self.display(),
                status: "spawn failure".to_string(),
                stderr: e.to_string(),
            })?;

        if output.status.success() {
            Ok(output)
        } else {
            Err(EnmError::ExternalTool {
                command: self.display(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn quoted_arguments_render_with_quotes() {
        let cmd = ExternalCommand::new("gdal_translate")
            .args(["-of", "AAIGrid"])
            .arg("/data/with space.tif");
        assert_eq!(
            cmd.display(),
            "gdal_translate -of AAIGrid \"/data/with space.tif\""
        );
    }

    #[test]
    fn successful_exit_returns_output() {
        let output = ExternalCommand::new("sh")
            .args(["-c", "echo prepared"])
            .run()
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "prepared");
    }

    #[test]
    fn non_zero_exit_is_an_external_tool_error() {
        let err = ExternalCommand::new("sh")
            .args(["-c", "echo broken >&2; exit 3"])
            .run()
            .unwrap_err();
        match err {
            EnmError::ExternalTool { stderr, .. } => assert_eq!(stderr, "broken"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_program_is_an_external_tool_error() {
        let result = ExternalCommand::new("/nonexistent/enm-tool").run();
        assert!(matches!(result, Err(EnmError::ExternalTool { .. })));
    }
}

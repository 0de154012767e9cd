use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::external::ExternalCommand;
use crate::prelude::EnmResult;
use crate::telemetry::LogManager;

/// Flags passed to every model run between the jar and the file arguments.
const FIXED_FLAGS: [&str; 7] = [
    "visible=false",
    "autorun",
    "-P",
    "-J",
    "writeplotdata",
    "applythresholdrule=Equal training sensitivity and specificity",
    "removeduplicates=false",
];

/// Where the modeling tool lives and how much heap it may take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvokerConfig {
    pub java: PathBuf,
    pub jar: PathBuf,
    pub max_heap_mb: u32,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            java: PathBuf::from("java"),
            jar: PathBuf::from("libraries/maxent.jar"),
            max_heap_mb: 1024,
        }
    }
}

/// Runs the modeling tool over a samples file and a directory of prepared
/// grids, blocking until it exits.
pub struct ModelInvoker {
    config: InvokerConfig,
    logger: LogManager,
}

impl ModelInvoker {
    pub fn new(config: InvokerConfig) -> Self {
        Self {
            config,
            logger: LogManager::new("model"),
        }
    }

    pub fn config(&self) -> &InvokerConfig {
        &self.config
    }

    pub fn command_args(&self, samples: &Path, env_dir: &Path, output_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            format!("-Xmx{}m", self.config.max_heap_mb).into(),
            "-jar".into(),
            self.config.jar.clone().into_os_string(),
        ];
        args.extend(FIXED_FLAGS.iter().map(OsString::from));
        for (flag, path) in [("-s", samples), ("-e", env_dir), ("-o", output_dir)] {
            args.push(flag.into());
            args.push(path.as_os_str().to_os_string());
        }
        args
    }

    pub fn command(&self, samples: &Path, env_dir: &Path, output_dir: &Path) -> ExternalCommand {
        ExternalCommand::new(&self.config.java).args(self.command_args(samples, env_dir, output_dir))
    }

    pub fn run(&self, samples: &Path, env_dir: &Path, output_dir: &Path) -> EnmResult<()> {
        self.logger.record(&format!(
            "running {} on {}",
            self.config.jar.display(),
            samples.display()
        ));
        self.command(samples, env_dir, output_dir).run()?;
        self.logger
            .record(&format!("model output written to {}", output_dir.display()));
        Ok(())
    }
}

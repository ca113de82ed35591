//! External program entry points
//!
//! Runs an extension as a child process inside its isolated context. The
//! child is killed when the context asks it to stop.

use crate::isolation::{EntryPoint, ExtensionContext};
use anyhow::Context;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info};

/// Environment variable carrying the application name
pub const ENV_APPLICATION_NAME: &str = "KEEL_APPLICATION_NAME";
/// Environment variable carrying the extension identifier
pub const ENV_EXTENSION: &str = "KEEL_EXTENSION";
/// Environment variable carrying the base path
pub const ENV_BASE_PATH: &str = "KEEL_BASE_PATH";

/// Entry point running an external program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessEntry {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl EntryPoint for ProcessEntry {
    async fn run(&self, mut ctx: ExtensionContext) -> anyhow::Result<()> {
        let extension = ctx.extension().to_string();
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(ctx.base_path())
            .env(ENV_APPLICATION_NAME, ctx.application_name())
            .env(ENV_EXTENSION, &extension)
            .env(ENV_BASE_PATH, ctx.base_path())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start {:?} for {}", self.program, extension))?;

        debug!("Extension {} running as pid {:?}", extension, child.id());

        let exited = tokio::select! {
            status = child.wait() => Some(status),
            _ = ctx.shutdown_requested() => None,
        };

        match exited {
            Some(status) => {
                let status = status.context("Failed to wait for extension process")?;
                if !status.success() {
                    anyhow::bail!("Extension {} exited with {}", extension, status);
                }
                info!("Extension {} exited", extension);
            }
            None => {
                child.kill().await.context("Failed to kill extension process")?;
                info!("Extension {} stopped", extension);
            }
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::isolation::{ContextConfig, IsolatedContext, TeardownOutcome};
    use std::sync::Arc;
    use std::time::Duration;

    fn config() -> ContextConfig {
        ContextConfig {
            base_path: std::env::temp_dir(),
            shutdown_grace: Duration::from_secs(5),
            ..Default::default()
        }
    }

    fn shell(script: &str) -> Arc<dyn EntryPoint> {
        Arc::new(ProcessEntry::new(
            "/bin/sh",
            vec!["-c".to_string(), script.to_string()],
        ))
    }

    #[test]
    fn test_long_running_process_is_killed() {
        let context = IsolatedContext::create("sleepy", &config()).unwrap();
        let handle = context.run("sleepy", shell("sleep 30"));
        assert_eq!(context.destroy(handle), TeardownOutcome::Completed);
    }

    #[test]
    fn test_failing_process_reports_status() {
        let context = IsolatedContext::create("failing", &config()).unwrap();
        let handle = context.run("failing", shell("exit 3"));
        std::thread::sleep(Duration::from_millis(500));
        match context.destroy(handle) {
            TeardownOutcome::Failed(message) => assert!(message.contains("failing")),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_missing_program() {
        let context = IsolatedContext::create("ghost", &config()).unwrap();
        let entry: Arc<dyn EntryPoint> =
            Arc::new(ProcessEntry::new("/nonexistent/keel-ext", Vec::new()));
        let handle = context.run("ghost", entry);
        assert!(matches!(context.destroy(handle), TeardownOutcome::Failed(_)));
    }
}

//! Transform stage: hands off to the external SQL transformation tool.

use tokio::process::Command;
use tracing::{info, warn};

use crate::{Error, Result};

/// Optional external command, e.g. `dbt run --project-dir dbt`.
pub struct Transformer {
    command: Option<Vec<String>>,
}

impl Transformer {
    /// Split `command_line` on whitespace. `None` or an empty string disables
    /// the transform.
    pub fn new(command_line: Option<&str>) -> Self {
        let command = command_line
            .map(|line| line.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|parts| !parts.is_empty());
        Self { command }
    }

    pub async fn transform(&self) -> Result<()> {
        let Some((program, args)) = self.command.as_ref().and_then(|c| c.split_first()) else {
            warn!("No transform command configured, skipping transformation");
            return Ok(());
        };

        info!("Running transform: {} {}", program, args.join(" "));
        let status = Command::new(program)
            .args(args)
            .status()
            .await
            .map_err(|e| Error::Transform(format!("failed to start {}: {}", program, e)))?;

        if !status.success() {
            return Err(Error::Transform(format!("{} exited with {}", program, status)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unset_command_is_skipped() {
        Transformer::new(None).transform().await.unwrap();
        Transformer::new(Some("   ")).transform().await.unwrap();
    }

    #[tokio::test]
    async fn missing_program_fails() {
        let err = Transformer::new(Some("medlens-definitely-not-installed --flag"))
            .transform()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transform(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_status_is_checked() {
        Transformer::new(Some("true")).transform().await.unwrap();
        let err = Transformer::new(Some("false")).transform().await.unwrap_err();
        assert!(matches!(err, Error::Transform(_)));
    }
}

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use super::{DatabaseForker, ForkResult};

/// Forks a database service through the `tiger` CLI.
#[derive(Default)]
pub struct TigerForker;

#[async_trait]
impl DatabaseForker for TigerForker {
    async fn fork(&self, branch: &str, service_id: &str) -> Result<ForkResult> {
        tracing::info!("Forking database service {} for {}", service_id, branch);
        let output = Command::new("tiger")
            .args(["service", "fork", service_id, "--now", "--name", branch])
            .args(["--wait", "--output", "json", "--with-password"])
            .output()
            .await
            .map_err(|e| anyhow!("Failed to run tiger CLI: {}", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("Database fork failed: {}", stderr.trim());
        }

        parse_fork_output(&output.stdout)
    }
}

pub(crate) fn parse_fork_output(stdout: &[u8]) -> Result<ForkResult> {
    let value: Value = serde_json::from_slice(stdout)?;
    let field = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);

    let service_id = field("service_id").ok_or_else(|| anyhow!("fork output has no service_id"))?;
    let mut env_vars = vec![("TIGER_SERVICE_ID".to_string(), service_id.clone())];
    if let Some(url) = field("connection_string") {
        env_vars.push(("DATABASE_URL".to_string(), url));
    }

    Ok(ForkResult {
        service_id,
        env_vars,
    })
}

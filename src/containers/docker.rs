use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec};

use super::container_interface::{
    ContainerConfig, ContainerInfo, ContainerRuntimeInterface, ContainerStats,
};
use super::error::{DockerError, Result};
use super::{forward_lines, receiver_stream};

/// Keys that end an attach without stopping the container.
pub const DETACH_KEYS: &str = "ctrl-q,ctrl-q";

#[derive(Default, Clone)]
pub struct Docker;

impl Docker {
    async fn output(args: &[&str]) -> Result<std::process::Output> {
        let output = Command::new("docker").args(args).output().await?;
        Ok(output)
    }
}

#[async_trait]
impl ContainerRuntimeInterface for Docker {
    async fn is_docker_available(&self) -> bool {
        Docker::output(&["--version"])
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn is_daemon_running(&self) -> bool {
        Docker::output(&["info"])
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn image_exists_locally(&self, image: &str) -> bool {
        Docker::output(&["image", "inspect", image])
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let output = Docker::output(&["pull", image]).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DockerError::ImageNotFound(format!(
                "{}: {}",
                image,
                stderr.trim()
            )));
        }

        Ok(())
    }

    async fn run_container(&self, config: &ContainerConfig) -> Result<String> {
        let args = run_args(config);
        let output = Command::new("docker").args(&args).output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!("stderr: {}", stderr);
            return Err(match DockerError::classify(&config.name, &stderr, DockerError::CreateFailed) {
                DockerError::ImageNotFound(_) => DockerError::ImageNotFound(config.image.clone()),
                other => other,
            });
        }

        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(container_id)
    }

    async fn list_ids(&self, label: &str) -> Result<Vec<String>> {
        let filter = format!("label={}", label);
        let output = Docker::output(&["ps", "-a", "-q", "--no-trunc", "--filter", &filter]).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DockerError::classify("", &stderr, DockerError::CommandFailed));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn inspect(&self, names: &[String]) -> Result<Vec<ContainerInfo>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let mut args = vec!["inspect".to_string()];
        args.extend(names.iter().cloned());
        let output = Command::new("docker").args(&args).output().await?;

        // With several names, docker prints the ones it found and exits 1.
        if !output.stdout.iter().all(u8::is_ascii_whitespace) {
            return parse_inspect(&output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        match DockerError::classify("", &stderr, DockerError::CommandFailed) {
            DockerError::ContainerNotFound(_) => Ok(Vec::new()),
            _ if output.status.success() => Ok(Vec::new()),
            err => Err(err),
        }
    }

    async fn start_container(&self, name: &str) -> Result<()> {
        let output = Docker::output(&["start", name]).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DockerError::classify(name, &stderr, DockerError::StartFailed));
        }

        Ok(())
    }

    async fn stop_container(&self, name: &str) -> Result<()> {
        let output = Docker::output(&["stop", name]).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DockerError::classify(name, &stderr, DockerError::StopFailed));
        }

        Ok(())
    }

    async fn remove(&self, name: &str, force: bool) -> Result<()> {
        let mut args = vec!["rm"];
        if force {
            args.push("-f");
        }
        args.push(name);

        let output = Docker::output(&args).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DockerError::classify(name, &stderr, DockerError::RemoveFailed));
        }

        Ok(())
    }

    async fn commit(&self, name: &str, image: &str) -> Result<()> {
        let output = Docker::output(&["commit", name, image]).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DockerError::classify(name, &stderr, DockerError::CommandFailed));
        }

        Ok(())
    }

    async fn stats(&self, name: &str) -> Result<ContainerStats> {
        let output =
            Docker::output(&["stats", "--no-stream", "--format", "{{json .}}", name]).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DockerError::classify(name, &stderr, DockerError::CommandFailed));
        }

        parse_stats(&output.stdout)
    }

    async fn logs(&self, name: &str, follow: bool) -> Result<BoxStream<'static, String>> {
        let mut cmd = Command::new("docker");
        cmd.arg("logs");
        if follow {
            cmd.arg("-f");
        }
        cmd.arg(name)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DockerError::CommandFailed("docker logs has no stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DockerError::CommandFailed("docker logs has no stderr".to_string()))?;

        let (tx, rx) = mpsc::channel::<String>(256);
        tokio::spawn(async move {
            let out = FramedRead::new(stdout, LinesCodec::new());
            let err = FramedRead::new(stderr, LinesCodec::new());
            forward_lines(stream::select(out, err), tx).await;
            // Output finished or nobody is reading any more.
            let _ = child.kill().await;
        });

        Ok(receiver_stream(rx))
    }

    fn attach_command(&self, name: &str) -> Vec<String> {
        vec![
            "docker".to_string(),
            "attach".to_string(),
            format!("--detach-keys={}", DETACH_KEYS),
            name.to_string(),
        ]
    }

    fn exec_command(&self, name: &str, cmd: &[&str]) -> Vec<String> {
        let mut argv = vec![
            "docker".to_string(),
            "exec".to_string(),
            "-it".to_string(),
            name.to_string(),
        ];
        argv.extend(cmd.iter().map(|s| s.to_string()));
        argv
    }

    async fn run_foreground(&self, argv: &[String]) -> Result<ExitStatus> {
        let Some((program, args)) = argv.split_first() else {
            return Err(DockerError::CommandFailed("empty command".to_string()));
        };
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await?;
        Ok(status)
    }
}

pub(crate) fn run_args(config: &ContainerConfig) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        config.name.clone(),
    ];

    if config.tty {
        args.push("-it".to_string());
    }

    if !config.working_dir.is_empty() {
        args.push("-w".to_string());
        args.push(config.working_dir.clone());
    }

    for (key, value) in &config.labels {
        args.push("--label".to_string());
        args.push(format!("{}={}", key, value));
    }

    for vol in &config.volumes {
        let mut mount = format!("{}:{}", vol.host_path, vol.container_path);
        if vol.read_only {
            mount.push_str(":ro");
        }
        args.push("-v".to_string());
        args.push(mount);
    }

    for (key, value) in &config.environment {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }

    if let Some(cpu) = &config.cpu_limit {
        args.push("--cpus".to_string());
        args.push(cpu.clone());
    }

    if let Some(mem) = &config.memory_limit {
        args.push("-m".to_string());
        args.push(mem.clone());
    }

    args.push(config.image.clone());
    args.extend(config.command.iter().cloned());
    args
}

pub(crate) fn parse_inspect(stdout: &[u8]) -> Result<Vec<ContainerInfo>> {
    let out_json: Value =
        serde_json::from_slice(stdout).map_err(|e| DockerError::CommandFailed(e.to_string()))?;

    let Some(items) = out_json.as_array() else {
        return Ok(Vec::new());
    };

    let str_at = |item: &Value, pointer: &str| {
        item.pointer(pointer)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    Ok(items
        .iter()
        .map(|item| ContainerInfo {
            id: str_at(item, "/Id"),
            name: str_at(item, "/Name").trim_start_matches('/').to_string(),
            image: str_at(item, "/Config/Image"),
            labels: item
                .pointer("/Config/Labels")
                .and_then(Value::as_object)
                .map(|labels| {
                    labels
                        .iter()
                        .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                        .collect()
                })
                .unwrap_or_default(),
            state: str_at(item, "/State/Status"),
            exit_code: item
                .pointer("/State/ExitCode")
                .and_then(Value::as_i64)
                .unwrap_or(0) as i32,
            tty: item
                .pointer("/Config/Tty")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            created: chrono::DateTime::parse_from_rfc3339(&str_at(item, "/Created"))
                .ok()
                .map(|t| t.with_timezone(&chrono::Utc)),
        })
        .collect())
}

fn parse_percent(raw: &str) -> f64 {
    raw.trim().trim_end_matches('%').parse().unwrap_or(0.0)
}

pub(crate) fn parse_stats(stdout: &[u8]) -> Result<ContainerStats> {
    let line = String::from_utf8_lossy(stdout);
    let line = line.lines().next().unwrap_or_default();
    let value: Value =
        serde_json::from_str(line).map_err(|e| DockerError::CommandFailed(e.to_string()))?;

    Ok(ContainerStats {
        cpu_percent: parse_percent(value["CPUPerc"].as_str().unwrap_or_default()),
        memory_usage: value["MemUsage"].as_str().unwrap_or_default().to_string(),
        memory_percent: parse_percent(value["MemPerc"].as_str().unwrap_or_default()),
    })
}

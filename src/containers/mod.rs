pub mod container_interface;
pub mod docker;
pub mod error;

pub use container_interface::{
    ContainerConfig, ContainerInfo, ContainerRuntimeInterface, ContainerStats, VolumeMount,
};
pub use docker::Docker;

use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use tokio::sync::mpsc;

use crate::cli::truncate_id;

pub const DEFAULT_SANDBOX_IMAGE: &str = "ghcr.io/agent-sandbox/agent:latest";

/// Label carried by every container this tool owns.
pub const SESSION_LABEL: &str = "asb.session=1";

/// Images produced by `docker commit` when resuming a session.
pub const RESUME_IMAGE_REPO: &str = "asb-resume";

/// In-container working directory, for both clone and mount mode.
pub const WORK_DIR: &str = "/work";

/// Container name for a session on `branch`: `asb-<branch>-<tag>`.
///
/// `tag` disambiguates resumed sessions of the same branch.
pub fn generate_name(branch: &str, tag: &str) -> String {
    let slug: String = branch
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let slug = slug.trim_matches('-');
    let slug = truncate_id(slug, 40).trim_end_matches('-');

    format!("asb-{}-{}", slug, truncate_id(tag, 6))
}

pub fn resume_image(session_id: &str) -> String {
    format!("{}:{}", RESUME_IMAGE_REPO, truncate_id(session_id, 12))
}

/// Forward `lines` into `tx` until the source ends or fails, or until the
/// receiving side is dropped. A quiet source never keeps this alive once
/// nobody is reading.
pub async fn forward_lines<S, E>(lines: S, tx: mpsc::Sender<String>)
where
    S: Stream<Item = std::result::Result<String, E>>,
{
    let mut lines = std::pin::pin!(lines);
    loop {
        let next = tokio::select! {
            _ = tx.closed() => return,
            next = lines.next() => next,
        };
        let Some(Ok(line)) = next else { return };
        if tx.send(line).await.is_err() {
            return;
        }
    }
}

/// The reading end of a `forward_lines` channel as a stream.
pub fn receiver_stream(rx: mpsc::Receiver<String>) -> BoxStream<'static, String> {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|line| (line, rx)) }).boxed()
}

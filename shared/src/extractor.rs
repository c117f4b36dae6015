/// yt-dlp process boundary.
///
/// The fetcher and downloader only see the `Extractor` trait, so tests can
/// swap in a scripted fake. `YtDlp` is the real implementation: it spawns the
/// binary with tokio, forwards stderr to tracing and kills the child whenever
/// the caller stops waiting for it.
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{ChildStderr, Command};
use tracing::{debug, info, warn};

use crate::errors::{MediaError, MediaResult};

/// Future resolving once the streaming process has exited.
pub type ExitFuture = Pin<Box<dyn Future<Output = MediaResult<()>> + Send>>;

/// A running extraction whose stdout is read incrementally.
///
/// Dropping the stream (or its exit future) terminates the process.
pub struct OutputStream {
    pub stdout: Pin<Box<dyn AsyncRead + Send>>,
    pub exit: ExitFuture,
}

impl OutputStream {
    pub fn new(stdout: impl AsyncRead + Send + 'static, exit: ExitFuture) -> Self {
        Self {
            stdout: Box::pin(stdout),
            exit,
        }
    }
}

/// The two ways the core drives the external tool.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Run to completion and return everything written to stdout.
    async fn capture(&self, args: &[String]) -> MediaResult<Vec<u8>>;

    /// Start the process and hand back its stdout as it is produced.
    async fn spawn_stream(&self, args: &[String]) -> MediaResult<OutputStream>;
}

// ====== ARGUMENT BUILDERS ======

/// `-j` for a single URL: one JSON document on stdout.
pub fn metadata_args(page_url: &str) -> Vec<String> {
    vec![
        "-j".to_string(),
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        "--".to_string(),
        page_url.to_string(),
    ]
}

/// Stream the selected format as mp4 to stdout. `format_id` must already have
/// passed `validation::is_valid_format_id`.
pub fn download_args(page_url: &str, format_id: &str) -> Vec<String> {
    vec![
        "-f".to_string(),
        format_id.to_string(),
        "--merge-output-format".to_string(),
        "mp4".to_string(),
        "--prefer-ffmpeg".to_string(),
        "--no-mtime".to_string(),
        "--no-playlist".to_string(),
        "-o".to_string(),
        "-".to_string(),
        "--".to_string(),
        page_url.to_string(),
    ]
}

// ====== YT-DLP ======

/// Spawns the real yt-dlp binary.
#[derive(Debug, Clone)]
pub struct YtDlp {
    bin: PathBuf,
}

impl YtDlp {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

#[async_trait]
impl Extractor for YtDlp {
    async fn capture(&self, args: &[String]) -> MediaResult<Vec<u8>> {
        debug!("Running {:?} {:?}", self.bin, args);

        let output = self
            .command(args)
            .output()
            .await
            .map_err(|e| MediaError::ExtractionFailed(format!("failed to start {:?}: {}", self.bin, e)))?;

        for line in String::from_utf8_lossy(&output.stderr).lines() {
            debug!(target: "ytdlp", "{}", line);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last = stderr.lines().last().unwrap_or("").trim();
            return Err(MediaError::ExtractionFailed(format!("yt-dlp exited with {}: {}", output.status, last)));
        }
        if output.stdout.iter().all(u8::is_ascii_whitespace) {
            return Err(MediaError::ExtractionFailed("yt-dlp produced no output".to_string()));
        }

        Ok(output.stdout)
    }

    async fn spawn_stream(&self, args: &[String]) -> MediaResult<OutputStream> {
        let mut child = self
            .command(args)
            .spawn()
            .map_err(|e| MediaError::DownloadFailed(format!("failed to start {:?}: {}", self.bin, e)))?;

        info!("yt-dlp spawned (pid: {:?})", child.id());

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::DownloadFailed("no stdout handle".into()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr));
        }

        // The child moves into the exit future; dropping it kills the process.
        let exit: ExitFuture = Box::pin(async move {
            let status = child
                .wait()
                .await
                .map_err(|e| MediaError::DownloadFailed(format!("failed to wait for yt-dlp: {}", e)))?;
            if status.success() {
                Ok(())
            } else {
                Err(MediaError::DownloadFailed(format!("yt-dlp exited with {}", status)))
            }
        });

        Ok(OutputStream::new(stdout, exit))
    }
}

/// Forward the child's diagnostics to our own log, never to the client.
async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.starts_with("ERROR") => warn!(target: "ytdlp", "{}", line),
            Ok(Some(line)) => debug!(target: "ytdlp", "{}", line),
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read yt-dlp stderr: {}", e);
                break;
            }
        }
    }
    debug!("yt-dlp stderr stream ended");
}

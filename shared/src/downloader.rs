/// Streams a selected format from yt-dlp's stdout into a caller-provided sink.
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::{MediaError, MediaResult};
use crate::extractor::{download_args, Extractor, OutputStream};
use crate::validation::{is_valid_format_id, validate_page_url};

pub struct StreamDownloader {
    extractor: Arc<dyn Extractor>,
    timeout: Duration,
}

impl StreamDownloader {
    pub fn new(extractor: Arc<dyn Extractor>, timeout: Duration) -> Self {
        Self { extractor, timeout }
    }

    /// Validate the request and start yt-dlp.
    ///
    /// The format id is checked before anything else; a rejected id never
    /// reaches a process argument list.
    pub async fn open(&self, page_url: &str, format_id: &str) -> MediaResult<Download> {
        if !is_valid_format_id(format_id) {
            return Err(MediaError::InvalidFormat(format_id.to_string()));
        }
        let page_url = page_url.trim();
        if page_url.is_empty() {
            return Err(MediaError::InvalidUrl("missing page URL".to_string()));
        }
        validate_page_url(page_url)?;

        let output = self
            .extractor
            .spawn_stream(&download_args(page_url, format_id))
            .await?;

        info!("Download started: url={} format={}", page_url, format_id);
        Ok(Download {
            output,
            timeout: self.timeout,
        })
    }

    /// Open and pipe in one call.
    pub async fn stream_download<W>(
        &self,
        page_url: &str,
        format_id: &str,
        sink: &mut W,
        cancel: CancellationToken,
    ) -> MediaResult<u64>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        self.open(page_url, format_id).await?.pipe(sink, cancel).await
    }
}

/// A started download. Dropping it kills yt-dlp.
pub struct Download {
    output: OutputStream,
    timeout: Duration,
}

impl Download {
    /// Copy stdout into `sink` as it arrives, then wait for yt-dlp to exit.
    ///
    /// Bytes already written stay written on failure; the caller must treat
    /// the sink as truncated. Returns the byte count on success.
    pub async fn pipe<W>(self, sink: &mut W, cancel: CancellationToken) -> MediaResult<u64>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let Download { mut output, timeout } = self;

        let transfer = async {
            let written = tokio::io::copy(&mut output.stdout, &mut *sink)
                .await
                .map_err(|e| MediaError::DownloadFailed(format!("stream interrupted: {}", e)))?;
            sink.flush()
                .await
                .map_err(|e| MediaError::DownloadFailed(format!("flush failed: {}", e)))?;
            (&mut output.exit).await?;
            Ok(written)
        };

        let result = tokio::select! {
            res = tokio::time::timeout(timeout, transfer) => {
                res.unwrap_or(Err(MediaError::Timeout(timeout.as_secs())))
            }
            _ = cancel.cancelled() => Err(MediaError::Cancelled),
        };

        match &result {
            Ok(bytes) => info!("Download finished: {} bytes", bytes),
            Err(e) => warn!("Download aborted: {}", e),
        }
        // `output` drops here, killing the child if it is still running.
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use async_trait::async_trait;

    const URL: &str = "https://example.com/watch?v=abc";

    /// Writes scripted chunks to a pipe, then exits with the scripted status.
    struct ChunkExtractor {
        chunks: Vec<&'static str>,
        exit_ok: bool,
        hang: bool,
        calls: AtomicUsize,
        last_args: Mutex<Vec<String>>,
    }

    impl ChunkExtractor {
        fn new(chunks: &[&'static str], exit_ok: bool) -> Arc<Self> {
            Arc::new(Self {
                chunks: chunks.to_vec(),
                exit_ok,
                hang: false,
                calls: AtomicUsize::new(0),
                last_args: Mutex::new(Vec::new()),
            })
        }

        fn hanging() -> Arc<Self> {
            Arc::new(Self {
                chunks: vec!["head"],
                exit_ok: true,
                hang: true,
                calls: AtomicUsize::new(0),
                last_args: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Extractor for ChunkExtractor {
        async fn capture(&self, _args: &[String]) -> MediaResult<Vec<u8>> {
            unreachable!("download path never captures")
        }

        async fn spawn_stream(&self, args: &[String]) -> MediaResult<OutputStream> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_args.lock().unwrap() = args.to_vec();

            let (mut writer, reader) = tokio::io::duplex(16);
            let chunks = self.chunks.clone();
            let hang = self.hang;
            let producer = tokio::spawn(async move {
                for chunk in chunks {
                    writer.write_all(chunk.as_bytes()).await.ok();
                }
                if hang {
                    std::future::pending::<()>().await;
                }
            });

            let exit_ok = self.exit_ok;
            let exit = Box::pin(async move {
                producer.await.ok();
                if exit_ok {
                    Ok(())
                } else {
                    Err(MediaError::DownloadFailed("yt-dlp exited with exit status: 1".into()))
                }
            });
            Ok(OutputStream::new(reader, exit))
        }
    }

    fn downloader(tool: Arc<ChunkExtractor>) -> StreamDownloader {
        StreamDownloader::new(tool, Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_chunks_arrive_in_order() {
        let tool = ChunkExtractor::new(&["first-", "second-", "third"], true);
        let mut sink = Vec::new();

        let written = downloader(tool.clone())
            .stream_download(URL, "18", &mut sink, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(sink, b"first-second-third");
        assert_eq!(written, 18);
        assert_eq!(tool.calls(), 1);

        let args = tool.last_args.lock().unwrap().clone();
        assert_eq!(args[..2], ["-f".to_string(), "18".to_string()]);
        assert_eq!(args.last().map(String::as_str), Some(URL));
    }

    #[tokio::test]
    async fn test_injection_rejected_before_spawn() {
        let tool = ChunkExtractor::new(&["x"], true);
        let mut sink = Vec::new();

        for bad in ["18; evil", "18 && echo hi", ""] {
            let err = downloader(tool.clone())
                .stream_download(URL, bad, &mut sink, CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, MediaError::InvalidFormat(_)));
        }
        assert_eq!(tool.calls(), 0);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_padded_url_trimmed_before_spawn() {
        let tool = ChunkExtractor::new(&["ok"], true);
        let mut sink = Vec::new();

        downloader(tool.clone())
            .stream_download(&format!(" {}\t", URL), "18", &mut sink, CancellationToken::new())
            .await
            .unwrap();

        let args = tool.last_args.lock().unwrap().clone();
        assert_eq!(args.last().map(String::as_str), Some(URL));
        assert_eq!(sink, b"ok");
    }

    #[tokio::test]
    async fn test_missing_or_bad_url_rejected() {
        let tool = ChunkExtractor::new(&["x"], true);
        let d = downloader(tool.clone());

        assert!(matches!(d.open("", "18").await.err(), Some(MediaError::InvalidUrl(_))));
        assert!(matches!(d.open("-o/etc/x", "18").await.err(), Some(MediaError::InvalidUrl(_))));
        assert_eq!(tool.calls(), 0);
    }

    #[tokio::test]
    async fn test_nonzero_exit_leaves_partial_output() {
        let tool = ChunkExtractor::new(&["partial"], false);
        let mut sink = Vec::new();

        let err = downloader(tool)
            .stream_download(URL, "18", &mut sink, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::DownloadFailed(_)));
        assert_eq!(sink, b"partial");
    }

    #[tokio::test]
    async fn test_cancel_stops_hung_download() {
        let tool = ChunkExtractor::hanging();
        let mut sink = Vec::new();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = downloader(tool)
            .stream_download(URL, "18", &mut sink, cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Cancelled));
        assert_eq!(sink, b"head");
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_download_times_out() {
        let tool = ChunkExtractor::hanging();
        let mut sink = Vec::new();

        let err = StreamDownloader::new(tool, Duration::from_secs(2))
            .stream_download(URL, "18", &mut sink, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Timeout(2)));
    }
}

//! Feed download.
//!
//! [`FeedFetcher`] is the capability the orchestrator uses to get the raw CSV
//! bytes; [`HttpFetcher`] implements it with reqwest, bounded by a timeout and
//! a body size cap. The cap is checked against `Content-Length` and again while
//! the body streams in, so a chunked response stops downloading once it
//! crosses the limit.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::FetchError;

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default body size cap (10 MiB)
pub const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;

/// Downloads a feed body.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError>;
}

/// HTTP(S) fetcher.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_bytes: usize,
}

impl HttpFetcher {
    /// Create a fetcher with the given timeout and body cap.
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("hreflang-connect/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Request(e.to_string()))?;

        Ok(Self {
            client,
            timeout,
            max_bytes,
        })
    }

    fn map_error(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout.as_secs())
        } else {
            FetchError::Request(e.to_string())
        }
    }
}

#[async_trait]
impl FeedFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        if let Some(len) = response.content_length() {
            if len > self.max_bytes as u64 {
                return Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                });
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.map_error(e))? {
            if body.len() + chunk.len() > self.max_bytes {
                debug!(%url, received = body.len(), "feed body over the size cap, download aborted");
                return Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        debug!(%url, bytes = body.len(), "feed downloaded");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one raw HTTP response on a local port and return the feed URL.
    async fn serve_once(head: &'static str, chunks: Vec<Vec<u8>>) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            // The client may hang up once it has seen enough.
            for chunk in chunks {
                if socket.write_all(&chunk).await.is_err() {
                    return;
                }
            }
        });

        Url::parse(&format!("http://{}/feed.csv", addr)).unwrap()
    }

    fn chunked(parts: &[&[u8]]) -> Vec<Vec<u8>> {
        let mut out: Vec<Vec<u8>> = parts
            .iter()
            .map(|part| {
                let mut chunk = format!("{:x}\r\n", part.len()).into_bytes();
                chunk.extend_from_slice(part);
                chunk.extend_from_slice(b"\r\n");
                chunk
            })
            .collect();
        out.push(b"0\r\n\r\n".to_vec());
        out
    }

    const CHUNKED_HEAD: &str = "HTTP/1.1 200 OK\r\nContent-Type: text/csv\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n";

    #[test]
    fn test_build_fetcher() {
        let fetcher = HttpFetcher::new(Duration::from_secs(5), DEFAULT_MAX_BYTES).unwrap();
        assert_eq!(fetcher.timeout, Duration::from_secs(5));
        assert_eq!(fetcher.max_bytes, DEFAULT_MAX_BYTES);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_request_error() {
        let fetcher = HttpFetcher::new(Duration::from_secs(2), DEFAULT_MAX_BYTES).unwrap();
        // Port 9 (discard) on localhost is closed in test environments.
        let url = Url::parse("http://127.0.0.1:9/feed.csv").unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Request(_) | FetchError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_chunked_body_over_cap_rejected() {
        let part = vec![b'x'; 64];
        let parts: Vec<&[u8]> = (0..8).map(|_| part.as_slice()).collect();
        let url = serve_once(CHUNKED_HEAD, chunked(&parts)).await;
        let fetcher = HttpFetcher::new(Duration::from_secs(5), 100).unwrap();

        let err = fetcher.fetch(&url).await.unwrap_err();

        assert!(matches!(err, FetchError::TooLarge { limit: 100 }));
    }

    #[tokio::test]
    async fn test_declared_length_over_cap_rejected() {
        let head = "HTTP/1.1 200 OK\r\nContent-Length: 5000\r\nConnection: close\r\n\r\n";
        let url = serve_once(head, vec![vec![b'x'; 16]]).await;
        let fetcher = HttpFetcher::new(Duration::from_secs(5), 100).unwrap();

        let err = fetcher.fetch(&url).await.unwrap_err();

        assert!(matches!(err, FetchError::TooLarge { limit: 100 }));
    }

    #[tokio::test]
    async fn test_chunked_body_within_cap() {
        let url = serve_once(CHUNKED_HEAD, chunked(&[&b"X,en\n"[..], &b"https://a/,https://b/\n"[..]])).await;
        let fetcher = HttpFetcher::new(Duration::from_secs(5), 100).unwrap();

        let body = fetcher.fetch(&url).await.unwrap();

        assert_eq!(body, b"X,en\nhttps://a/,https://b/\n");
    }

    #[tokio::test]
    async fn test_error_status() {
        let head = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
        let url = serve_once(head, Vec::new()).await;
        let fetcher = HttpFetcher::new(Duration::from_secs(5), 100).unwrap();

        assert!(matches!(fetcher.fetch(&url).await, Err(FetchError::Status(404))));
    }
}

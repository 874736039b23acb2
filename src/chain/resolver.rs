//! Registration file resolution from a `tokenURI`.
//!
//! The URI is classified once into a [`RegistrationUri`] and dispatched on
//! that variant. Resolution is best-effort: every failure (bad encoding,
//! timeout, non-2xx status, non-JSON body, unsupported scheme) yields
//! `None`, because an agent may legitimately have nothing resolvable yet.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use url::Url;

/// Upper bound on a fetched registration body.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Classified `tokenURI`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationUri {
    /// `data:<mime>;base64,<payload>`; holds the still-encoded payload.
    DataBase64(String),
    /// `data:<mime>,<percent-encoded payload>`.
    DataInline(String),
    /// `ipfs://<cid>[/path]`, rewritten to an HTTP gateway URL.
    ContentAddressed { cid_path: String, gateway_url: Url },
    /// Plain `http(s)://` URL.
    Http(Url),
    /// Anything else, including the empty string.
    Unsupported(String),
}

impl RegistrationUri {
    /// Classify `uri`, rewriting `ipfs://` through `gateway`.
    pub fn parse(uri: &str, gateway: &Url) -> Self {
        let uri = uri.trim();

        if let Some(rest) = uri.strip_prefix("data:") {
            return match rest.split_once(',') {
                Some((meta, payload)) if meta.ends_with(";base64") => {
                    Self::DataBase64(payload.to_string())
                }
                Some((_, payload)) => Self::DataInline(payload.to_string()),
                None => Self::Unsupported(uri.to_string()),
            };
        }

        if let Some(cid_path) = uri.strip_prefix("ipfs://") {
            let cid_path = cid_path.trim_start_matches("ipfs/").to_string();
            return match gateway.join(&cid_path) {
                Ok(gateway_url) => Self::ContentAddressed {
                    cid_path,
                    gateway_url,
                },
                Err(_) => Self::Unsupported(uri.to_string()),
            };
        }

        match Url::parse(uri) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Self::Http(url),
            _ => Self::Unsupported(uri.to_string()),
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DataBase64(_) => "data-base64",
            Self::DataInline(_) => "data-inline",
            Self::ContentAddressed { .. } => "ipfs",
            Self::Http(_) => "http",
            Self::Unsupported(_) => "unsupported",
        }
    }
}

/// Fetches registration files with a bounded timeout.
#[derive(Clone)]
pub struct RegistrationFetcher {
    http: reqwest::Client,
    gateway: Url,
    timeout: Duration,
}

impl RegistrationFetcher {
    pub fn new(timeout: Duration, gateway: Url) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });
        Self {
            http,
            gateway,
            timeout,
        }
    }

    /// Resolve a `tokenURI` to its JSON body, or `None` on any failure.
    pub async fn fetch(&self, uri: &str) -> Option<serde_json::Value> {
        let parsed = RegistrationUri::parse(uri, &self.gateway);
        tracing::debug!("Resolving registration URI ({})", parsed.kind());

        match parsed {
            RegistrationUri::DataBase64(payload) => {
                let bytes = STANDARD
                    .decode(payload.trim())
                    .inspect_err(|e| tracing::warn!("Bad base64 registration payload: {}", e))
                    .ok()?;
                parse_json(&bytes)
            }
            RegistrationUri::DataInline(payload) => {
                let decoded = urlencoding::decode(&payload)
                    .inspect_err(|e| tracing::warn!("Bad percent-encoded payload: {}", e))
                    .ok()?;
                parse_json(decoded.as_bytes())
            }
            RegistrationUri::ContentAddressed { gateway_url, .. } => {
                self.fetch_http(gateway_url).await
            }
            RegistrationUri::Http(url) => self.fetch_http(url).await,
            RegistrationUri::Unsupported(raw) => {
                tracing::debug!("Unsupported registration URI: {}", raw);
                None
            }
        }
    }

    async fn fetch_http(&self, url: Url) -> Option<serde_json::Value> {
        // Per-request timeout also bounds the fallback client.
        let request = self.http.get(url.clone()).timeout(self.timeout);
        let mut response = match request.send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                tracing::warn!("Registration fetch timed out: {}", url);
                return None;
            }
            Err(e) => {
                tracing::warn!("Registration fetch failed for {}: {}", url, e);
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::warn!("Registration fetch {} returned {}", url, response.status());
            return None;
        }

        if let Some(len) = response.content_length()
            && len > MAX_BODY_BYTES as u64
        {
            tracing::warn!("Registration body too large ({} bytes)", len);
            return None;
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .inspect_err(|e| tracing::warn!("Failed reading registration body: {}", e))
            .ok()?
        {
            if body.len() + chunk.len() > MAX_BODY_BYTES {
                tracing::warn!("Registration body exceeds {} bytes", MAX_BODY_BYTES);
                return None;
            }
            body.extend_from_slice(&chunk);
        }
        parse_json(&body)
    }
}

fn parse_json(bytes: &[u8]) -> Option<serde_json::Value> {
    serde_json::from_slice::<serde_json::Value>(bytes)
        .inspect_err(|e| tracing::warn!("Registration file is not JSON: {}", e))
        .ok()
        .filter(serde_json::Value::is_object)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> Url {
        Url::parse("https://ipfs.io/ipfs/").unwrap()
    }

    fn fetcher() -> RegistrationFetcher {
        RegistrationFetcher::new(Duration::from_secs(1), gateway())
    }

    #[test]
    fn classifies_schemes() {
        let gw = gateway();
        assert_eq!(
            RegistrationUri::parse("data:application/json;base64,e30=", &gw),
            RegistrationUri::DataBase64("e30=".to_string())
        );
        assert_eq!(
            RegistrationUri::parse("data:application/json,%7B%7D", &gw),
            RegistrationUri::DataInline("%7B%7D".to_string())
        );
        assert_eq!(
            RegistrationUri::parse("ipfs://bafyabc/agent.json", &gw),
            RegistrationUri::ContentAddressed {
                cid_path: "bafyabc/agent.json".to_string(),
                gateway_url: Url::parse("https://ipfs.io/ipfs/bafyabc/agent.json").unwrap(),
            }
        );
        assert!(matches!(
            RegistrationUri::parse("https://example.com/a.json", &gw),
            RegistrationUri::Http(_)
        ));
        assert!(matches!(
            RegistrationUri::parse("ar://abc", &gw),
            RegistrationUri::Unsupported(_)
        ));
        assert!(matches!(
            RegistrationUri::parse("", &gw),
            RegistrationUri::Unsupported(_)
        ));
        assert!(matches!(
            RegistrationUri::parse("data:no-comma", &gw),
            RegistrationUri::Unsupported(_)
        ));
    }

    #[tokio::test]
    async fn resolves_base64_data_uri() {
        let uri = format!(
            "data:application/json;base64,{}",
            STANDARD.encode(br#"{"name":"Frack"}"#)
        );
        let value = fetcher().fetch(&uri).await.unwrap();
        assert_eq!(value["name"], "Frack");
    }

    #[tokio::test]
    async fn resolves_percent_encoded_data_uri() {
        let uri = "data:application/json,%7B%22name%22%3A%22Frick%22%7D";
        let value = fetcher().fetch(uri).await.unwrap();
        assert_eq!(value["name"], "Frick");
    }

    #[tokio::test]
    async fn malformed_payloads_resolve_to_none() {
        let f = fetcher();
        assert!(f.fetch("data:application/json;base64,!!!").await.is_none());
        assert!(f.fetch("data:application/json,not%20json").await.is_none());
        assert!(f.fetch("data:application/json,%5B1%2C2%5D").await.is_none());
        assert!(f.fetch("ftp://example.com/agent.json").await.is_none());
    }

    /// Serve one canned HTTP response per connection.
    async fn serve(response: Vec<u8>) -> std::net::SocketAddr {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let response = response.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let _ = socket.write_all(&response).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        addr
    }

    fn json_response(body: &str) -> Vec<u8> {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
        .into_bytes()
    }

    #[tokio::test]
    async fn resolves_http_and_gateway_uris() {
        let addr = serve(json_response(r#"{"name":"Frack"}"#)).await;

        let value = fetcher()
            .fetch(&format!("http://{addr}/agent.json"))
            .await
            .unwrap();
        assert_eq!(value["name"], "Frack");

        let gateway = Url::parse(&format!("http://{addr}/ipfs/")).unwrap();
        let via_gateway = RegistrationFetcher::new(Duration::from_secs(2), gateway);
        let value = via_gateway.fetch("ipfs://bafyabc/agent.json").await.unwrap();
        assert_eq!(value["name"], "Frack");
    }

    #[tokio::test]
    async fn silent_server_resolves_to_none_within_timeout() {
        let addr = crate::chain::client::mock::silent_peer().await;
        let f = RegistrationFetcher::new(Duration::from_millis(300), gateway());

        let started = std::time::Instant::now();
        assert!(f.fetch(&format!("http://{addr}/agent.json")).await.is_none());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        // Valid JSON once the padding is skipped, so only the cap can refuse it.
        let mut body = vec![b' '; MAX_BODY_BYTES + 16];
        body.extend_from_slice(b"{}");
        let mut response =
            b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n"
                .to_vec();
        response.extend_from_slice(&body);
        let streamed = serve(response).await;
        assert!(fetcher().fetch(&format!("http://{streamed}/a.json")).await.is_none());

        let declared = serve(
            b"HTTP/1.1 200 OK\r\nContent-Length: 2000000\r\nConnection: close\r\n\r\n{}".to_vec(),
        )
        .await;
        assert!(fetcher().fetch(&format!("http://{declared}/a.json")).await.is_none());
    }

    #[tokio::test]
    async fn unreachable_http_resolves_to_none() {
        // Port 9 (discard) on localhost is closed in test environments.
        let f = RegistrationFetcher::new(Duration::from_millis(500), gateway());
        assert!(f.fetch("http://127.0.0.1:9/agent.json").await.is_none());
    }
}

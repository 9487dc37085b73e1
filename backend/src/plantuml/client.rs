use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Header carrying the syntax error message on a failed render.
pub const ERROR_HEADER: &str = "x-plantuml-diagram-error";
/// Header carrying the 1-based line of the syntax error.
pub const ERROR_LINE_HEADER: &str = "x-plantuml-diagram-error-line";

/// Image formats the rendering server produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Svg,
    Png,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Png => "png",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Svg => "image/svg+xml",
            Self::Png => "image/png",
        }
    }
}

/// Syntax error reported by the rendering server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    /// 1-based line as reported by the server, before any clamping.
    pub line: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid,
    Invalid(SyntaxError),
}

#[derive(Debug, Clone)]
pub struct RenderedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Clone)]
pub enum RenderOutcome {
    Image(RenderedImage),
    SyntaxError(SyntaxError),
}

/// HTTP client for a PlantUML rendering server
#[derive(Clone, Debug)]
pub struct PlantUmlClient {
    base_url: String,
    client: Client,
}

impl PlantUmlClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }


    /// Public URL of a rendered diagram.
    pub fn diagram_url(&self, format: OutputFormat, encoded: &str) -> String {
        format!("{}/{}/{}", self.base_url, format.as_str(), encoded)
    }

    /// Fetch a rendered diagram.
    ///
    /// A syntax error is a successful outcome; only failing to talk to the
    /// server (or an unexpected HTTP status) is an `Err`.
    pub async fn render(&self, format: OutputFormat, encoded: &str) -> Result<RenderOutcome> {
        let url = self.diagram_url(format, encoded);
        debug!("Fetching {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to reach PlantUML server")?;

        if let Some(error) = syntax_error(response.headers()) {
            return Ok(RenderOutcome::SyntaxError(error));
        }

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("PlantUML server returned HTTP {}", status);
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(format.mime_type())
            .to_string();
        let bytes = response
            .bytes()
            .await
            .context("Failed to read PlantUML response")?;

        Ok(RenderOutcome::Image(RenderedImage {
            bytes: bytes.to_vec(),
            content_type,
        }))
    }

    /// Ask the server whether an encoded diagram parses.
    pub async fn validate(&self, encoded: &str) -> Result<Validation> {
        match self.render(OutputFormat::Svg, encoded).await? {
            RenderOutcome::Image(_) => Ok(Validation::Valid),
            RenderOutcome::SyntaxError(error) => Ok(Validation::Invalid(error)),
        }
    }
}

fn syntax_error(headers: &reqwest::header::HeaderMap) -> Option<SyntaxError> {
    let message = headers.get(ERROR_HEADER)?.to_str().ok()?.trim().to_string();
    let line = headers
        .get(ERROR_LINE_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok());
    Some(SyntaxError { message, line })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::get,
        Router,
    };

    async fn spawn_server(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn builds_urls_without_double_slash() {
        let client = PlantUmlClient::new("http://localhost:8080/plantuml/", Duration::from_secs(1))
            .unwrap();
        assert_eq!(
            client.diagram_url(OutputFormat::Png, "abc"),
            "http://localhost:8080/plantuml/png/abc"
        );
    }

    #[tokio::test]
    async fn reads_syntax_error_headers() {
        let router = Router::new().route(
            "/svg/{encoded}",
            get(|| async {
                let mut headers = HeaderMap::new();
                headers.insert(ERROR_HEADER, "Syntax Error?".parse().unwrap());
                headers.insert(ERROR_LINE_HEADER, "2".parse().unwrap());
                (StatusCode::BAD_REQUEST, headers, "<svg/>").into_response()
            }),
        );
        let client = PlantUmlClient::new(spawn_server(router).await, Duration::from_secs(5))
            .unwrap();

        let validation = client.validate("abc").await.unwrap();
        assert_eq!(
            validation,
            Validation::Invalid(SyntaxError {
                message: "Syntax Error?".to_string(),
                line: Some(2),
            })
        );
    }

    #[tokio::test]
    async fn returns_image_bytes() {
        let router = Router::new().route(
            "/png/{encoded}",
            get(|| async { ([("content-type", "image/png")], vec![0x89u8, b'P', b'N', b'G']) }),
        );
        let client = PlantUmlClient::new(spawn_server(router).await, Duration::from_secs(5))
            .unwrap();

        match client.render(OutputFormat::Png, "abc").await.unwrap() {
            RenderOutcome::Image(image) => {
                assert_eq!(image.content_type, "image/png");
                assert_eq!(image.bytes, vec![0x89, b'P', b'N', b'G']);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn unexpected_status_is_an_error() {
        let router = Router::new().route(
            "/svg/{encoded}",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let client = PlantUmlClient::new(spawn_server(router).await, Duration::from_secs(5))
            .unwrap();

        assert!(client.validate("abc").await.is_err());
    }

    #[tokio::test]
    async fn unreachable_server_is_an_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = PlantUmlClient::new(format!("http://{}", addr), Duration::from_secs(2))
            .unwrap();
        assert!(client.render(OutputFormat::Svg, "abc").await.is_err());
    }
}

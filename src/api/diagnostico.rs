// Diagnosis submission
// POST {base}/api/diagnostico with the lead record and the full answer set

use async_trait::async_trait;
use log::{info, warn};
use std::time::Duration;

use crate::models::DiagnosticoRequest;

/// Shown in the questionnaire banner whenever a submission fails.
pub const SUBMISSION_ERROR_MESSAGE: &str =
    "Ocurrió un error al procesar el diagnóstico. Por favor, inténtalo de nuevo más tarde.";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("diagnosis endpoint answered HTTP {0}")]
    Status(u16),
    #[error("diagnosis request failed: {0}")]
    Transport(String),
    #[error("could not build HTTP client: {0}")]
    Client(String),
}

impl SubmissionError {
    /// All failure kinds collapse to one message for the visitor.
    pub fn user_message(&self) -> &'static str {
        SUBMISSION_ERROR_MESSAGE
    }
}

/// Sends a finished diagnosis to the backend.
/// Production code uses HttpSubmitter; tests use in-memory fakes.
#[async_trait]
pub trait DiagnosisSubmitter: Send + Sync {
    /// Exactly one attempt. Ok only on a 2xx answer.
    async fn submit(&self, request: &DiagnosticoRequest) -> Result<(), SubmissionError>;
}

pub struct HttpSubmitter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSubmitter {
    pub fn new(api_base_url: &str, timeout: Duration) -> Result<Self, SubmissionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SubmissionError::Client(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint_url(api_base_url),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

pub fn endpoint_url(api_base_url: &str) -> String {
    format!("{}/api/diagnostico", api_base_url.trim_end_matches('/'))
}

#[async_trait]
impl DiagnosisSubmitter for HttpSubmitter {
    async fn submit(&self, request: &DiagnosticoRequest) -> Result<(), SubmissionError> {
        info!(
            "[PHASE: submission] [STEP: post] Sending diagnosis to {} ({} answers)",
            self.endpoint,
            request.respuestas.len()
        );

        let resp = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                warn!("[PHASE: submission] [STEP: post] Transport error: {}", e);
                SubmissionError::Transport(e.to_string())
            })?;

        let status = resp.status();
        if !status.is_success() {
            warn!(
                "[PHASE: submission] [STEP: post] Endpoint rejected diagnosis: HTTP {}",
                status
            );
            return Err(SubmissionError::Status(status.as_u16()));
        }

        info!("[PHASE: submission] [STEP: post] Diagnosis accepted (HTTP {})", status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Answer, AnswerSet, CompanyData, CompanyType};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn request() -> DiagnosticoRequest {
        let company = CompanyData {
            nombre: "Ana".to_string(),
            email: "ana@acme.com".to_string(),
            telefono: "999".to_string(),
            empresa: "Acme".to_string(),
            cargo: "Gerente".to_string(),
            numero_trabajadores: 5,
            tipo_empresa: CompanyType::Micro,
        };
        let mut answers = AnswerSet::new();
        answers.record("reglamento", Answer::No);
        DiagnosticoRequest::new(&company, &answers)
    }

    /// One-shot HTTP server answering with `status_line`. Returns base URL and the raw request.
    async fn serve_once(status_line: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                if request_complete(&raw) {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                status_line
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&raw).to_string()
        });
        (format!("http://{}/", addr), handle)
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let length = text[..header_end]
            .lines()
            .find_map(|l| {
                let (k, v) = l.split_once(':')?;
                k.eq_ignore_ascii_case("content-length")
                    .then(|| v.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        raw.len() >= header_end + 4 + length
    }

    #[test]
    fn endpoint_strips_trailing_slashes() {
        assert_eq!(
            endpoint_url("http://localhost:8000/"),
            "http://localhost:8000/api/diagnostico"
        );
        let submitter =
            HttpSubmitter::new("http://localhost:8000//", Duration::from_secs(1)).unwrap();
        assert_eq!(submitter.endpoint(), "http://localhost:8000/api/diagnostico");
        assert_eq!(
            endpoint_url("https://api.example.com"),
            "https://api.example.com/api/diagnostico"
        );
    }

    #[tokio::test]
    async fn success_status_posts_json_body() {
        let (base, server) = serve_once("200 OK").await;
        let submitter = HttpSubmitter::new(&base, Duration::from_secs(5)).unwrap();
        assert!(submitter.submit(&request()).await.is_ok());

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /api/diagnostico"), "got: {}", raw);
        assert!(raw.contains("\"tipo_empresa\":\"micro\""), "got: {}", raw);
        assert!(raw.contains("\"respuestas\":{\"reglamento\":\"no\"}"), "got: {}", raw);
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let (base, server) = serve_once("500 Internal Server Error").await;
        let submitter = HttpSubmitter::new(&base, Duration::from_secs(5)).unwrap();
        let err = submitter.submit(&request()).await.unwrap_err();
        assert_eq!(err, SubmissionError::Status(500));
        assert_eq!(err.user_message(), SUBMISSION_ERROR_MESSAGE);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn refused_connection_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let submitter =
            HttpSubmitter::new(&format!("http://{}", addr), Duration::from_secs(5)).unwrap();
        let err = submitter.submit(&request()).await.unwrap_err();
        assert!(
            matches!(err, SubmissionError::Transport(_)),
            "unexpected error: {:?}",
            err
        );
    }
}

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

const POSTMARK_API_URL: &str = "https://api.postmarkapp.com";
const SEND_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),
    #[error("no recipients provided")]
    NoRecipients,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("postmark rejected the message ({code}): {message}")]
    Api { code: u16, message: String },
}

impl NotifyError {
    /// Whether a retry could plausibly succeed. Network faults, rate limits
    /// and server errors qualify; a rejected payload or bad token does not.
    pub fn is_retryable(&self) -> bool {
        match self {
            NotifyError::Http(err) => {
                err.is_timeout() || err.is_connect() || err.is_request()
            }
            NotifyError::Api { code, .. } => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SendEmailParams {
    pub subject: String,
    pub html_body: String,
    /// Falls back to DEFAULT_FROM_EMAIL when unset.
    pub from: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub tag: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SendReceipt {
    pub message_id: String,
    pub submitted_at: String,
}

#[derive(Serialize)]
struct OutboundPayload<'a> {
    #[serde(rename = "From")]
    from: &'a str,
    #[serde(rename = "To")]
    to: String,
    #[serde(rename = "Cc", skip_serializing_if = "Option::is_none")]
    cc: Option<String>,
    #[serde(rename = "Bcc", skip_serializing_if = "Option::is_none")]
    bcc: Option<String>,
    #[serde(rename = "Subject")]
    subject: &'a str,
    #[serde(rename = "HtmlBody")]
    html_body: &'a str,
    #[serde(rename = "Tag", skip_serializing_if = "Option::is_none")]
    tag: Option<&'a str>,
    #[serde(rename = "MessageStream")]
    message_stream: &'a str,
}

#[derive(Debug, Deserialize)]
struct OutboundResponse {
    #[serde(rename = "MessageID", default)]
    message_id: Option<String>,
    #[serde(rename = "SubmittedAt", default)]
    submitted_at: Option<String>,
    #[serde(rename = "ErrorCode", default)]
    error_code: u16,
    #[serde(rename = "Message", default)]
    message: Option<String>,
}

/// Send one HTML email through Postmark's outbound API.
pub fn send_email(params: &SendEmailParams) -> Result<SendReceipt, NotifyError> {
    dotenvy::dotenv().ok();

    if params.to.is_empty() {
        return Err(NotifyError::NoRecipients);
    }
    let token = env::var("POSTMARK_SERVER_TOKEN")
        .map_err(|_| NotifyError::MissingEnv("POSTMARK_SERVER_TOKEN"))?;
    let from = match params.from.as_deref() {
        Some(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => env::var("DEFAULT_FROM_EMAIL")
            .map_err(|_| NotifyError::MissingEnv("DEFAULT_FROM_EMAIL"))?,
    };
    let base_url = env::var("POSTMARK_API_BASE").unwrap_or_else(|_| POSTMARK_API_URL.to_string());

    let payload = OutboundPayload {
        from: &from,
        to: params.to.join(","),
        cc: join_nonempty(&params.cc),
        bcc: join_nonempty(&params.bcc),
        subject: &params.subject,
        html_body: &params.html_body,
        tag: params.tag.as_deref(),
        message_stream: "outbound",
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(SEND_TIMEOUT_SECS))
        .build()?;
    let response = client
        .post(format!("{}/email", base_url))
        .header("X-Postmark-Server-Token", token)
        .json(&payload)
        .send()?;

    let status = response.status();
    let body: OutboundResponse = response.json()?;
    if !status.is_success() {
        return Err(NotifyError::Api {
            code: status.as_u16(),
            message: body
                .message
                .unwrap_or_else(|| "unknown postmark error".to_string()),
        });
    }
    if body.error_code != 0 {
        return Err(NotifyError::Api {
            code: body.error_code,
            message: body
                .message
                .unwrap_or_else(|| "unknown postmark error".to_string()),
        });
    }

    Ok(SendReceipt {
        message_id: body.message_id.unwrap_or_default(),
        submitted_at: body.submitted_at.unwrap_or_default(),
    })
}

fn join_nonempty(addresses: &[String]) -> Option<String> {
    if addresses.is_empty() {
        None
    } else {
        Some(addresses.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn params(to: Vec<&str>) -> SendEmailParams {
        SendEmailParams {
            subject: "Your cancellation request".to_string(),
            html_body: "<p>We're on it.</p>".to_string(),
            from: None,
            to: to.into_iter().map(|value| value.to_string()).collect(),
            cc: vec![],
            bcc: vec![],
            tag: Some("cancellation-workflow".to_string()),
        }
    }

    fn set_postmark_env(base_url: &str) {
        std::env::set_var("POSTMARK_SERVER_TOKEN", "test-token");
        std::env::set_var("DEFAULT_FROM_EMAIL", "support@example.com");
        std::env::set_var("POSTMARK_API_BASE", base_url);
    }

    #[test]
    #[serial]
    fn send_email_posts_payload_and_returns_receipt() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/email")
            .match_header("X-Postmark-Server-Token", "test-token")
            .with_status(200)
            .with_body(
                r#"{"MessageID":"mid-123","SubmittedAt":"2026-01-05T10:00:00Z","ErrorCode":0,"Message":"OK"}"#,
            )
            .create();
        set_postmark_env(&server.url());

        let receipt = send_email(&params(vec!["jordan@example.com"])).unwrap();
        assert_eq!(receipt.message_id, "mid-123");
        mock.assert();
    }

    #[test]
    #[serial]
    fn api_error_code_in_success_body_is_an_error() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/email")
            .with_status(200)
            .with_body(r#"{"ErrorCode":300,"Message":"Invalid 'To' address"}"#)
            .create();
        set_postmark_env(&server.url());

        let err = send_email(&params(vec!["not-an-address"])).unwrap_err();
        match &err {
            NotifyError::Api { code, .. } => assert_eq!(*code, 300),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!err.is_retryable());
    }

    #[test]
    #[serial]
    fn server_errors_are_retryable() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/email")
            .with_status(503)
            .with_body(r#"{"ErrorCode":0,"Message":"service unavailable"}"#)
            .create();
        set_postmark_env(&server.url());

        let err = send_email(&params(vec!["jordan@example.com"])).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    #[serial]
    fn empty_recipient_list_is_rejected_before_any_request() {
        set_postmark_env("http://127.0.0.1:1");
        let err = send_email(&params(vec![])).unwrap_err();
        assert!(matches!(err, NotifyError::NoRecipients));
    }
}

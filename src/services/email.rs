use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EmailConfig;
use crate::db::Event;
use crate::error::{AppError, AppResult};

/// A fully rendered message ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Confirmation returned by the transport once the provider accepted a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub id: String,
}

#[async_trait]
pub trait EmailTransport: Send + Sync + 'static {
    async fn send(&self, email: &OutgoingEmail) -> AppResult<DeliveryReceipt>;
}

// ============================================================================
// Resend HTTP transport
// ============================================================================

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

#[derive(Deserialize)]
struct SendEmailResponse {
    #[serde(default)]
    id: Option<String>,
}

/// Placeholder id when the provider accepted a message without a readable id.
pub const UNKNOWN_MESSAGE_ID: &str = "unknown";

#[derive(Clone)]
pub struct ResendTransport {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
}

impl ResendTransport {
    pub fn new(config: &EmailConfig) -> AppResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(AppError::Config("RESEND_API_KEY is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| AppError::Email(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.api_url, endpoint)
    }
}

#[async_trait]
impl EmailTransport for ResendTransport {
    async fn send(&self, email: &OutgoingEmail) -> AppResult<DeliveryReceipt> {
        let body = SendEmailRequest {
            from: &email.from,
            to: [&email.to],
            subject: &email.subject,
            html: &email.html,
        };

        let response = self
            .client
            .post(self.api_url("/emails"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Email(format!("Failed to send email: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Email(format!(
                "Email API error ({}): {}",
                status.as_u16(),
                error_text
            )));
        }

        // Any 2xx is a confirmed delivery, readable id or not.
        let body = response.text().await.unwrap_or_default();
        let id = match serde_json::from_str::<SendEmailResponse>(&body) {
            Ok(SendEmailResponse { id: Some(id) }) => id,
            _ => {
                tracing::warn!(
                    "Email API accepted message to {} without a message id (body: {:?})",
                    email.to,
                    body
                );
                UNKNOWN_MESSAGE_ID.to_string()
            }
        };

        Ok(DeliveryReceipt { id })
    }
}

/// Heuristics to decide whether a send failure is likely transient.
///
/// Provider responses with a 4xx status (other than 408/429) mean the request
/// itself was rejected and resending the same message will not help. Network
/// errors, timeouts and 5xx responses are retried.
pub fn is_retryable_error(err: &str) -> bool {
    let e = err.to_lowercase();

    if let Some(pos) = e.find("email api error (") {
        let rest = &e[pos + "email api error (".len()..];
        if let Some(close) = rest.find(')') {
            if let Ok(code) = rest[..close].trim().parse::<u16>() {
                return code == 408 || code == 429 || code >= 500;
            }
        }
    }

    true
}

// ============================================================================
// Reminder template
// ============================================================================

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const REMINDER_STYLE: &str = r#"
      body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; }
      .container { max-width: 600px; margin: 0 auto; padding: 20px; }
      .event-card { background: #f9fafb; border-left: 4px solid #4F46E5; padding: 20px; margin: 20px 0; border-radius: 4px; }
      .event-title { color: #4F46E5; font-size: 24px; margin: 0 0 10px 0; }
      .event-detail { margin: 10px 0; }
      .label { font-weight: bold; color: #666; }
      .footer { margin-top: 30px; font-size: 12px; color: #666; }
"#;

/// Render the reminder email sent to an event's organizer.
pub fn render_reminder(event: &Event, from: &str) -> OutgoingEmail {
    let title = escape_html(&event.title);
    let starts_at = event
        .start_time
        .format("%A, %B %-d, %Y at %H:%M UTC")
        .to_string();

    let description = event
        .description
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .map(|d| format!("<p>{}</p>", escape_html(d)))
        .unwrap_or_default();

    let location = event
        .location
        .as_deref()
        .filter(|l| !l.trim().is_empty())
        .map(|l| {
            format!(
                r#"<div class="event-detail"><span class="label">📍 Location:</span> {}</div>"#,
                escape_html(l)
            )
        })
        .unwrap_or_default();

    let html = format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <style>{style}</style>
  </head>
  <body>
    <div class="container">
      <h1>Event Reminder</h1>
      <p>This is a reminder that your event is starting in {minutes} minutes!</p>
      <div class="event-card">
        <h2 class="event-title">{title}</h2>
        {description}
        <div class="event-detail"><span class="label">📅 Date &amp; Time:</span> {starts_at}</div>
        {location}
        <div class="event-detail"><span class="label">👤 Organizer:</span> {organizer}</div>
      </div>
      <p>Don't forget to prepare for the event!</p>
      <div class="footer"><p>College Event Scheduler</p></div>
    </div>
  </body>
</html>
"#,
        style = REMINDER_STYLE,
        minutes = event.reminder_minutes,
        title = title,
        description = description,
        starts_at = starts_at,
        location = location,
        organizer = escape_html(&event.organizer),
    );

    OutgoingEmail {
        from: from.to_string(),
        to: event.organizer_email.trim().to_string(),
        subject: format!("Reminder: {} - Starting Soon!", event.title),
        html,
    }
}

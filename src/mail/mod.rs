use std::env;

use anyhow::{Context, Result, bail};
use chrono::{Datelike, Utc};
use reqwest::Client;

const USERNAME_PLACEHOLDER: &str = "{{USERNAME}}";
const CODE_PLACEHOLDER: &str = "{{CODE}}";
const YEAR_PLACEHOLDER: &str = "{{YEAR}}";

const RESET_SUBJECT: &str = "Reset Your Password";

const RESET_TEXT_TEMPLATE: &str = "We received a request to reset your password. Your OTP is {{CODE}}. It will expire in 10 minutes.";

const RESET_HTML_TEMPLATE: &str = r#"<div style="font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif; background: #f7f7f7; padding: 40px 0; margin: 0;">
  <div style="max-width: 500px; background: #ffffff; margin: auto; padding: 30px 25px; border-radius: 12px; box-shadow: 0 4px 15px rgba(0,0,0,0.08);">
    <h2 style="text-align: center; color: #2563eb; margin-bottom: 10px; font-size: 26px;">Reset Your Password</h2>
    <p style="color: #555; font-size: 16px; line-height: 1.6; margin-bottom: 20px;">
      Hello {{USERNAME}},<br>
      We received a request to reset your password.
      Use the OTP code below to complete your verification:
    </p>
    <div style="background: #2563eb; color: #ffffff; font-size: 32px; font-weight: bold; text-align: center; padding: 18px 0; border-radius: 10px; letter-spacing: 6px; margin: 25px 0;">
      {{CODE}}
    </div>
    <p style="color: #666; font-size: 15px; line-height: 1.6;">
      This OTP is valid for <strong>10 minutes</strong>.
      If you did not request a password reset, please ignore this email.
    </p>
    <div style="border-top: 1px solid #eee; margin-top: 30px; padding-top: 15px; text-align: center;">
      <p style="color: #999; font-size: 13px; margin: 0;">&copy; {{YEAR}} StudyShare &bull; All Rights Reserved</p>
    </div>
  </div>
</div>"#;

/// Message handed to the transactional mail relay.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// HTTP client for the transactional mail relay.
#[derive(Clone)]
pub struct MailClient {
    http: Client,
    config: MailConfig,
}

#[derive(Clone, Default)]
struct MailConfig {
    api_url: Option<String>,
    api_key: Option<String>,
    from_address: Option<String>,
}

impl MailClient {
    /// Build a client using environment variables. Missing variables are
    /// tolerated here and only rejected when a send is attempted.
    pub fn from_env() -> Result<Self> {
        let api_url = env::var("MAIL_API_URL").ok();
        let api_key = env::var("MAIL_API_KEY").ok();
        let from_address = env::var("MAIL_FROM").ok();

        Ok(Self {
            http: Client::new(),
            config: MailConfig {
                api_url,
                api_key,
                from_address,
            },
        })
    }

    pub async fn send(&self, mail: &OutboundEmail) -> Result<()> {
        let Some(api_url) = self.config.api_url.as_ref() else {
            bail!("MAIL_API_URL is not configured but required for sending mail");
        };
        let Some(api_key) = self.config.api_key.as_ref() else {
            bail!("MAIL_API_KEY is not configured but required for sending mail");
        };
        let Some(from_address) = self.config.from_address.as_ref() else {
            bail!("MAIL_FROM is not configured but required for sending mail");
        };

        let payload = serde_json::json!({
            "from": from_address,
            "to": [mail.to],
            "subject": mail.subject,
            "text": mail.text,
            "html": mail.html,
        });

        let response = self
            .http
            .post(api_url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .context("mail relay request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(
                "mail relay call failed with status {status}: {}",
                body_preview(&body)
            );
        }

        Ok(())
    }
}

/// First 500 bytes of an oversized error body, cut on a char boundary.
fn body_preview(body: &str) -> &str {
    if body.len() <= 500 {
        return body;
    }
    let mut end = 500;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

/// Compose the password-reset message carrying a one-time code.
pub fn password_reset_email(username: &str, to: &str, code: &str) -> OutboundEmail {
    let year = Utc::now().year().to_string();

    let html = RESET_HTML_TEMPLATE
        .replace(USERNAME_PLACEHOLDER, username)
        .replace(CODE_PLACEHOLDER, code)
        .replace(YEAR_PLACEHOLDER, &year);

    OutboundEmail {
        to: to.to_owned(),
        subject: RESET_SUBJECT.to_owned(),
        text: RESET_TEXT_TEMPLATE.replace(CODE_PLACEHOLDER, code),
        html,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_email_carries_code_and_expiry_notice() {
        let mail = password_reset_email("priya", "priya@example.edu", "483920");

        assert_eq!(mail.to, "priya@example.edu");
        assert_eq!(mail.subject, "Reset Your Password");
        assert!(mail.text.contains("483920"));
        assert!(mail.text.contains("10 minutes"));
        assert!(mail.html.contains("483920"));
        assert!(mail.html.contains("Hello priya"));
        assert!(mail.html.contains("10 minutes"));
    }

    #[test]
    fn reset_email_leaves_no_unfilled_placeholders() {
        let mail = password_reset_email("priya", "priya@example.edu", "111111");

        assert!(!mail.html.contains("{{"));
        assert!(!mail.text.contains("{{"));
    }

    #[test]
    fn error_body_preview_stops_at_char_boundaries() {
        assert_eq!(body_preview("short"), "short");

        // 200 three-byte chars: byte 500 falls inside one, so the cut backs
        // up to 498 instead of panicking.
        let body = "あ".repeat(200);
        let preview = body_preview(&body);
        assert_eq!(preview.len(), 498);
        assert!(body.starts_with(preview));
    }
}

//! Builds the outgoing messages for each form.

use crate::catalog::{Language, MessageBundle};
use crate::notify::NotificationRequest;
use crate::submission::FormSubmission;
use chrono::{DateTime, SecondsFormat, Utc};

const SIGNATURE: &str = "Flight Service 365";

pub fn contact_message(from: &str, to: &str, submission: &FormSubmission) -> NotificationRequest {
    let name = submission.get("name").unwrap_or_default();
    let email = submission.get("email").unwrap_or_default();
    let message = submission.get("message").unwrap_or_default();
    let phone = submission
        .get("phone")
        .filter(|p| !p.trim().is_empty())
        .unwrap_or("Not provided");

    let text = format!(
        "Name: {name}\nEmail: {email}\nPhone: {phone}\n\nMessage:\n{message}\n"
    );
    let html = format!(
        "<h2>Contact Form Submission</h2>\n\
         <p><strong>Name:</strong> {}</p>\n\
         <p><strong>Email:</strong> {}</p>\n\
         <p><strong>Phone:</strong> {}</p>\n\
         <h3>Message:</h3>\n\
         <p>{}</p>\n",
        escape_html(name),
        escape_html(email),
        escape_html(phone),
        escape_html(message).replace('\n', "<br>"),
    );

    NotificationRequest {
        from: from.to_string(),
        to: to.to_string(),
        reply_to: Some(email.to_string()),
        subject: format!("Contact Form Submission from {}", name),
        text,
        html,
    }
}

pub fn confirmation_message(
    from: &str,
    email: &str,
    bundle: &MessageBundle,
    confirm_url: &str,
) -> NotificationRequest {
    let text = format!(
        "{},\n\n{}\n\n{}\n\n{}\n\n{}\n\n{}\n",
        bundle.greeting, bundle.text, bundle.instruction, confirm_url, bundle.footer, SIGNATURE
    );
    let url = escape_html(confirm_url);
    let html = format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h2>{greeting},</h2>
  <p>{text}</p>
  <p>{instruction}</p>
  <p style="text-align: center; margin: 30px 0;">
    <a href="{url}" style="background-color: #ffe928; color: #111111; padding: 12px 30px; text-decoration: none; border-radius: 4px; font-weight: bold;">{button}</a>
  </p>
  <p style="color: #666; font-size: 14px;">{footer}</p>
  <hr style="border: none; border-top: 1px solid #ddd; margin: 30px 0;">
  <p style="color: #999; font-size: 12px;">{signature}</p>
</div>
"#,
        greeting = bundle.greeting,
        text = bundle.text,
        instruction = bundle.instruction,
        url = url,
        button = bundle.button,
        footer = bundle.footer,
        signature = SIGNATURE,
    );

    NotificationRequest {
        from: from.to_string(),
        to: email.to_string(),
        reply_to: None,
        subject: bundle.subject.clone(),
        text,
        html,
    }
}

/// Staff notice for a new signup.
pub fn subscription_notice(
    from: &str,
    to: &str,
    email: &str,
    language: Language,
    at: DateTime<Utc>,
) -> NotificationRequest {
    let date = at.to_rfc3339_opts(SecondsFormat::Millis, true);
    NotificationRequest {
        from: from.to_string(),
        to: to.to_string(),
        reply_to: None,
        subject: "New Newsletter Subscription".to_string(),
        text: format!(
            "New newsletter subscription:\n\nEmail: {email}\nLanguage: {language}\nDate: {date}\n"
        ),
        html: format!(
            "<h2>New Newsletter Subscription</h2>\n\
             <p><strong>Email:</strong> {}</p>\n\
             <p><strong>Language:</strong> {}</p>\n\
             <p><strong>Date:</strong> {}</p>\n",
            escape_html(email),
            language,
            date
        ),
    }
}

pub fn confirm_url(site_url: &str, token: &str) -> String {
    format!(
        "{}/newsletter-confirm?token={}",
        site_url.trim_end_matches('/'),
        urlencoding::encode(token)
    )
}

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

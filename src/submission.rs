//! Form kinds and request-body decoding.

use crate::error::SubmissionError;
use axum::body::to_bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::{header, StatusCode};
use http_body_util::LengthLimitError;
use serde_json::Value;
use std::collections::HashMap;

/// Upper bound on buffered request bodies.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormKind {
    Contact,
    Newsletter,
}

impl FormKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Contact => "contact",
            Self::Newsletter => "newsletter",
        }
    }

    pub fn success_message(&self) -> &'static str {
        match self {
            Self::Contact => "Message sent successfully",
            Self::Newsletter => "Please check your email to confirm your subscription",
        }
    }

    pub fn failure_message(&self) -> &'static str {
        match self {
            Self::Contact => "Failed to process form submission",
            Self::Newsletter => "Failed to process newsletter signup",
        }
    }
}

/// Field name to value, as posted by the browser. Keys the validator does
/// not know about are kept and ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormSubmission {
    fields: HashMap<String, String>,
}

impl FormSubmission {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Decodes the body according to its content type: JSON objects,
    /// multipart form data, and URL-encoded pairs otherwise. Bodies over
    /// [`MAX_BODY_BYTES`] are refused whether or not they declare a length.
    pub async fn from_request(request: Request) -> Result<Self, SubmissionError> {
        let declared = request
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        if declared.is_some_and(|len| len > MAX_BODY_BYTES as u64) {
            return Err(SubmissionError::PayloadTooLarge);
        }

        let content_type = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(request, &())
                .await
                .map_err(|e| SubmissionError::MalformedBody(e.body_text()))?;
            return Self::from_multipart(multipart).await;
        }

        let body = to_bytes(request.into_body(), MAX_BODY_BYTES)
            .await
            .map_err(|e| {
                let inner = e.into_inner();
                if inner.is::<LengthLimitError>() {
                    SubmissionError::PayloadTooLarge
                } else {
                    SubmissionError::MalformedBody(inner.to_string())
                }
            })?;

        if content_type.contains("application/json") {
            Self::from_json(&body)
        } else {
            Ok(Self::from_urlencoded(&body))
        }
    }

    /// Strings are kept, `null` counts as absent, numbers and booleans are
    /// stringified. Anything but a flat object is malformed.
    pub fn from_json(body: &[u8]) -> Result<Self, SubmissionError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| SubmissionError::MalformedBody(e.to_string()))?;
        let Value::Object(map) = value else {
            return Err(SubmissionError::MalformedBody(
                "expected a JSON object".to_string(),
            ));
        };

        let mut submission = Self::default();
        for (key, value) in map {
            match value {
                Value::String(s) => submission.insert(key, s),
                Value::Null => {}
                Value::Bool(b) => submission.insert(key, b.to_string()),
                Value::Number(n) => submission.insert(key, n.to_string()),
                Value::Array(_) | Value::Object(_) => {
                    return Err(SubmissionError::MalformedBody(format!(
                        "field '{}' is not a scalar",
                        key
                    )));
                }
            }
        }
        Ok(submission)
    }

    /// Later duplicates overwrite earlier ones.
    pub fn from_urlencoded(body: &[u8]) -> Self {
        url::form_urlencoded::parse(body)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    async fn from_multipart(mut multipart: Multipart) -> Result<Self, SubmissionError> {
        let mut submission = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            let value = field.text().await.map_err(multipart_error)?;
            submission.insert(name, value);
        }
        Ok(submission)
    }
}

fn multipart_error(e: MultipartError) -> SubmissionError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        SubmissionError::PayloadTooLarge
    } else {
        SubmissionError::MalformedBody(e.body_text())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormSubmission {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut submission = Self::default();
        for (k, v) in iter {
            submission.insert(k, v);
        }
        submission
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn urlencoded_decodes_plus_and_percent() {
        let s = FormSubmission::from_urlencoded(b"name=Jo+Doe&email=jo%40example.com&message=Hi%21");
        assert_eq!(s.get("name"), Some("Jo Doe"));
        assert_eq!(s.get("email"), Some("jo@example.com"));
        assert_eq!(s.get("message"), Some("Hi!"));
    }

    #[test]
    fn urlencoded_last_duplicate_wins() {
        let s = FormSubmission::from_urlencoded(b"email=a@b.co&email=c@d.co");
        assert_eq!(s.get("email"), Some("c@d.co"));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn empty_urlencoded_body_is_empty_submission() {
        assert!(FormSubmission::from_urlencoded(b"").is_empty());
    }

    #[test]
    fn json_scalars_are_stringified_and_null_skipped() {
        let s = FormSubmission::from_json(
            br#"{"name":"Jo","phone":4930123,"consent":true,"honeypot":null}"#,
        )
        .unwrap();
        assert_eq!(s.get("name"), Some("Jo"));
        assert_eq!(s.get("phone"), Some("4930123"));
        assert_eq!(s.get("consent"), Some("true"));
        assert_eq!(s.get("honeypot"), None);
    }

    #[test]
    fn json_rejects_non_objects_and_nesting() {
        assert!(matches!(
            FormSubmission::from_json(b"[1,2]"),
            Err(SubmissionError::MalformedBody(_))
        ));
        assert!(matches!(
            FormSubmission::from_json(br#"{"name":{"first":"Jo"}}"#),
            Err(SubmissionError::MalformedBody(_))
        ));
        assert!(matches!(
            FormSubmission::from_json(b""),
            Err(SubmissionError::MalformedBody(_))
        ));
    }

    #[tokio::test]
    async fn content_type_selects_decoder() {
        let request = Request::builder()
            .header("content-type", "application/json; charset=utf-8")
            .body(Body::from(r#"{"email":"jo@example.com"}"#))
            .unwrap();
        let s = FormSubmission::from_request(request).await.unwrap();
        assert_eq!(s.get("email"), Some("jo@example.com"));

        let request = Request::builder()
            .body(Body::from("email=jo%40example.com"))
            .unwrap();
        let s = FormSubmission::from_request(request).await.unwrap();
        assert_eq!(s.get("email"), Some("jo@example.com"));
    }

    #[tokio::test]
    async fn declared_oversized_body_is_refused() {
        let request = Request::builder()
            .header("content-type", "application/json")
            .header("content-length", (MAX_BODY_BYTES + 1).to_string())
            .body(Body::from("{}"))
            .unwrap();
        assert!(matches!(
            FormSubmission::from_request(request).await,
            Err(SubmissionError::PayloadTooLarge)
        ));
    }

    #[tokio::test]
    async fn undeclared_oversized_body_is_refused() {
        let padding = "x".repeat(MAX_BODY_BYTES);
        let request = Request::builder()
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(format!("message={}", padding)))
            .unwrap();
        assert!(matches!(
            FormSubmission::from_request(request).await,
            Err(SubmissionError::PayloadTooLarge)
        ));
    }

    #[tokio::test]
    async fn multipart_fields_are_collected() {
        let body = concat!(
            "--XBOUNDARY\r\n",
            "Content-Disposition: form-data; name=\"email\"\r\n\r\n",
            "jo@example.com\r\n",
            "--XBOUNDARY\r\n",
            "Content-Disposition: form-data; name=\"language\"\r\n\r\n",
            "de\r\n",
            "--XBOUNDARY--\r\n",
        );
        let request = Request::builder()
            .header("content-type", "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from(body))
            .unwrap();
        let s = FormSubmission::from_request(request).await.unwrap();
        assert_eq!(s.get("email"), Some("jo@example.com"));
        assert_eq!(s.get("language"), Some("de"));
    }
}

//! Field validation for contact and newsletter submissions.
//!
//! Checks always run in the same order (required fields, email format,
//! honeypot, lengths) and every violation is reported.

use crate::submission::{FormKind, FormSubmission};
use once_cell::sync::Lazy;
use regex::Regex;

/// Hidden decoy input. Browsers driven by people leave it empty.
pub const HONEYPOT_FIELD: &str = "honeypot";

pub const MAX_NAME_CHARS: usize = 100;
pub const MAX_EMAIL_CHARS: usize = 255;
pub const MAX_MESSAGE_CHARS: usize = 5000;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i-u)^[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}$").expect("email pattern compiles")
});

const CONTACT_REQUIRED: &[(&str, &str)] = &[
    ("name", "Name is required"),
    ("email", "Email is required"),
    ("message", "Message is required"),
];
const NEWSLETTER_REQUIRED: &[(&str, &str)] = &[("email", "Email is required")];

const CONTACT_LIMITS: &[(&str, usize, &str)] = &[
    ("name", MAX_NAME_CHARS, "Name is too long (max 100 characters)"),
    ("email", MAX_EMAIL_CHARS, "Email is too long (max 255 characters)"),
    ("message", MAX_MESSAGE_CHARS, "Message is too long (max 5000 characters)"),
];
const NEWSLETTER_LIMITS: &[(&str, usize, &str)] = &[(
    "email",
    MAX_EMAIL_CHARS,
    "Email is too long (max 255 characters)",
)];

/// Ordered list of human-readable problems. Empty means the submission is
/// acceptable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult(Vec<String>);

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.0.is_empty()
    }

    pub fn errors(&self) -> &[String] {
        &self.0
    }

    pub fn into_errors(self) -> Vec<String> {
        self.0
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

pub fn validate(kind: FormKind, submission: &FormSubmission) -> ValidationResult {
    let (required, limits) = match kind {
        FormKind::Contact => (CONTACT_REQUIRED, CONTACT_LIMITS),
        FormKind::Newsletter => (NEWSLETTER_REQUIRED, NEWSLETTER_LIMITS),
    };
    let mut errors = Vec::new();

    for (field, message) in required {
        if is_blank(submission.get(field)) {
            errors.push(message.to_string());
        }
    }

    if let Some(email) = submission.get("email").filter(|e| !e.trim().is_empty()) {
        if !is_valid_email(email) {
            errors.push("Invalid email format".to_string());
        }
    }

    if submission
        .get(HONEYPOT_FIELD)
        .is_some_and(|v| !v.is_empty())
    {
        errors.push("Spam detected".to_string());
    }

    for (field, max, message) in limits {
        if submission
            .get(field)
            .is_some_and(|v| v.chars().count() > *max)
        {
            errors.push(message.to_string());
        }
    }

    ValidationResult(errors)
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

//! Localized text for the newsletter confirmation mail.

use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    De,
    En,
}

impl Language {
    pub const FALLBACK: Language = Language::En;

    pub fn code(&self) -> &'static str {
        match self {
            Self::De => "de",
            Self::En => "en",
        }
    }

    /// Site pages live under `/de/` and `/en/`; anything else is English.
    pub fn from_referer(referer: Option<&str>) -> Self {
        let referer = referer.unwrap_or_default();
        if referer.contains("/de/") {
            Self::De
        } else if referer.contains("/en/") {
            Self::En
        } else {
            Self::FALLBACK
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBundle {
    pub subject: String,
    pub greeting: String,
    pub text: String,
    pub instruction: String,
    pub button: String,
    pub footer: String,
}

/// Message bundles keyed by language, built once at startup.
#[derive(Debug, Clone)]
pub struct Catalog {
    bundles: HashMap<Language, MessageBundle>,
    fallback: MessageBundle,
}

impl Catalog {
    pub fn new(fallback: MessageBundle) -> Self {
        Self {
            bundles: HashMap::new(),
            fallback,
        }
    }

    pub fn with_bundle(mut self, language: Language, bundle: MessageBundle) -> Self {
        self.bundles.insert(language, bundle);
        self
    }

    pub fn builtin() -> Self {
        let en = MessageBundle {
            subject: "Confirm Your Newsletter Subscription".into(),
            greeting: "Hello".into(),
            text: "Thank you for your interest in our newsletter!".into(),
            instruction: "Please confirm your email address by clicking the link below:".into(),
            button: "Confirm Email".into(),
            footer: "If you did not sign up for our newsletter, you can ignore this email.".into(),
        };
        let de = MessageBundle {
            subject: "Bestätigen Sie Ihre Newsletter-Anmeldung".into(),
            greeting: "Hallo".into(),
            text: "Vielen Dank für Ihr Interesse an unserem Newsletter!".into(),
            instruction: "Bitte bestätigen Sie Ihre E-Mail-Adresse, indem Sie auf den folgenden Link klicken:".into(),
            button: "E-Mail bestätigen".into(),
            footer: "Wenn Sie sich nicht für unseren Newsletter angemeldet haben, können Sie diese E-Mail ignorieren.".into(),
        };

        Self::new(en.clone())
            .with_bundle(Language::En, en)
            .with_bundle(Language::De, de)
    }

    pub fn bundle(&self, language: Language) -> &MessageBundle {
        self.bundles.get(&language).unwrap_or(&self.fallback)
    }
}

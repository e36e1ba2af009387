//! Where newsletter signups go once the confirmation mail is out.
//!
//! There is no subscriber database yet. `NotifyingStore` mails the staff
//! inbox about each signup so someone can add the address by hand.

use crate::catalog::Language;
use crate::mail::subscription_notice;
use crate::notify::{dispatch, DispatchError, NotificationSink};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("subscription notice was not delivered: {0}")]
    Notify(#[from] DispatchError),
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn record(&self, email: &str, language: Language) -> Result<(), StoreError>;
}

pub struct NotifyingStore {
    sink: Arc<dyn NotificationSink>,
    from: String,
    to: String,
    timeout: Duration,
}

impl NotifyingStore {
    pub fn new(
        sink: Arc<dyn NotificationSink>,
        from: impl Into<String>,
        to: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            sink,
            from: from.into(),
            to: to.into(),
            timeout,
        }
    }
}

#[async_trait]
impl SubscriptionStore for NotifyingStore {
    async fn record(&self, email: &str, language: Language) -> Result<(), StoreError> {
        let notice = subscription_notice(&self.from, &self.to, email, language, Utc::now());
        dispatch(self.sink.as_ref(), &notice, self.timeout).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{DeliveryReceipt, NotificationRequest};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<NotificationRequest>>,
    }

    #[async_trait]
    impl NotificationSink for Recorder {
        async fn send(
            &self,
            message: &NotificationRequest,
        ) -> Result<DeliveryReceipt, DispatchError> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(DeliveryReceipt {
                transport: "recorder",
                message_id: None,
            })
        }
    }

    struct Broken;

    #[async_trait]
    impl NotificationSink for Broken {
        async fn send(
            &self,
            _message: &NotificationRequest,
        ) -> Result<DeliveryReceipt, DispatchError> {
            Err(DispatchError::Other("relay down".into()))
        }
    }

    #[tokio::test]
    async fn record_mails_the_staff_inbox() {
        let sink = Arc::new(Recorder::default());
        let store = NotifyingStore::new(
            sink.clone(),
            "noreply@fs.test",
            "ops@fs.test",
            Duration::from_secs(1),
        );

        store.record("jo@example.com", Language::De).await.unwrap();

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ops@fs.test");
        assert!(sent[0].text.contains("Email: jo@example.com"));
        assert!(sent[0].text.contains("Language: de"));
    }

    #[tokio::test]
    async fn record_surfaces_dispatch_failures() {
        let store = NotifyingStore::new(
            Arc::new(Broken),
            "noreply@fs.test",
            "ops@fs.test",
            Duration::from_secs(1),
        );
        let err = store.record("jo@example.com", Language::En).await.unwrap_err();
        assert!(matches!(err, StoreError::Notify(DispatchError::Other(_))));
    }
}

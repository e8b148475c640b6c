//! Delivery collaborators for notification jobs.
//!
//! Provider integrations plug in behind [`EmailTransport`] and
//! [`SmsGateway`]. The shipped [`LogTransport`] records each delivery in the
//! log and succeeds.

use async_trait::async_trait;
use std::sync::Arc;

use super::job::{JobContext, JobError, JobHandler, JobResult};
use super::payload::{EmailPayload, NotificationJob, SmsPayload};
use crate::error::Result;

/// Sends email.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send_email(&self, email: &EmailPayload) -> Result<()>;
}

/// Sends text messages.
#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn send_sms(&self, sms: &SmsPayload) -> Result<()>;
}

/// Transport that only logs.
#[derive(Debug, Clone, Default)]
pub struct LogTransport;

#[async_trait]
impl EmailTransport for LogTransport {
    async fn send_email(&self, email: &EmailPayload) -> Result<()> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            from = ?email.from,
            bytes = email.message.len(),
            "Email delivered"
        );
        Ok(())
    }
}

#[async_trait]
impl SmsGateway for LogTransport {
    async fn send_sms(&self, sms: &SmsPayload) -> Result<()> {
        tracing::info!(
            to = %sms.to,
            from = ?sms.from,
            bytes = sms.message.len(),
            "SMS delivered"
        );
        Ok(())
    }
}

/// Routes each job to the matching transport.
#[derive(Clone)]
pub struct NotificationHandler {
    email: Arc<dyn EmailTransport>,
    sms: Arc<dyn SmsGateway>,
    default_sender: Option<String>,
}

impl NotificationHandler {
    pub fn new(email: Arc<dyn EmailTransport>, sms: Arc<dyn SmsGateway>) -> Self {
        Self {
            email,
            sms,
            default_sender: None,
        }
    }

    /// Handler backed by [`LogTransport`] for both channels.
    pub fn logging() -> Self {
        let transport = Arc::new(LogTransport);
        Self::new(transport.clone(), transport)
    }

    /// Sender identity used when a payload carries none.
    pub fn with_default_sender(mut self, sender: impl Into<String>) -> Self {
        self.default_sender = Some(sender.into());
        self
    }
}

#[async_trait]
impl JobHandler for NotificationHandler {
    async fn handle(&self, job: &NotificationJob, ctx: &JobContext) -> JobResult {
        let result = match job {
            NotificationJob::Email(email) => {
                let mut email = email.clone();
                if email.from.is_none() {
                    email.from = self.default_sender.clone();
                }
                self.email.send_email(&email).await
            }
            NotificationJob::Sms(sms) => {
                let mut sms = sms.clone();
                if sms.from.is_none() {
                    sms.from = self.default_sender.clone();
                }
                self.sms.send_sms(&sms).await
            }
        };

        result.map_err(|e| {
            ctx.log_error(&format!("Delivery to {} failed: {}", job.recipient(), e));
            JobError::from(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CalendarError, ErrorCode};
    use crate::jobs::{JobKind, JobMetadata};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<SmsPayload>>,
    }

    #[async_trait]
    impl SmsGateway for Recorder {
        async fn send_sms(&self, sms: &SmsPayload) -> Result<()> {
            self.sent.lock().push(sms.clone());
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl EmailTransport for Broken {
        async fn send_email(&self, _email: &EmailPayload) -> Result<()> {
            Err(CalendarError::with_internal(ErrorCode::DeliveryFailed, "Delivery failed", "connection refused"))
        }
    }

    #[tokio::test]
    async fn test_default_sender_applied() {
        let recorder = Arc::new(Recorder::default());
        let handler = NotificationHandler::new(Arc::new(LogTransport), recorder.clone())
            .with_default_sender("Calendar");
        let ctx = JobContext::new(JobMetadata::new(JobKind::Sms));

        handler
            .handle(&NotificationJob::sms("+4712345678", "Reminder"), &ctx)
            .await
            .unwrap();

        let sent = recorder.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].from.as_deref(), Some("Calendar"));
    }

    #[tokio::test]
    async fn test_transport_error_becomes_job_error() {
        let handler = NotificationHandler::new(Arc::new(Broken), Arc::new(LogTransport));
        let ctx = JobContext::new(JobMetadata::new(JobKind::Email));

        let err = handler
            .handle(&NotificationJob::email("a@b.c", "s", "m"), &ctx)
            .await
            .unwrap_err();
        assert!(err.retryable);
        assert_eq!(err.code.as_deref(), Some("DeliveryFailed"));
    }
}

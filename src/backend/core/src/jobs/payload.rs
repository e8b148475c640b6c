//! Notification payloads, one variant per queue.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CalendarError, ErrorCode, Result};

/// Queue a job is placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Email,
    Sms,
}

impl JobKind {
    pub const ALL: [JobKind; 2] = [JobKind::Email, JobKind::Sms];

    /// Name of the backing queue.
    pub fn queue_name(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.queue_name())
    }
}

impl FromStr for JobKind {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "email" => Ok(Self::Email),
            "sms" => Ok(Self::Sms),
            other => Err(CalendarError::new(
                ErrorCode::InvalidInput,
                format!("Unknown queue '{}'", other),
            )),
        }
    }
}

/// An email to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailPayload {
    pub to: String,
    pub subject: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

/// A text message to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsPayload {
    pub to: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

/// A unit of notification work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NotificationJob {
    Email(EmailPayload),
    Sms(SmsPayload),
}

impl NotificationJob {
    pub fn email(to: impl Into<String>, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Email(EmailPayload {
            to: to.into(),
            subject: subject.into(),
            message: message.into(),
            from: None,
        })
    }

    pub fn sms(to: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Sms(SmsPayload {
            to: to.into(),
            message: message.into(),
            from: None,
        })
    }

    /// Set the sender identity.
    pub fn from_sender(mut self, sender: impl Into<String>) -> Self {
        match &mut self {
            Self::Email(p) => p.from = Some(sender.into()),
            Self::Sms(p) => p.from = Some(sender.into()),
        }
        self
    }

    pub fn kind(&self) -> JobKind {
        match self {
            Self::Email(_) => JobKind::Email,
            Self::Sms(_) => JobKind::Sms,
        }
    }

    pub fn recipient(&self) -> &str {
        match self {
            Self::Email(p) => &p.to,
            Self::Sms(p) => &p.to,
        }
    }

    /// Reject payloads with a blank recipient or body.
    pub fn validate(&self) -> Result<()> {
        let message = match self {
            Self::Email(p) => &p.message,
            Self::Sms(p) => &p.message,
        };

        if self.recipient().trim().is_empty() {
            return Err(CalendarError::missing_field("to"));
        }
        if message.trim().is_empty() {
            return Err(CalendarError::missing_field("message"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_routing() {
        assert_eq!(NotificationJob::email("a@b.c", "s", "m").kind(), JobKind::Email);
        assert_eq!(NotificationJob::sms("+4712345678", "m").kind(), JobKind::Sms);
        assert_eq!("sms".parse::<JobKind>().unwrap(), JobKind::Sms);
        assert!("fax".parse::<JobKind>().is_err());
    }

    #[test]
    fn test_tagged_serialization() {
        let job = NotificationJob::sms("+4712345678", "hi").from_sender("Calendar");
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(
            value,
            json!({"kind": "sms", "to": "+4712345678", "message": "hi", "from": "Calendar"})
        );
    }

    #[test]
    fn test_validate() {
        assert!(NotificationJob::email("a@b.c", "s", "m").validate().is_ok());
        let err = NotificationJob::sms(" ", "m").validate().unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingRequiredField);
        assert!(NotificationJob::sms("+47", "").validate().is_err());
    }
}

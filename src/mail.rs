use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as Window;
use serde::Serialize;

use crate::models::Task;
use crate::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, mail: &Mail) -> Result<(), Error>;
}

pub fn activation_mail(to: &str, code: &str) -> Mail {
    Mail {
        to: to.to_string(),
        subject: "Registration confirmation".to_string(),
        body: format!("Your registration code: {}\n", code),
    }
}

fn describe_window(window: Window) -> String {
    match (window.num_hours(), window.num_minutes()) {
        (1, 60) => "1 hour".to_string(),
        (hours, minutes) if hours > 0 && minutes % 60 == 0 => format!("{} hours", hours),
        (_, 1) => "1 minute".to_string(),
        (_, minutes) => format!("{} minutes", minutes),
    }
}

pub fn reminder_mail(to: &str, task: &Task, window: Window) -> Mail {
    Mail {
        to: to.to_string(),
        subject: "Deadline reminder".to_string(),
        body: format!(
            "The deadline you set is less than {} away.\nTask: {}\nDescription: {}\n",
            describe_window(window),
            task.title,
            task.description
        ),
    }
}

/// Sends `mail` in the background. Delivery failures are logged and otherwise ignored.
pub fn dispatch(notifier: Arc<dyn Notifier>, mail: Mail) {
    tokio::spawn(async move {
        if let Err(err) = notifier.send(&mail).await {
            log::warn!("Failed to send `{}` mail to {}: {:?}", mail.subject, mail.to, err);
        }
    });
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MailAddress {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMailBody {
    sender: MailAddress,
    to: Vec<MailAddress>,
    subject: String,
    text_content: String,
}

/// Transactional mail API client (Brevo-compatible JSON body, `api-key` header).
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    sender: String,
    sender_name: Option<String>,
}

impl HttpMailer {
    /// Every request is abandoned after `timeout`, so a stalled mail API cannot hold a caller.
    pub fn new(
        endpoint: String,
        api_key: String,
        sender: String,
        sender_name: Option<String>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            sender,
            sender_name,
        })
    }
}

#[async_trait]
impl Notifier for HttpMailer {
    async fn send(&self, mail: &Mail) -> Result<(), Error> {
        let body = SendMailBody {
            sender: MailAddress {
                email: self.sender.clone(),
                name: self.sender_name.clone(),
            },
            to: vec![MailAddress {
                email: mail.to.clone(),
                name: None,
            }],
            subject: mail.subject.clone(),
            text_content: mail.body.clone(),
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .header("api-key", &self.api_key)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            log::debug!("Mail `{}` accepted for {}", mail.subject, mail.to);
            return Ok(());
        }

        let text = resp.text().await.unwrap_or_default();
        Err(Error::InternalError {
            kind: "MailError",
            message: format!("Mail API rejected message (status={}): {}", status, text),
        })
    }
}

/// Used when no mail API is configured: records that a message would have gone out.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, mail: &Mail) -> Result<(), Error> {
        log::info!("Mail delivery disabled; dropping `{}` for {}", mail.subject, mail.to);
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use tokio::sync::mpsc;

    /// Forwards every mail to a channel; optionally fails after forwarding.
    pub struct ChannelNotifier {
        tx: mpsc::UnboundedSender<Mail>,
        fail: bool,
    }

    impl ChannelNotifier {
        pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Mail>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (Arc::new(Self { tx, fail: false }), rx)
        }

        pub fn failing() -> (Arc<Self>, mpsc::UnboundedReceiver<Mail>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (Arc::new(Self { tx, fail: true }), rx)
        }
    }

    #[async_trait]
    impl Notifier for ChannelNotifier {
        async fn send(&self, mail: &Mail) -> Result<(), Error> {
            let _ = self.tx.send(mail.clone());
            if self.fail {
                return Err(Error::unknown("mail transport unavailable"));
            }
            Ok(())
        }
    }
}

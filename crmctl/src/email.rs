//! Transactional email: welcome, trial warnings and task reminder digests.
//!
//! Bodies are rendered from minijinja templates compiled into the binary. Callers treat sending
//! as fire-and-forget; [`EmailService::send_in_background`] logs and counts failures and never
//! retries.

use std::{path::Path, sync::Arc};

use lettre::{
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::{
    config::{Config, EmailTransportConfig},
    errors::Error,
};

pub struct EmailService {
    transport: EmailTransport,
    templates: Environment<'static>,
    from_email: String,
    from_name: String,
    dashboard_url: String,
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

/// One line of a task reminder digest.
#[derive(Debug, Clone, Serialize)]
pub struct ReminderItem {
    pub title: String,
    pub due_date: Option<chrono::NaiveDate>,
}

#[derive(Debug, Clone)]
pub enum EmailKind {
    Welcome { organization: String, trial_days: u32 },
    TrialWarning { organization: String, days_remaining: i64 },
    TaskReminder { tasks: Vec<ReminderItem> },
}

impl EmailKind {
    /// Label used on metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            EmailKind::Welcome { .. } => "welcome",
            EmailKind::TrialWarning { .. } => "trial_warning",
            EmailKind::TaskReminder { .. } => "task_reminder",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Recipient {
    pub email: String,
    pub name: String,
}

impl EmailService {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let email_config = &config.email;

        let transport = match &email_config.transport {
            EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                if !use_tls {
                    tracing::warn!("SMTP TLS is disabled - this is not recommended for production");
                }

                let smtp_builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                } else {
                    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host))
                }
                .map_err(|e| Error::Internal {
                    operation: format!("create SMTP transport: {e}"),
                })?
                .port(*port)
                .credentials(Credentials::new(username.clone(), password.clone()));

                EmailTransport::Smtp(smtp_builder.build())
            }
            EmailTransportConfig::File { path } => {
                let emails_dir = Path::new(path);
                if !emails_dir.exists() {
                    std::fs::create_dir_all(emails_dir).map_err(|e| Error::Internal {
                        operation: format!("create emails directory: {e}"),
                    })?;
                }
                EmailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(emails_dir))
            }
        };

        Ok(Self {
            transport,
            templates: templates()?,
            from_email: email_config.from_email.clone(),
            from_name: email_config.from_name.clone(),
            dashboard_url: config.dashboard_url.trim_end_matches('/').to_string(),
        })
    }

    /// Render subject and HTML body for an email.
    pub fn render(&self, kind: &EmailKind, to: &Recipient) -> Result<(String, String), Error> {
        let product = &self.from_name;
        let (template, subject, ctx) = match kind {
            EmailKind::Welcome { organization, trial_days } => {
                let subject = format!("Welcome to {product}");
                let ctx = context! { organization, trial_days };
                ("welcome.html", subject, ctx)
            }
            EmailKind::TrialWarning {
                organization,
                days_remaining,
            } => {
                let plural = if *days_remaining == 1 { "" } else { "s" };
                let subject = format!("Your {product} trial ends in {days_remaining} day{plural}");
                let ctx = context! { organization, days_remaining };
                ("trial_warning.html", subject, ctx)
            }
            EmailKind::TaskReminder { tasks } => {
                let plural = if tasks.len() == 1 { "" } else { "s" };
                let subject = format!("{} task{plural} due", tasks.len());
                let ctx = context! { tasks };
                ("task_reminder.html", subject, ctx)
            }
        };

        let ctx = context! {
            subject => &subject,
            name => &to.name,
            product,
            dashboard_url => &self.dashboard_url,
            ..ctx
        };

        let body = self
            .templates
            .get_template(template)
            .and_then(|t| t.render(ctx))
            .map_err(|e| Error::Internal {
                operation: format!("render {template}: {e}"),
            })?;

        Ok((subject, body))
    }

    pub async fn send(&self, kind: &EmailKind, to: &Recipient) -> Result<(), Error> {
        let (subject, body) = self.render(kind, to)?;
        self.send_email(&to.email, &to.name, &subject, &body).await
    }

    /// Send without waiting for the result. Failures are logged and counted.
    pub fn send_in_background(self: &Arc<Self>, kind: EmailKind, to: Recipient) {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            service.send_and_record(&kind, &to).await;
        });
    }

    /// Send, recording the outcome in metrics. Returns whether delivery succeeded.
    pub async fn send_and_record(&self, kind: &EmailKind, to: &Recipient) -> bool {
        match self.send(kind, to).await {
            Ok(()) => {
                metrics::counter!("crmctl_emails_sent_total", "kind" => kind.label()).increment(1);
                tracing::debug!(kind = kind.label(), "Email sent");
                true
            }
            Err(e) => {
                metrics::counter!("crmctl_emails_failed_total", "kind" => kind.label()).increment(1);
                tracing::warn!(kind = kind.label(), error = %e, "Failed to send email");
                false
            }
        }
    }

    async fn send_email(&self, to_email: &str, to_name: &str, subject: &str, body: &str) -> Result<(), Error> {
        let from = format!("{} <{}>", self.from_name, self.from_email)
            .parse::<Mailbox>()
            .map_err(|e| Error::Internal {
                operation: format!("parse from email: {e}"),
            })?;

        let to = format!("{to_name} <{to_email}>").parse::<Mailbox>().map_err(|e| Error::Internal {
            operation: format!("parse to email: {e}"),
        })?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body.to_string())
            .map_err(|e| Error::Internal {
                operation: format!("build email message: {e}"),
            })?;

        match &self.transport {
            EmailTransport::Smtp(smtp) => {
                smtp.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send SMTP email: {e}"),
                })?;
            }
            EmailTransport::File(file) => {
                file.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send file email: {e}"),
                })?;
            }
        }

        Ok(())
    }
}

fn templates() -> Result<Environment<'static>, Error> {
    let mut env = Environment::new();
    for (name, source) in [
        ("base.html", include_str!("../templates/email/base.html")),
        ("welcome.html", include_str!("../templates/email/welcome.html")),
        ("trial_warning.html", include_str!("../templates/email/trial_warning.html")),
        ("task_reminder.html", include_str!("../templates/email/task_reminder.html")),
    ] {
        env.add_template(name, source).map_err(|e| Error::Internal {
            operation: format!("compile email template {name}: {e}"),
        })?;
    }
    Ok(env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_config;

    fn service(dir: &std::path::Path) -> EmailService {
        let mut config = create_test_config();
        config.email.transport = EmailTransportConfig::File {
            path: dir.to_string_lossy().to_string(),
        };
        EmailService::new(&config).unwrap()
    }

    fn recipient() -> Recipient {
        Recipient {
            email: "ada@example.com".to_string(),
            name: "ada".to_string(),
        }
    }

    #[test]
    fn test_trial_warning_render() {
        let dir = tempfile::tempdir().unwrap();
        let email = service(dir.path());

        let (subject, body) = email
            .render(
                &EmailKind::TrialWarning {
                    organization: "Acme".to_string(),
                    days_remaining: 1,
                },
                &recipient(),
            )
            .unwrap();

        assert!(subject.ends_with("trial ends in 1 day"));
        assert!(body.contains("Hello ada,"));
        assert!(body.contains("<strong>Acme</strong>"));
        assert!(body.contains("/settings/billing"));
    }

    #[test]
    fn test_task_reminder_lists_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let email = service(dir.path());

        let tasks = vec![
            ReminderItem {
                title: "Call Bob".to_string(),
                due_date: chrono::NaiveDate::from_ymd_opt(2025, 3, 1),
            },
            ReminderItem {
                title: "Send <proposal>".to_string(),
                due_date: None,
            },
        ];
        let (subject, body) = email.render(&EmailKind::TaskReminder { tasks }, &recipient()).unwrap();

        assert_eq!(subject, "2 tasks due");
        assert!(body.contains("Call Bob (due 2025-03-01)"));
        // autoescaped
        assert!(body.contains("Send &lt;proposal&gt;"));
    }

    #[tokio::test]
    async fn test_file_transport_writes_message() {
        let dir = tempfile::tempdir().unwrap();
        let email = service(dir.path());

        let delivered = email
            .send_and_record(
                &EmailKind::Welcome {
                    organization: "Acme".to_string(),
                    trial_days: 30,
                },
                &recipient(),
            )
            .await;
        assert!(delivered);

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_reported_not_panicked() {
        let dir = tempfile::tempdir().unwrap();
        let email = service(dir.path());
        let bad = Recipient {
            email: "not-an-address".to_string(),
            name: "x".to_string(),
        };

        let delivered = email
            .send_and_record(&EmailKind::TaskReminder { tasks: vec![] }, &bad)
            .await;
        assert!(!delivered);
    }
}

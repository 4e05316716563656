use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use crate::db::DbPool;
use crate::models::comment::Comment;
use crate::models::settings::Setting;

/// SMTP transport settings, read from the settings table.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

impl SmtpSettings {
    /// `None` when no transport is configured.
    pub fn load(pool: &DbPool) -> Option<Self> {
        let host = Setting::get_or(pool, "smtp_host", "");
        let username = Setting::get_or(pool, "smtp_username", "");
        if host.trim().is_empty() || username.trim().is_empty() {
            return None;
        }
        let from = Setting::get(pool, "mail_from")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| username.clone());
        Some(SmtpSettings {
            host,
            port: Setting::get_or(pool, "smtp_port", "587").parse().unwrap_or(587),
            username,
            password: Setting::get_or(pool, "smtp_password", ""),
            from,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Tell the site admin about a new comment.
pub fn comment_notification(pool: &DbPool, post_title: &str, comment: &Comment) -> Option<OutgoingMail> {
    let to = Setting::get(pool, "admin_email").filter(|s| !s.trim().is_empty())?;
    let site_name = Setting::get_or(pool, "site_name", "Quillpost");
    let body = format!(
        "New comment on \"{}\"\n\nFrom: {}\nStatus: {}\n\n{}\n\n-- {}\n",
        post_title, comment.author_name, comment.status, comment.body, site_name
    );
    Some(OutgoingMail {
        to,
        subject: format!("[{}] New comment on {}", site_name, post_title),
        body,
    })
}

/// Admin reply to a commenter. `None` when the commenter left no email.
pub fn comment_reply(pool: &DbPool, post_title: &str, comment: &Comment, reply: &str) -> Option<OutgoingMail> {
    let to = comment.author_email.clone().filter(|s| !s.trim().is_empty())?;
    let site_name = Setting::get_or(pool, "site_name", "Quillpost");
    let body = format!(
        "Hi {},\n\nThanks for your comment on \"{}\":\n\n> {}\n\n{}\n\n-- {}\n",
        comment.author_name,
        post_title,
        comment.body.replace('\n', "\n> "),
        reply,
        site_name
    );
    Some(OutgoingMail {
        to,
        subject: format!("Re: your comment on {}", post_title),
        body,
    })
}

/// Send on a blocking worker without waiting for the result. Must be called
/// from within the Rocket runtime. Failures are logged and dropped.
pub fn dispatch(pool: &DbPool, mail: OutgoingMail) {
    let Some(settings) = SmtpSettings::load(pool) else {
        log::info!("No SMTP transport configured, skipping email to {}", mail.to);
        return;
    };

    rocket::tokio::task::spawn_blocking(move || match send_smtp(&settings, &mail) {
        Ok(()) => log::info!("Email sent to {}", mail.to),
        Err(e) => log::warn!("Failed to send email to {}: {}", mail.to, e),
    });
}

fn send_smtp(settings: &SmtpSettings, mail: &OutgoingMail) -> Result<(), String> {
    let email = Message::builder()
        .from(settings.from.parse().map_err(|e| format!("Invalid from address: {}", e))?)
        .to(mail.to.parse().map_err(|e| format!("Invalid to address: {}", e))?)
        .subject(mail.subject.as_str())
        .header(ContentType::TEXT_PLAIN)
        .body(mail.body.clone())
        .map_err(|e| format!("Failed to build email: {}", e))?;

    let creds = Credentials::new(settings.username.clone(), settings.password.clone());

    let mailer = SmtpTransport::starttls_relay(&settings.host)
        .map_err(|e| format!("SMTP relay error: {}", e))?
        .port(settings.port)
        .credentials(creds)
        .build();

    mailer.send(&email).map_err(|e| format!("SMTP send error: {}", e))?;
    Ok(())
}

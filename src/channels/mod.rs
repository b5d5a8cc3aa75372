//! Mailbox I/O: IMAP source, SMTP sink and MIME decoding.

pub mod email;
pub mod email_types;

pub use email::{ImapMailSource, MailboxConfig, SmtpMailSink};
pub use email_types::parse_message;

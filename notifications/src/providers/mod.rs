//! Production and development channel adapters.
//!
//! One production adapter per channel (SMTP for e-mail, JSON HTTP gateways
//! for SMS and WhatsApp) plus console adapters that only log, for local
//! development. Mock adapters for tests live in [`crate::mocks`].

pub use console::{ConsoleEmailChannel, ConsoleSmsChannel, ConsoleWhatsAppChannel};
pub use http_sms::HttpSmsChannel;
pub use http_whatsapp::HttpWhatsAppChannel;
pub use smtp_email::SmtpEmailChannel;

pub mod console;
pub mod http_sms;
pub mod http_whatsapp;
pub mod smtp_email;

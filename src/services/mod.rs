//! Service layer for the watcher.
//!
//! This module contains the I/O-facing logic for:
//! - Page fetching (`HttpFetcher`)
//! - Module extraction (`ModuleExtractor`)
//! - Item layout detection (`LayoutSet`)
//! - Mail delivery (`SmtpMailer`)

mod extractor;
mod fetcher;
mod layouts;
mod mailer;

pub use extractor::ModuleExtractor;
pub use fetcher::{HttpFetcher, PageSource};
pub use layouts::{ItemLayout, LayoutSet, LinkPick};
pub use mailer::{MailTransport, OutgoingMail, SmtpMailer};

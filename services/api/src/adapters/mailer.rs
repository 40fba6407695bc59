//! services/api/src/adapters/mailer.rs
//!
//! The default implementation of the `Mailer` port. It writes outgoing mail
//! to the log instead of an SMTP relay, which is what we want in development
//! and in every test environment. Swapping in a real transport only requires
//! another implementor of the port.

use async_trait::async_trait;
use tracing::{debug, info};

use quill_core::ports::{Mailer, PortResult};

pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> PortResult<()> {
        info!("email to {} [{}]", to, subject);
        debug!("email body: {}", html_body);
        Ok(())
    }
}

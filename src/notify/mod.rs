//! Outbound mail seam.
//!
//! The core treats delivery as fire-and-forget: a send either succeeds or
//! fails, and the caller decides what to compensate (a failed reset-token
//! delivery rolls the token back). No retries happen here.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a message or return an error so the caller can compensate.
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        info!(recipient = %recipient, subject = %subject, body = %body, "notifier send stub");
        Ok(())
    }
}

pub mod testing {
    //! Notifier doubles used by lifecycle tests.

    use super::Notifier;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records sent bodies; lets tests fish the reset token back out.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
            self.sent.lock().expect("notifier mutex").push((
                recipient.to_string(),
                subject.to_string(),
                body.to_string(),
            ));
            Ok(())
        }
    }

    /// Always fails, to exercise the token rollback path.
    pub struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send(&self, _recipient: &str, _subject: &str, _body: &str) -> Result<()> {
            Err(anyhow!("smtp unavailable"))
        }
    }
}

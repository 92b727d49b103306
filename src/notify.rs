use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    VerifyEmail { email: String, token: String },
    ResetPassword { email: String, token: String },
}

/// Delivers one-time tokens to their owner. Sending real mail is out of scope.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notice: Notice) -> anyhow::Result<()>;
}

/// Writes the links to the log, for local development.
pub struct LogNotifier {
    pub public_url: String,
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notice: Notice) -> anyhow::Result<()> {
        match notice {
            Notice::VerifyEmail { email, token } => info!(
                %email,
                link = %format!("{}/verify-email/{}", self.public_url, token),
                "email verification link"
            ),
            Notice::ResetPassword { email, token } => info!(
                %email,
                link = %format!("{}/reset-password/{}", self.public_url, token),
                "password reset link"
            ),
        }
        Ok(())
    }
}

/// Keeps every notice in memory so tests can read tokens back.
#[derive(Default)]
pub struct OutboxNotifier {
    sent: Mutex<Vec<Notice>>,
}

impl OutboxNotifier {
    pub async fn sent(&self) -> Vec<Notice> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn send(&self, notice: Notice) -> anyhow::Result<()> {
        self.sent.lock().await.push(notice);
        Ok(())
    }
}

//! Completion notifications. Delivery is best effort: failures are logged and
//! never affect the claim.

use faucet_lib::Claim;
use serde::Serialize;
use std::sync::Arc;

#[async_trait::async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn claim_completed(&self, claim: &Claim, symbol: &str) -> Result<(), anyhow::Error>;
}

pub struct NoopNotifier;

#[async_trait::async_trait]
impl Notifier for NoopNotifier {
    async fn claim_completed(&self, _: &Claim, _: &str) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

/// Posts a JSON message to a webhook for every completed claim.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct CompletedMessage<'a> {
    user_id: faucet_lib::UserId,
    claim_id: faucet_lib::ClaimId,
    title: &'static str,
    body: String,
    transaction_id: Option<&'a str>,
}

impl WebhookNotifier {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn claim_completed(&self, claim: &Claim, symbol: &str) -> Result<(), anyhow::Error> {
        let msg = CompletedMessage {
            user_id: claim.user_id,
            claim_id: claim.id,
            title: "Reward received!",
            body: format!(
                "You received {} in your wallet.",
                claim.amount.to_asset_string(symbol)
            ),
            transaction_id: claim.transaction_id.as_deref(),
        };
        self.client
            .post(&self.url)
            .json(&msg)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Sends the notification on a detached task.
pub fn spawn_claim_completed(
    notifier: Arc<dyn Notifier>,
    claim: Claim,
    symbol: String,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match notifier.claim_completed(&claim, &symbol).await {
            Ok(()) => tracing::debug!("notified user {} about claim {}", claim.user_id, claim.id),
            Err(error) => tracing::warn!("notification for claim {} failed: {}", claim.id, error),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use faucet_lib::{AccountName, Amount, ClaimId, Tier, UserId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Failing {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Notifier for Failing {
        async fn claim_completed(&self, _: &Claim, symbol: &str) -> Result<(), anyhow::Error> {
            assert_eq!(symbol, "STEEM");
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("unreachable webhook")
        }
    }

    #[tokio::test]
    async fn test_failed_notification_is_swallowed() {
        tracing_subscriber::fmt::try_init().ok();
        let claim = Claim::new_pending(
            ClaimId::nil(),
            UserId::nil(),
            AccountName::new("alice").unwrap(),
            Amount::milli(2),
            Tier::One,
            chrono::Utc::now(),
        );
        let notifier = Arc::new(Failing::default());
        let handle = spawn_claim_completed(notifier.clone(), claim, "STEEM".to_owned());
        // the task finishes normally even though delivery failed
        handle.await.unwrap();
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    }
}

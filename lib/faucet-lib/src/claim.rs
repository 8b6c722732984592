use crate::{AccountName, Amount, ClaimId, Tier, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error as ThisError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Pending,
    Completed,
    Failed,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Completed => "completed",
            ClaimStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ClaimStatus::Pending)
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
#[error("unknown claim status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for ClaimStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ClaimStatus::Pending),
            "completed" => Ok(ClaimStatus::Completed),
            "failed" => Ok(ClaimStatus::Failed),
            _ => Err(UnknownStatus(s.to_owned())),
        }
    }
}

/// Returned when a settled claim is transitioned again.
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
#[error("claim {id} is already {status}")]
pub struct AlreadySettled {
    pub id: ClaimId,
    pub status: ClaimStatus,
}

/// One payout request.
///
/// Created `pending` by admission, moved to `completed` or `failed` once by
/// settlement.
#[serde_with::skip_serializing_none]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub user_id: UserId,
    pub account_name: AccountName,
    pub amount: Amount,
    /// Tier of the user when the claim was admitted.
    pub tier: Tier,
    pub status: ClaimStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub transaction_id: Option<String>,
    pub error_reason: Option<String>,
}

impl Claim {
    pub fn new_pending(
        id: ClaimId,
        user_id: UserId,
        account_name: AccountName,
        amount: Amount,
        tier: Tier,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            account_name,
            amount,
            tier,
            status: ClaimStatus::Pending,
            created_at: now,
            processed_at: None,
            transaction_id: None,
            error_reason: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ClaimStatus::Pending
    }

    fn ensure_pending(&self) -> Result<(), AlreadySettled> {
        if self.is_pending() {
            Ok(())
        } else {
            Err(AlreadySettled {
                id: self.id,
                status: self.status,
            })
        }
    }

    pub fn complete(&mut self, transaction_id: &str, now: DateTime<Utc>) -> Result<(), AlreadySettled> {
        self.ensure_pending()?;
        self.status = ClaimStatus::Completed;
        self.transaction_id = Some(transaction_id.to_owned());
        self.processed_at = Some(now);
        Ok(())
    }

    pub fn fail(&mut self, reason: &str, now: DateTime<Utc>) -> Result<(), AlreadySettled> {
        self.ensure_pending()?;
        let reason = reason.trim();
        self.status = ClaimStatus::Failed;
        self.error_reason = Some(if reason.is_empty() {
            "unknown error".to_owned()
        } else {
            reason.to_owned()
        });
        self.processed_at = Some(now);
        Ok(())
    }

    /// Transfer memo, the same for every attempt on this claim.
    pub fn memo(&self, symbol: &str) -> String {
        format!(
            "Faucet reward {} - enjoy your {} {}!",
            self.id, self.amount, symbol
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim() -> Claim {
        Claim::new_pending(
            ClaimId::nil(),
            UserId::nil(),
            AccountName::new("alice").unwrap(),
            Amount::milli(2),
            Tier::One,
            Utc::now(),
        )
    }

    #[test]
    fn test_complete_once() {
        let mut c = claim();
        c.complete("tx-123", Utc::now()).unwrap();
        assert_eq!(c.status, ClaimStatus::Completed);
        assert_eq!(c.transaction_id.as_deref(), Some("tx-123"));
        assert!(c.processed_at.is_some());
        assert_eq!(
            c.complete("tx-456", Utc::now()),
            Err(AlreadySettled {
                id: c.id,
                status: ClaimStatus::Completed
            })
        );
        assert!(c.fail("late", Utc::now()).is_err());
        assert_eq!(c.transaction_id.as_deref(), Some("tx-123"));
    }

    #[test]
    fn test_fail_reason_not_empty() {
        let mut c = claim();
        c.fail("  ", Utc::now()).unwrap();
        assert_eq!(c.status, ClaimStatus::Failed);
        assert_eq!(c.error_reason.as_deref(), Some("unknown error"));
        assert_eq!(c.transaction_id, None);
    }

    #[test]
    fn test_memo_is_deterministic() {
        let c = claim();
        assert_eq!(c.memo("STEEM"), c.memo("STEEM"));
        assert!(c.memo("STEEM").contains("0.002 STEEM"));
    }

    #[test]
    fn test_status_json() {
        assert_eq!(
            serde_json::to_string(&ClaimStatus::Pending).unwrap(),
            r#""pending""#
        );
        assert_eq!("failed".parse::<ClaimStatus>().unwrap(), ClaimStatus::Failed);
    }
}

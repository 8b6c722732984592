use crate::{AccountName, Amount, Claim, ClaimStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Running totals over completed claims.
///
/// `total_users` always equals `known_users.len()`; both only grow through
/// [`AggregateStats::record_completed_claim`] or a full [`AggregateStats::replay`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_distributed: Decimal,
    pub total_users: u64,
    pub known_users: BTreeSet<AccountName>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Public view of [`AggregateStats`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub total_distributed: Decimal,
    pub total_users: u64,
}

impl AggregateStats {
    /// Returns `true` if `account` was seen for the first time.
    pub fn record_completed_claim(
        &mut self,
        amount: Amount,
        account: &AccountName,
        now: DateTime<Utc>,
    ) -> bool {
        self.total_distributed += amount.value();
        let new_user = self.known_users.insert(account.clone());
        if new_user {
            self.total_users += 1;
        }
        self.updated_at = Some(now);
        new_user
    }

    /// Rebuilds the totals from claim history, ignoring non-completed claims.
    ///
    /// The result does not depend on the order of `claims`.
    pub fn replay<'a, I>(claims: I, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = &'a Claim>,
    {
        let mut stats = Self::default();
        for claim in claims {
            if claim.status == ClaimStatus::Completed {
                stats.record_completed_claim(claim.amount, &claim.account_name, now);
            }
        }
        stats.updated_at = Some(now);
        stats
    }

    /// Same totals, ignoring timestamps.
    pub fn same_totals(&self, other: &Self) -> bool {
        self.total_distributed == other.total_distributed
            && self.total_users == other.total_users
            && self.known_users == other.known_users
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            total_distributed: self.total_distributed,
            total_users: self.total_users,
        }
    }
}

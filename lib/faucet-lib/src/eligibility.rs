//! Rules deciding whether a user may open a new claim.
//!
//! Everything here is pure: callers pass the freshest state they hold and the
//! current server time. The same [`evaluate`] runs before and inside the
//! admission transaction.

use crate::{AccountInfo, Amount, ClaimId, Tier, UserAccount};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error as ThisError;

pub const COOLDOWN_HOURS: i64 = 24;

pub const ACCOUNT_MIN_AGE_DAYS: i64 = 7;

pub fn cooldown() -> Duration {
    Duration::hours(COOLDOWN_HOURS)
}

pub fn account_min_age() -> Duration {
    Duration::days(ACCOUNT_MIN_AGE_DAYS)
}

#[derive(ThisError, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Denial {
    #[error("account not found")]
    AccountNotFound,
    #[error("account too young: {age_days} days old")]
    AccountTooYoung { age_days: i64 },
    #[error("cooldown: {remaining_secs} seconds remaining")]
    Cooldown { remaining_secs: u64 },
    #[error("amount exceeds tier cap: tier {tier} allows {cap}")]
    AmountExceedsTierCap { tier: Tier, cap: Amount },
    #[error("pending claim exists: {claim_id}")]
    PendingClaimExists { claim_id: ClaimId },
}

impl Denial {
    pub fn reason(&self) -> &'static str {
        match self {
            Denial::AccountNotFound => "account_not_found",
            Denial::AccountTooYoung { .. } => "account_too_young",
            Denial::Cooldown { .. } => "cooldown",
            Denial::AmountExceedsTierCap { .. } => "amount_exceeds_tier_cap",
            Denial::PendingClaimExists { .. } => "pending_claim_exists",
        }
    }

    pub fn remaining_secs(&self) -> Option<u64> {
        match self {
            Denial::Cooldown { remaining_secs } => Some(*remaining_secs),
            _ => None,
        }
    }
}

pub fn check_account(account: Option<&AccountInfo>) -> Result<&AccountInfo, Denial> {
    account.ok_or(Denial::AccountNotFound)
}

pub fn check_account_age(account: &AccountInfo, now: DateTime<Utc>) -> Result<(), Denial> {
    let age = now - account.created_at;
    if age < account_min_age() {
        Err(Denial::AccountTooYoung {
            age_days: age.num_days().max(0),
        })
    } else {
        Ok(())
    }
}

pub fn check_cooldown(user: &UserAccount, now: DateTime<Utc>) -> Result<(), Denial> {
    match user.cooldown_remaining(now, cooldown()) {
        Some(remaining) => Err(Denial::Cooldown {
            remaining_secs: ceil_secs(remaining),
        }),
        None => Ok(()),
    }
}

pub fn check_tier_cap(user: &UserAccount, amount: Amount) -> Result<(), Denial> {
    let tier = user.tier();
    let cap = tier.cap();
    if amount > cap {
        Err(Denial::AmountExceedsTierCap { tier, cap })
    } else {
        Ok(())
    }
}

pub fn check_no_pending(pending: Option<ClaimId>) -> Result<(), Denial> {
    match pending {
        Some(claim_id) => Err(Denial::PendingClaimExists { claim_id }),
        None => Ok(()),
    }
}

/// Applies every rule in order; the first failure wins.
///
/// `account` is the ledger lookup result for the target account name and
/// `pending` is the user's current pending claim, if any.
pub fn evaluate(
    user: &UserAccount,
    pending: Option<ClaimId>,
    account: Option<&AccountInfo>,
    amount: Amount,
    now: DateTime<Utc>,
) -> Result<(), Denial> {
    let account = check_account(account)?;
    check_account_age(account, now)?;
    check_cooldown(user, now)?;
    check_tier_cap(user, amount)?;
    check_no_pending(pending)?;
    Ok(())
}

fn ceil_secs(d: Duration) -> u64 {
    let millis = d.num_milliseconds().max(0) as u64;
    millis.div_ceil(1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AccountName, UserId};
    use rust_decimal::Decimal;

    fn t0() -> DateTime<Utc> {
        "2024-03-01T12:00:00Z".parse().unwrap()
    }

    fn account(age_days: i64, now: DateTime<Utc>) -> AccountInfo {
        AccountInfo {
            name: AccountName::new("alice").unwrap(),
            created_at: now - Duration::days(age_days),
            balance: Decimal::ONE,
        }
    }

    fn claimed_at(at: DateTime<Utc>) -> UserAccount {
        let mut user = UserAccount::new(UserId::nil(), at - Duration::days(30));
        user.record_claim(Amount::milli(2), at);
        user
    }

    #[test]
    fn test_cooldown_boundary() {
        let user = claimed_at(t0());

        let now = t0() + Duration::hours(24) - Duration::seconds(1);
        let acc = account(10, now);
        assert_eq!(
            evaluate(&user, None, Some(&acc), Amount::milli(2), now),
            Err(Denial::Cooldown { remaining_secs: 1 })
        );

        let now = t0() + Duration::hours(24) + Duration::seconds(1);
        let acc = account(10, now);
        assert_eq!(evaluate(&user, None, Some(&acc), Amount::milli(2), now), Ok(()));
    }

    #[test]
    fn test_cooldown_remaining_about_one_minute() {
        let user = claimed_at(t0());
        let now = t0() + Duration::hours(23) + Duration::minutes(59);
        let denial = check_cooldown(&user, now).unwrap_err();
        assert_eq!(denial.reason(), "cooldown");
        assert_eq!(denial.remaining_secs(), Some(60));
    }

    #[test]
    fn test_cooldown_rounds_up() {
        let user = claimed_at(t0());
        let now = t0() + Duration::hours(24) - Duration::milliseconds(1500);
        assert_eq!(
            check_cooldown(&user, now),
            Err(Denial::Cooldown { remaining_secs: 2 })
        );
    }

    #[test]
    fn test_tier_cap() {
        let now = t0();
        let user = UserAccount::new(UserId::nil(), now);
        let acc = account(10, now);
        assert_eq!(
            evaluate(&user, None, Some(&acc), Amount::milli(3), now),
            Err(Denial::AmountExceedsTierCap {
                tier: Tier::One,
                cap: Amount::milli(2)
            })
        );
        assert_eq!(evaluate(&user, None, Some(&acc), Amount::milli(2), now), Ok(()));

        let mut veteran = user.clone();
        veteran.consecutive_claims = 5;
        assert_eq!(
            evaluate(&veteran, None, Some(&acc), Amount::milli(5), now),
            Ok(())
        );
    }

    #[test]
    fn test_rule_order() {
        let now = t0();
        let user = claimed_at(now - Duration::hours(1));
        let pending = Some(ClaimId::nil());

        assert_eq!(
            evaluate(&user, pending, None, Amount::milli(9), now),
            Err(Denial::AccountNotFound)
        );
        let young = account(3, now);
        assert_eq!(
            evaluate(&user, pending, Some(&young), Amount::milli(9), now),
            Err(Denial::AccountTooYoung { age_days: 3 })
        );
        let old = account(10, now);
        assert_eq!(
            evaluate(&user, pending, Some(&old), Amount::milli(9), now).map_err(|d| d.reason()),
            Err("cooldown")
        );

        let fresh = UserAccount::new(UserId::nil(), now);
        assert_eq!(
            evaluate(&fresh, pending, Some(&old), Amount::milli(9), now).map_err(|d| d.reason()),
            Err("amount_exceeds_tier_cap")
        );
        assert_eq!(
            evaluate(&fresh, pending, Some(&old), Amount::milli(1), now),
            Err(Denial::PendingClaimExists {
                claim_id: ClaimId::nil()
            })
        );
    }

    #[test]
    fn test_account_exactly_min_age() {
        let now = t0();
        assert!(check_account_age(&account(7, now), now).is_ok());
    }
}

use crate::{AccountName, Amount, UserId};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Consecutive claims needed to reach [`Tier::Two`].
pub const TIER_TWO_STREAK: u32 = 5;

/// Reward cap bracket.
///
/// Derived from [`UserAccount::consecutive_claims`] and never stored on its own.
/// [`Tier::Three`] has a cap but no streak currently produces it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Tier {
    One = 1,
    Two = 2,
    Three = 3,
}

impl Tier {
    pub fn from_streak(consecutive_claims: u32) -> Self {
        if consecutive_claims >= TIER_TWO_STREAK {
            Tier::Two
        } else {
            Tier::One
        }
    }

    pub fn cap(self) -> Amount {
        match self {
            Tier::One => Amount::milli(2),
            Tier::Two => Amount::milli(5),
            Tier::Three => Amount::milli(10),
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

impl From<Tier> for u8 {
    fn from(value: Tier) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for Tier {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Tier::One),
            2 => Ok(Tier::Two),
            3 => Ok(Tier::Three),
            x => Err(format!("invalid tier: {x}")),
        }
    }
}

/// Claim-related state of one user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    pub user_id: UserId,
    pub account_name: Option<AccountName>,
    pub last_claim_at: Option<DateTime<Utc>>,
    pub consecutive_claims: u32,
    pub total_claimed_amount: Decimal,
    pub last_claim_amount: Option<Amount>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            account_name: None,
            last_claim_at: None,
            consecutive_claims: 0,
            total_claimed_amount: Decimal::ZERO,
            last_claim_amount: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn tier(&self) -> Tier {
        Tier::from_streak(self.consecutive_claims)
    }

    /// Streak after a claim made at `now`.
    ///
    /// Continues while at most one whole day has passed since the last claim,
    /// otherwise starts over at 1.
    pub fn next_streak(&self, now: DateTime<Utc>) -> u32 {
        match self.last_claim_at {
            Some(last) if (now - last).num_days() <= 1 => self.consecutive_claims.saturating_add(1),
            _ => 1,
        }
    }

    /// Advances cooldown, streak and totals for a claim admitted at `now`.
    pub fn record_claim(&mut self, amount: Amount, now: DateTime<Utc>) {
        self.consecutive_claims = self.next_streak(now);
        self.last_claim_at = Some(now);
        self.total_claimed_amount += amount.value();
        self.last_claim_amount = Some(amount);
        self.updated_at = now;
    }

    /// Time left before the next claim is allowed, if any.
    pub fn cooldown_remaining(&self, now: DateTime<Utc>, cooldown: Duration) -> Option<Duration> {
        let last = self.last_claim_at?;
        let elapsed = now - last;
        if elapsed < cooldown {
            Some(cooldown - elapsed)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_tier_from_streak() {
        assert_eq!(Tier::from_streak(0), Tier::One);
        assert_eq!(Tier::from_streak(4), Tier::One);
        assert_eq!(Tier::from_streak(5), Tier::Two);
        assert_eq!(Tier::from_streak(500), Tier::Two);
    }

    #[test]
    fn test_tier_caps() {
        assert_eq!(Tier::One.cap(), "0.002".parse::<Amount>().unwrap());
        assert_eq!(Tier::Two.cap(), "0.005".parse::<Amount>().unwrap());
        assert_eq!(Tier::Three.cap(), "0.01".parse::<Amount>().unwrap());
    }

    #[test]
    fn test_streak_continuity() {
        let mut user = UserAccount::new(UserId::nil(), t0());
        user.record_claim(Amount::milli(2), t0());
        assert_eq!(user.consecutive_claims, 1);

        let day2 = t0() + Duration::hours(30);
        user.record_claim(Amount::milli(2), day2);
        assert_eq!(user.consecutive_claims, 2);

        let after_gap = day2 + Duration::days(3);
        user.record_claim(Amount::milli(2), after_gap);
        assert_eq!(user.consecutive_claims, 1);
        assert_eq!(user.tier(), Tier::One);
    }

    #[test]
    fn test_streak_reaches_tier_two() {
        let mut user = UserAccount::new(UserId::nil(), t0());
        let mut now = t0();
        for _ in 0..5 {
            user.record_claim(Amount::milli(2), now);
            now += Duration::hours(25);
        }
        assert_eq!(user.consecutive_claims, 5);
        assert_eq!(user.tier(), Tier::Two);
    }

    #[test]
    fn test_record_claim_totals() {
        let mut user = UserAccount::new(UserId::nil(), t0());
        user.record_claim(Amount::milli(2), t0());
        user.record_claim(Amount::milli(5), t0() + Duration::hours(24));
        assert_eq!(user.total_claimed_amount, Decimal::new(7, 3));
        assert_eq!(user.last_claim_amount, Some(Amount::milli(5)));
        assert_eq!(user.last_claim_at, Some(t0() + Duration::hours(24)));
    }

    #[test]
    fn test_cooldown_remaining() {
        let mut user = UserAccount::new(UserId::nil(), t0());
        assert_eq!(user.cooldown_remaining(t0(), Duration::hours(24)), None);
        user.record_claim(Amount::milli(1), t0());
        assert_eq!(
            user.cooldown_remaining(t0() + Duration::hours(23), Duration::hours(24)),
            Some(Duration::hours(1))
        );
        assert_eq!(
            user.cooldown_remaining(t0() + Duration::hours(24), Duration::hours(24)),
            None
        );
    }

    #[test]
    fn test_tier_json() {
        assert_eq!(serde_json::to_string(&Tier::Two).unwrap(), "2");
        assert_eq!(serde_json::from_str::<Tier>("1").unwrap(), Tier::One);
        assert!(serde_json::from_str::<Tier>("4").is_err());
    }
}

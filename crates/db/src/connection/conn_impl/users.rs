use super::*;

pub(super) fn parse_user(r: Row) -> crate::Result<UserAccount> {
    let account_name = r
        .try_get::<_, Option<String>>("account_name")
        .map_err(Error::data("faucet_users.account_name"))?
        .map(|name| AccountName::new(&name))
        .transpose()
        .map_err(Error::invalid("faucet_users.account_name"))?;
    let consecutive_claims = r
        .try_get::<_, i32>("consecutive_claims")
        .map_err(Error::data("faucet_users.consecutive_claims"))?;
    let last_claim_amount = r
        .try_get::<_, Option<Decimal>>("last_claim_amount")
        .map_err(Error::data("faucet_users.last_claim_amount"))?
        .map(Amount::new)
        .transpose()
        .map_err(Error::invalid("faucet_users.last_claim_amount"))?;

    Ok(UserAccount {
        user_id: r
            .try_get("user_id")
            .map_err(Error::data("faucet_users.user_id"))?,
        account_name,
        last_claim_at: r
            .try_get("last_claim_at")
            .map_err(Error::data("faucet_users.last_claim_at"))?,
        consecutive_claims: u32::try_from(consecutive_claims)
            .map_err(Error::invalid("faucet_users.consecutive_claims"))?,
        total_claimed_amount: r
            .try_get("total_claimed_amount")
            .map_err(Error::data("faucet_users.total_claimed_amount"))?,
        last_claim_amount,
        created_at: r
            .try_get("created_at")
            .map_err(Error::data("faucet_users.created_at"))?,
        updated_at: r
            .try_get("updated_at")
            .map_err(Error::data("faucet_users.updated_at"))?,
    })
}

pub(super) async fn get_user<C: DbClient>(
    conn: &C,
    user_id: UserId,
) -> crate::Result<Option<UserAccount>> {
    conn.do_query_opt(
        "SELECT user_id, account_name, last_claim_at, consecutive_claims,
            total_claimed_amount, last_claim_amount, created_at, updated_at
        FROM faucet_users WHERE user_id = $1",
        &[&user_id],
    )
    .await
    .map_err(Error::exec("select user"))?
    .map(parse_user)
    .transpose()
}

/// Reads the user row and holds its lock until the transaction ends.
pub(super) async fn lock_user(tx: &Transaction<'_>, user_id: UserId) -> crate::Result<UserAccount> {
    let row = tx
        .do_query_opt(
            "SELECT user_id, account_name, last_claim_at, consecutive_claims,
                total_claimed_amount, last_claim_amount, created_at, updated_at
            FROM faucet_users WHERE user_id = $1
            FOR UPDATE",
            &[&user_id],
        )
        .await
        .map_err(Error::exec("lock user"))?
        .ok_or_else(|| Error::not_found("user", user_id))?;
    parse_user(row)
}

pub(super) async fn save_claim_state(tx: &Transaction<'_>, user: &UserAccount) -> crate::Result<()> {
    let consecutive_claims = i32::try_from(user.consecutive_claims)
        .map_err(Error::invalid("faucet_users.consecutive_claims"))?;
    let last_claim_amount = user.last_claim_amount.map(|a| a.value());
    let updated = tx
        .do_execute(
            "UPDATE faucet_users SET
                last_claim_at = $2,
                consecutive_claims = $3,
                total_claimed_amount = $4,
                last_claim_amount = $5,
                updated_at = $6
            WHERE user_id = $1",
            &[
                &user.user_id,
                &user.last_claim_at,
                &consecutive_claims,
                &user.total_claimed_amount,
                &last_claim_amount,
                &user.updated_at,
            ],
        )
        .await
        .map_err(Error::exec("update user claim state"))?;
    if updated != 1 {
        return Err(Error::not_found("user", user.user_id));
    }
    Ok(())
}

impl RealDbPool {
    pub(crate) async fn ensure_user_impl(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> crate::Result<UserAccount> {
        let conn = self.get_conn().await?;
        let inserted = conn
            .do_execute(
                "INSERT INTO faucet_users (user_id, created_at, updated_at)
                VALUES ($1, $2, $2)
                ON CONFLICT (user_id) DO NOTHING",
                &[&user_id, &now],
            )
            .await
            .map_err(Error::exec("insert user"))?;
        if inserted == 1 {
            tracing::info!("created faucet user {}", user_id);
        }
        get_user(&conn, user_id)
            .await?
            .ok_or_else(|| Error::not_found("user", user_id))
    }

    pub(crate) async fn link_account_impl(
        &self,
        user_id: UserId,
        name: &AccountName,
        now: DateTime<Utc>,
    ) -> crate::Result<UserAccount> {
        let conn = self.get_conn().await?;
        let row = conn
            .do_query_one(
                "INSERT INTO faucet_users (user_id, account_name, created_at, updated_at)
                VALUES ($1, $2, $3, $3)
                ON CONFLICT (user_id) DO UPDATE SET
                    account_name = EXCLUDED.account_name,
                    updated_at = EXCLUDED.updated_at
                RETURNING user_id, account_name, last_claim_at, consecutive_claims,
                    total_claimed_amount, last_claim_amount, created_at, updated_at",
                &[&user_id, &name.as_str(), &now],
            )
            .await
            .map_err(Error::exec("link account"))?;
        parse_user(row)
    }
}

use super::*;

const ONE_PENDING_PER_USER: &str = "faucet_claims_one_pending_per_user";

pub(super) fn parse_claim(r: Row) -> crate::Result<Claim> {
    let account_name = r
        .try_get::<_, String>("account_name")
        .map_err(Error::data("faucet_claims.account_name"))?;
    let amount = r
        .try_get::<_, Decimal>("amount")
        .map_err(Error::data("faucet_claims.amount"))?;
    let tier = r
        .try_get::<_, i16>("tier")
        .map_err(Error::data("faucet_claims.tier"))?;
    let status = r
        .try_get::<_, String>("status")
        .map_err(Error::data("faucet_claims.status"))?;

    Ok(Claim {
        id: r.try_get("id").map_err(Error::data("faucet_claims.id"))?,
        user_id: r
            .try_get("user_id")
            .map_err(Error::data("faucet_claims.user_id"))?,
        account_name: AccountName::new(&account_name)
            .map_err(Error::invalid("faucet_claims.account_name"))?,
        amount: Amount::new(amount).map_err(Error::invalid("faucet_claims.amount"))?,
        tier: u8::try_from(tier)
            .map_err(|e| e.to_string())
            .and_then(Tier::try_from)
            .map_err(Error::invalid("faucet_claims.tier"))?,
        status: status
            .parse::<ClaimStatus>()
            .map_err(Error::invalid("faucet_claims.status"))?,
        created_at: r
            .try_get("created_at")
            .map_err(Error::data("faucet_claims.created_at"))?,
        processed_at: r
            .try_get("processed_at")
            .map_err(Error::data("faucet_claims.processed_at"))?,
        transaction_id: r
            .try_get("transaction_id")
            .map_err(Error::data("faucet_claims.transaction_id"))?,
        error_reason: r
            .try_get("error_reason")
            .map_err(Error::data("faucet_claims.error_reason"))?,
    })
}

fn parse_claims(rows: Vec<Row>) -> crate::Result<Vec<Claim>> {
    rows.into_iter().map(parse_claim).collect()
}

pub(super) async fn get_claim<C: DbClient>(conn: &C, id: ClaimId) -> crate::Result<Option<Claim>> {
    conn.do_query_opt(
        "SELECT id, user_id, account_name, amount, tier, status,
            created_at, processed_at, transaction_id, error_reason
        FROM faucet_claims WHERE id = $1",
        &[&id],
    )
    .await
    .map_err(Error::exec("select claim"))?
    .map(parse_claim)
    .transpose()
}

/// Outcome for a claim that did not match `status = 'pending'`.
async fn not_pending<C: DbClient>(
    conn: &C,
    id: ClaimId,
) -> crate::Result<Result<Claim, AlreadySettled>> {
    let claim = get_claim(conn, id)
        .await?
        .ok_or_else(|| Error::not_found("claim", id))?;
    Ok(Err(AlreadySettled {
        id,
        status: claim.status,
    }))
}

impl RealDbPool {
    pub(crate) async fn admit_claim_impl(
        &self,
        admission: &Admission,
    ) -> crate::Result<Result<Claim, Denial>> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(Error::exec("start"))?;

        let mut user = users::lock_user(&tx, admission.user_id).await?;
        let pending = tx
            .do_query_opt(
                "SELECT id FROM faucet_claims
                WHERE user_id = $1 AND status = 'pending'
                LIMIT 1",
                &[&admission.user_id],
            )
            .await
            .map_err(Error::exec("select pending claim"))?
            .map(|r| r.try_get::<_, ClaimId>(0))
            .transpose()
            .map_err(Error::data("faucet_claims.id"))?;

        if let Err(denial) = admission.evaluate(&user, pending) {
            return Ok(Err(denial));
        }

        let claim = admission.to_claim(&user);
        tx.do_execute(
            "INSERT INTO faucet_claims
                (id, user_id, account_name, amount, tier, status, created_at)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6)",
            &[
                &claim.id,
                &claim.user_id,
                &claim.account_name.as_str(),
                &claim.amount.value(),
                &i16::from(u8::from(claim.tier)),
                &claim.created_at,
            ],
        )
        .await
        .map_err(unique_conflict("insert claim", ONE_PENDING_PER_USER))?;

        user.record_claim(admission.amount, admission.now);
        users::save_claim_state(&tx, &user).await?;

        tx.commit().await.map_err(Error::exec("commit"))?;

        Ok(Ok(claim))
    }

    pub(crate) async fn list_pending_claims_impl(&self, user_id: UserId) -> crate::Result<Vec<Claim>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .do_query(
                "SELECT id, user_id, account_name, amount, tier, status,
                    created_at, processed_at, transaction_id, error_reason
                FROM faucet_claims
                WHERE user_id = $1 AND status = 'pending'
                ORDER BY created_at DESC, id DESC",
                &[&user_id],
            )
            .await
            .map_err(Error::exec("select pending claims"))?;
        parse_claims(rows)
    }

    pub(crate) async fn list_user_claims_impl(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> crate::Result<Vec<Claim>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .do_query(
                "SELECT id, user_id, account_name, amount, tier, status,
                    created_at, processed_at, transaction_id, error_reason
                FROM faucet_claims
                WHERE user_id = $1
                ORDER BY created_at DESC, id DESC
                LIMIT $2",
                &[&user_id, &limit],
            )
            .await
            .map_err(Error::exec("select user claims"))?;
        parse_claims(rows)
    }

    pub(crate) async fn recent_claims_impl(&self, limit: i64) -> crate::Result<Vec<Claim>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .do_query(
                "SELECT id, user_id, account_name, amount, tier, status,
                    created_at, processed_at, transaction_id, error_reason
                FROM faucet_claims
                ORDER BY created_at DESC, id DESC
                LIMIT $1",
                &[&limit],
            )
            .await
            .map_err(Error::exec("select recent claims"))?;
        parse_claims(rows)
    }

    pub(crate) async fn oldest_pending_claims_impl(&self, limit: i64) -> crate::Result<Vec<Claim>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .do_query(
                "SELECT id, user_id, account_name, amount, tier, status,
                    created_at, processed_at, transaction_id, error_reason
                FROM faucet_claims
                WHERE status = 'pending'
                ORDER BY created_at ASC, id ASC
                LIMIT $1",
                &[&limit],
            )
            .await
            .map_err(Error::exec("select oldest pending claims"))?;
        parse_claims(rows)
    }

    pub(crate) async fn complete_claim_impl(
        &self,
        id: ClaimId,
        transaction_id: &str,
        now: DateTime<Utc>,
    ) -> crate::Result<Result<Claim, AlreadySettled>> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(Error::exec("start"))?;

        // taken first so that recompute and completions never interleave
        stats::lock_stats(&tx).await?;

        let row = tx
            .do_query_opt(
                "UPDATE faucet_claims SET
                    status = 'completed',
                    transaction_id = $2,
                    processed_at = $3
                WHERE id = $1 AND status = 'pending'
                RETURNING id, user_id, account_name, amount, tier, status,
                    created_at, processed_at, transaction_id, error_reason",
                &[&id, &transaction_id, &now],
            )
            .await
            .map_err(Error::exec("complete claim"))?;
        let Some(row) = row else {
            return not_pending(&tx, id).await;
        };
        let claim = parse_claim(row)?;

        stats::record_completed_claim(&tx, &claim, now).await?;

        tx.commit().await.map_err(Error::exec("commit"))?;

        Ok(Ok(claim))
    }

    pub(crate) async fn fail_claim_impl(
        &self,
        id: ClaimId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> crate::Result<Result<Claim, AlreadySettled>> {
        let reason = match reason.trim() {
            "" => "unknown error",
            reason => reason,
        };
        let conn = self.get_conn().await?;
        let row = conn
            .do_query_opt(
                "UPDATE faucet_claims SET
                    status = 'failed',
                    error_reason = $2,
                    processed_at = $3
                WHERE id = $1 AND status = 'pending'
                RETURNING id, user_id, account_name, amount, tier, status,
                    created_at, processed_at, transaction_id, error_reason",
                &[&id, &reason, &now],
            )
            .await
            .map_err(Error::exec("fail claim"))?;
        match row {
            Some(row) => Ok(Ok(parse_claim(row)?)),
            None => not_pending(&conn, id).await,
        }
    }
}

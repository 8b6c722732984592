use super::*;
use std::collections::BTreeSet;

/// Serializes stats writers on the singleton row.
pub(super) async fn lock_stats(tx: &Transaction<'_>) -> crate::Result<()> {
    tx.do_query_opt("SELECT id FROM faucet_stats WHERE id = 1 FOR UPDATE", &[])
        .await
        .map_err(Error::exec("lock stats"))?
        .ok_or_else(|| Error::not_found("stats", 1))?;
    Ok(())
}

/// Adds a just-completed claim to the totals. Caller holds [`lock_stats`].
pub(super) async fn record_completed_claim(
    tx: &Transaction<'_>,
    claim: &Claim,
    now: DateTime<Utc>,
) -> crate::Result<()> {
    let new_user = tx
        .do_execute(
            "INSERT INTO faucet_stats_known_accounts (account_name) VALUES ($1)
            ON CONFLICT (account_name) DO NOTHING",
            &[&claim.account_name.as_str()],
        )
        .await
        .map_err(Error::exec("insert known account"))?;
    let added_users = new_user as i64;
    tx.do_execute(
        "UPDATE faucet_stats SET
            total_distributed = total_distributed + $1,
            total_users = total_users + $2,
            updated_at = $3
        WHERE id = 1",
        &[&claim.amount.value(), &added_users, &now],
    )
    .await
    .map_err(Error::exec("update stats"))?;
    if new_user == 1 {
        tracing::info!("first completed claim for account {}", claim.account_name);
    }
    Ok(())
}

async fn read_stats<C: DbClient>(conn: &C) -> crate::Result<AggregateStats> {
    let row = conn
        .do_query_one(
            "SELECT total_distributed, total_users, updated_at FROM faucet_stats WHERE id = 1",
            &[],
        )
        .await
        .map_err(Error::exec("select stats"))?;
    let total_users = row
        .try_get::<_, i64>("total_users")
        .map_err(Error::data("faucet_stats.total_users"))?;

    let known_users = conn
        .do_query(
            "SELECT account_name FROM faucet_stats_known_accounts ORDER BY account_name",
            &[],
        )
        .await
        .map_err(Error::exec("select known accounts"))?
        .into_iter()
        .map(|r| {
            let name = r
                .try_get::<_, String>(0)
                .map_err(Error::data("faucet_stats_known_accounts.account_name"))?;
            AccountName::new(&name).map_err(Error::invalid("faucet_stats_known_accounts.account_name"))
        })
        .collect::<crate::Result<BTreeSet<_>>>()?;

    Ok(AggregateStats {
        total_distributed: row
            .try_get("total_distributed")
            .map_err(Error::data("faucet_stats.total_distributed"))?,
        total_users: u64::try_from(total_users).map_err(Error::invalid("faucet_stats.total_users"))?,
        known_users,
        updated_at: row
            .try_get("updated_at")
            .map_err(Error::data("faucet_stats.updated_at"))?,
    })
}

impl RealDbPool {
    pub(crate) async fn get_stats_impl(&self) -> crate::Result<AggregateStats> {
        let conn = self.get_conn().await?;
        read_stats(&conn).await
    }

    pub(crate) async fn recompute_stats_impl(
        &self,
        now: DateTime<Utc>,
    ) -> crate::Result<AggregateStats> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await.map_err(Error::exec("start"))?;
        lock_stats(&tx).await?;

        tx.do_execute("DELETE FROM faucet_stats_known_accounts", &[])
            .await
            .map_err(Error::exec("clear known accounts"))?;
        tx.do_execute(
            "INSERT INTO faucet_stats_known_accounts (account_name)
            SELECT DISTINCT account_name FROM faucet_claims WHERE status = 'completed'",
            &[],
        )
        .await
        .map_err(Error::exec("rebuild known accounts"))?;
        tx.do_execute(
            "UPDATE faucet_stats SET
                total_distributed = (
                    SELECT COALESCE(SUM(amount), 0) FROM faucet_claims WHERE status = 'completed'
                ),
                total_users = (SELECT COUNT(*) FROM faucet_stats_known_accounts),
                updated_at = $1
            WHERE id = 1",
            &[&now],
        )
        .await
        .map_err(Error::exec("rebuild stats"))?;

        let stats = read_stats(&tx).await?;
        tx.commit().await.map_err(Error::exec("commit"))?;

        tracing::info!(
            "recomputed stats: total_distributed={}, total_users={}",
            stats.total_distributed,
            stats.total_users
        );
        Ok(stats)
    }
}

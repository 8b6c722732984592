use super::{AccountInfo, LedgerClient, LedgerError, TransactionId, TransferRequest};
use crate::AccountName;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::{
    str::FromStr,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
    time::Duration,
};

pub const DEFAULT_NODE: &str = "https://api.steemit.com";

const CREATED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct LedgerConfig {
    #[serde(default = "LedgerConfig::default_nodes")]
    pub nodes: Vec<String>,
    #[serde(default = "LedgerConfig::default_faucet_account")]
    pub faucet_account: String,
    /// Signing service that broadcasts transfers. Transfers are simulated
    /// when unset.
    #[serde(default)]
    pub transfer_relay: Option<String>,
    #[serde(default)]
    pub relay_key: Option<String>,
    #[serde(default = "LedgerConfig::default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "LedgerConfig::default_symbol")]
    pub symbol: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            nodes: Self::default_nodes(),
            faucet_account: Self::default_faucet_account(),
            transfer_relay: None,
            relay_key: None,
            timeout_secs: Self::default_timeout_secs(),
            symbol: Self::default_symbol(),
        }
    }
}

impl LedgerConfig {
    fn default_nodes() -> Vec<String> {
        vec![DEFAULT_NODE.to_owned()]
    }

    fn default_faucet_account() -> String {
        "faucet.cur8".to_owned()
    }

    fn default_timeout_secs() -> u64 {
        30
    }

    fn default_symbol() -> String {
        "STEEM".to_owned()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// JSON-RPC client for Steem nodes.
///
/// Lookups rotate to the next node on network failures and remember the last
/// node that answered.
#[derive(Debug)]
pub struct SteemLedger {
    client: reqwest::Client,
    nodes: Vec<String>,
    active: AtomicUsize,
    id: AtomicU64,
    relay: Option<String>,
    relay_key: Option<String>,
    symbol: String,
}

impl SteemLedger {
    pub fn new(client: reqwest::Client, config: &LedgerConfig) -> Self {
        Self {
            client,
            nodes: config.nodes.clone(),
            active: AtomicUsize::new(0),
            id: AtomicU64::new(0),
            relay: config
                .transfer_relay
                .as_ref()
                .map(|url| url.trim_end_matches('/').to_owned()),
            relay_key: config.relay_key.clone(),
            symbol: config.symbol.clone(),
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self::new(client, config))
    }

    fn next_id(&self) -> u64 {
        self.id.fetch_add(1, Ordering::Relaxed)
    }

    async fn call_node(
        &self,
        url: &str,
        method: &str,
        params: &JsonValue,
    ) -> Result<JsonValue, LedgerError> {
        let req = serde_json::json!({
            "jsonrpc": "2.0",
            "id": self.next_id(),
            "method": method,
            "params": params,
        });

        #[derive(Deserialize)]
        struct RpcError {
            code: i64,
            message: String,
        }

        #[derive(Deserialize)]
        struct RpcResponse {
            result: Option<JsonValue>,
            error: Option<RpcError>,
        }

        let resp = self
            .client
            .post(url)
            .json(&req)
            .send()
            .await?
            .error_for_status()?
            .json::<RpcResponse>()
            .await?;
        match (resp.result, resp.error) {
            (_, Some(RpcError { code, message })) => Err(LedgerError::Rpc { code, message }),
            (Some(result), None) => Ok(result),
            (None, None) => Err(LedgerError::InvalidResponse(
                "missing result".to_owned(),
            )),
        }
    }

    /// Calls `method` on each node in turn, starting with the last good one.
    pub async fn call(&self, method: &str, params: JsonValue) -> Result<JsonValue, LedgerError> {
        if self.nodes.is_empty() {
            return Err(LedgerError::NoNodes);
        }
        let start = self.active.load(Ordering::Relaxed);
        let mut last_error = LedgerError::NoNodes;
        for offset in 0..self.nodes.len() {
            let idx = (start + offset) % self.nodes.len();
            let url = &self.nodes[idx];
            match self.call_node(url, method, &params).await {
                Ok(result) => {
                    if idx != start {
                        tracing::info!("switched ledger node to {}", url);
                        self.active.store(idx, Ordering::Relaxed);
                    }
                    return Ok(result);
                }
                Err(error) if error.is_transient() => {
                    tracing::warn!("ledger node {} failed: {}", url, error);
                    last_error = error;
                }
                Err(error) => return Err(error),
            }
        }
        Err(last_error)
    }

    fn simulated_tx_id() -> TransactionId {
        let millis = Utc::now().timestamp_millis();
        let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
        format!("sim-tx-{millis}-{suffix:06}")
    }
}

#[derive(Deserialize)]
struct RawAccount {
    name: String,
    created: String,
    balance: String,
}

fn parse_account(raw: RawAccount) -> Result<AccountInfo, LedgerError> {
    let name = AccountName::new(&raw.name)
        .map_err(|error| LedgerError::InvalidResponse(error.to_string()))?;
    let created_at = parse_created(&raw.created)?;
    let balance = parse_asset(&raw.balance)?;
    Ok(AccountInfo {
        name,
        created_at,
        balance,
    })
}

fn parse_created(s: &str) -> Result<DateTime<Utc>, LedgerError> {
    let naive = NaiveDateTime::parse_from_str(s, CREATED_FORMAT)
        .map_err(|error| LedgerError::InvalidResponse(format!("created {s:?}: {error}")))?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// `"1.000 STEEM"` to `1.000`.
fn parse_asset(s: &str) -> Result<Decimal, LedgerError> {
    let amount = s.split_whitespace().next().unwrap_or_default();
    Decimal::from_str(amount)
        .map_err(|error| LedgerError::InvalidResponse(format!("balance {s:?}: {error}")))
}

#[async_trait::async_trait]
impl LedgerClient for SteemLedger {
    async fn get_account(&self, name: &AccountName) -> Result<Option<AccountInfo>, LedgerError> {
        let result = self
            .call(
                "condenser_api.get_accounts",
                serde_json::json!([[name.as_str()]]),
            )
            .await?;
        let accounts = serde_json::from_value::<Vec<RawAccount>>(result)
            .map_err(|error| LedgerError::InvalidResponse(error.to_string()))?;
        accounts.into_iter().next().map(parse_account).transpose()
    }

    async fn transfer(&self, req: &TransferRequest) -> Result<TransactionId, LedgerError> {
        let Some(relay) = &self.relay else {
            let id = Self::simulated_tx_id();
            tracing::info!(
                "simulated transfer of {} from {} to {}: {}",
                req.amount,
                req.from,
                req.to,
                id
            );
            return Ok(id);
        };

        #[derive(Deserialize)]
        struct RelayResponse {
            transaction_id: String,
        }

        let body = serde_json::json!({
            "from": req.from,
            "to": req.to,
            "amount": req.amount.to_asset_string(&self.symbol),
            "memo": req.memo,
        });
        let mut builder = self.client.post(format!("{relay}/transfer")).json(&body);
        if let Some(key) = &self.relay_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder.send().await?;
        let status = resp.status();
        if status.is_client_error() {
            let text = resp.text().await.unwrap_or_default();
            return Err(LedgerError::Rejected(format!("{status}: {text}")));
        }
        let resp = resp.error_for_status()?.json::<RelayResponse>().await?;
        if resp.transaction_id.is_empty() {
            return Err(LedgerError::InvalidResponse(
                "empty transaction_id".to_owned(),
            ));
        }
        Ok(resp.transaction_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_account() {
        let raw: RawAccount = serde_json::from_value(serde_json::json!({
            "name": "alice",
            "created": "2020-05-04T10:11:12",
            "balance": "12.345 STEEM",
            "other": 1,
        }))
        .unwrap();
        let info = parse_account(raw).unwrap();
        assert_eq!(info.name.as_str(), "alice");
        assert_eq!(info.created_at.to_rfc3339(), "2020-05-04T10:11:12+00:00");
        assert_eq!(info.balance, Decimal::new(12345, 3));
    }

    #[test]
    fn test_parse_bad_balance() {
        assert!(matches!(
            parse_asset("lots STEEM"),
            Err(LedgerError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_simulated_tx_id() {
        let id = SteemLedger::simulated_tx_id();
        assert!(id.starts_with("sim-tx-"));
        assert_eq!(id.split('-').count(), 4);
    }

    #[tokio::test]
    async fn test_no_nodes() {
        let config = LedgerConfig {
            nodes: Vec::new(),
            ..Default::default()
        };
        let ledger = SteemLedger::from_config(&config).unwrap();
        let name = AccountName::new("alice").unwrap();
        assert_eq!(ledger.get_account(&name).await, Err(LedgerError::NoNodes));
    }

    #[tokio::test]
    async fn test_simulated_transfer() {
        let ledger = SteemLedger::from_config(&LedgerConfig::default()).unwrap();
        let req = TransferRequest {
            from: AccountName::new("faucet.cur8").unwrap(),
            to: AccountName::new("alice").unwrap(),
            amount: crate::Amount::milli(2),
            memo: "hi".to_owned(),
        };
        let id = ledger.transfer(&req).await.unwrap();
        assert!(id.starts_with("sim-tx-"));
    }
}

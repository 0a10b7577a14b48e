use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::time::Duration;

use alloy_primitives::{B256, Bytes};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::IndexError;
use crate::events::LogRecord;

/// Ordered access to contract logs and block hashes.
pub trait LogSource: Send + Sync {
    fn latest_block(&self) -> impl Future<Output = Result<u64, IndexError>> + Send;

    /// `None` when the block is not known to the source.
    fn block_hash(
        &self,
        number: u64,
    ) -> impl Future<Output = Result<Option<String>, IndexError>> + Send;

    /// Logs of `contract` in `from_block..=to_block`, ordered by
    /// `(block, transaction index, log index)`.
    fn fetch_logs(
        &self,
        contract: &str,
        from_block: u64,
        to_block: u64,
    ) -> impl Future<Output = Result<Vec<LogRecord>, IndexError>> + Send;
}

struct Endpoint {
    url: String,
    client: HttpClient,
}

/// EVM JSON-RPC log source. Endpoints are tried in configured order.
pub struct RpcLogSource {
    endpoints: Vec<Endpoint>,
}

impl RpcLogSource {
    pub fn new(rpcs: &[String], timeout: Duration) -> Result<Self, IndexError> {
        assert!(!rpcs.is_empty(), "At least one RPC endpoint must be provided");
        assert!(
            timeout >= Duration::from_millis(100),
            "Timeout below 100ms is unsafe"
        );

        let endpoints = rpcs
            .iter()
            .map(|url| {
                let client = HttpClientBuilder::default()
                    .request_timeout(timeout)
                    .build(url)
                    .map_err(|err| {
                        IndexError::InvalidConfig(format!("RPC endpoint {url} is unusable: {err}"))
                    })?;
                Ok(Endpoint {
                    url: url.clone(),
                    client,
                })
            })
            .collect::<Result<Vec<_>, IndexError>>()?;

        Ok(Self { endpoints })
    }

    pub async fn chain_id(&self) -> Result<u64, IndexError> {
        let raw: String = self.call("eth_chainId", rpc_params![]).await?;
        parse_quantity(&raw)
    }

    async fn block_header(&self, number: u64) -> Result<Option<RpcBlockHeader>, IndexError> {
        self.call("eth_getBlockByNumber", rpc_params![quantity(number), false])
            .await
    }

    async fn call<R: DeserializeOwned>(
        &self,
        method: &'static str,
        params: ArrayParams,
    ) -> Result<R, IndexError> {
        let mut last_error = String::new();
        for endpoint in &self.endpoints {
            match endpoint.client.request::<R, _>(method, params.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(endpoint = %endpoint.url, method, error = %err, "RPC call failed");
                    last_error = err.to_string();
                }
            }
        }
        Err(IndexError::SourceUnavailable(format!(
            "{method} failed on every endpoint: {last_error}"
        )))
    }
}

impl LogSource for RpcLogSource {
    async fn latest_block(&self) -> Result<u64, IndexError> {
        let raw: String = self.call("eth_blockNumber", rpc_params![]).await?;
        let latest = parse_quantity(&raw)?;
        assert!(
            latest <= i64::MAX as u64,
            "Block height exceeds storage bounds"
        );
        Ok(latest)
    }

    async fn block_hash(&self, number: u64) -> Result<Option<String>, IndexError> {
        Ok(self
            .block_header(number)
            .await?
            .map(|header| header.canonical_hash()))
    }

    async fn fetch_logs(
        &self,
        contract: &str,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LogRecord>, IndexError> {
        assert!(from_block <= to_block, "Log range must not be inverted");
        let filter = json!({
            "address": contract,
            "fromBlock": quantity(from_block),
            "toBlock": quantity(to_block),
        });
        let raw: Vec<RpcLog> = self.call("eth_getLogs", rpc_params![filter]).await?;

        let missing: BTreeSet<u64> = raw
            .iter()
            .filter(|log| log.block_timestamp.is_none())
            .filter_map(|log| log.block_number.as_deref())
            .map(parse_quantity)
            .collect::<Result<_, _>>()?;
        let mut timestamps = BTreeMap::new();
        for number in missing {
            let header = self.block_header(number).await?.ok_or_else(|| {
                IndexError::SourceUnavailable(format!("block {number} disappeared while fetching logs"))
            })?;
            timestamps.insert(number, parse_quantity(&header.timestamp)?);
        }

        let mut logs = Vec::with_capacity(raw.len());
        for log in raw {
            if let Some(record) = into_record(log, &timestamps)? {
                logs.push(record);
            }
        }
        logs.sort_by_key(LogRecord::ordering_key);
        debug!(contract, from_block, to_block, count = logs.len(), "Fetched logs");
        Ok(logs)
    }
}

#[derive(Debug, Deserialize)]
struct RpcBlockHeader {
    hash: String,
    timestamp: String,
}

impl RpcBlockHeader {
    /// Lower-case, as stored for reorg detection.
    fn canonical_hash(&self) -> String {
        self.hash.to_ascii_lowercase()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: String,
    topics: Vec<String>,
    data: String,
    block_number: Option<String>,
    block_hash: Option<String>,
    block_timestamp: Option<String>,
    transaction_index: Option<String>,
    log_index: Option<String>,
    transaction_hash: Option<String>,
    #[serde(default)]
    removed: bool,
}

/// Converts a wire log. Removed logs yield `None`; pending logs (no block
/// number) are a source error since a confirmed range was requested.
fn into_record(
    log: RpcLog,
    timestamps: &BTreeMap<u64, u64>,
) -> Result<Option<LogRecord>, IndexError> {
    if log.removed {
        return Ok(None);
    }
    let field = |value: Option<String>, name: &str| {
        value.ok_or_else(|| IndexError::SourceUnavailable(format!("log is missing {name}")))
    };

    let block_number = parse_quantity(&field(log.block_number, "blockNumber")?)?;
    let block_timestamp = match log.block_timestamp.as_deref() {
        Some(raw) => parse_quantity(raw)?,
        None => *timestamps.get(&block_number).ok_or_else(|| {
            IndexError::SourceUnavailable(format!("no timestamp for block {block_number}"))
        })?,
    };
    let topics = log
        .topics
        .iter()
        .map(|topic| {
            topic
                .parse::<B256>()
                .map_err(|err| IndexError::SourceUnavailable(format!("bad topic {topic}: {err}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let data = hex::decode(log.data.trim_start_matches("0x"))
        .map_err(|err| IndexError::SourceUnavailable(format!("bad log data: {err}")))?;

    Ok(Some(LogRecord {
        address: log.address.to_ascii_lowercase(),
        topics,
        data: Bytes::from(data),
        block_number,
        block_hash: log.block_hash.map(|hash| hash.to_ascii_lowercase()),
        block_timestamp,
        transaction_index: parse_quantity(&field(log.transaction_index, "transactionIndex")?)?,
        log_index: parse_quantity(&field(log.log_index, "logIndex")?)?,
        transaction_hash: field(log.transaction_hash, "transactionHash")?.to_ascii_lowercase(),
    }))
}

pub fn quantity(value: u64) -> String {
    format!("0x{value:x}")
}

/// Parses an `0x`-prefixed hex quantity.
pub fn parse_quantity(raw: &str) -> Result<u64, IndexError> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| IndexError::SourceUnavailable(format!("quantity {raw:?} lacks 0x prefix")))?;
    u64::from_str_radix(digits, 16)
        .map_err(|err| IndexError::SourceUnavailable(format!("quantity {raw:?}: {err}")))
}

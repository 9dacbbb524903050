use std::collections::HashMap;
use std::sync::Arc;

use alloy::{
    primitives::Address,
    providers::{DynProvider, Provider, ProviderBuilder, WsConnect},
    rpc::types::{Filter, Log},
    sol_types::SolEvent,
};
use anyhow::Context;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use url::Url;

use crate::abis::{BountyClaimed, BountyOpened, TransferSent};
use crate::config::ChainSettings;
use crate::gateway::{ChainGateway, GatewayError, RawLogEntry};

/// JSON-RPC chain gateway.
///
/// Height and range queries go over HTTP. The live subscription opens a
/// fresh WebSocket connection per `subscribe` call, so a reconnect after a
/// dropped stream is just another call.
pub struct RpcGateway {
    http: DynProvider,
    ws_url: Url,
    filter: Filter,
}

impl RpcGateway {
    /// Build the gateway from chain configuration. Address or URL parse
    /// failures are startup errors, not runtime conditions.
    pub fn new(settings: &ChainSettings) -> anyhow::Result<Self> {
        let rpc_url: Url = settings.rpc_url.parse().context("Invalid RPC URL")?;
        let ws_url: Url = settings.ws_url.parse().context("Invalid WebSocket URL")?;
        let tip_jar: Address = settings
            .tip_jar_address
            .parse()
            .context("Invalid TipJar contract address")?;
        let bounty_board: Address = settings
            .bounty_board_address
            .parse()
            .context("Invalid BountyBoard contract address")?;

        let http = DynProvider::new(ProviderBuilder::new().connect_http(rpc_url));

        let filter = Filter::new().address(vec![tip_jar, bounty_board]).event_signature(vec![
            TransferSent::SIGNATURE_HASH,
            BountyOpened::SIGNATURE_HASH,
            BountyClaimed::SIGNATURE_HASH,
        ]);

        Ok(Self {
            http,
            ws_url,
            filter,
        })
    }

    /// Resolve timestamps for every distinct block referenced by `logs`.
    /// Nodes that attach `blockTimestamp` to logs skip the extra round
    /// trips entirely.
    async fn block_timestamps(&self, logs: &[Log]) -> Result<HashMap<u64, u64>, GatewayError> {
        let mut timestamps: HashMap<u64, u64> = HashMap::new();
        for log in logs {
            let Some(number) = log.block_number else {
                continue;
            };
            if timestamps.contains_key(&number) {
                continue;
            }
            if let Some(ts) = log.block_timestamp {
                timestamps.insert(number, ts);
                continue;
            }
            let block = self
                .http
                .get_block_by_number(number.into())
                .await
                .map_err(transient)?
                .ok_or_else(|| {
                    GatewayError::Transient(format!("block {number} not yet available"))
                })?;
            timestamps.insert(number, block.header.timestamp);
        }
        Ok(timestamps)
    }

    fn to_entry(log: &Log, block_timestamp: u64) -> Option<RawLogEntry> {
        Some(RawLogEntry {
            address: log.address(),
            block_number: log.block_number?,
            block_timestamp,
            log_index: log.log_index?,
            tx_hash: log.transaction_hash?,
            data: log.inner.data.clone(),
        })
    }
}

fn transient<E: std::fmt::Display>(e: E) -> GatewayError {
    GatewayError::Transient(e.to_string())
}

#[async_trait]
impl ChainGateway for RpcGateway {
    async fn current_height(&self) -> Result<u64, GatewayError> {
        self.http.get_block_number().await.map_err(transient)
    }

    async fn query_range(&self, from: u64, to: u64) -> Result<Vec<RawLogEntry>, GatewayError> {
        if from > to {
            return Err(GatewayError::InvalidRange { from, to });
        }

        let filter = self.filter.clone().from_block(from).to_block(to);
        let logs = self.http.get_logs(&filter).await.map_err(transient)?;
        let timestamps = self.block_timestamps(&logs).await?;

        let mut entries: Vec<RawLogEntry> = logs
            .iter()
            .filter_map(|log| {
                let ts = log
                    .block_number
                    .and_then(|n| timestamps.get(&n))
                    .copied()
                    .unwrap_or_default();
                Self::to_entry(log, ts)
            })
            .collect();

        // eth_getLogs output is usually already ordered, but nothing in the
        // JSON-RPC spec guarantees it across providers.
        entries.sort_by_key(|e| (e.block_number, e.log_index));
        Ok(entries)
    }

    async fn subscribe(&self) -> Result<BoxStream<'static, RawLogEntry>, GatewayError> {
        let ws = ProviderBuilder::new()
            .connect_ws(WsConnect::new(self.ws_url.as_str()))
            .await
            .map_err(transient)?;

        let subscription = ws.subscribe_logs(&self.filter).await.map_err(transient)?;

        // The provider must outlive the stream or the subscription channel
        // closes under us.
        let keep_alive = Arc::new(ws);
        let http = self.http.clone();

        let stream = subscription
            .into_stream()
            .filter_map(move |log| {
                let _provider = keep_alive.clone();
                let http = http.clone();
                async move {
                    let block_timestamp = match (log.block_timestamp, log.block_number) {
                        (Some(ts), _) => ts,
                        (None, Some(number)) => http
                            .get_block_by_number(number.into())
                            .await
                            .ok()
                            .flatten()
                            .map(|block| block.header.timestamp)
                            .unwrap_or_default(),
                        (None, None) => 0,
                    };
                    RpcGateway::to_entry(&log, block_timestamp)
                }
            })
            .boxed();

        Ok(stream)
    }
}

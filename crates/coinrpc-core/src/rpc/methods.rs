//! Typed wrappers for common node RPCs.
//!
//! Each wrapper comes in two forms: `foo_async` issues the call and returns a
//! [`TypedFuture`], and `foo` waits for it. Results that do not have the
//! expected shape surface as [`CoreError::Decode`].

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bitcoin::consensus::encode::{deserialize_hex, serialize_hex};
use bitcoin::{BlockHash, Transaction, Txid};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::CoreError;

use super::client::Client;
use super::command::RawCommand;
use super::context::CallContext;
use super::future::ResponseFuture;
use super::types::ChainInfo;

type Parser<T> = fn(Value) -> Result<T, CoreError>;

/// A [`ResponseFuture`] whose raw result is converted to `T` on arrival.
#[must_use = "futures do nothing unless awaited"]
pub struct TypedFuture<T> {
    inner: ResponseFuture,
    parse: Parser<T>,
}

impl<T> TypedFuture<T> {
    fn new(inner: ResponseFuture, parse: Parser<T>) -> Self {
        Self { inner, parse }
    }

    pub fn id(&self) -> Option<u64> {
        self.inner.id()
    }

    pub async fn receive(self) -> Result<T, CoreError> {
        self.await
    }
}

impl<T> Future for TypedFuture<T> {
    type Output = Result<T, CoreError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(reply) => Poll::Ready(reply.and_then(this.parse)),
        }
    }
}

// ==============================================================================
// Result Parsers
// ==============================================================================

fn parse_json<T: DeserializeOwned>(raw: Value) -> Result<T, CoreError> {
    serde_json::from_value(raw).map_err(|e| CoreError::Decode(e.to_string()))
}

fn parse_str(raw: &Value, what: &str) -> Result<String, CoreError> {
    raw.as_str()
        .map(str::to_owned)
        .ok_or_else(|| CoreError::Decode(format!("expected {what} string, got {raw}")))
}

fn parse_block_hash(raw: Value) -> Result<BlockHash, CoreError> {
    parse_str(&raw, "block hash")?
        .parse()
        .map_err(|e| CoreError::Decode(format!("invalid block hash: {e}")))
}

fn parse_txid(raw: Value) -> Result<Txid, CoreError> {
    parse_str(&raw, "txid")?
        .parse()
        .map_err(|e| CoreError::Decode(format!("invalid txid: {e}")))
}

fn parse_transaction(raw: Value) -> Result<Transaction, CoreError> {
    let hex = parse_str(&raw, "transaction hex")?;
    deserialize_hex(&hex).map_err(|e| CoreError::Decode(format!("invalid transaction: {e}")))
}

// ==============================================================================
// Wrappers
// ==============================================================================

impl Client {
    async fn send_typed<T>(
        &self,
        ctx: &CallContext,
        method: &str,
        params: Vec<Value>,
        parse: Parser<T>,
    ) -> TypedFuture<T> {
        let command = RawCommand::new(method, params);
        TypedFuture::new(self.send_command(ctx, &command).await, parse)
    }

    pub async fn get_block_count_async(&self, ctx: &CallContext) -> TypedFuture<u64> {
        self.send_typed(ctx, "getblockcount", Vec::new(), parse_json)
            .await
    }

    /// Height of the most-work fully validated chain.
    pub async fn get_block_count(&self, ctx: &CallContext) -> Result<u64, CoreError> {
        self.get_block_count_async(ctx).await.receive().await
    }

    pub async fn get_best_block_hash_async(&self, ctx: &CallContext) -> TypedFuture<BlockHash> {
        self.send_typed(ctx, "getbestblockhash", Vec::new(), parse_block_hash)
            .await
    }

    pub async fn get_best_block_hash(&self, ctx: &CallContext) -> Result<BlockHash, CoreError> {
        self.get_best_block_hash_async(ctx).await.receive().await
    }

    pub async fn get_block_hash_async(
        &self,
        ctx: &CallContext,
        height: u64,
    ) -> TypedFuture<BlockHash> {
        self.send_typed(
            ctx,
            "getblockhash",
            vec![Value::from(height)],
            parse_block_hash,
        )
        .await
    }

    /// Hash of the block at `height` in the active chain.
    pub async fn get_block_hash(
        &self,
        ctx: &CallContext,
        height: u64,
    ) -> Result<BlockHash, CoreError> {
        self.get_block_hash_async(ctx, height).await.receive().await
    }

    pub async fn get_blockchain_info_async(&self, ctx: &CallContext) -> TypedFuture<ChainInfo> {
        self.send_typed(ctx, "getblockchaininfo", Vec::new(), parse_json)
            .await
    }

    pub async fn get_blockchain_info(&self, ctx: &CallContext) -> Result<ChainInfo, CoreError> {
        self.get_blockchain_info_async(ctx).await.receive().await
    }

    pub async fn get_raw_transaction_async(
        &self,
        ctx: &CallContext,
        txid: &Txid,
    ) -> TypedFuture<Transaction> {
        // Non-verbose: the node answers with the serialized transaction hex.
        self.send_typed(
            ctx,
            "getrawtransaction",
            vec![Value::from(txid.to_string()), Value::from(0)],
            parse_transaction,
        )
        .await
    }

    /// Fetch and decode a transaction. Needs `-txindex` on the node unless
    /// the transaction is in the mempool.
    pub async fn get_raw_transaction(
        &self,
        ctx: &CallContext,
        txid: &Txid,
    ) -> Result<Transaction, CoreError> {
        self.get_raw_transaction_async(ctx, txid)
            .await
            .receive()
            .await
    }

    pub async fn send_raw_transaction_async(
        &self,
        ctx: &CallContext,
        tx: &Transaction,
    ) -> TypedFuture<Txid> {
        self.send_typed(
            ctx,
            "sendrawtransaction",
            vec![Value::from(serialize_hex(tx))],
            parse_txid,
        )
        .await
    }

    /// Submit `tx` to the node's mempool and relay it.
    pub async fn send_raw_transaction(
        &self,
        ctx: &CallContext,
        tx: &Transaction,
    ) -> Result<Txid, CoreError> {
        self.send_raw_transaction_async(ctx, tx)
            .await
            .receive()
            .await
    }
}

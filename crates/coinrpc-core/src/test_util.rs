//! Shared test helpers for `coinrpc-core` unit tests.

use std::sync::{Arc, Once};

use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};

use crate::config::ConnConfig;
use crate::rpc::mock::MockStream;
use crate::rpc::Client;

// ==============================================================================
// Tracing
// ==============================================================================

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once per test binary. Filter with
/// `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// ==============================================================================
// Client Builders
// ==============================================================================

/// A persistent-mode client attached to a fresh [`MockStream`].
pub async fn connected_client(config: ConnConfig) -> (Client, Arc<MockStream>) {
    let client = Client::new(config).expect("test config must be valid");
    let stream = Arc::new(MockStream::default());
    client
        .attach(stream.clone())
        .await
        .expect("fresh client must attach");
    (client, stream)
}

/// Successful reply envelope for request `id`.
pub fn reply_to(id: u64, result: serde_json::Value) -> String {
    serde_json::json!({ "id": id, "result": result, "error": null }).to_string()
}

// ==============================================================================
// Transactions
// ==============================================================================

/// One-in, one-out legacy transaction spending a dummy outpoint.
pub fn sample_transaction() -> Transaction {
    // Minimal valid P2WPKH scriptPubKey: OP_0 PUSH20 <20-byte-hash>.
    let mut script = vec![0x00, 0x14];
    script.extend(1..=20u8);

    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::new(Txid::from_byte_array([1; 32]), 0),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(50_000),
            script_pubkey: ScriptBuf::from_bytes(script),
        }],
    }
}

// Copyright (C) 2022-2024 Webb Technologies Inc.
//
// Tangle is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Tangle is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should receive a copy of the GNU General Public License
// If not, see <http://www.gnu.org/licenses/>.

#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Common building blocks shared by every crate of the orchestrator:
//! the error type, retry policies, the probe log target and metrics.

use ethers::types::U256;

/// Metrics functionality
pub mod metric;
/// A module used for debugging orchestrator lifecycle, loop state, or other
/// internal state.
pub mod probe;
/// Retry functionality
pub mod retry;

/// An enum of all possible errors that could be encountered during the
/// execution of the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON Error occurred.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Config loading error.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Error while iterating over a glob pattern.
    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),
    /// Error from Glob Iterator.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),
    /// Error while parsing a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// Reqwest error
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// Error in Http Provider (ethers client).
    #[error(transparent)]
    EthersProvider(#[from] ethers::providers::ProviderError),
    /// ABI encoding or decoding error.
    #[error(transparent)]
    EthersAbi(#[from] ethers::abi::Error),
    /// Ether wallet errors.
    #[error(transparent)]
    EtherWalletError(#[from] ethers::signers::WalletError),
    /// Signature parsing or recovery error.
    #[error(transparent)]
    Signature(#[from] ethers::types::SignatureError),
    /// Elliptic Curve error.
    #[error(transparent)]
    EllipticCurve(#[from] ethers::core::k256::elliptic_curve::Error),
    /// ECDSA signing error.
    #[error(transparent)]
    Ecdsa(#[from] ethers::core::k256::ecdsa::Error),
    /// Tendermint RPC error.
    #[error(transparent)]
    TendermintRpc(#[from] cosmrs::rpc::Error),
    /// Protobuf encoding error.
    #[error(transparent)]
    ProstEncode(#[from] prost::EncodeError),
    /// Prometheus registry error.
    #[error(transparent)]
    Prometheus(#[from] prometheus::Error),
    /// Error while parsing the config files.
    #[error("Config parse error: {}", _0)]
    ParseConfig(#[from] serde_path_to_error::Error<config::ConfigError>),
    /// Error reported by the Cosmos SDK tx tooling.
    #[error("Cosmos tx error: {}", _0)]
    Cosmos(String),
    /// A smart contract call failed.
    #[error("Contract call failed: {}", _0)]
    ContractCall(String),
    /// Generic error.
    #[error("{}", _0)]
    Generic(&'static str),
    /// The node answered with something we could not make sense of.
    #[error("Invalid response from {}: {}", endpoint, reason)]
    InvalidResponse {
        /// The endpoint that was queried.
        endpoint: String,
        /// Why the response was rejected.
        reason: String,
    },
    /// The queried entity does not exist (yet).
    #[error("{} not found", _0)]
    NotFound(String),
    /// An observed event nonce does not follow the last observed one.
    #[error("Event nonce gap: expected {}, got {}", expected, got)]
    NonceGap {
        /// The nonce the home chain expects next.
        expected: u64,
        /// The nonce that was found instead.
        got: u64,
    },
    /// The gas price on the EVM chain is above the configured maximum.
    #[error("Gas price {} is above the maximum of {}", gas_price, max_gas_price)]
    FeeTooHigh {
        /// The adjusted gas price that would have been used.
        gas_price: U256,
        /// The configured cap.
        max_gas_price: U256,
    },
    /// The fees of a batch do not cover the threshold.
    #[error("Batch for token {} is not profitable", token)]
    Unprofitable {
        /// The token of the batch.
        token: String,
    },
    /// The configuration is invalid.
    #[error("Invalid configuration: {}", _0)]
    InvalidConfig(String),
    /// The configured signer cannot sign without human interaction.
    #[error("Signing unavailable: {}", _0)]
    SigningUnavailable(String),
    /// Missing Secrets in the config, either Private key or keystore.
    #[error("Missing required private-key or keystore in the config")]
    MissingSecrets,
    /// Failed to fetch the price of a token.
    #[error("Failed to fetch token price for token: {token}")]
    FetchTokenPriceError {
        /// The token identifier.
        token: String,
    },
    /// A broadcast transaction was not committed in time.
    #[error("Tx {} was not committed before the timeout", tx_hash)]
    BroadcastTimeout {
        /// Hash of the broadcast transaction.
        tx_hash: String,
    },
    /// A broadcast transaction was rejected by the home chain.
    #[error("Tx rejected with code {}: {}", code, log)]
    BroadcastFailed {
        /// ABCI result code.
        code: u32,
        /// Raw log returned by the node.
        log: String,
    },
    /// An EVM transaction was mined but reverted.
    #[error("Tx {} reverted", tx_hash)]
    TxReverted {
        /// Hash of the reverted transaction.
        tx_hash: String,
    },
    /// A connection did not become ready in time.
    #[error("Timed out while connecting to {}", endpoint)]
    ConnectionTimeout {
        /// The endpoint that did not answer.
        endpoint: String,
    },
    /// The enclosing scope was cancelled.
    #[error("Task cancelled")]
    Cancelled,
}

impl Error {
    /// Returns `true` if this error is the result of a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<cosmrs::ErrorReport> for Error {
    fn from(report: cosmrs::ErrorReport) -> Self {
        Error::Cosmos(report.to_string())
    }
}

/// A type alias for the result for the orchestrator, that uses the `Error`
/// enum.
pub type Result<T> = std::result::Result<T, Error>;

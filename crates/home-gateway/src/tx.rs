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

//! Building, signing and broadcasting home-chain transactions.

use std::future::Future;
use std::time::Duration;

use cosmrs::proto::cosmos::tx::signing::v1beta1::SignMode;
use cosmrs::proto::cosmos::tx::v1beta1::TxRaw;
use cosmrs::rpc::{Client, HttpClient};
use cosmrs::tx::{self, Fee, ModeInfo, SignDoc, SignerInfo, SignerPublicKey};
use cosmrs::{AccountId, Any, Coin};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::H256;
use ethers::utils::keccak256;
use hyperion_orchestrator_utils::{Error, Result};
use prost::Message;
use regex::Regex;
use tokio::sync::Mutex;

use crate::proto::{EthSecp256k1PubKey, TypeUrl};
use crate::rest::{AccountResponse, RestClient};

/// How often a broadcast transaction is looked up while waiting for it.
const COMMIT_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// `ErrWrongSequence` of the cosmos sdk.
const WRONG_SEQUENCE_CODE: u32 = 32;

/// The sequence the node expects, from the log of a rejected transaction.
///
/// The sdk logs `account sequence mismatch, expected 12, got 11`.
fn expected_sequence(log: &str) -> Option<u64> {
    let re = Regex::new(r"expected (\d+), got \d+").ok()?;
    re.captures(log)?.get(1)?.as_str().parse().ok()
}

/// Hands out account sequences to concurrent broadcasts.
///
/// Signing and submitting to the mempool happen one transaction at a time,
/// so two transactions never carry the same sequence. The node may lag
/// behind the transactions we already submitted, the larger of both wins.
#[derive(Debug, Default)]
pub(crate) struct SequenceLock {
    next: Mutex<Option<u64>>,
}

impl SequenceLock {
    /// Runs `submit` with the account number and sequence to sign with.
    ///
    /// `meta` is read while holding the lock and returns the account number
    /// and the sequence the node reports.
    pub(crate) async fn submit<T, M, MF, S, SF>(
        &self,
        meta: M,
        submit: S,
    ) -> Result<T>
    where
        M: FnOnce() -> MF,
        MF: Future<Output = Result<(u64, u64)>>,
        S: FnOnce(u64, u64) -> SF,
        SF: Future<Output = Result<T>>,
    {
        let mut next = self.next.lock().await;
        let (account_number, on_chain) = meta().await?;
        let sequence = next.map_or(on_chain, |n| n.max(on_chain));
        match submit(account_number, sequence).await {
            Ok(submitted) => {
                *next = Some(sequence + 1);
                Ok(submitted)
            }
            Err(Error::BroadcastFailed { code, log }) => {
                if code == WRONG_SEQUENCE_CODE {
                    *next = expected_sequence(&log);
                    tracing::debug!(
                        sequence,
                        expected = ?*next,
                        "sequence out of sync with the mempool"
                    );
                }
                Err(Error::BroadcastFailed { code, log })
            }
            Err(e) => Err(e),
        }
    }
}

/// Fee and gas settings of every transaction.
#[derive(Debug, Clone)]
pub struct GasSettings {
    pub gas_limit: u64,
    /// Price per unit of gas, in `denom`.
    pub gas_price: f64,
    pub denom: String,
}

impl GasSettings {
    fn fee(&self) -> Result<Fee> {
        let amount = (self.gas_limit as f64 * self.gas_price).ceil() as u128;
        let coin = Coin {
            amount,
            denom: self.denom.parse()?,
        };
        Ok(Fee::from_amount_and_gas(coin, self.gas_limit))
    }
}

/// Signs transactions with an ethsecp256k1 key and broadcasts them through
/// Tendermint RPC.
#[derive(Debug)]
pub struct Broadcaster {
    rpc: HttpClient,
    rest: RestClient,
    wallet: LocalWallet,
    account: AccountId,
    chain_id: cosmrs::tendermint::chain::Id,
    gas: GasSettings,
    commit_timeout: Duration,
    sequence: SequenceLock,
}

impl Broadcaster {
    /// Creates a broadcaster for the account of `wallet`.
    pub fn new(
        rpc: HttpClient,
        rest: RestClient,
        wallet: LocalWallet,
        account_prefix: &str,
        chain_id: &str,
        gas: GasSettings,
        commit_timeout: Duration,
    ) -> Result<Self> {
        let account = account_id(&wallet, account_prefix)?;
        let chain_id = chain_id.parse().map_err(|e| {
            Error::InvalidConfig(format!("home chain id {chain_id}: {e}"))
        })?;
        Ok(Self {
            rpc,
            rest,
            wallet,
            account,
            chain_id,
            gas,
            commit_timeout,
            sequence: SequenceLock::default(),
        })
    }

    /// The bech32 account that signs and pays for transactions.
    pub fn account(&self) -> &AccountId {
        &self.account
    }

    async fn account_meta(&self) -> Result<(u64, u64)> {
        let path = format!("cosmos/auth/v1beta1/accounts/{}", self.account);
        let res: AccountResponse = self
            .rest
            .get(&path, &[])
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("account {}", self.account))
            })?;
        let base = res
            .account
            .base_account
            .or(res.account.inline)
            .ok_or_else(|| Error::InvalidResponse {
                endpoint: path,
                reason: "no account number or sequence".into(),
            })?;
        Ok((base.account_number, base.sequence))
    }

    fn public_key(&self) -> Any {
        let point = self
            .wallet
            .signer()
            .verifying_key()
            .to_encoded_point(true);
        EthSecp256k1PubKey {
            key: point.as_bytes().to_vec(),
        }
        .to_any()
    }

    /// Builds the signed `TxRaw` bytes of `msgs`.
    pub(crate) fn sign_tx(
        &self,
        msgs: Vec<Any>,
        account_number: u64,
        sequence: u64,
    ) -> Result<Vec<u8>> {
        let body = tx::Body::new(msgs, "", 0u32);
        let signer_info = SignerInfo {
            public_key: Some(SignerPublicKey::Any(self.public_key())),
            mode_info: ModeInfo::single(SignMode::Direct),
            sequence,
        };
        let auth_info = signer_info.auth_info(self.gas.fee()?);
        let sign_doc =
            SignDoc::new(&body, &auth_info, &self.chain_id, account_number)?;
        let sign_bytes = sign_doc.clone().into_bytes()?;
        let digest = H256(keccak256(sign_bytes));
        let sig = self.wallet.sign_hash(digest)?;
        // r ‖ s ‖ v with v as the raw recovery id.
        let mut raw_sig = sig.to_vec();
        raw_sig[64] = raw_sig[64].saturating_sub(27);
        Ok(TxRaw {
            body_bytes: sign_doc.body_bytes,
            auth_info_bytes: sign_doc.auth_info_bytes,
            signatures: vec![raw_sig],
        }
        .encode_to_vec())
    }

    /// Signs `msgs` into one transaction, broadcasts it and waits until it
    /// is committed.
    #[tracing::instrument(skip_all, fields(msg = %msgs.first().map(|m| m.type_url.as_str()).unwrap_or_default()))]
    pub async fn broadcast(&self, msgs: Vec<Any>) -> Result<()> {
        let hash = self
            .sequence
            .submit(
                || self.account_meta(),
                |account_number, sequence| async move {
                    let tx_bytes =
                        self.sign_tx(msgs, account_number, sequence)?;
                    let res = self.rpc.broadcast_tx_sync(tx_bytes).await?;
                    if res.code.is_err() {
                        tracing::warn!(
                            code = res.code.value(),
                            log = %res.log,
                            sequence,
                            "tx rejected by mempool"
                        );
                        return Err(Error::BroadcastFailed {
                            code: res.code.value(),
                            log: res.log,
                        });
                    }
                    tracing::debug!(
                        tx_hash = %res.hash,
                        sequence,
                        "tx accepted by mempool"
                    );
                    Ok(res.hash)
                },
            )
            .await?;

        let wait = async {
            loop {
                match self.rpc.tx(hash, false).await {
                    Ok(committed) => break committed,
                    Err(e) => {
                        tracing::trace!(
                            tx_hash = %hash,
                            error = %e,
                            "tx not committed yet"
                        );
                        tokio::time::sleep(COMMIT_POLL_INTERVAL).await;
                    }
                }
            }
        };
        let committed = tokio::time::timeout(self.commit_timeout, wait)
            .await
            .map_err(|_| Error::BroadcastTimeout {
                tx_hash: hash.to_string(),
            })?;
        if committed.tx_result.code.is_err() {
            return Err(Error::BroadcastFailed {
                code: committed.tx_result.code.value(),
                log: committed.tx_result.log,
            });
        }
        tracing::debug!(
            tx_hash = %hash,
            height = %committed.height,
            "tx committed",
        );
        Ok(())
    }
}

/// The bech32 account of an ethsecp256k1 key: its ethereum address bytes.
pub fn account_id(wallet: &LocalWallet, prefix: &str) -> Result<AccountId> {
    Ok(AccountId::new(prefix, wallet.address().as_bytes())?)
}

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

use std::sync::Arc;
use std::time::Duration;

use hyperion_home_gateway::HomeChain;
use hyperion_orchestrator_types::PersonalSigner;
use hyperion_orchestrator_utils::metric::Metrics;
use hyperion_orchestrator_utils::{probe, Result};
use typed_builder::TypedBuilder;

use crate::OrchestratorLoop;

/// Signs the valsets and batches our validator has not confirmed yet.
#[derive(TypedBuilder)]
pub struct Signer {
    home: Arc<dyn HomeChain>,
    signer: Arc<dyn PersonalSigner>,
    metrics: Arc<Metrics>,
    /// Address whose missing confirms are looked up.
    #[builder(setter(into))]
    validator: String,
    hyperion_id: u64,
    #[builder(default = Duration::from_secs(60))]
    period: Duration,
}

impl Signer {
    async fn confirm_valsets(&self) -> Result<()> {
        let valsets = self.home.oldest_unsigned_valsets(&self.validator).await?;
        for valset in valsets {
            let checkpoint = valset.checkpoint(self.hyperion_id);
            let signature = self.signer.sign_digest(checkpoint).await?;
            self.home
                .send_valset_confirm(self.signer.address(), &valset, signature)
                .await?;
            self.metrics
                .confirms_submitted
                .with_label_values(&["valset"])
                .inc();
            tracing::info!(
                nonce = valset.nonce,
                ?checkpoint,
                "confirmed valset"
            );
        }
        Ok(())
    }

    async fn confirm_batch(&self) -> Result<()> {
        let Some(batch) =
            self.home.oldest_unsigned_batch(&self.validator).await?
        else {
            return Ok(());
        };
        let hash = batch.hash(self.hyperion_id);
        let signature = self.signer.sign_digest(hash).await?;
        self.home
            .send_batch_confirm(self.signer.address(), &batch, signature)
            .await?;
        self.metrics
            .confirms_submitted
            .with_label_values(&["batch"])
            .inc();
        tracing::info!(
            nonce = batch.batch_nonce,
            token = ?batch.token_contract,
            "confirmed batch",
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl OrchestratorLoop for Signer {
    const TAG: &'static str = "signer";

    fn period(&self) -> Duration {
        self.period
    }

    #[tracing::instrument(skip_all, name = "signer_tick")]
    async fn tick(&self) -> Result<()> {
        let valsets = self.confirm_valsets().await;
        if let Err(e) = &valsets {
            tracing::warn!(error = %e, "valset confirms failed");
        }
        let batch = self.confirm_batch().await;
        if let Err(e) = &batch {
            tracing::warn!(error = %e, "batch confirm failed");
        }
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Signer,
            valsets_ok = valsets.is_ok(),
            batch_ok = batch.is_ok(),
        );
        valsets.and(batch)
    }
}

#[cfg(test)]
mod tests {
    use ethers::types::{Address, RecoveryMessage};

    use super::*;
    use crate::test_utils::*;

    fn signer(home: Arc<FakeHome>) -> Signer {
        Signer::builder()
            .home(home)
            .signer(Arc::new(wallet(7)))
            .metrics(metrics())
            .validator(VALIDATOR)
            .hyperion_id(HYPERION_ID)
            .build()
    }

    #[tokio::test]
    async fn confirms_batch_with_a_personal_signature() {
        let token = Address::repeat_byte(0xbb);
        let b = batch(3, token, 1000);
        let home = FakeHome::with(|s| s.unsigned_batch = Some(b.clone()));
        signer(home.clone()).tick().await.unwrap();
        let state = home.state();
        assert_eq!(state.sent_batch_confirms.len(), 1);
        let (eth_signer, nonce, signature) = &state.sent_batch_confirms[0];
        assert_eq!(*nonce, 3);
        assert_eq!(*eth_signer, eth_address(7));
        let digest = b.hash(HYPERION_ID).as_bytes().to_vec();
        let recovered =
            signature.recover(RecoveryMessage::Data(digest)).unwrap();
        assert_eq!(recovered, eth_address(7));
    }

    #[tokio::test]
    async fn repeated_ticks_confirm_once() {
        let home = FakeHome::with(|s| {
            s.unsigned_valsets =
                vec![valset(1, &[1], &[10]), valset(2, &[1], &[10])];
        });
        let signer = signer(home.clone());
        for _ in 0..3 {
            signer.tick().await.unwrap();
        }
        let nonces: Vec<_> = home
            .state()
            .sent_valset_confirms
            .iter()
            .map(|(_, nonce, _)| *nonce)
            .collect();
        assert_eq!(nonces, vec![1, 2]);
    }

    #[tokio::test]
    async fn failing_valsets_do_not_block_batches() {
        let b = batch(4, Address::repeat_byte(0xbb), 1000);
        let home = FakeHome::with(|s| {
            s.unsigned_valsets = vec![valset(1, &[1], &[10])];
            s.fail_valset_confirms = true;
            s.unsigned_batch = Some(b);
        });
        assert!(signer(home.clone()).tick().await.is_err());
        assert_eq!(home.state().sent_batch_confirms.len(), 1);
    }
}

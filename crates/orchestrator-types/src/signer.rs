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

use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Signature, H256};
use hyperion_orchestrator_utils::Result;

/// Produces EVM personal signatures
/// (`"\x19Ethereum Signed Message:\n32" ‖ digest`) for confirms.
#[async_trait::async_trait]
pub trait PersonalSigner: Send + Sync {
    /// The address recovered from the signatures of this signer.
    fn address(&self) -> Address;
    /// Signs a 32-byte digest, returning a 65-byte r‖s‖v signature.
    async fn sign_digest(&self, digest: H256) -> Result<Signature>;
}

#[async_trait::async_trait]
impl PersonalSigner for LocalWallet {
    fn address(&self) -> Address {
        Signer::address(self)
    }

    async fn sign_digest(&self, digest: H256) -> Result<Signature> {
        let signature = self.sign_message(digest.as_bytes()).await?;
        Ok(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn personal_signature_recovers_to_signer() {
        let wallet = LocalWallet::from_bytes(&[9u8; 32]).unwrap();
        let digest = H256::repeat_byte(0x42);
        let sig = PersonalSigner::sign_digest(&wallet, digest).await.unwrap();
        assert!(sig.v == 27 || sig.v == 28);
        let recovered = sig
            .recover(ethers::types::RecoveryMessage::Data(
                digest.as_bytes().to_vec(),
            ))
            .unwrap();
        assert_eq!(recovered, PersonalSigner::address(&wallet));
    }
}

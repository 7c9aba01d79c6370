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

//! Loading of the orchestrator keys.

use std::path::{Path, PathBuf};

use ethers::signers::{LocalWallet, Signer};
use hyperion_orchestrator_config::{
    EvmChainConfig, HomeChainConfig, KeyringBackend,
};
use hyperion_orchestrator_types::private_key::PrivateKey;
use hyperion_orchestrator_utils::{Error, Result};

fn from_private_key(key: &PrivateKey) -> Result<LocalWallet> {
    Ok(LocalWallet::from_bytes(key.as_bytes())?)
}

/// `<dir>/<name>` when it exists, `<dir>/<name>.json` otherwise.
fn keystore_path(dir: &Path, name: &str) -> PathBuf {
    let exact = dir.join(name);
    if exact.is_file() {
        exact
    } else {
        dir.join(format!("{name}.json"))
    }
}

fn decrypt(dir: &Path, name: &str, passphrase: &str) -> Result<LocalWallet> {
    let path = keystore_path(dir, name);
    tracing::debug!(path = %path.display(), "decrypting keystore");
    Ok(LocalWallet::decrypt_keystore(&path, passphrase)?)
}

/// The key signing EVM transactions and confirms.
pub fn evm_wallet(config: &EvmChainConfig) -> Result<LocalWallet> {
    if config.use_ledger {
        return Err(Error::SigningUnavailable(
            "ledger signers are not supported".into(),
        ));
    }
    let wallet = match (&config.private_key, &config.keystore_dir) {
        (Some(key), _) => from_private_key(key)?,
        (None, Some(dir)) => {
            let name =
                config.key_name.as_deref().ok_or(Error::MissingSecrets)?;
            let passphrase = config.passphrase.as_deref().unwrap_or_default();
            decrypt(dir, name, passphrase)?
        }
        (None, None) => return Err(Error::MissingSecrets),
    };
    Ok(wallet.with_chain_id(config.chain_id))
}

/// The key signing home chain transactions.
pub fn home_wallet(config: &HomeChainConfig) -> Result<LocalWallet> {
    if let Some(key) = &config.private_key {
        return from_private_key(key);
    }
    let passphrase = match config.keyring_backend {
        KeyringBackend::File => {
            config.passphrase.as_deref().ok_or(Error::MissingSecrets)?
        }
        KeyringBackend::Test => "",
        KeyringBackend::Memory => return Err(Error::MissingSecrets),
        KeyringBackend::Os => {
            return Err(Error::InvalidConfig(format!(
                "the os keyring backend is not supported, export the key \
                 of {} to a keystore file",
                config.keyring_app
            )))
        }
        KeyringBackend::Ledger => {
            return Err(Error::SigningUnavailable(
                "ledger signers are not supported".into(),
            ))
        }
    };
    let dir = config.keyring_dir.as_deref().ok_or(Error::MissingSecrets)?;
    let name = config.key_name.as_deref().ok_or(Error::MissingSecrets)?;
    decrypt(dir, name, passphrase)
}

use std::sync::Arc;

use rand::Rng as _;
use testing_framework_core::{
    chain::{AccountId, Keyring, Signer},
    scenario::DynError,
};

/// Development identity. Signatures are the secret followed by the message;
/// the local ledger does not verify them.
#[derive(Clone, Debug)]
pub struct DevSigner {
    address: AccountId,
    secret: [u8; 32],
}

impl DevSigner {
    /// Signer for one of the genesis accounts, e.g. `alice`.
    #[must_use]
    pub fn dev(name: &str) -> Self {
        let mut secret = [0u8; 32];
        let bytes = name.as_bytes();
        let len = bytes.len().min(secret.len());
        secret[..len].copy_from_slice(&bytes[..len]);
        Self {
            address: AccountId::from(name),
            secret,
        }
    }

    #[must_use]
    pub fn random() -> Self {
        let secret: [u8; 32] = rand::thread_rng().r#gen();
        Self {
            address: AccountId(format!("0x{}", hex::encode(&secret[..20]))),
            secret,
        }
    }

    #[must_use]
    pub fn alice() -> Arc<dyn Signer> {
        Arc::new(Self::dev("alice"))
    }
}

impl Signer for DevSigner {
    fn address(&self) -> &AccountId {
        &self.address
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, DynError> {
        let mut signature = Vec::with_capacity(self.secret.len() + message.len());
        signature.extend_from_slice(&self.secret);
        signature.extend_from_slice(message);
        Ok(signature)
    }
}

/// Generates random, unendowed identities.
#[derive(Clone, Copy, Debug, Default)]
pub struct DevKeyring;

impl Keyring for DevKeyring {
    fn generate(&self) -> Arc<dyn Signer> {
        Arc::new(DevSigner::random())
    }
}

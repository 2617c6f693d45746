use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::services::traits::Reauthenticator;

const PBKDF2_ROUNDS: u32 = 100_000;

struct PasswordDigest {
    salt: [u8; 16],
    hash: [u8; 32],
}

fn derive(password: &str, salt: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ROUNDS, &mut out);
    out
}

/// Checks the wallet password against a salted PBKDF2 digest taken at start-up.
/// The plain password is never kept.
pub struct PasswordReauthenticator {
    digest: Option<PasswordDigest>,
}

impl PasswordReauthenticator {
    pub fn new(password: &str) -> Self {
        let salt = rand::random::<[u8; 16]>();
        let hash = derive(password, &salt);
        Self {
            digest: Some(PasswordDigest { salt, hash }),
        }
    }

    /// Reads `WALLET_PASSWORD`. Without it every verification fails as
    /// unavailable rather than wrong.
    pub fn from_env() -> Self {
        match std::env::var("WALLET_PASSWORD") {
            Ok(password) if !password.is_empty() => Self::new(&password),
            _ => {
                tracing::warn!("WALLET_PASSWORD not set, password re-authentication is disabled");
                Self { digest: None }
            }
        }
    }
}

#[async_trait]
impl Reauthenticator for PasswordReauthenticator {
    async fn verify(&self, password: &str) -> Result<bool> {
        let digest = self
            .digest
            .as_ref()
            .ok_or_else(|| anyhow!("no wallet password configured"))?;

        let salt = digest.salt;
        let password = password.to_string();
        // key stretching is CPU bound
        let candidate = tokio::task::spawn_blocking(move || derive(&password, &salt)).await?;

        Ok(bool::from(candidate[..].ct_eq(&digest.hash[..])))
    }
}

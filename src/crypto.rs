//! Password hashing and random tokens.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::config::Argon2Params;

type Result<T> = std::result::Result<T, CryptoError>;

#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("invalid argon2 parameters: {0}")]
    Params(String),
    #[error("cannot hash password: {0}")]
    Hash(String),
    #[error("password does not match")]
    Mismatch,
}

/// Generate `length` random bytes and encode them as hex.
pub fn random_token(length: usize) -> String {
    let mut bytes = vec![0u8; length];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Argon2id hasher producing and checking PHC strings.
///
/// Verification reads the parameters embedded in the PHC string, so hashes
/// made with older costs keep working.
pub struct PasswordManager {
    hasher: Argon2<'static>,
}

impl PasswordManager {
    /// Create a new [`PasswordManager`], with default costs when `params` is
    /// `None`.
    pub fn new(params: Option<Argon2Params>) -> Result<Self> {
        let Argon2Params {
            memory_cost,
            iterations,
            parallelism,
            hash_length,
        } = params.unwrap_or_default();
        let params = Params::new(memory_cost, iterations, parallelism, Some(hash_length))
            .map_err(|err| CryptoError::Params(err.to_string()))?;

        Ok(Self {
            hasher: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash `password` with a fresh salt.
    pub fn hash_password(&self, password: impl AsRef<[u8]>) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);

        self.hasher
            .hash_password(password.as_ref(), &salt)
            .map(|phc| phc.to_string())
            .map_err(|err| CryptoError::Hash(err.to_string()))
    }

    /// Check `password` against a PHC string. A malformed PHC never matches.
    pub fn verify_password(&self, password: impl AsRef<[u8]>, phc: &str) -> Result<()> {
        let phc = PasswordHash::new(phc).map_err(|_| CryptoError::Mismatch)?;

        self.hasher
            .verify_password(password.as_ref(), &phc)
            .map_err(|_| CryptoError::Mismatch)
    }
}

use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::{self, SaltString},
};
use async_trait::async_trait;
use std::sync::Arc;

use crate::{
    error::{CredentialError, StoreError},
    models::{NewAccount, Role},
    repository::AccountStore,
};

/// CredentialVerifier Trait
///
/// One-way secret hashing and verification. The algorithm is pluggable; the
/// rest of the crate only sees opaque hash strings.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn hash(&self, secret: &str) -> Result<String, CredentialError>;
    /// `Ok(false)` on mismatch; `Err` only when the stored hash is unusable.
    async fn verify(&self, secret: &str, hash: &str) -> Result<bool, CredentialError>;
    /// A valid hash of no real secret, verified against when the email is
    /// unknown so both failure paths cost the same.
    fn dummy_hash(&self) -> &str;
}

pub type VerifierState = Arc<dyn CredentialVerifier>;

/// Argon2Verifier
///
/// Argon2id with explicit work-factor parameters. Hashing and verification run
/// on the blocking pool so a slow hash never stalls the async workers.
/// Verification compares digests in constant time (inside `argon2`).
pub struct Argon2Verifier {
    params: Params,
    dummy_hash: String,
}

impl Argon2Verifier {
    /// Builds a verifier with the given memory cost (KiB), iteration count and
    /// lane count.
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self, CredentialError> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| CredentialError::Hashing(e.to_string()))?;
        let dummy_hash = hash_with(&params, "aitu-news-dummy-credential")?;
        Ok(Self { params, dummy_hash })
    }
}

fn hasher(params: &Params) -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone())
}

fn hash_with(params: &Params, secret: &str) -> Result<String, CredentialError> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| CredentialError::Hashing(e.to_string()))?;
    let salt =
        SaltString::encode_b64(&salt_bytes).map_err(|e| CredentialError::Hashing(e.to_string()))?;
    hasher(params)
        .hash_password(secret.as_bytes(), &salt)
        .map(|phc| phc.to_string())
        .map_err(|e| CredentialError::Hashing(e.to_string()))
}

fn verify_with(params: &Params, secret: &str, hash: &str) -> Result<bool, CredentialError> {
    let parsed = PasswordHash::new(hash).map_err(|e| CredentialError::Hashing(e.to_string()))?;
    // The PHC string carries its own parameters; ours only fill in defaults.
    match hasher(params).verify_password(secret.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(CredentialError::Hashing(e.to_string())),
    }
}

#[async_trait]
impl CredentialVerifier for Argon2Verifier {
    async fn hash(&self, secret: &str) -> Result<String, CredentialError> {
        let params = self.params.clone();
        let secret = secret.to_owned();
        tokio::task::spawn_blocking(move || hash_with(&params, &secret))
            .await
            .map_err(|e| CredentialError::Hashing(e.to_string()))?
    }

    async fn verify(&self, secret: &str, hash: &str) -> Result<bool, CredentialError> {
        let params = self.params.clone();
        let secret = secret.to_owned();
        let hash = hash.to_owned();
        tokio::task::spawn_blocking(move || verify_with(&params, &secret, &hash))
            .await
            .map_err(|e| CredentialError::Hashing(e.to_string()))?
    }

    fn dummy_hash(&self) -> &str {
        &self.dummy_hash
    }
}

/// authenticate
///
/// Resolves an email + secret pair to an account id.
///
/// Unknown email, inactive account and wrong secret all return
/// `CredentialError::InvalidCredentials`; callers cannot tell them apart.
/// Store and hashing faults come back as the system variants instead.
pub async fn authenticate(
    accounts: &dyn AccountStore,
    verifier: &dyn CredentialVerifier,
    email: &str,
    secret: &str,
) -> Result<i64, CredentialError> {
    let account = match accounts.get_by_email(email).await {
        Ok(account) => Some(account),
        Err(StoreError::NotFound) => None,
        Err(err) => return Err(CredentialError::Store(err)),
    };

    let Some(account) = account else {
        verifier.verify(secret, verifier.dummy_hash()).await?;
        return Err(CredentialError::InvalidCredentials);
    };

    let matches = verifier.verify(secret, &account.credential_hash).await?;
    if matches && account.active {
        Ok(account.id)
    } else {
        Err(CredentialError::InvalidCredentials)
    }
}

/// register_account
///
/// Hashes `secret` and inserts a new, unapproved account. A taken email comes
/// back as `CredentialError::DuplicateEmail` and nothing is written.
pub async fn register_account(
    accounts: &dyn AccountStore,
    verifier: &dyn CredentialVerifier,
    name: &str,
    email: &str,
    secret: &str,
    role: Role,
) -> Result<i64, CredentialError> {
    let credential_hash = verifier.hash(secret).await?;
    let id = accounts
        .insert(NewAccount {
            name: name.to_string(),
            email: email.to_string(),
            credential_hash,
            role,
        })
        .await?;

    tracing::info!(account_id = id, role = %role, "account registered");
    Ok(id)
}

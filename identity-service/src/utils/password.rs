use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};

/// Newtype for password to prevent accidental logging
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Newtype for password hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Argon2id hasher. Verification reads the parameters embedded in each PHC
/// string, so hashes written with other parameters still verify.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl PasswordHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Custom cost parameters (memory in KiB).
    pub fn with_params(
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    ) -> Result<Self, anyhow::Error> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| anyhow::anyhow!("Invalid argon2 parameters: {}", e))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash(&self, password: &Password) -> Result<PasswordHashString, anyhow::Error> {
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = self
            .argon2()
            .hash_password(password.as_str().as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
            .to_string();

        Ok(PasswordHashString::new(password_hash))
    }

    /// `Ok(false)` on mismatch; `Err` only for a malformed stored hash.
    pub fn verify(
        &self,
        password: &Password,
        password_hash: &PasswordHashString,
    ) -> Result<bool, anyhow::Error> {
        let parsed_hash = PasswordHash::new(password_hash.as_str())
            .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;

        match self
            .argon2()
            .verify_password(password.as_str().as_bytes(), &parsed_hash)
        {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(anyhow::anyhow!("Password verification failed: {}", e)),
        }
    }

    /// Hash on the blocking pool.
    pub async fn hash_blocking(
        &self,
        password: Password,
    ) -> Result<PasswordHashString, anyhow::Error> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password)).await?
    }

    /// Verify on the blocking pool.
    pub async fn verify_blocking(
        &self,
        password: Password,
        password_hash: PasswordHashString,
    ) -> Result<bool, anyhow::Error> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &password_hash)).await?
    }

    /// True if `password` matches any of `hashes`. Malformed entries are skipped.
    pub async fn matches_any(
        &self,
        password: Password,
        hashes: Vec<String>,
    ) -> Result<bool, anyhow::Error> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || {
            hashes.into_iter().any(|hash| {
                hasher
                    .verify(&password, &PasswordHashString::new(hash))
                    .unwrap_or(false)
            })
        })
        .await
        .map_err(anyhow::Error::from)
    }
}

pub const PASSWORD_MIN_LENGTH: usize = 8;
pub const PASSWORD_MAX_LENGTH: usize = 128;

/// Strength rules for new passwords.
#[derive(Debug, Clone, Copy, Default)]
pub struct PasswordPolicy;

impl PasswordPolicy {
    pub fn validate(&self, password: &str) -> Result<(), String> {
        let length = password.chars().count();
        if length < PASSWORD_MIN_LENGTH {
            return Err(format!(
                "password must be at least {} characters",
                PASSWORD_MIN_LENGTH
            ));
        }
        if length > PASSWORD_MAX_LENGTH {
            return Err(format!(
                "password must be at most {} characters",
                PASSWORD_MAX_LENGTH
            ));
        }
        if !password.chars().any(char::is_alphabetic) {
            return Err("password must contain a letter".to_string());
        }
        if !password.chars().any(|c| c.is_ascii_digit()) {
            return Err("password must contain a digit".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> PasswordHasher {
        PasswordHasher::with_params(8, 1, 1).expect("params")
    }

    #[test]
    fn test_hash_password() {
        let password = Password::new("mySecurePassword123");
        let hash = cheap().hash(&password).expect("Failed to hash password");

        assert!(hash.as_str().starts_with("$argon2id"));
    }

    #[test]
    fn test_verify_password_correct_and_incorrect() {
        let hasher = cheap();
        let hash = hasher.hash(&Password::new("mySecurePassword123")).unwrap();

        assert!(hasher.verify(&Password::new("mySecurePassword123"), &hash).unwrap());
        assert!(!hasher.verify(&Password::new("wrongPassword1"), &hash).unwrap());
    }

    #[test]
    fn test_malformed_hash_is_an_error() {
        let result = cheap().verify(
            &Password::new("whatever1"),
            &PasswordHashString::new("not-a-phc-string".to_string()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_different_hashes_for_same_password() {
        let hasher = cheap();
        let password = Password::new("mySecurePassword123");
        let hash1 = hasher.hash(&password).unwrap();
        let hash2 = hasher.hash(&password).unwrap();

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_default_hasher_verifies_cheap_hashes() {
        let hash = cheap().hash(&Password::new("portable123")).unwrap();
        assert!(PasswordHasher::new()
            .verify(&Password::new("portable123"), &hash)
            .unwrap());
    }

    #[tokio::test]
    async fn test_matches_any() {
        let hasher = cheap();
        let hashes = vec![
            hasher.hash(&Password::new("first111")).unwrap().into_string(),
            "garbage".to_string(),
            hasher.hash(&Password::new("second22")).unwrap().into_string(),
        ];

        assert!(hasher
            .matches_any(Password::new("second22"), hashes.clone())
            .await
            .unwrap());
        assert!(!hasher
            .matches_any(Password::new("third333"), hashes)
            .await
            .unwrap());
    }

    #[test]
    fn test_policy() {
        let policy = PasswordPolicy;
        assert!(policy.validate("abc12345").is_ok());
        assert!(policy.validate("short1").is_err());
        assert!(policy.validate("nodigitshere").is_err());
        assert!(policy.validate("1234567890").is_err());
        assert!(policy.validate(&format!("a1{}", "x".repeat(127))).is_err());
    }

    #[test]
    fn test_password_debug_is_redacted() {
        assert_eq!(format!("{:?}", Password::new("hunter22")), "Password(***)");
    }
}

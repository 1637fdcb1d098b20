use argon2::password_hash::{PasswordHashString, SaltString};
use argon2::{password_hash, Argon2, PasswordHash, PasswordHasher};
use color_eyre::eyre::WrapErr;

/// Hash a password with a freshly generated salt into PHC string format.
pub fn hash(password: &[u8]) -> crate::Result<PasswordHashString> {
    let salt = SaltString::generate(rand::thread_rng());

    let hash = Argon2::default()
        .hash_password(password, &salt)
        .wrap_err("error hashing password")?;

    Ok(hash.serialize())
}

/// Verify a password against a PHC-format hash string.
pub fn verify(password: &[u8], hash: &str) -> crate::Result<bool> {
    let hash =
        PasswordHash::new(hash).wrap_err_with(|| format!("invalid password hash: {hash:?}"))?;

    let argon2 = Argon2::default();

    match hash.verify_password(&[&argon2], password) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(other) => Err(other).wrap_err("error verifying password"),
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn hash_then_verify() {
        let hash = super::hash(b"hunter2").unwrap();

        assert!(super::verify(b"hunter2", hash.as_str()).unwrap());
        assert!(!super::verify(b"*******", hash.as_str()).unwrap());
    }
}

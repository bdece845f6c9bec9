//! OpenSSL-compatible AES-256-CBC encryption of dump artifacts.
//!
//! The envelope matches what `openssl enc -aes-256-cbc -pbkdf2 -salt`
//! writes: the literal `Salted__` magic, an 8-byte random salt, then
//! PKCS#7-padded CBC ciphertext. Key (32 bytes) and IV (16 bytes) are
//! derived with PBKDF2-HMAC-SHA256 at 10000 rounds, so a stock `openssl`
//! binary can restore any backup without this tool:
//!
//! ```text
//! openssl enc -d -aes-256-cbc -pbkdf2 -in db.sql.gz.enc -out db.sql.gz -k <passphrase>
//! ```

use std::path::{Path, PathBuf};

use aes::Aes256;
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockEncryptMut, KeyIvInit};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::keys::ENCRYPTED_SUFFIX;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;

const MAGIC: &[u8; 8] = b"Salted__";
const SALT_LEN: usize = 8;
/// Iteration count used by `openssl enc -pbkdf2`.
const PBKDF2_ROUNDS: u32 = 10_000;
const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

fn derive_key_iv(passphrase: &str, salt: &[u8]) -> ([u8; KEY_LEN], [u8; IV_LEN]) {
    let mut okm = [0u8; KEY_LEN + IV_LEN];
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, PBKDF2_ROUNDS, &mut okm);

    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&okm[..KEY_LEN]);
    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(&okm[KEY_LEN..]);
    (key, iv)
}

/// Encrypt `plaintext` under `passphrase` into a fresh envelope with a
/// random salt.
pub fn encrypt(plaintext: &[u8], passphrase: &str) -> Vec<u8> {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    encrypt_with_salt(plaintext, passphrase, &salt)
}

fn encrypt_with_salt(plaintext: &[u8], passphrase: &str, salt: &[u8; SALT_LEN]) -> Vec<u8> {
    let (key, iv) = derive_key_iv(passphrase, salt);
    let ciphertext =
        Aes256CbcEnc::new(&key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut envelope = Vec::with_capacity(MAGIC.len() + SALT_LEN + ciphertext.len());
    envelope.extend_from_slice(MAGIC);
    envelope.extend_from_slice(salt);
    envelope.extend_from_slice(&ciphertext);
    envelope
}

/// Encrypt the artifact at `path` into `<path>.enc` and remove the
/// plaintext original.
pub async fn encrypt_artifact(path: &Path, passphrase: &str) -> Result<PathBuf> {
    let plaintext = tokio::fs::read(path)
        .await
        .map_err(|e| Error::encryption(path, format!("cannot read artifact: {e}")))?;
    let envelope = encrypt(&plaintext, passphrase);

    let mut enc_path = path.as_os_str().to_owned();
    enc_path.push(ENCRYPTED_SUFFIX);
    let enc_path = PathBuf::from(enc_path);

    if let Err(e) = tokio::fs::write(&enc_path, &envelope).await {
        // Never leave a truncated envelope behind.
        let _ = tokio::fs::remove_file(&enc_path).await;
        return Err(Error::encryption(
            &enc_path,
            format!("cannot write envelope: {e}"),
        ));
    }

    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "could not remove plaintext artifact");
    }

    info!(path = %enc_path.display(), "artifact encrypted");
    Ok(enc_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::cipher::BlockDecryptMut;

    type Aes256CbcDec = cbc::Decryptor<Aes256>;

    /// Test-only inverse; the tool itself ships no restore path.
    fn decrypt(envelope: &[u8], passphrase: &str) -> Vec<u8> {
        assert_eq!(&envelope[..8], MAGIC);
        let salt = &envelope[8..8 + SALT_LEN];
        let (key, iv) = derive_key_iv(passphrase, salt);
        Aes256CbcDec::new(&key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&envelope[8 + SALT_LEN..])
            .expect("padding")
    }

    #[test]
    fn test_envelope_structure() {
        let envelope = encrypt(b"pg backup payload", "swordfish");
        assert_eq!(&envelope[..8], b"Salted__");
        assert_eq!((envelope.len() - 8 - SALT_LEN) % 16, 0);
    }

    #[test]
    fn test_ciphertext_differs_from_plaintext() {
        let plaintext = b"-- PostgreSQL database dump\n".to_vec();
        let envelope = encrypt(&plaintext, "swordfish");
        assert_ne!(envelope, plaintext);
        assert!(!envelope
            .windows(plaintext.len())
            .any(|window| window == plaintext.as_slice()));
    }

    #[test]
    fn test_round_trip() {
        let plaintext = b"CREATE TABLE t (id bigint);".to_vec();
        let envelope = encrypt(&plaintext, "correct horse");
        assert_eq!(decrypt(&envelope, "correct horse"), plaintext);
    }

    #[test]
    fn test_same_salt_is_deterministic() {
        let salt = [7u8; SALT_LEN];
        let a = encrypt_with_salt(b"payload", "pw", &salt);
        let b = encrypt_with_salt(b"payload", "pw", &salt);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_encrypt_artifact_replaces_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.sql.gz");
        tokio::fs::write(&path, b"dump bytes").await.unwrap();

        let enc_path = encrypt_artifact(&path, "pw").await.unwrap();

        assert_eq!(enc_path, dir.path().join("db.sql.gz.enc"));
        assert!(!path.exists());
        let envelope = tokio::fs::read(&enc_path).await.unwrap();
        assert_eq!(decrypt(&envelope, "pw"), b"dump bytes");
    }
}

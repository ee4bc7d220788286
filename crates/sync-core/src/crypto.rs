//! Encryption envelope for the cloud copy of the repository.
//!
//! The storage backend is an untrusted byte bucket, so the repository is
//! wrapped in an authenticated envelope before upload. The symmetric key
//! is derived from the transfer code with PBKDF2-HMAC-SHA256 at a low
//! round count: a 16-character code over the 57-symbol alphabet carries
//! about 93 bits of entropy, which dominates any affordable stretching,
//! and mobile devices must not pay a heavy KDF tax on every sync.
//!
//! Envelope layout (all lengths fixed except the ciphertext):
//!
//! ```text
//! magic "QSE1" | version u8 | kdf rounds u32 BE | salt [16] | nonce [24] | ciphertext
//! ```
//!
//! Failure discrimination is part of the contract: a malformed envelope
//! means corruption and is fatal, while an AEAD authentication failure
//! means the wrong transfer code and may be retried with another
//! candidate. Callers must never fold the two together.

use chacha20poly1305::aead::Aead;
use chacha20poly1305::{KeyInit, XChaCha20Poly1305, XNonce};
use pbkdf2::pbkdf2_hmac;
use rand::Rng;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

pub const ENVELOPE_MAGIC: [u8; 4] = *b"QSE1";
const ENVELOPE_VERSION: u8 = 1;

/// Deliberately low; see the module docs.
pub const DEFAULT_KDF_ROUNDS: u32 = 1_000;

/// Upper bound on accepted rounds, so a corrupt header cannot stall a
/// device in the KDF.
const MAX_KDF_ROUNDS: u32 = 1_000_000;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;
const HEADER_LEN: usize = 4 + 1 + 4 + SALT_LEN + NONCE_LEN;

#[derive(Debug, Error, PartialEq)]
pub enum CryptoError {
    /// The envelope bytes are corrupt. Fatal: retrying other transfer
    /// codes cannot help and must not be attempted.
    #[error("encrypted envelope is malformed")]
    InvalidCipherFormat,

    /// Authentication failed: the transfer code does not match.
    #[error("transfer code does not match")]
    WrongTransferCode,

    #[error("encryption failed")]
    EncryptionFailure,
}

pub type Result<T> = std::result::Result<T, CryptoError>;

/// Encrypt repository bytes under a transfer code.
pub fn encrypt(plaintext: &[u8], transfer_code: &str) -> Result<Vec<u8>> {
    let mut rng = rand::rng();
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill(&mut salt[..]);
    rng.fill(&mut nonce[..]);

    let key = derive_key(transfer_code, &salt, DEFAULT_KDF_ROUNDS);
    let cipher = XChaCha20Poly1305::new_from_slice(&*key)
        .map_err(|_| CryptoError::EncryptionFailure)?;
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::EncryptionFailure)?;

    let mut out = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    out.extend_from_slice(&ENVELOPE_MAGIC);
    out.push(ENVELOPE_VERSION);
    out.extend_from_slice(&DEFAULT_KDF_ROUNDS.to_be_bytes());
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt an envelope with a single transfer code.
pub fn decrypt(blob: &[u8], transfer_code: &str) -> Result<Vec<u8>> {
    Envelope::parse(blob)?.open(transfer_code)
}

/// A parsed (but not yet decrypted) envelope.
///
/// Parsing once and opening per candidate lets callers abort the whole
/// candidate list on a malformed envelope instead of misreading the
/// corruption as sixteen wrong codes in a row.
#[derive(Debug)]
pub struct Envelope<'a> {
    rounds: u32,
    salt: &'a [u8],
    nonce: &'a [u8],
    ciphertext: &'a [u8],
}

impl<'a> Envelope<'a> {
    /// Validate the header and split the blob into its fields.
    pub fn parse(blob: &'a [u8]) -> Result<Self> {
        if blob.len() < HEADER_LEN + TAG_LEN {
            return Err(CryptoError::InvalidCipherFormat);
        }
        if blob[..4] != ENVELOPE_MAGIC || blob[4] != ENVELOPE_VERSION {
            return Err(CryptoError::InvalidCipherFormat);
        }

        let rounds = u32::from_be_bytes(blob[5..9].try_into().expect("fixed slice"));
        if rounds == 0 || rounds > MAX_KDF_ROUNDS {
            return Err(CryptoError::InvalidCipherFormat);
        }

        let salt = &blob[9..9 + SALT_LEN];
        let nonce = &blob[9 + SALT_LEN..HEADER_LEN];
        let ciphertext = &blob[HEADER_LEN..];
        Ok(Self {
            rounds,
            salt,
            nonce,
            ciphertext,
        })
    }

    /// Try to open the envelope with one candidate transfer code.
    pub fn open(&self, transfer_code: &str) -> Result<Vec<u8>> {
        let key = derive_key(transfer_code, self.salt, self.rounds);
        let cipher = XChaCha20Poly1305::new_from_slice(&*key)
            .map_err(|_| CryptoError::EncryptionFailure)?;
        cipher
            .decrypt(XNonce::from_slice(self.nonce), self.ciphertext)
            .map_err(|_| CryptoError::WrongTransferCode)
    }
}

fn derive_key(transfer_code: &str, salt: &[u8], rounds: u32) -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    pbkdf2_hmac::<Sha256>(transfer_code.as_bytes(), salt, rounds, &mut *key);
    key
}

//! Shared secret used to authenticate against the daemon's RESTful API.

use std::fmt;

use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;

/// Entropy carried by every generated credential.
pub const CREDENTIAL_BITS: usize = 130;

/// Rendered width: one base-32 digit per five bits.
pub const CREDENTIAL_LEN: usize = CREDENTIAL_BITS / 5;

const ENTROPY_BYTES: usize = CREDENTIAL_BITS.div_ceil(8);
const ALPHABET: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

/// Errors raised while producing or parsing a credential.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The operating system random source failed.
    #[error("failed to read from the system random source: {source}")]
    Entropy {
        /// Underlying RNG error.
        #[source]
        source: rand::Error,
    },
    /// A supplied secret is not a rendered credential.
    #[error("credential must be {CREDENTIAL_LEN} lowercase base-32 digits")]
    Malformed,
}

/// High-entropy secret rendered as lowercase base-32 digits (`0-9a-v`).
///
/// `Debug` output is redacted so the secret never reaches the logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Draws a fresh credential from the operating system CSPRNG.
    pub fn generate() -> Result<Self, CredentialError> {
        let mut entropy = [0_u8; ENTROPY_BYTES];
        OsRng
            .try_fill_bytes(&mut entropy)
            .map_err(|source| CredentialError::Entropy { source })?;
        Ok(Self::from_entropy(&entropy))
    }

    /// Parses a previously rendered credential.
    pub fn parse(secret: &str) -> Result<Self, CredentialError> {
        let well_formed = secret.len() == CREDENTIAL_LEN
            && secret.bytes().all(|byte| ALPHABET.contains(&byte));
        if well_formed {
            Ok(Self(secret.to_owned()))
        } else {
            Err(CredentialError::Malformed)
        }
    }

    /// Reveals the secret for configuration writes and authentication.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    fn from_entropy(entropy: &[u8; ENTROPY_BYTES]) -> Self {
        let bits: Vec<u8> = entropy
            .iter()
            .flat_map(|byte| (0..8).rev().map(move |shift| (byte >> shift) & 1))
            .take(CREDENTIAL_BITS)
            .collect();
        let rendered = bits
            .chunks(5)
            .map(|chunk| {
                let digit = chunk.iter().fold(0_usize, |acc, bit| (acc << 1) | usize::from(*bit));
                char::from(ALPHABET[digit])
            })
            .collect();
        Self(rendered)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("Credential(<redacted>)")
    }
}

//! Signing and verification of sync packets.
//!
//! Three modes: unsigned (a literal nonce tail), HMAC-SHA256 with a shared
//! group key, and asymmetric signing delegated to the host's key
//! infrastructure through the [`PacketSigner`] / [`PacketValidator`] traits.
//! Verification failures are not errors: the caller drops the packet.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use statesync_proto::{Name, SyncPacket};

use crate::config::ConfigError;

type HmacSha256 = Hmac<Sha256>;

/// Host-side signer for asymmetric mode.
pub trait PacketSigner: Send + Sync {
    /// Produces a signature over the packet signing input.
    fn sign(&self, input: &[u8]) -> Vec<u8>;
}

/// Host-side validator for asymmetric mode.
///
/// Validation may be asynchronous; inbound processing continues on the
/// validator's continuation.
#[async_trait]
pub trait PacketValidator: Send + Sync {
    /// Returns `true` if the packet is authentic.
    async fn validate(&self, packet: &SyncPacket) -> bool;
}

/// How outbound sync packets are signed and inbound ones verified.
#[derive(Clone)]
pub enum SigningMode {
    /// No signing; a literal `0` nonce component terminates the name.
    None,
    /// HMAC-SHA256 with a shared symmetric key.
    Hmac {
        /// The shared group key.
        key: Vec<u8>,
    },
    /// Signing and validation delegated to the host.
    Asymmetric {
        /// Signs outbound packets.
        signer: Arc<dyn PacketSigner>,
        /// Verifies inbound packets.
        validator: Arc<dyn PacketValidator>,
    },
}

impl fmt::Debug for SigningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningMode::None => write!(f, "None"),
            SigningMode::Hmac { .. } => write!(f, "Hmac"),
            SigningMode::Asymmetric { .. } => write!(f, "Asymmetric"),
        }
    }
}

/// Security configuration consumed by the sync logic.
#[derive(Debug, Clone)]
pub struct SecurityOptions {
    /// Signing mode for sync packets.
    pub signing: SigningMode,
}

impl Default for SecurityOptions {
    fn default() -> Self {
        Self::none()
    }
}

impl SecurityOptions {
    /// Unsigned packets.
    #[must_use]
    pub fn none() -> Self {
        Self {
            signing: SigningMode::None,
        }
    }

    /// HMAC-SHA256 with the given shared key.
    #[must_use]
    pub fn hmac(key: impl Into<Vec<u8>>) -> Self {
        Self {
            signing: SigningMode::Hmac { key: key.into() },
        }
    }

    /// Host-provided asymmetric signing.
    #[must_use]
    pub fn asymmetric(signer: Arc<dyn PacketSigner>, validator: Arc<dyn PacketValidator>) -> Self {
        Self {
            signing: SigningMode::Asymmetric { signer, validator },
        }
    }

    /// Constructor-time validation: unusable key material fails fast.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        match &self.signing {
            SigningMode::Hmac { key } if key.is_empty() => {
                Err(ConfigError::Invalid("hmac key must not be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Appends the authentication tail to an assembled sync name.
    pub(crate) fn finish_name(&self, unsigned: Name) -> Name {
        match &self.signing {
            SigningMode::None => unsigned.append_number(0),
            SigningMode::Hmac { key } => {
                let tag = hmac_sign(key, &SyncPacket::signing_input_for(&unsigned));
                unsigned.append(tag)
            }
            SigningMode::Asymmetric { signer, .. } => {
                let tag = signer.sign(&SyncPacket::signing_input_for(&unsigned));
                unsigned.append(tag)
            }
        }
    }

    /// Verifies an inbound packet without suspending, when the mode allows.
    ///
    /// Returns `None` for asymmetric mode, whose validator may be async;
    /// callers then go through [`verify`](Self::verify).
    pub(crate) fn verify_local(&self, packet: &SyncPacket) -> Option<bool> {
        match &self.signing {
            SigningMode::None => Some(true),
            SigningMode::Hmac { key } => Some(match packet.auth_tail() {
                Some(tail) => hmac_verify(key, &packet.signing_input(), tail.as_bytes()),
                None => false,
            }),
            SigningMode::Asymmetric { .. } => None,
        }
    }

    /// Verifies an inbound packet. `false` means drop it.
    pub(crate) async fn verify(&self, packet: &SyncPacket) -> bool {
        match &self.signing {
            SigningMode::Asymmetric { validator, .. } => validator.validate(packet).await,
            _ => self.verify_local(packet).unwrap_or(false),
        }
    }
}

fn hmac_sign(key: &[u8], input: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(input);
    mac.finalize().into_bytes().to_vec()
}

fn hmac_verify(key: &[u8], input: &[u8], tag: &[u8]) -> bool {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(input);
    mac.verify_slice(tag).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use statesync_proto::{NodeId, VersionVector};

    fn unsigned_name() -> Name {
        let mut vv = VersionVector::new();
        vv.set(NodeId::from("a"), 1);
        let name: Name = "/sync/group".parse().unwrap();
        name.append(vv.encode())
    }

    #[tokio::test]
    async fn test_none_mode_appends_nonce() {
        let options = SecurityOptions::none();
        let name = options.finish_name(unsigned_name());
        assert_eq!(name.get(-1).unwrap().as_bytes(), &[0x00]);
        assert!(options.verify(&SyncPacket::new(name)).await);
    }

    #[tokio::test]
    async fn test_hmac_roundtrip() {
        let options = SecurityOptions::hmac(b"group secret".to_vec());
        let packet = SyncPacket::new(options.finish_name(unsigned_name()));
        assert!(options.verify(&packet).await);
    }

    #[tokio::test]
    async fn test_hmac_rejects_wrong_key() {
        let signer = SecurityOptions::hmac(b"key one".to_vec());
        let verifier = SecurityOptions::hmac(b"key two".to_vec());
        let packet = SyncPacket::new(signer.finish_name(unsigned_name()));
        assert!(!verifier.verify(&packet).await);
    }

    #[tokio::test]
    async fn test_hmac_rejects_tampered_vector() {
        let options = SecurityOptions::hmac(b"group secret".to_vec());
        let signed = options.finish_name(unsigned_name());

        // Rebuild the name with a different vector but the old signature.
        let mut other = VersionVector::new();
        other.set(NodeId::from("a"), 9);
        let prefix: Name = "/sync/group".parse().unwrap();
        let tampered = prefix
            .append(other.encode())
            .append(signed.get(-1).unwrap().as_bytes());
        assert!(!options.verify(&SyncPacket::new(tampered)).await);
    }

    #[test]
    fn test_empty_hmac_key_fails_fast() {
        let options = SecurityOptions::hmac(Vec::new());
        assert!(options.validate().is_err());
        assert!(SecurityOptions::none().validate().is_ok());
    }

    struct AlwaysNo;

    #[async_trait]
    impl PacketValidator for AlwaysNo {
        async fn validate(&self, _packet: &SyncPacket) -> bool {
            false
        }
    }

    struct FixedSigner;

    impl PacketSigner for FixedSigner {
        fn sign(&self, _input: &[u8]) -> Vec<u8> {
            vec![0xAB; 8]
        }
    }

    #[tokio::test]
    async fn test_asymmetric_delegates() {
        let options = SecurityOptions::asymmetric(Arc::new(FixedSigner), Arc::new(AlwaysNo));
        let packet = SyncPacket::new(options.finish_name(unsigned_name()));
        assert_eq!(packet.auth_tail().unwrap().as_bytes(), &[0xAB; 8]);
        assert!(!options.verify(&packet).await);
    }
}

//! Fixed-Width Values
//!
//! Every value that crosses into a hash, a proof or a ledger call has an
//! explicit width here. Constructors validate the domain once, so the rest of
//! the crate never deals with loose integers or byte buffers of unknown size.
//!
//! ```text
//! FieldElement  32 bytes, big-endian, canonical BN254 scalar (< p)
//! Address       20 bytes, big-endian
//! SecretScalar  31 bytes, little-endian (always < p)
//! ```

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;

use crate::error::{ProtocolError, Result};

/// Width of a field element in bytes
pub const FIELD_BYTES: usize = 32;
/// Width of an address in bytes
pub const ADDRESS_BYTES: usize = 20;
/// Width of one secret scalar in bytes
pub const SECRET_BYTES: usize = 31;

/// Decode `0x`-prefixed hex of an exact byte width
fn decode_fixed_hex<const N: usize>(s: &str, what: &str) -> Result<[u8; N]> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| ProtocolError::InvalidDomain(format!("{what} must start with 0x")))?;
    if digits.len() != N * 2 {
        return Err(ProtocolError::InvalidDomain(format!(
            "{what} must be {} hex characters, got {}",
            N * 2,
            digits.len()
        )));
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(digits, &mut out)
        .map_err(|e| ProtocolError::InvalidDomain(format!("{what}: {e}")))?;
    Ok(out)
}

// ============================================================================
// FieldElement
// ============================================================================

/// A canonical BN254 scalar field element
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldElement([u8; FIELD_BYTES]);

impl FieldElement {
    pub const ZERO: Self = Self([0u8; FIELD_BYTES]);

    /// Wrap bytes already known to be below the modulus
    pub(crate) const fn from_canonical(bytes: [u8; FIELD_BYTES]) -> Self {
        Self(bytes)
    }

    /// Create from an arkworks field element
    pub fn from_fr(f: Fr) -> Self {
        let bytes = f.into_bigint().to_bytes_be();
        let mut arr = [0u8; FIELD_BYTES];
        arr[FIELD_BYTES - bytes.len()..].copy_from_slice(&bytes);
        Self(arr)
    }

    /// Convert to an arkworks field element
    pub fn to_fr(&self) -> Fr {
        Fr::from_be_bytes_mod_order(&self.0)
    }

    /// Create from big-endian bytes, rejecting values `>= p`
    pub fn from_be_bytes(bytes: [u8; FIELD_BYTES]) -> Result<Self> {
        let canonical = Self::from_fr(Fr::from_be_bytes_mod_order(&bytes));
        if canonical.0 != bytes {
            return Err(ProtocolError::InvalidDomain(format!(
                "0x{} is not below the field modulus",
                hex::encode(bytes)
            )));
        }
        Ok(canonical)
    }

    /// Parse `0x` followed by exactly 64 hex characters
    pub fn from_hex(s: &str) -> Result<Self> {
        Self::from_be_bytes(decode_fixed_hex::<FIELD_BYTES>(s, "field element")?)
    }

    pub fn from_u64(value: u64) -> Self {
        Self::from_fr(Fr::from(value))
    }

    pub fn from_u128(value: u128) -> Self {
        Self::from_fr(Fr::from(value))
    }

    /// Big-endian bytes
    pub fn as_bytes(&self) -> &[u8; FIELD_BYTES] {
        &self.0
    }

    /// `0x` + 64 lowercase hex characters
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl From<Fr> for FieldElement {
    fn from(f: Fr) -> Self {
        Self::from_fr(f)
    }
}

impl fmt::Display for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldElement({})", self.to_hex())
    }
}

impl Serialize for FieldElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for FieldElement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(de::Error::custom)
    }
}

// ============================================================================
// Address
// ============================================================================

/// A 20-byte account address (recipient / relayer)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Address([u8; ADDRESS_BYTES]);

impl Address {
    pub const ZERO: Self = Self([0u8; ADDRESS_BYTES]);

    pub fn from_bytes(bytes: [u8; ADDRESS_BYTES]) -> Self {
        Self(bytes)
    }

    /// Parse `0x` followed by exactly 40 hex characters
    pub fn from_hex(s: &str) -> Result<Self> {
        decode_fixed_hex::<ADDRESS_BYTES>(s, "address").map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_BYTES] {
        &self.0
    }

    /// `0x` + 40 lowercase hex characters
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Field encoding: the address as a big-endian integer
    pub fn to_field_element(&self) -> FieldElement {
        let mut arr = [0u8; FIELD_BYTES];
        arr[FIELD_BYTES - ADDRESS_BYTES..].copy_from_slice(&self.0);
        // 160 bits are always below the modulus
        FieldElement(arr)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_BYTES]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(de::Error::custom)
    }
}

// ============================================================================
// SecretScalar
// ============================================================================

/// One half of a note's secret material: a 31-byte little-endian integer
///
/// 31 bytes keep every value below the BN254 modulus, so any scalar is a
/// valid hash input. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretScalar([u8; SECRET_BYTES]);

impl SecretScalar {
    pub fn from_u64(value: u64) -> Self {
        let mut bytes = [0u8; SECRET_BYTES];
        bytes[..8].copy_from_slice(&value.to_le_bytes());
        Self(bytes)
    }

    pub fn from_le_bytes(bytes: [u8; SECRET_BYTES]) -> Self {
        Self(bytes)
    }

    /// Accepts any length as long as the value fits in 31 bytes
    pub fn from_le_slice(bytes: &[u8]) -> Result<Self> {
        let (low, high) = bytes.split_at(bytes.len().min(SECRET_BYTES));
        if high.iter().any(|b| *b != 0) {
            return Err(ProtocolError::InvalidDomain(format!(
                "secret scalar wider than {SECRET_BYTES} bytes"
            )));
        }
        let mut out = [0u8; SECRET_BYTES];
        out[..low.len()].copy_from_slice(low);
        Ok(Self(out))
    }

    /// Sample uniformly from the 31-byte space
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; SECRET_BYTES];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn to_le_bytes(&self) -> [u8; SECRET_BYTES] {
        self.0
    }

    pub fn to_field_element(&self) -> FieldElement {
        FieldElement::from_fr(Fr::from_le_bytes_mod_order(&self.0))
    }
}

impl fmt::Debug for SecretScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretScalar(<redacted>)")
    }
}

//! Deposit Notes
//!
//! The note token is the only thing a holder keeps. Whoever has it can
//! withdraw the deposit.
//!
//! ```text
//! <prefix>-<asset>-<amount>-<networkId>-0x<124 hex chars>
//!  shade  - eth   - 0.1    - 1         - 0x<nullifier 31 B LE><secret 31 B LE>
//! ```
//!
//! Parsing is a left-to-right field scanner. The whole token must match; any
//! deviation is a [`NoteFormatError`] and nothing is returned.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::commitment::{CommitmentScheme, Deposit, PREIMAGE_BYTES};
use crate::error::{NoteFormatError, ProtocolError, Result};

/// Default note prefix
pub const DEFAULT_NOTE_PREFIX: &str = "shade";

/// Hex characters in the secret segment
pub const NOTE_HEX_CHARS: usize = PREIMAGE_BYTES * 2;

/// The pool a note belongs to: asset, fixed denomination, network
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pool {
    pub asset: String,
    pub denomination: String,
    pub network_id: u64,
}

impl Pool {
    pub fn new(asset: impl Into<String>, denomination: impl Into<String>, network_id: u64) -> Self {
        Self {
            asset: asset.into(),
            denomination: denomination.into(),
            network_id,
        }
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.asset, self.denomination, self.network_id)
    }
}

/// A successfully parsed note token
#[derive(Clone, PartialEq, Eq)]
pub struct ParsedNote {
    pub pool: Pool,
    preimage: [u8; PREIMAGE_BYTES],
}

impl ParsedNote {
    pub fn preimage(&self) -> &[u8; PREIMAGE_BYTES] {
        &self.preimage
    }

    /// Re-derive nullifier, secret, commitment and nullifier hash
    pub fn deposit(&self, scheme: &CommitmentScheme) -> Deposit {
        scheme.from_preimage(&self.preimage)
    }
}

impl fmt::Debug for ParsedNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedNote")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn check_word(field: &'static str, value: &str) -> std::result::Result<(), NoteFormatError> {
    if value.is_empty() {
        return Err(NoteFormatError::EmptyField { field });
    }
    match value.chars().find(|c| !is_word_char(*c)) {
        Some(found) => Err(NoteFormatError::InvalidCharacter { field, found }),
        None => Ok(()),
    }
}

fn check_amount(value: &str) -> std::result::Result<(), NoteFormatError> {
    if value.is_empty() {
        return Err(NoteFormatError::EmptyField { field: "amount" });
    }
    let dots = value.chars().filter(|c| *c == '.').count();
    let digits_only = value.chars().all(|c| c.is_ascii_digit() || c == '.');
    if !digits_only || dots > 1 || value.starts_with('.') || value.ends_with('.') {
        return Err(NoteFormatError::InvalidAmount(value.to_string()));
    }
    Ok(())
}

/// Splits a token into `-`-separated fields, one at a time
struct Scanner<'a> {
    rest: &'a str,
}

impl<'a> Scanner<'a> {
    fn new(token: &'a str) -> Self {
        Self { rest: token }
    }

    /// Consume a field and its trailing delimiter
    fn field(&mut self, field: &'static str) -> std::result::Result<&'a str, NoteFormatError> {
        let (head, tail) = self
            .rest
            .split_once('-')
            .ok_or(NoteFormatError::MissingDelimiter { field })?;
        if head.is_empty() {
            return Err(NoteFormatError::EmptyField { field });
        }
        self.rest = tail;
        Ok(head)
    }

    /// Consume the final `0x<hex>` segment; nothing may follow it
    fn secret(self) -> std::result::Result<[u8; PREIMAGE_BYTES], NoteFormatError> {
        let digits = self
            .rest
            .strip_prefix("0x")
            .ok_or(NoteFormatError::MissingHexPrefix)?;

        let found = digits.chars().count();
        if found != NOTE_HEX_CHARS {
            return Err(NoteFormatError::WrongHexLength {
                expected: NOTE_HEX_CHARS,
                found,
            });
        }
        if let Some(bad) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(NoteFormatError::NonHexCharacter(bad));
        }

        let mut preimage = [0u8; PREIMAGE_BYTES];
        hex::decode_to_slice(digits, &mut preimage)
            .map_err(|_| NoteFormatError::WrongHexLength {
                expected: NOTE_HEX_CHARS,
                found,
            })?;
        Ok(preimage)
    }
}

/// Encodes and parses note tokens for one prefix
#[derive(Debug, Clone)]
pub struct NoteCodec {
    prefix: String,
}

impl NoteCodec {
    pub fn new(prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        check_word("prefix", &prefix)?;
        Ok(Self { prefix })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Build the canonical token. Hex is emitted lowercase.
    pub fn encode(
        &self,
        asset: &str,
        denomination: &str,
        network_id: u64,
        preimage: &[u8; PREIMAGE_BYTES],
    ) -> Result<String> {
        check_word("asset", asset)?;
        check_amount(denomination)?;
        Ok(format!(
            "{}-{}-{}-{}-0x{}",
            self.prefix,
            asset,
            denomination,
            network_id,
            hex::encode(preimage)
        ))
    }

    /// Token for a deposit in the given pool
    pub fn encode_deposit(&self, pool: &Pool, deposit: &Deposit) -> Result<String> {
        self.encode(
            &pool.asset,
            &pool.denomination,
            pool.network_id,
            deposit.preimage(),
        )
    }

    /// Parse a token. Either case is accepted for the hex segment.
    pub fn parse(&self, token: &str) -> Result<ParsedNote> {
        self.scan(token).map_err(ProtocolError::MalformedNote)
    }

    fn scan(&self, token: &str) -> std::result::Result<ParsedNote, NoteFormatError> {
        let mut scanner = Scanner::new(token);

        let prefix = scanner.field("prefix")?;
        if prefix != self.prefix {
            return Err(NoteFormatError::WrongPrefix {
                expected: self.prefix.clone(),
            });
        }

        let asset = scanner.field("asset")?;
        check_word("asset", asset)?;

        let amount = scanner.field("amount")?;
        check_amount(amount)?;

        let network = scanner.field("network id")?;
        if !network.chars().all(|c| c.is_ascii_digit()) {
            return Err(NoteFormatError::InvalidNetworkId(network.to_string()));
        }
        let network_id: u64 = network
            .parse()
            .map_err(|_| NoteFormatError::InvalidNetworkId(network.to_string()))?;

        let preimage = scanner.secret()?;

        Ok(ParsedNote {
            pool: Pool::new(asset, amount, network_id),
            preimage,
        })
    }
}

impl Default for NoteCodec {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_NOTE_PREFIX.to_string(),
        }
    }
}

//! Withdrawal Requests
//!
//! Pure structural assembly of what the prover and the ledger consume. No
//! hashing happens here; the contract is field order, width and encoding.
//!
//! ```text
//! Public inputs (prover + ledger, in this order):
//!   root            32 B
//!   nullifierHash   32 B
//!   recipient       20 B
//!   relayer         20 B
//!   fee             32 B
//!   refund          32 B
//!
//! Private inputs (prover only, never logged or persisted):
//!   nullifier, secret, pathElements, pathIndices
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::commitment::Deposit;
use crate::error::{ProtocolError, Result};
use crate::field::{ADDRESS_BYTES, Address, FIELD_BYTES, FieldElement, SecretScalar};
use crate::merkle::MembershipWitness;

/// Number of public inputs / ledger arguments
pub const PUBLIC_INPUT_COUNT: usize = 6;

/// Names of the ledger verification arguments, in call order
pub const LEDGER_ARG_NAMES: [&str; PUBLIC_INPUT_COUNT] =
    ["root", "nullifierHash", "recipient", "relayer", "fee", "refund"];

/// Byte width of each ledger argument, in call order
pub const LEDGER_ARG_WIDTHS: [usize; PUBLIC_INPUT_COUNT] = [
    FIELD_BYTES,
    FIELD_BYTES,
    ADDRESS_BYTES,
    ADDRESS_BYTES,
    FIELD_BYTES,
    FIELD_BYTES,
];

/// What the withdrawer asks for, besides the note itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub recipient: Address,
    pub relayer: Address,
    pub fee: u128,
    pub refund: u128,
}

impl WithdrawalRequest {
    /// Withdraw directly, no relayer and no fee
    pub fn direct(recipient: Address) -> Self {
        Self {
            recipient,
            relayer: Address::ZERO,
            fee: 0,
            refund: 0,
        }
    }
}

/// Public proof inputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicInputs {
    pub root: FieldElement,
    pub nullifier_hash: FieldElement,
    pub recipient: Address,
    pub relayer: Address,
    pub fee: FieldElement,
    pub refund: FieldElement,
}

impl PublicInputs {
    /// The public signals as field elements, in circuit order
    pub fn to_field_elements(&self) -> [FieldElement; PUBLIC_INPUT_COUNT] {
        [
            self.root,
            self.nullifier_hash,
            self.recipient.to_field_element(),
            self.relayer.to_field_element(),
            self.fee,
            self.refund,
        ]
    }
}

/// Private proof inputs
pub struct PrivateInputs {
    pub nullifier: SecretScalar,
    pub secret: SecretScalar,
    pub path_elements: Vec<FieldElement>,
    pub path_indices: Vec<u8>,
}

impl fmt::Debug for PrivateInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateInputs(<redacted>)")
    }
}

/// Everything the prover consumes
#[derive(Debug)]
pub struct ProofInputs {
    pub public: PublicInputs,
    pub private: PrivateInputs,
}

/// Assemble prover inputs for withdrawing `deposit`
///
/// # Arguments
/// * `deposit` - The re-derived note
/// * `witness` - Membership witness for the note's commitment
/// * `recipient` - Receives the denomination minus fee
/// * `relayer` - Submits the transaction and receives the fee
/// * `fee` - Paid to the relayer
/// * `refund` - Forwarded to the recipient by the relayer
pub fn build_proof_inputs(
    deposit: &Deposit,
    witness: &MembershipWitness,
    recipient: Address,
    relayer: Address,
    fee: u128,
    refund: u128,
) -> Result<ProofInputs> {
    if witness.leaf != deposit.commitment() {
        return Err(ProtocolError::WitnessMismatch(format!(
            "witness is for leaf {}, note commits to {}",
            witness.leaf,
            deposit.commitment()
        )));
    }
    if witness.path_elements.len() != witness.path_indices.len() {
        return Err(ProtocolError::WitnessMismatch(format!(
            "{} path elements but {} path indices",
            witness.path_elements.len(),
            witness.path_indices.len()
        )));
    }
    if witness.path_indices.iter().any(|bit| *bit > 1) {
        return Err(ProtocolError::WitnessMismatch(
            "path indices must be 0 or 1".into(),
        ));
    }

    let public = PublicInputs {
        root: witness.root,
        nullifier_hash: deposit.nullifier_hash(),
        recipient,
        relayer,
        fee: FieldElement::from_u128(fee),
        refund: FieldElement::from_u128(refund),
    };

    log::debug!(
        "Assembled proof inputs: root {}, nullifier hash {}",
        public.root,
        public.nullifier_hash
    );

    Ok(ProofInputs {
        public,
        private: PrivateInputs {
            nullifier: deposit.nullifier().clone(),
            secret: deposit.secret().clone(),
            path_elements: witness.path_elements.clone(),
            path_indices: witness.path_indices.clone(),
        },
    })
}

/// Positional arguments for the ledger's withdraw entry point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerArgs([String; PUBLIC_INPUT_COUNT]);

impl LedgerArgs {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn root(&self) -> &str {
        &self.0[0]
    }

    pub fn nullifier_hash(&self) -> &str {
        &self.0[1]
    }

    /// Parse the arguments back, enforcing each width
    pub fn to_public_inputs(&self) -> Result<PublicInputs> {
        let [root, nullifier_hash, recipient, relayer, fee, refund] = &self.0;
        Ok(PublicInputs {
            root: FieldElement::from_hex(root)?,
            nullifier_hash: FieldElement::from_hex(nullifier_hash)?,
            recipient: Address::from_hex(recipient)?,
            relayer: Address::from_hex(relayer)?,
            fee: FieldElement::from_hex(fee)?,
            refund: FieldElement::from_hex(refund)?,
        })
    }
}

impl From<[String; PUBLIC_INPUT_COUNT]> for LedgerArgs {
    fn from(args: [String; PUBLIC_INPUT_COUNT]) -> Self {
        Self(args)
    }
}

/// Hex-encode the public inputs in the ledger's parameter order
pub fn build_ledger_args(public: &PublicInputs) -> LedgerArgs {
    LedgerArgs([
        public.root.to_hex(),
        public.nullifier_hash.to_hex(),
        public.recipient.to_hex(),
        public.relayer.to_hex(),
        public.fee.to_hex(),
        public.refund.to_hex(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::CommitmentScheme;
    use crate::merkle::TreeSnapshot;

    fn fixture() -> (Deposit, MembershipWitness) {
        let scheme = CommitmentScheme::new();
        let deposit = scheme.derive(SecretScalar::from_u64(7), SecretScalar::from_u64(42));
        let events = vec![
            (0, FieldElement::from_u64(5)),
            (1, deposit.commitment()),
            (2, FieldElement::from_u64(6)),
        ];
        let tree = TreeSnapshot::build(4, events).unwrap();
        let witness = tree.path(1).unwrap();
        (deposit, witness)
    }

    fn recipient() -> Address {
        Address::from_hex("0x94462e71a887756704f0fb1c0905264d487972fe").unwrap()
    }

    fn relayer() -> Address {
        Address::from_bytes([0xab; 20])
    }

    #[test]
    fn test_public_inputs_come_from_witness_and_note() {
        let (deposit, witness) = fixture();
        let inputs =
            build_proof_inputs(&deposit, &witness, recipient(), relayer(), 5, 1).unwrap();

        assert_eq!(inputs.public.root, witness.root);
        assert_eq!(inputs.public.nullifier_hash, deposit.nullifier_hash());
        assert_eq!(inputs.public.recipient, recipient());
        assert_eq!(inputs.public.relayer, relayer());
        assert_eq!(inputs.public.fee, FieldElement::from_u64(5));
        assert_eq!(inputs.public.refund, FieldElement::from_u64(1));

        assert_eq!(inputs.private.nullifier, SecretScalar::from_u64(7));
        assert_eq!(inputs.private.secret, SecretScalar::from_u64(42));
        assert_eq!(inputs.private.path_elements, witness.path_elements);
        assert_eq!(inputs.private.path_indices, witness.path_indices);
    }

    #[test]
    fn test_ledger_args_order_and_widths() {
        let (deposit, witness) = fixture();
        let inputs =
            build_proof_inputs(&deposit, &witness, recipient(), relayer(), 5, 1).unwrap();
        let args = build_ledger_args(&inputs.public);
        let slice = args.as_slice();

        assert_eq!(slice.len(), PUBLIC_INPUT_COUNT);
        for ((arg, width), name) in slice.iter().zip(LEDGER_ARG_WIDTHS).zip(LEDGER_ARG_NAMES) {
            assert!(arg.starts_with("0x"), "{name} must be 0x-prefixed");
            assert_eq!(arg.len(), 2 + width * 2, "{name} has wrong width");
        }

        assert_eq!(slice[0], witness.root.to_hex());
        assert_eq!(slice[1], deposit.nullifier_hash().to_hex());
        assert_eq!(slice[2], "0x94462e71a887756704f0fb1c0905264d487972fe");
        assert_eq!(slice[3], format!("0x{}", "ab".repeat(20)));
        assert_eq!(slice[4], format!("0x{}05", "0".repeat(62)));
        assert_eq!(slice[5], format!("0x{}01", "0".repeat(62)));
        assert_eq!(args.root(), slice[0]);
        assert_eq!(args.nullifier_hash(), slice[1]);
    }

    #[test]
    fn test_ledger_args_parse_back() {
        let (deposit, witness) = fixture();
        let inputs = build_proof_inputs(
            &deposit,
            &witness,
            recipient(),
            relayer(),
            u128::MAX,
            0,
        )
        .unwrap();
        let args = build_ledger_args(&inputs.public);
        assert_eq!(args.to_public_inputs().unwrap(), inputs.public);
        assert_eq!(
            args.as_slice()[4],
            format!("0x{}{}", "0".repeat(32), "f".repeat(32))
        );
    }

    #[test]
    fn test_ledger_args_reject_swapped_widths() {
        let (deposit, witness) = fixture();
        let inputs =
            build_proof_inputs(&deposit, &witness, recipient(), relayer(), 0, 0).unwrap();
        let good = build_ledger_args(&inputs.public);
        let s = good.as_slice();

        // recipient and fee swapped: both widths are now wrong
        let swapped = LedgerArgs::from([
            s[0].clone(),
            s[1].clone(),
            s[4].clone(),
            s[3].clone(),
            s[2].clone(),
            s[5].clone(),
        ]);
        assert!(matches!(
            swapped.to_public_inputs(),
            Err(ProtocolError::InvalidDomain(_))
        ));
    }

    #[test]
    fn test_field_elements_order() {
        let (deposit, witness) = fixture();
        let inputs =
            build_proof_inputs(&deposit, &witness, recipient(), relayer(), 9, 3).unwrap();
        let fields = inputs.public.to_field_elements();

        assert_eq!(fields[0], witness.root);
        assert_eq!(fields[1], deposit.nullifier_hash());
        assert_eq!(fields[2], recipient().to_field_element());
        assert_eq!(fields[3], relayer().to_field_element());
        assert_eq!(fields[4], FieldElement::from_u64(9));
        assert_eq!(fields[5], FieldElement::from_u64(3));
    }

    #[test]
    fn test_rejects_witness_for_other_leaf() {
        let (deposit, mut witness) = fixture();
        witness.leaf = FieldElement::from_u64(5);
        assert!(matches!(
            build_proof_inputs(&deposit, &witness, recipient(), Address::ZERO, 0, 0),
            Err(ProtocolError::WitnessMismatch(_))
        ));
    }

    #[test]
    fn test_rejects_ragged_path() {
        let (deposit, mut witness) = fixture();
        witness.path_indices.pop();
        assert!(matches!(
            build_proof_inputs(&deposit, &witness, recipient(), Address::ZERO, 0, 0),
            Err(ProtocolError::WitnessMismatch(_))
        ));

        let (deposit, mut witness) = fixture();
        witness.path_indices[0] = 2;
        assert!(build_proof_inputs(&deposit, &witness, recipient(), Address::ZERO, 0, 0).is_err());
    }

    #[test]
    fn test_private_inputs_redacted() {
        let (deposit, witness) = fixture();
        let inputs = build_proof_inputs(
            &deposit,
            &witness,
            recipient(),
            Address::ZERO,
            0,
            0,
        )
        .unwrap();
        let shown = format!("{inputs:?}");
        assert!(shown.contains("PrivateInputs(<redacted>)"));
        assert!(!shown.contains("path_elements"));
    }

    #[test]
    fn test_direct_request() {
        let request = WithdrawalRequest::direct(recipient());
        assert!(request.relayer.is_zero());
        assert_eq!(request.fee, 0);
        assert_eq!(request.refund, 0);
    }
}

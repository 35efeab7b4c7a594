//! # Transaction Envelope
//!
//! `StdTx` carries messages, the declared fee and one ed25519 signature per
//! distinct signer. Transaction bytes are the bincode encoding; sign bytes
//! are sorted-key JSON so wallets can reproduce them.

use super::msg::Msg;
use ed25519_dalek::{Signer, SigningKey};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_types::{Address, Coins, PubKey, TxError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StdFee {
    pub amount: Coins,
    pub gas: u64,
}

impl StdFee {
    pub fn new(amount: Coins, gas: u64) -> Self {
        Self { amount, gas }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdSignature {
    pub pub_key: PubKey,
    pub signature: Vec<u8>,
    pub account_number: u64,
    pub sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StdTx {
    pub msgs: Vec<Msg>,
    pub fee: StdFee,
    pub signatures: Vec<StdSignature>,
    pub memo: String,
}

impl StdTx {
    pub fn new(msgs: Vec<Msg>, fee: StdFee, memo: impl Into<String>) -> Self {
        Self {
            msgs,
            fee,
            signatures: Vec::new(),
            memo: memo.into(),
        }
    }

    /// Distinct signers across all messages, in first-appearance order.
    pub fn signers(&self) -> Vec<Address> {
        let mut out: Vec<Address> = Vec::new();
        for msg in &self.msgs {
            for signer in msg.signers() {
                if !out.contains(&signer) {
                    out.push(signer);
                }
            }
        }
        out
    }

    /// The first signer pays the fee.
    pub fn fee_payer(&self) -> Option<Address> {
        self.signers().into_iter().next()
    }

    pub fn validate_basic(&self) -> Result<(), TxError> {
        if self.msgs.is_empty() {
            return Err(TxError::InvalidMsg("transaction carries no messages".into()));
        }
        if self.fee.gas == 0 {
            return Err(TxError::InsufficientFee("gas must be positive".into()));
        }
        self.fee
            .amount
            .validate()
            .map_err(TxError::InvalidCoins)?;
        for msg in &self.msgs {
            msg.validate_basic()?;
        }
        let signers = self.signers();
        if self.signatures.is_empty() {
            return Err(TxError::Unauthorized("no signatures".into()));
        }
        if self.signatures.len() != signers.len() {
            return Err(TxError::Unauthorized(format!(
                "wrong number of signatures: expected {}, got {}",
                signers.len(),
                self.signatures.len()
            )));
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, TxError> {
        bincode::serialize(self).map_err(|e| TxError::TxDecode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TxError> {
        bincode::deserialize(bytes).map_err(|e| TxError::TxDecode(e.to_string()))
    }

    /// Appends a signature by `key` over this transaction's sign bytes.
    pub fn sign(&mut self, key: &SigningKey, chain_id: &str, account_number: u64, sequence: u64) {
        let bytes = sign_bytes(
            chain_id,
            account_number,
            sequence,
            &self.fee,
            &self.msgs,
            &self.memo,
        );
        let signature = key.sign(&bytes);
        self.signatures.push(StdSignature {
            pub_key: PubKey(key.verifying_key().to_bytes()),
            signature: signature.to_bytes().to_vec(),
            account_number,
            sequence,
        });
    }
}

/// Canonical bytes a signer commits to.
pub fn sign_bytes(
    chain_id: &str,
    account_number: u64,
    sequence: u64,
    fee: &StdFee,
    msgs: &[Msg],
    memo: &str,
) -> Vec<u8> {
    let doc = json!({
        "account_number": account_number.to_string(),
        "chain_id": chain_id,
        "fee": fee,
        "memo": memo,
        "msgs": msgs,
        "sequence": sequence.to_string(),
    });
    // serde_json::Value keeps object keys sorted, nested objects included.
    serde_json::to_vec(&doc).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::MsgSend;

    fn send(from: Address, to: Address) -> Msg {
        Msg::Send(MsgSend {
            from,
            to,
            amount: Coins::single("stake", 5),
        })
    }

    #[test]
    fn test_signers_dedup_in_order() {
        let a = Address([1; 20]);
        let b = Address([2; 20]);
        let tx = StdTx::new(
            vec![send(b, a), send(a, b), send(b, a)],
            StdFee::new(Coins::empty(), 1),
            "",
        );
        assert_eq!(tx.signers(), vec![b, a]);
        assert_eq!(tx.fee_payer(), Some(b));
    }

    #[test]
    fn test_validate_basic_counts_signatures() {
        let key = SigningKey::from_bytes(&[9u8; 32]);
        let from = PubKey(key.verifying_key().to_bytes()).address();
        let mut tx = StdTx::new(
            vec![send(from, Address([3; 20]))],
            StdFee::new(Coins::single("stake", 10), 10_000),
            "hi",
        );
        assert!(matches!(tx.validate_basic(), Err(TxError::Unauthorized(_))));
        tx.sign(&key, "test-chain", 0, 0);
        assert!(tx.validate_basic().is_ok());
    }

    #[test]
    fn test_empty_tx_rejected() {
        let tx = StdTx::new(vec![], StdFee::new(Coins::empty(), 1), "");
        assert!(matches!(tx.validate_basic(), Err(TxError::InvalidMsg(_))));
    }

    #[test]
    fn test_encode_decode() {
        let tx = StdTx::new(
            vec![send(Address([1; 20]), Address([2; 20]))],
            StdFee::new(Coins::single("stake", 1), 5),
            "m",
        );
        let bytes = tx.encode().unwrap();
        assert_eq!(StdTx::decode(&bytes).unwrap(), tx);
        assert!(matches!(StdTx::decode(&[0xff]), Err(TxError::TxDecode(_))));
    }

    #[test]
    fn test_sign_bytes_are_sorted_json() {
        let bytes = sign_bytes("c", 1, 2, &StdFee::default(), &[], "");
        let text = String::from_utf8(bytes).unwrap();
        let account = text.find("account_number").unwrap();
        let chain = text.find("chain_id").unwrap();
        let sequence = text.find("sequence").unwrap();
        assert!(account < chain && chain < sequence);
    }
}

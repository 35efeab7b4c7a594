//! # Interceptors
//!
//! - [`AuthFeePreprocessHandler`]: mempool minimum-fee check.
//! - [`AuthAnteHandler`]: size, memo, signature and sequence checks, then fee
//!   deduction from the first signer.
//! - [`AuthFeeRefundHandler`]: pays back the unused share of the fee.

use super::account::AccountKeeper;
use super::fee::FeeKeeper;
use crate::bank::BankKeeper;
use crate::types::{sign_bytes, AnteHandler, AnteOutcome, FeePreprocessHandler, FeeRefundHandler, StdTx};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use hub_01_store::Context;
use shared_types::{Coin, Coins, FatalError, HubResult, TxError};

pub struct AuthFeePreprocessHandler {
    fees: FeeKeeper,
    /// Node-local floor on the gas price, on top of the chain parameter.
    min_gas_price: u128,
}

impl AuthFeePreprocessHandler {
    pub fn new(fees: FeeKeeper, min_gas_price: u128) -> Self {
        Self { fees, min_gas_price }
    }
}

impl FeePreprocessHandler for AuthFeePreprocessHandler {
    fn preprocess(&self, ctx: &Context<'_>, tx: &StdTx) -> HubResult<()> {
        let params = self.fees.params(ctx)?;
        let price = params.gas_price_threshold.max(self.min_gas_price);
        let required = price.saturating_mul(u128::from(tx.fee.gas));
        let offered = tx.fee.amount.amount_of(&params.fee_denom);
        if offered < required {
            return Err(TxError::InsufficientFee(format!(
                "{offered}{denom} offered, {required}{denom} required",
                denom = params.fee_denom
            ))
            .into());
        }
        Ok(())
    }
}

pub struct AuthAnteHandler {
    accounts: AccountKeeper,
    fees: FeeKeeper,
}

impl AuthAnteHandler {
    pub fn new(accounts: AccountKeeper, fees: FeeKeeper) -> Self {
        Self { accounts, fees }
    }
}

impl AnteHandler for AuthAnteHandler {
    fn ante(&self, ctx: &mut Context<'_>, tx: &StdTx, tx_len: usize) -> HubResult<AnteOutcome> {
        let params = self.fees.params(ctx)?;

        let memo_len = tx.memo.chars().count();
        if memo_len as u64 > params.max_memo_characters {
            return Err(TxError::MemoTooLarge {
                len: memo_len,
                max: params.max_memo_characters as usize,
            }
            .into());
        }
        if tx_len as u64 > params.tx_size_limit {
            return Err(TxError::TxTooLarge {
                size: tx_len,
                max: params.tx_size_limit,
            }
            .into());
        }
        ctx.gas_meter()
            .consume(params.tx_size_cost_per_byte.saturating_mul(tx_len as u64));

        let signers = tx.signers();
        if signers.len() != tx.signatures.len() {
            return Err(TxError::Unauthorized("signature count does not match signers".into()).into());
        }

        // Gentxs are signed before account numbers exist.
        let genesis = ctx.block_height() == 0;

        for (i, (signer, sig)) in signers.iter().zip(&tx.signatures).enumerate() {
            let mut account = self
                .accounts
                .get_account(ctx, signer)?
                .ok_or_else(|| TxError::UnknownAddress(signer.to_string()))?;

            match account.pub_key {
                Some(known) if known != sig.pub_key => {
                    return Err(TxError::InvalidPubKey(format!(
                        "signature key does not match account {signer}"
                    ))
                    .into());
                }
                Some(_) => {}
                None => {
                    if sig.pub_key.address() != *signer {
                        return Err(TxError::InvalidPubKey(format!(
                            "key does not derive signer {signer}"
                        ))
                        .into());
                    }
                    account.pub_key = Some(sig.pub_key);
                }
            }

            if sig.sequence != account.sequence {
                return Err(TxError::InvalidSequence {
                    expected: account.sequence,
                    got: sig.sequence,
                }
                .into());
            }
            let account_number = if genesis { 0 } else { account.account_number };
            let bytes = sign_bytes(
                ctx.chain_id(),
                account_number,
                account.sequence,
                &tx.fee,
                &tx.msgs,
                &tx.memo,
            );
            verify(&sig.pub_key.0, &sig.signature, &bytes)?;
            ctx.gas_meter().consume(params.sig_verify_cost);

            account.sequence += 1;
            if i == 0 && !tx.fee.amount.is_empty() {
                account.coins = account.coins.checked_minus(&tx.fee.amount).ok_or_else(|| {
                    TxError::InsufficientFunds(format!(
                        "fee payer {signer} holds {}, fee is {}",
                        account.coins, tx.fee.amount
                    ))
                })?;
                self.fees.add_collected_fees(ctx, &tx.fee.amount)?;
            }
            self.accounts.set_account(ctx, &account)?;
        }

        Ok(AnteOutcome {
            gas_wanted: tx.fee.gas,
        })
    }
}

fn verify(pub_key: &[u8; 32], signature: &[u8], msg: &[u8]) -> Result<(), TxError> {
    let key = VerifyingKey::from_bytes(pub_key)
        .map_err(|e| TxError::InvalidPubKey(e.to_string()))?;
    let signature = Signature::from_slice(signature)
        .map_err(|_| TxError::Unauthorized("malformed signature".into()))?;
    key.verify(msg, &signature)
        .map_err(|_| TxError::Unauthorized("signature verification failed".into()))
}

pub struct AuthFeeRefundHandler {
    bank: BankKeeper,
    fees: FeeKeeper,
}

impl AuthFeeRefundHandler {
    pub fn new(bank: BankKeeper, fees: FeeKeeper) -> Self {
        Self { bank, fees }
    }
}

impl FeeRefundHandler for AuthFeeRefundHandler {
    fn refund(&self, ctx: &mut Context<'_>, tx: &StdTx) -> HubResult<Coins> {
        let wanted = tx.fee.gas;
        let used = ctx.gas_meter().consumed_to_limit().min(wanted);
        let unused = wanted - used;
        let Some(payer) = tx.fee_payer() else {
            return Ok(Coins::empty());
        };
        if unused == 0 || wanted == 0 || tx.fee.amount.is_empty() {
            return Ok(Coins::empty());
        }
        let refund = tx
            .fee
            .amount
            .iter()
            .map(|c| c.checked_mul_ratio(u128::from(unused), u128::from(wanted)))
            .collect::<Option<Vec<Coin>>>()
            .map(Coins::new)
            .ok_or_else(|| FatalError::Internal(format!("fee refund overflow for {}", tx.fee.amount)))?;
        if refund.is_empty() {
            return Ok(refund);
        }
        self.fees.take_collected_fees(ctx, &refund)?;
        self.bank.add_coins(ctx, &payer, &refund)?;
        Ok(refund)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthParams;
    use crate::bank::MsgSend;
    use crate::params::ParamsKeeper;
    use crate::testutil::{ctx_at, fresh_view};
    use crate::types::{Msg, StdFee};
    use ed25519_dalek::SigningKey;
    use hub_01_store::{catalog, GasMeter};
    use shared_types::{Address, HubError, PubKey};

    struct Fixture {
        accounts: AccountKeeper,
        bank: BankKeeper,
        fees: FeeKeeper,
        key: SigningKey,
        addr: Address,
    }

    fn fixture() -> Fixture {
        let accounts = AccountKeeper::new(catalog::ACCOUNT);
        let params = ParamsKeeper::new(catalog::PARAMS).register::<AuthParams>();
        let key = SigningKey::from_bytes(&[4u8; 32]);
        Fixture {
            accounts,
            bank: BankKeeper::new(accounts),
            fees: FeeKeeper::new(catalog::FEE, params.subspace("auth")),
            addr: PubKey(key.verifying_key().to_bytes()).address(),
            key,
        }
    }

    fn send_tx(f: &Fixture, fee: u128, gas: u64, sequence: u64, account_number: u64) -> StdTx {
        let mut tx = StdTx::new(
            vec![Msg::Send(MsgSend {
                from: f.addr,
                to: Address([9; 20]),
                amount: Coins::single("stake", 1),
            })],
            StdFee::new(Coins::single("stake", fee), gas),
            "",
        );
        tx.sign(&f.key, "test-chain", account_number, sequence);
        tx
    }

    #[test]
    fn test_preprocess_enforces_min_fee() {
        let f = fixture();
        let mut view = fresh_view();
        let ctx = ctx_at(&mut view, 1);
        let pre = AuthFeePreprocessHandler::new(f.fees, 2);
        assert!(pre.preprocess(&ctx, &send_tx(&f, 200, 100, 0, 0)).is_ok());
        let err = pre.preprocess(&ctx, &send_tx(&f, 199, 100, 0, 0)).unwrap_err();
        assert!(matches!(err, HubError::Tx(TxError::InsufficientFee(_))));
    }

    #[test]
    fn test_ante_deducts_fee_and_bumps_sequence() {
        let f = fixture();
        let mut view = fresh_view();
        let mut ctx = ctx_at(&mut view, 1);
        f.bank.add_coins(&mut ctx, &f.addr, &Coins::single("stake", 1_000)).unwrap();
        let ante = AuthAnteHandler::new(f.accounts, f.fees);

        let tx = send_tx(&f, 100, 50_000, 0, 0);
        let out = ante.ante(&mut ctx, &tx, 200).unwrap();
        assert_eq!(out.gas_wanted, 50_000);

        let acc = f.accounts.get_account(&ctx, &f.addr).unwrap().unwrap();
        assert_eq!(acc.sequence, 1);
        assert_eq!(acc.coins, Coins::single("stake", 900));
        assert_eq!(f.fees.collected_fees(&ctx).unwrap(), Coins::single("stake", 100));

        // Replaying the same signature fails on sequence.
        let err = ante.ante(&mut ctx, &tx, 200).unwrap_err();
        assert!(matches!(err, HubError::Tx(TxError::InvalidSequence { expected: 1, got: 0 })));
    }

    #[test]
    fn test_ante_rejects_unknown_account_and_bad_signature() {
        let f = fixture();
        let mut view = fresh_view();
        let mut ctx = ctx_at(&mut view, 1);
        let ante = AuthAnteHandler::new(f.accounts, f.fees);
        let tx = send_tx(&f, 10, 50_000, 0, 0);
        assert!(matches!(
            ante.ante(&mut ctx, &tx, 100).unwrap_err(),
            HubError::Tx(TxError::UnknownAddress(_))
        ));

        f.bank.add_coins(&mut ctx, &f.addr, &Coins::single("stake", 100)).unwrap();
        let mut tampered = tx.clone();
        tampered.memo = "changed".into();
        assert!(matches!(
            ante.ante(&mut ctx, &tampered, 100).unwrap_err(),
            HubError::Tx(TxError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_refund_returns_unused_share() {
        let f = fixture();
        let mut view = fresh_view();
        let tx = send_tx(&f, 100, 1_000, 0, 0);
        {
            let mut setup = ctx_at(&mut view, 1);
            f.bank.add_coins(&mut setup, &f.addr, &Coins::single("stake", 900)).unwrap();
            f.fees.add_collected_fees(&mut setup, &tx.fee.amount).unwrap();
        }
        let mut ctx = ctx_at(&mut view, 1).with_gas_meter(GasMeter::with_limit(1_000));
        ctx.gas_meter().consume(250);

        let refunder = AuthFeeRefundHandler::new(f.bank, f.fees);
        let refunded = refunder.refund(&mut ctx, &tx).unwrap();
        assert_eq!(refunded, Coins::single("stake", 75));
        assert_eq!(f.fees.collected_fees(&ctx).unwrap(), Coins::single("stake", 25));
        assert_eq!(f.bank.get_coins(&ctx, &f.addr).unwrap(), Coins::single("stake", 975));
    }

    #[test]
    fn test_refund_of_large_fee_keeps_full_precision() {
        let f = fixture();
        let mut view = fresh_view();
        let fee = 10u128.pow(21);
        let wanted = 10u64.pow(18);
        let tx = send_tx(&f, fee, wanted, 0, 0);
        {
            let mut setup = ctx_at(&mut view, 1);
            f.fees.add_collected_fees(&mut setup, &tx.fee.amount).unwrap();
        }
        let mut ctx = ctx_at(&mut view, 1).with_gas_meter(GasMeter::with_limit(wanted));
        ctx.gas_meter().consume(250);

        let refunder = AuthFeeRefundHandler::new(f.bank, f.fees);
        let refunded = refunder.refund(&mut ctx, &tx).unwrap();
        assert_eq!(refunded, Coins::single("stake", fee - 250_000));
        assert_eq!(f.fees.collected_fees(&ctx).unwrap(), Coins::single("stake", 250_000));
        assert_eq!(f.bank.get_coins(&ctx, &f.addr).unwrap(), Coins::single("stake", fee - 250_000));
    }
}

//! # Interceptor Chain
//!
//! The three stages around every transaction and the pipeline that runs
//! them:
//!
//! ```text
//! decode ─→ validate_basic ─→ [check] fee-preprocess ─→ ante ─→ done
//!                          └→ [deliver] ante ─→ msgs ─→ fee-refund
//! ```
//!
//! Ante writes survive a failing message so the payer's sequence and fee
//! stick; message writes are discarded as a unit on any rejection. The
//! refund runs whenever ante succeeded, whatever the messages did.

use crate::router::Router;
use hub_01_store::{Context, ExecMode, GasMeter, StoreView};
use hub_02_modules::{AnteHandler, FeePreprocessHandler, FeeRefundHandler, HandlerResult, StdTx};
use shared_types::{BlockHeader, FatalError, HubError, HubResult, ResponseTx, TxError};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct InterceptorChain {
    fee_preprocess: Arc<dyn FeePreprocessHandler>,
    ante: Arc<dyn AnteHandler>,
    fee_refund: Arc<dyn FeeRefundHandler>,
}

/// Encodes a transaction-scoped rejection into its result.
pub fn tx_failure(err: &TxError, gas_wanted: u64, gas_used: u64) -> ResponseTx {
    ResponseTx {
        code: err.code(),
        codespace: err.codespace().to_string(),
        log: err.to_string(),
        gas_wanted,
        gas_used,
        ..Default::default()
    }
}

fn out_of_gas(gas: &GasMeter) -> HubResult<()> {
    match gas.limit() {
        Some(limit) if gas.is_past_limit() => Err(TxError::OutOfGas {
            limit,
            used: gas.consumed(),
        }
        .into()),
        _ => Ok(()),
    }
}

impl InterceptorChain {
    pub fn new(
        fee_preprocess: Arc<dyn FeePreprocessHandler>,
        ante: Arc<dyn AnteHandler>,
        fee_refund: Arc<dyn FeeRefundHandler>,
    ) -> Self {
        Self {
            fee_preprocess,
            ante,
            fee_refund,
        }
    }

    /// Runs `tx_bytes` against `view`. `Ok` carries every transaction
    /// outcome, rejections included; `Err` means block processing must stop.
    pub fn run_tx(
        &self,
        router: &Router,
        view: &mut StoreView,
        header: &BlockHeader,
        mode: ExecMode,
        tx_bytes: &[u8],
    ) -> Result<ResponseTx, FatalError> {
        let tx = match StdTx::decode(tx_bytes).and_then(|tx| tx.validate_basic().map(|_| tx)) {
            Ok(tx) => tx,
            Err(e) => return Ok(tx_failure(&e, 0, 0)),
        };
        let gas_wanted = tx.fee.gas;
        let mut ctx =
            Context::new(view, header.clone(), mode).with_gas_meter(GasMeter::with_limit(gas_wanted));

        if mode == ExecMode::Check {
            if let Err(e) = self.fee_preprocess.preprocess(&ctx, &tx) {
                return reject(e, gas_wanted, 0);
            }
        }

        ctx.branch();
        let ante = self
            .ante
            .ante(&mut ctx, &tx, tx_bytes.len())
            .and_then(|outcome| out_of_gas(ctx.gas_meter()).map(|_| outcome));
        if let Err(e) = ante {
            ctx.discard_branch();
            return reject(e, gas_wanted, ctx.gas_meter().consumed_to_limit());
        }
        ctx.write_branch();

        if mode == ExecMode::Check {
            return Ok(ResponseTx {
                gas_wanted,
                gas_used: ctx.gas_meter().consumed_to_limit(),
                ..Default::default()
            });
        }

        ctx.branch();
        let outcome = run_msgs(&mut ctx, router, &tx);
        if outcome.is_ok() {
            ctx.write_branch();
        } else {
            ctx.discard_branch();
        }
        let gas_used = ctx.gas_meter().consumed_to_limit();

        let refund = self
            .fee_refund
            .refund(&mut ctx, &tx)
            .map_err(HubError::into_fatal)?;
        if !refund.is_empty() {
            debug!("[interceptors] refunded {} for {} gas unused", refund, gas_wanted - gas_used);
        }

        match outcome {
            Ok(result) => Ok(ResponseTx {
                data: result.data,
                gas_wanted,
                gas_used,
                tags: result.tags,
                ..Default::default()
            }),
            Err(e) => reject(e, gas_wanted, gas_used),
        }
    }
}

fn reject(err: HubError, gas_wanted: u64, gas_used: u64) -> Result<ResponseTx, FatalError> {
    match err {
        HubError::Tx(e) => Ok(tx_failure(&e, gas_wanted, gas_used)),
        HubError::Fatal(e) => Err(e),
    }
}

fn run_msgs(ctx: &mut Context<'_>, router: &Router, tx: &StdTx) -> HubResult<HandlerResult> {
    let mut out = HandlerResult::default();
    for msg in &tx.msgs {
        let handler = router
            .route(msg.route())
            .ok_or_else(|| TxError::UnknownRoute(format!("no route for {}", msg.route())))?;
        let result = handler.handle(ctx, msg)?;
        out.data.extend(result.data);
        out.tags.extend(result.tags);
        out_of_gas(ctx.gas_meter())?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keepers::{KeeperSet, ModuleId};
    use crate::router::RouterBuilder;
    use crate::testutil::{header, signed_send, Funded};
    use hub_01_store::{catalog, CommitStore, InMemoryCommitStore};
    use hub_02_modules::auth::{AuthAnteHandler, AuthFeePreprocessHandler, AuthFeeRefundHandler};
    use hub_02_modules::bank::BankHandler;
    use hub_02_modules::upgrade::ProtocolKeeper;
    use shared_types::{Address, CODE_OK};

    const RECIPIENT: Address = Address([9; 20]);

    struct Fixture {
        keepers: KeeperSet,
        chain: InterceptorChain,
        view: StoreView,
        funded: Funded,
    }

    fn fixture() -> Fixture {
        let keepers = KeeperSet::load(
            &[ModuleId::Accounts, ModuleId::Params, ModuleId::Bank, ModuleId::Fees],
            ProtocolKeeper::new(catalog::PROTOCOL),
        )
        .unwrap();
        let accounts = keepers.accounts().unwrap();
        let bank = keepers.bank().unwrap();
        let fees = keepers.fees().unwrap();
        let chain = InterceptorChain::new(
            Arc::new(AuthFeePreprocessHandler::new(fees, 0)),
            Arc::new(AuthAnteHandler::new(accounts, fees)),
            Arc::new(AuthFeeRefundHandler::new(bank, fees)),
        );
        let store = InMemoryCommitStore::default();
        store.mount(&catalog::ALL);
        let mut view = store.begin();
        let funded = Funded::new(&mut view, &keepers, 7, 1_000_000);
        Fixture {
            keepers,
            chain,
            view,
            funded,
        }
    }

    fn bank_router(keepers: &KeeperSet) -> Router {
        RouterBuilder::new()
            .add_route("bank", Arc::new(BankHandler::new(keepers.bank().unwrap())))
            .unwrap()
            .freeze()
    }

    fn balance(f: &mut Fixture, addr: &Address) -> u128 {
        let ctx = Context::new(&mut f.view, header(1), ExecMode::Query);
        f.keepers.bank().unwrap().get_coins(&ctx, addr).unwrap().amount_of("stake")
    }

    #[test]
    fn test_deliver_charges_only_used_gas() {
        let mut f = fixture();
        let router = bank_router(&f.keepers);
        let tx = signed_send(&f.funded, RECIPIENT, 10, 100_000, 100_000, 0);

        let res = f
            .chain
            .run_tx(&router, &mut f.view, &header(1), ExecMode::Deliver, &tx)
            .unwrap();
        assert_eq!(res.code, CODE_OK, "{}", res.log);
        assert!(res.gas_used > 0 && res.gas_used < 100_000);
        assert_eq!(balance(&mut f, &RECIPIENT), 10);
        let payer = f.funded.addr;
        assert_eq!(balance(&mut f, &payer), 1_000_000 - 10 - u128::from(res.gas_used));
    }

    #[test]
    fn test_failed_msg_keeps_ante_but_not_msg_writes() {
        let mut f = fixture();
        let router = bank_router(&f.keepers);
        let tx = signed_send(&f.funded, RECIPIENT, 5_000_000, 100_000, 100_000, 0);

        let res = f
            .chain
            .run_tx(&router, &mut f.view, &header(1), ExecMode::Deliver, &tx)
            .unwrap();
        assert_eq!(res.code, TxError::InsufficientFunds(String::new()).code());
        assert_eq!(balance(&mut f, &RECIPIENT), 0);

        let ctx = Context::new(&mut f.view, header(1), ExecMode::Query);
        let account = f.keepers.accounts().unwrap().get_account(&ctx, &f.funded.addr).unwrap().unwrap();
        assert_eq!(account.sequence, 1);
    }

    #[test]
    fn test_unroutable_msg_is_tx_scoped() {
        let mut f = fixture();
        let empty = RouterBuilder::new().freeze();
        let tx = signed_send(&f.funded, RECIPIENT, 10, 100_000, 100_000, 0);

        let res = f
            .chain
            .run_tx(&empty, &mut f.view, &header(1), ExecMode::Deliver, &tx)
            .unwrap();
        assert_eq!(res.code, TxError::UnknownRoute(String::new()).code());
        assert_eq!(res.codespace, "sdk");
    }

    #[test]
    fn test_check_rejects_low_fee_without_touching_state() {
        let mut f = fixture();
        let router = bank_router(&f.keepers);
        let tx = signed_send(&f.funded, RECIPIENT, 10, 1_000, 100_000, 0);

        let res = f
            .chain
            .run_tx(&router, &mut f.view, &header(1), ExecMode::Check, &tx)
            .unwrap();
        assert_eq!(res.code, TxError::InsufficientFee(String::new()).code());
        let payer = f.funded.addr;
        assert_eq!(balance(&mut f, &payer), 1_000_000);
    }

    #[test]
    fn test_garbage_bytes_are_a_decode_failure() {
        let mut f = fixture();
        let router = bank_router(&f.keepers);
        let res = f
            .chain
            .run_tx(&router, &mut f.view, &header(1), ExecMode::Deliver, &[0xff, 0x01])
            .unwrap();
        assert_eq!(res.code, TxError::TxDecode(String::new()).code());
    }
}

use crate::params::{ParamSet, Subspace};
use crate::types::DEFAULT_BOND_DENOM;
use hub_01_store::{Context, StoreKey};
use serde::{Deserialize, Serialize};
use shared_types::{Coins, FatalError, HubResult};

const COLLECTED_FEES_KEY: &[u8] = b"collectedFees";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthParams {
    /// Minimum price per unit of gas, in `fee_denom`.
    pub gas_price_threshold: u128,
    pub fee_denom: String,
    pub max_memo_characters: u64,
    pub tx_size_limit: u64,
    pub tx_size_cost_per_byte: u64,
    pub sig_verify_cost: u64,
}

impl Default for AuthParams {
    fn default() -> Self {
        Self {
            gas_price_threshold: 1,
            fee_denom: DEFAULT_BOND_DENOM.to_string(),
            max_memo_characters: 256,
            tx_size_limit: 10_240,
            tx_size_cost_per_byte: 10,
            sig_verify_cost: 1_000,
        }
    }
}

impl ParamSet for AuthParams {
    const SUBSPACE: &'static str = "auth";

    fn validate(&self) -> Result<(), String> {
        if self.fee_denom.is_empty() {
            return Err("fee_denom must be set".into());
        }
        if self.tx_size_limit == 0 {
            return Err("tx_size_limit must be positive".into());
        }
        Ok(())
    }
}

/// Owner of the `fee` store: fees collected in the current block window.
#[derive(Debug, Clone, Copy)]
pub struct FeeKeeper {
    key: StoreKey,
    params: Subspace,
}

impl FeeKeeper {
    pub fn new(key: StoreKey, params: Subspace) -> Self {
        Self { key, params }
    }

    pub fn params(&self, ctx: &Context<'_>) -> HubResult<AuthParams> {
        self.params.get(ctx)
    }

    pub fn set_params(&self, ctx: &mut Context<'_>, params: &AuthParams) -> HubResult<()> {
        self.params.set(ctx, params)
    }

    pub fn collected_fees(&self, ctx: &Context<'_>) -> HubResult<Coins> {
        Ok(ctx.get_obj(self.key, COLLECTED_FEES_KEY)?.unwrap_or_default())
    }

    pub fn set_collected_fees(&self, ctx: &mut Context<'_>, fees: &Coins) -> HubResult<()> {
        ctx.set_obj(self.key, COLLECTED_FEES_KEY.to_vec(), fees)?;
        Ok(())
    }

    pub fn add_collected_fees(&self, ctx: &mut Context<'_>, fees: &Coins) -> HubResult<Coins> {
        let total = self.collected_fees(ctx)?.plus(fees);
        self.set_collected_fees(ctx, &total)?;
        Ok(total)
    }

    /// Removes `fees` from the collector. The collector only ever pays out
    /// what it took in, so a shortfall means the accounting is broken.
    pub fn take_collected_fees(&self, ctx: &mut Context<'_>, fees: &Coins) -> HubResult<()> {
        let current = self.collected_fees(ctx)?;
        let rest = current.checked_minus(fees).ok_or_else(|| {
            FatalError::InvariantBroken {
                name: "fee-collector".into(),
                detail: format!("cannot take {fees} from collected {current}"),
            }
        })?;
        self.set_collected_fees(ctx, &rest)
    }

    /// Empties the collector and returns what it held.
    pub fn drain_collected_fees(&self, ctx: &mut Context<'_>) -> HubResult<Coins> {
        let fees = self.collected_fees(ctx)?;
        self.set_collected_fees(ctx, &Coins::empty())?;
        Ok(fees)
    }
}

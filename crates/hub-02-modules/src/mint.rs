//! # Mint
//!
//! Inflation paid every block into the fee collector, proportional to the
//! wall-clock time elapsed since the previous block. Distribution hands it out
//! with the fees at the next begin block.

use crate::auth::FeeKeeper;
use crate::params::{ParamSet, Subspace};
use crate::staking::StakingCore;
use crate::types::DEFAULT_BOND_DENOM;
use hub_01_store::{Context, StoreKey};
use serde::{Deserialize, Serialize};
use shared_types::tags::keys;
use shared_types::{Coin, Coins, Dec, HubResult, Tags};
use tracing::debug;

const MINTER_KEY: &[u8] = &[0x00];

/// Seconds in 8766 hours, the length of a minting year.
pub const SECONDS_PER_YEAR: u64 = 60 * 60 * 8766;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Minter {
    /// Block time (unix seconds) of the last provision; zero before the first block.
    pub last_update: u64,
    pub mint_denom: String,
    pub inflation_base: u128,
}

impl Default for Minter {
    fn default() -> Self {
        Self {
            last_update: 0,
            mint_denom: DEFAULT_BOND_DENOM.to_string(),
            inflation_base: 0,
        }
    }
}

impl Minter {
    pub fn annual_provisions(&self, params: &MintParams) -> Dec {
        Dec::from_int(self.inflation_base).mul(params.inflation)
    }

    /// Coins minted for a block at `block_time`.
    pub fn block_provision(&self, params: &MintParams, block_time: u64) -> Coin {
        let elapsed = block_time.saturating_sub(self.last_update);
        let amount = self
            .annual_provisions(params)
            .mul_ratio(Dec::from_int(u128::from(elapsed)), Dec::from_int(u128::from(SECONDS_PER_YEAR)))
            .truncate();
        Coin::new(self.mint_denom.clone(), amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintParams {
    pub inflation: Dec,
}

impl Default for MintParams {
    fn default() -> Self {
        Self {
            inflation: Dec::percent(4),
        }
    }
}

impl ParamSet for MintParams {
    const SUBSPACE: &'static str = "mint";

    fn validate(&self) -> Result<(), String> {
        if self.inflation > Dec::percent(20) {
            return Err(format!("inflation {} above 0.2", self.inflation));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MintKeeper {
    key: StoreKey,
    params: Subspace,
    staking: StakingCore,
    fees: FeeKeeper,
}

impl MintKeeper {
    pub fn new(key: StoreKey, params: Subspace, staking: StakingCore, fees: FeeKeeper) -> Self {
        Self {
            key,
            params,
            staking,
            fees,
        }
    }

    pub fn minter(&self, ctx: &Context<'_>) -> HubResult<Minter> {
        Ok(ctx.get_obj(self.key, MINTER_KEY)?.unwrap_or_default())
    }

    pub fn set_minter(&self, ctx: &mut Context<'_>, minter: &Minter) -> HubResult<()> {
        ctx.set_obj(self.key, MINTER_KEY.to_vec(), minter)?;
        Ok(())
    }

    pub fn params(&self, ctx: &Context<'_>) -> HubResult<MintParams> {
        self.params.get(ctx)
    }

    pub fn set_params(&self, ctx: &mut Context<'_>, params: &MintParams) -> HubResult<()> {
        self.params.set(ctx, params)
    }

    pub fn begin_blocker(&self, ctx: &mut Context<'_>) -> HubResult<Tags> {
        let block_time = ctx.block_time();
        let mut minter = self.minter(ctx)?;
        if ctx.block_height() == 0 || minter.last_update == 0 {
            minter.last_update = block_time;
            self.set_minter(ctx, &minter)?;
            return Ok(Tags::new());
        }

        let params = self.params(ctx)?;
        let minted = minter.block_provision(&params, block_time);
        minter.last_update = block_time;
        self.set_minter(ctx, &minter)?;

        if minted.amount > 0 {
            if minted.denom == self.staking.bond_denom(ctx)? {
                self.staking.inflate(ctx, minted.amount)?;
            }
            self.fees.add_collected_fees(ctx, &Coins::from(minted.clone()))?;
        }
        debug!("[mint] minted {}{} at height {}", minted.amount, minted.denom, ctx.block_height());
        Ok(Tags::new().with(keys::MINT_COIN, format!("{}{}", minted.amount, minted.denom)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MintGenesis {
    pub minter: Minter,
    pub params: MintParams,
}

impl MintGenesis {
    pub fn validate(&self) -> Result<(), String> {
        self.params.validate()?;
        if self.minter.mint_denom.is_empty() {
            return Err("minter denom must be set".into());
        }
        Ok(())
    }
}

pub fn init_genesis(ctx: &mut Context<'_>, keeper: &MintKeeper, data: &MintGenesis) -> HubResult<()> {
    keeper.set_minter(ctx, &data.minter)?;
    keeper.set_params(ctx, &data.params)
}

pub fn export_genesis(ctx: &Context<'_>, keeper: &MintKeeper) -> HubResult<MintGenesis> {
    Ok(MintGenesis {
        minter: keeper.minter(ctx)?,
        params: keeper.params(ctx)?,
    })
}

/// The restarted chain takes its first provision time from its first block.
pub fn prepare_for_zero_height(ctx: &mut Context<'_>, keeper: &MintKeeper) -> HubResult<()> {
    let mut minter = keeper.minter(ctx)?;
    minter.last_update = 0;
    keeper.set_minter(ctx, &minter)
}

//! # Genesis Import / Export
//!
//! The genesis document is a projection of the keeper set's state: one
//! account list, one sub-document per module and the genesis transactions
//! replayed at InitChain. Bytes are rendered through `serde_json::Value`, whose
//! maps are ordered, so every node produces the same document.
//!
//! ## Import order
//!
//! ```text
//! accounts (by declared number) → staking → slashing → gov → auth → mint
//!   → distribution → service → guardian → upgrade → record → gentxs
//! ```
//!
//! ## Zero-height export
//!
//! Settles every pending reward, then strips or rebases every field that
//! names a block height, so the snapshot can start a fresh chain at height
//! zero with the same economic state.

use crate::keepers::KeeperSet;
use crate::protocol::Protocol;
use hub_01_store::{Context, ExecMode, StoreView};
use hub_02_modules::auth::{self, AuthGenesis};
use hub_02_modules::distribution::{self, DistrGenesis};
use hub_02_modules::gov::{self, GovGenesis};
use hub_02_modules::guardian::{self, GuardianGenesis};
use hub_02_modules::mint::{self, MintGenesis};
use hub_02_modules::record::{self, RecordGenesis};
use hub_02_modules::service::{self, ServiceGenesis};
use hub_02_modules::slashing::{self, SlashingGenesis};
use hub_02_modules::staking::{self, StakingGenesis};
use hub_02_modules::upgrade::{self, UpgradeGenesis};
use hub_02_modules::StdTx;
use serde::{Deserialize, Serialize};
use shared_types::{
    Address, BlockHeader, Coins, FatalError, HubError, HubResult, RequestInitChain, ResponseInitChain,
    ValidatorUpdate,
};
use std::collections::BTreeSet;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub address: Address,
    pub coins: Coins,
    /// Orders the import. Numbers are reassigned densely from zero.
    pub account_number: u64,
    #[serde(default)]
    pub sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GenesisState {
    #[serde(default)]
    pub accounts: Vec<GenesisAccount>,
    #[serde(default)]
    pub auth: AuthGenesis,
    #[serde(default)]
    pub stake: StakingGenesis,
    #[serde(default)]
    pub mint: MintGenesis,
    #[serde(default)]
    pub distr: DistrGenesis,
    #[serde(default)]
    pub gov: GovGenesis,
    #[serde(default)]
    pub upgrade: UpgradeGenesis,
    #[serde(default)]
    pub service: ServiceGenesis,
    #[serde(default)]
    pub guardian: GuardianGenesis,
    #[serde(default)]
    pub slashing: SlashingGenesis,
    #[serde(default)]
    pub record: RecordGenesis,
    #[serde(default)]
    pub gentxs: Vec<StdTx>,
}

impl GenesisState {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FatalError> {
        serde_json::from_slice(bytes).map_err(|e| FatalError::MalformedGenesis(e.to_string()))
    }

    /// Deterministic JSON: every object's keys in sorted order.
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>, FatalError> {
        let value = serde_json::to_value(self).map_err(|e| FatalError::Internal(format!("genesis encoding: {e}")))?;
        serde_json::to_vec_pretty(&value).map_err(|e| FatalError::Internal(format!("genesis encoding: {e}")))
    }

    /// Protocol version the chain starts under.
    pub fn genesis_version(&self) -> u64 {
        self.upgrade.genesis_version.version()
    }

    pub fn validate(&self) -> Result<(), FatalError> {
        let malformed = |e: String| FatalError::MalformedGenesis(e);
        let mut addresses = BTreeSet::new();
        let mut numbers = BTreeSet::new();
        for account in &self.accounts {
            if !addresses.insert(account.address) {
                return Err(malformed(format!("duplicate account {}", account.address)));
            }
            if !numbers.insert(account.account_number) {
                return Err(malformed(format!("duplicate account number {}", account.account_number)));
            }
            account
                .coins
                .validate()
                .map_err(|e| malformed(format!("account {}: {e}", account.address)))?;
        }

        let modules = [
            ("auth", self.auth.validate()),
            ("stake", self.stake.validate()),
            ("mint", self.mint.validate()),
            ("distr", self.distr.validate()),
            ("gov", self.gov.validate()),
            ("upgrade", self.upgrade.validate()),
            ("service", self.service.validate()),
            ("slashing", self.slashing.validate()),
        ];
        for (name, result) in modules {
            result.map_err(|e| malformed(format!("{name}: {e}")))?;
        }
        Ok(())
    }
}

fn fatal<T>(res: HubResult<T>) -> Result<T, FatalError> {
    res.map_err(HubError::into_fatal)
}

// =============================================================================
// IMPORT
// =============================================================================

/// The init chainer of every protocol version.
pub fn init_chainer(
    protocol: &Protocol,
    view: &mut StoreView,
    req: &RequestInitChain,
) -> Result<ResponseInitChain, FatalError> {
    let genesis = GenesisState::from_bytes(&req.app_state_bytes)?;
    genesis.validate()?;
    let header = BlockHeader {
        chain_id: req.chain_id.clone(),
        height: 0,
        time: req.time,
        proposer: Address::default(),
    };
    let keepers = protocol.keepers();

    let mut validators = {
        let mut ctx = Context::new(view, header.clone(), ExecMode::InitChain);
        fatal(import_state(keepers, &mut ctx, &genesis))?
    };

    if !genesis.gentxs.is_empty() {
        for (i, tx) in genesis.gentxs.iter().enumerate() {
            let bytes = tx
                .encode()
                .map_err(|e| FatalError::GenesisTxFailed(format!("gentx {i}: {e}")))?;
            let res = protocol
                .interceptors()
                .run_tx(protocol.router(), view, &header, ExecMode::InitChain, &bytes)?;
            if !res.is_ok() {
                return Err(FatalError::GenesisTxFailed(format!("gentx {i}: {}", res.log)));
            }
        }
        let mut ctx = Context::new(view, header, ExecMode::InitChain);
        let delta = fatal(keepers.staking()?.apply_and_return_validator_set_updates(&mut ctx))?;
        validators = merge_updates(validators, delta);
        debug!("[genesis] replayed {} gentxs", genesis.gentxs.len());
    }

    if !req.validators.is_empty() {
        check_validator_set(&req.validators, &validators)?;
    }
    info!(
        "[genesis] imported {} accounts, {} validators",
        genesis.accounts.len(),
        validators.len()
    );
    Ok(ResponseInitChain { validators })
}

fn import_state(keepers: &KeeperSet, ctx: &mut Context<'_>, genesis: &GenesisState) -> HubResult<Vec<ValidatorUpdate>> {
    let accounts = keepers.accounts()?;
    let mut ordered: Vec<&GenesisAccount> = genesis.accounts.iter().collect();
    ordered.sort_by_key(|a| a.account_number);
    for entry in ordered {
        let mut account = accounts.new_account(ctx, entry.address)?;
        account.coins = entry.coins.clone();
        account.sequence = entry.sequence;
        accounts.set_account(ctx, &account)?;
    }

    let validators = staking::genesis::init_genesis(ctx, keepers.staking()?, &genesis.stake)?;
    let staked = keepers.staking()?.validators(ctx)?;
    slashing::genesis::init_genesis(ctx, &keepers.slashing()?, &genesis.slashing, &staked)?;
    gov::init_genesis(ctx, keepers.gov()?, &genesis.gov)?;
    auth::genesis::init_genesis(ctx, &keepers.fees()?, &genesis.auth)?;
    mint::init_genesis(ctx, &keepers.mint()?, &genesis.mint)?;
    distribution::genesis::init_genesis(ctx, &keepers.distribution()?, &genesis.distr)?;
    service::init_genesis(ctx, &keepers.service()?, &genesis.service)?;
    guardian::init_genesis(ctx, &keepers.guardian()?, &genesis.guardian)?;
    upgrade::init_genesis(ctx, &keepers.upgrade()?, &genesis.upgrade)?;
    match keepers.record() {
        Some(records) => record::init_genesis(ctx, &records, &genesis.record)?,
        None if !genesis.record.records.is_empty() => {
            return Err(FatalError::MalformedGenesis(format!(
                "{} records but the genesis protocol has no record module",
                genesis.record.records.len()
            ))
            .into())
        }
        None => {}
    }
    Ok(validators)
}

/// Applies `delta` over `base` by consensus key; zero power removes.
fn merge_updates(base: Vec<ValidatorUpdate>, delta: Vec<ValidatorUpdate>) -> Vec<ValidatorUpdate> {
    let mut out = base;
    for update in delta {
        out.retain(|u| u.pub_key != update.pub_key);
        if update.power > 0 {
            out.push(update);
        }
    }
    out
}

fn check_validator_set(requested: &[ValidatorUpdate], imported: &[ValidatorUpdate]) -> Result<(), FatalError> {
    let sorted = |set: &[ValidatorUpdate]| {
        let mut v: Vec<_> = set.iter().map(|u| (u.pub_key, u.power)).collect();
        v.sort();
        v
    };
    if sorted(requested) != sorted(imported) {
        return Err(FatalError::ValidatorSetMismatch(format!(
            "consensus engine supplied {} validators, genesis produced {}",
            requested.len(),
            imported.len()
        )));
    }
    Ok(())
}

// =============================================================================
// EXPORT
// =============================================================================

/// Genesis bytes and the active validator set read from `view`. The view is
/// consumed: the zero-height transform writes to it and those writes must
/// never reach a commit.
pub fn export_app_state_and_validators(
    protocol: &Protocol,
    mut view: StoreView,
    header: BlockHeader,
    for_zero_height: bool,
) -> Result<(Vec<u8>, Vec<ValidatorUpdate>), FatalError> {
    let keepers = protocol.keepers();
    let mut ctx = Context::new(&mut view, header, ExecMode::Query);
    if for_zero_height {
        fatal(prepare_for_zero_height(keepers, &mut ctx))?;
    }
    let state = fatal(export_state(keepers, &ctx))?;
    let validators = fatal(current_validators(keepers, &ctx))?;
    info!(
        "[genesis] exported {} accounts at height {} (zero height: {})",
        state.accounts.len(),
        ctx.block_height(),
        for_zero_height
    );
    Ok((state.to_canonical_bytes()?, validators))
}

/// Distribution first: settling rewards moves coins that the other steps
/// then see in their final place.
fn prepare_for_zero_height(keepers: &KeeperSet, ctx: &mut Context<'_>) -> HubResult<()> {
    keepers.distribution()?.prepare_for_zero_height(ctx)?;
    staking::genesis::prepare_for_zero_height(ctx, &keepers.staking()?.core())?;
    keepers.slashing()?.prepare_for_zero_height(ctx)?;
    keepers.gov()?.prepare_for_zero_height(ctx)?;
    keepers.service()?.prepare_for_zero_height(ctx)?;
    if let Some(records) = keepers.record() {
        records.prepare_for_zero_height(ctx)?;
    }
    mint::prepare_for_zero_height(ctx, &keepers.mint()?)
}

fn export_state(keepers: &KeeperSet, ctx: &Context<'_>) -> HubResult<GenesisState> {
    let accounts = keepers
        .accounts()?
        .accounts(ctx)?
        .into_iter()
        .filter(|a| !a.coins.is_empty())
        .map(|a| GenesisAccount {
            address: a.address,
            coins: a.coins,
            account_number: a.account_number,
            sequence: a.sequence,
        })
        .collect();

    Ok(GenesisState {
        accounts,
        auth: auth::genesis::export_genesis(ctx, &keepers.fees()?)?,
        stake: staking::genesis::export_genesis(ctx, &keepers.staking()?.core())?,
        mint: mint::export_genesis(ctx, &keepers.mint()?)?,
        distr: distribution::genesis::export_genesis(ctx, &keepers.distribution()?)?,
        gov: gov::export_genesis(ctx, keepers.gov()?)?,
        upgrade: upgrade::export_genesis(ctx, &keepers.upgrade()?)?,
        service: service::export_genesis(ctx, &keepers.service()?)?,
        guardian: guardian::export_genesis(ctx, &keepers.guardian()?)?,
        slashing: slashing::genesis::export_genesis(ctx, &keepers.slashing()?)?,
        record: match keepers.record() {
            Some(records) => record::export_genesis(ctx, &records)?,
            None => RecordGenesis::default(),
        },
        gentxs: Vec::new(),
    })
}

fn current_validators(keepers: &KeeperSet, ctx: &Context<'_>) -> HubResult<Vec<ValidatorUpdate>> {
    let staking = keepers.staking()?;
    let mut out = Vec::new();
    for (operator, power) in staking.last_powers(ctx)? {
        let validator = staking.get_validator(ctx, &operator)?.ok_or_else(|| {
            FatalError::StoreCorruption(format!("last power recorded for unknown validator {operator}"))
        })?;
        out.push(ValidatorUpdate {
            pub_key: validator.cons_pubkey,
            power,
        });
    }
    Ok(out)
}

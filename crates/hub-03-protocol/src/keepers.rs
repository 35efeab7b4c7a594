//! # Keeper Set
//!
//! Builds every keeper a protocol asks for, in dependency order, as one
//! all-or-nothing `load`:
//!
//! ```text
//! accounts ──→ {guardian, params} ──→ {bank, fees} ──→ staking (unwired)
//!          ──→ {mint, distribution, slashing} ──→ attach hooks ──→ staking
//!          ──→ gov ──→ {service, upgrade} ──→ record
//! ```
//!
//! Staking is constructed before its observers and wired after them. The
//! wired [`StakingKeeper`] is the only staking value handlers ever see, so
//! there is no window in which staking events could fire into nothing.

use crate::hooks::StakingHooksComposite;
use hub_01_store::{catalog, StoreKey};
use hub_02_modules::auth::{AccountKeeper, AuthParams, FeeKeeper};
use hub_02_modules::bank::BankKeeper;
use hub_02_modules::distribution::{DistrParams, DistributionKeeper};
use hub_02_modules::gov::{GovKeeper, GovParams};
use hub_02_modules::guardian::GuardianKeeper;
use hub_02_modules::mint::{MintKeeper, MintParams};
use hub_02_modules::params::{ParamSet, ParamsKeeper};
use hub_02_modules::record::RecordKeeper;
use hub_02_modules::service::{ServiceKeeper, ServiceParams};
use hub_02_modules::slashing::{SlashingKeeper, SlashingParams};
use hub_02_modules::staking::{StakingKeeper, StakingParams, UnwiredStaking};
use hub_02_modules::upgrade::{ProtocolKeeper, UpgradeKeeper, UpgradeParams};
use shared_types::FatalError;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// One keeper of the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModuleId {
    Accounts,
    Guardian,
    Params,
    Bank,
    Fees,
    Staking,
    Mint,
    Distribution,
    Slashing,
    Gov,
    Service,
    Upgrade,
    Record,
}

impl ModuleId {
    /// Construction order. Every module appears after all of its
    /// dependencies.
    pub const ORDER: [ModuleId; 13] = [
        Self::Accounts,
        Self::Guardian,
        Self::Params,
        Self::Bank,
        Self::Fees,
        Self::Staking,
        Self::Mint,
        Self::Distribution,
        Self::Slashing,
        Self::Gov,
        Self::Service,
        Self::Upgrade,
        Self::Record,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Accounts => "accounts",
            Self::Guardian => "guardian",
            Self::Params => "params",
            Self::Bank => "bank",
            Self::Fees => "fees",
            Self::Staking => "staking",
            Self::Mint => "mint",
            Self::Distribution => "distribution",
            Self::Slashing => "slashing",
            Self::Gov => "gov",
            Self::Service => "service",
            Self::Upgrade => "upgrade",
            Self::Record => "record",
        }
    }

    /// Keepers this one holds a reference to.
    pub fn dependencies(&self) -> &'static [ModuleId] {
        match self {
            Self::Accounts | Self::Guardian | Self::Params | Self::Record => &[],
            Self::Bank => &[Self::Accounts],
            Self::Fees => &[Self::Params],
            Self::Staking => &[Self::Bank, Self::Params],
            Self::Mint => &[Self::Params, Self::Staking, Self::Fees],
            Self::Distribution => &[Self::Params, Self::Bank, Self::Staking, Self::Fees],
            Self::Slashing => &[Self::Params, Self::Staking],
            Self::Gov => &[Self::Params, Self::Bank, Self::Staking, Self::Guardian],
            Self::Service => &[Self::Params, Self::Bank],
            Self::Upgrade => &[Self::Params, Self::Staking],
        }
    }

    /// Store keys the keeper owns.
    pub fn store_keys(&self) -> &'static [StoreKey] {
        match self {
            Self::Accounts => &[catalog::ACCOUNT],
            Self::Guardian => &[catalog::GUARDIAN],
            Self::Params => &[catalog::PARAMS],
            Self::Bank => &[],
            Self::Fees => &[catalog::FEE],
            Self::Staking => &[catalog::STAKE],
            Self::Mint => &[catalog::MINT],
            Self::Distribution => &[catalog::DISTR],
            Self::Slashing => &[catalog::SLASHING],
            Self::Gov => &[catalog::GOV],
            Self::Service => &[catalog::SERVICE],
            Self::Upgrade => &[catalog::UPGRADE],
            Self::Record => &[catalog::RECORD],
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rejects a module list in which some module's dependency is absent.
pub fn validate_modules(modules: &BTreeSet<ModuleId>) -> Result<(), FatalError> {
    for module in ModuleId::ORDER.iter().filter(|m| modules.contains(m)) {
        for dep in module.dependencies() {
            if !modules.contains(dep) {
                return Err(FatalError::MissingKeeperDependency {
                    module: module.name().to_string(),
                    dependency: dep.name().to_string(),
                });
            }
        }
    }
    Ok(())
}

/// The keepers of one protocol. Absent modules are `None`; the accessors
/// turn an absent keeper into [`FatalError::MissingKeeper`].
#[derive(Clone)]
pub struct KeeperSet {
    modules: BTreeSet<ModuleId>,
    protocol: ProtocolKeeper,
    accounts: Option<AccountKeeper>,
    guardian: Option<GuardianKeeper>,
    params: Option<ParamsKeeper>,
    bank: Option<BankKeeper>,
    fees: Option<FeeKeeper>,
    staking: Option<StakingKeeper>,
    mint: Option<MintKeeper>,
    distribution: Option<DistributionKeeper>,
    slashing: Option<SlashingKeeper>,
    gov: Option<GovKeeper>,
    service: Option<ServiceKeeper>,
    upgrade: Option<UpgradeKeeper>,
    record: Option<RecordKeeper>,
    hook_members: Vec<&'static str>,
}

fn missing(module: ModuleId) -> FatalError {
    FatalError::MissingKeeper(module.name().to_string())
}

fn dep<T: Clone>(slot: &Option<T>, module: ModuleId, dependency: ModuleId) -> Result<T, FatalError> {
    slot.clone().ok_or_else(|| FatalError::MissingKeeperDependency {
        module: module.name().to_string(),
        dependency: dependency.name().to_string(),
    })
}

impl KeeperSet {
    /// Constructs and wires the keepers for `modules`.
    pub fn load(modules: &[ModuleId], protocol: ProtocolKeeper) -> Result<Self, FatalError> {
        let modules: BTreeSet<ModuleId> = modules.iter().copied().collect();
        validate_modules(&modules)?;
        let has = |m: ModuleId| modules.contains(&m);
        use ModuleId as M;

        let accounts = has(M::Accounts).then(|| AccountKeeper::new(catalog::ACCOUNT));
        let guardian = has(M::Guardian).then(|| GuardianKeeper::new(catalog::GUARDIAN));
        let params = has(M::Params).then(|| {
            let mut registry = ParamsKeeper::new(catalog::PARAMS);
            for module in &modules {
                registry = register_params(registry, *module);
            }
            registry
        });

        let bank = match has(M::Bank) {
            true => Some(BankKeeper::new(dep(&accounts, M::Bank, M::Accounts)?)),
            false => None,
        };
        let fees = match has(M::Fees) {
            true => {
                let params = dep(&params, M::Fees, M::Params)?;
                Some(FeeKeeper::new(catalog::FEE, params.subspace(AuthParams::SUBSPACE)))
            }
            false => None,
        };

        // Phase one: staking without hooks; observers read through its core.
        let unwired = match has(M::Staking) {
            true => Some(UnwiredStaking::new(
                catalog::STAKE,
                dep(&bank, M::Staking, M::Bank)?,
                dep(&params, M::Staking, M::Params)?.subspace(StakingParams::SUBSPACE),
            )),
            false => None,
        };
        let core = unwired.as_ref().map(UnwiredStaking::core);

        let mint = match has(M::Mint) {
            true => Some(MintKeeper::new(
                catalog::MINT,
                dep(&params, M::Mint, M::Params)?.subspace(MintParams::SUBSPACE),
                dep(&core, M::Mint, M::Staking)?,
                dep(&fees, M::Mint, M::Fees)?,
            )),
            false => None,
        };
        let distribution = match has(M::Distribution) {
            true => Some(DistributionKeeper::new(
                catalog::DISTR,
                dep(&params, M::Distribution, M::Params)?.subspace(DistrParams::SUBSPACE),
                dep(&bank, M::Distribution, M::Bank)?,
                dep(&core, M::Distribution, M::Staking)?,
                dep(&fees, M::Distribution, M::Fees)?,
            )),
            false => None,
        };
        let slashing = match has(M::Slashing) {
            true => Some(SlashingKeeper::new(
                catalog::SLASHING,
                dep(&params, M::Slashing, M::Params)?.subspace(SlashingParams::SUBSPACE),
                dep(&core, M::Slashing, M::Staking)?,
            )),
            false => None,
        };

        // Phase two: wire the observers, distribution strictly first.
        let mut composite = StakingHooksComposite::new();
        if let Some(d) = distribution {
            composite = composite.with("distribution", Arc::new(d));
        }
        if let Some(s) = slashing {
            composite = composite.with("slashing", Arc::new(s));
        }
        let hook_members = composite.member_names();
        let staking = unwired.map(|u| u.attach_hooks(Arc::new(composite)));

        let gov = match has(M::Gov) {
            true => Some(GovKeeper::new(
                catalog::GOV,
                dep(&params, M::Gov, M::Params)?,
                dep(&bank, M::Gov, M::Bank)?,
                dep(&core, M::Gov, M::Staking)?,
                dep(&guardian, M::Gov, M::Guardian)?,
                protocol,
            )),
            false => None,
        };
        let service = match has(M::Service) {
            true => Some(ServiceKeeper::new(
                catalog::SERVICE,
                dep(&params, M::Service, M::Params)?.subspace(ServiceParams::SUBSPACE),
                dep(&bank, M::Service, M::Bank)?,
            )),
            false => None,
        };
        let upgrade = match has(M::Upgrade) {
            true => Some(UpgradeKeeper::new(
                catalog::UPGRADE,
                dep(&params, M::Upgrade, M::Params)?.subspace(UpgradeParams::SUBSPACE),
                protocol,
                dep(&core, M::Upgrade, M::Staking)?,
            )),
            false => None,
        };
        let record = has(M::Record).then(|| RecordKeeper::new(catalog::RECORD));

        debug!(
            "[keepers] loaded {} keepers, staking hooks: [{}]",
            modules.len(),
            hook_members.join(", ")
        );

        Ok(Self {
            modules,
            protocol,
            accounts,
            guardian,
            params,
            bank,
            fees,
            staking,
            mint,
            distribution,
            slashing,
            gov,
            service,
            upgrade,
            record,
            hook_members,
        })
    }

    pub fn modules(&self) -> &BTreeSet<ModuleId> {
        &self.modules
    }

    pub fn has(&self, module: ModuleId) -> bool {
        self.modules.contains(&module)
    }

    /// Observers attached to staking, in invocation order.
    pub fn hook_members(&self) -> &[&'static str] {
        &self.hook_members
    }

    /// Store keys of every keeper in the set plus the engine-owned ones.
    pub fn store_keys(&self) -> Vec<StoreKey> {
        let mut keys: BTreeSet<StoreKey> = [catalog::MAIN, catalog::PROTOCOL].into_iter().collect();
        for module in &self.modules {
            keys.extend(module.store_keys().iter().copied());
        }
        keys.into_iter().collect()
    }

    pub fn protocol(&self) -> ProtocolKeeper {
        self.protocol
    }

    pub fn accounts(&self) -> Result<AccountKeeper, FatalError> {
        self.accounts.ok_or_else(|| missing(ModuleId::Accounts))
    }

    pub fn guardian(&self) -> Result<GuardianKeeper, FatalError> {
        self.guardian.ok_or_else(|| missing(ModuleId::Guardian))
    }

    pub fn params(&self) -> Result<&ParamsKeeper, FatalError> {
        self.params.as_ref().ok_or_else(|| missing(ModuleId::Params))
    }

    pub fn bank(&self) -> Result<BankKeeper, FatalError> {
        self.bank.ok_or_else(|| missing(ModuleId::Bank))
    }

    pub fn fees(&self) -> Result<FeeKeeper, FatalError> {
        self.fees.ok_or_else(|| missing(ModuleId::Fees))
    }

    pub fn staking(&self) -> Result<&StakingKeeper, FatalError> {
        self.staking.as_ref().ok_or_else(|| missing(ModuleId::Staking))
    }

    pub fn mint(&self) -> Result<MintKeeper, FatalError> {
        self.mint.ok_or_else(|| missing(ModuleId::Mint))
    }

    pub fn distribution(&self) -> Result<DistributionKeeper, FatalError> {
        self.distribution.ok_or_else(|| missing(ModuleId::Distribution))
    }

    pub fn slashing(&self) -> Result<SlashingKeeper, FatalError> {
        self.slashing.ok_or_else(|| missing(ModuleId::Slashing))
    }

    pub fn gov(&self) -> Result<&GovKeeper, FatalError> {
        self.gov.as_ref().ok_or_else(|| missing(ModuleId::Gov))
    }

    pub fn service(&self) -> Result<ServiceKeeper, FatalError> {
        self.service.ok_or_else(|| missing(ModuleId::Service))
    }

    pub fn upgrade(&self) -> Result<UpgradeKeeper, FatalError> {
        self.upgrade.ok_or_else(|| missing(ModuleId::Upgrade))
    }

    /// Record is optional per protocol version, so absence is not an error.
    pub fn record(&self) -> Option<RecordKeeper> {
        self.record
    }
}

fn register_params(registry: ParamsKeeper, module: ModuleId) -> ParamsKeeper {
    match module {
        ModuleId::Fees => registry.register::<AuthParams>(),
        ModuleId::Staking => registry.register::<StakingParams>(),
        ModuleId::Mint => registry.register::<MintParams>(),
        ModuleId::Distribution => registry.register::<DistrParams>(),
        ModuleId::Slashing => registry.register::<SlashingParams>(),
        ModuleId::Gov => registry.register::<GovParams>(),
        ModuleId::Service => registry.register::<ServiceParams>(),
        ModuleId::Upgrade => registry.register::<UpgradeParams>(),
        _ => registry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full() -> Vec<ModuleId> {
        ModuleId::ORDER.to_vec()
    }

    #[test]
    fn test_order_respects_dependencies() {
        for (i, module) in ModuleId::ORDER.iter().enumerate() {
            for dep in module.dependencies() {
                let pos = ModuleId::ORDER.iter().position(|m| m == dep).unwrap();
                assert!(pos < i, "{module} is built before its dependency {dep}");
            }
        }
    }

    #[test]
    fn test_full_set_wires_distribution_before_slashing() {
        let keepers = KeeperSet::load(&full(), ProtocolKeeper::new(catalog::PROTOCOL)).unwrap();
        assert_eq!(keepers.hook_members(), &["distribution", "slashing"]);
        assert!(keepers.staking().is_ok());
        assert!(keepers.record().is_some());
        assert!(keepers.params().unwrap().is_registered("gov"));
        assert!(keepers.store_keys().contains(&catalog::RECORD));
    }

    #[test]
    fn test_missing_dependency_fails_before_construction() {
        let modules: Vec<ModuleId> = full().into_iter().filter(|m| *m != ModuleId::Staking).collect();
        let err = KeeperSet::load(&modules, ProtocolKeeper::new(catalog::PROTOCOL))
            .err()
            .unwrap();
        assert_eq!(
            err,
            FatalError::MissingKeeperDependency {
                module: "mint".into(),
                dependency: "staking".into(),
            }
        );
    }

    #[test]
    fn test_absent_keeper_is_reported() {
        let keepers = KeeperSet::load(
            &[ModuleId::Accounts, ModuleId::Bank],
            ProtocolKeeper::new(catalog::PROTOCOL),
        )
        .unwrap();
        assert_eq!(keepers.gov().err(), Some(FatalError::MissingKeeper("gov".into())));
        assert!(keepers.hook_members().is_empty());
        assert!(!keepers.store_keys().contains(&catalog::STAKE));
    }
}

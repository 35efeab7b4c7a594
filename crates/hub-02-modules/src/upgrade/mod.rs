//! # Upgrade
//!
//! Software-upgrade signalling. A passed software-upgrade proposal schedules
//! an [`UpgradeConfig`]; bonded validators answer with [`MsgUpgradeSignal`];
//! at the switch height the end blocker tallies the signalled power and,
//! when it meets the threshold, moves the current protocol version forward.
//! The engine then activates that version for the next block.

pub mod keeper;
pub mod protocol;
pub mod types;

pub use keeper::UpgradeKeeper;
pub use protocol::ProtocolKeeper;
pub use types::*;

use crate::params::ParamSet;
use crate::types::{to_json_bytes, Handler, HandlerResult, Msg, Querier};
use hub_01_store::Context;
use serde::{Deserialize, Serialize};
use shared_types::tags::keys;
use shared_types::{FatalError, HubResult, ProtocolDefinition, Tags, TxError};

pub const ROUTE: &str = "upgrade";
pub const CODESPACE: &str = "upgrade";

pub struct UpgradeHandler {
    keeper: UpgradeKeeper,
}

impl UpgradeHandler {
    pub fn new(keeper: UpgradeKeeper) -> Self {
        Self { keeper }
    }
}

impl Handler for UpgradeHandler {
    fn handle(&self, ctx: &mut Context<'_>, msg: &Msg) -> HubResult<HandlerResult> {
        match msg {
            Msg::UpgradeSignal(m) => {
                self.keeper.signal(ctx, &m.validator, m.version)?;
                Ok(HandlerResult::with_tags(
                    Tags::new()
                        .with(keys::ACTION, msg.msg_type())
                        .with(keys::VALIDATOR, m.validator)
                        .with(keys::UPGRADE_VERSION, m.version),
                ))
            }
            other => Err(TxError::UnknownRequest(format!(
                "unrecognized upgrade message {}",
                other.msg_type()
            ))
            .into()),
        }
    }
}

pub struct UpgradeQuerier {
    keeper: UpgradeKeeper,
}

impl UpgradeQuerier {
    pub fn new(keeper: UpgradeKeeper) -> Self {
        Self { keeper }
    }
}

impl Querier for UpgradeQuerier {
    fn query(&self, ctx: &Context<'_>, path: &[&str], _data: &[u8]) -> HubResult<Vec<u8>> {
        match path.first().copied() {
            Some("info") => to_json_bytes(&self.keeper.info(ctx)?),
            Some("versions") => to_json_bytes(&self.keeper.versions(ctx)?),
            Some("params") => to_json_bytes(&self.keeper.params(ctx)?),
            _ => Err(TxError::UnknownRequest(format!("unknown upgrade query {}", path.join("/"))).into()),
        }
    }
}

// =============================================================================
// GENESIS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeGenesis {
    /// The protocol the chain starts under.
    pub genesis_version: AppVersion,
    pub params: UpgradeParams,
}

impl Default for UpgradeGenesis {
    fn default() -> Self {
        Self {
            genesis_version: AppVersion::new(
                UpgradeConfig {
                    proposal_id: 0,
                    definition: ProtocolDefinition::new(0, "hubd/v0", 0),
                },
                true,
            ),
            params: UpgradeParams::default(),
        }
    }
}

impl UpgradeGenesis {
    pub fn validate(&self) -> Result<(), String> {
        if !self.genesis_version.success {
            return Err("genesis version must be a successful version".into());
        }
        self.params.validate()
    }
}

pub fn init_genesis(ctx: &mut Context<'_>, keeper: &UpgradeKeeper, data: &UpgradeGenesis) -> HubResult<()> {
    let protocol = keeper.protocol();
    keeper.add_version(ctx, &data.genesis_version)?;
    protocol.clear_upgrade_config(ctx)?;
    protocol.set_current_version(ctx, data.genesis_version.version())?;
    keeper.set_params(ctx, &data.params)
}

/// The current version becomes the genesis version of the snapshot. A
/// scheduled upgrade and its signals are not carried over.
pub fn export_genesis(ctx: &Context<'_>, keeper: &UpgradeKeeper) -> HubResult<UpgradeGenesis> {
    let current = keeper.protocol().current_version(ctx)?;
    let genesis_version = keeper
        .version(ctx, current)?
        .ok_or_else(|| FatalError::StoreCorruption(format!("no history entry for current version {current}")))?;
    Ok(UpgradeGenesis {
        genesis_version,
        params: keeper.params(ctx)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AccountKeeper;
    use crate::bank::BankKeeper;
    use crate::params::ParamsKeeper;
    use crate::staking::{StakingCore, UnwiredStaking};
    use crate::testutil::{ctx_at, fresh_view};
    use hub_01_store::catalog;
    use shared_types::{Address, HubError};

    fn keepers() -> (UpgradeKeeper, StakingCore) {
        let params = ParamsKeeper::new(catalog::PARAMS);
        let bank = BankKeeper::new(AccountKeeper::new(catalog::ACCOUNT));
        let staking = UnwiredStaking::new(catalog::STAKE, bank, params.subspace("stake")).core();
        let keeper = UpgradeKeeper::new(
            catalog::UPGRADE,
            params.subspace("upgrade"),
            ProtocolKeeper::new(catalog::PROTOCOL),
            staking,
        );
        (keeper, staking)
    }

    fn schedule(ctx: &mut Context<'_>, keeper: &UpgradeKeeper, version: u64, height: u64) {
        keeper
            .protocol()
            .set_upgrade_config(
                ctx,
                &UpgradeConfig {
                    proposal_id: 1,
                    definition: ProtocolDefinition::new(version, "hubd/v1", height),
                },
            )
            .unwrap();
    }

    #[test]
    fn test_switch_when_threshold_met_at_height() {
        let mut view = fresh_view();
        let (keeper, staking) = keepers();
        let a = Address([1; 20]);
        let b = Address([2; 20]);
        let mut ctx = ctx_at(&mut view, 5);
        init_genesis(&mut ctx, &keeper, &UpgradeGenesis::default()).unwrap();
        staking.set_last_power(&mut ctx, &a, 10).unwrap();
        staking.set_last_power(&mut ctx, &b, 10).unwrap();
        staking.set_last_total_power(&mut ctx, 20).unwrap();
        schedule(&mut ctx, &keeper, 1, 10);

        let handler = UpgradeHandler::new(keeper);
        for op in [a, b] {
            handler
                .handle(&mut ctx, &Msg::UpgradeSignal(MsgUpgradeSignal { validator: op, version: 1 }))
                .unwrap();
        }
        assert!(handler
            .handle(&mut ctx, &Msg::UpgradeSignal(MsgUpgradeSignal { validator: a, version: 1 }))
            .is_err());
        let (outcome, _) = keeper.end_blocker(&mut ctx).unwrap();
        assert_eq!(outcome, UpgradeOutcome::Pending);

        let mut ctx = ctx_at(&mut view, 10);
        let (outcome, tags) = keeper.end_blocker(&mut ctx).unwrap();
        assert!(matches!(outcome, UpgradeOutcome::Switched(ref d) if d.version == 1));
        assert_eq!(tags.get(keys::UPGRADE_RESULT), Some("success"));
        assert_eq!(keeper.protocol().current_version(&ctx).unwrap(), 1);
        assert!(keeper.protocol().upgrade_config(&ctx).unwrap().is_none());
        assert_eq!(keeper.versions(&ctx).unwrap().len(), 2);
        assert_eq!(export_genesis(&ctx, &keeper).unwrap().genesis_version.version(), 1);
    }

    #[test]
    fn test_insufficient_signals_record_failure() {
        let mut view = fresh_view();
        let (keeper, staking) = keepers();
        let a = Address([1; 20]);
        let mut ctx = ctx_at(&mut view, 10);
        init_genesis(&mut ctx, &keeper, &UpgradeGenesis::default()).unwrap();
        staking.set_last_power(&mut ctx, &a, 10).unwrap();
        staking.set_last_power(&mut ctx, &Address([2; 20]), 10).unwrap();
        staking.set_last_total_power(&mut ctx, 20).unwrap();
        schedule(&mut ctx, &keeper, 1, 10);
        keeper.signal(&mut ctx, &a, 1).unwrap();

        let (outcome, _) = keeper.end_blocker(&mut ctx).unwrap();
        assert!(matches!(outcome, UpgradeOutcome::Failed(_)));
        let info = keeper.info(&ctx).unwrap();
        assert_eq!(info.current_version, 0);
        assert_eq!(info.last_failed_version, Some(1));
    }

    #[test]
    fn test_signal_needs_schedule_and_bonded_power() {
        let mut view = fresh_view();
        let (keeper, _) = keepers();
        let a = Address([1; 20]);
        let mut ctx = ctx_at(&mut view, 3);
        let err = keeper.signal(&mut ctx, &a, 1).unwrap_err();
        assert!(matches!(err, HubError::Tx(TxError::Module { code: CODE_NO_UPGRADE_IN_PROGRESS, .. })));
        schedule(&mut ctx, &keeper, 1, 10);
        let err = keeper.signal(&mut ctx, &a, 1).unwrap_err();
        assert!(matches!(err, HubError::Tx(TxError::Module { code: CODE_NOT_BONDED, .. })));
        let err = keeper.signal(&mut ctx, &a, 2).unwrap_err();
        assert!(matches!(err, HubError::Tx(TxError::Module { code: CODE_WRONG_VERSION, .. })));
    }
}

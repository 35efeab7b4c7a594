use super::protocol::ProtocolKeeper;
use super::types::*;
use crate::params::Subspace;
use crate::staking::StakingCore;
use crate::types::prefixed_key;
use hub_01_store::{Context, StoreKey};
use shared_types::tags::keys;
use shared_types::{Address, Dec, HubResult, Tags};
use tracing::{info, warn};

const VERSION_PREFIX: &[u8] = &[0x01];

/// Version history plus the signal tally. Protocol state itself lives in
/// the [`ProtocolKeeper`] shared with the engine.
#[derive(Debug, Clone, Copy)]
pub struct UpgradeKeeper {
    key: StoreKey,
    params: Subspace,
    protocol: ProtocolKeeper,
    staking: StakingCore,
}

impl UpgradeKeeper {
    pub fn new(key: StoreKey, params: Subspace, protocol: ProtocolKeeper, staking: StakingCore) -> Self {
        Self {
            key,
            params,
            protocol,
            staking,
        }
    }

    pub fn protocol(&self) -> ProtocolKeeper {
        self.protocol
    }

    pub fn params(&self, ctx: &Context<'_>) -> HubResult<UpgradeParams> {
        self.params.get(ctx)
    }

    pub fn set_params(&self, ctx: &mut Context<'_>, params: &UpgradeParams) -> HubResult<()> {
        self.params.set(ctx, params)
    }

    pub fn add_version(&self, ctx: &mut Context<'_>, version: &AppVersion) -> HubResult<()> {
        ctx.set_obj(
            self.key,
            prefixed_key(VERSION_PREFIX, &[&version.version().to_be_bytes()]),
            version,
        )?;
        Ok(())
    }

    pub fn version(&self, ctx: &Context<'_>, version: u64) -> HubResult<Option<AppVersion>> {
        Ok(ctx.get_obj(self.key, &prefixed_key(VERSION_PREFIX, &[&version.to_be_bytes()]))?)
    }

    /// Version history in ascending version order.
    pub fn versions(&self, ctx: &Context<'_>) -> HubResult<Vec<AppVersion>> {
        Ok(ctx
            .iter_prefix_obj(self.key, VERSION_PREFIX)?
            .into_iter()
            .map(|(_, v)| v)
            .collect())
    }

    pub fn info(&self, ctx: &Context<'_>) -> HubResult<UpgradeInfo> {
        Ok(UpgradeInfo {
            current_version: self.protocol.current_version(ctx)?,
            last_failed_version: self.protocol.last_failed_version(ctx)?,
            upgrade_in_progress: self.protocol.upgrade_config(ctx)?,
        })
    }

    /// Records `operator`'s readiness for the scheduled version.
    pub fn signal(&self, ctx: &mut Context<'_>, operator: &Address, version: u64) -> HubResult<()> {
        let config = self
            .protocol
            .upgrade_config(ctx)?
            .ok_or_else(|| err(CODE_NO_UPGRADE_IN_PROGRESS, "no upgrade is scheduled"))?;
        if config.definition.version != version {
            return Err(err(
                CODE_WRONG_VERSION,
                format!("scheduled version is {}, not {version}", config.definition.version),
            )
            .into());
        }
        if self.staking.get_last_power(ctx, operator)?.is_none() {
            return Err(err(CODE_NOT_BONDED, format!("{operator} is not a bonded validator")).into());
        }
        if self.protocol.has_signal(ctx, version, operator)? {
            return Err(err(CODE_DUPLICATE_SIGNAL, format!("{operator} already signalled for {version}")).into());
        }
        self.protocol.set_signal(ctx, version, operator)
    }

    /// Share of the last bonded power that signalled for `version`.
    pub fn signalled_share(&self, ctx: &Context<'_>, version: u64) -> HubResult<Dec> {
        let total = self.staking.last_total_power(ctx)?;
        let mut signalled = 0u128;
        for operator in self.protocol.signals(ctx, version)? {
            signalled += u128::from(self.staking.get_last_power(ctx, &operator)?.unwrap_or(0));
        }
        Ok(Dec::from_ratio(signalled, u128::from(total)))
    }

    /// Tallies the scheduled upgrade once its switch height is reached.
    pub fn end_blocker(&self, ctx: &mut Context<'_>) -> HubResult<(UpgradeOutcome, Tags)> {
        let Some(config) = self.protocol.upgrade_config(ctx)? else {
            return Ok((UpgradeOutcome::Pending, Tags::new()));
        };
        if ctx.block_height() < config.definition.height {
            return Ok((UpgradeOutcome::Pending, Tags::new()));
        }

        let version = config.definition.version;
        let share = self.signalled_share(ctx, version)?;
        let threshold = self.params(ctx)?.threshold;
        let success = share >= threshold;
        self.protocol.clear_signals(ctx, version)?;
        self.protocol.clear_upgrade_config(ctx)?;
        self.add_version(ctx, &AppVersion::new(config.clone(), success))?;

        let tags = Tags::new()
            .with(keys::UPGRADE_VERSION, version)
            .with(keys::UPGRADE_RESULT, if success { "success" } else { "failure" });
        if success {
            info!("[upgrade] version {version} reached {share} of bonded power, switching");
            self.protocol.set_current_version(ctx, version)?;
            Ok((UpgradeOutcome::Switched(config.definition), tags))
        } else {
            warn!("[upgrade] version {version} only reached {share} of bonded power (needs {threshold})");
            self.protocol.set_last_failed_version(ctx, version)?;
            Ok((UpgradeOutcome::Failed(config.definition), tags))
        }
    }
}

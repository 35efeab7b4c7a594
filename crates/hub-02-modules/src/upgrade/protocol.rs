//! # Protocol Keeper
//!
//! Owns the `protocol` store: the version that currently governs, the last
//! version that failed to gather enough signals, the upgrade scheduled by
//! governance and the validators that signalled for it.
//!
//! The engine reads this store across protocol versions, so its layout must
//! never change between versions.

use super::types::UpgradeConfig;
use crate::types::prefixed_key;
use hub_01_store::{Context, StoreKey};
use shared_types::{Address, FatalError, HubResult};

const CURRENT_VERSION_KEY: &[u8] = &[0x00];
const LAST_FAILED_VERSION_KEY: &[u8] = &[0x01];
const UPGRADE_CONFIG_KEY: &[u8] = &[0x02];
const SIGNAL_PREFIX: &[u8] = &[0x03];

#[derive(Debug, Clone, Copy)]
pub struct ProtocolKeeper {
    key: StoreKey,
}

impl ProtocolKeeper {
    pub fn new(key: StoreKey) -> Self {
        Self { key }
    }

    pub fn store_key(&self) -> StoreKey {
        self.key
    }

    pub fn current_version(&self, ctx: &Context<'_>) -> HubResult<u64> {
        Ok(ctx.get_obj(self.key, CURRENT_VERSION_KEY)?.unwrap_or(0))
    }

    pub fn set_current_version(&self, ctx: &mut Context<'_>, version: u64) -> HubResult<()> {
        ctx.set_obj(self.key, CURRENT_VERSION_KEY.to_vec(), &version)?;
        Ok(())
    }

    pub fn last_failed_version(&self, ctx: &Context<'_>) -> HubResult<Option<u64>> {
        Ok(ctx.get_obj(self.key, LAST_FAILED_VERSION_KEY)?)
    }

    pub fn set_last_failed_version(&self, ctx: &mut Context<'_>, version: u64) -> HubResult<()> {
        ctx.set_obj(self.key, LAST_FAILED_VERSION_KEY.to_vec(), &version)?;
        Ok(())
    }

    pub fn upgrade_config(&self, ctx: &Context<'_>) -> HubResult<Option<UpgradeConfig>> {
        Ok(ctx.get_obj(self.key, UPGRADE_CONFIG_KEY)?)
    }

    pub fn set_upgrade_config(&self, ctx: &mut Context<'_>, config: &UpgradeConfig) -> HubResult<()> {
        ctx.set_obj(self.key, UPGRADE_CONFIG_KEY.to_vec(), config)?;
        Ok(())
    }

    pub fn clear_upgrade_config(&self, ctx: &mut Context<'_>) -> HubResult<()> {
        ctx.delete(self.key, UPGRADE_CONFIG_KEY)?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Signals, keyed by version then operator address
    // -------------------------------------------------------------------------

    fn signal_key(version: u64, operator: &Address) -> Vec<u8> {
        prefixed_key(SIGNAL_PREFIX, &[&version.to_be_bytes(), operator.as_bytes()])
    }

    pub fn has_signal(&self, ctx: &Context<'_>, version: u64, operator: &Address) -> HubResult<bool> {
        Ok(ctx.has(self.key, &Self::signal_key(version, operator))?)
    }

    pub fn set_signal(&self, ctx: &mut Context<'_>, version: u64, operator: &Address) -> HubResult<()> {
        ctx.set(self.key, Self::signal_key(version, operator), vec![1])?;
        Ok(())
    }

    pub fn signals(&self, ctx: &Context<'_>, version: u64) -> HubResult<Vec<Address>> {
        let prefix = prefixed_key(SIGNAL_PREFIX, &[&version.to_be_bytes()]);
        ctx.iter_prefix(self.key, &prefix)?
            .into_iter()
            .map(|(k, _)| -> HubResult<Address> {
                k.get(prefix.len()..)
                    .and_then(Address::from_slice)
                    .ok_or_else(|| FatalError::StoreCorruption("upgrade signal key".into()).into())
            })
            .collect()
    }

    pub fn clear_signals(&self, ctx: &mut Context<'_>, version: u64) -> HubResult<()> {
        let prefix = prefixed_key(SIGNAL_PREFIX, &[&version.to_be_bytes()]);
        for (k, _) in ctx.iter_prefix(self.key, &prefix)? {
            ctx.delete(self.key, &k)?;
        }
        Ok(())
    }
}

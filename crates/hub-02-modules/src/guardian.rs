//! # Guardian
//!
//! Privileged accounts. Profilers may submit software-upgrade proposals and
//! manage the profiler and trustee lists; trustees are recorded for
//! off-chain tooling. Accounts installed at genesis cannot be removed.

use crate::types::msg::require_address;
use crate::types::{
    from_json_bytes, prefixed_key, to_json_bytes, Handler, HandlerResult, Msg, MsgBasic, Querier,
};
use hub_01_store::{Context, StoreKey};
use serde::{Deserialize, Serialize};
use shared_types::tags::keys;
use shared_types::{Address, HubResult, Tags, TxError};

pub const ROUTE: &str = "guardian";
pub const CODESPACE: &str = "guardian";

const PROFILER_PREFIX: &[u8] = &[0x00];
const TRUSTEE_PREFIX: &[u8] = &[0x01];

const CODE_UNKNOWN_PROFILER: u32 = 100;
const CODE_PROFILER_EXISTS: u32 = 101;
const CODE_TRUSTEE_EXISTS: u32 = 102;
const CODE_UNKNOWN_TRUSTEE: u32 = 103;
const CODE_GENESIS_ACCOUNT: u32 = 104;
const CODE_INVALID_NAME: u32 = 105;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Genesis,
    #[default]
    Ordinary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profiler {
    pub name: String,
    pub addr: Address,
    pub added_by: Address,
    #[serde(default)]
    pub account_type: AccountType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trustee {
    pub addr: Address,
    pub added_by: Address,
    #[serde(default)]
    pub account_type: AccountType,
}

// =============================================================================
// MESSAGES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgAddProfiler {
    pub name: String,
    pub addr: Address,
    pub added_by: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgDeleteProfiler {
    pub addr: Address,
    pub deleted_by: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgAddTrustee {
    pub addr: Address,
    pub added_by: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgDeleteTrustee {
    pub addr: Address,
    pub deleted_by: Address,
}

impl MsgBasic for MsgAddProfiler {
    fn route(&self) -> &'static str {
        ROUTE
    }

    fn msg_type(&self) -> &'static str {
        "add-profiler"
    }

    fn signers(&self) -> Vec<Address> {
        vec![self.added_by]
    }

    fn validate_basic(&self) -> Result<(), TxError> {
        require_address(&self.addr, "profiler")?;
        require_address(&self.added_by, "added_by")?;
        if self.name.trim().is_empty() || self.name.len() > 70 {
            return Err(TxError::module(CODESPACE, CODE_INVALID_NAME, "profiler name must be 1-70 bytes"));
        }
        Ok(())
    }
}

impl MsgBasic for MsgDeleteProfiler {
    fn route(&self) -> &'static str {
        ROUTE
    }

    fn msg_type(&self) -> &'static str {
        "delete-profiler"
    }

    fn signers(&self) -> Vec<Address> {
        vec![self.deleted_by]
    }

    fn validate_basic(&self) -> Result<(), TxError> {
        require_address(&self.addr, "profiler")?;
        require_address(&self.deleted_by, "deleted_by")
    }
}

impl MsgBasic for MsgAddTrustee {
    fn route(&self) -> &'static str {
        ROUTE
    }

    fn msg_type(&self) -> &'static str {
        "add-trustee"
    }

    fn signers(&self) -> Vec<Address> {
        vec![self.added_by]
    }

    fn validate_basic(&self) -> Result<(), TxError> {
        require_address(&self.addr, "trustee")?;
        require_address(&self.added_by, "added_by")
    }
}

impl MsgBasic for MsgDeleteTrustee {
    fn route(&self) -> &'static str {
        ROUTE
    }

    fn msg_type(&self) -> &'static str {
        "delete-trustee"
    }

    fn signers(&self) -> Vec<Address> {
        vec![self.deleted_by]
    }

    fn validate_basic(&self) -> Result<(), TxError> {
        require_address(&self.addr, "trustee")?;
        require_address(&self.deleted_by, "deleted_by")
    }
}

// =============================================================================
// KEEPER
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct GuardianKeeper {
    key: StoreKey,
}

impl GuardianKeeper {
    pub fn new(key: StoreKey) -> Self {
        Self { key }
    }

    pub fn get_profiler(&self, ctx: &Context<'_>, addr: &Address) -> HubResult<Option<Profiler>> {
        Ok(ctx.get_obj(self.key, &prefixed_key(PROFILER_PREFIX, &[addr.as_bytes()]))?)
    }

    pub fn is_profiler(&self, ctx: &Context<'_>, addr: &Address) -> HubResult<bool> {
        Ok(self.get_profiler(ctx, addr)?.is_some())
    }

    pub fn set_profiler(&self, ctx: &mut Context<'_>, profiler: &Profiler) -> HubResult<()> {
        ctx.set_obj(
            self.key,
            prefixed_key(PROFILER_PREFIX, &[profiler.addr.as_bytes()]),
            profiler,
        )?;
        Ok(())
    }

    pub fn delete_profiler(&self, ctx: &mut Context<'_>, addr: &Address) -> HubResult<()> {
        ctx.delete(self.key, &prefixed_key(PROFILER_PREFIX, &[addr.as_bytes()]))?;
        Ok(())
    }

    pub fn profilers(&self, ctx: &Context<'_>) -> HubResult<Vec<Profiler>> {
        Ok(ctx
            .iter_prefix_obj(self.key, PROFILER_PREFIX)?
            .into_iter()
            .map(|(_, p)| p)
            .collect())
    }

    pub fn get_trustee(&self, ctx: &Context<'_>, addr: &Address) -> HubResult<Option<Trustee>> {
        Ok(ctx.get_obj(self.key, &prefixed_key(TRUSTEE_PREFIX, &[addr.as_bytes()]))?)
    }

    pub fn set_trustee(&self, ctx: &mut Context<'_>, trustee: &Trustee) -> HubResult<()> {
        ctx.set_obj(
            self.key,
            prefixed_key(TRUSTEE_PREFIX, &[trustee.addr.as_bytes()]),
            trustee,
        )?;
        Ok(())
    }

    pub fn delete_trustee(&self, ctx: &mut Context<'_>, addr: &Address) -> HubResult<()> {
        ctx.delete(self.key, &prefixed_key(TRUSTEE_PREFIX, &[addr.as_bytes()]))?;
        Ok(())
    }

    pub fn trustees(&self, ctx: &Context<'_>) -> HubResult<Vec<Trustee>> {
        Ok(ctx
            .iter_prefix_obj(self.key, TRUSTEE_PREFIX)?
            .into_iter()
            .map(|(_, t)| t)
            .collect())
    }

    fn require_profiler(&self, ctx: &Context<'_>, addr: &Address) -> HubResult<()> {
        if self.is_profiler(ctx, addr)? {
            Ok(())
        } else {
            Err(TxError::module(CODESPACE, CODE_UNKNOWN_PROFILER, format!("{addr} is not a profiler")).into())
        }
    }
}

// =============================================================================
// HANDLER / QUERIER
// =============================================================================

pub struct GuardianHandler {
    keeper: GuardianKeeper,
}

impl GuardianHandler {
    pub fn new(keeper: GuardianKeeper) -> Self {
        Self { keeper }
    }
}

impl Handler for GuardianHandler {
    fn handle(&self, ctx: &mut Context<'_>, msg: &Msg) -> HubResult<HandlerResult> {
        let k = &self.keeper;
        match msg {
            Msg::AddProfiler(m) => {
                k.require_profiler(ctx, &m.added_by)?;
                if k.is_profiler(ctx, &m.addr)? {
                    return Err(TxError::module(CODESPACE, CODE_PROFILER_EXISTS, format!("{} is already a profiler", m.addr)).into());
                }
                k.set_profiler(
                    ctx,
                    &Profiler {
                        name: m.name.clone(),
                        addr: m.addr,
                        added_by: m.added_by,
                        account_type: AccountType::Ordinary,
                    },
                )?;
            }
            Msg::DeleteProfiler(m) => {
                k.require_profiler(ctx, &m.deleted_by)?;
                let Some(existing) = k.get_profiler(ctx, &m.addr)? else {
                    return Err(TxError::module(CODESPACE, CODE_UNKNOWN_PROFILER, format!("{} is not a profiler", m.addr)).into());
                };
                if existing.account_type == AccountType::Genesis {
                    return Err(TxError::module(CODESPACE, CODE_GENESIS_ACCOUNT, "genesis profilers cannot be deleted").into());
                }
                k.delete_profiler(ctx, &m.addr)?;
            }
            Msg::AddTrustee(m) => {
                k.require_profiler(ctx, &m.added_by)?;
                if k.get_trustee(ctx, &m.addr)?.is_some() {
                    return Err(TxError::module(CODESPACE, CODE_TRUSTEE_EXISTS, format!("{} is already a trustee", m.addr)).into());
                }
                k.set_trustee(
                    ctx,
                    &Trustee {
                        addr: m.addr,
                        added_by: m.added_by,
                        account_type: AccountType::Ordinary,
                    },
                )?;
            }
            Msg::DeleteTrustee(m) => {
                k.require_profiler(ctx, &m.deleted_by)?;
                let Some(existing) = k.get_trustee(ctx, &m.addr)? else {
                    return Err(TxError::module(CODESPACE, CODE_UNKNOWN_TRUSTEE, format!("{} is not a trustee", m.addr)).into());
                };
                if existing.account_type == AccountType::Genesis {
                    return Err(TxError::module(CODESPACE, CODE_GENESIS_ACCOUNT, "genesis trustees cannot be deleted").into());
                }
                k.delete_trustee(ctx, &m.addr)?;
            }
            other => {
                return Err(TxError::UnknownRequest(format!(
                    "unrecognized guardian message {}",
                    other.msg_type()
                ))
                .into())
            }
        }
        Ok(HandlerResult::with_tags(Tags::new().with(keys::ACTION, msg.msg_type())))
    }
}

pub struct GuardianQuerier {
    keeper: GuardianKeeper,
}

impl GuardianQuerier {
    pub fn new(keeper: GuardianKeeper) -> Self {
        Self { keeper }
    }
}

impl Querier for GuardianQuerier {
    fn query(&self, ctx: &Context<'_>, path: &[&str], data: &[u8]) -> HubResult<Vec<u8>> {
        match path.first().copied() {
            Some("profilers") => to_json_bytes(&self.keeper.profilers(ctx)?),
            Some("trustees") => to_json_bytes(&self.keeper.trustees(ctx)?),
            Some("profiler") => {
                let addr: Address = from_json_bytes(data)?;
                to_json_bytes(&self.keeper.get_profiler(ctx, &addr)?)
            }
            _ => Err(TxError::UnknownRequest(format!("unknown guardian query {}", path.join("/"))).into()),
        }
    }
}

// =============================================================================
// GENESIS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GuardianGenesis {
    pub profilers: Vec<Profiler>,
    pub trustees: Vec<Trustee>,
}

pub fn init_genesis(ctx: &mut Context<'_>, keeper: &GuardianKeeper, data: &GuardianGenesis) -> HubResult<()> {
    for profiler in &data.profilers {
        keeper.set_profiler(ctx, profiler)?;
    }
    for trustee in &data.trustees {
        keeper.set_trustee(ctx, trustee)?;
    }
    Ok(())
}

pub fn export_genesis(ctx: &Context<'_>, keeper: &GuardianKeeper) -> HubResult<GuardianGenesis> {
    Ok(GuardianGenesis {
        profilers: keeper.profilers(ctx)?,
        trustees: keeper.trustees(ctx)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ctx_at, fresh_view};
    use hub_01_store::catalog;
    use shared_types::HubError;

    fn genesis_profiler(addr: Address) -> Profiler {
        Profiler {
            name: "root".into(),
            addr,
            added_by: addr,
            account_type: AccountType::Genesis,
        }
    }

    #[test]
    fn test_only_profilers_manage_lists() {
        let mut view = fresh_view();
        let mut ctx = ctx_at(&mut view, 1);
        let keeper = GuardianKeeper::new(catalog::GUARDIAN);
        let root = Address([1; 20]);
        init_genesis(
            &mut ctx,
            &keeper,
            &GuardianGenesis {
                profilers: vec![genesis_profiler(root)],
                trustees: vec![],
            },
        )
        .unwrap();

        let handler = GuardianHandler::new(keeper);
        let stranger = Address([7; 20]);
        let err = handler
            .handle(&mut ctx, &Msg::AddTrustee(MsgAddTrustee { addr: stranger, added_by: stranger }))
            .unwrap_err();
        assert!(matches!(err, HubError::Tx(TxError::Module { code: CODE_UNKNOWN_PROFILER, .. })));

        handler
            .handle(&mut ctx, &Msg::AddTrustee(MsgAddTrustee { addr: stranger, added_by: root }))
            .unwrap();
        assert_eq!(keeper.trustees(&ctx).unwrap().len(), 1);
    }

    #[test]
    fn test_genesis_profiler_cannot_be_deleted() {
        let mut view = fresh_view();
        let mut ctx = ctx_at(&mut view, 1);
        let keeper = GuardianKeeper::new(catalog::GUARDIAN);
        let root = Address([1; 20]);
        keeper.set_profiler(&mut ctx, &genesis_profiler(root)).unwrap();
        let handler = GuardianHandler::new(keeper);

        let other = Address([2; 20]);
        handler
            .handle(
                &mut ctx,
                &Msg::AddProfiler(MsgAddProfiler { name: "ops".into(), addr: other, added_by: root }),
            )
            .unwrap();
        assert!(handler
            .handle(&mut ctx, &Msg::DeleteProfiler(MsgDeleteProfiler { addr: root, deleted_by: other }))
            .is_err());
        handler
            .handle(&mut ctx, &Msg::DeleteProfiler(MsgDeleteProfiler { addr: other, deleted_by: root }))
            .unwrap();
        assert_eq!(export_genesis(&ctx, &keeper).unwrap().profilers.len(), 1);
    }
}

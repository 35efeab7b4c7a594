use crate::types::{from_json_bytes, prefixed_key, to_json_bytes, Querier};
use hub_01_store::{Context, StoreKey};
use serde::{Deserialize, Serialize};
use shared_types::{Address, Coins, HubResult, PubKey, TxError};

const ACCOUNT_PREFIX: &[u8] = &[0x01];
const GLOBAL_ACCOUNT_NUMBER_KEY: &[u8] = b"globalAccountNumber";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseAccount {
    pub address: Address,
    pub coins: Coins,
    pub pub_key: Option<PubKey>,
    pub account_number: u64,
    pub sequence: u64,
}

/// Owner of the `acc` store.
#[derive(Debug, Clone, Copy)]
pub struct AccountKeeper {
    key: StoreKey,
}

impl AccountKeeper {
    pub fn new(key: StoreKey) -> Self {
        Self { key }
    }

    fn account_key(addr: &Address) -> Vec<u8> {
        prefixed_key(ACCOUNT_PREFIX, &[addr.as_bytes()])
    }

    /// Returns the next account number and advances the counter.
    pub fn next_account_number(&self, ctx: &mut Context<'_>) -> HubResult<u64> {
        let current: u64 = ctx
            .get_obj(self.key, GLOBAL_ACCOUNT_NUMBER_KEY)?
            .unwrap_or(0);
        ctx.set_obj(self.key, GLOBAL_ACCOUNT_NUMBER_KEY.to_vec(), &(current + 1))?;
        Ok(current)
    }

    /// A fresh account with the next account number. Not stored yet.
    pub fn new_account(&self, ctx: &mut Context<'_>, address: Address) -> HubResult<BaseAccount> {
        Ok(BaseAccount {
            address,
            coins: Coins::empty(),
            pub_key: None,
            account_number: self.next_account_number(ctx)?,
            sequence: 0,
        })
    }

    pub fn get_account(&self, ctx: &Context<'_>, addr: &Address) -> HubResult<Option<BaseAccount>> {
        Ok(ctx.get_obj(self.key, &Self::account_key(addr))?)
    }

    pub fn set_account(&self, ctx: &mut Context<'_>, account: &BaseAccount) -> HubResult<()> {
        ctx.set_obj(self.key, Self::account_key(&account.address), account)?;
        Ok(())
    }

    /// All accounts in address order.
    pub fn accounts(&self, ctx: &Context<'_>) -> HubResult<Vec<BaseAccount>> {
        Ok(ctx
            .iter_prefix_obj::<BaseAccount>(self.key, ACCOUNT_PREFIX)?
            .into_iter()
            .map(|(_, acc)| acc)
            .collect())
    }
}

/// Serves `acc/account` with a JSON address payload.
pub struct AccountQuerier {
    keeper: AccountKeeper,
}

impl AccountQuerier {
    pub fn new(keeper: AccountKeeper) -> Self {
        Self { keeper }
    }
}

impl Querier for AccountQuerier {
    fn query(&self, ctx: &Context<'_>, path: &[&str], data: &[u8]) -> HubResult<Vec<u8>> {
        match path.first().copied() {
            Some("account") => {
                let addr: Address = from_json_bytes(data)?;
                to_json_bytes(&self.keeper.get_account(ctx, &addr)?)
            }
            _ => Err(TxError::UnknownRequest(format!("unknown account query {}", path.join("/"))).into()),
        }
    }
}

//! # Bank
//!
//! Coin movements between accounts. Accounts are created on first receipt.

use crate::auth::AccountKeeper;
use crate::types::msg::require_address;
use crate::types::{Handler, HandlerResult, Msg, MsgBasic};
use hub_01_store::Context;
use serde::{Deserialize, Serialize};
use shared_types::tags::keys;
use shared_types::{Address, Coins, HubResult, Tags, TxError};

pub const ROUTE: &str = "bank";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSend {
    pub from: Address,
    pub to: Address,
    pub amount: Coins,
}

impl MsgBasic for MsgSend {
    fn route(&self) -> &'static str {
        ROUTE
    }

    fn msg_type(&self) -> &'static str {
        "send"
    }

    fn signers(&self) -> Vec<Address> {
        vec![self.from]
    }

    fn validate_basic(&self) -> Result<(), TxError> {
        require_address(&self.from, "sender")?;
        require_address(&self.to, "recipient")?;
        if self.amount.is_empty() {
            return Err(TxError::InvalidCoins("send amount is empty".into()));
        }
        self.amount.validate().map_err(TxError::InvalidCoins)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BankKeeper {
    accounts: AccountKeeper,
}

impl BankKeeper {
    pub fn new(accounts: AccountKeeper) -> Self {
        Self { accounts }
    }

    pub fn get_coins(&self, ctx: &Context<'_>, addr: &Address) -> HubResult<Coins> {
        Ok(self
            .accounts
            .get_account(ctx, addr)?
            .map(|acc| acc.coins)
            .unwrap_or_default())
    }

    pub fn has_coins(&self, ctx: &Context<'_>, addr: &Address, amount: &Coins) -> HubResult<bool> {
        Ok(self.get_coins(ctx, addr)?.is_all_gte(amount))
    }

    fn set_coins(&self, ctx: &mut Context<'_>, addr: &Address, coins: Coins) -> HubResult<()> {
        let mut account = match self.accounts.get_account(ctx, addr)? {
            Some(acc) => acc,
            None => self.accounts.new_account(ctx, *addr)?,
        };
        account.coins = coins;
        self.accounts.set_account(ctx, &account)
    }

    pub fn add_coins(&self, ctx: &mut Context<'_>, addr: &Address, amount: &Coins) -> HubResult<Coins> {
        if amount.is_empty() {
            return self.get_coins(ctx, addr);
        }
        let total = self.get_coins(ctx, addr)?.plus(amount);
        self.set_coins(ctx, addr, total.clone())?;
        Ok(total)
    }

    pub fn subtract_coins(
        &self,
        ctx: &mut Context<'_>,
        addr: &Address,
        amount: &Coins,
    ) -> HubResult<Coins> {
        if amount.is_empty() {
            return self.get_coins(ctx, addr);
        }
        let current = self.get_coins(ctx, addr)?;
        let rest = current.checked_minus(amount).ok_or_else(|| {
            TxError::InsufficientFunds(format!("{addr} holds {current}, needs {amount}"))
        })?;
        self.set_coins(ctx, addr, rest.clone())?;
        Ok(rest)
    }

    pub fn send_coins(
        &self,
        ctx: &mut Context<'_>,
        from: &Address,
        to: &Address,
        amount: &Coins,
    ) -> HubResult<Tags> {
        self.subtract_coins(ctx, from, amount)?;
        self.add_coins(ctx, to, amount)?;
        Ok(Tags::new()
            .with(keys::SENDER, from)
            .with(keys::RECIPIENT, to))
    }
}

pub struct BankHandler {
    keeper: BankKeeper,
}

impl BankHandler {
    pub fn new(keeper: BankKeeper) -> Self {
        Self { keeper }
    }
}

impl Handler for BankHandler {
    fn handle(&self, ctx: &mut Context<'_>, msg: &Msg) -> HubResult<HandlerResult> {
        match msg {
            Msg::Send(m) => {
                let tags = self.keeper.send_coins(ctx, &m.from, &m.to, &m.amount)?;
                Ok(HandlerResult::with_tags(
                    Tags::new().with(keys::ACTION, m.msg_type()).chain(tags),
                ))
            }
            other => Err(TxError::UnknownRequest(format!(
                "unrecognized bank message {}",
                other.msg_type()
            ))
            .into()),
        }
    }
}

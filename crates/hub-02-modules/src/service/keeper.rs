//! # Service Keeper
//!
//! ## Store layout (`service`)
//!
//! | Prefix | Key | Value |
//! |--------|-----|-------|
//! | `0x00` | chain id ++ `/` ++ name | [`SvcDef`] |
//! | `0x01` | def chain ++ `/` ++ def name ++ `/` ++ bind chain ++ `/` ++ provider | [`SvcBinding`] |
//! | `0x20` | request id (BE) | [`SvcRequest`] |
//! | `0x21` | expiration (BE) ++ request id | active queue entry |
//! | `0x22` | request id (BE) | [`SvcResponse`] |
//! | `0x30` | - | next request id |

use super::types::*;
use crate::bank::BankKeeper;
use crate::params::Subspace;
use crate::types::prefixed_key;
use hub_01_store::{Context, StoreKey};
use shared_types::tags::keys;
use shared_types::{Address, Coin, Coins, FatalError, Height, HubResult, Tags};
use tracing::{debug, info};

const DEF_PREFIX: &[u8] = &[0x00];
const BINDING_PREFIX: &[u8] = &[0x01];
const REQUEST_PREFIX: &[u8] = &[0x20];
const ACTIVE_QUEUE_PREFIX: &[u8] = &[0x21];
const RESPONSE_PREFIX: &[u8] = &[0x22];
const NEXT_REQUEST_ID_KEY: &[u8] = &[0x30];

/// Account holding binding deposits and escrowed service fees.
pub fn escrow_holder() -> Address {
    Address::for_module("service")
}

fn def_key(chain_id: &str, name: &str) -> Vec<u8> {
    prefixed_key(DEF_PREFIX, &[chain_id.as_bytes(), b"/", name.as_bytes()])
}

fn binding_key(def_chain_id: &str, def_name: &str, bind_chain_id: &str, provider: &Address) -> Vec<u8> {
    prefixed_key(
        BINDING_PREFIX,
        &[
            def_chain_id.as_bytes(),
            b"/",
            def_name.as_bytes(),
            b"/",
            bind_chain_id.as_bytes(),
            b"/",
            provider.as_bytes(),
        ],
    )
}

fn active_key(expiration: Height, id: u64) -> Vec<u8> {
    prefixed_key(ACTIVE_QUEUE_PREFIX, &[&expiration.to_be_bytes(), &id.to_be_bytes()])
}

#[derive(Debug, Clone, Copy)]
pub struct ServiceKeeper {
    key: StoreKey,
    params: Subspace,
    bank: BankKeeper,
}

impl ServiceKeeper {
    pub fn new(key: StoreKey, params: Subspace, bank: BankKeeper) -> Self {
        Self { key, params, bank }
    }

    pub fn params(&self, ctx: &Context<'_>) -> HubResult<ServiceParams> {
        self.params.get(ctx)
    }

    pub fn set_params(&self, ctx: &mut Context<'_>, params: &ServiceParams) -> HubResult<()> {
        self.params.set(ctx, params)
    }

    // -------------------------------------------------------------------------
    // Definitions and bindings
    // -------------------------------------------------------------------------

    pub fn definition(&self, ctx: &Context<'_>, chain_id: &str, name: &str) -> HubResult<Option<SvcDef>> {
        Ok(ctx.get_obj(self.key, &def_key(chain_id, name))?)
    }

    pub fn set_definition(&self, ctx: &mut Context<'_>, def: &SvcDef) -> HubResult<()> {
        ctx.set_obj(self.key, def_key(&def.chain_id, &def.name), def)?;
        Ok(())
    }

    pub fn definitions(&self, ctx: &Context<'_>) -> HubResult<Vec<SvcDef>> {
        Ok(ctx
            .iter_prefix_obj(self.key, DEF_PREFIX)?
            .into_iter()
            .map(|(_, d)| d)
            .collect())
    }

    pub fn define(&self, ctx: &mut Context<'_>, msg: &MsgSvcDefine) -> HubResult<()> {
        if self.definition(ctx, &msg.chain_id, &msg.name)?.is_some() {
            return Err(err(
                CODE_DEFINITION_EXISTS,
                format!("service {} already defined on {}", msg.name, msg.chain_id),
            )
            .into());
        }
        self.set_definition(
            ctx,
            &SvcDef {
                name: msg.name.clone(),
                chain_id: msg.chain_id.clone(),
                description: msg.description.clone(),
                tags: msg.tags.clone(),
                author: msg.author,
                idl_content: msg.idl_content.clone(),
            },
        )
    }

    pub fn binding(
        &self,
        ctx: &Context<'_>,
        def_chain_id: &str,
        def_name: &str,
        bind_chain_id: &str,
        provider: &Address,
    ) -> HubResult<Option<SvcBinding>> {
        Ok(ctx.get_obj(self.key, &binding_key(def_chain_id, def_name, bind_chain_id, provider))?)
    }

    pub fn set_binding(&self, ctx: &mut Context<'_>, binding: &SvcBinding) -> HubResult<()> {
        ctx.set_obj(
            self.key,
            binding_key(
                &binding.def_chain_id,
                &binding.def_name,
                &binding.bind_chain_id,
                &binding.provider,
            ),
            binding,
        )?;
        Ok(())
    }

    pub fn bindings(&self, ctx: &Context<'_>) -> HubResult<Vec<SvcBinding>> {
        Ok(ctx
            .iter_prefix_obj(self.key, BINDING_PREFIX)?
            .into_iter()
            .map(|(_, b)| b)
            .collect())
    }

    pub fn bind(&self, ctx: &mut Context<'_>, msg: &MsgSvcBind) -> HubResult<()> {
        if self.definition(ctx, &msg.def_chain_id, &msg.def_name)?.is_none() {
            return Err(err(CODE_UNKNOWN_DEFINITION, format!("service {} is not defined", msg.def_name)).into());
        }
        if self
            .binding(ctx, &msg.def_chain_id, &msg.def_name, &msg.bind_chain_id, &msg.provider)?
            .is_some()
        {
            return Err(err(CODE_BINDING_EXISTS, format!("{} already binds {}", msg.provider, msg.def_name)).into());
        }
        let multiple = u128::from(self.params(ctx)?.min_deposit_multiple);
        let min_deposit = Coins::new(
            msg.prices
                .iter()
                .map(|c| Coin::new(c.denom.clone(), c.amount.saturating_mul(multiple)))
                .collect(),
        );
        if !msg.deposit.is_all_gte(&min_deposit) {
            return Err(err(
                CODE_LOW_DEPOSIT,
                format!("deposit {} is below the minimum {min_deposit}", msg.deposit),
            )
            .into());
        }
        self.bank.send_coins(ctx, &msg.provider, &escrow_holder(), &msg.deposit)?;
        self.set_binding(
            ctx,
            &SvcBinding {
                def_name: msg.def_name.clone(),
                def_chain_id: msg.def_chain_id.clone(),
                bind_chain_id: msg.bind_chain_id.clone(),
                provider: msg.provider,
                binding_type: msg.binding_type,
                deposit: msg.deposit.clone(),
                prices: msg.prices.clone(),
                avg_rsp_time: msg.avg_rsp_time,
            },
        )
    }

    /// Returns the deposit and removes the binding. Refused while requests
    /// to the binding are outstanding.
    pub fn unbind(&self, ctx: &mut Context<'_>, msg: &MsgSvcUnbind) -> HubResult<()> {
        let binding = self
            .binding(ctx, &msg.def_chain_id, &msg.def_name, &msg.bind_chain_id, &msg.provider)?
            .ok_or_else(|| err(CODE_UNKNOWN_BINDING, format!("{} does not bind {}", msg.provider, msg.def_name)))?;
        let pending = self.active_requests(ctx)?.into_iter().any(|r| {
            r.provider == binding.provider
                && r.def_name == binding.def_name
                && r.def_chain_id == binding.def_chain_id
                && r.bind_chain_id == binding.bind_chain_id
        });
        if pending {
            return Err(err(CODE_PENDING_REQUESTS, "binding has outstanding requests").into());
        }
        self.bank
            .send_coins(ctx, &escrow_holder(), &binding.provider, &binding.deposit)?;
        ctx.delete(
            self.key,
            &binding_key(&msg.def_chain_id, &msg.def_name, &msg.bind_chain_id, &msg.provider),
        )?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Requests and responses
    // -------------------------------------------------------------------------

    pub fn next_request_id(&self, ctx: &Context<'_>) -> HubResult<u64> {
        Ok(ctx.get_obj(self.key, NEXT_REQUEST_ID_KEY)?.unwrap_or(1))
    }

    pub fn set_next_request_id(&self, ctx: &mut Context<'_>, id: u64) -> HubResult<()> {
        ctx.set_obj(self.key, NEXT_REQUEST_ID_KEY.to_vec(), &id)?;
        Ok(())
    }

    pub fn request(&self, ctx: &Context<'_>, id: u64) -> HubResult<Option<SvcRequest>> {
        Ok(ctx.get_obj(self.key, &prefixed_key(REQUEST_PREFIX, &[&id.to_be_bytes()]))?)
    }

    /// Stores an outstanding request and its queue entry.
    pub fn set_active_request(&self, ctx: &mut Context<'_>, request: &SvcRequest) -> HubResult<()> {
        ctx.set_obj(
            self.key,
            prefixed_key(REQUEST_PREFIX, &[&request.id.to_be_bytes()]),
            request,
        )?;
        ctx.set(
            self.key,
            active_key(request.expiration_height, request.id),
            request.id.to_be_bytes().to_vec(),
        )?;
        Ok(())
    }

    fn delete_request(&self, ctx: &mut Context<'_>, request: &SvcRequest) -> HubResult<()> {
        ctx.delete(self.key, &prefixed_key(REQUEST_PREFIX, &[&request.id.to_be_bytes()]))?;
        ctx.delete(self.key, &active_key(request.expiration_height, request.id))?;
        Ok(())
    }

    pub fn active_requests(&self, ctx: &Context<'_>) -> HubResult<Vec<SvcRequest>> {
        Ok(ctx
            .iter_prefix_obj(self.key, REQUEST_PREFIX)?
            .into_iter()
            .map(|(_, r)| r)
            .collect())
    }

    pub fn response(&self, ctx: &Context<'_>, request_id: u64) -> HubResult<Option<SvcResponse>> {
        Ok(ctx.get_obj(self.key, &prefixed_key(RESPONSE_PREFIX, &[&request_id.to_be_bytes()]))?)
    }

    /// Escrows the fee and returns the new request id.
    pub fn call(&self, ctx: &mut Context<'_>, msg: &MsgSvcCall) -> HubResult<u64> {
        let binding = self
            .binding(ctx, &msg.def_chain_id, &msg.def_name, &msg.bind_chain_id, &msg.provider)?
            .ok_or_else(|| err(CODE_UNKNOWN_BINDING, format!("{} does not bind {}", msg.provider, msg.def_name)))?;
        if !msg.service_fee.is_all_gte(&binding.prices) {
            return Err(err(
                CODE_LOW_FEE,
                format!("service fee {} is below the price {}", msg.service_fee, binding.prices),
            )
            .into());
        }
        let max_timeout = self.params(ctx)?.max_request_timeout;
        let timeout = if msg.timeout == 0 { max_timeout } else { msg.timeout };
        if timeout > max_timeout {
            return Err(err(CODE_INVALID_TIMEOUT, format!("timeout {timeout} exceeds {max_timeout}")).into());
        }

        self.bank
            .send_coins(ctx, &msg.consumer, &escrow_holder(), &msg.service_fee)?;
        let height = ctx.block_height();
        let id = self.next_request_id(ctx)?;
        self.set_next_request_id(ctx, id + 1)?;
        self.set_active_request(
            ctx,
            &SvcRequest {
                id,
                def_name: msg.def_name.clone(),
                def_chain_id: msg.def_chain_id.clone(),
                bind_chain_id: msg.bind_chain_id.clone(),
                provider: msg.provider,
                consumer: msg.consumer,
                input: msg.input.clone(),
                service_fee: msg.service_fee.clone(),
                request_height: height,
                expiration_height: height + timeout,
            },
        )?;
        debug!("[service] request {id} from {} to {}", msg.consumer, msg.provider);
        Ok(id)
    }

    /// Pays the escrowed fee to the provider and records the response.
    pub fn respond(&self, ctx: &mut Context<'_>, msg: &MsgSvcRespond) -> HubResult<SvcRequest> {
        let request = self
            .request(ctx, msg.request_id)?
            .ok_or_else(|| err(CODE_UNKNOWN_REQUEST, format!("request {} is not active", msg.request_id)))?;
        if request.provider != msg.provider {
            return Err(err(CODE_NOT_PROVIDER, format!("{} is not the provider of the request", msg.provider)).into());
        }
        self.bank
            .send_coins(ctx, &escrow_holder(), &request.provider, &request.service_fee)?;
        self.delete_request(ctx, &request)?;
        ctx.set_obj(
            self.key,
            prefixed_key(RESPONSE_PREFIX, &[&request.id.to_be_bytes()]),
            &SvcResponse {
                request_id: request.id,
                provider: request.provider,
                consumer: request.consumer,
                output: msg.output.clone(),
                error_msg: msg.error_msg.clone(),
                height: ctx.block_height(),
            },
        )?;
        Ok(request)
    }

    fn refund(&self, ctx: &mut Context<'_>, request: &SvcRequest) -> HubResult<()> {
        self.bank
            .send_coins(ctx, &escrow_holder(), &request.consumer, &request.service_fee)?;
        self.delete_request(ctx, request)
    }

    /// Refunds requests whose expiration height has been reached.
    pub fn end_blocker(&self, ctx: &mut Context<'_>) -> HubResult<Tags> {
        let height = ctx.block_height();
        let mut tags = Tags::new();
        for (k, _) in ctx.iter_prefix(self.key, ACTIVE_QUEUE_PREFIX)? {
            let parse = |range: std::ops::Range<usize>| {
                k.get(range)
                    .and_then(|b| <[u8; 8]>::try_from(b).ok())
                    .map(u64::from_be_bytes)
                    .ok_or_else(|| FatalError::StoreCorruption("service queue key".into()))
            };
            if parse(1..9)? > height {
                break;
            }
            let id = parse(9..17)?;
            let request = self
                .request(ctx, id)?
                .ok_or_else(|| FatalError::StoreCorruption(format!("queued request {id} missing")))?;
            self.refund(ctx, &request)?;
            info!("[service] request {id} expired, fee returned to {}", request.consumer);
            tags.push(keys::REQUEST_ID, id);
        }
        Ok(tags)
    }

    /// Refunds and drops every outstanding request.
    pub fn prepare_for_zero_height(&self, ctx: &mut Context<'_>) -> HubResult<()> {
        for request in self.active_requests(ctx)? {
            self.refund(ctx, &request)?;
        }
        Ok(())
    }
}

//! # Params
//!
//! Module parameters live in per-module subspaces of the `params` store,
//! one JSON document per subspace. Parameter-change proposals update single
//! fields; the owning module's `validate` runs before anything is written.

use crate::types::Querier;
use hub_01_store::{Context, StoreKey};
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_types::{FatalError, HubResult, TxError};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const CODESPACE: &str = "params";

/// A module's parameter set.
pub trait ParamSet: Serialize + DeserializeOwned + Default + Clone {
    const SUBSPACE: &'static str;

    fn validate(&self) -> Result<(), String>;
}

/// Scoped view of one module's parameters.
#[derive(Debug, Clone, Copy)]
pub struct Subspace {
    key: StoreKey,
    name: &'static str,
}

impl Subspace {
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn raw_key(&self) -> Vec<u8> {
        format!("{}/params", self.name).into_bytes()
    }

    /// Stored parameters, or the defaults if none were ever set.
    pub fn get<P: ParamSet>(&self, ctx: &Context<'_>) -> HubResult<P> {
        match ctx.get(self.key, &self.raw_key())? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                FatalError::StoreCorruption(format!("params {}: {e}", self.name)).into()
            }),
            None => Ok(P::default()),
        }
    }

    pub fn set<P: ParamSet>(&self, ctx: &mut Context<'_>, params: &P) -> HubResult<()> {
        params
            .validate()
            .map_err(|e| TxError::module(CODESPACE, 1, format!("invalid {} params: {e}", self.name)))?;
        let bytes = serde_json::to_vec(params)
            .map_err(|e| FatalError::Internal(format!("params {}: {e}", self.name)))?;
        ctx.set(self.key, self.raw_key(), bytes)?;
        Ok(())
    }

    /// Replaces one field with `value` and stores the result if it validates.
    pub fn update_field<P: ParamSet>(
        &self,
        ctx: &mut Context<'_>,
        field: &str,
        value: &serde_json::Value,
    ) -> HubResult<()> {
        let current: P = self.get(ctx)?;
        let mut doc = serde_json::to_value(&current)
            .map_err(|e| FatalError::Internal(format!("params {}: {e}", self.name)))?;
        let Some(slot) = doc.get_mut(field) else {
            return Err(TxError::module(
                CODESPACE,
                2,
                format!("unknown parameter {}/{field}", self.name),
            )
            .into());
        };
        *slot = value.clone();
        let updated: P = serde_json::from_value(doc).map_err(|e| {
            TxError::module(CODESPACE, 3, format!("bad value for {}/{field}: {e}", self.name))
        })?;
        self.set(ctx, &updated)
    }
}

type UpdateFn = fn(&Subspace, &mut Context<'_>, &str, &serde_json::Value) -> HubResult<()>;
type ValidateFn = fn(&str, &serde_json::Value) -> Result<(), String>;

fn update_entry<P: ParamSet>(
    space: &Subspace,
    ctx: &mut Context<'_>,
    field: &str,
    value: &serde_json::Value,
) -> HubResult<()> {
    space.update_field::<P>(ctx, field, value)
}

fn validate_entry<P: ParamSet>(field: &str, value: &serde_json::Value) -> Result<(), String> {
    let mut doc = serde_json::to_value(P::default()).map_err(|e| e.to_string())?;
    let slot = doc
        .get_mut(field)
        .ok_or_else(|| format!("unknown parameter {}/{field}", P::SUBSPACE))?;
    *slot = value.clone();
    let _: P = serde_json::from_value(doc).map_err(|e| e.to_string())?;
    Ok(())
}

/// Owner of the `params` store and the registry of known parameter sets.
#[derive(Clone)]
pub struct ParamsKeeper {
    key: StoreKey,
    registry: Arc<BTreeMap<&'static str, (UpdateFn, ValidateFn)>>,
}

impl ParamsKeeper {
    pub fn new(key: StoreKey) -> Self {
        Self {
            key,
            registry: Arc::new(BTreeMap::new()),
        }
    }

    /// Makes `P` updatable through parameter-change proposals.
    pub fn register<P: ParamSet>(mut self) -> Self {
        Arc::make_mut(&mut self.registry).insert(
            P::SUBSPACE,
            (update_entry::<P> as UpdateFn, validate_entry::<P> as ValidateFn),
        );
        self
    }

    pub fn subspace(&self, name: &'static str) -> Subspace {
        Subspace {
            key: self.key,
            name,
        }
    }

    pub fn is_registered(&self, subspace: &str) -> bool {
        self.registry.contains_key(subspace)
    }

    /// Stateless check of a proposed change, used at proposal submission.
    pub fn check_change(&self, subspace: &str, field: &str, value: &serde_json::Value) -> Result<(), TxError> {
        let (_, validate) = self
            .registry
            .get(subspace)
            .ok_or_else(|| TxError::module(CODESPACE, 4, format!("unknown subspace {subspace}")))?;
        validate(field, value).map_err(|e| TxError::module(CODESPACE, 3, e))
    }

    pub fn apply_change(
        &self,
        ctx: &mut Context<'_>,
        subspace: &str,
        field: &str,
        value: &serde_json::Value,
    ) -> HubResult<()> {
        let Some((name, (update, _))) = self.registry.get_key_value(subspace) else {
            return Err(TxError::module(CODESPACE, 4, format!("unknown subspace {subspace}")).into());
        };
        update(&self.subspace(name), ctx, field, value)
    }
}

/// Serves `params/<subspace>`: the stored JSON document, or `null` when the
/// subspace still runs on defaults.
pub struct ParamsQuerier {
    keeper: ParamsKeeper,
}

impl ParamsQuerier {
    pub fn new(keeper: ParamsKeeper) -> Self {
        Self { keeper }
    }
}

impl Querier for ParamsQuerier {
    fn query(&self, ctx: &Context<'_>, path: &[&str], _data: &[u8]) -> HubResult<Vec<u8>> {
        let Some((name, _)) = path.first().and_then(|s| self.keeper.registry.get_key_value(*s)) else {
            return Err(TxError::UnknownRequest(format!("unknown params query {}", path.join("/"))).into());
        };
        let space = self.keeper.subspace(name);
        Ok(ctx.get(self.keeper.key, &space.raw_key())?.unwrap_or_else(|| b"null".to_vec()))
    }
}

//! # Record
//!
//! Timestamped data-hash records. Introduced by protocol version 1; version
//! 0 neither routes its messages nor mounts its queries.

use crate::types::msg::require_address;
use crate::types::{from_json_bytes, prefixed_key, to_json_bytes, Handler, HandlerResult, Msg, MsgBasic, Querier};
use hub_01_store::{Context, StoreKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared_types::tags::keys;
use shared_types::{Address, Height, HubResult, Tags, TxError};

pub const ROUTE: &str = "record";
pub const CODESPACE: &str = "record";

const RECORD_PREFIX: &[u8] = &[0x00];

const CODE_DUPLICATE_RECORD: u32 = 100;
const CODE_INVALID_HASH: u32 = 101;
const CODE_INVALID_DESCRIPTION: u32 = 102;

const MAX_DESCRIPTION_LEN: usize = 280;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Hex SHA-256 of submitter and data hash.
    pub id: String,
    pub submitter: Address,
    pub description: String,
    /// Hex SHA-256 of the off-chain data.
    pub data_hash: String,
    pub data_size: u64,
    pub submit_height: Height,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSubmitRecord {
    pub submitter: Address,
    pub description: String,
    pub data_hash: String,
    pub data_size: u64,
}

impl MsgBasic for MsgSubmitRecord {
    fn route(&self) -> &'static str {
        ROUTE
    }

    fn msg_type(&self) -> &'static str {
        "submit-record"
    }

    fn signers(&self) -> Vec<Address> {
        vec![self.submitter]
    }

    fn validate_basic(&self) -> Result<(), TxError> {
        require_address(&self.submitter, "submitter")?;
        let valid_hash = hex::decode(&self.data_hash).map(|b| b.len() == 32).unwrap_or(false);
        if !valid_hash {
            return Err(TxError::module(CODESPACE, CODE_INVALID_HASH, "data_hash must be 32 hex-encoded bytes"));
        }
        if self.description.len() > MAX_DESCRIPTION_LEN {
            return Err(TxError::module(
                CODESPACE,
                CODE_INVALID_DESCRIPTION,
                format!("description exceeds {MAX_DESCRIPTION_LEN} bytes"),
            ));
        }
        Ok(())
    }
}

pub fn record_id(submitter: &Address, data_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(submitter.as_bytes());
    hasher.update(data_hash.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy)]
pub struct RecordKeeper {
    key: StoreKey,
}

impl RecordKeeper {
    pub fn new(key: StoreKey) -> Self {
        Self { key }
    }

    pub fn get_record(&self, ctx: &Context<'_>, id: &str) -> HubResult<Option<Record>> {
        Ok(ctx.get_obj(self.key, &prefixed_key(RECORD_PREFIX, &[id.as_bytes()]))?)
    }

    pub fn set_record(&self, ctx: &mut Context<'_>, record: &Record) -> HubResult<()> {
        ctx.set_obj(self.key, prefixed_key(RECORD_PREFIX, &[record.id.as_bytes()]), record)?;
        Ok(())
    }

    pub fn records(&self, ctx: &Context<'_>) -> HubResult<Vec<Record>> {
        Ok(ctx
            .iter_prefix_obj(self.key, RECORD_PREFIX)?
            .into_iter()
            .map(|(_, r)| r)
            .collect())
    }

    pub fn submit(&self, ctx: &mut Context<'_>, msg: &MsgSubmitRecord) -> HubResult<String> {
        let id = record_id(&msg.submitter, &msg.data_hash);
        if self.get_record(ctx, &id)?.is_some() {
            return Err(TxError::module(CODESPACE, CODE_DUPLICATE_RECORD, format!("record {id} already exists")).into());
        }
        self.set_record(
            ctx,
            &Record {
                id: id.clone(),
                submitter: msg.submitter,
                description: msg.description.clone(),
                data_hash: msg.data_hash.clone(),
                data_size: msg.data_size,
                submit_height: ctx.block_height(),
            },
        )?;
        Ok(id)
    }

    pub fn prepare_for_zero_height(&self, ctx: &mut Context<'_>) -> HubResult<()> {
        for mut record in self.records(ctx)? {
            record.submit_height = 0;
            self.set_record(ctx, &record)?;
        }
        Ok(())
    }
}

pub struct RecordHandler {
    keeper: RecordKeeper,
}

impl RecordHandler {
    pub fn new(keeper: RecordKeeper) -> Self {
        Self { keeper }
    }
}

impl Handler for RecordHandler {
    fn handle(&self, ctx: &mut Context<'_>, msg: &Msg) -> HubResult<HandlerResult> {
        match msg {
            Msg::SubmitRecord(m) => {
                let id = self.keeper.submit(ctx, m)?;
                Ok(HandlerResult {
                    data: id.clone().into_bytes(),
                    tags: Tags::new()
                        .with(keys::ACTION, msg.msg_type())
                        .with(keys::SENDER, m.submitter)
                        .with(keys::RECORD_ID, id),
                })
            }
            other => Err(TxError::UnknownRequest(format!(
                "unrecognized record message {}",
                other.msg_type()
            ))
            .into()),
        }
    }
}

pub struct RecordQuerier {
    keeper: RecordKeeper,
}

impl RecordQuerier {
    pub fn new(keeper: RecordKeeper) -> Self {
        Self { keeper }
    }
}

impl Querier for RecordQuerier {
    fn query(&self, ctx: &Context<'_>, path: &[&str], data: &[u8]) -> HubResult<Vec<u8>> {
        match path.first().copied() {
            Some("record") => {
                let id: String = from_json_bytes(data)?;
                to_json_bytes(&self.keeper.get_record(ctx, &id)?)
            }
            _ => Err(TxError::UnknownRequest(format!("unknown record query {}", path.join("/"))).into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RecordGenesis {
    #[serde(default)]
    pub records: Vec<Record>,
}

pub fn init_genesis(ctx: &mut Context<'_>, keeper: &RecordKeeper, data: &RecordGenesis) -> HubResult<()> {
    for record in &data.records {
        keeper.set_record(ctx, record)?;
    }
    Ok(())
}

pub fn export_genesis(ctx: &Context<'_>, keeper: &RecordKeeper) -> HubResult<RecordGenesis> {
    Ok(RecordGenesis {
        records: keeper.records(ctx)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ctx_at, fresh_view};
    use hub_01_store::catalog;

    fn msg() -> MsgSubmitRecord {
        MsgSubmitRecord {
            submitter: Address([4; 20]),
            description: "audit log".into(),
            data_hash: hex::encode([7u8; 32]),
            data_size: 1024,
        }
    }

    #[test]
    fn test_submit_query_and_reject_duplicate() {
        let mut view = fresh_view();
        let mut ctx = ctx_at(&mut view, 9);
        let keeper = RecordKeeper::new(catalog::RECORD);
        let handler = RecordHandler::new(keeper);

        let res = handler.handle(&mut ctx, &Msg::SubmitRecord(msg())).unwrap();
        let id = String::from_utf8(res.data).unwrap();
        assert_eq!(res.tags.get(keys::RECORD_ID), Some(id.as_str()));
        assert!(handler.handle(&mut ctx, &Msg::SubmitRecord(msg())).is_err());

        let raw = RecordQuerier::new(keeper)
            .query(&ctx, &["record"], &serde_json::to_vec(&id).unwrap())
            .unwrap();
        let found: Option<Record> = serde_json::from_slice(&raw).unwrap();
        assert_eq!(found.unwrap().submit_height, 9);

        keeper.prepare_for_zero_height(&mut ctx).unwrap();
        assert_eq!(export_genesis(&ctx, &keeper).unwrap().records[0].submit_height, 0);
    }

    #[test]
    fn test_validate_basic_checks_hash() {
        let mut bad = msg();
        bad.data_hash = "abc".into();
        assert!(bad.validate_basic().is_err());
        assert!(msg().validate_basic().is_ok());
    }
}

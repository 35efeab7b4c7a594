use super::{CODESPACE, ROUTE};
use crate::params::ParamSet;
use crate::types::msg::require_address;
use crate::types::MsgBasic;
use serde::{Deserialize, Serialize};
use shared_types::{Address, Coins, Height, TxError};

pub(crate) const CODE_INVALID_NAME: u32 = 100;
pub(crate) const CODE_DEFINITION_EXISTS: u32 = 101;
pub(crate) const CODE_UNKNOWN_DEFINITION: u32 = 102;
pub(crate) const CODE_BINDING_EXISTS: u32 = 103;
pub(crate) const CODE_UNKNOWN_BINDING: u32 = 104;
pub(crate) const CODE_LOW_DEPOSIT: u32 = 105;
pub(crate) const CODE_LOW_FEE: u32 = 106;
pub(crate) const CODE_INVALID_TIMEOUT: u32 = 107;
pub(crate) const CODE_UNKNOWN_REQUEST: u32 = 108;
pub(crate) const CODE_NOT_PROVIDER: u32 = 109;
pub(crate) const CODE_PENDING_REQUESTS: u32 = 110;

const MAX_NAME_LEN: usize = 70;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SvcDef {
    pub name: String,
    pub chain_id: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub author: Address,
    /// Interface description the providers implement.
    pub idl_content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BindingType {
    #[default]
    Local,
    Global,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SvcBinding {
    pub def_name: String,
    pub def_chain_id: String,
    pub bind_chain_id: String,
    pub provider: Address,
    pub binding_type: BindingType,
    pub deposit: Coins,
    /// Fee per call.
    pub prices: Coins,
    /// Advertised average response time, in blocks.
    pub avg_rsp_time: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SvcRequest {
    pub id: u64,
    pub def_name: String,
    pub def_chain_id: String,
    pub bind_chain_id: String,
    pub provider: Address,
    pub consumer: Address,
    pub input: Vec<u8>,
    /// Held by the service module account until answered or expired.
    pub service_fee: Coins,
    pub request_height: Height,
    pub expiration_height: Height,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SvcResponse {
    pub request_id: u64,
    pub provider: Address,
    pub consumer: Address,
    pub output: Vec<u8>,
    #[serde(default)]
    pub error_msg: String,
    pub height: Height,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceParams {
    /// Longest allowed request lifetime, in blocks.
    pub max_request_timeout: u64,
    /// A binding must deposit at least its prices times this multiple.
    pub min_deposit_multiple: u64,
}

impl Default for ServiceParams {
    fn default() -> Self {
        Self {
            max_request_timeout: 100,
            min_deposit_multiple: 1000,
        }
    }
}

impl ParamSet for ServiceParams {
    const SUBSPACE: &'static str = "service";

    fn validate(&self) -> Result<(), String> {
        if self.max_request_timeout == 0 {
            return Err("max_request_timeout must be positive".into());
        }
        Ok(())
    }
}

/// Key of a binding in queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingQuery {
    pub def_chain_id: String,
    pub def_name: String,
    pub bind_chain_id: String,
    pub provider: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionQuery {
    pub chain_id: String,
    pub name: String,
}

// =============================================================================
// MESSAGES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSvcDefine {
    pub name: String,
    pub chain_id: String,
    pub description: String,
    pub tags: Vec<String>,
    pub author: Address,
    pub idl_content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSvcBind {
    pub def_name: String,
    pub def_chain_id: String,
    pub bind_chain_id: String,
    pub provider: Address,
    pub binding_type: BindingType,
    pub deposit: Coins,
    pub prices: Coins,
    pub avg_rsp_time: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSvcUnbind {
    pub def_name: String,
    pub def_chain_id: String,
    pub bind_chain_id: String,
    pub provider: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSvcCall {
    pub def_name: String,
    pub def_chain_id: String,
    pub bind_chain_id: String,
    pub provider: Address,
    pub consumer: Address,
    pub input: Vec<u8>,
    pub service_fee: Coins,
    /// Blocks until expiry; zero means the maximum.
    pub timeout: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSvcRespond {
    pub request_id: u64,
    pub provider: Address,
    pub output: Vec<u8>,
    pub error_msg: String,
}

fn check_name(name: &str, field: &str) -> Result<(), TxError> {
    let ok = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if ok {
        Ok(())
    } else {
        Err(err(CODE_INVALID_NAME, format!("{field} must be 1-{MAX_NAME_LEN} of [A-Za-z0-9-_.]")))
    }
}

impl MsgBasic for MsgSvcDefine {
    fn route(&self) -> &'static str {
        ROUTE
    }

    fn msg_type(&self) -> &'static str {
        "service-define"
    }

    fn signers(&self) -> Vec<Address> {
        vec![self.author]
    }

    fn validate_basic(&self) -> Result<(), TxError> {
        require_address(&self.author, "author")?;
        check_name(&self.name, "name")?;
        check_name(&self.chain_id, "chain_id")
    }
}

impl MsgBasic for MsgSvcBind {
    fn route(&self) -> &'static str {
        ROUTE
    }

    fn msg_type(&self) -> &'static str {
        "service-bind"
    }

    fn signers(&self) -> Vec<Address> {
        vec![self.provider]
    }

    fn validate_basic(&self) -> Result<(), TxError> {
        require_address(&self.provider, "provider")?;
        check_name(&self.def_name, "def_name")?;
        check_name(&self.def_chain_id, "def_chain_id")?;
        check_name(&self.bind_chain_id, "bind_chain_id")?;
        if self.deposit.is_empty() {
            return Err(err(CODE_LOW_DEPOSIT, "binding deposit is empty"));
        }
        self.deposit.validate().map_err(TxError::InvalidCoins)?;
        self.prices.validate().map_err(TxError::InvalidCoins)
    }
}

impl MsgBasic for MsgSvcUnbind {
    fn route(&self) -> &'static str {
        ROUTE
    }

    fn msg_type(&self) -> &'static str {
        "service-unbind"
    }

    fn signers(&self) -> Vec<Address> {
        vec![self.provider]
    }

    fn validate_basic(&self) -> Result<(), TxError> {
        require_address(&self.provider, "provider")?;
        check_name(&self.def_name, "def_name")
    }
}

impl MsgBasic for MsgSvcCall {
    fn route(&self) -> &'static str {
        ROUTE
    }

    fn msg_type(&self) -> &'static str {
        "service-call"
    }

    fn signers(&self) -> Vec<Address> {
        vec![self.consumer]
    }

    fn validate_basic(&self) -> Result<(), TxError> {
        require_address(&self.consumer, "consumer")?;
        require_address(&self.provider, "provider")?;
        check_name(&self.def_name, "def_name")?;
        self.service_fee.validate().map_err(TxError::InvalidCoins)
    }
}

impl MsgBasic for MsgSvcRespond {
    fn route(&self) -> &'static str {
        ROUTE
    }

    fn msg_type(&self) -> &'static str {
        "service-respond"
    }

    fn signers(&self) -> Vec<Address> {
        vec![self.provider]
    }

    fn validate_basic(&self) -> Result<(), TxError> {
        require_address(&self.provider, "provider")
    }
}

pub(crate) fn err(code: u32, msg: impl Into<String>) -> TxError {
    TxError::module(CODESPACE, code, msg)
}

use std::fmt;

/// Name of one independent sub-store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreKey(&'static str);

impl StoreKey {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub const fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Every sub-store any protocol version mounts.
pub mod catalog {
    use super::StoreKey;

    pub const MAIN: StoreKey = StoreKey::new("main");
    pub const PROTOCOL: StoreKey = StoreKey::new("protocol");
    pub const ACCOUNT: StoreKey = StoreKey::new("acc");
    pub const STAKE: StoreKey = StoreKey::new("stake");
    pub const MINT: StoreKey = StoreKey::new("mint");
    pub const DISTR: StoreKey = StoreKey::new("distr");
    pub const SLASHING: StoreKey = StoreKey::new("slashing");
    pub const GOV: StoreKey = StoreKey::new("gov");
    pub const RECORD: StoreKey = StoreKey::new("record");
    pub const FEE: StoreKey = StoreKey::new("fee");
    pub const PARAMS: StoreKey = StoreKey::new("params");
    pub const UPGRADE: StoreKey = StoreKey::new("upgrade");
    pub const SERVICE: StoreKey = StoreKey::new("service");
    pub const GUARDIAN: StoreKey = StoreKey::new("guardian");

    pub const ALL: [StoreKey; 14] = [
        MAIN, PROTOCOL, ACCOUNT, STAKE, MINT, DISTR, SLASHING, GOV, RECORD, FEE, PARAMS,
        UPGRADE, SERVICE, GUARDIAN,
    ];

    pub fn by_name(name: &str) -> Option<StoreKey> {
        ALL.iter().copied().find(|k| k.name() == name)
    }
}

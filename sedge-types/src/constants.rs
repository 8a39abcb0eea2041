pub const SPBV01: &str = "spBv1.0";

pub const BDSEQ: &str = "bdSeq";

pub const NODE_CONTROL_NEXT_SERVER: &str = "Node Control/Next Server";
pub const NODE_CONTROL_REBIRTH: &str = "Node Control/Rebirth";
pub const NODE_CONTROL_REBOOT: &str = "Node Control/Reboot";

/* Aliases permanently bound to the node control metrics */
pub const ALIAS_NEXT_SERVER: u64 = 0;
pub const ALIAS_REBIRTH: u64 = 1;
pub const ALIAS_REBOOT: u64 = 2;

/// First alias available to user metrics
pub const FIRST_USER_ALIAS: u64 = 3;

pub const NBIRTH: &str = "NBIRTH";
pub const NDEATH: &str = "NDEATH";
pub const NDATA: &str = "NDATA";
pub const NCMD: &str = "NCMD";

pub const DBIRTH: &str = "DBIRTH";
pub const DDEATH: &str = "DDEATH";
pub const DDATA: &str = "DDATA";
pub const DCMD: &str = "DCMD";

pub const STATE: &str = "STATE";

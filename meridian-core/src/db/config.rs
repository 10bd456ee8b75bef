use serde_derive::{Deserialize, Serialize};

/// Where to dial in: a host/port pair, or a local unix socket path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Socket { path: String },
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::Tcp { host: "127.0.0.1".into(), port: 3306 }
    }
}

/// Connection configuration shared by every connector the pool creates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnConfig {
    pub endpoint: Endpoint,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Additional driver-specific flags (e.g. `CLIENT_MULTI_STATEMENTS`), passed through
    /// verbatim rather than modeled as an enum since the set is driver-defined.
    pub flags: u32,
}

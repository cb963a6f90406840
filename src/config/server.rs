use std::net::SocketAddr;
use std::path::PathBuf;

use crate::compiler::Limits;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Base URL of the template registry, used for HTML links.
    pub registry_url: String,
    /// Raw-content endpoint the registry client fetches template bytes from.
    pub registry_raw_url: String,
    pub registry_token: Option<String>,
    /// zlib level for stored pipeline data (0-9).
    pub compression_level: u32,
    pub limits: Limits,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("conveyor.db")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            registry_url: "https://github.com".to_string(),
            registry_raw_url: "https://raw.githubusercontent.com".to_string(),
            registry_token: None,
            compression_level: 3,
            limits: Limits::default(),
        }
    }
}

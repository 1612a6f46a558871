//! Node orchestration: configuration, persistence and engine start-up, then
//! the API server.

use crate::blockchain::Blockchain;
use crate::config::Config;
use crate::error::ChainError;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

pub struct Node {
    pub config: Config,
    pub blockchain: Arc<Blockchain>,
}

impl Node {
    /// Validate `config`, open its storage backend and load (or seed) the
    /// ledger state.
    pub fn init(config: Config) -> Result<Self, ChainError> {
        config.validate()?;

        if config.storage.in_memory {
            info!("Starting MyCoin node with in-memory storage");
        } else {
            info!("Starting MyCoin node (state file = {})", config.storage.path);
        }

        let blockchain = Blockchain::open(&config)?;
        if !blockchain.verify_chain_integrity() {
            // Loaded state is still served; callers can inspect /api/blockchain/info.
            error!("Loaded chain failed integrity verification");
        }
        info!(
            "Ledger ready: {} blocks, {} validators",
            blockchain.chain_len(),
            blockchain.get_validators().len()
        );

        Ok(Node {
            config,
            blockchain: Arc::new(blockchain),
        })
    }

    pub fn api_addr(&self) -> Result<SocketAddr, ChainError> {
        let addr = format!(
            "{}:{}",
            self.config.network.bind_address, self.config.network.api_port
        );
        addr.parse()
            .map_err(|e| ChainError::InvalidConfig(format!("Invalid bind address {}: {}", addr, e)))
    }

    #[cfg(feature = "api")]
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let addr = self.api_addr()?;
        let state = crate::api::ApiState::new(self.blockchain.clone(), self.config.clone());
        crate::api::run_api_server(state, addr).await
    }

    #[cfg(not(feature = "api"))]
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        Err("API feature not enabled in this build".into())
    }
}

//! REST API for MyCoin
//!
//! Wallet, block production, staking and transfer endpoints over a shared
//! [`Blockchain`] engine. All routes are nested under `/api`.

use axum::{
    extract::{Path, Query, Request, State},
    http::{self, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use crate::blockchain::{Block, Blockchain, ChainInfo, TransactionRecord};
use crate::config::Config;
use crate::consensus::Validator;
use crate::error::{ChainError, ErrorKind};
use crate::wallet::Wallet;

/// Shared handler state
#[derive(Clone)]
pub struct ApiState {
    pub blockchain: Arc<Blockchain>,
    pub config: Arc<Config>,
    /// How long `/blockchain/mine` waits before answering 408.
    pub production_timeout: Duration,
}

impl ApiState {
    pub fn new(blockchain: Arc<Blockchain>, config: Config) -> Self {
        ApiState {
            blockchain,
            production_timeout: Duration::from_secs(config.ledger.block_production_timeout_secs),
            config: Arc::new(config),
        }
    }

    pub fn with_production_timeout(mut self, timeout: Duration) -> Self {
        self.production_timeout = timeout;
        self
    }
}

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BlockchainError(ChainError),
    InvalidInput(String),
    Timeout,
    InternalError(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BlockchainError(e) => match e {
                ChainError::ValidatorNotFound(_) => StatusCode::NOT_FOUND,
                ChainError::NoEligibleValidators => StatusCode::SERVICE_UNAVAILABLE,
                _ => match e.kind() {
                    ErrorKind::Proposer => StatusCode::FORBIDDEN,
                    ErrorKind::Admission
                    | ErrorKind::Staking
                    | ErrorKind::Crypto
                    | ErrorKind::Wallet => StatusCode::BAD_REQUEST,
                    ErrorKind::Integrity | ErrorKind::Persistence | ErrorKind::Config => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                },
            },
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Timeout => StatusCode::REQUEST_TIMEOUT,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::BlockchainError(e) => e.to_string(),
            ApiError::InvalidInput(msg) | ApiError::InternalError(msg) => msg,
            ApiError::Timeout => "Block creation timeout".to_string(),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        ApiError::BlockchainError(err)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
pub struct WalletResponse {
    pub address: String,
    pub public_key: String,
    pub private_key: String,
    pub balance: f64,
}

#[derive(Deserialize)]
pub struct ImportWalletRequest {
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub passphrase: Option<String>,
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: f64,
}

#[derive(Deserialize)]
pub struct MineRequest {
    pub miner_address: String,
}

#[derive(Serialize)]
pub struct MineResponse {
    pub status: &'static str,
    pub block_hash: String,
    pub block: Block,
}

#[derive(Serialize)]
pub struct BlockchainInfoResponse {
    #[serde(flatten)]
    pub info: ChainInfo,
    pub latest_block: Option<Block>,
}

#[derive(Serialize)]
pub struct BlocksResponse {
    pub blocks: Vec<Block>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
}

#[derive(Deserialize)]
pub struct StakeRequest {
    pub address: String,
    pub amount: f64,
    pub private_key: String,
}

#[derive(Deserialize)]
pub struct UnstakeRequest {
    pub address: String,
    pub private_key: String,
}

#[derive(Serialize)]
pub struct StakeResponse {
    pub status: &'static str,
    pub message: String,
    pub address: String,
    pub amount: f64,
}

#[derive(Serialize)]
pub struct ValidatorsResponse {
    pub validators: Vec<Validator>,
    pub count: usize,
}

#[derive(Serialize)]
pub struct ValidatorResponse {
    #[serde(flatten)]
    pub validator: Validator,
    pub accrued_reward: f64,
}

#[derive(Deserialize)]
pub struct SendTransactionRequest {
    pub from: String,
    pub to: String,
    pub amount: f64,
    #[serde(default)]
    pub fee: f64,
    pub private_key: String,
}

#[derive(Serialize)]
pub struct SendTransactionResponse {
    pub status: &'static str,
    pub transaction_hash: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct TransactionHistoryResponse {
    pub address: String,
    pub transactions: Vec<TransactionRecord>,
}

#[derive(Deserialize)]
struct PaginationQuery {
    #[serde(default)]
    page: usize,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    10
}

// ============================================================================
// Utility Functions
// ============================================================================

/// Load the wallet behind `private_key` and check it owns `address`.
fn authorize(address: &str, private_key: &str) -> Result<Wallet, ApiError> {
    let wallet = Wallet::from_secret_hex(private_key)
        .map_err(|_| ApiError::InvalidInput("Invalid private key".to_string()))?;
    if wallet.address != address {
        return Err(ApiError::InvalidInput(
            "Private key does not match address".to_string(),
        ));
    }
    Ok(wallet)
}

fn wallet_response(wallet: Wallet, balance: f64) -> WalletResponse {
    WalletResponse {
        address: wallet.address,
        public_key: wallet.public_key_hex,
        private_key: wallet.secret_key_hex,
        balance,
    }
}

// ============================================================================
// Middleware
// ============================================================================

async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "api.request"
    );

    response
}

// ============================================================================
// API Server
// ============================================================================

/// Build the API router with all endpoints
pub fn build_api_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![
            http::Method::GET,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers(vec![http::header::CONTENT_TYPE])
        .allow_credentials(true);

    let api_routes = Router::new()
        // Wallet endpoints
        .route("/wallet/create", post(create_wallet))
        .route("/wallet/import", post(import_wallet))
        .route("/wallet/balance/:address", get(get_balance))
        // Blockchain endpoints
        .route("/blockchain/mine", post(mine_block))
        .route("/blockchain/info", get(get_blockchain_info))
        .route("/blockchain/blocks", get(get_blocks))
        // Staking endpoints
        .route("/staking/stake", post(stake_coins))
        .route("/staking/unstake", post(unstake_coins))
        .route("/staking/validators", get(get_validators))
        .route("/staking/validator/:address", get(get_validator))
        .route("/staking/info", get(get_staking_info))
        // Transaction endpoints
        .route("/transaction/send", post(send_transaction))
        .route("/transaction/history/:address", get(get_transaction_history))
        // System endpoints
        .route("/health", get(health_check))
        .layer(middleware::from_fn(logging_middleware))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(cors)
}

/// Serve the API on `addr` until the server stops.
pub async fn run_api_server(
    state: ApiState,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_api_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn health_check(State(state): State<ApiState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "chain_length": state.blockchain.chain_len(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn create_wallet(State(state): State<ApiState>) -> Result<Json<WalletResponse>, ApiError> {
    let wallet = Wallet::new(None);
    info!("New wallet created: {}", wallet.address);

    let balance = state
        .blockchain
        .credit(&wallet.address, state.config.wallet.initial_balance)?;
    Ok(Json(wallet_response(wallet, balance)))
}

async fn import_wallet(
    State(state): State<ApiState>,
    Json(request): Json<ImportWalletRequest>,
) -> Result<Json<WalletResponse>, ApiError> {
    let private_key = request.private_key.filter(|k| !k.is_empty());
    let passphrase = request.passphrase.filter(|p| !p.is_empty());

    let wallet = match (private_key, passphrase) {
        (Some(key), _) => Wallet::from_secret_hex(&key),
        (None, Some(phrase)) => Wallet::from_passphrase(&phrase),
        (None, None) => {
            return Err(ApiError::InvalidInput(
                "Either private_key or passphrase is required".to_string(),
            ))
        }
    }
    .map_err(|e| ApiError::InvalidInput(format!("Failed to import wallet: {}", e)))?;

    // Empty wallets get the same starting bonus as new ones.
    let mut balance = state.blockchain.get_balance(&wallet.address);
    if balance == 0.0 {
        balance = state
            .blockchain
            .credit(&wallet.address, state.config.wallet.initial_balance)?;
    }
    Ok(Json(wallet_response(wallet, balance)))
}

async fn get_balance(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Json<BalanceResponse> {
    let balance = state.blockchain.get_balance(&address);
    Json(BalanceResponse { address, balance })
}

async fn mine_block(
    State(state): State<ApiState>,
    Json(request): Json<MineRequest>,
) -> Result<Json<MineResponse>, ApiError> {
    if request.miner_address.is_empty() {
        return Err(ApiError::InvalidInput(
            "Miner address cannot be empty".to_string(),
        ));
    }

    let blockchain = state.blockchain.clone();
    let candidate = request.miner_address;
    let task = tokio::task::spawn_blocking(move || blockchain.produce_selected_block(&candidate));

    // On timeout the task keeps running and still commits its block.
    let block = match tokio::time::timeout(state.production_timeout, task).await {
        Ok(joined) => joined.map_err(|e| ApiError::InternalError(e.to_string()))??,
        Err(_) => {
            warn!("Block creation timeout");
            return Err(ApiError::Timeout);
        }
    };

    Ok(Json(MineResponse {
        status: "success",
        block_hash: block.hash_str(),
        block,
    }))
}

async fn get_blockchain_info(State(state): State<ApiState>) -> Json<BlockchainInfoResponse> {
    Json(BlockchainInfoResponse {
        info: state.blockchain.chain_info(),
        latest_block: state.blockchain.latest_block(),
    })
}

/// Newest blocks first, `limit` per page.
async fn get_blocks(
    State(state): State<ApiState>,
    Query(query): Query<PaginationQuery>,
) -> Json<BlocksResponse> {
    let all = state.blockchain.blocks();
    let total = all.len();
    let limit = query.limit.clamp(1, 100);
    let blocks = all
        .into_iter()
        .rev()
        .skip(query.page.saturating_mul(limit))
        .take(limit)
        .collect();

    Json(BlocksResponse {
        blocks,
        total,
        page: query.page,
        limit,
    })
}

async fn stake_coins(
    State(state): State<ApiState>,
    Json(request): Json<StakeRequest>,
) -> Result<Json<StakeResponse>, ApiError> {
    authorize(&request.address, &request.private_key)?;
    state.blockchain.stake(&request.address, request.amount)?;

    Ok(Json(StakeResponse {
        status: "success",
        message: format!("Successfully staked {:.2} MYC", request.amount),
        address: request.address,
        amount: request.amount,
    }))
}

async fn unstake_coins(
    State(state): State<ApiState>,
    Json(request): Json<UnstakeRequest>,
) -> Result<Json<StakeResponse>, ApiError> {
    authorize(&request.address, &request.private_key)?;
    let refunded = state.blockchain.unstake(&request.address)?;

    Ok(Json(StakeResponse {
        status: "success",
        message: format!("Successfully unstaked {:.2} MYC", refunded),
        address: request.address,
        amount: refunded,
    }))
}

async fn get_validators(State(state): State<ApiState>) -> Json<ValidatorsResponse> {
    let validators = state.blockchain.get_validators();
    Json(ValidatorsResponse {
        count: validators.len(),
        validators,
    })
}

async fn get_validator(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Result<Json<ValidatorResponse>, ApiError> {
    let validator = state.blockchain.get_validator(&address)?;
    let accrued_reward = state.blockchain.accrued_staking_reward(&address)?;
    Ok(Json(ValidatorResponse {
        validator,
        accrued_reward,
    }))
}

async fn get_staking_info(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.blockchain.staking_info())
}

async fn send_transaction(
    State(state): State<ApiState>,
    Json(request): Json<SendTransactionRequest>,
) -> Result<Json<SendTransactionResponse>, ApiError> {
    let wallet = authorize(&request.from, &request.private_key)?;
    let tx = wallet.create_transaction(request.to, request.amount, request.fee)?;
    let transaction_hash = tx.hash_str();
    state.blockchain.admit_transaction(tx)?;

    Ok(Json(SendTransactionResponse {
        status: "success",
        transaction_hash,
        message: "Transaction added to pending pool".to_string(),
    }))
}

async fn get_transaction_history(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> Json<TransactionHistoryResponse> {
    let transactions = state.blockchain.transaction_history(&address);
    Json(TransactionHistoryResponse {
        address,
        transactions,
    })
}

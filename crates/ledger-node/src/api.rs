use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use ledger_core::{Block, ChainFault, Ledger, LedgerStats, SearchHit, Transaction};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::constants::API_PREFIX;
use crate::error::{ApiError, ApiJson, ApiPath};

#[derive(Clone)]
pub struct AppState {
    /// Persists mined blocks itself when built with a store.
    pub ledger: Arc<Ledger>,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Serialize)]
struct ChainView {
    chain: Vec<Block>,
    difficulty: u32,
    pending_transactions: Vec<Transaction>,
}

#[derive(Deserialize)]
struct TxIn {
    data: String,
}

#[derive(Serialize)]
struct TxAccepted {
    success: bool,
    message: &'static str,
    pending_transactions: usize,
}

#[derive(Serialize)]
struct Mined {
    success: bool,
    message: &'static str,
    block: Block,
}

#[derive(Serialize)]
struct CancelOutcome {
    success: bool,
    cancelled: bool,
}

#[derive(Deserialize)]
struct SearchParams {
    q: Option<String>,
}

#[derive(Serialize)]
struct SearchResults {
    success: bool,
    query: String,
    results: Vec<SearchHit>,
}

#[derive(Serialize)]
struct Validation {
    success: bool,
    valid: bool,
    message: String,
    fault: Option<ChainFault>,
}

#[derive(Deserialize)]
struct DifficultyIn {
    difficulty: i64,
}

#[derive(Serialize)]
struct DifficultyOut {
    success: bool,
    message: &'static str,
    difficulty: u32,
    min_difficulty: u32,
    max_difficulty: u32,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/blockchain", get(get_blockchain))
        .route("/blocks/{index}", get(get_block))
        .route("/transaction", post(add_transaction))
        .route("/mine", post(mine_block))
        .route("/mine/cancel", post(cancel_mining))
        .route("/search", get(search))
        .route("/validate", get(validate))
        .route("/stats", get(stats))
        .route("/difficulty", post(set_difficulty));

    Router::new()
        .route("/health", get(|| async { Json(Health { status: "ok" }) }))
        .nest(API_PREFIX, api)
        .with_state(state)
}

async fn get_blockchain(State(state): State<AppState>) -> Json<ChainView> {
    Json(ChainView {
        chain: state.ledger.blocks(),
        difficulty: state.ledger.difficulty(),
        pending_transactions: state.ledger.pending_transactions(),
    })
}

async fn get_block(
    State(state): State<AppState>,
    ApiPath(index): ApiPath<u64>,
) -> Result<Json<Block>, ApiError> {
    Ok(Json(state.ledger.block_at(index)?))
}

async fn add_transaction(
    State(state): State<AppState>,
    ApiJson(tx): ApiJson<TxIn>,
) -> Result<Json<TxAccepted>, ApiError> {
    let pending = state.ledger.submit_transaction(tx.data)?;
    Ok(Json(TxAccepted {
        success: true,
        message: "Transaction added to pending pool",
        pending_transactions: pending,
    }))
}

/// Mining runs on the blocking pool so request threads stay free for
/// submissions and reads.
async fn mine_block(State(state): State<AppState>) -> Result<Json<Mined>, ApiError> {
    let ledger = Arc::clone(&state.ledger);
    let block = tokio::task::spawn_blocking(move || ledger.mine_block())
        .await
        .map_err(|err| ApiError::internal(format!("mining task failed: {err}")))??;

    Ok(Json(Mined {
        success: true,
        message: "Block mined successfully",
        block,
    }))
}

async fn cancel_mining(State(state): State<AppState>) -> Json<CancelOutcome> {
    let cancelled = state.ledger.cancel_mining();
    if cancelled {
        info!("mining cancellation requested");
    }
    Json(CancelOutcome {
        success: true,
        cancelled,
    })
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResults>, ApiError> {
    let query = params
        .q
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::bad_request("Query parameter 'q' is required"))?;
    let results = state.ledger.search(&query);
    Ok(Json(SearchResults {
        success: true,
        query,
        results,
    }))
}

async fn validate(State(state): State<AppState>) -> Json<Validation> {
    let fault = state.ledger.validate().err();
    let valid = fault.is_none();
    Json(Validation {
        success: true,
        valid,
        message: format!("Blockchain is valid: {valid}"),
        fault,
    })
}

async fn stats(State(state): State<AppState>) -> Json<LedgerStats> {
    Json(state.ledger.stats())
}

async fn set_difficulty(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<DifficultyIn>,
) -> Result<Json<DifficultyOut>, ApiError> {
    let difficulty = state.ledger.set_difficulty(body.difficulty)?;
    let (min_difficulty, max_difficulty) = state.ledger.difficulty_bounds();
    Ok(Json(DifficultyOut {
        success: true,
        message: "Difficulty updated",
        difficulty,
        min_difficulty,
        max_difficulty,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::Response,
    };
    use ledger_core::chain::{load_or_init, ChainStore};
    use ledger_core::LedgerConfig;
    use ledger_storage::SledStore;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app_with(ledger: Arc<Ledger>) -> Router {
        router(AppState { ledger })
    }

    fn test_ledger(difficulty: u32) -> Arc<Ledger> {
        Arc::new(
            Ledger::new(LedgerConfig {
                default_difficulty: difficulty,
                ..LedgerConfig::default()
            })
            .unwrap(),
        )
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Response {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                req = req.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        app.clone().oneshot(req.body(body).unwrap()).await.unwrap()
    }

    async fn json_body(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health() {
        let app = app_with(test_ledger(1));
        let resp = send(&app, "GET", "/health", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn submit_mine_and_inspect() {
        let app = app_with(test_ledger(2));

        let resp = send(&app, "GET", "/api/stats", None).await;
        let stats = json_body(resp).await;
        assert_eq!(stats["total_blocks"], 1);
        assert_eq!(stats["pending_transactions"], 0);

        let resp = send(
            &app,
            "POST",
            "/api/transaction",
            Some(json!({ "data": "Bob sends 5 coins to Charlie" })),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["pending_transactions"], 1);

        let resp = send(&app, "POST", "/api/mine", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        let block = &body["block"];
        assert_eq!(block["index"], 1);
        assert_eq!(block["transactions"], json!(["Bob sends 5 coins to Charlie"]));
        assert!(block["hash"].as_str().unwrap().starts_with("00"));

        let resp = send(&app, "GET", "/api/blockchain", None).await;
        let view = json_body(resp).await;
        assert_eq!(view["chain"].as_array().unwrap().len(), 2);
        assert_eq!(view["chain"][1]["previous_hash"], view["chain"][0]["hash"]);
        assert_eq!(view["chain"][0]["previous_hash"], "0");
        assert_eq!(view["difficulty"], 2);
        assert_eq!(view["pending_transactions"], json!([]));

        let resp = send(&app, "GET", "/api/validate", None).await;
        let body = json_body(resp).await;
        assert_eq!(body["valid"], true);
        assert_eq!(body["fault"], Value::Null);

        let resp = send(&app, "GET", "/api/blocks/1", None).await;
        assert_eq!(json_body(resp).await, view["chain"][1]);
    }

    #[tokio::test]
    async fn rejects_empty_transaction() {
        let app = app_with(test_ledger(1));
        let resp = send(&app, "POST", "/api/transaction", Some(json!({ "data": "" }))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = json_body(resp).await;
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn mining_empty_pool_is_bad_request() {
        let app = app_with(test_ledger(1));
        let resp = send(&app, "POST", "/api/mine", None).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(resp).await["error"],
            "no pending transactions to mine"
        );
    }

    #[tokio::test]
    async fn search_requires_query() {
        let ledger = test_ledger(1);
        ledger.submit_transaction("Alice sends 10 coins to Bob").unwrap();
        ledger.mine_block().unwrap();
        let app = app_with(ledger);

        let resp = send(&app, "GET", "/api/search", None).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = send(&app, "GET", "/api/search?q=ALICE", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["query"], "ALICE");
        assert_eq!(body["results"][0]["block_index"], 1);
        assert_eq!(
            body["results"][0]["transaction"],
            "Alice sends 10 coins to Bob"
        );
    }

    #[tokio::test]
    async fn difficulty_is_bounded() {
        let ledger = test_ledger(4);
        let app = app_with(Arc::clone(&ledger));

        let resp = send(&app, "POST", "/api/difficulty", Some(json!({ "difficulty": 3 }))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["difficulty"], 3);
        assert_eq!(body["min_difficulty"], 1);
        assert_eq!(body["max_difficulty"], 6);

        let resp = send(&app, "POST", "/api/difficulty", Some(json!({ "difficulty": 7 }))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ledger.difficulty(), 3);
    }

    #[tokio::test]
    async fn unknown_block_is_not_found() {
        let app = app_with(test_ledger(1));
        let resp = send(&app, "GET", "/api/blocks/5", None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cancel_without_miner() {
        let app = app_with(test_ledger(1));
        let resp = send(&app, "POST", "/api/mine/cancel", None).await;
        assert_eq!(json_body(resp).await["cancelled"], false);
    }

    #[tokio::test]
    async fn mined_blocks_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SledStore::open(dir.path()).unwrap());
        let chain = load_or_init(store.as_ref()).unwrap();
        let ledger = Ledger::with_chain(LedgerConfig::default(), chain)
            .unwrap()
            .with_store(store.clone());
        ledger.set_difficulty(1).unwrap();
        let app = app_with(Arc::new(ledger));

        for text in ["keep me", "and me"] {
            send(&app, "POST", "/api/transaction", Some(json!({ "data": text }))).await;
            let resp = send(&app, "POST", "/api/mine", None).await;
            assert_eq!(resp.status(), StatusCode::OK);
        }

        let stored = store.get_block(1).unwrap().expect("block persisted");
        assert_eq!(stored.transactions, vec![Transaction::new("keep me")]);
        assert_eq!(store.tip_height().unwrap(), Some(2));
        assert_eq!(load_or_init(store.as_ref()).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn malformed_bodies_get_json_errors() {
        let app = app_with(test_ledger(1));
        let cases = [
            ("/api/transaction", json!({ "text": "wrong field" })),
            ("/api/difficulty", json!({ "difficulty": 3.5 })),
            ("/api/difficulty", json!({})),
        ];
        for (uri, body) in cases {
            let resp = send(&app, "POST", uri, Some(body)).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri}");
            let body = json_body(resp).await;
            assert_eq!(body["success"], false);
            assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
        }

        let req = Request::builder()
            .method("POST")
            .uri("/api/transaction")
            .body(Body::from("data=plain"))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["success"], false);
    }

    #[tokio::test]
    async fn non_numeric_block_index_gets_json_error() {
        let app = app_with(test_ledger(1));
        let resp = send(&app, "GET", "/api/blocks/latest", None).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["success"], false);
    }
}

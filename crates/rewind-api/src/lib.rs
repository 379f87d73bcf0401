//! # rewind-api
//!
//! HTTP surface for rewind: per-user undo/redo history plus the recorded
//! annotation and connection endpoints whose writes feed it.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{header, Method};
use axum::routing::{delete, get, put};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use uuid::Uuid;

use rewind_core::{
    ActionRecorder, ChangeLedgerRepository, CollectionRegistry, DocumentCollection,
    HistoryRepository, HistoryLog, MemoryCollection, MemoryHistoryStore, Result,
    RetentionPolicy, UndoRedoEngine,
};
use rewind_db::Database;

pub use auth::RequireUser;
pub use config::{ServerConfig, StoreBackend};
pub use error::ApiError;

/// Collection holding annotations.
pub const ANNOTATION_COLLECTION: &str = "annotation";

/// Collection holding parent/child links between annotations.
pub const CONNECTION_COLLECTION: &str = "annotation_connection";

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub recorder: Arc<ActionRecorder>,
    pub engine: Arc<UndoRedoEngine>,
    pub annotations: Arc<dyn DocumentCollection>,
    pub connections: Arc<dyn DocumentCollection>,
    /// Bearer token → user id.
    tokens: Arc<HashMap<String, Uuid>>,
    /// Present when backed by PostgreSQL.
    pub db: Option<Database>,
}

impl AppState {
    /// State backed entirely by process memory.
    pub fn in_memory(tokens: HashMap<String, Uuid>, retention: RetentionPolicy) -> Result<Self> {
        let store = Arc::new(MemoryHistoryStore::new());
        Self::assemble(
            Arc::new(MemoryCollection::new(ANNOTATION_COLLECTION)),
            Arc::new(MemoryCollection::new(CONNECTION_COLLECTION)),
            store,
            tokens,
            retention,
            None,
        )
    }

    /// State backed by a (migrated) PostgreSQL database.
    pub fn postgres(
        db: Database,
        tokens: HashMap<String, Uuid>,
        retention: RetentionPolicy,
    ) -> Result<Self> {
        Self::assemble(
            Arc::new(db.collection(ANNOTATION_COLLECTION)),
            Arc::new(db.collection(CONNECTION_COLLECTION)),
            Arc::new(db.history.clone()),
            tokens,
            retention,
            Some(db),
        )
    }

    fn assemble<C, H>(
        annotations: Arc<C>,
        connections: Arc<C>,
        history: Arc<H>,
        tokens: HashMap<String, Uuid>,
        retention: RetentionPolicy,
        db: Option<Database>,
    ) -> Result<Self>
    where
        C: DocumentCollection + 'static,
        H: HistoryRepository + ChangeLedgerRepository + 'static,
    {
        let registry = Arc::new(
            CollectionRegistry::new()
                .with(annotations.clone())?
                .with(connections.clone())?,
        );
        let log = HistoryLog::new(history.clone(), retention);
        let recorder = ActionRecorder::new(registry.clone(), log);
        let engine = UndoRedoEngine::new(history.clone(), history, registry);

        Ok(Self {
            recorder: Arc::new(recorder),
            engine: Arc::new(engine),
            annotations,
            connections,
            tokens: Arc::new(tokens),
            db,
        })
    }

    /// The user a bearer token belongs to.
    pub fn user_for_token(&self, token: &str) -> Option<Uuid> {
        self.tokens.get(token).copied()
    }
}

/// Request id generator producing UUIDv7 values (time-ordered).
#[derive(Clone, Copy, Default)]
pub struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// OpenAPI document served at `/api/v1/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Rewind API",
        description = "Per-user undo/redo history over recorded document changes"
    ),
    paths(
        handlers::system::health_check,
        handlers::history::list_history,
        handlers::history::undo,
        handlers::history::redo,
        handlers::annotations::list_annotations,
        handlers::annotations::get_annotation,
        handlers::annotations::create_annotation,
        handlers::annotations::create_annotations,
        handlers::annotations::update_annotation,
        handlers::annotations::delete_annotation,
        handlers::annotations::delete_annotations,
        handlers::connections::list_connections,
        handlers::connections::get_connection,
        handlers::connections::create_connection,
        handlers::connections::create_connections,
        handlers::connections::update_connection,
        handlers::connections::delete_connection,
        handlers::connections::delete_connections,
    ),
    components(schemas(
        rewind_core::HistoryListing,
        handlers::history::ReplayResponse,
        handlers::annotations::DeleteAnnotationsRequest,
        handlers::connections::DeleteConnectionsRequest,
    )),
    tags(
        (name = "System", description = "Health checks and API metadata"),
        (name = "History", description = "Action history, undo and redo"),
        (name = "Annotations", description = "Recorded annotation writes"),
        (name = "Connections", description = "Recorded connection writes")
    )
)]
pub struct ApiDoc;

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    use handlers::{annotations, connections, history, system};

    Router::new()
        .route("/health", get(system::health_check))
        .route("/api/v1/openapi.json", get(system::openapi_json))
        // History
        .route("/api/v1/history", get(history::list_history))
        .route("/api/v1/history/undo", put(history::undo))
        .route("/api/v1/history/redo", put(history::redo))
        // Annotations
        .route(
            "/api/v1/annotations",
            get(annotations::list_annotations).post(annotations::create_annotation),
        )
        .route(
            "/api/v1/annotations/multiple",
            delete(annotations::delete_annotations).post(annotations::create_annotations),
        )
        .route(
            "/api/v1/annotations/:id",
            get(annotations::get_annotation)
                .put(annotations::update_annotation)
                .delete(annotations::delete_annotation),
        )
        // Connections
        .route(
            "/api/v1/connections",
            get(connections::list_connections).post(connections::create_connection),
        )
        .route(
            "/api/v1/connections/multiple",
            delete(connections::delete_connections).post(connections::create_connections),
        )
        .route(
            "/api/v1/connections/:id",
            get(connections::get_connection)
                .put(connections::update_connection)
                .delete(connections::delete_connection),
        )
        // Middleware
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
                .max_age(std::time::Duration::from_secs(3600)),
        )
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

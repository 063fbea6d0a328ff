use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task;
use tracing::{error, info};
use uuid::Uuid;

use crate::workflow::{
    CancellationRequest, CancellationWorkflow, EngineOptions, FulfillmentConfig, FulfillmentMethod,
    ModuleEffects, WorkflowEngine, WorkflowError, WorkflowStatus, WorkflowStep,
};

use super::config::ServiceConfig;
use super::state::AppState;
use super::sweeper::start_sweeper_thread;
use super::BoxError;

pub async fn run_server(
    config: ServiceConfig,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), BoxError> {
    let config = Arc::new(config);
    let options = EngineOptions {
        warehouse_reply_sla: chrono::Duration::hours(config.warehouse_reply_sla_hours),
        cancel_retry_limit: config.cancel_retry_limit,
        cancel_retry_base_delay: config.cancel_retry_base_delay,
    };
    let engine = Arc::new(WorkflowEngine::new(
        config.workflow_db_path.clone(),
        ModuleEffects,
        options,
    )?);

    let mut sweeper_control = start_sweeper_thread(engine.clone(), config.sweep_interval);

    let state = AppState { engine };

    let host: IpAddr = config
        .host
        .parse()
        .map_err(|_| format!("invalid host: {}", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    info!("cancellation workflow service listening on {}", addr);

    let app = Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/workflows", post(create_workflow))
        .route("/workflows/:id", get(get_workflow))
        .route("/workflows/:id/warehouse-reply", post(warehouse_reply))
        .route("/workflows/:id/approval", post(resolve_approval))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;
    sweeper_control.stop_and_join();
    serve_result?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Read-only projection of a workflow returned over HTTP. Internal columns
/// (eligibility bookkeeping, reconciliation flags, failure reasons) stay off
/// the wire; operators see those through the audit and escalation surfaces.
#[derive(Debug, Serialize)]
pub struct WorkflowView {
    pub id: Uuid,
    pub order_number: String,
    pub customer_email: String,
    pub fulfillment_method: FulfillmentMethod,
    pub status: WorkflowStatus,
    pub step: WorkflowStep,
    pub was_canceled: Option<bool>,
    pub refund_processed: bool,
    pub refund_amount_cents: Option<i64>,
    pub warehouse_reply_received: bool,
    pub warehouse_reply: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<CancellationWorkflow> for WorkflowView {
    fn from(workflow: CancellationWorkflow) -> Self {
        Self {
            id: workflow.id,
            order_number: workflow.order_number,
            customer_email: workflow.customer_email,
            fulfillment_method: workflow.fulfillment_method,
            status: workflow.status,
            step: workflow.step,
            was_canceled: workflow.was_canceled,
            refund_processed: workflow.refund_processed,
            refund_amount_cents: workflow.refund_amount_cents,
            warehouse_reply_received: workflow.warehouse_reply_received,
            warehouse_reply: workflow.warehouse_reply,
            created_at: workflow.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateWorkflowBody {
    order_number: String,
    order_total_cents: i64,
    customer_email: String,
    order_created_at: DateTime<Utc>,
    config: FulfillmentConfig,
}

/// POST /workflows
async fn create_workflow(
    State(state): State<AppState>,
    Json(body): Json<CreateWorkflowBody>,
) -> Response {
    let engine = state.engine.clone();
    let result = task::spawn_blocking(move || {
        let request = CancellationRequest {
            order_number: body.order_number,
            order_total_cents: body.order_total_cents,
            customer_email: body.customer_email,
            order_created_at: body.order_created_at,
        };
        engine.create_workflow(request, body.config, Utc::now())
    })
    .await;
    workflow_response(result, StatusCode::CREATED)
}

/// GET /workflows/:id
async fn get_workflow(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    let engine = state.engine.clone();
    let result = task::spawn_blocking(move || engine.store().load_workflow(id)).await;
    workflow_response(result, StatusCode::OK)
}

#[derive(Debug, Deserialize)]
struct WarehouseReplyBody {
    body: String,
}

/// POST /workflows/:id/warehouse-reply
async fn warehouse_reply(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(reply): Json<WarehouseReplyBody>,
) -> Response {
    let engine = state.engine.clone();
    let result =
        task::spawn_blocking(move || engine.record_warehouse_reply(id, &reply.body, Utc::now()))
            .await;
    workflow_response(result, StatusCode::OK)
}

#[derive(Debug, Deserialize)]
struct ApprovalBody {
    approved: bool,
    reason: Option<String>,
}

/// POST /workflows/:id/approval
async fn resolve_approval(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(decision): Json<ApprovalBody>,
) -> Response {
    let engine = state.engine.clone();
    let result = task::spawn_blocking(move || {
        engine.resolve_approval(id, decision.approved, decision.reason.as_deref(), Utc::now())
    })
    .await;
    workflow_response(result, StatusCode::OK)
}


fn workflow_response(
    result: Result<Result<CancellationWorkflow, WorkflowError>, task::JoinError>,
    success: StatusCode,
) -> Response {
    match result {
        Ok(Ok(workflow)) => (success, Json(WorkflowView::from(workflow))).into_response(),
        Ok(Err(WorkflowError::NotFound(id))) => (
            StatusCode::NOT_FOUND,
            format!("workflow {} not found", id),
        )
            .into_response(),
        Ok(Err(err)) => {
            error!("workflow request failed: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
        Err(err) => {
            error!("workflow task panicked: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
        }
    }
}

use actix_cors::Cors;
use actix_web::{get, post, web, App, HttpResponse, HttpServer, Responder, Result as ActixResult};
use actix_ws::Message;
use chartcore::{FlowError, SpecFlow, Value};
use chartruntime::{registry, FlowRuntime, RuntimeConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
struct AppState {
    runtime: Arc<FlowRuntime>,
}

/// Request body for flow execution
#[derive(Debug, Deserialize)]
struct RunRequest {
    flow: SpecFlow,
    #[serde(default)]
    inputs: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct DescribeRequest {
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidationResponse {
    valid: bool,
    start: String,
    planned_nodes: usize,
    loops: Vec<String>,
}

/// Error response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    kind: &'static str,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<chartcore::RunTrace>,
}

fn error_response(error: FlowError) -> HttpResponse {
    let (kind, node_id, trace) = match &error {
        FlowError::Schema(e) => ("schema", Some(e.node_id().to_string()), None),
        FlowError::Graph(_) => ("graph", None, None),
        FlowError::Execution(e) => ("execution", Some(e.node_id.clone()), Some((*e.trace).clone())),
        FlowError::Registry(_) => ("registry", None, None),
        FlowError::Io(_) | FlowError::Serialization(_) => ("io", None, None),
    };
    let body = ErrorResponse {
        kind,
        error: error.to_string(),
        node_id,
        trace,
    };
    match kind {
        "execution" | "io" | "registry" => HttpResponse::InternalServerError().json(body),
        _ => HttpResponse::UnprocessableEntity().json(body),
    }
}

/// Health check endpoint
#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "flowchart"
    }))
}

/// Catalog of available node types
#[get("/api/nodes")]
async fn list_node_types(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    Ok(HttpResponse::Ok().json(data.runtime.registry().catalog()))
}

/// Migrated data and current handles for one node
#[post("/api/nodes/{node_type}/describe")]
async fn describe_node(
    data: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<DescribeRequest>,
) -> ActixResult<impl Responder> {
    let node_type = path.into_inner();
    Ok(match data.runtime.describe(&node_type, &node_type, &req.data) {
        Ok(view) => HttpResponse::Ok().json(view),
        Err(e) => error_response(e),
    })
}

#[post("/api/flows/validate")]
async fn validate_flow(
    data: web::Data<AppState>,
    flow: web::Json<SpecFlow>,
) -> ActixResult<impl Responder> {
    Ok(match data.runtime.resolve(&flow) {
        Ok(plan) => HttpResponse::Ok().json(ValidationResponse {
            valid: true,
            start: plan.start().to_string(),
            planned_nodes: plan.len(),
            loops: plan.loops().map(str::to_string).collect(),
        }),
        Err(e) => {
            warn!("Flow rejected: {}", e);
            error_response(e)
        }
    })
}

#[post("/api/flows/migrate")]
async fn migrate_flow(
    data: web::Data<AppState>,
    flow: web::Json<SpecFlow>,
) -> ActixResult<impl Responder> {
    Ok(match data.runtime.migrate_flow(&flow) {
        Ok(migrated) => HttpResponse::Ok().json(migrated),
        Err(e) => error_response(e),
    })
}

/// Execute a flow
#[post("/api/flows/run")]
async fn run_flow(
    data: web::Data<AppState>,
    req: web::Json<RunRequest>,
) -> ActixResult<impl Responder> {
    let RunRequest { flow, inputs } = req.into_inner();
    let inputs: HashMap<String, Value> = inputs.into_iter().map(|(k, v)| (k, v.into())).collect();

    info!("Executing flow with {} nodes", flow.nodes.len());

    Ok(match data.runtime.execute(&flow, inputs).await {
        Ok(result) => {
            info!(
                "Flow {} finished in {}ms",
                result.execution_id, result.duration_ms
            );
            HttpResponse::Ok().json(result)
        }
        Err(e) => {
            error!("Flow execution failed: {}", e);
            error_response(e)
        }
    })
}

/// WebSocket endpoint for real-time events
#[get("/api/events")]
async fn websocket_events(
    req: actix_web::HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let (res, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;

    info!("WebSocket client connected");

    let mut events = data.runtime.subscribe_events();

    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            if let Ok(json) = serde_json::to_string(&event) {
                                if session.text(json).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("WebSocket client lagged, {} events dropped", skipped);
                        }
                        Err(_) => break,
                    }
                }

                Some(Ok(msg)) = msg_stream.recv() => {
                    match msg {
                        Message::Ping(bytes) => {
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }

                else => break,
            }
        }

        info!("WebSocket client disconnected");
        let _ = session.close(None).await;
    });

    Ok(res)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("🚀 Starting Flowchart Server");

    let config = match std::env::var("FLOWCHART_CONFIG") {
        Ok(path) => {
            info!("Loading config from {}", path);
            RuntimeConfig::from_file(&path)?
        }
        Err(_) => RuntimeConfig::default(),
    };

    let registry = registry::install_global(chartnodes::standard_registry()?)?;
    let runtime = FlowRuntime::with_registry(registry, config);

    info!(
        "✅ Runtime initialized with {} node types",
        runtime.registry().len()
    );

    let app_state = web::Data::new(AppState {
        runtime: Arc::new(runtime),
    });

    let bind_address =
        std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

    info!("🌐 Server starting on http://{}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .service(health_check)
            .service(list_node_types)
            .service(describe_node)
            .service(validate_flow)
            .service(migrate_flow)
            .service(run_flow)
            .service(websocket_events)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}

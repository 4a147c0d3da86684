// ============================================================================
// Order API - HTTP surface over OrderLifecycle
// ============================================================================
//
// POST  /orders               create
// GET   /orders/health        liveness summary (plain text)
// GET   /orders/{id}          cache-aside read
// GET   /orders               filtered listing (?status=&customerId=)
// PATCH /orders/{id}/status   status transition
//
// ============================================================================

mod dto;
mod error;

use actix_web::{error::JsonPayloadError, web, App, HttpRequest, HttpResponse, HttpServer};

use crate::domain::order::OrderId;
use crate::lifecycle::OrderLifecycle;
use crate::store::OrderFilter;

use dto::{CreateOrderRequest, OrderFilterQuery, UpdateStatusRequest};
use error::ApiError;

pub async fn start_api_server(lifecycle: OrderLifecycle, bind: &str) -> std::io::Result<()> {
    tracing::info!("🌐 Starting order API on http://{}", bind);

    let lifecycle = web::Data::new(lifecycle);
    HttpServer::new(move || App::new().app_data(lifecycle.clone()).configure(configure))
        .bind(bind)?
        .run()
        .await
}

/// Register the order routes. `/orders/health` must precede `/orders/{id}`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(malformed_body))
        .route("/orders", web::post().to(create_order))
        .route("/orders", web::get().to(list_orders))
        .route("/orders/health", web::get().to(health))
        .route("/orders/{id}", web::get().to(get_order))
        .route("/orders/{id}/status", web::patch().to(update_status));
}

fn malformed_body(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::bad_request("malformed_request", err.to_string()).into()
}

async fn create_order(
    lifecycle: web::Data<OrderLifecycle>,
    body: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = body.into_inner();
    let order = lifecycle.create(&request.customer_id, request.items).await?;
    Ok(HttpResponse::Created().json(order))
}

async fn get_order(lifecycle: web::Data<OrderLifecycle>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let id = OrderId::from(path.into_inner());
    let order = lifecycle.get_by_id(&id).await?;
    Ok(HttpResponse::Ok().json(order))
}

async fn list_orders(
    lifecycle: web::Data<OrderLifecycle>,
    query: web::Query<OrderFilterQuery>,
) -> Result<HttpResponse, ApiError> {
    let filter = OrderFilter::try_from(query.into_inner())?;
    let orders = lifecycle.get_filtered(&filter).await?;
    Ok(HttpResponse::Ok().json(orders))
}

async fn update_status(
    lifecycle: web::Data<OrderLifecycle>,
    path: web::Path<String>,
    body: web::Json<UpdateStatusRequest>,
) -> Result<HttpResponse, ApiError> {
    let id = OrderId::from(path.into_inner());
    let order = lifecycle.update_status(&id, &body.status).await?;
    Ok(HttpResponse::Ok().json(order))
}

async fn health(lifecycle: web::Data<OrderLifecycle>) -> HttpResponse {
    let health = lifecycle.health().await;
    HttpResponse::Ok().content_type("text/plain").body(health.summary())
}

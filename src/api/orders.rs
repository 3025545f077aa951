use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::domain::order::{CreateOrder, OrderCommandHandler, OrderId, UpdateOrderStatus};

use super::{ApiError, CurrentUser};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default)]
    pub active_only: bool,
}

/// POST /api/orders
pub async fn create_order(
    user: CurrentUser,
    handler: web::Data<OrderCommandHandler>,
    body: web::Json<CreateOrder>,
) -> Result<HttpResponse, ApiError> {
    let order = handler.create(user.0, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(order))
}

/// GET /api/orders?activeOnly=true|false
pub async fn list_orders(
    user: CurrentUser,
    handler: web::Data<OrderCommandHandler>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    let orders = handler.list(user.0, query.active_only).await?;
    Ok(HttpResponse::Ok().json(orders))
}

/// PUT /api/orders/{id}/status
pub async fn update_status(
    handler: web::Data<OrderCommandHandler>,
    path: web::Path<OrderId>,
    body: web::Json<UpdateOrderStatus>,
) -> Result<HttpResponse, ApiError> {
    let status = body.into_inner().validate()?;
    let order = handler.update_status(path.into_inner(), status).await?;
    Ok(HttpResponse::Ok().json(order))
}

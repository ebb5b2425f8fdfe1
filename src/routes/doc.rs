use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        orders::{OrderList, OrderWithItems},
        payouts::PayoutList,
        pickup::IssuedCode,
        returns::{BatchOutcome, ReturnList},
    },
    models::{Order, OrderItem, Payout, Return, User},
    response::{ApiResponse, Meta},
    routes::{admin, auth, health, orders, params, payouts, pickup, refunds, returns, webhooks},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::register,
        orders::list_orders,
        orders::checkout,
        orders::get_order,
        orders::cancel_order,
        orders::update_item_status,
        pickup::issue_code,
        pickup::verify_code,
        returns::request_return,
        returns::list_returns,
        returns::approve_return,
        returns::reject_return,
        returns::complete_return,
        refunds::run_batch,
        payouts::request_payout,
        payouts::list_payouts,
        payouts::decide_payout,
        admin::list_all_orders,
        admin::override_order_status,
        webhooks::gateway_webhook
    ),
    components(
        schemas(
            User,
            Order,
            OrderItem,
            Return,
            Payout,
            OrderList,
            OrderWithItems,
            ReturnList,
            PayoutList,
            IssuedCode,
            BatchOutcome,
            params::Pagination,
            params::OrderListQuery,
            Meta,
            ApiResponse<Order>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<Return>,
            ApiResponse<ReturnList>,
            ApiResponse<Payout>,
            ApiResponse<BatchOutcome>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Orders", description = "Order and fulfillment endpoints"),
        (name = "Pickup", description = "Pickup code handoff endpoints"),
        (name = "Returns", description = "Return workflow endpoints"),
        (name = "Refunds", description = "Refund batch endpoints"),
        (name = "Payouts", description = "Vendor payout endpoints"),
        (name = "Admin", description = "Admin override endpoints"),
        (name = "Webhooks", description = "Payment gateway callbacks"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}

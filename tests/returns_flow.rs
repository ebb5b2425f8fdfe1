mod common;

use campus_market_api::{
    dto::orders::{CheckoutLine, CheckoutRequest},
    dto::returns::CreateReturnRequest,
    entity::{
        orders::{Column as OrderCol, Entity as Orders},
        products,
    },
    error::AppError,
    middleware::auth::AuthUser,
    models::Role,
    services::{order_service, pickup_service, refund_service, return_service},
    state::AppState,
};
use chrono::{Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

/// Checkout a single unit and walk it through pickup so it is return-eligible.
async fn picked_up_order(
    state: &AppState,
    customer: &AuthUser,
    agent: &AuthUser,
    product_id: Uuid,
) -> anyhow::Result<Uuid> {
    let resp = order_service::checkout(
        state,
        customer,
        CheckoutRequest {
            shipping_address: "Block C".into(),
            items: vec![CheckoutLine {
                product_id,
                quantity: 1,
            }],
        },
    )
    .await?;
    let order_id = resp.data.unwrap().order.id;

    let code = pickup_service::issue_code(state, agent, order_id)
        .await?
        .data
        .unwrap()
        .pickup_code;
    pickup_service::verify_code(state, agent, order_id, &code).await?;
    Ok(order_id)
}

async fn backdate_pickup(state: &AppState, order_id: Uuid, hours: i64) -> anyhow::Result<()> {
    Orders::update_many()
        .col_expr(
            OrderCol::ActualPickupDate,
            Expr::value(sea_orm::prelude::DateTimeWithTimeZone::from(
                Utc::now() - Duration::hours(hours),
            )),
        )
        .filter(OrderCol::Id.eq(order_id))
        .exec(&state.orm)
        .await?;
    Ok(())
}

#[tokio::test]
async fn return_window_and_decisions() -> anyhow::Result<()> {
    let Some((state, _mock)) = common::setup().await? else {
        return Ok(());
    };

    let customer = common::create_user(&state, Role::Customer, "cust@example.com").await?;
    let vendor = common::create_user(&state, Role::Vendor, "vendor@example.com").await?;
    let agent = common::create_user(&state, Role::Agent, "agent@example.com").await?;
    let product = common::create_product(&state, &vendor, "Lamp", 1_000, 5).await?;

    // Not eligible before pickup.
    let resp = order_service::checkout(
        &state,
        &customer,
        CheckoutRequest {
            shipping_address: "Block C".into(),
            items: vec![CheckoutLine {
                product_id: product,
                quantity: 1,
            }],
        },
    )
    .await?;
    let unpicked = resp.data.unwrap().order.id;
    let err = return_service::request_return(
        &state,
        &customer,
        CreateReturnRequest {
            order_id: unpicked,
            product_id: product,
            reason: "Changed my mind".into(),
            refund_amount: 1_000,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotEligible));

    let order_id = picked_up_order(&state, &customer, &agent, product).await?;

    // Refund amount is capped at what was paid for the line.
    let err = return_service::request_return(
        &state,
        &customer,
        CreateReturnRequest {
            order_id,
            product_id: product,
            reason: "Damaged".into(),
            refund_amount: 1_001,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let ret = return_service::request_return(
        &state,
        &customer,
        CreateReturnRequest {
            order_id,
            product_id: product,
            reason: "Damaged".into(),
            refund_amount: 1_000,
        },
    )
    .await?
    .data
    .unwrap();

    let rejected = return_service::reject(&state, &vendor, ret.id, "No visible damage".into())
        .await?
        .data
        .unwrap();
    assert_eq!(rejected.reason, "REJECTED: No visible damage");
    assert_eq!(rejected.refund_status.as_str(), "rejected");
    assert!(rejected.process_date.is_some());

    // The decision is final.
    let err = return_service::approve(&state, &vendor, ret.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyDecided));

    // Past the window the request is refused outright.
    let late_order = picked_up_order(&state, &customer, &agent, product).await?;
    backdate_pickup(&state, late_order, 25).await?;
    let err = return_service::request_return(
        &state,
        &customer,
        CreateReturnRequest {
            order_id: late_order,
            product_id: product,
            reason: "Too late".into(),
            refund_amount: 1_000,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotEligible));

    Ok(())
}

#[tokio::test]
async fn completion_restocks_and_refunds_exactly_once() -> anyhow::Result<()> {
    let Some((state, mock)) = common::setup().await? else {
        return Ok(());
    };

    let customer = common::create_user(&state, Role::Customer, "cust@example.com").await?;
    let vendor = common::create_user(&state, Role::Vendor, "vendor@example.com").await?;
    let agent = common::create_user(&state, Role::Agent, "agent@example.com").await?;
    let product = common::create_product(&state, &vendor, "Lamp", 1_000, 5).await?;

    let order_id = picked_up_order(&state, &customer, &agent, product).await?;
    let ret = return_service::request_return(
        &state,
        &customer,
        CreateReturnRequest {
            order_id,
            product_id: product,
            reason: "Damaged".into(),
            refund_amount: 1_000,
        },
    )
    .await?
    .data
    .unwrap();

    // Completion requires an approval first.
    let err = return_service::complete(&state, &agent, ret.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotApproved));

    return_service::approve(&state, &vendor, ret.id).await?;

    let stock_before = products::Entity::find_by_id(product)
        .one(&state.orm)
        .await?
        .unwrap()
        .stock;

    let completed = return_service::complete(&state, &agent, ret.id)
        .await?
        .data
        .unwrap();
    assert_eq!(completed.status.as_str(), "completed");
    assert_eq!(completed.refund_status.as_str(), "processed");
    assert_eq!(mock.refund_call_count(), 1);

    let stock_after = products::Entity::find_by_id(product)
        .one(&state.orm)
        .await?
        .unwrap()
        .stock;
    assert_eq!(stock_after, stock_before + 1);

    let row = Orders::find_by_id(order_id).one(&state.orm).await?.unwrap();
    assert_eq!(row.payment_status, "refunded");

    // Re-issuing the refund short-circuits without touching the gateway.
    refund_service::issue(&state, ret.id).await?;
    assert_eq!(mock.refund_call_count(), 1);

    Ok(())
}

#[tokio::test]
async fn batch_sweeps_completed_returns_whose_refund_failed() -> anyhow::Result<()> {
    let Some((state, mock)) = common::setup().await? else {
        return Ok(());
    };

    let customer = common::create_user(&state, Role::Customer, "cust@example.com").await?;
    let vendor = common::create_user(&state, Role::Vendor, "vendor@example.com").await?;
    let agent = common::create_user(&state, Role::Agent, "agent@example.com").await?;
    let product = common::create_product(&state, &vendor, "Lamp", 1_000, 5).await?;

    let order_id = picked_up_order(&state, &customer, &agent, product).await?;
    let ret = return_service::request_return(
        &state,
        &customer,
        CreateReturnRequest {
            order_id,
            product_id: product,
            reason: "Damaged".into(),
            refund_amount: 1_000,
        },
    )
    .await?
    .data
    .unwrap();
    return_service::approve(&state, &vendor, ret.id).await?;

    // Gateway declines during completion: the return still settles
    // physically, with the refund left pending.
    let note = format!("return:{}", ret.id);
    mock.fail_refund_with_note(note.clone());
    let completed = return_service::complete(&state, &agent, ret.id)
        .await?
        .data
        .unwrap();
    assert_eq!(completed.status.as_str(), "completed");
    assert_eq!(completed.refund_status.as_str(), "pending");
    assert_eq!(mock.refund_call_count(), 1);

    // The next sweep must retry it even though the return is past approved.
    mock.allow_refund_with_note(&note);
    let outcome = refund_service::issue_batch(&state).await?;
    assert_eq!(outcome.processed, 1);
    assert_eq!(outcome.failed, 0);
    assert_eq!(mock.refund_call_count(), 2);

    let swept = refund_service::issue(&state, ret.id).await?;
    assert_eq!(swept.refund_status.as_str(), "processed");
    assert_eq!(mock.refund_call_count(), 2);

    let row = Orders::find_by_id(order_id).one(&state.orm).await?.unwrap();
    assert_eq!(row.payment_status, "refunded");

    Ok(())
}

#[tokio::test]
async fn batch_survives_individual_refund_failures() -> anyhow::Result<()> {
    let Some((state, mock)) = common::setup().await? else {
        return Ok(());
    };

    let customer = common::create_user(&state, Role::Customer, "cust@example.com").await?;
    let vendor = common::create_user(&state, Role::Vendor, "vendor@example.com").await?;
    let agent = common::create_user(&state, Role::Agent, "agent@example.com").await?;
    let product = common::create_product(&state, &vendor, "Lamp", 1_000, 10).await?;

    let mut return_ids = Vec::new();
    for _ in 0..3 {
        let order_id = picked_up_order(&state, &customer, &agent, product).await?;
        let ret = return_service::request_return(
            &state,
            &customer,
            CreateReturnRequest {
                order_id,
                product_id: product,
                reason: "Damaged".into(),
                refund_amount: 1_000,
            },
        )
        .await?
        .data
        .unwrap();
        return_service::approve(&state, &vendor, ret.id).await?;
        return_ids.push(ret.id);
    }

    mock.fail_refund_with_note(format!("return:{}", return_ids[1]));

    let outcome = refund_service::issue_batch(&state).await?;
    assert_eq!(outcome.processed, 2);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].contains(&return_ids[1].to_string()));
    assert_eq!(mock.refund_call_count(), 3);

    // The next run only retries the failure.
    let retry = refund_service::issue_batch(&state).await?;
    assert_eq!(retry.processed + retry.failed, 1);
    assert_eq!(mock.refund_call_count(), 4);

    Ok(())
}

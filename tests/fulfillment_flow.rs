mod common;

use campus_market_api::{
    dto::orders::{CheckoutLine, CheckoutRequest},
    entity::{orders, products},
    error::AppError,
    models::{ItemStatus, Role},
    services::order_service,
    state::AppState,
};
use sea_orm::EntityTrait;
use uuid::Uuid;

async fn order_row(state: &AppState, id: Uuid) -> anyhow::Result<orders::Model> {
    Ok(orders::Entity::find_by_id(id)
        .one(&state.orm)
        .await?
        .expect("order exists"))
}

async fn product_stock(state: &AppState, id: Uuid) -> anyhow::Result<i32> {
    Ok(products::Entity::find_by_id(id)
        .one(&state.orm)
        .await?
        .expect("product exists")
        .stock)
}

// Happy path from checkout through multi-vendor delivery: the order only
// settles once every item is terminal.
#[tokio::test]
async fn multi_vendor_delivery_aggregates_order_status() -> anyhow::Result<()> {
    let Some((state, _mock)) = common::setup().await? else {
        return Ok(());
    };

    let customer = common::create_user(&state, Role::Customer, "cust@example.com").await?;
    let vendor_a = common::create_user(&state, Role::Vendor, "vendor-a@example.com").await?;
    let vendor_b = common::create_user(&state, Role::Vendor, "vendor-b@example.com").await?;
    common::create_user(&state, Role::Agent, "agent@example.com").await?;

    let prod_a = common::create_product(&state, &vendor_a, "Lamp", 1_000, 5).await?;
    let prod_b = common::create_product(&state, &vendor_b, "Kettle", 2_000, 5).await?;

    let resp = order_service::checkout(
        &state,
        &customer,
        CheckoutRequest {
            shipping_address: "Hall 9".into(),
            items: vec![
                CheckoutLine {
                    product_id: prod_a,
                    quantity: 1,
                },
                CheckoutLine {
                    product_id: prod_b,
                    quantity: 1,
                },
            ],
        },
    )
    .await?;
    let data = resp.data.unwrap();
    let order = data.order;
    assert_eq!(order.total_amount, 3_000);
    assert!(order.agent_id.is_some(), "stub policy assigns an agent");
    let reference = order.payment_reference.clone().expect("charge initialized");

    // Payment webhook completes the charge and decrements stock exactly once.
    order_service::apply_charge_event(&state, order.id, &reference, true).await?;
    assert_eq!(product_stock(&state, prod_a).await?, 4);
    assert_eq!(product_stock(&state, prod_b).await?, 4);
    let row = order_row(&state, order.id).await?;
    assert_eq!(row.payment_status, "completed");
    assert_eq!(row.status, "processing");

    // Replay must be a no-op.
    order_service::apply_charge_event(&state, order.id, &reference, true).await?;
    assert_eq!(product_stock(&state, prod_a).await?, 4);
    assert_eq!(product_stock(&state, prod_b).await?, 4);

    let item_a = data.items.iter().find(|i| i.product_id == prod_a).unwrap();
    let item_b = data.items.iter().find(|i| i.product_id == prod_b).unwrap();

    for status in [ItemStatus::Processing, ItemStatus::Shipped, ItemStatus::Delivered] {
        order_service::update_item_status(&state, &vendor_a, order.id, item_a.id, status).await?;
    }
    // Not every item is terminal yet, so the order is untouched.
    assert_eq!(order_row(&state, order.id).await?.status, "processing");

    for status in [ItemStatus::Processing, ItemStatus::Shipped, ItemStatus::Delivered] {
        order_service::update_item_status(&state, &vendor_b, order.id, item_b.id, status).await?;
    }
    assert_eq!(order_row(&state, order.id).await?.status, "delivered");

    Ok(())
}

#[tokio::test]
async fn mixed_terminal_items_mark_order_partially_fulfilled() -> anyhow::Result<()> {
    let Some((state, _mock)) = common::setup().await? else {
        return Ok(());
    };

    let customer = common::create_user(&state, Role::Customer, "cust@example.com").await?;
    let vendor_a = common::create_user(&state, Role::Vendor, "vendor-a@example.com").await?;
    let vendor_b = common::create_user(&state, Role::Vendor, "vendor-b@example.com").await?;

    let prod_a = common::create_product(&state, &vendor_a, "Lamp", 1_000, 5).await?;
    let prod_b = common::create_product(&state, &vendor_b, "Kettle", 2_000, 5).await?;

    let resp = order_service::checkout(
        &state,
        &customer,
        CheckoutRequest {
            shipping_address: "Hall 9".into(),
            items: vec![
                CheckoutLine {
                    product_id: prod_a,
                    quantity: 1,
                },
                CheckoutLine {
                    product_id: prod_b,
                    quantity: 1,
                },
            ],
        },
    )
    .await?;
    let data = resp.data.unwrap();
    let order = data.order;
    let item_a = data.items.iter().find(|i| i.product_id == prod_a).unwrap();
    let item_b = data.items.iter().find(|i| i.product_id == prod_b).unwrap();

    for status in [ItemStatus::Processing, ItemStatus::Shipped, ItemStatus::Delivered] {
        order_service::update_item_status(&state, &vendor_a, order.id, item_a.id, status).await?;
    }
    order_service::update_item_status(&state, &vendor_b, order.id, item_b.id, ItemStatus::Cancelled)
        .await?;

    assert_eq!(order_row(&state, order.id).await?.status, "partially_fulfilled");

    Ok(())
}

#[tokio::test]
async fn vendor_cannot_touch_foreign_items_and_cancel_window_closes() -> anyhow::Result<()> {
    let Some((state, _mock)) = common::setup().await? else {
        return Ok(());
    };

    let customer = common::create_user(&state, Role::Customer, "cust@example.com").await?;
    let vendor_a = common::create_user(&state, Role::Vendor, "vendor-a@example.com").await?;
    let vendor_b = common::create_user(&state, Role::Vendor, "vendor-b@example.com").await?;
    let prod_a = common::create_product(&state, &vendor_a, "Lamp", 1_000, 5).await?;

    let resp = order_service::checkout(
        &state,
        &customer,
        CheckoutRequest {
            shipping_address: "Hall 9".into(),
            items: vec![CheckoutLine {
                product_id: prod_a,
                quantity: 1,
            }],
        },
    )
    .await?;
    let data = resp.data.unwrap();
    let order = data.order;
    let item = &data.items[0];

    let err = order_service::update_item_status(
        &state,
        &vendor_b,
        order.id,
        item.id,
        ItemStatus::Processing,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    // Still pending: the customer may cancel, and items cascade.
    order_service::cancel_order(&state, &customer, order.id).await?;
    let row = order_row(&state, order.id).await?;
    assert_eq!(row.status, "cancelled");

    // A second cancel finds nothing pending.
    let err = order_service::cancel_order(&state, &customer, order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotCancellable));

    Ok(())
}

//! Centralized authorization policy.
//!
//! Every mutating operation names an [`Action`] carrying the ids of the
//! entity it touches; [`authorize`] declares which (role, ownership) pairs
//! satisfy it. Callers always receive the same `Forbidden` error whether the
//! actor lacks the role or merely does not own the resource, so the outer API
//! leaks nothing about resource existence; the denial detail goes to logs.

use crate::{
    entity::{order_items, order_returns, orders},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Role,
};

#[derive(Debug)]
pub enum Action<'a> {
    PlaceOrder,
    ViewOrder { order: &'a orders::Model },
    CancelOrder { order: &'a orders::Model },
    UpdateOrderItem { item: &'a order_items::Model },
    IssuePickupCode { order: &'a orders::Model },
    VerifyPickupCode { order: &'a orders::Model },
    RequestReturn { order: &'a orders::Model },
    DecideReturn { ret: &'a order_returns::Model },
    CompleteReturn { ret: &'a order_returns::Model },
    RunRefundBatch,
    RequestPayout,
    DecidePayout,
    OverrideOrderStatus,
}

pub fn authorize(actor: &AuthUser, action: Action<'_>) -> AppResult<()> {
    if actor.role == Role::Admin {
        return Ok(());
    }

    let allowed = match &action {
        Action::PlaceOrder => actor.role == Role::Customer,
        Action::ViewOrder { order } => match actor.role {
            Role::Customer => order.customer_id == actor.user_id,
            Role::Agent => order.agent_id == Some(actor.user_id),
            _ => false,
        },
        Action::CancelOrder { order } | Action::RequestReturn { order } => {
            actor.role == Role::Customer && order.customer_id == actor.user_id
        }
        Action::UpdateOrderItem { item } => {
            actor.role == Role::Vendor && item.vendor_id == actor.user_id
        }
        Action::IssuePickupCode { order } | Action::VerifyPickupCode { order } => {
            actor.role == Role::Agent && order.agent_id == Some(actor.user_id)
        }
        Action::DecideReturn { ret } => {
            actor.role == Role::Vendor && ret.vendor_id == actor.user_id
        }
        Action::CompleteReturn { ret } => {
            actor.role == Role::Agent && ret.agent_id == Some(actor.user_id)
        }
        Action::RequestPayout => actor.role == Role::Vendor,
        Action::RunRefundBatch | Action::DecidePayout | Action::OverrideOrderStatus => false,
    };

    if allowed {
        Ok(())
    } else {
        tracing::debug!(actor = %actor.user_id, role = %actor.role, ?action, "authorization denied");
        Err(AppError::Forbidden)
    }
}

pub fn ensure_admin(actor: &AuthUser) -> AppResult<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn user(role: Role) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            role,
        }
    }

    fn order_for(customer_id: Uuid, agent_id: Option<Uuid>) -> orders::Model {
        orders::Model {
            id: Uuid::new_v4(),
            customer_id,
            agent_id,
            total_amount: 1000,
            shipping_address: "Dorm 4".into(),
            status: "pending".into(),
            payment_status: "pending".into(),
            pickup_status: "awaiting_assignment".into(),
            pickup_code: None,
            actual_pickup_date: None,
            payment_reference: None,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    fn item_for(vendor_id: Uuid) -> order_items::Model {
        order_items::Model {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            vendor_id,
            quantity: 1,
            price: 1000,
            status: "pending".into(),
            created_at: Utc::now().into(),
        }
    }

    #[test]
    fn admin_passes_everything() {
        let admin = user(Role::Admin);
        let order = order_for(Uuid::new_v4(), None);
        assert!(authorize(&admin, Action::CancelOrder { order: &order }).is_ok());
        assert!(authorize(&admin, Action::RunRefundBatch).is_ok());
        assert!(authorize(&admin, Action::OverrideOrderStatus).is_ok());
    }

    #[test]
    fn customer_owns_cancellation() {
        let customer = user(Role::Customer);
        let own = order_for(customer.user_id, None);
        let other = order_for(Uuid::new_v4(), None);
        assert!(authorize(&customer, Action::CancelOrder { order: &own }).is_ok());
        assert!(matches!(
            authorize(&customer, Action::CancelOrder { order: &other }),
            Err(AppError::Forbidden)
        ));
    }

    #[test]
    fn vendor_limited_to_own_items() {
        let vendor = user(Role::Vendor);
        let own = item_for(vendor.user_id);
        let foreign = item_for(Uuid::new_v4());
        assert!(authorize(&vendor, Action::UpdateOrderItem { item: &own }).is_ok());
        assert!(matches!(
            authorize(&vendor, Action::UpdateOrderItem { item: &foreign }),
            Err(AppError::Forbidden)
        ));
    }

    #[test]
    fn agent_limited_to_assigned_orders() {
        let agent = user(Role::Agent);
        let assigned = order_for(Uuid::new_v4(), Some(agent.user_id));
        let unassigned = order_for(Uuid::new_v4(), None);
        assert!(authorize(&agent, Action::VerifyPickupCode { order: &assigned }).is_ok());
        assert!(matches!(
            authorize(&agent, Action::VerifyPickupCode { order: &unassigned }),
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            authorize(&agent, Action::RunRefundBatch),
            Err(AppError::Forbidden)
        ));
    }
}

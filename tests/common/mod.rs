use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use campus_market_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    entity::{products::ActiveModel as ProductActive, users::ActiveModel as UserActive},
    error::{AppError, AppResult},
    gateway::{ChargeInit, ChargeRequest, ChargeStatus, PaymentGateway, RefundReceipt, RefundRequest},
    middleware::auth::AuthUser,
    models::Role,
    state::AppState,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set, Statement};
use uuid::Uuid;

/// Gateway double that records refund traffic and can be told to decline
/// specific refunds (matched on the merchant note).
#[derive(Default)]
pub struct MockGateway {
    refund_calls: AtomicU32,
    failing_notes: Mutex<HashSet<String>>,
}

impl MockGateway {
    pub fn refund_call_count(&self) -> u32 {
        self.refund_calls.load(Ordering::SeqCst)
    }

    pub fn fail_refund_with_note(&self, merchant_note: impl Into<String>) {
        self.failing_notes
            .lock()
            .unwrap()
            .insert(merchant_note.into());
    }

    pub fn allow_refund_with_note(&self, merchant_note: &str) {
        self.failing_notes.lock().unwrap().remove(merchant_note);
    }
}

#[async_trait::async_trait]
impl PaymentGateway for MockGateway {
    async fn initialize_charge(&self, req: &ChargeRequest) -> AppResult<ChargeInit> {
        Ok(ChargeInit {
            reference: format!("ref-{}", req.metadata.order_id),
            authorization_url: Some("https://pay.example/authorize".into()),
        })
    }

    async fn verify_charge(&self, reference: &str) -> AppResult<ChargeStatus> {
        Ok(ChargeStatus {
            reference: reference.to_string(),
            status: "success".into(),
            amount: 0,
        })
    }

    async fn create_refund(&self, req: &RefundRequest) -> AppResult<RefundReceipt> {
        self.refund_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_notes.lock().unwrap().contains(&req.merchant_note) {
            return Err(AppError::Gateway("mock refund declined".into()));
        }
        Ok(RefundReceipt {
            reference: format!("rfd-{}", req.transaction),
            status: "processed".into(),
        })
    }
}

/// Connect to the test database, or None so the caller can skip when no
/// database is configured in the environment.
pub async fn setup() -> anyhow::Result<Option<(AppState, Arc<MockGateway>)>> {
    let database_url =
        match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
            Ok(url) => url,
            Err(_) => {
                eprintln!(
                    "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
                );
                return Ok(None);
            }
        };

    let pool = create_pool(&database_url).await?;
    let orm = create_orm_conn(&database_url).await?;
    run_migrations(&orm).await?;

    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE order_items, order_returns, payouts, orders, audit_logs, products, users RESTART IDENTITY CASCADE",
    ))
    .await?;

    let mock = Arc::new(MockGateway::default());
    let state = AppState {
        pool,
        orm,
        gateway: mock.clone(),
        webhook_secret: "test-secret".into(),
    };
    Ok(Some((state, mock)))
}

pub async fn create_user(state: &AppState, role: Role, email: &str) -> anyhow::Result<AuthUser> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set("dummy".into()),
        role: Set(role.as_str().into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(AuthUser {
        user_id: user.id,
        role,
    })
}

pub async fn create_product(
    state: &AppState,
    vendor: &AuthUser,
    name: &str,
    price: i64,
    stock: i32,
) -> anyhow::Result<Uuid> {
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        vendor_id: Set(vendor.user_id),
        name: Set(name.to_string()),
        description: Set(None),
        price: Set(price),
        stock: Set(stock),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(product.id)
}

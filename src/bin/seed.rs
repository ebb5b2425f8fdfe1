use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use campus_market_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;

    let pool = create_pool(&config.database_url).await?;

    let admin = ensure_user(&pool, "admin@campus.example", "admin123", "admin").await?;
    let customer = ensure_user(&pool, "customer@campus.example", "customer123", "customer").await?;
    let vendor = ensure_user(&pool, "vendor@campus.example", "vendor123", "vendor").await?;
    let agent = ensure_user(&pool, "agent@campus.example", "agent123", "agent").await?;
    seed_products(&pool, vendor).await?;

    println!("Seed completed. admin={admin} customer={customer} vendor={vendor} agent={agent}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let row: (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, role)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}

async fn seed_products(pool: &sqlx::PgPool, vendor_id: Uuid) -> anyhow::Result<()> {
    let existing: (i64,) = sqlx::query_as("SELECT count(*) FROM products WHERE vendor_id = $1")
        .bind(vendor_id)
        .fetch_one(pool)
        .await?;
    if existing.0 > 0 {
        return Ok(());
    }

    for (name, price, stock) in [
        ("Used calculus textbook", 4_500i64, 3i32),
        ("Desk lamp", 2_000, 10),
        ("Mini fridge", 15_000, 2),
    ] {
        sqlx::query(
            "INSERT INTO products (id, vendor_id, name, price, stock) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(vendor_id)
        .bind(name)
        .bind(price)
        .bind(stock)
        .execute(pool)
        .await?;
    }

    Ok(())
}

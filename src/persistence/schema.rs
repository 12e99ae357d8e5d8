//! Table definitions and bootstrap.

use sqlx::PgPool;

const CREATE_COMMODITY: &str = r#"
CREATE TABLE IF NOT EXISTS commodity (
    id          BIGSERIAL PRIMARY KEY,
    name        TEXT NOT NULL,
    price       NUMERIC(20, 2) NOT NULL DEFAULT 0,
    stock       BIGINT NOT NULL DEFAULT 0 CHECK (stock >= 0),
    status      BOOLEAN NOT NULL DEFAULT TRUE,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const CREATE_ORDERS: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    id           BIGSERIAL PRIMARY KEY,
    user_id      BIGINT NOT NULL,
    commodity_id BIGINT NOT NULL,
    quantity     BIGINT NOT NULL CHECK (quantity > 0),
    total_price  TEXT NOT NULL,
    address      TEXT NOT NULL DEFAULT '',
    status       TEXT NOT NULL DEFAULT 'pending',
    created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at   TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const CREATE_ORDERS_USER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_orders_user_id ON orders (user_id)";

const CREATE_USERS: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    uid         BIGSERIAL PRIMARY KEY,
    account     TEXT NOT NULL UNIQUE,
    password    TEXT NOT NULL,
    name        TEXT NOT NULL DEFAULT '',
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const CREATE_CARTS: &str = r#"
CREATE TABLE IF NOT EXISTS carts (
    id           BIGSERIAL PRIMARY KEY,
    user_id      BIGINT NOT NULL,
    commodity_id BIGINT NOT NULL,
    quantity     BIGINT NOT NULL CHECK (quantity > 0),
    created_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at   TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (user_id, commodity_id)
)
"#;

/// Create all tables if they do not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for ddl in [
        CREATE_COMMODITY,
        CREATE_ORDERS,
        CREATE_ORDERS_USER_INDEX,
        CREATE_USERS,
        CREATE_CARTS,
    ] {
        sqlx::query(ddl).execute(pool).await?;
    }
    tracing::info!("database schema ensured");
    Ok(())
}

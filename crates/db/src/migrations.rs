/// Inline SQL migrations for the record store.
///
/// Applied in order, once each, tracked in `_migrations`.

pub const MIGRATIONS: &[&str] = &[
    // Migration 1: customers
    r#"
CREATE TABLE IF NOT EXISTS customers (
    id          INTEGER PRIMARY KEY,
    email       TEXT NOT NULL UNIQUE,
    first_name  TEXT NOT NULL,
    last_name   TEXT NOT NULL,
    city        TEXT NOT NULL DEFAULT '',
    created_at  INTEGER NOT NULL
);
"#,
    // Migration 2: products
    r#"
CREATE TABLE IF NOT EXISTS products (
    id           INTEGER PRIMARY KEY,
    sku          TEXT NOT NULL UNIQUE,
    name         TEXT NOT NULL,
    price_cents  INTEGER NOT NULL CHECK (price_cents >= 0),
    quantity     INTEGER NOT NULL CHECK (quantity >= 0),
    created_at   INTEGER NOT NULL
);
"#,
    // Migration 3: orders + lines
    r#"
CREATE TABLE IF NOT EXISTS orders (
    id           INTEGER PRIMARY KEY,
    order_ref    TEXT NOT NULL UNIQUE,
    customer_id  INTEGER NOT NULL REFERENCES customers(id),
    created_at   INTEGER NOT NULL
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS order_lines (
    id                INTEGER PRIMARY KEY,
    order_id          INTEGER NOT NULL REFERENCES orders(id),
    product_id        INTEGER NOT NULL REFERENCES products(id),
    quantity          INTEGER NOT NULL CHECK (quantity > 0),
    unit_price_cents  INTEGER NOT NULL
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_order_lines_order ON order_lines(order_id);"#,
];

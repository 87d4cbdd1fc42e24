//! Sample tables and data: users, products, orders, and order items.

use chrono::{Duration, Utc};
use dbagent_types::Result;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::db_error;

const CREATE_TABLES: [&str; 4] = [
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        name VARCHAR(100) NOT NULL,
        email VARCHAR(255) NOT NULL UNIQUE,
        age INTEGER,
        is_active BOOLEAN DEFAULT 1,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE TABLE IF NOT EXISTS products (
        id INTEGER PRIMARY KEY,
        name VARCHAR(200) NOT NULL,
        description TEXT,
        price FLOAT NOT NULL,
        category VARCHAR(100),
        in_stock BOOLEAN DEFAULT 1,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE TABLE IF NOT EXISTS orders (
        id INTEGER PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES users(id),
        total_amount FLOAT NOT NULL,
        status VARCHAR(50) DEFAULT 'pending',
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE TABLE IF NOT EXISTS order_items (
        id INTEGER PRIMARY KEY,
        order_id INTEGER NOT NULL REFERENCES orders(id),
        product_id INTEGER NOT NULL REFERENCES products(id),
        quantity INTEGER NOT NULL,
        price_per_item FLOAT NOT NULL
    )",
];

const USERS: [(&str, &str, i64); 5] = [
    ("John Doe", "john@example.com", 30),
    ("Jane Smith", "jane@example.com", 25),
    ("Bob Johnson", "bob@example.com", 35),
    ("Alice Wilson", "alice@example.com", 28),
    ("Charlie Brown", "charlie@example.com", 42),
];

const PRODUCTS: [(&str, &str, f64, &str); 8] = [
    ("Laptop", "High-performance laptop", 999.99, "Electronics"),
    ("Smartphone", "Latest smartphone", 699.99, "Electronics"),
    ("Coffee Mug", "Ceramic coffee mug", 12.99, "Kitchen"),
    ("Desk Chair", "Ergonomic office chair", 199.99, "Furniture"),
    ("Book", "Programming guide", 29.99, "Books"),
    ("Headphones", "Noise-cancelling headphones", 149.99, "Electronics"),
    ("Water Bottle", "Stainless steel water bottle", 19.99, "Kitchen"),
    ("Backpack", "Travel backpack", 79.99, "Travel"),
];

/// `(user index, status, days ago)`.
const ORDERS: [(usize, &str, i64); 7] = [
    (0, "completed", 5),
    (1, "completed", 3),
    (0, "pending", 1),
    (2, "completed", 7),
    (3, "completed", 2),
    (1, "cancelled", 10),
    (4, "pending", 0),
];

/// `(order index, product index, quantity)`. Every order has one to three lines.
const ORDER_ITEMS: [(usize, usize, i64); 14] = [
    (0, 0, 1),
    (0, 2, 2),
    (1, 1, 1),
    (2, 4, 2),
    (2, 6, 1),
    (2, 2, 1),
    (3, 3, 1),
    (4, 5, 2),
    (4, 7, 1),
    (5, 0, 1),
    (5, 4, 1),
    (5, 6, 2),
    (6, 3, 2),
    (6, 2, 1),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub users: usize,
    pub products: usize,
    pub orders: usize,
    pub order_items: usize,
    /// Data was already present and nothing was inserted.
    pub skipped: bool,
}

impl std::fmt::Display for SeedReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.skipped {
            return f.write_str("Sample data already exists. Skipping seed.");
        }
        write!(
            f,
            "Created {} users, {} products, {} orders ({} order items)",
            self.users, self.products, self.orders, self.order_items
        )
    }
}

pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    for statement in CREATE_TABLES {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(db_error)?;
    }
    Ok(())
}

/// Insert the sample rows in one transaction. Does nothing when the users
/// table already has rows.
pub async fn create_sample_data(pool: &SqlitePool) -> Result<SeedReport> {
    create_tables(pool).await?;

    let existing: i64 = sqlx::query("SELECT COUNT(*) AS n FROM users")
        .fetch_one(pool)
        .await
        .map_err(db_error)?
        .try_get("n")
        .map_err(db_error)?;
    if existing > 0 {
        tracing::info!(existing, "Sample data already present");
        return Ok(SeedReport {
            skipped: true,
            ..SeedReport::default()
        });
    }

    let mut tx = pool.begin().await.map_err(db_error)?;

    let mut user_ids = Vec::with_capacity(USERS.len());
    for (name, email, age) in USERS {
        let done = sqlx::query("INSERT INTO users (name, email, age) VALUES (?, ?, ?)")
            .bind(name)
            .bind(email)
            .bind(age)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        user_ids.push(done.last_insert_rowid());
    }

    let mut product_ids = Vec::with_capacity(PRODUCTS.len());
    for (name, description, price, category) in PRODUCTS {
        let done = sqlx::query(
            "INSERT INTO products (name, description, price, category) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(description)
        .bind(price)
        .bind(category)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;
        product_ids.push(done.last_insert_rowid());
    }

    let now = Utc::now();
    let mut order_ids = Vec::with_capacity(ORDERS.len());
    for (order_index, (user, status, days_ago)) in ORDERS.into_iter().enumerate() {
        let total: f64 = ORDER_ITEMS
            .iter()
            .filter(|(o, _, _)| *o == order_index)
            .map(|(_, p, qty)| PRODUCTS[*p].2 * *qty as f64)
            .sum();
        let created_at = (now - Duration::days(days_ago))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        let done = sqlx::query(
            "INSERT INTO orders (user_id, total_amount, status, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_ids[user])
        .bind((total * 100.0).round() / 100.0)
        .bind(status)
        .bind(created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;
        order_ids.push(done.last_insert_rowid());
    }

    for (order, product, quantity) in ORDER_ITEMS {
        sqlx::query(
            "INSERT INTO order_items (order_id, product_id, quantity, price_per_item)
             VALUES (?, ?, ?, ?)",
        )
        .bind(order_ids[order])
        .bind(product_ids[product])
        .bind(quantity)
        .bind(PRODUCTS[product].2)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;
    }

    tx.commit().await.map_err(db_error)?;

    let report = SeedReport {
        users: USERS.len(),
        products: PRODUCTS.len(),
        orders: ORDERS.len(),
        order_items: ORDER_ITEMS.len(),
        skipped: false,
    };
    tracing::info!(%report, "Sample data created");
    Ok(report)
}

/// Delete every row, children before parents.
pub async fn clear_all_data(pool: &SqlitePool) -> Result<()> {
    create_tables(pool).await?;
    let mut tx = pool.begin().await.map_err(db_error)?;
    for table in ["order_items", "orders", "products", "users"] {
        sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
    }
    tx.commit().await.map_err(db_error)?;
    tracing::info!("All data cleared");
    Ok(())
}

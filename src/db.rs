use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

use crate::config::BlogConfig;
use crate::error::Result;
use crate::models::user::{NewUser, User};
use crate::security::auth;

pub type DbPool = Pool<SqliteConnectionManager>;

pub fn init_pool(config: &BlogConfig) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(&config.database_path)
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys=ON;"));
    let pool = Pool::builder().max_size(config.pool_size.max(1)).build(manager)?;

    // WAL is persistent per database file, one connection is enough
    let conn = pool.get()?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;

    Ok(pool)
}

pub fn run_migrations(pool: &DbPool) -> Result<()> {
    let conn = pool.get()?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            username TEXT UNIQUE NOT NULL,
            email TEXT UNIQUE NOT NULL,
            full_name TEXT,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'user',
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            created_at DATETIME NOT NULL,
            expires_at DATETIME NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS posts (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            slug TEXT UNIQUE NOT NULL,
            excerpt TEXT,
            content TEXT NOT NULL DEFAULT '',
            cover_image TEXT,
            published INTEGER NOT NULL DEFAULT 0,
            published_at DATETIME,
            read_time INTEGER NOT NULL DEFAULT 1,
            view_count INTEGER NOT NULL DEFAULT 0,
            author_id INTEGER,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE SET NULL
        );

        CREATE INDEX IF NOT EXISTS idx_posts_published ON posts(published, published_at);

        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT UNIQUE NOT NULL,
            description TEXT,
            color TEXT,
            icon TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS tags (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT UNIQUE NOT NULL,
            description TEXT,
            color TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS post_categories (
            post_id INTEGER NOT NULL,
            category_id INTEGER NOT NULL,
            PRIMARY KEY (post_id, category_id),
            FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
            FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS post_tags (
            post_id INTEGER NOT NULL,
            tag_id INTEGER NOT NULL,
            PRIMARY KEY (post_id, tag_id),
            FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
            FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS comments (
            id INTEGER PRIMARY KEY,
            post_id INTEGER NOT NULL,
            author_name TEXT NOT NULL,
            author_email TEXT,
            body TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS notifications (
            id INTEGER PRIMARY KEY,
            kind TEXT NOT NULL,
            message TEXT NOT NULL,
            link TEXT,
            is_read INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT
        );

        -- One counter row per (path, day)
        CREATE TABLE IF NOT EXISTS page_views (
            id INTEGER PRIMARY KEY,
            page_path TEXT NOT NULL,
            date DATE NOT NULL,
            view_count INTEGER NOT NULL DEFAULT 0,
            UNIQUE(page_path, date)
        );

        CREATE INDEX IF NOT EXISTS idx_views_date ON page_views(date);
        ",
    )?;

    Ok(())
}

pub fn seed_defaults(pool: &DbPool) -> Result<()> {
    let conn = pool.get()?;

    let defaults = [
        ("site_name", "Quillpost"),
        ("site_url", "http://localhost:8000"),
        ("admin_email", ""),
        ("mail_from", ""),
        ("smtp_host", ""),
        ("smtp_port", "587"),
        ("smtp_username", ""),
        ("smtp_password", ""),
        // manual | auto
        ("comments_moderation", "manual"),
        ("comments_enabled", "true"),
    ];

    for (key, value) in defaults {
        conn.execute(
            "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
    }

    Ok(())
}

/// Create the configured bootstrap admin when no user exists yet.
pub fn ensure_admin(pool: &DbPool, config: &BlogConfig) -> Result<()> {
    if User::count(pool)? > 0 {
        return Ok(());
    }

    let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) else {
        log::warn!("No users exist and no bootstrap admin is configured; admin API is unreachable");
        return Ok(());
    };

    let email = config
        .admin_email
        .clone()
        .unwrap_or_else(|| format!("{}@localhost", username));
    let hash = auth::hash_password(password)?;
    User::create(
        pool,
        &NewUser {
            username: username.clone(),
            email,
            full_name: None,
            password_hash: hash,
            role: "admin".to_string(),
        },
    )?;
    log::info!("Created bootstrap admin '{}'", username);
    Ok(())
}

use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // One row per deduplicated document. `position` preserves corpus order,
    // which is the retrieval tie-break downstream.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            url TEXT PRIMARY KEY,
            position INTEGER NOT NULL,
            url_key TEXT,
            title TEXT,
            meta_description TEXT,
            body_text TEXT NOT NULL,
            depth INTEGER NOT NULL DEFAULT 0,
            last_crawled TEXT,
            out_links_json TEXT NOT NULL DEFAULT '[]',
            anchor_texts_json TEXT NOT NULL DEFAULT '[]'
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Provenance of each ingest run.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ingest_runs (
            id TEXT PRIMARY KEY,
            started_at TEXT NOT NULL,
            files TEXT NOT NULL,
            input_rows INTEGER NOT NULL,
            unique_documents INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_position ON documents(position)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_url_key ON documents(url_key)")
        .execute(&pool)
        .await?;

    pool.close().await;
    Ok(())
}

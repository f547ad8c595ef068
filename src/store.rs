//! Corpus persistence in SQLite.
//!
//! The table always holds the output of one [`corpus::load`](crate::corpus::load)
//! run; writes replace the whole table inside a transaction so readers never
//! observe a half-merged corpus.

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};

use crate::corpus::{url_key, Corpus};
use crate::models::{format_timestamp, parse_timestamp, Document};

const SELECT_DOCUMENT: &str = "SELECT url, title, meta_description, body_text, depth, last_crawled, out_links_json, anchor_texts_json FROM documents";

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document> {
    let url: String = row.get("url");
    let out_links_json: String = row.get("out_links_json");
    let anchor_texts_json: String = row.get("anchor_texts_json");
    let last_crawled: Option<String> = row.get("last_crawled");
    let depth: i64 = row.get("depth");

    Ok(Document {
        out_links: serde_json::from_str(&out_links_json)
            .with_context(|| format!("corrupt out_links for {}", url))?,
        anchor_texts: serde_json::from_str(&anchor_texts_json)
            .with_context(|| format!("corrupt anchor_texts for {}", url))?,
        title: row.get("title"),
        meta_description: row.get("meta_description"),
        body_text: row.get("body_text"),
        depth: depth.max(0) as u32,
        last_crawled: last_crawled.as_deref().and_then(parse_timestamp),
        url,
    })
}

/// Read the stored corpus in its stored order.
pub async fn load_corpus(pool: &SqlitePool) -> Result<Corpus> {
    let rows = sqlx::query(&format!("{} ORDER BY position ASC", SELECT_DOCUMENT))
        .fetch_all(pool)
        .await?;
    let docs = rows
        .iter()
        .map(row_to_document)
        .collect::<Result<Vec<_>>>()?;
    Ok(Corpus::from_loaded(docs))
}

/// Fetch one stored document by exact URL.
pub async fn find_document(pool: &SqlitePool, url: &str) -> Result<Option<Document>> {
    let row = sqlx::query(&format!("{} WHERE url = ?", SELECT_DOCUMENT))
        .bind(url)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(row_to_document).transpose()
}

pub async fn count_documents(pool: &SqlitePool) -> Result<i64> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
        .fetch_one(pool)
        .await?;
    Ok(n)
}

/// Replace the stored corpus with `corpus`, atomically.
pub async fn replace_corpus(pool: &SqlitePool, corpus: &Corpus) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM documents").execute(&mut *tx).await?;

    for (position, doc) in corpus.documents().iter().enumerate() {
        let key = url_key(&doc.url).map(|(host, dir, slug)| format!("{}|{}|{}", host, dir, slug));
        sqlx::query(
            r#"
            INSERT INTO documents (url, position, url_key, title, meta_description, body_text, depth, last_crawled, out_links_json, anchor_texts_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.url)
        .bind(position as i64)
        .bind(key)
        .bind(&doc.title)
        .bind(&doc.meta_description)
        .bind(&doc.body_text)
        .bind(doc.depth as i64)
        .bind(doc.last_crawled.as_ref().map(format_timestamp))
        .bind(serde_json::to_string(&doc.out_links)?)
        .bind(serde_json::to_string(&doc.anchor_texts)?)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Record one ingest run.
pub async fn record_ingest_run(
    pool: &SqlitePool,
    files: &[String],
    input_rows: usize,
    unique_documents: usize,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO ingest_runs (id, started_at, files, input_rows, unique_documents) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(serde_json::to_string(files)?)
    .bind(input_rows as i64)
    .bind(unique_documents as i64)
    .execute(pool)
    .await?;
    Ok(())
}

/// Most recent ingest time, if any run was recorded.
pub async fn last_ingest_at(pool: &SqlitePool) -> Result<Option<String>> {
    let ts: Option<String> =
        sqlx::query_scalar("SELECT started_at FROM ingest_runs ORDER BY started_at DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;
    Ok(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::corpus::load;
    use crate::db;
    use crate::migrate;
    use crate::models::CorpusRow;
    use tempfile::TempDir;

    fn row(url: &str, crawled: &str) -> CorpusRow {
        CorpusRow {
            url: Some(url.into()),
            title: Some("T".into()),
            meta_description: None,
            body_text: Some(format!("body of {}", url)),
            depth: Some("2".into()),
            last_crawled: Some(crawled.into()),
            out_links: Some("['https://x.com/a', 'https://x.com/b']".into()),
            anchor_texts: Some("['A']".into()),
        }
    }

    #[tokio::test]
    async fn test_replace_then_load_preserves_order_and_fields() {
        let tmp = TempDir::new().unwrap();
        let config = Config::rooted_at(tmp.path());
        migrate::run_migrations(&config).await.unwrap();
        let pool = db::connect(&config).await.unwrap();

        let (corpus, _) = load(vec![
            row("https://b.com/2", "2024-01-02"),
            row("https://a.com/1", "2024-01-01"),
        ]);
        replace_corpus(&pool, &corpus).await.unwrap();

        let stored = load_corpus(&pool).await.unwrap();
        assert_eq!(stored, corpus);
        assert_eq!(count_documents(&pool).await.unwrap(), 2);

        let doc = find_document(&pool, "https://b.com/2").await.unwrap().unwrap();
        assert_eq!(doc.depth, 2);
        assert_eq!(doc.anchor_texts, vec!["A".to_string(), String::new()]);
        assert!(find_document(&pool, "https://nope.com/").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_discards_previous_rows() {
        let tmp = TempDir::new().unwrap();
        let config = Config::rooted_at(tmp.path());
        migrate::run_migrations(&config).await.unwrap();
        let pool = db::connect(&config).await.unwrap();

        let (first, _) = load(vec![row("https://a.com/1", "2024-01-01")]);
        replace_corpus(&pool, &first).await.unwrap();
        let (second, _) = load(vec![row("https://c.com/3", "2024-01-01")]);
        replace_corpus(&pool, &second).await.unwrap();

        let stored = load_corpus(&pool).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored.documents()[0].url, "https://c.com/3");
    }
}

//! SQLite-backed document store for users and articles.
//!
//! A single connection sits behind an async mutex; every operation takes the
//! lock, runs one short statement (or one transaction) and releases it.
//! List-valued fields (`likes`, `relevant_stocks`, …) are stored as JSON
//! text columns so records round-trip without join tables.

use crate::error::StockscanError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id               TEXT PRIMARY KEY,
    email            TEXT NOT NULL UNIQUE,
    discord_id       TEXT NOT NULL UNIQUE,
    likes            TEXT NOT NULL DEFAULT '[]',
    read_more_clicks TEXT NOT NULL DEFAULT '[]',
    created_at       TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS articles (
    seq              INTEGER PRIMARY KEY AUTOINCREMENT,
    id               TEXT NOT NULL UNIQUE,
    ticker           TEXT NOT NULL,
    title            TEXT NOT NULL,
    author           TEXT NOT NULL,
    published_utc    TEXT NOT NULL,
    article_url      TEXT NOT NULL,
    image_url        TEXT,
    description      TEXT NOT NULL,
    article_text     TEXT NOT NULL,
    ai_summary       TEXT,
    relevant_stocks  TEXT NOT NULL DEFAULT '[]'
);
CREATE INDEX IF NOT EXISTS idx_articles_ticker ON articles(ticker);
";

// ── Records ──────────────────────────────────────────────────────────────

/// A stored user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub discord_id: String,
    /// Ids of liked articles.
    pub likes: Vec<String>,
    /// Ids of articles whose "read more" link was clicked.
    pub read_more_clicks: Vec<String>,
}

/// Body of a create-user request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub discord_id: String,
}

/// A stored article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub ticker: String,
    pub title: String,
    pub author: String,
    pub published_utc: DateTime<Utc>,
    pub article_url: String,
    pub image_url: Option<String>,
    pub description: String,
    pub article_text: String,
    pub ai_summary: Option<String>,
    pub relevant_stocks: Vec<String>,
}

/// Body of a create-article request, and the unit of news ingestion.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewArticle {
    #[serde(default)]
    pub ticker: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    pub published_utc: Option<DateTime<Utc>>,
    #[serde(default)]
    pub article_url: String,
    pub image_url: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub article_text: String,
    pub ai_summary: Option<String>,
    #[serde(default)]
    pub relevant_stocks: Vec<String>,
}

impl NewUser {
    fn validate(&self) -> Result<(), StockscanError> {
        require("user", "email", &self.email)?;
        require("user", "discordId", &self.discord_id)
    }
}

impl NewArticle {
    fn validate(self) -> Result<Article, StockscanError> {
        require("article", "ticker", &self.ticker)?;
        require("article", "title", &self.title)?;
        require("article", "author", &self.author)?;
        require("article", "article_url", &self.article_url)?;
        require("article", "description", &self.description)?;
        require("article", "article_text", &self.article_text)?;
        let published_utc = self.published_utc.ok_or(StockscanError::InvalidRecord {
            record: "article",
            field: "published_utc",
        })?;

        Ok(Article {
            id: Uuid::new_v4().to_string(),
            ticker: self.ticker,
            title: self.title,
            author: self.author,
            published_utc,
            article_url: self.article_url,
            image_url: self.image_url,
            description: self.description,
            article_text: self.article_text,
            ai_summary: self.ai_summary,
            relevant_stocks: self.relevant_stocks,
        })
    }
}

fn require(record: &'static str, field: &'static str, value: &str) -> Result<(), StockscanError> {
    if value.trim().is_empty() {
        Err(StockscanError::InvalidRecord { record, field })
    } else {
        Ok(())
    }
}

// ── Store ────────────────────────────────────────────────────────────────

/// Document store over a single SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create or open a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StockscanError> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;
        info!("Document store opened at {:?}", path.as_ref());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for tests).
    pub fn in_memory() -> Result<Self, StockscanError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert a user. Duplicate email or discord id → [`StockscanError::Conflict`].
    pub async fn create_user(&self, new: NewUser) -> Result<User, StockscanError> {
        new.validate()?;
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: new.email,
            discord_id: new.discord_id,
            likes: Vec::new(),
            read_more_clicks: Vec::new(),
        };

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO users (id, email, discord_id, likes, read_more_clicks, created_at)
             VALUES (?1, ?2, ?3, '[]', '[]', ?4)",
            params![user.id, user.email, user.discord_id, Utc::now().to_rfc3339()],
        )?;
        debug!("Created user {}", user.id);
        Ok(user)
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>, StockscanError> {
        let conn = self.conn.lock().await;
        let user = conn
            .query_row(
                "SELECT id, email, discord_id, likes, read_more_clicks FROM users WHERE id = ?1",
                params![id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Insert a single article.
    pub async fn create_article(&self, new: NewArticle) -> Result<Article, StockscanError> {
        let mut saved = self.insert_articles(vec![new]).await?;
        saved
            .pop()
            .ok_or_else(|| StockscanError::Internal("article insert returned nothing".into()))
    }

    /// Insert a batch of articles in one transaction: all or nothing.
    pub async fn insert_articles(
        &self,
        batch: Vec<NewArticle>,
    ) -> Result<Vec<Article>, StockscanError> {
        let articles = batch
            .into_iter()
            .map(NewArticle::validate)
            .collect::<Result<Vec<_>, _>>()?;

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO articles (id, ticker, title, author, published_utc, article_url,
                     image_url, description, article_text, ai_summary, relevant_stocks)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for a in &articles {
                stmt.execute(params![
                    a.id,
                    a.ticker,
                    a.title,
                    a.author,
                    a.published_utc.to_rfc3339(),
                    a.article_url,
                    a.image_url,
                    a.description,
                    a.article_text,
                    a.ai_summary,
                    to_json(&a.relevant_stocks)?,
                ])?;
            }
        }
        tx.commit()?;
        debug!("Inserted {} articles", articles.len());
        Ok(articles)
    }

    /// All articles in insertion order.
    pub async fn list_articles(&self) -> Result<Vec<Article>, StockscanError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, ticker, title, author, published_utc, article_url, image_url,
                    description, article_text, ai_summary, relevant_stocks
             FROM articles ORDER BY seq",
        )?;
        let articles = stmt
            .query_map([], row_to_article)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(articles)
    }
}

fn to_json(list: &[String]) -> Result<String, StockscanError> {
    serde_json::to_string(list).map_err(|e| StockscanError::Internal(e.to_string()))
}

fn json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        discord_id: row.get(2)?,
        likes: json_column(row, 3)?,
        read_more_clicks: json_column(row, 4)?,
    })
}

fn row_to_article(row: &Row<'_>) -> rusqlite::Result<Article> {
    let published: String = row.get(4)?;
    let published_utc = DateTime::parse_from_rfc3339(&published)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Article {
        id: row.get(0)?,
        ticker: row.get(1)?,
        title: row.get(2)?,
        author: row.get(3)?,
        published_utc,
        article_url: row.get(5)?,
        image_url: row.get(6)?,
        description: row.get(7)?,
        article_text: row.get(8)?,
        ai_summary: row.get(9)?,
        relevant_stocks: json_column(row, 10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn new_user(email: &str, discord: &str) -> NewUser {
        NewUser {
            email: email.into(),
            discord_id: discord.into(),
        }
    }

    fn new_article(title: &str) -> NewArticle {
        NewArticle {
            ticker: "AAPL".into(),
            title: title.into(),
            author: "Jane Doe".into(),
            published_utc: Some(Utc.with_ymd_and_hms(2024, 6, 24, 18, 33, 53).unwrap()),
            article_url: "https://example.com/a".into(),
            image_url: None,
            description: "Apple did things".into(),
            article_text: "Apple did things".into(),
            ai_summary: Some("summary".into()),
            relevant_stocks: vec!["AAPL".into(), "MSFT".into()],
        }
    }

    #[tokio::test]
    async fn create_and_get_user() {
        let store = SqliteStore::in_memory().unwrap();
        let user = store.create_user(new_user("a@b.c", "disc#1")).await.unwrap();
        assert!(user.likes.is_empty());

        let fetched = store.get_user(&user.id).await.unwrap();
        assert_eq!(fetched, Some(user));
        assert_eq!(store.get_user("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let store = SqliteStore::in_memory().unwrap();
        store.create_user(new_user("a@b.c", "one")).await.unwrap();
        let err = store.create_user(new_user("a@b.c", "two")).await.unwrap_err();
        assert!(matches!(err, StockscanError::Conflict { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn user_requires_discord_id() {
        let store = SqliteStore::in_memory().unwrap();
        let err = store.create_user(new_user("a@b.c", " ")).await.unwrap_err();
        assert!(matches!(
            err,
            StockscanError::InvalidRecord {
                field: "discordId",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn articles_round_trip_in_order() {
        let store = SqliteStore::in_memory().unwrap();
        store.create_article(new_article("first")).await.unwrap();
        store
            .insert_articles(vec![new_article("second"), new_article("third")])
            .await
            .unwrap();

        let all = store.list_articles().await.unwrap();
        let titles: Vec<_> = all.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, ["first", "second", "third"]);
        assert_eq!(all[0].relevant_stocks, ["AAPL", "MSFT"]);
        assert_eq!(all[0].published_utc.to_rfc3339(), "2024-06-24T18:33:53+00:00");
    }

    #[tokio::test]
    async fn invalid_article_aborts_whole_batch() {
        let store = SqliteStore::in_memory().unwrap();
        let mut bad = new_article("bad");
        bad.published_utc = None;

        let err = store
            .insert_articles(vec![new_article("good"), bad])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StockscanError::InvalidRecord {
                field: "published_utc",
                ..
            }
        ));
        assert!(store.list_articles().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn open_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.create_article(new_article("kept")).await.unwrap();
        }
        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.list_articles().await.unwrap().len(), 1);
    }
}

use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::api::models::{AuthTokens, ChatMessage, UserProfile};
use crate::app::CacheSettings;
use crate::chat::history::merge_messages;

/// Bumped whenever the cached message layout changes; older caches are dropped.
const CACHE_VERSION: &str = "1";

pub mod keys {
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const USER_PROFILE: &str = "user_profile";
    pub const LAST_PAYMENT_ORDER_CODE: &str = "last_payment_order_code";
    pub(super) const CACHE_VERSION: &str = "message_cache_version";
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("cached value is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("no data directory available")]
    NoDataDir,
    #[error("store lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, StorageError>;

fn db_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("vn", "examportal", "ExamPortal")?;
    Some(proj.data_dir().join("client.sqlite"))
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Persisted client state: tokens, cached profile, payment bookkeeping and a
/// bounded per-room message cache.
pub struct Store {
    conn: Mutex<Connection>,
    cache: CacheSettings,
}

impl Store {
    pub fn open_default(cache: CacheSettings) -> Result<Self> {
        let path = db_path().ok_or(StorageError::NoDataDir)?;
        Self::open(&path, cache)
    }

    pub fn open(path: &Path, cache: CacheSettings) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::init(conn, cache)
    }

    pub fn in_memory(cache: CacheSettings) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, cache)
    }

    fn init(conn: Connection, cache: CacheSettings) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS room_messages (
                room_id INTEGER NOT NULL,
                message_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                raw_json TEXT NOT NULL,
                cached_at INTEGER NOT NULL,
                PRIMARY KEY (room_id, message_id)
            );
            CREATE INDEX IF NOT EXISTS idx_room_messages_position
                ON room_messages(room_id, position);
            "#,
        )?;
        let store = Self { conn: Mutex::new(conn), cache };
        if store.get(keys::CACHE_VERSION)?.as_deref() != Some(CACHE_VERSION) {
            log::info!("Message cache version changed; dropping cached rooms");
            store.lock()?.execute("DELETE FROM room_messages", [])?;
            store.set(keys::CACHE_VERSION, CACHE_VERSION)?;
        }
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.execute(
            r#"
            INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![key, value, now_secs()],
        )?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    // ========== Session ==========

    pub fn tokens(&self) -> Result<Option<AuthTokens>> {
        let Some(access_token) = self.get(keys::ACCESS_TOKEN)? else {
            return Ok(None);
        };
        let refresh_token = self.get(keys::REFRESH_TOKEN)?;
        Ok(Some(AuthTokens { access_token, refresh_token }))
    }

    pub fn save_tokens(&self, tokens: &AuthTokens) -> Result<()> {
        self.set(keys::ACCESS_TOKEN, &tokens.access_token)?;
        match &tokens.refresh_token {
            Some(r) => self.set(keys::REFRESH_TOKEN, r),
            None => self.remove(keys::REFRESH_TOKEN),
        }
    }

    pub fn user_profile(&self) -> Result<Option<UserProfile>> {
        match self.get(keys::USER_PROFILE)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn save_user_profile(&self, profile: &UserProfile) -> Result<()> {
        self.set(keys::USER_PROFILE, &serde_json::to_string(profile)?)
    }

    /// Forgets tokens and the cached profile.
    pub fn clear_session(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM kv WHERE key IN (?1, ?2, ?3)",
            params![keys::ACCESS_TOKEN, keys::REFRESH_TOKEN, keys::USER_PROFILE],
        )?;
        Ok(())
    }

    // ========== Payments ==========

    pub fn last_payment_order_code(&self) -> Result<Option<i64>> {
        Ok(self
            .get(keys::LAST_PAYMENT_ORDER_CODE)?
            .and_then(|v| v.trim().parse().ok()))
    }

    pub fn set_last_payment_order_code(&self, code: i64) -> Result<()> {
        self.set(keys::LAST_PAYMENT_ORDER_CODE, &code.to_string())
    }

    pub fn clear_last_payment_order_code(&self) -> Result<()> {
        self.remove(keys::LAST_PAYMENT_ORDER_CODE)
    }

    // ========== Message cache ==========

    pub fn cached_messages(&self, room_id: i64) -> Result<Vec<ChatMessage>> {
        self.cached_messages_at(room_id, now_secs())
    }

    fn cached_messages_at(&self, room_id: i64, now: i64) -> Result<Vec<ChatMessage>> {
        let conn = self.lock()?;
        self.read_room(&conn, room_id, now)
    }

    /// Replaces the room's cache with `messages` (already in display order),
    /// keeping only the newest `max_messages_per_room`.
    pub fn replace_room_messages(&self, room_id: i64, messages: &[ChatMessage]) -> Result<()> {
        self.replace_room_messages_at(room_id, messages, now_secs())
    }

    fn replace_room_messages_at(&self, room_id: i64, messages: &[ChatMessage], now: i64) -> Result<()> {
        let mut conn = self.lock()?;
        self.write_room(&mut conn, room_id, messages, now)
    }

    /// Merges `incoming` into the room's cache under a single lock and returns
    /// the merged set. Later entries win over cached ones with the same id.
    pub fn merge_room_messages(&self, room_id: i64, incoming: &[ChatMessage]) -> Result<Vec<ChatMessage>> {
        let now = now_secs();
        let mut conn = self.lock()?;
        let cached = self.read_room(&conn, room_id, now)?;
        let merged = merge_messages([&cached[..], incoming]);
        self.write_room(&mut conn, room_id, &merged, now)?;
        Ok(merged)
    }

    fn read_room(&self, conn: &Connection, room_id: i64, now: i64) -> Result<Vec<ChatMessage>> {
        let cutoff = now - self.cache.max_age().as_secs() as i64;
        let purged = conn.execute(
            "DELETE FROM room_messages WHERE room_id = ?1 AND cached_at < ?2",
            params![room_id, cutoff],
        )?;
        if purged > 0 {
            log::debug!("Purged {purged} stale cached messages for room {room_id}");
        }
        let mut stmt = conn.prepare(
            "SELECT raw_json FROM room_messages WHERE room_id = ?1 ORDER BY position ASC",
        )?;
        let rows = stmt.query_map(params![room_id], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for raw in rows {
            match serde_json::from_str::<ChatMessage>(&raw?) {
                Ok(m) => out.push(m),
                Err(e) => log::warn!("Dropping unreadable cached message in room {room_id}: {e}"),
            }
        }
        Ok(out)
    }

    fn write_room(&self, conn: &mut Connection, room_id: i64, messages: &[ChatMessage], now: i64) -> Result<()> {
        let keep = self.cache.max_messages_per_room;
        let start = messages.len().saturating_sub(keep);
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM room_messages WHERE room_id = ?1", params![room_id])?;
        for (position, message) in messages[start..].iter().enumerate() {
            if message.id.is_empty() {
                continue;
            }
            tx.execute(
                r#"
                INSERT INTO room_messages (room_id, message_id, position, raw_json, cached_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(room_id, message_id) DO UPDATE SET
                    position = excluded.position,
                    raw_json = excluded.raw_json,
                    cached_at = excluded.cached_at
                "#,
                params![room_id, message.id, position as i64, serde_json::to_string(message)?, now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

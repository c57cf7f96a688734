use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use super::schema::SCHEMA;
use super::{InteractionOutcome, LoopFilter, Store, VIEW_DEDUP_SECS};
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection.
    /// This allows consuming applications to execute custom SQL.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Splits a "created_at,id" cursor for descending reads. An empty cursor
/// becomes "~", which sorts after any RFC3339 timestamp or UUID.
fn desc_cursor(cursor: &str) -> (String, String) {
    match cursor.rsplit_once(',') {
        Some((ts, id)) => (ts.to_string(), id.to_string()),
        None => ("~".to_string(), "~".to_string()),
    }
}

/// Splits a "created_at,id" cursor for ascending reads. An empty cursor
/// yields empty strings, which sort before everything.
fn asc_cursor(cursor: &str) -> (String, String) {
    match cursor.rsplit_once(',') {
        Some((ts, id)) => (ts.to_string(), id.to_string()),
        None => (String::new(), String::new()),
    }
}

fn map_loop(row: &rusqlite::Row<'_>) -> rusqlite::Result<Loop> {
    Ok(Loop {
        id: row.get(0)?,
        author_id: row.get(1)?,
        circle_id: row.get(2)?,
        parent_loop_id: row.get(3)?,
        content_text: row.get(4)?,
        media_id: row.get(5)?,
        category: row.get(6)?,
        public: row.get(7)?,
        created_at: parse_datetime(&row.get::<_, String>(8)?),
        updated_at: parse_datetime(&row.get::<_, String>(9)?),
    })
}

fn map_loop_stats(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<LoopStats> {
    Ok(LoopStats {
        likes_count: row.get(offset)?,
        comments_count: row.get(offset + 1)?,
        branches_count: row.get(offset + 2)?,
        shares_count: row.get(offset + 3)?,
        views_count: row.get(offset + 4)?,
    })
}

fn map_loop_with_stats(row: &rusqlite::Row<'_>) -> rusqlite::Result<LoopWithStats> {
    Ok(LoopWithStats {
        loop_: map_loop(row)?,
        loop_stats: map_loop_stats(row, 10)?,
        hashtags: Vec::new(),
        is_liked: row.get(15)?,
        is_saved: row.get(16)?,
    })
}

fn load_hashtags(conn: &Connection, loop_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT tag FROM loop_hashtags WHERE loop_id = ?1 ORDER BY tag")?;
    let rows = stmt.query_map(params![loop_id], |row| row.get(0))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

// Shared column list for loop reads: the loop row, its stats, and the
// viewer's like/save marks. ?1 is always the viewer.
const LOOP_COLUMNS: &str = "l.id, l.author_id, l.circle_id, l.parent_loop_id, l.content_text,
       l.media_id, l.category, l.public, l.created_at, l.updated_at,
       s.likes_count, s.comments_count, s.branches_count, s.shares_count, s.views_count,
       EXISTS(SELECT 1 FROM loop_interactions li WHERE li.loop_id = l.id AND li.user_id = ?1 AND li.kind = 'like'),
       EXISTS(SELECT 1 FROM loop_interactions li WHERE li.loop_id = l.id AND li.user_id = ?1 AND li.kind = 'save')";

/// Loops the viewer (?1) may see: public ones, their own, and loops in
/// circles they belong to.
const VISIBILITY_CLAUSE: &str = "(l.public = 1 OR l.author_id = ?1
        OR (l.circle_id IS NOT NULL AND EXISTS(
            SELECT 1 FROM circle_members cm WHERE cm.circle_id = l.circle_id AND cm.user_id = ?1)))";

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, username, display_name, bio, avatar_media_id, coins, earnings, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                user.id,
                user.username,
                user.display_name,
                user.bio,
                user.avatar_media_id,
                user.coins,
                user.earnings,
                format_datetime(&user.created_at),
                format_datetime(&user.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, username, display_name, bio, avatar_media_id, coins, earnings, created_at, updated_at
             FROM users WHERE id = ?1",
            params![id],
            map_user,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, username, display_name, bio, avatar_media_id, coins, earnings, created_at, updated_at
             FROM users WHERE username = ?1",
            params![username],
            map_user,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_users(&self, cursor: &str, limit: i32) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, username, display_name, bio, avatar_media_id, coins, earnings, created_at, updated_at
             FROM users WHERE username > ?1 ORDER BY username LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![cursor, limit], map_user)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_user(&self, user: &User) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE users SET display_name = ?1, bio = ?2, avatar_media_id = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                user.display_name,
                user.bio,
                user.avatar_media_id,
                format_datetime(&user.updated_at),
                user.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_user(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn grant_coins(&self, user_id: &str, coins: i64) -> Result<i64> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let rows = tx.execute(
            "UPDATE users SET coins = coins + ?1, updated_at = ?2 WHERE id = ?3",
            params![coins, format_datetime(&Utc::now()), user_id],
        )?;
        if rows == 0 {
            return Err(Error::NotFound);
        }

        let balance: i64 = tx.query_row(
            "SELECT coins FROM users WHERE id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;

        tx.commit()?;
        Ok(balance)
    }

    fn count_user_loops(&self, user_id: &str) -> Result<i64> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM loops WHERE author_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // Token operations

    fn create_token(&self, token: &Token) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO tokens (id, token_hash, token_lookup, is_admin, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                token.id,
                token.token_hash,
                token.token_lookup,
                token.is_admin,
                token.user_id,
                format_datetime(&token.created_at),
                token.expires_at.as_ref().map(format_datetime),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::TokenLookupCollision)
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_token_by_id(&self, id: &str) -> Result<Option<Token>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, token_hash, token_lookup, is_admin, user_id, created_at, expires_at, last_used_at
             FROM tokens WHERE id = ?1",
            params![id],
            map_token,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, token_hash, token_lookup, is_admin, user_id, created_at, expires_at, last_used_at
             FROM tokens WHERE token_lookup = ?1",
            params![lookup],
            map_token,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_tokens(&self, cursor: &str, limit: i32) -> Result<Vec<Token>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, token_hash, token_lookup, is_admin, user_id, created_at, expires_at, last_used_at
             FROM tokens WHERE id > ?1 ORDER BY id LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![cursor, limit], map_token)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_user_tokens(&self, user_id: &str) -> Result<Vec<Token>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, token_hash, token_lookup, is_admin, user_id, created_at, expires_at, last_used_at
             FROM tokens WHERE user_id = ?1 ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map(params![user_id], map_token)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_token(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM tokens WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn update_token_last_used(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE tokens SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(())
    }

    fn has_admin_token(&self) -> Result<bool> {
        let conn = self.conn();
        let count: i32 = conn.query_row(
            "SELECT COUNT(*) FROM tokens WHERE is_admin = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // Loop operations

    fn create_loop(&self, loop_: &Loop, hashtags: &[String]) -> Result<Option<Notification>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let parent_author: Option<String> = match &loop_.parent_loop_id {
            Some(parent_id) => {
                let author: Option<String> = tx
                    .query_row(
                        "SELECT author_id FROM loops WHERE id = ?1",
                        params![parent_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                match author {
                    Some(a) => Some(a),
                    None => return Err(Error::NotFound),
                }
            }
            None => None,
        };

        tx.execute(
            "INSERT INTO loops (id, author_id, circle_id, parent_loop_id, content_text, media_id, category, public, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                loop_.id,
                loop_.author_id,
                loop_.circle_id,
                loop_.parent_loop_id,
                loop_.content_text,
                loop_.media_id,
                loop_.category,
                loop_.public,
                format_datetime(&loop_.created_at),
                format_datetime(&loop_.updated_at),
            ],
        )?;

        tx.execute(
            "INSERT INTO loop_stats (loop_id) VALUES (?1)",
            params![loop_.id],
        )?;

        for tag in hashtags {
            tx.execute(
                "INSERT OR IGNORE INTO loop_hashtags (loop_id, tag) VALUES (?1, ?2)",
                params![loop_.id, tag],
            )?;
        }

        let mut notification = None;
        if let Some(parent_id) = &loop_.parent_loop_id {
            tx.execute(
                "UPDATE loop_stats SET branches_count = branches_count + 1 WHERE loop_id = ?1",
                params![parent_id],
            )?;

            // The whole ancestor chain gains one thread reply
            tx.execute(
                "UPDATE loop_stats SET comments_count = comments_count + 1
                 WHERE loop_id IN (
                     WITH RECURSIVE ancestors(id) AS (
                         SELECT ?1
                         UNION ALL
                         SELECT l.parent_loop_id FROM loops l
                         JOIN ancestors a ON l.id = a.id
                         WHERE l.parent_loop_id IS NOT NULL
                     )
                     SELECT id FROM ancestors
                 )",
                params![parent_id],
            )?;

            let parent_author = parent_author.unwrap_or_default();
            if parent_author != loop_.author_id {
                let n = Notification {
                    id: Uuid::new_v4().to_string(),
                    user_id: parent_author,
                    actor_id: Some(loop_.author_id.clone()),
                    kind: NotificationKind::Branch,
                    loop_id: Some(loop_.id.clone()),
                    coins: None,
                    read: false,
                    created_at: loop_.created_at,
                };
                insert_notification(&tx, &n)?;
                notification = Some(n);
            }
        }

        tx.commit()?;
        Ok(notification)
    }

    fn get_loop(&self, id: &str) -> Result<Option<Loop>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, author_id, circle_id, parent_loop_id, content_text, media_id, category, public, created_at, updated_at
             FROM loops WHERE id = ?1",
            params![id],
            map_loop,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_loop_with_stats(&self, id: &str, viewer_id: &str) -> Result<Option<LoopWithStats>> {
        let conn = self.conn();
        let found = conn
            .query_row(
                &format!(
                    "SELECT {LOOP_COLUMNS}
                     FROM loops l JOIN loop_stats s ON s.loop_id = l.id
                     WHERE l.id = ?2"
                ),
                params![viewer_id, id],
                map_loop_with_stats,
            )
            .optional()?;

        match found {
            Some(mut lw) => {
                lw.hashtags = load_hashtags(&conn, &lw.loop_.id)?;
                Ok(Some(lw))
            }
            None => Ok(None),
        }
    }

    fn list_loops(
        &self,
        filter: &LoopFilter,
        viewer_id: &str,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<LoopWithStats>> {
        let (ts, id) = desc_cursor(cursor);
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {LOOP_COLUMNS}
             FROM loops l JOIN loop_stats s ON s.loop_id = l.id
             WHERE {VISIBILITY_CLAUSE}
               AND (l.created_at < ?2 OR (l.created_at = ?2 AND l.id < ?3))
               AND (?5 IS NULL OR l.author_id = ?5)
               AND (?6 IS NULL OR l.circle_id = ?6)
               AND (?7 IS NULL OR l.category = ?7)
               AND (?8 IS NULL OR EXISTS(
                   SELECT 1 FROM loop_hashtags h WHERE h.loop_id = l.id AND h.tag = ?8))
             ORDER BY l.created_at DESC, l.id DESC
             LIMIT ?4"
        ))?;

        let rows = stmt.query_map(
            params![
                viewer_id,
                ts,
                id,
                limit,
                filter.author_id,
                filter.circle_id,
                filter.category,
                filter.hashtag,
            ],
            map_loop_with_stats,
        )?;

        let mut loops = rows
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)?;
        for lw in &mut loops {
            lw.hashtags = load_hashtags(&conn, &lw.loop_.id)?;
        }
        Ok(loops)
    }

    fn list_branches(
        &self,
        parent_id: &str,
        viewer_id: &str,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<LoopWithStats>> {
        let (ts, id) = asc_cursor(cursor);
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {LOOP_COLUMNS}
             FROM loops l JOIN loop_stats s ON s.loop_id = l.id
             WHERE l.parent_loop_id = ?2
               AND {VISIBILITY_CLAUSE}
               AND (l.created_at > ?3 OR (l.created_at = ?3 AND l.id > ?4))
             ORDER BY l.created_at, l.id
             LIMIT ?5"
        ))?;

        let rows = stmt.query_map(
            params![viewer_id, parent_id, ts, id, limit],
            map_loop_with_stats,
        )?;

        let mut loops = rows
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)?;
        for lw in &mut loops {
            lw.hashtags = load_hashtags(&conn, &lw.loop_.id)?;
        }
        Ok(loops)
    }

    fn get_loop_tree(
        &self,
        root_id: &str,
        viewer_id: &str,
        max_depth: i32,
    ) -> Result<Vec<LoopTreeNode>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "WITH RECURSIVE tree(id, depth) AS (
                 SELECT ?2, 0
                 UNION ALL
                 SELECT l.id, t.depth + 1 FROM loops l
                 JOIN tree t ON l.parent_loop_id = t.id
                 WHERE t.depth < ?3
             )
             SELECT l.id, l.author_id, l.circle_id, l.parent_loop_id, l.content_text,
                    l.media_id, l.category, l.public, l.created_at, l.updated_at,
                    s.likes_count, s.comments_count, s.branches_count, s.shares_count, s.views_count,
                    t.depth
             FROM tree t
             JOIN loops l ON l.id = t.id
             JOIN loop_stats s ON s.loop_id = l.id
             WHERE {VISIBILITY_CLAUSE}
             ORDER BY t.depth, l.created_at, l.id"
        ))?;

        let rows = stmt.query_map(params![viewer_id, root_id, max_depth], |row| {
            Ok(LoopTreeNode {
                loop_: map_loop(row)?,
                loop_stats: map_loop_stats(row, 10)?,
                depth: row.get(15)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_saved_loops(
        &self,
        user_id: &str,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<LoopWithStats>> {
        let (ts, id) = desc_cursor(cursor);
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {LOOP_COLUMNS}
             FROM loops l
             JOIN loop_stats s ON s.loop_id = l.id
             JOIN loop_interactions si ON si.loop_id = l.id AND si.user_id = ?1 AND si.kind = 'save'
             WHERE (l.created_at < ?2 OR (l.created_at = ?2 AND l.id < ?3))
             ORDER BY l.created_at DESC, l.id DESC
             LIMIT ?4"
        ))?;

        let rows = stmt.query_map(params![user_id, ts, id, limit], map_loop_with_stats)?;

        let mut loops = rows
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)?;
        for lw in &mut loops {
            lw.hashtags = load_hashtags(&conn, &lw.loop_.id)?;
        }
        Ok(loops)
    }

    fn update_loop(&self, loop_: &Loop) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE loops SET content_text = ?1, category = ?2, public = ?3, media_id = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                loop_.content_text,
                loop_.category,
                loop_.public,
                loop_.media_id,
                format_datetime(&loop_.updated_at),
                loop_.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_loop(&self, id: &str) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let parent_id: Option<Option<String>> = tx
            .query_row(
                "SELECT parent_loop_id FROM loops WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(parent_id) = parent_id else {
            return Ok(false);
        };

        if let Some(parent_id) = parent_id {
            // Size of the subtree being removed, root included
            let subtree: i64 = tx.query_row(
                "WITH RECURSIVE subtree(id) AS (
                     SELECT ?1
                     UNION ALL
                     SELECT l.id FROM loops l JOIN subtree s ON l.parent_loop_id = s.id
                 )
                 SELECT COUNT(*) FROM subtree",
                params![id],
                |row| row.get(0),
            )?;

            tx.execute(
                "UPDATE loop_stats SET branches_count = branches_count - 1 WHERE loop_id = ?1",
                params![parent_id],
            )?;
            tx.execute(
                "UPDATE loop_stats SET comments_count = comments_count - ?2
                 WHERE loop_id IN (
                     WITH RECURSIVE ancestors(id) AS (
                         SELECT ?1
                         UNION ALL
                         SELECT l.parent_loop_id FROM loops l
                         JOIN ancestors a ON l.id = a.id
                         WHERE l.parent_loop_id IS NOT NULL
                     )
                     SELECT id FROM ancestors
                 )",
                params![parent_id, subtree],
            )?;
        }

        let rows = tx.execute("DELETE FROM loops WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(rows > 0)
    }

    // Interaction operations

    fn apply_interaction(
        &self,
        loop_id: &str,
        user_id: &str,
        kind: InteractionKind,
    ) -> Result<InteractionOutcome> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let author_id: Option<String> = tx
            .query_row(
                "SELECT author_id FROM loops WHERE id = ?1",
                params![loop_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(author_id) = author_id else {
            return Err(Error::NotFound);
        };

        let now = Utc::now();
        let mut notification = None;

        let active = match kind {
            InteractionKind::Like | InteractionKind::Save => {
                let existing: Option<String> = tx
                    .query_row(
                        "SELECT id FROM loop_interactions
                         WHERE loop_id = ?1 AND user_id = ?2 AND kind = ?3",
                        params![loop_id, user_id, kind.as_str()],
                        |row| row.get(0),
                    )
                    .optional()?;

                match existing {
                    Some(interaction_id) => {
                        tx.execute(
                            "DELETE FROM loop_interactions WHERE id = ?1",
                            params![interaction_id],
                        )?;
                        if kind == InteractionKind::Like {
                            tx.execute(
                                "UPDATE loop_stats SET likes_count = likes_count - 1 WHERE loop_id = ?1",
                                params![loop_id],
                            )?;
                        }
                        false
                    }
                    None => {
                        insert_interaction(&tx, loop_id, user_id, kind, &now)?;
                        if kind == InteractionKind::Like {
                            tx.execute(
                                "UPDATE loop_stats SET likes_count = likes_count + 1 WHERE loop_id = ?1",
                                params![loop_id],
                            )?;
                            if author_id != user_id {
                                let n = Notification {
                                    id: Uuid::new_v4().to_string(),
                                    user_id: author_id,
                                    actor_id: Some(user_id.to_string()),
                                    kind: NotificationKind::Like,
                                    loop_id: Some(loop_id.to_string()),
                                    coins: None,
                                    read: false,
                                    created_at: now,
                                };
                                insert_notification(&tx, &n)?;
                                notification = Some(n);
                            }
                        }
                        true
                    }
                }
            }
            InteractionKind::Share => {
                insert_interaction(&tx, loop_id, user_id, kind, &now)?;
                tx.execute(
                    "UPDATE loop_stats SET shares_count = shares_count + 1 WHERE loop_id = ?1",
                    params![loop_id],
                )?;
                true
            }
            InteractionKind::View => {
                let last_view: Option<String> = tx
                    .query_row(
                        "SELECT created_at FROM loop_interactions
                         WHERE loop_id = ?1 AND user_id = ?2 AND kind = 'view'
                         ORDER BY created_at DESC LIMIT 1",
                        params![loop_id, user_id],
                        |row| row.get(0),
                    )
                    .optional()?;

                let within_window = last_view
                    .map(|ts| now - parse_datetime(&ts) < Duration::seconds(VIEW_DEDUP_SECS))
                    .unwrap_or(false);

                if within_window {
                    false
                } else {
                    insert_interaction(&tx, loop_id, user_id, kind, &now)?;
                    tx.execute(
                        "UPDATE loop_stats SET views_count = views_count + 1 WHERE loop_id = ?1",
                        params![loop_id],
                    )?;
                    true
                }
            }
        };

        // saves have no stats column; count live rows instead
        let count: i64 = match kind {
            InteractionKind::Save => tx.query_row(
                "SELECT COUNT(*) FROM loop_interactions WHERE loop_id = ?1 AND kind = 'save'",
                params![loop_id],
                |row| row.get(0),
            )?,
            InteractionKind::Like => tx.query_row(
                "SELECT likes_count FROM loop_stats WHERE loop_id = ?1",
                params![loop_id],
                |row| row.get(0),
            )?,
            InteractionKind::Share => tx.query_row(
                "SELECT shares_count FROM loop_stats WHERE loop_id = ?1",
                params![loop_id],
                |row| row.get(0),
            )?,
            InteractionKind::View => tx.query_row(
                "SELECT views_count FROM loop_stats WHERE loop_id = ?1",
                params![loop_id],
                |row| row.get(0),
            )?,
        };

        tx.commit()?;
        Ok(InteractionOutcome {
            kind,
            active,
            count,
            notification,
        })
    }

    // Circle operations

    fn create_circle(&self, circle: &Circle) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO circles (id, name, description, owner_id, public, member_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7)",
            params![
                circle.id,
                circle.name,
                circle.description,
                circle.owner_id,
                circle.public,
                format_datetime(&circle.created_at),
                format_datetime(&circle.updated_at),
            ],
        )?;

        tx.execute(
            "INSERT INTO circle_members (circle_id, user_id, role, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                circle.id,
                circle.owner_id,
                CircleRole::Owner.as_str(),
                format_datetime(&circle.created_at),
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn get_circle(&self, id: &str) -> Result<Option<Circle>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, name, description, owner_id, public, member_count, created_at, updated_at
             FROM circles WHERE id = ?1",
            params![id],
            map_circle,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_circle_by_name(&self, name: &str) -> Result<Option<Circle>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, name, description, owner_id, public, member_count, created_at, updated_at
             FROM circles WHERE name = ?1",
            params![name],
            map_circle,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_circles(&self, cursor: &str, limit: i32) -> Result<Vec<Circle>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, description, owner_id, public, member_count, created_at, updated_at
             FROM circles WHERE public = 1 AND name > ?1 ORDER BY name LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![cursor, limit], map_circle)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_user_circles(&self, user_id: &str) -> Result<Vec<Circle>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT c.id, c.name, c.description, c.owner_id, c.public, c.member_count,
                    c.created_at, c.updated_at
             FROM circles c
             JOIN circle_members m ON m.circle_id = c.id
             WHERE m.user_id = ?1
             ORDER BY c.name",
        )?;

        let rows = stmt.query_map(params![user_id], map_circle)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_circle(&self, circle: &Circle) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE circles SET name = ?1, description = ?2, public = ?3, updated_at = ?4 WHERE id = ?5",
            params![
                circle.name,
                circle.description,
                circle.public,
                format_datetime(&circle.updated_at),
                circle.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_circle(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM circles WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Membership operations

    fn add_circle_member(&self, circle_id: &str, user_id: &str, role: CircleRole) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let rows = tx.execute(
            "INSERT OR IGNORE INTO circle_members (circle_id, user_id, role, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                circle_id,
                user_id,
                role.as_str(),
                format_datetime(&Utc::now()),
            ],
        )?;
        if rows == 0 {
            return Err(Error::AlreadyExists);
        }

        tx.execute(
            "UPDATE circles SET member_count = member_count + 1 WHERE id = ?1",
            params![circle_id],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn get_circle_member(&self, circle_id: &str, user_id: &str) -> Result<Option<CircleMember>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT circle_id, user_id, role, created_at FROM circle_members
             WHERE circle_id = ?1 AND user_id = ?2",
            params![circle_id, user_id],
            map_member,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_circle_members(
        &self,
        circle_id: &str,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<CircleMemberWithName>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT cm.circle_id, cm.user_id, cm.role, cm.created_at, u.username
             FROM circle_members cm
             JOIN users u ON u.id = cm.user_id
             WHERE cm.circle_id = ?1 AND u.username > ?2
             ORDER BY u.username LIMIT ?3",
        )?;

        let rows = stmt.query_map(params![circle_id, cursor, limit], |row| {
            Ok(CircleMemberWithName {
                member: map_member(row)?,
                username: row.get(4)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_member_role(&self, circle_id: &str, user_id: &str, role: CircleRole) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE circle_members SET role = ?1 WHERE circle_id = ?2 AND user_id = ?3",
            params![role.as_str(), circle_id, user_id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn remove_circle_member(&self, circle_id: &str, user_id: &str) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let rows = tx.execute(
            "DELETE FROM circle_members WHERE circle_id = ?1 AND user_id = ?2",
            params![circle_id, user_id],
        )?;
        if rows > 0 {
            tx.execute(
                "UPDATE circles SET member_count = member_count - 1 WHERE id = ?1",
                params![circle_id],
            )?;
        }

        tx.commit()?;
        Ok(rows > 0)
    }

    // Event operations

    fn create_event(&self, event: &CircleEvent) -> Result<Vec<Notification>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO circle_events (id, circle_id, title, description, starts_at, max_participants, attendee_count, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8)",
            params![
                event.id,
                event.circle_id,
                event.title,
                event.description,
                format_datetime(&event.starts_at),
                event.max_participants,
                event.created_by,
                format_datetime(&event.created_at),
            ],
        )?;

        // Everyone in the circle except the creator hears about it
        let member_ids: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT user_id FROM circle_members WHERE circle_id = ?1 AND user_id != ?2",
            )?;
            let rows = stmt.query_map(params![event.circle_id, event.created_by], |row| {
                row.get(0)
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        let mut notifications = Vec::with_capacity(member_ids.len());
        for user_id in member_ids {
            let n = Notification {
                id: Uuid::new_v4().to_string(),
                user_id,
                actor_id: Some(event.created_by.clone()),
                kind: NotificationKind::Event,
                loop_id: None,
                coins: None,
                read: false,
                created_at: event.created_at,
            };
            insert_notification(&tx, &n)?;
            notifications.push(n);
        }

        tx.commit()?;
        Ok(notifications)
    }

    fn get_event(&self, id: &str) -> Result<Option<CircleEvent>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, circle_id, title, description, starts_at, max_participants, attendee_count, created_by, created_at
             FROM circle_events WHERE id = ?1",
            params![id],
            map_event,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_circle_events(&self, circle_id: &str) -> Result<Vec<CircleEvent>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, circle_id, title, description, starts_at, max_participants, attendee_count, created_by, created_at
             FROM circle_events WHERE circle_id = ?1 ORDER BY starts_at",
        )?;

        let rows = stmt.query_map(params![circle_id], map_event)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn register_attendee(&self, event_id: &str, user_id: &str) -> Result<i64> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let event: Option<(Option<i64>, i64)> = tx
            .query_row(
                "SELECT max_participants, attendee_count FROM circle_events WHERE id = ?1",
                params![event_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((max_participants, attendee_count)) = event else {
            return Err(Error::NotFound);
        };

        if let Some(max) = max_participants {
            if attendee_count >= max {
                return Err(Error::EventFull);
            }
        }

        let rows = tx.execute(
            "INSERT OR IGNORE INTO event_attendees (event_id, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![event_id, user_id, format_datetime(&Utc::now())],
        )?;
        if rows == 0 {
            return Err(Error::AlreadyExists);
        }

        tx.execute(
            "UPDATE circle_events SET attendee_count = attendee_count + 1 WHERE id = ?1",
            params![event_id],
        )?;

        tx.commit()?;
        Ok(attendee_count + 1)
    }

    fn unregister_attendee(&self, event_id: &str, user_id: &str) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let rows = tx.execute(
            "DELETE FROM event_attendees WHERE event_id = ?1 AND user_id = ?2",
            params![event_id, user_id],
        )?;
        if rows > 0 {
            tx.execute(
                "UPDATE circle_events SET attendee_count = attendee_count - 1 WHERE id = ?1",
                params![event_id],
            )?;
        }

        tx.commit()?;
        Ok(rows > 0)
    }

    fn list_event_attendees(&self, event_id: &str) -> Result<Vec<EventAttendee>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT event_id, user_id, created_at FROM event_attendees
             WHERE event_id = ?1 ORDER BY created_at",
        )?;

        let rows = stmt.query_map(params![event_id], |row| {
            Ok(EventAttendee {
                event_id: row.get(0)?,
                user_id: row.get(1)?,
                created_at: parse_datetime(&row.get::<_, String>(2)?),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Circle message operations

    fn create_circle_message(&self, msg: &CircleMessage) -> Result<()> {
        self.conn().execute(
            "INSERT INTO circle_messages (id, circle_id, sender_id, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                msg.id,
                msg.circle_id,
                msg.sender_id,
                msg.content,
                format_datetime(&msg.created_at),
            ],
        )?;
        Ok(())
    }

    fn list_circle_messages(
        &self,
        circle_id: &str,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<CircleMessage>> {
        let (ts, id) = desc_cursor(cursor);
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, circle_id, sender_id, content, created_at FROM circle_messages
             WHERE circle_id = ?1 AND (created_at < ?2 OR (created_at = ?2 AND id < ?3))
             ORDER BY created_at DESC, id DESC LIMIT ?4",
        )?;

        let rows = stmt.query_map(params![circle_id, ts, id, limit], |row| {
            Ok(CircleMessage {
                id: row.get(0)?,
                circle_id: row.get(1)?,
                sender_id: row.get(2)?,
                content: row.get(3)?,
                created_at: parse_datetime(&row.get::<_, String>(4)?),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Notification operations

    fn create_notification(&self, notification: &Notification) -> Result<()> {
        let conn = self.conn();
        insert_notification(&conn, notification)
    }

    fn list_notifications(
        &self,
        user_id: &str,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<Notification>> {
        let (ts, id) = desc_cursor(cursor);
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, actor_id, kind, loop_id, coins, read, created_at FROM notifications
             WHERE user_id = ?1 AND (created_at < ?2 OR (created_at = ?2 AND id < ?3))
             ORDER BY created_at DESC, id DESC LIMIT ?4",
        )?;

        let rows = stmt.query_map(params![user_id, ts, id, limit], map_notification)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn count_unread_notifications(&self, user_id: &str) -> Result<i64> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND read = 0",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn mark_notification_read(&self, id: &str, user_id: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "UPDATE notifications SET read = 1 WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(rows > 0)
    }

    fn mark_all_notifications_read(&self, user_id: &str) -> Result<i64> {
        let rows = self.conn().execute(
            "UPDATE notifications SET read = 1 WHERE user_id = ?1 AND read = 0",
            params![user_id],
        )?;
        Ok(rows as i64)
    }

    // Stream operations

    fn create_stream(&self, stream: &Stream) -> Result<()> {
        self.conn().execute(
            "INSERT INTO streams (id, host_id, title, category, live, started_at, ended_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                stream.id,
                stream.host_id,
                stream.title,
                stream.category,
                stream.live,
                format_datetime(&stream.started_at),
                stream.ended_at.as_ref().map(format_datetime),
            ],
        )?;
        Ok(())
    }

    fn get_stream(&self, id: &str) -> Result<Option<Stream>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, host_id, title, category, live, started_at, ended_at
             FROM streams WHERE id = ?1",
            params![id],
            map_stream,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_live_stream_by_host(&self, host_id: &str) -> Result<Option<Stream>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, host_id, title, category, live, started_at, ended_at
             FROM streams WHERE host_id = ?1 AND live = 1",
            params![host_id],
            map_stream,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_live_streams(&self, cursor: &str, limit: i32) -> Result<Vec<Stream>> {
        let (ts, id) = desc_cursor(cursor);
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, host_id, title, category, live, started_at, ended_at
             FROM streams
             WHERE live = 1 AND (started_at < ?1 OR (started_at = ?1 AND id < ?2))
             ORDER BY started_at DESC, id DESC LIMIT ?3",
        )?;

        let rows = stmt.query_map(params![ts, id, limit], map_stream)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn end_stream(&self, id: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "UPDATE streams SET live = 0, ended_at = ?1 WHERE id = ?2 AND live = 1",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(rows > 0)
    }

    fn create_stream_message(&self, msg: &StreamMessage) -> Result<()> {
        self.conn().execute(
            "INSERT INTO stream_messages (id, stream_id, sender_id, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                msg.id,
                msg.stream_id,
                msg.sender_id,
                msg.content,
                format_datetime(&msg.created_at),
            ],
        )?;
        Ok(())
    }

    fn list_stream_messages(
        &self,
        stream_id: &str,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<StreamMessage>> {
        let (ts, id) = desc_cursor(cursor);
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, stream_id, sender_id, content, created_at FROM stream_messages
             WHERE stream_id = ?1 AND (created_at < ?2 OR (created_at = ?2 AND id < ?3))
             ORDER BY created_at DESC, id DESC LIMIT ?4",
        )?;

        let rows = stmt.query_map(params![stream_id, ts, id, limit], |row| {
            Ok(StreamMessage {
                id: row.get(0)?,
                stream_id: row.get(1)?,
                sender_id: row.get(2)?,
                content: row.get(3)?,
                created_at: parse_datetime(&row.get::<_, String>(4)?),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Gift operations

    fn transfer_gift(&self, gift: &Gift) -> Result<Notification> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = format_datetime(&gift.created_at);

        let balance: Option<i64> = tx
            .query_row(
                "SELECT coins FROM users WHERE id = ?1",
                params![gift.sender_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(balance) = balance else {
            return Err(Error::NotFound);
        };
        if balance < gift.coins {
            return Err(Error::InsufficientCoins);
        }

        tx.execute(
            "UPDATE users SET coins = coins - ?1, updated_at = ?2 WHERE id = ?3",
            params![gift.coins, now, gift.sender_id],
        )?;
        let rows = tx.execute(
            "UPDATE users SET earnings = earnings + ?1, updated_at = ?2 WHERE id = ?3",
            params![gift.coins, now, gift.recipient_id],
        )?;
        if rows == 0 {
            return Err(Error::NotFound);
        }

        tx.execute(
            "INSERT INTO gifts (id, sender_id, recipient_id, stream_id, gift_type, coins, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                gift.id,
                gift.sender_id,
                gift.recipient_id,
                gift.stream_id,
                gift.gift_type,
                gift.coins,
                now,
            ],
        )?;

        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            user_id: gift.recipient_id.clone(),
            actor_id: Some(gift.sender_id.clone()),
            kind: NotificationKind::Gift,
            loop_id: None,
            coins: Some(gift.coins),
            read: false,
            created_at: gift.created_at,
        };
        insert_notification(&tx, &notification)?;

        tx.commit()?;
        Ok(notification)
    }

    fn list_gifts_sent(&self, user_id: &str, cursor: &str, limit: i32) -> Result<Vec<Gift>> {
        self.list_gifts("sender_id", user_id, cursor, limit)
    }

    fn list_gifts_received(&self, user_id: &str, cursor: &str, limit: i32) -> Result<Vec<Gift>> {
        self.list_gifts("recipient_id", user_id, cursor, limit)
    }

    // Shop operations

    fn create_shop_item(&self, item: &ShopItem) -> Result<()> {
        self.conn().execute(
            "INSERT INTO shop_items (id, name, description, price_coins, available, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                item.id,
                item.name,
                item.description,
                item.price_coins,
                item.available,
                format_datetime(&item.created_at),
            ],
        )?;
        Ok(())
    }

    fn get_shop_item(&self, id: &str) -> Result<Option<ShopItem>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, name, description, price_coins, available, created_at
             FROM shop_items WHERE id = ?1",
            params![id],
            map_shop_item,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_shop_items(&self, cursor: &str, limit: i32) -> Result<Vec<ShopItem>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, description, price_coins, available, created_at
             FROM shop_items WHERE id > ?1 ORDER BY id LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![cursor, limit], map_shop_item)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_shop_item(&self, item: &ShopItem) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE shop_items SET name = ?1, description = ?2, price_coins = ?3, available = ?4
             WHERE id = ?5",
            params![
                item.name,
                item.description,
                item.price_coins,
                item.available,
                item.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    // Items with purchase history cannot be deleted, only retired via
    // update; the purchases table is the coin ledger.
    fn delete_shop_item(&self, id: &str) -> Result<bool> {
        let result = self
            .conn()
            .execute("DELETE FROM shop_items WHERE id = ?1", params![id]);
        match result {
            Ok(rows) => Ok(rows > 0),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(Error::Conflict("item has purchase history".to_string()))
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn purchase_item(&self, purchase: &Purchase) -> Result<i64> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = format_datetime(&purchase.created_at);

        let available: Option<bool> = tx
            .query_row(
                "SELECT available FROM shop_items WHERE id = ?1",
                params![purchase.item_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(available) = available else {
            return Err(Error::NotFound);
        };
        if !available {
            return Err(Error::Conflict("item is not available".to_string()));
        }

        let balance: Option<i64> = tx
            .query_row(
                "SELECT coins FROM users WHERE id = ?1",
                params![purchase.user_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(balance) = balance else {
            return Err(Error::NotFound);
        };
        if balance < purchase.price_coins {
            return Err(Error::InsufficientCoins);
        }

        tx.execute(
            "UPDATE users SET coins = coins - ?1, updated_at = ?2 WHERE id = ?3",
            params![purchase.price_coins, now, purchase.user_id],
        )?;
        tx.execute(
            "INSERT INTO purchases (id, user_id, item_id, price_coins, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                purchase.id,
                purchase.user_id,
                purchase.item_id,
                purchase.price_coins,
                now,
            ],
        )?;

        tx.commit()?;
        Ok(balance - purchase.price_coins)
    }

    fn list_user_purchases(&self, user_id: &str) -> Result<Vec<Purchase>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, item_id, price_coins, created_at FROM purchases
             WHERE user_id = ?1 ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map(params![user_id], |row| {
            Ok(Purchase {
                id: row.get(0)?,
                user_id: row.get(1)?,
                item_id: row.get(2)?,
                price_coins: row.get(3)?,
                created_at: parse_datetime(&row.get::<_, String>(4)?),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Media object operations

    fn create_media_object(&self, obj: &MediaObject) -> Result<()> {
        self.conn().execute(
            "INSERT INTO media_objects (id, owner_id, oid, size, content_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                obj.id,
                obj.owner_id,
                obj.oid,
                obj.size,
                obj.content_type,
                format_datetime(&obj.created_at),
            ],
        )?;
        Ok(())
    }

    fn get_media_object(&self, id: &str) -> Result<Option<MediaObject>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, owner_id, oid, size, content_type, created_at
             FROM media_objects WHERE id = ?1",
            params![id],
            map_media,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_media_by_oid(&self, owner_id: &str, oid: &str) -> Result<Option<MediaObject>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, owner_id, oid, size, content_type, created_at
             FROM media_objects WHERE owner_id = ?1 AND oid = ?2",
            params![owner_id, oid],
            map_media,
        )
        .optional()
        .map_err(Error::from)
    }

    fn delete_media_object(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM media_objects WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn count_media_refs(&self, oid: &str) -> Result<i64> {
        let conn = self.conn();
        conn.query_row(
            "SELECT COUNT(*) FROM media_objects WHERE oid = ?1",
            params![oid],
            |row| row.get(0),
        )
        .map_err(Error::from)
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

impl SqliteStore {
    fn list_gifts(
        &self,
        column: &str,
        user_id: &str,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<Gift>> {
        let (ts, id) = desc_cursor(cursor);
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT id, sender_id, recipient_id, stream_id, gift_type, coins, created_at
             FROM gifts
             WHERE {column} = ?1 AND (created_at < ?2 OR (created_at = ?2 AND id < ?3))
             ORDER BY created_at DESC, id DESC LIMIT ?4"
        ))?;

        let rows = stmt.query_map(params![user_id, ts, id, limit], |row| {
            Ok(Gift {
                id: row.get(0)?,
                sender_id: row.get(1)?,
                recipient_id: row.get(2)?,
                stream_id: row.get(3)?,
                gift_type: row.get(4)?,
                coins: row.get(5)?,
                created_at: parse_datetime(&row.get::<_, String>(6)?),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}

fn insert_interaction(
    conn: &Connection,
    loop_id: &str,
    user_id: &str,
    kind: InteractionKind,
    now: &DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO loop_interactions (id, loop_id, user_id, kind, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            Uuid::new_v4().to_string(),
            loop_id,
            user_id,
            kind.as_str(),
            format_datetime(now),
        ],
    )?;
    Ok(())
}

fn insert_notification(conn: &Connection, n: &Notification) -> Result<()> {
    conn.execute(
        "INSERT INTO notifications (id, user_id, actor_id, kind, loop_id, coins, read, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            n.id,
            n.user_id,
            n.actor_id,
            n.kind.as_str(),
            n.loop_id,
            n.coins,
            n.read,
            format_datetime(&n.created_at),
        ],
    )?;
    Ok(())
}

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        bio: row.get(3)?,
        avatar_media_id: row.get(4)?,
        coins: row.get(5)?,
        earnings: row.get(6)?,
        created_at: parse_datetime(&row.get::<_, String>(7)?),
        updated_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

fn map_token(row: &rusqlite::Row<'_>) -> rusqlite::Result<Token> {
    Ok(Token {
        id: row.get(0)?,
        token_hash: row.get(1)?,
        token_lookup: row.get(2)?,
        is_admin: row.get(3)?,
        user_id: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        expires_at: row.get::<_, Option<String>>(6)?.map(|s| parse_datetime(&s)),
        last_used_at: row.get::<_, Option<String>>(7)?.map(|s| parse_datetime(&s)),
    })
}

fn map_circle(row: &rusqlite::Row<'_>) -> rusqlite::Result<Circle> {
    Ok(Circle {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        owner_id: row.get(3)?,
        public: row.get(4)?,
        member_count: row.get(5)?,
        created_at: parse_datetime(&row.get::<_, String>(6)?),
        updated_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

fn map_member(row: &rusqlite::Row<'_>) -> rusqlite::Result<CircleMember> {
    let role: String = row.get(2)?;
    Ok(CircleMember {
        circle_id: row.get(0)?,
        user_id: row.get(1)?,
        role: CircleRole::parse(&role).unwrap_or(CircleRole::Member),
        created_at: parse_datetime(&row.get::<_, String>(3)?),
    })
}

fn map_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<CircleEvent> {
    Ok(CircleEvent {
        id: row.get(0)?,
        circle_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        starts_at: parse_datetime(&row.get::<_, String>(4)?),
        max_participants: row.get(5)?,
        attendee_count: row.get(6)?,
        created_by: row.get(7)?,
        created_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

fn map_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    let kind: String = row.get(3)?;
    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        actor_id: row.get(2)?,
        kind: NotificationKind::parse(&kind).unwrap_or(NotificationKind::Branch),
        loop_id: row.get(4)?,
        coins: row.get(5)?,
        read: row.get(6)?,
        created_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

fn map_stream(row: &rusqlite::Row<'_>) -> rusqlite::Result<Stream> {
    Ok(Stream {
        id: row.get(0)?,
        host_id: row.get(1)?,
        title: row.get(2)?,
        category: row.get(3)?,
        live: row.get(4)?,
        started_at: parse_datetime(&row.get::<_, String>(5)?),
        ended_at: row.get::<_, Option<String>>(6)?.map(|s| parse_datetime(&s)),
    })
}

fn map_shop_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<ShopItem> {
    Ok(ShopItem {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        price_coins: row.get(3)?,
        available: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn map_media(row: &rusqlite::Row<'_>) -> rusqlite::Result<MediaObject> {
    Ok(MediaObject {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        oid: row.get(2)?,
        size: row.get(3)?,
        content_type: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, SqliteStore) {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        (temp, store)
    }

    fn make_user(id: &str, username: &str) -> User {
        User {
            id: id.to_string(),
            username: username.to_string(),
            display_name: None,
            bio: None,
            avatar_media_id: None,
            coins: 0,
            earnings: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn make_loop(id: &str, author_id: &str, parent: Option<&str>) -> Loop {
        Loop {
            id: id.to_string(),
            author_id: author_id.to_string(),
            circle_id: None,
            parent_loop_id: parent.map(|p| p.to_string()),
            content_text: format!("loop {id}"),
            media_id: None,
            category: None,
            public: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_initialize_creates_tables() {
        let (_temp, store) = test_store();

        let conn = store.connection();
        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'loops'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_user_crud() {
        let (_temp, store) = test_store();

        store.create_user(&make_user("u1", "ada")).unwrap();

        let fetched = store.get_user("u1").unwrap().unwrap();
        assert_eq!(fetched.username, "ada");
        assert_eq!(fetched.coins, 0);

        let by_name = store.get_user_by_username("ada").unwrap().unwrap();
        assert_eq!(by_name.id, "u1");

        let deleted = store.delete_user("u1").unwrap();
        assert!(deleted);
        assert!(store.get_user("u1").unwrap().is_none());
    }

    #[test]
    fn test_token_lookup_collision() {
        let (_temp, store) = test_store();

        let token1 = Token {
            id: "token-1".to_string(),
            token_hash: "hash1".to_string(),
            token_lookup: "lookup123".to_string(),
            is_admin: true,
            user_id: None,
            created_at: Utc::now(),
            expires_at: None,
            last_used_at: None,
        };
        store.create_token(&token1).unwrap();

        let token2 = Token {
            id: "token-2".to_string(),
            token_hash: "hash2".to_string(),
            token_lookup: "lookup123".to_string(), // Same lookup
            is_admin: true,
            user_id: None,
            created_at: Utc::now(),
            expires_at: None,
            last_used_at: None,
        };

        let result = store.create_token(&token2);
        assert!(matches!(result, Err(Error::TokenLookupCollision)));
    }

    #[test]
    fn test_branch_updates_ancestor_counters() {
        let (_temp, store) = test_store();
        store.create_user(&make_user("u1", "ada")).unwrap();

        store.create_loop(&make_loop("root", "u1", None), &[]).unwrap();
        store
            .create_loop(&make_loop("child", "u1", Some("root")), &[])
            .unwrap();
        store
            .create_loop(&make_loop("grandchild", "u1", Some("child")), &[])
            .unwrap();

        let root = store.get_loop_with_stats("root", "u1").unwrap().unwrap();
        assert_eq!(root.loop_stats.branches_count, 1);
        assert_eq!(root.loop_stats.comments_count, 2);

        let child = store.get_loop_with_stats("child", "u1").unwrap().unwrap();
        assert_eq!(child.loop_stats.branches_count, 1);
        assert_eq!(child.loop_stats.comments_count, 1);
    }

    #[test]
    fn test_branch_of_missing_parent() {
        let (_temp, store) = test_store();
        store.create_user(&make_user("u1", "ada")).unwrap();

        let result = store.create_loop(&make_loop("child", "u1", Some("nope")), &[]);
        assert!(matches!(result, Err(Error::NotFound)));
        assert!(store.get_loop("child").unwrap().is_none());
    }

    #[test]
    fn test_branch_notifies_parent_author() {
        let (_temp, store) = test_store();
        store.create_user(&make_user("u1", "ada")).unwrap();
        store.create_user(&make_user("u2", "grace")).unwrap();

        store.create_loop(&make_loop("root", "u1", None), &[]).unwrap();

        // Self-branch: no notification
        let none = store
            .create_loop(&make_loop("own", "u1", Some("root")), &[])
            .unwrap();
        assert!(none.is_none());

        let some = store
            .create_loop(&make_loop("other", "u2", Some("root")), &[])
            .unwrap();
        let n = some.unwrap();
        assert_eq!(n.user_id, "u1");
        assert_eq!(n.actor_id.as_deref(), Some("u2"));
        assert_eq!(n.kind, NotificationKind::Branch);
    }

    #[test]
    fn test_like_toggle_round_trip() {
        let (_temp, store) = test_store();
        store.create_user(&make_user("u1", "ada")).unwrap();
        store.create_user(&make_user("u2", "grace")).unwrap();
        store.create_loop(&make_loop("l1", "u1", None), &[]).unwrap();

        let on = store
            .apply_interaction("l1", "u2", InteractionKind::Like)
            .unwrap();
        assert!(on.active);
        assert_eq!(on.count, 1);
        assert!(on.notification.is_some());

        let off = store
            .apply_interaction("l1", "u2", InteractionKind::Like)
            .unwrap();
        assert!(!off.active);
        assert_eq!(off.count, 0);
        assert!(off.notification.is_none());

        let lw = store.get_loop_with_stats("l1", "u2").unwrap().unwrap();
        assert!(!lw.is_liked);
        assert_eq!(lw.loop_stats.likes_count, 0);
    }

    #[test]
    fn test_view_dedup_window() {
        let (_temp, store) = test_store();
        store.create_user(&make_user("u1", "ada")).unwrap();
        store.create_loop(&make_loop("l1", "u1", None), &[]).unwrap();

        let first = store
            .apply_interaction("l1", "u1", InteractionKind::View)
            .unwrap();
        assert!(first.active);
        assert_eq!(first.count, 1);

        let second = store
            .apply_interaction("l1", "u1", InteractionKind::View)
            .unwrap();
        assert!(!second.active);
        assert_eq!(second.count, 1);

        // Age the stored view past the window; the next view counts again
        {
            let conn = store.connection();
            let old = Utc::now() - Duration::seconds(VIEW_DEDUP_SECS + 60);
            conn.execute(
                "UPDATE loop_interactions SET created_at = ?1 WHERE kind = 'view'",
                params![old.to_rfc3339()],
            )
            .unwrap();
        }

        let third = store
            .apply_interaction("l1", "u1", InteractionKind::View)
            .unwrap();
        assert!(third.active);
        assert_eq!(third.count, 2);
    }

    #[test]
    fn test_delete_loop_repairs_counters() {
        let (_temp, store) = test_store();
        store.create_user(&make_user("u1", "ada")).unwrap();

        store.create_loop(&make_loop("root", "u1", None), &[]).unwrap();
        store
            .create_loop(&make_loop("child", "u1", Some("root")), &[])
            .unwrap();
        store
            .create_loop(&make_loop("gc1", "u1", Some("child")), &[])
            .unwrap();
        store
            .create_loop(&make_loop("gc2", "u1", Some("child")), &[])
            .unwrap();

        // Removing child takes its whole subtree with it
        assert!(store.delete_loop("child").unwrap());

        let root = store.get_loop_with_stats("root", "u1").unwrap().unwrap();
        assert_eq!(root.loop_stats.branches_count, 0);
        assert_eq!(root.loop_stats.comments_count, 0);
        assert!(store.get_loop("gc1").unwrap().is_none());
        assert!(store.get_loop("gc2").unwrap().is_none());
    }

    #[test]
    fn test_gift_transfer_conserves_value() {
        let (_temp, store) = test_store();
        store.create_user(&make_user("u1", "ada")).unwrap();
        store.create_user(&make_user("u2", "grace")).unwrap();
        store.grant_coins("u1", 100).unwrap();

        let gift = Gift {
            id: "g1".to_string(),
            sender_id: "u1".to_string(),
            recipient_id: "u2".to_string(),
            stream_id: None,
            gift_type: "rose".to_string(),
            coins: 30,
            created_at: Utc::now(),
        };
        let n = store.transfer_gift(&gift).unwrap();
        assert_eq!(n.coins, Some(30));

        assert_eq!(store.get_user("u1").unwrap().unwrap().coins, 70);
        assert_eq!(store.get_user("u2").unwrap().unwrap().earnings, 30);

        let broke = Gift {
            id: "g2".to_string(),
            coins: 1000,
            ..gift
        };
        let result = store.transfer_gift(&broke);
        assert!(matches!(result, Err(Error::InsufficientCoins)));
        assert_eq!(store.get_user("u1").unwrap().unwrap().coins, 70);
        assert_eq!(store.get_user("u2").unwrap().unwrap().earnings, 30);
    }

    #[test]
    fn test_event_capacity() {
        let (_temp, store) = test_store();
        store.create_user(&make_user("owner", "ada")).unwrap();
        let circle = Circle {
            id: "c1".to_string(),
            name: "rustaceans".to_string(),
            description: None,
            owner_id: "owner".to_string(),
            public: true,
            member_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.create_circle(&circle).unwrap();

        let event = CircleEvent {
            id: "e1".to_string(),
            circle_id: "c1".to_string(),
            title: "meetup".to_string(),
            description: None,
            starts_at: Utc::now(),
            max_participants: Some(2),
            attendee_count: 0,
            created_by: "owner".to_string(),
            created_at: Utc::now(),
        };
        // Creator is the only member, so nobody gets notified
        assert!(store.create_event(&event).unwrap().is_empty());

        store.create_user(&make_user("a", "a")).unwrap();
        store.create_user(&make_user("b", "b")).unwrap();
        store.create_user(&make_user("c", "c")).unwrap();

        assert_eq!(store.register_attendee("e1", "a").unwrap(), 1);
        assert_eq!(store.register_attendee("e1", "b").unwrap(), 2);
        assert!(matches!(
            store.register_attendee("e1", "c"),
            Err(Error::EventFull)
        ));

        // A registered user bounces off the duplicate check first
        assert!(matches!(
            store.register_attendee("e1", "a"),
            Err(Error::AlreadyExists)
        ));

        assert!(store.unregister_attendee("e1", "a").unwrap());
        assert_eq!(store.register_attendee("e1", "c").unwrap(), 2);
    }

    #[test]
    fn test_circle_delete_cascades() {
        let (_temp, store) = test_store();
        store.create_user(&make_user("owner", "ada")).unwrap();
        store.create_user(&make_user("m1", "grace")).unwrap();

        let circle = Circle {
            id: "c1".to_string(),
            name: "rustaceans".to_string(),
            description: None,
            owner_id: "owner".to_string(),
            public: true,
            member_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.create_circle(&circle).unwrap();
        store
            .add_circle_member("c1", "m1", CircleRole::Member)
            .unwrap();

        let event = CircleEvent {
            id: "e1".to_string(),
            circle_id: "c1".to_string(),
            title: "meetup".to_string(),
            description: None,
            starts_at: Utc::now(),
            max_participants: None,
            attendee_count: 0,
            created_by: "owner".to_string(),
            created_at: Utc::now(),
        };
        let event_notifications = store.create_event(&event).unwrap();
        assert_eq!(event_notifications.len(), 1);
        assert_eq!(event_notifications[0].user_id, "m1");
        assert_eq!(event_notifications[0].kind, NotificationKind::Event);
        store.register_attendee("e1", "m1").unwrap();

        let msg = CircleMessage {
            id: "msg1".to_string(),
            circle_id: "c1".to_string(),
            sender_id: "m1".to_string(),
            content: "hello".to_string(),
            created_at: Utc::now(),
        };
        store.create_circle_message(&msg).unwrap();

        assert!(store.delete_circle("c1").unwrap());

        let conn = store.connection();
        for table in [
            "circle_members",
            "circle_events",
            "event_attendees",
            "circle_messages",
        ] {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })
                .unwrap();
            assert_eq!(count, 0, "{table} not emptied");
        }
    }

    #[test]
    fn test_visibility_rules() {
        let (_temp, store) = test_store();
        store.create_user(&make_user("author", "ada")).unwrap();
        store.create_user(&make_user("member", "grace")).unwrap();
        store.create_user(&make_user("outsider", "linus")).unwrap();

        let circle = Circle {
            id: "c1".to_string(),
            name: "private-club".to_string(),
            description: None,
            owner_id: "author".to_string(),
            public: false,
            member_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.create_circle(&circle).unwrap();
        store
            .add_circle_member("c1", "member", CircleRole::Member)
            .unwrap();

        let mut hidden = make_loop("hidden", "author", None);
        hidden.circle_id = Some("c1".to_string());
        hidden.public = false;
        store.create_loop(&hidden, &[]).unwrap();

        let filter = LoopFilter::default();
        let for_member = store.list_loops(&filter, "member", "", 50).unwrap();
        assert_eq!(for_member.len(), 1);

        let for_outsider = store.list_loops(&filter, "outsider", "", 50).unwrap();
        assert!(for_outsider.is_empty());

        let for_author = store.list_loops(&filter, "author", "", 50).unwrap();
        assert_eq!(for_author.len(), 1);
    }

    #[test]
    fn test_loop_tree_depth_limit() {
        let (_temp, store) = test_store();
        store.create_user(&make_user("u1", "ada")).unwrap();

        store.create_loop(&make_loop("a", "u1", None), &[]).unwrap();
        store.create_loop(&make_loop("b", "u1", Some("a")), &[]).unwrap();
        store.create_loop(&make_loop("c", "u1", Some("b")), &[]).unwrap();
        store.create_loop(&make_loop("d", "u1", Some("c")), &[]).unwrap();

        let tree = store.get_loop_tree("a", "u1", 2).unwrap();
        let ids: Vec<&str> = tree.iter().map(|n| n.loop_.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(tree[2].depth, 2);
    }

    #[test]
    fn test_hashtag_filter() {
        let (_temp, store) = test_store();
        store.create_user(&make_user("u1", "ada")).unwrap();

        store
            .create_loop(&make_loop("l1", "u1", None), &["rust".to_string()])
            .unwrap();
        store
            .create_loop(&make_loop("l2", "u1", None), &["cats".to_string()])
            .unwrap();

        let filter = LoopFilter {
            hashtag: Some("rust".to_string()),
            ..Default::default()
        };
        let loops = store.list_loops(&filter, "u1", "", 50).unwrap();
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].loop_.id, "l1");
        assert_eq!(loops[0].hashtags, vec!["rust".to_string()]);
    }

    #[test]
    fn test_purchase_flow() {
        let (_temp, store) = test_store();
        store.create_user(&make_user("u1", "ada")).unwrap();
        store.grant_coins("u1", 50).unwrap();

        let item = ShopItem {
            id: "item1".to_string(),
            name: "badge".to_string(),
            description: None,
            price_coins: 20,
            available: true,
            created_at: Utc::now(),
        };
        store.create_shop_item(&item).unwrap();

        let purchase = Purchase {
            id: "p1".to_string(),
            user_id: "u1".to_string(),
            item_id: "item1".to_string(),
            price_coins: 20,
            created_at: Utc::now(),
        };
        let remaining = store.purchase_item(&purchase).unwrap();
        assert_eq!(remaining, 30);

        let mut unavailable = item.clone();
        unavailable.available = false;
        store.update_shop_item(&unavailable).unwrap();

        let again = Purchase {
            id: "p2".to_string(),
            ..purchase
        };
        assert!(matches!(
            store.purchase_item(&again),
            Err(Error::Conflict(_))
        ));
    }
}

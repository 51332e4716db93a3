//! Database repository for feed queries and mutations.
//!
//! Uses prepared statements and transactions for data integrity.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::errors::AppError;
use crate::models::{
    Comment, NewPost, NewUser, Page, Post, PostId, PostSummary, User, UNKNOWN_AUTHOR,
};

const POST_COLUMNS: &str = "p.id, p.title, p.content, p.published, p.author_id, p.created_at";

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== USER OPERATIONS ====================

    /// Count all users.
    pub async fn count_users(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("total"))
    }

    /// List all users ordered by id.
    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        let rows = sqlx::query("SELECT id, name, email FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| User {
                id: row.get("id"),
                name: row.get("name"),
                email: row.get("email"),
            })
            .collect())
    }

    /// Insert users in one transaction, returning their ids in input order.
    pub async fn insert_users(&self, users: &[NewUser]) -> Result<Vec<i64>, AppError> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(users.len());

        for user in users {
            let result = sqlx::query("INSERT INTO users (name, email) VALUES (?, ?)")
                .bind(&user.name)
                .bind(&user.email)
                .execute(&mut *tx)
                .await?;
            ids.push(result.last_insert_rowid());
        }

        tx.commit().await?;
        Ok(ids)
    }

    // ==================== POST OPERATIONS ====================

    /// Count all posts, published or not.
    pub async fn count_posts(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("total"))
    }

    /// Check whether a post with the given id exists.
    pub async fn post_exists(&self, id: PostId) -> Result<bool, AppError> {
        let row = sqlx::query("SELECT 1 FROM posts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Insert posts in one transaction, returning their ids in input order.
    pub async fn insert_posts(&self, posts: &[NewPost]) -> Result<Vec<PostId>, AppError> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(posts.len());

        for post in posts {
            let result = sqlx::query(
                "INSERT INTO posts (title, content, published, author_id, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&post.title)
            .bind(&post.content)
            .bind(post.published as i32)
            .bind(post.author_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
            ids.push(result.last_insert_rowid());
        }

        tx.commit().await?;
        Ok(ids)
    }

    /// List one page of published posts after `cursor`, ascending by id.
    pub async fn list_posts(
        &self,
        cursor: Option<PostId>,
        limit: i64,
    ) -> Result<Page<Post>, AppError> {
        self.ensure_cursor(cursor).await?;

        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts p WHERE p.published = 1 AND p.id > ? ORDER BY p.id ASC LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(cursor.unwrap_or(0))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        let posts = rows.iter().map(post_from_row).collect();
        Ok(Page::from_rows(posts, limit, |p: &Post| p.id))
    }

    /// Like [`Repository::list_posts`], with author display names and comment counts
    /// aggregated at query time.
    pub async fn list_post_summaries(
        &self,
        cursor: Option<PostId>,
        limit: i64,
    ) -> Result<Page<PostSummary>, AppError> {
        self.ensure_cursor(cursor).await?;

        let sql = format!(
            r#"SELECT {POST_COLUMNS}, u.name AS author_name,
                      (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count
               FROM posts p
               LEFT JOIN users u ON u.id = p.author_id
               WHERE p.published = 1 AND p.id > ?
               ORDER BY p.id ASC
               LIMIT ?"#
        );
        let rows = sqlx::query(&sql)
            .bind(cursor.unwrap_or(0))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        let posts = rows.iter().map(summary_from_row).collect();
        Ok(Page::from_rows(posts, limit, PostSummary::id))
    }

    /// A cursor must name a post that exists, published or not.
    async fn ensure_cursor(&self, cursor: Option<PostId>) -> Result<(), AppError> {
        if let Some(cursor) = cursor {
            if !self.post_exists(cursor).await? {
                return Err(AppError::NotFound(format!("Cursor post {} not found", cursor)));
            }
        }
        Ok(())
    }

    // ==================== COMMENT OPERATIONS ====================

    /// List all comments of a post, ascending by id.
    pub async fn get_comments(&self, post_id: PostId) -> Result<Vec<Comment>, AppError> {
        if !self.post_exists(post_id).await? {
            return Err(AppError::NotFound(format!("Post {} not found", post_id)));
        }

        let rows = sqlx::query(
            "SELECT id, content, post_id, created_at FROM comments WHERE post_id = ? ORDER BY id ASC",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(comment_from_row).collect())
    }

    /// Create a comment on an existing post.
    pub async fn create_comment(&self, post_id: PostId, content: &str) -> Result<Comment, AppError> {
        if !self.post_exists(post_id).await? {
            return Err(AppError::NotFound(format!("Post {} not found", post_id)));
        }

        let now = Utc::now();
        let result =
            sqlx::query("INSERT INTO comments (content, post_id, created_at) VALUES (?, ?, ?)")
                .bind(content)
                .bind(post_id)
                .bind(now)
                .execute(&self.pool)
                .await?;

        Ok(Comment {
            id: result.last_insert_rowid(),
            content: content.to_string(),
            post_id,
            created_at: now,
        })
    }

    /// Insert comments in one transaction. Returns the number inserted.
    pub async fn insert_comments(&self, comments: &[(PostId, String)]) -> Result<usize, AppError> {
        let mut tx = self.pool.begin().await?;

        for (post_id, content) in comments {
            sqlx::query("INSERT INTO comments (content, post_id, created_at) VALUES (?, ?, ?)")
                .bind(content)
                .bind(post_id)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(comments.len())
    }
}

// Helper functions for row conversion

fn post_from_row(row: &sqlx::sqlite::SqliteRow) -> Post {
    let published: i32 = row.get("published");
    let created_at: DateTime<Utc> = row.get("created_at");
    Post {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        published: published != 0,
        author_id: row.get("author_id"),
        created_at,
    }
}

fn summary_from_row(row: &sqlx::sqlite::SqliteRow) -> PostSummary {
    let author_name: Option<String> = row.get("author_name");
    PostSummary {
        post: post_from_row(row),
        author_name: author_name.unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
        comment_count: row.get("comment_count"),
    }
}

fn comment_from_row(row: &sqlx::sqlite::SqliteRow) -> Comment {
    Comment {
        id: row.get("id"),
        content: row.get("content"),
        post_id: row.get("post_id"),
        created_at: row.get("created_at"),
    }
}

//! Book repository implementation

use crate::error::Result;
use crate::models::{Book, BookId};
use rusqlite::{params, Connection, OptionalExtension};

const BOOK_COLUMNS: &str =
    "id, title, author, year, cover_reference, local_photo_ref, created_at, dirty, revision";

/// Trait for book storage operations
pub trait BookRepository {
    /// Get a book by ID
    fn get(&self, id: &BookId) -> Result<Option<Book>>;

    /// Insert or fully replace a book by id, returning the row's new revision
    fn upsert(&self, book: &Book) -> Result<i64>;

    /// Delete a book; returns whether a row was removed
    fn delete(&self, id: &BookId) -> Result<bool>;

    /// Set the dirty bit without touching other fields
    fn mark_dirty(&self, id: &BookId, dirty: bool) -> Result<bool>;

    /// Clear the dirty bit only if the row is still at `revision`
    fn clear_dirty(&self, id: &BookId, revision: i64) -> Result<bool>;

    /// List all books, newest first
    fn list_all(&self) -> Result<Vec<Book>>;

    /// Case-insensitive substring search over title and author, newest first
    fn search(&self, query: &str) -> Result<Vec<Book>>;

    /// List books with unconfirmed local changes, newest first
    fn list_dirty(&self) -> Result<Vec<Book>>;

    /// Count stored books
    fn count(&self) -> Result<usize>;
}

/// `SQLite` implementation of `BookRepository`
pub struct SqliteBookRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteBookRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a book from a database row
    fn parse_book(row: &rusqlite::Row<'_>) -> rusqlite::Result<Book> {
        Ok(Book {
            id: BookId::new(row.get::<_, String>(0)?),
            title: row.get(1)?,
            author: row.get(2)?,
            year: row.get(3)?,
            cover_reference: row.get(4)?,
            local_photo_ref: row.get(5)?,
            created_at: row.get(6)?,
            dirty: row.get::<_, i32>(7)? != 0,
            revision: row.get(8)?,
        })
    }

    fn query_books(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Book>> {
        let mut stmt = self.conn.prepare(sql)?;
        let books = stmt
            .query_map(params, Self::parse_book)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(books)
    }
}

/// Build a `LIKE` pattern matching `query` literally anywhere in the value.
fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

impl BookRepository for SqliteBookRepository<'_> {
    fn get(&self, id: &BookId) -> Result<Option<Book>> {
        let book = self
            .conn
            .query_row(
                &format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?"),
                params![id.as_str()],
                Self::parse_book,
            )
            .optional()?;
        Ok(book)
    }

    fn upsert(&self, book: &Book) -> Result<i64> {
        let revision = self.conn.query_row(
            "INSERT INTO books (id, title, author, year, cover_reference, local_photo_ref, created_at, dirty, revision)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                author = excluded.author,
                year = excluded.year,
                cover_reference = excluded.cover_reference,
                local_photo_ref = excluded.local_photo_ref,
                created_at = excluded.created_at,
                dirty = excluded.dirty,
                revision = books.revision + 1
             RETURNING revision",
            params![
                book.id.as_str(),
                book.title,
                book.author,
                book.year,
                book.cover_reference,
                book.local_photo_ref,
                book.created_at,
                i32::from(book.dirty)
            ],
            |row| row.get(0),
        )?;
        Ok(revision)
    }

    fn delete(&self, id: &BookId) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM books WHERE id = ?", params![id.as_str()])?;
        Ok(rows > 0)
    }

    fn mark_dirty(&self, id: &BookId, dirty: bool) -> Result<bool> {
        let rows = if dirty {
            self.conn.execute(
                "UPDATE books SET dirty = 1, revision = revision + 1 WHERE id = ?",
                params![id.as_str()],
            )?
        } else {
            self.conn.execute(
                "UPDATE books SET dirty = 0 WHERE id = ?",
                params![id.as_str()],
            )?
        };
        Ok(rows > 0)
    }

    fn clear_dirty(&self, id: &BookId, revision: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE books SET dirty = 0 WHERE id = ? AND revision = ?",
            params![id.as_str(), revision],
        )?;
        Ok(rows > 0)
    }

    fn list_all(&self) -> Result<Vec<Book>> {
        self.query_books(
            &format!("SELECT {BOOK_COLUMNS} FROM books ORDER BY created_at DESC, id ASC"),
            [],
        )
    }

    fn search(&self, query: &str) -> Result<Vec<Book>> {
        let query = query.trim();
        if query.is_empty() {
            return self.list_all();
        }

        self.query_books(
            &format!(
                "SELECT {BOOK_COLUMNS} FROM books
                 WHERE title LIKE ?1 ESCAPE '\\' OR author LIKE ?1 ESCAPE '\\'
                 ORDER BY created_at DESC, id ASC"
            ),
            params![like_pattern(query)],
        )
    }

    fn list_dirty(&self) -> Result<Vec<Book>> {
        self.query_books(
            &format!(
                "SELECT {BOOK_COLUMNS} FROM books WHERE dirty = 1 ORDER BY created_at DESC, id ASC"
            ),
            [],
        )
    }

    fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM books", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

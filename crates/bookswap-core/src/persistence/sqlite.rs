// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed persistence implementation.

use std::path::Path;

use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use crate::error::{CoreError, Entity};
use crate::migrations;
use crate::status::Transition;

use super::{
    AuthorRecord, BookRecord, BookingRecord, ExchangePointRecord, InstanceRecord, Materialization,
    MaterializedInstance, ModerationRequestRecord, NewBook, NewModerationRequest, NewUser,
    OrganisationRecord, Persistence, ShelfRecord, UserRecord, UserUpdate, ensure_booking_holder,
    rejected_transition,
};

const INSTANCE_COLUMNS: &str =
    "id, book_id, user_id, owner_id, exchange_point_id, status, created_at";
const BOOKING_COLUMNS: &str = "id, user_id, instance_id, book_id, created_at";
const BOOK_COLUMNS: &str = "id, author_id, title, genre, year, isbn, description, image";
const REQUEST_COLUMNS: &str = "id, owner_id, title, author, address, created_at";

/// SQLite-backed persistence provider.
#[derive(Clone)]
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    /// Create a new SQLite persistence provider from an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `url`, run migrations and return the provider.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, CoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| CoreError::Database {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at {}: {}", url, e),
            })?;

        migrations::run_sqlite(&pool).await?;

        Ok(Self { pool })
    }

    /// Create and initialize a new SQLite persistence from a file path.
    ///
    /// Creates parent directories and the database file if they don't exist,
    /// then runs all migrations.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::Database {
                operation: "create_dir".to_string(),
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        Self::connect(&url, 5).await
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl Persistence for SqlitePersistence {
    async fn create_user(&self, user: &NewUser) -> Result<i64, CoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO users (name, lastname, email, hashed_password, role)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&user.name)
        .bind(&user.lastname)
        .bind(&user.email)
        .bind(&user.hashed_password)
        .bind(&user.role)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn create_organisation(
        &self,
        name: &str,
        address: &str,
        description: Option<&str>,
    ) -> Result<i64, CoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO organisations (name, address, description) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(address)
        .bind(description)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn create_exchange_point(
        &self,
        organisation_id: Option<i64>,
        address: &str,
        description: Option<&str>,
    ) -> Result<i64, CoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO exchange_points (organisation_id, address, description)
            VALUES (?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(organisation_id)
        .bind(address)
        .bind(description)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn create_author(&self, fullname: &str, country: Option<&str>) -> Result<i64, CoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO authors (fullname, country) VALUES (?, ?) RETURNING id",
        )
        .bind(fullname)
        .bind(country)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn create_book(&self, book: &NewBook) -> Result<i64, CoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO books (author_id, title, genre, year, isbn, description, image)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(book.author_id)
        .bind(&book.title)
        .bind(&book.genre)
        .bind(book.year)
        .bind(&book.isbn)
        .bind(&book.description)
        .bind(&book.image)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn create_instance(
        &self,
        book_id: i64,
        owner_id: i64,
        exchange_point_id: i64,
    ) -> Result<InstanceRecord, CoreError> {
        let record = sqlx::query_as::<_, InstanceRecord>(&format!(
            r#"
            INSERT INTO instances (book_id, user_id, owner_id, exchange_point_id, status, created_at)
            VALUES (?, NULL, ?, ?, 'FREE', ?)
            RETURNING {INSTANCE_COLUMNS}
            "#
        ))
        .bind(book_id)
        .bind(owner_id)
        .bind(exchange_point_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<UserRecord>, CoreError> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, name, lastname, email, role, email_verified FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn update_user(
        &self,
        user_id: i64,
        update: &UserUpdate,
    ) -> Result<Option<UserRecord>, CoreError> {
        let result = sqlx::query_as::<_, UserRecord>(
            r#"
            UPDATE users
            SET name = COALESCE(?1, name),
                lastname = COALESCE(?2, lastname),
                email = COALESCE(?3, email)
            WHERE id = ?4
            RETURNING id, name, lastname, email, role, email_verified
            "#,
        )
        .bind(update.name.as_deref())
        .bind(update.lastname.as_deref())
        .bind(update.email.as_deref())
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(record) => Ok(record),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(
                CoreError::validation("email", "address is already registered"),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_author(&self, author_id: i64) -> Result<Option<AuthorRecord>, CoreError> {
        let record = sqlx::query_as::<_, AuthorRecord>(
            "SELECT id, fullname, birthday, country FROM authors WHERE id = ?",
        )
        .bind(author_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn find_author_by_fullname(
        &self,
        fullname: &str,
    ) -> Result<Option<AuthorRecord>, CoreError> {
        let record = sqlx::query_as::<_, AuthorRecord>(
            "SELECT id, fullname, birthday, country FROM authors WHERE fullname = ? ORDER BY id LIMIT 1",
        )
        .bind(fullname)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get_book(&self, book_id: i64) -> Result<Option<BookRecord>, CoreError> {
        let record =
            sqlx::query_as::<_, BookRecord>(&format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?"))
                .bind(book_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(record)
    }

    async fn get_organisation(
        &self,
        organisation_id: i64,
    ) -> Result<Option<OrganisationRecord>, CoreError> {
        let record = sqlx::query_as::<_, OrganisationRecord>(
            "SELECT id, name, address, description FROM organisations WHERE id = ?",
        )
        .bind(organisation_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get_exchange_point(
        &self,
        exchange_point_id: i64,
    ) -> Result<Option<ExchangePointRecord>, CoreError> {
        let record = sqlx::query_as::<_, ExchangePointRecord>(
            "SELECT id, organisation_id, address, description FROM exchange_points WHERE id = ?",
        )
        .bind(exchange_point_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_exchange_points(&self) -> Result<Vec<ExchangePointRecord>, CoreError> {
        let rows = sqlx::query_as::<_, ExchangePointRecord>(
            "SELECT id, organisation_id, address, description FROM exchange_points ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn list_shelves(&self) -> Result<Vec<ShelfRecord>, CoreError> {
        let rows = sqlx::query_as::<_, ShelfRecord>(
            r#"
            SELECT p.id, o.name, p.address,
                   COALESCE(p.description, o.description) AS description
            FROM exchange_points p
            JOIN organisations o ON o.id = p.organisation_id
            ORDER BY o.name ASC, p.address ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn get_instance(&self, instance_id: i64) -> Result<Option<InstanceRecord>, CoreError> {
        let record = sqlx::query_as::<_, InstanceRecord>(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM instances WHERE id = ?"
        ))
        .bind(instance_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_free_instances(&self, book_id: i64) -> Result<Vec<InstanceRecord>, CoreError> {
        let rows = sqlx::query_as::<_, InstanceRecord>(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM instances WHERE book_id = ? AND status = 'FREE' ORDER BY id DESC"
        ))
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn list_instances_by_owner(
        &self,
        owner_id: i64,
    ) -> Result<Vec<InstanceRecord>, CoreError> {
        let rows = sqlx::query_as::<_, InstanceRecord>(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM instances WHERE owner_id = ? ORDER BY id DESC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn list_rented_instances(
        &self,
        user_id: i64,
    ) -> Result<Vec<InstanceRecord>, CoreError> {
        let rows = sqlx::query_as::<_, InstanceRecord>(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM instances WHERE user_id = ? AND status = 'OWNED' ORDER BY id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn get_booking(&self, booking_id: i64) -> Result<Option<BookingRecord>, CoreError> {
        let record = sqlx::query_as::<_, BookingRecord>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?"
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn find_booking(
        &self,
        user_id: i64,
        book_id: i64,
    ) -> Result<Option<BookingRecord>, CoreError> {
        let record = sqlx::query_as::<_, BookingRecord>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = ? AND book_id = ? ORDER BY id DESC LIMIT 1"
        ))
        .bind(user_id)
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_bookings_by_instance(
        &self,
        instance_id: i64,
    ) -> Result<Vec<BookingRecord>, CoreError> {
        let rows = sqlx::query_as::<_, BookingRecord>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE instance_id = ? ORDER BY id"
        ))
        .bind(instance_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn list_bookings_by_user(&self, user_id: i64) -> Result<Vec<BookingRecord>, CoreError> {
        let rows = sqlx::query_as::<_, BookingRecord>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = ? ORDER BY id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn get_moderation_request(
        &self,
        request_id: i64,
    ) -> Result<Option<ModerationRequestRecord>, CoreError> {
        let record = sqlx::query_as::<_, ModerationRequestRecord>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM moderation_requests WHERE id = ?"
        ))
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_moderation_requests(
        &self,
        owner_id: Option<i64>,
    ) -> Result<Vec<ModerationRequestRecord>, CoreError> {
        let rows = sqlx::query_as::<_, ModerationRequestRecord>(&format!(
            r#"
            SELECT {REQUEST_COLUMNS}
            FROM moderation_requests
            WHERE (?1 IS NULL OR owner_id = ?1)
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn count_users(&self) -> Result<i64, CoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_instances(&self) -> Result<i64, CoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM instances")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_organisations(&self) -> Result<i64, CoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM organisations")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn list_organisation_names(&self) -> Result<Vec<String>, CoreError> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT name FROM organisations WHERE name <> '' ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    async fn reserve_instance(
        &self,
        instance_id: i64,
        book_id: i64,
        user_id: i64,
    ) -> Result<BookingRecord, CoreError> {
        let transition = Transition::Reserve;
        let mut tx = self.pool.begin().await?;

        // Conditional update first: this takes the write lock before anything
        // else is read, so concurrent reservations serialize here.
        let result = sqlx::query(
            r#"
            UPDATE instances
            SET status = ?1, user_id = ?2
            WHERE id = ?3 AND book_id = ?4 AND status = ?5
            "#,
        )
        .bind(transition.target().as_str())
        .bind(user_id)
        .bind(instance_id)
        .bind(book_id)
        .bind(transition.source().as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let row = sqlx::query_as::<_, InstanceRecord>(&format!(
                "SELECT {INSTANCE_COLUMNS} FROM instances WHERE id = ?"
            ))
            .bind(instance_id)
            .fetch_optional(&mut *tx)
            .await?;
            return Err(rejected_transition(
                instance_id,
                transition,
                row.filter(|i| i.book_id == book_id),
            ));
        }

        let booking = sqlx::query_as::<_, BookingRecord>(&format!(
            r#"
            INSERT INTO bookings (user_id, instance_id, book_id, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(instance_id)
        .bind(book_id)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(booking)
    }

    async fn confirm_pickup(
        &self,
        booking_id: i64,
        user_id: i64,
    ) -> Result<InstanceRecord, CoreError> {
        self.finish_booking(booking_id, user_id, Transition::ConfirmPickup)
            .await
    }

    async fn cancel_booking(
        &self,
        booking_id: i64,
        user_id: i64,
    ) -> Result<InstanceRecord, CoreError> {
        self.finish_booking(booking_id, user_id, Transition::Cancel)
            .await
    }

    async fn return_instance(
        &self,
        instance_id: i64,
        user_id: i64,
        exchange_point_id: i64,
    ) -> Result<InstanceRecord, CoreError> {
        let transition = Transition::Return;
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, InstanceRecord>(&format!(
            r#"
            UPDATE instances
            SET status = ?1, user_id = NULL, exchange_point_id = ?2
            WHERE id = ?3 AND user_id = ?4 AND status = ?5
              AND EXISTS (SELECT 1 FROM exchange_points WHERE id = ?2)
            RETURNING {INSTANCE_COLUMNS}
            "#
        ))
        .bind(transition.target().as_str())
        .bind(exchange_point_id)
        .bind(instance_id)
        .bind(user_id)
        .bind(transition.source().as_str())
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(instance) = updated {
            tx.commit().await?;
            return Ok(instance);
        }

        let point_exists =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM exchange_points WHERE id = ?")
                .bind(exchange_point_id)
                .fetch_one(&mut *tx)
                .await?
                > 0;
        if !point_exists {
            return Err(CoreError::not_found(Entity::ExchangePoint, exchange_point_id));
        }

        let row = sqlx::query_as::<_, InstanceRecord>(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM instances WHERE id = ?"
        ))
        .bind(instance_id)
        .fetch_optional(&mut *tx)
        .await?;
        Err(rejected_transition(
            instance_id,
            transition,
            row.filter(|i| i.holder() == Some(user_id)),
        ))
    }

    async fn insert_moderation_request(
        &self,
        request: &NewModerationRequest,
    ) -> Result<ModerationRequestRecord, CoreError> {
        let record = sqlx::query_as::<_, ModerationRequestRecord>(&format!(
            r#"
            INSERT INTO moderation_requests (owner_id, title, author, address, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {REQUEST_COLUMNS}
            "#
        ))
        .bind(request.owner_id)
        .bind(&request.title)
        .bind(&request.author)
        .bind(&request.address)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn delete_moderation_request(&self, request_id: i64) -> Result<bool, CoreError> {
        let result = sqlx::query("DELETE FROM moderation_requests WHERE id = ?")
            .bind(request_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn materialize_moderation_request(
        &self,
        request_id: i64,
        m: &Materialization,
    ) -> Result<MaterializedInstance, CoreError> {
        let mut tx = self.pool.begin().await?;

        // Consuming the request first makes a concurrent second approval fail
        // with NotFound instead of producing a duplicate instance.
        let owner_id = sqlx::query_scalar::<_, i64>(
            "DELETE FROM moderation_requests WHERE id = ? RETURNING owner_id",
        )
        .bind(request_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CoreError::not_found(Entity::ModerationRequest, request_id))?;

        let point_exists =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM exchange_points WHERE id = ?")
                .bind(m.exchange_point_id)
                .fetch_one(&mut *tx)
                .await?
                > 0;
        if !point_exists {
            return Err(CoreError::not_found(
                Entity::ExchangePoint,
                m.exchange_point_id,
            ));
        }

        let existing_author = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM authors WHERE fullname = ? ORDER BY id LIMIT 1",
        )
        .bind(&m.author_fullname)
        .fetch_optional(&mut *tx)
        .await?;
        let (author_id, author_created) = match existing_author {
            Some(id) => (id, false),
            None => {
                let id = sqlx::query_scalar::<_, i64>(
                    "INSERT INTO authors (fullname, country) VALUES (?, ?) RETURNING id",
                )
                .bind(&m.author_fullname)
                .bind(&m.author_country)
                .fetch_one(&mut *tx)
                .await?;
                (id, true)
            }
        };

        let existing_book = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM books WHERE title = ? ORDER BY id LIMIT 1",
        )
        .bind(&m.title)
        .fetch_optional(&mut *tx)
        .await?;
        let (book_id, book_created) = match existing_book {
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE books
                    SET genre = COALESCE(?1, genre),
                        year = COALESCE(?2, year),
                        isbn = COALESCE(?3, isbn),
                        description = COALESCE(?4, description),
                        image = COALESCE(?5, image)
                    WHERE id = ?6
                    "#,
                )
                .bind(&m.genre)
                .bind(m.year)
                .bind(&m.isbn)
                .bind(&m.description)
                .bind(&m.image)
                .bind(id)
                .execute(&mut *tx)
                .await?;
                (id, false)
            }
            None => {
                let id = sqlx::query_scalar::<_, i64>(
                    r#"
                    INSERT INTO books (author_id, title, genre, year, isbn, description, image)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    RETURNING id
                    "#,
                )
                .bind(author_id)
                .bind(&m.title)
                .bind(&m.genre)
                .bind(m.year)
                .bind(&m.isbn)
                .bind(&m.description)
                .bind(&m.image)
                .fetch_one(&mut *tx)
                .await?;
                (id, true)
            }
        };

        let instance = sqlx::query_as::<_, InstanceRecord>(&format!(
            r#"
            INSERT INTO instances (book_id, user_id, owner_id, exchange_point_id, status, created_at)
            VALUES (?, NULL, ?, ?, 'FREE', ?)
            RETURNING {INSTANCE_COLUMNS}
            "#
        ))
        .bind(book_id)
        .bind(owner_id)
        .bind(m.exchange_point_id)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(MaterializedInstance {
            author_id,
            author_created,
            book_id,
            book_created,
            instance,
        })
    }
}

impl SqlitePersistence {
    /// Shared body of confirm-pickup and cancel: both leave BOOKED and delete
    /// the booking row.
    async fn finish_booking(
        &self,
        booking_id: i64,
        user_id: i64,
        transition: Transition,
    ) -> Result<InstanceRecord, CoreError> {
        // Holder after the transition: the borrower on pickup, nobody on cancel.
        let holder = match transition {
            Transition::ConfirmPickup => Some(user_id),
            _ => None,
        };

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, InstanceRecord>(&format!(
            r#"
            UPDATE instances
            SET status = ?1, user_id = ?2
            WHERE status = ?3
              AND id = (SELECT instance_id FROM bookings WHERE id = ?4 AND user_id = ?5)
            RETURNING {INSTANCE_COLUMNS}
            "#
        ))
        .bind(transition.target().as_str())
        .bind(holder)
        .bind(transition.source().as_str())
        .bind(booking_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(instance) = updated else {
            let booking = sqlx::query_as::<_, BookingRecord>(&format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?"
            ))
            .bind(booking_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::not_found(Entity::Booking, booking_id))?;
            ensure_booking_holder(&booking, user_id)?;

            let row = sqlx::query_as::<_, InstanceRecord>(&format!(
                "SELECT {INSTANCE_COLUMNS} FROM instances WHERE id = ?"
            ))
            .bind(booking.instance_id)
            .fetch_optional(&mut *tx)
            .await?;
            return Err(rejected_transition(booking.instance_id, transition, row));
        };

        sqlx::query("DELETE FROM bookings WHERE id = ?")
            .bind(booking_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Create an in-memory SQLite pool for testing.
    async fn test_persistence() -> SqlitePersistence {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");

        migrations::SQLITE
            .run(&pool)
            .await
            .expect("Failed to run migrations");

        SqlitePersistence::new(pool)
    }

    struct Seed {
        owner: i64,
        reader: i64,
        other_reader: i64,
        point: i64,
        other_point: i64,
        book: i64,
    }

    async fn seed(p: &SqlitePersistence) -> Seed {
        let mut users = Vec::new();
        for (i, name) in ["Olga", "Ivan", "Petr"].iter().enumerate() {
            let id = p
                .create_user(&NewUser {
                    name: name.to_string(),
                    lastname: "Test".to_string(),
                    email: format!("user{}@example.com", i),
                    hashed_password: "x".to_string(),
                    role: "USER".to_string(),
                })
                .await
                .unwrap();
            users.push(id);
        }
        let org = p
            .create_organisation("City Library", "Main st. 1", None)
            .await
            .unwrap();
        let point = p
            .create_exchange_point(Some(org), "Main st. 1, hall", None)
            .await
            .unwrap();
        let other_point = p
            .create_exchange_point(Some(org), "Park ave. 5", None)
            .await
            .unwrap();
        let author = p.create_author("Frank Herbert", None).await.unwrap();
        let book = p
            .create_book(&NewBook {
                author_id: author,
                title: "Dune".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        Seed {
            owner: users[0],
            reader: users[1],
            other_reader: users[2],
            point,
            other_point,
            book,
        }
    }

    #[tokio::test]
    async fn test_create_instance_starts_free() {
        let p = test_persistence().await;
        let s = seed(&p).await;

        let instance = p.create_instance(s.book, s.owner, s.point).await.unwrap();

        assert_eq!(instance.status, "FREE");
        assert_eq!(instance.user_id, None);
        assert_eq!(instance.owner_id, s.owner);
    }

    #[tokio::test]
    async fn test_reserve_sets_holder_and_creates_booking() {
        let p = test_persistence().await;
        let s = seed(&p).await;
        let instance = p.create_instance(s.book, s.owner, s.point).await.unwrap();

        let booking = p
            .reserve_instance(instance.id, s.book, s.reader)
            .await
            .unwrap();

        assert_eq!(booking.user_id, s.reader);
        assert_eq!(booking.instance_id, instance.id);
        let stored = p.get_instance(instance.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "BOOKED");
        assert_eq!(stored.user_id, Some(s.reader));
    }

    #[tokio::test]
    async fn test_second_reserve_conflicts() {
        let p = test_persistence().await;
        let s = seed(&p).await;
        let instance = p.create_instance(s.book, s.owner, s.point).await.unwrap();

        p.reserve_instance(instance.id, s.book, s.reader)
            .await
            .unwrap();
        let err = p
            .reserve_instance(instance.id, s.book, s.other_reader)
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "CONFLICT");
        let bookings = p.list_bookings_by_instance(instance.id).await.unwrap();
        assert_eq!(bookings.len(), 1);
        assert_eq!(bookings[0].user_id, s.reader);
    }

    #[tokio::test]
    async fn test_reserve_with_wrong_book_is_not_found() {
        let p = test_persistence().await;
        let s = seed(&p).await;
        let instance = p.create_instance(s.book, s.owner, s.point).await.unwrap();

        let err = p
            .reserve_instance(instance.id, s.book + 100, s.reader)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");

        let err = p.reserve_instance(9999, s.book, s.reader).await.unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_confirm_by_other_user_is_forbidden_and_rolls_back() {
        let p = test_persistence().await;
        let s = seed(&p).await;
        let instance = p.create_instance(s.book, s.owner, s.point).await.unwrap();
        let booking = p
            .reserve_instance(instance.id, s.book, s.reader)
            .await
            .unwrap();

        let err = p
            .confirm_pickup(booking.id, s.other_reader)
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "FORBIDDEN");
        assert!(p.get_booking(booking.id).await.unwrap().is_some());
        let stored = p.get_instance(instance.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "BOOKED");
    }

    #[tokio::test]
    async fn test_return_moves_instance_to_drop_off_point() {
        let p = test_persistence().await;
        let s = seed(&p).await;
        let instance = p.create_instance(s.book, s.owner, s.point).await.unwrap();
        let booking = p
            .reserve_instance(instance.id, s.book, s.reader)
            .await
            .unwrap();
        p.confirm_pickup(booking.id, s.reader).await.unwrap();

        let returned = p
            .return_instance(instance.id, s.reader, s.other_point)
            .await
            .unwrap();

        assert_eq!(returned.status, "FREE");
        assert_eq!(returned.user_id, None);
        assert_eq!(returned.exchange_point_id, s.other_point);
    }

    #[tokio::test]
    async fn test_return_to_unknown_point_is_not_found() {
        let p = test_persistence().await;
        let s = seed(&p).await;
        let instance = p.create_instance(s.book, s.owner, s.point).await.unwrap();
        let booking = p
            .reserve_instance(instance.id, s.book, s.reader)
            .await
            .unwrap();
        p.confirm_pickup(booking.id, s.reader).await.unwrap();

        let err = p
            .return_instance(instance.id, s.reader, 4242)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CoreError::NotFound {
                entity: Entity::ExchangePoint,
                id: 4242
            }
        ));
        let stored = p.get_instance(instance.id).await.unwrap().unwrap();
        assert_eq!(stored.status, "OWNED");
    }

    #[tokio::test]
    async fn test_materialize_rolls_back_on_missing_exchange_point() {
        let p = test_persistence().await;
        let s = seed(&p).await;
        let request = p
            .insert_moderation_request(&NewModerationRequest {
                owner_id: s.owner,
                title: "Solaris".to_string(),
                author: "Stanislaw Lem".to_string(),
                address: "Main st. 1".to_string(),
            })
            .await
            .unwrap();

        let err = p
            .materialize_moderation_request(
                request.id,
                &Materialization {
                    exchange_point_id: 777,
                    title: "Solaris".to_string(),
                    author_fullname: "Stanislaw Lem".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "NOT_FOUND");
        assert!(p.get_moderation_request(request.id).await.unwrap().is_some());
        let books =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM books WHERE title = 'Solaris'")
                .fetch_one(&p.pool)
                .await
                .unwrap();
        assert_eq!(books, 0);
        assert!(
            p.find_author_by_fullname("Stanislaw Lem")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_materialize_merges_into_existing_book() {
        let p = test_persistence().await;
        let s = seed(&p).await;
        let request = p
            .insert_moderation_request(&NewModerationRequest {
                owner_id: s.reader,
                title: "Dune".to_string(),
                author: "Frank Herbert".to_string(),
                address: "Main st. 1".to_string(),
            })
            .await
            .unwrap();

        let result = p
            .materialize_moderation_request(
                request.id,
                &Materialization {
                    exchange_point_id: s.point,
                    title: "Dune".to_string(),
                    author_fullname: "Frank Herbert".to_string(),
                    year: Some(1965),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(!result.author_created);
        assert!(!result.book_created);
        assert_eq!(result.book_id, s.book);
        assert_eq!(result.instance.owner_id, s.reader);
        let book = p.get_book(s.book).await.unwrap().unwrap();
        assert_eq!(book.year, Some(1965));
        assert!(p.get_moderation_request(request.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rented_instances_exclude_bookings() {
        let p = test_persistence().await;
        let s = seed(&p).await;
        let booked = p.create_instance(s.book, s.owner, s.point).await.unwrap();
        let picked = p.create_instance(s.book, s.owner, s.point).await.unwrap();
        p.reserve_instance(booked.id, s.book, s.reader).await.unwrap();
        let booking = p
            .reserve_instance(picked.id, s.book, s.reader)
            .await
            .unwrap();
        p.confirm_pickup(booking.id, s.reader).await.unwrap();

        let rented = p.list_rented_instances(s.reader).await.unwrap();
        assert_eq!(rented.len(), 1);
        assert_eq!(rented[0].id, picked.id);
        assert_eq!(rented[0].holder(), Some(s.reader));
    }

    #[tokio::test]
    async fn test_update_user_keeps_unset_fields() {
        let p = test_persistence().await;
        let s = seed(&p).await;

        let user = p
            .update_user(
                s.reader,
                &UserUpdate {
                    lastname: Some("Petrov".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.name, "Ivan");
        assert_eq!(user.lastname, "Petrov");
        assert_eq!(user.email, "user1@example.com");

        assert!(
            p.update_user(999, &UserUpdate::default())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_update_user_rejects_taken_email() {
        let p = test_persistence().await;
        let s = seed(&p).await;

        let err = p
            .update_user(
                s.reader,
                &UserUpdate {
                    email: Some("user0@example.com".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_list_shelves_skips_points_without_organisation() {
        let p = test_persistence().await;
        let s = seed(&p).await;
        let lonely = p
            .create_exchange_point(None, "Station kiosk", None)
            .await
            .unwrap();

        let shelves = p.list_shelves().await.unwrap();
        let ids: Vec<i64> = shelves.iter().map(|s| s.id).collect();
        assert!(ids.contains(&s.point));
        assert!(ids.contains(&s.other_point));
        assert!(!ids.contains(&lonely));
        assert!(shelves.iter().all(|s| s.name == "City Library"));
        // Ordered by address within one organisation.
        assert_eq!(shelves[0].address, "Main st. 1, hall");
    }

    #[tokio::test]
    async fn test_list_moderation_requests_by_owner() {
        let p = test_persistence().await;
        let s = seed(&p).await;
        for (owner, title) in [(s.owner, "A"), (s.reader, "B"), (s.owner, "C")] {
            p.insert_moderation_request(&NewModerationRequest {
                owner_id: owner,
                title: title.to_string(),
                author: "X".to_string(),
                address: String::new(),
            })
            .await
            .unwrap();
        }

        let all = p.list_moderation_requests(None).await.unwrap();
        assert_eq!(all.len(), 3);
        let mine = p.list_moderation_requests(Some(s.owner)).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|r| r.owner_id == s.owner));
    }

    #[tokio::test]
    async fn test_counts_and_organisation_names() {
        let p = test_persistence().await;
        let s = seed(&p).await;
        p.create_instance(s.book, s.owner, s.point).await.unwrap();
        p.create_organisation("Alpha Books", "Elm st. 3", None)
            .await
            .unwrap();

        assert_eq!(p.count_users().await.unwrap(), 3);
        assert_eq!(p.count_instances().await.unwrap(), 1);
        assert_eq!(p.count_organisations().await.unwrap(), 2);
        assert_eq!(
            p.list_organisation_names().await.unwrap(),
            vec!["Alpha Books".to_string(), "City Library".to_string()]
        );
    }
}

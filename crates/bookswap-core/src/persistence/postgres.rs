// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL-backed persistence implementation.
//!
//! Mirrors the SQLite backend statement for statement; only placeholders and
//! column types differ.

use chrono::Utc;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

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

/// PostgreSQL-backed persistence implementation.
///
/// Transition updates lock the instance row, so a concurrent transaction on the
/// same instance waits and then re-evaluates the status predicate against the
/// committed row.
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Create a new Postgres-backed persistence implementation.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `url`, run migrations and return the provider.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, CoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| CoreError::Database {
                operation: "connect".to_string(),
                details: format!("Failed to connect to PostgreSQL: {}", e),
            })?;

        migrations::run_postgres(&pool).await?;

        Ok(Self { pool })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl Persistence for PostgresPersistence {
    async fn create_user(&self, user: &NewUser) -> Result<i64, CoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO users (name, lastname, email, hashed_password, role)
            VALUES ($1, $2, $3, $4, $5)
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
            "INSERT INTO organisations (name, address, description) VALUES ($1, $2, $3) RETURNING id",
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
            VALUES ($1, $2, $3)
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
            "INSERT INTO authors (fullname, country) VALUES ($1, $2) RETURNING id",
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
            VALUES ($1, $2, $3, $4, $5, $6, $7)
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
            VALUES ($1, NULL, $2, $3, 'FREE', $4)
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
            "SELECT id, name, lastname, email, role, email_verified FROM users WHERE id = $1",
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
            SET name = COALESCE($1, name),
                lastname = COALESCE($2, lastname),
                email = COALESCE($3, email)
            WHERE id = $4
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
            "SELECT id, fullname, birthday, country FROM authors WHERE id = $1",
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
            "SELECT id, fullname, birthday, country FROM authors WHERE fullname = $1 ORDER BY id LIMIT 1",
        )
        .bind(fullname)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get_book(&self, book_id: i64) -> Result<Option<BookRecord>, CoreError> {
        let record =
            sqlx::query_as::<_, BookRecord>(&format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = $1"))
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
            "SELECT id, name, address, description FROM organisations WHERE id = $1",
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
            "SELECT id, organisation_id, address, description FROM exchange_points WHERE id = $1",
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
            "SELECT {INSTANCE_COLUMNS} FROM instances WHERE id = $1"
        ))
        .bind(instance_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_free_instances(&self, book_id: i64) -> Result<Vec<InstanceRecord>, CoreError> {
        let rows = sqlx::query_as::<_, InstanceRecord>(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM instances WHERE book_id = $1 AND status = 'FREE' ORDER BY id DESC"
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
            "SELECT {INSTANCE_COLUMNS} FROM instances WHERE owner_id = $1 ORDER BY id DESC"
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
            "SELECT {INSTANCE_COLUMNS} FROM instances WHERE user_id = $1 AND status = 'OWNED' ORDER BY id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn get_booking(&self, booking_id: i64) -> Result<Option<BookingRecord>, CoreError> {
        let record = sqlx::query_as::<_, BookingRecord>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
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
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = $1 AND book_id = $2 ORDER BY id DESC LIMIT 1"
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
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE instance_id = $1 ORDER BY id"
        ))
        .bind(instance_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn list_bookings_by_user(&self, user_id: i64) -> Result<Vec<BookingRecord>, CoreError> {
        let rows = sqlx::query_as::<_, BookingRecord>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE user_id = $1 ORDER BY id DESC"
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
            "SELECT {REQUEST_COLUMNS} FROM moderation_requests WHERE id = $1"
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
            WHERE ($1::BIGINT IS NULL OR owner_id = $1)
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
            SET status = $1, user_id = $2
            WHERE id = $3 AND book_id = $4 AND status = $5
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
                "SELECT {INSTANCE_COLUMNS} FROM instances WHERE id = $1"
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
            VALUES ($1, $2, $3, $4)
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
            SET status = $1, user_id = NULL, exchange_point_id = $2
            WHERE id = $3 AND user_id = $4 AND status = $5
              AND EXISTS (SELECT 1 FROM exchange_points WHERE id = $2)
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
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM exchange_points WHERE id = $1")
                .bind(exchange_point_id)
                .fetch_one(&mut *tx)
                .await?
                > 0;
        if !point_exists {
            return Err(CoreError::not_found(Entity::ExchangePoint, exchange_point_id));
        }

        let row = sqlx::query_as::<_, InstanceRecord>(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM instances WHERE id = $1"
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
            VALUES ($1, $2, $3, $4, $5)
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
        let result = sqlx::query("DELETE FROM moderation_requests WHERE id = $1")
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
            "DELETE FROM moderation_requests WHERE id = $1 RETURNING owner_id",
        )
        .bind(request_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CoreError::not_found(Entity::ModerationRequest, request_id))?;

        let point_exists =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM exchange_points WHERE id = $1")
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
            "SELECT id FROM authors WHERE fullname = $1 ORDER BY id LIMIT 1",
        )
        .bind(&m.author_fullname)
        .fetch_optional(&mut *tx)
        .await?;
        let (author_id, author_created) = match existing_author {
            Some(id) => (id, false),
            None => {
                let id = sqlx::query_scalar::<_, i64>(
                    "INSERT INTO authors (fullname, country) VALUES ($1, $2) RETURNING id",
                )
                .bind(&m.author_fullname)
                .bind(&m.author_country)
                .fetch_one(&mut *tx)
                .await?;
                (id, true)
            }
        };

        let existing_book = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM books WHERE title = $1 ORDER BY id LIMIT 1",
        )
        .bind(&m.title)
        .fetch_optional(&mut *tx)
        .await?;
        let (book_id, book_created) = match existing_book {
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE books
                    SET genre = COALESCE($1, genre),
                        year = COALESCE($2, year),
                        isbn = COALESCE($3, isbn),
                        description = COALESCE($4, description),
                        image = COALESCE($5, image)
                    WHERE id = $6
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
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
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
            VALUES ($1, NULL, $2, $3, 'FREE', $4)
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

impl PostgresPersistence {
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
            SET status = $1, user_id = $2
            WHERE status = $3
              AND id = (SELECT instance_id FROM bookings WHERE id = $4 AND user_id = $5)
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
                "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
            ))
            .bind(booking_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CoreError::not_found(Entity::Booking, booking_id))?;
            ensure_booking_holder(&booking, user_id)?;

            let row = sqlx::query_as::<_, InstanceRecord>(&format!(
                "SELECT {INSTANCE_COLUMNS} FROM instances WHERE id = $1"
            ))
            .bind(booking.instance_id)
            .fetch_optional(&mut *tx)
            .await?;
            return Err(rejected_transition(booking.instance_id, transition, row));
        };

        sqlx::query("DELETE FROM bookings WHERE id = $1")
            .bind(booking_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(instance)
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Static description of every stored entity.
//!
//! The admin surface lists tables and their columns from this registry instead
//! of introspecting the database at runtime. Keep it in step with the
//! migrations; `test_registry_matches_sqlite_schema` compares the two.

use serde::Serialize;

/// Column value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// 64-bit integer (ids, years).
    Integer,
    /// Free text.
    Text,
    /// true / false.
    Boolean,
    /// Calendar date.
    Date,
    /// UTC timestamp.
    Timestamp,
    /// One of a fixed set of uppercase values.
    Enum(&'static [&'static str]),
}

/// One column of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSchema {
    /// Column name.
    pub name: &'static str,
    /// Value type.
    #[serde(rename = "type")]
    pub ty: FieldType,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Whether the store fills the value when omitted.
    pub has_default: bool,
}

/// One stored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntitySchema {
    /// Registry key, also used in URLs.
    pub name: &'static str,
    /// Backing table.
    pub table: &'static str,
    /// Columns in table order.
    pub fields: &'static [FieldSchema],
}

impl EntitySchema {
    /// Look up a column by name.
    pub fn field(&self, name: &str) -> Option<&'static FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }
}

const fn field(name: &'static str, ty: FieldType, nullable: bool, has_default: bool) -> FieldSchema {
    FieldSchema {
        name,
        ty,
        nullable,
        has_default,
    }
}

const ID: FieldSchema = field("id", FieldType::Integer, false, true);

/// Every entity, in dependency order.
pub static ENTITIES: &[EntitySchema] = &[
    EntitySchema {
        name: "user",
        table: "users",
        fields: &[
            ID,
            field("name", FieldType::Text, false, false),
            field("lastname", FieldType::Text, false, false),
            field("email", FieldType::Text, false, false),
            field("hashed_password", FieldType::Text, false, false),
            field("role", FieldType::Enum(&["USER", "ADMIN"]), false, true),
            field("email_verified", FieldType::Boolean, false, true),
        ],
    },
    EntitySchema {
        name: "author",
        table: "authors",
        fields: &[
            ID,
            field("fullname", FieldType::Text, false, false),
            field("birthday", FieldType::Date, true, false),
            field("country", FieldType::Text, true, false),
        ],
    },
    EntitySchema {
        name: "book",
        table: "books",
        fields: &[
            ID,
            field("author_id", FieldType::Integer, false, false),
            field("title", FieldType::Text, false, false),
            field("genre", FieldType::Text, true, false),
            field("year", FieldType::Integer, true, false),
            field("isbn", FieldType::Text, true, false),
            field("description", FieldType::Text, true, false),
            field("image", FieldType::Text, true, false),
        ],
    },
    EntitySchema {
        name: "organisation",
        table: "organisations",
        fields: &[
            ID,
            field("name", FieldType::Text, false, false),
            field("address", FieldType::Text, false, false),
            field("description", FieldType::Text, true, false),
        ],
    },
    EntitySchema {
        name: "exchange_point",
        table: "exchange_points",
        fields: &[
            ID,
            field("organisation_id", FieldType::Integer, true, false),
            field("address", FieldType::Text, false, false),
            field("description", FieldType::Text, true, false),
        ],
    },
    EntitySchema {
        name: "instance",
        table: "instances",
        fields: &[
            ID,
            field("book_id", FieldType::Integer, false, false),
            field("user_id", FieldType::Integer, true, false),
            field("owner_id", FieldType::Integer, false, false),
            field("exchange_point_id", FieldType::Integer, false, false),
            field(
                "status",
                FieldType::Enum(&["FREE", "BOOKED", "OWNED"]),
                false,
                true,
            ),
            field("created_at", FieldType::Timestamp, false, false),
        ],
    },
    EntitySchema {
        name: "booking",
        table: "bookings",
        fields: &[
            ID,
            field("user_id", FieldType::Integer, false, false),
            field("instance_id", FieldType::Integer, false, false),
            field("book_id", FieldType::Integer, false, false),
            field("created_at", FieldType::Timestamp, false, false),
        ],
    },
    EntitySchema {
        name: "moderation_request",
        table: "moderation_requests",
        fields: &[
            ID,
            field("owner_id", FieldType::Integer, false, false),
            field("title", FieldType::Text, false, false),
            field("author", FieldType::Text, false, false),
            field("address", FieldType::Text, false, false),
            field("created_at", FieldType::Timestamp, false, false),
        ],
    },
];

/// Look up an entity by registry name.
pub fn entity(name: &str) -> Option<&'static EntitySchema> {
    ENTITIES.iter().find(|e| e.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;
    use sqlx::sqlite::SqlitePoolOptions;

    #[test]
    fn test_lookup() {
        let instance = entity("instance").unwrap();
        assert_eq!(instance.table, "instances");
        assert!(instance.field("user_id").unwrap().nullable);
        assert!(!instance.field("owner_id").unwrap().nullable);
        assert!(entity("nope").is_none());
    }

    #[test]
    fn test_names_unique() {
        for (i, a) in ENTITIES.iter().enumerate() {
            for b in &ENTITIES[i + 1..] {
                assert_ne!(a.name, b.name);
                assert_ne!(a.table, b.table);
            }
        }
    }

    #[test]
    fn test_serializes_enum_values() {
        let json = serde_json::to_value(entity("instance").unwrap()).unwrap();
        let status = &json["fields"][5];
        assert_eq!(status["name"], "status");
        assert_eq!(status["type"]["enum"][0], "FREE");
    }

    #[tokio::test]
    async fn test_registry_matches_sqlite_schema() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::migrations::run_sqlite(&pool).await.unwrap();

        for entity in ENTITIES {
            let rows = sqlx::query(&format!("PRAGMA table_info({})", entity.table))
                .fetch_all(&pool)
                .await
                .unwrap();
            let columns: Vec<String> = rows.iter().map(|r| r.get::<String, _>("name")).collect();
            let declared: Vec<&str> = entity.fields.iter().map(|f| f.name).collect();
            assert_eq!(columns, declared, "column mismatch for {}", entity.table);

            for row in &rows {
                let name: String = row.get("name");
                let notnull: i64 = row.get("notnull");
                let pk: i64 = row.get("pk");
                let field = entity.field(&name).unwrap();
                assert_eq!(
                    field.nullable,
                    notnull == 0 && pk == 0,
                    "nullability mismatch for {}.{}",
                    entity.table,
                    name
                );
            }
        }
    }
}

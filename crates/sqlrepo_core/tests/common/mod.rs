#![allow(dead_code)]

use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use sqlrepo_core::{Column, Entity, EntityValidationError, Record};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Person {
    pub record: Record,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
}

impl Person {
    pub fn new(first_name: &str, last_name: &str) -> Self {
        Self {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }
}

impl Entity for Person {
    const TABLE: &'static str = "people";
    const COLUMNS: &'static [Column] = &[
        Column::new("first_name", "TEXT NOT NULL DEFAULT ''"),
        Column::new("last_name", "TEXT NOT NULL DEFAULT ''"),
        Column::new("email", "TEXT UNIQUE"),
    ];

    fn record(&self) -> &Record {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.first_name.clone()),
            Value::Text(self.last_name.clone()),
            self.email.clone().map_or(Value::Null, Value::Text),
        ]
    }

    fn from_row(record: Record, row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            record,
            first_name: row.get("first_name")?,
            last_name: row.get("last_name")?,
            email: row.get("email")?,
        })
    }

    fn validate(&self) -> Result<(), EntityValidationError> {
        match &self.email {
            Some(email) if !email.contains('@') => Err(EntityValidationError::new(
                Self::TABLE,
                format!("email `{email}` has no domain"),
            )),
            _ => Ok(()),
        }
    }
}

/// Counts rows in `people`, soft-deleted ones included.
pub fn count_all_rows(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM people;", [], |row| row.get(0))
        .unwrap()
}

//! # D1 Database Service
//!
//! SQL persistence for assets, users, sessions and the activity log using
//! Cloudflare D1. One [`DatabaseService`] implements every storage trait the
//! services depend on.
//!
//! ## Database Schema
//!
//! See `migrations/0001_init.sql`:
//! - `assets`: asset metadata; `tags` and `dimensions` stored as JSON text
//! - `users`: accounts with salted password hashes
//! - `sessions`: bearer sessions keyed by token digest
//! - `activity_log`: append-only audit entries
//!
//! Statements are built as plain [`Statement`] values first so the SQL can be
//! tested without a D1 binding.

use serde::de::DeserializeOwned;
use worker::wasm_bindgen::JsValue;
use worker::{D1Database, D1PreparedStatement};

use crate::errors::{AppError, AppResult};
use crate::utils::parse_timestamp;
use chrono::{DateTime, Utc};

mod activity;
mod assets;
mod users;

/// A bound SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Int(i64),
    Null,
}

impl SqlParam {
    /// Integers go over as JS numbers; D1 rejects BigInt bindings.
    fn to_js(&self) -> JsValue {
        match self {
            SqlParam::Text(text) => JsValue::from_str(text),
            SqlParam::Int(value) => JsValue::from_f64(*value as f64),
            SqlParam::Null => JsValue::NULL,
        }
    }
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        SqlParam::Text(value)
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        SqlParam::Int(value)
    }
}

impl From<bool> for SqlParam {
    fn from(value: bool) -> Self {
        SqlParam::Int(i64::from(value))
    }
}

impl<T: Into<SqlParam>> From<Option<T>> for SqlParam {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlParam::Null, Into::into)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, param: impl Into<SqlParam>) -> Self {
        self.params.push(param.into());
        self
    }

    pub fn push_sql(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    pub fn push_param(&mut self, param: impl Into<SqlParam>) {
        self.params.push(param.into());
    }
}

/// `%needle%` for a `LIKE ... ESCAPE '\'` clause, lowercased.
pub(crate) fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

pub(crate) fn parse_stored_timestamp(column: &str, raw: &str) -> AppResult<DateTime<Utc>> {
    parse_timestamp(raw)
        .ok_or_else(|| AppError::internal(format!("Corrupt {} timestamp in database: {}", column, raw)))
}

/// Database service over a D1 binding.
pub struct DatabaseService {
    db: D1Database,
}

impl DatabaseService {
    pub fn new(db: D1Database) -> Self {
        Self { db }
    }

    fn prepare(&self, statement: &Statement) -> AppResult<D1PreparedStatement> {
        let params: Vec<JsValue> = statement.params.iter().map(SqlParam::to_js).collect();
        Ok(self.db.prepare(&statement.sql).bind(&params)?)
    }

    async fn execute(&self, statement: Statement) -> AppResult<()> {
        self.prepare(&statement)?.run().await?;
        Ok(())
    }

    async fn fetch_all<T: DeserializeOwned>(&self, statement: Statement) -> AppResult<Vec<T>> {
        let result = self.prepare(&statement)?.all().await?;
        Ok(result.results::<T>()?)
    }

    async fn fetch_one<T: DeserializeOwned>(&self, statement: Statement) -> AppResult<Option<T>> {
        Ok(self.prepare(&statement)?.first::<T>(None).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("Rock"), "%rock%");
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }

    #[test]
    fn options_bind_as_null() {
        let statement = Statement::new("SELECT ?, ?, ?")
            .bind(None::<String>)
            .bind(Some("x"))
            .bind(true);
        assert_eq!(
            statement.params,
            vec![SqlParam::Null, SqlParam::Text("x".into()), SqlParam::Int(1)]
        );
    }
}

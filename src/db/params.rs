//! Parameter binding utilities for Postgres queries.
//!
//! Scalars bind one-to-one. Bulk updates bind a whole column as one typed
//! array whose element type is chosen from the values it carries.

use crate::error::{DbError, DbResult};
use crate::models::QueryParam;
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgTypeInfo};
use sqlx::types::Json;
use sqlx::{Encode, Postgres, Type};

pub(crate) type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// A NULL sent with the `unspecified` type OID, so the server infers the
/// parameter's type from where it appears in the statement.
#[derive(Debug, Clone, Copy)]
pub(crate) struct UntypedNull;

impl Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_param<'q>(query: PgQuery<'q>, param: &'q QueryParam) -> PgQuery<'q> {
    match param {
        QueryParam::Null => query.bind(UntypedNull),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
        QueryParam::Json(v) => query.bind(Json(v)),
    }
}

/// Bind every parameter in order.
pub(crate) fn bind_all<'q>(mut query: PgQuery<'q>, params: &'q [QueryParam]) -> PgQuery<'q> {
    for param in params {
        query = bind_param(query, param);
    }
    query
}

/// Element kind of a column of values, ignoring NULLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArrayKind {
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    Json,
}

impl ArrayKind {
    fn of(param: &QueryParam) -> Option<Self> {
        match param {
            QueryParam::Null => None,
            QueryParam::Bool(_) => Some(Self::Bool),
            QueryParam::Int(_) => Some(Self::Int),
            QueryParam::Float(_) => Some(Self::Float),
            QueryParam::String(_) => Some(Self::Text),
            QueryParam::Bytes(_) => Some(Self::Bytes),
            QueryParam::Json(_) => Some(Self::Json),
        }
    }
}

/// Decide the array element kind for `values`. An all-NULL column binds as
/// `text[]`; the statement's cast gives it the real type.
pub(crate) fn array_kind(column: &str, values: &[QueryParam]) -> DbResult<ArrayKind> {
    let mut kind = None;
    for v in values {
        let Some(k) = ArrayKind::of(v) else { continue };
        match kind {
            None => kind = Some(k),
            // Integers widen to floats; anything else is a mix.
            Some(ArrayKind::Float) if k == ArrayKind::Int => {}
            Some(ArrayKind::Int) if k == ArrayKind::Float => kind = Some(ArrayKind::Float),
            Some(existing) if existing != k => {
                return Err(DbError::invalid_input(format!(
                    "column {column} mixes {} and {} values",
                    kind_name(existing),
                    v.type_name()
                )));
            }
            Some(_) => {}
        }
    }
    Ok(kind.unwrap_or(ArrayKind::Text))
}

fn kind_name(kind: ArrayKind) -> &'static str {
    match kind {
        ArrayKind::Bool => "bool",
        ArrayKind::Int => "int",
        ArrayKind::Float => "float",
        ArrayKind::Text => "string",
        ArrayKind::Bytes => "bytes",
        ArrayKind::Json => "json",
    }
}

/// Bind `values` as a single Postgres array parameter.
pub(crate) fn bind_array<'q>(
    query: PgQuery<'q>,
    column: &str,
    values: &'q [QueryParam],
) -> DbResult<PgQuery<'q>> {
    let query = match array_kind(column, values)? {
        ArrayKind::Bool => query.bind(collect(values, |v| match v {
            QueryParam::Bool(b) => Some(*b),
            _ => None,
        })),
        ArrayKind::Int => query.bind(collect(values, |v| match v {
            QueryParam::Int(i) => Some(*i),
            _ => None,
        })),
        ArrayKind::Float => query.bind(collect(values, |v| match v {
            QueryParam::Float(f) => Some(*f),
            QueryParam::Int(i) => Some(*i as f64),
            _ => None,
        })),
        ArrayKind::Text => query.bind(collect(values, |v| match v {
            QueryParam::String(s) => Some(s.clone()),
            _ => None,
        })),
        ArrayKind::Bytes => query.bind(collect(values, |v| match v {
            QueryParam::Bytes(b) => Some(b.clone()),
            _ => None,
        })),
        ArrayKind::Json => query.bind(collect(values, |v| match v {
            QueryParam::Json(j) => Some(Json(j.clone())),
            _ => None,
        })),
    };
    Ok(query)
}

fn collect<T>(values: &[QueryParam], f: impl Fn(&QueryParam) -> Option<T>) -> Vec<Option<T>> {
    values.iter().map(f).collect()
}

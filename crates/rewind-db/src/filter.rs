//! SQL generation for document queries over the `document` table.
//!
//! Documents live in a JSONB `body` column holding every field except the
//! id, which has its own column. Field names are always bound as
//! parameters, never spliced into SQL text.

use serde_json::Value as JsonValue;
use uuid::Uuid;

use rewind_core::{DocumentQuery, FindOptions, SortDirection};

/// Type-safe parameter binding for SQL queries.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    /// Single UUID parameter.
    Uuid(Uuid),
    /// Array of UUIDs (for `ANY`).
    UuidArray(Vec<Uuid>),
    /// 64-bit integer (limits and offsets).
    Int(i64),
    /// Text parameter (collection and field names).
    String(String),
    /// Array of text (fields to unset).
    StringArray(Vec<String>),
    /// JSONB value.
    Json(JsonValue),
}

/// Binds a list of [`QueryParam`]s onto any sqlx query type.
macro_rules! bind_params {
    ($query:expr, $params:expr) => {{
        let mut q = $query;
        for param in $params {
            q = match param {
                $crate::filter::QueryParam::Uuid(v) => q.bind(v),
                $crate::filter::QueryParam::UuidArray(v) => q.bind(v),
                $crate::filter::QueryParam::Int(v) => q.bind(v),
                $crate::filter::QueryParam::String(v) => q.bind(v),
                $crate::filter::QueryParam::StringArray(v) => q.bind(v),
                $crate::filter::QueryParam::Json(v) => q.bind(v),
            };
        }
        q
    }};
}
pub(crate) use bind_params;

/// Turns a [`DocumentQuery`] into a WHERE fragment.
pub struct DocumentFilterQueryBuilder<'a> {
    query: &'a DocumentQuery,
    param_offset: usize,
}

impl<'a> DocumentFilterQueryBuilder<'a> {
    /// `param_offset` is the number of parameters already in the statement.
    pub fn new(query: &'a DocumentQuery, param_offset: usize) -> Self {
        Self {
            query,
            param_offset,
        }
    }

    /// Returns the SQL fragment and its parameters in placeholder order.
    pub fn build(&self) -> (String, Vec<QueryParam>) {
        let mut params = Vec::new();
        let sql = self.fragment(self.query, &mut params);
        (sql, params)
    }

    fn next(&self, params: &mut Vec<QueryParam>, param: QueryParam) -> String {
        params.push(param);
        format!("${}", self.param_offset + params.len())
    }

    fn fragment(&self, query: &DocumentQuery, params: &mut Vec<QueryParam>) -> String {
        match query {
            DocumentQuery::All => "TRUE".to_string(),
            DocumentQuery::Ids(ids) if ids.is_empty() => "FALSE".to_string(),
            DocumentQuery::Ids(ids) => {
                let p = self.next(params, QueryParam::UuidArray(ids.clone()));
                format!("id = ANY({p}::uuid[])")
            }
            DocumentQuery::Eq(field, value) => {
                let f = self.next(params, QueryParam::String(field.clone()));
                let v = self.next(params, QueryParam::Json(value.clone()));
                format!("body -> {f}::text = {v}::jsonb")
            }
            DocumentQuery::In(_, values) if values.is_empty() => "FALSE".to_string(),
            DocumentQuery::In(field, values) => {
                let f = self.next(params, QueryParam::String(field.clone()));
                let v = self.next(params, QueryParam::Json(JsonValue::Array(values.clone())));
                format!(
                    "EXISTS (SELECT 1 FROM jsonb_array_elements({v}::jsonb) AS candidate(value) \
                     WHERE candidate.value = body -> {f}::text)"
                )
            }
            DocumentQuery::And(parts) if parts.is_empty() => "TRUE".to_string(),
            DocumentQuery::And(parts) => self.join(parts, " AND ", params),
            DocumentQuery::Or(parts) if parts.is_empty() => "FALSE".to_string(),
            DocumentQuery::Or(parts) => self.join(parts, " OR ", params),
        }
    }

    fn join(&self, parts: &[DocumentQuery], op: &str, params: &mut Vec<QueryParam>) -> String {
        let clauses: Vec<String> = parts.iter().map(|p| self.fragment(p, params)).collect();
        format!("({})", clauses.join(op))
    }
}

/// ORDER BY / LIMIT / OFFSET tail for `find`.
///
/// Without a sort key, documents come back in id order. Missing fields sort
/// first ascending and last descending.
pub fn order_and_page(options: &FindOptions, param_offset: usize) -> (String, Vec<QueryParam>) {
    let mut params = Vec::new();
    let mut sql = String::from(" ORDER BY ");
    match &options.sort {
        Some(sort) => {
            params.push(QueryParam::String(sort.field.clone()));
            let p = param_offset + params.len();
            match sort.direction {
                SortDirection::Asc => {
                    sql.push_str(&format!("body -> ${p}::text ASC NULLS FIRST, id ASC"))
                }
                SortDirection::Desc => {
                    sql.push_str(&format!("body -> ${p}::text DESC NULLS LAST, id DESC"))
                }
            }
        }
        None => sql.push_str("id ASC"),
    }
    if let Some(limit) = options.limit {
        params.push(QueryParam::Int(limit.max(0)));
        sql.push_str(&format!(" LIMIT ${}", param_offset + params.len()));
    }
    if let Some(offset) = options.offset {
        params.push(QueryParam::Int(offset.max(0)));
        sql.push_str(&format!(" OFFSET ${}", param_offset + params.len()));
    }
    (sql, params)
}

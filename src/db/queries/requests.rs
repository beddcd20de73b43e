use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgExecutor, Postgres, QueryBuilder};

use crate::db::models::company::Company;
use crate::db::models::dashboard::StatusCount;
use crate::db::models::requests::{
    NewRequest, RequestDetails, RequestKind, RequestPayload, RequestRecord, RequestStatus,
    StatusChange,
};
use crate::db::models::user::SystemUser;
use crate::db::store::{StoreError, StoreResult};

/// Shared columns plus the JSON image of the whole row, from which the
/// kind-specific payload is decoded.
const RECORD_COLUMNS: &str = "t.id, t.request_number, t.requested_by_id, t.requested_date, \
     t.status_id, t.approved_by_id, t.approved_date, t.rejection_reason, to_jsonb(t) AS payload";

#[derive(Debug, FromRow)]
struct RequestRow {
    id: i32,
    request_number: String,
    requested_by_id: i32,
    requested_date: DateTime<Utc>,
    status_id: i32,
    approved_by_id: Option<i32>,
    approved_date: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    payload: Json<Value>,
}

impl RequestRow {
    fn into_record(self, kind: RequestKind) -> StoreResult<RequestRecord> {
        let status = RequestStatus::from_id(self.status_id).ok_or_else(|| StoreError::Corrupt {
            table: kind.table(),
            reason: format!("unknown status_id {}", self.status_id),
        })?;
        let payload = RequestPayload::from_row_json(kind, self.payload.0).map_err(|e| {
            StoreError::Corrupt { table: kind.table(), reason: e.to_string() }
        })?;

        Ok(RequestRecord {
            id: self.id,
            request_number: self.request_number,
            payload,
            requested_by_id: self.requested_by_id,
            requested_date: self.requested_date,
            status,
            approved_by_id: self.approved_by_id,
            approved_date: self.approved_date,
            rejection_reason: self.rejection_reason,
        })
    }
}

#[derive(Debug, FromRow)]
struct JoinedRow {
    kind: String,
    #[sqlx(flatten)]
    record: RequestRow,
    requested_by: Json<SystemUser>,
    approved_by: Option<Json<SystemUser>>,
    company: Option<Json<Company>>,
}

impl JoinedRow {
    fn into_details(self) -> StoreResult<RequestDetails> {
        let kind = RequestKind::parse(&self.kind).ok_or_else(|| StoreError::Corrupt {
            table: "merged requests",
            reason: format!("unknown kind tag {}", self.kind),
        })?;
        Ok(RequestDetails {
            record: self.record.into_record(kind)?,
            requested_by: self.requested_by.0,
            approved_by: self.approved_by.map(|u| u.0),
            company: self.company.map(|c| c.0),
        })
    }
}

/// `UNION ALL` over the given tables with requester, approver and company
/// joined in. `filter` is applied inside every branch against alias `t`.
fn joined_sql(kinds: &[RequestKind], filter: &str) -> String {
    let branches: Vec<String> = kinds
        .iter()
        .map(|kind| {
            let company = match kind {
                RequestKind::Creation => "t.company_id",
                _ => "NULL::int",
            };
            format!(
                "SELECT '{kind}'::text AS kind, {RECORD_COLUMNS}, {company} AS company_id \
                 FROM {table} t WHERE {filter}",
                kind = kind.as_str(),
                table = kind.table(),
            )
        })
        .collect();

    format!(
        r#"
        SELECT r.*,
               to_jsonb(u) AS requested_by,
               CASE WHEN a.id IS NULL THEN NULL ELSE to_jsonb(a) END AS approved_by,
               CASE WHEN c.id IS NULL THEN NULL ELSE to_jsonb(c) END AS company
        FROM ({}) r
        JOIN system_users u ON u.id = r.requested_by_id
        LEFT JOIN system_users a ON a.id = r.approved_by_id
        LEFT JOIN companies c ON c.id = r.company_id
        ORDER BY r.requested_date DESC, r.request_number DESC
        "#,
        branches.join(" UNION ALL ")
    )
}

enum ColumnValue {
    Int(i32),
    Text(Option<String>),
}

fn text(value: &str) -> ColumnValue {
    ColumnValue::Text(Some(value.to_string()))
}

fn opt_text(value: &Option<String>) -> ColumnValue {
    ColumnValue::Text(value.clone())
}

fn payload_columns(payload: &RequestPayload) -> Vec<(&'static str, ColumnValue)> {
    match payload {
        RequestPayload::Creation(p) => vec![
            ("company_id", ColumnValue::Int(p.company_id)),
            ("first_name", text(&p.first_name)),
            ("last_name", text(&p.last_name)),
            ("display_name", text(&p.resolved_display_name())),
            ("username", text(&p.username)),
            ("email", opt_text(&p.email)),
            ("title", opt_text(&p.title)),
            ("department", opt_text(&p.department)),
            ("phone", opt_text(&p.phone)),
            ("manager", opt_text(&p.manager)),
        ],
        RequestPayload::Deletion(p) => vec![
            ("username", text(&p.username)),
            ("display_name", opt_text(&p.display_name)),
            ("reason", opt_text(&p.reason)),
        ],
        RequestPayload::Attribute(p) => vec![
            ("username", text(&p.username)),
            ("attribute_name", text(&p.attribute_name)),
            ("old_value", opt_text(&p.old_value)),
            ("new_value", text(&p.new_value)),
        ],
        RequestPayload::Password(p) => vec![
            ("username", text(&p.username)),
            ("display_name", opt_text(&p.display_name)),
            ("email", opt_text(&p.email)),
        ],
        RequestPayload::Group(p) => vec![
            ("username", text(&p.username)),
            ("group_name", text(&p.group_name)),
            ("action_type", text(p.action_type.as_str())),
        ],
        RequestPayload::Network(p) => vec![
            ("operation", text(p.operation.as_str())),
            ("hostname", text(&p.hostname)),
            ("ip_address", opt_text(&p.ip_address)),
            ("mac_address", opt_text(&p.mac_address)),
            ("record_type", ColumnValue::Text(p.record_type.map(|r| r.as_str().to_string()))),
            ("record_value", opt_text(&p.record_value)),
        ],
    }
}

pub async fn insert_request(conn: &mut PgConnection, request: &NewRequest) -> StoreResult<i32> {
    let kind = request.payload.kind();
    let columns = payload_columns(&request.payload);

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "INSERT INTO {} (request_number, requested_by_id, requested_date, status_id",
        kind.table()
    ));
    for (name, _) in &columns {
        builder.push(", ").push(*name);
    }
    builder.push(") VALUES (");

    let mut values = builder.separated(", ");
    values.push_bind(request.request_number.clone());
    values.push_bind(request.requested_by_id);
    values.push_bind(request.requested_date);
    values.push_bind(RequestStatus::Pending.id());
    for (_, value) in columns {
        match value {
            ColumnValue::Int(v) => values.push_bind(v),
            ColumnValue::Text(v) => values.push_bind(v),
        };
    }
    values.push_unseparated(") RETURNING id");

    let id = builder.build_query_scalar::<i32>().fetch_one(&mut *conn).await?;
    Ok(id)
}

pub async fn get_request<'e, E: PgExecutor<'e>>(
    executor: E,
    kind: RequestKind,
    id: i32,
) -> StoreResult<Option<RequestRecord>> {
    let sql = format!("SELECT {RECORD_COLUMNS} FROM {} t WHERE t.id = $1", kind.table());
    sqlx::query_as::<_, RequestRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .map(|row| row.into_record(kind))
        .transpose()
}

pub async fn update_request_status(
    conn: &mut PgConnection,
    kind: RequestKind,
    id: i32,
    change: &StatusChange,
) -> StoreResult<bool> {
    let sql = format!(
        "UPDATE {} SET status_id = $1, approved_by_id = $2, approved_date = $3, rejection_reason = $4 \
         WHERE id = $5 AND status_id = $6",
        kind.table()
    );
    let result = sqlx::query(&sql)
        .bind(change.status.id())
        .bind(change.actor_id)
        .bind(change.at)
        .bind(change.rejection_reason.as_deref())
        .bind(id)
        .bind(RequestStatus::Pending.id())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn last_request_number(
    conn: &mut PgConnection,
    kind: RequestKind,
    prefix: &str,
) -> StoreResult<Option<String>> {
    // Held until commit/rollback; orders concurrent creates of the same kind.
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(kind.table())
        .execute(&mut *conn)
        .await?;

    let sql = format!(
        "SELECT request_number FROM {} WHERE request_number LIKE $1 \
         ORDER BY length(request_number) DESC, request_number DESC LIMIT 1",
        kind.table()
    );
    let last = sqlx::query_scalar::<_, String>(&sql)
        .bind(format!("{prefix}%"))
        .fetch_optional(&mut *conn)
        .await?;
    Ok(last)
}

pub async fn get_request_details<'e, E: PgExecutor<'e>>(
    executor: E,
    kind: RequestKind,
    id: i32,
) -> StoreResult<Option<RequestDetails>> {
    let sql = joined_sql(&[kind], "t.id = $1");
    sqlx::query_as::<_, JoinedRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .map(JoinedRow::into_details)
        .transpose()
}

pub async fn query_pending<'e, E: PgExecutor<'e>>(
    executor: E,
    kind: RequestKind,
) -> StoreResult<Vec<RequestRecord>> {
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM {} t WHERE t.status_id = $1 ORDER BY t.requested_date DESC",
        kind.table()
    );
    sqlx::query_as::<_, RequestRow>(&sql)
        .bind(RequestStatus::Pending.id())
        .fetch_all(executor)
        .await?
        .into_iter()
        .map(|row| row.into_record(kind))
        .collect()
}

pub async fn query_by_requester<'e, E: PgExecutor<'e>>(
    executor: E,
    kind: RequestKind,
    requester_id: i32,
) -> StoreResult<Vec<RequestRecord>> {
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM {} t WHERE t.requested_by_id = $1 ORDER BY t.requested_date DESC",
        kind.table()
    );
    sqlx::query_as::<_, RequestRow>(&sql)
        .bind(requester_id)
        .fetch_all(executor)
        .await?
        .into_iter()
        .map(|row| row.into_record(kind))
        .collect()
}

pub async fn merged_pending<'e, E: PgExecutor<'e>>(executor: E) -> StoreResult<Vec<RequestDetails>> {
    let sql = joined_sql(&RequestKind::ALL, "t.status_id = $1");
    sqlx::query_as::<_, JoinedRow>(&sql)
        .bind(RequestStatus::Pending.id())
        .fetch_all(executor)
        .await?
        .into_iter()
        .map(JoinedRow::into_details)
        .collect()
}

pub async fn merged_by_requester<'e, E: PgExecutor<'e>>(
    executor: E,
    requester_id: i32,
) -> StoreResult<Vec<RequestDetails>> {
    let sql = joined_sql(&RequestKind::ALL, "t.requested_by_id = $1");
    sqlx::query_as::<_, JoinedRow>(&sql)
        .bind(requester_id)
        .fetch_all(executor)
        .await?
        .into_iter()
        .map(JoinedRow::into_details)
        .collect()
}

#[derive(Debug, FromRow)]
struct CountRow {
    kind: String,
    status_id: i32,
    count: i64,
}

pub async fn status_counts<'e, E: PgExecutor<'e>>(executor: E) -> StoreResult<Vec<StatusCount>> {
    let sql = RequestKind::ALL
        .iter()
        .map(|kind| {
            format!(
                "SELECT '{}'::text AS kind, status_id, COUNT(*) AS count FROM {} GROUP BY status_id",
                kind.as_str(),
                kind.table()
            )
        })
        .collect::<Vec<_>>()
        .join(" UNION ALL ");

    sqlx::query_as::<_, CountRow>(&sql)
        .fetch_all(executor)
        .await?
        .into_iter()
        .map(|row| {
            let kind = RequestKind::parse(&row.kind).ok_or_else(|| StoreError::Corrupt {
                table: "status counts",
                reason: format!("unknown kind tag {}", row.kind),
            })?;
            let status = RequestStatus::from_id(row.status_id).ok_or_else(|| StoreError::Corrupt {
                table: kind.table(),
                reason: format!("unknown status_id {}", row.status_id),
            })?;
            Ok(StatusCount { kind, status, count: row.count })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joined_sql_covers_every_table_once() {
        let sql = joined_sql(&RequestKind::ALL, "t.status_id = $1");
        for kind in RequestKind::ALL {
            assert_eq!(sql.matches(&format!("FROM {} t", kind.table())).count(), 1);
        }
        assert_eq!(sql.matches("UNION ALL").count(), RequestKind::ALL.len() - 1);
        assert!(sql.contains("t.company_id AS company_id"));
    }

    #[test]
    fn creation_columns_store_resolved_display_name() {
        let payload = RequestPayload::Creation(crate::db::models::requests::CreationPayload {
            company_id: 3,
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            display_name: None,
            username: "jdoe".into(),
            email: None,
            title: None,
            department: None,
            phone: None,
            manager: None,
        });
        let columns = payload_columns(&payload);
        let display = columns.iter().find(|(name, _)| *name == "display_name").unwrap();
        assert!(matches!(&display.1, ColumnValue::Text(Some(v)) if v == "Jane Doe"));
    }
}

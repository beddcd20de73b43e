use sqlx::{PgConnection, PgExecutor};

use crate::db::models::activity::{ActivityLog, NewActivityLog};
use crate::db::store::StoreResult;

const ACTIVITY_COLUMNS: &str =
    "id, user_id, action, entity_type, entity_id, details, ip_address, created_date";

pub async fn append(conn: &mut PgConnection, entry: &NewActivityLog) -> StoreResult<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO activity_logs (user_id, action, entity_type, entity_id, details, ip_address, created_date)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(entry.user_id)
    .bind(&entry.action)
    .bind(&entry.entity_type)
    .bind(entry.entity_id)
    .bind(entry.details.as_deref())
    .bind(entry.ip_address.as_deref())
    .bind(entry.created_date)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}

pub async fn recent<'e, E: PgExecutor<'e>>(executor: E, limit: u32) -> StoreResult<Vec<ActivityLog>> {
    let sql = format!(
        "SELECT {ACTIVITY_COLUMNS} FROM activity_logs ORDER BY created_date DESC, id DESC LIMIT $1"
    );
    let rows = sqlx::query_as::<_, ActivityLog>(&sql)
        .bind(i64::from(limit))
        .fetch_all(executor)
        .await?;
    Ok(rows)
}

pub async fn for_entity<'e, E: PgExecutor<'e>>(
    executor: E,
    entity_type: &str,
    entity_id: i32,
) -> StoreResult<Vec<ActivityLog>> {
    let sql = format!(
        "SELECT {ACTIVITY_COLUMNS} FROM activity_logs WHERE entity_type = $1 AND entity_id = $2 ORDER BY id"
    );
    let rows = sqlx::query_as::<_, ActivityLog>(&sql)
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(executor)
        .await?;
    Ok(rows)
}

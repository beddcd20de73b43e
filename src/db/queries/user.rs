use sqlx::{PgConnection, PgExecutor};

use crate::db::models::user::{NewSystemUser, SystemUser};
use crate::db::store::StoreResult;

const USER_COLUMNS: &str = "id, username, display_name, email, is_active, created_date";

pub async fn find_by_username<'e, E: PgExecutor<'e>>(
    executor: E,
    username: &str,
) -> StoreResult<Option<SystemUser>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM system_users WHERE username = $1");
    let user = sqlx::query_as::<_, SystemUser>(&sql)
        .bind(username)
        .fetch_optional(executor)
        .await?;
    Ok(user)
}

pub async fn get<'e, E: PgExecutor<'e>>(executor: E, id: i32) -> StoreResult<Option<SystemUser>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM system_users WHERE id = $1");
    let user = sqlx::query_as::<_, SystemUser>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(user)
}

/// Single-statement get-or-create under the unique username constraint. The
/// no-op `DO UPDATE` makes `RETURNING` yield the existing row on conflict.
pub async fn upsert(conn: &mut PgConnection, user: &NewSystemUser) -> StoreResult<SystemUser> {
    let sql = format!(
        r#"
        INSERT INTO system_users (username, display_name, email, is_active, created_date)
        VALUES ($1, $2, $3, TRUE, now())
        ON CONFLICT (username) DO UPDATE SET username = EXCLUDED.username
        RETURNING {USER_COLUMNS}
        "#
    );
    let stored = sqlx::query_as::<_, SystemUser>(&sql)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(&user.email)
        .fetch_one(&mut *conn)
        .await?;
    Ok(stored)
}

pub async fn by_ids<'e, E: PgExecutor<'e>>(executor: E, ids: &[i32]) -> StoreResult<Vec<SystemUser>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM system_users WHERE id = ANY($1) ORDER BY id");
    let users = sqlx::query_as::<_, SystemUser>(&sql)
        .bind(ids)
        .fetch_all(executor)
        .await?;
    Ok(users)
}

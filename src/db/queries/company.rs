use sqlx::PgExecutor;

use crate::db::models::company::Company;
use crate::db::store::StoreResult;

pub async fn get<'e, E: PgExecutor<'e>>(executor: E, id: i32) -> StoreResult<Option<Company>> {
    let company = sqlx::query_as::<_, Company>(
        "SELECT id, company_name, ou_path, is_active FROM companies WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;
    Ok(company)
}

pub async fn by_ids<'e, E: PgExecutor<'e>>(executor: E, ids: &[i32]) -> StoreResult<Vec<Company>> {
    let companies = sqlx::query_as::<_, Company>(
        "SELECT id, company_name, ou_path, is_active FROM companies WHERE id = ANY($1) ORDER BY id",
    )
    .bind(ids)
    .fetch_all(executor)
    .await?;
    Ok(companies)
}

pub async fn list_active<'e, E: PgExecutor<'e>>(executor: E) -> StoreResult<Vec<Company>> {
    let companies = sqlx::query_as::<_, Company>(
        "SELECT id, company_name, ou_path, is_active FROM companies WHERE is_active ORDER BY company_name",
    )
    .fetch_all(executor)
    .await?;
    Ok(companies)
}

use sqlx::PgPool;

pub(crate) async fn database_ready(pool: &PgPool) -> Result<bool, sqlx::Error> {
    let probe: i32 = sqlx::query_scalar("SELECT 1").fetch_one(pool).await?;
    Ok(probe == 1)
}

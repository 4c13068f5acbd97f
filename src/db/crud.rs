use sqlx::{Executor, QueryBuilder, Result, Sqlite};

use super::MediaRecord;

/// 添加图片记录
pub async fn add_image<'c, E>(executor: E, record: &MediaRecord) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO images (fingerprint, path, added_at, updated_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&record.fingerprint)
    .bind(&record.path)
    .bind(&record.added_at)
    .bind(&record.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// 更新图片路径，记录不存在时插入
pub async fn upsert_image_path<'c, E>(
    executor: E,
    fingerprint: &str,
    path: &str,
    now: &str,
) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO images (fingerprint, path, added_at, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (fingerprint) DO UPDATE SET path = excluded.path, updated_at = excluded.updated_at
        "#,
    )
    .bind(fingerprint)
    .bind(path)
    .bind(now)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(())
}

/// 删除图片记录，返回实际删除的行数
pub async fn delete_image<'c, E>(executor: E, fingerprint: &str) -> Result<u64>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM images WHERE fingerprint = ?")
        .bind(fingerprint)
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

/// 获取所有 (指纹, 路径)
pub async fn get_all_paths<'c, E>(executor: E) -> Result<Vec<(String, String)>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as("SELECT fingerprint, path FROM images").fetch_all(executor).await
}

/// 批量查询指纹对应的路径，不存在的指纹不会出现在结果中
pub async fn get_paths<'c, E>(executor: E, fingerprints: &[String]) -> Result<Vec<(String, String)>>
where
    E: Executor<'c, Database = Sqlite>,
{
    if fingerprints.is_empty() {
        return Ok(vec![]);
    }
    let mut builder =
        QueryBuilder::<Sqlite>::new("SELECT fingerprint, path FROM images WHERE fingerprint IN (");
    let mut separated = builder.separated(", ");
    for fingerprint in fingerprints {
        separated.push_bind(fingerprint);
    }
    separated.push_unseparated(")");

    builder.build_query_as().fetch_all(executor).await
}

/// 根据指纹获取完整记录
pub async fn get_image<'c, E>(executor: E, fingerprint: &str) -> Result<Option<MediaRecord>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as(
        r#"
        SELECT fingerprint, path, added_at, updated_at FROM images WHERE fingerprint = ?
        "#,
    )
    .bind(fingerprint)
    .fetch_optional(executor)
    .await
}

/// 图片记录总数
pub async fn count_images<'c, E>(executor: E) -> Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM images").fetch_one(executor).await?;
    Ok(count)
}

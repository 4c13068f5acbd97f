use std::collections::HashMap;
use std::path::Path;

use log::{debug, info};
use sqlx::{SqlitePool, sqlite::*};

pub mod crud;
pub mod model;

pub use model::*;

use crate::error::Result;

pub type Database = SqlitePool;

pub async fn init_db(filename: impl AsRef<Path>) -> Result<Database, sqlx::Error> {
    let filename = filename.as_ref();
    info!("初始化数据库连接: {}", filename.display());

    // WAL 模式下读请求不会被正在进行的写入阻塞
    let options = SqliteConnectOptions::new()
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .filename(filename)
        .create_if_missing(true);

    // 每个并发调用方从连接池借出自己的连接，归还由 guard 的 Drop 保证
    let pool = SqlitePoolOptions::new()
        .max_connections(num_cpus::get().max(2) as u32)
        .connect_with(options)
        .await?;

    info!("检查数据库迁移");
    sqlx::migrate!().run(&pool).await?;

    Ok(pool)
}

/// 指纹 => 路径的持久化存储
///
/// 每一批修改在同一个事务中提交。不同批次之间没有回滚机制，
/// 中途失败时已提交的批次会保留。
#[derive(Clone)]
pub struct MetadataStore {
    pool: Database,
}

impl MetadataStore {
    pub async fn open(filename: impl AsRef<Path>) -> Result<Self> {
        let pool = init_db(filename).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Database {
        &self.pool
    }

    /// 读取所有记录，返回 指纹 => 路径
    pub async fn get_all(&self) -> Result<HashMap<String, String>> {
        let rows = crud::get_all_paths(&self.pool).await?;
        Ok(rows.into_iter().collect())
    }

    /// 更新单个指纹的路径
    pub async fn upsert_path(&self, fingerprint: &str, path: &str, now: &str) -> Result<()> {
        crud::upsert_image_path(&self.pool, fingerprint, path, now).await?;
        Ok(())
    }

    /// 在同一个事务中更新多个指纹的路径
    pub async fn upsert_paths(&self, moves: &[(String, String)], now: &str) -> Result<()> {
        if moves.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for (fingerprint, path) in moves {
            crud::upsert_image_path(&mut *tx, fingerprint, path, now).await?;
        }
        tx.commit().await?;
        debug!("更新了 {} 条路径记录", moves.len());
        Ok(())
    }

    /// 在同一个事务中插入一批新记录
    pub async fn bulk_insert(&self, records: &[MediaRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for record in records {
            crud::add_image(&mut *tx, record).await?;
        }
        tx.commit().await?;
        debug!("插入了 {} 条新记录", records.len());
        Ok(())
    }

    /// 在同一个事务中删除一批记录，返回实际删除的行数
    pub async fn delete(&self, fingerprints: &[String]) -> Result<u64> {
        if fingerprints.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;
        for fingerprint in fingerprints {
            deleted += crud::delete_image(&mut *tx, fingerprint).await?;
        }
        tx.commit().await?;
        debug!("删除了 {deleted} 条记录");
        Ok(deleted)
    }

    /// 批量解析指纹对应的当前路径
    pub async fn get_paths(&self, fingerprints: &[String]) -> Result<HashMap<String, String>> {
        let rows = crud::get_paths(&self.pool, fingerprints).await?;
        Ok(rows.into_iter().collect())
    }

    pub async fn get(&self, fingerprint: &str) -> Result<Option<MediaRecord>> {
        Ok(crud::get_image(&self.pool, fingerprint).await?)
    }

    pub async fn count(&self) -> Result<i64> {
        Ok(crud::count_images(&self.pool).await?)
    }
}

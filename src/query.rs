use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use log::debug;
use serde::Serialize;
use tokio::task::spawn_blocking;

use crate::db::MetadataStore;
use crate::embedding::{EmbeddingEngine, check_shape};
use crate::error::{Error, Result};
use crate::index::VectorIndex;
use crate::metrics;
use crate::scan::hash_bytes;

/// 指纹在数据库中已经没有对应记录时使用的占位路径
pub const PATH_NOT_FOUND: &str = "Path not found (deleted)";

/// 单条搜索结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    /// 图片指纹
    pub fingerprint: String,
    /// 与查询向量的距离，越小越相似
    pub distance: f32,
    /// 图片当前路径，记录已被删除时为 None
    pub path: Option<String>,
}

impl SearchHit {
    /// 图片路径，找不到时返回 [`PATH_NOT_FOUND`]
    pub fn path_or_placeholder(&self) -> &str {
        self.path.as_deref().unwrap_or(PATH_NOT_FOUND)
    }
}

/// 以文搜图和以图搜图
pub struct QueryService {
    engine: Arc<dyn EmbeddingEngine>,
    store: MetadataStore,
    index: Arc<VectorIndex>,
}

impl QueryService {
    pub fn new(engine: Arc<dyn EmbeddingEngine>, store: MetadataStore, index: Arc<VectorIndex>) -> Self {
        Self { engine, store, index }
    }

    /// 使用文本搜索最接近的 k 张图片，按距离升序排列
    pub async fn search_by_text(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let start = Instant::now();
        let engine = self.engine.clone();
        let text = query.to_owned();
        let vector = spawn_blocking(move || engine.embed_text(&text))
            .await
            .map_err(|e| Error::engine(anyhow!("计算向量的任务异常退出: {e}")))?
            .map_err(Error::engine)?;

        let hits = self.search_vector(vector, k).await?;
        debug!("文本搜索 {:?} 返回 {} 条结果", query, hits.len());
        metrics::observe_search("text", start.elapsed().as_secs_f32());
        Ok(hits)
    }

    /// 使用参考图片搜索最接近的 k 张图片，参考图片不需要已被索引
    pub async fn search_by_image(&self, path: impl AsRef<Path>, k: usize) -> Result<Vec<SearchHit>> {
        let start = Instant::now();
        let path = path.as_ref().to_path_buf();
        let data = tokio::fs::read(&path).await.map_err(|source| Error::Io { path: path.clone(), source })?;
        debug!("参考图片 {} 的指纹: {}", path.display(), hash_bytes(&data));

        let engine = self.engine.clone();
        let vectors = spawn_blocking(move || {
            let vectors = engine.embed_images(&[data])?;
            check_shape(&vectors, 1, engine.dimensions())?;
            Ok::<_, anyhow::Error>(vectors)
        })
        .await
        .map_err(|e| Error::engine(anyhow!("计算向量的任务异常退出: {e}")))?
        .map_err(Error::engine)?;

        let hits = self.search_vector(vectors.row(0).to_vec(), k).await?;
        debug!("图片搜索 {} 返回 {} 条结果", path.display(), hits.len());
        metrics::observe_search("image", start.elapsed().as_secs_f32());
        Ok(hits)
    }

    /// 搜索向量并解析路径
    ///
    /// 搜索和解析在同一个索引锁内完成，不会观察到扫描写入到一半的状态。
    async fn search_vector(&self, vector: Vec<f32>, k: usize) -> Result<Vec<SearchHit>> {
        if vector.len() != self.engine.dimensions() {
            return Err(Error::engine(anyhow!(
                "查询向量维度不一致: 期望 {}，实际 {}",
                self.engine.dimensions(),
                vector.len()
            )));
        }

        let index = self.index.lock().await;
        let neighbors = index.query(&vector, k).map_err(Error::store)?;
        let ids = neighbors.iter().map(|n| n.id.clone()).collect::<Vec<_>>();
        let mut paths = self.store.get_paths(&ids).await?;
        drop(index);

        let hits = neighbors
            .into_iter()
            .map(|n| SearchHit { path: paths.remove(&n.id), fingerprint: n.id, distance: n.distance })
            .collect::<Vec<_>>();

        let unresolved = hits.iter().filter(|hit| hit.path.is_none()).count();
        if unresolved > 0 {
            debug!("{unresolved} 条结果在数据库中已没有记录");
            metrics::inc_unresolved_hits(unresolved);
        }
        Ok(hits)
    }
}

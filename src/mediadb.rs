use std::fs;
use std::path::Path;
use std::sync::Arc;

use indicatif::ProgressBar;
use log::info;

use crate::config::ConfDir;
use crate::db::MetadataStore;
use crate::embedding::EmbeddingEngine;
use crate::error::{Error, Result};
use crate::index::VectorIndex;
use crate::query::{QueryService, SearchHit};
use crate::scan::{ScanCoordinator, ScanReport};
use crate::tools::{self, ImageSearchResults};

pub struct MediaDBBuilder {
    conf_dir: ConfDir,
    extensions: Option<Vec<String>>,
    batch_size: usize,
}

impl MediaDBBuilder {
    pub fn new(conf_dir: ConfDir) -> Self {
        Self { conf_dir, extensions: None, batch_size: 32 }
    }

    /// 扫描的后缀名，不设置时使用默认的图片格式
    pub fn extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = Some(extensions);
        self
    }

    /// 每批计算向量的图片数量
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// 打开元数据库和向量索引，不存在时自动创建
    pub async fn open(self, engine: Arc<dyn EmbeddingEngine>) -> Result<MediaDB> {
        fs::create_dir_all(self.conf_dir.path())
            .map_err(|source| Error::Io { path: self.conf_dir.path().to_path_buf(), source })?;

        let store = MetadataStore::open(self.conf_dir.database()).await?;
        let index = VectorIndex::open(self.conf_dir.vector_index(), engine.dimensions()).map_err(Error::store)?;
        let index = Arc::new(index);
        info!("使用嵌入模型: {}，向量维度 {}", engine.name(), engine.dimensions());

        let mut scanner = ScanCoordinator::new(engine.clone(), store.clone(), index.clone())
            .with_batch_size(self.batch_size);
        if let Some(extensions) = self.extensions {
            scanner = scanner.with_extensions(extensions);
        }
        let query = QueryService::new(engine, store.clone(), index.clone());

        Ok(MediaDB { store, index, scanner, query })
    }
}

/// 图片索引的入口，持有扫描和查询共用的存储
pub struct MediaDB {
    store: MetadataStore,
    index: Arc<VectorIndex>,
    scanner: ScanCoordinator,
    query: QueryService,
}

impl MediaDB {
    pub fn scanner(&self) -> &ScanCoordinator {
        &self.scanner
    }

    pub fn query(&self) -> &QueryService {
        &self.query
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub async fn scan<P: AsRef<Path>>(&self, roots: &[P]) -> Result<ScanReport> {
        self.scanner.scan(roots).await
    }

    pub async fn scan_with_progress<P: AsRef<Path>>(&self, roots: &[P], pb: ProgressBar) -> Result<ScanReport> {
        self.scanner.scan_with_progress(roots, pb).await
    }

    pub async fn search_by_text(&self, text: &str, k: usize) -> Result<Vec<SearchHit>> {
        self.query.search_by_text(text, k).await
    }

    pub async fn search_by_image(&self, path: impl AsRef<Path>, k: usize) -> Result<Vec<SearchHit>> {
        self.query.search_by_image(path, k).await
    }

    /// 以文搜图，返回图片路径
    pub async fn search_image_by_text(&self, text: &str, top_k: usize) -> Result<Vec<String>> {
        tools::search_image_by_text(&self.query, text, top_k).await
    }

    /// 以图搜图，返回 `{ "results": [...] }`
    pub async fn search_similar_images(&self, path: impl AsRef<Path>, top_k: usize) -> Result<ImageSearchResults> {
        tools::search_by_image(&self.query, path, top_k).await
    }
}

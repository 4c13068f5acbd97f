use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow, bail, ensure};
use log::{debug, error, info};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

const INDEX_FILE: &str = "index.usearch";
const KEYS_FILE: &str = "keys.bin";

/// 搜索结果
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    /// 图片指纹
    pub id: String,
    /// 与查询向量的距离，越小越相似
    pub distance: f32,
}

/// usearch 只接受 u64 作为键，这里维护 指纹 <=> 键 的映射，键不会被复用
#[derive(Debug, Default, Serialize, Deserialize)]
struct KeyMap {
    next_key: u64,
    keys: HashMap<String, u64>,
}

/// 向量索引的实际状态，只能通过 [`VectorIndex::lock`] 访问
pub struct IndexState {
    index: Index,
    keys: KeyMap,
    ids: HashMap<u64, String>,
    dir: PathBuf,
    dimensions: usize,
}

impl IndexState {
    fn open(dir: &Path, dimensions: usize) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let index_file = dir.join(INDEX_FILE);
        let keys_file = dir.join(KEYS_FILE);

        let index = Index::new(&index_options(dimensions))?;
        let keys = match (index_file.exists(), keys_file.exists()) {
            (true, true) => {
                index.load(path_str(&index_file)?)?;
                ensure!(
                    index.dimensions() == dimensions,
                    "向量维度不一致: 索引为 {}，模型为 {}",
                    index.dimensions(),
                    dimensions
                );
                let keys = bincode::deserialize::<KeyMap>(&fs::read(&keys_file)?)?;
                // 两个文件分别重命名，中途崩溃会留下不配套的文件
                ensure!(
                    index.size() == keys.keys.len(),
                    "向量索引与键映射不一致: 索引 {} 条，键映射 {} 条",
                    index.size(),
                    keys.keys.len()
                );
                keys
            }
            (false, false) => KeyMap::default(),
            _ => bail!("向量索引目录不完整: {}", dir.display()),
        };
        let ids = keys.keys.iter().map(|(id, key)| (*key, id.clone())).collect();

        info!("加载向量索引: {}，共 {} 条向量", dir.display(), keys.keys.len());
        Ok(Self { index, keys, ids, dir: dir.to_path_buf(), dimensions })
    }

    pub fn len(&self) -> usize {
        self.keys.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.keys.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.keys.keys.contains_key(id)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// 添加一批向量，`vectors` 的第 i 行对应 `ids[i]`
    ///
    /// 已存在的 ID 会被跳过：相同内容的向量永远相同，不需要更新。
    /// 失败时本次添加的所有向量都会被撤销。返回实际新增的数量。
    pub fn add(&mut self, ids: &[String], vectors: ArrayView2<f32>) -> Result<usize> {
        ensure!(vectors.nrows() == ids.len(), "ID 数量 {} 与向量数量 {} 不一致", ids.len(), vectors.nrows());
        ensure!(
            vectors.ncols() == self.dimensions,
            "向量维度不一致: 期望 {}，实际 {}",
            self.dimensions,
            vectors.ncols()
        );

        let mut added = vec![];
        let result = self.add_inner(ids, vectors, &mut added).and_then(|_| match added.is_empty() {
            true => Ok(()),
            false => self.persist(),
        });
        if let Err(e) = result {
            for key in added {
                if let Err(undo) = self.index.remove(key) {
                    error!("撤销向量写入失败，key {key}: {undo}");
                }
                if let Some(id) = self.ids.remove(&key) {
                    self.keys.keys.remove(&id);
                }
            }
            return Err(e);
        }

        debug!("向量索引新增 {} 条，当前共 {} 条", added.len(), self.len());
        Ok(added.len())
    }

    fn add_inner(&mut self, ids: &[String], vectors: ArrayView2<f32>, added: &mut Vec<u64>) -> Result<()> {
        self.index.reserve(self.index.size() + ids.len())?;
        for (id, row) in ids.iter().zip(vectors.rows()) {
            if self.keys.keys.contains_key(id) {
                continue;
            }
            let key = self.keys.next_key;
            self.index.add(key, &row.to_vec())?;
            self.keys.next_key += 1;
            self.keys.keys.insert(id.clone(), key);
            self.ids.insert(key, id.clone());
            added.push(key);
        }
        Ok(())
    }

    /// 删除一批向量，不存在的 ID 会被忽略，返回实际删除的数量
    pub fn delete(&mut self, ids: &[String]) -> Result<usize> {
        let mut deleted = 0;
        for id in ids {
            if let Some(&key) = self.keys.keys.get(id) {
                self.index.remove(key)?;
                self.keys.keys.remove(id);
                self.ids.remove(&key);
                deleted += 1;
            }
        }
        if deleted > 0 {
            self.persist()?;
        }
        debug!("向量索引删除 {} 条，当前共 {} 条", deleted, self.len());
        Ok(deleted)
    }

    /// 搜索最接近的 k 个向量，按距离升序排列
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        ensure!(
            vector.len() == self.dimensions,
            "查询向量维度不一致: 期望 {}，实际 {}",
            self.dimensions,
            vector.len()
        );
        // usearch 会按 k 分配结果缓冲区
        let k = k.min(self.len());
        if k == 0 {
            return Ok(vec![]);
        }
        let matches = self.index.search(vector, k)?;
        let neighbors = matches
            .keys
            .into_iter()
            .zip(matches.distances)
            .filter_map(|(key, distance)| {
                self.ids.get(&key).map(|id| Neighbor { id: id.clone(), distance })
            })
            .collect();
        Ok(neighbors)
    }

    /// 对每一行查询向量分别搜索
    pub fn query_batch(&self, vectors: ArrayView2<f32>, k: usize) -> Result<Vec<Vec<Neighbor>>> {
        vectors.rows().into_iter().map(|row| self.query(&row.to_vec(), k)).collect()
    }

    /// 先写入临时文件再重命名，避免写到一半的文件覆盖旧索引
    fn persist(&self) -> Result<()> {
        let index_file = self.dir.join(INDEX_FILE);
        let keys_file = self.dir.join(KEYS_FILE);
        let index_tmp = self.dir.join(format!("{INDEX_FILE}.tmp"));
        let keys_tmp = self.dir.join(format!("{KEYS_FILE}.tmp"));

        self.index.save(path_str(&index_tmp)?)?;
        fs::write(&keys_tmp, bincode::serialize(&self.keys)?)?;
        fs::rename(&index_tmp, &index_file)?;
        fs::rename(&keys_tmp, &keys_file)?;
        Ok(())
    }
}

/// 以指纹为键的近似最近邻索引
///
/// 底层索引不保证线程安全，所有读写都经过同一把锁。
/// 需要把多个操作放进同一个临界区时（扫描写入、查询解析），使用 [`VectorIndex::lock`]。
pub struct VectorIndex {
    state: Mutex<IndexState>,
}

impl VectorIndex {
    /// 打开或创建索引目录
    pub fn open(dir: impl AsRef<Path>, dimensions: usize) -> Result<Self> {
        let state = IndexState::open(dir.as_ref(), dimensions)?;
        Ok(Self { state: Mutex::new(state) })
    }

    /// 获取索引锁，guard 释放时自动解锁
    pub async fn lock(&self) -> MutexGuard<'_, IndexState> {
        self.state.lock().await
    }

    pub async fn add(&self, ids: &[String], vectors: ArrayView2<'_, f32>) -> Result<usize> {
        self.lock().await.add(ids, vectors)
    }

    pub async fn delete(&self, ids: &[String]) -> Result<usize> {
        self.lock().await.delete(ids)
    }

    pub async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.lock().await.query(vector, k)
    }

    pub async fn query_batch(&self, vectors: ArrayView2<'_, f32>, k: usize) -> Result<Vec<Vec<Neighbor>>> {
        self.lock().await.query_batch(vectors, k)
    }

    pub async fn len(&self) -> usize {
        self.lock().await.len()
    }
}

fn index_options(dimensions: usize) -> IndexOptions {
    IndexOptions {
        dimensions,
        metric: MetricKind::Cos,
        quantization: ScalarKind::F32,
        // 此处为 usearch 默认参数
        connectivity: 16,
        expansion_add: 128,
        expansion_search: 64,
        ..Default::default()
    }
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| anyhow!("路径不是合法的 UTF-8: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;
    use tempfile::tempdir;

    use super::*;
    use crate::embedding::EmbeddingEngine;
    use crate::embedding::testing::HashEngine;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn vectors(engine: &HashEngine, names: &[&str]) -> Array2<f32> {
        let data: Vec<Vec<u8>> = names.iter().map(|s| s.as_bytes().to_vec()).collect();
        engine.embed_images(&data).unwrap()
    }

    #[tokio::test]
    async fn test_add_query_delete() {
        let dir = tempdir().unwrap();
        let engine = HashEngine { dimensions: 32 };
        let index = VectorIndex::open(dir.path(), 32).unwrap();

        let names = ["a", "b", "c", "d"];
        assert_eq!(index.add(&ids(&names), vectors(&engine, &names).view()).await.unwrap(), 4);
        assert_eq!(index.len().await, 4);

        let result = index.query(&engine.vector(b"c"), 2).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].id, "c");
        assert!(result[0].distance.abs() < 1e-4);
        assert!(result[0].distance <= result[1].distance);

        assert_eq!(index.delete(&ids(&["c", "zz"])).await.unwrap(), 1);
        let result = index.query(&engine.vector(b"c"), 4).await.unwrap();
        assert!(result.iter().all(|n| n.id != "c"));
    }

    #[tokio::test]
    async fn test_add_is_append_only() {
        let dir = tempdir().unwrap();
        let engine = HashEngine { dimensions: 16 };
        let index = VectorIndex::open(dir.path(), 16).unwrap();

        index.add(&ids(&["a"]), vectors(&engine, &["a"]).view()).await.unwrap();
        // 已存在的 ID 和同一批次中的重复 ID 都不会被再次添加
        let added = index.add(&ids(&["a", "b", "b"]), vectors(&engine, &["x", "b", "b"]).view()).await.unwrap();
        assert_eq!(added, 1);
        assert_eq!(index.len().await, 2);

        let result = index.query(&engine.vector(b"a"), 1).await.unwrap();
        assert_eq!(result[0].id, "a");
        assert!(result[0].distance.abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_persistence() {
        let dir = tempdir().unwrap();
        let engine = HashEngine { dimensions: 16 };
        {
            let index = VectorIndex::open(dir.path(), 16).unwrap();
            index.add(&ids(&["a", "b"]), vectors(&engine, &["a", "b"]).view()).await.unwrap();
            index.delete(&ids(&["a"])).await.unwrap();
        }

        let index = VectorIndex::open(dir.path(), 16).unwrap();
        let state = index.lock().await;
        assert_eq!(state.len(), 1);
        assert!(state.contains("b"));
        assert!(!state.contains("a"));
        assert_eq!(state.query(&engine.vector(b"b"), 1).unwrap()[0].id, "b");
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let dir = tempdir().unwrap();
        let engine = HashEngine { dimensions: 16 };
        {
            let index = VectorIndex::open(dir.path(), 16).unwrap();
            index.add(&ids(&["a"]), vectors(&engine, &["a"]).view()).await.unwrap();
            assert!(index.query(&[0.0; 8], 1).await.is_err());
        }
        assert!(VectorIndex::open(dir.path(), 32).is_err());
    }

    #[tokio::test]
    async fn test_huge_k_is_clamped() {
        let dir = tempdir().unwrap();
        let engine = HashEngine { dimensions: 16 };
        let index = VectorIndex::open(dir.path(), 16).unwrap();
        index.add(&ids(&["a", "b"]), vectors(&engine, &["a", "b"]).view()).await.unwrap();

        let result = index.query(&engine.vector(b"a"), usize::MAX).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].id, "a");
        assert_eq!(index.query(&engine.vector(b"a"), 1 << 40).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_mismatched_key_map_is_rejected() {
        let dir = tempdir().unwrap();
        let engine = HashEngine { dimensions: 16 };
        let stale = dir.path().join("keys.stale");
        {
            let index = VectorIndex::open(dir.path(), 16).unwrap();
            index.add(&ids(&["a"]), vectors(&engine, &["a"]).view()).await.unwrap();
            fs::copy(dir.path().join(KEYS_FILE), &stale).unwrap();
            index.add(&ids(&["b"]), vectors(&engine, &["b"]).view()).await.unwrap();
        }

        // 模拟只重命名了索引文件
        fs::rename(&stale, dir.path().join(KEYS_FILE)).unwrap();
        assert!(VectorIndex::open(dir.path(), 16).is_err());
    }

    #[tokio::test]
    async fn test_empty_query() {
        let dir = tempdir().unwrap();
        let index = VectorIndex::open(dir.path(), 8).unwrap();
        assert!(index.query(&[0.5; 8], 5).await.unwrap().is_empty());
        let batch = Array2::<f32>::ones((2, 8));
        assert_eq!(index.query_batch(batch.view(), 3).await.unwrap(), vec![vec![], vec![]]);
    }
}

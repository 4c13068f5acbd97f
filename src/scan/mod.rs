//! 增量扫描
//!
//! 把磁盘上的图片与元数据库、向量索引同步。内容相同的文件共用一个指纹，
//! 只有从未见过的内容才需要计算向量；移动文件只更新路径。

mod enumerate;
mod hash;
mod types;

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use indicatif::ProgressBar;
use log::{debug, error, info, warn};
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, spawn_blocking};

pub use self::enumerate::*;
pub use self::hash::*;
pub use self::types::*;
use crate::db::{MediaRecord, MetadataStore};
use crate::embedding::{EmbeddingEngine, check_shape};
use crate::error::{Error, Result};
use crate::index::VectorIndex;
use crate::{metrics, utils};

/// 扫描协调器，是元数据库和向量索引唯一的写入方
///
/// 同一时间只会有一个扫描在执行，并发调用会排队等待。
pub struct ScanCoordinator {
    engine: Arc<dyn EmbeddingEngine>,
    store: MetadataStore,
    index: Arc<VectorIndex>,
    extensions: Vec<String>,
    batch_size: usize,
    scan_lock: Mutex<()>,
}

impl ScanCoordinator {
    pub fn new(engine: Arc<dyn EmbeddingEngine>, store: MetadataStore, index: Arc<VectorIndex>) -> Self {
        Self {
            engine,
            store,
            index,
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            batch_size: 32,
            scan_lock: Mutex::new(()),
        }
    }

    /// 设置扫描的后缀名
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    /// 设置每批计算向量的图片数量
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// 扫描指定的根路径
    pub async fn scan<P: AsRef<Path>>(&self, roots: &[P]) -> Result<ScanReport> {
        self.scan_with_progress(roots, ProgressBar::hidden()).await
    }

    /// 扫描指定的根路径，使用进度条显示计算指纹的进度
    pub async fn scan_with_progress<P: AsRef<Path>>(
        &self,
        roots: &[P],
        pb: ProgressBar,
    ) -> Result<ScanReport> {
        let enumerator = PathEnumerator::new(roots).with_extensions(&self.extensions);
        if enumerator.roots().is_empty() {
            return Err(Error::config("没有可用的扫描路径"));
        }

        let _guard = self.scan_lock.lock().await;
        let start = Instant::now();

        info!("开始扫描: {:?}", enumerator.roots());
        let found = join(spawn_blocking(move || {
            let mut seen = HashSet::new();
            enumerator.iter().filter(|path| seen.insert(path.clone())).collect::<Vec<_>>()
        }))
        .await;
        info!("扫描完成，共 {} 张图片", found.len());

        let known = self.store.get_all().await?;
        debug!("数据库中已有 {} 条记录", known.len());

        let hashes = {
            let found = found.clone();
            let pb = pb.clone();
            join(spawn_blocking(move || hash_files(&found, &pb))).await
        };
        pb.finish_and_clear();
        let plan = plan_changes(&found, hashes, &known);
        info!("新图片 {} 张，移动 {} 张", plan.new.len(), plan.moves.len());

        let mut report = ScanReport {
            total: plan.hashed,
            updated: plan.moves.len(),
            skipped: plan.skipped,
            ..Default::default()
        };

        // 新图片失败只影响插入这一步，后续的移动和删除照常执行
        let mut engine_error = None;
        match self.insert_new(&plan.new, &mut report).await {
            Ok(()) => {}
            Err(e @ Error::Engine(_)) => {
                error!("计算向量失败，本次扫描不添加新图片: {e}");
                engine_error = Some(e);
            }
            Err(e) => return Err(e),
        }

        let found = found.iter().map(|p| p.to_string_lossy().into_owned()).collect::<HashSet<_>>();
        report.deleted = self.apply_moves_and_deletions(&plan.moves, &found).await?;

        info!(
            "扫描结束: 共 {} 张，新增 {}，更新 {}，删除 {}，跳过 {}",
            report.total, report.new, report.updated, report.deleted, report.skipped
        );
        metrics::observe_scan(&report, start.elapsed().as_secs_f32());

        match engine_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// 分批计算新图片的向量，并成对写入向量索引和元数据库
    async fn insert_new(&self, new: &[(Fingerprint, PathBuf)], report: &mut ScanReport) -> Result<()> {
        for chunk in new.chunks(self.batch_size) {
            let chunk = chunk.to_vec();
            let (loaded, failed) = join(spawn_blocking(move || read_chunk(chunk))).await;
            report.skipped += failed;
            report.total -= failed;
            if loaded.is_empty() {
                continue;
            }

            let mut ids = Vec::with_capacity(loaded.len());
            let mut paths = Vec::with_capacity(loaded.len());
            let mut images = Vec::with_capacity(loaded.len());
            for (id, path, data) in loaded {
                ids.push(id);
                paths.push(path);
                images.push(data);
            }

            let engine = self.engine.clone();
            let vectors = spawn_blocking(move || {
                let vectors = engine.embed_images(&images)?;
                check_shape(&vectors, images.len(), engine.dimensions())?;
                Ok::<_, anyhow::Error>(vectors)
            })
            .await
            .map_err(|e| Error::engine(anyhow!("计算向量的任务异常退出: {e}")))?
            .map_err(Error::engine)?;

            // 两个存储必须同时写入成功，否则都视为未写入
            let now = utils::now();
            let mut index = self.index.lock().await;
            let fresh = ids.iter().filter(|id| !index.contains(id)).cloned().collect::<Vec<_>>();
            index.add(&ids, vectors.view()).map_err(Error::store)?;

            let records = ids
                .iter()
                .zip(&paths)
                .map(|(id, path)| MediaRecord::new(id.as_str(), path.as_str(), &now))
                .collect::<Vec<_>>();
            if let Err(e) = self.store.bulk_insert(&records).await {
                if let Err(undo) = index.delete(&fresh) {
                    error!("撤销向量写入失败，向量索引可能与数据库不一致: {undo:#}");
                }
                return Err(e);
            }
            drop(index);

            report.new += ids.len();
            debug!("已添加 {}/{} 张新图片", report.new, new.len());
        }
        Ok(())
    }

    /// 更新移动过的路径，然后删除已经不存在的图片，返回删除数量
    async fn apply_moves_and_deletions(
        &self,
        moves: &[(Fingerprint, String)],
        found: &HashSet<String>,
    ) -> Result<usize> {
        let now = utils::now();
        let mut index = self.index.lock().await;

        self.store.upsert_paths(moves, &now).await?;

        // 只有路径不在本次扫描结果中、且文件确实已经不存在时才删除，
        // 这样缩小扫描范围不会误删其他目录下的记录
        let mut deletions = self
            .store
            .get_all()
            .await?
            .into_iter()
            .filter(|(_, path)| !found.contains(path) && !Path::new(path).exists())
            .map(|(fingerprint, _)| fingerprint)
            .collect::<Vec<_>>();
        deletions.sort_unstable();

        if !deletions.is_empty() {
            info!("删除 {} 张已不存在的图片", deletions.len());
            index.delete(&deletions).map_err(Error::store)?;
            self.store.delete(&deletions).await?;
        }
        Ok(deletions.len())
    }
}

/// 对比指纹与已知记录，生成修改计划
///
/// 内容相同的多个文件按遍历顺序分组：如果记录中的路径仍在其中，视为未变化；
/// 否则记录指向最后处理的那个路径。
pub(crate) fn plan_changes(
    found: &[PathBuf],
    hashes: Vec<io::Result<Fingerprint>>,
    known: &HashMap<String, String>,
) -> ScanPlan {
    let mut plan = ScanPlan::default();
    let mut groups: Vec<(Fingerprint, Vec<&PathBuf>)> = vec![];
    let mut positions: HashMap<Fingerprint, usize> = HashMap::new();

    for (path, hash) in found.iter().zip(hashes) {
        match hash {
            Ok(fingerprint) => {
                plan.hashed += 1;
                match positions.get(&fingerprint) {
                    Some(&i) => groups[i].1.push(path),
                    None => {
                        positions.insert(fingerprint.clone(), groups.len());
                        groups.push((fingerprint, vec![path]));
                    }
                }
            }
            Err(e) => {
                warn!("计算哈希失败，跳过 {}: {e}", path.display());
                plan.skipped += 1;
            }
        }
    }

    for (fingerprint, paths) in groups {
        let Some(&last) = paths.last() else {
            continue;
        };
        match known.get(&fingerprint) {
            Some(recorded) if paths.iter().any(|p| p.as_os_str() == recorded.as_str()) => {}
            Some(recorded) => {
                debug!("移动: {} -> {}", recorded, last.display());
                plan.moves.push((fingerprint, last.to_string_lossy().into_owned()));
            }
            None => plan.new.push((fingerprint, last.clone())),
        }
    }

    plan
}

/// 读取一批新图片的内容，返回 (成功读取的图片, 失败数量)
///
/// 内容与扫描时计算的指纹不一致的文件（扫描期间被修改）同样跳过，下次扫描再处理。
fn read_chunk(chunk: Vec<(Fingerprint, PathBuf)>) -> (Vec<(Fingerprint, String, Vec<u8>)>, usize) {
    let mut loaded = vec![];
    let mut failed = 0;
    for (fingerprint, path) in chunk {
        match std::fs::read(&path) {
            Ok(data) if hash_bytes(&data) == fingerprint => {
                loaded.push((fingerprint, path.to_string_lossy().into_owned(), data));
            }
            Ok(_) => {
                warn!("文件在扫描期间被修改，跳过: {}", path.display());
                failed += 1;
            }
            Err(e) => {
                warn!("{}", Error::Io { path, source: e });
                failed += 1;
            }
        }
    }
    (loaded, failed)
}

/// 等待阻塞任务完成，任务中的 panic 原样抛出
async fn join<T>(handle: JoinHandle<T>) -> T {
    match handle.await {
        Ok(value) => value,
        Err(e) => std::panic::resume_unwind(e.into_panic()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(h, p)| (h.to_string(), p.to_string())).collect()
    }

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    fn ok(hashes: &[&str]) -> Vec<io::Result<Fingerprint>> {
        hashes.iter().map(|h| Ok(h.to_string())).collect()
    }

    #[test]
    fn test_plan_new_move_unchanged() {
        let found = paths(&["/d/a.jpg", "/d/b.jpg", "/d/new.jpg"]);
        let plan = plan_changes(
            &found,
            ok(&["ha", "hb", "hn"]),
            &known(&[("ha", "/d/a.jpg"), ("hb", "/old/b.jpg")]),
        );
        assert_eq!(plan.hashed, 3);
        assert_eq!(plan.new, vec![("hn".to_string(), PathBuf::from("/d/new.jpg"))]);
        assert_eq!(plan.moves, vec![("hb".to_string(), "/d/b.jpg".to_string())]);
    }

    #[test]
    fn test_plan_duplicates() {
        // 已记录的路径仍然存在，复制出来的文件不算移动
        let found = paths(&["/d/cat.jpg", "/d/cat2.jpg"]);
        let plan = plan_changes(&found, ok(&["h", "h"]), &known(&[("h", "/d/cat.jpg")]));
        assert!(plan.new.is_empty() && plan.moves.is_empty());

        // 新内容有多个副本时只添加最后一个
        let plan = plan_changes(&found, ok(&["h", "h"]), &known(&[]));
        assert_eq!(plan.new, vec![("h".to_string(), PathBuf::from("/d/cat2.jpg"))]);

        // 原路径消失时移动到最后一个副本
        let plan = plan_changes(&found, ok(&["h", "h"]), &known(&[("h", "/gone.jpg")]));
        assert_eq!(plan.moves, vec![("h".to_string(), "/d/cat2.jpg".to_string())]);
    }

    #[test]
    fn test_plan_skips_unreadable() {
        let found = paths(&["/d/a.jpg", "/d/broken.jpg"]);
        let hashes = vec![Ok("ha".to_string()), Err(io::Error::other("boom"))];
        let plan = plan_changes(&found, hashes, &known(&[]));
        assert_eq!(plan.hashed, 1);
        assert_eq!(plan.skipped, 1);
        assert_eq!(plan.new.len(), 1);
    }
}

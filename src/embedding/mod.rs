//! 嵌入模型接口
//!
//! 模型在进程启动时加载一次，之后以 `Arc<dyn EmbeddingEngine>` 的形式注入到扫描和查询流程中。

#[cfg(feature = "clip")]
mod clip;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, ensure};
use ndarray::Array2;

#[cfg(feature = "clip")]
pub use clip::ClipEngine;

/// 将图片和文本映射到同一个固定维度向量空间的模型
///
/// 所有方法都是阻塞调用，异步上下文中需要放到 `spawn_blocking` 里执行。
pub trait EmbeddingEngine: Send + Sync {
    /// 计算一批图片（编码后的原始字节）的向量，返回 `[N, D]` 矩阵，行顺序与输入一致
    fn embed_images(&self, images: &[Vec<u8>]) -> Result<Array2<f32>>;

    /// 计算查询文本的向量
    fn embed_text(&self, query: &str) -> Result<Vec<f32>>;

    /// 向量维度
    fn dimensions(&self) -> usize;

    /// 模型名称，用于日志
    fn name(&self) -> &str;
}

/// 嵌入模型加载参数
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// 模型文件缓存目录
    pub cache_dir: PathBuf,
    /// 单次推理的图片数量
    pub batch_size: usize,
}

/// 加载默认的嵌入模型
///
/// 加载失败对整个索引子系统是致命的，调用方应直接终止。
#[cfg(feature = "clip")]
pub fn load_engine(config: &EngineConfig) -> Result<Arc<dyn EmbeddingEngine>> {
    let engine = ClipEngine::new(&config.cache_dir, config.batch_size)?;
    Ok(Arc::new(engine))
}

#[cfg(not(feature = "clip"))]
pub fn load_engine(_config: &EngineConfig) -> Result<Arc<dyn EmbeddingEngine>> {
    anyhow::bail!("未启用 `clip` 特性，没有可用的嵌入模型")
}

/// 检查模型输出的形状是否符合预期
pub fn check_shape(matrix: &Array2<f32>, rows: usize, dimensions: usize) -> Result<()> {
    ensure!(
        matrix.dim() == (rows, dimensions),
        "嵌入结果形状不匹配: 期望 [{rows}, {dimensions}]，实际 {:?}",
        matrix.dim()
    );
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use anyhow::bail;
    use ndarray::Array2;

    use super::*;

    /// 测试用模型：向量由内容的 blake3 哈希展开而来，相同内容得到相同向量
    pub struct HashEngine {
        pub dimensions: usize,
    }

    impl HashEngine {
        pub fn vector(&self, data: &[u8]) -> Vec<f32> {
            let mut reader = blake3::Hasher::new().update(data).finalize_xof();
            let mut bytes = vec![0u8; self.dimensions];
            reader.fill(&mut bytes);
            let v: Vec<f32> = bytes.iter().map(|&b| b as f32 - 127.5).collect();
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            v.into_iter().map(|x| x / norm).collect()
        }
    }

    impl EmbeddingEngine for HashEngine {
        fn embed_images(&self, images: &[Vec<u8>]) -> Result<Array2<f32>> {
            let flat: Vec<f32> = images.iter().flat_map(|data| self.vector(data)).collect();
            Ok(Array2::from_shape_vec((images.len(), self.dimensions), flat)?)
        }

        fn embed_text(&self, query: &str) -> Result<Vec<f32>> {
            Ok(self.vector(query.as_bytes()))
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }

        fn name(&self) -> &str {
            "hash"
        }
    }

    /// 测试用模型：任何调用都失败
    pub struct BrokenEngine;

    impl EmbeddingEngine for BrokenEngine {
        fn embed_images(&self, _: &[Vec<u8>]) -> Result<Array2<f32>> {
            bail!("模型不可用")
        }

        fn embed_text(&self, _: &str) -> Result<Vec<f32>> {
            bail!("模型不可用")
        }

        fn dimensions(&self) -> usize {
            8
        }

        fn name(&self) -> &str {
            "broken"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::HashEngine;
    use super::*;

    #[test]
    fn test_hash_engine_shape() {
        let engine = HashEngine { dimensions: 16 };
        let m = engine.embed_images(&[b"a".to_vec(), b"b".to_vec(), b"a".to_vec()]).unwrap();
        check_shape(&m, 3, 16).unwrap();
        assert_eq!(m.row(0), m.row(2));
        assert_ne!(m.row(0), m.row(1));
        assert!(check_shape(&m, 2, 16).is_err());
    }

    #[cfg(not(feature = "clip"))]
    #[test]
    fn test_load_without_clip_feature() {
        let config = EngineConfig { cache_dir: PathBuf::from("models"), batch_size: 32 };
        assert!(load_engine(&config).is_err());
    }
}

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Result, bail};
use mediasearch::embedding::EmbeddingEngine;
use mediasearch::{MediaDB, MediaDBBuilder};
use ndarray::Array2;

pub const DIMENSIONS: usize = 32;

/// 向量由内容的 blake3 哈希展开而来，相同内容得到相同向量；可以随时切换为失败状态
#[derive(Default)]
pub struct TestEngine {
    broken: AtomicBool,
}

impl TestEngine {
    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }

    pub fn vector(data: &[u8]) -> Vec<f32> {
        let mut reader = blake3::Hasher::new().update(data).finalize_xof();
        let mut bytes = [0u8; DIMENSIONS];
        reader.fill(&mut bytes);
        let v: Vec<f32> = bytes.iter().map(|&b| b as f32 - 127.5).collect();
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.into_iter().map(|x| x / norm).collect()
    }
}

impl EmbeddingEngine for TestEngine {
    fn embed_images(&self, images: &[Vec<u8>]) -> Result<Array2<f32>> {
        if self.broken.load(Ordering::SeqCst) {
            bail!("engine is down");
        }
        let flat: Vec<f32> = images.iter().flat_map(|data| Self::vector(data)).collect();
        Ok(Array2::from_shape_vec((images.len(), DIMENSIONS), flat)?)
    }

    fn embed_text(&self, query: &str) -> Result<Vec<f32>> {
        if self.broken.load(Ordering::SeqCst) {
            bail!("engine is down");
        }
        Ok(Self::vector(query.as_bytes()))
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    fn name(&self) -> &str {
        "test"
    }
}

pub async fn open_db(conf_dir: &Path, engine: Arc<TestEngine>) -> MediaDB {
    MediaDBBuilder::new(conf_dir.to_str().unwrap().parse().unwrap())
        .batch_size(2)
        .open(engine)
        .await
        .unwrap()
}

/// 写入一张“图片”，内容只用于区分指纹
pub fn write_image(path: impl AsRef<Path>, content: &str) {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

pub fn path_str(path: impl AsRef<Path>) -> String {
    path.as_ref().to_str().unwrap().to_string()
}

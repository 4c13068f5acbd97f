use std::path::Path;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use fastembed::{
    EmbeddingModel, ImageEmbedding, ImageEmbeddingModel, ImageInitOptions, InitOptions,
    TextEmbedding,
};
use log::info;
use ndarray::Array2;

use super::{EmbeddingEngine, check_shape};

/// CLIP ViT-B/32，图片和文本共用 512 维向量空间
pub struct ClipEngine {
    image: Mutex<ImageEmbedding>,
    text: Mutex<TextEmbedding>,
    dimensions: usize,
    batch_size: usize,
}

impl ClipEngine {
    pub fn new(cache_dir: &Path, batch_size: usize) -> Result<Self> {
        info!("加载 CLIP 模型，缓存目录: {}", cache_dir.display());
        let image = ImageEmbedding::try_new(
            ImageInitOptions::new(ImageEmbeddingModel::ClipVitB32)
                .with_cache_dir(cache_dir.to_path_buf()),
        )?;
        let mut text = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::ClipVitB32).with_cache_dir(cache_dir.to_path_buf()),
        )?;

        // 通过一次试算获取向量维度
        let probe = text.embed(vec!["dimension probe"], None)?;
        let dimensions = probe.first().map(|v| v.len()).ok_or_else(|| anyhow!("模型没有输出"))?;
        info!("CLIP 模型加载完成，向量维度: {dimensions}");

        Ok(Self {
            image: Mutex::new(image),
            text: Mutex::new(text),
            dimensions,
            batch_size: batch_size.max(1),
        })
    }
}

impl EmbeddingEngine for ClipEngine {
    fn embed_images(&self, images: &[Vec<u8>]) -> Result<Array2<f32>> {
        let bytes = images.iter().map(|data| data.as_slice()).collect::<Vec<_>>();
        let mut model = self.image.lock().map_err(|e| anyhow!("模型锁已损坏: {e}"))?;
        let vectors = model.embed_bytes(&bytes, Some(self.batch_size))?;

        let flat = vectors.into_iter().flatten().collect::<Vec<_>>();
        let matrix = Array2::from_shape_vec((images.len(), self.dimensions), flat)?;
        check_shape(&matrix, images.len(), self.dimensions)?;
        Ok(matrix)
    }

    fn embed_text(&self, query: &str) -> Result<Vec<f32>> {
        let mut model = self.text.lock().map_err(|e| anyhow!("模型锁已损坏: {e}"))?;
        let vectors = model.embed(vec![query], None)?;
        vectors.into_iter().next().ok_or_else(|| anyhow!("模型没有输出"))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "clip-vit-b-32"
    }
}

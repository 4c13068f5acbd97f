use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use indicatif::{ParallelProgressIterator, ProgressBar};
use rayon::prelude::*;

/// 每次从文件中读取的字节数，保证内存占用与文件大小无关
pub const CHUNK_SIZE: usize = 1 << 20;

/// 内容指纹，blake3 哈希的十六进制表示（64 个字符）
pub type Fingerprint = String;

/// 流式计算文件内容的指纹
pub fn hash_file(path: impl AsRef<Path>) -> io::Result<Fingerprint> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// 计算内存中数据的指纹，与 `hash_file` 结果一致
pub fn hash_bytes(data: &[u8]) -> Fingerprint {
    blake3::hash(data).to_hex().to_string()
}

/// 并行计算一组文件的指纹，返回结果与输入顺序一致
pub fn hash_files(paths: &[PathBuf], pb: &ProgressBar) -> Vec<io::Result<Fingerprint>> {
    pb.set_length(paths.len() as u64);
    paths.par_iter().progress_with(pb.clone()).map(hash_file).collect()
}

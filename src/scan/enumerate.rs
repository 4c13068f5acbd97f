use std::path::{Path, PathBuf};

use log::{debug, warn};
use walkdir::WalkDir;

use crate::utils::absolute_path;

/// 默认扫描的图片后缀名
pub const DEFAULT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// 遍历扫描根路径，产出所有候选图片文件
///
/// 根路径可以是文件也可以是目录，目录会被递归遍历。
/// 同一目录下的条目按文件名排序，因此对于同一份文件系统快照，输出顺序是确定的。
#[derive(Debug, Clone)]
pub struct PathEnumerator {
    roots: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl PathEnumerator {
    /// 创建遍历器，不存在的根路径会被丢弃
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        // 统一为不含 `..` 的绝对路径，记录中的路径与根路径的写法无关
        let mut kept: Vec<PathBuf> = vec![];
        for root in roots.into_iter().map(absolute_path) {
            if !root.exists() {
                warn!("扫描路径不存在，已忽略: {}", root.display());
            } else if !kept.contains(&root) {
                kept.push(root);
            }
        }
        Self { roots: kept, extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect() }
    }

    /// 设置允许的后缀名，不区分大小写
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|s| s.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    /// 有效的根路径，均为绝对路径
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// 惰性遍历所有候选图片
    pub fn iter(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.roots.iter().flat_map(move |root| {
            let walk: Box<dyn Iterator<Item = PathBuf>> = if root.is_dir() {
                debug!("遍历目录: {}", root.display());
                Box::new(
                    WalkDir::new(root)
                        .sort_by_file_name()
                        .into_iter()
                        .filter_map(|entry| match entry {
                            Ok(entry) => Some(entry.into_path()),
                            Err(e) => {
                                warn!("遍历目录出错: {e}");
                                None
                            }
                        })
                        .filter(|path| path.is_file()),
                )
            } else {
                Box::new(std::iter::once(root.clone()))
            };
            walk.filter(move |path| self.is_allowed(path))
        })
    }

    fn is_allowed(&self, path: &Path) -> bool {
        has_extension(path, &self.extensions)
    }
}

/// 判断文件后缀名是否在允许列表中
pub fn has_extension<S: AsRef<str>>(path: &Path, extensions: &[S]) -> bool {
    match path.extension() {
        Some(ext) => {
            let ext = ext.to_string_lossy();
            extensions.iter().any(|allowed| ext.eq_ignore_ascii_case(allowed.as_ref()))
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rstest::rstest;
    use tempfile::tempdir;

    use super::*;

    #[rstest]
    #[case("a.jpg", true)]
    #[case("a.JPEG", true)]
    #[case("a.Png", true)]
    #[case("a.webp", false)]
    #[case("jpg", false)]
    #[case("a.jpg.txt", false)]
    fn test_has_extension(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(has_extension(Path::new(name), DEFAULT_EXTENSIONS), expected);
    }

    #[test]
    fn test_walk_recursive_and_sorted() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        fs::write(dir.path().join("b.png"), b"b").unwrap();
        fs::write(dir.path().join("a.jpg"), b"a").unwrap();
        fs::write(dir.path().join("notes.txt"), b"n").unwrap();
        fs::write(dir.path().join("sub/deeper/c.JPEG"), b"c").unwrap();

        let enumerator = PathEnumerator::new([dir.path()]);
        let found: Vec<_> = enumerator.iter().collect();
        let names: Vec<_> =
            found.iter().map(|p| p.file_name().unwrap().to_string_lossy().to_string()).collect();

        assert_eq!(names, ["a.jpg", "b.png", "c.JPEG"]);
        assert!(found.iter().all(|p| p.is_absolute()));

        // 同一快照多次遍历结果一致
        let again: Vec<_> = enumerator.iter().collect();
        assert_eq!(found, again);
    }

    #[test]
    fn test_file_root_and_missing_root() {
        let dir = tempdir().unwrap();
        let image = dir.path().join("x.png");
        let text = dir.path().join("x.txt");
        fs::write(&image, b"x").unwrap();
        fs::write(&text, b"x").unwrap();

        let enumerator = PathEnumerator::new([image.clone(), text, dir.path().join("missing")]);
        assert_eq!(enumerator.roots().len(), 2);
        assert_eq!(enumerator.iter().collect::<Vec<_>>(), [image]);
    }

    #[test]
    fn test_equivalent_roots_are_merged() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("x")).unwrap();
        fs::write(dir.path().join("a.jpg"), b"a").unwrap();

        let enumerator = PathEnumerator::new([dir.path().to_path_buf(), dir.path().join("x/..")]);
        assert_eq!(enumerator.roots(), [dir.path().to_path_buf()]);
        assert_eq!(enumerator.iter().collect::<Vec<_>>(), [dir.path().join("a.jpg")]);
    }

    #[test]
    fn test_custom_extensions() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.webp"), b"a").unwrap();
        fs::write(dir.path().join("b.jpg"), b"b").unwrap();

        let enumerator = PathEnumerator::new([dir.path()]).with_extensions([".WEBP"]);
        let found: Vec<_> = enumerator.iter().collect();
        assert_eq!(found, [dir.path().join("a.webp")]);
    }
}

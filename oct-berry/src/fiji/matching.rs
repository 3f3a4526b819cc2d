//! 图像与 ROI 压缩包的文件名匹配.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// ROI 压缩包索引: 小写键 (去掉后缀的文件名) -> 路径.
///
/// 键按字典序迭代, 匹配结果因此与目录遍历顺序无关.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoiIndex {
    entries: BTreeMap<String, PathBuf>,
}

impl RoiIndex {
    /// 扫描 `dir` 下小写文件名以 `suffix` 结尾的文件.
    pub fn build(dir: &Path, suffix: &str) -> std::io::Result<Self> {
        let suffix = suffix.to_lowercase();
        let mut index = Self::default();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if name.ends_with(&suffix) {
                index.insert(name.replace(&suffix, ""), entry.path());
            }
        }
        log::info!("indexed {} roi set(s) in {}", index.len(), dir.display());
        Ok(index)
    }

    /// 手动添加一项. 键会被转为小写.
    pub fn insert(&mut self, key: impl AsRef<str>, path: PathBuf) {
        self.entries.insert(key.as_ref().to_lowercase(), path);
    }

    /// 索引项数.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 全部键, 按字典序.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// 第一个被 `base` (不区分大小写) 包含的键及其路径.
    pub fn find(&self, base: &str) -> Option<(&str, &Path)> {
        let base = base.to_lowercase();
        self.entries
            .iter()
            .find(|(key, _)| base.contains(key.as_str()))
            .map(|(key, path)| (key.as_str(), path.as_path()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_first_contained_key() {
        let mut index = RoiIndex::default();
        index.insert("sample_02", PathBuf::from("b.zip"));
        index.insert("Sample_01", PathBuf::from("a.zip"));
        let (key, path) = index.find("sample_01").unwrap();
        assert_eq!(key, "sample_01");
        assert_eq!(path, Path::new("a.zip"));
        assert_eq!(index.find("SAMPLE_02_dapi").unwrap().0, "sample_02");
        assert!(index.find("sample_03").is_none());
    }

    /// 较短的键会先命中包含它的文件名.
    #[test]
    fn test_find_prefers_sorted_order() {
        let mut index = RoiIndex::default();
        index.insert("s1", PathBuf::from("short.zip"));
        index.insert("s10", PathBuf::from("long.zip"));
        assert_eq!(index.find("s10_image").unwrap().0, "s1");
    }

    #[test]
    fn test_build_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["Sample_01_RoiSet.zip", "sample_02_roiset.zip", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested_roiset.zip")).unwrap();
        let index = RoiIndex::build(dir.path(), "_roiset.zip").unwrap();
        assert_eq!(index.keys().collect::<Vec<_>>(), ["sample_01", "sample_02"]);
        let (_, path) = index.find("sample_01").unwrap();
        assert_eq!(path.file_name().unwrap(), "Sample_01_RoiSet.zip");
    }
}

use ndarray::{Array3, Ix3, OwnedRepr};
use ndarray_npy::{NpzReader, NpzWriter, ReadNpzError, WriteNpzError};
use std::fs::File;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// 打开/读写 `NpzArchive` 错误.
#[derive(Debug, thiserror::Error)]
pub enum OpenArchiveError {
    /// 归档中不存在给定字段.
    #[error("no array named `{key}` in archive (available: {available:?})")]
    MissingKey {
        /// 请求的字段名.
        key: String,

        /// 归档中实际存在的字段名.
        available: Vec<String>,
    },

    /// 读取 npz 文件错误.
    #[error("failed to read npz: {0}")]
    ReadNpzError(#[from] ReadNpzError),

    /// 写入 npz 文件错误.
    #[error("failed to write npz: {0}")]
    WriteNpzError(#[from] WriteNpzError),

    /// 其他底层 I/O 错误.
    #[error("i/o error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Npz 文件归档.
///
/// 该结构可用于建模硬盘上已存储的 3D 体数据或体掩膜的 (压缩) 文件.
pub struct NpzArchive {
    reader: Mutex<NpzReader<File>>,
}

/// 依次尝试以下列元素类型读取, 成功后转换为 `f32`. 全部失败时返回最后一种类型的错误.
macro_rules! read_any_as_f32 {
    ($reader: expr, $index: expr, $($ty: ty),+; $last: ty) => {{
        $(
            if let Ok(arr) = $reader.by_index::<OwnedRepr<$ty>, Ix3>($index) {
                return Ok(arr.mapv(|v| v as f32));
            }
        )+
        $reader
            .by_index::<OwnedRepr<$last>, Ix3>($index)
            .map(|arr| arr.mapv(|v| v as f32))
    }};
}

impl NpzArchive {
    /// 打开路径 `p` 处的 npz 文件.
    pub fn open<P: AsRef<Path>>(p: P) -> Result<Self, OpenArchiveError> {
        let file = File::open(p.as_ref())?;
        Ok(Self {
            reader: Mutex::new(NpzReader::new(file)?),
        })
    }

    /// 获取底层 npz 文件包含的所有字段名.
    pub fn names(&self) -> Result<Vec<String>, OpenArchiveError> {
        Ok(self.slot().names()?)
    }

    /// 获取底层 npz 文件包含的数组个数.
    pub fn len(&self) -> usize {
        self.slot().len()
    }

    /// 归档是否为空?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 字段 `key` 在归档中的索引. 同时接受带与不带 `.npy` 后缀的写法.
    pub fn index_of(&self, key: &str) -> Result<usize, OpenArchiveError> {
        let names = self.names()?;
        let with_suffix = format!("{key}.npy");
        names
            .iter()
            .position(|n| n == key || *n == with_suffix)
            .ok_or_else(|| OpenArchiveError::MissingKey {
                key: key.to_string(),
                available: names.clone(),
            })
    }

    /// 通过字段名 `key` 获取 3D 体数据. 支持 `f32`, `f64`, `i16`, `u16`, `u8`, `i32` 元素类型,
    /// 统一转换为 `f32`.
    pub fn volume_by_name(&self, key: &str) -> Result<Array3<f32>, OpenArchiveError> {
        let index = self.index_of(key)?;
        self.volume_by_index(index)
    }

    /// 通过数值索引获取 3D 体数据. 元素类型同 [`NpzArchive::volume_by_name`].
    pub fn volume_by_index(&self, index: usize) -> Result<Array3<f32>, OpenArchiveError> {
        let mut file = self.slot();
        Ok(read_any_as_f32!(file, index, f32, f64, i16, u16, u8; i32)?)
    }

    /// 通过字段名 `key` 获取 3D 布尔体掩膜.
    pub fn mask_by_name(&self, key: &str) -> Result<Array3<bool>, OpenArchiveError> {
        let index = self.index_of(key)?;
        Ok(self.slot().by_index::<OwnedRepr<bool>, Ix3>(index)?)
    }

    /// 将布尔体掩膜以压缩格式写入 `p`, 字段名为 `key`. 已存在的文件会被覆盖.
    pub fn write_mask<P: AsRef<Path>>(
        p: P,
        key: &str,
        mask: &Array3<bool>,
    ) -> Result<(), OpenArchiveError> {
        let mut npz = NpzWriter::new_compressed(File::create(p.as_ref())?);
        npz.add_array(key, mask)?;
        npz.finish()?;
        Ok(())
    }

    fn slot(&self) -> MutexGuard<'_, NpzReader<File>> {
        self.reader.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_read_any_dtype_and_write_mask() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volume.npz");
        let volume = Array3::from_shape_fn((2, 3, 4), |(d, x, y)| (d * 12 + x * 4 + y) as u16);
        {
            let mut npz = NpzWriter::new(File::create(&path).unwrap());
            npz.add_array("content", &volume).unwrap();
            npz.finish().unwrap();
        }
        let archive = NpzArchive::open(&path).unwrap();
        assert_eq!(archive.len(), 1);
        let read = archive.volume_by_name("content").unwrap();
        assert_eq!(read, volume.mapv(|v| v as f32));
        assert!(matches!(
            archive.volume_by_name("missing"),
            Err(OpenArchiveError::MissingKey { .. })
        ));

        let mask_path = dir.path().join("mask.npz");
        let mask = volume.mapv(|v| v % 3 == 0);
        NpzArchive::write_mask(&mask_path, "volumetric_mask", &mask).unwrap();
        let archive = NpzArchive::open(&mask_path).unwrap();
        assert_eq!(archive.mask_by_name("volumetric_mask").unwrap(), mask);
    }

    /// 不支持的元素类型报告最后一次读取的错误.
    #[test]
    fn test_unsupported_dtype() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volume.npz");
        {
            let mut npz = NpzWriter::new(File::create(&path).unwrap());
            npz.add_array("content", &Array3::<i64>::zeros((1, 2, 2))).unwrap();
            npz.finish().unwrap();
        }
        let archive = NpzArchive::open(&path).unwrap();
        assert!(matches!(
            archive.volume_by_name("content"),
            Err(OpenArchiveError::ReadNpzError(_))
        ));
        assert!(matches!(
            NpzArchive::open(dir.path().join("missing.npz")),
            Err(OpenArchiveError::IoError(_))
        ));
    }
}

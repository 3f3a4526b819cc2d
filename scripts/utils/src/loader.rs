//! 对 `oct-berry::dataset` 的更一层封装. 提供示例数据与结果文件的路径约定.

use oct_berry::consts::{fetch, prepare};
use std::path::{Path, PathBuf};

/// OCT 信噪比体数据路径.
#[inline]
pub fn oct_example(example_dir: &Path) -> PathBuf {
    example_dir.join(fetch::OCT_EXAMPLE)
}

/// 切线模量体数据路径.
#[inline]
pub fn modulus_example(example_dir: &Path) -> PathBuf {
    example_dir.join(fetch::MODULUS_EXAMPLE)
}

/// 体掩膜路径.
#[inline]
pub fn mask_file(result_dir: &Path) -> PathBuf {
    result_dir.join(prepare::MASK_FILE)
}

/// `example_dir` 中缺失的示例文件名.
pub fn missing_examples(example_dir: &Path) -> Vec<&'static str> {
    fetch::EXAMPLES
        .iter()
        .map(|&(name, _)| name)
        .filter(|name| !example_dir.join(name).is_file())
        .collect()
}

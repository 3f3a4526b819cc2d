//! 可分离线性滤波.
//!
//! 目前只有高斯滤波. 其语义与 `scipy.ndimage.gaussian_filter` 一致:
//! 截断半径为 `int(4.0 * sigma + 0.5)`, 边界以 reflect 模式 (`d c b a | a b c d`) 延拓,
//! 依次沿每一维做一维相关运算.

mod gaussian;

pub use gaussian::{gaussian_filter, gaussian_kernel, reflect_index, FilterElem, TRUNCATE};

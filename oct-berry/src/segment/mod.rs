//! 二维图像分割.

mod chan_vese;
mod otsu;

pub use chan_vese::{ChanVese, ChanVeseOutput, ChanVeseParams};
pub use otsu::{histogram, otsu_level, Histogram};

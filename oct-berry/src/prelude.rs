//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d};

pub use crate::data::{ImgWriteVis, IntensityWindow, OctVolume, VolumeMask};

pub use crate::dataset::{self, NpzArchive, OpenArchiveError};

pub use crate::mask::{MaskParams, Prepared};
pub use crate::morph::Footprint;
pub use crate::render::{Camera, RenderParams, Renderer};
pub use crate::segment::{ChanVese, ChanVeseParams};

pub use crate::fiji::{BitDepth, Plane, ResultsTable, RoiIndex, RoiSet};

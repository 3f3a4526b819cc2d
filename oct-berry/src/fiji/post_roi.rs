//! 基于 ROI 的批量测量: 清除 ROI 之外的像素, Otsu 二值化, 然后逐 ROI 测量.

use super::matching::RoiIndex;
use super::measure::{Measurement, ResultsTable};
use super::plane::{BitDepth, Plane};
use super::roi::RoiSet;
use super::tiff_io::{read_channels, write_plane, TiffIoError};
use super::{create_dir, list_images, FijiError};
use crate::consts::fiji as defaults;
use crate::segment::{histogram, otsu_level};
use std::path::{Path, PathBuf};

/// ROI 测量参数.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PostRoiParams {
    /// 图像目录.
    pub image_dir: PathBuf,

    /// 只处理以此结尾的图像.
    pub ext: String,

    /// ROI 压缩包目录.
    pub roi_dir: PathBuf,

    /// ROI 压缩包文件名后缀 (不区分大小写).
    pub roi_suffix: String,

    /// 输出目录.
    pub output_dir: PathBuf,
}

impl Default for PostRoiParams {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from("."),
            ext: defaults::IMAGE_EXT.to_string(),
            roi_dir: PathBuf::from("."),
            roi_suffix: defaults::ROI_SUFFIX.to_string(),
            output_dir: PathBuf::from("."),
        }
    }
}

/// Otsu 阈值二值化: 高于阈值的像素 (亮目标) 为 255, 其余为 0, 结果为 8-bit.
pub fn otsu_binary(plane: &Plane) -> Plane {
    let hist = histogram(plane.data(), plane.bit_depth() == BitDepth::U8);
    let threshold = hist.upper_bound(otsu_level(&hist.counts));
    let data = plane
        .data()
        .mapv(|v| if v > threshold { 255.0 } else { 0.0 });
    Plane::new(data, BitDepth::U8)
}

/// 处理一幅图像, 测量结果追加到 `table`.
fn measure_image(
    path: &Path,
    base: &str,
    roi_path: &Path,
    roi_only_dir: &Path,
    binary_dir: &Path,
    table: &mut ResultsTable,
) -> Result<(), FijiError> {
    let rois = RoiSet::open(roi_path)?;
    if rois.is_empty() {
        log::warn!("{}: no usable roi, skipping {base}", roi_path.display());
        return Ok(());
    }
    let mut plane = read_channels(path)?
        .into_iter()
        .next()
        .ok_or_else(|| TiffIoError::Unsupported(format!("{} has no image", path.display())))?;

    plane.clear_outside(rois.union_mask(plane.shape()).view())?;
    write_plane(&roi_only_dir.join(format!("{base}ROIonly.tiff")), &plane)?;

    let binary = otsu_binary(&plane);
    let title = format!("{base}ROIonly_binary.tiff");
    write_plane(&binary_dir.join(&title), &binary)?;

    for roi in &rois {
        table.push(Measurement::of(
            &binary,
            roi,
            format!("{title}:{}", roi.name()),
        ));
    }
    log::info!("{base}: measured {} roi(s)", rois.len());
    Ok(())
}

/// 批量测量. 结果表非空时写入 `output_dir/Results.csv`, 并返回该表.
///
/// 输出目录无法创建、输入目录无法读取或结果表写入失败时返回错误;
/// 单幅图像的失败只会被记录并跳过.
pub fn run_post_roi(params: &PostRoiParams) -> Result<ResultsTable, FijiError> {
    let index = RoiIndex::build(&params.roi_dir, &params.roi_suffix).map_err(|source| {
        FijiError::Io {
            path: params.roi_dir.clone(),
            source,
        }
    })?;
    let roi_only_dir = params.output_dir.join(defaults::CL_ROI_DIR);
    let binary_dir = params.output_dir.join(defaults::CL_BINARY_DIR);
    create_dir(&roi_only_dir)?;
    create_dir(&binary_dir)?;

    let mut table = ResultsTable::new();
    for (name, path) in list_images(&params.image_dir, &params.ext)? {
        let base = name.replace(&params.ext, "");
        let Some((key, roi_path)) = index.find(&base) else {
            log::warn!("no roi set matches {name}, skipping");
            continue;
        };
        log::info!("{name} <- roi set `{key}`");
        if let Err(e) = measure_image(&path, &base, roi_path, &roi_only_dir, &binary_dir, &mut table)
        {
            log::error!("failed to measure {name}: {e}");
        }
    }

    if table.is_empty() {
        log::warn!("No results to save");
    } else {
        let csv_path = params.output_dir.join(defaults::RESULTS_FILE);
        table.write_csv(&csv_path)?;
        log::info!("saved {} row(s) to {}", table.len(), csv_path.display());
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiji::roi::tests::{encode, zip_bytes};
    use ndarray::Array2;

    #[test]
    fn test_otsu_binary() {
        let data = Array2::from_shape_fn((4, 4), |(h, _)| if h < 2 { 10.0 } else { 3000.0 });
        let binary = otsu_binary(&Plane::new(data, BitDepth::U16));
        assert_eq!(binary.bit_depth(), BitDepth::U8);
        assert_eq!(binary[(0, 0)], 0.0);
        assert_eq!(binary[(3, 3)], 255.0);
    }

    #[test]
    fn test_run_post_roi() {
        let images = tempfile::tempdir().unwrap();
        let rois = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();

        // 左半 0, 右半 200; 第二行之后为 100.
        let data = Array2::from_shape_fn((6, 8), |(h, w)| match (h, w) {
            (0..=1, 0..=3) => 0.0,
            (0..=1, _) => 200.0,
            _ => 100.0,
        });
        let plane = Plane::new(data, BitDepth::U8);
        write_plane(&images.path().join("Sample_01.tif"), &plane).unwrap();
        write_plane(&images.path().join("sample_03.tif"), &plane).unwrap();

        // 唯一的 ROI 覆盖前两行.
        let zip = zip_bytes(&[("top.roi", encode(1, (0, 0, 2, 8), &[]))]);
        std::fs::write(rois.path().join("sample_01_RoiSet.zip"), zip).unwrap();
        let empty = zip_bytes(&[]);
        std::fs::write(rois.path().join("sample_02_RoiSet.zip"), empty).unwrap();

        let params = PostRoiParams {
            image_dir: images.path().to_path_buf(),
            roi_dir: rois.path().to_path_buf(),
            output_dir: output.path().to_path_buf(),
            ..Default::default()
        };
        let table = run_post_roi(&params).unwrap();
        assert_eq!(table.len(), 1);
        let row = &table.rows()[0];
        assert_eq!(row.label, "Sample_01ROIonly_binary.tiff:top");
        assert_eq!(row.area, 16.0);
        assert_eq!((row.min, row.max), (0.0, 255.0));
        assert!((row.area_fraction - 50.0).abs() < 1e-9);

        let roi_only = read_channels(
            &output
                .path()
                .join(defaults::CL_ROI_DIR)
                .join("Sample_01ROIonly.tiff"),
        )
        .unwrap();
        assert_eq!(roi_only[0][(1, 5)], 200.0);
        assert_eq!(roi_only[0][(4, 4)], 0.0);
        assert!(output
            .path()
            .join(defaults::CL_BINARY_DIR)
            .join("Sample_01ROIonly_binary.tiff")
            .is_file());

        let csv = std::fs::read_to_string(output.path().join(defaults::RESULTS_FILE)).unwrap();
        assert!(csv.starts_with(" ,Label,Area,Mean,Min,Max,%Area\n1,Sample_01ROIonly_binary.tiff:top,16,"));
    }

    #[test]
    fn test_no_results_writes_nothing() {
        let images = tempfile::tempdir().unwrap();
        let rois = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let plane = Plane::zeros((2, 2), BitDepth::U8);
        write_plane(&images.path().join("x.tif"), &plane).unwrap();

        let params = PostRoiParams {
            image_dir: images.path().to_path_buf(),
            roi_dir: rois.path().to_path_buf(),
            output_dir: output.path().to_path_buf(),
            ..Default::default()
        };
        assert!(run_post_roi(&params).unwrap().is_empty());
        assert!(!output.path().join(defaults::RESULTS_FILE).exists());
    }
}

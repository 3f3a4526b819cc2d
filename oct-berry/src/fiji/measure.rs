//! 逐 ROI 测量与结果表.

use super::plane::Plane;
use super::roi::Roi;
use crate::consts::fiji::DECIMALS;
use std::io::Write;
use std::path::Path;

/// 一行测量结果. 面积以像素计.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Measurement {
    /// 标签, 通常为 `图像名:ROI 名`.
    pub label: String,

    /// ROI 内的像素数.
    pub area: f64,

    /// 均值.
    pub mean: f64,

    /// 最小值.
    pub min: f64,

    /// 最大值.
    pub max: f64,

    /// 非零像素所占百分比.
    pub area_fraction: f64,
}

impl Measurement {
    /// 测量 `roi` 覆盖的像素. ROI 与图像无交集时各项均为 0.
    pub fn of(plane: &Plane, roi: &Roi, label: impl Into<String>) -> Self {
        let mask = roi.mask(plane.shape());
        let mut count = 0usize;
        let mut nonzero = 0usize;
        let mut sum = 0.0f64;
        let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
        for (&v, _) in plane.data().iter().zip(mask.iter()).filter(|&(_, &m)| m) {
            let v = f64::from(v);
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
            if v != 0.0 {
                nonzero += 1;
            }
        }

        let label = label.into();
        if count == 0 {
            return Self {
                label,
                area: 0.0,
                mean: 0.0,
                min: 0.0,
                max: 0.0,
                area_fraction: 0.0,
            };
        }
        Self {
            label,
            area: count as f64,
            mean: sum / count as f64,
            min,
            max,
            area_fraction: 100.0 * nonzero as f64 / count as f64,
        }
    }
}

/// 整数原样输出, 其余保留 `decimals` 位小数.
fn format_value(v: f64, decimals: usize) -> String {
    if v.is_finite() && v.fract() == 0.0 {
        format!("{v:.0}")
    } else {
        format!("{v:.decimals$}")
    }
}

/// 按行累积的测量结果表, 一次性导出为 CSV.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultsTable {
    rows: Vec<Measurement>,
}

impl ResultsTable {
    /// CSV 表头. 第一列为从 1 开始的行号.
    pub const HEADER: [&'static str; 7] = [" ", "Label", "Area", "Mean", "Min", "Max", "%Area"];

    /// 空表.
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一行.
    pub fn push(&mut self, row: Measurement) {
        self.rows.push(row);
    }

    /// 行数.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// 是否为空?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 全部行.
    #[inline]
    pub fn rows(&self) -> &[Measurement] {
        &self.rows
    }

    /// 写入任意输出.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(Self::HEADER)?;
        for (i, row) in self.rows.iter().enumerate() {
            wtr.write_record(&[
                (i + 1).to_string(),
                row.label.clone(),
                format_value(row.area, DECIMALS),
                format_value(row.mean, DECIMALS),
                format_value(row.min, DECIMALS),
                format_value(row.max, DECIMALS),
                format_value(row.area_fraction, DECIMALS),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// 写入 CSV 文件, 已存在时覆盖.
    pub fn write_csv(&self, path: &Path) -> Result<(), csv::Error> {
        let file = std::fs::File::create(path)?;
        self.write_to(std::io::BufWriter::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiji::BitDepth;
    use ndarray::array;

    #[test]
    fn test_measure_binary() {
        let plane = Plane::new(
            array![[0.0, 255.0, 255.0], [0.0, 0.0, 255.0], [255.0, 0.0, 0.0]],
            BitDepth::U8,
        );
        let roi = Roi::rect("r", 0, 0, 2, 3);
        let m = Measurement::of(&plane, &roi, "img:r");
        assert_eq!(m.area, 6.0);
        assert!((m.mean - 127.5).abs() < 1e-9);
        assert_eq!((m.min, m.max), (0.0, 255.0));
        assert!((m.area_fraction - 50.0).abs() < 1e-9);

        let outside = Roi::rect("o", 10, 10, 2, 2);
        let m = Measurement::of(&plane, &outside, "img:o");
        assert_eq!(m.area, 0.0);
        assert_eq!(m.mean, 0.0);
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(12.0, 3), "12");
        assert_eq!(format_value(127.5, 3), "127.500");
        assert_eq!(format_value(100.0 / 3.0, 3), "33.333");
    }

    #[test]
    fn test_write_csv() {
        let mut table = ResultsTable::new();
        assert!(table.is_empty());
        table.push(Measurement {
            label: "a_binary.tiff:0001".to_string(),
            area: 4.0,
            mean: 63.75,
            min: 0.0,
            max: 255.0,
            area_fraction: 25.0,
        });
        table.push(Measurement {
            label: "a_binary.tiff:0002".to_string(),
            area: 3.0,
            mean: 85.0,
            min: 0.0,
            max: 255.0,
            area_fraction: 100.0 / 3.0,
        });

        let mut buf = Vec::new();
        table.write_to(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            " ,Label,Area,Mean,Min,Max,%Area\n\
             1,a_binary.tiff:0001,4,63.750,0,255,25\n\
             2,a_binary.tiff:0002,3,85,0,255,33.333\n"
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Results.csv");
        table.write_csv(&path).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), text);
    }
}

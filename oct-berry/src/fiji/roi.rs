//! ImageJ ROI (`.roi`) 二进制格式解析, 以及 ROI Manager 导出的 zip 压缩包.
//!
//! 文件头为大端序, 布局如下 (只列出用到的字段):
//!
//! | 偏移 | 类型 | 含义 |
//! |-----|------|------|
//! | 0   | `[u8; 4]` | 魔数 `Iout` |
//! | 4   | `i16` | 版本 |
//! | 6   | `u8`  | ROI 类型 |
//! | 8..16 | `i16` x 4 | top, left, bottom, right |
//! | 16  | `u16` | 顶点数 |
//! | 36  | `i32` | shape ROI 的数据长度 (非 0 即复合形状) |
//! | 50  | `i16` | 选项位 |
//! | 64  | - | 顶点坐标 |

use ndarray::Array2;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use crate::Idx2d;

const MAGIC: &[u8; 4] = b"Iout";
const HEADER_LEN: usize = 64;
const SUB_PIXEL_RESOLUTION: u16 = 128;
const SUB_PIXEL_MIN_VERSION: i16 = 222;

/// ROI 解析错误.
#[derive(Debug, thiserror::Error)]
pub enum RoiError {
    /// 打开压缩包失败.
    #[error("i/o error at `{path}`: {source}")]
    Io {
        /// 文件路径.
        path: PathBuf,

        /// 底层错误.
        source: std::io::Error,
    },

    /// 读取压缩包失败.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// 读取压缩包中的条目失败.
    #[error("cannot read entry `{name}`: {source}")]
    Entry {
        /// 条目名称.
        name: String,

        /// 底层错误.
        source: std::io::Error,
    },

    /// 数据不是合法的 ROI.
    #[error("`{name}` is not an ImageJ roi: {reason}")]
    Malformed {
        /// ROI 名称.
        name: String,

        /// 原因.
        reason: &'static str,
    },

    /// 不支持的 ROI 类型 (直线、点、复合形状等).
    #[error("`{name}` has unsupported roi type {kind}")]
    Unsupported {
        /// ROI 名称.
        name: String,

        /// 类型编号, 复合形状记为 `"shape"`.
        kind: String,
    },
}

/// ROI 的几何形状.
#[derive(Clone, Debug, PartialEq)]
pub enum RoiShape {
    /// 矩形, 由边界框给出.
    Rect,

    /// 内切于边界框的椭圆.
    Oval,

    /// 多边形 (含手绘与描迹), 顶点为图像坐标 `(x, y)`.
    Polygon(Vec<(f32, f32)>),
}

/// 一个 ImageJ ROI.
#[derive(Clone, Debug, PartialEq)]
pub struct Roi {
    name: String,
    shape: RoiShape,
    /// `(top, left, bottom, right)`, 右下为开区间.
    bounds: (i32, i32, i32, i32),
}

#[inline]
fn be_i16(b: &[u8], at: usize) -> i16 {
    i16::from_be_bytes([b[at], b[at + 1]])
}

#[inline]
fn be_u16(b: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([b[at], b[at + 1]])
}

#[inline]
fn be_i32(b: &[u8], at: usize) -> i32 {
    i32::from_be_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

#[inline]
fn be_f32(b: &[u8], at: usize) -> f32 {
    f32::from_be_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

impl Roi {
    /// 矩形 ROI.
    pub fn rect(name: impl Into<String>, top: i32, left: i32, height: i32, width: i32) -> Self {
        Self {
            name: name.into(),
            shape: RoiShape::Rect,
            bounds: (top, left, top + height, left + width),
        }
    }

    /// 多边形 ROI. 边界框取顶点的包围盒.
    pub fn polygon(name: impl Into<String>, vertices: Vec<(f32, f32)>) -> Self {
        let (mut top, mut left, mut bottom, mut right) = (i32::MAX, i32::MAX, i32::MIN, i32::MIN);
        for &(x, y) in &vertices {
            left = left.min(x.floor() as i32);
            top = top.min(y.floor() as i32);
            right = right.max(x.ceil() as i32);
            bottom = bottom.max(y.ceil() as i32);
        }
        if vertices.is_empty() {
            (top, left, bottom, right) = (0, 0, 0, 0);
        }
        Self {
            name: name.into(),
            shape: RoiShape::Polygon(vertices),
            bounds: (top, left, bottom, right),
        }
    }

    /// 从 `.roi` 文件内容解析.
    pub fn decode(name: &str, bytes: &[u8]) -> Result<Self, RoiError> {
        let malformed = |reason| RoiError::Malformed {
            name: name.to_string(),
            reason,
        };
        if bytes.len() < HEADER_LEN {
            return Err(malformed("header too short"));
        }
        if &bytes[0..4] != MAGIC {
            return Err(malformed("bad magic"));
        }

        let version = be_i16(bytes, 4);
        let kind = bytes[6];
        let top = i32::from(be_i16(bytes, 8));
        let left = i32::from(be_i16(bytes, 10));
        let bottom = i32::from(be_i16(bytes, 12));
        let right = i32::from(be_i16(bytes, 14));
        let n = usize::from(be_u16(bytes, 16));
        let shape_len = be_i32(bytes, 36);
        let options = be_u16(bytes, 50);

        if shape_len > 0 {
            return Err(RoiError::Unsupported {
                name: name.to_string(),
                kind: "shape".to_string(),
            });
        }

        let shape = match kind {
            1 => RoiShape::Rect,
            2 => RoiShape::Oval,
            0 | 7 | 8 => {
                let sub_pixel =
                    options & SUB_PIXEL_RESOLUTION != 0 && version >= SUB_PIXEL_MIN_VERSION;
                let needed = HEADER_LEN + if sub_pixel { 12 * n } else { 4 * n };
                if bytes.len() < needed {
                    return Err(malformed("truncated coordinates"));
                }
                let vertices = if sub_pixel {
                    let base = HEADER_LEN + 4 * n;
                    (0..n)
                        .map(|i| (be_f32(bytes, base + 4 * i), be_f32(bytes, base + 4 * (n + i))))
                        .collect()
                } else {
                    (0..n)
                        .map(|i| {
                            let x = i32::from(be_i16(bytes, HEADER_LEN + 2 * i)) + left;
                            let y = i32::from(be_i16(bytes, HEADER_LEN + 2 * (n + i))) + top;
                            (x as f32, y as f32)
                        })
                        .collect()
                };
                RoiShape::Polygon(vertices)
            }
            other => {
                return Err(RoiError::Unsupported {
                    name: name.to_string(),
                    kind: other.to_string(),
                })
            }
        };

        Ok(Self {
            name: name.to_string(),
            shape,
            bounds: (top, left, bottom, right),
        })
    }

    /// 名称.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 形状.
    #[inline]
    pub fn shape(&self) -> &RoiShape {
        &self.shape
    }

    /// 边界框 `(top, left, bottom, right)`.
    #[inline]
    pub fn bounds(&self) -> (i32, i32, i32, i32) {
        self.bounds
    }

    /// 像素中心 `(x + 0.5, y + 0.5)` 是否位于 ROI 内.
    pub fn contains(&self, y: usize, x: usize) -> bool {
        let (top, left, bottom, right) = self.bounds;
        let (yi, xi) = (y as i64, x as i64);
        let in_box = yi >= i64::from(top)
            && yi < i64::from(bottom)
            && xi >= i64::from(left)
            && xi < i64::from(right);
        let (px, py) = (x as f64 + 0.5, y as f64 + 0.5);
        match &self.shape {
            RoiShape::Rect => in_box,
            RoiShape::Oval => {
                if !in_box {
                    return false;
                }
                let rx = f64::from(right - left) / 2.0;
                let ry = f64::from(bottom - top) / 2.0;
                let dx = (px - (f64::from(left) + rx)) / rx;
                let dy = (py - (f64::from(top) + ry)) / ry;
                dx * dx + dy * dy <= 1.0
            }
            RoiShape::Polygon(vertices) => even_odd(vertices, px, py),
        }
    }

    /// 写入 `(h, w)` 图像上的掩膜 (逻辑或), 图像外的部分被忽略.
    pub fn paint(&self, mask: &mut Array2<bool>) {
        let (h, w) = mask.dim();
        let (top, left, bottom, right) = self.bounds;
        let ys = top.max(0) as usize..(bottom.max(0) as usize).min(h);
        for y in ys {
            for x in left.max(0) as usize..(right.max(0) as usize).min(w) {
                if !mask[(y, x)] && self.contains(y, x) {
                    mask[(y, x)] = true;
                }
            }
        }
    }

    /// `(h, w)` 图像上的掩膜.
    pub fn mask(&self, shape: Idx2d) -> Array2<bool> {
        let mut mask = Array2::from_elem(shape, false);
        self.paint(&mut mask);
        mask
    }
}

/// 奇偶规则的点在多边形内判定.
fn even_odd(vertices: &[(f32, f32)], px: f64, py: f64) -> bool {
    let n = vertices.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (f64::from(vertices[i].0), f64::from(vertices[i].1));
        let (xj, yj) = (f64::from(vertices[j].0), f64::from(vertices[j].1));
        if (yi > py) != (yj > py) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// ROI Manager 导出的一组 ROI, 保持压缩包中的顺序.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RoiSet {
    rois: Vec<Roi>,
}

impl From<Vec<Roi>> for RoiSet {
    fn from(rois: Vec<Roi>) -> Self {
        Self { rois }
    }
}

impl RoiSet {
    /// 打开 ROI zip 压缩包.
    pub fn open(path: &Path) -> Result<Self, RoiError> {
        let file = File::open(path).map_err(|source| RoiError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file))
    }

    /// 从任意 zip 数据源读取. 名称以 `.roi` 结尾的条目才会被解析;
    /// 不支持的 ROI 会记录警告并跳过, 格式错误则直接返回错误.
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self, RoiError> {
        let mut archive = zip::ZipArchive::new(reader)?;
        let mut rois = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let Some(name) = entry.name().strip_suffix(".roi").map(str::to_string) else {
                continue;
            };
            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut bytes)
                .map_err(|source| RoiError::Entry {
                    name: name.clone(),
                    source,
                })?;
            match Roi::decode(&name, &bytes) {
                Ok(roi) => rois.push(roi),
                Err(e @ RoiError::Unsupported { .. }) => log::warn!("skipping roi: {e}"),
                Err(e) => return Err(e),
            }
        }
        Ok(Self { rois })
    }

    /// ROI 数目.
    #[inline]
    pub fn len(&self) -> usize {
        self.rois.len()
    }

    /// 是否为空?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rois.is_empty()
    }

    /// 依次访问每个 ROI.
    pub fn iter(&self) -> std::slice::Iter<'_, Roi> {
        self.rois.iter()
    }

    /// 全部 ROI 的并集掩膜.
    pub fn union_mask(&self, shape: Idx2d) -> Array2<bool> {
        let mut mask = Array2::from_elem(shape, false);
        for roi in &self.rois {
            roi.paint(&mut mask);
        }
        mask
    }
}

impl<'a> IntoIterator for &'a RoiSet {
    type Item = &'a Roi;
    type IntoIter = std::slice::Iter<'a, Roi>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    /// 按 ImageJ 格式编码一个整数坐标 ROI.
    pub(crate) fn encode(kind: u8, (top, left, bottom, right): (i16, i16, i16, i16), xy: &[(i16, i16)]) -> Vec<u8> {
        let n = xy.len();
        let mut b = vec![0u8; HEADER_LEN + 4 * n];
        b[0..4].copy_from_slice(MAGIC);
        b[4..6].copy_from_slice(&228i16.to_be_bytes());
        b[6] = kind;
        b[8..10].copy_from_slice(&top.to_be_bytes());
        b[10..12].copy_from_slice(&left.to_be_bytes());
        b[12..14].copy_from_slice(&bottom.to_be_bytes());
        b[14..16].copy_from_slice(&right.to_be_bytes());
        b[16..18].copy_from_slice(&(n as u16).to_be_bytes());
        for (i, &(x, y)) in xy.iter().enumerate() {
            let at = HEADER_LEN + 2 * i;
            b[at..at + 2].copy_from_slice(&(x - left).to_be_bytes());
            let at = HEADER_LEN + 2 * (n + i);
            b[at..at + 2].copy_from_slice(&(y - top).to_be_bytes());
        }
        b
    }

    /// 把若干 `(name, bytes)` 打包为 zip.
    pub(crate) fn zip_bytes(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, bytes) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_decode_rect() {
        let roi = Roi::decode("r", &encode(1, (1, 2, 3, 5), &[])).unwrap();
        assert_eq!(roi.shape(), &RoiShape::Rect);
        let mask = roi.mask((4, 6));
        assert_eq!(mask.iter().filter(|&&m| m).count(), 6);
        assert!(mask[(1, 2)] && mask[(2, 4)]);
        assert!(!mask[(3, 2)] && !mask[(1, 5)]);
    }

    #[test]
    fn test_decode_polygon() {
        // 直角三角形 (0,0) (4,0) (0,4): 像素中心 x + y < 4 的像素在内.
        let bytes = encode(0, (0, 0, 4, 4), &[(0, 0), (4, 0), (0, 4)]);
        let roi = Roi::decode("tri", &bytes).unwrap();
        assert_eq!(
            roi.shape(),
            &RoiShape::Polygon(vec![(0.0, 0.0), (4.0, 0.0), (0.0, 4.0)])
        );
        let mask = roi.mask((5, 5));
        assert_eq!(mask.iter().filter(|&&m| m).count(), 6);
        assert!(mask[(0, 2)] && mask[(2, 0)] && mask[(1, 1)]);
        assert!(!mask[(2, 2)]);
    }

    #[test]
    fn test_decode_sub_pixel() {
        let mut bytes = encode(0, (0, 0, 2, 2), &[(0, 0), (2, 0), (2, 2)]);
        bytes[50..52].copy_from_slice(&SUB_PIXEL_RESOLUTION.to_be_bytes());
        for v in [0.0f32, 2.0, 2.0, 0.0, 0.0, 2.0] {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        let roi = Roi::decode("s", &bytes).unwrap();
        assert_eq!(
            roi.shape(),
            &RoiShape::Polygon(vec![(0.0, 0.0), (2.0, 0.0), (2.0, 2.0)])
        );
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            Roi::decode("x", b"Iout"),
            Err(RoiError::Malformed { .. })
        ));
        let mut bytes = encode(1, (0, 0, 1, 1), &[]);
        bytes[0] = b'X';
        assert!(matches!(Roi::decode("x", &bytes), Err(RoiError::Malformed { .. })));
        // 直线.
        let bytes = encode(3, (0, 0, 1, 1), &[]);
        assert!(matches!(Roi::decode("x", &bytes), Err(RoiError::Unsupported { .. })));
        let mut bytes = encode(1, (0, 0, 1, 1), &[]);
        bytes[36..40].copy_from_slice(&16i32.to_be_bytes());
        assert!(matches!(Roi::decode("x", &bytes), Err(RoiError::Unsupported { .. })));
    }

    #[test]
    fn test_oval_mask() {
        let roi = Roi::decode("o", &encode(2, (0, 0, 4, 4), &[])).unwrap();
        let mask = roi.mask((4, 4));
        // 四个角被排除.
        assert_eq!(mask.iter().filter(|&&m| m).count(), 12);
        assert!(!mask[(0, 0)] && !mask[(3, 3)] && mask[(1, 1)]);
    }

    #[test]
    fn test_roi_set_from_zip() {
        let data = zip_bytes(&[
            ("0001-0001.roi", encode(1, (0, 0, 2, 2), &[])),
            ("readme.txt", b"hello".to_vec()),
            ("0002-0002.roi", encode(3, (0, 0, 1, 1), &[])),
            ("0003-0003.roi", encode(1, (2, 2, 4, 4), &[])),
        ]);
        let set = RoiSet::from_reader(Cursor::new(data)).unwrap();
        assert_eq!(set.len(), 2);
        let names: Vec<_> = set.iter().map(Roi::name).collect();
        assert_eq!(names, ["0001-0001", "0003-0003"]);

        let mask = set.union_mask((3, 3));
        assert_eq!(mask.iter().filter(|&&m| m).count(), 5);
        assert!(mask[(2, 2)] && !mask[(0, 2)]);
    }
}

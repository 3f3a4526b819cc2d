//! 多通道 TIFF 读取与单通道 TIFF 写入.
//!
//! 通道数取自 ImageJ 写入的 `ImageDescription` 中的 `channels=N`; 缺失时只读取第一页.
//! 超级堆栈按照 `czt` 顺序存储, 因此前 `N` 页即为第一个切片/时间点的各个通道.
//! 每个采样多于一个的页 (如 RGB) 会被拆分为多个通道.

use super::plane::{BitDepth, Plane};
use ndarray::Array2;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek};
use std::path::{Path, PathBuf};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tiff::ColorType;

/// TIFF 读写错误.
#[derive(Debug, thiserror::Error)]
pub enum TiffIoError {
    /// 打开或创建文件失败.
    #[error("i/o error at `{path}`: {source}")]
    Io {
        /// 文件路径.
        path: PathBuf,

        /// 底层错误.
        source: std::io::Error,
    },

    /// 编解码失败.
    #[error("tiff error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// 不支持的像素格式.
    #[error("unsupported pixel format: {0}")]
    Unsupported(String),
}

/// 读取 `path` 中的全部通道 (第一个切片/时间点).
pub fn read_channels(path: &Path) -> Result<Vec<Plane>, TiffIoError> {
    let file = File::open(path).map_err(|source| TiffIoError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut decoder = Decoder::new(BufReader::new(file))?;
    let declared = decoder
        .get_tag_ascii_string(Tag::ImageDescription)
        .ok()
        .and_then(|d| channels_from_description(&d));

    let mut planes = decode_page(&mut decoder)?;
    let Some(channels) = declared else {
        return Ok(planes);
    };
    while planes.len() < channels && decoder.more_images() {
        decoder.next_image()?;
        planes.extend(decode_page(&mut decoder)?);
    }
    if planes.len() < channels {
        log::warn!(
            "{}: description declares {channels} channels but only {} were found",
            path.display(),
            planes.len()
        );
    }
    planes.truncate(channels);
    Ok(planes)
}

/// 解析 ImageJ 描述中的 `channels=N`.
pub fn channels_from_description(description: &str) -> Option<usize> {
    description
        .lines()
        .filter_map(|line| line.trim().strip_prefix("channels="))
        .find_map(|v| v.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
}

fn samples_per_pixel(color: ColorType) -> Result<usize, TiffIoError> {
    match color {
        ColorType::Gray(_) => Ok(1),
        ColorType::GrayA(_) => Ok(2),
        ColorType::RGB(_) => Ok(3),
        ColorType::RGBA(_) => Ok(4),
        other => Err(TiffIoError::Unsupported(format!("{other:?}"))),
    }
}

/// 解码当前页, 按采样拆分为通道.
fn decode_page<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Vec<Plane>, TiffIoError> {
    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);
    let samples = samples_per_pixel(decoder.colortype()?)?;

    let (values, depth): (Vec<f32>, BitDepth) = match decoder.read_image()? {
        DecodingResult::U8(v) => (v.into_iter().map(f32::from).collect(), BitDepth::U8),
        DecodingResult::U16(v) => (v.into_iter().map(f32::from).collect(), BitDepth::U16),
        DecodingResult::F32(v) => (v, BitDepth::F32),
        DecodingResult::U32(v) => (v.into_iter().map(|x| x as f32).collect(), BitDepth::F32),
        DecodingResult::I8(v) => (v.into_iter().map(f32::from).collect(), BitDepth::F32),
        DecodingResult::I16(v) => (v.into_iter().map(f32::from).collect(), BitDepth::F32),
        DecodingResult::I32(v) => (v.into_iter().map(|x| x as f32).collect(), BitDepth::F32),
        DecodingResult::F64(v) => (v.into_iter().map(|x| x as f32).collect(), BitDepth::F32),
        DecodingResult::U64(v) => (v.into_iter().map(|x| x as f32).collect(), BitDepth::F32),
        DecodingResult::I64(v) => (v.into_iter().map(|x| x as f32).collect(), BitDepth::F32),
        #[allow(unreachable_patterns)]
        _ => return Err(TiffIoError::Unsupported("sample format".to_string())),
    };
    if values.len() != width * height * samples {
        return Err(TiffIoError::Unsupported(format!(
            "{} samples for a {width}x{height}x{samples} page",
            values.len()
        )));
    }

    Ok((0..samples)
        .map(|s| {
            let data = Array2::from_shape_fn((height, width), |(h, w)| {
                values[(h * width + w) * samples + s]
            });
            Plane::new(data, depth)
        })
        .collect())
}

/// 将 `plane` 按其位深写入 `path` (单页灰度 TIFF). 已存在的文件会被覆盖.
pub fn write_plane(path: &Path, plane: &Plane) -> Result<(), TiffIoError> {
    let file = File::create(path).map_err(|source| TiffIoError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file))?;
    let (h, w) = plane.shape();
    let (w, h) = (w as u32, h as u32);
    let data = plane.data();
    match plane.bit_depth() {
        BitDepth::U8 => {
            let buf: Vec<u8> = data.iter().map(|&v| v as u8).collect();
            encoder.write_image::<colortype::Gray8>(w, h, &buf)?;
        }
        BitDepth::U16 => {
            let buf: Vec<u16> = data.iter().map(|&v| v as u16).collect();
            encoder.write_image::<colortype::Gray16>(w, h, &buf)?;
        }
        BitDepth::F32 => {
            let buf: Vec<f32> = data.iter().copied().collect();
            encoder.write_image::<colortype::Gray32Float>(w, h, &buf)?;
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ndarray::array;

    /// 写一个 ImageJ 风格的 16-bit 多通道文件, 每个通道一页.
    pub(crate) fn write_stack(path: &Path, width: u32, height: u32, channels: &[Vec<u16>]) {
        let file = BufWriter::new(File::create(path).unwrap());
        let mut encoder = TiffEncoder::new(file).unwrap();
        let description = format!(
            "ImageJ=1.54f\nimages={n}\nchannels={n}\nmode=composite\n",
            n = channels.len()
        );
        for (c, data) in channels.iter().enumerate() {
            let mut image = encoder
                .new_image::<colortype::Gray16>(width, height)
                .unwrap();
            if c == 0 {
                image
                    .encoder()
                    .write_tag(Tag::ImageDescription, description.as_str())
                    .unwrap();
            }
            image.write_data(data).unwrap();
        }
    }

    #[test]
    fn test_channels_from_description() {
        let d = "ImageJ=1.54f\nimages=3\nchannels=3\nmode=composite\n";
        assert_eq!(channels_from_description(d), Some(3));
        assert_eq!(channels_from_description("ImageJ=1.54f\n"), None);
        assert_eq!(channels_from_description("channels=0"), None);
    }

    #[test]
    fn test_write_then_read_each_depth() {
        let dir = tempfile::tempdir().unwrap();
        for depth in [BitDepth::U8, BitDepth::U16, BitDepth::F32] {
            let plane = Plane::new(array![[0.0, 1.0, 200.0], [3.0, 4.5, 5.0]], depth);
            let path = dir.path().join(format!("{depth:?}.tif"));
            write_plane(&path, &plane).unwrap();
            let read = read_channels(&path).unwrap();
            assert_eq!(read, vec![plane]);
        }
    }

    #[test]
    fn test_read_multichannel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.tif");
        write_stack(&path, 2, 2, &[vec![0, 0, 0, 10], vec![1, 1, 1, 11]]);
        let planes = read_channels(&path).unwrap();
        assert_eq!(planes.len(), 2);
        assert_eq!(planes[1].bit_depth(), BitDepth::U16);
        assert_eq!(planes[1][(1, 1)], 11.0);
        assert_eq!(planes[0][(1, 1)], 10.0);
    }

    /// 描述声明的通道数少于页数时只读取前几页.
    #[test]
    fn test_read_truncates_to_declared_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.tif");
        {
            let file = BufWriter::new(File::create(&path).unwrap());
            let mut encoder = TiffEncoder::new(file).unwrap();
            for c in 0..3u16 {
                let mut image = encoder.new_image::<colortype::Gray16>(2, 2).unwrap();
                if c == 0 {
                    image
                        .encoder()
                        .write_tag(Tag::ImageDescription, "ImageJ=1.54f\nimages=3\nchannels=2\n")
                        .unwrap();
                }
                image.write_data(&[c, c, c, c + 10]).unwrap();
            }
        }
        let planes = read_channels(&path).unwrap();
        assert_eq!(planes.len(), 2);
        assert_eq!(planes[1][(1, 1)], 11.0);
    }
}

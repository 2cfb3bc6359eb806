use std::path::Path;

use opencv::core::{self, Mat, Size};
use opencv::img_hash;
use opencv::imgproc;
use opencv::prelude::*;

use super::{Transform, imread, to_gray};
use crate::codec::RawFeature;
use crate::error::ExtractionError;
use crate::extract::Extractor;

/// 哈希边长，8x8 = 64 位
const HASH_SIZE: usize = 8;

/// 感知哈希算法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// DCT 感知哈希
    PHash,
    /// Haar 小波哈希
    WHash,
}

impl HashAlgorithm {
    pub fn compute(&self, img: &Mat) -> Result<RawFeature, ExtractionError> {
        match self {
            HashAlgorithm::PHash => p_hash(img),
            HashAlgorithm::WHash => w_hash(img),
        }
    }
}

/// 计算感知哈希的提取器，入库时可以同时计算旋转和翻转后的哈希
pub struct ImageHasher {
    algorithm: HashAlgorithm,
}

impl ImageHasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }
}

impl Extractor for ImageHasher {
    fn extract(&self, image: &Path) -> Result<RawFeature, ExtractionError> {
        let img = imread(image)?;
        self.algorithm.compute(&img)
    }

    fn extract_augmented(&self, image: &Path) -> Result<Vec<RawFeature>, ExtractionError> {
        let img = imread(image)?;
        Transform::ALL
            .iter()
            .map(|t| self.algorithm.compute(&t.apply(&img)?))
            .collect()
    }
}

/// OpenCV 的 pHash，输出 8 字节
pub fn p_hash(img: &Mat) -> Result<RawFeature, ExtractionError> {
    let mut hash = Mat::default();
    img_hash::p_hash(img, &mut hash)?;
    let bytes = hash.data_bytes()?.to_vec();
    if bytes.len() != HASH_SIZE * HASH_SIZE / 8 {
        return Err(ExtractionError::Malformed(format!("pHash 长度为 {} 字节", bytes.len())));
    }
    Ok(RawFeature::Packed(bytes))
}

/// Haar 小波哈希
///
/// 图片缩放到不超过短边的最大 2 的幂，取 8x8 的低频 (LL) 分量与中位数比较。
/// Haar 的 LL 分量与对应方块的均值成正比，因此这里直接使用方块均值。
pub fn w_hash(img: &Mat) -> Result<RawFeature, ExtractionError> {
    let gray = to_gray(img)?;
    let min_side = gray.cols().min(gray.rows()).max(1) as u32;
    let scale = (1usize << min_side.ilog2()).max(HASH_SIZE);

    let mut resized = Mat::default();
    imgproc::resize(
        &gray,
        &mut resized,
        Size::new(scale as i32, scale as i32),
        0.,
        0.,
        imgproc::INTER_AREA,
    )?;
    let mut values = Mat::default();
    resized.convert_to(&mut values, core::CV_32F, 1. / 255., 0.)?;
    let data = values.data_typed::<f32>()?;

    let block = scale / HASH_SIZE;
    let mut means = vec![0f32; HASH_SIZE * HASH_SIZE];
    for (y, row) in data.chunks_exact(scale).enumerate() {
        for (x, v) in row.iter().enumerate() {
            means[(y / block) * HASH_SIZE + x / block] += v;
        }
    }
    let area = (block * block) as f32;
    means.iter_mut().for_each(|m| *m /= area);

    let median = median(&means);
    Ok(RawFeature::Bits(means.iter().map(|&m| m > median).collect()))
}

fn median(values: &[f32]) -> f32 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    let mid = sorted.len() / 2;
    match sorted.len() % 2 {
        0 => (sorted[mid - 1] + sorted[mid]) / 2.,
        _ => sorted[mid],
    }
}

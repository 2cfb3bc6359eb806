use std::path::Path;

use log::debug;
use opencv::core::{self, DMatch, KeyPoint, Mat, Vector};
use opencv::features2d::{BFMatcher, ORB};
use opencv::imgproc;
use opencv::prelude::*;

use super::orb::{Prepared, prepare};
use super::{Transform, imread};
use crate::error::ExtractionError;
use crate::extract::Verifier;

/// 达到该匹配数量时空间得分为 1
const MATCH_SATURATION: f64 = 50.;

/// 各项得分的权重
#[derive(Debug, Clone, Copy)]
pub struct VerifyWeights {
    /// 灰度直方图
    pub structure: f64,
    /// ORB 特征点匹配
    pub spatial: f64,
    /// HSV 直方图
    pub color: f64,
}

impl Default for VerifyWeights {
    fn default() -> Self {
        Self { structure: 0.42, spatial: 0.43, color: 0.15 }
    }
}

/// 基于直方图和 ORB 特征点的像素级校验
///
/// 候选图片会分别尝试原图、水平翻转、垂直翻转和双向翻转，取最高分。
#[derive(Debug, Clone, Default)]
pub struct HistogramVerifier {
    pub weights: VerifyWeights,
}

impl HistogramVerifier {
    fn score(&self, a: &Prepared, b: &Prepared) -> opencv::Result<f64> {
        let structure = histogram_score(&a.gray, &b.gray, &[0], &[50], &[0., 256.])?;
        let color = histogram_score(&a.hsv, &b.hsv, &[0, 1], &[30, 10], &[0., 180., 0., 256.])?;
        let matches = orb_matches(&a.gray, &b.gray)?;
        let spatial = (matches as f64 / MATCH_SATURATION).min(1.);
        debug!("直方图校验: structure={structure:.3} spatial={spatial:.3} ({matches}) color={color:.3}");
        Ok(structure * self.weights.structure
            + spatial * self.weights.spatial
            + color * self.weights.color)
    }
}

impl Verifier for HistogramVerifier {
    fn verify(&self, query: &Path, candidate: &Path) -> Result<f64, ExtractionError> {
        let query = prepare(&imread(query)?)?;
        let candidate = imread(candidate)?;

        let mut best = 0f64;
        for transform in [
            Transform::Original,
            Transform::FlipHorizontal,
            Transform::FlipVertical,
            Transform::FlipBoth,
        ] {
            let flipped = prepare(&transform.apply(&candidate)?)?;
            best = best.max(self.score(&query, &flipped)?);
        }
        Ok(best)
    }
}

/// L1 归一化后的直方图交集，范围 0~1
fn histogram_score(
    a: &Mat,
    b: &Mat,
    channels: &[i32],
    bins: &[i32],
    ranges: &[f32],
) -> opencv::Result<f64> {
    let hist = |img: &Mat| -> opencv::Result<Mat> {
        let images = Vector::<Mat>::from_iter([img.clone()]);
        let mut hist = Mat::default();
        imgproc::calc_hist_def(
            &images,
            &Vector::from_slice(channels),
            &Mat::default(),
            &mut hist,
            &Vector::from_slice(bins),
            &Vector::from_slice(ranges),
        )?;
        let mut normalized = Mat::default();
        core::normalize(&hist, &mut normalized, 1., 0., core::NORM_L1, -1, &Mat::default())?;
        Ok(normalized)
    };
    imgproc::compare_hist(&hist(a)?, &hist(b)?, imgproc::HISTCMP_INTERSECT)
}

/// 交叉验证后的 ORB 匹配数量
fn orb_matches(a: &Mat, b: &Mat) -> opencv::Result<usize> {
    let mut orb = ORB::create_def()?;
    let describe = |orb: &mut core::Ptr<ORB>, img: &Mat| -> opencv::Result<Mat> {
        let mut kps = Vector::<KeyPoint>::new();
        let mut des = Mat::default();
        orb.detect_and_compute_def(img, &Mat::default(), &mut kps, &mut des)?;
        Ok(des)
    };
    let des_a = describe(&mut orb, a)?;
    let des_b = describe(&mut orb, b)?;
    if des_a.empty() || des_b.empty() {
        return Ok(0);
    }

    let matcher = BFMatcher::create(core::NORM_HAMMING, true)?;
    let mut matches = Vector::<DMatch>::new();
    matcher.train_match_def(&des_a, &des_b, &mut matches)?;
    Ok(matches.len())
}

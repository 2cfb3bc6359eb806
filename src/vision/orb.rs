use std::path::Path;

use opencv::core::{KeyPoint, Mat, Size, Vector};
use opencv::features2d::ORB;
use opencv::imgproc;
use opencv::prelude::*;

use super::imread;
use crate::error::ExtractionError;
use crate::extract::StructureProbe;

/// 统一缩放到的尺寸
pub const TARGET_SIZE: i32 = 500;

/// 预处理后的图片
pub struct Prepared {
    pub gray: Mat,
    pub hsv: Mat,
}

/// 缩放到固定尺寸并做高斯模糊，返回灰度图和 HSV 图
pub fn prepare(img: &Mat) -> opencv::Result<Prepared> {
    let mut resized = Mat::default();
    imgproc::resize(
        img,
        &mut resized,
        Size::new(TARGET_SIZE, TARGET_SIZE),
        0.,
        0.,
        imgproc::INTER_AREA,
    )?;
    let mut blurred = Mat::default();
    imgproc::gaussian_blur_def(&resized, &mut blurred, Size::new(5, 5), 0.)?;

    let mut gray = Mat::default();
    imgproc::cvt_color_def(&blurred, &mut gray, imgproc::COLOR_BGR2GRAY)?;
    let mut hsv = Mat::default();
    imgproc::cvt_color_def(&blurred, &mut hsv, imgproc::COLOR_BGR2HSV)?;
    Ok(Prepared { gray, hsv })
}

/// 使用 ORB 特征点数量作为图片结构复杂度
pub struct OrbProbe;

impl OrbProbe {
    pub fn count(gray: &Mat) -> opencv::Result<usize> {
        let mut orb = ORB::create_def()?;
        let mut kps = Vector::<KeyPoint>::new();
        orb.detect_def(gray, &mut kps)?;
        Ok(kps.len())
    }
}

impl StructureProbe for OrbProbe {
    fn feature_count(&self, image: &Path) -> Result<usize, ExtractionError> {
        let img = imread(image)?;
        let prepared = prepare(&img)?;
        Ok(Self::count(&prepared.gray)?)
    }
}

//! 基于 OpenCV 的默认特征提取器

mod hash;
mod orb;
mod verify;

use std::path::Path;

use opencv::core::{self, Mat};
use opencv::imgcodecs;
use opencv::imgproc;
use opencv::prelude::*;

pub use self::hash::*;
pub use self::orb::*;
pub use self::verify::*;

use crate::error::ExtractionError;

/// 读取彩色图片，文件不存在或无法解码时返回错误
pub fn imread(path: &Path) -> Result<Mat, ExtractionError> {
    let unreadable = |reason: &str| ExtractionError::Unreadable {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    let filename = path.to_str().ok_or_else(|| unreadable("路径不是合法的 UTF-8"))?;
    if !path.is_file() {
        return Err(unreadable("文件不存在"));
    }
    let img = imgcodecs::imread(filename, imgcodecs::IMREAD_COLOR)?;
    if img.empty() {
        return Err(unreadable("无法解码"));
    }
    Ok(img)
}

/// 转换为灰度图，单通道图片原样返回
pub fn to_gray(img: &Mat) -> opencv::Result<Mat> {
    if img.channels() == 1 {
        return Ok(img.clone());
    }
    let mut gray = Mat::default();
    imgproc::cvt_color_def(img, &mut gray, imgproc::COLOR_BGR2GRAY)?;
    Ok(gray)
}

/// 入库时使用的几何变换
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Original,
    Rotate90,
    Rotate180,
    Rotate270,
    FlipHorizontal,
    FlipVertical,
    FlipBoth,
}

impl Transform {
    pub const ALL: [Transform; 7] = [
        Transform::Original,
        Transform::Rotate90,
        Transform::Rotate180,
        Transform::Rotate270,
        Transform::FlipHorizontal,
        Transform::FlipVertical,
        Transform::FlipBoth,
    ];

    pub fn apply(&self, img: &Mat) -> opencv::Result<Mat> {
        let mut output = Mat::default();
        match self {
            Transform::Original => return Ok(img.clone()),
            Transform::Rotate90 => core::rotate(img, &mut output, core::ROTATE_90_CLOCKWISE)?,
            Transform::Rotate180 => core::rotate(img, &mut output, core::ROTATE_180)?,
            Transform::Rotate270 => {
                core::rotate(img, &mut output, core::ROTATE_90_COUNTERCLOCKWISE)?
            }
            Transform::FlipHorizontal => core::flip(img, &mut output, 1)?,
            Transform::FlipVertical => core::flip(img, &mut output, 0)?,
            Transform::FlipBoth => core::flip(img, &mut output, -1)?,
        }
        Ok(output)
    }
}

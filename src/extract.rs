//! 外部协作者接口：特征提取、结构检查和二次校验
//!
//! 哈希计算、深度特征提取和像素级校验都不属于索引本身，这里只约定接口，
//! 默认实现见 [`crate::vision`] 和 [`crate::embed`]。

use std::path::Path;

use crate::codec::RawFeature;
use crate::error::ExtractionError;

/// 从图片计算一种特征
pub trait Extractor: Send + Sync {
    /// 计算图片本身的特征
    fn extract(&self, image: &Path) -> Result<RawFeature, ExtractionError>;

    /// 计算图片及其几何变换（旋转、翻转）后的特征，用于入库
    ///
    /// 默认不做增强
    fn extract_augmented(&self, image: &Path) -> Result<Vec<RawFeature>, ExtractionError> {
        Ok(vec![self.extract(image)?])
    }
}

/// 计算图片的结构特征数量，例如特征点数量
pub trait StructureProbe: Send + Sync {
    fn feature_count(&self, image: &Path) -> Result<usize, ExtractionError>;
}

/// 对两张图片做像素级比较，返回 0~1 的分数
pub trait Verifier: Send + Sync {
    fn verify(&self, query: &Path, candidate: &Path) -> Result<f64, ExtractionError>;
}

impl<F> Extractor for F
where
    F: Fn(&Path) -> Result<RawFeature, ExtractionError> + Send + Sync,
{
    fn extract(&self, image: &Path) -> Result<RawFeature, ExtractionError> {
        self(image)
    }
}

impl<F> StructureProbe for F
where
    F: Fn(&Path) -> Result<usize, ExtractionError> + Send + Sync,
{
    fn feature_count(&self, image: &Path) -> Result<usize, ExtractionError> {
        self(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_collaborators() {
        let extractor = |_: &Path| -> Result<RawFeature, ExtractionError> { Ok(RawFeature::Floats(vec![1.])) };
        let features = extractor.extract_augmented(Path::new("a.png")).unwrap();
        assert_eq!(features, vec![RawFeature::Floats(vec![1.])]);

        let probe = |image: &Path| -> Result<usize, ExtractionError> {
            Err(ExtractionError::Unavailable(image.display().to_string()))
        };
        assert_eq!(probe.feature_count(Path::new("a.png")), Err(ExtractionError::Unavailable("a.png".into())));
    }
}

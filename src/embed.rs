//! 深度特征由外部编码器离线生成，以 `.npy` 文件放在图片旁边

use std::path::{Path, PathBuf};

use ndarray::ArrayD;
use ndarray_npy::read_npy;

use crate::codec::RawFeature;
use crate::error::ExtractionError;
use crate::extract::Extractor;

/// 读取 `<image>.<name>.npy` 作为图片的嵌入向量
///
/// 支持 float32 和 float64，形状为 `(D,)` 或 `(1, D)`。
#[derive(Debug, Clone)]
pub struct NpySidecar {
    name: String,
}

impl NpySidecar {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// 返回图片对应的特征文件路径
    pub fn sidecar_path(&self, image: &Path) -> PathBuf {
        let mut name = image.as_os_str().to_owned();
        name.push(format!(".{}.npy", self.name));
        PathBuf::from(name)
    }
}

impl Extractor for NpySidecar {
    fn extract(&self, image: &Path) -> Result<RawFeature, ExtractionError> {
        let path = self.sidecar_path(image);
        if !path.is_file() {
            return Err(ExtractionError::Unavailable(format!(
                "找不到 {} 特征文件: {}",
                self.name,
                path.display()
            )));
        }

        let values = match read_npy::<_, ArrayD<f32>>(&path) {
            Ok(array) => array.iter().copied().collect::<Vec<_>>(),
            Err(_) => read_npy::<_, ArrayD<f64>>(&path)
                .map_err(|e| ExtractionError::Malformed(format!("{}: {e}", path.display())))?
                .iter()
                .map(|&v| v as f32)
                .collect(),
        };
        Ok(RawFeature::Floats(values))
    }
}

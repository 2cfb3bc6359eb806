use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::segment::IndexKind;

/// 范数小于该值的向量视为零向量
const ZERO_NORM_EPS: f32 = 1e-12;

/// 外部提取器直接产出的特征，尚未编码
#[derive(Debug, Clone, PartialEq)]
pub enum RawFeature {
    /// 逐位表示的哈希
    Bits(Vec<bool>),
    /// 已经按 8 位一字节打包的哈希（高位在前）
    Packed(Vec<u8>),
    /// 浮点特征向量
    Floats(Vec<f32>),
}

/// 按字节打包的定长二进制编码
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BinaryCode {
    bits: usize,
    bytes: Vec<u8>,
}

impl BinaryCode {
    pub fn bits(&self) -> usize {
        self.bits
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// 以十六进制字符串表示，与常见 phash 工具的输出格式一致
    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// L2 归一化后的浮点向量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseVector {
    values: Vec<f32>,
    /// 原始向量范数接近 0，已置为零向量
    degenerate: bool,
}

impl DenseVector {
    pub fn dim(&self) -> usize {
        self.values.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }
}

/// 索引可以直接使用的向量
#[derive(Debug, Clone, PartialEq)]
pub enum Vector {
    Binary(BinaryCode),
    Dense(DenseVector),
}

impl Vector {
    /// 向量宽度：二进制编码为位数，浮点向量为维度
    pub fn width(&self) -> usize {
        match self {
            Vector::Binary(code) => code.bits(),
            Vector::Dense(v) => v.dim(),
        }
    }
}

/// 将哈希或特征向量转换为索引使用的定宽向量
#[derive(Debug, Clone, Copy)]
pub struct VectorCodec {
    kind: IndexKind,
}

impl VectorCodec {
    pub fn new(kind: IndexKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    /// 根据索引类型编码一个原始特征
    pub fn encode(&self, raw: &RawFeature) -> Result<Vector, CodecError> {
        match (self.kind, raw) {
            (IndexKind::Binary { .. }, RawFeature::Bits(bits)) => self.encode_binary_hash(bits),
            (IndexKind::Binary { .. }, RawFeature::Packed(bytes)) => {
                self.encode_binary_bytes(bytes)
            }
            (IndexKind::Float { .. }, RawFeature::Floats(values)) => self.encode_dense(values),
            (IndexKind::Binary { .. }, RawFeature::Floats(_)) => {
                Err(CodecError::KindMismatch("二进制索引不接受浮点特征"))
            }
            (IndexKind::Float { .. }, _) => Err(CodecError::KindMismatch("浮点索引不接受哈希特征")),
        }
    }

    /// 将位数组打包为字节，每字节 8 位，高位在前
    pub fn encode_binary_hash(&self, bits: &[bool]) -> Result<Vector, CodecError> {
        let expected = self.binary_width()?;
        if bits.len() != expected {
            return Err(CodecError::WidthMismatch { expected, actual: bits.len() });
        }
        let bytes = bits
            .chunks(8)
            .map(|chunk| {
                chunk.iter().enumerate().fold(0u8, |acc, (i, &b)| acc | ((b as u8) << (7 - i)))
            })
            .collect();
        Ok(Vector::Binary(BinaryCode { bits: expected, bytes }))
    }

    /// 使用已经打包好的字节构建编码
    pub fn encode_binary_bytes(&self, bytes: &[u8]) -> Result<Vector, CodecError> {
        let expected = self.binary_width()?;
        if bytes.len() != expected.div_ceil(8) {
            return Err(CodecError::WidthMismatch { expected, actual: bytes.len() * 8 });
        }
        let mut bytes = bytes.to_vec();
        // 末尾不足一字节的部分清零，保证距离只计算有效位
        if expected % 8 != 0 {
            if let Some(last) = bytes.last_mut() {
                *last &= 0xffu8 << (8 - expected % 8);
            }
        }
        Ok(Vector::Binary(BinaryCode { bits: expected, bytes }))
    }

    /// 复制并 L2 归一化浮点向量
    pub fn encode_dense(&self, values: &[f32]) -> Result<Vector, CodecError> {
        let IndexKind::Float { dim } = self.kind else {
            return Err(CodecError::KindMismatch("二进制索引不接受浮点特征"));
        };
        if values.len() != dim {
            return Err(CodecError::WidthMismatch { expected: dim, actual: values.len() });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(CodecError::NonFinite);
        }
        let mut values = values.to_vec();
        let degenerate = l2_normalize(&mut values);
        if degenerate {
            warn!("向量范数接近 0，按零向量处理");
        }
        Ok(Vector::Dense(DenseVector { values, degenerate }))
    }

    fn binary_width(&self) -> Result<usize, CodecError> {
        match self.kind {
            IndexKind::Binary { bits } => Ok(bits),
            IndexKind::Float { .. } => Err(CodecError::KindMismatch("浮点索引不接受哈希特征")),
        }
    }
}

/// 原地归一化，范数接近 0 时置零并返回 true
///
/// 先按最大绝对值缩放再求范数，分量很大时平方不会溢出
pub fn l2_normalize(values: &mut [f32]) -> bool {
    let scale = values.iter().fold(0f32, |m, v| m.max(v.abs()));
    if !scale.is_finite() || scale < ZERO_NORM_EPS {
        values.iter_mut().for_each(|v| *v = 0.);
        return true;
    }
    values.iter_mut().for_each(|v| *v /= scale);
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm * scale < ZERO_NORM_EPS {
        values.iter_mut().for_each(|v| *v = 0.);
        return true;
    }
    values.iter_mut().for_each(|v| *v /= norm);
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary(bits: usize) -> VectorCodec {
        VectorCodec::new(IndexKind::Binary { bits })
    }

    fn float(dim: usize) -> VectorCodec {
        VectorCodec::new(IndexKind::Float { dim })
    }

    #[test]
    fn test_pack_msb_first() {
        let mut bits = vec![false; 16];
        bits[0] = true;
        bits[15] = true;
        let Vector::Binary(code) = binary(16).encode_binary_hash(&bits).unwrap() else {
            panic!("expected binary vector");
        };
        assert_eq!(code.as_bytes(), &[0b1000_0000, 0b0000_0001]);
        assert_eq!(code.to_hex(), "8001");
    }

    #[test]
    fn test_pack_wrong_width() {
        let err = binary(64).encode_binary_hash(&[true; 63]).unwrap_err();
        assert_eq!(err, CodecError::WidthMismatch { expected: 64, actual: 63 });
    }

    #[test]
    fn test_packed_bytes_mask_padding() {
        let Vector::Binary(code) = binary(12).encode_binary_bytes(&[0xff, 0xff]).unwrap() else {
            panic!("expected binary vector");
        };
        assert_eq!(code.as_bytes(), &[0xff, 0xf0]);
        assert!(binary(12).encode_binary_bytes(&[0xff]).is_err());
    }

    #[test]
    fn test_dense_normalized() {
        let Vector::Dense(v) = float(2).encode_dense(&[3.0, 4.0]).unwrap() else {
            panic!("expected dense vector");
        };
        assert_eq!(v.as_slice(), &[0.6, 0.8]);
        assert!(!v.is_degenerate());
    }

    #[test]
    fn test_dense_zero_vector_flagged() {
        let Vector::Dense(v) = float(3).encode_dense(&[0.0, 0.0, 0.0]).unwrap() else {
            panic!("expected dense vector");
        };
        assert!(v.is_degenerate());
        assert!(v.as_slice().iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_dense_huge_components() {
        let Vector::Dense(v) = float(2).encode_dense(&[3e19, 4e19]).unwrap() else {
            panic!("expected dense vector");
        };
        assert!(!v.is_degenerate());
        assert!((v.as_slice()[0] - 0.6).abs() < 1e-6);
        assert!((v.as_slice()[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_dense_rejects_nan_and_width() {
        assert_eq!(float(2).encode_dense(&[f32::NAN, 1.0]).unwrap_err(), CodecError::NonFinite);
        assert!(float(3).encode_dense(&[1.0, 1.0]).is_err());
    }

    #[test]
    fn test_kind_mismatch() {
        assert!(binary(8).encode(&RawFeature::Floats(vec![1.0; 8])).is_err());
        assert!(float(8).encode(&RawFeature::Bits(vec![true; 8])).is_err());
    }
}

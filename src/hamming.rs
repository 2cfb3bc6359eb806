use bytemuck::try_cast_slice;

/// 计算两个等长二进制编码的汉明距离
///
/// 编码长度为 8 字节的倍数且内存对齐时按 u64 计算，否则逐字节计算
#[inline(always)]
pub fn hamming(va: &[u8], vb: &[u8]) -> u32 {
    debug_assert_eq!(va.len(), vb.len(), "code size mismatch");
    match (try_cast_slice::<u8, u64>(va), try_cast_slice::<u8, u64>(vb)) {
        (Ok(wa), Ok(wb)) => hamming_words(wa, wb),
        _ => hamming_naive(va, vb),
    }
}

#[inline(always)]
pub fn hamming_naive(va: &[u8], vb: &[u8]) -> u32 {
    va.iter().zip(vb).map(|(a, b)| (a ^ b).count_ones()).sum()
}

#[inline(always)]
pub fn hamming_words(va: &[u64], vb: &[u64]) -> u32 {
    match (va, vb) {
        // 64 位 phash/whash 是最常见的情况
        ([a], [b]) => (a ^ b).count_ones(),
        _ => va.iter().zip(vb).map(|(a, b)| (a ^ b).count_ones()).sum(),
    }
}

/// 内积，向量已经 L2 归一化时等于余弦相似度
#[inline(always)]
pub fn inner_product(va: &[f32], vb: &[f32]) -> f32 {
    debug_assert_eq!(va.len(), vb.len(), "dimension mismatch");
    va.iter().zip(vb).map(|(a, b)| a * b).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hamming_identical() {
        let va = [0u8; 8];
        let vb = [0u8; 8];
        assert_eq!(hamming(&va, &vb), 0);
    }

    #[test]
    fn test_hamming_all_different() {
        let va = [0u8; 32];
        let vb = [255u8; 32];
        assert_eq!(hamming_naive(&va, &vb), 256);
    }

    #[test]
    fn test_hamming_single_bit() {
        let va = [0u8; 1];
        let vb = [1u8; 1];
        assert_eq!(hamming(&va, &vb), 1);
    }

    #[test]
    fn test_hamming_words_matches_naive() {
        let va: Vec<u64> = vec![0xdead_beef_0000_ffff, 0x0123_4567_89ab_cdef];
        let vb: Vec<u64> = vec![0xffff_0000_beef_dead, 0xfedc_ba98_7654_3210];
        let naive = hamming_naive(bytemuck::cast_slice(&va), bytemuck::cast_slice(&vb));
        assert_eq!(hamming_words(&va, &vb), naive);
    }

    #[test]
    fn test_hamming_odd_width() {
        // 9 字节的编码无法按 u64 计算
        let va = [0u8; 9];
        let mut vb = [0u8; 9];
        vb[8] = 0b1010_0000;
        assert_eq!(hamming(&va, &vb), 2);
    }

    #[test]
    fn test_inner_product() {
        assert_eq!(inner_product(&[1.0, 0.0], &[0.5, 0.5]), 0.5);
        assert_eq!(inner_product(&[0.0, 0.0], &[0.5, 0.5]), 0.0);
    }
}

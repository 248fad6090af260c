//! SIMD primitive operations over f64 behavior descriptors.
//!
//! This module provides low-level SIMD operations with three tiers:
//! 1. Native ARM NEON intrinsics (best for Apple M1-M4)
//! 2. Portable `wide` crate (fallback for x86_64 AVX2/SSE)
//! 3. Scalar implementation (universal fallback)
//!
//! The implementation automatically selects the best path at compile time.
//! Descriptors are f64, so NEON registers hold 2 lanes and the portable
//! path uses `f64x4`.

// SIMD width: 2 for ARM NEON (128-bit / 64-bit float), 4 for AVX2
#[cfg(target_arch = "aarch64")]
pub const SIMD_WIDTH: usize = 2;

#[cfg(not(target_arch = "aarch64"))]
pub const SIMD_WIDTH: usize = 4;

// ============================================================================
// ARM NEON Implementation
// ============================================================================

#[cfg(target_arch = "aarch64")]
mod neon {
    use std::arch::aarch64::*;

    /// Squared Euclidean distance using NEON with fused multiply-accumulate.
    #[inline]
    #[target_feature(enable = "neon")]
    pub unsafe fn squared_euclidean_neon(a: &[f64], b: &[f64]) -> f64 {
        unsafe {
            let n = a.len();
            let chunks = n / 2;
            let remainder = n % 2;

            let a_ptr = a.as_ptr();
            let b_ptr = b.as_ptr();

            let mut sum = vdupq_n_f64(0.0);

            for i in 0..chunks {
                let offset = i * 2;
                let va = vld1q_f64(a_ptr.add(offset));
                let vb = vld1q_f64(b_ptr.add(offset));
                let diff = vsubq_f64(va, vb);
                sum = vfmaq_f64(sum, diff, diff);
            }

            let mut result = vaddvq_f64(sum);

            if remainder > 0 {
                let offset = chunks * 2;
                let diff = a[offset] - b[offset];
                result += diff * diff;
            }

            result
        }
    }

    /// Element-wise vector addition using NEON.
    #[inline]
    #[target_feature(enable = "neon")]
    pub unsafe fn add_neon(a: &[f64], b: &[f64], out: &mut [f64]) {
        unsafe {
            let n = a.len();
            let chunks = n / 2;
            let remainder = n % 2;

            let a_ptr = a.as_ptr();
            let b_ptr = b.as_ptr();
            let out_ptr = out.as_mut_ptr();

            for i in 0..chunks {
                let offset = i * 2;
                let va = vld1q_f64(a_ptr.add(offset));
                let vb = vld1q_f64(b_ptr.add(offset));
                let result = vaddq_f64(va, vb);
                vst1q_f64(out_ptr.add(offset), result);
            }

            if remainder > 0 {
                let offset = chunks * 2;
                out[offset] = a[offset] + b[offset];
            }
        }
    }

    /// Scalar multiplication using NEON.
    #[inline]
    #[target_feature(enable = "neon")]
    pub unsafe fn scale_neon(a: &[f64], scalar: f64, out: &mut [f64]) {
        unsafe {
            let n = a.len();
            let chunks = n / 2;
            let remainder = n % 2;

            let a_ptr = a.as_ptr();
            let out_ptr = out.as_mut_ptr();
            let vs = vdupq_n_f64(scalar);

            for i in 0..chunks {
                let offset = i * 2;
                let va = vld1q_f64(a_ptr.add(offset));
                let result = vmulq_f64(va, vs);
                vst1q_f64(out_ptr.add(offset), result);
            }

            if remainder > 0 {
                let offset = chunks * 2;
                out[offset] = a[offset] * scalar;
            }
        }
    }
}

// ============================================================================
// Portable Implementation (wide crate - x86_64 AVX2/SSE fallback)
// ============================================================================

#[cfg(not(target_arch = "aarch64"))]
mod portable {
    use wide::f64x4;

    const WIDTH: usize = 4;

    #[inline]
    pub fn squared_euclidean_wide(a: &[f64], b: &[f64]) -> f64 {
        let n = a.len();
        let chunks = n / WIDTH;
        let remainder = n % WIDTH;

        let mut sum = f64x4::splat(0.0);

        for i in 0..chunks {
            let offset = i * WIDTH;
            let va = f64x4::from([a[offset], a[offset + 1], a[offset + 2], a[offset + 3]]);
            let vb = f64x4::from([b[offset], b[offset + 1], b[offset + 2], b[offset + 3]]);
            let diff = va - vb;
            sum += diff * diff;
        }

        let mut result = sum.reduce_add();

        if remainder > 0 {
            let offset = chunks * WIDTH;
            for i in 0..remainder {
                let diff = a[offset + i] - b[offset + i];
                result += diff * diff;
            }
        }

        result
    }

    #[inline]
    pub fn add_wide(a: &[f64], b: &[f64], out: &mut [f64]) {
        let n = a.len();
        let chunks = n / WIDTH;
        let remainder = n % WIDTH;

        for i in 0..chunks {
            let offset = i * WIDTH;
            let va = f64x4::from([a[offset], a[offset + 1], a[offset + 2], a[offset + 3]]);
            let vb = f64x4::from([b[offset], b[offset + 1], b[offset + 2], b[offset + 3]]);
            let result = va + vb;
            let arr: [f64; 4] = result.into();
            out[offset..offset + WIDTH].copy_from_slice(&arr);
        }

        if remainder > 0 {
            let offset = chunks * WIDTH;
            for i in 0..remainder {
                out[offset + i] = a[offset + i] + b[offset + i];
            }
        }
    }

    #[inline]
    pub fn scale_wide(a: &[f64], scalar: f64, out: &mut [f64]) {
        let n = a.len();
        let chunks = n / WIDTH;
        let remainder = n % WIDTH;
        let vs = f64x4::splat(scalar);

        for i in 0..chunks {
            let offset = i * WIDTH;
            let va = f64x4::from([a[offset], a[offset + 1], a[offset + 2], a[offset + 3]]);
            let result = va * vs;
            let arr: [f64; 4] = result.into();
            out[offset..offset + WIDTH].copy_from_slice(&arr);
        }

        if remainder > 0 {
            let offset = chunks * WIDTH;
            for i in 0..remainder {
                out[offset + i] = a[offset + i] * scalar;
            }
        }
    }
}

// ============================================================================
// Public API (auto-selects best implementation)
// ============================================================================

/// Compute squared Euclidean distance between two f64 slices using SIMD.
///
/// # Panics
/// Panics if slices have different lengths.
#[inline]
pub fn squared_euclidean_simd(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len(), "Vectors must have same length");

    #[cfg(target_arch = "aarch64")]
    {
        // SAFETY: We check length equality above, and NEON is always available on aarch64
        unsafe { neon::squared_euclidean_neon(a, b) }
    }

    #[cfg(not(target_arch = "aarch64"))]
    {
        portable::squared_euclidean_wide(a, b)
    }
}

/// Add two vectors element-wise, storing result in `out`.
#[inline]
pub fn add_simd(a: &[f64], b: &[f64], out: &mut [f64]) {
    assert_eq!(a.len(), b.len());
    assert_eq!(a.len(), out.len());

    #[cfg(target_arch = "aarch64")]
    {
        // SAFETY: lengths checked above, NEON always available on aarch64
        unsafe { neon::add_neon(a, b, out) }
    }

    #[cfg(not(target_arch = "aarch64"))]
    {
        portable::add_wide(a, b, out)
    }
}

/// Multiply vector by scalar using SIMD.
#[inline]
pub fn scale_simd(a: &[f64], scalar: f64, out: &mut [f64]) {
    assert_eq!(a.len(), out.len());

    #[cfg(target_arch = "aarch64")]
    {
        // SAFETY: lengths checked above, NEON always available on aarch64
        unsafe { neon::scale_neon(a, scalar, out) }
    }

    #[cfg(not(target_arch = "aarch64"))]
    {
        portable::scale_wide(a, scalar, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squared_euclidean_scalar(a: &[f64], b: &[f64]) -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum()
    }

    #[test]
    fn test_squared_euclidean() {
        let a = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let b = vec![2.0, 3.0, 4.0, 5.0, 6.0];
        let result = squared_euclidean_simd(&a, &b);
        assert!((result - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_squared_euclidean_matches_scalar() {
        // Exercise chunk boundaries around the SIMD width
        for n in [1, 2, 3, 4, 5, 7, 8, 15, 16, 33] {
            let a: Vec<f64> = (0..n).map(|i| (i as f64) * 0.37 - 1.0).collect();
            let b: Vec<f64> = (0..n).map(|i| (i as f64) * -0.21 + 0.5).collect();
            let simd = squared_euclidean_simd(&a, &b);
            let scalar = squared_euclidean_scalar(&a, &b);
            assert!(
                (simd - scalar).abs() < 1e-9,
                "n={}: {} vs {}",
                n,
                simd,
                scalar
            );
        }
    }

    #[test]
    fn test_squared_euclidean_identical() {
        let a = vec![0.25; SIMD_WIDTH * 3 + 1];
        assert_eq!(squared_euclidean_simd(&a, &a), 0.0);
    }

    #[test]
    fn test_add() {
        let a = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let b = vec![10.0, 20.0, 30.0, 40.0, 50.0];
        let mut out = vec![0.0; 5];
        add_simd(&a, &b, &mut out);
        assert_eq!(out, vec![11.0, 22.0, 33.0, 44.0, 55.0]);
    }

    #[test]
    fn test_scale() {
        let a = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let mut out = vec![0.0; 7];
        scale_simd(&a, 0.5, &mut out);
        for (i, v) in out.iter().enumerate() {
            assert!((v - a[i] * 0.5).abs() < 1e-12);
        }
    }

    #[test]
    #[should_panic]
    fn test_length_mismatch_panics() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0, 2.0, 3.0];
        squared_euclidean_simd(&a, &b);
    }
}

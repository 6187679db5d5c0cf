//! Dense vector primitives shared by every index.
//!
//! All functions assume equal-length slices; a mismatch is a programming
//! error on the caller's side, checked only in debug builds.

/// Euclidean (L2) norm.
pub fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale a vector to unit length. A zero-norm vector is returned unchanged.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let n = norm(v);
    if n > 0.0 {
        v.iter().map(|x| x / n).collect()
    } else {
        v.to_vec()
    }
}

/// Dot product.
pub fn dot(u: &[f32], v: &[f32]) -> f32 {
    debug_assert_eq!(u.len(), v.len());
    u.iter().zip(v).map(|(a, b)| a * b).sum()
}

/// Squared Euclidean distance.
pub fn sqdist(u: &[f32], v: &[f32]) -> f32 {
    debug_assert_eq!(u.len(), v.len());
    u.iter().zip(v).map(|(a, b)| (a - b) * (a - b)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn norm_of_unit_axes() {
        assert_eq!(norm(&[1.0, 0.0, 0.0]), 1.0);
        assert!((norm(&[3.0, 4.0]) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_produces_unit_length() {
        let v = normalize(&[3.0, 4.0]);
        assert!((norm(&v) - 1.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn normalize_zero_vector_is_identity() {
        assert_eq!(normalize(&[0.0, 0.0, 0.0]), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn dot_and_sqdist_agree_on_unit_vectors() {
        // For unit vectors, sqdist = 2 - 2*dot.
        let u = normalize(&[0.2, -0.7, 0.5]);
        let v = normalize(&[0.9, 0.1, -0.3]);
        let lhs = sqdist(&u, &v);
        let rhs = 2.0 - 2.0 * dot(&u, &v);
        assert!((lhs - rhs).abs() < 1e-5);
    }
}

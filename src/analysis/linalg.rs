// Small dense eigen-solver for the MUSIC covariance matrices
//
// A Hermitian M x M matrix A = B + iC is embedded as the real symmetric
// 2M x 2M matrix [[B, -C], [C, B]]. Every eigenvalue of A appears twice in
// the embedding and the real span of the eigenvector pairs is the embedding
// of the complex eigenspace, so projections onto a subspace of A can be
// computed with real arithmetic only. The symmetric problem is solved with
// cyclic Jacobi rotations, which is robust for the 12 x 12 case used here.

use rustfft::num_complex::Complex;

const MAX_SWEEPS: usize = 64;

/// Eigen-decomposition of a real symmetric matrix (row-major, `n x n`)
///
/// Returns eigenvalues and the matching eigenvectors, sorted by ascending
/// eigenvalue. Each eigenvector has unit norm.
pub fn symmetric_eigen(matrix: &[f64], n: usize) -> (Vec<f64>, Vec<Vec<f64>>) {
    debug_assert_eq!(matrix.len(), n * n);
    let mut a = matrix.to_vec();
    let mut v = vec![0.0; n * n];
    for i in 0..n {
        v[i * n + i] = 1.0;
    }

    let scale: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let tolerance = 1e-26 * scale * scale;

    for _ in 0..MAX_SWEEPS {
        let off: f64 = (0..n)
            .flat_map(|p| ((p + 1)..n).map(move |q| (p, q)))
            .map(|(p, q)| a[p * n + q] * a[p * n + q])
            .sum();
        if off <= tolerance {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[p * n + q];
                if apq == 0.0 {
                    continue;
                }
                let theta = (a[q * n + q] - a[p * n + p]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let akp = a[k * n + p];
                    let akq = a[k * n + q];
                    a[k * n + p] = c * akp - s * akq;
                    a[k * n + q] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[p * n + k];
                    let aqk = a[q * n + k];
                    a[p * n + k] = c * apk - s * aqk;
                    a[q * n + k] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[k * n + p];
                    let vkq = v[k * n + q];
                    v[k * n + p] = c * vkp - s * vkq;
                    v[k * n + q] = s * vkp + c * vkq;
                }
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| a[i * n + i].total_cmp(&a[j * n + j]));

    let values = order.iter().map(|&i| a[i * n + i]).collect();
    let vectors = order
        .iter()
        .map(|&col| (0..n).map(|row| v[row * n + col]).collect())
        .collect();
    (values, vectors)
}

/// Real embedding of a Hermitian matrix given row-major
pub fn embed_hermitian(matrix: &[Complex<f64>], m: usize) -> Vec<f64> {
    let n = 2 * m;
    let mut out = vec![0.0; n * n];
    for i in 0..m {
        for j in 0..m {
            let z = matrix[i * m + j];
            out[i * n + j] = z.re;
            out[i * n + (j + m)] = -z.im;
            out[(i + m) * n + j] = z.im;
            out[(i + m) * n + (j + m)] = z.re;
        }
    }
    out
}

/// Embed a complex vector as `[re..., im...]`
pub fn embed_vector(vector: &[Complex<f64>]) -> Vec<f64> {
    vector
        .iter()
        .map(|z| z.re)
        .chain(vector.iter().map(|z| z.im))
        .collect()
}

/// Orthonormal basis of the noise subspace of a Hermitian covariance
pub struct NoiseSubspace {
    basis: Vec<Vec<f64>>,
}

impl NoiseSubspace {
    /// Span of the eigenvectors of the `m - num_sources` smallest eigenvalues
    pub fn from_covariance(covariance: &[Complex<f64>], m: usize, num_sources: usize) -> Self {
        let embedded = embed_hermitian(covariance, m);
        let (_, vectors) = symmetric_eigen(&embedded, 2 * m);
        let noise_dim = 2 * m.saturating_sub(num_sources);
        Self {
            basis: vectors.into_iter().take(noise_dim).collect(),
        }
    }

    /// Squared norm of the projection, i.e. a^H En En^H a, for an embedded
    /// vector produced by `embed_vector`
    pub fn projection(&self, embedded: &[f64]) -> f64 {
        self.basis
            .iter()
            .map(|w| {
                let dot: f64 = w.iter().zip(embedded).map(|(x, y)| x * y).sum();
                dot * dot
            })
            .sum()
    }

    pub fn dimension(&self) -> usize {
        self.basis.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symmetric_eigen_2x2() {
        let (values, vectors) = symmetric_eigen(&[2.0, 1.0, 1.0, 2.0], 2);
        assert!((values[0] - 1.0).abs() < 1e-12);
        assert!((values[1] - 3.0).abs() < 1e-12);

        let h = std::f64::consts::FRAC_1_SQRT_2;
        assert!((vectors[1][0].abs() - h).abs() < 1e-12);
        assert!((vectors[1][0] - vectors[1][1]).abs() < 1e-12);
    }

    #[test]
    fn test_eigenvectors_reconstruct_matrix() {
        let m = [
            4.0, 1.0, -2.0, 0.5, //
            1.0, 3.0, 0.0, 1.5, //
            -2.0, 0.0, 5.0, -1.0, //
            0.5, 1.5, -1.0, 2.0,
        ];
        let (values, vectors) = symmetric_eigen(&m, 4);
        for i in 0..4 {
            for j in 0..4 {
                let rebuilt: f64 = (0..4).map(|k| values[k] * vectors[k][i] * vectors[k][j]).sum();
                assert!((rebuilt - m[i * 4 + j]).abs() < 1e-9);
            }
        }
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_hermitian_eigenvalues_appear_twice() {
        // [[2, i], [-i, 2]] has eigenvalues 1 and 3
        let matrix = [
            Complex::new(2.0, 0.0),
            Complex::new(0.0, 1.0),
            Complex::new(0.0, -1.0),
            Complex::new(2.0, 0.0),
        ];
        let (values, _) = symmetric_eigen(&embed_hermitian(&matrix, 2), 4);
        let expected = [1.0, 1.0, 3.0, 3.0];
        for (v, e) in values.iter().zip(expected) {
            assert!((v - e).abs() < 1e-10);
        }
    }

    #[test]
    fn test_noise_subspace_of_rank_one_plus_noise() {
        let m = 4;
        let a: Vec<Complex<f64>> = (0..m)
            .map(|k| Complex::from_polar(1.0, 0.7 * k as f64))
            .collect();
        let mut covariance = vec![Complex::new(0.0, 0.0); m * m];
        for i in 0..m {
            for j in 0..m {
                covariance[i * m + j] = a[i] * a[j].conj() * 10.0;
            }
            covariance[i * m + i] += 0.1;
        }

        let noise = NoiseSubspace::from_covariance(&covariance, m, 1);
        assert_eq!(noise.dimension(), 6);

        // The signal direction has no noise-subspace component
        assert!(noise.projection(&embed_vector(&a)) < 1e-9);

        // A vector orthogonal to `a` lies entirely in the noise subspace
        let b: Vec<Complex<f64>> = vec![a[1], -a[0], Complex::new(0.0, 0.0), Complex::new(0.0, 0.0)]
            .into_iter()
            .map(|z| z.conj())
            .collect();
        let inner: Complex<f64> = a.iter().zip(&b).map(|(x, y)| x.conj() * y).sum();
        assert!(inner.norm() < 1e-12);
        let norm_sq: f64 = b.iter().map(|z| z.norm_sqr()).sum();
        assert!((noise.projection(&embed_vector(&b)) - norm_sq).abs() < 1e-9);
    }
}

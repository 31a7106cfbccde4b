//! K-means clustering with k-means++ seeding
//!
//! Used by the clustering-based clean sample selection on predicted
//! probability rows.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::utils::error::{NoisyMatchError, Result};

/// Default iteration cap
pub const DEFAULT_MAX_ITER: usize = 100;

/// Result of a k-means run
#[derive(Debug, Clone)]
pub struct KMeansResult {
    /// Cluster index of every row
    pub assignments: Vec<usize>,
    pub centroids: Vec<Vec<f32>>,
    /// Sum of squared distances to the assigned centroid
    pub inertia: f64,
    pub iterations: usize,
}

impl KMeansResult {
    pub fn k(&self) -> usize {
        self.centroids.len()
    }

    /// Row positions of every cluster
    pub fn members(&self) -> Vec<Vec<usize>> {
        let mut members = vec![Vec::new(); self.k()];
        for (pos, &cluster) in self.assignments.iter().enumerate() {
            members[cluster].push(pos);
        }
        members
    }
}

fn squared_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = (*x - *y) as f64;
            d * d
        })
        .sum()
}

fn nearest(row: &[f32], centroids: &[Vec<f32>]) -> (usize, f64) {
    centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, squared_distance(row, c)))
        .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
}

/// k-means++ seeding: each new centroid is drawn with probability
/// proportional to its squared distance from the closest chosen one
fn init_plus_plus(data: &[Vec<f32>], k: usize, rng: &mut ChaCha8Rng) -> Vec<Vec<f32>> {
    let mut centroids = vec![data[rng.gen_range(0..data.len())].clone()];
    let mut dist: Vec<f64> = data.iter().map(|row| squared_distance(row, &centroids[0])).collect();

    while centroids.len() < k {
        let total: f64 = dist.iter().sum();
        let next = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut chosen = data.len() - 1;
            for (i, d) in dist.iter().enumerate() {
                if target < *d {
                    chosen = i;
                    break;
                }
                target -= d;
            }
            chosen
        } else {
            rng.gen_range(0..data.len())
        };

        let centroid = data[next].clone();
        for (d, row) in dist.iter_mut().zip(data.iter()) {
            *d = d.min(squared_distance(row, &centroid));
        }
        centroids.push(centroid);
    }

    centroids
}

/// Cluster `data` into `k` groups
///
/// `k` is capped at the number of rows.
pub fn kmeans(data: &[Vec<f32>], k: usize, max_iter: usize, seed: u64) -> Result<KMeansResult> {
    if data.is_empty() {
        return Err(NoisyMatchError::InvalidInput("k-means needs at least one row".to_string()));
    }
    if k == 0 {
        return Err(NoisyMatchError::InvalidInput("k must be greater than 0".to_string()));
    }
    let dim = data[0].len();
    if data.iter().any(|row| row.len() != dim) {
        return Err(NoisyMatchError::InvalidInput("k-means rows differ in length".to_string()));
    }

    let k = k.min(data.len());
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut centroids = init_plus_plus(data, k, &mut rng);
    let mut assignments = vec![0usize; data.len()];
    let mut iterations = 0;

    for iter in 0..max_iter.max(1) {
        iterations = iter + 1;

        let mut changed = false;
        for (row, slot) in data.iter().zip(assignments.iter_mut()) {
            let (cluster, _) = nearest(row, &centroids);
            if *slot != cluster {
                changed = true;
                *slot = cluster;
            }
        }

        let mut sums = vec![vec![0.0f64; dim]; k];
        let mut counts = vec![0usize; k];
        for (row, &cluster) in data.iter().zip(assignments.iter()) {
            counts[cluster] += 1;
            for (s, v) in sums[cluster].iter_mut().zip(row.iter()) {
                *s += *v as f64;
            }
        }
        for (cluster, centroid) in centroids.iter_mut().enumerate() {
            // Empty clusters keep their previous centroid
            if counts[cluster] > 0 {
                let n = counts[cluster] as f64;
                *centroid = sums[cluster].iter().map(|s| (s / n) as f32).collect();
            }
        }

        if iter > 0 && !changed {
            break;
        }
    }

    let inertia = data
        .iter()
        .zip(assignments.iter())
        .map(|(row, &c)| squared_distance(row, &centroids[c]))
        .sum();

    debug!("k-means: k={} iterations={} inertia={:.4}", k, iterations, inertia);

    Ok(KMeansResult {
        assignments,
        centroids,
        inertia,
        iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> Vec<Vec<f32>> {
        let mut data = Vec::new();
        for i in 0..20 {
            let jitter = (i % 5) as f32 * 0.01;
            data.push(vec![0.0 + jitter, 0.0]);
            data.push(vec![10.0 + jitter, 10.0]);
            data.push(vec![-10.0, 10.0 - jitter]);
        }
        data
    }

    #[test]
    fn test_separates_well_spaced_blobs() {
        let data = blobs();
        let result = kmeans(&data, 3, DEFAULT_MAX_ITER, 0).unwrap();
        assert_eq!(result.k(), 3);

        // Rows i, i+3, i+6, ... come from the same blob
        for start in 0..3 {
            let cluster = result.assignments[start];
            assert!(data
                .iter()
                .enumerate()
                .filter(|(i, _)| i % 3 == start)
                .all(|(i, _)| result.assignments[i] == cluster));
        }
        let sizes: Vec<usize> = result.members().iter().map(|m| m.len()).collect();
        assert_eq!(sizes.iter().sum::<usize>(), 60);
        assert!(sizes.iter().all(|&s| s == 20));
        assert!(result.inertia < 1.0);
    }

    #[test]
    fn test_k_is_capped_by_rows() {
        let data = vec![vec![1.0], vec![2.0]];
        let result = kmeans(&data, 10, 10, 1).unwrap();
        assert_eq!(result.k(), 2);
    }

    #[test]
    fn test_identical_rows() {
        let data = vec![vec![0.5, 0.5]; 8];
        let result = kmeans(&data, 3, 10, 2).unwrap();
        assert_eq!(result.assignments.len(), 8);
        assert!(result.inertia.abs() < 1e-12);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(kmeans(&[], 2, 10, 0).is_err());
        assert!(kmeans(&[vec![1.0]], 0, 10, 0).is_err());
        assert!(kmeans(&[vec![1.0], vec![1.0, 2.0]], 1, 10, 0).is_err());
    }
}

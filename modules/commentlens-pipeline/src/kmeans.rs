use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::debug;

use commentlens_common::CommentEmbedding;

pub const DEFAULT_MAX_ITERATIONS: usize = 50;

/// Centroids that move less than this between iterations count as settled.
const CONVERGENCE_EPSILON: f64 = 1e-6;

const MIN_CLUSTERS: usize = 3;
const MAX_CLUSTERS: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClusterError {
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("cluster count must be at least 1")]
    ZeroClusters,
}

/// Target cluster count for `n` embedded comments: one per ten comments,
/// between 3 and 10, never more than `n`.
pub fn cluster_count(n: usize) -> usize {
    (n / 10).clamp(MIN_CLUSTERS, MAX_CLUSTERS).min(n)
}

/// A non-empty group of comments and the mean of their embeddings.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Members in fetch order.
    pub members: Vec<CommentEmbedding>,
    pub centroid: Vec<f64>,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn texts(&self) -> Vec<String> {
        self.members.iter().map(|m| m.text.clone()).collect()
    }

    pub fn positions(&self) -> Vec<usize> {
        self.members.iter().map(|m| m.position).collect()
    }
}

/// Output of one clustering pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    pub clusters: Vec<Cluster>,
    /// Lloyd iterations performed (0 when clustering degenerated to singletons).
    pub iterations: usize,
}

impl Clustering {
    fn empty() -> Self {
        Self {
            clusters: Vec::new(),
            iterations: 0,
        }
    }

    pub fn member_count(&self) -> usize {
        self.clusters.iter().map(Cluster::len).sum()
    }
}

/// Lloyd's k-means over comment embeddings, Euclidean distance.
#[derive(Debug, Clone)]
pub struct KMeansClusterer {
    max_iterations: usize,
    seed: Option<u64>,
}

impl Default for KMeansClusterer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ITERATIONS)
    }
}

impl KMeansClusterer {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations: max_iterations.max(1),
            seed: None,
        }
    }

    /// Fix the random source so repeated passes over the same input agree.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Partition `items` into at most `k` clusters using the configured
    /// random source.
    pub fn cluster(
        &self,
        items: Vec<CommentEmbedding>,
        k: usize,
    ) -> Result<Clustering, ClusterError> {
        match self.seed {
            Some(seed) => self.cluster_with_rng(items, k, &mut StdRng::seed_from_u64(seed)),
            None => self.cluster_with_rng(items, k, &mut rand::rng()),
        }
    }

    /// Partition `items` into at most `k` clusters, drawing initial centroids
    /// uniformly without replacement from the inputs.
    pub fn cluster_with_rng<R: Rng + ?Sized>(
        &self,
        items: Vec<CommentEmbedding>,
        k: usize,
        rng: &mut R,
    ) -> Result<Clustering, ClusterError> {
        if items.is_empty() {
            return Ok(Clustering::empty());
        }
        if k == 0 {
            return Err(ClusterError::ZeroClusters);
        }
        check_dimensions(&items)?;

        let n = items.len();
        if n <= k {
            debug!(n, k, "Fewer comments than clusters, using singletons");
            return Ok(singletons(items));
        }

        let centroids = rand::seq::index::sample(rng, n, k)
            .into_iter()
            .map(|i| items[i].embedding.clone())
            .collect();
        self.cluster_from_centroids(items, centroids, rng)
    }

    /// Run Lloyd iterations from explicit starting centroids.
    ///
    /// `rng` is only used to reseed centroids whose cluster comes up empty.
    pub fn cluster_from_centroids<R: Rng + ?Sized>(
        &self,
        items: Vec<CommentEmbedding>,
        mut centroids: Vec<Vec<f64>>,
        rng: &mut R,
    ) -> Result<Clustering, ClusterError> {
        if items.is_empty() {
            return Ok(Clustering::empty());
        }
        if centroids.is_empty() {
            return Err(ClusterError::ZeroClusters);
        }
        let dim = check_dimensions(&items)?;
        for centroid in &centroids {
            if centroid.len() != dim {
                return Err(ClusterError::DimensionMismatch {
                    expected: dim,
                    actual: centroid.len(),
                });
            }
        }

        let n = items.len();
        let k = centroids.len();
        let mut assignments = vec![0usize; n];
        let mut iterations = 0;

        while iterations < self.max_iterations {
            iterations += 1;

            for (slot, item) in assignments.iter_mut().zip(&items) {
                *slot = nearest(&item.embedding, &centroids);
            }

            let mut sums = vec![vec![0.0f64; dim]; k];
            let mut counts = vec![0usize; k];
            for (&c, item) in assignments.iter().zip(&items) {
                counts[c] += 1;
                for (acc, v) in sums[c].iter_mut().zip(&item.embedding) {
                    *acc += v;
                }
            }

            let mut changed = false;
            for c in 0..k {
                if counts[c] == 0 {
                    // Empty cluster: reseed from a random input and keep going.
                    let pick = rng.random_range(0..n);
                    centroids[c] = items[pick].embedding.clone();
                    changed = true;
                    continue;
                }
                let count = counts[c] as f64;
                let mean: Vec<f64> = sums[c].iter().map(|s| s / count).collect();
                if euclidean(&mean, &centroids[c]) > CONVERGENCE_EPSILON {
                    changed = true;
                }
                centroids[c] = mean;
            }

            if !changed {
                break;
            }
        }

        let mut members: Vec<Vec<CommentEmbedding>> = vec![Vec::new(); k];
        for (c, item) in assignments.into_iter().zip(items) {
            members[c].push(item);
        }

        let clusters: Vec<Cluster> = members
            .into_iter()
            .zip(centroids)
            .filter(|(m, _)| !m.is_empty())
            .map(|(members, centroid)| Cluster { members, centroid })
            .collect();

        debug!(n, k, iterations, clusters = clusters.len(), "k-means finished");
        Ok(Clustering {
            clusters,
            iterations,
        })
    }
}

/// Every input becomes its own cluster.
fn singletons(items: Vec<CommentEmbedding>) -> Clustering {
    let clusters = items
        .into_iter()
        .map(|item| Cluster {
            centroid: item.embedding.clone(),
            members: vec![item],
        })
        .collect();
    Clustering {
        clusters,
        iterations: 0,
    }
}

/// All embeddings must share the first one's length. Returns that length.
fn check_dimensions(items: &[CommentEmbedding]) -> Result<usize, ClusterError> {
    let dim = items.first().map(CommentEmbedding::dimension).unwrap_or(0);
    match items.iter().find(|item| item.dimension() != dim) {
        Some(bad) => Err(ClusterError::DimensionMismatch {
            expected: dim,
            actual: bad.dimension(),
        }),
        None => Ok(dim),
    }
}

/// Index of the closest centroid. Ties go to the lowest index.
///
/// `point` and every centroid must share one length; `check_dimensions` and
/// the centroid check in `cluster_from_centroids` guarantee it before any
/// call.
fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, centroid) in centroids.iter().enumerate() {
        let dist = euclidean(point, centroid);
        if dist < best_dist {
            best_dist = dist;
            best = i;
        }
    }
    best
}

/// Callers must pass equal-length vectors. `zip` would silently ignore the
/// tail of the longer one, so the length check happens at the public entry
/// points rather than here.
pub(crate) fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

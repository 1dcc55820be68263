//! # Distance Functions
//!
//! Scalar distance kernels. The inner loops accumulate into eight
//! independent lanes so the compiler can vectorize them without intrinsics.
//!
//! All functions return a *distance*: smaller is closer. Storage layers turn
//! distances back into similarity scores with [`score_from_distance`].

use vidst_core::DistanceMetric;

const LANES: usize = 8;

/// Dot product of two equal-length vectors
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let mut acc = [0.0f32; LANES];
    let chunks_a = a.chunks_exact(LANES);
    let chunks_b = b.chunks_exact(LANES);
    let tail_a = chunks_a.remainder();
    let tail_b = chunks_b.remainder();

    for (ca, cb) in chunks_a.zip(chunks_b) {
        for i in 0..LANES {
            acc[i] += ca[i] * cb[i];
        }
    }

    let mut sum: f32 = acc.iter().sum();
    for (x, y) in tail_a.iter().zip(tail_b) {
        sum += x * y;
    }
    sum
}

/// Squared Euclidean distance
#[inline]
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let mut acc = [0.0f32; LANES];
    let chunks_a = a.chunks_exact(LANES);
    let chunks_b = b.chunks_exact(LANES);
    let tail_a = chunks_a.remainder();
    let tail_b = chunks_b.remainder();

    for (ca, cb) in chunks_a.zip(chunks_b) {
        for i in 0..LANES {
            let d = ca[i] - cb[i];
            acc[i] += d * d;
        }
    }

    let mut sum: f32 = acc.iter().sum();
    for (x, y) in tail_a.iter().zip(tail_b) {
        let d = x - y;
        sum += d * d;
    }
    sum
}

/// Euclidean distance
#[inline]
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    l2_distance_squared(a, b).sqrt()
}

/// Vector magnitude
#[inline]
pub fn norm(v: &[f32]) -> f32 {
    dot_product(v, v).sqrt()
}

/// Cosine similarity; zero vectors have similarity 0 with everything
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let denom = norm(a) * norm(b);
    if denom > 0.0 {
        dot_product(a, b) / denom
    } else {
        0.0
    }
}

/// Normalize in place. Zero vectors are left untouched.
pub fn normalize(v: &mut [f32]) {
    let n = norm(v);
    if n > 0.0 {
        v.iter_mut().for_each(|x| *x /= n);
    }
}

/// Normalized copy
pub fn normalized(v: &[f32]) -> Vec<f32> {
    let mut out = v.to_vec();
    normalize(&mut out);
    out
}

/// Prepare a vector for storage under `metric`
pub fn prepare(metric: DistanceMetric, v: &[f32]) -> Vec<f32> {
    match metric {
        DistanceMetric::Cosine => normalized(v),
        DistanceMetric::L2 | DistanceMetric::DotProduct => v.to_vec(),
    }
}

/// Distance between a prepared query and a prepared stored vector
#[inline]
pub fn distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        // Both sides are unit length (or zero)
        DistanceMetric::Cosine => 1.0 - dot_product(a, b),
        DistanceMetric::L2 => l2_distance_squared(a, b),
        DistanceMetric::DotProduct => -dot_product(a, b),
    }
}

/// Convert a [`distance`] into a similarity score (higher is better):
/// cosine similarity, negative Euclidean distance, or raw dot product.
#[inline]
pub fn score_from_distance(metric: DistanceMetric, distance: f32) -> f32 {
    match metric {
        DistanceMetric::Cosine => 1.0 - distance,
        DistanceMetric::L2 => -distance.max(0.0).sqrt(),
        DistanceMetric::DotProduct => -distance,
    }
}

pub(crate) fn metric_to_byte(metric: DistanceMetric) -> u8 {
    match metric {
        DistanceMetric::Cosine => 0,
        DistanceMetric::L2 => 1,
        DistanceMetric::DotProduct => 2,
    }
}

pub(crate) fn metric_from_byte(byte: u8) -> Option<DistanceMetric> {
    match byte {
        0 => Some(DistanceMetric::Cosine),
        1 => Some(DistanceMetric::L2),
        2 => Some(DistanceMetric::DotProduct),
        _ => None,
    }
}

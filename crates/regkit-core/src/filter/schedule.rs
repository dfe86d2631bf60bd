use crate::error::{CoreError, Result};

/// Per-level, per-axis reduction factors of a resolution pyramid.
///
/// Levels run coarsest first. The default for `n` levels halves the
/// resolution per level: `[2^(n-1), ..., 2, 1]` on every axis.
#[derive(Debug, Clone, PartialEq)]
pub struct PyramidSchedule {
    factors: Vec<Vec<usize>>,
}

impl PyramidSchedule {
    pub fn default_for(levels: usize, dimension: usize) -> Self {
        let factors = (0..levels)
            .map(|level| vec![1usize << (levels - 1 - level); dimension])
            .collect();
        Self { factors }
    }

    /// Build from a flat level-major list of `levels * dimension` factors.
    pub fn from_flat(values: &[usize], levels: usize, dimension: usize) -> Result<Self> {
        if values.len() != levels * dimension {
            return Err(CoreError::invalid_value(
                "ImagePyramidSchedule",
                0,
                format!("{values:?}"),
                format!("expected {} entries ({} levels x {} axes)", levels * dimension, levels, dimension),
            ));
        }
        if values.contains(&0) {
            return Err(CoreError::invalid_value(
                "ImagePyramidSchedule",
                0,
                format!("{values:?}"),
                "factors must be at least 1",
            ));
        }
        Ok(Self {
            factors: values.chunks(dimension).map(|c| c.to_vec()).collect(),
        })
    }

    pub fn levels(&self) -> usize {
        self.factors.len()
    }

    pub fn factors(&self, level: usize) -> &[usize] {
        &self.factors[level]
    }

    /// Smoothing sigma per axis in physical units: half the factor, in voxels.
    pub fn sigmas(&self, level: usize, spacing: &[f64]) -> Vec<f64> {
        self.factors[level]
            .iter()
            .zip(spacing)
            .map(|(&f, &s)| if f > 1 { 0.5 * f as f64 * s } else { 0.0 })
            .collect()
    }
}

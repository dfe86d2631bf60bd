use crate::error::{CoreError, Result};
use crate::spatial::{Geometry, Vector};

/// Voxel values on the host, first axis varying fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBuffer<const D: usize> {
    geometry: Geometry<D>,
    values: Vec<f64>,
}

impl<const D: usize> ImageBuffer<D> {
    /// Wrap `values`; their count must match the geometry size.
    pub fn new(geometry: Geometry<D>, values: Vec<f64>) -> Result<Self> {
        let expected = geometry.number_of_voxels();
        if values.len() != expected {
            return Err(CoreError::VoxelCount {
                expected,
                actual: values.len(),
            });
        }
        Ok(Self { geometry, values })
    }

    /// Fill every voxel from its physical position.
    pub fn from_fn(geometry: Geometry<D>, f: impl Fn(&Vector<D>) -> f64) -> Self {
        let values = (0..geometry.number_of_voxels())
            .map(|linear| f(&geometry.index_to_physical(&geometry.multi_index(linear))))
            .collect();
        Self { geometry, values }
    }

    pub fn filled(geometry: Geometry<D>, value: f64) -> Self {
        let values = vec![value; geometry.number_of_voxels()];
        Self { geometry, values }
    }

    pub fn geometry(&self) -> &Geometry<D> {
        &self.geometry
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: &[usize; D]) -> f64 {
        self.values[self.geometry.linear_index(index)]
    }

    /// Value at a signed index, `None` outside the grid.
    pub fn get_checked(&self, index: &[isize; D]) -> Option<f64> {
        let size = self.geometry.size();
        let mut unsigned = [0usize; D];
        for axis in 0..D {
            if index[axis] < 0 || index[axis] as usize >= size[axis] {
                return None;
            }
            unsigned[axis] = index[axis] as usize;
        }
        Some(self.get(&unsigned))
    }

    /// Mask semantics: a voxel is inside when its value is non-zero.
    pub fn is_inside_mask(&self, point: &Vector<D>) -> bool {
        let index = self.geometry.physical_to_continuous_index(point);
        let mut nearest = [0isize; D];
        for axis in 0..D {
            nearest[axis] = index[axis].round() as isize;
        }
        self.get_checked(&nearest).is_some_and(|v| v != 0.0)
    }
}

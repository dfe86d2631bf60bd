//! Image pyramid components.
//!
//! All levels are computed once, in `before_registration`, from
//! `NumberOfResolutions` and `<Fixed|Moving>ImagePyramidSchedule` (one
//! shrink factor per axis per level, coarsest level first). Smoothing
//! pyramids blur without changing the grid, shrinking pyramids subsample
//! without blurring, and recursive pyramids do both.

use std::rc::Rc;

use burn::tensor::backend::Backend;
use regkit_core::filter::{GaussianFilter, PyramidSchedule, ShrinkFilter};
use regkit_core::{Image, ImageBuffer};

use super::{factory, shared};
use crate::component::{Component, ComponentBase, ImagePyramidComponent, RegistrationComponent};
use crate::error::{RegistrationError, Result};
use crate::registry::{ComponentRegistry, SignatureIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PyramidSide {
    Fixed,
    Moving,
}

impl PyramidSide {
    fn prefix(self) -> &'static str {
        match self {
            PyramidSide::Fixed => "Fixed",
            PyramidSide::Moving => "Moving",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PyramidKind {
    Smoothing,
    Shrinking,
    Recursive,
}

impl PyramidKind {
    fn smooths(self) -> bool {
        matches!(self, PyramidKind::Smoothing | PyramidKind::Recursive)
    }

    fn shrinks(self) -> bool {
        matches!(self, PyramidKind::Shrinking | PyramidKind::Recursive)
    }
}

pub struct ImagePyramid<B: Backend, const D: usize> {
    base: ComponentBase<B, D>,
    name: &'static str,
    side: PyramidSide,
    kind: PyramidKind,
    levels: Vec<Rc<ImageBuffer<D>>>,
}

impl<B: Backend, const D: usize> ImagePyramid<B, D> {
    pub fn new(name: &'static str, side: PyramidSide, kind: PyramidKind) -> Self {
        Self {
            base: ComponentBase::default(),
            name,
            side,
            kind,
            levels: Vec::new(),
        }
    }

    pub fn side(&self) -> PyramidSide {
        self.side
    }

    /// Compute all levels of `source` for `schedule`.
    pub fn compute(&mut self, source: &ImageBuffer<D>, schedule: &PyramidSchedule, device: &B::Device) -> Result<()> {
        let input = Image::<B, D>::from_buffer(source, device);
        let spacing: Vec<f64> = source.geometry().spacing().iter().copied().collect();
        self.levels.clear();
        for level in 0..schedule.levels() {
            let mut image = input.clone();
            if self.kind.smooths() {
                image = GaussianFilter::<B>::new(schedule.sigmas(level, &spacing)).apply(&image);
            }
            if self.kind.shrinks() {
                image = ShrinkFilter::<B>::new(schedule.factors(level).to_vec()).apply(&image);
            }
            let buffer = Rc::new(image.to_buffer()?);
            tracing::debug!(
                pyramid = self.name,
                level,
                size = ?buffer.geometry().size(),
                "pyramid level computed"
            );
            self.levels.push(buffer);
        }
        Ok(())
    }
}

impl<B: Backend, const D: usize> RegistrationComponent<B, D> for ImagePyramid<B, D> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn base(&self) -> &ComponentBase<B, D> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase<B, D> {
        &mut self.base
    }

    fn before_registration(&mut self) -> Result<()> {
        let context = self.context()?;
        let configuration = context.configuration();
        let levels: usize = configuration.read_parameter_or("NumberOfResolutions", 0, 3)?;
        if levels == 0 {
            return Err(RegistrationError::Parameter(regkit_core::CoreError::invalid_value(
                "NumberOfResolutions",
                0,
                "0",
                "at least one resolution is required",
            )));
        }
        let key = format!("{}ImagePyramidSchedule", self.side.prefix());
        let flat = configuration.parameters().get_all_as::<usize>(&key)?;
        let schedule = if flat.is_empty() {
            PyramidSchedule::default_for(levels, D)
        } else {
            PyramidSchedule::from_flat(&flat, levels, D)?
        };
        let source = match self.side {
            PyramidSide::Fixed => context.fixed_image(0)?,
            PyramidSide::Moving => context.moving_image(0)?,
        };
        self.compute(&source, &schedule, context.device())
    }
}

impl<B: Backend, const D: usize> ImagePyramidComponent<B, D> for ImagePyramid<B, D> {
    fn number_of_levels(&self) -> usize {
        self.levels.len()
    }

    fn level(&self, level: usize) -> Option<Rc<ImageBuffer<D>>> {
        self.levels.get(level).cloned()
    }
}

pub(crate) fn register<B: Backend, const D: usize>(registry: &mut ComponentRegistry, index: SignatureIndex) {
    macro_rules! pyramid {
        ($name:literal, $variant:ident, $side:ident, $kind:ident) => {
            registry.register(
                $name,
                index,
                factory::<B, D>(|| {
                    Component::$variant(shared(ImagePyramid::<B, D>::new(
                        $name,
                        PyramidSide::$side,
                        PyramidKind::$kind,
                    )))
                }),
            );
        };
    }
    pyramid!("FixedSmoothingImagePyramid", FixedImagePyramid, Fixed, Smoothing);
    pyramid!("MovingSmoothingImagePyramid", MovingImagePyramid, Moving, Smoothing);
    pyramid!("FixedShrinkingImagePyramid", FixedImagePyramid, Fixed, Shrinking);
    pyramid!("MovingShrinkingImagePyramid", MovingImagePyramid, Moving, Shrinking);
    pyramid!("FixedRecursiveImagePyramid", FixedImagePyramid, Fixed, Recursive);
    pyramid!("MovingRecursiveImagePyramid", MovingImagePyramid, Moving, Recursive);
}

//! Per-run execution context.
//!
//! The context owns the typed component collections, the shared
//! configuration, the input images and masks, the resolution state and the
//! iteration log. Components reach it through the `Weak` reference stored in
//! their [`ComponentBase`](crate::component::ComponentBase); the pipeline
//! holds the only strong reference, so dropping the pipeline tears the
//! context down.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use burn::tensor::backend::Backend;
use regkit_core::io::{ImageWriter, RawImage};
use regkit_core::{ImageBuffer, TypeSignature};

use crate::component::{
    busy, Category, Component, ImagePyramidComponent, ImageSamplerComponent, InterpolatorComponent,
    MetricComponent, OptimizerComponent, RegistrationComponent, RegistrationMethod,
    ResamplerComponent, Shared, TransformComponent,
};
use crate::configuration::Configuration;
use crate::error::{RegistrationError, Result};
use crate::iteration_log::IterationLog;
use crate::pipeline::TransformSnapshot;

/// Current resolution level and iteration within it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionState {
    pub level: usize,
    pub iteration: usize,
}

/// Ordered component collections, one per category.
pub struct ComponentSlots<B: Backend, const D: usize> {
    pub registrations: Vec<Shared<dyn RegistrationMethod<B, D>>>,
    pub fixed_pyramids: Vec<Shared<dyn ImagePyramidComponent<B, D>>>,
    pub moving_pyramids: Vec<Shared<dyn ImagePyramidComponent<B, D>>>,
    pub samplers: Vec<Shared<dyn ImageSamplerComponent<B, D>>>,
    pub interpolators: Vec<Shared<dyn InterpolatorComponent<B, D>>>,
    pub metrics: Vec<Shared<dyn MetricComponent<B, D>>>,
    pub optimizers: Vec<Shared<dyn OptimizerComponent<B, D>>>,
    pub resample_interpolators: Vec<Shared<dyn InterpolatorComponent<B, D>>>,
    pub resamplers: Vec<Shared<dyn ResamplerComponent<B, D>>>,
    pub transforms: Vec<Shared<dyn TransformComponent<B, D>>>,
}

impl<B: Backend, const D: usize> Default for ComponentSlots<B, D> {
    fn default() -> Self {
        Self {
            registrations: Vec::new(),
            fixed_pyramids: Vec::new(),
            moving_pyramids: Vec::new(),
            samplers: Vec::new(),
            interpolators: Vec::new(),
            metrics: Vec::new(),
            optimizers: Vec::new(),
            resample_interpolators: Vec::new(),
            resamplers: Vec::new(),
            transforms: Vec::new(),
        }
    }
}

impl<B: Backend, const D: usize> fmt::Debug for ComponentSlots<B, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for category in Category::CREATION_ORDER {
            map.entry(&category.key(), &self.len(category));
        }
        map.finish()
    }
}

impl<B: Backend, const D: usize> ComponentSlots<B, D> {
    /// Append a component to the collection of its own category.
    pub fn push(&mut self, component: Component<B, D>) {
        match component {
            Component::Registration(c) => self.registrations.push(c),
            Component::FixedImagePyramid(c) => self.fixed_pyramids.push(c),
            Component::MovingImagePyramid(c) => self.moving_pyramids.push(c),
            Component::ImageSampler(c) => self.samplers.push(c),
            Component::Interpolator(c) => self.interpolators.push(c),
            Component::Metric(c) => self.metrics.push(c),
            Component::Optimizer(c) => self.optimizers.push(c),
            Component::ResampleInterpolator(c) => self.resample_interpolators.push(c),
            Component::Resampler(c) => self.resamplers.push(c),
            Component::Transform(c) => self.transforms.push(c),
        }
    }

    pub fn len(&self, category: Category) -> usize {
        match category {
            Category::Registration => self.registrations.len(),
            Category::FixedImagePyramid => self.fixed_pyramids.len(),
            Category::MovingImagePyramid => self.moving_pyramids.len(),
            Category::ImageSampler => self.samplers.len(),
            Category::Interpolator => self.interpolators.len(),
            Category::Metric => self.metrics.len(),
            Category::Optimizer => self.optimizers.len(),
            Category::ResampleInterpolator => self.resample_interpolators.len(),
            Category::Resampler => self.resamplers.len(),
            Category::Transform => self.transforms.len(),
        }
    }

    /// Call `f` on every component of `category`, index ascending. Stops at
    /// the first error.
    pub fn visit(
        &self,
        category: Category,
        mut f: impl FnMut(&mut dyn RegistrationComponent<B, D>) -> Result<()>,
    ) -> Result<()> {
        macro_rules! each {
            ($slots:expr) => {{
                for slot in $slots.iter() {
                    let mut guard = slot.try_borrow_mut().map_err(|_| busy(category))?;
                    f(&mut *guard)?;
                }
                Ok(())
            }};
        }
        match category {
            Category::Registration => each!(self.registrations),
            Category::FixedImagePyramid => each!(self.fixed_pyramids),
            Category::MovingImagePyramid => each!(self.moving_pyramids),
            Category::ImageSampler => each!(self.samplers),
            Category::Interpolator => each!(self.interpolators),
            Category::Metric => each!(self.metrics),
            Category::Optimizer => each!(self.optimizers),
            Category::ResampleInterpolator => each!(self.resample_interpolators),
            Category::Resampler => each!(self.resamplers),
            Category::Transform => each!(self.transforms),
        }
    }
}

fn nth<T: ?Sized>(slots: &[Shared<T>], category: Category, index: usize) -> Result<Shared<T>> {
    slots.get(index).cloned().ok_or_else(|| {
        RegistrationError::runtime(format!("no {category} component at index {index}"))
    })
}

/// Binding surface of one registration run.
pub struct ExecutionContext<B: Backend, const D: usize> {
    configuration: Rc<Configuration>,
    signature: TypeSignature,
    device: B::Device,
    components: ComponentSlots<B, D>,
    fixed_images: RefCell<Vec<Rc<ImageBuffer<D>>>>,
    moving_images: RefCell<Vec<Rc<ImageBuffer<D>>>>,
    fixed_masks: RefCell<Vec<Rc<ImageBuffer<D>>>>,
    moving_masks: RefCell<Vec<Rc<ImageBuffer<D>>>>,
    resolution: Cell<ResolutionState>,
    iteration_log: RefCell<IterationLog>,
    output_directory: Option<PathBuf>,
    writer: Option<Arc<dyn ImageWriter>>,
    initial_transform: Option<TransformSnapshot>,
}

impl<B: Backend, const D: usize> fmt::Debug for ExecutionContext<B, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("signature", &self.signature)
            .field("components", &self.components)
            .field("resolution", &self.resolution.get())
            .field("output_directory", &self.output_directory)
            .field("initial_transform", &self.initial_transform)
            .finish()
    }
}

impl<B: Backend, const D: usize> ExecutionContext<B, D> {
    pub fn new(
        configuration: Rc<Configuration>,
        signature: TypeSignature,
        components: ComponentSlots<B, D>,
        device: B::Device,
    ) -> Self {
        let output_directory = configuration.output_directory();
        Self {
            configuration,
            signature,
            device,
            components,
            fixed_images: RefCell::new(Vec::new()),
            moving_images: RefCell::new(Vec::new()),
            fixed_masks: RefCell::new(Vec::new()),
            moving_masks: RefCell::new(Vec::new()),
            resolution: Cell::new(ResolutionState::default()),
            iteration_log: RefCell::new(IterationLog::new()),
            output_directory,
            writer: None,
            initial_transform: None,
        }
    }

    pub fn with_writer(mut self, writer: Arc<dyn ImageWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Transform composed before the one being optimised.
    pub fn with_initial_transform(mut self, transform: TransformSnapshot) -> Self {
        self.initial_transform = Some(transform);
        self
    }

    pub fn initial_transform(&self) -> Option<&TransformSnapshot> {
        self.initial_transform.as_ref()
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn signature(&self) -> &TypeSignature {
        &self.signature
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn components(&self) -> &ComponentSlots<B, D> {
        &self.components
    }

    pub fn resolution(&self) -> ResolutionState {
        self.resolution.get()
    }

    pub fn set_resolution(&self, state: ResolutionState) {
        self.resolution.set(state);
    }

    pub fn iteration_log(&self) -> RefMut<'_, IterationLog> {
        self.iteration_log.borrow_mut()
    }

    /// Add a column value to the current iteration-log row.
    pub fn log_column(&self, column: &str, value: f64) {
        if let Ok(mut log) = self.iteration_log.try_borrow_mut() {
            log.set_float(column, value);
        }
    }

    pub fn output_directory(&self) -> Option<&Path> {
        self.output_directory.as_deref()
    }

    /// Write an image through the configured writer; a no-op without one.
    pub fn write_image(&self, path: &Path, image: &RawImage) -> Result<()> {
        match &self.writer {
            Some(writer) => Ok(writer.write(path, image)?),
            None => {
                tracing::warn!(path = %path.display(), "no image writer configured, image not written");
                Ok(())
            }
        }
    }

    pub fn set_fixed_images(&self, images: Vec<ImageBuffer<D>>) {
        *self.fixed_images.borrow_mut() = images.into_iter().map(Rc::new).collect();
    }

    pub fn set_moving_images(&self, images: Vec<ImageBuffer<D>>) {
        *self.moving_images.borrow_mut() = images.into_iter().map(Rc::new).collect();
    }

    pub fn set_fixed_masks(&self, masks: Vec<ImageBuffer<D>>) {
        *self.fixed_masks.borrow_mut() = masks.into_iter().map(Rc::new).collect();
    }

    pub fn set_moving_masks(&self, masks: Vec<ImageBuffer<D>>) {
        *self.moving_masks.borrow_mut() = masks.into_iter().map(Rc::new).collect();
    }

    pub fn fixed_images(&self) -> Ref<'_, Vec<Rc<ImageBuffer<D>>>> {
        self.fixed_images.borrow()
    }

    pub fn moving_images(&self) -> Ref<'_, Vec<Rc<ImageBuffer<D>>>> {
        self.moving_images.borrow()
    }

    pub fn fixed_image(&self, index: usize) -> Result<Rc<ImageBuffer<D>>> {
        self.fixed_images
            .borrow()
            .get(index)
            .cloned()
            .ok_or_else(|| RegistrationError::image(format!("fixed image {index} is not set")))
    }

    pub fn moving_image(&self, index: usize) -> Result<Rc<ImageBuffer<D>>> {
        self.moving_images
            .borrow()
            .get(index)
            .cloned()
            .ok_or_else(|| RegistrationError::image(format!("moving image {index} is not set")))
    }

    pub fn fixed_mask(&self, index: usize) -> Option<Rc<ImageBuffer<D>>> {
        self.fixed_masks.borrow().get(index).cloned()
    }

    pub fn moving_mask(&self, index: usize) -> Option<Rc<ImageBuffer<D>>> {
        self.moving_masks.borrow().get(index).cloned()
    }

    pub fn registration(&self, index: usize) -> Result<Shared<dyn RegistrationMethod<B, D>>> {
        nth(&self.components.registrations, Category::Registration, index)
    }

    pub fn fixed_pyramid(&self, index: usize) -> Result<Shared<dyn ImagePyramidComponent<B, D>>> {
        nth(&self.components.fixed_pyramids, Category::FixedImagePyramid, index)
    }

    pub fn moving_pyramid(&self, index: usize) -> Result<Shared<dyn ImagePyramidComponent<B, D>>> {
        nth(&self.components.moving_pyramids, Category::MovingImagePyramid, index)
    }

    /// The sampler is optional; `None` when none was configured.
    pub fn sampler(&self, index: usize) -> Option<Shared<dyn ImageSamplerComponent<B, D>>> {
        self.components.samplers.get(index).cloned()
    }

    pub fn interpolator(&self, index: usize) -> Result<Shared<dyn InterpolatorComponent<B, D>>> {
        nth(&self.components.interpolators, Category::Interpolator, index)
    }

    pub fn metric(&self, index: usize) -> Result<Shared<dyn MetricComponent<B, D>>> {
        nth(&self.components.metrics, Category::Metric, index)
    }

    pub fn optimizer(&self, index: usize) -> Result<Shared<dyn OptimizerComponent<B, D>>> {
        nth(&self.components.optimizers, Category::Optimizer, index)
    }

    pub fn resample_interpolator(
        &self,
        index: usize,
    ) -> Result<Shared<dyn InterpolatorComponent<B, D>>> {
        nth(&self.components.resample_interpolators, Category::ResampleInterpolator, index)
    }

    pub fn resampler(&self, index: usize) -> Result<Shared<dyn ResamplerComponent<B, D>>> {
        nth(&self.components.resamplers, Category::Resampler, index)
    }

    pub fn transform(&self, index: usize) -> Result<Shared<dyn TransformComponent<B, D>>> {
        nth(&self.components.transforms, Category::Transform, index)
    }
}

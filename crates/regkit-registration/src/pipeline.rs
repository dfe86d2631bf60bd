//! Typed registration pipeline.
//!
//! A [`Pipeline`] is the primary component the orchestrator creates for a
//! resolved signature. It receives the type-erased component collections,
//! checks that each matches its category, binds them to a fresh
//! [`ExecutionContext`] and drives the staged run, fanning every lifecycle
//! event out in [`Category::FAN_OUT_ORDER`].

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use burn::tensor::backend::Backend;
use regkit_core::io::{ImageLoader, ImageWriter, RawImage};
use regkit_core::transform::{AffineTransform, ChainedTransform, Transform, TranslationTransform};
use regkit_core::{ImageBuffer, ParameterMap, TypeSignature};
use serde::Serialize;

use crate::component::{busy, Category, Component, ComponentLabel, RegistrationComponent, Shared};
use crate::configuration::Configuration;
use crate::context::{ComponentSlots, ExecutionContext, ResolutionState};
use crate::error::{CategoryFailure, ComponentFailure, RegistrationError, Result};
use crate::events::{Hook, RegistrationEvent};
use crate::record::{iteration_info_file_name, transform_parameter_file_name, TransformParameterRecord};
use crate::registry::AnyComponent;
use crate::state::{RunState, StateMachine};

/// Registry family name under which pipelines are registered.
pub const PIPELINE_FAMILY: &str = "RegistrationPipeline";

/// `InitialTransformParametersFileName` of a transform with no initial
/// transform.
pub const NO_INITIAL_TRANSFORM: &str = "NoInitialTransform";

/// Longest `InitialTransformParametersFileName` chain followed when reading.
const MAX_INITIAL_TRANSFORM_DEPTH: usize = 32;

/// Everything a pipeline needs besides its components.
pub struct PipelineInputs {
    pub configuration: Rc<Configuration>,
    pub signature: TypeSignature,
    pub initial_transform: Option<TransformSnapshot>,
    pub loader: Arc<dyn ImageLoader>,
    pub writer: Option<Arc<dyn ImageWriter>>,
    pub fixed_images: Vec<RawImage>,
    pub moving_images: Vec<RawImage>,
    pub fixed_masks: Vec<RawImage>,
    pub moving_masks: Vec<RawImage>,
}

/// Parameters of the final transform, detached from the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformSnapshot {
    pub name: String,
    pub dimension: usize,
    pub parameters: Vec<f64>,
    pub fixed_parameters: Vec<f64>,
    /// Applied before this transform.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial: Option<Box<TransformSnapshot>>,
}

impl TransformSnapshot {
    pub fn from_transform<const D: usize>(transform: &dyn Transform<D>) -> Self {
        Self {
            name: transform.name().to_string(),
            dimension: D,
            parameters: transform.parameters(),
            fixed_parameters: transform.fixed_parameters(),
            initial: transform
                .initial_transform()
                .map(|initial| Box::new(Self::from_transform(initial))),
        }
    }

    /// Read a transform-parameter file, following its
    /// `InitialTransformParametersFileName` chain.
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::read_chain(path, 0)
    }

    fn read_chain(path: &Path, depth: usize) -> Result<Self> {
        if depth >= MAX_INITIAL_TRANSFORM_DEPTH {
            return Err(RegistrationError::runtime(format!(
                "initial transform chain through {} is longer than {MAX_INITIAL_TRANSFORM_DEPTH}",
                path.display()
            )));
        }
        let parameters = ParameterMap::from_file(path)?;
        let mut snapshot = Self::from_parameters(&parameters)?;
        snapshot.initial = match parameters.get_entry("InitialTransformParametersFileName", 0) {
            None | Some(NO_INITIAL_TRANSFORM) => None,
            Some(file) => Some(Box::new(Self::read_chain(Path::new(file), depth + 1)?)),
        };
        Ok(snapshot)
    }

    /// The transform block of a parameter map, without its initial transform.
    pub fn from_parameters(parameters: &ParameterMap) -> Result<Self> {
        let name = parameters
            .get_entry("Transform", 0)
            .ok_or_else(|| RegistrationError::missing_parameter("Transform"))?;
        let dimension = parameters
            .get_as::<usize>("FixedImageDimension", 0)?
            .ok_or_else(|| RegistrationError::missing_parameter("FixedImageDimension"))?;
        Ok(Self {
            name: name.to_string(),
            dimension,
            parameters: parameters.get_all_as("TransformParameters")?,
            fixed_parameters: parameters.get_all_as("CenterOfRotationPoint")?,
            initial: None,
        })
    }

    /// Rebuild a live transform of dimension `D`.
    pub fn to_transform<const D: usize>(&self) -> Result<Box<dyn Transform<D>>> {
        if self.dimension != D {
            return Err(RegistrationError::runtime(format!(
                "transform snapshot has dimension {}, requested {D}",
                self.dimension
            )));
        }
        let mut transform: Box<dyn Transform<D>> = match self.name.as_str() {
            "TranslationTransform" => Box::new(TranslationTransform::<D>::identity()),
            "AffineTransform" => {
                let mut affine = AffineTransform::<D>::identity();
                if self.fixed_parameters.len() == D {
                    affine.set_center(regkit_core::Vector::<D>::from_column_slice(&self.fixed_parameters));
                }
                Box::new(affine)
            }
            other => {
                return Err(RegistrationError::runtime(format!(
                    "cannot rebuild unknown transform \"{other}\""
                )))
            }
        };
        transform.set_parameters(&self.parameters)?;
        match &self.initial {
            Some(initial) => Ok(Box::new(ChainedTransform::new(initial.to_transform::<D>()?, transform))),
            None => Ok(transform),
        }
    }
}

/// Outcome of a completed run. Survives context teardown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub final_transform: TransformSnapshot,
    pub transform_parameters: ParameterMap,
    pub record: TransformParameterRecord,
    pub error_code: i32,
}

/// Object-safe face of a [`Pipeline`] for any backend and dimension.
pub trait PipelineRunner {
    fn dimension(&self) -> usize;

    /// Take ownership of the components created for `category`.
    fn install(
        &mut self,
        category: Category,
        components: Vec<AnyComponent>,
    ) -> std::result::Result<(), CategoryFailure>;

    /// Create the execution context and bind every component to it.
    fn bind(&mut self, inputs: PipelineInputs) -> Result<()>;

    /// Run the registration to completion.
    fn run(&mut self, state: &mut StateMachine) -> Result<RunResult>;
}

struct PendingImages {
    loader: Arc<dyn ImageLoader>,
    fixed_images: Vec<RawImage>,
    moving_images: Vec<RawImage>,
    fixed_masks: Vec<RawImage>,
    moving_masks: Vec<RawImage>,
}

pub struct Pipeline<B: Backend, const D: usize> {
    device: B::Device,
    slots: Option<ComponentSlots<B, D>>,
    context: Option<Rc<ExecutionContext<B, D>>>,
    pending: Option<PendingImages>,
}

impl<B: Backend, const D: usize> Pipeline<B, D> {
    pub fn new(device: B::Device) -> Self {
        Self {
            device,
            slots: Some(ComponentSlots::default()),
            context: None,
            pending: None,
        }
    }

    /// The bound context, while the run is in progress.
    pub fn context(&self) -> Option<&Rc<ExecutionContext<B, D>>> {
        self.context.as_ref()
    }

    fn bound_context(&self) -> Result<Rc<ExecutionContext<B, D>>> {
        self.context
            .clone()
            .ok_or_else(|| RegistrationError::runtime("pipeline is not bound"))
    }

    fn load_inputs(&mut self, context: &ExecutionContext<B, D>) -> Result<()> {
        let pending = self
            .pending
            .take()
            .ok_or_else(|| RegistrationError::runtime("pipeline inputs already consumed"))?;
        let configuration = context.configuration();
        let loader = pending.loader.as_ref();

        let fixed = images_or_load(pending.fixed_images, loader, configuration.indexed_arguments("f"))?;
        let moving = images_or_load(pending.moving_images, loader, configuration.indexed_arguments("m"))?;
        if fixed.is_empty() {
            return Err(RegistrationError::image("no fixed image supplied"));
        }
        if moving.is_empty() {
            return Err(RegistrationError::image("no moving image supplied"));
        }
        let mask_arg = |flag: &str| configuration.command_line_argument(flag).map(PathBuf::from);
        let fixed_masks = images_or_load(pending.fixed_masks, loader, mask_arg("-fMask").into_iter().collect())?;
        let moving_masks = images_or_load(pending.moving_masks, loader, mask_arg("-mMask").into_iter().collect())?;

        tracing::info!(
            fixed = fixed.len(),
            moving = moving.len(),
            fixed_masks = fixed_masks.len(),
            moving_masks = moving_masks.len(),
            "input images ready"
        );
        context.set_fixed_images(fixed);
        context.set_moving_images(moving);
        context.set_fixed_masks(fixed_masks);
        context.set_moving_masks(moving_masks);
        Ok(())
    }

    /// `BeforeAll`: every component checks its configuration. All refusals
    /// are collected and reported together.
    fn validate(&self, context: &ExecutionContext<B, D>) -> Result<()> {
        let mut failures = Vec::new();
        if let Err(error) = context.configuration().before_all() {
            failures.push(ComponentFailure::new("Configuration", error));
        }
        for category in Category::FAN_OUT_ORDER {
            context.components().visit(category, |component| {
                if let Err(error) = component.before_all() {
                    let label = component
                        .label()
                        .map(|l| l.to_string())
                        .unwrap_or_else(|| component.name().to_string());
                    tracing::error!(component = component.name(), %label, %error, "configuration rejected");
                    failures.push(ComponentFailure::new(label, error));
                }
                Ok(())
            })?;
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(RegistrationError::Validation(failures))
        }
    }

    /// Deliver `hook` to the configuration and then to every component,
    /// stopping at the first error.
    fn fan_out(&self, context: &ExecutionContext<B, D>, hook: Hook) -> Result<()> {
        match hook {
            Hook::BeforeAll => return self.validate(context),
            Hook::BeforeRegistration => context.configuration().before_registration()?,
            Hook::BeforeEachResolution => context
                .configuration()
                .before_each_resolution(context.resolution().level)?,
            _ => {}
        }
        for category in Category::FAN_OUT_ORDER {
            context.components().visit(category, |component| {
                let result = match hook {
                    Hook::BeforeAll => Ok(()),
                    Hook::BeforeRegistration => component.before_registration(),
                    Hook::BeforeEachResolution => component.before_each_resolution(),
                    Hook::AfterEachIteration => component.after_each_iteration(),
                    Hook::AfterEachResolution => component.after_each_resolution(),
                    Hook::AfterRegistration => component.after_registration(),
                };
                result.inspect_err(|err| {
                    tracing::error!(
                        %hook,
                        component = component.name(),
                        label = %component.label().map(|l| l.to_string()).unwrap_or_default(),
                        error = %err,
                        "component hook failed"
                    );
                })
            })?;
        }
        Ok(())
    }

    fn build_record(&self, context: &ExecutionContext<B, D>) -> Result<TransformParameterRecord> {
        let mut record = TransformParameterRecord::new();
        let components = context.components();
        push_block::<B, D, _>(&mut record, Category::Transform, components.transforms.first())?;
        push_block::<B, D, _>(
            &mut record,
            Category::ResampleInterpolator,
            components.resample_interpolators.first(),
        )?;
        push_block::<B, D, _>(&mut record, Category::Resampler, components.resamplers.first())?;
        Ok(record)
    }

    fn write_record(&self, context: &ExecutionContext<B, D>, file_name: PathBuf) -> Result<()> {
        if let Some(directory) = context.output_directory() {
            self.build_record(context)?.write_atomic(&directory.join(file_name))?;
        }
        Ok(())
    }

    fn snapshot(&self, context: &ExecutionContext<B, D>) -> Result<TransformSnapshot> {
        let transform = context.transform(0)?;
        let transform = transform.try_borrow().map_err(|_| busy(Category::Transform))?;
        Ok(TransformSnapshot::from_transform(transform.transform()))
    }

    fn unbind_all(&self, context: &ExecutionContext<B, D>) -> Result<()> {
        for category in Category::FAN_OUT_ORDER {
            context.components().visit(category, |component| {
                component.unbind();
                Ok(())
            })?;
        }
        Ok(())
    }
}

fn push_block<B, const D: usize, T>(
    record: &mut TransformParameterRecord,
    category: Category,
    slot: Option<&Shared<T>>,
) -> Result<()>
where
    B: Backend,
    T: RegistrationComponent<B, D> + ?Sized,
{
    let Some(slot) = slot else {
        return Ok(());
    };
    let component = slot.try_borrow().map_err(|_| busy(category))?;
    let mut parameters = ParameterMap::new();
    component.write_parameters(&mut parameters)?;
    record.push_block(category, component.name(), parameters);
    Ok(())
}

fn images_or_load<const D: usize>(
    supplied: Vec<RawImage>,
    loader: &dyn ImageLoader,
    paths: Vec<PathBuf>,
) -> Result<Vec<ImageBuffer<D>>> {
    let raw = if supplied.is_empty() {
        paths
            .iter()
            .map(|path| {
                tracing::info!(path = %path.display(), "loading image");
                loader.load(path)
            })
            .collect::<regkit_core::Result<Vec<_>>>()?
    } else {
        supplied
    };
    Ok(raw
        .into_iter()
        .map(RawImage::into_buffer::<D>)
        .collect::<regkit_core::Result<Vec<_>>>()?)
}

impl<B: Backend, const D: usize> PipelineRunner for Pipeline<B, D> {
    fn dimension(&self) -> usize {
        D
    }

    fn install(
        &mut self,
        category: Category,
        components: Vec<AnyComponent>,
    ) -> std::result::Result<(), CategoryFailure> {
        let slots = self
            .slots
            .as_mut()
            .ok_or_else(|| CategoryFailure::new(category.key(), "pipeline is already bound"))?;
        let mut typed = Vec::with_capacity(components.len());
        for (index, component) in components.into_iter().enumerate() {
            let component = component.downcast::<Component<B, D>>().map_err(|_| {
                CategoryFailure::new(
                    category.key(),
                    format!("entry {index} was not built for this pipeline's signature"),
                )
            })?;
            if component.category() != category {
                let name = component
                    .name()
                    .map_err(|err| CategoryFailure::new(category.key(), err.to_string()))?;
                return Err(CategoryFailure::new(
                    category.key(),
                    format!("entry {index} (\"{name}\") is a {} component", component.category()),
                ));
            }
            typed.push(*component);
        }
        for component in typed {
            slots.push(component);
        }
        Ok(())
    }

    fn bind(&mut self, inputs: PipelineInputs) -> Result<()> {
        let slots = self
            .slots
            .take()
            .ok_or_else(|| RegistrationError::runtime("pipeline is already bound"))?;
        let mut context =
            ExecutionContext::new(inputs.configuration, inputs.signature, slots, self.device.clone());
        if let Some(writer) = inputs.writer {
            context = context.with_writer(writer);
        }
        if let Some(initial) = inputs.initial_transform {
            context = context.with_initial_transform(initial);
        }
        let context = Rc::new(context);
        for category in Category::FAN_OUT_ORDER {
            let mut index = 0;
            context.components().visit(category, |component| {
                component.set_label(ComponentLabel::new(category, index));
                component.bind_context(&context);
                index += 1;
                Ok(())
            })?;
        }
        self.pending = Some(PendingImages {
            loader: inputs.loader,
            fixed_images: inputs.fixed_images,
            moving_images: inputs.moving_images,
            fixed_masks: inputs.fixed_masks,
            moving_masks: inputs.moving_masks,
        });
        self.context = Some(context);
        Ok(())
    }

    fn run(&mut self, state: &mut StateMachine) -> Result<RunResult> {
        let context = self.bound_context()?;
        let started = Instant::now();
        self.fan_out(&context, Hook::BeforeAll)?;

        let elastix_level = context.configuration().elastix_level();
        let configuration = context.configuration();
        let write_each_iteration = configuration.read_flag("WriteTransformParametersEachIteration", None, false)?;
        let write_each_resolution = configuration.read_flag("WriteTransformParametersEachResolution", None, false)?;

        self.load_inputs(&context)?;
        self.fan_out(&context, Hook::BeforeRegistration)?;

        let registration = context.registration(0)?;
        let mut resolution_timer = Instant::now();
        let mut iteration_timer = Instant::now();
        loop {
            let event = registration
                .try_borrow_mut()
                .map_err(|_| busy(Category::Registration))?
                .advance()?;
            match event {
                RegistrationEvent::ResolutionStart { level } => {
                    context.set_resolution(ResolutionState { level, iteration: 0 });
                    state.transition(RunState::Running { level, iteration: 0 })?;
                    {
                        let path = context
                            .output_directory()
                            .map(|dir| dir.join(iteration_info_file_name(elastix_level, level)));
                        let mut log = context.iteration_log();
                        log.open(path.as_deref())?;
                        log.set("1:ItNr", "");
                    }
                    self.fan_out(&context, Hook::BeforeEachResolution)?;
                    resolution_timer = Instant::now();
                    iteration_timer = Instant::now();
                }
                RegistrationEvent::Iteration => {
                    self.fan_out(&context, Hook::AfterEachIteration)?;
                    let ResolutionState { level, iteration } = context.resolution();
                    {
                        let mut log = context.iteration_log();
                        log.set("1:ItNr", iteration);
                        log.set(
                            "Time[ms]",
                            format!("{:.1}", iteration_timer.elapsed().as_secs_f64() * 1000.0),
                        );
                        log.write_row()?;
                    }
                    if write_each_iteration {
                        self.write_record(
                            &context,
                            transform_parameter_file_name(elastix_level, Some(level), Some(iteration)),
                        )?;
                    }
                    let next = ResolutionState { level, iteration: iteration + 1 };
                    context.set_resolution(next);
                    state.transition(RunState::Running { level, iteration: next.iteration })?;
                    iteration_timer = Instant::now();
                }
                RegistrationEvent::ResolutionEnd => {
                    self.fan_out(&context, Hook::AfterEachResolution)?;
                    let ResolutionState { level, iteration } = context.resolution();
                    context.iteration_log().close()?;
                    tracing::info!(
                        level,
                        iterations = iteration,
                        elapsed_ms = resolution_timer.elapsed().as_millis() as u64,
                        "resolution finished"
                    );
                    if write_each_resolution {
                        self.write_record(
                            &context,
                            transform_parameter_file_name(elastix_level, Some(level), None),
                        )?;
                    }
                }
                RegistrationEvent::RegistrationEnd => break,
            }
        }

        state.transition(RunState::Finalizing)?;
        let final_transform = self.snapshot(&context)?;
        self.fan_out(&context, Hook::AfterRegistration)?;
        let record = self.build_record(&context)?;
        if let Some(directory) = context.output_directory() {
            record.write_atomic(&directory.join(transform_parameter_file_name(elastix_level, None, None)))?;
        }
        self.unbind_all(&context)?;
        tracing::info!(
            transform = %final_transform.name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "registration finished"
        );
        drop(context);
        self.context = None;

        Ok(RunResult {
            final_transform,
            transform_parameters: record.to_parameter_map(),
            record,
            error_code: 0,
        })
    }
}

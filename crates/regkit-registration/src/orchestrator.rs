//! Registration orchestrator.
//!
//! Resolves the type signature of a run, creates the matching pipeline and
//! its components through the registry, binds them and runs the
//! registration. Every failure ends in [`RunState::Failed`] with a non-zero
//! code; nothing escapes [`Orchestrator::run`], panics included.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use regkit_core::io::{ImageLoader, ImageWriter, InMemoryImageStore, RawImage};
use regkit_core::{ParameterMap, PixelType, TypeSignature};

use crate::assembler::{ComponentAssembler, ComponentCategoryConfig};
use crate::component::Category;
use crate::configuration::Configuration;
use crate::error::{RegistrationError, Result};
use crate::pipeline::{PipelineInputs, PipelineRunner, RunResult, TransformSnapshot, PIPELINE_FAMILY};
use crate::registry::{self, ComponentRegistry, SignatureIndex};
use crate::state::{RunState, StateMachine};

/// Which image a dimension or pixel type is being resolved for.
#[derive(Debug, Clone, Copy)]
enum Side {
    Fixed,
    Moving,
}

impl Side {
    fn prefix(self) -> &'static str {
        match self {
            Side::Fixed => "Fixed",
            Side::Moving => "Moving",
        }
    }

    fn flag(self) -> &'static str {
        match self {
            Side::Fixed => "-f0",
            Side::Moving => "-m0",
        }
    }
}

/// Drives one registration run.
pub struct Orchestrator<'r> {
    registry: &'r ComponentRegistry,
    configuration: Configuration,
    loader: Arc<dyn ImageLoader>,
    writer: Option<Arc<dyn ImageWriter>>,
    fixed_dimension: Option<usize>,
    moving_dimension: Option<usize>,
    fixed_images: Vec<RawImage>,
    moving_images: Vec<RawImage>,
    fixed_masks: Vec<RawImage>,
    moving_masks: Vec<RawImage>,
    initial_transform: Option<TransformSnapshot>,
    state: StateMachine,
    signature: Option<TypeSignature>,
    index: Option<SignatureIndex>,
    result: Option<RunResult>,
    last_error: Option<String>,
}

impl Orchestrator<'static> {
    /// Orchestrator over the process-wide registry.
    pub fn new(configuration: Configuration) -> Self {
        Self::with_registry(registry::global(), configuration)
    }
}

impl<'r> Orchestrator<'r> {
    pub fn with_registry(registry: &'r ComponentRegistry, configuration: Configuration) -> Self {
        Self {
            registry,
            configuration,
            loader: Arc::new(InMemoryImageStore::new()),
            writer: None,
            fixed_dimension: None,
            moving_dimension: None,
            fixed_images: Vec::new(),
            moving_images: Vec::new(),
            fixed_masks: Vec::new(),
            moving_masks: Vec::new(),
            initial_transform: None,
            state: StateMachine::new(),
            signature: None,
            index: None,
            result: None,
            last_error: None,
        }
    }

    pub fn with_loader(mut self, loader: Arc<dyn ImageLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_writer(mut self, writer: Arc<dyn ImageWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Start from `transform`: the transform being optimised is composed
    /// after it, as with a `-t0` transform-parameter file.
    pub fn with_initial_transform(mut self, transform: TransformSnapshot) -> Self {
        self.initial_transform = Some(transform);
        self
    }

    pub fn set_fixed_dimension(&mut self, dimension: usize) {
        self.fixed_dimension = Some(dimension);
    }

    pub fn set_moving_dimension(&mut self, dimension: usize) {
        self.moving_dimension = Some(dimension);
    }

    pub fn add_fixed_image(&mut self, image: RawImage) {
        self.fixed_images.push(image);
    }

    pub fn add_moving_image(&mut self, image: RawImage) {
        self.moving_images.push(image);
    }

    pub fn add_fixed_mask(&mut self, mask: RawImage) {
        self.fixed_masks.push(mask);
    }

    pub fn add_moving_mask(&mut self, mask: RawImage) {
        self.moving_masks.push(mask);
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn state(&self) -> RunState {
        self.state.current()
    }

    pub fn history(&self) -> &[RunState] {
        self.state.history()
    }

    pub fn type_signature(&self) -> Option<TypeSignature> {
        self.signature
    }

    pub fn signature_index(&self) -> Option<SignatureIndex> {
        self.index
    }

    pub fn result(&self) -> Option<&RunResult> {
        self.result.as_ref()
    }

    pub fn final_transform(&self) -> Option<&TransformSnapshot> {
        self.result.as_ref().map(|r| &r.final_transform)
    }

    pub fn transform_parameters(&self) -> Option<&ParameterMap> {
        self.result.as_ref().map(|r| &r.transform_parameters)
    }

    /// Message of the error that failed the last run.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Run the registration. Returns 0 on success, otherwise the code of
    /// the error kind that stopped the run.
    pub fn run(&mut self) -> i32 {
        if self.state.current() != RunState::Uninitialized {
            return self.fail(RegistrationError::runtime("orchestrator has already run"));
        }
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.try_run()));
        match outcome {
            Ok(Ok(result)) => match self.state.transition(RunState::Done) {
                Ok(()) => {
                    self.result = Some(result);
                    0
                }
                Err(err) => self.fail(err),
            },
            Ok(Err(err)) => self.fail(err),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic with non-string payload".to_string());
                self.fail(RegistrationError::UnknownFatal(message))
            }
        }
    }

    fn fail(&mut self, err: RegistrationError) -> i32 {
        let code = err.error_code();
        tracing::error!(state = %self.state.current(), code, error = %err, "registration failed");
        self.state.fail();
        self.last_error = Some(err.to_string());
        code
    }

    fn try_run(&mut self) -> Result<RunResult> {
        self.configure_threads();

        let signature = self.resolve_signature()?;
        let index = self.registry.index_for(&signature).ok_or_else(|| {
            RegistrationError::signature(format!("no pipeline is compiled for {signature}"))
        })?;
        self.signature = Some(signature);
        self.index = Some(index);
        self.state.transition(RunState::SignatureResolved)?;
        tracing::info!(%signature, index = index.get(), "type signature resolved");

        let mut pipeline = self.create_pipeline(index)?;
        self.assemble(pipeline.as_mut(), index)?;
        self.state.transition(RunState::Assembled)?;

        let initial_transform = self.initial_transform()?;

        pipeline.bind(PipelineInputs {
            configuration: Rc::new(self.configuration.clone()),
            signature,
            initial_transform,
            loader: Arc::clone(&self.loader),
            writer: self.writer.clone(),
            fixed_images: std::mem::take(&mut self.fixed_images),
            moving_images: std::mem::take(&mut self.moving_images),
            fixed_masks: std::mem::take(&mut self.fixed_masks),
            moving_masks: std::mem::take(&mut self.moving_masks),
        })?;
        self.state.transition(RunState::Bound)?;

        pipeline.run(&mut self.state)
    }

    /// The supplied initial transform, else the one read from the `-t0`
    /// transform-parameter file.
    fn initial_transform(&mut self) -> Result<Option<TransformSnapshot>> {
        if let Some(snapshot) = self.initial_transform.take() {
            return Ok(Some(snapshot));
        }
        let Some(path) = self.configuration.command_line_argument("-t0") else {
            return Ok(None);
        };
        let snapshot = TransformSnapshot::from_file(Path::new(path))?;
        tracing::info!(path, transform = %snapshot.name, "initial transform loaded");
        Ok(Some(snapshot))
    }

    fn configure_threads(&self) {
        let Some(raw) = self.configuration.command_line_argument("-threads") else {
            return;
        };
        match raw.parse::<usize>() {
            Ok(threads) => {
                if let Err(err) = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global() {
                    tracing::warn!(threads, error = %err, "could not configure the worker pool");
                }
            }
            Err(_) => tracing::warn!(value = raw, "ignoring invalid -threads argument"),
        }
    }

    fn resolve_signature(&self) -> Result<TypeSignature> {
        let mut problems = Vec::new();
        let fixed_pixel = self.resolve_pixel_type(Side::Fixed, &mut problems);
        let moving_pixel = self.resolve_pixel_type(Side::Moving, &mut problems);
        let fixed_dimension = self.resolve_dimension(Side::Fixed, &mut problems);
        let moving_dimension = self.resolve_dimension(Side::Moving, &mut problems);
        match (fixed_pixel, fixed_dimension, moving_pixel, moving_dimension) {
            (Some(fp), Some(fd), Some(mp), Some(md)) if problems.is_empty() => {
                Ok(TypeSignature::new(fp, fd, mp, md))
            }
            _ => Err(RegistrationError::signature(problems.join("; "))),
        }
    }

    fn resolve_pixel_type(&self, side: Side, problems: &mut Vec<String>) -> Option<PixelType> {
        let key = format!("{}InternalImagePixelType", side.prefix());
        match self.configuration.parameters().get_as::<PixelType>(&key, 0) {
            Ok(value) => Some(value.unwrap_or(PixelType::Float)),
            Err(err) => {
                problems.push(err.to_string());
                None
            }
        }
    }

    /// Dimension from, in order: an explicit setting, a supplied image, the
    /// header of the first image file. A `<Side>ImageDimension` parameter
    /// must agree with it, and is used alone only when there is no image.
    fn resolve_dimension(&self, side: Side, problems: &mut Vec<String>) -> Option<usize> {
        let key = format!("{}ImageDimension", side.prefix());
        let parameter = match self.configuration.parameters().get_as::<usize>(&key, 0) {
            Ok(value) => value,
            Err(err) => {
                problems.push(err.to_string());
                None
            }
        };
        let (explicit, images) = match side {
            Side::Fixed => (self.fixed_dimension, &self.fixed_images),
            Side::Moving => (self.moving_dimension, &self.moving_images),
        };
        let discovered = explicit
            .or_else(|| images.first().map(|image| image.header.dimension))
            .or_else(|| {
                let path = self.configuration.command_line_argument(side.flag())?;
                match self.loader.read_header(Path::new(path)) {
                    Ok(header) => Some(header.dimension),
                    Err(err) => {
                        problems.push(err.to_string());
                        None
                    }
                }
            });
        let dimension = match (discovered, parameter) {
            (Some(found), Some(declared)) if found != declared => {
                problems.push(format!(
                    "{key} is {declared} but the {} image has dimension {found}",
                    side.prefix().to_lowercase()
                ));
                return None;
            }
            (Some(found), _) => found,
            (None, Some(declared)) => declared,
            (None, None) => {
                problems.push(format!("{} image dimension is unknown", side.prefix()));
                return None;
            }
        };
        if dimension == 0 {
            problems.push(format!("{} image dimension must be positive", side.prefix()));
            return None;
        }
        Some(dimension)
    }

    fn create_pipeline(&self, index: SignatureIndex) -> Result<Box<dyn PipelineRunner>> {
        let not_found = || RegistrationError::ComponentNotFound {
            family: PIPELINE_FAMILY.to_string(),
            index: index.get(),
        };
        let created = self.registry.create(PIPELINE_FAMILY, index).ok_or_else(not_found)?;
        created
            .downcast::<Box<dyn PipelineRunner>>()
            .map(|boxed| *boxed)
            .map_err(|_| not_found())
    }

    /// Create every category in creation order. All category failures are
    /// collected before the run is refused.
    fn assemble(&self, pipeline: &mut dyn PipelineRunner, index: SignatureIndex) -> Result<()> {
        let assembler = ComponentAssembler::new(self.registry, &self.configuration, index);
        let mut failures = Vec::new();
        for category in Category::CREATION_ORDER {
            let (components, failure) = assembler.create(&ComponentCategoryConfig::from(category));
            if let Some(failure) = failure {
                failures.push(failure);
                continue;
            }
            let count = components.len();
            match pipeline.install(category, components) {
                Ok(()) => tracing::info!(category = %category, count, "category assembled"),
                Err(failure) => failures.push(failure),
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(RegistrationError::CategoryAssembly(failures))
        }
    }
}

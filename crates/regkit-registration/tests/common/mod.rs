//! Shared fixtures: a recording component that can stand in for every
//! category, and small synthetic images.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use burn_ndarray::NdArray;
use regkit_core::interpolation::{Interpolator, LinearInterpolator};
use regkit_core::io::RawImage;
use regkit_core::transform::{Transform, TranslationTransform};
use regkit_core::{Geometry, ImageBuffer, ParameterMap, PixelType};
use regkit_registration::builtin::{factory, install_for};
use regkit_registration::component::{
    Category, Component, ComponentBase, CostFunction, ImagePyramidComponent, ImageSample,
    ImageSamplerComponent, InterpolatorComponent, MetricComponent, OptimizerComponent,
    RegistrationComponent, RegistrationMethod, ResamplerComponent, StepOutcome, TransformComponent,
};
use regkit_registration::error::{RegistrationError, Result};
use regkit_registration::registry::{ComponentRegistry, SignatureIndex};
use regkit_registration::RegistrationEvent;

pub type B = NdArray<f32>;

pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Component that records every hook it receives as `"<hook> <label>"`.
pub struct Recorder {
    base: ComponentBase<B, 2>,
    log: EventLog,
    transform: TranslationTransform<2>,
    script: VecDeque<RegistrationEvent>,
    fail_at_level: Option<usize>,
}

impl Recorder {
    pub fn new(log: EventLog) -> Self {
        Self {
            base: ComponentBase::default(),
            log,
            transform: TranslationTransform::identity(),
            script: VecDeque::new(),
            fail_at_level: None,
        }
    }

    /// A registration method that replays `events`, then ends.
    pub fn scripted(log: EventLog, events: &[RegistrationEvent]) -> Self {
        let mut recorder = Self::new(log);
        recorder.script = events.iter().copied().collect();
        recorder
    }

    /// A component whose `after_each_iteration` fails at `level`, after
    /// recording the call.
    pub fn failing_at(log: EventLog, level: usize) -> Self {
        let mut recorder = Self::new(log);
        recorder.fail_at_level = Some(level);
        recorder
    }

    fn record(&self, hook: &str) {
        let label = self.label().map(|l| l.to_string()).unwrap_or_default();
        self.log.lock().unwrap().push(format!("{hook} {label}"));
    }
}

impl RegistrationComponent<B, 2> for Recorder {
    fn name(&self) -> &'static str {
        "Recorder"
    }

    fn base(&self) -> &ComponentBase<B, 2> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase<B, 2> {
        &mut self.base
    }

    fn before_all(&mut self) -> Result<()> {
        self.record("BeforeAll");
        Ok(())
    }

    fn before_registration(&mut self) -> Result<()> {
        self.record("BeforeRegistration");
        Ok(())
    }

    fn before_each_resolution(&mut self) -> Result<()> {
        let iteration = self.context()?.resolution().iteration;
        self.record(&format!("BeforeEachResolution(it={iteration})"));
        Ok(())
    }

    fn after_each_iteration(&mut self) -> Result<()> {
        let resolution = self.context()?.resolution();
        self.record(&format!("AfterEachIteration(it={})", resolution.iteration));
        if self.fail_at_level == Some(resolution.level) {
            return Err(RegistrationError::runtime(format!(
                "recorder failed at level {}",
                resolution.level
            )));
        }
        Ok(())
    }

    fn after_each_resolution(&mut self) -> Result<()> {
        self.record("AfterEachResolution");
        Ok(())
    }

    fn after_registration(&mut self) -> Result<()> {
        self.record("AfterRegistration");
        Ok(())
    }

    fn write_parameters(&self, parameters: &mut ParameterMap) -> Result<()> {
        let label = self.label().map(|l| l.to_string()).unwrap_or_default();
        parameters.set(format!("{label}Recorder"), ["true"]);
        Ok(())
    }
}

impl RegistrationMethod<B, 2> for Recorder {
    fn advance(&mut self) -> Result<RegistrationEvent> {
        Ok(self.script.pop_front().unwrap_or(RegistrationEvent::RegistrationEnd))
    }

    fn number_of_resolutions(&self) -> usize {
        1
    }
}

impl ImagePyramidComponent<B, 2> for Recorder {
    fn number_of_levels(&self) -> usize {
        0
    }

    fn level(&self, _level: usize) -> Option<Rc<ImageBuffer<2>>> {
        None
    }
}

impl ImageSamplerComponent<B, 2> for Recorder {
    fn samples(&self) -> &[ImageSample<2>] {
        &[]
    }
}

impl InterpolatorComponent<B, 2> for Recorder {
    fn interpolator(&self) -> &dyn Interpolator<2> {
        &LinearInterpolator
    }
}

impl MetricComponent<B, 2> for Recorder {
    fn value(&mut self, _parameters: &[f64]) -> Result<f64> {
        Ok(0.0)
    }

    fn value_and_derivative(&mut self, parameters: &[f64]) -> Result<(f64, Vec<f64>)> {
        Ok((0.0, vec![0.0; parameters.len()]))
    }
}

impl OptimizerComponent<B, 2> for Recorder {
    fn start(&mut self, _initial: Vec<f64>) -> Result<()> {
        Ok(())
    }

    fn step(&mut self, _cost: &mut dyn CostFunction) -> Result<StepOutcome> {
        Ok(StepOutcome::Stopped("recorder".into()))
    }

    fn current_position(&self) -> &[f64] {
        &[]
    }

    fn current_value(&self) -> f64 {
        0.0
    }
}

impl ResamplerComponent<B, 2> for Recorder {
    fn resample(&self) -> Result<ImageBuffer<2>> {
        Err(RegistrationError::runtime("recorder does not resample"))
    }
}

impl TransformComponent<B, 2> for Recorder {
    fn transform(&self) -> &dyn Transform<2> {
        &self.transform
    }

    fn transform_mut(&mut self) -> &mut dyn Transform<2> {
        &mut self.transform
    }
}

fn shared(recorder: Recorder) -> Rc<RefCell<Recorder>> {
    Rc::new(RefCell::new(recorder))
}

/// Wrap a recorder into the component variant of `category`.
pub fn recorder_component(category: Category, recorder: Recorder) -> Component<B, 2> {
    let recorder = shared(recorder);
    match category {
        Category::Registration => Component::Registration(recorder),
        Category::FixedImagePyramid => Component::FixedImagePyramid(recorder),
        Category::MovingImagePyramid => Component::MovingImagePyramid(recorder),
        Category::ImageSampler => Component::ImageSampler(recorder),
        Category::Interpolator => Component::Interpolator(recorder),
        Category::Metric => Component::Metric(recorder),
        Category::Optimizer => Component::Optimizer(recorder),
        Category::ResampleInterpolator => Component::ResampleInterpolator(recorder),
        Category::Resampler => Component::Resampler(recorder),
        Category::Transform => Component::Transform(recorder),
    }
}

/// Registry with the built-in `float` 2-D families plus `Recorder<Category>`
/// families whose instances append to `log`. The registration recorder
/// replays `script`. `FailingRecorderMetric` fails in `after_each_iteration`
/// at level 1.
pub fn recording_registry(log: &EventLog, script: &[RegistrationEvent]) -> (ComponentRegistry, SignatureIndex) {
    let mut registry = ComponentRegistry::new();
    let index = install_for::<B, 2>(&mut registry, PixelType::Float);
    for category in Category::CREATION_ORDER {
        let log = Arc::clone(log);
        let script = script.to_vec();
        registry.register(
            format!("Recorder{}", category.key()),
            index,
            Arc::new(move || {
                let recorder = if category == Category::Registration {
                    Recorder::scripted(Arc::clone(&log), &script)
                } else {
                    Recorder::new(Arc::clone(&log))
                };
                Some(Box::new(recorder_component(category, recorder)) as Box<dyn std::any::Any>)
            }),
        );
    }
    let failing_log = Arc::clone(log);
    registry.register(
        "FailingRecorderMetric",
        index,
        Arc::new(move || {
            let recorder = Recorder::failing_at(Arc::clone(&failing_log), 1);
            Some(Box::new(recorder_component(Category::Metric, recorder)) as Box<dyn std::any::Any>)
        }),
    );
    // keeps `factory` exercised from the public API
    registry.register(
        "UnusedRecorder",
        index,
        factory::<B, 2>(|| Component::Transform(shared(Recorder::new(Arc::default())))),
    );
    (registry, index)
}

/// Parameter text naming a recorder for every category, two metrics.
pub fn recording_parameters() -> ParameterMap {
    let mut parameters = ParameterMap::new();
    for category in Category::CREATION_ORDER {
        let name = format!("Recorder{}", category.key());
        if category == Category::Metric {
            parameters.set(category.key(), [name.clone(), name]);
        } else {
            parameters.set(category.key(), [name]);
        }
    }
    parameters
}

/// Isotropic Gaussian blob of width `sigma` centred at `center`.
pub fn blob(size: [usize; 2], center: [f64; 2], sigma: f64) -> RawImage {
    let buffer = ImageBuffer::from_fn(Geometry::with_size(size), |p| {
        let dx = p[0] - center[0];
        let dy = p[1] - center[1];
        100.0 * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp()
    });
    RawImage::from_buffer(&buffer, PixelType::Float)
}

//! Gradient descent optimizers.
//!
//! `StandardGradientDescent` uses the decaying gain `a / (A + k + 1)^alpha`.
//! `RegularStepGradientDescent` takes steps of fixed length along the
//! normalized gradient and relaxes the length whenever the gradient changes
//! direction. Both stop after `MaximumNumberOfIterations` (read per level).

use burn::tensor::backend::Backend;

use super::{factory, shared};
use crate::component::{
    Component, ComponentBase, CostFunction, OptimizerComponent, RegistrationComponent, StepOutcome,
};
use crate::error::{RegistrationError, Result};
use crate::registry::{ComponentRegistry, SignatureIndex};

#[derive(Debug, Clone, PartialEq)]
pub enum GradientDescentKind {
    Standard {
        a: f64,
        big_a: f64,
        alpha: f64,
    },
    RegularStep {
        maximum_step: f64,
        minimum_step: f64,
        relaxation: f64,
        minimum_gradient: f64,
    },
}

impl GradientDescentKind {
    fn standard() -> Self {
        Self::Standard {
            a: 400.0,
            big_a: 50.0,
            alpha: 0.602,
        }
    }

    fn regular_step() -> Self {
        Self::RegularStep {
            maximum_step: 1.0,
            minimum_step: 0.01,
            relaxation: 0.5,
            minimum_gradient: 1e-8,
        }
    }
}

pub struct GradientDescent<B: Backend, const D: usize> {
    base: ComponentBase<B, D>,
    kind: GradientDescentKind,
    maximum_iterations: usize,
    iteration: usize,
    position: Vec<f64>,
    value: f64,
    step_length: f64,
    previous_gradient: Option<Vec<f64>>,
}

impl<B: Backend, const D: usize> GradientDescent<B, D> {
    pub fn new(kind: GradientDescentKind) -> Self {
        Self {
            base: ComponentBase::default(),
            kind,
            maximum_iterations: 500,
            iteration: 0,
            position: Vec::new(),
            value: f64::NAN,
            step_length: 0.0,
            previous_gradient: None,
        }
    }

    pub fn standard() -> Self {
        Self::new(GradientDescentKind::standard())
    }

    pub fn regular_step() -> Self {
        Self::new(GradientDescentKind::regular_step())
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn set_maximum_iterations(&mut self, iterations: usize) {
        self.maximum_iterations = iterations;
    }

    fn report(&self, gradient_norm: f64) {
        if let Ok(context) = self.context() {
            context.log_column("2:Metric", self.value);
            context.log_column("3:StepSize", self.step_length);
            context.log_column("4:||Gradient||", gradient_norm);
        }
    }
}

impl<B: Backend, const D: usize> RegistrationComponent<B, D> for GradientDescent<B, D> {
    fn name(&self) -> &'static str {
        match self.kind {
            GradientDescentKind::Standard { .. } => "StandardGradientDescent",
            GradientDescentKind::RegularStep { .. } => "RegularStepGradientDescent",
        }
    }

    fn base(&self) -> &ComponentBase<B, D> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase<B, D> {
        &mut self.base
    }

    fn before_each_resolution(&mut self) -> Result<()> {
        let context = self.context()?;
        let configuration = context.configuration();
        let level = context.resolution().level;
        let label = self.label();
        let label = label.as_ref();
        self.maximum_iterations =
            configuration.read_component_parameter_or("MaximumNumberOfIterations", label, level, 500)?;
        self.kind = match self.kind {
            GradientDescentKind::Standard { a, big_a, alpha } => GradientDescentKind::Standard {
                a: configuration.read_component_parameter_or("SP_a", label, level, a)?,
                big_a: configuration.read_component_parameter_or("SP_A", label, level, big_a)?,
                alpha: configuration.read_component_parameter_or("SP_alpha", label, level, alpha)?,
            },
            GradientDescentKind::RegularStep {
                maximum_step,
                minimum_step,
                relaxation,
                minimum_gradient,
            } => GradientDescentKind::RegularStep {
                maximum_step: configuration.read_component_parameter_or(
                    "MaximumStepLength",
                    label,
                    level,
                    maximum_step,
                )?,
                minimum_step: configuration.read_component_parameter_or(
                    "MinimumStepLength",
                    label,
                    level,
                    minimum_step,
                )?,
                relaxation: configuration.read_component_parameter_or(
                    "RelaxationFactor",
                    label,
                    level,
                    relaxation,
                )?,
                minimum_gradient: configuration.read_component_parameter_or(
                    "MinimumGradientMagnitude",
                    label,
                    level,
                    minimum_gradient,
                )?,
            },
        };
        tracing::debug!(optimizer = self.name(), level, maximum_iterations = self.maximum_iterations, "optimizer configured");
        Ok(())
    }
}

impl<B: Backend, const D: usize> OptimizerComponent<B, D> for GradientDescent<B, D> {
    fn start(&mut self, initial: Vec<f64>) -> Result<()> {
        self.position = initial;
        self.iteration = 0;
        self.value = f64::NAN;
        self.previous_gradient = None;
        self.step_length = match self.kind {
            GradientDescentKind::Standard { .. } => 0.0,
            GradientDescentKind::RegularStep { maximum_step, .. } => maximum_step,
        };
        Ok(())
    }

    fn step(&mut self, cost: &mut dyn CostFunction) -> Result<StepOutcome> {
        if self.iteration >= self.maximum_iterations {
            return Ok(StepOutcome::Stopped("maximum number of iterations reached".into()));
        }
        if cost.number_of_parameters() != self.position.len() {
            return Err(RegistrationError::runtime(format!(
                "optimizer holds {} parameters, cost function expects {}",
                self.position.len(),
                cost.number_of_parameters()
            )));
        }
        let (value, gradient) = cost.value_and_derivative(&self.position)?;
        let norm = gradient.iter().map(|g| g * g).sum::<f64>().sqrt();
        self.value = value;

        match self.kind {
            GradientDescentKind::Standard { a, big_a, alpha } => {
                self.step_length = a / (big_a + self.iteration as f64 + 1.0).powf(alpha);
                for (p, g) in self.position.iter_mut().zip(&gradient) {
                    *p -= self.step_length * g;
                }
            }
            GradientDescentKind::RegularStep {
                minimum_step,
                relaxation,
                minimum_gradient,
                ..
            } => {
                if norm < minimum_gradient {
                    self.report(norm);
                    return Ok(StepOutcome::Stopped("gradient magnitude tolerance reached".into()));
                }
                let reversed = self.previous_gradient.as_ref().is_some_and(|previous| {
                    previous.iter().zip(&gradient).map(|(a, b)| a * b).sum::<f64>() < 0.0
                });
                if reversed {
                    self.step_length *= relaxation;
                }
                if self.step_length < minimum_step {
                    self.report(norm);
                    return Ok(StepOutcome::Stopped("step length below minimum".into()));
                }
                for (p, g) in self.position.iter_mut().zip(&gradient) {
                    *p -= self.step_length * g / norm;
                }
                self.previous_gradient = Some(gradient);
            }
        }
        if !self.position.iter().all(|p| p.is_finite()) {
            return Err(RegistrationError::runtime("optimizer diverged: non-finite parameters"));
        }
        self.iteration += 1;
        self.report(norm);
        Ok(StepOutcome::Iterated)
    }

    fn current_position(&self) -> &[f64] {
        &self.position
    }

    fn current_value(&self) -> f64 {
        self.value
    }
}

pub(crate) fn register<B: Backend, const D: usize>(registry: &mut ComponentRegistry, index: SignatureIndex) {
    registry.register(
        "StandardGradientDescent",
        index,
        factory::<B, D>(|| Component::Optimizer(shared(GradientDescent::<B, D>::standard()))),
    );
    registry.register(
        "RegularStepGradientDescent",
        index,
        factory::<B, D>(|| Component::Optimizer(shared(GradientDescent::<B, D>::regular_step()))),
    );
}

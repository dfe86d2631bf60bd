//! Multi-resolution registration methods.
//!
//! The method is a stepper: each `advance()` performs at most one optimizer
//! iteration and reports what happened. The optimizer is (re)started from
//! the current transform parameters on the first advance after each
//! `ResolutionStart`, once every component has seen `before_each_resolution`.

use std::rc::Rc;

use burn::tensor::backend::Backend;

use super::{factory, shared};
use crate::component::{
    busy, Category, Component, ComponentBase, ComponentLabel, CostFunction, MetricComponent,
    OptimizerComponent, RegistrationComponent, RegistrationMethod, Shared, StepOutcome,
};
use crate::error::{RegistrationError, Result};
use crate::events::RegistrationEvent;
use crate::registry::{ComponentRegistry, SignatureIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    NotStarted,
    LevelStarted,
    Optimizing,
    LevelDone,
    Finished,
}

/// Weighted sum of metrics, as seen by the optimizer.
struct WeightedCost<B: Backend, const D: usize> {
    metrics: Vec<(Shared<dyn MetricComponent<B, D>>, f64)>,
    parameters: usize,
}

impl<B: Backend, const D: usize> CostFunction for WeightedCost<B, D> {
    fn number_of_parameters(&self) -> usize {
        self.parameters
    }

    fn value(&mut self, parameters: &[f64]) -> Result<f64> {
        let mut total = 0.0;
        for (metric, weight) in &self.metrics {
            let mut metric = metric.try_borrow_mut().map_err(|_| busy(Category::Metric))?;
            total += weight * metric.value(parameters)?;
        }
        Ok(total)
    }

    fn value_and_derivative(&mut self, parameters: &[f64]) -> Result<(f64, Vec<f64>)> {
        let mut total = 0.0;
        let mut derivative = vec![0.0; self.parameters];
        for (metric, weight) in &self.metrics {
            let mut metric = metric.try_borrow_mut().map_err(|_| busy(Category::Metric))?;
            let (value, gradient) = metric.value_and_derivative(parameters)?;
            total += weight * value;
            for (d, g) in derivative.iter_mut().zip(gradient) {
                *d += weight * g;
            }
        }
        Ok((total, derivative))
    }
}

pub struct MultiResolutionRegistration<B: Backend, const D: usize> {
    base: ComponentBase<B, D>,
    multi_metric: bool,
    levels: usize,
    level: usize,
    phase: Phase,
}

impl<B: Backend, const D: usize> MultiResolutionRegistration<B, D> {
    pub fn new(multi_metric: bool) -> Self {
        Self {
            base: ComponentBase::default(),
            multi_metric,
            levels: 1,
            level: 0,
            phase: Phase::NotStarted,
        }
    }

    fn cost(&self) -> Result<WeightedCost<B, D>> {
        let context = self.context()?;
        let components = context.components();
        let metrics = if self.multi_metric {
            components
                .metrics
                .iter()
                .enumerate()
                .map(|(index, metric)| -> Result<(Shared<dyn MetricComponent<B, D>>, f64)> {
                    let label = ComponentLabel::new(Category::Metric, index);
                    let weight = context.configuration().read_component_parameter_or(
                        "Weight",
                        Some(&label),
                        self.level,
                        1.0,
                    )?;
                    Ok((Rc::clone(metric), weight))
                })
                .collect::<Result<Vec<_>>>()?
        } else {
            vec![(context.metric(0)?, 1.0)]
        };
        let transform = context.transform(0)?;
        let parameters = transform
            .try_borrow()
            .map_err(|_| busy(Category::Transform))?
            .transform()
            .number_of_parameters();
        Ok(WeightedCost { metrics, parameters })
    }

    fn transform_parameters(&self) -> Result<Vec<f64>> {
        let context = self.context()?;
        let transform = context.transform(0)?;
        let parameters = transform
            .try_borrow()
            .map_err(|_| busy(Category::Transform))?
            .transform()
            .parameters();
        Ok(parameters)
    }

    fn set_transform_parameters(&self, parameters: &[f64]) -> Result<()> {
        let context = self.context()?;
        let transform = context.transform(0)?;
        let mut transform = transform.try_borrow_mut().map_err(|_| busy(Category::Transform))?;
        Ok(transform.transform_mut().set_parameters(parameters)?)
    }

    fn optimizer(&self) -> Result<Shared<dyn OptimizerComponent<B, D>>> {
        self.context()?.optimizer(0)
    }

    fn iterate(&mut self) -> Result<RegistrationEvent> {
        let mut cost = self.cost()?;
        let optimizer = self.optimizer()?;
        let mut optimizer = optimizer.try_borrow_mut().map_err(|_| busy(Category::Optimizer))?;
        let outcome = optimizer.step(&mut cost)?;
        match outcome {
            StepOutcome::Iterated => {
                let position = optimizer.current_position().to_vec();
                drop(optimizer);
                self.set_transform_parameters(&position)?;
                Ok(RegistrationEvent::Iteration)
            }
            StepOutcome::Stopped(reason) => {
                tracing::info!(
                    level = self.level,
                    value = optimizer.current_value(),
                    reason = %reason,
                    "optimizer stopped"
                );
                let position = optimizer.current_position().to_vec();
                drop(optimizer);
                self.set_transform_parameters(&position)?;
                self.phase = Phase::LevelDone;
                Ok(RegistrationEvent::ResolutionEnd)
            }
        }
    }
}

impl<B: Backend, const D: usize> RegistrationComponent<B, D> for MultiResolutionRegistration<B, D> {
    fn name(&self) -> &'static str {
        if self.multi_metric {
            "MultiMetricMultiResolutionRegistration"
        } else {
            "MultiResolutionRegistration"
        }
    }

    fn base(&self) -> &ComponentBase<B, D> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase<B, D> {
        &mut self.base
    }

    fn before_all(&mut self) -> Result<()> {
        let context = self.context()?;
        let levels: usize = context.configuration().read_parameter_or("NumberOfResolutions", 0, 3)?;
        if levels == 0 {
            return Err(RegistrationError::Parameter(regkit_core::CoreError::invalid_value(
                "NumberOfResolutions",
                0,
                "0",
                "at least one resolution is required",
            )));
        }
        if !self.multi_metric && context.components().metrics.len() > 1 {
            tracing::warn!(
                metrics = context.components().metrics.len(),
                "MultiResolutionRegistration uses only the first metric"
            );
        }
        self.levels = levels;
        Ok(())
    }

    fn before_registration(&mut self) -> Result<()> {
        self.level = 0;
        self.phase = Phase::NotStarted;
        Ok(())
    }
}

impl<B: Backend, const D: usize> RegistrationMethod<B, D> for MultiResolutionRegistration<B, D> {
    fn advance(&mut self) -> Result<RegistrationEvent> {
        match self.phase {
            Phase::NotStarted => {
                self.level = 0;
                self.phase = Phase::LevelStarted;
                Ok(RegistrationEvent::ResolutionStart { level: 0 })
            }
            Phase::LevelStarted => {
                let initial = self.transform_parameters()?;
                self.optimizer()?
                    .try_borrow_mut()
                    .map_err(|_| busy(Category::Optimizer))?
                    .start(initial)?;
                self.phase = Phase::Optimizing;
                self.iterate()
            }
            Phase::Optimizing => self.iterate(),
            Phase::LevelDone if self.level + 1 < self.levels => {
                self.level += 1;
                self.phase = Phase::LevelStarted;
                Ok(RegistrationEvent::ResolutionStart { level: self.level })
            }
            Phase::LevelDone | Phase::Finished => {
                self.phase = Phase::Finished;
                Ok(RegistrationEvent::RegistrationEnd)
            }
        }
    }

    fn number_of_resolutions(&self) -> usize {
        self.levels
    }
}

pub(crate) fn register<B: Backend, const D: usize>(registry: &mut ComponentRegistry, index: SignatureIndex) {
    registry.register(
        "MultiResolutionRegistration",
        index,
        factory::<B, D>(|| Component::Registration(shared(MultiResolutionRegistration::<B, D>::new(false)))),
    );
    registry.register(
        "MultiMetricMultiResolutionRegistration",
        index,
        factory::<B, D>(|| Component::Registration(shared(MultiResolutionRegistration::<B, D>::new(true)))),
    );
}

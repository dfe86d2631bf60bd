//! Similarity metrics.
//!
//! Both metrics evaluate the moving image at transformed fixed-image sample
//! positions through Interpolator[0] and use Transform[0], whose parameters
//! they set before every evaluation. Without an image sampler every voxel of
//! the current fixed level is a sample.

use std::rc::Rc;

use burn::tensor::backend::Backend;
use regkit_core::{ImageBuffer, Vector};

use super::sampler::{current_fixed_level, current_moving_level};
use super::{factory, shared};
use crate::component::{
    busy, Category, Component, ComponentBase, ImageSample, MetricComponent, RegistrationComponent,
};
use crate::error::{RegistrationError, Result};
use crate::registry::{ComponentRegistry, SignatureIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    MeanSquares,
    NormalizedCorrelation,
}

/// Per-sample moving value and derivative with respect to the parameters.
struct Evaluation {
    fixed: f64,
    moving: f64,
    derivative: Vec<f64>,
}

pub struct SimilarityMetric<B: Backend, const D: usize> {
    base: ComponentBase<B, D>,
    kind: MetricKind,
    required_ratio: f64,
    full_samples: Option<(usize, Rc<Vec<ImageSample<D>>>)>,
}

impl<B: Backend, const D: usize> SimilarityMetric<B, D> {
    pub fn new(kind: MetricKind) -> Self {
        Self {
            base: ComponentBase::default(),
            kind,
            required_ratio: 0.25,
            full_samples: None,
        }
    }

    fn full_samples(&mut self, fixed: &ImageBuffer<D>, level: usize) -> Rc<Vec<ImageSample<D>>> {
        if let Some((cached, samples)) = &self.full_samples {
            if *cached == level {
                return Rc::clone(samples);
            }
        }
        let geometry = fixed.geometry();
        let samples = Rc::new(
            fixed
                .values()
                .iter()
                .enumerate()
                .map(|(linear, &value)| ImageSample {
                    point: geometry.index_to_physical(&geometry.multi_index(linear)),
                    value,
                })
                .collect::<Vec<_>>(),
        );
        self.full_samples = Some((level, Rc::clone(&samples)));
        samples
    }

    /// Set the transform to `parameters` and evaluate every valid sample.
    fn evaluate(&mut self, parameters: &[f64]) -> Result<Vec<Evaluation>> {
        let context = self.context()?;
        let level = context.resolution().level;
        let fixed = current_fixed_level(&context, level)?;
        let moving = current_moving_level(&context, level)?;
        let moving_mask = context.moving_mask(0);

        let sampler = context.sampler(0);
        let sampler_guard = match &sampler {
            Some(sampler) => Some(sampler.try_borrow().map_err(|_| busy(Category::ImageSampler))?),
            None => None,
        };
        let fallback;
        let samples: &[ImageSample<D>] = match &sampler_guard {
            Some(guard) => guard.samples(),
            None => {
                fallback = self.full_samples(&fixed, level);
                fallback.as_slice()
            }
        };

        let interpolator = context.interpolator(0)?;
        let interpolator = interpolator.try_borrow().map_err(|_| busy(Category::Interpolator))?;
        let interpolator = interpolator.interpolator();
        let transform = context.transform(0)?;
        let mut transform = transform.try_borrow_mut().map_err(|_| busy(Category::Transform))?;
        transform.transform_mut().set_parameters(parameters)?;
        let transform = transform.transform();

        let mut evaluations = Vec::with_capacity(samples.len());
        for sample in samples {
            let mapped = transform.transform_point(&sample.point);
            if moving_mask.as_ref().is_some_and(|mask| !mask.is_inside_mask(&mapped)) {
                continue;
            }
            let Some((value, gradient)) = interpolator.evaluate_with_gradient(&moving, &mapped) else {
                continue;
            };
            let derivative = transform
                .jacobian(&sample.point)
                .iter()
                .map(|column: &Vector<D>| gradient.dot(column))
                .collect();
            evaluations.push(Evaluation {
                fixed: sample.value,
                moving: value,
                derivative,
            });
        }

        let total = samples.len();
        if total == 0 || (evaluations.len() as f64) < self.required_ratio * total as f64 {
            return Err(RegistrationError::runtime(format!(
                "too many samples map outside the moving image: {} of {total} valid",
                evaluations.len()
            )));
        }
        Ok(evaluations)
    }

    fn mean_squares(evaluations: &[Evaluation], parameters: usize) -> (f64, Vec<f64>) {
        let n = evaluations.len() as f64;
        let mut value = 0.0;
        let mut derivative = vec![0.0; parameters];
        for e in evaluations {
            let diff = e.moving - e.fixed;
            value += diff * diff;
            for (d, de) in derivative.iter_mut().zip(&e.derivative) {
                *d += 2.0 * diff * de;
            }
        }
        derivative.iter_mut().for_each(|d| *d /= n);
        (value / n, derivative)
    }

    /// Negated normalized correlation, so that lower is better.
    fn normalized_correlation(evaluations: &[Evaluation], parameters: usize) -> (f64, Vec<f64>) {
        let n = evaluations.len() as f64;
        let (mut sf, mut sm, mut sff, mut smm, mut sfm) = (0.0, 0.0, 0.0, 0.0, 0.0);
        let mut sdm = vec![0.0; parameters];
        let mut sfdm = vec![0.0; parameters];
        let mut smdm = vec![0.0; parameters];
        for e in evaluations {
            sf += e.fixed;
            sm += e.moving;
            sff += e.fixed * e.fixed;
            smm += e.moving * e.moving;
            sfm += e.fixed * e.moving;
            for (k, de) in e.derivative.iter().enumerate() {
                sdm[k] += de;
                sfdm[k] += e.fixed * de;
                smdm[k] += e.moving * de;
            }
        }
        let sfm_c = sfm - sf * sm / n;
        let sff_c = sff - sf * sf / n;
        let smm_c = smm - sm * sm / n;
        let denom = (sff_c * smm_c).sqrt();
        if denom.is_nan() || denom <= f64::EPSILON {
            return (0.0, vec![0.0; parameters]);
        }
        let value = -sfm_c / denom;
        let derivative = (0..parameters)
            .map(|k| {
                let dsfm = sfdm[k] - sf * sdm[k] / n;
                let dsmm = 2.0 * (smdm[k] - sm * sdm[k] / n);
                -dsfm / denom + sfm_c * sff_c * dsmm / (2.0 * denom.powi(3))
            })
            .collect();
        (value, derivative)
    }
}

impl<B: Backend, const D: usize> RegistrationComponent<B, D> for SimilarityMetric<B, D> {
    fn name(&self) -> &'static str {
        match self.kind {
            MetricKind::MeanSquares => "AdvancedMeanSquares",
            MetricKind::NormalizedCorrelation => "AdvancedNormalizedCorrelation",
        }
    }

    fn base(&self) -> &ComponentBase<B, D> {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ComponentBase<B, D> {
        &mut self.base
    }

    fn before_registration(&mut self) -> Result<()> {
        let context = self.context()?;
        let label = self.label();
        self.required_ratio = context.configuration().read_component_parameter_or(
            "RequiredRatioOfValidSamples",
            label.as_ref(),
            0,
            0.25,
        )?;
        Ok(())
    }

    fn before_each_resolution(&mut self) -> Result<()> {
        self.full_samples = None;
        Ok(())
    }
}

impl<B: Backend, const D: usize> MetricComponent<B, D> for SimilarityMetric<B, D> {
    fn value(&mut self, parameters: &[f64]) -> Result<f64> {
        self.value_and_derivative(parameters).map(|(value, _)| value)
    }

    fn value_and_derivative(&mut self, parameters: &[f64]) -> Result<(f64, Vec<f64>)> {
        let evaluations = self.evaluate(parameters)?;
        Ok(match self.kind {
            MetricKind::MeanSquares => Self::mean_squares(&evaluations, parameters.len()),
            MetricKind::NormalizedCorrelation => Self::normalized_correlation(&evaluations, parameters.len()),
        })
    }
}

pub(crate) fn register<B: Backend, const D: usize>(registry: &mut ComponentRegistry, index: SignatureIndex) {
    registry.register(
        "AdvancedMeanSquares",
        index,
        factory::<B, D>(|| Component::Metric(shared(SimilarityMetric::<B, D>::new(MetricKind::MeanSquares)))),
    );
    registry.register(
        "AdvancedNormalizedCorrelation",
        index,
        factory::<B, D>(|| {
            Component::Metric(shared(SimilarityMetric::<B, D>::new(MetricKind::NormalizedCorrelation)))
        }),
    );
}

#[cfg(test)]
mod tests {
    use burn_ndarray::NdArray;

    use super::*;

    type Metric = SimilarityMetric<NdArray<f32>, 2>;

    fn evaluations(pairs: &[(f64, f64)]) -> Vec<Evaluation> {
        pairs
            .iter()
            .map(|&(fixed, moving)| Evaluation {
                fixed,
                moving,
                derivative: vec![moving],
            })
            .collect()
    }

    #[test]
    fn test_mean_squares_of_identical_images_is_zero() {
        let (value, derivative) = Metric::mean_squares(&evaluations(&[(1.0, 1.0), (3.0, 3.0)]), 1);
        assert_eq!(value, 0.0);
        assert_eq!(derivative, vec![0.0]);
    }

    #[test]
    fn test_mean_squares_value() {
        let (value, _) = Metric::mean_squares(&evaluations(&[(0.0, 1.0), (0.0, 3.0)]), 1);
        assert!((value - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_correlation_of_linearly_related_images_is_minus_one() {
        let (value, _) =
            Metric::normalized_correlation(&evaluations(&[(1.0, 3.0), (2.0, 5.0), (4.0, 9.0)]), 1);
        assert!((value + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_correlation_derivative_matches_finite_difference() {
        // moving = fixed * p + offset, derivative dm/dp = fixed
        let fixed = [1.0, 2.0, 4.0, 7.0];
        let offsets = [0.3, -0.2, 0.5, 0.1];
        let value_at = |p: f64| {
            let evals: Vec<Evaluation> = fixed
                .iter()
                .zip(offsets)
                .map(|(&f, o)| Evaluation { fixed: f, moving: f * p + o * f * f, derivative: vec![f] })
                .collect();
            Metric::normalized_correlation(&evals, 1)
        };
        let h = 1e-6;
        let (_, analytic) = value_at(0.7);
        let numeric = (value_at(0.7 + h).0 - value_at(0.7 - h).0) / (2.0 * h);
        assert!((analytic[0] - numeric).abs() < 1e-5, "{} vs {}", analytic[0], numeric);
    }
}

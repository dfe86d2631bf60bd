//! Transform components.
//!
//! `TranslationTransform` and `AffineTransform` wrap the corresponding
//! `regkit_core` transforms. Both support `AutomaticTransformInitialization`,
//! which aligns the fixed and moving image centres (geometric centre or
//! centre of gravity) before the first resolution. An initial transform
//! supplied with the run is composed in front of the optimised one.

use burn::tensor::backend::Backend;
use regkit_core::statistics::ImageMomentsCalculator;
use regkit_core::transform::{AffineTransform, ChainedTransform, Transform, TranslationTransform};
use regkit_core::{ImageBuffer, ParameterMap, Vector};

use super::{factory, shared};
use crate::component::{Component, ComponentBase, RegistrationComponent, TransformComponent};
use crate::error::{RegistrationError, Result};
use crate::pipeline::NO_INITIAL_TRANSFORM;
use crate::registry::{ComponentRegistry, SignatureIndex};

/// How the initial translation is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitializationMethod {
    GeometricalCenter,
    CenterOfGravity,
}

impl std::str::FromStr for InitializationMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "GeometricalCenter" => Ok(Self::GeometricalCenter),
            "CenterOfGravity" => Ok(Self::CenterOfGravity),
            other => Err(format!("unknown initialization method \"{other}\"")),
        }
    }
}

/// `InitialTransformParametersFileName` of an initial transform handed over
/// in memory rather than read from a file.
pub const IN_MEMORY_INITIAL_TRANSFORM: &str = "InMemoryInitialTransform";

/// A transform component holding one parametric transform.
pub struct ParametricTransform<B: Backend, const D: usize> {
    base: ComponentBase<B, D>,
    transform: Box<dyn Transform<D>>,
}

impl<B: Backend, const D: usize> ParametricTransform<B, D> {
    pub fn new(transform: Box<dyn Transform<D>>) -> Self {
        Self {
            base: ComponentBase::default(),
            transform,
        }
    }

    pub fn translation() -> Self {
        Self::new(Box::new(TranslationTransform::<D>::identity()))
    }

    pub fn affine() -> Self {
        Self::new(Box::new(AffineTransform::<D>::identity()))
    }

    fn is_affine(&self) -> bool {
        self.transform.name() == "AffineTransform"
    }

    fn center(image: &ImageBuffer<D>, method: InitializationMethod) -> Result<Vector<D>> {
        match method {
            InitializationMethod::GeometricalCenter => Ok(image.geometry().center()),
            InitializationMethod::CenterOfGravity => Ok(ImageMomentsCalculator::<D>::new()
                .compute(image)?
                .center_of_gravity),
        }
    }
}

impl<B: Backend, const D: usize> RegistrationComponent<B, D> for ParametricTransform<B, D> {
    fn name(&self) -> &'static str {
        self.transform.name()
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
        let label = self.label();
        let fixed = context.fixed_image(0)?;
        let initial = context
            .initial_transform()
            .map(|snapshot| snapshot.to_transform::<D>())
            .transpose()?;

        let center = match configuration
            .parameters()
            .get_all_as::<f64>("CenterOfRotationPoint")?
            .as_slice()
        {
            [] => fixed.geometry().center(),
            values if values.len() == D => Vector::<D>::from_column_slice(values),
            values => {
                return Err(RegistrationError::runtime(format!(
                    "CenterOfRotationPoint has {} values, expected {D}",
                    values.len()
                )))
            }
        };

        let mut translation = Vector::<D>::zeros();
        if configuration.read_flag("AutomaticTransformInitialization", label.as_ref(), false)? {
            let method = configuration.read_component_parameter_or(
                "AutomaticTransformInitializationMethod",
                label.as_ref(),
                0,
                "GeometricalCenter".to_string(),
            )?;
            let method: InitializationMethod = method.parse().map_err(RegistrationError::runtime)?;
            let moving = context.moving_image(0)?;
            let mut fixed_center = Self::center(&fixed, method)?;
            if let Some(initial) = &initial {
                fixed_center = initial.transform_point(&fixed_center);
            }
            let moving_center = Self::center(&moving, method)?;
            translation = moving_center - fixed_center;
            tracing::info!(?method, translation = ?translation.as_slice(), "transform initialized");
        }

        let current: Box<dyn Transform<D>> = if self.is_affine() {
            let mut affine = AffineTransform::<D>::identity();
            affine.set_center(center);
            affine.set_translation(translation);
            Box::new(affine)
        } else {
            Box::new(TranslationTransform::new(translation))
        };
        self.transform = match initial {
            Some(initial) => {
                tracing::info!(initial = initial.name(), "composing with initial transform");
                Box::new(ChainedTransform::new(initial, current))
            }
            None => current,
        };
        Ok(())
    }

    fn write_parameters(&self, parameters: &mut ParameterMap) -> Result<()> {
        let transform = self.transform.as_ref();
        parameters.set("Transform", [transform.name()]);
        parameters.set("NumberOfParameters", [transform.number_of_parameters()]);
        parameters.set("TransformParameters", transform.parameters());
        parameters.set("HowToCombineTransforms", ["Compose"]);

        let context = self.context().ok();
        let initial_file = match transform.initial_transform() {
            None => NO_INITIAL_TRANSFORM,
            Some(_) => context
                .as_ref()
                .and_then(|context| context.configuration().command_line_argument("-t0"))
                .unwrap_or(IN_MEMORY_INITIAL_TRANSFORM),
        };
        parameters.set("InitialTransformParametersFileName", [initial_file]);

        if let Some(context) = context {
            let signature = *context.signature();
            parameters.set("FixedImageDimension", [signature.fixed_dimension]);
            parameters.set("MovingImageDimension", [signature.moving_dimension]);
            parameters.set("FixedInternalImagePixelType", [signature.fixed_pixel_type.as_str()]);
            parameters.set("MovingInternalImagePixelType", [signature.moving_pixel_type.as_str()]);
            if let Ok(fixed) = context.fixed_image(0) {
                let geometry = fixed.geometry();
                parameters.set("Size", geometry.size());
                parameters.set("Index", [0usize; D]);
                parameters.set("Spacing", geometry.spacing().iter().copied());
                parameters.set("Origin", geometry.origin().iter().copied());
                // column-major, one column per image axis
                parameters.set("Direction", geometry.direction().iter().copied());
                parameters.set("UseDirectionCosines", ["true"]);
            }
        }

        let fixed_parameters = transform.fixed_parameters();
        if !fixed_parameters.is_empty() {
            parameters.set("CenterOfRotationPoint", fixed_parameters);
        }
        Ok(())
    }
}

impl<B: Backend, const D: usize> TransformComponent<B, D> for ParametricTransform<B, D> {
    fn transform(&self) -> &dyn Transform<D> {
        self.transform.as_ref()
    }

    fn transform_mut(&mut self) -> &mut dyn Transform<D> {
        self.transform.as_mut()
    }
}

pub(crate) fn register<B: Backend, const D: usize>(registry: &mut ComponentRegistry, index: SignatureIndex) {
    registry.register(
        "TranslationTransform",
        index,
        factory::<B, D>(|| Component::Transform(shared(ParametricTransform::<B, D>::translation()))),
    );
    registry.register(
        "AffineTransform",
        index,
        factory::<B, D>(|| Component::Transform(shared(ParametricTransform::<B, D>::affine()))),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_record_block_without_context() {
        let mut component = ParametricTransform::<B, 2>::translation();
        component.transform_mut().set_parameters(&[1.5, -2.0]).unwrap();
        let mut parameters = ParameterMap::new();
        component.write_parameters(&mut parameters).unwrap();

        assert_eq!(parameters.get_entry("Transform", 0), Some("TranslationTransform"));
        assert_eq!(parameters.get_as::<usize>("NumberOfParameters", 0).unwrap(), Some(2));
        assert_eq!(parameters.get_all_as::<f64>("TransformParameters").unwrap(), vec![1.5, -2.0]);
        assert!(!parameters.contains("CenterOfRotationPoint"));
    }

    #[test]
    fn test_affine_reports_its_center() {
        let component = ParametricTransform::<B, 2>::affine();
        assert_eq!(component.name(), "AffineTransform");
        let mut parameters = ParameterMap::new();
        component.write_parameters(&mut parameters).unwrap();
        assert_eq!(parameters.count("CenterOfRotationPoint"), 2);
        assert_eq!(parameters.get_as::<usize>("NumberOfParameters", 0).unwrap(), Some(6));
    }

    #[test]
    fn test_composed_transform_names_its_initial_transform() {
        let initial = TranslationTransform::new(Vector::<2>::new(3.0, 0.0));
        let chained = ChainedTransform::new(Box::new(initial), Box::new(TranslationTransform::<2>::identity()));
        let component = ParametricTransform::<B, 2>::new(Box::new(chained));
        let mut parameters = ParameterMap::new();
        component.write_parameters(&mut parameters).unwrap();

        assert_eq!(
            parameters.get_entry("InitialTransformParametersFileName", 0),
            Some(IN_MEMORY_INITIAL_TRANSFORM)
        );
        assert_eq!(parameters.get_all_as::<f64>("TransformParameters").unwrap(), vec![0.0, 0.0]);

        let mut plain = ParameterMap::new();
        ParametricTransform::<B, 2>::translation().write_parameters(&mut plain).unwrap();
        assert_eq!(
            plain.get_entry("InitialTransformParametersFileName", 0),
            Some(NO_INITIAL_TRANSFORM)
        );
    }

    #[test]
    fn test_initialization_method_parsing() {
        assert_eq!(
            "CenterOfGravity".parse::<InitializationMethod>().unwrap(),
            InitializationMethod::CenterOfGravity
        );
        assert!("Nope".parse::<InitializationMethod>().is_err());
    }
}

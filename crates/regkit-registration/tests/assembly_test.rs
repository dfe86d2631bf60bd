mod common;

use common::{blob, B};
use regkit_core::{ParameterMap, PixelType, TypeSignature};
use regkit_registration::builtin::install_for;
use regkit_registration::registry::global;
use regkit_registration::{
    Category, Component, ComponentAssembler, ComponentCategoryConfig, ComponentRegistry,
    Configuration, Orchestrator, RegistrationError, RunState,
};

fn configuration(text: &str) -> Configuration {
    Configuration::new(ParameterMap::parse(text).unwrap())
}

fn names(components: &[regkit_registration::registry::AnyComponent]) -> Vec<&'static str> {
    components
        .iter()
        .map(|c| c.downcast_ref::<Component<B, 3>>().unwrap().name().unwrap())
        .collect()
}

#[test]
fn test_declared_components_are_created_in_order() {
    let mut registry = ComponentRegistry::new();
    let index = install_for::<B, 3>(&mut registry, PixelType::Float);
    let configuration = configuration(
        "(Metric \"AdvancedMeanSquares\" \"AdvancedNormalizedCorrelation\" \"AdvancedMeanSquares\")",
    );
    let assembler = ComponentAssembler::new(&registry, &configuration, index);

    let (metrics, failure) = assembler.create(&ComponentCategoryConfig::from(Category::Metric));
    assert!(failure.is_none());
    assert_eq!(
        names(&metrics),
        ["AdvancedMeanSquares", "AdvancedNormalizedCorrelation", "AdvancedMeanSquares"]
    );
}

#[test]
fn test_two_metrics_and_a_default_optimizer() {
    let registry = global();
    let index = registry
        .index_for(&TypeSignature::symmetric(PixelType::Float, 3))
        .unwrap();
    let configuration =
        configuration("(Metric \"AdvancedMeanSquares\" \"AdvancedNormalizedCorrelation\")");
    let assembler = ComponentAssembler::new(registry, &configuration, index);

    let (metrics, failure) = assembler.create_category("Metric", None, true);
    assert!(failure.is_none());
    assert_eq!(metrics.len(), 2);

    let (optimizers, failure) =
        assembler.create_category("Optimizer", Some("RegularStepGradientDescent"), true);
    assert!(failure.is_none());
    assert_eq!(names(&optimizers), ["RegularStepGradientDescent"]);
}

#[test]
fn test_omitted_categories() {
    let mut registry = ComponentRegistry::new();
    let index = install_for::<B, 3>(&mut registry, PixelType::Float);
    let configuration = configuration("(Metric \"AdvancedMeanSquares\")");
    let assembler = ComponentAssembler::new(&registry, &configuration, index);

    let (samplers, failure) = assembler.create(&ComponentCategoryConfig::from(Category::ImageSampler));
    assert!(samplers.is_empty());
    assert!(failure.is_none());

    let (transforms, failure) = assembler.create(&ComponentCategoryConfig::from(Category::Transform));
    assert!(transforms.is_empty());
    assert_eq!(failure.unwrap().category, "Transform");

    let (resamplers, failure) = assembler.create(&ComponentCategoryConfig::from(Category::Resampler));
    assert!(failure.is_none());
    assert_eq!(names(&resamplers), ["DefaultResampler"]);
}

#[test]
fn test_missing_transform_refuses_the_run() {
    let mut orchestrator = Orchestrator::new(configuration(
        "(Metric \"AdvancedMeanSquares\")\n(Optimizer \"StandardGradientDescent\")",
    ));
    orchestrator.set_fixed_dimension(2);
    orchestrator.set_moving_dimension(2);

    let code = orchestrator.run();
    assert_eq!(code, RegistrationError::CategoryAssembly(vec![]).error_code());
    assert_eq!(orchestrator.state(), RunState::Failed);
    assert!(orchestrator.last_error().unwrap().contains("Transform"));
    assert!(orchestrator.history().contains(&RunState::SignatureResolved));
    assert!(!orchestrator.history().contains(&RunState::Bound));
    assert!(orchestrator.result().is_none());
}

#[test]
fn test_every_failed_category_is_reported() {
    let mut orchestrator = Orchestrator::new(configuration("(Interpolator \"NoSuchInterpolator\")"));
    orchestrator.set_fixed_dimension(3);
    orchestrator.set_moving_dimension(3);

    assert_eq!(orchestrator.run(), 4);
    let message = orchestrator.last_error().unwrap();
    for category in ["Interpolator", "Metric", "Optimizer", "Transform"] {
        assert!(message.contains(category), "{category} missing from: {message}");
    }
}

#[test]
fn test_component_of_another_category_is_refused() {
    let mut orchestrator = Orchestrator::new(configuration(
        "(Transform \"AdvancedMeanSquares\")\n\
         (Metric \"AdvancedMeanSquares\")\n\
         (Optimizer \"StandardGradientDescent\")",
    ));
    orchestrator.add_fixed_image(blob([8, 8], [4.0, 4.0], 2.0));
    orchestrator.add_moving_image(blob([8, 8], [4.0, 4.0], 2.0));

    assert_eq!(orchestrator.run(), 4);
    let message = orchestrator.last_error().unwrap();
    assert!(message.contains("Transform"));
    assert!(message.contains("Metric component"));
}

#[test]
fn test_unsupported_signature() {
    let mut orchestrator = Orchestrator::new(configuration(
        "(FixedInternalImagePixelType \"short\")\n(MovingInternalImagePixelType \"short\")",
    ));
    orchestrator.set_fixed_dimension(2);
    orchestrator.set_moving_dimension(2);

    assert_eq!(orchestrator.run(), 2);
    assert_eq!(orchestrator.history(), [RunState::Uninitialized, RunState::Failed]);
    assert!(orchestrator.type_signature().is_none());
}

#[test]
fn test_declared_dimension_must_match_the_image() {
    let mut orchestrator = Orchestrator::new(configuration("(FixedImageDimension 3)"));
    orchestrator.add_fixed_image(blob([8, 8], [4.0, 4.0], 2.0));
    orchestrator.add_moving_image(blob([8, 8], [4.0, 4.0], 2.0));

    assert_eq!(orchestrator.run(), 2);
    assert!(orchestrator.last_error().unwrap().contains("FixedImageDimension"));
}

#[test]
fn test_double_signature_resolves_to_its_own_index() {
    let mut orchestrator = Orchestrator::new(configuration(
        "(FixedInternalImagePixelType \"double\")\n\
         (MovingInternalImagePixelType \"double\")\n\
         (FixedImageDimension 3)\n(MovingImageDimension 3)",
    ));
    // fails at assembly, after the signature is resolved
    assert_eq!(orchestrator.run(), 4);
    let signature = orchestrator.type_signature().unwrap();
    assert_eq!(signature, TypeSignature::symmetric(PixelType::Double, 3));
    assert_eq!(
        orchestrator.signature_index(),
        global().index_for(&signature)
    );
}

#[test]
fn test_orchestrator_runs_once() {
    let mut orchestrator = Orchestrator::new(configuration(""));
    orchestrator.set_fixed_dimension(2);
    orchestrator.set_moving_dimension(2);
    assert_ne!(orchestrator.run(), 0);
    assert_eq!(orchestrator.run(), 8);
}

//! Component-based multi-resolution image registration.
//!
//! A run is described by a parameter map naming one or more components per
//! category (transform, metric, optimizer, ...). The [`Orchestrator`]
//! resolves the pixel types and dimensions of the run, looks every named
//! component up in the [`ComponentRegistry`], binds them to a shared
//! [`ExecutionContext`] and drives the registration over progressively finer
//! resolutions, delivering lifecycle events to every component in a fixed
//! order.
//!
//! ```no_run
//! use regkit_core::ParameterMap;
//! use regkit_registration::{Configuration, Orchestrator};
//!
//! let parameters = ParameterMap::parse(
//!     "(Transform \"TranslationTransform\")\n\
//!      (Metric \"AdvancedMeanSquares\")\n\
//!      (Optimizer \"RegularStepGradientDescent\")",
//! )?;
//! let configuration = Configuration::new(parameters)
//!     .with_argument("-f", "fixed.nii.gz")
//!     .with_argument("-m", "moving.nii.gz");
//! let mut orchestrator = Orchestrator::new(configuration);
//! let code = orchestrator.run();
//! # Ok::<(), regkit_core::CoreError>(())
//! ```

pub mod assembler;
pub mod builtin;
pub mod component;
pub mod configuration;
pub mod context;
pub mod error;
pub mod events;
pub mod iteration_log;
pub mod orchestrator;
pub mod pipeline;
pub mod record;
pub mod registry;
pub mod state;

pub use assembler::{ComponentAssembler, ComponentCategoryConfig};
pub use component::{Category, Component, ComponentLabel, RegistrationComponent};
pub use configuration::Configuration;
pub use context::{ExecutionContext, ResolutionState};
pub use error::{CategoryFailure, ComponentFailure, RegistrationError, Result};
pub use events::{Hook, RegistrationEvent};
pub use orchestrator::Orchestrator;
pub use pipeline::{PipelineRunner, RunResult, TransformSnapshot};
pub use record::TransformParameterRecord;
pub use registry::{ComponentRegistry, SignatureIndex};
pub use state::{RunState, StateMachine};

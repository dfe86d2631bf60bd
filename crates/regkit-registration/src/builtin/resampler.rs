//! Final resampling of the moving image onto the fixed-image grid.

use std::path::PathBuf;

use burn::tensor::backend::Backend;
use regkit_core::io::RawImage;
use regkit_core::{ImageBuffer, ParameterMap, PixelType};

use super::{factory, shared};
use crate::component::{
    busy, Category, Component, ComponentBase, RegistrationComponent, ResamplerComponent,
};
use crate::error::Result;
use crate::registry::{ComponentRegistry, SignatureIndex};

pub struct DefaultResampler<B: Backend, const D: usize> {
    base: ComponentBase<B, D>,
    default_pixel_value: f64,
    format: String,
    pixel_type: Option<PixelType>,
}

impl<B: Backend, const D: usize> Default for DefaultResampler<B, D> {
    fn default() -> Self {
        Self {
            base: ComponentBase::default(),
            default_pixel_value: 0.0,
            format: "nii".to_string(),
            pixel_type: None,
        }
    }
}

impl<B: Backend, const D: usize> DefaultResampler<B, D> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: Backend, const D: usize> RegistrationComponent<B, D> for DefaultResampler<B, D> {
    component_identity!("DefaultResampler");

    fn before_all(&mut self) -> Result<()> {
        let context = self.context()?;
        let label = self.label();
        let configuration = context.configuration();
        self.default_pixel_value =
            configuration.read_component_parameter_or("DefaultPixelValue", label.as_ref(), 0, 0.0)?;
        self.format = configuration.read_component_parameter_or(
            "ResultImageFormat",
            label.as_ref(),
            0,
            "nii".to_string(),
        )?;
        self.pixel_type = configuration.read_component_parameter("ResultImagePixelType", label.as_ref(), 0, 0)?;
        Ok(())
    }

    fn after_registration(&mut self) -> Result<()> {
        let context = self.context()?;
        let label = self.label();
        if !context.configuration().read_flag("WriteResultImage", label.as_ref(), true)? {
            return Ok(());
        }
        let Some(directory) = context.output_directory() else {
            return Ok(());
        };
        let result = self.resample()?;
        let pixel_type = self.pixel_type.unwrap_or(context.signature().moving_pixel_type);
        let path: PathBuf = directory.join(format!(
            "result.{}.{}",
            context.configuration().elastix_level(),
            self.format
        ));
        context.write_image(&path, &RawImage::from_buffer(&result, pixel_type))?;
        tracing::info!(path = %path.display(), "result image written");
        Ok(())
    }

    fn write_parameters(&self, parameters: &mut ParameterMap) -> Result<()> {
        parameters.set("Resampler", ["DefaultResampler"]);
        parameters.set("DefaultPixelValue", [self.default_pixel_value]);
        parameters.set("ResultImageFormat", [self.format.as_str()]);
        if let Some(pixel_type) = self.pixel_type {
            parameters.set("ResultImagePixelType", [pixel_type.as_str()]);
        }
        Ok(())
    }
}

impl<B: Backend, const D: usize> ResamplerComponent<B, D> for DefaultResampler<B, D> {
    fn resample(&self) -> Result<ImageBuffer<D>> {
        let context = self.context()?;
        let fixed = context.fixed_image(0)?;
        let moving = context.moving_image(0)?;
        let transform = context.transform(0)?;
        let transform = transform.try_borrow().map_err(|_| busy(Category::Transform))?;
        let interpolator = context.resample_interpolator(0)?;
        let interpolator = interpolator
            .try_borrow()
            .map_err(|_| busy(Category::ResampleInterpolator))?;

        let transform = transform.transform();
        let interpolator = interpolator.interpolator();
        let default = self.default_pixel_value;
        Ok(ImageBuffer::from_fn(fixed.geometry().clone(), |point| {
            interpolator
                .evaluate(&moving, &transform.transform_point(point))
                .unwrap_or(default)
        }))
    }
}

pub(crate) fn register<B: Backend, const D: usize>(registry: &mut ComponentRegistry, index: SignatureIndex) {
    registry.register(
        "DefaultResampler",
        index,
        factory::<B, D>(|| Component::Resampler(shared(DefaultResampler::<B, D>::new()))),
    );
}

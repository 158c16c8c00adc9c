use log::{debug, info};
use openxr as xr;

use crate::kconstants::VIEW_COUNT;
use crate::kerror::{KError, KResult};
use crate::kgraphics::{GraphicsBackend, Viewport};
use crate::kruntime::{SwapchainSpec, XrRuntime};

/// One eye's swapchain and the render targets built on its images.
///
/// `framebuffers[i]` renders into `color_images[i]`. The color images belong
/// to the runtime; the framebuffers and depth textures belong to us.
pub struct SwapchainFramebuffer<S, B: GraphicsBackend> {
    pub handle: S,
    pub width: u32,
    pub height: u32,
    pub color_images: Vec<B::Image>,
    pub framebuffers: Vec<B::Framebuffer>,
    pub depth_textures: Vec<B::Texture>,
}

impl<S, B: GraphicsBackend> SwapchainFramebuffer<S, B> {
    /// Number of images the runtime put in this swapchain.
    pub fn length(&self) -> usize {
        self.color_images.len()
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::full(self.width as i32, self.height as i32)
    }

    fn release(&mut self, backend: &mut B) {
        for framebuffer in self.framebuffers.drain(..) {
            backend.delete_framebuffer(framebuffer);
        }
        for texture in self.depth_textures.drain(..) {
            backend.delete_texture(texture);
        }
    }
}

/// Render targets for every eye, indexed in the runtime's view order.
pub struct EyeSwapchains<S, B: GraphicsBackend> {
    eyes: [SwapchainFramebuffer<S, B>; VIEW_COUNT],
}

impl<S, B: GraphicsBackend> EyeSwapchains<S, B> {
    pub fn create<R>(
        runtime: &mut R,
        backend: &mut B,
        view_configs: &[xr::ViewConfigurationView],
    ) -> KResult<Self>
    where
        R: XrRuntime<Swapchain = S, Image = B::Image>,
    {
        if view_configs.len() != VIEW_COUNT {
            return Err(KError::ViewCount {
                expected: VIEW_COUNT,
                actual: view_configs.len(),
            });
        }

        let mut eyes = Vec::with_capacity(VIEW_COUNT);
        for (eye, view) in view_configs.iter().enumerate() {
            match create_eye(runtime, backend, eye, view) {
                Ok(target) => eyes.push(target),
                Err(err) => {
                    for mut target in eyes {
                        target.release(backend);
                    }
                    return Err(err);
                }
            }
        }

        let eyes = eyes
            .try_into()
            .map_err(|eyes: Vec<SwapchainFramebuffer<S, B>>| KError::ViewCount {
                expected: VIEW_COUNT,
                actual: eyes.len(),
            })?;
        Ok(Self { eyes })
    }

    pub fn eye(&self, eye: usize) -> &SwapchainFramebuffer<S, B> {
        &self.eyes[eye]
    }

    pub fn eye_mut(&mut self, eye: usize) -> &mut SwapchainFramebuffer<S, B> {
        &mut self.eyes[eye]
    }

    pub fn iter(&self) -> impl Iterator<Item = &SwapchainFramebuffer<S, B>> {
        self.eyes.iter()
    }

    /// Deletes every framebuffer and depth texture, then drops the swapchain
    /// handles.
    pub fn destroy(self, backend: &mut B) {
        info!("destroy framebuffers");
        for mut target in self.eyes {
            target.release(backend);
        }
    }
}

fn create_eye<R, B>(
    runtime: &mut R,
    backend: &mut B,
    eye: usize,
    view: &xr::ViewConfigurationView,
) -> KResult<SwapchainFramebuffer<R::Swapchain, B>>
where
    R: XrRuntime<Image = B::Image>,
    B: GraphicsBackend,
{
    let spec = SwapchainSpec {
        width: view.recommended_image_rect_width,
        height: view.recommended_image_rect_height,
        sample_count: view.recommended_swapchain_sample_count,
    };
    info!(
        "make view {} ({} {}, sample count {})",
        eye, spec.width, spec.height, spec.sample_count
    );

    let handle = runtime.create_swapchain(&spec)?;
    let color_images = runtime.enumerate_images(&handle)?;
    info!("swapchain length {}", color_images.len());

    let mut target = SwapchainFramebuffer {
        handle,
        width: spec.width,
        height: spec.height,
        color_images,
        framebuffers: Vec::new(),
        depth_textures: Vec::new(),
    };

    for index in 0..target.color_images.len() {
        debug!("create depth texture {}", index);
        let depth = match backend.create_depth_texture(spec.width, spec.height) {
            Ok(depth) => depth,
            Err(status) => {
                target.release(backend);
                return Err(KError::Graphics(format!(
                    "can't create depth texture {index} for eye {eye}: {status}"
                )));
            }
        };
        target.depth_textures.push(depth);

        debug!("create framebuffer {}", index);
        match backend.create_framebuffer(target.color_images[index], depth) {
            Ok(framebuffer) => target.framebuffers.push(framebuffer),
            Err(status) => {
                target.release(backend);
                return Err(KError::IncompleteFramebuffer { eye, index, status });
            }
        }
    }

    Ok(target)
}

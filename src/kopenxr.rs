//! `XrRuntime` on a real OpenXR runtime, plus the instance/system/session
//! bootstrap that precedes it.

use std::ffi::{c_void, CStr};

use log::{debug, error, info, warn};
use openxr as xr;
use openxr_sys as sys;

use crate::kconfig::KquestConfig;
use crate::kconstants::{FORM_FACTOR, VIEW_TYPE};
use crate::kerror::{KError, KResult, XrContext};
use crate::kruntime::{EyeView, FrameState, LayerView, SessionEvent, SwapchainSpec, XrRuntime};

/// Instance-level state that exists before a graphics context is bound.
pub struct XrSystem {
    messenger: Option<DebugMessenger>,
    pub instance: xr::Instance,
    pub system: xr::SystemId,
    pub blend_mode: xr::EnvironmentBlendMode,
}

fn load_entry() -> KResult<xr::Entry> {
    cfg_if::cfg_if! {
        if #[cfg(feature = "linked")] {
            Ok(xr::Entry::linked())
        } else if #[cfg(feature = "loaded")] {
            unsafe { xr::Entry::load() }.map_err(|e| KError::Loader(e.to_string()))
        } else {
            Err(KError::Loader(
                "built without the \"loaded\" or \"linked\" feature".to_owned(),
            ))
        }
    }
}

/// Loads the runtime, creates an instance with OpenGL enabled and picks the
/// HMD system and its first blend mode.
pub fn init_openxr(config: &KquestConfig) -> KResult<XrSystem> {
    let entry = load_entry()?;

    let layers = entry
        .enumerate_layers()
        .xr_context("xrEnumerateApiLayerProperties")?;
    info!("api layers {}", layers.len());
    for layer in &layers {
        info!("api layer: {}", layer.layer_name);
    }

    let available = entry
        .enumerate_extensions()
        .xr_context("xrEnumerateInstanceExtensionProperties")?;
    debug!("available extensions: {:#?}", available);
    if !available.khr_opengl_enable {
        return Err(KError::MissingExtension("XR_KHR_opengl_enable"));
    }

    let mut enabled = xr::ExtensionSet::default();
    enabled.khr_opengl_enable = true;
    let want_debug = config.xr_debug && available.ext_debug_utils;
    if config.xr_debug && !available.ext_debug_utils {
        warn!("XR_EXT_debug_utils not available, debug messenger OFF");
    }
    enabled.ext_debug_utils = want_debug;

    let instance = entry
        .create_instance(
            &xr::ApplicationInfo {
                application_name: &config.application_name,
                application_version: 0,
                engine_name: "kquest",
                engine_version: 0,
                api_version: xr::Version::new(1, 0, 0),
            },
            &enabled,
            &[],
        )
        .xr_context("xrCreateInstance")?;

    let props = instance.properties().xr_context("xrGetInstanceProperties")?;
    info!(
        "loaded OpenXR runtime: {} {}",
        props.runtime_name, props.runtime_version
    );

    let messenger = if want_debug {
        DebugMessenger::new(&instance)
    } else {
        None
    };

    let system = instance.system(FORM_FACTOR).xr_context("xrGetSystem")?;
    let blend_mode = instance
        .enumerate_environment_blend_modes(system, VIEW_TYPE)
        .xr_context("xrEnumerateEnvironmentBlendModes")?
        .first()
        .copied()
        .ok_or(KError::Unsupported("no environment blend mode"))?;
    info!("blend mode {:?}", blend_mode);

    Ok(XrSystem {
        messenger,
        instance,
        system,
        blend_mode,
    })
}

/// Fails unless the runtime accepts a context of version `major.minor`.
/// Must pass before a session is created.
pub fn check_gl_requirements(xr_system: &XrSystem, major: u32, minor: u32) -> KResult<()> {
    let reqs = xr_system
        .instance
        .graphics_requirements::<xr::OpenGL>(xr_system.system)
        .xr_context("xrGetOpenGLGraphicsRequirementsKHR")?;
    info!(
        "runtime accepts OpenGL {} to {}",
        reqs.min_api_version_supported, reqs.max_api_version_supported
    );
    gl_version_supported(
        reqs.min_api_version_supported,
        reqs.max_api_version_supported,
        xr::Version::new(major as u16, minor as u16, 0),
    )
}

fn gl_version_supported(min: xr::Version, max: xr::Version, actual: xr::Version) -> KResult<()> {
    if actual < min || actual.major() > max.major() {
        return Err(KError::UnsupportedGraphicsVersion {
            min,
            max_major: max.major() + 1,
            actual,
        });
    }
    Ok(())
}

/// First entry of `preferred` the runtime offers, else the runtime's own
/// first choice.
pub fn choose_format<F: Copy + PartialEq>(available: &[F], preferred: &[F]) -> Option<F> {
    preferred
        .iter()
        .copied()
        .find(|format| available.contains(format))
        .or_else(|| available.first().copied())
}

pub struct OpenXrRuntime<G: xr::Graphics> {
    // Fields drop in order: the messenger and the session objects go before
    // the instance that owns them.
    _messenger: Option<DebugMessenger>,
    frame_stream: xr::FrameStream<G>,
    frame_waiter: xr::FrameWaiter,
    space: xr::Space,
    session: xr::Session<G>,
    instance: xr::Instance,
    event_buffer: xr::EventDataBuffer,
    color_format: G::Format,
    view_configs: Vec<xr::ViewConfigurationView>,
}

impl<G: xr::Graphics> OpenXrRuntime<G>
where
    G::Format: PartialEq + std::fmt::Debug,
{
    /// Creates the session, the reference space, and picks the swapchain
    /// color format.
    ///
    /// # Safety
    ///
    /// `info` must describe a live graphics context that stays current on
    /// this thread for the lifetime of the runtime.
    pub unsafe fn new(
        xr_system: XrSystem,
        info: &G::SessionCreateInfo,
        reference_space: xr::ReferenceSpaceType,
        preferred_formats: &[G::Format],
    ) -> KResult<Self> {
        // Bound after `instance` so an early return destroys the messenger
        // while its instance is still alive.
        let instance = xr_system.instance;
        let system = xr_system.system;
        let messenger = xr_system.messenger;

        let (session, frame_waiter, frame_stream) = instance
            .create_session::<G>(system, info)
            .xr_context("xrCreateSession")?;

        let space = session
            .create_reference_space(reference_space, xr::Posef::IDENTITY)
            .xr_context("xrCreateReferenceSpace")?;
        info!("reference space {:?}", reference_space);

        let view_configs = instance
            .enumerate_view_configuration_views(system, VIEW_TYPE)
            .xr_context("xrEnumerateViewConfigurationViews")?;
        info!("view configurations {}", view_configs.len());

        let formats = session
            .enumerate_swapchain_formats()
            .xr_context("xrEnumerateSwapchainFormats")?;
        info!("num swapchain formats {}", formats.len());
        let color_format = choose_format(&formats, preferred_formats)
            .ok_or(KError::Unsupported("runtime offers no swapchain format"))?;
        info!("swapchain format {:?}", color_format);

        Ok(Self {
            _messenger: messenger,
            frame_stream,
            frame_waiter,
            space,
            session,
            instance,
            event_buffer: xr::EventDataBuffer::new(),
            color_format,
            view_configs,
        })
    }

    /// Recommended per-eye render target sizes, in view order.
    pub fn view_configs(&self) -> &[xr::ViewConfigurationView] {
        &self.view_configs
    }
}

impl<G: xr::Graphics> XrRuntime for OpenXrRuntime<G>
where
    G::SwapchainImage: Copy,
{
    type Swapchain = xr::Swapchain<G>;
    type Image = G::SwapchainImage;

    fn label(&self) -> &'static str {
        "OpenXR"
    }

    fn poll_event(&mut self) -> KResult<Option<SessionEvent>> {
        let event = self
            .instance
            .poll_event(&mut self.event_buffer)
            .xr_context("xrPollEvent")?;
        Ok(event.map(|event| match event {
            xr::Event::SessionStateChanged(e) => SessionEvent::StateChanged(e.state()),
            xr::Event::InstanceLossPending(_) => SessionEvent::InstanceLossPending,
            xr::Event::EventsLost(e) => SessionEvent::EventsLost(e.lost_event_count()),
            _ => SessionEvent::Other,
        }))
    }

    fn begin_session(&mut self, view_type: xr::ViewConfigurationType) -> KResult<()> {
        self.session.begin(view_type).xr_context("xrBeginSession")?;
        Ok(())
    }

    fn end_session(&mut self) -> KResult<()> {
        self.session.end().xr_context("xrEndSession")?;
        Ok(())
    }

    fn wait_frame(&mut self) -> KResult<FrameState> {
        let state = self.frame_waiter.wait().xr_context("xrWaitFrame")?;
        Ok(FrameState {
            predicted_display_time: state.predicted_display_time,
            should_render: state.should_render,
        })
    }

    fn begin_frame(&mut self) -> KResult<()> {
        self.frame_stream.begin().xr_context("xrBeginFrame")?;
        Ok(())
    }

    fn locate_views(&mut self, display_time: xr::Time) -> KResult<Vec<EyeView>> {
        let (_flags, views) = self
            .session
            .locate_views(VIEW_TYPE, display_time, &self.space)
            .xr_context("xrLocateViews")?;
        Ok(views
            .into_iter()
            .map(|view| EyeView {
                pose: view.pose,
                fov: view.fov,
            })
            .collect())
    }

    fn end_frame(
        &mut self,
        display_time: xr::Time,
        blend_mode: xr::EnvironmentBlendMode,
        layer: Option<&[LayerView<'_, Self::Swapchain>]>,
    ) -> KResult<()> {
        let Some(layer) = layer else {
            return self
                .frame_stream
                .end(display_time, blend_mode, &[])
                .xr_context("xrEndFrame");
        };

        let views: Vec<xr::CompositionLayerProjectionView<'_, G>> = layer
            .iter()
            .map(|view| {
                xr::CompositionLayerProjectionView::new()
                    .pose(view.pose)
                    .fov(view.fov)
                    .sub_image(
                        xr::SwapchainSubImage::new()
                            .swapchain(view.swapchain)
                            .image_array_index(0)
                            .image_rect(xr::Rect2Di {
                                offset: xr::Offset2Di { x: 0, y: 0 },
                                extent: xr::Extent2Di {
                                    width: view.width,
                                    height: view.height,
                                },
                            }),
                    )
            })
            .collect();
        let projection = xr::CompositionLayerProjection::new()
            .space(&self.space)
            .views(&views);
        let layers: [&xr::CompositionLayerBase<'_, G>; 1] = [&projection];

        self.frame_stream
            .end(display_time, blend_mode, &layers)
            .xr_context("xrEndFrame")
    }

    fn create_swapchain(&mut self, spec: &SwapchainSpec) -> KResult<Self::Swapchain> {
        let swapchain = self
            .session
            .create_swapchain(&xr::SwapchainCreateInfo {
                create_flags: xr::SwapchainCreateFlags::EMPTY,
                usage_flags: xr::SwapchainUsageFlags::COLOR_ATTACHMENT
                    | xr::SwapchainUsageFlags::SAMPLED,
                format: self.color_format,
                sample_count: spec.sample_count,
                width: spec.width,
                height: spec.height,
                face_count: 1,
                array_size: 1,
                mip_count: 1,
            })
            .xr_context("xrCreateSwapchain")?;
        info!("create swapchain (sample count {})", spec.sample_count);
        Ok(swapchain)
    }

    fn enumerate_images(&mut self, swapchain: &Self::Swapchain) -> KResult<Vec<Self::Image>> {
        swapchain
            .enumerate_images()
            .xr_context("xrEnumerateSwapchainImages")
    }

    fn acquire_image(&mut self, swapchain: &mut Self::Swapchain) -> KResult<u32> {
        swapchain
            .acquire_image()
            .xr_context("xrAcquireSwapchainImage")
    }

    fn wait_image(&mut self, swapchain: &mut Self::Swapchain) -> KResult<()> {
        swapchain
            .wait_image(xr::Duration::INFINITE)
            .xr_context("xrWaitSwapchainImage")
    }

    fn release_image(&mut self, swapchain: &mut Self::Swapchain) -> KResult<()> {
        swapchain
            .release_image()
            .xr_context("xrReleaseSwapchainImage")
    }
}

/// `XR_EXT_debug_utils` messenger that forwards runtime messages to `log`.
/// Destroyed on drop; must not outlive its instance.
struct DebugMessenger {
    ext: xr::raw::DebugUtilsEXT,
    handle: sys::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    fn new(instance: &xr::Instance) -> Option<Self> {
        let Some(ext) = instance.exts().ext_debug_utils else {
            info!("openxr debug messenger OFF");
            return None;
        };

        let create_info = sys::DebugUtilsMessengerCreateInfoEXT {
            ty: sys::DebugUtilsMessengerCreateInfoEXT::TYPE,
            next: std::ptr::null(),
            message_severities: sys::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | sys::DebugUtilsMessageSeverityFlagsEXT::INFO
                | sys::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | sys::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            message_types: sys::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | sys::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | sys::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
                | sys::DebugUtilsMessageTypeFlagsEXT::CONFORMANCE,
            user_callback: Some(debug_message as sys::pfn::DebugUtilsMessengerCallbackEXT),
            user_data: std::ptr::null_mut(),
        };

        let mut handle = sys::DebugUtilsMessengerEXT::NULL;
        let result = unsafe {
            (ext.create_debug_utils_messenger)(instance.as_raw(), &create_info, &mut handle)
        };
        if result.into_raw() < 0 {
            error!("xrCreateDebugUtilsMessengerEXT failed: {}", result);
            return None;
        }

        info!("openxr debug messenger ON");
        Some(Self { ext, handle })
    }
}

impl Drop for DebugMessenger {
    fn drop(&mut self) {
        unsafe {
            (self.ext.destroy_debug_utils_messenger)(self.handle);
        }
    }
}

unsafe extern "system" fn debug_message(
    severity: sys::DebugUtilsMessageSeverityFlagsEXT,
    _types: sys::DebugUtilsMessageTypeFlagsEXT,
    data: *const sys::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut c_void,
) -> sys::Bool32 {
    if data.is_null() {
        return sys::FALSE;
    }
    let data = &*data;
    let text = |ptr: *const libc::c_char| {
        if ptr.is_null() {
            String::new()
        } else {
            CStr::from_ptr(ptr).to_string_lossy().into_owned()
        }
    };
    let function = text(data.function_name);
    let message = text(data.message);

    if severity.contains(sys::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::error!("{}: {}", function, message);
    } else if severity.contains(sys::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::warn!("{}: {}", function, message);
    } else if severity.contains(sys::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        log::info!("{}: {}", function, message);
    } else {
        log::debug!("{}: {}", function, message);
    }
    sys::FALSE
}

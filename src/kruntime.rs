//! The slice of the XR runtime surface the frame loop talks to.
//!
//! `OpenXrRuntime` implements this on top of the `openxr` crate and
//! `NullRuntime` implements it headlessly. Everything here is single threaded:
//! the render thread owns the runtime and every swapchain.

use openxr as xr;

use crate::kerror::KResult;

/// Runtime events the session state machine cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(xr::SessionState),
    InstanceLossPending,
    EventsLost(u32),
    Other,
}

/// Timing for one frame, as returned by wait-frame. Only valid until the
/// matching end-frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameState {
    pub predicted_display_time: xr::Time,
    pub should_render: bool,
}

/// Pose and field of view of one eye at the predicted display time.
#[derive(Debug, Clone, Copy)]
pub struct EyeView {
    pub pose: xr::Posef,
    pub fov: xr::Fovf,
}

impl Default for EyeView {
    fn default() -> Self {
        Self {
            pose: xr::Posef::IDENTITY,
            fov: xr::Fovf {
                angle_left: 0.0,
                angle_right: 0.0,
                angle_up: 0.0,
                angle_down: 0.0,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainSpec {
    pub width: u32,
    pub height: u32,
    pub sample_count: u32,
}

/// One eye's entry in the projection layer.
pub struct LayerView<'a, S> {
    pub pose: xr::Posef,
    pub fov: xr::Fovf,
    pub swapchain: &'a S,
    pub width: i32,
    pub height: i32,
}

pub trait XrRuntime {
    /// Runtime-owned swapchain handle. Dropping it destroys the swapchain.
    type Swapchain;
    /// Runtime-owned color image (a GL texture name for OpenGL).
    type Image: Copy;

    fn label(&self) -> &'static str;

    /// Non-blocking. `Ok(None)` once the queue is drained.
    fn poll_event(&mut self) -> KResult<Option<SessionEvent>>;
    fn begin_session(&mut self, view_type: xr::ViewConfigurationType) -> KResult<()>;
    fn end_session(&mut self) -> KResult<()>;

    /// Blocks until the runtime wants the next frame.
    fn wait_frame(&mut self) -> KResult<FrameState>;
    fn begin_frame(&mut self) -> KResult<()>;
    /// Views in the runtime's enumeration order, located against the
    /// reference space.
    fn locate_views(&mut self, display_time: xr::Time) -> KResult<Vec<EyeView>>;
    /// `layer == None` submits zero composition layers.
    fn end_frame(
        &mut self,
        display_time: xr::Time,
        blend_mode: xr::EnvironmentBlendMode,
        layer: Option<&[LayerView<'_, Self::Swapchain>]>,
    ) -> KResult<()>;

    /// Created with sampled + color attachment usage.
    fn create_swapchain(&mut self, spec: &SwapchainSpec) -> KResult<Self::Swapchain>;
    /// The length of the returned list is the swapchain length.
    fn enumerate_images(&mut self, swapchain: &Self::Swapchain) -> KResult<Vec<Self::Image>>;
    fn acquire_image(&mut self, swapchain: &mut Self::Swapchain) -> KResult<u32>;
    /// Blocks with an infinite timeout.
    fn wait_image(&mut self, swapchain: &mut Self::Swapchain) -> KResult<()>;
    fn release_image(&mut self, swapchain: &mut Self::Swapchain) -> KResult<()>;
}

//! Headless runtime and graphics backend.
//!
//! Both record every call they receive so the frame protocol can be checked
//! without an HMD or a GL context. Failures can be injected per call.

use std::collections::{HashMap, HashSet, VecDeque};

use openxr as xr;
use openxr_sys as sys;

use crate::kconstants::VIEW_COUNT;
use crate::kerror::{KError, KResult};
use crate::kgraphics::{EyeMatrices, GraphicsBackend, Viewport};
use crate::kruntime::{EyeView, FrameState, LayerView, SessionEvent, SwapchainSpec, XrRuntime};

/// 90 Hz.
const FRAME_PERIOD_NANOS: i64 = 11_111_111;

pub fn view_config(width: u32, height: u32) -> xr::ViewConfigurationView {
    xr::ViewConfigurationView {
        recommended_image_rect_width: width,
        max_image_rect_width: width,
        recommended_image_rect_height: height,
        max_image_rect_height: height,
        recommended_swapchain_sample_count: 1,
        max_swapchain_sample_count: 1,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullCall {
    BeginSession,
    EndSession,
    WaitFrame,
    BeginFrame,
    LocateViews,
    EndFrame,
    CreateSwapchain,
    EnumerateImages(usize),
    Acquire(usize),
    WaitImage(usize),
    Release(usize),
}

#[derive(Debug)]
pub struct NullSwapchain {
    id: usize,
    length: u32,
    next: u32,
    acquired: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct SubmittedView {
    pub pose: xr::Posef,
    pub fov: xr::Fovf,
    pub swapchain: usize,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone)]
pub struct SubmittedFrame {
    pub display_time: xr::Time,
    pub blend_mode: xr::EnvironmentBlendMode,
    pub layer: Option<Vec<SubmittedView>>,
}

impl SubmittedFrame {
    pub fn layer_count(&self) -> usize {
        usize::from(self.layer.is_some())
    }
}

pub struct NullRuntime {
    events: VecDeque<SessionEvent>,
    views: Vec<EyeView>,
    swapchain_lengths: [u32; VIEW_COUNT],
    should_render: bool,
    failing: Vec<NullCall>,
    frame: i64,
    next_image: u32,
    calls: Vec<NullCall>,
    created_swapchains: Vec<SwapchainSpec>,
    submitted: Vec<SubmittedFrame>,
    begun_with: Option<xr::ViewConfigurationType>,
    order_violations: usize,
}

impl Default for NullRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl NullRuntime {
    pub fn new() -> Self {
        Self {
            events: VecDeque::new(),
            views: vec![EyeView::default(); VIEW_COUNT],
            swapchain_lengths: [3; VIEW_COUNT],
            should_render: true,
            failing: Vec::new(),
            frame: 0,
            next_image: 1,
            calls: Vec::new(),
            created_swapchains: Vec::new(),
            submitted: Vec::new(),
            begun_with: None,
            order_violations: 0,
        }
    }

    pub fn with_events(mut self, events: impl IntoIterator<Item = SessionEvent>) -> Self {
        self.events.extend(events);
        self
    }

    pub fn with_views(mut self, views: Vec<EyeView>) -> Self {
        self.views = views;
        self
    }

    pub fn with_swapchain_lengths(mut self, lengths: [u32; VIEW_COUNT]) -> Self {
        self.swapchain_lengths = lengths;
        self
    }

    pub fn with_should_render(mut self, should_render: bool) -> Self {
        self.should_render = should_render;
        self
    }

    /// Makes every future `call` return an error.
    pub fn failing(mut self, call: NullCall) -> Self {
        self.failing.push(call);
        self
    }

    pub fn push_event(&mut self, event: SessionEvent) {
        self.events.push_back(event);
    }

    pub fn view_configs(&self, width: u32, height: u32) -> Vec<xr::ViewConfigurationView> {
        vec![view_config(width, height); VIEW_COUNT]
    }

    pub fn calls(&self) -> &[NullCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn created_swapchains(&self) -> &[SwapchainSpec] {
        &self.created_swapchains
    }

    pub fn submitted(&self) -> &[SubmittedFrame] {
        &self.submitted
    }

    pub fn begun_with(&self) -> Option<xr::ViewConfigurationType> {
        self.begun_with
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Acquire while already acquired, or wait/release with nothing acquired.
    pub fn order_violations(&self) -> usize {
        self.order_violations
    }

    fn record(&mut self, call: NullCall, name: &'static str) -> KResult<()> {
        self.calls.push(call);
        if self.failing.contains(&call) {
            return Err(KError::Runtime {
                call: name,
                result: sys::Result::ERROR_RUNTIME_FAILURE,
            });
        }
        Ok(())
    }
}

impl XrRuntime for NullRuntime {
    type Swapchain = NullSwapchain;
    type Image = u32;

    fn label(&self) -> &'static str {
        "Null Runtime"
    }

    fn poll_event(&mut self) -> KResult<Option<SessionEvent>> {
        Ok(self.events.pop_front())
    }

    fn begin_session(&mut self, view_type: xr::ViewConfigurationType) -> KResult<()> {
        self.begun_with = Some(view_type);
        self.record(NullCall::BeginSession, "xrBeginSession")
    }

    fn end_session(&mut self) -> KResult<()> {
        self.record(NullCall::EndSession, "xrEndSession")
    }

    fn wait_frame(&mut self) -> KResult<FrameState> {
        self.record(NullCall::WaitFrame, "xrWaitFrame")?;
        self.frame += 1;
        Ok(FrameState {
            predicted_display_time: xr::Time::from_nanos(self.frame * FRAME_PERIOD_NANOS),
            should_render: self.should_render,
        })
    }

    fn begin_frame(&mut self) -> KResult<()> {
        self.record(NullCall::BeginFrame, "xrBeginFrame")
    }

    fn locate_views(&mut self, _display_time: xr::Time) -> KResult<Vec<EyeView>> {
        self.record(NullCall::LocateViews, "xrLocateViews")?;
        Ok(self.views.clone())
    }

    fn end_frame(
        &mut self,
        display_time: xr::Time,
        blend_mode: xr::EnvironmentBlendMode,
        layer: Option<&[LayerView<'_, NullSwapchain>]>,
    ) -> KResult<()> {
        self.submitted.push(SubmittedFrame {
            display_time,
            blend_mode,
            layer: layer.map(|views| {
                views
                    .iter()
                    .map(|view| SubmittedView {
                        pose: view.pose,
                        fov: view.fov,
                        swapchain: view.swapchain.id,
                        width: view.width,
                        height: view.height,
                    })
                    .collect()
            }),
        });
        self.record(NullCall::EndFrame, "xrEndFrame")
    }

    fn create_swapchain(&mut self, spec: &SwapchainSpec) -> KResult<NullSwapchain> {
        self.record(NullCall::CreateSwapchain, "xrCreateSwapchain")?;
        let id = self.created_swapchains.len();
        self.created_swapchains.push(*spec);
        Ok(NullSwapchain {
            id,
            length: self.swapchain_lengths[id % VIEW_COUNT],
            next: 0,
            acquired: false,
        })
    }

    fn enumerate_images(&mut self, swapchain: &NullSwapchain) -> KResult<Vec<u32>> {
        self.record(
            NullCall::EnumerateImages(swapchain.id),
            "xrEnumerateSwapchainImages",
        )?;
        let first = self.next_image;
        self.next_image += swapchain.length;
        Ok((first..self.next_image).collect())
    }

    fn acquire_image(&mut self, swapchain: &mut NullSwapchain) -> KResult<u32> {
        self.record(NullCall::Acquire(swapchain.id), "xrAcquireSwapchainImage")?;
        if swapchain.acquired {
            self.order_violations += 1;
            return Err(KError::Runtime {
                call: "xrAcquireSwapchainImage",
                result: sys::Result::ERROR_CALL_ORDER_INVALID,
            });
        }
        swapchain.acquired = true;
        let index = swapchain.next;
        swapchain.next = (swapchain.next + 1) % swapchain.length.max(1);
        Ok(index)
    }

    fn wait_image(&mut self, swapchain: &mut NullSwapchain) -> KResult<()> {
        self.record(NullCall::WaitImage(swapchain.id), "xrWaitSwapchainImage")?;
        if !swapchain.acquired {
            self.order_violations += 1;
        }
        Ok(())
    }

    fn release_image(&mut self, swapchain: &mut NullSwapchain) -> KResult<()> {
        self.record(NullCall::Release(swapchain.id), "xrReleaseSwapchainImage")?;
        if !swapchain.acquired {
            self.order_violations += 1;
            return Err(KError::Runtime {
                call: "xrReleaseSwapchainImage",
                result: sys::Result::ERROR_CALL_ORDER_INVALID,
            });
        }
        swapchain.acquired = false;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCall {
    BeginPass {
        framebuffer: u32,
        viewport: Viewport,
    },
    Clear([f32; 4]),
    DrawMesh(EyeMatrices),
    ClearRegion(Viewport, [f32; 4]),
    InvalidateDepth,
    EndPass,
}

#[derive(Default)]
pub struct NullBackend {
    next_id: u32,
    framebuffers_created: usize,
    incomplete_at: Option<usize>,
    textures: HashSet<u32>,
    framebuffers: HashMap<u32, u32>,
    calls: Vec<DrawCall>,
    destroyed: bool,
}

impl NullBackend {
    /// The `n`th framebuffer (counting from zero across all eyes) reports
    /// itself incomplete.
    pub fn with_incomplete_framebuffer(mut self, n: usize) -> Self {
        self.incomplete_at = Some(n);
        self
    }

    pub fn calls(&self) -> &[DrawCall] {
        &self.calls
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    /// Color image bound to a live framebuffer.
    pub fn framebuffer_color(&self, framebuffer: u32) -> Option<u32> {
        self.framebuffers.get(&framebuffer).copied()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

impl GraphicsBackend for NullBackend {
    type Image = u32;
    type Texture = u32;
    type Framebuffer = u32;

    fn label(&self) -> &'static str {
        "Null Backend"
    }

    fn create_depth_texture(&mut self, _width: u32, _height: u32) -> Result<u32, String> {
        let id = self.next_id();
        self.textures.insert(id);
        Ok(id)
    }

    fn create_framebuffer(&mut self, color: u32, _depth: u32) -> Result<u32, String> {
        let n = self.framebuffers_created;
        self.framebuffers_created += 1;
        if self.incomplete_at == Some(n) {
            return Err("GL_FRAMEBUFFER_INCOMPLETE_ATTACHMENT".to_string());
        }
        let id = self.next_id();
        self.framebuffers.insert(id, color);
        Ok(id)
    }

    fn delete_framebuffer(&mut self, framebuffer: u32) {
        self.framebuffers.remove(&framebuffer);
    }

    fn delete_texture(&mut self, texture: u32) {
        self.textures.remove(&texture);
    }

    fn begin_pass(&mut self, framebuffer: u32, viewport: Viewport) {
        self.calls.push(DrawCall::BeginPass {
            framebuffer,
            viewport,
        });
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.calls.push(DrawCall::Clear(color));
    }

    fn draw_mesh(&mut self, matrices: &EyeMatrices) {
        self.calls.push(DrawCall::DrawMesh(*matrices));
    }

    fn clear_region(&mut self, region: Viewport, color: [f32; 4]) {
        self.calls.push(DrawCall::ClearRegion(region, color));
    }

    fn invalidate_depth(&mut self) {
        self.calls.push(DrawCall::InvalidateDepth);
    }

    fn end_pass(&mut self) {
        self.calls.push(DrawCall::EndPass);
    }

    fn destroy(&mut self) {
        self.destroyed = true;
    }
}

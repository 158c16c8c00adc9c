use log::{error, trace, warn};
use openxr as xr;

use crate::kconstants::{BORDER_COLOR, CLEAR_COLOR, FAR_Z, MODEL_OFFSET, NEAR_Z, VIEW_COUNT};
use crate::kgraphics::{EyeMatrices, GraphicsBackend};
use crate::kmath::Mat4;
use crate::kruntime::{EyeView, FrameState, LayerView, XrRuntime};
use crate::ksession::SessionContext;
use crate::kswapchain::{EyeSwapchains, SwapchainFramebuffer};

/// Model, view and projection for one eye.
///
/// The view matrix is the rigid-body inverse of the eye pose, so the pose
/// orientation must be a unit quaternion. That is what runtimes report; it is
/// not checked here.
pub fn eye_matrices(view: &EyeView, near_z: f32, far_z: f32, model: Mat4) -> EyeMatrices {
    let unit_scale = xr::Vector3f {
        x: 1.0,
        y: 1.0,
        z: 1.0,
    };
    let to_view = Mat4::translation_rotation_scale(
        &view.pose.position,
        &view.pose.orientation,
        &unit_scale,
    );
    EyeMatrices {
        model,
        view: to_view.invert_rigid_body(),
        projection: Mat4::projection_fov(&view.fov, near_z, far_z),
    }
}

/// What happened during one pass through the frame protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub should_render: bool,
    pub eyes_rendered: usize,
    /// Runtime calls that returned an error and were ignored.
    pub failed_calls: usize,
}

impl FrameReport {
    fn ignore(&mut self, err: impl std::fmt::Display) {
        error!("{}", err);
        self.failed_calls += 1;
    }
}

pub struct FrameRenderer {
    near_z: f32,
    far_z: f32,
    model: Mat4,
    frame_index: u64,
}

impl Default for FrameRenderer {
    fn default() -> Self {
        Self::new(NEAR_Z, FAR_Z)
    }
}

impl FrameRenderer {
    pub fn new(near_z: f32, far_z: f32) -> Self {
        Self {
            near_z,
            far_z,
            model: Mat4::translation(MODEL_OFFSET[0], MODEL_OFFSET[1], MODEL_OFFSET[2]),
            frame_index: 0,
        }
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Runs wait, begin, per-eye acquire/wait/render/release and end once.
    ///
    /// Runtime failures are logged and the frame carries on as if the call
    /// had succeeded: a failed acquire renders into image 0, failed view
    /// location renders with identity poses. Nothing is retried and no eye is
    /// skipped.
    pub fn render_frame<R, B>(
        &mut self,
        session: &mut SessionContext<R>,
        swapchains: &mut EyeSwapchains<R::Swapchain, B>,
        backend: &mut B,
    ) -> FrameReport
    where
        R: XrRuntime<Image = B::Image>,
        B: GraphicsBackend,
    {
        let mut report = FrameReport::default();
        let blend_mode = session.blend_mode();
        let runtime = session.runtime_mut();

        let frame_state = runtime.wait_frame().unwrap_or_else(|e| {
            report.ignore(e);
            FrameState {
                predicted_display_time: xr::Time::from_nanos(0),
                should_render: false,
            }
        });
        if let Err(e) = runtime.begin_frame() {
            report.ignore(e);
        }

        self.frame_index += 1;
        report.should_render = frame_state.should_render;
        trace!(
            "frame {} at {:?}, should render {}",
            self.frame_index,
            frame_state.predicted_display_time,
            frame_state.should_render
        );

        let display_time = frame_state.predicted_display_time;
        if !frame_state.should_render {
            if let Err(e) = runtime.end_frame(display_time, blend_mode, None) {
                report.ignore(e);
            }
            return report;
        }

        let mut views = runtime
            .locate_views(frame_state.predicted_display_time)
            .unwrap_or_else(|e| {
                report.ignore(e);
                Vec::new()
            });
        if views.len() != VIEW_COUNT {
            warn!("located {} views, expected {}", views.len(), VIEW_COUNT);
            views.resize(VIEW_COUNT, EyeView::default());
        }

        for (eye, view) in views.iter().enumerate() {
            let target = swapchains.eye_mut(eye);

            let image_index = runtime.acquire_image(&mut target.handle).unwrap_or_else(|e| {
                report.ignore(e);
                0
            });
            if let Err(e) = runtime.wait_image(&mut target.handle) {
                report.ignore(e);
            }

            let matrices = eye_matrices(view, self.near_z, self.far_z, self.model);
            if self.draw_eye(backend, target, image_index as usize, &matrices) {
                report.eyes_rendered += 1;
            }

            if let Err(e) = runtime.release_image(&mut target.handle) {
                report.ignore(e);
            }
        }

        let layer: Vec<LayerView<'_, R::Swapchain>> = swapchains
            .iter()
            .zip(views.iter())
            .map(|(target, view)| LayerView {
                pose: view.pose,
                fov: view.fov,
                swapchain: &target.handle,
                width: target.width as i32,
                height: target.height as i32,
            })
            .collect();

        if let Err(e) = runtime.end_frame(
            frame_state.predicted_display_time,
            blend_mode,
            Some(layer.as_slice()),
        ) {
            report.ignore(e);
        }
        report
    }

    fn draw_eye<S, B: GraphicsBackend>(
        &self,
        backend: &mut B,
        target: &SwapchainFramebuffer<S, B>,
        image_index: usize,
        matrices: &EyeMatrices,
    ) -> bool {
        let Some(&framebuffer) = target.framebuffers.get(image_index) else {
            error!(
                "swapchain image {} out of range ({} framebuffers)",
                image_index,
                target.framebuffers.len()
            );
            return false;
        };
        let viewport = target.viewport();

        backend.begin_pass(framebuffer, viewport);
        backend.clear(CLEAR_COLOR);
        backend.draw_mesh(matrices);
        for strip in viewport.border_strips() {
            backend.clear_region(strip, BORDER_COLOR);
        }
        backend.invalidate_depth();
        backend.end_pass();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kgraphics::Viewport;
    use crate::knull::{DrawCall, NullBackend, NullCall, NullRuntime};
    use crate::kruntime::SessionEvent;

    const EPS: f32 = 1e-5;

    struct Rig {
        session: SessionContext<NullRuntime>,
        swapchains: EyeSwapchains<crate::knull::NullSwapchain, NullBackend>,
        backend: NullBackend,
        renderer: FrameRenderer,
    }

    fn rig(runtime: NullRuntime) -> Rig {
        let mut runtime =
            runtime.with_events([SessionEvent::StateChanged(xr::SessionState::READY)]);
        let mut backend = NullBackend::default();
        let configs = runtime.view_configs(32, 16);
        let swapchains = EyeSwapchains::create(&mut runtime, &mut backend, &configs).unwrap();
        runtime.clear_calls();
        let mut session = SessionContext::new(
            runtime,
            xr::ViewConfigurationType::PRIMARY_STEREO,
            xr::EnvironmentBlendMode::OPAQUE,
        );
        session.poll_events();
        session.runtime_mut().clear_calls();
        Rig {
            session,
            swapchains,
            backend,
            renderer: FrameRenderer::default(),
        }
    }

    impl Rig {
        fn frame(&mut self) -> FrameReport {
            self.renderer.render_frame(
                &mut self.session,
                &mut self.swapchains,
                &mut self.backend,
            )
        }

        fn calls(&self) -> &[NullCall] {
            self.session.runtime().calls()
        }
    }

    fn pose(position: [f32; 3], orientation: [f32; 4]) -> xr::Posef {
        xr::Posef {
            orientation: xr::Quaternionf {
                x: orientation[0],
                y: orientation[1],
                z: orientation[2],
                w: orientation[3],
            },
            position: xr::Vector3f {
                x: position[0],
                y: position[1],
                z: position[2],
            },
        }
    }

    fn fov(tangent: f32) -> xr::Fovf {
        let angle = tangent.atan();
        xr::Fovf {
            angle_left: -angle,
            angle_right: angle,
            angle_up: angle,
            angle_down: -angle,
        }
    }

    #[test]
    fn identity_pose_gives_identity_view() {
        let view = EyeView {
            pose: xr::Posef::IDENTITY,
            fov: fov(1.0),
        };
        let m = eye_matrices(&view, NEAR_Z, FAR_Z, Mat4::IDENTITY);
        for i in 0..16 {
            assert!((m.view.m[i] - Mat4::IDENTITY.m[i]).abs() < EPS);
        }
    }

    #[test]
    fn translated_eye_moves_world_the_other_way() {
        let view = EyeView {
            pose: pose([0.5, 1.5, 0.0], [0.0, 0.0, 0.0, 1.0]),
            fov: fov(1.0),
        };
        let m = eye_matrices(&view, NEAR_Z, FAR_Z, Mat4::IDENTITY);
        assert_eq!(
            m.view.transform_point([0.5, 1.5, 0.0]),
            [0.0, 0.0, 0.0, 1.0]
        );
    }

    #[test]
    fn model_places_cube_one_unit_ahead() {
        let renderer = FrameRenderer::default();
        assert_eq!(
            renderer.model.transform_point([0.0, 0.0, 0.0]),
            [0.0, 0.0, -1.0, 1.0]
        );
    }

    #[test]
    fn not_rendering_submits_no_layers_and_touches_no_swapchain() {
        let mut rig = rig(NullRuntime::new().with_should_render(false));
        let report = rig.frame();

        assert!(!report.should_render);
        assert_eq!(
            rig.calls(),
            &[NullCall::WaitFrame, NullCall::BeginFrame, NullCall::EndFrame]
        );
        let submitted = rig.session.runtime().submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].layer_count(), 0);
        assert!(rig.backend.calls().is_empty());
    }

    #[test]
    fn each_eye_completes_acquire_wait_release_before_the_next() {
        let mut rig = rig(NullRuntime::new());
        let report = rig.frame();

        assert_eq!(report.eyes_rendered, VIEW_COUNT);
        assert_eq!(report.failed_calls, 0);
        assert_eq!(
            rig.calls(),
            &[
                NullCall::WaitFrame,
                NullCall::BeginFrame,
                NullCall::LocateViews,
                NullCall::Acquire(0),
                NullCall::WaitImage(0),
                NullCall::Release(0),
                NullCall::Acquire(1),
                NullCall::WaitImage(1),
                NullCall::Release(1),
                NullCall::EndFrame,
            ]
        );
        assert_eq!(rig.session.runtime().order_violations(), 0);
    }

    #[test]
    fn layer_carries_views_in_runtime_order() {
        let left = EyeView {
            pose: pose([-0.03, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0]),
            fov: fov(1.0),
        };
        let right = EyeView {
            pose: pose([0.03, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0]),
            fov: fov(0.8),
        };
        let mut rig = rig(NullRuntime::new().with_views(vec![right, left]));
        rig.frame();

        let frame = &rig.session.runtime().submitted()[0];
        assert_eq!(frame.blend_mode, xr::EnvironmentBlendMode::OPAQUE);
        let layer = frame.layer.as_ref().unwrap();
        assert_eq!(layer.len(), VIEW_COUNT);
        assert_eq!(layer[0].pose.position.x, 0.03);
        assert_eq!(layer[0].swapchain, 0);
        assert_eq!(layer[1].pose.position.x, -0.03);
        assert_eq!(layer[1].swapchain, 1);
        assert_eq!((layer[1].width, layer[1].height), (32, 16));
    }

    #[test]
    fn draw_sequence_per_eye() {
        let mut rig = rig(NullRuntime::new());
        rig.frame();

        let calls = rig.backend.calls();
        assert_eq!(calls.len(), VIEW_COUNT * 9);
        let full = Viewport::full(32, 16);
        let eye0 = &calls[..9];
        assert!(matches!(eye0[0], DrawCall::BeginPass { viewport, .. } if viewport == full));
        assert_eq!(eye0[1], DrawCall::Clear(CLEAR_COLOR));
        assert!(matches!(eye0[2], DrawCall::DrawMesh(_)));
        for (i, strip) in full.border_strips().into_iter().enumerate() {
            assert_eq!(eye0[3 + i], DrawCall::ClearRegion(strip, BORDER_COLOR));
        }
        assert_eq!(eye0[7], DrawCall::InvalidateDepth);
        assert_eq!(eye0[8], DrawCall::EndPass);
    }

    #[test]
    fn renders_into_the_framebuffer_of_the_acquired_image() {
        let mut rig = rig(NullRuntime::new().with_swapchain_lengths([3, 2]));
        for _ in 0..4 {
            rig.frame();
        }

        let passes: Vec<u32> = rig
            .backend
            .calls()
            .iter()
            .filter_map(|c| match c {
                DrawCall::BeginPass { framebuffer, .. } => Some(*framebuffer),
                _ => None,
            })
            .collect();
        let fb0 = &rig.swapchains.eye(0).framebuffers;
        let fb1 = &rig.swapchains.eye(1).framebuffers;
        assert_eq!(
            passes,
            vec![fb0[0], fb1[0], fb0[1], fb1[1], fb0[2], fb1[0], fb0[0], fb1[1]]
        );
    }

    #[test]
    fn failed_acquire_still_renders_and_releases_that_eye() {
        let mut rig = rig(NullRuntime::new().failing(NullCall::Acquire(0)));
        let report = rig.frame();

        // The failed acquire, then the release the runtime rejects because
        // nothing was acquired.
        assert_eq!(report.failed_calls, 2);
        assert_eq!(report.eyes_rendered, VIEW_COUNT);
        let calls = rig.calls();
        assert!(calls.contains(&NullCall::WaitImage(0)));
        assert!(calls.contains(&NullCall::Release(0)));
        let frame = &rig.session.runtime().submitted()[0];
        assert_eq!(frame.layer_count(), 1);
        assert_eq!(rig.session.runtime().order_violations(), 2);
    }

    #[test]
    fn failed_locate_renders_with_default_views() {
        let mut rig = rig(NullRuntime::new().failing(NullCall::LocateViews));
        let report = rig.frame();

        assert_eq!(report.failed_calls, 1);
        assert_eq!(report.eyes_rendered, VIEW_COUNT);
        let layer = rig.session.runtime().submitted()[0].layer.clone().unwrap();
        assert_eq!(layer[0].pose.orientation.w, 1.0);
    }

    #[test]
    fn short_view_list_is_padded() {
        let mut rig = rig(NullRuntime::new().with_views(vec![EyeView::default()]));
        let report = rig.frame();
        assert_eq!(report.eyes_rendered, VIEW_COUNT);
    }

    #[test]
    fn failed_wait_frame_still_ends_the_frame_empty() {
        let mut rig = rig(NullRuntime::new().failing(NullCall::WaitFrame));
        let report = rig.frame();

        assert!(!report.should_render);
        assert_eq!(
            rig.calls(),
            &[NullCall::WaitFrame, NullCall::BeginFrame, NullCall::EndFrame]
        );
        assert_eq!(rig.session.runtime().submitted()[0].layer_count(), 0);
    }

    #[test]
    fn failed_end_frame_is_ignored() {
        let mut rig = rig(NullRuntime::new().failing(NullCall::EndFrame));
        assert_eq!(rig.frame().failed_calls, 1);
        assert_eq!(rig.frame().failed_calls, 1);
        assert_eq!(rig.renderer.frame_index(), 2);
    }
}

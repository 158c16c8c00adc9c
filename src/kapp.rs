use log::{error, info};
use openxr as xr;

use crate::kconfig::KquestConfig;
use crate::kconstants::VIEW_TYPE;
use crate::kerror::KResult;
use crate::kgraphics::GraphicsBackend;
use crate::khost::HostState;
use crate::krender::{FrameReport, FrameRenderer};
use crate::kruntime::XrRuntime;
use crate::ksession::SessionContext;
use crate::kswapchain::EyeSwapchains;

/// Everything one loop iteration needs: the session, the per-eye render
/// targets and the backend that draws into them.
pub struct App<R, B>
where
    R: XrRuntime<Image = B::Image>,
    B: GraphicsBackend,
{
    session: SessionContext<R>,
    swapchains: Option<EyeSwapchains<R::Swapchain, B>>,
    backend: B,
    renderer: FrameRenderer,
    exit_on_session_end: bool,
}

impl<R, B> App<R, B>
where
    R: XrRuntime<Image = B::Image>,
    B: GraphicsBackend,
{
    pub fn new(
        mut runtime: R,
        mut backend: B,
        view_configs: &[xr::ViewConfigurationView],
        blend_mode: xr::EnvironmentBlendMode,
        config: &KquestConfig,
    ) -> KResult<Self> {
        info!(
            "creating app on {} with {} backend",
            runtime.label(),
            backend.label()
        );
        let swapchains = match EyeSwapchains::create(&mut runtime, &mut backend, view_configs) {
            Ok(swapchains) => swapchains,
            Err(e) => {
                backend.destroy();
                return Err(e);
            }
        };

        Ok(Self {
            session: SessionContext::new(runtime, VIEW_TYPE, blend_mode),
            swapchains: Some(swapchains),
            backend,
            renderer: FrameRenderer::new(config.near_z, config.far_z),
            exit_on_session_end: config.exit_on_session_end,
        })
    }

    pub fn session(&self) -> &SessionContext<R> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionContext<R> {
        &mut self.session
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn swapchains(&self) -> Option<&EyeSwapchains<R::Swapchain, B>> {
        self.swapchains.as_ref()
    }

    /// Polls runtime events, then renders one frame if the session is running
    /// and the host has a resumed surface. `None` when no frame was run.
    pub fn iterate(&mut self, host: &HostState) -> Option<FrameReport> {
        self.session.poll_events();

        if !self.session.is_running() || !host.can_render() {
            return None;
        }
        let swapchains = self.swapchains.as_mut()?;
        let report = self
            .renderer
            .render_frame(&mut self.session, swapchains, &mut self.backend);
        Some(report)
    }

    pub fn should_exit(&self, host: &HostState) -> bool {
        host.destroy_requested() || (self.exit_on_session_end && self.session.should_exit())
    }

    /// Releases render targets and backend objects, and ends the session if
    /// it is still running. Safe to call more than once.
    pub fn shutdown(&mut self) {
        let Some(swapchains) = self.swapchains.take() else {
            return;
        };
        info!("shutting down after {} frames", self.renderer.frame_index());
        swapchains.destroy(&mut self.backend);
        self.backend.destroy();

        if self.session.is_running() {
            if let Err(e) = self.session.runtime_mut().end_session() {
                error!("{}", e);
            }
        }
    }
}

impl<R, B> Drop for App<R, B>
where
    R: XrRuntime<Image = B::Image>,
    B: GraphicsBackend,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}

//! Stereo frame loop for a head-mounted display: OpenXR session lifecycle,
//! per-eye swapchain framebuffers, and one cube drawn into each eye.

pub mod kapp;
pub mod kconfig;
pub mod kconstants;
pub mod kerror;
pub mod kgl;
pub mod kgraphics;
pub mod khost;
pub mod klog;
pub mod kmath;
pub mod kmesh;
pub mod knull;
pub mod kopenxr;
pub mod krender;
pub mod kruntime;
pub mod ksession;
pub mod kswapchain;

#[cfg(all(feature = "glx", target_os = "linux"))]
pub mod kglx;

pub use kapp::App;
pub use kconfig::KquestConfig;
pub use kerror::{KError, KResult};
pub use kgraphics::GraphicsBackend;
pub use khost::{HostSignal, HostState};
pub use kruntime::XrRuntime;

//! Desktop entry point: a GLX context, the OpenGL backend and an OpenXR
//! session driven from a winit event loop.

use std::process::ExitCode;

use log::{error, info};

use kquest::klog::{init_logging, LoggingConfig};
use kquest::{KResult, KquestConfig};

cfg_if::cfg_if! {
    if #[cfg(all(feature = "glx", target_os = "linux"))] {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        use glow::HasContext;
        use log::warn;
        use openxr as xr;
        use winit::event::Event;
        use winit::event_loop::{ControlFlow, EventLoop};
        use winit::window::WindowBuilder;

        use kquest::kconstants::PREFERRED_COLOR_FORMATS;
        use kquest::kgl::GlBackend;
        use kquest::kglx::GlxContext;
        use kquest::kopenxr::{check_gl_requirements, init_openxr, OpenXrRuntime};
        use kquest::{App, HostSignal, HostState, KError};

        fn run(config: KquestConfig) -> KResult<()> {
            let interrupted = Arc::new(AtomicBool::new(false));
            let flag = interrupted.clone();
            if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
                warn!("can't install Ctrl-C handler: {}", e);
            }

            let xr_system = init_openxr(&config)?;
            let blend_mode = xr_system.blend_mode;

            let glx = unsafe { GlxContext::new()? };
            let gl = unsafe { glx.load_gl() };
            let (major, minor) = (gl.version().major, gl.version().minor);
            check_gl_requirements(&xr_system, major, minor)?;

            let backend = GlBackend::new(gl, config.gl_debug)?;
            let runtime = unsafe {
                OpenXrRuntime::<xr::OpenGL>::new(
                    xr_system,
                    &glx.session_create_info(),
                    config.reference_space,
                    &PREFERRED_COLOR_FORMATS,
                )?
            };
            let view_configs = runtime.view_configs().to_vec();
            let mut app = App::new(runtime, backend, &view_configs, blend_mode, &config)?;

            let event_loop = EventLoop::new().map_err(|e| KError::EventLoop(e.to_string()))?;
            let mut host = HostState::default();
            let mut window = None;

            info!("running...");
            let result = event_loop.run(|event, elwt| {
                elwt.set_control_flow(ControlFlow::Poll);
                if let Some(signal) = HostSignal::from_winit(&event) {
                    host.apply(signal);
                }

                match event {
                    Event::Resumed if window.is_none() => {
                        match WindowBuilder::new().with_title("kquest").build(elwt) {
                            Ok(created) => {
                                window = Some(created);
                                host.apply(HostSignal::SurfaceCreated);
                            }
                            Err(e) => {
                                error!("can't create window: {}", e);
                                elwt.exit();
                            }
                        }
                    }
                    Event::AboutToWait => {
                        if interrupted.load(Ordering::Relaxed) && !host.destroy_requested() {
                            host.apply(HostSignal::Destroy);
                        }
                        app.iterate(&host);
                        if app.should_exit(&host) {
                            elwt.exit();
                        }
                    }
                    Event::LoopExiting => app.shutdown(),
                    _ => {}
                }
            });

            // The app releases its GL objects on drop, while the context is
            // still alive.
            drop(app);
            drop(glx);
            result.map_err(|e| KError::EventLoop(e.to_string()))
        }
    } else {
        fn run(_config: KquestConfig) -> KResult<()> {
            Err(kquest::KError::Unsupported(
                "no desktop GL context bootstrap for this target; build with the \"glx\" feature on Linux",
            ))
        }
    }
}

fn main() -> ExitCode {
    init_logging(LoggingConfig::default());
    info!("hello");

    let config = KquestConfig::from_env();
    match run(config) {
        Ok(()) => {
            info!("bye");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

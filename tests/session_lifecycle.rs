use kquest::khost::{HostSignal, HostState};
use kquest::knull::{NullBackend, NullCall, NullRuntime, NullSwapchain};
use kquest::kruntime::SessionEvent;
use kquest::kswapchain::EyeSwapchains;
use kquest::{App, KError, KquestConfig};
use openxr as xr;

fn state(state: xr::SessionState) -> SessionEvent {
    SessionEvent::StateChanged(state)
}

fn open_host() -> HostState {
    let mut host = HostState::default();
    host.apply(HostSignal::SurfaceCreated);
    host.apply(HostSignal::Resumed);
    host
}

fn new_app(runtime: NullRuntime) -> App<NullRuntime, NullBackend> {
    let configs = runtime.view_configs(1440, 1584);
    App::new(
        runtime,
        NullBackend::default(),
        &configs,
        xr::EnvironmentBlendMode::OPAQUE,
        &KquestConfig::default(),
    )
    .unwrap()
}

fn count(app: &App<NullRuntime, NullBackend>, call: NullCall) -> usize {
    app.session()
        .runtime()
        .calls()
        .iter()
        .filter(|c| **c == call)
        .count()
}

#[test]
fn full_session_from_idle_to_exit() {
    let mut app = new_app(NullRuntime::new().with_swapchain_lengths([3, 2]));
    let host = open_host();

    let lengths: Vec<usize> = app
        .swapchains()
        .unwrap()
        .iter()
        .map(|s| s.length())
        .collect();
    assert_eq!(lengths, [3, 2]);

    for s in [
        xr::SessionState::IDLE,
        xr::SessionState::READY,
        xr::SessionState::SYNCHRONIZED,
        xr::SessionState::VISIBLE,
        xr::SessionState::FOCUSED,
    ] {
        app.session_mut().runtime_mut().push_event(state(s));
    }
    for _ in 0..4 {
        let report = app.iterate(&host).unwrap();
        assert_eq!(report.eyes_rendered, 2);
        assert_eq!(report.failed_calls, 0);
    }
    assert_eq!(app.session().state(), xr::SessionState::FOCUSED);
    assert!(app.session().is_running());
    assert_eq!(
        app.session().runtime().begun_with(),
        Some(xr::ViewConfigurationType::PRIMARY_STEREO)
    );
    assert_eq!(count(&app, NullCall::BeginSession), 1);
    assert_eq!(app.session().runtime().submitted().len(), 4);

    for s in [
        xr::SessionState::VISIBLE,
        xr::SessionState::SYNCHRONIZED,
        xr::SessionState::STOPPING,
    ] {
        app.session_mut().runtime_mut().push_event(state(s));
    }
    assert!(app.iterate(&host).is_none());
    assert!(app.iterate(&host).is_none());
    assert!(!app.session().is_running());
    assert_eq!(count(&app, NullCall::EndSession), 1);
    assert_eq!(app.session().runtime().submitted().len(), 4);
    assert!(!app.should_exit(&host));

    app.session_mut()
        .runtime_mut()
        .push_event(state(xr::SessionState::IDLE));
    app.session_mut()
        .runtime_mut()
        .push_event(state(xr::SessionState::EXITING));
    assert!(app.iterate(&host).is_none());
    assert!(app.should_exit(&host));

    app.shutdown();
    assert_eq!(count(&app, NullCall::EndSession), 1);
    assert_eq!(app.backend().live_textures(), 0);
    assert_eq!(app.backend().live_framebuffers(), 0);
    assert!(app.backend().is_destroyed());
    assert_eq!(app.session().runtime().order_violations(), 0);
}

#[test]
fn session_restarts_after_stopping() {
    let mut app = new_app(NullRuntime::new());
    let host = open_host();

    for s in [
        xr::SessionState::READY,
        xr::SessionState::STOPPING,
        xr::SessionState::IDLE,
        xr::SessionState::READY,
    ] {
        app.session_mut().runtime_mut().push_event(state(s));
    }
    assert!(app.iterate(&host).is_some());
    assert_eq!(count(&app, NullCall::BeginSession), 2);
    assert_eq!(count(&app, NullCall::EndSession), 1);
    assert!(app.session().is_running());
}

#[test]
fn instance_loss_requests_exit() {
    let mut app = new_app(NullRuntime::new().with_events([
        state(xr::SessionState::READY),
        SessionEvent::InstanceLossPending,
    ]));
    let host = open_host();
    app.iterate(&host);
    assert!(app.session().should_exit());
    assert!(app.should_exit(&host));
}

#[test]
fn incomplete_framebuffer_leaves_nothing_behind() {
    let mut runtime = NullRuntime::new().with_swapchain_lengths([3, 2]);
    let configs = runtime.view_configs(64, 64);
    // Framebuffers 0..3 belong to the left eye, so 4 is the right eye's second.
    let mut backend = NullBackend::default().with_incomplete_framebuffer(4);

    let result =
        EyeSwapchains::<NullSwapchain, NullBackend>::create(&mut runtime, &mut backend, &configs);
    match result {
        Err(KError::IncompleteFramebuffer { eye, index, status }) => {
            assert_eq!((eye, index), (1, 1));
            assert!(status.contains("INCOMPLETE"));
        }
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("framebuffer creation should have failed"),
    }
    assert_eq!(backend.live_textures(), 0);
    assert_eq!(backend.live_framebuffers(), 0);
}

#[test]
fn incomplete_framebuffer_fails_app_creation() {
    let runtime = NullRuntime::new();
    let configs = runtime.view_configs(64, 64);
    let result = App::new(
        runtime,
        NullBackend::default().with_incomplete_framebuffer(0),
        &configs,
        xr::EnvironmentBlendMode::OPAQUE,
        &KquestConfig::default(),
    );
    assert!(matches!(
        result,
        Err(KError::IncompleteFramebuffer { eye: 0, index: 0, .. })
    ));
}

//! Host process lifecycle, reduced to the two gates the frame loop needs.

use log::info;
use winit::event::{Event, WindowEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSignal {
    SurfaceCreated,
    SurfaceDestroyed,
    Resumed,
    Paused,
    Destroy,
}

impl HostSignal {
    /// Maps the winit events that carry lifecycle meaning. Everything else is
    /// `None`.
    pub fn from_winit<T>(event: &Event<T>) -> Option<Self> {
        match event {
            Event::Resumed => Some(HostSignal::Resumed),
            Event::Suspended => Some(HostSignal::Paused),
            Event::LoopExiting => Some(HostSignal::Destroy),
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => Some(HostSignal::Destroy),
                WindowEvent::Destroyed => Some(HostSignal::SurfaceDestroyed),
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostState {
    surface_available: bool,
    resumed: bool,
    destroy_requested: bool,
}

impl HostState {
    pub fn apply(&mut self, signal: HostSignal) {
        match signal {
            HostSignal::SurfaceCreated => {
                info!("surfaceCreated()");
                self.surface_available = true;
            }
            HostSignal::SurfaceDestroyed => {
                info!("surfaceDestroyed()");
                self.surface_available = false;
            }
            HostSignal::Resumed => {
                info!("onResume()");
                self.resumed = true;
            }
            HostSignal::Paused => {
                info!("onPause()");
                self.resumed = false;
            }
            HostSignal::Destroy => {
                info!("onDestroy()");
                self.surface_available = false;
                self.destroy_requested = true;
            }
        }
    }

    pub fn surface_available(&self) -> bool {
        self.surface_available
    }

    pub fn resumed(&self) -> bool {
        self.resumed
    }

    pub fn destroy_requested(&self) -> bool {
        self.destroy_requested
    }

    /// Both gates open: the frame loop may run.
    pub fn can_render(&self) -> bool {
        self.surface_available && self.resumed && !self.destroy_requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_both_surface_and_resume() {
        let mut host = HostState::default();
        assert!(!host.can_render());
        host.apply(HostSignal::Resumed);
        assert!(host.resumed());
        assert!(!host.surface_available());
        assert!(!host.can_render());
        host.apply(HostSignal::SurfaceCreated);
        assert!(host.surface_available());
        assert!(host.can_render());
        host.apply(HostSignal::Paused);
        assert!(!host.resumed());
        assert!(!host.can_render());
        host.apply(HostSignal::Resumed);
        host.apply(HostSignal::SurfaceDestroyed);
        assert!(!host.can_render());
    }

    #[test]
    fn destroy_is_sticky() {
        let mut host = HostState::default();
        host.apply(HostSignal::Destroy);
        host.apply(HostSignal::SurfaceCreated);
        host.apply(HostSignal::Resumed);
        assert!(host.destroy_requested());
        assert!(!host.can_render());
    }

    #[test]
    fn winit_lifecycle_events_map_to_signals() {
        assert_eq!(
            HostSignal::from_winit(&Event::<()>::Resumed),
            Some(HostSignal::Resumed)
        );
        assert_eq!(
            HostSignal::from_winit(&Event::<()>::Suspended),
            Some(HostSignal::Paused)
        );
        assert_eq!(
            HostSignal::from_winit(&Event::<()>::LoopExiting),
            Some(HostSignal::Destroy)
        );
        assert_eq!(HostSignal::from_winit(&Event::<()>::AboutToWait), None);
    }
}

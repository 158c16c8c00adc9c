use openxr as xr;
use openxr_sys as sys;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KError {
    #[error("{call} failed: {result}")]
    Runtime {
        call: &'static str,
        result: sys::Result,
    },
    #[error("couldn't load the OpenXR loader: {0}")]
    Loader(String),
    #[error("OpenXR runtime does not provide {0}")]
    MissingExtension(&'static str),
    #[error("OpenXR runtime requires OpenGL version >= {min}, < {max_major}.0.0 (context is {actual})")]
    UnsupportedGraphicsVersion {
        min: xr::Version,
        max_major: u16,
        actual: xr::Version,
    },
    #[error("expected {expected} views, runtime reported {actual}")]
    ViewCount { expected: usize, actual: usize },
    #[error("can't create framebuffer {index} for eye {eye}: {status}")]
    IncompleteFramebuffer {
        eye: usize,
        index: usize,
        status: String,
    },
    #[error("can't compile shader: {0}")]
    ShaderCompile(String),
    #[error("can't link program: {0}")]
    ProgramLink(String),
    #[error("graphics error: {0}")]
    Graphics(String),
    #[error("event loop error: {0}")]
    EventLoop(String),
    #[error("unsupported platform: {0}")]
    Unsupported(&'static str),
}

pub type KResult<T> = Result<T, KError>;

/// Tags an `openxr` result with the name of the call that produced it.
pub(crate) trait XrContext<T> {
    fn xr_context(self, call: &'static str) -> KResult<T>;
}

impl<T> XrContext<T> for xr::Result<T> {
    fn xr_context(self, call: &'static str) -> KResult<T> {
        self.map_err(|result| KError::Runtime { call, result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_errors_name_the_call() {
        let result: xr::Result<()> = Err(sys::Result::ERROR_SESSION_NOT_RUNNING);
        let err = result.xr_context("xrBeginFrame").unwrap_err();
        assert!(err.to_string().starts_with("xrBeginFrame failed"), "{err}");
    }

    #[test]
    fn framebuffer_errors_carry_eye_and_index() {
        let err = KError::IncompleteFramebuffer {
            eye: 1,
            index: 2,
            status: "GL_FRAMEBUFFER_UNSUPPORTED".into(),
        };
        assert_eq!(
            err.to_string(),
            "can't create framebuffer 2 for eye 1: GL_FRAMEBUFFER_UNSUPPORTED"
        );
    }
}

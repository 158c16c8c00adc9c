use openxr as xr;

/// Number of eyes rendered per frame. Every per-eye container is sized by this.
pub const VIEW_COUNT: usize = 2;
pub const VIEW_TYPE: xr::ViewConfigurationType = xr::ViewConfigurationType::PRIMARY_STEREO;
pub const FORM_FACTOR: xr::FormFactor = xr::FormFactor::HEAD_MOUNTED_DISPLAY;

pub const NEAR_Z: f32 = 0.05;
pub const FAR_Z: f32 = 100.0;

/// Where the single cube sits relative to the reference space origin.
pub const MODEL_OFFSET: [f32; 3] = [0.0, 0.0, -1.0];

pub const CLEAR_COLOR: [f32; 4] = [1.0, 1.0, 1.0, 1.0];
/// Color of the 1 pixel frame cleared around every eye image.
pub const BORDER_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

pub const DEPTH_BITS: u32 = 24;

/// GL_RGBA8 and GL_SRGB8_ALPHA8, in order of preference.
pub const PREFERRED_COLOR_FORMATS: [u32; 2] = [0x8058, 0x8C43];

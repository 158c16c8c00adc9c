use log::warn;
use openxr as xr;

use crate::kconstants::{FAR_Z, NEAR_Z};

#[derive(Debug, Clone)]
pub struct KquestConfig {
    pub application_name: String,
    pub reference_space: xr::ReferenceSpaceType,
    pub near_z: f32,
    pub far_z: f32,
    /// Install the `XR_EXT_debug_utils` messenger when the runtime offers it.
    pub xr_debug: bool,
    /// Install the GL debug-output callback.
    pub gl_debug: bool,
    /// Leave the loop once the session reports `EXITING`/`LOSS_PENDING`.
    pub exit_on_session_end: bool,
}

impl Default for KquestConfig {
    fn default() -> Self {
        Self {
            application_name: "kquest".to_owned(),
            reference_space: xr::ReferenceSpaceType::LOCAL,
            near_z: NEAR_Z,
            far_z: FAR_Z,
            xr_debug: false,
            gl_debug: false,
            exit_on_session_end: true,
        }
    }
}

impl KquestConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds a config from a key lookup. Unset keys keep their defaults;
    /// unparseable values are logged and ignored.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(value) = lookup("KQUEST_REFERENCE_SPACE") {
            match parse_reference_space(&value) {
                Some(space) => config.reference_space = space,
                None => warn!("ignoring KQUEST_REFERENCE_SPACE={:?}", value),
            }
        }
        read_flag(&lookup, "KQUEST_XR_DEBUG", &mut config.xr_debug);
        read_flag(&lookup, "KQUEST_GL_DEBUG", &mut config.gl_debug);
        read_flag(
            &lookup,
            "KQUEST_EXIT_ON_SESSION_END",
            &mut config.exit_on_session_end,
        );

        config
    }
}

fn read_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut bool) {
    if let Some(value) = lookup(key) {
        match parse_flag(&value) {
            Some(flag) => *slot = flag,
            None => warn!("ignoring {}={:?}", key, value),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_reference_space(value: &str) -> Option<xr::ReferenceSpaceType> {
    match value.trim().to_ascii_lowercase().as_str() {
        "local" => Some(xr::ReferenceSpaceType::LOCAL),
        "stage" => Some(xr::ReferenceSpaceType::STAGE),
        "view" => Some(xr::ReferenceSpaceType::VIEW),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> KquestConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        KquestConfig::from_vars(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_without_variables() {
        let c = config(&[]);
        assert_eq!(c.reference_space, xr::ReferenceSpaceType::LOCAL);
        assert_eq!(c.near_z, NEAR_Z);
        assert_eq!(c.far_z, FAR_Z);
        assert!(!c.xr_debug);
        assert!(!c.gl_debug);
        assert!(c.exit_on_session_end);
    }

    #[test]
    fn reads_every_variable() {
        let c = config(&[
            ("KQUEST_REFERENCE_SPACE", "Stage"),
            ("KQUEST_XR_DEBUG", "1"),
            ("KQUEST_GL_DEBUG", "yes"),
            ("KQUEST_EXIT_ON_SESSION_END", "false"),
        ]);
        assert_eq!(c.reference_space, xr::ReferenceSpaceType::STAGE);
        assert!(c.xr_debug);
        assert!(c.gl_debug);
        assert!(!c.exit_on_session_end);
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let c = config(&[
            ("KQUEST_REFERENCE_SPACE", "floor"),
            ("KQUEST_XR_DEBUG", "maybe"),
            ("KQUEST_EXIT_ON_SESSION_END", ""),
        ]);
        assert_eq!(c.reference_space, xr::ReferenceSpaceType::LOCAL);
        assert!(!c.xr_debug);
        assert!(c.exit_on_session_end);
    }

    #[test]
    fn view_space_is_accepted() {
        let c = config(&[("KQUEST_REFERENCE_SPACE", " view ")]);
        assert_eq!(c.reference_space, xr::ReferenceSpaceType::VIEW);
    }
}

//! Chaos hooks (feature: `failpoints`).
//!
//! `fail_point!("name")` expands to nothing unless the feature is enabled.
//! When enabled, it panics if `RUNMESH_FAILPOINTS` (comma-separated) lists
//! the point's name.

#[cfg(feature = "failpoints")]
pub fn armed(name: &str) -> bool {
    std::env::var("RUNMESH_FAILPOINTS")
        .map(|v| v.split(',').any(|p| p.trim() == name))
        .unwrap_or(false)
}

#[cfg(feature = "failpoints")]
#[macro_export]
macro_rules! fail_point {
    ($name:expr) => {{
        if $crate::failpoints::armed($name) {
            panic!("failpoint triggered: {}", $name);
        }
    }};
}

#[cfg(not(feature = "failpoints"))]
#[macro_export]
macro_rules! fail_point {
    ($name:expr) => {
        let _ = $name;
    };
}

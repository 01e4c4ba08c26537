//! Default value helpers for serde

pub fn default_false() -> bool {
    false
}

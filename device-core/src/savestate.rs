//! Hierarchical savestate tree.
//!
//! Savestates are exchanged as JSON trees: each device writes its state
//! under its own node and restores from the same shape. Restoration is
//! tolerant: a missing or malformed key leaves the corresponding field at
//! its current value, so a state written by an older build still loads.

/// One node of a savestate tree.
pub type StateNode = serde_json::Value;

/// Read an 8-bit field, if present and in range.
#[must_use]
pub fn read_u8(node: &StateNode, key: &str) -> Option<u8> {
    node.get(key)?.as_u64().and_then(|v| u8::try_from(v).ok())
}

/// Read a 16-bit field, if present and in range.
#[must_use]
pub fn read_u16(node: &StateNode, key: &str) -> Option<u16> {
    node.get(key)?.as_u64().and_then(|v| u16::try_from(v).ok())
}

/// Read a 32-bit field, if present and in range.
#[must_use]
pub fn read_u32(node: &StateNode, key: &str) -> Option<u32> {
    node.get(key)?.as_u64().and_then(|v| u32::try_from(v).ok())
}

/// Read a boolean field, if present.
#[must_use]
pub fn read_bool(node: &StateNode, key: &str) -> Option<bool> {
    node.get(key)?.as_bool()
}

/// Read a floating-point field, if present.
#[must_use]
pub fn read_f64(node: &StateNode, key: &str) -> Option<f64> {
    node.get(key)?.as_f64()
}

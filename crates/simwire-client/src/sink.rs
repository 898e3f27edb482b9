//! The scene-sink seam.
//!
//! The client never renders. Everything visual goes through [`SceneSink`],
//! implemented externally by the rendering engine (or a headless double in
//! tests). The reconciler and sensor handlers only hold the returned
//! [`RenderHandle`]s.

use simwire_core::{Color, Quaternion, Vector3};
use simwire_schema::DynMessage;

/// Opaque handle to a materialized render object, assigned by the sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderHandle(pub u64);

/// What kind of scene object an entity is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    /// A 3D model.
    Model,
    /// A light source.
    Light,
}

/// Description of an entity for the sink to materialize.
///
/// Carries the full decoded message so the renderer can read geometry,
/// materials, or light parameters the client itself never interprets.
pub struct EntitySpec<'a> {
    /// Display name (the stable business key).
    pub name: &'a str,
    /// Model or light.
    pub kind: EntityKind,
    /// The decoded scene message fragment describing this entity.
    pub data: &'a DynMessage,
}

/// Rendering capability consumed by the client.
pub trait SceneSink: Send + Sync {
    /// Materialize an entity, returning its render handle.
    fn add(&self, spec: &EntitySpec<'_>) -> RenderHandle;

    /// Look up a render object by (scoped) name, `None` when absent.
    fn find_by_name(&self, name: &str) -> Option<RenderHandle>;

    /// Move an entity to a new pose.
    fn update_pose(&self, handle: RenderHandle, position: Vector3, orientation: Quaternion);

    /// Set the scene's ambient color.
    fn set_ambient(&self, color: Color);

    /// Tear down a render object.
    fn remove(&self, handle: RenderHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_handles_are_comparable_keys() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        let _ = map.insert(RenderHandle(1), "a");
        let _ = map.insert(RenderHandle(1), "b");
        assert_eq!(map.len(), 1);
        assert_eq!(map[&RenderHandle(1)], "b");
    }
}

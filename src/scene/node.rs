use glam::{Mat4, Quat, Vec3};

use crate::math;
use crate::renderer::material::Material;
use crate::renderer::MeshHandle;

/// Translate/rotate/scale, composed in that order.
#[derive(Clone, Copy, Debug)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn matrix(&self) -> Mat4 {
        math::compose_trs(self.position, self.rotation, self.scale)
    }
}

/// A drawable node in the scene tree. Children inherit the parent transform.
#[derive(Clone)]
pub struct MeshNode {
    pub transform: Transform,
    pub mesh: MeshHandle,
    pub material: Material,
    pub children: Vec<MeshNode>,
}

impl MeshNode {
    pub fn new(mesh: MeshHandle, material: Material) -> Self {
        Self {
            transform: Transform::default(),
            mesh,
            material,
            children: Vec::new(),
        }
    }

    pub(crate) fn flatten_into(&self, parent: Mat4, out: &mut Vec<DrawItem>) {
        let model = parent * self.transform.matrix();
        out.push(DrawItem {
            model,
            mesh: self.mesh,
            material: self.material,
        });
        for child in &self.children {
            child.flatten_into(model, out);
        }
    }
}

/// One flattened drawable: world transform plus mesh/material references.
#[derive(Clone, Copy)]
pub struct DrawItem {
    pub model: Mat4,
    pub mesh: MeshHandle,
    pub material: Material,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::cache::Handle;

    #[test]
    fn flatten_composes_parent_transforms_depth_first() {
        let mesh: MeshHandle = Handle::new(0);
        let mut root = MeshNode::new(mesh, Material::default());
        root.transform.position = Vec3::new(1.0, 0.0, 0.0);

        let mut child = MeshNode::new(mesh, Material::default());
        child.transform.position = Vec3::new(0.0, 2.0, 0.0);
        root.children.push(child);

        let mut items = Vec::new();
        root.flatten_into(Mat4::IDENTITY, &mut items);

        assert_eq!(items.len(), 2);
        let child_origin = items[1].model * Vec3::ZERO.extend(1.0);
        assert_eq!(child_origin.truncate(), Vec3::new(1.0, 2.0, 0.0));
    }
}

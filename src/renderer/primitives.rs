//! Procedural mesh builders. Every builder is deterministic: the same kind
//! always yields the same vertex and index stream, so the kind itself can be
//! a cache key.

use std::f32::consts::PI;
use std::sync::Once;

use log::warn;

use super::vertex::{v, Vertex};

/// Identity of a procedural mesh. Parameters are integral so the kind can
/// serve directly as a cache key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Box,
    Sphere { segments: u32, rings: u32 },
    Plane { subdivisions: u32 },
    Quad,
    Triangle,
    Cone,
    Capsule,
}

impl PrimitiveKind {
    pub fn sphere() -> Self {
        PrimitiveKind::Sphere {
            segments: 32,
            rings: 16,
        }
    }
}

static UNSUPPORTED_WARNING: Once = Once::new();

/// Build the vertex/index streams for a primitive. Cone and capsule are not
/// implemented yet and substitute a sphere, logging once per process.
pub fn build(kind: PrimitiveKind) -> (Vec<Vertex>, Vec<u32>) {
    match kind {
        PrimitiveKind::Box => box_mesh(),
        PrimitiveKind::Sphere { segments, rings } => sphere_mesh(segments.max(3), rings.max(2)),
        PrimitiveKind::Plane { subdivisions } => plane_mesh(subdivisions.max(1)),
        PrimitiveKind::Quad => quad_mesh(),
        PrimitiveKind::Triangle => triangle_mesh(),
        PrimitiveKind::Cone | PrimitiveKind::Capsule => {
            UNSUPPORTED_WARNING.call_once(|| {
                warn!("Primitive {kind:?} is not implemented; substituting a sphere");
            });
            let PrimitiveKind::Sphere { segments, rings } = PrimitiveKind::sphere() else {
                unreachable!()
            };
            sphere_mesh(segments, rings)
        }
    }
}

pub fn sphere_mesh(segments: u32, rings: u32) -> (Vec<Vertex>, Vec<u32>) {
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for ring in 0..=rings {
        let phi = PI * ring as f32 / rings as f32;
        let y = phi.cos();
        let ring_radius = phi.sin();

        for segment in 0..=segments {
            let theta = 2.0 * PI * segment as f32 / segments as f32;
            let x = ring_radius * theta.cos();
            let z = ring_radius * theta.sin();

            // Unit sphere, so position doubles as the normal.
            let u = segment as f32 / segments as f32;
            let tex_v = ring as f32 / rings as f32;
            vertices.push(v([x, y, z], [x, y, z], [u, tex_v]));
        }
    }

    for ring in 0..rings {
        for segment in 0..segments {
            let current = ring * (segments + 1) + segment;
            let next = current + segments + 1;

            indices.push(current);
            indices.push(next);
            indices.push(current + 1);

            indices.push(current + 1);
            indices.push(next);
            indices.push(next + 1);
        }
    }

    (vertices, indices)
}

pub fn box_mesh() -> (Vec<Vertex>, Vec<u32>) {
    let p = |x, y, z| [x, y, z];

    let verts = vec![
        // Right face (+X)
        v(p(0.5, -0.5, -0.5), [1.0, 0.0, 0.0], [0.0, 1.0]),
        v(p(0.5, 0.5, -0.5), [1.0, 0.0, 0.0], [0.0, 0.0]),
        v(p(0.5, 0.5, 0.5), [1.0, 0.0, 0.0], [1.0, 0.0]),
        v(p(0.5, -0.5, 0.5), [1.0, 0.0, 0.0], [1.0, 1.0]),
        // Left face (-X)
        v(p(-0.5, -0.5, 0.5), [-1.0, 0.0, 0.0], [0.0, 1.0]),
        v(p(-0.5, 0.5, 0.5), [-1.0, 0.0, 0.0], [0.0, 0.0]),
        v(p(-0.5, 0.5, -0.5), [-1.0, 0.0, 0.0], [1.0, 0.0]),
        v(p(-0.5, -0.5, -0.5), [-1.0, 0.0, 0.0], [1.0, 1.0]),
        // Top face (+Y)
        v(p(-0.5, 0.5, -0.5), [0.0, 1.0, 0.0], [0.0, 1.0]),
        v(p(-0.5, 0.5, 0.5), [0.0, 1.0, 0.0], [0.0, 0.0]),
        v(p(0.5, 0.5, 0.5), [0.0, 1.0, 0.0], [1.0, 0.0]),
        v(p(0.5, 0.5, -0.5), [0.0, 1.0, 0.0], [1.0, 1.0]),
        // Bottom face (-Y)
        v(p(-0.5, -0.5, 0.5), [0.0, -1.0, 0.0], [0.0, 1.0]),
        v(p(-0.5, -0.5, -0.5), [0.0, -1.0, 0.0], [0.0, 0.0]),
        v(p(0.5, -0.5, -0.5), [0.0, -1.0, 0.0], [1.0, 0.0]),
        v(p(0.5, -0.5, 0.5), [0.0, -1.0, 0.0], [1.0, 1.0]),
        // Front face (+Z)
        v(p(0.5, -0.5, 0.5), [0.0, 0.0, 1.0], [0.0, 1.0]),
        v(p(0.5, 0.5, 0.5), [0.0, 0.0, 1.0], [0.0, 0.0]),
        v(p(-0.5, 0.5, 0.5), [0.0, 0.0, 1.0], [1.0, 0.0]),
        v(p(-0.5, -0.5, 0.5), [0.0, 0.0, 1.0], [1.0, 1.0]),
        // Back face (-Z)
        v(p(-0.5, -0.5, -0.5), [0.0, 0.0, -1.0], [0.0, 1.0]),
        v(p(-0.5, 0.5, -0.5), [0.0, 0.0, -1.0], [0.0, 0.0]),
        v(p(0.5, 0.5, -0.5), [0.0, 0.0, -1.0], [1.0, 0.0]),
        v(p(0.5, -0.5, -0.5), [0.0, 0.0, -1.0], [1.0, 1.0]),
    ];

    let mut indices = Vec::with_capacity(36);
    for face in 0..6u32 {
        let base = face * 4;
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    (verts, indices)
}

/// XZ ground plane, one unit across, facing +Y.
pub fn plane_mesh(subdivisions: u32) -> (Vec<Vertex>, Vec<u32>) {
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for row in 0..=subdivisions {
        for col in 0..=subdivisions {
            let u = col as f32 / subdivisions as f32;
            let w = row as f32 / subdivisions as f32;
            vertices.push(v([u - 0.5, 0.0, w - 0.5], [0.0, 1.0, 0.0], [u, w]));
        }
    }

    for row in 0..subdivisions {
        for col in 0..subdivisions {
            let current = row * (subdivisions + 1) + col;
            let next = current + subdivisions + 1;

            indices.push(current);
            indices.push(next);
            indices.push(current + 1);

            indices.push(current + 1);
            indices.push(next);
            indices.push(next + 1);
        }
    }

    (vertices, indices)
}

/// Unit quad in the XY plane, facing +Z.
pub fn quad_mesh() -> (Vec<Vertex>, Vec<u32>) {
    let verts = vec![
        v([-0.5, -0.5, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0]),
        v([0.5, -0.5, 0.0], [0.0, 0.0, 1.0], [1.0, 1.0]),
        v([0.5, 0.5, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0]),
        v([-0.5, 0.5, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0]),
    ];
    (verts, vec![0, 1, 2, 0, 2, 3])
}

pub fn triangle_mesh() -> (Vec<Vertex>, Vec<u32>) {
    let verts = vec![
        v([0.0, 0.5, 0.0], [0.0, 0.0, 1.0], [0.5, 0.0]),
        v([-0.5, -0.5, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0]),
        v([0.5, -0.5, 0.0], [0.0, 0.0, 1.0], [1.0, 1.0]),
    ];
    (verts, vec![0, 1, 2])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_are_deterministic() {
        let (va, ia) = build(PrimitiveKind::sphere());
        let (vb, ib) = build(PrimitiveKind::sphere());
        assert_eq!(va, vb);
        assert_eq!(ia, ib);
    }

    #[test]
    fn all_indices_are_in_range() {
        for kind in [
            PrimitiveKind::Box,
            PrimitiveKind::sphere(),
            PrimitiveKind::Plane { subdivisions: 4 },
            PrimitiveKind::Quad,
            PrimitiveKind::Triangle,
        ] {
            let (verts, indices) = build(kind);
            assert_eq!(indices.len() % 3, 0, "{kind:?} emits whole triangles");
            for &i in &indices {
                assert!((i as usize) < verts.len(), "{kind:?} index out of range");
            }
        }
    }

    #[test]
    fn sphere_normals_are_unit_length() {
        let (verts, _) = sphere_mesh(16, 8);
        for vert in &verts {
            let n = glam::Vec3::from(vert.normal);
            assert!((n.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn cone_and_capsule_substitute_the_default_sphere() {
        let (sphere_v, sphere_i) = build(PrimitiveKind::sphere());
        let (cone_v, cone_i) = build(PrimitiveKind::Cone);
        assert_eq!(sphere_v, cone_v);
        assert_eq!(sphere_i, cone_i);
    }

    #[test]
    fn plane_lies_flat_and_faces_up() {
        let (verts, _) = plane_mesh(2);
        for vert in &verts {
            assert_eq!(vert.pos[1], 0.0);
            assert_eq!(vert.normal, [0.0, 1.0, 0.0]);
        }
    }
}

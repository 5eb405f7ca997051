use wgpu::util::DeviceExt;

use super::vertex::Vertex;

/// An immutable GPU mesh: interleaved vertices plus a u32 index buffer.
pub struct Mesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

impl Mesh {
    pub fn new(device: &wgpu::Device, vertices: &[Vertex], indices: &[u32]) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Vertex Buffer"),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Index Buffer"),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        }
    }

    /// Approximate GPU residency in bytes, used for cache accounting.
    pub fn byte_size(vertices: &[Vertex], indices: &[u32]) -> u64 {
        (vertices.len() * std::mem::size_of::<Vertex>() + indices.len() * 4) as u64
    }
}

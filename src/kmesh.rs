use bytemuck::{Pod, Zeroable};

/// Scale applied to mesh positions by the vertex shader.
pub const MESH_SCALE: f32 = 0.1;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

const fn vertex(position: [f32; 3], color: [f32; 3]) -> Vertex {
    Vertex { position, color }
}

pub const CUBE_VERTICES: [Vertex; 8] = [
    vertex([-1.0, 1.0, -1.0], [1.0, 0.0, 1.0]),
    vertex([1.0, 1.0, -1.0], [0.0, 1.0, 0.0]),
    vertex([1.0, 1.0, 1.0], [0.0, 0.0, 1.0]),
    vertex([-1.0, 1.0, 1.0], [1.0, 0.0, 0.0]),
    vertex([-1.0, -1.0, -1.0], [0.0, 0.0, 1.0]),
    vertex([-1.0, -1.0, 1.0], [0.0, 1.0, 0.0]),
    vertex([1.0, -1.0, 1.0], [1.0, 0.0, 1.0]),
    vertex([1.0, -1.0, -1.0], [1.0, 0.0, 0.0]),
];

/// Triangle list, counter-clockwise when seen from outside.
pub const CUBE_INDICES: [u16; 36] = [
    0, 2, 1, 2, 0, 3, // top
    4, 6, 5, 6, 4, 7, // bottom
    2, 6, 7, 7, 1, 2, // right
    0, 4, 5, 5, 3, 0, // left
    3, 5, 6, 6, 2, 3, // front
    0, 1, 7, 7, 4, 0, // back
];

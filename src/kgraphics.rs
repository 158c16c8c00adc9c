//! Draw primitives the frame renderer drives for each eye.
//!
//! Context bootstrap, program linking and mesh upload happen when a backend is
//! constructed; everything below assumes the backend's context is current on
//! the render thread.

use crate::kmath::Mat4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Viewport {
    pub fn full(width: i32, height: i32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    /// The four 1 pixel strips along the left, right, bottom and top edges.
    pub fn border_strips(&self) -> [Viewport; 4] {
        [
            Viewport {
                x: self.x,
                y: self.y,
                width: 1,
                height: self.height,
            },
            Viewport {
                x: self.x + self.width - 1,
                y: self.y,
                width: 1,
                height: self.height,
            },
            Viewport {
                x: self.x,
                y: self.y,
                width: self.width,
                height: 1,
            },
            Viewport {
                x: self.x,
                y: self.y + self.height - 1,
                width: self.width,
                height: 1,
            },
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EyeMatrices {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
}

impl EyeMatrices {
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    pub fn model_view_projection(&self) -> Mat4 {
        self.projection * (self.view * self.model)
    }
}

pub trait GraphicsBackend {
    /// Color image handed out by the runtime swapchain.
    type Image: Copy;
    type Texture: Copy;
    type Framebuffer: Copy;

    fn label(&self) -> &'static str;

    /// Allocates a 24-bit depth texture of the given size.
    fn create_depth_texture(&mut self, width: u32, height: u32) -> Result<Self::Texture, String>;
    /// Binds `color` and `depth` to a new framebuffer. An incomplete
    /// framebuffer is deleted again and reported as `Err(status)`.
    fn create_framebuffer(
        &mut self,
        color: Self::Image,
        depth: Self::Texture,
    ) -> Result<Self::Framebuffer, String>;
    fn delete_framebuffer(&mut self, framebuffer: Self::Framebuffer);
    fn delete_texture(&mut self, texture: Self::Texture);

    /// Binds the framebuffer, enables cull/depth/scissor tests and sets the
    /// viewport and scissor to `viewport`.
    fn begin_pass(&mut self, framebuffer: Self::Framebuffer, viewport: Viewport);
    /// Clears color, depth and stencil inside the current scissor.
    fn clear(&mut self, color: [f32; 4]);
    /// Binds the shared program, uploads the matrices and draws the mesh.
    fn draw_mesh(&mut self, matrices: &EyeMatrices);
    /// Clears only the color buffer inside `region`.
    fn clear_region(&mut self, region: Viewport, color: [f32; 4]);
    /// Hints that depth does not need to survive this pass.
    fn invalidate_depth(&mut self);
    fn end_pass(&mut self);

    /// Releases program and mesh objects.
    fn destroy(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn border_strips_hug_every_edge() {
        let strips = Viewport::full(100, 50).border_strips();
        let strip = |x, y, width, height| Viewport {
            x,
            y,
            width,
            height,
        };
        assert_eq!(strips[0], strip(0, 0, 1, 50));
        assert_eq!(strips[1], strip(99, 0, 1, 50));
        assert_eq!(strips[2], strip(0, 0, 100, 1));
        assert_eq!(strips[3], strip(0, 49, 100, 1));
    }

    #[test]
    fn view_projection_is_projection_times_view() {
        let m = EyeMatrices {
            model: Mat4::translation(0.0, 0.0, -1.0),
            view: Mat4::translation(1.0, 0.0, 0.0),
            projection: Mat4::scale(2.0, 2.0, 2.0),
        };
        assert_eq!(m.view_projection(), Mat4::multiply(&m.projection, &m.view));
        assert_eq!(
            m.model_view_projection().transform_point([0.0, 0.0, 0.0]),
            [2.0, 0.0, -2.0, 1.0]
        );
    }
}

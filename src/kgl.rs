//! OpenGL backend on `glow`. Everything here expects the context it was
//! created with to be current on the calling thread.

use std::num::NonZeroU32;

use glow::HasContext;
use log::{debug, info, warn};

use crate::kerror::{KError, KResult};
use crate::kgraphics::{EyeMatrices, GraphicsBackend, Viewport};
use crate::kmesh::{Vertex, CUBE_INDICES, CUBE_VERTICES, MESH_SCALE};

const ATTRIB_POSITION: u32 = 0;
const ATTRIB_COLOR: u32 = 1;

const VERTEX_SHADER_BODY: &str = r#"
in vec3 position;
in vec3 color;
uniform mat4 uModelMatrix;
uniform mat4 uViewMatrix;
uniform mat4 uProjectionMatrix;

out vec3 vColor;
void main()
{
    gl_Position = uProjectionMatrix * (uViewMatrix * (uModelMatrix * vec4(position * MESH_SCALE, 1.0)));
    vColor = color;
}
"#;

const FRAGMENT_SHADER_BODY: &str = r#"
in lowp vec3 vColor;
out lowp vec4 outColor;
void main()
{
    outColor = vec4(vColor, 1.0);
}
"#;

fn shader_header(gl: &glow::Context) -> &'static str {
    if gl.version().is_embedded {
        "#version 300 es\n"
    } else {
        "#version 330 core\n"
    }
}

struct Program {
    program: glow::Program,
    model: Option<glow::UniformLocation>,
    view: Option<glow::UniformLocation>,
    projection: Option<glow::UniformLocation>,
}

struct Geometry {
    vertex_array: glow::VertexArray,
    vertex_buffer: glow::Buffer,
    index_buffer: glow::Buffer,
}

pub struct GlBackend {
    gl: glow::Context,
    program: Option<Program>,
    geometry: Option<Geometry>,
}

impl GlBackend {
    /// Compiles the shared program and uploads the cube. `debug` installs a
    /// GL debug-output callback that forwards to `log`.
    pub fn new(mut gl: glow::Context, debug: bool) -> KResult<Self> {
        let version = gl.version();
        info!(
            "OpenGL {}.{}{} {}",
            version.major,
            version.minor,
            if version.is_embedded { " ES" } else { "" },
            version.vendor_info
        );

        if debug {
            install_debug_callback(&mut gl);
        }

        let program = unsafe { create_program(&gl)? };
        let geometry = match unsafe { create_geometry(&gl) } {
            Ok(geometry) => geometry,
            Err(e) => {
                unsafe { gl.delete_program(program.program) };
                return Err(e);
            }
        };

        Ok(Self {
            gl,
            program: Some(program),
            geometry: Some(geometry),
        })
    }
}

unsafe fn compile_shader(gl: &glow::Context, kind: u32, body: &str) -> KResult<glow::Shader> {
    let shader = gl.create_shader(kind).map_err(KError::ShaderCompile)?;
    let source = format!(
        "{}#define MESH_SCALE {:?}\n{}",
        shader_header(gl),
        MESH_SCALE,
        body
    );
    gl.shader_source(shader, &source);
    gl.compile_shader(shader);
    if !gl.get_shader_compile_status(shader) {
        let log = gl.get_shader_info_log(shader);
        gl.delete_shader(shader);
        return Err(KError::ShaderCompile(log));
    }
    Ok(shader)
}

unsafe fn create_program(gl: &glow::Context) -> KResult<Program> {
    let vertex_shader = compile_shader(gl, glow::VERTEX_SHADER, VERTEX_SHADER_BODY)?;
    let fragment_shader = match compile_shader(gl, glow::FRAGMENT_SHADER, FRAGMENT_SHADER_BODY) {
        Ok(shader) => shader,
        Err(e) => {
            gl.delete_shader(vertex_shader);
            return Err(e);
        }
    };

    let program = match gl.create_program() {
        Ok(program) => program,
        Err(e) => {
            gl.delete_shader(vertex_shader);
            gl.delete_shader(fragment_shader);
            return Err(KError::ProgramLink(e));
        }
    };
    gl.attach_shader(program, vertex_shader);
    gl.attach_shader(program, fragment_shader);
    gl.bind_attrib_location(program, ATTRIB_POSITION, "position");
    gl.bind_attrib_location(program, ATTRIB_COLOR, "color");
    gl.link_program(program);

    gl.detach_shader(program, vertex_shader);
    gl.detach_shader(program, fragment_shader);
    gl.delete_shader(vertex_shader);
    gl.delete_shader(fragment_shader);

    if !gl.get_program_link_status(program) {
        let log = gl.get_program_info_log(program);
        gl.delete_program(program);
        return Err(KError::ProgramLink(log));
    }

    Ok(Program {
        program,
        model: gl.get_uniform_location(program, "uModelMatrix"),
        view: gl.get_uniform_location(program, "uViewMatrix"),
        projection: gl.get_uniform_location(program, "uProjectionMatrix"),
    })
}

unsafe fn create_geometry(gl: &glow::Context) -> KResult<Geometry> {
    let vertex_array = gl.create_vertex_array().map_err(KError::Graphics)?;
    let vertex_buffer = gl.create_buffer().map_err(KError::Graphics)?;
    let index_buffer = gl.create_buffer().map_err(KError::Graphics)?;

    gl.bind_vertex_array(Some(vertex_array));

    gl.bind_buffer(glow::ARRAY_BUFFER, Some(vertex_buffer));
    gl.buffer_data_u8_slice(
        glow::ARRAY_BUFFER,
        bytemuck::cast_slice(&CUBE_VERTICES),
        glow::STATIC_DRAW,
    );
    let stride = std::mem::size_of::<Vertex>() as i32;
    let color_offset = std::mem::size_of::<[f32; 3]>() as i32;
    gl.enable_vertex_attrib_array(ATTRIB_POSITION);
    gl.vertex_attrib_pointer_f32(ATTRIB_POSITION, 3, glow::FLOAT, false, stride, 0);
    gl.enable_vertex_attrib_array(ATTRIB_COLOR);
    gl.vertex_attrib_pointer_f32(ATTRIB_COLOR, 3, glow::FLOAT, false, stride, color_offset);

    gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(index_buffer));
    gl.buffer_data_u8_slice(
        glow::ELEMENT_ARRAY_BUFFER,
        bytemuck::cast_slice(&CUBE_INDICES),
        glow::STATIC_DRAW,
    );

    gl.bind_vertex_array(None);
    Ok(Geometry {
        vertex_array,
        vertex_buffer,
        index_buffer,
    })
}

fn install_debug_callback(gl: &mut glow::Context) {
    if !gl.supports_debug() {
        warn!("GL debug output not supported by this context");
        return;
    }
    unsafe {
        gl.enable(glow::DEBUG_OUTPUT);
        gl.debug_message_callback(|_source, kind, id, severity, message| {
            match severity {
                glow::DEBUG_SEVERITY_HIGH => log::error!("GL 0x{:x} ({}): {}", kind, id, message),
                glow::DEBUG_SEVERITY_MEDIUM | glow::DEBUG_SEVERITY_LOW => {
                    log::warn!("GL 0x{:x} ({}): {}", kind, id, message)
                }
                _ => log::debug!("GL 0x{:x} ({}): {}", kind, id, message),
            }
        });
    }
    info!("GL debug output enabled");
}

fn framebuffer_status_string(status: u32) -> String {
    match status {
        glow::FRAMEBUFFER_UNDEFINED => "GL_FRAMEBUFFER_UNDEFINED".into(),
        glow::FRAMEBUFFER_INCOMPLETE_ATTACHMENT => "GL_FRAMEBUFFER_INCOMPLETE_ATTACHMENT".into(),
        glow::FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT => {
            "GL_FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT".into()
        }
        glow::FRAMEBUFFER_UNSUPPORTED => "GL_FRAMEBUFFER_UNSUPPORTED".into(),
        glow::FRAMEBUFFER_INCOMPLETE_MULTISAMPLE => "GL_FRAMEBUFFER_INCOMPLETE_MULTISAMPLE".into(),
        other => format!("unknown framebuffer status 0x{:x}", other),
    }
}

unsafe fn set_sampling(gl: &glow::Context, filter: u32) {
    gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, filter as i32);
    gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, filter as i32);
    gl.tex_parameter_i32(
        glow::TEXTURE_2D,
        glow::TEXTURE_WRAP_S,
        glow::CLAMP_TO_EDGE as i32,
    );
    gl.tex_parameter_i32(
        glow::TEXTURE_2D,
        glow::TEXTURE_WRAP_T,
        glow::CLAMP_TO_EDGE as i32,
    );
}

impl GraphicsBackend for GlBackend {
    /// GL texture name handed out by the OpenXR swapchain.
    type Image = u32;
    type Texture = glow::Texture;
    type Framebuffer = glow::Framebuffer;

    fn label(&self) -> &'static str {
        "OpenGL"
    }

    fn create_depth_texture(&mut self, width: u32, height: u32) -> Result<Self::Texture, String> {
        let gl = &self.gl;
        unsafe {
            let texture = gl.create_texture()?;
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            set_sampling(gl, glow::NEAREST);
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::DEPTH_COMPONENT24 as i32,
                width as i32,
                height as i32,
                0,
                glow::DEPTH_COMPONENT,
                glow::UNSIGNED_INT,
                None,
            );
            gl.bind_texture(glow::TEXTURE_2D, None);
            Ok(texture)
        }
    }

    fn create_framebuffer(
        &mut self,
        color: Self::Image,
        depth: Self::Texture,
    ) -> Result<Self::Framebuffer, String> {
        let color = NonZeroU32::new(color)
            .map(glow::NativeTexture)
            .ok_or_else(|| "swapchain image 0 is not a texture".to_owned())?;
        let gl = &self.gl;
        unsafe {
            debug!("color texture {:?}", color);
            gl.bind_texture(glow::TEXTURE_2D, Some(color));
            set_sampling(gl, glow::LINEAR);
            gl.bind_texture(glow::TEXTURE_2D, None);

            let framebuffer = gl.create_framebuffer()?;
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));
            gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(color),
                0,
            );
            gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::DEPTH_ATTACHMENT,
                glow::TEXTURE_2D,
                Some(depth),
                0,
            );
            let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);

            if status != glow::FRAMEBUFFER_COMPLETE {
                gl.delete_framebuffer(framebuffer);
                return Err(framebuffer_status_string(status));
            }
            Ok(framebuffer)
        }
    }

    fn delete_framebuffer(&mut self, framebuffer: Self::Framebuffer) {
        unsafe { self.gl.delete_framebuffer(framebuffer) };
    }

    fn delete_texture(&mut self, texture: Self::Texture) {
        unsafe { self.gl.delete_texture(texture) };
    }

    fn begin_pass(&mut self, framebuffer: Self::Framebuffer, viewport: Viewport) {
        let gl = &self.gl;
        unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));
            gl.enable(glow::CULL_FACE);
            gl.enable(glow::DEPTH_TEST);
            gl.enable(glow::SCISSOR_TEST);
            gl.viewport(viewport.x, viewport.y, viewport.width, viewport.height);
            gl.scissor(viewport.x, viewport.y, viewport.width, viewport.height);
        }
    }

    fn clear(&mut self, color: [f32; 4]) {
        unsafe {
            self.gl.clear_color(color[0], color[1], color[2], color[3]);
            self.gl.clear(
                glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT | glow::STENCIL_BUFFER_BIT,
            );
        }
    }

    fn draw_mesh(&mut self, matrices: &EyeMatrices) {
        let (Some(program), Some(geometry)) = (&self.program, &self.geometry) else {
            warn!("draw after destroy");
            return;
        };
        let gl = &self.gl;
        unsafe {
            gl.use_program(Some(program.program));
            gl.uniform_matrix_4_f32_slice(program.model.as_ref(), false, matrices.model.as_slice());
            gl.uniform_matrix_4_f32_slice(program.view.as_ref(), false, matrices.view.as_slice());
            gl.uniform_matrix_4_f32_slice(
                program.projection.as_ref(),
                false,
                matrices.projection.as_slice(),
            );
            gl.bind_vertex_array(Some(geometry.vertex_array));
            gl.draw_elements(
                glow::TRIANGLES,
                CUBE_INDICES.len() as i32,
                glow::UNSIGNED_SHORT,
                0,
            );
            gl.bind_vertex_array(None);
            gl.use_program(None);
        }
    }

    fn clear_region(&mut self, region: Viewport, color: [f32; 4]) {
        let gl = &self.gl;
        unsafe {
            gl.clear_color(color[0], color[1], color[2], color[3]);
            gl.scissor(region.x, region.y, region.width, region.height);
            gl.clear(glow::COLOR_BUFFER_BIT);
        }
    }

    fn invalidate_depth(&mut self) {
        let gl = &self.gl;
        unsafe {
            gl.invalidate_framebuffer(glow::DRAW_FRAMEBUFFER, &[glow::DEPTH_ATTACHMENT]);
        }
    }

    fn end_pass(&mut self) {
        unsafe {
            self.gl.flush();
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, None);
        }
    }

    fn destroy(&mut self) {
        let gl = &self.gl;
        if let Some(geometry) = self.geometry.take() {
            unsafe {
                gl.delete_buffer(geometry.index_buffer);
                gl.delete_buffer(geometry.vertex_buffer);
                gl.delete_vertex_array(geometry.vertex_array);
            }
        }
        if let Some(program) = self.program.take() {
            unsafe { gl.delete_program(program.program) };
        }
    }
}

//! Column-major 4x4 matrices for the per-eye transforms.
//!
//! Element `m[c * 4 + r]` is row `r` of column `c`, which is the layout GL
//! expects for `uniform mat4` uploads with `transpose = false`. Vectors are
//! columns, so `a * b` applies `b` first.

use std::ops::Mul;

use openxr as xr;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat4 {
    pub m: [f32; 16],
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mat4 {
    pub const IDENTITY: Mat4 = Mat4 {
        m: [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ],
    };

    pub fn from_cols_array(m: [f32; 16]) -> Self {
        Self { m }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.m
    }

    /// Off-axis projection from the tangents of the four half angles.
    ///
    /// When `far_z <= near_z` the far plane is pushed to infinity; that branch
    /// never divides by `far_z - near_z`.
    pub fn projection(
        tan_left: f32,
        tan_right: f32,
        tan_up: f32,
        tan_down: f32,
        near_z: f32,
        far_z: f32,
    ) -> Self {
        let tan_width = tan_right - tan_left;
        let tan_height = tan_up - tan_down;
        let offset_z = near_z;

        let mut m = [0.0; 16];
        m[0] = 2.0 / tan_width;
        m[8] = (tan_right + tan_left) / tan_width;

        m[5] = 2.0 / tan_height;
        m[9] = (tan_up + tan_down) / tan_height;

        if far_z <= near_z {
            m[10] = -1.0;
            m[14] = -(near_z + offset_z);
        } else {
            m[10] = -(far_z + offset_z) / (far_z - near_z);
            m[14] = -(far_z * (near_z + offset_z)) / (far_z - near_z);
        }

        m[11] = -1.0;
        Self { m }
    }

    pub fn projection_fov(fov: &xr::Fovf, near_z: f32, far_z: f32) -> Self {
        Self::projection(
            fov.angle_left.tan(),
            fov.angle_right.tan(),
            fov.angle_up.tan(),
            fov.angle_down.tan(),
            near_z,
            far_z,
        )
    }

    pub fn scale(x: f32, y: f32, z: f32) -> Self {
        let mut out = Self::IDENTITY;
        out.m[0] = x;
        out.m[5] = y;
        out.m[10] = z;
        out
    }

    /// Rotation matrix for a unit quaternion. Non-unit input is not normalized.
    pub fn from_quaternion(q: &xr::Quaternionf) -> Self {
        let x2 = q.x + q.x;
        let y2 = q.y + q.y;
        let z2 = q.z + q.z;

        let xx2 = q.x * x2;
        let yy2 = q.y * y2;
        let zz2 = q.z * z2;

        let yz2 = q.y * z2;
        let wx2 = q.w * x2;
        let xy2 = q.x * y2;
        let wz2 = q.w * z2;
        let xz2 = q.x * z2;
        let wy2 = q.w * y2;

        Self {
            m: [
                1.0 - yy2 - zz2,
                xy2 + wz2,
                xz2 - wy2,
                0.0,
                xy2 - wz2,
                1.0 - xx2 - zz2,
                yz2 + wx2,
                0.0,
                xz2 + wy2,
                yz2 - wx2,
                1.0 - xx2 - yy2,
                0.0,
                0.0,
                0.0,
                0.0,
                1.0,
            ],
        }
    }

    pub fn translation(x: f32, y: f32, z: f32) -> Self {
        let mut out = Self::IDENTITY;
        out.m[12] = x;
        out.m[13] = y;
        out.m[14] = z;
        out
    }

    /// `a · b`. Swapping the operands gives a different transform.
    pub fn multiply(a: &Mat4, b: &Mat4) -> Self {
        let a = &a.m;
        let b = &b.m;
        let mut m = [0.0; 16];
        for col in 0..4 {
            for row in 0..4 {
                m[col * 4 + row] = a[row] * b[col * 4]
                    + a[4 + row] * b[col * 4 + 1]
                    + a[8 + row] * b[col * 4 + 2]
                    + a[12 + row] * b[col * 4 + 3];
            }
        }
        Self { m }
    }

    /// `T · R · S`: scale first, then rotate, then translate.
    pub fn translation_rotation_scale(
        translation: &xr::Vector3f,
        rotation: &xr::Quaternionf,
        scale: &xr::Vector3f,
    ) -> Self {
        let scale = Self::scale(scale.x, scale.y, scale.z);
        let rotation = Self::from_quaternion(rotation);
        let translation = Self::translation(translation.x, translation.y, translation.z);
        Self::multiply(&translation, &Self::multiply(&rotation, &scale))
    }

    /// Inverse of a rotation + translation matrix: transposed rotation and
    /// negated dot products for the translation.
    ///
    /// Only valid when the upper 3x3 is orthonormal. Any scale or shear in
    /// `self` produces a wrong result without warning.
    pub fn invert_rigid_body(&self) -> Self {
        let src = &self.m;
        Self {
            m: [
                src[0],
                src[4],
                src[8],
                0.0,
                src[1],
                src[5],
                src[9],
                0.0,
                src[2],
                src[6],
                src[10],
                0.0,
                -(src[0] * src[12] + src[1] * src[13] + src[2] * src[14]),
                -(src[4] * src[12] + src[5] * src[13] + src[6] * src[14]),
                -(src[8] * src[12] + src[9] * src[13] + src[10] * src[14]),
                1.0,
            ],
        }
    }

    /// Transforms `(x, y, z, 1)` and returns the homogeneous result.
    pub fn transform_point(&self, p: [f32; 3]) -> [f32; 4] {
        let m = &self.m;
        let mut out = [0.0; 4];
        for (row, value) in out.iter_mut().enumerate() {
            *value = m[row] * p[0] + m[4 + row] * p[1] + m[8 + row] * p[2] + m[12 + row];
        }
        out
    }
}

impl Mul for Mat4 {
    type Output = Mat4;

    fn mul(self, rhs: Mat4) -> Mat4 {
        Mat4::multiply(&self, &rhs)
    }
}

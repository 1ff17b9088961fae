//! Math primitives for avatar retargeting and scene transforms
//!
//! Quaternions use Hamilton convention with `(x, y, z, w)` storage.
//! Euler angles follow the yaw (Y) / pitch (X) / roll (Z) order used by
//! the rendering engine, so values computed here can be handed to scene
//! nodes unchanged.

use std::f32::consts::FRAC_PI_2;
use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

/// 3D vector (scene units)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 3]", into = "[f32; 3]")]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };
    pub const ONE: Vec3 = Vec3 { x: 1.0, y: 1.0, z: 1.0 };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Linear interpolation
    pub fn lerp(&self, other: &Vec3, t: f32) -> Vec3 {
        Vec3 {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            z: self.z + (other.z - self.z) * t,
        }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Distance to another position
    pub fn distance(&self, other: &Vec3) -> f32 {
        (*self - *other).length()
    }
}

impl From<[f32; 3]> for Vec3 {
    fn from(v: [f32; 3]) -> Self {
        Vec3::new(v[0], v[1], v[2])
    }
}

impl From<Vec3> for [f32; 3] {
    fn from(v: Vec3) -> Self {
        [v.x, v.y, v.z]
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Euler decomposition of a rotation, in radians
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EulerAngles {
    /// Rotation about X
    pub pitch: f32,
    /// Rotation about Y
    pub yaw: f32,
    /// Rotation about Z
    pub roll: f32,
}

impl EulerAngles {
    pub fn new(pitch: f32, yaw: f32, roll: f32) -> Self {
        Self { pitch, yaw, roll }
    }
}

/// Rotation quaternion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quat {
    pub const IDENTITY: Quat = Quat { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    pub fn from_yaw_pitch_roll(yaw: f32, pitch: f32, roll: f32) -> Self {
        let (sr, cr) = (roll * 0.5).sin_cos();
        let (sp, cp) = (pitch * 0.5).sin_cos();
        let (sy, cy) = (yaw * 0.5).sin_cos();

        Self {
            x: cy * sp * cr + sy * cp * sr,
            y: sy * cp * cr - cy * sp * sr,
            z: cy * cp * sr - sy * sp * cr,
            w: cy * cp * cr + sy * sp * sr,
        }
    }

    pub fn from_euler(angles: EulerAngles) -> Self {
        Self::from_yaw_pitch_roll(angles.yaw, angles.pitch, angles.roll)
    }

    /// Inverse of [`Quat::from_yaw_pitch_roll`]; gimbal-locked inputs
    /// collapse roll into yaw.
    pub fn to_euler(&self) -> EulerAngles {
        let (x, y, z, w) = (self.x, self.y, self.z, self.w);
        let z_axis_y = y * z - x * w;
        let limit = 0.499_999_9;

        if z_axis_y < -limit {
            return EulerAngles::new(FRAC_PI_2, 2.0 * y.atan2(w), 0.0);
        }
        if z_axis_y > limit {
            return EulerAngles::new(-FRAC_PI_2, 2.0 * y.atan2(w), 0.0);
        }

        let (sqx, sqy, sqz, sqw) = (x * x, y * y, z * z, w * w);
        EulerAngles {
            pitch: (-2.0 * z_axis_y).clamp(-1.0, 1.0).asin(),
            yaw: (2.0 * (z * x + y * w)).atan2(sqz - sqx - sqy + sqw),
            roll: (2.0 * (x * y + z * w)).atan2(-sqz - sqx + sqy + sqw),
        }
    }

    /// Extract the rotation from a 3x3 row-indexed rotation matrix
    pub fn from_rotation_matrix(r: [[f32; 3]; 3]) -> Self {
        let trace = r[0][0] + r[1][1] + r[2][2];

        let q = if trace > 0.0 {
            let s = 0.5 / (trace + 1.0).sqrt();
            Quat::new(
                (r[2][1] - r[1][2]) * s,
                (r[0][2] - r[2][0]) * s,
                (r[1][0] - r[0][1]) * s,
                0.25 / s,
            )
        } else if r[0][0] > r[1][1] && r[0][0] > r[2][2] {
            let s = 2.0 * (1.0 + r[0][0] - r[1][1] - r[2][2]).sqrt();
            Quat::new(
                0.25 * s,
                (r[0][1] + r[1][0]) / s,
                (r[0][2] + r[2][0]) / s,
                (r[2][1] - r[1][2]) / s,
            )
        } else if r[1][1] > r[2][2] {
            let s = 2.0 * (1.0 + r[1][1] - r[0][0] - r[2][2]).sqrt();
            Quat::new(
                (r[0][1] + r[1][0]) / s,
                0.25 * s,
                (r[1][2] + r[2][1]) / s,
                (r[0][2] - r[2][0]) / s,
            )
        } else {
            let s = 2.0 * (1.0 + r[2][2] - r[0][0] - r[1][1]).sqrt();
            Quat::new(
                (r[0][2] + r[2][0]) / s,
                (r[1][2] + r[2][1]) / s,
                0.25 * s,
                (r[1][0] - r[0][1]) / s,
            )
        };

        q.normalize()
    }

    /// Row-indexed rotation matrix
    pub fn to_rotation_matrix(&self) -> [[f32; 3]; 3] {
        let (x, y, z, w) = (self.x, self.y, self.z, self.w);
        [
            [
                1.0 - 2.0 * (y * y + z * z),
                2.0 * (x * y - z * w),
                2.0 * (x * z + y * w),
            ],
            [
                2.0 * (x * y + z * w),
                1.0 - 2.0 * (x * x + z * z),
                2.0 * (y * z - x * w),
            ],
            [
                2.0 * (x * z - y * w),
                2.0 * (y * z + x * w),
                1.0 - 2.0 * (x * x + y * y),
            ],
        ]
    }

    /// Reflect across the camera's vertical plane.
    ///
    /// Negating `x` and `w` together equals `-(x, -y, -z, w)`, which is the
    /// same rotation as the YZ-plane reflection, so the result stays unit.
    pub fn mirrored(&self) -> Quat {
        Quat::new(-self.x, self.y, self.z, -self.w)
    }

    pub fn dot(&self, other: &Quat) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }

    pub fn norm(&self) -> f32 {
        self.dot(self).sqrt()
    }

    pub fn normalize(&self) -> Quat {
        let len = self.norm();
        if len < 0.0001 {
            return Quat::IDENTITY;
        }
        Quat::new(self.x / len, self.y / len, self.z / len, self.w / len)
    }

    pub fn conjugate(&self) -> Quat {
        Quat::new(-self.x, -self.y, -self.z, self.w)
    }

    /// Angle between two rotations, in radians
    pub fn angle_to(&self, other: &Quat) -> f32 {
        let d = self.dot(other).abs().min(1.0);
        2.0 * d.acos()
    }

    /// Spherical linear interpolation
    pub fn slerp(&self, other: &Quat, t: f32) -> Quat {
        let mut dot = self.dot(other);

        let other = if dot < 0.0 {
            dot = -dot;
            Quat::new(-other.x, -other.y, -other.z, -other.w)
        } else {
            *other
        };

        if dot > 0.9995 {
            // Linear interpolation for very close quaternions
            let result = Quat::new(
                self.x + (other.x - self.x) * t,
                self.y + (other.y - self.y) * t,
                self.z + (other.z - self.z) * t,
                self.w + (other.w - self.w) * t,
            );
            return result.normalize();
        }

        let theta_0 = dot.acos();
        let theta = theta_0 * t;
        let sin_theta = theta.sin();
        let sin_theta_0 = theta_0.sin();

        let s0 = theta.cos() - dot * sin_theta / sin_theta_0;
        let s1 = sin_theta / sin_theta_0;

        Quat::new(
            self.x * s0 + other.x * s1,
            self.y * s0 + other.y * s1,
            self.z * s0 + other.z * s1,
            self.w * s0 + other.w * s1,
        )
    }
}

impl Mul for Quat {
    type Output = Quat;

    fn mul(self, rhs: Quat) -> Quat {
        Quat::new(
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        )
    }
}

impl From<[f32; 4]> for Quat {
    fn from(v: [f32; 4]) -> Self {
        Quat::new(v[0], v[1], v[2], v[3])
    }
}

impl From<Quat> for [f32; 4] {
    fn from(q: Quat) -> Self {
        [q.x, q.y, q.z, q.w]
    }
}

/// 4x4 affine matrix, column-major (`m[col * 4 + row]`)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat4 {
    pub m: [f32; 16],
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mat4 {
    pub fn identity() -> Self {
        let mut m = [0.0; 16];
        m[0] = 1.0;
        m[5] = 1.0;
        m[10] = 1.0;
        m[15] = 1.0;
        Mat4 { m }
    }

    pub fn from_cols_array(m: [f32; 16]) -> Self {
        Mat4 { m }
    }

    /// Build from a slice of 16 column-major values
    pub fn from_slice(values: &[f32]) -> Option<Self> {
        let m: [f32; 16] = values.get(..16)?.try_into().ok()?;
        Some(Mat4 { m })
    }

    pub fn from_rotation_translation(rotation: Quat, translation: Vec3) -> Self {
        Self::from_scale_rotation_translation(Vec3::ONE, rotation, translation)
    }

    pub fn from_scale_rotation_translation(scale: Vec3, rotation: Quat, translation: Vec3) -> Self {
        let r = rotation.to_rotation_matrix();
        let s = [scale.x, scale.y, scale.z];
        let mut m = [0.0; 16];
        for col in 0..3 {
            for row in 0..3 {
                m[col * 4 + row] = r[row][col] * s[col];
            }
        }
        m[12] = translation.x;
        m[13] = translation.y;
        m[14] = translation.z;
        m[15] = 1.0;
        Mat4 { m }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.m[col * 4 + row]
    }

    pub fn translation(&self) -> Vec3 {
        Vec3::new(self.m[12], self.m[13], self.m[14])
    }

    pub fn scale(&self) -> Vec3 {
        let column = |c: usize| {
            Vec3::new(self.get(0, c), self.get(1, c), self.get(2, c)).length()
        };
        Vec3::new(column(0), column(1), column(2))
    }

    /// Rotation part with scale removed
    pub fn rotation(&self) -> Quat {
        let scale = self.scale();
        let s = [scale.x, scale.y, scale.z];
        let mut r = [[0.0f32; 3]; 3];
        for (col, sc) in s.iter().enumerate() {
            let inv = if *sc > f32::EPSILON { 1.0 / sc } else { 0.0 };
            for (row, line) in r.iter_mut().enumerate() {
                line[col] = self.get(row, col) * inv;
            }
        }
        Quat::from_rotation_matrix(r)
    }
}

/// Scene transform (position, rotation, scale)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_position(position: Vec3) -> Self {
        Transform {
            position,
            ..Self::IDENTITY
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }
}

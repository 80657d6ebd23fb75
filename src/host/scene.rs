//! Scene state as the frame handlers see it: frame counters, frame rate and
//! named objects carrying world-space transforms.

use std::collections::BTreeMap;

/// Threshold under which the Y rotation is treated as gimbal-locked.
const GIMBAL_EPSILON: f64 = 16.0 * f32::EPSILON as f64;

/// 3x3 rotation matrix, row-major.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix3 {
    rows: [[f64; 3]; 3],
}

impl Default for Matrix3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix3 {
    pub const IDENTITY: Matrix3 = Matrix3 {
        rows: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
    };

    pub fn from_rows(rows: [[f64; 3]; 3]) -> Self {
        Self { rows }
    }

    pub fn rotation_x(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self::from_rows([[1.0, 0.0, 0.0], [0.0, c, -s], [0.0, s, c]])
    }

    pub fn rotation_y(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self::from_rows([[c, 0.0, s], [0.0, 1.0, 0.0], [-s, 0.0, c]])
    }

    pub fn rotation_z(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self::from_rows([[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]])
    }

    pub fn mul(&self, other: &Matrix3) -> Matrix3 {
        let mut rows = [[0.0; 3]; 3];
        for (r, row) in rows.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell = (0..3).map(|k| self.rows[r][k] * other.rows[k][c]).sum();
            }
        }
        Matrix3 { rows }
    }

    pub fn is_finite(&self) -> bool {
        self.rows.iter().flatten().all(|v| v.is_finite())
    }

    /// Decomposes the rotation into XYZ Euler angles (radians), applied as
    /// `Rz * Ry * Rx`.
    ///
    /// Two solutions exist away from gimbal lock; the one with the smaller
    /// total magnitude is returned.
    pub fn to_euler_xyz(&self) -> [f64; 3] {
        let m = &self.rows;
        let cy = m[0][0].hypot(m[1][0]);

        if cy > GIMBAL_EPSILON {
            let first = [
                m[2][1].atan2(m[2][2]),
                (-m[2][0]).atan2(cy),
                m[1][0].atan2(m[0][0]),
            ];
            let second = [
                (-m[2][1]).atan2(-m[2][2]),
                (-m[2][0]).atan2(-cy),
                (-m[1][0]).atan2(-m[0][0]),
            ];
            let magnitude = |e: &[f64; 3]| e.iter().map(|v| v.abs()).sum::<f64>();
            if magnitude(&first) > magnitude(&second) {
                second
            } else {
                first
            }
        } else {
            [(-m[1][2]).atan2(m[1][1]), (-m[2][0]).atan2(cy), 0.0]
        }
    }
}

/// World-space placement of an object.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Transform {
    pub rotation: Matrix3,
    pub translation: [f64; 3],
}

impl Transform {
    pub fn new(rotation: Matrix3, translation: [f64; 3]) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn euler_xyz(&self) -> [f64; 3] {
        self.rotation.to_euler_xyz()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    name: String,
    pub matrix_world: Transform,
}

impl SceneObject {
    pub fn new(name: impl Into<String>, matrix_world: Transform) -> Self {
        Self {
            name: name.into(),
            matrix_world,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone)]
pub struct Scene {
    pub frame_current: i32,
    pub frame_start: i32,
    pub frame_end: i32,
    fps: u32,
    objects: BTreeMap<String, SceneObject>,
}

impl Scene {
    pub fn new(fps: u32, frame_start: i32, frame_end: i32) -> Self {
        Self {
            frame_current: frame_start,
            frame_start,
            frame_end,
            fps: fps.max(1),
            objects: BTreeMap::new(),
        }
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn object(&self, name: &str) -> Option<&SceneObject> {
        self.objects.get(name)
    }

    pub fn object_mut(&mut self, name: &str) -> Option<&mut SceneObject> {
        self.objects.get_mut(name)
    }

    pub fn insert_object(&mut self, object: SceneObject) {
        self.objects.insert(object.name.clone(), object);
    }

    /// Seconds elapsed at the current frame.
    pub fn elapsed_seconds(&self) -> f64 {
        f64::from(self.frame_current) / f64::from(self.fps)
    }
}

/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! 3x3 homogeneous transforms and the per-strip stabilization state built from them.

use std::ops::Mul;

use serde::{Deserialize, Serialize};

use crate::{PlayerError, Result};

/// Entry-wise tolerance used by `PartialEq`.
pub const DEFAULT_TOLERANCE: f32 = 1e-3;

/// A 3x3 homogeneous 2D transform stored row-major.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Transform {
    m: [f32; 9],
}

const IDENTITY: [f32; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub const fn identity() -> Self {
        Self { m: IDENTITY }
    }

    pub const fn new(m: [f32; 9]) -> Self {
        Self { m }
    }

    /// Builds a transform from a row-major slice, which must hold exactly 9 entries.
    pub fn from_slice(entries: &[f32]) -> Result<Self> {
        let m: [f32; 9] = entries
            .try_into()
            .map_err(|_| PlayerError::InvalidTransform { len: entries.len() })?;
        Ok(Self { m })
    }

    pub fn translation(tx: f32, ty: f32) -> Self {
        Self::new([1.0, 0.0, tx, 0.0, 1.0, ty, 0.0, 0.0, 1.0])
    }

    pub fn scaling(sx: f32, sy: f32) -> Self {
        Self::new([sx, 0.0, 0.0, 0.0, sy, 0.0, 0.0, 0.0, 1.0])
    }

    /// Counter-clockwise rotation about the origin.
    pub fn rotation(radians: f32) -> Self {
        let (sin, cos) = radians.sin_cos();
        Self::new([cos, -sin, 0.0, sin, cos, 0.0, 0.0, 0.0, 1.0])
    }

    pub fn entries(&self) -> &[f32; 9] {
        &self.m
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.m[row * 3 + col]
    }

    fn multiply(a: &[f32; 9], b: &[f32; 9]) -> [f32; 9] {
        let mut out = [0.0; 9];
        for row in 0..3 {
            for col in 0..3 {
                out[row * 3 + col] = (0..3).map(|k| a[row * 3 + k] * b[k * 3 + col]).sum();
            }
        }
        out
    }

    /// Returns `other × self`: `other` is applied after `self`.
    pub fn compose_left(&self, other: &Transform) -> Transform {
        Transform::new(Self::multiply(&other.m, &self.m))
    }

    /// Returns `self × other`: `other` is applied before `self`.
    pub fn compose_right(&self, other: &Transform) -> Transform {
        Transform::new(Self::multiply(&self.m, &other.m))
    }

    /// Row vector product `vᵀ × M`.
    pub fn apply_left(&self, v: [f32; 3]) -> [f32; 3] {
        let m = &self.m;
        [
            v[0] * m[0] + v[1] * m[3] + v[2] * m[6],
            v[0] * m[1] + v[1] * m[4] + v[2] * m[7],
            v[0] * m[2] + v[1] * m[5] + v[2] * m[8],
        ]
    }

    /// Column vector product `M × v`.
    pub fn apply_right(&self, v: [f32; 3]) -> [f32; 3] {
        let m = &self.m;
        [
            m[0] * v[0] + m[1] * v[1] + m[2] * v[2],
            m[3] * v[0] + m[4] * v[1] + m[5] * v[2],
            m[6] * v[0] + m[7] * v[1] + m[8] * v[2],
        ]
    }

    /// Maps a 2D point through the transform, with homogeneous division.
    pub fn map_point(&self, x: f32, y: f32) -> (f32, f32) {
        let [px, py, w] = self.apply_right([x, y, 1.0]);
        (px / w, py / w)
    }

    pub fn scale(&self, factor: f32) -> Transform {
        Transform::new(self.m.map(|v| v * factor))
    }

    pub fn add_scalar(&self, value: f32) -> Transform {
        Transform::new(self.m.map(|v| v + value))
    }

    /// Re-expresses a pixel-space transform for a `width` x `height` image as one that
    /// takes unit-square texture coordinates to normalized device coordinates.
    ///
    /// Pixel space has its origin at the top-left with Y pointing down; device space
    /// has its origin at the center with Y pointing up and spans [-1, 1].
    pub fn to_device_space(&self, width: u32, height: u32) -> Transform {
        let (w, h) = (width as f32, height as f32);
        let unit_to_pixels = Transform::scaling(w, h);
        let pixels_to_device =
            Transform::new([2.0 / w, 0.0, -1.0, 0.0, -2.0 / h, 1.0, 0.0, 0.0, 1.0]);
        pixels_to_device * *self * unit_to_pixels
    }

    /// True when every pair of entries differs by at most `eps`.
    pub fn approx_eq(&self, other: &Transform, eps: f32) -> bool {
        self.m
            .iter()
            .zip(other.m.iter())
            .all(|(a, b)| (a - b).abs() <= eps)
    }

    pub fn is_identity(&self) -> bool {
        self.approx_eq(&Transform::identity(), DEFAULT_TOLERANCE)
    }
}

impl PartialEq for Transform {
    fn eq(&self, other: &Self) -> bool {
        self.approx_eq(other, DEFAULT_TOLERANCE)
    }
}

impl Mul for Transform {
    type Output = Transform;

    fn mul(self, rhs: Transform) -> Transform {
        self.compose_right(&rhs)
    }
}

impl Mul<f32> for Transform {
    type Output = Transform;

    fn mul(self, rhs: f32) -> Transform {
        self.scale(rhs)
    }
}

impl TryFrom<&[f32]> for Transform {
    type Error = PlayerError;

    fn try_from(entries: &[f32]) -> Result<Self> {
        Transform::from_slice(entries)
    }
}

impl TryFrom<Vec<f32>> for Transform {
    type Error = PlayerError;

    fn try_from(entries: Vec<f32>) -> Result<Self> {
        Transform::from_slice(&entries)
    }
}

/// Accumulated stabilization state: one transform per horizontal strip of the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StripTransformSet {
    strips: Vec<Transform>,
}

impl StripTransformSet {
    pub fn identity(strip_count: usize) -> Self {
        Self {
            strips: vec![Transform::identity(); strip_count],
        }
    }

    pub fn from_transforms(strips: Vec<Transform>) -> Self {
        Self { strips }
    }

    pub fn len(&self) -> usize {
        self.strips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strips.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transform> {
        self.strips.iter()
    }

    pub fn as_slice(&self) -> &[Transform] {
        &self.strips
    }

    pub fn is_identity(&self) -> bool {
        self.strips.iter().all(Transform::is_identity)
    }

    /// Left-composes each strip with its increment, producing a new set.
    ///
    /// Both sets must hold the same number of strips.
    pub fn compose_left(&self, increments: &StripTransformSet) -> StripTransformSet {
        debug_assert_eq!(self.len(), increments.len());
        StripTransformSet {
            strips: self
                .strips
                .iter()
                .zip(increments.strips.iter())
                .map(|(accumulated, increment)| accumulated.compose_left(increment))
                .collect(),
        }
    }

    pub fn to_device_space(&self, width: u32, height: u32) -> StripTransformSet {
        StripTransformSet {
            strips: self
                .strips
                .iter()
                .map(|t| t.to_device_space(width, height))
                .collect(),
        }
    }
}

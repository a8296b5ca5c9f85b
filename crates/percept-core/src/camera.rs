//! Camera captures: buffers, intrinsics, and extrinsics.
//!
//! A capture is a value produced by an external sensing collaborator per
//! call. It bundles the pixel buffer with the pinhole intrinsics and the
//! sensor pose (`body_tform_camera`) recorded at capture time, so downstream
//! geometry never has to consult global state.
//!
//! Pixel coordinates are `(x, y) = (column, row)` with the origin at the
//! top-left corner, matching the 2D detector convention.

use serde::{Deserialize, Serialize};

use crate::math::{Iso3, Mat3, Pt2, Pt3, Real, Vec2, Vec3};

#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error("buffer of {len} elements does not match {width}x{height} capture")]
    DimensionMismatch {
        width: usize,
        height: usize,
        len: usize,
    },
    #[error("capture from '{0}' is empty")]
    EmptyCapture(String),
    #[error("depth scale must be positive, got {0}")]
    InvalidDepthScale(Real),
}

/// Pinhole camera intrinsics.
///
/// The calibration matrix `K` has the form:
///
/// ```text
/// [ fx   0  cx ]
/// [  0  fy  cy ]
/// [  0   0   1 ]
/// ```
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: Real,
    pub fy: Real,
    pub cx: Real,
    pub cy: Real,
}

impl CameraIntrinsics {
    pub fn k_matrix(&self) -> Mat3 {
        Mat3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    /// Ray through pixel `(x, y)` at unit depth, in camera coordinates.
    pub fn back_project(&self, px: Vec2) -> Vec3 {
        Vec3::new((px.x - self.cx) / self.fx, (px.y - self.cy) / self.fy, 1.0)
    }

    /// Project a camera-frame point to pixel coordinates.
    ///
    /// Returns `None` for points at or behind the image plane.
    pub fn project(&self, p: &Pt3) -> Option<Pt2> {
        if p.z <= 0.0 {
            return None;
        }
        Some(Pt2::new(
            self.fx * p.x / p.z + self.cx,
            self.fy * p.y / p.z + self.cy,
        ))
    }
}

/// 8-bit grayscale image, row-major.
#[derive(Clone, Debug)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    pub fn get(&self, x: usize, y: usize) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.data[y * self.width + x])
    }
}

/// Raw depth buffer, row-major. A value of zero marks an invalid pixel.
#[derive(Clone, Debug)]
pub struct DepthMap {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u16>,
}

impl DepthMap {
    pub fn get(&self, x: usize, y: usize) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.data[y * self.width + x])
    }

    pub fn is_valid(&self, x: usize, y: usize) -> bool {
        matches!(self.get(x, y), Some(raw) if raw != 0)
    }
}

/// Identity and geometry of the sensor that produced a capture.
#[derive(Clone, Debug)]
pub struct SensorMeta {
    /// Source identifier, e.g. `"frontleft_depth"`.
    pub source: String,
    pub intrinsics: CameraIntrinsics,
    /// Sensor pose relative to the robot body at capture time.
    pub body_tform_camera: Iso3,
}

/// Parameters for filling invalid depth pixels from their neighbourhood.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct DepthInterpolation {
    /// Search radius in pixels around the target pixel.
    pub radius: usize,
    /// Minimal number of valid samples required for an interpolated value.
    pub min_neighbors: usize,
}

impl Default for DepthInterpolation {
    fn default() -> Self {
        Self {
            radius: 12,
            min_neighbors: 6,
        }
    }
}

/// A depth capture together with its scale factor and sensor geometry.
#[derive(Clone, Debug)]
pub struct DepthCapture {
    pub depth: DepthMap,
    /// Raw units per metre (raw / scale = metres).
    pub depth_scale: Real,
    pub meta: SensorMeta,
}

impl DepthCapture {
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.depth.data.is_empty() {
            return Err(CaptureError::EmptyCapture(self.meta.source.clone()));
        }
        if self.depth.data.len() != self.depth.width * self.depth.height {
            return Err(CaptureError::DimensionMismatch {
                width: self.depth.width,
                height: self.depth.height,
                len: self.depth.data.len(),
            });
        }
        if self.depth_scale <= 0.0 {
            return Err(CaptureError::InvalidDepthScale(self.depth_scale));
        }
        Ok(())
    }

    /// Metric depth at an integer pixel, `None` when invalid.
    pub fn depth_at(&self, x: usize, y: usize) -> Option<Real> {
        match self.depth.get(x, y) {
            Some(raw) if raw != 0 => Some(raw as Real / self.depth_scale),
            _ => None,
        }
    }

    /// Metric depth at a (possibly fractional) pixel.
    ///
    /// When the nearest pixel is invalid, the depth is interpolated from the
    /// valid samples within `params.radius`, weighted by inverse cubed
    /// distance so that close samples dominate. Returns `None` when fewer
    /// than `params.min_neighbors` valid samples exist.
    pub fn depth_at_interpolated(&self, px: Vec2, params: &DepthInterpolation) -> Option<Real> {
        let xi = px.x.round() as i64;
        let yi = px.y.round() as i64;
        if xi >= 0 && yi >= 0 {
            if let Some(d) = self.depth_at(xi as usize, yi as usize) {
                return Some(d);
            }
        }

        let r = params.radius as i64;
        let mut weight_sum = 0.0;
        let mut value_sum = 0.0;
        let mut count = 0usize;
        for dy in -r..=r {
            for dx in -r..=r {
                let x = xi + dx;
                let y = yi + dy;
                if x < 0 || y < 0 {
                    continue;
                }
                let Some(d) = self.depth_at(x as usize, y as usize) else {
                    continue;
                };
                let ddx = x as Real - px.x;
                let ddy = y as Real - px.y;
                let dist = (ddx * ddx + ddy * ddy).sqrt().max(1e-6);
                let w = 1.0 / (dist * dist * dist);
                weight_sum += w;
                value_sum += w * d;
                count += 1;
            }
        }

        if count < params.min_neighbors || weight_sum <= 0.0 {
            return None;
        }
        Some(value_sum / weight_sum)
    }

    /// Unproject an integer pixel into camera coordinates, `None` when the
    /// depth there is invalid.
    pub fn unproject(&self, x: usize, y: usize) -> Option<Pt3> {
        let d = self.depth_at(x, y)?;
        let ray = self
            .meta
            .intrinsics
            .back_project(Vec2::new(x as Real, y as Real));
        Some(Pt3::from(ray * d))
    }
}

/// A grayscale image capture with its sensor geometry.
#[derive(Clone, Debug)]
pub struct ColorCapture {
    pub image: GrayImage,
    pub meta: SensorMeta,
}

impl ColorCapture {
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.image.data.is_empty() {
            return Err(CaptureError::EmptyCapture(self.meta.source.clone()));
        }
        if self.image.data.len() != self.image.width * self.image.height {
            return Err(CaptureError::DimensionMismatch {
                width: self.image.width,
                height: self.image.height,
                len: self.image.data.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn intrinsics() -> CameraIntrinsics {
        CameraIntrinsics {
            fx: 300.0,
            fy: 300.0,
            cx: 160.0,
            cy: 120.0,
        }
    }

    fn capture_with_depth(data: Vec<u16>, width: usize, height: usize) -> DepthCapture {
        DepthCapture {
            depth: DepthMap {
                width,
                height,
                data,
            },
            depth_scale: 1000.0,
            meta: SensorMeta {
                source: "test_depth".into(),
                intrinsics: intrinsics(),
                body_tform_camera: Iso3::identity(),
            },
        }
    }

    #[test]
    fn project_unproject_round_trip() {
        let mut data = vec![0u16; 320 * 240];
        data[100 * 320 + 200] = 2000; // 2 m
        let capture = capture_with_depth(data, 320, 240);

        let p = capture.unproject(200, 100).unwrap();
        assert_relative_eq!(p.z, 2.0, epsilon = 1e-12);

        let px = capture.meta.intrinsics.project(&p).unwrap();
        assert_relative_eq!(px.x, 200.0, epsilon = 1e-9);
        assert_relative_eq!(px.y, 100.0, epsilon = 1e-9);
    }

    #[test]
    fn interpolation_fills_invalid_pixel() {
        let mut data = vec![1500u16; 64 * 64];
        data[32 * 64 + 32] = 0;
        let capture = capture_with_depth(data, 64, 64);

        let d = capture
            .depth_at_interpolated(Vec2::new(32.0, 32.0), &DepthInterpolation::default())
            .unwrap();
        assert_relative_eq!(d, 1.5, epsilon = 1e-9);
    }

    #[test]
    fn interpolation_fails_without_support() {
        let data = vec![0u16; 64 * 64];
        let capture = capture_with_depth(data, 64, 64);
        let d = capture.depth_at_interpolated(Vec2::new(32.0, 32.0), &DepthInterpolation::default());
        assert!(d.is_none());
    }

    #[test]
    fn validate_rejects_bad_dimensions() {
        let capture = capture_with_depth(vec![1u16; 10], 320, 240);
        assert!(matches!(
            capture.validate(),
            Err(CaptureError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn points_behind_camera_do_not_project() {
        assert!(intrinsics().project(&Pt3::new(0.0, 0.0, -1.0)).is_none());
    }
}

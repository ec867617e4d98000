// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Geographic window and the lat/lon to grid-cell mapping.

/// One degree of latitude in nautical miles.
const NM_PER_DEGREE: f64 = 60.0;

/// Extra margin around the requested radius so edge traffic stays visible.
const BOUNDS_PADDING: f64 = 1.2;

/// Visible map window in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl Bounds {
    /// Window covering `radius_nm` around a point, padded by 20%.
    ///
    /// The longitude span widens with latitude since meridians converge.
    #[must_use]
    pub fn around(lat: f64, lon: f64, radius_nm: f64) -> Self {
        let lat_delta = radius_nm / NM_PER_DEGREE * BOUNDS_PADDING;
        let lon_delta = radius_nm / (NM_PER_DEGREE * lat.to_radians().cos()) * BOUNDS_PADDING;

        Self {
            lat_min: lat - lat_delta,
            lat_max: lat + lat_delta,
            lon_min: lon - lon_delta,
            lon_max: lon + lon_delta,
        }
    }

    #[cfg(test)]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.lat_min..=self.lat_max).contains(&lat) && (self.lon_min..=self.lon_max).contains(&lon)
    }

    /// True when both spans are finite and positive.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let lat_span = self.lat_max - self.lat_min;
        let lon_span = self.lon_max - self.lon_min;
        lat_span.is_finite() && lon_span.is_finite() && lat_span > 0.0 && lon_span > 0.0
    }
}

/// Maps coordinates onto a `width` x `height` grid, north at row 0.
#[derive(Debug, Clone, Copy)]
pub struct Projector {
    bounds: Bounds,
    width: usize,
    height: usize,
}

impl Projector {
    #[must_use]
    pub fn new(bounds: Bounds, width: usize, height: usize) -> Self {
        Self {
            bounds,
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Grid cell `(col, row)` for a coordinate. Points outside the bounds land
    /// on the nearest edge cell.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        reason = "normalized values are clamped to [0, 1] before scaling to the grid"
    )]
    pub fn project(&self, lat: f64, lon: f64) -> (usize, usize) {
        let b = &self.bounds;
        let x_norm = normalize(lon, b.lon_min, b.lon_max);
        let y_norm = normalize(lat, b.lat_min, b.lat_max);

        let col = (x_norm * (self.width - 1) as f64).round() as usize;
        let row = ((1.0 - y_norm) * (self.height - 1) as f64).round() as usize;

        (col.min(self.width - 1), row.min(self.height - 1))
    }
}

fn normalize(value: f64, min: f64, max: f64) -> f64 {
    let norm = (value - min) / (max - min);
    if norm.is_nan() {
        0.5
    } else {
        norm.clamp(0.0, 1.0)
    }
}

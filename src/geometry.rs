use serde::{Deserialize, Serialize};

use crate::formats::Dimensions;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Origin {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Origin {
    pub fn shifts(&self) -> (f64, f64, f64) {
        (self.x, self.y, self.z)
    }
}

pub fn centered_origin(dims: &Dimensions, sampling_rate: f64) -> Origin {
    Origin {
        x: f64::from(dims.x) / -2.0 * sampling_rate,
        y: f64::from(dims.y) / -2.0 * sampling_rate,
        z: f64::from(dims.z) / -2.0 * sampling_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_is_centered_and_negative() {
        let dims = Dimensions::new(200, 100, 50, 1);
        let origin = centered_origin(&dims, 1.5);
        assert_eq!(origin.shifts(), (-150.0, -75.0, -37.5));
    }

    #[test]
    fn origin_matches_product_form_for_odd_sizes() {
        let dims = Dimensions::new(127, 63, 31, 1);
        let sr = 0.7;
        let origin = centered_origin(&dims, sr);
        assert_eq!(origin.x, -(127.0 * sr) / 2.0);
        assert_eq!(origin.y, -(63.0 * sr) / 2.0);
        assert_eq!(origin.z, -(31.0 * sr) / 2.0);
    }
}

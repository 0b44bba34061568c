//! Tensor assembly: feature window -> scaled `[1, WINDOW_SIZE, NUM_FEATURES]`

use ndarray::Array3;

use super::scaler::{check_feature_order, MinMaxScaler};
use crate::error::{ForecastError, ForecastResult};
use crate::features::{FeatureVector, FeatureWindow, NUM_FEATURES};

/// Scale every vector of the window with the fitted feature scaler and stack
/// them under a leading batch dimension of 1.
pub fn assemble(window: &FeatureWindow, scaler: &MinMaxScaler) -> ForecastResult<Array3<f64>> {
    check_feature_order(scaler)?;
    stack(window.vectors(), scaler).map(|t| t.insert_axis(ndarray::Axis(0)))
}

/// Scale consecutive feature rows into a `[rows, NUM_FEATURES]` block
pub(crate) fn stack(
    vectors: &[FeatureVector],
    scaler: &MinMaxScaler,
) -> ForecastResult<ndarray::Array2<f64>> {
    let mut flat = Vec::with_capacity(vectors.len() * NUM_FEATURES);
    for vector in vectors {
        flat.extend(scaler.transform(vector.values())?);
    }

    ndarray::Array2::from_shape_vec((vectors.len(), NUM_FEATURES), flat).map_err(|e| {
        ForecastError::ScalerMismatch {
            expected: NUM_FEATURES,
            found: scaler.n_features(),
            detail: e.to_string(),
        }
    })
}

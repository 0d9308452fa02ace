//! # KZ2 parameters
//!
//! User facing parameters, and the integer weights the solver actually runs with.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::path::Path;

use serde::Deserialize;

use crate::energy::Value;
use crate::error::*;

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Largest common denominator tried when turning the float parameters into fractions.
const MAX_DENOMINATOR: i32 = 1 << 4;

// -----------------------------------------------------------------------------------------------
// ENUMERATIONS
// -----------------------------------------------------------------------------------------------

/// Norm applied to the intensity distance in the data term.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataCost {
    L1,
    L2
}

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Parameters of the KZ2 algorithm.
///
/// The occlusion cost and smoothness weights are optional. A missing occlusion cost is estimated
/// from the images, a missing `lambda` is a fifth of the occlusion cost, and missing `lambda1` and
/// `lambda2` are `3 * lambda` and `lambda`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Params {
    pub min_disparity: i32,
    pub max_disparity: i32,
    pub data_cost: DataCost,
    /// Intensity step above which neighbours are considered to lie across an edge.
    pub edge_threshold: i32,
    pub occlusion_cost: Option<f32>,
    pub lambda: Option<f32>,
    /// Smoothness penalty between neighbours not across an edge.
    pub lambda1: Option<f32>,
    /// Smoothness penalty between neighbours across an edge, usually lower than `lambda1`.
    pub lambda2: Option<f32>,
    pub max_iterations: u32,
    /// Draw a new label order on every iteration rather than only the first.
    pub randomize: bool,
    pub seed: u64,
    /// Match on RGB rather than gray levels.
    pub color: bool
}

/// Integer weights of the energy.
///
/// Data costs are multiplied by `denominator`, which is equivalent to dividing the occlusion
/// cost and smoothness penalties by it.
#[derive(Debug, Clone, PartialEq)]
pub struct Weights {
    pub data_cost: DataCost,
    pub denominator: Value,
    pub occlusion_cost: Value,
    pub lambda1: Value,
    pub lambda2: Value,
    pub edge_threshold: i32,
    pub max_iterations: u32,
    pub randomize: bool,
    pub seed: u64
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            min_disparity: -16,
            max_disparity: 0,
            data_cost: DataCost::L2,
            edge_threshold: 8,
            occlusion_cost: None,
            lambda: None,
            lambda1: None,
            lambda2: None,
            max_iterations: 4,
            randomize: false,
            seed: 0,
            color: false
        }
    }
}

impl Params {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Load parameters from a TOML file, missing keys take their default value.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }
}

impl Weights {
    /// Resolve `params` into weights, given the occlusion cost to use when `params` leaves it
    /// unset.
    pub fn from_params(params: &Params, occlusion_cost: f32) -> Result<Self> {
        let k = params.occlusion_cost.unwrap_or(occlusion_cost);
        check_non_negative("occlusion_cost", k)?;

        let lambda = params.lambda.unwrap_or(k / 5.0);
        check_non_negative("lambda", lambda)?;

        let lambda1 = params.lambda1.unwrap_or(3.0 * lambda);
        check_non_negative("lambda1", lambda1)?;

        let lambda2 = params.lambda2.unwrap_or(lambda);
        check_non_negative("lambda2", lambda2)?;

        let (denominator, [k, lambda1, lambda2]) = approximate_fractions([k, lambda1, lambda2]);

        let weights = Self {
            data_cost: params.data_cost,
            denominator,
            occlusion_cost: k,
            lambda1,
            lambda2,
            edge_threshold: params.edge_threshold,
            max_iterations: params.max_iterations,
            randomize: params.randomize,
            seed: params.seed
        };
        weights.validate()?;

        Ok(weights)
    }

    /// Check that no weight is negative and the denominator and iteration count are positive.
    pub fn validate(&self) -> Result<()> {
        check_non_negative("occlusion_cost", self.occlusion_cost as f32)?;
        check_non_negative("lambda1", self.lambda1 as f32)?;
        check_non_negative("lambda2", self.lambda2 as f32)?;
        check_non_negative("edge_threshold", self.edge_threshold as f32)?;

        if self.denominator < 1 {
            return Err(Error::InvalidParameter {
                name: "denominator",
                value: self.denominator as f32
            });
        }
        if self.max_iterations < 1 {
            return Err(Error::InvalidParameter {
                name: "max_iterations",
                value: self.max_iterations as f32
            });
        }

        Ok(())
    }
}

fn check_non_negative(name: &'static str, value: f32) -> Result<()> {
    if value < 0.0 || value.is_nan() {
        Err(Error::InvalidParameter { name, value })
    }
    else {
        Ok(())
    }
}

/// Approximate `values` by fractions sharing a denominator of at most [`MAX_DENOMINATOR`], the
/// one minimizing the sum of relative errors.
///
/// Returns the denominator and the numerators. Values that are not positive get a zero
/// numerator.
pub(crate) fn approximate_fractions(values: [f32; 3]) -> (Value, [Value; 3]) {
    let mut best = (1, [0; 3]);
    let mut min_error = std::f32::MAX;

    for denominator in 1..=MAX_DENOMINATOR {
        let mut error = 0.0;
        let mut numerators = [0; 3];

        for (numerator, &value) in numerators.iter_mut().zip(values.iter()) {
            if value > 0.0 {
                let scaled = denominator as f32 * value;
                *numerator = (scaled + 0.5) as Value;
                error += (*numerator as f32 / scaled - 1.0).abs();
            }
        }

        if error < min_error {
            min_error = error;
            best = (denominator, numerators);
        }
    }

    best
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_need_no_denominator() {
        assert_eq!(approximate_fractions([5.0, 3.0, 1.0]), (1, [5, 3, 1]));
    }

    #[test]
    fn halves_get_denominator_two() {
        assert_eq!(approximate_fractions([2.5, 1.5, 0.5]), (2, [5, 3, 1]));
    }

    #[test]
    fn zero_values_get_zero_numerators() {
        assert_eq!(approximate_fractions([0.0, 0.25, 0.0]), (4, [0, 1, 0]));
    }

    #[test]
    fn lambdas_default_from_occlusion_cost() {
        let params = Params::default();
        let weights = Weights::from_params(&params, 10.0).unwrap();

        // lambda = 2, lambda1 = 6, lambda2 = 2
        assert_eq!(weights.denominator, 1);
        assert_eq!(weights.occlusion_cost, 10);
        assert_eq!(weights.lambda1, 6);
        assert_eq!(weights.lambda2, 2);
        assert_eq!(weights.edge_threshold, 8);
        assert_eq!(weights.data_cost, DataCost::L2);
    }

    #[test]
    fn explicit_values_win() {
        let params = Params {
            occlusion_cost: Some(7.0),
            lambda1: Some(4.0),
            lambda2: Some(1.0),
            ..Params::default()
        };
        let weights = Weights::from_params(&params, 100.0).unwrap();

        assert_eq!(weights.occlusion_cost, 7);
        assert_eq!(weights.lambda1, 4);
        assert_eq!(weights.lambda2, 1);
    }

    #[test]
    fn negative_values_are_rejected() {
        let params = Params {
            lambda: Some(-1.0),
            ..Params::default()
        };

        match Weights::from_params(&params, 10.0) {
            Err(Error::InvalidParameter { name, .. }) => assert_eq!(name, "lambda"),
            other => panic!("unexpected result: {:?}", other)
        }

        let params = Params {
            edge_threshold: -2,
            ..Params::default()
        };
        assert!(Weights::from_params(&params, 10.0).is_err());
    }

    #[test]
    fn zero_iterations_are_rejected() {
        let params = Params {
            max_iterations: 0,
            ..Params::default()
        };
        assert!(Weights::from_params(&params, 10.0).is_err());
    }

    #[test]
    fn params_from_toml() {
        let params = Params::from_toml_str(
            r#"
            min_disparity = -8
            max_disparity = 2
            data_cost = "l1"
            occlusion_cost = 12.5
            randomize = true
            "#
        ).unwrap();

        assert_eq!(params.min_disparity, -8);
        assert_eq!(params.max_disparity, 2);
        assert_eq!(params.data_cost, DataCost::L1);
        assert_eq!(params.occlusion_cost, Some(12.5));
        assert!(params.randomize);
        assert_eq!(params.lambda, None);
        assert_eq!(params.max_iterations, 4);
    }

    #[test]
    fn bad_toml_is_a_config_error() {
        match Params::from_toml_str("data_cost = \"l3\"") {
            Err(Error::Config(_)) => {}
            other => panic!("unexpected result: {:?}", other)
        }
    }
}

//! Goodness of fit of a trained model.

use serde::Serialize;

use super::Parameters;
use crate::record::Sample;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
/// Fit metrics of a model over a set of samples.
pub struct Evaluation {
    /// The coefficient of determination. `None` if the targets have zero variance.
    pub r_squared: Option<f64>,
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
}

/// Computes the fit metrics of the parameters over the samples.
///
/// Returns `None` if there are no samples.
pub(crate) fn evaluate(params: &Parameters, samples: &[Sample]) -> Option<Evaluation> {
    if samples.is_empty() {
        return None;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().map(|s| s.target).sum::<f64>() / n;

    let (ss_res, ss_tot, abs_sum) =
        samples
            .iter()
            .fold((0_f64, 0_f64, 0_f64), |(res, tot, abs), sample| {
                let residual = params.predict(sample.features.as_slice()) - sample.target;
                (
                    res + residual.powi(2),
                    tot + (sample.target - mean).powi(2),
                    abs + residual.abs(),
                )
            });

    let mse = ss_res / n;
    Some(Evaluation {
        r_squared: if ss_tot > 0. {
            Some(1. - ss_res / ss_tot)
        } else {
            None
        },
        mse,
        rmse: mse.sqrt(),
        mae: abs_sum / n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FeatureVector;

    fn sample(features: [f64; 4], target: f64) -> Sample {
        Sample {
            features: FeatureVector::from(features),
            target,
        }
    }

    #[test]
    fn test_perfect_fit() {
        let params = Parameters {
            weights: [1., 0., 0., 0.],
            bias: 0.,
        };
        let samples = vec![sample([1., 0., 0., 0.], 1.), sample([3., 0., 0., 0.], 3.)];
        let evaluation = evaluate(&params, &samples).unwrap();
        assert_eq!(evaluation.r_squared, Some(1.));
        assert_eq!(evaluation.mse, 0.);
        assert_eq!(evaluation.mae, 0.);
    }

    #[test]
    fn test_errors() {
        let params = Parameters::default();
        let samples = vec![sample([0.; 4], 1.), sample([0.; 4], 3.)];
        let evaluation = evaluate(&params, &samples).unwrap();
        // residuals -1 and -3, mean target 2
        assert_eq!(evaluation.mse, 5.);
        assert_eq!(evaluation.rmse, 5_f64.sqrt());
        assert_eq!(evaluation.mae, 2.);
        assert_eq!(evaluation.r_squared, Some(1. - 10. / 2.));
    }

    #[test]
    fn test_constant_target() {
        let samples = vec![sample([1.; 4], 2.), sample([2.; 4], 2.)];
        let evaluation = evaluate(&Parameters::default(), &samples).unwrap();
        assert_eq!(evaluation.r_squared, None);
        assert!(evaluate(&Parameters::default(), &[]).is_none());
    }
}

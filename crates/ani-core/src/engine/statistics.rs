use nalgebra::Vector3;

/// Mean and population standard deviation; zero spread for a single sample.
pub fn mean_and_stdev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Element-wise mean and population standard deviation of per-atom vectors, one set per
/// ensemble member.
pub fn vector_mean_and_stdev(
    members: &[Vec<Vector3<f64>>],
) -> (Vec<Vector3<f64>>, Vec<Vector3<f64>>) {
    let Some(first) = members.first() else {
        return (Vec::new(), Vec::new());
    };
    let n = members.len() as f64;
    let n_atoms = first.len();

    let mut mean = vec![Vector3::zeros(); n_atoms];
    for member in members {
        for (m, v) in mean.iter_mut().zip(member) {
            *m += v;
        }
    }
    mean.iter_mut().for_each(|m| *m /= n);

    let mut variance = vec![Vector3::zeros(); n_atoms];
    for member in members {
        for ((var, v), m) in variance.iter_mut().zip(member).zip(&mean) {
            let d = v - m;
            *var += d.component_mul(&d);
        }
    }
    let stdev = variance.iter().map(|v| (v / n).map(f64::sqrt)).collect();
    (mean, stdev)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn single_sample_has_zero_spread() {
        assert_eq!(mean_and_stdev(&[-40.5]), (-40.5, 0.0));
    }

    #[test]
    fn population_stdev_divides_by_n() {
        let (mean, stdev) = mean_and_stdev(&[1.0, 2.0, 3.0, 4.0]);
        assert!(f64_approx_equal(mean, 2.5));
        assert!(f64_approx_equal(stdev, 1.25f64.sqrt()));
    }

    #[test]
    fn vector_statistics_are_element_wise() {
        let members = vec![
            vec![Vector3::new(1.0, 0.0, -2.0), Vector3::new(0.0, 0.0, 0.0)],
            vec![Vector3::new(3.0, 0.0, -2.0), Vector3::new(0.0, 4.0, 0.0)],
        ];
        let (mean, stdev) = vector_mean_and_stdev(&members);
        assert_eq!(mean[0], Vector3::new(2.0, 0.0, -2.0));
        assert_eq!(mean[1], Vector3::new(0.0, 2.0, 0.0));
        assert_eq!(stdev[0], Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(stdev[1], Vector3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn empty_input_has_no_statistics() {
        let (mean, stdev) = vector_mean_and_stdev(&[]);
        assert!(mean.is_empty() && stdev.is_empty());
        assert!(mean_and_stdev(&[]).0.is_nan());
    }
}

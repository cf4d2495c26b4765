//! Decibel arithmetic.
//!
//! Losses and crosstalk coefficients are negative dB values. Path losses add
//! arithmetically; independent noise powers add in the linear domain.

/// Linear power ratio of a dB value.
pub fn db_to_val(db: f64) -> f64 {
    10f64.powf(db * 0.1)
}

/// dB value of a linear power ratio. Zero power maps to `-inf`.
pub fn val_to_db(val: f64) -> f64 {
    10.0 * val.log10()
}

/// Power-domain sum of two dB quantities.
pub fn sum_db(a: f64, b: f64) -> f64 {
    val_to_db(db_to_val(a) + db_to_val(b))
}

/// Folds a new noise component into an optional running total. An empty
/// total takes the component as is.
pub fn accumulate_db(total: Option<f64>, component: f64) -> Option<f64> {
    match total {
        None => Some(component),
        Some(acc) => Some(sum_db(acc, component)),
    }
}

/// Signal-to-noise ratio in dB; noise-free signals have infinite SNR.
pub fn calc_snr(signal: f64, noise: Option<f64>) -> f64 {
    match noise {
        None => f64::INFINITY,
        Some(noise) => signal - noise,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn sum_is_commutative() {
        for (a, b) in [(-20.0, -40.0), (-3.5, -3.5), (0.0, -100.0)] {
            assert!(close(sum_db(a, b), sum_db(b, a)));
        }
    }

    #[test]
    fn equal_powers_gain_three_db() {
        assert!((sum_db(-20.0, -20.0) - (-20.0 + 10.0 * 2f64.log10())).abs() < 1e-12);
    }

    #[test]
    fn conversions_round_trip() {
        for x in [1e-6, 0.25, 1.0, 42.0] {
            assert!((db_to_val(val_to_db(x)) - x).abs() < 1e-9 * x.max(1.0));
        }
    }

    #[test]
    fn zero_power_is_identity() {
        assert!(close(sum_db(-17.0, f64::NEG_INFINITY), -17.0));
        assert_eq!(accumulate_db(None, -12.0), Some(-12.0));
        let both = accumulate_db(Some(-30.0), -30.0).unwrap();
        assert!(close(both, sum_db(-30.0, -30.0)));
    }

    #[test]
    fn noise_free_snr_is_infinite() {
        assert_eq!(calc_snr(-3.0, None), f64::INFINITY);
        assert!(close(calc_snr(-3.0, Some(-40.0)), 37.0));
    }
}

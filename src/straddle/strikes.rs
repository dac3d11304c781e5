/// Three straddle strikes around spot: `[below, atm, above]`.
///
/// The at-the-money strike rounds half to even, so a spot exactly between two
/// strikes goes to the even multiple (75,050 -> 75,000).
pub fn straddle_strikes(spot: f64, step: i64) -> [i64; 3] {
    let step = step.max(1);
    let atm = (spot / step as f64).round_ties_even() as i64 * step;
    [atm - step, atm, atm + step]
}

/// Move every strike by `steps` increments (negative moves down)
pub fn shift_strikes(strikes: [i64; 3], steps: i64, step: i64) -> [i64; 3] {
    strikes.map(|s| s + steps * step)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tie_rounds_to_even() {
        assert_eq!(straddle_strikes(75_050.0, 100), [74_900, 75_000, 75_100]);
        assert_eq!(straddle_strikes(75_150.0, 100), [75_100, 75_200, 75_300]);
    }

    #[test]
    fn test_nearest_strike() {
        assert_eq!(straddle_strikes(75_049.9, 100), [74_900, 75_000, 75_100]);
        assert_eq!(straddle_strikes(75_050.1, 100), [75_000, 75_100, 75_200]);
        assert_eq!(straddle_strikes(81_234.0, 50), [81_200, 81_250, 81_300]);
    }

    #[test]
    fn test_strikes_are_one_step_apart() {
        for spot in [60_000.0, 72_345.6, 79_999.0, 80_001.0] {
            let [below, atm, above] = straddle_strikes(spot, 100);
            assert_eq!(atm % 100, 0);
            assert_eq!(atm - below, 100);
            assert_eq!(above - atm, 100);
            assert!((atm as f64 - spot).abs() <= 50.0);
        }
    }

    #[test]
    fn test_shift() {
        let strikes = [74_900, 75_000, 75_100];
        assert_eq!(shift_strikes(strikes, 1, 100), [75_000, 75_100, 75_200]);
        assert_eq!(shift_strikes(strikes, -2, 100), [74_700, 74_800, 74_900]);
    }
}

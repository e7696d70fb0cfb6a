use crate::{Error, Result};

/// Trailing window of prices used when callers pass no explicit window
pub const DEFAULT_WINDOW: usize = 20;

/// Calculate volatility as the population standard deviation of simple
/// returns over the most recent `window` prices.
///
/// Prices must be in chronological order (oldest first). Fewer than 2
/// prices cannot produce a return, so the instrument is reported as
/// lacking history - callers must treat that as "skip", not volatility 0.
pub fn calculate_volatility(prices: &[f64], window: usize) -> Result<f64> {
    let recent = if prices.len() > window {
        &prices[prices.len() - window..]
    } else {
        prices
    };

    if recent.len() < 2 {
        return Err(Error::InsufficientHistory);
    }

    let returns: Vec<f64> = recent
        .windows(2)
        .map(|pair| (pair[1] - pair[0]) / pair[0])
        .collect();

    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance = returns
        .iter()
        .map(|r| (r - mean).powi(2))
        .sum::<f64>()
        / returns.len() as f64;

    Ok(variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_prices_have_zero_volatility() {
        let prices = vec![100.0; 10];
        assert_eq!(calculate_volatility(&prices, DEFAULT_WINDOW).unwrap(), 0.0);
    }

    #[test]
    fn test_two_prices_have_zero_deviation() {
        // One return has zero deviation from its own mean
        let prices = vec![100.0, 110.0];
        assert_eq!(calculate_volatility(&prices, DEFAULT_WINDOW).unwrap(), 0.0);
    }

    #[test]
    fn test_insufficient_history() {
        assert!(matches!(
            calculate_volatility(&[], DEFAULT_WINDOW),
            Err(Error::InsufficientHistory)
        ));
        assert!(matches!(
            calculate_volatility(&[100.0], DEFAULT_WINDOW),
            Err(Error::InsufficientHistory)
        ));
    }

    #[test]
    fn test_alternating_prices() {
        // Returns alternate +10% / -9.0909..%, mean ~0.4545%
        let prices = vec![100.0, 110.0, 100.0, 110.0, 100.0];
        let vol = calculate_volatility(&prices, DEFAULT_WINDOW).unwrap();

        let r_up: f64 = 0.1;
        let r_down: f64 = -10.0 / 110.0;
        let mean = (2.0 * r_up + 2.0 * r_down) / 4.0;
        let expected = ((2.0 * (r_up - mean).powi(2) + 2.0 * (r_down - mean).powi(2)) / 4.0).sqrt();
        assert!((vol - expected).abs() < 1e-12);
    }

    #[test]
    fn test_window_limits_lookback() {
        // Early wild swings fall outside a window of 3
        let prices = vec![10.0, 200.0, 5.0, 100.0, 100.0, 100.0];
        assert_eq!(calculate_volatility(&prices, 3).unwrap(), 0.0);
    }
}

//! Scenarios that run through several component crates.

use approx::{assert_abs_diff_eq, assert_relative_eq};
use chrono::NaiveDate;
use varfolio::data::{ReturnKind, ReturnSeries, read_price_matrix};
use varfolio::optim::{Objective, PortfolioOptimizer};
use varfolio::risk::{
    CovarianceMatrix, ExpectedReturnVector, annualized_daily_volatility, daily_volatility,
    historical_var, monte_carlo_var, parametric_var,
};
use varfolio::{
    AnalysisConfig, CovarianceMethod, PortfolioObjective, analyze_matrix, optimize_portfolio,
};

fn returns(values: &[f64]) -> ReturnSeries {
    let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    ReturnSeries::from_values(start, values.to_vec(), ReturnKind::Simple).unwrap()
}

#[test]
fn test_historical_var_of_small_series() {
    let r = [0.01, -0.02, 0.015, -0.005, 0.02];
    // 20th percentile with linear interpolation between -0.02 and -0.005.
    assert_abs_diff_eq!(historical_var(&r, 0.8).unwrap(), -0.008, epsilon = 1e-12);

    let v99 = historical_var(&r, 0.99).unwrap();
    let v95 = historical_var(&r, 0.95).unwrap();
    let v90 = historical_var(&r, 0.90).unwrap();
    assert!(v99 <= v95 && v95 <= v90);
}

#[test]
fn test_monte_carlo_converges_to_parametric() {
    let (mean, std) = (0.0005, 0.012);
    let mc = monte_carlo_var(mean, std, 252, 4_000, 0.99, 42).unwrap();
    let normal = parametric_var(mean, std, 0.99).unwrap();
    assert_relative_eq!(mc, normal, max_relative = 0.05);
}

#[test]
fn test_annualized_volatility_scales_daily() {
    let r = returns(&[0.01, -0.02, 0.015, -0.005, 0.02, 0.003]);
    let daily = daily_volatility(&r).unwrap();
    assert_eq!(annualized_daily_volatility(&r).unwrap(), daily * 252f64.sqrt());
}

#[test]
fn test_two_asset_min_volatility() {
    let mu = ExpectedReturnVector::from_pairs([("A", 0.10), ("B", 0.15)]).unwrap();
    let cov = CovarianceMatrix::new(
        vec!["A".to_string(), "B".to_string()],
        ndarray::array![[0.04, 0.01], [0.01, 0.09]],
    )
    .unwrap();
    let result = PortfolioOptimizer::new(mu, cov)
        .unwrap()
        .optimize(Objective::MinVolatility)
        .unwrap();
    let w = result.weights();
    assert!(w.get("A").unwrap() > w.get("B").unwrap());
    assert!(w.values().iter().all(|x| (-1e-9..=1.0 + 1e-9).contains(x)));
    assert_abs_diff_eq!(w.sum(), 1.0, epsilon = 1e-6);
}

/// Wide CSV with a market column and three assets.
fn price_csv() -> String {
    let mut csv = String::from("date,SPY,AAA,BBB,CCC\n");
    let mut levels = [100.0_f64, 50.0, 80.0, 20.0];
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    for (t, date) in start.iter_days().take(300).enumerate() {
        let cycle = (t as f64 * 0.7).sin() * 0.01;
        let moves = [
            0.0004 + cycle,
            0.0006 + 0.8 * cycle + 0.004 * (t as f64 * 1.3).cos(),
            0.0008 + 1.2 * cycle + 0.005 * (t as f64 * 2.1).sin(),
            0.0002 + 0.5 * cycle + 0.003 * (t as f64 * 0.4).cos(),
        ];
        if t > 0 {
            for (level, r) in levels.iter_mut().zip(moves) {
                *level *= 1.0 + r;
            }
        }
        let row: Vec<String> = levels.iter().map(|p| format!("{p:.6}")).collect();
        csv.push_str(&format!("{},{}\n", date.format("%Y-%m-%d"), row.join(",")));
    }
    csv
}

#[test]
fn test_pipeline_from_csv() {
    let prices = read_price_matrix(price_csv().as_bytes()).unwrap();
    assert_eq!(prices.n_assets(), 4);
    assert_eq!(prices.n_periods(), 300);

    let config = AnalysisConfig {
        market: Some("SPY".to_string()),
        covariance: CovarianceMethod::Sample,
        objective: PortfolioObjective::MinVolatility,
        ..Default::default()
    };

    let reports = analyze_matrix(&prices, &config).unwrap();
    assert_eq!(reports.len(), 4);
    assert!(reports.iter().skip(1).all(|r| r.beta.is_some()));
    assert!(reports.iter().all(|r| r.max_drawdown <= 0.0));

    let portfolio = optimize_portfolio(&prices, &config).unwrap();
    assert_eq!(
        portfolio.weights.keys().collect::<Vec<_>>(),
        vec!["AAA", "BBB", "CCC"]
    );
    assert_abs_diff_eq!(portfolio.weights.values().sum::<f64>(), 1.0, epsilon = 1e-9);
    assert!(portfolio.performance.volatility > 0.0);
}

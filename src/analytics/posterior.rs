//! Sequential Beta-Binomial posterior updating.
//!
//! The conversion rate θ of a funnel is modelled as a Bernoulli probability
//! with a Beta prior. Each daily observation of `starts` and `converts`
//! is folded into the posterior with the conjugate rule:
//!
//! - Prior: Beta(α, β)
//! - Likelihood: Binomial(converts | starts, θ)
//! - Posterior: Beta(α + converts, β + starts - converts)
//!
//! After every step the central credibility interval of the current
//! posterior is recorded, which gives the trend of the interval over time.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Beta, ContinuousCDF};
use tracing::debug;

use crate::{Error, Result};

/// Default prior α (uniform prior).
pub const DEFAULT_PRIOR_ALPHA: f64 = 1.0;
/// Default prior β (uniform prior).
pub const DEFAULT_PRIOR_BETA: f64 = 1.0;
/// Default credibility level.
pub const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;

/// A single day of funnel data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub starts: u64,
    pub converts: u64,
}

impl Observation {
    /// Create an observation, rejecting `converts > starts`.
    pub fn new(date: NaiveDate, starts: u64, converts: u64) -> Result<Self> {
        let observation = Self {
            date,
            starts,
            converts,
        };
        observation.validate()?;
        Ok(observation)
    }

    /// Create an observation from raw signed counts as read from a file.
    pub fn from_signed(date: NaiveDate, starts: i64, converts: i64) -> Result<Self> {
        if starts < 0 || converts < 0 {
            return Err(Error::InvalidObservation(format!(
                "{}: counts must be non-negative (starts={}, converts={})",
                date, starts, converts
            )));
        }
        Self::new(date, starts as u64, converts as u64)
    }

    /// Funnel starts that did not convert.
    pub fn failures(&self) -> u64 {
        self.starts.saturating_sub(self.converts)
    }

    fn validate(&self) -> Result<()> {
        if self.converts > self.starts {
            return Err(Error::InvalidObservation(format!(
                "{}: converts ({}) exceed starts ({})",
                self.date, self.converts, self.starts
            )));
        }
        Ok(())
    }
}

/// Central credibility interval of a posterior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CredibilityInterval {
    pub lower: f64,
    pub upper: f64,
}

impl CredibilityInterval {
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn contains(&self, rate: f64) -> bool {
        self.lower <= rate && rate <= self.upper
    }
}

/// Beta posterior over a conversion rate.
///
/// # Example
///
/// ```
/// use chrono::NaiveDate;
/// use funnel_confidence::analytics::posterior::{BetaPosterior, Observation};
///
/// let mut posterior = BetaPosterior::uniform();
/// let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// posterior.observe(&Observation::new(day, 100, 20).unwrap()).unwrap();
///
/// assert_eq!(posterior.alpha(), 21.0);
/// assert_eq!(posterior.beta(), 81.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetaPosterior {
    alpha: f64,
    beta: f64,
}

impl Default for BetaPosterior {
    fn default() -> Self {
        Self::uniform()
    }
}

impl BetaPosterior {
    /// Uniform prior Beta(1, 1).
    pub fn uniform() -> Self {
        Self {
            alpha: DEFAULT_PRIOR_ALPHA,
            beta: DEFAULT_PRIOR_BETA,
        }
    }

    /// Jeffreys prior Beta(0.5, 0.5).
    pub fn jeffreys() -> Self {
        Self {
            alpha: 0.5,
            beta: 0.5,
        }
    }

    /// Create a prior Beta(α, β).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPrior`] unless both parameters are finite and > 0.
    pub fn new(alpha: f64, beta: f64) -> Result<Self> {
        if !(alpha.is_finite() && alpha > 0.0 && beta.is_finite() && beta > 0.0) {
            return Err(Error::InvalidPrior(format!(
                "alpha and beta must be finite and > 0, got ({}, {})",
                alpha, beta
            )));
        }
        Ok(Self { alpha, beta })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Fold one observation into the posterior.
    ///
    /// The posterior is left untouched when the observation is rejected.
    pub fn observe(&mut self, observation: &Observation) -> Result<()> {
        observation.validate()?;
        self.alpha += observation.converts as f64;
        self.beta += observation.failures() as f64;
        Ok(())
    }

    /// Posterior mean α / (α + β).
    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    /// Posterior variance αβ / ((α + β)² (α + β + 1)).
    pub fn variance(&self) -> f64 {
        let sum = self.alpha + self.beta;
        (self.alpha * self.beta) / (sum * sum * (sum + 1.0))
    }

    /// Central credibility interval holding `confidence_level` of the mass.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfidence`] unless `confidence_level` is in (0, 1).
    pub fn credibility_interval(&self, confidence_level: f64) -> Result<CredibilityInterval> {
        validate_confidence(confidence_level)?;
        let dist = self.distribution()?;
        let tail = (1.0 - confidence_level) / 2.0;

        let lower = quantile(&dist, tail);
        let upper = quantile(&dist, 1.0 - tail);

        Ok(CredibilityInterval {
            lower: lower.min(upper),
            upper: lower.max(upper),
        })
    }

    /// Posterior probability that the true rate exceeds `rate`.
    pub fn probability_above(&self, rate: f64) -> Result<f64> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(Error::InvalidArgument(format!(
                "rate must be in [0, 1], got {}",
                rate
            )));
        }
        let dist = self.distribution()?;
        Ok((1.0 - dist.cdf(rate)).clamp(0.0, 1.0))
    }

    fn distribution(&self) -> Result<Beta> {
        Beta::new(self.alpha, self.beta).map_err(|e| {
            Error::InvalidPrior(format!(
                "Beta({}, {}) is not a valid distribution: {}",
                self.alpha, self.beta, e
            ))
        })
    }
}

/// Bisection steps for [`quantile`]; enough to reach f64 resolution on [0, 1].
const QUANTILE_BISECTION_STEPS: usize = 200;

/// Inverse CDF of `dist` at `p` by bounded bisection on `cdf`.
///
/// `ContinuousCDF::inverse_cdf` does not terminate for strongly skewed
/// shapes such as Beta(3, 1e7), so the search runs a fixed number of steps.
fn quantile(dist: &Beta, p: f64) -> f64 {
    let mut low = 0.0_f64;
    let mut high = 1.0_f64;
    for _ in 0..QUANTILE_BISECTION_STEPS {
        let mid = low + (high - low) / 2.0;
        if mid <= low || mid >= high {
            break;
        }
        let cdf = dist.cdf(mid);
        if cdf.is_nan() {
            break;
        }
        if cdf < p {
            low = mid;
        } else {
            high = mid;
        }
    }
    (low + (high - low) / 2.0).clamp(0.0, 1.0)
}

/// Reject confidence levels outside the open interval (0, 1).
pub fn validate_confidence(confidence_level: f64) -> Result<()> {
    if !(confidence_level > 0.0 && confidence_level < 1.0) {
        return Err(Error::InvalidConfidence(format!(
            "must be in (0, 1), got {}",
            confidence_level
        )));
    }
    Ok(())
}

/// Posterior state right after folding one observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    pub date: NaiveDate,
    pub alpha: f64,
    pub beta: f64,
    pub interval: CredibilityInterval,
}

/// Outcome of a full sequential update.
#[derive(Debug, Clone, Serialize)]
pub struct PosteriorUpdate {
    pub prior: BetaPosterior,
    pub posterior: BetaPosterior,
    pub confidence_level: f64,
    pub steps: Vec<StepResult>,
}

impl PosteriorUpdate {
    pub fn final_alpha(&self) -> f64 {
        self.posterior.alpha()
    }

    pub fn final_beta(&self) -> f64 {
        self.posterior.beta()
    }

    /// Interval of the final posterior (the prior's interval when no data was folded).
    pub fn final_interval(&self) -> Result<CredibilityInterval> {
        self.posterior.credibility_interval(self.confidence_level)
    }

    /// `(date, lower bound)` pairs, one per observation.
    pub fn lower_bound_series(&self) -> Vec<(NaiveDate, f64)> {
        self.steps
            .iter()
            .map(|step| (step.date, step.interval.lower))
            .collect()
    }
}

/// Fold `observations` in the given order into a Beta(`prior_alpha`, `prior_beta`) prior.
///
/// Observations are not sorted; callers that care about chronology sort first.
///
/// # Errors
///
/// - [`Error::InvalidPrior`] if either prior parameter is not strictly positive
/// - [`Error::InvalidConfidence`] if `confidence_level` is not in (0, 1)
/// - [`Error::InvalidObservation`] if any observation has `converts > starts`
pub fn update(
    prior_alpha: f64,
    prior_beta: f64,
    observations: &[Observation],
    confidence_level: f64,
) -> Result<PosteriorUpdate> {
    let prior = BetaPosterior::new(prior_alpha, prior_beta)?;
    validate_confidence(confidence_level)?;

    let mut posterior = prior;
    let steps = observations
        .iter()
        .map(|observation| {
            posterior.observe(observation)?;
            let interval = posterior.credibility_interval(confidence_level)?;

            debug!(
                date = %observation.date,
                starts = observation.starts,
                converts = observation.converts,
                alpha = posterior.alpha(),
                beta = posterior.beta(),
                lower = interval.lower,
                upper = interval.upper,
                "Posterior updated"
            );

            Ok(StepResult {
                date: observation.date,
                alpha: posterior.alpha(),
                beta: posterior.beta(),
                interval,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(PosteriorUpdate {
        prior,
        posterior,
        confidence_level,
        steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_uniform_prior() {
        let prior = BetaPosterior::uniform();
        assert_eq!(prior.alpha(), 1.0);
        assert_eq!(prior.beta(), 1.0);
        assert!((prior.mean() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_jeffreys_prior() {
        let prior = BetaPosterior::jeffreys();
        assert_eq!(prior.alpha(), 0.5);
        assert_eq!(prior.beta(), 0.5);
    }

    #[test]
    fn test_new_rejects_non_positive() {
        assert!(matches!(
            BetaPosterior::new(0.0, 1.0),
            Err(Error::InvalidPrior(_))
        ));
        assert!(matches!(
            BetaPosterior::new(1.0, -2.0),
            Err(Error::InvalidPrior(_))
        ));
        assert!(matches!(
            BetaPosterior::new(f64::NAN, 1.0),
            Err(Error::InvalidPrior(_))
        ));
        assert!(matches!(
            BetaPosterior::new(1.0, f64::INFINITY),
            Err(Error::InvalidPrior(_))
        ));
    }

    #[test]
    fn test_observation_rejects_converts_above_starts() {
        let result = Observation::new(day(1), 20, 30);
        assert!(matches!(result, Err(Error::InvalidObservation(_))));
    }

    #[test]
    fn test_observation_rejects_negative_counts() {
        assert!(matches!(
            Observation::from_signed(day(1), -1, 0),
            Err(Error::InvalidObservation(_))
        ));
        assert!(matches!(
            Observation::from_signed(day(1), 10, -3),
            Err(Error::InvalidObservation(_))
        ));
    }

    #[test]
    fn test_observe_applies_conjugate_rule() {
        let mut posterior = BetaPosterior::uniform();
        posterior
            .observe(&Observation::new(day(1), 100, 20).unwrap())
            .unwrap();

        assert_eq!(posterior.alpha(), 21.0);
        assert_eq!(posterior.beta(), 81.0);
    }

    #[test]
    fn test_observe_rejects_invalid_without_mutating() {
        let mut posterior = BetaPosterior::uniform();
        let bad = Observation {
            date: day(1),
            starts: 20,
            converts: 30,
        };

        assert!(matches!(
            posterior.observe(&bad),
            Err(Error::InvalidObservation(_))
        ));
        assert_eq!(posterior, BetaPosterior::uniform());
    }

    #[test]
    fn test_mean_and_variance() {
        let posterior = BetaPosterior::new(21.0, 81.0).unwrap();
        assert!((posterior.mean() - 21.0 / 102.0).abs() < 1e-12);

        let expected_var = (21.0 * 81.0) / (102.0 * 102.0 * 103.0);
        assert!((posterior.variance() - expected_var).abs() < 1e-12);
    }

    #[test]
    fn test_interval_of_uniform_prior() {
        let interval = BetaPosterior::uniform().credibility_interval(0.95).unwrap();
        assert!((interval.lower - 0.025).abs() < 1e-4);
        assert!((interval.upper - 0.975).abs() < 1e-4);
    }

    #[test]
    fn test_interval_beta_21_81() {
        let interval = BetaPosterior::new(21.0, 81.0)
            .unwrap()
            .credibility_interval(0.95)
            .unwrap();

        assert!((interval.lower - 0.1336).abs() < 1e-3, "lower={}", interval.lower);
        assert!((interval.upper - 0.2891).abs() < 1e-3, "upper={}", interval.upper);
        assert!(interval.contains(21.0 / 102.0));
    }

    #[test]
    fn test_interval_skewed_towards_zero() {
        let interval = BetaPosterior::new(3.0, 1e7)
            .unwrap()
            .credibility_interval(0.95)
            .unwrap();

        assert!((interval.lower - 6.19e-8).abs() < 1e-9, "lower={}", interval.lower);
        assert!((interval.upper - 7.22e-7).abs() < 1e-8, "upper={}", interval.upper);
        assert!(interval.contains(3.0 / (3.0 + 1e7)));
    }

    #[test]
    fn test_interval_skewed_towards_one() {
        let interval = BetaPosterior::new(1e7, 3.0)
            .unwrap()
            .credibility_interval(0.95)
            .unwrap();

        assert!((interval.lower - (1.0 - 7.22e-7)).abs() < 1e-8, "lower={}", interval.lower);
        assert!((interval.upper - (1.0 - 6.19e-8)).abs() < 1e-8, "upper={}", interval.upper);
        assert!(interval.lower < interval.upper);
    }

    #[test]
    fn test_update_with_huge_counts_terminates() {
        let obs = vec![Observation::new(day(1), u64::MAX, u64::MAX / 2).unwrap()];
        let result = update(1.0, 1.0, &obs, 0.95).unwrap();
        let interval = result.final_interval().unwrap();

        assert!(interval.lower <= interval.upper);
        assert!((0.0..=1.0).contains(&interval.lower));
        assert!((0.0..=1.0).contains(&interval.upper));
    }

    #[test]
    fn test_interval_narrows_with_level() {
        let posterior = BetaPosterior::new(21.0, 81.0).unwrap();
        let wide = posterior.credibility_interval(0.99).unwrap();
        let narrow = posterior.credibility_interval(0.90).unwrap();

        assert!(narrow.width() < wide.width());
        assert!(wide.lower < narrow.lower);
        assert!(narrow.upper < wide.upper);
    }

    #[test]
    fn test_interval_rejects_bad_confidence() {
        let posterior = BetaPosterior::uniform();
        for level in [0.0, 1.0, -0.5, 1.5, f64::NAN] {
            assert!(matches!(
                posterior.credibility_interval(level),
                Err(Error::InvalidConfidence(_))
            ));
        }
    }

    #[test]
    fn test_probability_above() {
        let posterior = BetaPosterior::uniform();
        assert!((posterior.probability_above(0.2).unwrap() - 0.8).abs() < 1e-6);

        let posterior = BetaPosterior::new(21.0, 81.0).unwrap();
        let p = posterior.probability_above(0.2).unwrap();
        assert!((p - 0.5396).abs() < 1e-3, "p={}", p);

        assert!(posterior.probability_above(1.5).is_err());
    }

    #[test]
    fn test_update_empty_returns_prior() {
        let result = update(2.0, 3.0, &[], 0.95).unwrap();

        assert_eq!(result.final_alpha(), 2.0);
        assert_eq!(result.final_beta(), 3.0);
        assert!(result.steps.is_empty());
        assert!(result.lower_bound_series().is_empty());
        assert_eq!(result.prior, result.posterior);
    }

    #[test]
    fn test_update_single_observation() {
        let observations = vec![Observation::new(day(1), 100, 20).unwrap()];
        let result = update(1.0, 1.0, &observations, 0.95).unwrap();

        assert_eq!(result.final_alpha(), 21.0);
        assert_eq!(result.final_beta(), 81.0);
        assert_eq!(result.steps.len(), 1);

        let step = &result.steps[0];
        assert_eq!(step.date, day(1));
        assert!((step.interval.lower - 0.1336).abs() < 1e-3);
        assert!((step.interval.upper - 0.2891).abs() < 1e-3);

        let final_interval = result.final_interval().unwrap();
        assert_eq!(final_interval, step.interval);
    }

    #[test]
    fn test_update_records_every_step_in_order() {
        let observations = vec![
            Observation::new(day(3), 50, 10).unwrap(),
            Observation::new(day(1), 40, 4).unwrap(),
            Observation::new(day(2), 60, 12).unwrap(),
        ];
        let result = update(1.0, 1.0, &observations, 0.9).unwrap();

        let dates: Vec<NaiveDate> = result.steps.iter().map(|s| s.date).collect();
        assert_eq!(dates, vec![day(3), day(1), day(2)]);

        assert_eq!(result.steps[0].alpha, 11.0);
        assert_eq!(result.steps[0].beta, 41.0);
        assert_eq!(result.steps[1].alpha, 15.0);
        assert_eq!(result.steps[1].beta, 77.0);
        assert_eq!(result.final_alpha(), 27.0);
        assert_eq!(result.final_beta(), 125.0);

        let series = result.lower_bound_series();
        assert_eq!(series.len(), 3);
        assert_eq!(series[2].0, day(2));
        assert_eq!(series[2].1, result.steps[2].interval.lower);
    }

    #[test]
    fn test_update_rejects_invalid_observation() {
        let observations = vec![
            Observation::new(day(1), 10, 2).unwrap(),
            Observation {
                date: day(2),
                starts: 20,
                converts: 30,
            },
        ];
        assert!(matches!(
            update(1.0, 1.0, &observations, 0.95),
            Err(Error::InvalidObservation(_))
        ));
    }

    #[test]
    fn test_update_rejects_invalid_prior() {
        assert!(matches!(
            update(0.0, 1.0, &[], 0.95),
            Err(Error::InvalidPrior(_))
        ));
        assert!(matches!(
            update(1.0, -1.0, &[], 0.95),
            Err(Error::InvalidPrior(_))
        ));
    }

    #[test]
    fn test_update_rejects_invalid_confidence() {
        assert!(matches!(
            update(1.0, 1.0, &[], 1.0),
            Err(Error::InvalidConfidence(_))
        ));
        assert!(matches!(
            update(1.0, 1.0, &[], 0.0),
            Err(Error::InvalidConfidence(_))
        ));
    }

    #[test]
    fn test_zero_start_day_keeps_posterior() {
        let observations = vec![Observation::new(day(1), 0, 0).unwrap()];
        let result = update(1.0, 1.0, &observations, 0.95).unwrap();
        assert_eq!(result.final_alpha(), 1.0);
        assert_eq!(result.final_beta(), 1.0);
    }

    #[test]
    fn test_large_counts_stay_in_unit_interval() {
        let observations = vec![Observation::new(day(1), 5_000_000, 1_000_000).unwrap()];
        let result = update(1.0, 1.0, &observations, 0.95).unwrap();
        let interval = result.final_interval().unwrap();

        assert!(0.0 <= interval.lower && interval.lower <= interval.upper && interval.upper <= 1.0);
        assert!(interval.contains(0.2));
    }

    fn observation_strategy() -> impl Strategy<Value = (u64, u64)> {
        (0u64..2_000).prop_flat_map(|starts| (Just(starts), 0..=starts))
    }

    proptest! {
        #[test]
        fn prop_parameters_non_decreasing(
            counts in proptest::collection::vec(observation_strategy(), 0..20),
            prior_alpha in 0.1f64..10.0,
            prior_beta in 0.1f64..10.0,
        ) {
            let observations: Vec<Observation> = counts
                .iter()
                .enumerate()
                .map(|(i, (s, c))| {
                    Observation::new(day(1) + chrono::Days::new(i as u64), *s, *c).unwrap()
                })
                .collect();
            let result = update(prior_alpha, prior_beta, &observations, 0.95).unwrap();

            let mut prev = (prior_alpha, prior_beta);
            for step in &result.steps {
                prop_assert!(step.alpha >= prev.0 && step.beta >= prev.1);
                prop_assert!(step.alpha > 0.0 && step.beta > 0.0);
                prev = (step.alpha, step.beta);
            }
        }

        #[test]
        fn prop_interval_bounds_ordered(
            (starts, converts) in observation_strategy(),
            level in 0.5f64..0.999,
        ) {
            let observations = vec![Observation::new(day(1), starts, converts).unwrap()];
            let interval = update(1.0, 1.0, &observations, level)
                .unwrap()
                .final_interval()
                .unwrap();

            prop_assert!(0.0 <= interval.lower);
            prop_assert!(interval.lower <= interval.upper);
            prop_assert!(interval.upper <= 1.0);
        }

        #[test]
        fn prop_lower_bound_monotone_in_converts(
            starts in 1u64..1_000,
            a in 0u64..1_000,
            b in 0u64..1_000,
        ) {
            let low = a.min(b).min(starts);
            let high = a.max(b).min(starts);

            let lower_for = |converts: u64| {
                let observations = vec![Observation::new(day(1), starts, converts).unwrap()];
                update(1.0, 1.0, &observations, 0.95)
                    .unwrap()
                    .final_interval()
                    .unwrap()
                    .lower
            };

            prop_assert!(lower_for(low) <= lower_for(high) + 1e-6);
        }
    }
}

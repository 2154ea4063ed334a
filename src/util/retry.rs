//! アーカイブ取得の再試行方針。
use std::time::Duration;

use rand::Rng;

use crate::config::Config;

/// 一時的な取得失敗をどこまで、どれだけ待って繰り返すか。
///
/// `max_attempts` は初回を含む試行回数。`HTTP_MAX_RETRIES=3` なら
/// リモートへのリクエストは最大 3 回になる。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryConfig {
    #[must_use]
    pub const fn new(max_attempts: usize, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// 設定値から組み立てる。0 を指定しても初回の 1 回は必ず試す。
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.http_max_retries().max(1),
            config.http_backoff_base_ms(),
            config.http_backoff_cap_ms(),
        )
    }

    /// `failures` 回失敗した後にもう一度試してよいか。
    #[must_use]
    pub const fn allows_another(&self, failures: usize) -> bool {
        failures < self.max_attempts
    }

    /// 待機時間の上限。`base * 2^(failures-1)` を `max_delay_ms` で頭打ちにする。
    #[must_use]
    pub fn backoff_ceiling(&self, failures: usize) -> Duration {
        let Some(exponent) = failures.checked_sub(1) else {
            return Duration::ZERO;
        };
        let exponent = u32::try_from(exponent).unwrap_or(u32::MAX).min(63);
        let ceiling = self
            .base_delay_ms
            .saturating_mul(1_u64 << exponent)
            .min(self.max_delay_ms);
        Duration::from_millis(ceiling)
    }

    /// Full jitter: `[0, backoff_ceiling]` から一様に選ぶ。
    #[must_use]
    pub fn backoff(&self, failures: usize) -> Duration {
        let ceiling = u64::try_from(self.backoff_ceiling(failures).as_millis()).unwrap_or(u64::MAX);
        if ceiling == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=ceiling))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ENV_MUTEX,
        tests::{reset_env, set_env},
    };
    use proptest::prelude::*;
    use rstest::rstest;

    fn config_with_retries(retries: &str) -> Config {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        reset_env();
        set_env("NYT_API_KEY", "test-key");
        set_env("HTTP_MAX_RETRIES", retries);
        let config = Config::from_env().expect("config loads");
        reset_env();
        config
    }

    #[test]
    fn max_retries_counts_the_first_request() {
        let retry = RetryConfig::from_config(&config_with_retries("3"));

        assert_eq!(retry.max_attempts, 3);
        assert!(retry.allows_another(1));
        assert!(retry.allows_another(2));
        assert!(!retry.allows_another(3));
    }

    #[test]
    fn zero_retries_still_issues_one_request() {
        let retry = RetryConfig::from_config(&config_with_retries("0"));

        assert_eq!(retry.max_attempts, 1);
        assert!(!retry.allows_another(1));
    }

    #[test]
    fn defaults_follow_backoff_settings() {
        let retry = RetryConfig::from_config(&config_with_retries("3"));

        assert_eq!(retry.backoff_ceiling(1), Duration::from_millis(250));
        assert_eq!(retry.backoff_ceiling(2), Duration::from_millis(500));
        assert_eq!(retry.backoff_ceiling(20), Duration::from_millis(10_000));
    }

    #[rstest]
    #[case(0, 0)]
    #[case(1, 100)]
    #[case(2, 200)]
    #[case(3, 400)]
    #[case(4, 500)]
    #[case(usize::MAX, 500)]
    fn ceiling_doubles_until_capped(#[case] failures: usize, #[case] expected_ms: u64) {
        let retry = RetryConfig::new(5, 100, 500);
        assert_eq!(retry.backoff_ceiling(failures), Duration::from_millis(expected_ms));
    }

    proptest! {
        #[test]
        fn jitter_stays_under_ceiling(
            base in 0_u64..5_000,
            cap in 0_u64..60_000,
            failures in 0_usize..80,
        ) {
            let retry = RetryConfig::new(3, base, cap);
            prop_assert!(retry.backoff(failures) <= retry.backoff_ceiling(failures));
        }
    }
}

use std::time::Duration;

use tokio::time::{Instant, sleep_until};

/// リモート呼び出し同士の最小間隔を守る。
///
/// 排他はしないので、呼び出し側がロックの内側で使う。
#[derive(Debug)]
pub(crate) struct RequestSpacing {
    min_interval: Duration,
    last_request: Option<Instant>,
}

impl RequestSpacing {
    pub(crate) fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: None,
        }
    }

    /// 前回の呼び出しから `min_interval` 経つまで待ち、今回の時刻を記録する。
    pub(crate) async fn wait_turn(&mut self) {
        if let Some(last) = self.last_request {
            sleep_until(last + self.min_interval).await;
        }
        self.last_request = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_request_does_not_wait() {
        let mut spacing = RequestSpacing::new(Duration::from_secs(1));
        let start = Instant::now();

        spacing.wait_turn().await;

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_requests_are_spaced() {
        let mut spacing = RequestSpacing::new(Duration::from_secs(1));
        let start = Instant::now();

        spacing.wait_turn().await;
        spacing.wait_turn().await;
        spacing.wait_turn().await;

        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}

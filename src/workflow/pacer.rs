//! 节流器 - 流程层
//!
//! Oracle 是限流的外部依赖，这里把"调用之间怎么等"抽象成可插拔的
//! `Pacer`：固定延时适合默认配额，令牌桶适合按每分钟调用数计费的档位

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::Config;

/// 节流策略
#[async_trait]
pub trait Pacer: Send + Sync {
    /// 每次 Oracle 调用之后等待
    async fn after_call(&self);
    /// 批与批之间等待
    async fn between_batches(&self);
}

/// 固定延时节流
pub struct FixedDelayPacer {
    call_delay: Duration,
    batch_delay: Duration,
}

impl FixedDelayPacer {
    pub fn new(call_delay: Duration, batch_delay: Duration) -> Self {
        Self {
            call_delay,
            batch_delay,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Duration::from_millis(config.call_delay_ms),
            Duration::from_millis(config.batch_delay_ms),
        )
    }

    /// 测试用：完全不等待
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }
}

#[async_trait]
impl Pacer for FixedDelayPacer {
    async fn after_call(&self) {
        if !self.call_delay.is_zero() {
            tokio::time::sleep(self.call_delay).await;
        }
    }

    async fn between_batches(&self) {
        if !self.batch_delay.is_zero() {
            tokio::time::sleep(self.batch_delay).await;
        }
    }
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// 令牌桶节流（按每分钟调用数限额）
pub struct TokenBucketPacer {
    capacity: f64,
    refill_per_second: f64,
    state: Mutex<BucketState>,
}

impl TokenBucketPacer {
    /// `calls_per_minute`: 限额；桶初始为满，允许小幅突发
    pub fn new(calls_per_minute: u32) -> Self {
        let capacity = calls_per_minute.max(1) as f64;
        Self {
            capacity,
            refill_per_second: capacity / 60.0,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens =
                    (state.tokens + elapsed * self.refill_per_second).min(self.capacity);
                state.last_refill = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                let deficit = 1.0 - state.tokens;
                Duration::from_secs_f64(deficit / self.refill_per_second)
            };
            debug!("令牌桶耗尽，等待 {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }
}

#[async_trait]
impl Pacer for TokenBucketPacer {
    async fn after_call(&self) {
        self.acquire().await;
    }

    async fn between_batches(&self) {
        // 令牌桶已经覆盖整体速率，批间不再额外等待
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_zero_delay_pacer_returns_immediately() {
        let pacer = FixedDelayPacer::none();
        let start = Instant::now();
        pacer.after_call().await;
        pacer.between_batches().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_token_bucket_allows_initial_burst() {
        let pacer = TokenBucketPacer::new(600);
        let start = Instant::now();
        for _ in 0..5 {
            pacer.after_call().await;
        }
        // 桶初始为满，前几次调用不应阻塞
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}

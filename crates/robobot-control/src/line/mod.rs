//! 巡线：位置估计与 PID 跟随

pub mod detector;
pub mod follower;

pub use detector::{
    ActiveMask, LineDetector, LineEstimate, LineReading, estimate, is_90_intersection,
    is_intersection,
};
pub use follower::{LineFollower, PidTerms};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// 跨线程共享的巡线位置（控制线程写，日志线程读）
#[derive(Debug, Clone, Default)]
pub struct SharedLinePosition(Arc<AtomicU64>);

impl SharedLinePosition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, position: f64) {
        self.0.store(position.to_bits(), Ordering::Relaxed);
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

//! Pipeline 接收循环模块
//!
//! 负责后台接收线程的消息分发：主题解析、主控仲裁、遥测解码和状态更新。

use crate::arbitration::{ArbitrationOutcome, MasterArbitration};
use crate::cancel::CancellationToken;
use crate::metrics::BusMetrics;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use robobot_bus::{BusError, BusEvent, RxTransport};
use robobot_protocol::{TelemetryMessage, TopicKind, master_start_time, strip_drive_prefix};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Pipeline 配置
///
/// 控制接收线程和总线客户端的行为。
///
/// # Example
///
/// ```
/// use robobot_driver::PipelineConfig;
///
/// let config = PipelineConfig {
///     print_teensy_info: true,
///     ..Default::default()
/// };
/// assert_eq!(config.max_consecutive_failures, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// 是否打印下位机 `T0/info` 文本
    pub print_teensy_info: bool,
    /// 可恢复接收错误后的退避时间（毫秒）
    pub error_backoff_ms: u64,
    /// 等待连接时的轮询周期（毫秒）
    pub connect_poll_ms: u64,
    /// 等待连接时的告警周期（毫秒）
    pub connect_warn_ms: u64,
    /// 连续发布失败超过该值即终止
    pub max_consecutive_failures: u64,
    /// 成功发送超过该值且接收少于 `heartbeat_min_received` 时停止接收循环
    pub heartbeat_min_sent: u64,
    pub heartbeat_min_received: u64,
    /// 终止时等待接收线程退出的最长时间（毫秒）
    pub join_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            print_teensy_info: false,
            error_backoff_ms: 100,
            connect_poll_ms: 100,
            connect_warn_ms: 500,
            max_consecutive_failures: 10,
            heartbeat_min_sent: 100,
            heartbeat_min_received: 2,
            join_timeout_ms: 2000,
        }
    }
}

/// 遥测消息处理器
///
/// 在接收线程中被独占调用（`&mut self`）。
pub trait MessageHandler: Send {
    fn handle(&mut self, message: &TelemetryMessage);
}

impl<F> MessageHandler for F
where
    F: FnMut(&TelemetryMessage) + Send,
{
    fn handle(&mut self, message: &TelemetryMessage) {
        self(message)
    }
}

/// 接收线程与总线客户端之间的共享状态
pub struct BusShared {
    pub arbitration: MasterArbitration,
    pub metrics: BusMetrics,
    pub config: PipelineConfig,
    /// 全局停止标志
    pub stopped: CancellationToken,
    connected: AtomicBool,
    fatal_error: Mutex<Option<BusError>>,
    robot_name: ArcSwap<String>,
}

impl BusShared {
    pub fn new(
        arbitration: MasterArbitration,
        config: PipelineConfig,
        stopped: CancellationToken,
    ) -> Self {
        Self {
            arbitration,
            metrics: BusMetrics::new(),
            config,
            stopped,
            connected: AtomicBool::new(false),
            fatal_error: Mutex::new(None),
            robot_name: ArcSwap::from_pointee("unknown".to_string()),
        }
    }

    /// broker 是否已确认连接
    pub fn is_connected(&self) -> bool {
        // Acquire: 看到 true 时必须能看到连接前的全部写入
        self.connected.load(Ordering::Acquire)
    }

    /// 接收线程遇到的不可恢复错误
    pub fn fatal_error(&self) -> Option<BusError> {
        self.fatal_error.lock().clone()
    }

    /// 最近一次 `T0/dname` 上报的机器人名称
    pub fn robot_name(&self) -> String {
        self.robot_name.load().as_ref().clone()
    }
}

/// 接收线程循环
///
/// # 参数
/// - `rx`: 接收端（独占）
/// - `handler`: 遥测处理器（通常为 `SensorDecoders`）
/// - `shared`: 共享状态
///
/// 停止标志置位或遇到不可恢复错误时退出。
pub fn rx_loop(mut rx: impl RxTransport, mut handler: impl MessageHandler, shared: Arc<BusShared>) {
    // 设置线程优先级（可选 feature）
    #[cfg(feature = "realtime")]
    {
        use thread_priority::*;

        match set_current_thread_priority(ThreadPriority::Max) {
            Ok(_) => {
                info!("RX thread priority set to MAX (realtime)");
            },
            Err(e) => {
                warn!(
                    "Failed to set RX thread priority: {:?}. \
                    On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                    e
                );
            },
        }
    }

    let backoff = Duration::from_millis(shared.config.error_backoff_ms);

    loop {
        if shared.stopped.is_cancelled() {
            trace!("RX thread: stopped flag is set, exiting");
            break;
        }

        match rx.receive() {
            Ok(BusEvent::Connected) => {
                info!("Connected to MQTT broker");
                shared.connected.store(true, Ordering::Release);
            },
            Ok(BusEvent::Message { topic, payload }) => {
                shared.metrics.received_total.fetch_add(1, Ordering::Relaxed);
                dispatch(&shared, &mut handler, &topic, &payload);
            },
            Err(BusError::Timeout) => {
                // 超时是正常情况
                shared.metrics.rx_timeouts.fetch_add(1, Ordering::Relaxed);
            },
            Err(e) if e.is_fatal() => {
                error!("RX thread: fatal transport error: {}", e);
                *shared.fatal_error.lock() = Some(e);
                shared.stopped.cancel();
                break;
            },
            Err(e) => {
                warn!("RX thread: transport error: {}, retrying", e);
                shared.connected.store(false, Ordering::Release);
                shared.stopped.sleep(backoff);
            },
        }
    }

    debug!("RX thread stopped");
}

/// 分发一条入站消息
///
/// - 非 `robobot/drive/` 前缀的主题被忽略
/// - `master`：主控仲裁
/// - `T0/info`：仅在开启时打印
/// - 其余主题解析为 [`TelemetryMessage`] 交给处理器，解析失败静默计数
pub fn dispatch(
    shared: &BusShared,
    handler: &mut impl MessageHandler,
    topic: &str,
    payload: &str,
) {
    let Some(subtopic) = strip_drive_prefix(topic) else {
        shared.metrics.ignored_messages.fetch_add(1, Ordering::Relaxed);
        trace!("Ignoring message on foreign topic {}", topic);
        return;
    };

    match TopicKind::from_subtopic(subtopic) {
        TopicKind::Master => observe_master(shared, payload),
        TopicKind::Info => {
            if shared.config.print_teensy_info {
                info!("Teensy info: {}", payload.trim_end());
            }
        },
        TopicKind::Unknown => {
            shared.metrics.ignored_messages.fetch_add(1, Ordering::Relaxed);
            trace!("Ignoring unknown subtopic {}", subtopic);
        },
        kind => match TelemetryMessage::parse(kind, payload) {
            Ok(message) => {
                if let TelemetryMessage::DeviceName { name } = &message {
                    shared.robot_name.store(Arc::new(name.clone()));
                }
                handler.handle(&message);
            },
            Err(e) => {
                shared.metrics.decode_errors.fetch_add(1, Ordering::Relaxed);
                debug!("Ignoring malformed {} payload {:?}: {}", subtopic, payload.trim_end(), e);
            },
        },
    }
}

fn observe_master(shared: &BusShared, payload: &str) {
    let claimed = master_start_time(payload);
    let arbitration = &shared.arbitration;

    match arbitration.observe(claimed) {
        ArbitrationOutcome::Confirmed => {
            info!(
                "This client is the only master for robot {}",
                shared.robot_name().trim_end()
            );
        },
        ArbitrationOutcome::Rejected => {
            error!(
                "This client is not the master (master start time {}, ours {}), quitting",
                claimed,
                arbitration.start_time()
            );
        },
        ArbitrationOutcome::Unchanged => {
            if arbitration.is_confirmed_master() && claimed != arbitration.start_time() {
                debug!("Ignoring master claim {} after confirmation", claimed);
            }
        },
    }
}

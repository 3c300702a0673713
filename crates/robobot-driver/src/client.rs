//! 总线客户端
//!
//! 提供对外的 `BusClient`，封装接收线程、主控仲裁、发送健康检查和终止流程。

use crate::arbitration::MasterArbitration;
use crate::cancel::CancellationToken;
use crate::error::DriverError;
use crate::metrics::MetricsSnapshot;
use crate::pipeline::{BusShared, MessageHandler, PipelineConfig, rx_loop};
use parking_lot::Mutex;
use robobot_bus::{RxTransport, TxTransport};
use robobot_protocol::{CMD_PREFIX, Command, Led, Rgb};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, ThreadId, spawn};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Extension trait for timeout-capable thread joins
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // 看门狗线程代为 join，超时后继续在后台运行
        spawn(move || {
            let _ = tx.send(self.join());
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// 终止原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationCause {
    /// 正常关闭（程序退出）
    Requested,
    /// 非主控时尝试发送
    NotMaster,
    /// 连续发布失败过多
    PublishFailures,
    /// 客户端被 drop
    Dropped,
}

/// 两条收尾指令之间的间隔
const FINAL_COMMAND_GAP: Duration = Duration::from_millis(10);

/// 总线客户端
///
/// 通过 `Arc` 在控制线程、日志线程和信号处理器之间共享。
pub struct BusClient {
    shared: Arc<BusShared>,
    tx: Mutex<Box<dyn TxTransport + Send>>,
    /// 终止流程已开始（幂等保护）
    terminating: AtomicBool,
    /// 终止完成，之后不再有任何发布到达传输层
    terminated: AtomicBool,
    /// 心跳不对称检测只触发一次
    heartbeat_tripped: AtomicBool,
    termination_cause: Mutex<Option<TerminationCause>>,
    rx_thread: Mutex<Option<JoinHandle<()>>>,
    rx_thread_id: ThreadId,
}

impl BusClient {
    /// 启动接收线程并阻塞等待 broker 确认连接
    ///
    /// 连接确认后发送 `ti/log "0"`。
    ///
    /// # 错误
    /// - `DriverError::Bus`: 连接失败（不可恢复，不重试）
    /// - `DriverError::Cancelled`: 等待期间停止标志被置位
    /// - `DriverError::Thread`: 接收线程创建失败
    pub fn start<R, T, H>(
        rx: R,
        tx: T,
        handler: H,
        arbitration: MasterArbitration,
        config: PipelineConfig,
        stopped: CancellationToken,
    ) -> Result<Arc<Self>, DriverError>
    where
        R: RxTransport + Send + 'static,
        T: TxTransport + Send + 'static,
        H: MessageHandler + 'static,
    {
        info!("Starting bus client (start time {})", arbitration.start_time());
        let shared = Arc::new(BusShared::new(arbitration, config, stopped));

        let shared_rx = shared.clone();
        let rx_thread = std::thread::Builder::new()
            .name("robobot-bus-rx".to_string())
            .spawn(move || rx_loop(rx, handler, shared_rx))
            .map_err(|e| DriverError::Thread(e.to_string()))?;
        let rx_thread_id = rx_thread.thread().id();

        let client = Arc::new(Self {
            shared,
            tx: Mutex::new(Box::new(tx)),
            terminating: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            heartbeat_tripped: AtomicBool::new(false),
            termination_cause: Mutex::new(None),
            rx_thread: Mutex::new(Some(rx_thread)),
            rx_thread_id,
        });

        client.wait_for_connection()?;
        client.send_cmd(&Command::InterfaceLog { enabled: false })?;
        info!("Bus client setup finished, connected = {}", client.is_connected());

        Ok(client)
    }

    fn wait_for_connection(&self) -> Result<(), DriverError> {
        let poll = Duration::from_millis(self.shared.config.connect_poll_ms);
        let warn_every = Duration::from_millis(self.shared.config.connect_warn_ms);
        let start = Instant::now();
        let mut next_warn = start;

        loop {
            if self.shared.is_connected() {
                return Ok(());
            }
            if let Some(e) = self.shared.fatal_error() {
                error!("Failed to connect to MQTT broker: {}. Won't work without it", e);
                return Err(DriverError::Bus(e));
            }
            if self.shared.stopped.is_cancelled() {
                return Err(DriverError::Cancelled);
            }

            let now = Instant::now();
            if now >= next_warn {
                warn!(
                    "No connection to MQTT broker after {:.2}s (continues...)",
                    (now - start).as_secs_f64()
                );
                next_warn += warn_every;
            }
            self.shared.stopped.sleep(poll);
        }
    }

    /// 发布一条消息（完整主题）
    ///
    /// # 错误
    /// - `DriverError::NotMaster`: 已判定为非主控（同时触发终止）
    /// - `DriverError::Terminated`: 客户端已终止
    /// - `DriverError::Bus`: 发布失败
    pub fn send(&self, topic: &str, payload: &str) -> Result<(), DriverError> {
        let metrics = &self.shared.metrics;

        if self.shared.arbitration.is_not_master() {
            metrics.rejected_sends.fetch_add(1, Ordering::Relaxed);
            error!("Tried to send on {} but this client is not master, terminating", topic);
            self.terminate(TerminationCause::NotMaster);
            return Err(DriverError::NotMaster);
        }

        let payload = if payload.is_empty() { " " } else { payload };

        let result = {
            let mut tx = self.tx.lock();
            // 在锁内检查，保证终止后没有发布到达传输层
            if self.terminated.load(Ordering::Acquire) {
                return Err(DriverError::Terminated);
            }
            tx.publish(topic, payload)
        };

        debug!("SENDING {} {}", topic, payload);

        match result {
            Ok(()) => {
                metrics.consecutive_failures.store(0, Ordering::Relaxed);
                let sent = metrics.sent_total.fetch_add(1, Ordering::Relaxed) + 1;
                let received = metrics.received_total.load(Ordering::Relaxed);
                let config = &self.shared.config;
                if sent > config.heartbeat_min_sent
                    && received < config.heartbeat_min_received
                    && !self.heartbeat_tripped.swap(true, Ordering::AcqRel)
                {
                    error!(
                        "Seems like there is no connection to the robot (tx: {}, rx: {}); \
                        is the interface running? Stopping",
                        sent, received
                    );
                    self.shared.stopped.cancel();
                }
                Ok(())
            },
            Err(e) => {
                metrics.publish_failures_total.fetch_add(1, Ordering::Relaxed);
                let failures = metrics.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                error!("Failed to publish {} with {:?}: {}", topic, payload, e);
                if failures > self.shared.config.max_consecutive_failures {
                    error!("Lost contact to MQTT broker ({} failures in a row), terminating", failures);
                    self.terminate(TerminationCause::PublishFailures);
                }
                Err(e.into())
            },
        }
    }

    /// 发布一条指令（自动加 `robobot/cmd/` 前缀）
    pub fn send_cmd(&self, command: &Command) -> Result<(), DriverError> {
        self.send_raw_cmd(command.topic(), &command.payload())
    }

    /// 按子主题发布（自动加 `robobot/cmd/` 前缀）
    pub fn send_raw_cmd(&self, subtopic: &str, payload: &str) -> Result<(), DriverError> {
        self.send(&format!("{}{}", CMD_PREFIX, subtopic), payload)
    }

    /// 终止客户端（幂等）
    ///
    /// 已连接且仍是主控时先发送收尾指令：`T0/stop`、LED 14/15/16 熄灭、`ti/log 0`。
    /// 之后置位停止标志并等待接收线程退出（在接收线程内调用时跳过 join）。
    pub fn terminate(&self, cause: TerminationCause) {
        if self.terminating.swap(true, Ordering::AcqRel) {
            return;
        }
        *self.termination_cause.lock() = Some(cause);
        info!("Shutting down bus client ({:?})", cause);

        let can_send = self.shared.is_connected()
            && !self.shared.arbitration.is_not_master()
            && cause != TerminationCause::PublishFailures;
        if can_send {
            self.send_final_commands();
        }

        {
            let _tx = self.tx.lock();
            // Release: 终止前的所有发布对之后的读取可见
            self.terminated.store(true, Ordering::Release);
        }
        self.shared.stopped.cancel();

        if std::thread::current().id() == self.rx_thread_id {
            debug!("terminate() called from RX thread, skipping join");
            return;
        }

        let join_timeout = Duration::from_millis(self.shared.config.join_timeout_ms);
        if let Some(handle) = self.rx_thread.lock().take()
            && let Err(_e) = handle.join_timeout(join_timeout)
        {
            error!(
                "RX thread panicked or failed to shut down within {:?}",
                join_timeout
            );
        }
    }

    fn send_final_commands(&self) {
        let led_off = |led: Led| Command::Led {
            led,
            color: Rgb::OFF,
        };

        // 收尾阶段的发送失败只记录日志
        let _ = self.send_cmd(&Command::Stop);
        let _ = self.send_cmd(&led_off(Led::Status14));
        spin_sleep::sleep(FINAL_COMMAND_GAP);
        let _ = self.send_cmd(&led_off(Led::Status15));
        let _ = self.send_cmd(&led_off(Led::Mission));
        spin_sleep::sleep(FINAL_COMMAND_GAP);
        let _ = self.send_cmd(&Command::InterfaceLog { enabled: false });
    }

    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// 终止原因（未终止时为 `None`）
    pub fn termination_cause(&self) -> Option<TerminationCause> {
        *self.termination_cause.lock()
    }

    pub fn arbitration(&self) -> &MasterArbitration {
        &self.shared.arbitration
    }

    /// 本地启动时间（`ti/alive` 载荷）
    pub fn start_time(&self) -> &str {
        self.shared.arbitration.start_time()
    }

    pub fn robot_name(&self) -> String {
        self.shared.robot_name()
    }

    /// 全局停止令牌
    pub fn stopped_token(&self) -> CancellationToken {
        self.shared.stopped.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.is_cancelled()
    }

    /// 获取性能指标快照
    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// 接收线程是否仍在运行
    pub fn is_rx_alive(&self) -> bool {
        self.rx_thread
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for BusClient {
    fn drop(&mut self) {
        self.terminate(TerminationCause::Dropped);
    }
}

// ==========================================
// 诊所管理系统 - 进度 / 取消 / 调度让出
// ==========================================
// 职责: 进度回调契约 / 轮询式取消判定 / 协作式让出点
// 说明: 单逻辑工作者，行之间不并发；让出只为不独占宿主运行时
// ==========================================

use crate::domain::import::ProgressEvent;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

// ==========================================
// ProgressSink - 进度回调
// ==========================================
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: ProgressEvent) {
        self(event)
    }
}

/// 丢弃全部事件
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn emit(&self, _event: ProgressEvent) {}
}

/// 将事件写入 tracing 日志（CLI 使用）
pub struct TracingProgress {
    every: usize, // 每 N 行输出一次 info
}

impl TracingProgress {
    pub fn new(every: usize) -> Self {
        Self {
            every: every.max(1),
        }
    }
}

impl ProgressSink for TracingProgress {
    fn emit(&self, event: ProgressEvent) {
        if event.current % self.every == 0 || event.current == event.total {
            tracing::info!(
                phase = ?event.phase,
                current = event.current,
                total = event.total,
                "{}",
                event.message
            );
        } else {
            debug!(phase = ?event.phase, current = event.current, total = event.total);
        }
    }
}

/// 收集全部事件（测试与嵌入方使用）
#[derive(Default)]
pub struct CollectingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ProgressSink for CollectingProgress {
    fn emit(&self, event: ProgressEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

// ==========================================
// CancellationCheck - 轮询式取消判定
// ==========================================
pub trait CancellationCheck: Send + Sync {
    fn is_cancelled(&self) -> bool;
}

impl<F> CancellationCheck for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_cancelled(&self) -> bool {
        self()
    }
}

/// 从不取消
pub struct NeverCancel;

impl CancellationCheck for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// 可跨任务共享的取消标记（如 Ctrl-C 处理器置位）
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

impl CancellationCheck for CancelFlag {
    fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

// ==========================================
// Scheduler - 协作式让出点
// ==========================================
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn yield_now(&self);
}

/// tokio 运行时让出
pub struct TokioScheduler;

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn yield_now(&self) {
        tokio::task::yield_now().await;
    }
}

/// 不让出（同步测试环境）
pub struct InlineScheduler;

#[async_trait]
impl Scheduler for InlineScheduler {
    async fn yield_now(&self) {}
}

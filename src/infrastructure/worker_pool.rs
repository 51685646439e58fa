//! 固定大小的工作池 - 基础设施层
//!
//! 在多个评分请求之间复用，用信号量限制同时运行的推理任务数量。

use crate::error::DispatchError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// 工作池
#[derive(Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    workers: usize,
    dispatch_timeout: Duration,
}

impl WorkerPool {
    /// 创建工作池
    ///
    /// # 参数
    /// - `workers`: 同时运行的任务上限（至少为 1）
    /// - `dispatch_timeout`: 排队等待空闲工作者的最长时间
    pub fn new(workers: usize, dispatch_timeout: Duration) -> Self {
        let workers = workers.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(workers)),
            workers,
            dispatch_timeout,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// 当前空闲的工作者数量
    pub fn idle_workers(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// 关闭工作池，之后的预留都会失败
    pub fn close(&self) {
        warn!("工作池已关闭");
        self.semaphore.close();
    }

    /// 一次性预留 `slots` 个工作者
    ///
    /// 要么全部拿到，要么一个也不占用，所以并发请求之间不会各拿一半互相等待。
    /// 最多排队 `dispatch_timeout`。
    pub async fn reserve(&self, slots: usize) -> Result<Reservation, DispatchError> {
        if self.semaphore.is_closed() {
            return Err(DispatchError::PoolClosed);
        }
        if slots > self.workers {
            warn!("需要 {} 个工作者，但工作池只有 {} 个", slots, self.workers);
            return Err(DispatchError::PoolExhausted { waited_ms: 0 });
        }

        let acquire = self.semaphore.clone().acquire_many_owned(slots as u32);
        let permit = match tokio::time::timeout(self.dispatch_timeout, acquire).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(DispatchError::PoolClosed),
            Err(_) => {
                return Err(DispatchError::PoolExhausted {
                    waited_ms: self.dispatch_timeout.as_millis() as u64,
                })
            }
        };

        debug!("预留 {} 个工作者，剩余空闲 {}", slots, self.idle_workers());
        Ok(Reservation {
            permit: Arc::new(permit),
            slots,
        })
    }
}

/// 已预留的工作者
///
/// 每个通过它提交的任务持有一份预留；预留本身与所有任务都结束后工作者归还。
#[derive(Debug)]
pub struct Reservation {
    permit: Arc<OwnedSemaphorePermit>,
    slots: usize,
}

impl Reservation {
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// 在预留的工作者上执行任务
    pub fn spawn<F>(&self, task_name: &str, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        debug!("任务 {} 已提交", task_name);
        let permit = self.permit.clone();
        tokio::spawn(async move {
            let _permit = permit;
            future.await
        })
    }
}

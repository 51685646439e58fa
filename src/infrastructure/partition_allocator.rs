//! 分区分配器 - 基础设施层
//!
//! 把分区分配给具名工作负载，并保证分配是单射的：
//! 一个工作负载至多一个分区，一个分区至多被一个工作负载占用。
//! `assign` / `release` 在注册表的同一把锁下执行。

use crate::infrastructure::partition_registry::PartitionRegistry;
use crate::models::{DeviceBinding, PartitionInstance};
use std::sync::Arc;
use tracing::{debug, info};

/// 运行时与上下文缓冲的额外开销系数
pub const MEMORY_OVERHEAD_FACTOR: f64 = 1.5;
/// 固定的额外显存（MB）
pub const MEMORY_BASE_MB: f64 = 4096.0;
/// 最小的常见分区粒度（MB）
pub const PARTITION_GRANULARITY_MB: u64 = 6144;

/// 估算模型所需的分区显存
///
/// `ceil_to_multiple(size * 1.5 + 4096, 6144)`，纯函数。
pub fn memory_requirement_estimate(model_artifact_size_mb: u64) -> u64 {
    let needed = model_artifact_size_mb as f64 * MEMORY_OVERHEAD_FACTOR + MEMORY_BASE_MB;
    let blocks = (needed / PARTITION_GRANULARITY_MB as f64).ceil() as u64;
    blocks.max(1).saturating_mul(PARTITION_GRANULARITY_MB)
}

/// 分区分配器
#[derive(Clone)]
pub struct PartitionAllocator {
    registry: Arc<PartitionRegistry>,
}

impl PartitionAllocator {
    pub fn new(registry: Arc<PartitionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<PartitionRegistry> {
        &self.registry
    }

    /// 为工作负载预留一个分区
    ///
    /// 按发现顺序选择第一个空闲且显存足够的分区。没有合适分区时返回 None，
    /// 这是正常结果。已持有分区的工作负载直接返回原分区。
    pub fn assign(&self, workload_id: &str, required_memory_mb: u64) -> Option<String> {
        self.assign_instance(workload_id, required_memory_mb, |_| true)
            .map(|instance| instance.id)
    }

    fn assign_instance<F>(
        &self,
        workload_id: &str,
        required_memory_mb: u64,
        accept: F,
    ) -> Option<PartitionInstance>
    where
        F: Fn(&PartitionInstance) -> bool,
    {
        let mut state = self.registry.lock_state();

        if let Some(existing) = state.assignments.get(workload_id) {
            let existing = existing.clone();
            return state.instances.iter().find(|p| p.id == existing).cloned();
        }

        let instance = state
            .instances
            .iter_mut()
            .find(|p| p.available && p.memory_mb >= required_memory_mb && accept(p))?;
        instance.available = false;
        let assigned = instance.clone();

        state
            .assignments
            .insert(workload_id.to_string(), assigned.id.clone());

        info!(
            "🔒 工作负载 {} 分配到分区 {} ({} MB, 需要 {} MB)",
            workload_id, assigned.id, assigned.memory_mb, required_memory_mb
        );
        Some(assigned)
    }

    /// 释放工作负载的分区；未分配时什么也不做
    pub fn release(&self, workload_id: &str) {
        let mut state = self.registry.lock_state();

        let Some(partition_id) = state.assignments.remove(workload_id) else {
            debug!("工作负载 {} 没有分配分区，跳过释放", workload_id);
            return;
        };

        if let Some(instance) = state.instances.iter_mut().find(|p| p.id == partition_id) {
            instance.available = true;
        }
        info!("🔓 工作负载 {} 释放分区 {}", workload_id, partition_id);
    }

    /// 预留分区并返回租约，租约销毁时自动释放
    pub fn lease(&self, workload_id: &str, required_memory_mb: u64) -> Option<PartitionLease> {
        self.lease_matching(workload_id, required_memory_mb, |_| true)
    }

    /// 同 `lease`，但只考虑 `accept` 接受的分区（例如已配置服务地址的分区）
    pub fn lease_matching<F>(
        &self,
        workload_id: &str,
        required_memory_mb: u64,
        accept: F,
    ) -> Option<PartitionLease>
    where
        F: Fn(&PartitionInstance) -> bool,
    {
        let instance = self.assign_instance(workload_id, required_memory_mb, accept)?;
        Some(PartitionLease {
            allocator: self.clone(),
            workload_id: workload_id.to_string(),
            instance,
        })
    }
}

/// 分区租约
///
/// 在任何退出路径上（成功、超时、panic 展开）销毁时释放分区。
pub struct PartitionLease {
    allocator: PartitionAllocator,
    workload_id: String,
    instance: PartitionInstance,
}

impl PartitionLease {
    pub fn workload_id(&self) -> &str {
        &self.workload_id
    }

    pub fn partition_id(&self) -> &str {
        &self.instance.id
    }

    pub fn binding(&self) -> DeviceBinding {
        DeviceBinding::from_instance(&self.instance)
    }
}

impl Drop for PartitionLease {
    fn drop(&mut self) {
        self.allocator.release(&self.workload_id);
    }
}

impl std::fmt::Debug for PartitionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionLease")
            .field("workload_id", &self.workload_id)
            .field("partition_id", &self.instance.id)
            .finish()
    }
}

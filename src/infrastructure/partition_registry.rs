//! 分区注册表 - 基础设施层
//!
//! 持有 `PartitionInstance` 的唯一规范列表以及工作负载分配表。
//! 分配决策由 `PartitionAllocator` 在同一把锁下完成。

use crate::error::ResourceError;
use crate::infrastructure::hardware_query::{DeviceReport, HardwareQuery};
use crate::models::PartitionInstance;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

/// 启用并行分区模式所需的最少分区数
pub const MIN_PARTITIONS_FOR_PARALLEL: usize = 2;

/// 注册表内部状态：分区列表 + 工作负载 → 分区 的分配表
#[derive(Debug, Default, Clone)]
pub struct RegistryState {
    pub instances: Vec<PartitionInstance>,
    pub assignments: HashMap<String, String>,
}

/// 分区注册表
pub struct PartitionRegistry {
    query: Box<dyn HardwareQuery>,
    state: Mutex<RegistryState>,
}

impl PartitionRegistry {
    pub fn new(query: Box<dyn HardwareQuery>) -> Self {
        Self {
            query,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// 重新扫描硬件分区，结果覆盖之前的快照
    ///
    /// 查询失败时快照被清空并返回 `ResourceError`。
    /// 仍被分配且依然存在的分区保持 `available = false`。
    pub async fn discover(&self) -> Result<Vec<PartitionInstance>, ResourceError> {
        let reports = match self.query.query_devices().await {
            Ok(reports) => reports,
            Err(e) => {
                warn!("⚠️ 无法查询 GPU 分区: {}", e);
                self.lock_state().instances.clear();
                return Err(e);
            }
        };

        let mut discovered = instances_from_reports(&reports);

        let mut state = self.lock_state();
        state
            .assignments
            .retain(|_, partition_id| discovered.iter().any(|p| &p.id == partition_id));
        for instance in discovered.iter_mut() {
            instance.available = !state.assignments.values().any(|id| id == &instance.id);
        }
        state.instances = discovered.clone();
        drop(state);

        if discovered.len() < MIN_PARTITIONS_FOR_PARALLEL {
            info!(
                "发现 {} 个分区，少于 {} 个，使用共享 GPU 模式",
                discovered.len(),
                MIN_PARTITIONS_FOR_PARALLEL
            );
        } else {
            info!("✓ 发现 {} 个可用分区", discovered.len());
        }

        Ok(discovered)
    }

    /// 当前快照是否支持分区并行
    pub fn parallel_partitions_available(&self) -> bool {
        self.lock_state().instances.len() >= MIN_PARTITIONS_FOR_PARALLEL
    }

    /// 当前分区列表与分配表的副本
    pub fn snapshot(&self) -> RegistryState {
        self.lock_state().clone()
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, RegistryState> {
        // 临界区内不会 panic，中毒时直接沿用内部状态
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// 按发现顺序把分区句柄展开为 `PartitionInstance`
fn instances_from_reports(reports: &[DeviceReport]) -> Vec<PartitionInstance> {
    reports
        .iter()
        .flat_map(|device| {
            device.partitions.iter().map(move |handle| PartitionInstance {
                id: format!("gpu{}-mig{}", device.index, handle.index),
                device_index: device.index,
                memory_mb: handle.memory_mb,
                uuid: handle.uuid.clone(),
                profile: handle.profile.clone(),
                available: true,
            })
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::infrastructure::hardware_query::PartitionHandle;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// 可切换成功/失败的假硬件查询
    pub(crate) struct FakeQuery {
        pub reports: Mutex<Vec<DeviceReport>>,
        pub fail: AtomicBool,
    }

    impl FakeQuery {
        pub(crate) fn with_partitions(memory_mb: &[u64]) -> Arc<Self> {
            Arc::new(Self {
                reports: Mutex::new(vec![device(0, memory_mb)]),
                fail: AtomicBool::new(false),
            })
        }
    }

    pub(crate) fn device(index: u32, memory_mb: &[u64]) -> DeviceReport {
        DeviceReport {
            index,
            name: "NVIDIA A100-SXM4-40GB".to_string(),
            total_memory_mb: 40960,
            partition_mode: "Enabled".to_string(),
            partitions: memory_mb
                .iter()
                .enumerate()
                .map(|(i, mb)| PartitionHandle {
                    index: i as u32,
                    profile: format!("{}g.{}gb", i + 1, mb / 1024),
                    memory_mb: *mb,
                    uuid: format!("MIG-{}-{}", index, i),
                })
                .collect(),
        }
    }

    #[async_trait]
    impl HardwareQuery for Arc<FakeQuery> {
        async fn query_devices(&self) -> Result<Vec<DeviceReport>, ResourceError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ResourceError::CommandFailed {
                    command: "fake".to_string(),
                    status: Some(1),
                    stderr: "permission denied".to_string(),
                });
            }
            Ok(self.reports.lock().unwrap().clone())
        }
    }

    #[tokio::test]
    async fn test_discover_flattens_in_order() {
        let query = FakeQuery::with_partitions(&[20480, 10240]);
        query.reports.lock().unwrap().push(device(1, &[5120]));
        let registry = PartitionRegistry::new(Box::new(query));

        let instances = registry.discover().await.unwrap();
        let ids: Vec<&str> = instances.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["gpu0-mig0", "gpu0-mig1", "gpu1-mig0"]);
        assert!(instances.iter().all(|p| p.available));
        assert!(registry.parallel_partitions_available());
    }

    #[tokio::test]
    async fn test_discover_zero_partitions_is_not_error() {
        let query = FakeQuery::with_partitions(&[]);
        let registry = PartitionRegistry::new(Box::new(query));

        let instances = registry.discover().await.unwrap();
        assert!(instances.is_empty());
        assert!(!registry.parallel_partitions_available());
    }

    #[tokio::test]
    async fn test_query_failure_clears_snapshot() {
        let query = FakeQuery::with_partitions(&[20480, 20480]);
        let registry = PartitionRegistry::new(Box::new(query.clone()));
        registry.discover().await.unwrap();

        query.fail.store(true, Ordering::SeqCst);
        let result = registry.discover().await;
        assert!(result.is_err());
        assert!(registry.snapshot().instances.is_empty());
    }

    #[tokio::test]
    async fn test_rediscovery_is_idempotent_and_keeps_assignments() {
        let query = FakeQuery::with_partitions(&[20480, 20480]);
        let registry = PartitionRegistry::new(Box::new(query.clone()));
        registry.discover().await.unwrap();

        {
            let mut state = registry.lock_state();
            state.instances[1].available = false;
            state
                .assignments
                .insert("1:code_analysis".to_string(), "gpu0-mig1".to_string());
        }

        let again = registry.discover().await.unwrap();
        assert!(again[0].available);
        assert!(!again[1].available);

        // 分区消失后，对应的分配被丢弃
        *query.reports.lock().unwrap() = vec![device(0, &[20480])];
        registry.discover().await.unwrap();
        assert!(registry.snapshot().assignments.is_empty());
    }
}

//! GPU 分区数据模型

use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// 一个可分配的硬件分区（MIG 实例）
///
/// 只由 `PartitionRegistry` 创建；`available` 只由 `PartitionAllocator` 翻转。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionInstance {
    /// 分区标识，形如 `gpu0-mig1`
    pub id: String,
    /// 所在物理 GPU 的索引
    pub device_index: u32,
    /// 分区显存（MB）
    pub memory_mb: u64,
    /// 稳定的硬件句柄（MIG UUID）
    pub uuid: String,
    /// 分区规格名称，例如 `3g.20gb`
    pub profile: String,
    pub available: bool,
}

/// 推理客户端的设备绑定
///
/// 在客户端构造时确定，之后不再修改。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceBinding {
    /// 独占一个分区
    Partition {
        partition_id: String,
        uuid: String,
        device_index: u32,
    },
    /// 共享默认 GPU
    SharedDefault,
}

impl DeviceBinding {
    pub fn from_instance(instance: &PartitionInstance) -> Self {
        DeviceBinding::Partition {
            partition_id: instance.id.clone(),
            uuid: instance.uuid.clone(),
            device_index: instance.device_index,
        }
    }

    /// 用于 `CUDA_VISIBLE_DEVICES` 的设备句柄
    pub fn cuda_visible_devices(&self) -> String {
        match self {
            DeviceBinding::Partition { uuid, .. } => uuid.clone(),
            DeviceBinding::SharedDefault => "0".to_string(),
        }
    }

    pub fn partition_uuid(&self) -> Option<&str> {
        match self {
            DeviceBinding::Partition { uuid, .. } => Some(uuid),
            DeviceBinding::SharedDefault => None,
        }
    }

    pub fn is_partition(&self) -> bool {
        matches!(self, DeviceBinding::Partition { .. })
    }
}

impl Display for DeviceBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceBinding::Partition { partition_id, uuid, .. } => {
                write!(f, "分区 {} ({})", partition_id, uuid)
            }
            DeviceBinding::SharedDefault => write!(f, "共享默认 GPU"),
        }
    }
}

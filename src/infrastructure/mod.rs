//! 基础设施层（Infrastructure Layer）
//!
//! 持有稀缺资源，只暴露能力：
//! - `hardware_query` - 查询物理 GPU 与 MIG 分区
//! - `partition_registry` - 分区的规范列表与分配表
//! - `partition_allocator` - 分配 / 释放分区，租约自动归还
//! - `worker_pool` - 跨请求复用的固定大小工作池

pub mod hardware_query;
pub mod partition_allocator;
pub mod partition_registry;
pub mod worker_pool;

pub use hardware_query::{DeviceReport, HardwareQuery, NvidiaSmiQuery, PartitionHandle};
pub use partition_allocator::{memory_requirement_estimate, PartitionAllocator, PartitionLease};
pub use partition_registry::{PartitionRegistry, RegistryState};
pub use worker_pool::{Reservation, WorkerPool};

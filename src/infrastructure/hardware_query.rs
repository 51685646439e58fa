//! 硬件查询 - 基础设施层
//!
//! 只负责"查询物理 GPU 及其 MIG 分区"，不做任何分配决策。
//! 生产环境通过 `nvidia-smi` 查询，测试中可替换为假实现。

use crate::error::ResourceError;
use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, info};

/// 一个 MIG 分区句柄
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionHandle {
    /// 分区在所属 GPU 上的设备编号
    pub index: u32,
    /// 分区规格，例如 `3g.20gb`
    pub profile: String,
    pub memory_mb: u64,
    pub uuid: String,
}

/// 一块物理 GPU 的查询结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceReport {
    pub index: u32,
    pub name: String,
    pub total_memory_mb: u64,
    /// 当前分区模式（`Enabled` / `Disabled` / `[N/A]`）
    pub partition_mode: String,
    pub partitions: Vec<PartitionHandle>,
}

impl DeviceReport {
    pub fn is_partitioned(&self) -> bool {
        !self.partitions.is_empty()
    }
}

/// 硬件查询接口
#[async_trait]
pub trait HardwareQuery: Send + Sync {
    /// 查询当前所有 GPU 及其分区
    ///
    /// 找不到分区不是错误；只有无法执行查询时才返回错误。
    async fn query_devices(&self) -> Result<Vec<DeviceReport>, ResourceError>;
}

/// 基于 `nvidia-smi` 的硬件查询
pub struct NvidiaSmiQuery {
    binary: String,
}

impl NvidiaSmiQuery {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String, ResourceError> {
        let command = format!("{} {}", self.binary, args.join(" "));
        debug!("执行硬件查询: {}", command);

        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|source| ResourceError::CommandUnavailable {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ResourceError::CommandFailed {
                command,
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl Default for NvidiaSmiQuery {
    fn default() -> Self {
        Self::new("nvidia-smi")
    }
}

#[async_trait]
impl HardwareQuery for NvidiaSmiQuery {
    async fn query_devices(&self) -> Result<Vec<DeviceReport>, ResourceError> {
        let gpu_csv = self
            .run(&[
                "--query-gpu=index,name,memory.total,mig.mode.current",
                "--format=csv,noheader,nounits",
            ])
            .await?;
        let listing = self.run(&["-L"]).await?;

        let devices = merge_reports(parse_gpu_csv(&gpu_csv), parse_listing(&listing)?);
        info!(
            "✓ 检测到 {} 块 GPU，共 {} 个 MIG 分区",
            devices.len(),
            devices.iter().map(|d| d.partitions.len()).sum::<usize>()
        );
        Ok(devices)
    }
}

/// 解析 `--query-gpu` 的 CSV 输出
pub fn parse_gpu_csv(output: &str) -> Vec<DeviceReport> {
    let mut devices = Vec::new();
    for line in output.lines() {
        let parts: Vec<&str> = line.split(',').map(|s| s.trim()).collect();
        if parts.len() < 3 {
            continue;
        }
        let Ok(index) = parts[0].parse::<u32>() else {
            continue;
        };
        devices.push(DeviceReport {
            index,
            name: parts[1].to_string(),
            total_memory_mb: parts[2].parse().unwrap_or(0),
            partition_mode: parts.get(3).unwrap_or(&"[N/A]").to_string(),
            partitions: Vec::new(),
        });
    }
    devices
}

/// 解析 `nvidia-smi -L` 的输出
///
/// MIG 行归属于它前面最近的 `GPU n:` 行。
pub fn parse_listing(output: &str) -> Result<Vec<DeviceReport>, ResourceError> {
    let gpu_re = regex_for(r"^GPU (\d+): (.+?) \(UUID: ([^)]+)\)")?;
    let mig_re = regex_for(r"^\s+MIG (\S+)\s+Device\s+(\d+): \(UUID: ([^)]+)\)")?;

    let mut devices: Vec<DeviceReport> = Vec::new();
    for line in output.lines() {
        if let Some(cap) = gpu_re.captures(line) {
            devices.push(DeviceReport {
                index: cap[1].parse().unwrap_or(devices.len() as u32),
                name: cap[2].to_string(),
                total_memory_mb: 0,
                partition_mode: "[N/A]".to_string(),
                partitions: Vec::new(),
            });
        } else if let Some(cap) = mig_re.captures(line) {
            let Some(device) = devices.last_mut() else {
                return Err(ResourceError::ParseFailed {
                    detail: format!("MIG 行之前没有 GPU 行: {}", line.trim()),
                });
            };
            let profile = cap[1].to_string();
            device.partitions.push(PartitionHandle {
                index: cap[2].parse().unwrap_or(device.partitions.len() as u32),
                memory_mb: profile_memory_mb(&profile),
                profile,
                uuid: cap[3].to_string(),
            });
        }
    }
    Ok(devices)
}

/// 从分区规格名解析显存，`3g.20gb` → 20480
///
/// `+me`、`+gfx` 等后缀不影响显存。
pub fn profile_memory_mb(profile: &str) -> u64 {
    let base = profile.split('+').next().unwrap_or(profile);
    base.split('.')
        .find_map(|part| part.strip_suffix("gb"))
        .and_then(|gb| gb.parse::<u64>().ok())
        .map(|gb| gb * 1024)
        .unwrap_or(0)
}

fn merge_reports(mut from_csv: Vec<DeviceReport>, from_listing: Vec<DeviceReport>) -> Vec<DeviceReport> {
    for listed in from_listing {
        match from_csv.iter_mut().find(|d| d.index == listed.index) {
            Some(device) => device.partitions = listed.partitions,
            None => from_csv.push(listed),
        }
    }
    from_csv.sort_by_key(|d| d.index);
    from_csv
}

fn regex_for(pattern: &str) -> Result<Regex, ResourceError> {
    Regex::new(pattern).map_err(|e| ResourceError::ParseFailed {
        detail: format!("正则表达式无效 {}: {}", pattern, e),
    })
}

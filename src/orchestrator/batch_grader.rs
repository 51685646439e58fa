//! 批量评分器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量提交的评分和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：写日志文件头、发现 GPU 分区、创建编排器、探测后端
//! 2. **批量加载**：扫描并加载所有待评分的提交（`Vec<GradingRequest>`）
//! 3. **并发控制**：使用 Semaphore 限制同时评分的提交数量
//! 4. **结果输出**：每份提交写一个 `<文件名>.result.json`
//! 5. **全局统计**：汇总所有提交的评分结果

use crate::config::Config;
use crate::infrastructure::{NvidiaSmiQuery, PartitionAllocator, PartitionRegistry};
use crate::models::{GradingMethod, GradingRequest, MergedResult};
use crate::orchestrator::DualTaskOrchestrator;
use crate::utils::logging;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// 应用主结构
pub struct App {
    config: Config,
    orchestrator: Arc<DualTaskOrchestrator>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        // 初始化日志文件
        logging::init_log_file(&config.output_log_file)?;

        logging::log_startup(config.max_concurrent_submissions, config.worker_count);

        // 发现 GPU 分区
        let allocator = if config.enable_partitions {
            let registry = Arc::new(PartitionRegistry::new(Box::new(NvidiaSmiQuery::new(
                &config.nvidia_smi_path,
            ))));
            if let Err(e) = registry.discover().await {
                warn!("⚠️ 分区发现失败，使用共享 GPU 模式: {}", e);
            }
            Some(PartitionAllocator::new(registry))
        } else {
            info!("分区功能已关闭，使用共享 GPU 模式");
            None
        };

        let orchestrator = DualTaskOrchestrator::from_config(&config, allocator);

        // 探测后端
        let (code_ready, feedback_ready) = orchestrator.probe_backends().await;
        if !code_ready {
            warn!("⚠️ 代码分析后端不可用: {}", config.code_backend.base_url);
        }
        if !feedback_ready {
            warn!("⚠️ 反馈生成后端不可用: {}", config.feedback_backend.base_url);
        }

        Ok(Self {
            config,
            orchestrator: Arc::new(orchestrator),
        })
    }

    /// 使用已构建的编排器创建应用（便于测试）
    pub fn with_orchestrator(config: Config, orchestrator: DualTaskOrchestrator) -> Self {
        Self {
            config,
            orchestrator: Arc::new(orchestrator),
        }
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<GradingSummary> {
        info!("\n📁 正在扫描待评分的提交...");
        let requests = crate::models::load_all_requests(&self.config.submissions_folder).await?;

        if requests.is_empty() {
            warn!("⚠️ 没有找到待评分的TOML文件，程序结束");
            return Ok(GradingSummary::default());
        }

        logging::log_requests_loaded(requests.len(), self.config.max_concurrent_submissions);

        tokio::fs::create_dir_all(&self.config.output_folder)
            .await
            .with_context(|| format!("无法创建输出目录: {}", self.config.output_folder))?;

        let summary = self.grade_all(requests).await;

        logging::print_final_stats(
            summary.success,
            summary.failed,
            summary.total,
            summary.sequential_fallbacks,
            &self.config.output_log_file,
        );

        Ok(summary)
    }

    /// 评分所有提交
    async fn grade_all(&self, requests: Vec<GradingRequest>) -> GradingSummary {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_submissions.max(1)));
        let mut summary = GradingSummary {
            total: requests.len(),
            ..Default::default()
        };

        let mut handles = Vec::new();
        for request in requests {
            let semaphore = semaphore.clone();
            let orchestrator = self.orchestrator.clone();
            let output_folder = PathBuf::from(&self.config.output_folder);

            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .context("并发控制信号量已关闭")?;
                let merged = orchestrator.grade(&request.context).await?;
                write_result(&output_folder, &request.result_stem(), &merged).await?;
                Ok::<MergedResult, anyhow::Error>(merged)
            });
            handles.push(handle);
        }

        for handle in handles {
            match handle.await {
                Ok(Ok(merged)) => {
                    summary.success += 1;
                    if merged.grading_method == GradingMethod::SequentialFallback {
                        summary.sequential_fallbacks += 1;
                    }
                }
                Ok(Err(e)) => {
                    error!("❌ 评分失败: {:#}", e);
                    summary.failed += 1;
                }
                Err(e) => {
                    error!("评分任务执行失败: {}", e);
                    summary.failed += 1;
                }
            }
        }

        summary
    }
}

/// 评分统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GradingSummary {
    pub success: usize,
    pub failed: usize,
    pub total: usize,
    /// 走了顺序兜底的提交数量
    pub sequential_fallbacks: usize,
}

/// 写入 `<stem>.result.json`
async fn write_result(output_folder: &Path, stem: &str, merged: &MergedResult) -> Result<PathBuf> {
    let path = output_folder.join(format!("{}.result.json", stem));
    let json = serde_json::to_string_pretty(merged)?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("无法写入结果文件: {}", path.display()))?;
    info!("💾 结果已保存: {}", path.display());
    Ok(path)
}

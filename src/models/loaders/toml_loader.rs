use crate::models::task::GradingContext;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 一份待评分的提交（TOML 文件）
#[derive(Debug, Clone, Deserialize)]
pub struct GradingRequest {
    /// 提交名称，用于结果文件名
    pub name: String,
    #[serde(flatten)]
    pub context: GradingContext,
    #[serde(skip)]
    pub file_path: Option<String>,
}

impl GradingRequest {
    /// 结果文件名（不含扩展名）
    ///
    /// 优先使用 TOML 文件名：同一目录下唯一，且不含路径分隔符。
    /// 没有来源文件时才使用清理过的 `name`。
    pub fn result_stem(&self) -> String {
        let from_file = self
            .file_path
            .as_deref()
            .and_then(|path| Path::new(path).file_stem())
            .map(|stem| stem.to_string_lossy().to_string());

        match from_file {
            Some(stem) if !stem.is_empty() => stem,
            _ => sanitize_file_stem(&self.name),
        }
    }
}

/// 去掉路径分隔符和开头的 `.`，保证结果是单个文件名
fn sanitize_file_stem(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').trim();
    if cleaned.is_empty() {
        "submission".to_string()
    } else {
        cleaned.to_string()
    }
}

/// 从 TOML 文件加载一份提交
pub async fn load_grading_request(toml_file_path: &Path) -> Result<GradingRequest> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let mut request: GradingRequest = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    request.file_path = Some(toml_file_path.to_string_lossy().to_string());

    Ok(request)
}

/// 从文件夹中加载所有提交，按文件名排序
pub async fn load_all_requests(folder_path: &str) -> Result<Vec<GradingRequest>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut paths = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut requests = Vec::new();
    for path in paths {
        tracing::info!(
            "正在加载: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        match load_grading_request(&path).await {
            Ok(request) => requests.push(request),
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {:#}", path.display(), e);
            }
        }
    }

    Ok(requests)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_folder(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("parallel_grading_{}_{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_load_all_requests_skips_broken_files() {
        let dir = temp_folder("loader");
        std::fs::write(
            dir.join("a_student.toml"),
            r#"
name = "a_student"
student_code = "def add(a, b):\n    return a + b"
student_markdown = "我实现了加法"
solution_code = "def add(a, b): return a + b"

[assignment_info]
title = "加法"

[rubric_elements]
correctness = 60
style = 40
"#,
        )
        .unwrap();
        std::fs::write(dir.join("b_broken.toml"), "name = ").unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let requests = load_all_requests(dir.to_str().unwrap()).await.unwrap();
        assert_eq!(requests.len(), 1);

        let request = &requests[0];
        assert_eq!(request.name, "a_student");
        assert_eq!(request.context.assignment_title(), "加法");
        assert_eq!(request.context.rubric_elements.len(), 2);
        assert!(request.file_path.as_deref().unwrap().ends_with("a_student.toml"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_result_stem_uses_file_name_not_declared_name() {
        let dir = temp_folder("stem");
        std::fs::write(dir.join("bob.toml"), "name = \"../escape\"\n").unwrap();

        let request = load_grading_request(&dir.join("bob.toml")).await.unwrap();
        assert_eq!(request.name, "../escape");
        assert_eq!(request.result_stem(), "bob");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_result_stem_without_file_is_sanitized() {
        let request = |name: &str| GradingRequest {
            name: name.to_string(),
            context: GradingContext::default(),
            file_path: None,
        };
        assert_eq!(request("../x").result_stem(), "_x");
        assert_eq!(request("a/b\\c").result_stem(), "a_b_c");
        assert_eq!(request("..").result_stem(), "submission");
        assert_eq!(request("alice").result_stem(), "alice");
    }

    #[tokio::test]
    async fn test_missing_folder_is_error() {
        let result = load_all_requests("/definitely/not/here").await;
        assert!(result.is_err());
    }
}

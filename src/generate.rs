pub mod discover;
pub mod stdin;

pub use discover::{discover, output_path};
pub use stdin::{generate_source, generate_stdin};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;

use crate::registry::Registry;

/// 执行一个模板模块，返回默认导出的文本
pub trait ModuleLoader: Send + Sync {
    fn evaluate(&self, path: &Path) -> Result<String>;
}

impl<F> ModuleLoader for F
where
    F: Fn(&Path) -> Result<String> + Send + Sync,
{
    fn evaluate(&self, path: &Path) -> Result<String> {
        self(path)
    }
}

/// 单个文件的生成失败
#[derive(Debug, Error)]
#[error("生成 {} 失败：{error:#}", .output.display())]
pub struct GenerateError {
    pub output: PathBuf,
    pub error: anyhow::Error,
}

#[derive(Debug, Default)]
pub struct GenerateReport {
    pub generated: Vec<PathBuf>,
    /// 按任务结束的先后顺序
    pub errors: Vec<GenerateError>,
}

impl GenerateReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// 并发生成 `source` 下所有模板模块到 `destination`
///
/// 单个文件失败只记录到报告中，不影响其他文件。
pub async fn generate_dir(
    loader: Arc<dyn ModuleLoader>,
    registry: &Registry,
    source: &Path,
    destination: &Path,
) -> Result<GenerateReport> {
    let modules = discover(source, registry)?;
    tracing::debug!("发现 {} 个模板模块", modules.len());

    let mut tasks = JoinSet::new();
    for module in modules {
        let output = output_path(source, destination, &module)?;
        let loader = loader.clone();
        tasks.spawn(async move {
            let result = generate_file(loader, module, &output).await;
            (output, result)
        });
    }

    let mut report = GenerateReport::default();
    while let Some(joined) = tasks.join_next().await {
        let (output, result) = joined.context("生成任务异常终止")?;
        match result {
            Ok(()) => report.generated.push(output),
            Err(error) => report.errors.push(GenerateError { output, error }),
        }
    }
    Ok(report)
}

async fn generate_file(loader: Arc<dyn ModuleLoader>, module: PathBuf, output: &Path) -> Result<()> {
    let text = tokio::task::spawn_blocking(move || loader.evaluate(&module))
        .await
        .context("模块执行任务异常终止")??;

    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("创建目录 {} 失败", parent.display()))?;
    }
    tokio::fs::write(output, text)
        .await
        .with_context(|| format!("写入 {} 失败", output.display()))?;

    tracing::info!("{} generated", output.display());
    Ok(())
}

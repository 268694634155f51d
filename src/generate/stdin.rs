use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

use super::ModuleLoader;

/// 读取全部标准输入作为模块源码并求值
pub async fn generate_stdin(loader: Arc<dyn ModuleLoader>, workdir: &Path) -> Result<String> {
    let mut source = String::new();
    tokio::io::stdin()
        .read_to_string(&mut source)
        .await
        .context("读取标准输入失败")?;
    generate_source(loader, &source, workdir).await
}

/// 把源码写入 `workdir` 下的隐藏临时模块后求值
///
/// 临时模块在成功、失败或收到 SIGINT/SIGTERM 时都会被删除。
pub async fn generate_source(
    loader: Arc<dyn ModuleLoader>,
    source: &str,
    workdir: &Path,
) -> Result<String> {
    // 先注册信号，临时模块出现后的任何信号都会走清理分支
    let shutdown = shutdown_signal()?;

    let mut module = tempfile::Builder::new()
        .prefix(".")
        .suffix(".lua")
        .tempfile_in(workdir)
        .with_context(|| format!("在 {} 创建临时模块失败", workdir.display()))?;
    if let Err(e) = module.write_all(source.as_bytes()).and_then(|()| module.flush()) {
        discard(module);
        return Err(anyhow::Error::new(e).context("写入临时模块失败"));
    }

    let path = module.path().to_path_buf();
    tracing::debug!("临时模块: {}", path.display());
    let task = tokio::task::spawn_blocking(move || loader.evaluate(&path));

    let outcome = tokio::select! {
        joined = task => joined.context("模块执行任务异常终止").and_then(|r| r),
        signal = shutdown => Err(anyhow::anyhow!("收到 {signal}，已中止生成")),
    };

    discard(module);
    outcome
}

/// 删除临时模块；失败只记录警告
fn discard(module: tempfile::NamedTempFile) {
    let path = module.path().to_path_buf();
    if let Err(e) = module.close() {
        tracing::warn!("删除临时模块 {} 失败: {e}", path.display());
    }
}

/// 立即注册 SIGINT/SIGTERM，返回等待任一信号的 future
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt()).context("注册 SIGINT 失败")?;
    let mut terminate = signal(SignalKind::terminate()).context("注册 SIGTERM 失败")?;
    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    Ok(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "SIGINT",
            Err(_) => std::future::pending().await,
        }
    })
}

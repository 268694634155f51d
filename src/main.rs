use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tmpl::config::ProjectConfig;
use tmpl::generate::{self, ModuleLoader};
use tmpl::lua::LuaLoader;
use tmpl::registry::{self, Registry};
use tmpl::syntaxes;

#[derive(Parser)]
#[command(name = "tmpl", about = "多语言标签模板与文件生成器", version = long_version())]
struct Cli {
    /// 项目根目录（默认当前目录）
    #[arg(short, long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// 渲染模板模块；不带参数时从标准输入读取模块
    #[command(alias = "generate")]
    Gen {
        /// 输出目录
        destination: Option<PathBuf>,

        /// 源目录（默认与输出目录相同）
        source: Option<PathBuf>,
    },

    /// 导出编辑器语法文件
    Syntaxes {
        /// 输出目录（覆盖配置）
        #[arg(long)]
        out: Option<String>,

        /// manifest 路径（覆盖配置）
        #[arg(long)]
        manifest: Option<String>,
    },

    /// 列出已注册的语言
    Languages,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // None 等同于 Gen { destination: None, source: None }
    let command = cli.command.unwrap_or(Commands::Gen {
        destination: None,
        source: None,
    });

    let config = ProjectConfig::load(&cli.root)?;

    // 标准输出留给生成结果，日志写到 stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    {
        let mut global = registry::global()
            .write()
            .map_err(|_| anyhow::anyhow!("全局语言注册表已损坏"))?;
        config.register_languages(&mut global)?;
    }
    let registry = Arc::new(registry::snapshot());

    match command {
        Commands::Gen {
            destination,
            source,
        } => {
            let root = cli.root.canonicalize()?;
            let loader: Arc<dyn ModuleLoader> = Arc::new(LuaLoader::new(registry.clone(), &root)?);

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            let result = runtime.block_on(async {
                match destination {
                    Some(destination) => {
                        let source = source.unwrap_or_else(|| destination.clone());
                        run_dir(loader, &registry, &source, &destination).await
                    }
                    None => run_stdin(loader, &root).await,
                }
            });
            // 信号中止后仍在执行的 Lua 模块不阻塞退出
            runtime.shutdown_timeout(Duration::from_millis(500));
            result?;
        }
        Commands::Syntaxes { out, manifest } => {
            let root = cli.root.canonicalize()?;
            let mut syntaxes_config = config.syntaxes.clone();
            if let Some(out) = out {
                syntaxes_config.out_dir = out;
            }
            if let Some(manifest) = manifest {
                syntaxes_config.manifest = manifest;
            }

            let report = syntaxes::export(&registry, &syntaxes_config, &root)?;
            tracing::info!("已生成 {} 个语法文件", report.written.len());
            if let Some(e) = report.manifest_error {
                tracing::warn!("manifest 未更新：{e}");
            }
        }
        Commands::Languages => print_languages(&registry)?,
    }

    Ok(())
}

async fn run_dir(
    loader: Arc<dyn ModuleLoader>,
    registry: &Registry,
    source: &Path,
    destination: &Path,
) -> anyhow::Result<()> {
    let report = generate::generate_dir(loader, registry, source, destination).await?;

    // 每个失败文件一行警告，不受日志级别过滤
    let mut stderr = std::io::stderr().lock();
    for e in &report.errors {
        let line = e.to_string().lines().map(str::trim).collect::<Vec<_>>().join(" ");
        writeln!(stderr, "warning: {line}")?;
    }
    drop(stderr);

    if report.is_ok() {
        tracing::info!("生成完成：{} 个文件", report.generated.len());
        Ok(())
    } else {
        anyhow::bail!(
            "生成失败：{} 个错误，{} 个文件成功",
            report.errors.len(),
            report.generated.len()
        );
    }
}

async fn run_stdin(loader: Arc<dyn ModuleLoader>, workdir: &Path) -> anyhow::Result<()> {
    let text = generate::generate_stdin(loader, workdir).await?;
    // 原样输出，不追加换行
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

fn print_languages(registry: &Registry) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    for def in registry.languages() {
        writeln!(
            stdout,
            "{:<12} {:<20} {:<26} {}",
            def.extension,
            def.aliases.join(","),
            def.mime_type.as_deref().unwrap_or("-"),
            def.description.as_deref().unwrap_or(""),
        )?;
    }
    Ok(())
}

const fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        "\ncommit:  ",
        env!("TMPL_GIT_COMMIT"),
        "\nbuild:   ",
        env!("TMPL_BUILD_TIME"),
        "\ntarget:  ",
        env!("TMPL_BUILD_TARGET"),
        "\nprofile: ",
        env!("TMPL_BUILD_PROFILE"),
    )
}

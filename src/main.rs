use anyhow::Context;
use artidown::cli;
use artidown::core::{DownloadManager, Task, TokioScheduler};
use artidown::resolver::RepositoryResolver;
use artidown::transport::{HttpTransport, SchemeTransport, Transport};
use artidown::ui::{self, DownloadReport, ProgressManager};
use artidown::utils::logger;
use chrono::Local;
use std::sync::Arc;
use std::time::{Duration, Instant};

const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

fn main() -> anyhow::Result<()> {
    // 解析参数和配置
    let (args, config) = cli::Args::parse_args()?;
    logger::init(&config)?;
    log::info!("程序启动");

    // 获取下载地址列表
    let urls = args.get_urls()?;
    log::info!("解析到的地址: {:?}", urls);
    log::info!("配置文件路径: {}", args.config);
    log::info!("{}", config.get_summary());

    if !args.json {
        println!("{}", config.get_summary());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .max_blocking_threads(config.worker_threads)
        .thread_name("artidown")
        .enable_all()
        .build()
        .context("无法创建运行时")?;

    // 组装下载管理器
    let scheduler = Arc::new(TokioScheduler::new(runtime.handle().clone()));
    let http = HttpTransport::new(
        &config.staging_dir,
        Duration::from_secs(config.timeout),
        &config.user_agent,
    )?;
    let transport: Arc<dyn Transport> = Arc::new(SchemeTransport::new(Some(http)));
    let resolver = Arc::new(RepositoryResolver::new(
        config.local_repository_paths(),
        config.remote_repositories.clone(),
        Arc::clone(&transport),
    ));
    let manager = DownloadManager::new(transport, resolver, scheduler, config.retry_policy());
    log::info!("下载管理器已启动");

    let progress = if args.json {
        ProgressManager::hidden(urls.len() as u64)
    } else {
        ProgressManager::new(urls.len() as u64)
    };

    let started_at = Local::now();
    let started = Instant::now();
    let downloader = manager.create_downloader();
    let tasks: Vec<Arc<Task>> = urls
        .iter()
        .map(|url| {
            let progress = progress.clone();
            downloader.download_with(url, move |task| progress.task_done(task))
        })
        .collect();

    let outcome = downloader.wait();
    progress.finish();
    manager.shutdown();

    let report = DownloadReport::new(started_at, started.elapsed(), &tasks);
    if args.json {
        println!("{}", report.to_json()?);
    } else {
        for entry in &report.entries {
            match (&entry.path, &entry.error) {
                (Some(path), _) => ui::print_success(&format!("{} -> {}", entry.url, path)),
                (_, Some(error)) => ui::print_error(&format!("{} - {}", entry.url, error)),
                _ => {}
            }
        }
        println!("{}", report.summary());
    }

    drop(tasks);
    drop(downloader);
    drop(manager);
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);

    match outcome {
        Ok(()) => {
            log::info!("全部下载完成");
            Ok(())
        }
        Err(e) => {
            log::error!("{}", e);
            log::logger().flush();
            std::process::exit(1);
        }
    }
}

use std::time::Duration;

use clap::Parser;
use log::info;
use tokio::net::TcpListener;
use tokio::task::block_in_place;

use crate::cli::SubCommandExtend;
use crate::config::{IndexOptions, Opts, ThresholdOptions};
use crate::{DejaView, server};

#[derive(Parser, Debug, Clone)]
pub struct ServerCommand {
    #[command(flatten)]
    pub index: IndexOptions,
    #[command(flatten)]
    pub threshold: ThresholdOptions,
    /// 监听地址
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub addr: String,
    /// 单张图片检查的超时时间，单位为秒
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub timeout: u64,
}

impl SubCommandExtend for ServerCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let config = opts.conf_dir.dejaview_config(&self.index, &self.threshold);
        let dejaview = block_in_place(|| DejaView::open(&config))?;

        // 创建应用状态
        let state = server::AppState::new(
            dejaview,
            opts.conf_dir.path().join("tmp"),
            Duration::from_secs(self.timeout),
        )?;

        // 创建应用
        let app = server::create_app(state.clone());

        // 启动服务器
        info!("服务器启动：http://{}", &self.addr);
        let listener = TcpListener::bind(&self.addr).await?;
        axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

        info!("正在保存索引");
        block_in_place(|| state.dejaview.pipeline().persist())?;
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("无法监听退出信号: {e}");
        std::future::pending::<()>().await;
    }
}

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tokio::task::block_in_place;

use super::check::print_decisions;
use crate::DejaView;
use crate::cli::SubCommandExtend;
use crate::config::{IndexOptions, Opts, OutputFormat, ThresholdOptions};

#[derive(Parser, Debug, Clone)]
pub struct SubmitCommand {
    #[command(flatten)]
    pub index: IndexOptions,
    #[command(flatten)]
    pub threshold: ThresholdOptions,
    /// 提交的图片
    pub image: PathBuf,
    /// 保存时使用的文件名，默认为图片原文件名
    #[arg(long)]
    pub name: Option<String>,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SubmitCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let config = opts.conf_dir.dejaview_config(&self.index, &self.threshold);
        let name = match &self.name {
            Some(name) => name.clone(),
            None => self.image.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default(),
        };

        let decision = block_in_place(|| -> Result<_> {
            let dejaview = DejaView::open(&config)?;
            let decision = dejaview.submit(&self.image, &name);
            dejaview.shutdown()?;
            Ok(decision)
        })?;
        if let Some(source) = &decision.stored_source {
            eprintln!("已保存为 {source}");
        }
        print_decisions(&[(self.image.display().to_string(), decision)], self.output_format)
    }
}

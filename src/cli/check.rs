use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tokio::task::block_in_place;

use crate::DejaView;
use crate::cli::SubCommandExtend;
use crate::config::{IndexOptions, Opts, OutputFormat, ThresholdOptions};
use crate::pipeline::Decision;

#[derive(Parser, Debug, Clone)]
pub struct CheckCommand {
    #[command(flatten)]
    pub index: IndexOptions,
    #[command(flatten)]
    pub threshold: ThresholdOptions,
    /// 需要检查的图片
    #[arg(required = true)]
    pub images: Vec<PathBuf>,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for CheckCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let config = opts.conf_dir.dejaview_config(&self.index, &self.threshold);
        let result = block_in_place(|| -> Result<_> {
            let dejaview = DejaView::open(&config)?;
            Ok(self
                .images
                .iter()
                .map(|image| (image.display().to_string(), dejaview.check(image)))
                .collect::<Vec<_>>())
        })?;
        print_decisions(&result, self.output_format)
    }
}

pub(crate) fn print_decisions(result: &[(String, Decision)], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?);
        }
        OutputFormat::Table => {
            for (image, decision) in result {
                println!(
                    "{}\t{:.2}\t{}\t{}\t{}",
                    decision.status,
                    decision.similarity_percentage,
                    decision.method.as_deref().unwrap_or("-"),
                    decision.matched_source.as_deref().unwrap_or("-"),
                    image,
                );
                if let Some(error) = &decision.error {
                    eprintln!("{image}: {error}");
                }
            }
        }
    }
    Ok(())
}

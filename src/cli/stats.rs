use clap::Parser;
use tokio::task::block_in_place;

use crate::DejaView;
use crate::cli::SubCommandExtend;
use crate::config::{IndexOptions, Opts, OutputFormat, ThresholdOptions};

#[derive(Parser, Debug, Clone)]
pub struct StatsCommand {
    #[command(flatten)]
    pub index: IndexOptions,
    #[command(flatten)]
    pub threshold: ThresholdOptions,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for StatsCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let config = opts.conf_dir.dejaview_config(&self.index, &self.threshold);
        let stats = block_in_place(|| DejaView::open(&config)?.stats())?;

        match self.output_format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
            OutputFormat::Table => {
                for s in &stats {
                    println!(
                        "{}\t{}({})\t{} 个向量\t{} 条路径\t分段 {:?}",
                        s.prefix, s.kind, s.dimension, s.total_vectors, s.total_paths, s.segments
                    );
                }
            }
        }
        Ok(())
    }
}

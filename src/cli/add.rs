use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use clap::Parser;
use indicatif::{ParallelProgressIterator, ProgressBar};
use log::info;
use rayon::prelude::*;
use regex::Regex;
use tokio::task::block_in_place;
use walkdir::WalkDir;

use crate::DejaView;
use crate::cli::SubCommandExtend;
use crate::config::{IndexOptions, Opts, ThresholdOptions};
use crate::utils::pb_style;

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    #[command(flatten)]
    pub index: IndexOptions,
    #[command(flatten)]
    pub threshold: ThresholdOptions,
    /// 图片所在目录，也可以是单张图片
    pub path: PathBuf,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "png,jpg,jpeg,webp,bmp,tiff")]
    pub suffix: String,
}

impl SubCommandExtend for AddCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let re_suf = Regex::new(&format!("(?i)^({})$", self.suffix.replace(',', "|")))?;
        let config = opts.conf_dir.dejaview_config(&self.index, &self.threshold);

        block_in_place(|| -> Result<()> {
            let dejaview = DejaView::open(&config)?;
            let store = dejaview.store();

            let images = WalkDir::new(&self.path)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .filter(|path| {
                    path.extension().is_some_and(|ext| re_suf.is_match(&ext.to_string_lossy()))
                })
                // 上传目录中的图片在提交时已经入库
                .filter(|path| !store.source_id(path).starts_with("uploads/"))
                .collect::<Vec<_>>();
            info!("找到 {} 张图片", images.len());

            let pb = ProgressBar::new(images.len() as u64).with_style(pb_style());
            let failed = AtomicUsize::new(0);
            images.par_iter().progress_with(pb.clone()).for_each(|image| {
                let source_id = store.source_id(image);
                if let Err(e) = dejaview.pipeline().index(image, &source_id) {
                    pb.println(format!("[ERR] {}: {e}", image.display()));
                    failed.fetch_add(1, Ordering::Relaxed);
                }
            });
            pb.finish_with_message("写入索引");

            let failed = failed.into_inner();
            dejaview.shutdown()?;
            info!("添加完成: 成功 {}, 失败 {failed}", images.len() - failed);
            Ok(())
        })
    }
}

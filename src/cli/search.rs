use std::convert::Infallible;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, ValueEnum};

use crate::MediaDBBuilder;
use crate::cli::{SubCommandExtend, load_engine};
use crate::config::{EngineOptions, Opts};
use crate::query::SearchHit;
use crate::tools::DEFAULT_TOP_K;

#[derive(Parser, Debug, Clone)]
pub struct SearchTextCommand {
    #[command(flatten)]
    pub engine: EngineOptions,
    /// 描述图片内容的文本
    pub query: String,
    /// 返回的结果数量
    #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SearchTextCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let engine = load_engine(&self.engine, opts).await?;
        let db = MediaDBBuilder::new(opts.conf_dir.clone()).open(engine).await?;
        let result = db.search_by_text(&self.query, self.top_k).await?;
        print_result(&result, &self.output_format)
    }
}

#[derive(Parser, Debug, Clone)]
pub struct SearchImageCommand {
    #[command(flatten)]
    pub engine: EngineOptions,
    /// 参考图片路径，不需要已被索引
    pub image: PathBuf,
    /// 返回的结果数量
    #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SearchImageCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let engine = load_engine(&self.engine, opts).await?;
        let db = MediaDBBuilder::new(opts.conf_dir.clone()).open(engine).await?;
        let result = db.search_by_image(&self.image, self.top_k).await?;
        print_result(&result, &self.output_format)
    }
}

fn print_result(result: &[SearchHit], format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?)
        }
        OutputFormat::Table => {
            for hit in result {
                println!("{:.4}\t{}", hit.distance, hit.path_or_placeholder());
            }
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone)]
pub enum OutputFormat {
    Json,
    Table,
}

impl FromStr for OutputFormat {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            _ => Ok(Self::Table),
        }
    }
}

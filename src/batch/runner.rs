//! # 批量执行器
//!
//! 并行执行批量解析任务。
//!
//! ## 功能
//! - 基于 rayon 的并行迭代，每个文件一个任务
//! - 进度条显示
//! - 按文件收集成功结果、跳过和失败，不重试
//!
//! ## 依赖关系
//! - 被 `commands/collect.rs` 调用
//! - 使用 `utils/progress.rs` 创建进度条
//! - 使用 `rayon` 进行并行计算

use crate::utils::progress;

use rayon::prelude::*;
use std::path::PathBuf;

/// 单个文件处理结果
#[derive(Debug, Clone)]
pub enum ProcessResult<T> {
    /// 处理成功
    Success(T),
    /// 跳过（如空文件）
    Skipped(String),
    /// 处理失败 (错误信息)
    Failed(String),
}

/// 批量处理结果汇总，成功项保持输入顺序
#[derive(Debug)]
pub struct BatchResult<T> {
    pub successes: Vec<(PathBuf, T)>,
    pub skipped: Vec<(PathBuf, String)>,
    pub failures: Vec<(PathBuf, String)>,
}

impl<T> Default for BatchResult<T> {
    fn default() -> Self {
        Self {
            successes: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<T> BatchResult<T> {
    /// 合并处理结果
    pub fn merge(&mut self, path: PathBuf, result: ProcessResult<T>) {
        match result {
            ProcessResult::Success(value) => self.successes.push((path, value)),
            ProcessResult::Skipped(reason) => self.skipped.push((path, reason)),
            ProcessResult::Failed(err) => {
                log::warn!("{}: {}", path.display(), err);
                self.failures.push((path, err));
            }
        }
    }

    /// 总处理数量
    pub fn total(&self) -> usize {
        self.successes.len() + self.skipped.len() + self.failures.len()
    }
}

/// 批量执行器
pub struct BatchRunner {
    /// 并行作业数
    jobs: usize,
    /// 是否显示进度条
    show_progress: bool,
}

impl BatchRunner {
    /// 创建新的批量执行器，`jobs == 0` 时使用全部 CPU
    pub fn new(jobs: usize) -> Self {
        let jobs = if jobs == 0 { num_cpus::get() } else { jobs };
        Self {
            jobs,
            show_progress: true,
        }
    }

    /// 关闭进度条（测试和非交互场景）
    pub fn quiet(mut self) -> Self {
        self.show_progress = false;
        self
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// 并行处理文件列表
    pub fn run<T, F>(&self, files: Vec<PathBuf>, processor: F) -> BatchResult<T>
    where
        T: Send,
        F: Fn(&PathBuf) -> ProcessResult<T> + Sync + Send,
    {
        let pb = if self.show_progress {
            progress::create_progress_bar(files.len() as u64, "Parsing")
        } else {
            indicatif::ProgressBar::hidden()
        };

        let work = || -> Vec<ProcessResult<T>> {
            files
                .par_iter()
                .map(|file| {
                    let result = processor(file);
                    pb.inc(1);
                    result
                })
                .collect()
        };

        // 配置 rayon 线程池
        let results = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()
        {
            Ok(pool) => pool.install(work),
            Err(e) => {
                log::warn!("cannot build a {}-thread pool ({}), using the global pool", self.jobs, e);
                work()
            }
        };

        pb.finish_and_clear();

        // 汇总结果
        let mut batch_result = BatchResult::default();
        for (path, result) in files.into_iter().zip(results) {
            batch_result.merge(path, result);
        }

        batch_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_preserves_order_and_sorts_outcomes() {
        let files: Vec<PathBuf> = (0..20).map(|i| PathBuf::from(format!("{}.castep", i))).collect();

        let result = BatchRunner::new(4).quiet().run(files, |path| {
            let n: usize = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            match n % 5 {
                0 => ProcessResult::Failed(format!("bad {}", n)),
                1 => ProcessResult::Skipped("empty".to_string()),
                _ => ProcessResult::Success(n * 10),
            }
        });

        assert_eq!(result.total(), 20);
        assert_eq!(result.failures.len(), 4);
        assert_eq!(result.skipped.len(), 4);
        assert_eq!(result.successes.len(), 12);

        let values: Vec<usize> = result.successes.iter().map(|(_, v)| *v).collect();
        let mut sorted = values.clone();
        sorted.sort();
        assert_eq!(values, sorted);
        assert_eq!(result.failures[0].1, "bad 0");
    }

    #[test]
    fn test_zero_jobs_uses_all_cpus() {
        assert_eq!(BatchRunner::new(0).jobs(), num_cpus::get());
        assert_eq!(BatchRunner::new(3).jobs(), 3);
    }
}

//! 任务日志
//!
//! 提供者执行期间产生的输出行（例如脚本的 stdout/stderr）收集到当前任务的日志里，
//! 随 `TaskResult::logs` 回传给编排器。日志通过 tokio 任务局部变量传递，提供者接口
//! 因此不需要额外参数；在提供者内部另行 spawn 的任务不在作用域内。

use std::future::Future;
use std::sync::{Arc, Mutex};

/// 单个任务最多保留的日志行数，超出部分丢弃最早的行
pub const MAX_TASK_LOG_LINES: usize = 1000;

tokio::task_local! {
    static CURRENT_TASK_LOG: TaskLog;
}

#[derive(Debug, Clone, Default)]
pub struct TaskLog {
    lines: Arc<Mutex<Vec<String>>>,
}

impl TaskLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在本日志的作用域内运行 `future`，期间 [`record`] 写入本日志
    pub async fn scope<F: Future>(&self, future: F) -> F::Output {
        CURRENT_TASK_LOG.scope(self.clone(), future).await
    }

    pub fn push(&self, line: impl Into<String>) {
        if let Ok(mut lines) = self.lines.lock() {
            if lines.len() == MAX_TASK_LOG_LINES {
                lines.remove(0);
            }
            lines.push(line.into());
        }
    }

    /// 取走已收集的行
    pub fn take(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|mut lines| std::mem::take(&mut *lines))
            .unwrap_or_default()
    }
}

/// 追加到当前任务的日志。不在任务作用域内时忽略。
pub fn record(line: impl Into<String>) {
    let _ = CURRENT_TASK_LOG.try_with(|log| log.push(line));
}

/// 逐行追加一段输出，忽略空行
pub fn record_output(stream: &str, output: &[u8]) {
    let text = String::from_utf8_lossy(output);
    for line in text.lines().filter(|line| !line.trim().is_empty()) {
        record(format!("[{stream}] {line}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_reaches_enclosing_scope_only() {
        record("outside any task");

        let log = TaskLog::new();
        log.scope(async {
            record("first");
            record_output("stdout", b"a\n\n  \nb\n");
        })
        .await;
        record("after scope");

        assert_eq!(log.take(), vec!["first", "[stdout] a", "[stdout] b"]);
        assert!(log.take().is_empty());
    }

    #[tokio::test]
    async fn test_scopes_are_isolated_between_tasks() {
        let first = TaskLog::new();
        let second = TaskLog::new();
        let a = {
            let log = first.clone();
            tokio::spawn(async move { log.scope(async { record("one") }).await })
        };
        let b = {
            let log = second.clone();
            tokio::spawn(async move { log.scope(async { record("two") }).await })
        };
        a.await.unwrap();
        b.await.unwrap();

        assert_eq!(first.take(), vec!["one"]);
        assert_eq!(second.take(), vec!["two"]);
    }

    #[test]
    fn test_log_keeps_latest_lines() {
        let log = TaskLog::new();
        for i in 0..MAX_TASK_LOG_LINES + 5 {
            log.push(format!("line {i}"));
        }
        let lines = log.take();
        assert_eq!(lines.len(), MAX_TASK_LOG_LINES);
        assert_eq!(lines[0], "line 5");
    }
}

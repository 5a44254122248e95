//! Integration tests for restarting file based steps
//!
//! A step over line files is stopped after its first chunk and run again with
//! the same checkpoint directory. The output must contain every line exactly
//! once, in input order.

use chunkwise::adapters::file::{LineItemReader, LineItemWriter};
use chunkwise::adapters::processors::FnProcessor;
use chunkwise::adapters::progress::FileProgressStore;
use chunkwise::core::listener::ChunkListener;
use chunkwise::core::policy::{LimitCheckingSkipPolicy, NeverRetryPolicy};
use chunkwise::core::step::{ChunkStep, StepBuilder};
use chunkwise::domain::{BatchError, BatchStatus, ErrorKind, Result, StepContribution, StepName};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::watch;

struct StopAfterFirstCommit(watch::Sender<bool>);

impl ChunkListener for StopAfterFirstCommit {
    fn after_chunk(&self, _contribution: &StepContribution) -> Result<()> {
        let _ = self.0.send(true);
        Ok(())
    }
}

fn shout_step(dir: &Path, shutdown: Option<watch::Sender<bool>>) -> ChunkStep<String, String> {
    let (tx, rx) = watch::channel(false);
    let mut builder = StepBuilder::new(StepName::new("shout").unwrap())
        .chunk_size(3)
        .reader(LineItemReader::new(dir.join("in.txt")))
        .processor(FnProcessor::new(|line: &String| {
            if line == "l5" {
                Err(BatchError::Process(format!("cannot shout {line}")))
            } else {
                Ok(Some(line.to_uppercase()))
            }
        }))
        .writer(LineItemWriter::new(dir.join("out.txt")))
        .fault_tolerant()
        .retry_policy(Arc::new(NeverRetryPolicy))
        .skip_policy(Arc::new(LimitCheckingSkipPolicy::new(5, [ErrorKind::Process])))
        .progress_store(Arc::new(FileProgressStore::new(dir.join("state"))))
        .shutdown_signal(rx);

    match shutdown {
        Some(sender) => builder = builder.chunk_listener(Arc::new(StopAfterFirstCommit(sender))),
        None => drop(tx),
    }
    builder.build().unwrap()
}

#[tokio::test]
async fn test_stopped_file_step_resumes_without_duplicates() {
    let dir = TempDir::new().unwrap();
    tokio::fs::write(dir.path().join("in.txt"), "l1\nl2\nl3\nl4\nl5\nl6\nl7\n")
        .await
        .unwrap();

    let (shutdown_tx, _keep) = watch::channel(false);
    let mut first = shout_step(dir.path(), Some(shutdown_tx));
    let execution = first.execute().await.unwrap();

    assert_eq!(execution.status, BatchStatus::Stopped);
    assert_eq!(execution.write_count, 3);
    let output = tokio::fs::read_to_string(dir.path().join("out.txt")).await.unwrap();
    assert_eq!(output, "L1\nL2\nL3\n");
    assert!(dir.path().join("state").join("shout.json").exists());

    let mut second = shout_step(dir.path(), None);
    let execution = second.execute().await.unwrap();

    assert_eq!(execution.status, BatchStatus::Completed);
    assert_eq!(execution.read_count, 4);
    assert_eq!(execution.write_count, 3);
    assert_eq!(execution.process_skip_count, 1);
    let output = tokio::fs::read_to_string(dir.path().join("out.txt")).await.unwrap();
    assert_eq!(output, "L1\nL2\nL3\nL4\nL6\nL7\n");
    assert!(!dir.path().join("state").join("shout.json").exists());
}

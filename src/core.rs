use std::sync::Arc;

use itertools::Itertools;
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::config::RunContext;
use crate::model::{ProbeOutcome, TestDefinition};

pub mod aggregator;
pub mod icmp_listener;
pub mod icmp_message;
pub mod icmp_publisher;
pub mod probe_worker;
pub mod worker_pool;

use icmp_listener::IcmpListener;
use icmp_message::IcmpVersion;
use icmp_publisher::{IcmpPublisher, PublisherHandle};
use probe_worker::{ProbeError, ProbeWorker};
pub use worker_pool::{WorkerPool, WorkerPoolError};

/// 実行結果の集計
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub attempted: usize,
    pub passed: usize,
}

impl RunSummary {
    pub fn all_passed(&self) -> bool {
        self.attempted == self.passed
    }
}

/// このホストで実行すべき全てのテストを実行し、結果をテスト定義に書き込む
pub(crate) async fn run(
    ctx: RunContext,
    definitions: &mut [TestDefinition],
) -> Result<RunSummary, WorkerPoolError> {
    let token = CancellationToken::new();
    let publisher = match ctx.privileged {
        true => Some(start_icmp_monitoring(token.clone())),
        false => None,
    };

    info!(
        "Attempting tests: [{}]",
        definitions
            .iter()
            .filter(|d| d.attempt)
            .map(|d| d.reference.as_str())
            .join(", ")
    );

    let pool = WorkerPool::new(ctx.max_streams);
    let worker = Arc::new(ProbeWorker::new(ctx, publisher));
    let mut handles = Vec::new();
    for (i, definition) in definitions.iter().enumerate() {
        if !definition.attempt {
            continue;
        }
        debug!("Running test {definition}");
        for (j, sub_test) in definition.sub_tests.iter().enumerate() {
            let permit = pool.acquire().await?;
            let worker = worker.clone();
            let sub_test = sub_test.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                worker.run(sub_test).await
            });
            handles.push((i, j, handle));
        }
    }

    debug!(
        "Waiting for {} probes to complete ({} slots free)",
        handles.len(),
        pool.available()
    );
    let _all = pool.drain().await?;
    debug!("All probes complete");

    for (i, j, handle) in handles {
        match handle.await {
            Ok(sub_test) => definitions[i].sub_tests[j] = sub_test,
            Err(e) => {
                let remote = &definitions[i].sub_tests[j].remote_addr;
                warn!("Probe for {remote} aborted: {e}");
                definitions[i].sub_tests[j].outcome =
                    Some(ProbeOutcome::Failed(ProbeError::Aborted(e.to_string())));
            }
        }
    }

    let mut summary = RunSummary::default();
    for definition in definitions.iter_mut().filter(|d| d.attempt) {
        let verdict = aggregator::aggregate(&definition.sub_tests);
        summary.attempted += 1;
        if verdict.passed {
            summary.passed += 1;
        }
        definition.verdict = Some(verdict);
    }

    token.cancel();
    Ok(summary)
}

/// ICMP PublisherとIPv4/IPv6のリスナーを起動する
///
/// リスナーが起動できなくてもテストは続行する
fn start_icmp_monitoring(token: CancellationToken) -> PublisherHandle {
    let (publisher, handle, ingest_tx) = IcmpPublisher::new(token.clone());
    tokio::spawn(publisher.run());

    for version in [IcmpVersion::V4, IcmpVersion::V6] {
        match IcmpListener::new(token.clone(), version, ingest_tx.clone()) {
            Ok(listener) => {
                tokio::spawn(async move {
                    if let Err(e) = listener.run().await {
                        warn!("Error has occurred in ICMP listener: {e}");
                    }
                });
            }
            Err(e) => warn!("{e}"),
        }
    }

    handle
}

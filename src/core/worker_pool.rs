use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Error)]
pub enum WorkerPoolError {
    #[error("Worker pool has been closed")]
    Closed(#[from] AcquireError),
}

/// 同時に実行するプローブの数を制限するセマフォ
///
/// 各プローブは開始前に1つ許可を取得し、終了時に許可を返す。
/// 許可は[`OwnedSemaphorePermit`]としてタスクに移動するため、
/// どの経路で終了しても必ず返却される。
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    max_streams: u32,
}

impl WorkerPool {
    pub fn new(max_streams: u32) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_streams as usize)),
            max_streams,
        }
    }

    /// 空きが出るまで待ち、1つ許可を取得する
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, WorkerPoolError> {
        Ok(self.semaphore.clone().acquire_owned().await?)
    }

    /// 全ての許可を取得する
    ///
    /// 実行中のプローブが全て許可を返すまで戻らないため、完了待ちの障壁として使う
    pub async fn drain(&self) -> Result<OwnedSemaphorePermit, WorkerPoolError> {
        Ok(self
            .semaphore
            .clone()
            .acquire_many_owned(self.max_streams)
            .await?)
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

//! services/dispatch_pool.rs
//! Pool acotado de envíos: una cola `mpsc` con capacidad fija y un semáforo
//! que limita cuántos envíos corren a la vez. Si la cola está llena se rechaza.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    Semaphore,
};

use crate::error::DispatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchJob {
    pub email_id: i64,
    pub fail_silently: bool,
}

/// Ejecuta un envío ya persistido.
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn run(&self, job: DispatchJob);
}

#[derive(Debug, Clone)]
pub struct DispatchPool {
    sender: mpsc::Sender<DispatchJob>,
}

impl DispatchPool {
    /// Lanza el loop del pool en una tarea de tokio y devuelve el handle para encolar.
    pub fn start<R: JobRunner>(runner: Arc<R>, workers: usize, capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<DispatchJob>(capacity.max(1));
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));

        tokio::spawn(async move {
            loop {
                // Con todos los workers ocupados no se saca nada de la cola,
                // así la capacidad del canal es el límite real de pendientes.
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let Some(job) = receiver.recv().await else {
                    break;
                };

                let runner = runner.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    runner.run(job).await;
                });
            }
            log::info!("Dispatch pool stopped");
        });

        log::info!(
            "Dispatch pool running (workers={}, queue_capacity={})",
            workers.max(1),
            capacity.max(1)
        );

        DispatchPool { sender }
    }

    /// Encola sin esperar. `QueueFull` si no hay lugar.
    pub fn submit(&self, job: DispatchJob) -> Result<(), DispatchError> {
        self.sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(job) => DispatchError::QueueFull {
                email_id: job.email_id,
            },
            TrySendError::Closed(_) => DispatchError::PoolClosed,
        })
    }
}

//! Local Trigger - 进程内自触发

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::application::ports::{SelfTriggerPort, TriggerError, TriggerRequest};

/// 一次工作者调用请求（None 表示任意项目）
pub type Tick = Option<Uuid>;

/// 创建触发通道
pub fn local_trigger_channel(capacity: usize) -> (LocalTrigger, mpsc::Receiver<Tick>) {
    let (sender, receiver) = mpsc::channel(capacity);
    (LocalTrigger { sender }, receiver)
}

/// Local Trigger
#[derive(Clone)]
pub struct LocalTrigger {
    sender: mpsc::Sender<Tick>,
}

impl SelfTriggerPort for LocalTrigger {
    fn fire(&self, request: TriggerRequest) -> Result<(), TriggerError> {
        if self.sender.is_closed() {
            return Err(TriggerError::Closed);
        }

        match request.delay {
            None => self.sender.try_send(request.project_id).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => TriggerError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => TriggerError::Closed,
            }),
            Some(delay) => {
                let runtime = tokio::runtime::Handle::try_current()
                    .map_err(|e| TriggerError::Failed(e.to_string()))?;
                let sender = self.sender.clone();
                runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(e) = sender.try_send(request.project_id) {
                        tracing::debug!(error = %e, "Delayed tick dropped");
                    }
                });
                Ok(())
            }
        }
    }
}

//! Log Notifier - 未配置 webhook 时只写日志

use async_trait::async_trait;

use crate::application::ports::{NotifierPort, NotifyError, ProjectCompletedNotice};

#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotifierPort for LogNotifier {
    async fn notify_completed(&self, notice: &ProjectCompletedNotice) -> Result<(), NotifyError> {
        tracing::info!(
            project_id = %notice.project_id,
            title = %notice.title,
            word_count = notice.word_count,
            completed_scenes = notice.completed_scenes,
            failed_scenes = notice.failed_scenes,
            "Project completed"
        );
        Ok(())
    }
}

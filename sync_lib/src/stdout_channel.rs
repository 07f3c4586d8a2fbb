use stack_string::StackString;
use std::sync::Arc;
use tokio::{
    io::{stdout, AsyncWriteExt},
    sync::{
        mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
        Mutex,
    },
    task::{spawn, JoinHandle},
};

use crate::errors::SyncError as Error;

/// Lines for the user go through here; logging goes through `log`.
#[derive(Clone, Debug)]
pub struct StdoutChannel {
    receiver: Arc<Mutex<UnboundedReceiver<Option<StackString>>>>,
    sender: Arc<UnboundedSender<Option<StackString>>>,
    mock_stdout: Option<Arc<Mutex<Vec<StackString>>>>,
}

impl Default for StdoutChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl StdoutChannel {
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = unbounded_channel();
        let receiver = Arc::new(Mutex::new(receiver));
        let sender = Arc::new(sender);
        Self {
            receiver,
            sender,
            mock_stdout: None,
        }
    }

    /// Collect lines in memory instead of writing them to stdout.
    #[must_use]
    pub fn with_mock_stdout() -> Self {
        Self {
            mock_stdout: Some(Arc::new(Mutex::new(Vec::new()))),
            ..Self::new()
        }
    }

    pub fn send(&self, item: impl Into<StackString>) {
        // the receiver lives as long as self, so this can't fail
        self.sender.send(Some(item.into())).ok();
    }

    async fn recv(&self) -> Option<Option<StackString>> {
        self.receiver.lock().await.recv().await
    }

    /// # Errors
    /// Return error if the stdout task has already gone away
    pub async fn close(&self) -> Result<(), Error> {
        self.sender
            .send(None)
            .map_err(|_| Error::StaticCustomError("stdout channel closed"))
    }

    async fn stdout_task(&self) -> Result<(), Error> {
        while let Some(Some(line)) = self.recv().await {
            if let Some(mock_stdout) = &self.mock_stdout {
                mock_stdout.lock().await.push(line);
            } else {
                stdout()
                    .write_all(&[line.as_bytes(), b"\n"].concat())
                    .await?;
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn spawn_stdout_task(&self) -> JoinHandle<Result<(), Error>> {
        let stdout = self.clone();
        spawn(async move { stdout.stdout_task().await })
    }

    /// Lines captured so far by a channel built with `with_mock_stdout`.
    pub async fn mock_lines(&self) -> Vec<StackString> {
        match &self.mock_stdout {
            Some(mock_stdout) => mock_stdout.lock().await.clone(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{errors::SyncError as Error, stdout_channel::StdoutChannel};

    #[tokio::test]
    async fn test_mock_stdout() -> Result<(), Error> {
        let stdout = StdoutChannel::with_mock_stdout();
        let task = stdout.spawn_stdout_task();
        stdout.send("first");
        stdout.send(String::from("second"));
        stdout.close().await?;
        task.await??;
        let lines = stdout.mock_lines().await;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].as_str(), "second");
        Ok(())
    }
}

/*!
 # Render worker

 The printer is a single serial line that cannot take two receipts at once.
 One task owns it and executes render jobs strictly one after another; the
 scheduler and the button controller only hold a [`RenderHandle`] and queue
 jobs through it.
*/

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use crate::printer::{Printer, PrinterCommand, PrinterTransport};
use crate::{Error, Result};

/// A complete receipt to print, executed without interleaving
#[derive(Debug)]
pub struct RenderJob {
    /// Short description for logs, e.g. `auto #12`
    pub label: String,
    pub commands: Vec<PrinterCommand>,
    reply: oneshot::Sender<Result<()>>,
}

/// Cloneable handle for queueing render jobs
#[derive(Debug, Clone)]
pub struct RenderHandle {
    tx: mpsc::Sender<RenderJob>,
    rendered: Arc<AtomicUsize>,
}

impl RenderHandle {
    /// Queues a job and waits until the printer has finished it
    #[instrument(skip(self, commands), fields(commands = commands.len()))]
    pub async fn render(&self, label: &str, commands: Vec<PrinterCommand>) -> Result<()> {
        let (reply, done) = oneshot::channel();
        let job = RenderJob {
            label: label.to_string(),
            commands,
            reply,
        };

        self.tx
            .send(job)
            .await
            .map_err(|_| Error::RenderWorkerClosed)?;
        done.await.map_err(|_| Error::RenderWorkerClosed)?
    }

    /// Number of jobs the worker has finished successfully
    pub fn rendered(&self) -> usize {
        self.rendered.load(Ordering::SeqCst)
    }
}

/// Task owning the printer
pub struct RenderWorker<T> {
    printer: Printer<T>,
    rx: mpsc::Receiver<RenderJob>,
    rendered: Arc<AtomicUsize>,
}

impl<T: PrinterTransport + 'static> RenderWorker<T> {
    /// Spawns the worker on the current runtime.
    ///
    /// The worker runs until every [`RenderHandle`] is dropped, finishes the
    /// jobs still queued, then hands the printer back through the join handle.
    pub fn spawn(printer: Printer<T>, capacity: usize) -> (RenderHandle, JoinHandle<Printer<T>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rendered = Arc::new(AtomicUsize::new(0));
        let worker = RenderWorker {
            printer,
            rx,
            rendered: Arc::clone(&rendered),
        };
        let handle = RenderHandle { tx, rendered };
        (handle, tokio::spawn(worker.run()))
    }

    async fn run(mut self) -> Printer<T> {
        debug!("Render worker started");
        while let Some(job) = self.rx.recv().await {
            let result = self.execute(&job.label, &job.commands).await;
            match &result {
                Ok(()) => {
                    self.rendered.fetch_add(1, Ordering::SeqCst);
                    info!("Printed {}", job.label);
                }
                Err(e) => error!("Printing {} failed: {}", job.label, e),
            }
            // The submitter may have stopped waiting; the print still happened
            let _ = job.reply.send(result);
        }
        debug!("Render worker drained, shutting down");
        self.printer
    }

    async fn execute(&mut self, label: &str, commands: &[PrinterCommand]) -> Result<()> {
        debug!("Rendering {} ({} commands)", label, commands.len());
        for command in commands {
            self.printer.apply(command).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printer::{RecordingTransport, TransportWrite};

    fn text(s: &str) -> PrinterCommand {
        PrinterCommand::Text(s.to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn test_jobs_do_not_interleave() {
        let transport = RecordingTransport::new();
        let (handle, worker) = RenderWorker::spawn(Printer::new(transport.clone()), 4);

        let a = handle.clone();
        let b = handle.clone();
        let first = tokio::spawn(async move {
            a.render("a", vec![text("a1"), PrinterCommand::Feed(3), text("a2")])
                .await
        });
        let second = tokio::spawn(async move {
            b.render("b", vec![text("b1"), PrinterCommand::Feed(3), text("b2")])
                .await
        });
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        assert_eq!(handle.rendered(), 2);

        let text = transport.text();
        assert!(text == "a1a2b1b2" || text == "b1b2a1a2", "interleaved: {text}");

        drop(handle);
        worker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_jobs_finish_before_shutdown() {
        let transport = RecordingTransport::new();
        let (handle, worker) = RenderWorker::spawn(Printer::new(transport.clone()), 4);

        let pending: Vec<_> = (0..3)
            .map(|i| {
                let h = handle.clone();
                tokio::spawn(async move {
                    h.render(&format!("job {i}"), vec![PrinterCommand::Feed(1)])
                        .await
                })
            })
            .collect();
        drop(handle);

        let printer = worker.await.unwrap();
        for p in pending {
            p.await.unwrap().unwrap();
        }
        assert_eq!(printer.transport().writes().len(), 3);
        assert!(transport
            .writes()
            .iter()
            .all(|w| *w == TransportWrite::Command(vec![0x1b, b'd', 1])));
    }

    #[tokio::test]
    async fn test_transport_failure_is_reported() {
        let transport = RecordingTransport::new();
        transport.set_failing(true);
        let (handle, _worker) = RenderWorker::spawn(Printer::new(transport), 1);

        let err = handle.render("fail", vec![text("x")]).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(handle.rendered(), 0);
    }
}

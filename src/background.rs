//! Named background threads that can be asked to stop and awaited with a deadline.
use std::{
    cell::Cell,
    sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, TryRecvError},
    thread::JoinHandle,
    time::Duration,
};

use crate::{Error, Result};

pub(crate) struct BackgroundThread {
    name: &'static str,
    join_handle: JoinHandle<()>,

    /// Used to send a stop command to the thread.
    stop_sender: SyncSender<()>,

    /// Never receives a value. Disconnects once the thread body returns (or unwinds), which lets
    /// us wait for the thread with a timeout.
    exited: Receiver<()>,
}

/// Stop command receiver handed to the thread body.
pub(crate) struct StopSignal {
    receiver: Receiver<()>,
    stopped: Cell<bool>,
}

impl StopSignal {
    /// Block up to `timeout` waiting for a stop command. Returns `true` if the thread should stop.
    pub fn wait(&self, timeout: Duration) -> bool {
        if self.stopped.get() {
            return true;
        }
        match self.receiver.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => false,
            // Disconnected means the owning handle is gone, nobody can stop us anymore.
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                self.stopped.set(true);
                true
            }
        }
    }

    /// Non-blocking check for a stop command.
    pub fn is_stopped(&self) -> bool {
        if self.stopped.get() {
            return true;
        }
        match self.receiver.try_recv() {
            Err(TryRecvError::Empty) => false,
            Ok(()) | Err(TryRecvError::Disconnected) => {
                self.stopped.set(true);
                true
            }
        }
    }
}

impl BackgroundThread {
    pub fn spawn(
        name: &'static str,
        body: impl FnOnce(StopSignal) + Send + 'static,
    ) -> std::io::Result<BackgroundThread> {
        // Using `sync_channel` here as it makes `stop_sender` `Sync`. Buffer size of 1 is enough:
        // if the buffer is full, another thread has sent a stop command already.
        let (stop_sender, stop_receiver) = std::sync::mpsc::sync_channel::<()>(1);
        let (exit_sender, exited) = std::sync::mpsc::sync_channel::<()>(0);

        let join_handle = std::thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                let _exit_sender = exit_sender;
                body(StopSignal {
                    receiver: stop_receiver,
                    stopped: Cell::new(false),
                });
            })?;

        Ok(BackgroundThread {
            name,
            join_handle,
            stop_sender,
            exited,
        })
    }

    /// Ask the thread to stop without waiting for it.
    pub fn stop(&self) {
        // Error means that the receiver was dropped (thread exited) or the buffer is full (stop
        // already requested). Either way there's nothing to do.
        let _ = self.stop_sender.try_send(());
    }

    /// Stop the thread and wait up to `timeout` for it to exit. A thread that does not exit in
    /// time is detached.
    pub fn shutdown(self, timeout: Duration) -> Result<()> {
        self.stop();

        match self.exited.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(target: "molasses", thread = self.name; "background thread did not stop in time, detaching");
                Err(Error::ShutdownTimedOut)
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => self
                .join_handle
                .join()
                .map_err(|_| Error::BackgroundThreadPanicked),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        time::{Duration, Instant},
    };

    use super::BackgroundThread;
    use crate::Error;

    #[test]
    fn stop_interrupts_wait() {
        let thread = BackgroundThread::spawn("test-wait", |stop| {
            while !stop.wait(Duration::from_secs(60)) {}
        })
        .unwrap();

        let start = Instant::now();
        thread.shutdown(Duration::from_secs(5)).unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn stop_is_idempotent() {
        let thread = BackgroundThread::spawn("test-idempotent", |stop| {
            while !stop.wait(Duration::from_secs(60)) {}
        })
        .unwrap();

        thread.stop();
        thread.stop();
        thread.stop();
        thread.shutdown(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn is_stopped_latches() {
        let observed = Arc::new(AtomicBool::new(false));
        let thread = {
            let observed = observed.clone();
            BackgroundThread::spawn("test-latch", move |stop| {
                while !stop.is_stopped() {
                    std::thread::sleep(Duration::from_millis(5));
                }
                observed.store(stop.is_stopped() && stop.wait(Duration::ZERO), Ordering::SeqCst);
            })
            .unwrap()
        };

        thread.shutdown(Duration::from_secs(5)).unwrap();
        assert!(observed.load(Ordering::SeqCst));
    }

    #[test]
    fn shutdown_times_out_for_stuck_thread() {
        let thread = BackgroundThread::spawn("test-stuck", |_stop| {
            std::thread::sleep(Duration::from_millis(500));
        })
        .unwrap();

        let start = Instant::now();
        let result = thread.shutdown(Duration::from_millis(50));
        assert!(matches!(result, Err(Error::ShutdownTimedOut)));
        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn reports_panicked_thread() {
        let thread = BackgroundThread::spawn("test-panic", |_stop| panic!("boom")).unwrap();
        let result = thread.shutdown(Duration::from_secs(5));
        assert!(matches!(result, Err(Error::BackgroundThreadPanicked)));
    }
}

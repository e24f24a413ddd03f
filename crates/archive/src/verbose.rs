//! The verbose printer thread.
//!
//! A bounded queue decouples engine throughput from terminal latency: the
//! engine pushes each archive path as it is processed and blocks when the
//! printer falls 1000 entries behind. Closing the sending side is the
//! completion signal; the consumer drains what is queued and exits, and the
//! guard joins it on every exit path so no run can leak the thread.

use std::io::{self, Write};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, bounded};

const QUEUE_CAPACITY: usize = 1000;

/// Handle to the printer thread.
pub struct VerbosePrinter {
    sender: Option<Sender<String>>,
    consumer: Option<JoinHandle<()>>,
}

impl VerbosePrinter {
    /// Spawns a printer writing one path per line to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::with_writer(io::stderr())
    }

    /// Spawns a printer writing one path per line to `writer`.
    pub fn with_writer<W: Write + Send + 'static>(mut writer: W) -> Self {
        let (sender, receiver) = bounded::<String>(QUEUE_CAPACITY);
        let consumer = thread::spawn(move || {
            // Drains until every sender is gone, then flushes once.
            for path in receiver {
                let _ = writeln!(writer, "{path}");
            }
            let _ = writer.flush();
        });
        Self {
            sender: Some(sender),
            consumer: Some(consumer),
        }
    }

    /// Queues one archive path, blocking while the queue is full.
    pub fn emit(&self, pack_path: &str) -> io::Result<()> {
        let sender = self
            .sender
            .as_ref()
            .expect("emit called after finish");
        sender.send(pack_path.to_owned()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::BrokenPipe,
                "verbose printer thread exited early",
            )
        })
    }

    /// Signals completion and joins the printer.
    pub fn finish(mut self) -> io::Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> io::Result<()> {
        drop(self.sender.take());
        if let Some(consumer) = self.consumer.take() {
            consumer
                .join()
                .map_err(|_| io::Error::other("verbose printer thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for VerbosePrinter {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("buffer poisoned").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn every_emitted_path_is_printed_in_order() {
        let buf = SharedBuf::default();
        let printer = VerbosePrinter::with_writer(buf.clone());
        for i in 0..2500 {
            printer.emit(&format!("/tree/file{i}")).expect("emit");
        }
        printer.finish().expect("finish");

        let output = buf.0.lock().expect("buffer poisoned");
        let lines: Vec<&str> = std::str::from_utf8(&output)
            .expect("utf8")
            .lines()
            .collect();
        assert_eq!(lines.len(), 2500);
        assert_eq!(lines[0], "/tree/file0");
        assert_eq!(lines[2499], "/tree/file2499");
    }

    #[test]
    fn drop_joins_the_consumer() {
        let buf = SharedBuf::default();
        {
            let printer = VerbosePrinter::with_writer(buf.clone());
            printer.emit("/one").expect("emit");
        }
        let output = buf.0.lock().expect("buffer poisoned");
        assert_eq!(std::str::from_utf8(&output).expect("utf8"), "/one\n");
    }
}

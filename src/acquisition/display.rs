// src/acquisition/display.rs
//! Periodic hand-off of live buffer contents to a renderer

use crate::acquisition::live_buffer::{DisplayFrame, LiveBuffer};
use crossbeam::channel::{self, select, tick, Sender};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Draws one frame. Runs on the refresher thread.
pub trait Renderer: Send {
    fn render(&mut self, frame: &DisplayFrame);
}

impl<F> Renderer for F
where
    F: FnMut(&DisplayFrame) + Send,
{
    fn render(&mut self, frame: &DisplayFrame) {
        self(frame)
    }
}

/// Timer thread that snapshots the buffer every interval
pub struct DisplayRefresher {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<u64>>,
}

impl DisplayRefresher {
    pub fn spawn<R>(buffer: Arc<LiveBuffer>, interval: Duration, mut renderer: R) -> io::Result<Self>
    where
        R: Renderer + 'static,
    {
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(1);
        let ticker = tick(interval.max(Duration::from_millis(1)));

        let handle = thread::Builder::new()
            .name("quickdeck-display".to_string())
            .spawn(move || {
                let mut rendered = 0u64;
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            let frame = buffer.frame();
                            renderer.render(&frame);
                            rendered += 1;
                        }
                        recv(shutdown_rx) -> _ => break,
                    }
                }
                debug!(rendered, "Display refresher stopped");
                rendered
            })?;

        Ok(Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Stop the timer and return how many frames were rendered
    pub fn stop(mut self) -> u64 {
        self.shutdown_and_join()
    }

    fn shutdown_and_join(&mut self) -> u64 {
        // Dropping the sender wakes the select with a disconnect
        self.shutdown.take();
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(rendered)) => rendered,
            Some(Err(_)) => {
                warn!("Display refresher panicked");
                0
            }
            None => 0,
        }
    }
}

impl Drop for DisplayRefresher {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

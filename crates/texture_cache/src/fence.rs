//! GPU completion fences.
//!
//! A fence marks a point in the queue's command stream and answers, without
//! ever blocking, whether the GPU has reached it. The update throttle uses
//! unsignaled fences as a saturation signal and reacts by growing the
//! transfer-buffer pool instead of waiting.

use std::cell::Cell;
use std::sync::mpsc;

#[derive(Debug)]
pub struct CompletionFence {
    receiver: mpsc::Receiver<()>,
    signaled: Cell<bool>,
}

impl CompletionFence {
    /// Records a fence covering all work submitted to `queue` so far.
    pub fn record(queue: &wgpu::Queue) -> Self {
        let (sender, receiver) = mpsc::channel();
        queue.on_submitted_work_done(move || {
            let _ = sender.send(());
        });
        Self {
            receiver,
            signaled: Cell::new(false),
        }
    }

    /// Non-blocking completion query. Once signaled, stays signaled.
    pub fn is_signaled(&self, device: &wgpu::Device) -> bool {
        if self.signaled.get() {
            return true;
        }
        // Drive callback delivery without waiting for the GPU.
        let _ = device.poll(wgpu::PollType::Poll);
        if self.receiver.try_recv().is_ok() {
            self.signaled.set(true);
        }
        self.signaled.get()
    }
}

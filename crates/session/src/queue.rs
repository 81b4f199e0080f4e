// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! A bounded queue of inbound audio frames that drops the oldest entry on
//! overflow rather than applying backpressure to the WebSocket read loop -
//! a stalled `StreamingAsr` call should never stall the socket.

use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

use crate::protocol::AudioFrame;

pub struct AudioQueue {
    capacity: usize,
    inner: Mutex<VecDeque<AudioFrame>>,
    notify: Notify,
    closed: Mutex<bool>,
}

impl AudioQueue {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            closed: Mutex::new(false),
        }
    }

    /// Pushes a frame, dropping the oldest queued frame if at capacity.
    /// Returns `true` if a frame was dropped.
    pub fn push(&self, frame: AudioFrame) -> bool {
        let mut dropped = false;
        {
            let mut guard = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if guard.len() >= self.capacity {
                guard.pop_front();
                dropped = true;
            }
            guard.push_back(frame);
        }
        self.notify.notify_one();
        dropped
    }

    /// Waits for and pops the oldest queued frame, or returns `None` once
    /// [`AudioQueue::close`] has been called and the queue has drained.
    pub async fn recv(&self) -> Option<AudioFrame> {
        loop {
            {
                let mut guard = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                if let Some(frame) = guard.pop_front() {
                    return Some(frame);
                }
                if *self.closed.lock().unwrap_or_else(std::sync::PoisonError::into_inner) {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    pub fn close(&self) {
        *self.closed.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = true;
        self.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(sec: f64) -> AudioFrame {
        AudioFrame { audio_start_sec: sec, samples: vec![0; 4] }
    }

    #[tokio::test]
    async fn push_beyond_capacity_drops_oldest() {
        let queue = AudioQueue::new(2);
        assert!(!queue.push(frame(0.0)));
        assert!(!queue.push(frame(1.0)));
        assert!(queue.push(frame(2.0)));
        assert_eq!(queue.recv().await.unwrap().audio_start_sec, 1.0);
        assert_eq!(queue.recv().await.unwrap().audio_start_sec, 2.0);
    }

    #[tokio::test]
    async fn recv_returns_none_after_close_once_drained() {
        let queue = AudioQueue::new(2);
        queue.push(frame(0.0));
        queue.close();
        assert_eq!(queue.recv().await.unwrap().audio_start_sec, 0.0);
        assert!(queue.recv().await.is_none());
    }
}

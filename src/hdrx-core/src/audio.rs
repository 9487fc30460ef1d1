// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Recycling pool of PCM buffers between the decoder and a playback thread.
//!
//! All buffers are allocated up front. The producer never blocks: when no
//! buffer is free the audio is dropped and counted as an overrun. The consumer
//! waits until a low-water mark of pending buffers has built up before it
//! starts draining, which absorbs decoder jitter.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::error::{AcqError, AcqResult};

pub const AUDIO_BUFFERS: usize = 128;
/// Interleaved i16 samples per buffer (8192 bytes).
pub const AUDIO_BUFFER_SAMPLES: usize = 4096;
pub const AUDIO_LOW_WATER: usize = 8;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(0);

/// Platform audio output.
pub trait AudioSink {
    fn play(&mut self, samples: &[i16]) -> io::Result<()>;
}

/// A buffer checked out of the pool.
#[derive(Debug)]
pub struct AudioBuffer {
    pool: u64,
    slot: usize,
    data: Box<[i16]>,
    len: usize,
}

impl AudioBuffer {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.data.len()
    }

    pub fn samples(&self) -> &[i16] {
        &self.data[..self.len]
    }

    /// Append as much of `src` as fits, returning the number of samples taken.
    pub fn fill_from(&mut self, src: &[i16]) -> usize {
        let n = src.len().min(self.data.len() - self.len);
        self.data[self.len..self.len + n].copy_from_slice(&src[..n]);
        self.len += n;
        n
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

/// Counters describing the pool. `free + pending + held == total` always.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub total: usize,
    pub free: usize,
    pub pending: usize,
    pub held: usize,
    pub overruns: u64,
}

struct Slot {
    data: Box<[i16]>,
    len: usize,
}

struct PoolState {
    /// `Some` while the buffer sits in `free` or `pending`.
    slots: Vec<Option<Slot>>,
    free: VecDeque<usize>,
    pending: VecDeque<usize>,
    held: usize,
    done: bool,
    overruns: u64,
}

pub struct AudioPool {
    id: u64,
    state: Mutex<PoolState>,
    cond: Condvar,
    buffer_len: usize,
    low_water: usize,
}

impl AudioPool {
    /// `count` buffers of `buffer_len` samples; the consumer starts once
    /// `low_water` of them are pending, so it must lie in `1..=count`.
    pub fn new(count: usize, buffer_len: usize, low_water: usize) -> AcqResult<Self> {
        if buffer_len == 0 {
            return Err(AcqError::rejected("audio buffers must not be empty"));
        }
        if low_water == 0 || low_water > count {
            return Err(AcqError::rejected(format!(
                "low-water mark {low_water} outside 1..={count}"
            )));
        }
        Ok(Self::build(count, buffer_len, low_water))
    }

    fn build(count: usize, buffer_len: usize, low_water: usize) -> Self {
        let slots = (0..count)
            .map(|_| {
                Some(Slot {
                    data: vec![0i16; buffer_len].into_boxed_slice(),
                    len: 0,
                })
            })
            .collect();
        Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(PoolState {
                slots,
                free: (0..count).collect(),
                pending: VecDeque::with_capacity(count),
                held: 0,
                done: false,
                overruns: 0,
            }),
            cond: Condvar::new(),
            buffer_len,
            low_water,
        }
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_out(&self, state: &mut PoolState, slot: usize) -> Option<AudioBuffer> {
        let Slot { data, len } = state.slots.get_mut(slot)?.take()?;
        state.held += 1;
        Some(AudioBuffer {
            pool: self.id,
            slot,
            data,
            len,
        })
    }

    fn check_in(&self, state: &mut PoolState, buffer: AudioBuffer) -> Option<usize> {
        let slot = buffer.slot;
        let entry = match state.slots.get_mut(slot) {
            Some(entry) if buffer.pool == self.id && entry.is_none() => entry,
            _ => {
                warn!("audio buffer {} does not belong to this pool", slot);
                return None;
            }
        };
        *entry = Some(Slot {
            data: buffer.data,
            len: buffer.len,
        });
        state.held -= 1;
        Some(slot)
    }

    /// Take a free buffer for filling. Never blocks.
    pub fn acquire(&self) -> Option<AudioBuffer> {
        let mut state = self.lock();
        match state.free.pop_front() {
            Some(slot) => {
                let mut buffer = self.check_out(&mut state, slot)?;
                buffer.clear();
                Some(buffer)
            }
            None => {
                state.overruns += 1;
                None
            }
        }
    }

    /// Queue a filled buffer for playback.
    pub fn submit(&self, buffer: AudioBuffer) {
        let mut state = self.lock();
        if let Some(slot) = self.check_in(&mut state, buffer) {
            state.pending.push_back(slot);
            self.cond.notify_all();
        }
    }

    /// Return a buffer to the free set without playing it.
    pub fn release(&self, buffer: AudioBuffer) {
        let mut state = self.lock();
        if let Some(slot) = self.check_in(&mut state, buffer) {
            state.free.push_back(slot);
            self.cond.notify_all();
        }
    }

    /// Next buffer to play, oldest first.
    ///
    /// Blocks while fewer than the low-water mark are pending and the pool is
    /// not finished. Returns `None` once finished and drained.
    pub fn next_for_playback(&self) -> Option<AudioBuffer> {
        let mut state = self.lock();
        while !state.done && state.pending.len() < self.low_water {
            state = self
                .cond
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        let slot = state.pending.pop_front()?;
        self.check_out(&mut state, slot)
    }

    /// Wake the consumer for good; pending buffers are still handed out.
    pub fn finish(&self) {
        self.lock().done = true;
        self.cond.notify_all();
    }

    /// Return all pending buffers to the free set, e.g. after a retune.
    pub fn reset(&self) {
        let mut state = self.lock();
        let dropped = state.pending.len();
        while let Some(slot) = state.pending.pop_front() {
            state.free.push_back(slot);
        }
        if dropped > 0 {
            debug!("audio pool reset, dropped {} buffers", dropped);
        }
        self.cond.notify_all();
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.lock();
        PoolStats {
            total: state.slots.len(),
            free: state.free.len(),
            pending: state.pending.len(),
            held: state.held,
            overruns: state.overruns,
        }
    }

    /// Play buffers until the pool is finished and drained.
    pub fn run_consumer(&self, sink: &mut dyn AudioSink) -> io::Result<()> {
        while let Some(buffer) = self.next_for_playback() {
            let result = sink.play(buffer.samples());
            self.release(buffer);
            result?;
        }
        debug!("audio consumer finished");
        Ok(())
    }
}

impl Default for AudioPool {
    fn default() -> Self {
        Self::build(AUDIO_BUFFERS, AUDIO_BUFFER_SAMPLES, AUDIO_LOW_WATER)
    }
}

/// Producer side helper turning arbitrarily sized PCM frames into full
/// buffers.
pub struct AudioFiller {
    pool: Arc<AudioPool>,
    current: Option<AudioBuffer>,
    dropped_samples: u64,
}

impl AudioFiller {
    pub fn new(pool: Arc<AudioPool>) -> Self {
        Self {
            pool,
            current: None,
            dropped_samples: 0,
        }
    }

    /// Samples thrown away because no buffer was free.
    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples
    }

    pub fn write(&mut self, mut pcm: &[i16]) {
        while !pcm.is_empty() {
            let mut buffer = match self.current.take() {
                Some(buffer) => buffer,
                None => match self.pool.acquire() {
                    Some(buffer) => buffer,
                    None => {
                        self.dropped_samples += pcm.len() as u64;
                        return;
                    }
                },
            };
            let taken = buffer.fill_from(pcm);
            pcm = &pcm[taken..];
            if buffer.is_full() {
                self.pool.submit(buffer);
            } else {
                self.current = Some(buffer);
            }
        }
    }

    /// Submit a partially filled buffer.
    pub fn flush(&mut self) {
        if let Some(buffer) = self.current.take() {
            if buffer.is_empty() {
                self.pool.release(buffer);
            } else {
                self.pool.submit(buffer);
            }
        }
    }

    /// Drop a partially filled buffer, e.g. on program change.
    pub fn discard(&mut self) {
        if let Some(buffer) = self.current.take() {
            self.pool.release(buffer);
        }
    }
}

impl Drop for AudioFiller {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn assert_conserved(pool: &AudioPool) {
        let stats = pool.stats();
        assert_eq!(stats.free + stats.pending + stats.held, stats.total);
    }

    struct CollectSink(Vec<i16>);

    impl AudioSink for CollectSink {
        fn play(&mut self, samples: &[i16]) -> io::Result<()> {
            self.0.extend_from_slice(samples);
            Ok(())
        }
    }

    #[test]
    fn buffers_are_conserved() {
        let pool = AudioPool::new(4, 8, 1).unwrap();
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_conserved(&pool);
        assert_eq!(pool.stats().held, 2);

        pool.submit(a);
        pool.release(b);
        assert_conserved(&pool);
        assert_eq!(pool.stats().pending, 1);

        let playing = pool.next_for_playback().unwrap();
        assert_eq!(pool.stats().held, 1);
        pool.release(playing);
        assert_eq!(pool.stats().free, 4);
        assert_conserved(&pool);
    }

    #[test]
    fn acquire_never_blocks_and_counts_overruns() {
        let pool = AudioPool::new(2, 8, 1).unwrap();
        let a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());
        assert!(pool.acquire().is_none());
        assert_eq!(pool.stats().overruns, 2);
        pool.release(a);
        assert!(pool.acquire().is_some());
    }

    #[test]
    fn consumer_waits_for_low_water_mark() {
        let pool = Arc::new(AudioPool::new(16, 4, 8).unwrap());
        let consumer_pool = pool.clone();
        let consumer = thread::spawn(move || consumer_pool.next_for_playback().map(|b| b.slot()));

        let mut first_slot = None;
        for i in 0..7 {
            let mut buf = pool.acquire().unwrap();
            first_slot.get_or_insert(buf.slot());
            buf.fill_from(&[i; 4]);
            pool.submit(buf);
        }
        thread::sleep(Duration::from_millis(30));
        assert!(!consumer.is_finished());
        assert_eq!(pool.stats().pending, 7);

        let buf = pool.acquire().unwrap();
        pool.submit(buf);
        assert_eq!(consumer.join().unwrap(), first_slot);
    }

    #[test]
    fn finish_releases_waiting_consumer() {
        let pool = Arc::new(AudioPool::new(8, 4, 8).unwrap());
        let mut buf = pool.acquire().unwrap();
        buf.fill_from(&[1, 2, 3, 4]);
        pool.submit(buf);

        let consumer_pool = pool.clone();
        let consumer = thread::spawn(move || {
            let mut sink = CollectSink(Vec::new());
            consumer_pool.run_consumer(&mut sink).unwrap();
            sink.0
        });
        thread::sleep(Duration::from_millis(20));
        pool.finish();
        assert_eq!(consumer.join().unwrap(), vec![1, 2, 3, 4]);
        assert!(pool.next_for_playback().is_none());
        assert_eq!(pool.stats().free, 8);
    }

    #[test]
    fn filler_splits_frames_into_buffers() {
        let pool = Arc::new(AudioPool::new(4, 4, 1).unwrap());
        let mut filler = AudioFiller::new(pool.clone());
        filler.write(&[1, 2, 3]);
        assert_eq!(pool.stats().pending, 0);
        filler.write(&[4, 5, 6, 7, 8, 9]);
        assert_eq!(pool.stats().pending, 2);
        filler.flush();
        assert_eq!(pool.stats().pending, 3);
        pool.finish();

        let mut sink = CollectSink(Vec::new());
        pool.run_consumer(&mut sink).unwrap();
        assert_eq!(sink.0, vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_conserved(&pool);
    }

    #[test]
    fn filler_drops_when_pool_exhausted() {
        let pool = Arc::new(AudioPool::new(1, 2, 1).unwrap());
        let mut filler = AudioFiller::new(pool.clone());
        filler.write(&[1, 2, 3, 4, 5]);
        assert_eq!(filler.dropped_samples(), 3);
        assert_eq!(pool.stats().pending, 1);
    }

    #[test]
    fn reset_returns_pending_to_free() {
        let pool = AudioPool::new(3, 2, 1).unwrap();
        for _ in 0..3 {
            let buf = pool.acquire().unwrap();
            pool.submit(buf);
        }
        pool.reset();
        let stats = pool.stats();
        assert_eq!((stats.free, stats.pending), (3, 0));
    }

    #[test]
    fn low_water_must_fit_the_pool() {
        assert!(matches!(AudioPool::new(4, 8, 0), Err(AcqError::Rejected(_))));
        assert!(matches!(AudioPool::new(4, 8, 5), Err(AcqError::Rejected(_))));
        assert!(matches!(AudioPool::new(4, 0, 1), Err(AcqError::Rejected(_))));
        assert!(AudioPool::new(4, 8, 4).is_ok());
        let pool = AudioPool::default();
        assert_eq!(pool.stats().total, AUDIO_BUFFERS);
        assert_eq!(pool.buffer_len(), AUDIO_BUFFER_SAMPLES);
    }

    #[test]
    fn buffer_from_same_slot_of_other_pool_is_ignored() {
        let a = AudioPool::new(2, 2, 1).unwrap();
        let b = AudioPool::new(2, 2, 1).unwrap();
        let ours = a.acquire().unwrap();
        let theirs = b.acquire().unwrap();
        assert_eq!(ours.slot(), theirs.slot());

        a.submit(theirs);
        let stats = a.stats();
        assert_eq!((stats.pending, stats.held), (0, 1));
        a.submit(ours);
        assert_eq!(a.stats().pending, 1);
        assert_eq!(b.stats().held, 1);
    }

    #[test]
    fn foreign_buffer_is_ignored() {
        let small = AudioPool::new(1, 2, 1).unwrap();
        let big = AudioPool::new(4, 2, 1).unwrap();
        let mut held = Vec::new();
        for _ in 0..4 {
            held.push(big.acquire().unwrap());
        }
        small.submit(held.pop().unwrap());
        assert_conserved(&small);
        assert_eq!(small.stats().pending, 0);
    }
}

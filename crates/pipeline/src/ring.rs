//! Per-partition ring buffer
//!
//! Parsing runs on a shared pool, so rows for one partition come back in
//! arbitrary order. The ring reassembles them: a fixed window of
//! `cap = 2 × batch_size` slots indexed by `offset & (cap - 1)`, emitting
//! offset-contiguous chunks once a dense prefix forms.
//!
//! Window markers (all offsets):
//! - `ground`  — smallest offset currently representable;
//! - `filled`  — next offset expected to be emitted;
//! - `ceiling` — one past the largest offset ever inserted.
//!
//! Invariants: `ground <= filled <= ceiling` and `ceiling - ground <= cap`.
//! `ground` advances together with `filled`, so the window slides as chunks
//! are emitted.

use parking_lot::Mutex;

use silt_model::MsgRow;

/// Timer ticks with no producer activity before a ring is declared idle.
const IDLE_TICKS: u32 = 2;

/// Admission test result for an incoming offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Offset fits the window.
    Admit,
    /// Offset is left of `filled`: already emitted, re-delivery.
    TooSmall { filled: i64 },
    /// Offset is right of the window: emission must advance first.
    TooLarge { ground: i64 },
}

/// Result of placing a row.
#[derive(Debug)]
pub enum PutOutcome {
    /// Row placed; zero or more full dense chunks became emittable.
    Stored(Vec<Vec<MsgRow>>),
    /// Dropped: offset already emitted.
    TooSmall,
    /// Rejected: window cannot represent the offset yet.
    TooLarge,
}

struct RingState {
    buf: Vec<Option<MsgRow>>,
    ground: i64,
    filled: i64,
    ceiling: i64,
    idle_cnt: u32,
    is_idle: bool,
    /// Producer activity since the last timer tick.
    touched: bool,
}

/// Offset-reordering window for a single partition.
pub struct Ring {
    partition: i32,
    cap: i64,
    batch_size: i64,
    state: Mutex<RingState>,
}

impl Ring {
    /// `batch_size` must be a power of two; the window holds twice that.
    pub fn new(partition: i32, batch_size: usize, first_offset: i64) -> Self {
        debug_assert!(batch_size.is_power_of_two());
        let cap = (batch_size as i64) * 2;
        Self {
            partition,
            cap,
            batch_size: batch_size as i64,
            state: Mutex::new(RingState {
                buf: (0..cap).map(|_| None).collect(),
                ground: first_offset,
                filled: first_offset,
                ceiling: first_offset,
                idle_cnt: 0,
                is_idle: false,
                touched: false,
            }),
        }
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// Current `(ground, filled, ceiling)` markers.
    pub fn window(&self) -> (i64, i64, i64) {
        let state = self.state.lock();
        (state.ground, state.filled, state.ceiling)
    }

    /// Producer-side admission test, run before parse submission.
    pub fn check(&self, offset: i64) -> Admission {
        let state = self.state.lock();
        if offset < state.filled {
            Admission::TooSmall {
                filled: state.filled,
            }
        } else if offset >= state.ground + self.cap {
            Admission::TooLarge {
                ground: state.ground,
            }
        } else {
            Admission::Admit
        }
    }

    /// Place a parsed row at its offset slot.
    ///
    /// Emits every full dense chunk that the insertion completes; partial
    /// prefixes wait for the flush timer.
    pub fn put(&self, msg_row: MsgRow) -> PutOutcome {
        let offset = msg_row.msg.offset;
        let mut state = self.state.lock();

        if offset < state.filled {
            return PutOutcome::TooSmall;
        }
        if offset >= state.ground + self.cap {
            return PutOutcome::TooLarge;
        }

        let slot = (offset & (self.cap - 1)) as usize;
        state.buf[slot] = Some(msg_row);
        state.ceiling = state.ceiling.max(offset + 1);
        state.touched = true;
        state.idle_cnt = 0;
        state.is_idle = false;

        PutOutcome::Stored(self.collect_chunks(&mut state, false))
    }

    /// Force-emit every dense chunk starting at `filled`, full or not.
    pub fn flush(&self) -> Vec<Vec<MsgRow>> {
        let mut state = self.state.lock();
        self.collect_chunks(&mut state, true)
    }

    /// Timer-driven flush with staleness accounting.
    ///
    /// Returns the emitted chunks and whether the ring has gone idle (no
    /// producer activity and nothing buffered for [`IDLE_TICKS`] consecutive
    /// ticks) and may be pruned.
    pub fn tick(&self) -> (Vec<Vec<MsgRow>>, bool) {
        let mut state = self.state.lock();
        let chunks = self.collect_chunks(&mut state, true);
        if chunks.is_empty() && state.ceiling == state.filled && !state.touched {
            state.idle_cnt += 1;
            if state.idle_cnt >= IDLE_TICKS {
                state.is_idle = true;
            }
        } else {
            state.idle_cnt = 0;
            state.is_idle = false;
        }
        state.touched = false;
        (chunks, state.is_idle)
    }

    /// Walk dense slots from `filled`, taking chunks of at most
    /// `batch_size`. Without `force`, only complete chunks are taken.
    fn collect_chunks(&self, state: &mut RingState, force: bool) -> Vec<Vec<MsgRow>> {
        let mut chunks = Vec::new();
        loop {
            let start = state.filled;
            let dense_end = (start..state.ceiling)
                .take(self.batch_size as usize)
                .take_while(|off| state.buf[(off & (self.cap - 1)) as usize].is_some())
                .last()
                .map(|off| off + 1)
                .unwrap_or(start);
            let len = dense_end - start;

            if len == 0 || (!force && len < self.batch_size) {
                break;
            }

            let mut chunk = Vec::with_capacity(len as usize);
            for off in start..dense_end {
                let slot = (off & (self.cap - 1)) as usize;
                // Slots in the dense prefix are occupied by construction.
                if let Some(msg_row) = state.buf[slot].take() {
                    chunk.push(msg_row);
                }
            }
            state.filled = dense_end;
            state.ground = state.filled;
            chunks.push(chunk);

            if !force && state.ceiling - state.filled < self.batch_size {
                break;
            }
        }
        chunks
    }
}

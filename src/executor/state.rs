// Copyright (c) 2025 taskpool contributors. Licensed under Apache License, Version 2.0.

//! The packed control word: lifecycle run-state and worker count in a single
//! `u32`, CAS-updated atomically so a transition of either field is always
//! consistent with the other.

use std::sync::atomic::{AtomicU32, Ordering};

/// Number of bits reserved for the worker count. Leaves 3 bits for the
/// run-state, enough for the five states below with headroom.
const COUNT_BITS: u32 = 29;
pub const CAPACITY: u32 = (1 << COUNT_BITS) - 1;

/// Lifecycle run-state. Transitions are monotonic: a state's numeric value
/// only ever increases, which is what lets [`ControlWord::advance_to`]
/// enforce "never moves backward" with a plain integer compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum RunState {
    Running = 0,
    Shutdown = 1,
    Stop = 2,
    Tidying = 3,
    Terminated = 4,
}

impl RunState {
    fn from_bits(bits: u32) -> Self {
        match bits {
            0 => RunState::Running,
            1 => RunState::Shutdown,
            2 => RunState::Stop,
            3 => RunState::Tidying,
            4 => RunState::Terminated,
            other => unreachable!("invalid run-state bits: {other}"),
        }
    }
}

fn pack(state: RunState, count: u32) -> u32 {
    debug_assert!(count <= CAPACITY);
    ((state as u32) << COUNT_BITS) | count
}

fn unpack(word: u32) -> (RunState, u32) {
    (RunState::from_bits(word >> COUNT_BITS), word & CAPACITY)
}

/// The executor's control word: `{ run_state, worker_count }` packed into a
/// single atomic `u32`, so every CAS updates both fields together.
pub struct ControlWord {
    word: AtomicU32,
}

impl ControlWord {
    pub fn new() -> Self {
        Self {
            word: AtomicU32::new(pack(RunState::Running, 0)),
        }
    }

    pub fn load(&self) -> (RunState, u32) {
        unpack(self.word.load(Ordering::SeqCst))
    }

    pub fn run_state(&self) -> RunState {
        self.load().0
    }

    pub fn worker_count(&self) -> u32 {
        self.load().1
    }

    /// Attempts `worker_count += 1`, failing if that would exceed `CAPACITY`
    /// or the run-state has moved past `limit` (inclusive).
    pub fn try_increment_worker_count(&self, limit: RunState) -> bool {
        loop {
            let current = self.word.load(Ordering::SeqCst);
            let (state, count) = unpack(current);
            if state > limit || count >= CAPACITY {
                return false;
            }
            let next = pack(state, count + 1);
            if self
                .word
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Decrements `worker_count` unconditionally (used when a worker exits).
    pub fn decrement_worker_count(&self) {
        loop {
            let current = self.word.load(Ordering::SeqCst);
            let (state, count) = unpack(current);
            debug_assert!(count > 0, "worker_count underflow");
            let next = pack(state, count.saturating_sub(1));
            if self
                .word
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return;
            }
        }
    }

    /// Advances the run-state to at least `target`; a no-op if the current
    /// state is already `>= target` (monotonicity).
    pub fn advance_to(&self, target: RunState) {
        loop {
            let current = self.word.load(Ordering::SeqCst);
            let (state, count) = unpack(current);
            if state >= target {
                return;
            }
            let next = pack(target, count);
            if self
                .word
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return;
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.run_state() == RunState::Running
    }

    pub fn is_at_least(&self, target: RunState) -> bool {
        self.run_state() >= target
    }
}

impl Default for ControlWord {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_roundtrip() {
        let word = pack(RunState::Stop, 12);
        assert_eq!(unpack(word), (RunState::Stop, 12));
    }

    #[test]
    fn run_state_never_moves_backward() {
        let ctl = ControlWord::new();
        ctl.advance_to(RunState::Shutdown);
        ctl.advance_to(RunState::Running);
        assert_eq!(ctl.run_state(), RunState::Shutdown);
        ctl.advance_to(RunState::Terminated);
        assert_eq!(ctl.run_state(), RunState::Terminated);
    }

    #[test]
    fn worker_count_bounds() {
        let ctl = ControlWord::new();
        assert!(ctl.try_increment_worker_count(RunState::Running));
        assert_eq!(ctl.worker_count(), 1);
        ctl.decrement_worker_count();
        assert_eq!(ctl.worker_count(), 0);
    }
}

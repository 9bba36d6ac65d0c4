//! Loop-marker detection.
//!
//! Watches performance events for the loop-marker control change and, for
//! loop modes that replay the performance in place, schedules the seek back
//! to the marker once the final tick is reached.

use super::{EventDisposition, EventVisitor, TimedEvent, LOOP_MARKER_CONTROLLER};
use crate::render::LoopMode;

/// A seek waiting for the next event that precedes `launch_tick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSeek {
    pub target_tick: u32,
    pub launch_tick: u32,
}

/// Loop-marker state for one file's render.
#[derive(Debug, Clone)]
pub struct LoopSignalTracker {
    mode: LoopMode,
    controller: u8,
    loop_tick: Option<u32>,
    pending_seek: Option<PendingSeek>,
    has_hit_loop_point: bool,
}

impl LoopSignalTracker {
    pub fn new(mode: LoopMode) -> Self {
        Self::with_controller(mode, LOOP_MARKER_CONTROLLER)
    }

    pub fn with_controller(mode: LoopMode, controller: u8) -> Self {
        Self {
            mode,
            controller,
            loop_tick: None,
            pending_seek: None,
            has_hit_loop_point: false,
        }
    }

    pub fn has_hit_loop_point(&self) -> bool {
        self.has_hit_loop_point
    }

    /// Tick of the marker recorded for in-place looping.
    pub fn loop_tick(&self) -> Option<u32> {
        self.loop_tick
    }

    pub fn pending_seek(&self) -> Option<PendingSeek> {
        self.pending_seek
    }

    /// Arms a seek to `target_tick`, fired by the first event before `launch_tick`.
    ///
    /// Does nothing if a seek is already pending.
    pub fn arm_seek(&mut self, target_tick: u32, launch_tick: u32) {
        if self.pending_seek.is_none() {
            self.pending_seek = Some(PendingSeek {
                target_tick,
                launch_tick,
            });
        }
    }
}

impl EventVisitor for LoopSignalTracker {
    fn on_event(&mut self, event: &TimedEvent, total_ticks: u32) -> EventDisposition {
        if let Some(seek) = self.pending_seek {
            if event.tick < seek.launch_tick {
                self.pending_seek = None;
                return EventDisposition::Seek(seek.target_tick);
            }
        }

        let loops_in_place = self.mode == LoopMode::Double;

        if event.is_controller(self.controller) {
            if loops_in_place {
                self.loop_tick = Some(event.tick);
            } else {
                self.has_hit_loop_point = true;
            }
        }

        if loops_in_place && self.pending_seek.is_none() && event.tick == total_ticks {
            if let Some(loop_tick) = self.loop_tick {
                self.arm_seek(loop_tick, event.tick);
                self.has_hit_loop_point = true;
            }
        }

        EventDisposition::Forward
    }
}

//! Sample-clocked sequence player.
//!
//! Walks a [`Performance`] using the number of rendered samples as its
//! clock, so playback is deterministic and never depends on wall time.
//! Every channel and end-of-track event is shown to an [`EventVisitor`]
//! before it reaches the synthesizer; tempo events are applied internally.

use super::{samples_to_ticks, EventKind, Performance, TimedEvent, DEFAULT_TEMPO_MICROS};
use std::sync::Arc;

/// What the player should do with an event after a visitor has seen it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    /// Hand the event to the synthesizer.
    Forward,
    /// Drop the event and jump to the given tick.
    Seek(u32),
}

/// Observes performance events in order, synchronously, as they are played.
pub trait EventVisitor {
    fn on_event(&mut self, event: &TimedEvent, total_ticks: u32) -> EventDisposition;
}

/// A visitor that forwards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl EventVisitor for PassThrough {
    fn on_event(&mut self, _event: &TimedEvent, _total_ticks: u32) -> EventDisposition {
        EventDisposition::Forward
    }
}

/// Transport status of a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    /// Loaded, never started.
    Ready,
    /// Dispatching events.
    Playing,
    /// Every event has been dispatched.
    Done,
    /// Stopped before reaching the end.
    Stopped,
}

/// Plays one performance against a sample clock.
#[derive(Debug, Clone)]
pub struct SequencePlayer {
    performance: Arc<Performance>,
    sample_rate: u32,
    status: PlayerStatus,
    /// Index of the next event to dispatch.
    cursor: usize,
    micros_per_beat: u32,
    /// Tick and sample of the last tempo change or seek.
    anchor_tick: f64,
    anchor_sample: u64,
    elapsed_samples: u64,
    current_tick: u32,
}

impl SequencePlayer {
    pub fn new(performance: Arc<Performance>, sample_rate: u32) -> Self {
        Self {
            performance,
            sample_rate,
            status: PlayerStatus::Ready,
            cursor: 0,
            micros_per_beat: DEFAULT_TEMPO_MICROS,
            anchor_tick: 0.0,
            anchor_sample: 0,
            elapsed_samples: 0,
            current_tick: 0,
        }
    }

    pub fn performance(&self) -> &Arc<Performance> {
        &self.performance
    }

    /// Starts or resumes playback. Returns false if the player is already
    /// playing or has finished.
    pub fn play(&mut self) -> bool {
        match self.status {
            PlayerStatus::Ready | PlayerStatus::Stopped => {
                self.status = PlayerStatus::Playing;
                true
            }
            PlayerStatus::Playing | PlayerStatus::Done => false,
        }
    }

    pub fn stop(&mut self) {
        if self.status == PlayerStatus::Playing {
            self.status = PlayerStatus::Stopped;
        }
    }

    pub fn status(&self) -> PlayerStatus {
        self.status
    }

    pub fn is_playing(&self) -> bool {
        self.status == PlayerStatus::Playing
    }

    /// Current tempo in microseconds per quarter note.
    pub fn tempo(&self) -> u32 {
        self.micros_per_beat
    }

    /// Tick reached at the last dispatch.
    pub fn current_tick(&self) -> u32 {
        self.current_tick
    }

    fn tick_at(&self, samples: u64) -> f64 {
        self.anchor_tick
            + samples_to_ticks(
                samples.saturating_sub(self.anchor_sample),
                self.micros_per_beat,
                self.performance.ticks_per_beat(),
                self.sample_rate,
            )
    }

    /// Dispatches every event due at the current clock, then advances the
    /// clock by `samples`.
    ///
    /// Channel events the visitor forwards are passed to `apply`.
    pub fn advance<F>(&mut self, samples: u64, visitor: &mut dyn EventVisitor, mut apply: F)
    where
        F: FnMut(&TimedEvent),
    {
        if self.status != PlayerStatus::Playing {
            return;
        }

        let total_ticks = self.performance.total_ticks();
        let mut now = self.tick_at(self.elapsed_samples);

        while self.cursor < self.performance.events().len() {
            let event = self.performance.events()[self.cursor];
            if event.tick as f64 > now {
                break;
            }
            self.cursor += 1;

            match event.kind {
                EventKind::Tempo(micros) => {
                    self.anchor_tick = now;
                    self.anchor_sample = self.elapsed_samples;
                    self.micros_per_beat = micros;
                }
                _ => match visitor.on_event(&event, total_ticks) {
                    EventDisposition::Forward => {
                        if matches!(event.kind, EventKind::Channel { .. }) {
                            apply(&event);
                        }
                    }
                    EventDisposition::Seek(target) => {
                        self.seek(target, &mut apply);
                        now = target as f64;
                    }
                },
            }
        }

        self.current_tick = now as u32;
        if self.cursor >= self.performance.events().len() {
            self.status = PlayerStatus::Done;
        }
        self.elapsed_samples += samples;
    }

    /// Jumps to `tick`.
    ///
    /// Non-note channel events and tempo changes before the target are
    /// replayed through `apply` so controllers and programs are as they would
    /// be after linear playback. Voices already sounding are left alone.
    pub fn seek<F>(&mut self, tick: u32, mut apply: F)
    where
        F: FnMut(&TimedEvent),
    {
        let events = self.performance.events();
        let target_index = events.partition_point(|e| e.tick < tick);

        let mut micros_per_beat = DEFAULT_TEMPO_MICROS;
        for event in &events[..target_index] {
            match event.kind {
                EventKind::Tempo(micros) => micros_per_beat = micros,
                EventKind::Channel { message, .. } if !message.is_note() => apply(event),
                _ => {}
            }
        }

        self.cursor = target_index;
        self.micros_per_beat = micros_per_beat;
        self.anchor_tick = tick as f64;
        self.anchor_sample = self.elapsed_samples;
        self.current_tick = tick;
        if self.status == PlayerStatus::Done {
            self.status = PlayerStatus::Playing;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{ChannelMessage, TimedEvent};

    fn channel(tick: u32, message: ChannelMessage) -> TimedEvent {
        TimedEvent::new(tick, EventKind::Channel { channel: 0, message })
    }

    fn performance() -> Arc<Performance> {
        Arc::new(Performance::new(
            "test",
            480,
            vec![
                channel(0, ChannelMessage::ProgramChange { program: 5 }),
                channel(0, ChannelMessage::NoteOn { key: 60, velocity: 100 }),
                TimedEvent::new(480, EventKind::Tempo(250_000)),
                channel(480, ChannelMessage::NoteOff { key: 60, velocity: 0 }),
                channel(960, ChannelMessage::Controller { controller: 7, value: 90 }),
            ],
        ))
    }

    /// Records the tick of everything it sees and can request one seek.
    struct Recorder {
        seen: Vec<u32>,
        seek_on_first: Option<u32>,
    }

    impl EventVisitor for Recorder {
        fn on_event(&mut self, event: &TimedEvent, _total_ticks: u32) -> EventDisposition {
            self.seen.push(event.tick);
            match self.seek_on_first.take() {
                Some(target) => EventDisposition::Seek(target),
                None => EventDisposition::Forward,
            }
        }
    }

    #[test]
    fn test_not_started_dispatches_nothing() {
        let mut player = SequencePlayer::new(performance(), 44100);
        let mut applied = 0;
        player.advance(64, &mut PassThrough, |_| applied += 1);
        assert_eq!(applied, 0);
        assert_eq!(player.status(), PlayerStatus::Ready);
    }

    #[test]
    fn test_plays_to_completion_and_tracks_tempo() {
        let mut player = SequencePlayer::new(performance(), 44100);
        assert!(player.play());
        assert!(!player.play());

        let mut recorder = Recorder {
            seen: Vec::new(),
            seek_on_first: None,
        };
        let mut applied = Vec::new();
        while player.is_playing() {
            player.advance(64, &mut recorder, |e| applied.push(e.tick));
        }

        // Tempo events are not shown to the visitor; end-of-track is but is not applied.
        assert_eq!(recorder.seen, vec![0, 0, 480, 960, 960]);
        assert_eq!(applied, vec![0, 0, 480, 960]);
        assert_eq!(player.tempo(), 250_000);
        assert_eq!(player.status(), PlayerStatus::Done);
    }

    #[test]
    fn test_seek_skips_event_and_replays_state() {
        let mut player = SequencePlayer::new(performance(), 44100);
        player.play();

        let mut recorder = Recorder {
            seen: Vec::new(),
            seek_on_first: Some(960),
        };
        let mut applied = Vec::new();
        player.advance(64, &mut recorder, |e| applied.push(e.kind));

        // The program change is replayed; the note-on is skipped; the seek
        // target events then dispatch in the same block.
        assert_eq!(
            applied[0],
            EventKind::Channel {
                channel: 0,
                message: ChannelMessage::ProgramChange { program: 5 }
            }
        );
        assert!(!applied.iter().any(|k| matches!(
            k,
            EventKind::Channel {
                message: ChannelMessage::NoteOn { .. },
                ..
            }
        )));
        assert_eq!(player.tempo(), 250_000);
        assert_eq!(player.current_tick(), 960);
        assert_eq!(player.status(), PlayerStatus::Done);
    }

    #[test]
    fn test_stop_and_resume() {
        let mut player = SequencePlayer::new(performance(), 44100);
        player.play();
        player.stop();
        assert_eq!(player.status(), PlayerStatus::Stopped);
        assert!(player.play());
        assert!(player.is_playing());
    }
}

//! Animation playback and interaction state machine
//!
//! Two kinds of interaction exist:
//!
//! - Simple: one clip. A non-looping clip remembers whatever was playing
//!   before it and resumes it when done.
//! - Continuous: three clips `IdleTo<Name>`, `<Name>Loop`, `<Name>ToIdle`.
//!   The enter clip plays once, then the loop runs until
//!   [`AnimationController::end_continuous`] plays the exit clip.
//!
//! Each active clip carries at most one finished action, taken when it
//! fires. Callers observe completion through a one-shot [`Completion`].
//! Clip time is advanced explicitly by the render loop via
//! [`AnimationController::advance`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// A named animation clip of the loaded model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimationClip {
    pub name: String,
    pub duration: Duration,
    pub looping: bool,
}

impl AnimationClip {
    pub fn once(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            duration,
            looping: false,
        }
    }

    pub fn looped(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            duration,
            looping: true,
        }
    }
}

/// Clips available on a model, by name
#[derive(Debug, Clone, Default)]
pub struct AnimationLibrary {
    clips: HashMap<String, AnimationClip>,
}

impl AnimationLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, clip: AnimationClip) -> Self {
        self.insert(clip);
        self
    }

    pub fn insert(&mut self, clip: AnimationClip) {
        self.clips.insert(clip.name.clone(), clip);
    }

    pub fn get(&self, name: &str) -> Option<&AnimationClip> {
        self.clips.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.clips.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Simple,
    Continuous,
}

/// A user-triggered gesture or emote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub name: String,
    pub kind: InteractionKind,
}

impl Interaction {
    pub fn simple(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: InteractionKind::Simple,
        }
    }

    pub fn continuous(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: InteractionKind::Continuous,
        }
    }
}

/// Continuous interaction phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ContinuousPhase {
    /// Enter clip playing
    Enter = 0,
    /// Loop clip playing, or exit clip playing until it completes
    Loop = 1,
}

/// Observable controller state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnimationState {
    Idle,
    Playing { clip: String, looping: bool },
    Continuous { interaction: String, phase: ContinuousPhase },
}

/// How a play request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Played to the end
    Finished,
    /// Clip(s) missing; nothing played
    Skipped,
    /// Replaced or stopped before finishing
    Interrupted,
}

impl PlaybackOutcome {
    /// Missing clips count as success from the caller's side
    pub fn is_success(&self) -> bool {
        !matches!(self, PlaybackOutcome::Interrupted)
    }
}

/// Resolves once, when the requested playback ends
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<PlaybackOutcome>,
    settled: Option<PlaybackOutcome>,
}

impl Completion {
    fn pair() -> (oneshot::Sender<PlaybackOutcome>, Completion) {
        let (tx, rx) = oneshot::channel();
        (tx, Completion { rx, settled: None })
    }

    fn ready(outcome: PlaybackOutcome) -> Completion {
        let (tx, completion) = Self::pair();
        let _ = tx.send(outcome);
        completion
    }

    /// Non-blocking check, for callers driving frames synchronously
    pub fn try_outcome(&mut self) -> Option<PlaybackOutcome> {
        if self.settled.is_none() {
            self.settled = match self.rx.try_recv() {
                Ok(outcome) => Some(outcome),
                Err(oneshot::error::TryRecvError::Empty) => None,
                Err(oneshot::error::TryRecvError::Closed) => Some(PlaybackOutcome::Interrupted),
            };
        }
        self.settled
    }
}

impl Future for Completion {
    type Output = PlaybackOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(outcome) = self.settled {
            return Poll::Ready(outcome);
        }
        let polled = Pin::new(&mut self.rx).poll(cx);
        polled.map(|settled| {
            let outcome = settled.unwrap_or(PlaybackOutcome::Interrupted);
            self.settled = Some(outcome);
            outcome
        })
    }
}

/// Strip a leading gender marker from an interaction name
pub fn strip_gender_prefix(name: &str) -> &str {
    const PREFIXES: [&str; 6] = ["Female_", "Male_", "F_", "M_", "Female", "Male"];
    PREFIXES
        .iter()
        .find_map(|p| name.strip_prefix(p).filter(|rest| !rest.is_empty()))
        .unwrap_or(name)
}

enum OnFinished {
    /// One-shot done; resume this clip (or the idle clip)
    Resume(Option<AnimationClip>),
    /// Continuous enter done; start the loop
    EnterLoop,
    /// Continuous exit done; restore and clear the interaction
    ExitContinuous,
}

struct ActiveClip {
    clip: AnimationClip,
    elapsed: Duration,
    on_finished: Option<OnFinished>,
    done: Option<oneshot::Sender<PlaybackOutcome>>,
}

struct ContinuousInteraction {
    name: String,
    loop_clip: AnimationClip,
    exit_clip: AnimationClip,
    resume: Option<AnimationClip>,
    phase: ContinuousPhase,
    exiting: bool,
    done: Option<oneshot::Sender<PlaybackOutcome>>,
}

fn settle(done: Option<oneshot::Sender<PlaybackOutcome>>, outcome: PlaybackOutcome) {
    if let Some(tx) = done {
        let _ = tx.send(outcome);
    }
}

/// Drives clip playback for one avatar
pub struct AnimationController {
    library: AnimationLibrary,
    idle_clip: Option<String>,
    current: Option<ActiveClip>,
    continuous: Option<ContinuousInteraction>,
}

impl AnimationController {
    pub fn new(library: AnimationLibrary) -> Self {
        Self {
            library,
            idle_clip: None,
            current: None,
            continuous: None,
        }
    }

    /// Fall back to `name` when nothing is left to resume; starts it now
    pub fn with_idle(mut self, name: impl Into<String>) -> Self {
        self.idle_clip = Some(name.into());
        if self.current.is_none() {
            self.resume_or_idle(None);
        }
        self
    }

    pub fn library(&self) -> &AnimationLibrary {
        &self.library
    }

    pub fn state(&self) -> AnimationState {
        if let Some(c) = &self.continuous {
            return AnimationState::Continuous {
                interaction: c.name.clone(),
                phase: c.phase,
            };
        }
        match &self.current {
            Some(active) => AnimationState::Playing {
                clip: active.clip.name.clone(),
                looping: active.clip.looping,
            },
            None => AnimationState::Idle,
        }
    }

    /// `None` when no continuous interaction is active
    pub fn phase(&self) -> Option<ContinuousPhase> {
        self.continuous.as_ref().map(|c| c.phase)
    }

    pub fn current_clip(&self) -> Option<&AnimationClip> {
        self.current.as_ref().map(|a| &a.clip)
    }

    pub fn play_interaction(&mut self, interaction: &Interaction) -> Completion {
        match interaction.kind {
            InteractionKind::Simple => self.play(&interaction.name),
            InteractionKind::Continuous => self.play_continuous(&interaction.name),
        }
    }

    /// Play a single clip. A missing clip completes immediately.
    pub fn play(&mut self, name: &str) -> Completion {
        let Some(clip) = self.library.get(name).cloned() else {
            tracing::warn!(clip = name, "animation clip not found");
            return Completion::ready(PlaybackOutcome::Skipped);
        };

        let resume = self.take_resume_target();
        let (tx, completion) = Completion::pair();
        let on_finished = (!clip.looping).then(|| OnFinished::Resume(resume));
        self.start(clip, on_finished, Some(tx));
        completion
    }

    /// Start a three-part interaction. Completes when its exit clip ends.
    pub fn play_continuous(&mut self, name: &str) -> Completion {
        let base = strip_gender_prefix(name);
        let enter = self.library.get(&format!("IdleTo{base}")).cloned();
        let looped = self.library.get(&format!("{base}Loop")).cloned();
        let exit = self.library.get(&format!("{base}ToIdle")).cloned();

        let (Some(enter), Some(loop_clip), Some(exit_clip)) = (enter, looped, exit) else {
            tracing::warn!(interaction = name, "continuous interaction is missing clips");
            return Completion::ready(PlaybackOutcome::Skipped);
        };

        let resume = self.take_resume_target();
        let (tx, completion) = Completion::pair();
        self.continuous = Some(ContinuousInteraction {
            name: base.to_string(),
            loop_clip: AnimationClip {
                looping: true,
                ..loop_clip
            },
            exit_clip,
            resume,
            phase: ContinuousPhase::Enter,
            exiting: false,
            done: Some(tx),
        });
        self.start(enter, Some(OnFinished::EnterLoop), None);
        completion
    }

    /// Play the exit clip of the looping interaction.
    ///
    /// Returns `false` without doing anything unless the loop phase has been
    /// reached and no exit is already underway.
    pub fn end_continuous(&mut self) -> bool {
        let exit = match self.continuous.as_mut() {
            Some(c) if c.phase == ContinuousPhase::Loop && !c.exiting => {
                c.exiting = true;
                c.exit_clip.clone()
            }
            _ => return false,
        };
        self.start(exit, Some(OnFinished::ExitContinuous), None);
        true
    }

    /// Mirror a clip reported by a remote peer. No completion tracking.
    pub fn play_synced(&mut self, name: &str, looping: bool) {
        if self.current.as_ref().is_some_and(|a| a.clip.name == name) {
            return;
        }
        let Some(clip) = self.library.get(name).cloned() else {
            tracing::debug!(clip = name, "synced clip not in library");
            return;
        };
        if let Some(c) = self.continuous.take() {
            settle(c.done, PlaybackOutcome::Interrupted);
        }
        self.start(AnimationClip { looping, ..clip }, None, None);
    }

    /// Abort everything and fall back to the idle clip
    pub fn stop(&mut self) {
        if let Some(c) = self.continuous.take() {
            settle(c.done, PlaybackOutcome::Interrupted);
        }
        if let Some(active) = self.current.take() {
            settle(active.done, PlaybackOutcome::Interrupted);
        }
        self.resume_or_idle(None);
    }

    /// Advance clip time; fires at most one finished action per call
    pub fn advance(&mut self, dt: Duration) {
        let Some(active) = self.current.as_mut() else {
            return;
        };
        active.elapsed += dt;
        if active.clip.looping {
            let period = active.clip.duration.as_nanos();
            if period > 0 {
                active.elapsed = Duration::from_nanos((active.elapsed.as_nanos() % period) as u64);
            }
            return;
        }
        if active.elapsed < active.clip.duration {
            return;
        }
        let Some(finished) = self.current.take() else {
            return;
        };

        tracing::trace!(clip = %finished.clip.name, "clip finished");
        match finished.on_finished {
            Some(OnFinished::Resume(resume)) => {
                self.resume_or_idle(resume);
                settle(finished.done, PlaybackOutcome::Finished);
            }
            Some(OnFinished::EnterLoop) => {
                if let Some(c) = self.continuous.as_mut() {
                    c.phase = ContinuousPhase::Loop;
                    let clip = c.loop_clip.clone();
                    self.start(clip, None, None);
                }
            }
            Some(OnFinished::ExitContinuous) => {
                if let Some(c) = self.continuous.take() {
                    self.resume_or_idle(c.resume);
                    settle(c.done, PlaybackOutcome::Finished);
                }
            }
            None => settle(finished.done, PlaybackOutcome::Finished),
        }
    }

    /// What should play after the clip about to be started
    fn take_resume_target(&mut self) -> Option<AnimationClip> {
        if let Some(c) = self.continuous.take() {
            settle(c.done, PlaybackOutcome::Interrupted);
            return c.resume;
        }
        let active = self.current.as_mut()?;
        match active.on_finished.as_mut() {
            // Interrupted one-shot: inherit what it would have resumed
            Some(OnFinished::Resume(resume)) => resume.take(),
            _ => Some(active.clip.clone()),
        }
    }

    fn resume_or_idle(&mut self, resume: Option<AnimationClip>) {
        let clip = resume.or_else(|| {
            self.idle_clip
                .as_ref()
                .and_then(|name| self.library.get(name).cloned())
        });
        if let Some(clip) = clip {
            self.start(clip, None, None);
        }
    }

    fn start(
        &mut self,
        clip: AnimationClip,
        on_finished: Option<OnFinished>,
        done: Option<oneshot::Sender<PlaybackOutcome>>,
    ) {
        if let Some(previous) = self.current.take() {
            settle(previous.done, PlaybackOutcome::Interrupted);
        }
        tracing::trace!(clip = %clip.name, looping = clip.looping, "clip started");
        self.current = Some(ActiveClip {
            clip,
            elapsed: Duration::ZERO,
            on_finished,
            done,
        });
    }
}

impl std::fmt::Debug for AnimationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationController")
            .field("state", &self.state())
            .field("clips", &self.library.len())
            .finish()
    }
}

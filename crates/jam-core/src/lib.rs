//! Jam Core - Transport, lookahead scheduling and sound bank for the Jam sequencer.
//!
//! This crate provides the building blocks of a jam session:
//!
//! - **Timing** - Transport clock, beats and bars, time signatures
//! - **Model** - Projects, tracks, regions and notes
//! - **Scheduler** - Lookahead scheduling of notes against the output clock
//! - **Mixer** - Per-track gain, mute, solo and the master bus
//! - **Output** - Trigger handoff to whatever produces sound
//! - **Sound bank** - Prompt → descriptor → patch pipeline and registry
//! - **Engine / Runtime** - The owned session and the thread that drives it
//!
//! # Architecture
//!
//! User intent arrives as [`EngineCommand`]s. The [`Runtime`] thread owns
//! the [`Engine`], applies commands between ticks and calls
//! [`Engine::tick`] periodically. Each tick the [`LookaheadScheduler`]
//! commits triggers a short window ahead of the output clock and hands
//! them to an [`OutputSink`] without blocking.
//!
//! # Feature Flags
//!
//! - `remote` (default) - HTTP descriptor service client via `reqwest`

pub mod config;
pub mod demo;
pub mod engine;
pub mod error;
pub mod mixer;
pub mod model;
pub mod output;
pub mod patch;
pub mod runtime;
pub mod scheduler;
pub mod soundbank;
pub mod state;
pub mod timing;

pub use config::{EngineConfig, RemoteConfig, SchedulerConfig, StorageConfig};
pub use demo::demo_project;
pub use engine::Engine;
pub use error::{EngineError, RemoteError, StoreError};
pub use mixer::{ChannelStrip, MixGraph};
pub use model::{MidiNote, ProjectState, Region, RegionId, Track, TrackData, TrackId, TrackType};
pub use output::{
    ChannelOutput, ManualClock, MonotonicClock, OutputClock, OutputSink, RecordingOutput,
    TriggerCommand, TriggerReceiver,
};
pub use patch::{
    Envelope, Filter, FilterKind, InstrumentPatch, Lfo, PatchKind, SynthParameters, Waveform,
};
pub use runtime::{Runtime, RuntimeHandle};
pub use scheduler::{LookaheadScheduler, ScheduleContext, TickReport};
pub use soundbank::{
    PatchRegistry, PatchRequester, SoundDescriptor, SoundDescriptorGenerator, GENRES,
};
pub use state::{EngineCommand, SharedState, StateManager};
pub use timing::{Bars, Beats, TimeSignature, TransportClock};

// SPDX-License-Identifier: Apache-2.0
//! Replay substrate: record and play back per-tick input frames.
//!
//! In record mode every tick stores a frame with deep copies of the input
//! payloads. Playback looks frames up by tick with a cursor shortcut for the
//! common monotonic walk. The serialized form is a TLV stream of FRAME
//! records sorted by tick index.
//!
//! The determinism modes ride along: they track the world digest per tick so
//! a replayed session can assert bit-identical state against the recording.

use bytes::Bytes;
use thiserror::Error;

use crate::tlv::{ByteReader, ByteWriter, TlvError, TlvReader, TlvStreamWriter};
use crate::world::WorldDigest;

/// Record tag of a replay frame.
pub const FRAME_TAG: u32 = 1;

/// Replay context mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReplayMode {
    /// Inputs pass through untouched.
    #[default]
    Off,
    /// Inputs are captured per tick.
    Record,
    /// Inputs come from recorded frames.
    Playback,
}

/// Determinism auditing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeterminismMode {
    /// No digest tracking.
    #[default]
    Off,
    /// Remember the digest after each tick.
    Record,
    /// Compare the digest after each tick against the remembered one.
    Playback,
    /// Compare only; never update the remembered digest.
    AssertOnly,
}

/// One player input inside a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFrame {
    /// Tick this input applies to.
    pub tick_index: u32,
    /// Issuing player.
    pub player_id: u32,
    /// Opaque command payload.
    pub payload: Bytes,
}

/// All inputs of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayFrame {
    /// Tick these inputs belong to.
    pub tick_index: u32,
    /// Inputs in arrival order.
    pub inputs: Vec<InputFrame>,
}

/// Errors from replay operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    /// The operation does not apply in the current mode.
    #[error("operation invalid in mode {0:?}")]
    WrongMode(ReplayMode),

    /// Frames must be recorded with non-decreasing tick indices.
    #[error("tick {tick} recorded out of order")]
    OutOfOrder {
        /// The offending tick index.
        tick: u32,
    },

    /// The replay stream was malformed.
    #[error("malformed replay stream: {0}")]
    Malformed(#[from] TlvError),

    /// A replayed tick diverged from the recording.
    #[error("world digest mismatch: expected {expected}, found {found}")]
    DigestMismatch {
        /// Digest remembered from the recording.
        expected: WorldDigest,
        /// Digest computed this run.
        found: WorldDigest,
    },
}

/// Record/playback context for one session.
#[derive(Debug, Clone, Default)]
pub struct ReplayContext {
    mode: ReplayMode,
    determinism: DeterminismMode,
    last_digest: Option<WorldDigest>,
    frames: Vec<ReplayFrame>,
    cursor: usize,
}

impl ReplayContext {
    /// Context with replay off.
    #[must_use]
    pub fn off() -> Self {
        Self::default()
    }

    /// Fresh recording context.
    #[must_use]
    pub fn record() -> Self {
        Self { mode: ReplayMode::Record, ..Self::default() }
    }

    /// Playback context over a deserialized stream.
    pub fn playback_from(bytes: &[u8]) -> Result<Self, ReplayError> {
        let mut ctx = Self::deserialize(bytes)?;
        ctx.mode = ReplayMode::Playback;
        Ok(ctx)
    }

    /// Current mode.
    #[must_use]
    pub fn mode(&self) -> ReplayMode {
        self.mode
    }

    /// Number of stored frames.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Current determinism auditing mode.
    #[must_use]
    pub fn determinism(&self) -> DeterminismMode {
        self.determinism
    }

    /// Selects the determinism auditing mode.
    pub fn set_determinism(&mut self, mode: DeterminismMode) {
        self.determinism = mode;
        if mode == DeterminismMode::Off {
            self.last_digest = None;
        }
    }

    /// Stores the inputs of one tick. Payload bytes are deep-copied at the
    /// `Bytes` layer already; the frame owns its data.
    pub fn record_frame(&mut self, tick_index: u32, inputs: &[InputFrame]) -> Result<(), ReplayError> {
        if self.mode != ReplayMode::Record {
            return Err(ReplayError::WrongMode(self.mode));
        }
        if let Some(last) = self.frames.last() {
            if tick_index < last.tick_index {
                return Err(ReplayError::OutOfOrder { tick: tick_index });
            }
        }
        self.frames.push(ReplayFrame { tick_index, inputs: to_owned_inputs(inputs) });
        Ok(())
    }

    /// Frame for a tick, if one was recorded.
    ///
    /// Monotonic access is O(1) through the cursor; random access falls back
    /// to a linear scan.
    pub fn frame_at(&mut self, tick_index: u32) -> Option<&ReplayFrame> {
        if let Some(frame) = self.frames.get(self.cursor) {
            if frame.tick_index == tick_index {
                let at = self.cursor;
                self.cursor += 1;
                return self.frames.get(at);
            }
        }
        let at = self.frames.iter().position(|f| f.tick_index == tick_index)?;
        self.cursor = at + 1;
        self.frames.get(at)
    }

    /// Records or checks the post-tick world digest per the determinism
    /// mode.
    pub fn observe_digest(&mut self, digest: WorldDigest) -> Result<(), ReplayError> {
        match self.determinism {
            DeterminismMode::Off => Ok(()),
            DeterminismMode::Record => {
                self.last_digest = Some(digest);
                Ok(())
            }
            DeterminismMode::Playback | DeterminismMode::AssertOnly => {
                match self.last_digest {
                    Some(expected) if expected != digest => {
                        Err(ReplayError::DigestMismatch { expected, found: digest })
                    }
                    _ => {
                        if self.determinism == DeterminismMode::Playback {
                            self.last_digest = Some(digest);
                        }
                        Ok(())
                    }
                }
            }
        }
    }

    /// Serializes the stored frames to the canonical stream.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut stream = TlvStreamWriter::new();
        for frame in &self.frames {
            let mut w = ByteWriter::new();
            w.u32(frame.tick_index);
            w.u32(frame.inputs.len() as u32);
            for input in &frame.inputs {
                w.u32(input.tick_index);
                w.u32(input.player_id);
                w.blob(&input.payload);
            }
            stream.push(FRAME_TAG, frame.tick_index, w.finish());
        }
        stream.finish()
    }

    /// Rebuilds a context from a serialized stream, in playback mode.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, ReplayError> {
        let mut frames = Vec::new();
        let mut reader = TlvReader::new(bytes);
        while let Some((tag, payload)) = reader.next_record()? {
            if tag != FRAME_TAG {
                continue;
            }
            let mut r = ByteReader::new(payload);
            let tick_index = r.u32()?;
            let input_count = r.u32()?;
            let mut inputs = Vec::with_capacity(input_count as usize);
            for _ in 0..input_count {
                let input_tick = r.u32()?;
                let player_id = r.u32()?;
                let payload = Bytes::copy_from_slice(r.blob()?);
                inputs.push(InputFrame { tick_index: input_tick, player_id, payload });
            }
            frames.push(ReplayFrame { tick_index, inputs });
        }
        Ok(Self {
            mode: ReplayMode::Playback,
            determinism: DeterminismMode::Off,
            last_digest: None,
            frames,
            cursor: 0,
        })
    }
}

fn to_owned_inputs(inputs: &[InputFrame]) -> Vec<InputFrame> {
    inputs
        .iter()
        .map(|i| InputFrame {
            tick_index: i.tick_index,
            player_id: i.player_id,
            payload: Bytes::copy_from_slice(&i.payload),
        })
        .collect()
}

/// Replay subsystem entry. The context itself lives with the session; the
/// subsystem slot keeps the id stable in the registry and the save stream.
pub struct ReplaySubsystem;

impl crate::subsystem::Subsystem for ReplaySubsystem {
    fn id(&self) -> crate::subsystem::SubsystemId {
        crate::subsystem::SubsystemId::Replay
    }

    fn name(&self) -> &'static str {
        "replay"
    }
}

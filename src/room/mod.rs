//! Per-match coordination records and the submission state machine.
//!
//! A room is created by the matchmaker, mutated by code submissions,
//! consumed by the sandbox dispatcher, and deleted exactly once by the
//! result publisher. Room deletion is the completion signal: whichever
//! path removes the room owns result delivery.

pub mod memory;
pub mod model;
pub mod store;
pub mod submissions;

pub use model::{GameMap, MatchResult, MatchRoom, PlayerRole, RoomStatus, ScoreBoard, Winner};
pub use store::{RoomStore, SubmitOutcome, room_key};
pub use submissions::SubmissionService;

//! Type definitions for the transfer risk engine

pub mod decision;
pub mod transfer;

pub use decision::{DecisionResponse, Disposition, FreezeInstruction, ModelScores, TransferReply};
pub use transfer::{RawNumber, TransferRequest};

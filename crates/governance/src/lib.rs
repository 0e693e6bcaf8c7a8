//! Group-decision engines for the CHAS core.
//!
//! Two state machines sit on top of the credit engine: the tip-to-tip
//! escrow proposal (stake held until the community decides unanimously)
//! and the moderator election (one vote per council member, majority with
//! a deterministic tie-break). Both resolve exactly once: every terminal
//! status transition is a conditional update keyed on the prior status, so
//! concurrent resolvers race for a single winning write.

mod election;
mod tip_to_tip;

pub use election::{
    Election, ElectionEngine, ElectionStatus, ElectionView, ElectionVote,
};
pub use tip_to_tip::{
    ProposalOutcome, ProposalStatus, ProposalView, ProposalVote, TipToTipEngine, TipToTipProposal,
    VoteChoice,
};

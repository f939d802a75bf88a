//! Friendship transition rules.
//!
//! A relationship is stored twice, once per side, and every mutation is
//! decided here first: given the caller's status, the counterpart's status
//! and the requested operation, either an [`Effect`] to apply or a
//! [`Denial`] to report. Keeping the decision a pure function over the
//! status pair makes the whole table testable without a store.

use parley_types::models::FriendshipStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationOp {
    Add,
    Block,
    Remove,
}

/// A committed transition for the service layer to apply. Counterpart
/// resets are decided here so the service never re-derives them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// caller -> PENDING, counterpart -> REQUESTED.
    SendRequest,
    /// Both sides -> FRIEND, direct channel assigned (reusing either side's
    /// existing reference) and marked active.
    Accept,
    /// caller -> BLOCKED; counterpart reset to none when it held a live
    /// state. A counterpart that already severed the edge is left alone.
    Block { reset_counterpart: bool },
    /// caller -> none; counterpart reset symmetrically when it still held
    /// the edge. Channel references survive on both sides.
    Remove { reset_counterpart: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    AlreadyFriends,
    AlreadyRequested,
    AlreadyBlocked,
    NothingToRemove,
    /// The counterpart blocked the caller; reported as a generic
    /// authorization failure so the block is not revealed.
    Forbidden,
    /// The pair is mutually inconsistent — a data bug, not a user error.
    InvalidState,
}

pub fn transition(
    caller: Option<FriendshipStatus>,
    counterpart: Option<FriendshipStatus>,
    op: RelationOp,
) -> Result<Effect, Denial> {
    use FriendshipStatus::*;

    match (caller, op) {
        (None, RelationOp::Add) => match counterpart {
            None => Ok(Effect::SendRequest),
            Some(Pending) => Ok(Effect::Accept),
            Some(Blocked) => Err(Denial::Forbidden),
            Some(Requested) | Some(Friend) => Err(Denial::InvalidState),
        },
        (None, RelationOp::Block) => match counterpart {
            None => Ok(Effect::Block {
                reset_counterpart: false,
            }),
            Some(Pending) => Ok(Effect::Block {
                reset_counterpart: true,
            }),
            Some(Blocked) => Err(Denial::Forbidden),
            Some(Requested) | Some(Friend) => Err(Denial::InvalidState),
        },
        (None, RelationOp::Remove) => match counterpart {
            None | Some(Pending) | Some(Blocked) => Err(Denial::NothingToRemove),
            Some(Requested) | Some(Friend) => Err(Denial::InvalidState),
        },

        (Some(Pending), RelationOp::Add) => match counterpart {
            None | Some(Requested) => Err(Denial::AlreadyRequested),
            _ => Err(Denial::InvalidState),
        },
        (Some(Pending), RelationOp::Block) => match counterpart {
            None => Ok(Effect::Block {
                reset_counterpart: false,
            }),
            Some(Requested) => Ok(Effect::Block {
                reset_counterpart: true,
            }),
            _ => Err(Denial::InvalidState),
        },
        (Some(Pending), RelationOp::Remove) => match counterpart {
            None => Ok(Effect::Remove {
                reset_counterpart: false,
            }),
            Some(Requested) => Ok(Effect::Remove {
                reset_counterpart: true,
            }),
            _ => Err(Denial::InvalidState),
        },

        (Some(Requested), RelationOp::Add) => match counterpart {
            Some(Pending) => Ok(Effect::Accept),
            _ => Err(Denial::InvalidState),
        },
        (Some(Requested), RelationOp::Block) => match counterpart {
            Some(Pending) => Ok(Effect::Block {
                reset_counterpart: true,
            }),
            _ => Err(Denial::InvalidState),
        },
        (Some(Requested), RelationOp::Remove) => match counterpart {
            Some(Pending) => Ok(Effect::Remove {
                reset_counterpart: true,
            }),
            _ => Err(Denial::InvalidState),
        },

        (Some(Friend), RelationOp::Add) => match counterpart {
            Some(Friend) => Err(Denial::AlreadyFriends),
            _ => Err(Denial::InvalidState),
        },
        (Some(Friend), RelationOp::Block) => match counterpart {
            Some(Friend) => Ok(Effect::Block {
                reset_counterpart: true,
            }),
            _ => Err(Denial::InvalidState),
        },
        (Some(Friend), RelationOp::Remove) => match counterpart {
            Some(Friend) => Ok(Effect::Remove {
                reset_counterpart: true,
            }),
            _ => Err(Denial::InvalidState),
        },

        (Some(Blocked), RelationOp::Add) | (Some(Blocked), RelationOp::Block) => {
            match counterpart {
                None | Some(Blocked) => Err(Denial::AlreadyBlocked),
                _ => Err(Denial::InvalidState),
            }
        }
        (Some(Blocked), RelationOp::Remove) => match counterpart {
            // Unblock: only the caller's side is cleared — a counterpart
            // block stays in place.
            None | Some(Blocked) => Ok(Effect::Remove {
                reset_counterpart: false,
            }),
            _ => Err(Denial::InvalidState),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use FriendshipStatus::*;

    const STATES: [Option<FriendshipStatus>; 5] = [
        None,
        Some(Pending),
        Some(Requested),
        Some(Friend),
        Some(Blocked),
    ];

    /// Every pair is either covered by the table or denied — the function
    /// is total and never panics.
    #[test]
    fn every_combination_has_a_decision() {
        for caller in STATES {
            for counterpart in STATES {
                for op in [RelationOp::Add, RelationOp::Block, RelationOp::Remove] {
                    let _ = transition(caller, counterpart, op);
                }
            }
        }
    }

    #[test]
    fn add_decision_table() {
        let cases: [(Option<FriendshipStatus>, Option<FriendshipStatus>, Result<Effect, Denial>); 25] = [
            (None, None, Ok(Effect::SendRequest)),
            (None, Some(Pending), Ok(Effect::Accept)),
            (None, Some(Requested), Err(Denial::InvalidState)),
            (None, Some(Friend), Err(Denial::InvalidState)),
            (None, Some(Blocked), Err(Denial::Forbidden)),
            (Some(Pending), None, Err(Denial::AlreadyRequested)),
            (Some(Pending), Some(Pending), Err(Denial::InvalidState)),
            (Some(Pending), Some(Requested), Err(Denial::AlreadyRequested)),
            (Some(Pending), Some(Friend), Err(Denial::InvalidState)),
            (Some(Pending), Some(Blocked), Err(Denial::InvalidState)),
            (Some(Requested), None, Err(Denial::InvalidState)),
            (Some(Requested), Some(Pending), Ok(Effect::Accept)),
            (Some(Requested), Some(Requested), Err(Denial::InvalidState)),
            (Some(Requested), Some(Friend), Err(Denial::InvalidState)),
            (Some(Requested), Some(Blocked), Err(Denial::InvalidState)),
            (Some(Friend), None, Err(Denial::InvalidState)),
            (Some(Friend), Some(Pending), Err(Denial::InvalidState)),
            (Some(Friend), Some(Requested), Err(Denial::InvalidState)),
            (Some(Friend), Some(Friend), Err(Denial::AlreadyFriends)),
            (Some(Friend), Some(Blocked), Err(Denial::InvalidState)),
            (Some(Blocked), None, Err(Denial::AlreadyBlocked)),
            (Some(Blocked), Some(Pending), Err(Denial::InvalidState)),
            (Some(Blocked), Some(Requested), Err(Denial::InvalidState)),
            (Some(Blocked), Some(Friend), Err(Denial::InvalidState)),
            (Some(Blocked), Some(Blocked), Err(Denial::AlreadyBlocked)),
        ];

        for (caller, counterpart, expected) in cases {
            assert_eq!(
                transition(caller, counterpart, RelationOp::Add),
                expected,
                "add with caller={caller:?} counterpart={counterpart:?}"
            );
        }
    }

    #[test]
    fn block_decision_table() {
        let reset = |reset_counterpart| Ok(Effect::Block { reset_counterpart });
        let cases: [(Option<FriendshipStatus>, Option<FriendshipStatus>, Result<Effect, Denial>); 25] = [
            (None, None, reset(false)),
            (None, Some(Pending), reset(true)),
            (None, Some(Requested), Err(Denial::InvalidState)),
            (None, Some(Friend), Err(Denial::InvalidState)),
            (None, Some(Blocked), Err(Denial::Forbidden)),
            (Some(Pending), None, reset(false)),
            (Some(Pending), Some(Pending), Err(Denial::InvalidState)),
            (Some(Pending), Some(Requested), reset(true)),
            (Some(Pending), Some(Friend), Err(Denial::InvalidState)),
            (Some(Pending), Some(Blocked), Err(Denial::InvalidState)),
            (Some(Requested), None, Err(Denial::InvalidState)),
            (Some(Requested), Some(Pending), reset(true)),
            (Some(Requested), Some(Requested), Err(Denial::InvalidState)),
            (Some(Requested), Some(Friend), Err(Denial::InvalidState)),
            (Some(Requested), Some(Blocked), Err(Denial::InvalidState)),
            (Some(Friend), None, Err(Denial::InvalidState)),
            (Some(Friend), Some(Pending), Err(Denial::InvalidState)),
            (Some(Friend), Some(Requested), Err(Denial::InvalidState)),
            (Some(Friend), Some(Friend), reset(true)),
            (Some(Friend), Some(Blocked), Err(Denial::InvalidState)),
            (Some(Blocked), None, Err(Denial::AlreadyBlocked)),
            (Some(Blocked), Some(Pending), Err(Denial::InvalidState)),
            (Some(Blocked), Some(Requested), Err(Denial::InvalidState)),
            (Some(Blocked), Some(Friend), Err(Denial::InvalidState)),
            (Some(Blocked), Some(Blocked), Err(Denial::AlreadyBlocked)),
        ];

        for (caller, counterpart, expected) in cases {
            assert_eq!(
                transition(caller, counterpart, RelationOp::Block),
                expected,
                "block with caller={caller:?} counterpart={counterpart:?}"
            );
        }
    }

    #[test]
    fn remove_decision_table() {
        let reset = |reset_counterpart| Ok(Effect::Remove { reset_counterpart });
        let cases: [(Option<FriendshipStatus>, Option<FriendshipStatus>, Result<Effect, Denial>); 25] = [
            (None, None, Err(Denial::NothingToRemove)),
            (None, Some(Pending), Err(Denial::NothingToRemove)),
            (None, Some(Requested), Err(Denial::InvalidState)),
            (None, Some(Friend), Err(Denial::InvalidState)),
            (None, Some(Blocked), Err(Denial::NothingToRemove)),
            (Some(Pending), None, reset(false)),
            (Some(Pending), Some(Pending), Err(Denial::InvalidState)),
            (Some(Pending), Some(Requested), reset(true)),
            (Some(Pending), Some(Friend), Err(Denial::InvalidState)),
            (Some(Pending), Some(Blocked), Err(Denial::InvalidState)),
            (Some(Requested), None, Err(Denial::InvalidState)),
            (Some(Requested), Some(Pending), reset(true)),
            (Some(Requested), Some(Requested), Err(Denial::InvalidState)),
            (Some(Requested), Some(Friend), Err(Denial::InvalidState)),
            (Some(Requested), Some(Blocked), Err(Denial::InvalidState)),
            (Some(Friend), None, Err(Denial::InvalidState)),
            (Some(Friend), Some(Pending), Err(Denial::InvalidState)),
            (Some(Friend), Some(Requested), Err(Denial::InvalidState)),
            (Some(Friend), Some(Friend), reset(true)),
            (Some(Friend), Some(Blocked), Err(Denial::InvalidState)),
            (Some(Blocked), None, reset(false)),
            (Some(Blocked), Some(Pending), Err(Denial::InvalidState)),
            (Some(Blocked), Some(Requested), Err(Denial::InvalidState)),
            (Some(Blocked), Some(Friend), Err(Denial::InvalidState)),
            (Some(Blocked), Some(Blocked), reset(false)),
        ];

        for (caller, counterpart, expected) in cases {
            assert_eq!(
                transition(caller, counterpart, RelationOp::Remove),
                expected,
                "remove with caller={caller:?} counterpart={counterpart:?}"
            );
        }
    }

    /// Blocking never resets a counterpart that already blocked or severed
    /// the edge, so two BLOCKED sides can only coexist transiently.
    #[test]
    fn block_never_targets_a_blocked_counterpart() {
        for caller in STATES {
            if let Ok(Effect::Block { reset_counterpart }) =
                transition(caller, Some(Blocked), RelationOp::Block)
            {
                assert!(!reset_counterpart);
            }
        }
    }
}

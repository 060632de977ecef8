//! C7: the tag-driven action guard. Consulted at every entry point that
//! could modify remote state (§4.7).

use crate::branch::BranchSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Mirror,
    Force,
    Delete,
    Repack,
}

pub struct Decision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl Decision {
    fn allow() -> Self {
        Decision {
            allowed: true,
            reason: None,
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Decision {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Evaluates whether `action` may proceed against `branch`.
pub fn check(branch: &BranchSpec, _action: Action) -> Decision {
    if branch.locked {
        return Decision::deny(format!(
            "branch {} is LOCKED; remove the LOCKED tag to allow this action",
            branch.key()
        ));
    }
    Decision::allow()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::branch::parse_line;

    #[test]
    fn locked_branch_denies_every_action() {
        let branch = parse_line("/data/alpha :: MUTABLE :: LOCKED").unwrap();
        for action in [Action::Mirror, Action::Force, Action::Delete, Action::Repack] {
            let decision = check(&branch, action);
            assert!(!decision.allowed);
            assert!(decision.reason.unwrap().contains("LOCKED"));
        }
    }

    #[test]
    fn unlocked_branch_allows_every_action() {
        let branch = parse_line("/data/alpha :: MUTABLE").unwrap();
        for action in [Action::Mirror, Action::Force, Action::Delete, Action::Repack] {
            assert!(check(&branch, action).allowed);
        }
    }
}

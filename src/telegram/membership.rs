//! Group membership gate
//!
//! Registration can be gated on membership in a Telegram group. The check is
//! a single getChatMember call; what happens when that call itself fails is a
//! deployment policy, chosen explicitly here instead of varying per handler.

use teloxide::prelude::*;
use teloxide::types::Recipient;

use crate::core::config;
use crate::ledger::RewardError;

/// What to do when the membership check cannot be performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipPolicy {
    /// Treat an unverifiable user as a member (the lenient default)
    AllowOnFailure,
    /// Refuse reward actions until the check succeeds
    BlockOnFailure,
}

/// Active policy for this deployment.
pub const POLICY: MembershipPolicy = MembershipPolicy::AllowOnFailure;

/// Outcome of the getChatMember probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipGate {
    Allowed,
    Denied,
    /// The verification call itself failed
    Unavailable,
}

/// Checks whether the user belongs to the configured group.
///
/// Returns `Allowed` immediately when no group is configured.
pub async fn check_group_membership(bot: &Bot, user_id: UserId) -> MembershipGate {
    let group = config::GROUP_USERNAME.as_str();
    if group.is_empty() {
        return MembershipGate::Allowed;
    }

    match bot
        .get_chat_member(Recipient::ChannelUsername(group.to_string()), user_id)
        .await
    {
        Ok(member) if member.is_present() => MembershipGate::Allowed,
        Ok(_) => MembershipGate::Denied,
        Err(e) => {
            log::warn!("Membership check for user {} failed: {}", user_id, e);
            MembershipGate::Unavailable
        }
    }
}

/// Applies [`POLICY`] to a gate result.
pub fn gate_allows(gate: MembershipGate) -> Result<(), RewardError> {
    match (gate, POLICY) {
        (MembershipGate::Allowed, _) => Ok(()),
        (MembershipGate::Denied, _) => Err(RewardError::NotGroupMember {
            group: config::GROUP_USERNAME.clone(),
        }),
        (MembershipGate::Unavailable, MembershipPolicy::AllowOnFailure) => Ok(()),
        (MembershipGate::Unavailable, MembershipPolicy::BlockOnFailure) => {
            Err(RewardError::MembershipCheckUnavailable)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_allows_members() {
        assert!(gate_allows(MembershipGate::Allowed).is_ok());
    }

    #[test]
    fn test_gate_denies_non_members() {
        assert!(matches!(
            gate_allows(MembershipGate::Denied),
            Err(RewardError::NotGroupMember { .. })
        ));
    }

    #[test]
    fn test_unavailable_follows_the_policy() {
        let result = gate_allows(MembershipGate::Unavailable);
        match POLICY {
            MembershipPolicy::AllowOnFailure => assert!(result.is_ok()),
            MembershipPolicy::BlockOnFailure => {
                assert_eq!(result, Err(RewardError::MembershipCheckUnavailable));
            }
        }
    }
}

//! Static role/action authorization table.
//!
//! This is the one source of truth for "who may do what" — consulted twice:
//! once inside the intent parser adapter (to downgrade an LLM's over-eager
//! `is_safe: true`), and once inside the delegation authority as a hard,
//! non-bypassable gate before a delegation token is ever minted.

#![forbid(unsafe_code)]

use gate_proto::Action;

/// Roles permitted to perform each action. Declaration order matches
/// [`Action::ALL`].
const ROLE_ACTION_MAP: &[(Action, &[&str])] = &[
    (Action::Transfer, &["teller", "customer_service"]),
    (
        Action::CheckBalance,
        &["teller", "customer_service", "auditor"],
    ),
    (Action::PayBill, &["teller", "customer_service"]),
    (Action::ApproveLoan, &["loan_officer", "branch_manager"]),
    (Action::CreateAccount, &["teller", "branch_manager"]),
    (Action::AuditTransaction, &["auditor", "branch_manager"]),
    (Action::DeleteAccount, &["branch_manager"]),
    (
        Action::Informational,
        &[
            "teller",
            "customer_service",
            "auditor",
            "loan_officer",
            "branch_manager",
        ],
    ),
];

/// Roles required to perform `action`. Empty when the action isn't in the
/// map (which only ever happens for [`Action`] variants we forgot to wire up
/// here — the table is meant to be exhaustive over [`Action::ALL`]).
pub fn required_roles(action: Action) -> &'static [&'static str] {
    ROLE_ACTION_MAP
        .iter()
        .find(|(a, _)| *a == action)
        .map(|(_, roles)| *roles)
        .unwrap_or(&[])
}

/// Whether any of `operator_roles` satisfies the requirement for `action`.
///
/// An action absent from the map (there are none, by construction, but a raw
/// string that failed to parse into an [`Action`] upstream would look like
/// one) is never authorized.
pub fn authorize(action: Action, operator_roles: &[&str]) -> bool {
    required_roles(action)
        .iter()
        .any(|required| operator_roles.contains(required))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_exhaustive_over_all_actions() {
        for action in Action::ALL {
            assert!(
                !required_roles(action).is_empty(),
                "missing ROLE_ACTION_MAP entry for {action:?}"
            );
        }
    }

    #[test]
    fn test_teller_authorized_for_transfer() {
        assert!(authorize(Action::Transfer, &["teller"]));
    }

    #[test]
    fn test_teller_not_authorized_for_approve_loan() {
        assert!(!authorize(Action::ApproveLoan, &["teller"]));
    }

    #[test]
    fn test_branch_manager_authorized_for_delete_account() {
        assert!(authorize(Action::DeleteAccount, &["branch_manager"]));
        assert!(!authorize(Action::DeleteAccount, &["teller"]));
    }

    #[test]
    fn test_informational_open_to_all_known_roles() {
        for role in ["teller", "customer_service", "auditor", "loan_officer", "branch_manager"] {
            assert!(authorize(Action::Informational, &[role]));
        }
    }

    #[test]
    fn test_no_roles_never_authorized() {
        assert!(!authorize(Action::Transfer, &[]));
    }
}

//! Allowlist and user records must mirror each other.

use std::collections::HashMap;

use super::{CheckContext, Finding, InvariantCheck, Severity};

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct AllowlistWithoutUser;

impl InvariantCheck for AllowlistWithoutUser {
    fn id(&self) -> &'static str {
        "allowlist-without-user"
    }

    fn description(&self) -> &'static str {
        "Allowlisted email has no user record"
    }

    fn severity(&self) -> Severity {
        Severity::Warning
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        let users: HashMap<String, &str> = ctx
            .snapshot
            .users
            .iter()
            .map(|u| (normalize_email(&u.email), u.id.as_str()))
            .collect();
        ctx.snapshot
            .allowlist
            .iter()
            .filter(|a| !users.contains_key(&normalize_email(&a.email)))
            .map(|a| {
                self.finding(
                    format!("{} is allowlisted as {} but has never signed in", a.email, a.role),
                    vec![a.email.clone()],
                )
            })
            .collect()
    }
}

/// Users must be allowlisted, with the same role.
pub struct UserAccessDrift;

impl InvariantCheck for UserAccessDrift {
    fn id(&self) -> &'static str {
        "user-access-drift"
    }

    fn description(&self) -> &'static str {
        "User is not allowlisted or has a different role"
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Vec<Finding> {
        let allowlist: HashMap<String, &str> = ctx
            .snapshot
            .allowlist
            .iter()
            .map(|a| (normalize_email(&a.email), a.role.as_str()))
            .collect();

        ctx.snapshot
            .users
            .iter()
            .filter_map(|user| match allowlist.get(&normalize_email(&user.email)) {
                None => Some(self.finding(
                    format!("User {} ({}) is not allowlisted", user.email, user.id),
                    vec![user.id.clone(), user.email.clone()],
                )),
                Some(role) if !role.eq_ignore_ascii_case(&user.role) => Some(self.finding(
                    format!(
                        "User {} has role {} but allowlist says {}",
                        user.email, user.role, role
                    ),
                    vec![user.id.clone(), user.email.clone()],
                )),
                Some(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use crate::entities::{allowlist_entry, user_account};
    use chrono::Utc;

    fn allow(email: &str, role: &str) -> allowlist_entry::Model {
        allowlist_entry::Model {
            email: email.into(),
            role: role.into(),
            added_at: Utc::now(),
        }
    }

    fn user(id: &str, email: &str, role: &str) -> user_account::Model {
        user_account::Model {
            id: id.into(),
            email: email.into(),
            role: role.into(),
            display_name: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn access_drift_both_ways() {
        let mut snapshot = empty();
        snapshot.allowlist.push(allow("a@lab.org", "admin"));
        snapshot.allowlist.push(allow("b@lab.org", "med"));
        snapshot.allowlist.push(allow("c@lab.org", "bio"));
        snapshot.users.push(user("u1", "A@lab.org", "admin"));
        snapshot.users.push(user("u2", "b@lab.org", "owner"));
        snapshot.users.push(user("u3", "x@lab.org", "med"));

        let ctx = CheckContext {
            snapshot: &snapshot,
            now: Utc::now(),
            stale_pending_days: 7,
        };
        let missing = AllowlistWithoutUser.run(&ctx);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].entity_ids, vec!["c@lab.org"]);

        let drift = UserAccessDrift.run(&ctx);
        assert_eq!(drift.len(), 2);
        assert!(drift.iter().all(|f| f.severity == Severity::Critical));
    }
}

//! Writes against the backend and the refresh they trigger.
//!
//! A mutation is issued in two steps: [`MutationRefresher::begin`] reserves
//! its target (so the same transaction cannot be toggled twice while a
//! toggle is pending), and [`MutationRefresher::settle`] releases it and
//! reports which cache slots must refetch. A failed mutation refreshes
//! nothing.
use std::collections::HashSet;

use api_types::{
    rule::{Rule, RuleResponse},
    transaction::{Transaction, TransactionNew},
};
use uuid::Uuid;

use crate::{
    error::{ApiError, MutationError},
    query_key::QueryScope,
};

/// Slots refreshed after any successful write. Exclusion changes totals,
/// new transactions change every slot, and rules recategorize existing rows.
const REFRESHED: [QueryScope; 3] = [
    QueryScope::Transactions,
    QueryScope::Count,
    QueryScope::Categories,
];

#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
    SetExcluded { id: Uuid, excluded: bool },
    AddTransaction(TransactionNew),
    AddRule(Rule),
    UpdateRule(Rule),
}

impl Mutation {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SetExcluded { excluded: true, .. } => "exclude transaction",
            Self::SetExcluded { excluded: false, .. } => "include transaction",
            Self::AddTransaction(_) => "add transaction",
            Self::AddRule(_) => "add rule",
            Self::UpdateRule(_) => "update rule",
        }
    }

    fn target(&self) -> Option<Target> {
        match self {
            Self::SetExcluded { id, .. } => Some(Target::Transaction(*id)),
            Self::AddRule(rule) | Self::UpdateRule(rule) => {
                Some(Target::Rule(rule.merchant.clone()))
            }
            Self::AddTransaction(_) => None,
        }
    }
}

/// What the backend returned for a write.
#[derive(Clone, Debug, PartialEq)]
pub enum MutationOutput {
    Transaction(Transaction),
    Rule(RuleResponse),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum Target {
    Transaction(Uuid),
    Rule(String),
}

/// A reserved, not yet settled mutation.
#[derive(Debug)]
pub struct MutationTicket {
    mutation: Mutation,
    target: Option<Target>,
}

impl MutationTicket {
    pub fn mutation(&self) -> &Mutation {
        &self.mutation
    }
}

#[derive(Debug, Default)]
pub struct MutationRefresher {
    pending: HashSet<Target>,
}

impl MutationRefresher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the mutation's target. Fails if a write to the same
    /// transaction (or the same merchant's rule) is still pending.
    pub fn begin(&mut self, mutation: Mutation) -> Result<MutationTicket, MutationError> {
        let target = mutation.target();
        if let Some(target) = &target {
            if self.pending.contains(target) {
                tracing::info!(mutation = mutation.label(), "rejected: target busy");
                return Err(match target {
                    Target::Transaction(id) => MutationError::InFlight(*id),
                    Target::Rule(merchant) => MutationError::RuleInFlight(merchant.clone()),
                });
            }
            self.pending.insert(target.clone());
        }
        Ok(MutationTicket { mutation, target })
    }

    /// Releases the ticket. On success returns the output and the slots to
    /// refresh; on failure returns the error and nothing is refreshed.
    pub fn settle(
        &mut self,
        ticket: MutationTicket,
        result: Result<MutationOutput, ApiError>,
    ) -> Result<(MutationOutput, &'static [QueryScope]), MutationError> {
        if let Some(target) = &ticket.target {
            self.pending.remove(target);
        }
        match result {
            Ok(output) => {
                tracing::info!(mutation = ticket.mutation.label(), "mutation applied");
                Ok((output, &REFRESHED))
            }
            Err(err) => {
                tracing::warn!(mutation = ticket.mutation.label(), "mutation failed: {err}");
                Err(MutationError::Rejected(err))
            }
        }
    }

    pub fn is_pending(&self, id: Uuid) -> bool {
        self.pending.contains(&Target::Transaction(id))
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(merchant: &str) -> Rule {
        Rule {
            merchant: merchant.to_string(),
            category: "Food".to_string(),
            subcategory: "Groceries".to_string(),
        }
    }

    fn rule_output(merchant: &str) -> MutationOutput {
        MutationOutput::Rule(RuleResponse {
            merchant: merchant.to_string(),
            category: "Food".to_string(),
            subcategory: "Groceries".to_string(),
            success: true,
        })
    }

    #[test]
    fn overlapping_toggle_on_same_transaction_is_rejected() {
        let mut refresher = MutationRefresher::new();
        let id = Uuid::new_v4();
        let _first = refresher
            .begin(Mutation::SetExcluded { id, excluded: true })
            .unwrap();
        assert!(refresher.is_pending(id));
        assert_eq!(
            refresher
                .begin(Mutation::SetExcluded { id, excluded: false })
                .unwrap_err(),
            MutationError::InFlight(id)
        );

        // Other transactions are unaffected.
        let other = Uuid::new_v4();
        assert!(
            refresher
                .begin(Mutation::SetExcluded { id: other, excluded: true })
                .is_ok()
        );
    }

    #[test]
    fn settling_releases_the_target() {
        let mut refresher = MutationRefresher::new();
        let ticket = refresher.begin(Mutation::AddRule(rule("HI-LO"))).unwrap();
        assert!(refresher.begin(Mutation::UpdateRule(rule("HI-LO"))).is_err());

        let (_, scopes) = refresher.settle(ticket, Ok(rule_output("HI-LO"))).unwrap();
        assert_eq!(scopes.len(), 3);
        assert_eq!(refresher.pending_count(), 0);
        assert!(refresher.begin(Mutation::UpdateRule(rule("HI-LO"))).is_ok());
    }

    #[test]
    fn failure_refreshes_nothing_and_surfaces_error() {
        let mut refresher = MutationRefresher::new();
        let ticket = refresher.begin(Mutation::AddRule(rule("HI-LO"))).unwrap();
        let err = refresher
            .settle(ticket, Err(ApiError::Conflict("exists".to_string())))
            .unwrap_err();
        assert_eq!(
            err,
            MutationError::Rejected(ApiError::Conflict("exists".to_string()))
        );
        assert_eq!(refresher.pending_count(), 0);
    }
}

// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Apply locally, call storage, then confirm or compensate.
//!
//! Every mutation the grid makes goes through a [`Ledger`]: the local change
//! runs when the mutation begins, and exactly one of the two settle handlers
//! runs when the storage response arrives.

use anyhow::Error;
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

impl Ticket {
    pub const fn get(self) -> u64 {
        self.0
    }
}

type ConfirmFn<S, R> = Box<dyn FnOnce(&mut S, R)>;
type CompensateFn<S> = Box<dyn FnOnce(&mut S, &Error)>;

pub struct Optimistic<S, R> {
    label: &'static str,
    confirm: Option<ConfirmFn<S, R>>,
    compensate: Option<CompensateFn<S>>,
}

impl<S, R> Optimistic<S, R> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            confirm: None,
            compensate: None,
        }
    }

    pub fn on_confirm(mut self, handler: impl FnOnce(&mut S, R) + 'static) -> Self {
        self.confirm = Some(Box::new(handler));
        self
    }

    pub fn on_compensate(mut self, handler: impl FnOnce(&mut S, &Error) + 'static) -> Self {
        self.compensate = Some(Box::new(handler));
        self
    }

    pub const fn label(&self) -> &'static str {
        self.label
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    Confirmed(&'static str),
    Compensated(&'static str),
}

pub struct Ledger<S, R> {
    next_ticket: u64,
    in_flight: BTreeMap<Ticket, Optimistic<S, R>>,
}

impl<S, R> Default for Ledger<S, R> {
    fn default() -> Self {
        Self {
            next_ticket: 0,
            in_flight: BTreeMap::new(),
        }
    }
}

impl<S, R> Ledger<S, R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the local change now and remember how to settle it.
    pub fn begin(
        &mut self,
        state: &mut S,
        apply: impl FnOnce(&mut S),
        mutation: Optimistic<S, R>,
    ) -> Ticket {
        apply(state);
        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        debug!(ticket = ticket.get(), op = mutation.label, "mutation started");
        self.in_flight.insert(ticket, mutation);
        ticket
    }

    /// Resolve a ticket. Unknown tickets are ignored and return `None`.
    pub fn settle(
        &mut self,
        state: &mut S,
        ticket: Ticket,
        result: Result<R, Error>,
    ) -> Option<Settled> {
        let Some(mutation) = self.in_flight.remove(&ticket) else {
            debug!(ticket = ticket.get(), "settle for unknown ticket ignored");
            return None;
        };
        match result {
            Ok(response) => {
                if let Some(confirm) = mutation.confirm {
                    confirm(state, response);
                }
                Some(Settled::Confirmed(mutation.label))
            }
            Err(error) => {
                warn!(
                    op = mutation.label,
                    error = %format!("{error:#}"),
                    "persistence call failed"
                );
                if let Some(compensate) = mutation.compensate {
                    compensate(state, &error);
                }
                Some(Settled::Compensated(mutation.label))
            }
        }
    }

    pub fn label(&self, ticket: Ticket) -> Option<&'static str> {
        self.in_flight.get(&ticket).map(Optimistic::label)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }
}

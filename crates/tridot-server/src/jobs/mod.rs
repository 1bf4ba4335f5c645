// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Background jobs registered with the scheduler.

mod address_cooldown;
mod node_prune;
mod ticket_sweep;

pub use address_cooldown::AddressCooldownJob;
pub use node_prune::NodePruneJob;
pub use ticket_sweep::TicketSweepJob;

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Address plan for a region's IPv4 tunnel subnet.
//!
//! Host index 0 is the network address and index 1 the gateway held by the
//! region's node. Clients are numbered by *slot*: slot 0 is host index
//! [`FIRST_CLIENT_INDEX`], and the broadcast address is never handed out.

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use thiserror::Error;

pub const FIRST_CLIENT_INDEX: u32 = 2;

/// Smallest subnet that still leaves room for one client.
const MAX_PREFIX_LEN: u8 = 30;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IpError {
	#[error("subnet {0} is too small for client addresses")]
	SubnetTooSmall(Ipv4Net),

	#[error("slot {slot} is outside subnet {subnet}")]
	SlotOutOfRange { slot: u32, subnet: Ipv4Net },

	#[error("address {addr} is not a client address of {subnet}")]
	NotInPlan { addr: Ipv4Addr, subnet: Ipv4Net },

	#[error("invalid address: {0}")]
	Parse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPlan {
	subnet: Ipv4Net,
}

impl AddressPlan {
	pub fn new(subnet: Ipv4Net) -> Result<Self, IpError> {
		if subnet.prefix_len() > MAX_PREFIX_LEN {
			return Err(IpError::SubnetTooSmall(subnet));
		}
		Ok(Self {
			subnet: subnet.trunc(),
		})
	}

	pub fn subnet(&self) -> Ipv4Net {
		self.subnet
	}

	pub fn gateway(&self) -> Ipv4Addr {
		self.host(1)
	}

	/// Number of client slots.
	pub fn capacity(&self) -> u32 {
		let hosts = 1u64 << (32 - u32::from(self.subnet.prefix_len()));
		(hosts - u64::from(FIRST_CLIENT_INDEX) - 1) as u32
	}

	pub fn address(&self, slot: u32) -> Result<Ipv4Net, IpError> {
		if slot >= self.capacity() {
			return Err(IpError::SlotOutOfRange {
				slot,
				subnet: self.subnet,
			});
		}
		let addr = self.host(slot + FIRST_CLIENT_INDEX);
		Ipv4Net::new(addr, 32).map_err(|e| IpError::Parse(e.to_string()))
	}

	pub fn slot_of(&self, addr: Ipv4Addr) -> Result<u32, IpError> {
		let not_in_plan = || IpError::NotInPlan {
			addr,
			subnet: self.subnet,
		};
		if !self.subnet.contains(&addr) {
			return Err(not_in_plan());
		}
		let offset = u32::from(addr) - u32::from(self.subnet.network());
		let slot = offset.checked_sub(FIRST_CLIENT_INDEX).ok_or_else(not_in_plan)?;
		if slot >= self.capacity() {
			return Err(not_in_plan());
		}
		Ok(slot)
	}

	/// Accepts `10.20.0.2/32` or a bare `10.20.0.2`.
	pub fn parse_slot(&self, allowed_ips: &str) -> Result<u32, IpError> {
		let trimmed = allowed_ips.trim();
		let addr = match trimmed.parse::<Ipv4Net>() {
			Ok(net) if net.prefix_len() == 32 => net.addr(),
			Ok(_) => return Err(IpError::Parse(trimmed.to_string())),
			Err(_) => trimmed
				.parse::<Ipv4Addr>()
				.map_err(|_| IpError::Parse(trimmed.to_string()))?,
		};
		self.slot_of(addr)
	}

	fn host(&self, index: u32) -> Ipv4Addr {
		Ipv4Addr::from(u32::from(self.subnet.network()) + index)
	}
}

// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory address allocation per region.
//!
//! Each region keeps a bitmap of client slots from its [`AddressPlan`]. A slot
//! is marked used from the moment it is reserved until its cooldown after
//! revocation has elapsed. Reservations are RAII guards: dropping one without
//! [`AddressReservation::confirm`] hands the slot straight back, so an
//! abandoned peer creation never leaks an address.

use chrono::{DateTime, Duration, Utc};
use ipnet::Ipv4Net;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};
use tridot_server_db::AddressHolding;
use tridot_wg_common::AddressPlan;

use crate::error::{ProvisioningError, Result};

/// Slots tracked per region. Larger subnets only hand out their first hosts.
const MAX_TRACKED_SLOTS: u32 = 1 << 20;

struct Cooling {
	slot: u32,
	release_at: DateTime<Utc>,
}

struct RegionSlots {
	plan: AddressPlan,
	slots: u32,
	used: Vec<u64>,
	allocated: u32,
	cooling: VecDeque<Cooling>,
}

impl RegionSlots {
	fn new(plan: AddressPlan) -> Self {
		let slots = plan.capacity().min(MAX_TRACKED_SLOTS);
		Self {
			plan,
			slots,
			used: vec![0; slots.div_ceil(64) as usize],
			allocated: 0,
			cooling: VecDeque::new(),
		}
	}

	fn is_used(&self, slot: u32) -> bool {
		self.used[(slot / 64) as usize] & (1 << (slot % 64)) != 0
	}

	fn mark(&mut self, slot: u32) -> bool {
		if slot >= self.slots || self.is_used(slot) {
			return false;
		}
		self.used[(slot / 64) as usize] |= 1 << (slot % 64);
		self.allocated += 1;
		true
	}

	fn clear(&mut self, slot: u32) {
		if slot < self.slots && self.is_used(slot) {
			self.used[(slot / 64) as usize] &= !(1 << (slot % 64));
			self.allocated -= 1;
		}
	}

	/// Lowest free slot, so allocation order is deterministic.
	fn first_free(&self) -> Option<u32> {
		self.used.iter().enumerate().find_map(|(word_index, word)| {
			if *word == u64::MAX {
				return None;
			}
			let slot = word_index as u32 * 64 + word.trailing_ones();
			(slot < self.slots).then_some(slot)
		})
	}

	fn release_cooled(&mut self, now: DateTime<Utc>) -> usize {
		let mut released = 0;
		let mut remaining = VecDeque::with_capacity(self.cooling.len());
		while let Some(entry) = self.cooling.pop_front() {
			if entry.release_at <= now {
				self.clear(entry.slot);
				released += 1;
			} else {
				remaining.push_back(entry);
			}
		}
		self.cooling = remaining;
		released
	}
}

/// Occupancy of one region's address space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionAddressUsage {
	pub region: String,
	pub capacity: u32,
	pub allocated: u32,
	pub cooling: u32,
}

struct PoolInner {
	regions: HashMap<String, Mutex<RegionSlots>>,
	cooldown: Duration,
}

#[derive(Clone)]
pub struct AddressPool {
	inner: Arc<PoolInner>,
}

impl AddressPool {
	pub fn new<I>(plans: I, cooldown: std::time::Duration) -> Self
	where
		I: IntoIterator<Item = (String, AddressPlan)>,
	{
		let regions = plans
			.into_iter()
			.map(|(code, plan)| (code, Mutex::new(RegionSlots::new(plan))))
			.collect();
		Self {
			inner: Arc::new(PoolInner {
				regions,
				cooldown: Duration::from_std(cooldown).unwrap_or(Duration::zero()),
			}),
		}
	}

	/// Marks addresses already held in storage: live peers, plus revoked ones
	/// whose cooldown has not yet run out.
	#[instrument(skip(self, holdings), fields(count = holdings.len()))]
	pub fn restore(&self, holdings: &[AddressHolding]) {
		let mut restored = 0usize;
		for holding in holdings {
			let Some(region) = self.inner.regions.get(&holding.region) else {
				warn!(region = %holding.region, address = %holding.allowed_ips, "address held in unknown region");
				continue;
			};
			let mut slots = lock(region);
			let slot = match slots.plan.slot_of(holding.allowed_ips.addr()) {
				Ok(slot) if slot < slots.slots => slot,
				_ => {
					warn!(region = %holding.region, address = %holding.allowed_ips, "stored address outside region plan");
					continue;
				}
			};
			if !slots.mark(slot) {
				continue;
			}
			if let Some(revoked_at) = holding.revoked_at {
				slots.cooling.push_back(Cooling {
					slot,
					release_at: revoked_at + self.inner.cooldown,
				});
			}
			restored += 1;
		}
		info!(restored, "address pool restored from storage");
	}

	/// Takes the lowest free address in `region`. Cooled-down addresses are
	/// reclaimed first when the free list is empty.
	pub fn reserve(&self, region: &str) -> Result<AddressReservation> {
		let slots_lock = self
			.inner
			.regions
			.get(region)
			.ok_or_else(|| ProvisioningError::Validation(format!("unknown region {region}")))?;
		let mut slots = lock(slots_lock);

		let slot = match slots.first_free() {
			Some(slot) => slot,
			None => {
				slots.release_cooled(Utc::now());
				slots.first_free().ok_or_else(|| {
					ProvisioningError::Fatal(format!("address space exhausted in region {region}"))
				})?
			}
		};
		let address = slots.plan.address(slot)?;
		slots.mark(slot);
		debug!(region, %address, "address reserved");

		Ok(AddressReservation {
			pool: self.clone(),
			region: region.to_string(),
			slot,
			address,
			settled: false,
		})
	}

	/// Starts the cooldown for an address released by a revoked peer.
	pub fn retire(&self, region: &str, address: Ipv4Net, revoked_at: DateTime<Utc>) {
		let Some(slots_lock) = self.inner.regions.get(region) else {
			return;
		};
		let mut slots = lock(slots_lock);
		match slots.plan.slot_of(address.addr()) {
			Ok(slot) if slot < slots.slots => {
				slots.cooling.push_back(Cooling {
					slot,
					release_at: revoked_at + self.inner.cooldown,
				});
				debug!(region, %address, "address cooling down");
			}
			_ => warn!(region, %address, "retired address outside region plan"),
		}
	}

	/// Returns every address whose cooldown ended at or before `now`.
	pub fn release_cooled(&self, now: DateTime<Utc>) -> usize {
		self.inner
			.regions
			.values()
			.map(|slots| lock(slots).release_cooled(now))
			.sum()
	}

	pub fn usage(&self) -> Vec<RegionAddressUsage> {
		let mut usage: Vec<_> = self
			.inner
			.regions
			.iter()
			.map(|(code, slots)| {
				let slots = lock(slots);
				RegionAddressUsage {
					region: code.clone(),
					capacity: slots.slots,
					allocated: slots.allocated,
					cooling: slots.cooling.len() as u32,
				}
			})
			.collect();
		usage.sort_by(|a, b| a.region.cmp(&b.region));
		usage
	}

	pub fn is_reserved(&self, region: &str, address: Ipv4Net) -> bool {
		let Some(slots_lock) = self.inner.regions.get(region) else {
			return false;
		};
		let slots = lock(slots_lock);
		slots
			.plan
			.slot_of(address.addr())
			.map(|slot| slot < slots.slots && slots.is_used(slot))
			.unwrap_or(false)
	}

	fn give_back(&self, region: &str, slot: u32) {
		if let Some(slots_lock) = self.inner.regions.get(region) {
			lock(slots_lock).clear(slot);
		}
	}
}

fn lock(slots: &Mutex<RegionSlots>) -> MutexGuard<'_, RegionSlots> {
	slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// An address held for a peer that is not committed yet.
#[must_use = "dropping a reservation releases the address"]
pub struct AddressReservation {
	pool: AddressPool,
	region: String,
	slot: u32,
	address: Ipv4Net,
	settled: bool,
}

impl AddressReservation {
	pub fn address(&self) -> Ipv4Net {
		self.address
	}

	pub fn region(&self) -> &str {
		&self.region
	}

	/// The peer row is committed; the address now belongs to it.
	pub fn confirm(mut self) {
		self.settled = true;
	}

	/// Storage already holds this address for another peer. Keep the slot
	/// marked so it is not offered again.
	pub fn retain(mut self) {
		warn!(region = %self.region, address = %self.address, "address already taken in storage");
		self.settled = true;
	}
}

impl Drop for AddressReservation {
	fn drop(&mut self) {
		if !self.settled {
			self.pool.give_back(&self.region, self.slot);
			debug!(region = %self.region, address = %self.address, "address reservation released");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use std::collections::HashSet;

	fn pool(subnet: &str, cooldown_secs: u64) -> AddressPool {
		let plan = AddressPlan::new(subnet.parse().unwrap()).unwrap();
		AddressPool::new(
			[("EU-FRA".to_string(), plan)],
			std::time::Duration::from_secs(cooldown_secs),
		)
	}

	#[test]
	fn first_reservation_is_dot_two() {
		let pool = pool("10.20.0.0/16", 300);
		let reservation = pool.reserve("EU-FRA").unwrap();
		assert_eq!(reservation.address().to_string(), "10.20.0.2/32");
		reservation.confirm();
		let next = pool.reserve("EU-FRA").unwrap();
		assert_eq!(next.address().to_string(), "10.20.0.3/32");
	}

	#[test]
	fn dropped_reservation_returns_address() {
		let pool = pool("10.20.0.0/24", 300);
		{
			let reservation = pool.reserve("EU-FRA").unwrap();
			assert!(pool.is_reserved("EU-FRA", reservation.address()));
		}
		assert!(!pool.is_reserved("EU-FRA", "10.20.0.2/32".parse().unwrap()));
		assert_eq!(pool.usage()[0].allocated, 0);
		assert_eq!(
			pool.reserve("EU-FRA").unwrap().address().to_string(),
			"10.20.0.2/32"
		);
	}

	#[test]
	fn unknown_region_is_validation_error() {
		let pool = pool("10.20.0.0/24", 300);
		assert!(matches!(
			pool.reserve("US-NYC"),
			Err(ProvisioningError::Validation(_))
		));
	}

	#[test]
	fn exhaustion_is_fatal() {
		let pool = pool("10.20.0.0/30", 300);
		pool.reserve("EU-FRA").unwrap().confirm();
		assert!(matches!(
			pool.reserve("EU-FRA"),
			Err(ProvisioningError::Fatal(_))
		));
	}

	#[test]
	fn retired_address_waits_for_cooldown() {
		let pool = pool("10.20.0.0/30", 300);
		let reservation = pool.reserve("EU-FRA").unwrap();
		let address = reservation.address();
		reservation.confirm();

		let now = Utc::now();
		pool.retire("EU-FRA", address, now);
		assert!(pool.reserve("EU-FRA").is_err());
		assert_eq!(pool.release_cooled(now + Duration::seconds(299)), 0);
		assert!(pool.is_reserved("EU-FRA", address));

		assert_eq!(pool.release_cooled(now + Duration::seconds(300)), 1);
		assert_eq!(pool.reserve("EU-FRA").unwrap().address(), address);
	}

	#[test]
	fn reserve_reclaims_cooled_addresses_when_full() {
		let pool = pool("10.20.0.0/30", 0);
		let reservation = pool.reserve("EU-FRA").unwrap();
		let address = reservation.address();
		reservation.confirm();
		pool.retire("EU-FRA", address, Utc::now() - Duration::seconds(1));

		assert_eq!(pool.reserve("EU-FRA").unwrap().address(), address);
	}

	#[test]
	fn restore_marks_live_and_cooling_addresses() {
		let pool = pool("10.20.0.0/24", 300);
		pool.restore(&[
			AddressHolding {
				region: "EU-FRA".to_string(),
				allowed_ips: "10.20.0.2/32".parse().unwrap(),
				revoked_at: None,
			},
			AddressHolding {
				region: "EU-FRA".to_string(),
				allowed_ips: "10.20.0.3/32".parse().unwrap(),
				revoked_at: Some(Utc::now()),
			},
			AddressHolding {
				region: "TR-IST".to_string(),
				allowed_ips: "10.30.0.2/32".parse().unwrap(),
				revoked_at: None,
			},
		]);

		let usage = &pool.usage()[0];
		assert_eq!(usage.allocated, 2);
		assert_eq!(usage.cooling, 1);
		assert_eq!(
			pool.reserve("EU-FRA").unwrap().address().to_string(),
			"10.20.0.4/32"
		);
	}

	#[test]
	fn concurrent_reservations_are_distinct() {
		let pool = pool("10.20.0.0/24", 300);
		let handles: Vec<_> = (0..8)
			.map(|_| {
				let pool = pool.clone();
				std::thread::spawn(move || {
					(0..20)
						.map(|_| {
							let reservation = pool.reserve("EU-FRA").unwrap();
							let address = reservation.address();
							reservation.confirm();
							address
						})
						.collect::<Vec<_>>()
				})
			})
			.collect();

		let mut seen = HashSet::new();
		for handle in handles {
			for address in handle.join().unwrap() {
				assert!(seen.insert(address), "address {address} handed out twice");
			}
		}
		assert_eq!(seen.len(), 160);
	}

	proptest! {
		/// Live reservations never overlap, whatever mix of confirms and drops.
		#[test]
		fn live_reservations_never_overlap(ops in proptest::collection::vec(any::<bool>(), 1..200)) {
			let pool = pool("10.20.0.0/24", 300);
			let mut confirmed = HashSet::new();
			for keep in ops {
				let reservation = pool.reserve("EU-FRA").unwrap();
				let address = reservation.address();
				prop_assert!(!confirmed.contains(&address));
				if keep {
					reservation.confirm();
					confirmed.insert(address);
				}
			}
			prop_assert_eq!(pool.usage()[0].allocated as usize, confirmed.len());
		}
	}
}

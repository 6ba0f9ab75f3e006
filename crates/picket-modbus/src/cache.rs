// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Block-cache planning and population.
//!
//! The cache manager coalesces the register addresses used by the map into
//! contiguous ranges, one planning tree per slave and source kind. Ranges
//! long enough to be worth a bulk read are materialised as blocks when the
//! plan is sealed; at the start of every poll cycle each block is refilled
//! with at most [`MAX_MODBUS_BLOCK`]-sized reads. Short ranges stay
//! unplanned and fall back to per-point reads in the entity codec.

use std::collections::BTreeMap;

use crate::link::ModbusLink;
use crate::types::SourceKind;

/// Minimum range length (in registers) worth materialising as a block.
pub const CACHE_THRESHOLD: u16 = 5;

/// Maximum number of addresses fetched in a single Modbus request.
pub const MAX_MODBUS_BLOCK: u16 = 100;

// =============================================================================
// CacheManager
// =============================================================================

/// Plans and serves bulk reads for the register map.
///
/// Lifecycle: [`register_item`](Self::register_item) once per address while
/// the map is built, [`seal`](Self::seal) once the map is complete,
/// [`refresh`](Self::refresh) at the start of every poll cycle, then
/// [`is_cached`](Self::is_cached) / [`cached`](Self::cached) during decode.
#[derive(Debug, Default)]
pub struct CacheManager {
    slaves: BTreeMap<u8, SlavePlan>,
}

#[derive(Debug, Default)]
struct SlavePlan {
    kinds: BTreeMap<SourceKind, RegisterRanges>,
}

#[derive(Debug, Default)]
struct RegisterRanges {
    /// Disjoint, non-touching closed intervals, keyed by first address.
    ranges: BTreeMap<u16, u16>,
    /// Materialised blocks, keyed by first address.
    blocks: BTreeMap<u16, Block>,
}

#[derive(Debug)]
struct Block {
    first: u16,
    last: u16,
    valid: bool,
    data: BlockData,
}

#[derive(Debug)]
enum BlockData {
    Bits(Vec<bool>),
    Words(Vec<u16>),
}

impl CacheManager {
    /// Creates an empty cache manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one register address used by the map.
    pub fn register_item(&mut self, slave: u8, kind: SourceKind, addr: u16) {
        self.slaves
            .entry(slave)
            .or_default()
            .kinds
            .entry(kind)
            .or_default()
            .add_register(addr);
    }

    /// Materialises blocks for every range that meets [`CACHE_THRESHOLD`].
    ///
    /// Called once, after all registrations for a map are in.
    pub fn seal(&mut self) {
        for (&slave, plan) in &mut self.slaves {
            for (&kind, ranges) in &mut plan.kinds {
                ranges.seal(slave, kind);
            }
        }
    }

    /// Refills every block from the device.
    ///
    /// A block whose windows all complete becomes valid; a failed or short
    /// window leaves its block invalid and the refresh moves on to the next
    /// block.
    pub async fn refresh(&mut self, link: &mut dyn ModbusLink) {
        for (&slave, plan) in &mut self.slaves {
            link.select_slave(slave);
            for (&kind, ranges) in &mut plan.kinds {
                for block in ranges.blocks.values_mut() {
                    block.fill(link, slave, kind).await;
                }
            }
        }
    }

    /// Returns `true` when the address lies in a materialised block that is
    /// currently valid.
    pub fn is_cached(&self, slave: u8, kind: SourceKind, addr: u16) -> bool {
        self.kind_ranges(slave, kind)
            .is_some_and(|ranges| ranges.is_cached(addr))
    }

    /// Returns the cached word for the address, widening bits to 0/1.
    ///
    /// `None` when the address is not covered by a valid block.
    pub fn cached(&self, slave: u8, kind: SourceKind, addr: u16) -> Option<u16> {
        self.kind_ranges(slave, kind)?.cached(addr)
    }

    /// Returns the planned interval containing the address, if any.
    pub fn interval_containing(&self, slave: u8, kind: SourceKind, addr: u16) -> Option<(u16, u16)> {
        self.kind_ranges(slave, kind)?
            .ranges
            .iter()
            .find(|(&first, &last)| first <= addr && addr <= last)
            .map(|(&first, &last)| (first, last))
    }

    fn kind_ranges(&self, slave: u8, kind: SourceKind) -> Option<&RegisterRanges> {
        self.slaves.get(&slave)?.kinds.get(&kind)
    }
}

// =============================================================================
// RegisterRanges
// =============================================================================

impl RegisterRanges {
    /// Adds a register to the range set, keeping the intervals disjoint and
    /// non-touching.
    fn add_register(&mut self, register: u16) {
        // Already covered: two datapoints may share a register.
        if self
            .ranges
            .iter()
            .any(|(&first, &last)| first <= register && register <= last)
        {
            return;
        }

        let mut extended = false;

        // Extend the start of a range beginning at register + 1.
        if let Some(next) = register.checked_add(1) {
            if let Some(last) = self.ranges.remove(&next) {
                self.ranges.insert(register, last);
                tracing::debug!(first = register, last, "extended range at start");
                extended = true;
            }
        }

        // Otherwise extend the end of a range finishing at register - 1.
        if !extended {
            if let Some((&first, last)) = self
                .ranges
                .iter_mut()
                .find(|(_, last)| (**last).checked_add(1) == Some(register))
            {
                *last = register;
                tracing::debug!(first, last = register, "extended range at end");
                extended = true;
            }
        }

        if extended {
            // An extension can make two ranges touch; coalesce one pass.
            let firsts: Vec<u16> = self.ranges.keys().copied().collect();
            for first in firsts {
                let Some(&last) = self.ranges.get(&first) else {
                    continue;
                };
                if let Some(next) = last.checked_add(1) {
                    if let Some(&next_last) = self.ranges.get(&next) {
                        self.ranges.remove(&next);
                        self.ranges.insert(first, next_last);
                        tracing::debug!(first, last = next_last, "coalesced adjacent ranges");
                    }
                }
            }
        } else {
            self.ranges.insert(register, register);
            tracing::debug!(first = register, last = register, "added new range");
        }
    }

    fn seal(&mut self, slave: u8, kind: SourceKind) {
        for (&first, &last) in &self.ranges {
            let length = last - first + 1;
            if length >= CACHE_THRESHOLD {
                tracing::info!(
                    slave,
                    source = %kind,
                    first,
                    last,
                    "creating block cache"
                );
                self.blocks.insert(first, Block::new(first, last, kind));
            } else {
                tracing::info!(
                    slave,
                    source = %kind,
                    first,
                    last,
                    "range too small to cache"
                );
            }
        }
    }

    fn is_cached(&self, addr: u16) -> bool {
        for (&first, &last) in &self.ranges {
            if first <= addr && addr <= last {
                return self.blocks.get(&first).is_some_and(|block| block.valid);
            }
        }
        false
    }

    fn cached(&self, addr: u16) -> Option<u16> {
        for (&first, &last) in &self.ranges {
            if first <= addr && addr <= last {
                let block = self.blocks.get(&first)?;
                if !block.valid {
                    return None;
                }
                return Some(block.value_at(addr));
            }
        }
        None
    }
}

// =============================================================================
// Block
// =============================================================================

impl Block {
    fn new(first: u16, last: u16, kind: SourceKind) -> Self {
        let size = usize::from(last - first) + 1;
        let data = if kind.is_bit() {
            BlockData::Bits(vec![false; size])
        } else {
            BlockData::Words(vec![0; size])
        };
        Self {
            first,
            last,
            valid: false,
            data,
        }
    }

    fn value_at(&self, addr: u16) -> u16 {
        let index = usize::from(addr - self.first);
        match &self.data {
            BlockData::Bits(bits) => u16::from(bits[index]),
            BlockData::Words(words) => words[index],
        }
    }

    async fn fill(&mut self, link: &mut dyn ModbusLink, slave: u8, kind: SourceKind) {
        self.valid = false;

        let first = u32::from(self.first);
        let last = u32::from(self.last);
        let mut start = first;
        while start <= last {
            let count = (last - start + 1).min(u32::from(MAX_MODBUS_BLOCK)) as u16;
            let offset = (start - first) as usize;
            let addr = start as u16;

            match &mut self.data {
                BlockData::Bits(buf) => {
                    let result = if kind == SourceKind::Coil {
                        link.read_bits(addr, count).await
                    } else {
                        link.read_input_bits(addr, count).await
                    };
                    match result {
                        Ok(bits) if bits.len() == usize::from(count) => {
                            buf[offset..offset + bits.len()].copy_from_slice(&bits);
                        }
                        Ok(bits) => {
                            tracing::error!(
                                slave,
                                source = %kind,
                                addr,
                                count,
                                received = bits.len(),
                                "short read filling block cache"
                            );
                            return;
                        }
                        Err(e) => {
                            tracing::error!(
                                slave,
                                source = %kind,
                                addr,
                                count,
                                error = %e,
                                "failed to fill block cache"
                            );
                            return;
                        }
                    }
                }
                BlockData::Words(buf) => {
                    let result = if kind == SourceKind::HoldingRegister {
                        link.read_registers(addr, count).await
                    } else {
                        link.read_input_registers(addr, count).await
                    };
                    match result {
                        Ok(words) if words.len() == usize::from(count) => {
                            buf[offset..offset + words.len()].copy_from_slice(&words);
                        }
                        Ok(words) => {
                            tracing::error!(
                                slave,
                                source = %kind,
                                addr,
                                count,
                                received = words.len(),
                                "short read filling block cache"
                            );
                            return;
                        }
                        Err(e) => {
                            tracing::error!(
                                slave,
                                source = %kind,
                                addr,
                                count,
                                error = %e,
                                "failed to fill block cache"
                            );
                            return;
                        }
                    }
                }
            }

            start += u32::from(count);
        }

        self.valid = true;
    }
}

// =============================================================================
// Tests
// =============================================================================

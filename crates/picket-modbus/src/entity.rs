// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Entity read and write codecs.
//!
//! A [`ModbusEntity`] binds one map entry to its slave and source kind and
//! knows how to turn device words into a typed [`Datapoint`] and a setpoint
//! string back into device words.
//!
//! Reads consult the block cache first and fall back to single-point
//! transport reads. Composite values assemble one unsigned accumulator from
//! their word list (register `i` contributes bits `16·i .. 16·i+15`), then
//! apply byte/word swaps, float reinterpretation, and scaling in that order.

use picket_core::{Datapoint, Value};

use crate::cache::CacheManager;
use crate::error::{TransportError, TransportResult, WriteError};
use crate::link::ModbusLink;
use crate::types::{RegisterBinding, RegisterSpan, SourceKind};

const SWAP_BYTES_ODD: u64 = 0x00FF_00FF_00FF_00FF;
const SWAP_BYTES_EVEN: u64 = 0xFF00_FF00_FF00_FF00;
const SWAP_WORDS_ODD: u64 = 0x0000_FFFF_0000_FFFF;
const SWAP_WORDS_EVEN: u64 = 0xFFFF_0000_FFFF_0000;

// =============================================================================
// ModbusEntity
// =============================================================================

/// One pollable (and possibly writable) datapoint binding.
#[derive(Debug, Clone)]
pub struct ModbusEntity {
    slave: u8,
    kind: SourceKind,
    binding: RegisterBinding,
}

impl ModbusEntity {
    /// Creates an entity.
    pub fn new(slave: u8, kind: SourceKind, binding: RegisterBinding) -> Self {
        Self {
            slave,
            kind,
            binding,
        }
    }

    /// The slave this entity is addressed to.
    pub fn slave(&self) -> u8 {
        self.slave
    }

    /// The source kind.
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// The datapoint name.
    pub fn name(&self) -> &str {
        &self.binding.name
    }

    /// The asset grouping; empty selects the default asset.
    pub fn asset_name(&self) -> &str {
        &self.binding.asset_name
    }

    /// The register binding.
    pub fn binding(&self) -> &RegisterBinding {
        &self.binding
    }

    // =========================================================================
    // Read path
    // =========================================================================

    /// Reads and decodes the entity's current value.
    ///
    /// The destination slave must already be selected on the link.
    pub async fn read(
        &self,
        link: &mut dyn ModbusLink,
        cache: &CacheManager,
    ) -> TransportResult<Datapoint> {
        match self.kind {
            SourceKind::Coil | SourceKind::DiscreteInput => self.read_bit(link, cache).await,
            SourceKind::HoldingRegister | SourceKind::InputRegister => match &self.binding.span {
                RegisterSpan::Single(addr) => self.read_scalar(link, cache, *addr).await,
                RegisterSpan::Vector(registers) => self.read_composite(link, cache, registers).await,
            },
        }
    }

    async fn read_bit(
        &self,
        link: &mut dyn ModbusLink,
        cache: &CacheManager,
    ) -> TransportResult<Datapoint> {
        let addr = self.binding.span.first();
        let raw = match cache.cached(self.slave, self.kind, addr) {
            Some(value) => value,
            None => {
                let bits = if self.kind == SourceKind::Coil {
                    link.read_bits(addr, 1).await?
                } else {
                    link.read_input_bits(addr, 1).await?
                };
                let bit = bits.first().copied().ok_or(TransportError::ShortResponse {
                    expected: 1,
                    actual: 0,
                })?;
                u16::from(bit)
            }
        };
        Ok(Datapoint::new(
            &self.binding.name,
            Value::Integer(i64::from(raw)),
        ))
    }

    async fn read_scalar(
        &self,
        link: &mut dyn ModbusLink,
        cache: &CacheManager,
        addr: u16,
    ) -> TransportResult<Datapoint> {
        let word = match cache.cached(self.slave, self.kind, addr) {
            Some(value) => value,
            None => self.read_word(link, addr).await?,
        };
        let value = self.binding.offset + f64::from(word) * self.binding.scale;
        let value = self.binding.round(value, 8);
        Ok(Datapoint::new(&self.binding.name, Value::Float(value)))
    }

    async fn read_composite(
        &self,
        link: &mut dyn ModbusLink,
        cache: &CacheManager,
        registers: &[u16],
    ) -> TransportResult<Datapoint> {
        let mut raw: u64 = 0;
        for (i, &register) in registers.iter().enumerate() {
            let word = match cache.cached(self.slave, self.kind, register) {
                Some(value) => value,
                None => self.read_word(link, register).await?,
            };
            raw |= u64::from(word) << (16 * i);
        }

        let composite = apply_swaps(raw, &self.binding);

        let value = if self.binding.flags.float {
            let f = f32::from_bits((composite & 0xFFFF_FFFF) as u32);
            self.binding.offset + f64::from(f) * self.binding.scale
        } else {
            let scaled = self.binding.offset + (composite as f64) * self.binding.scale;
            self.binding.round(scaled, 16)
        };
        Ok(Datapoint::new(&self.binding.name, Value::Float(value)))
    }

    async fn read_word(&self, link: &mut dyn ModbusLink, addr: u16) -> TransportResult<u16> {
        let words = if self.kind == SourceKind::HoldingRegister {
            link.read_registers(addr, 1).await?
        } else {
            link.read_input_registers(addr, 1).await?
        };
        words.first().copied().ok_or(TransportError::ShortResponse {
            expected: 1,
            actual: 0,
        })
    }

    // =========================================================================
    // Write path
    // =========================================================================

    /// Packs a setpoint value string into registers and delivers it.
    ///
    /// The destination slave must already be selected on the link.
    pub async fn write(&self, link: &mut dyn ModbusLink, value: &str) -> Result<(), WriteError> {
        match self.kind {
            SourceKind::DiscreteInput | SourceKind::InputRegister => {
                Err(WriteError::NotWritable(self.binding.name.clone()))
            }
            SourceKind::Coil => {
                let parsed: i64 = value.trim().parse().map_err(|_| self.bad_value(value, "expected an integer"))?;
                link.write_bit(self.binding.span.first(), parsed != 0)
                    .await?;
                Ok(())
            }
            SourceKind::HoldingRegister => {
                let parsed: f64 = value.trim().parse().map_err(|_| self.bad_value(value, "expected a number"))?;
                if self.binding.scale == 0.0 {
                    return Err(self.bad_value(value, "scale is zero"));
                }
                let raw = (parsed - self.binding.offset) / self.binding.scale;

                match &self.binding.span {
                    RegisterSpan::Single(addr) => {
                        let word = (raw.round() as i64 as u64 & 0xFFFF) as u16;
                        link.write_register(*addr, word).await?;
                        Ok(())
                    }
                    RegisterSpan::Vector(registers) => {
                        self.write_composite(link, registers, raw).await
                    }
                }
            }
        }
    }

    async fn write_composite(
        &self,
        link: &mut dyn ModbusLink,
        registers: &[u16],
        raw: f64,
    ) -> Result<(), WriteError> {
        let encoded: u64 = if self.binding.flags.float {
            u64::from((raw as f32).to_bits())
        } else {
            raw.round() as i64 as u64
        };

        // The swaps are self-inverse, so packing applies the same transform
        // as decoding.
        let composite = apply_swaps(encoded, &self.binding);

        let words: Vec<u16> = (0..registers.len())
            .map(|i| ((composite >> (16 * i)) & 0xFFFF) as u16)
            .collect();

        if is_ascending(registers) {
            link.write_registers(registers[0], &words).await?;
        } else if is_descending(registers) {
            let mut register_order = words.clone();
            register_order.reverse();
            link.write_registers(registers[registers.len() - 1], &register_order)
                .await?;
        } else {
            for (i, &register) in registers.iter().enumerate() {
                link.write_register(register, words[i]).await?;
            }
        }
        Ok(())
    }

    fn bad_value(&self, value: &str, reason: &str) -> WriteError {
        WriteError::BadValue {
            name: self.binding.name.clone(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

// =============================================================================
// Bit manipulation
// =============================================================================

fn apply_swaps(mut value: u64, binding: &RegisterBinding) -> u64 {
    if binding.flags.swap_bytes {
        value = ((value & SWAP_BYTES_ODD) << 8) | ((value & SWAP_BYTES_EVEN) >> 8);
    }
    if binding.flags.swap_words {
        value = ((value & SWAP_WORDS_ODD) << 16) | ((value & SWAP_WORDS_EVEN) >> 16);
    }
    value
}

fn is_ascending(registers: &[u16]) -> bool {
    registers
        .windows(2)
        .all(|pair| pair[0].checked_add(1) == Some(pair[1]))
}

fn is_descending(registers: &[u16]) -> bool {
    registers
        .windows(2)
        .all(|pair| pair[1].checked_add(1) == Some(pair[0]))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testlink::{MockLink, WriteOp};
    use crate::types::ItemFlags;

    fn entity(kind: SourceKind, binding: RegisterBinding) -> ModbusEntity {
        ModbusEntity::new(1, kind, binding)
    }

    fn float_value(dp: &Datapoint) -> f64 {
        match dp.value {
            Value::Float(v) => v,
            Value::Integer(v) => v as f64,
        }
    }

    #[tokio::test]
    async fn test_scalar_register_scaling() {
        let mut link = MockLink::new();
        link.connect().await.unwrap();
        link.select_slave(1);
        link.set_holding(1, 100, 234);

        let cache = CacheManager::new();
        let temp = entity(
            SourceKind::HoldingRegister,
            RegisterBinding::new("", "temp", RegisterSpan::Single(100)).with_scaling(0.1, 0.0),
        );

        let dp = temp.read(&mut link, &cache).await.unwrap();
        assert_eq!(dp.name, "temp");
        assert_eq!(float_value(&dp), 23.4);
    }

    #[tokio::test]
    async fn test_bit_entities_produce_integers() {
        let mut link = MockLink::new();
        link.connect().await.unwrap();
        link.select_slave(1);
        link.set_coil(1, 5, true);

        let cache = CacheManager::new();
        let running = entity(
            SourceKind::Coil,
            RegisterBinding::new("", "running", RegisterSpan::Single(5)),
        );
        let stopped = entity(
            SourceKind::DiscreteInput,
            RegisterBinding::new("", "stopped", RegisterSpan::Single(5)),
        );

        assert_eq!(
            running.read(&mut link, &cache).await.unwrap().value,
            Value::Integer(1)
        );
        assert_eq!(
            stopped.read(&mut link, &cache).await.unwrap().value,
            Value::Integer(0)
        );
    }

    #[tokio::test]
    async fn test_composite_float_with_word_swap() {
        let mut link = MockLink::new();
        link.connect().await.unwrap();
        link.select_slave(2);
        link.set_holding(2, 40, 0x4048);
        link.set_holding(2, 41, 0xF5C3);

        let cache = CacheManager::new();
        let binding = RegisterBinding::new("", "power", RegisterSpan::Vector(vec![40, 41]))
            .with_flags(ItemFlags {
                float: true,
                swap_bytes: false,
                swap_words: true,
            });
        let power = ModbusEntity::new(2, SourceKind::HoldingRegister, binding);

        // Composite is 0xF5C34048; the word swap makes it 0x4048F5C3,
        // which as binary32 is 3.1400001.
        let dp = power.read(&mut link, &cache).await.unwrap();
        assert!((float_value(&dp) - 3.14).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_composite_integer_uses_16_bit_rounding() {
        let mut link = MockLink::new();
        link.connect().await.unwrap();
        link.select_slave(1);
        link.set_holding(1, 10, 0x5678);
        link.set_holding(1, 11, 0x1234);

        let cache = CacheManager::new();
        let wide = entity(
            SourceKind::HoldingRegister,
            RegisterBinding::new("", "wide", RegisterSpan::Vector(vec![10, 11])),
        );

        let dp = wide.read(&mut link, &cache).await.unwrap();
        assert_eq!(float_value(&dp), f64::from(0x1234_5678u32));
    }

    #[test]
    fn test_swap_idempotence() {
        let swap_bytes = RegisterBinding::new("", "x", RegisterSpan::Vector(vec![0, 1]))
            .with_flags(ItemFlags {
                float: false,
                swap_bytes: true,
                swap_words: false,
            });
        let swap_words = RegisterBinding::new("", "x", RegisterSpan::Vector(vec![0, 1]))
            .with_flags(ItemFlags {
                float: false,
                swap_bytes: false,
                swap_words: true,
            });

        for value in [0u64, 0x1234_5678, 0xDEAD_BEEF_CAFE_F00D, u64::MAX] {
            assert_eq!(
                apply_swaps(apply_swaps(value, &swap_bytes), &swap_bytes),
                value
            );
            assert_eq!(
                apply_swaps(apply_swaps(value, &swap_words), &swap_words),
                value
            );
        }
    }

    #[tokio::test]
    async fn test_composite_fails_when_any_word_fails() {
        let mut link = MockLink::new();
        link.connect().await.unwrap();
        link.select_slave(1);
        link.set_holding(1, 10, 1);
        link.set_holding(1, 11, 2);
        link.fail_reads(2, std::io::ErrorKind::TimedOut);

        let cache = CacheManager::new();
        let wide = entity(
            SourceKind::HoldingRegister,
            RegisterBinding::new("", "wide", RegisterSpan::Vector(vec![10, 11])),
        );

        assert!(wide.read(&mut link, &cache).await.is_err());
    }

    #[tokio::test]
    async fn test_reads_prefer_the_cache() {
        let mut link = MockLink::new();
        link.connect().await.unwrap();
        link.select_slave(1);
        for addr in 100..=104 {
            link.set_holding(1, addr, 500);
        }

        let mut cache = CacheManager::new();
        for addr in 100..=104 {
            cache.register_item(1, SourceKind::HoldingRegister, addr);
        }
        cache.seal();
        cache.refresh(&mut link).await;
        let refresh_reads = link.read_log().len();

        let point = entity(
            SourceKind::HoldingRegister,
            RegisterBinding::new("", "p", RegisterSpan::Single(102)),
        );
        let dp = point.read(&mut link, &cache).await.unwrap();
        assert_eq!(float_value(&dp), 500.0);
        // No further transport reads: the cache served the value.
        assert_eq!(link.read_log().len(), refresh_reads);
    }

    #[tokio::test]
    async fn test_round_trip_scalar_write_then_read() {
        let mut link = MockLink::new();
        link.connect().await.unwrap();
        link.select_slave(1);

        let cache = CacheManager::new();
        let setpoint = entity(
            SourceKind::HoldingRegister,
            RegisterBinding::new("", "setpoint", RegisterSpan::Single(7)).with_scaling(0.5, 10.0),
        );

        // 133.0 -> (133 - 10) / 0.5 = 246
        setpoint.write(&mut link, "133.0").await.unwrap();
        assert_eq!(link.writes(), &[WriteOp::Register(1, 7, 246)]);

        let dp = setpoint.read(&mut link, &cache).await.unwrap();
        assert_eq!(float_value(&dp), 133.0);
    }

    #[tokio::test]
    async fn test_coil_write_parses_integers() {
        let mut link = MockLink::new();
        link.connect().await.unwrap();
        link.select_slave(1);

        let pump = entity(
            SourceKind::Coil,
            RegisterBinding::new("", "pump", RegisterSpan::Single(3)),
        );
        pump.write(&mut link, "1").await.unwrap();
        pump.write(&mut link, "0").await.unwrap();
        assert_eq!(
            link.writes(),
            &[WriteOp::Bit(1, 3, true), WriteOp::Bit(1, 3, false)]
        );

        assert!(matches!(
            pump.write(&mut link, "on").await,
            Err(WriteError::BadValue { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_only_kinds_refuse_writes() {
        let mut link = MockLink::new();
        link.connect().await.unwrap();

        for kind in [SourceKind::DiscreteInput, SourceKind::InputRegister] {
            let ro = entity(kind, RegisterBinding::new("", "ro", RegisterSpan::Single(0)));
            assert!(matches!(
                ro.write(&mut link, "1").await,
                Err(WriteError::NotWritable(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_ascending_composite_writes_one_block() {
        let mut link = MockLink::new();
        link.connect().await.unwrap();
        link.select_slave(1);

        let binding = RegisterBinding::new("", "wide", RegisterSpan::Vector(vec![40, 41]));
        let wide = entity(SourceKind::HoldingRegister, binding);
        wide.write(&mut link, "305419896").await.unwrap(); // 0x12345678

        assert_eq!(
            link.writes(),
            &[WriteOp::Registers(1, 40, vec![0x5678, 0x1234])]
        );
    }

    #[tokio::test]
    async fn test_descending_composite_writes_in_register_order() {
        let mut link = MockLink::new();
        link.connect().await.unwrap();
        link.select_slave(1);

        let binding =
            RegisterBinding::new("", "wide", RegisterSpan::Vector(vec![43, 42, 41, 40]));
        let wide = entity(SourceKind::HoldingRegister, binding);
        // words w0..w3 are 0x0001, 0x0000, 0x0000, 0x0000 for value 1
        wide.write(&mut link, "1").await.unwrap();

        // One bulk write starting at register 40 with w3..w0.
        assert_eq!(
            link.writes(),
            &[WriteOp::Registers(1, 40, vec![0, 0, 0, 1])]
        );
    }

    #[tokio::test]
    async fn test_scattered_composite_writes_each_register() {
        let mut link = MockLink::new();
        link.connect().await.unwrap();
        link.select_slave(1);

        let binding = RegisterBinding::new("", "wide", RegisterSpan::Vector(vec![10, 20]));
        let wide = entity(SourceKind::HoldingRegister, binding);
        wide.write(&mut link, "305419896").await.unwrap(); // 0x12345678

        assert_eq!(
            link.writes(),
            &[
                WriteOp::Register(1, 10, 0x5678),
                WriteOp::Register(1, 20, 0x1234)
            ]
        );
    }

    #[tokio::test]
    async fn test_float_composite_write_encodes_ieee754() {
        let mut link = MockLink::new();
        link.connect().await.unwrap();
        link.select_slave(1);

        let binding = RegisterBinding::new("", "power", RegisterSpan::Vector(vec![40, 41]))
            .with_flags(ItemFlags {
                float: true,
                swap_bytes: false,
                swap_words: false,
            });
        let power = entity(SourceKind::HoldingRegister, binding);
        power.write(&mut link, "3.14").await.unwrap();

        // 3.14f32 is 0x4048F5C3; register i carries bits 16i..16i+15.
        assert_eq!(
            link.writes(),
            &[WriteOp::Registers(1, 40, vec![0xF5C3, 0x4048])]
        );
    }

    #[tokio::test]
    async fn test_zero_scale_write_is_rejected() {
        let mut link = MockLink::new();
        link.connect().await.unwrap();

        let bad = entity(
            SourceKind::HoldingRegister,
            RegisterBinding::new("", "bad", RegisterSpan::Single(0)).with_scaling(0.0, 0.0),
        );
        assert!(matches!(
            bad.write(&mut link, "5").await,
            Err(WriteError::BadValue { .. })
        ));
    }
}

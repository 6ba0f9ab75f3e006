// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The declarative register map builder.
//!
//! Two map formats are accepted in one document:
//!
//! - the current `values` array, where each item names a datapoint and binds
//!   exactly one of `coil` / `input` / `register` / `inputRegister`
//! - the legacy top-level `coils` / `inputs` / `registers` /
//!   `inputRegisters` objects of `name → address` pairs
//!
//! Item-level problems (missing name, wrong-typed fields, zero or multiple
//! sources) are logged and counted and the item is dropped; the rest of the
//! document still builds. Only an unparsable document is fatal.

use picket_core::ConfigError;
use serde_json::Value as JsonValue;

use crate::types::{ItemFlags, RegisterBinding, RegisterSpan, SourceKind};

// =============================================================================
// MapItem
// =============================================================================

/// One fully parsed map entry, ready to become an entity.
#[derive(Debug, Clone)]
pub struct MapItem {
    /// Source kind the entry binds to.
    pub kind: SourceKind,
    /// Destination slave.
    pub slave: u8,
    /// The register binding.
    pub binding: RegisterBinding,
}

/// The result of building a map document.
#[derive(Debug, Default)]
pub struct ParsedMap {
    /// Items that parsed cleanly, in document order.
    pub items: Vec<MapItem>,
    /// Number of item-level errors encountered.
    pub errors: usize,
}

// =============================================================================
// parse_map
// =============================================================================

/// Parses a register map document.
///
/// `default_slave` binds entries that carry no `slave` of their own.
pub fn parse_map(text: &str, default_slave: u8) -> Result<ParsedMap, ConfigError> {
    let doc: JsonValue = serde_json::from_str(text)
        .map_err(|e| ConfigError::invalid("map", format!("map is not valid JSON: {e}")))?;

    let mut map = ParsedMap::default();

    if let Some(values) = doc.get("values").and_then(JsonValue::as_array) {
        for entry in values {
            parse_value_entry(entry, default_slave, &mut map);
        }
    }

    const LEGACY_SECTIONS: [(&str, SourceKind); 4] = [
        ("coils", SourceKind::Coil),
        ("inputs", SourceKind::DiscreteInput),
        ("registers", SourceKind::HoldingRegister),
        ("inputRegisters", SourceKind::InputRegister),
    ];
    for (section, kind) in LEGACY_SECTIONS {
        if let Some(object) = doc.get(section).and_then(JsonValue::as_object) {
            for (name, address) in object {
                match register_address(address) {
                    Some(addr) => map.items.push(MapItem {
                        kind,
                        slave: default_slave,
                        binding: RegisterBinding::new("", name, RegisterSpan::Single(addr)),
                    }),
                    None => {
                        tracing::error!(
                            section,
                            name,
                            "legacy map entry must be a register number"
                        );
                        map.errors += 1;
                    }
                }
            }
        }
    }

    if map.errors > 0 {
        tracing::error!(errors = map.errors, "errors encountered in the modbus map");
    }

    Ok(map)
}

/// Parses one item of the current `values` array.
fn parse_value_entry(entry: &JsonValue, default_slave: u8, map: &mut ParsedMap) {
    let name = match entry.get("name") {
        Some(JsonValue::String(name)) => name.clone(),
        Some(_) => {
            tracing::error!("the value of name in the modbus map should be a string");
            map.errors += 1;
            return;
        }
        None => {
            tracing::error!("each item in the modbus map must have a name property");
            map.errors += 1;
            return;
        }
    };

    let mut slave = default_slave;
    if let Some(value) = entry.get("slave") {
        match value.as_i64() {
            Some(id) if (1..=247).contains(&id) => slave = id as u8,
            Some(id) => {
                tracing::error!(name = %name, slave = id, "slave ID must be in 1..=247");
                map.errors += 1;
                return;
            }
            None => {
                tracing::error!(name = %name, "the value of slave in the modbus map should be an integer");
                map.errors += 1;
            }
        }
    }

    let mut asset_name = String::new();
    if let Some(value) = entry.get("assetName") {
        match value.as_str() {
            Some(asset) => asset_name = asset.to_string(),
            None => {
                tracing::error!(name = %name, "the value of assetName in the modbus map should be a string");
                map.errors += 1;
            }
        }
    }

    let mut scale = 1.0;
    if let Some(value) = entry.get("scale") {
        match value.as_f64() {
            Some(s) => scale = s,
            None => {
                tracing::error!(name = %name, "the value of scale in the modbus map should be a number");
                map.errors += 1;
            }
        }
    }

    let mut offset = 0.0;
    if let Some(value) = entry.get("offset") {
        match value.as_f64() {
            Some(o) => offset = o,
            None => {
                tracing::error!(name = %name, "the value of offset in the modbus map should be a number");
                map.errors += 1;
            }
        }
    }

    let mut flags = ItemFlags::default();
    if let Some(value) = entry.get("type") {
        match value.as_str() {
            Some("float") => flags.float = true,
            Some(_) => {}
            None => {
                tracing::error!(name = %name, "the type property must be a string");
                map.errors += 1;
            }
        }
    }
    if let Some(value) = entry.get("swap") {
        match value.as_str() {
            Some(swap) => match ItemFlags::from_swap(swap) {
                Some(swap_flags) => flags.merge(swap_flags),
                None => {
                    tracing::error!(name = %name, swap, "the swap property must be one of bytes, words or both");
                    map.errors += 1;
                }
            },
            None => {
                tracing::error!(name = %name, "the swap property must be a string");
                map.errors += 1;
            }
        }
    }

    // Exactly one source field selects the kind; collect candidates first so
    // the whole record exists before the entity is built.
    let mut sources: Vec<(SourceKind, RegisterSpan)> = Vec::new();
    let mut source_errors = 0usize;

    if let Some(value) = entry.get("coil") {
        match register_address(value) {
            Some(addr) => sources.push((SourceKind::Coil, RegisterSpan::Single(addr))),
            None => {
                tracing::error!(name = %name, "the value of coil in the modbus map should be a number");
                source_errors += 1;
            }
        }
    }
    if let Some(value) = entry.get("input") {
        match register_address(value) {
            Some(addr) => sources.push((SourceKind::DiscreteInput, RegisterSpan::Single(addr))),
            None => {
                tracing::error!(name = %name, "the value of input in the modbus map should be an integer");
                source_errors += 1;
            }
        }
    }
    for (field, kind) in [
        ("register", SourceKind::HoldingRegister),
        ("inputRegister", SourceKind::InputRegister),
    ] {
        if let Some(value) = entry.get(field) {
            match register_span(value) {
                Some(span) => sources.push((kind, span)),
                None => {
                    tracing::error!(
                        name = %name,
                        field,
                        "the register value must be an integer or an array of integers"
                    );
                    source_errors += 1;
                }
            }
        }
    }

    if source_errors > 0 {
        map.errors += source_errors;
        return;
    }

    let (kind, span) = match sources.len() {
        1 => sources.remove(0),
        0 => {
            tracing::error!(
                name = %name,
                "map entry must have one of coil, input, register or inputRegister"
            );
            map.errors += 1;
            return;
        }
        _ => {
            tracing::error!(
                name = %name,
                "map entry must have only one of coil, input, register or inputRegister"
            );
            map.errors += 1;
            return;
        }
    };

    // Float decode needs exactly two registers of composite width.
    if flags.float && span.width() != 2 {
        tracing::error!(
            name = %name,
            width = span.width(),
            "float type requires a two register composite"
        );
        map.errors += 1;
        return;
    }

    map.items.push(MapItem {
        kind,
        slave,
        binding: RegisterBinding::new(asset_name, name, span)
            .with_scaling(scale, offset)
            .with_flags(flags),
    });
}

/// Parses a register address, rejecting anything outside the 16-bit space.
fn register_address(value: &JsonValue) -> Option<u16> {
    let addr = value.as_u64()?;
    u16::try_from(addr).ok()
}

/// Parses a scalar register number or an array of them.
fn register_span(value: &JsonValue) -> Option<RegisterSpan> {
    if let Some(addr) = register_address(value) {
        return Some(RegisterSpan::Single(addr));
    }
    let array = value.as_array()?;
    let mut registers = Vec::with_capacity(array.len());
    for element in array {
        registers.push(register_address(element)?);
    }
    if registers.is_empty() {
        return None;
    }
    Some(RegisterSpan::Vector(registers))
}

// =============================================================================
// Tests
// =============================================================================

//! Disk I/O properties.

use std::collections::BTreeMap;

use stein_common::value::{format_uint_map, parse_size, parse_uint_map};
use stein_common::{SteinError, SteinResult};

use crate::cgroup::Controllers;
use crate::container::Prop;
use crate::host::Host;

use super::{PropCtx, Property, Registry};

/// Parse an I/O limit map; a bare value without `:` is shorthand for the
/// filesystem-wide `fs` key.
fn parse_io_map(value: &str) -> SteinResult<BTreeMap<String, u64>> {
    let trimmed = value.trim();
    if !trimmed.is_empty() && !trimmed.contains(':') {
        let mut map = BTreeMap::new();
        map.insert("fs".to_string(), parse_size(trimmed)?);
        return Ok(map);
    }
    parse_uint_map(value)
}

/// `fs` entries throttle through the memory controller, per-disk entries
/// through blkio.
fn want_io_controllers(ctx: &mut PropCtx, map: &BTreeMap<String, u64>) -> SteinResult<()> {
    let mut mask = Controllers::empty();
    for key in map.keys() {
        if key == "fs" {
            mask |= Controllers::MEMORY;
        } else {
            mask |= Controllers::BLKIO;
        }
    }
    if !mask.is_empty() {
        ctx.want_controllers(mask)?;
    }
    Ok(())
}

fn io_supported(host: &Host) -> bool {
    host.subsystem(Controllers::MEMORY)
        .is_some_and(|s| s.supports_io_limit())
        || host
            .subsystem(Controllers::BLKIO)
            .is_some_and(|s| s.supported())
}

struct IoPolicy;
static IO_POLICY: IoPolicy = IoPolicy;

impl Property for IoPolicy {
    fn name(&self) -> &'static str {
        "io_policy"
    }
    fn desc(&self) -> &'static str {
        "IO policy: normal, batch (dynamic)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::IoPolicy)
    }
    fn supported(&self, host: &Host) -> bool {
        host.subsystem(Controllers::BLKIO)
            .is_some_and(|s| s.supported())
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(ctx.ct.io_policy.clone())
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive()?;
        if value != "normal" && value != "batch" {
            return Err(SteinError::invalid_value(format!("Invalid policy: {value}")));
        }
        ctx.want_controllers(Controllers::BLKIO)?;
        ctx.ct.io_policy = value.to_string();
        ctx.ct.set_prop(Prop::IoPolicy);
        Ok(())
    }
}

struct IoBpsLimit;
static IO_BPS_LIMIT: IoBpsLimit = IoBpsLimit;

impl Property for IoBpsLimit {
    fn name(&self) -> &'static str {
        "io_bps_limit"
    }
    fn desc(&self) -> &'static str {
        "Disk bandwidth limit: fs|<path>|<disk> [r|w]: <bytes/s>;... (dynamic)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::IoBpsLimit)
    }
    fn indexable(&self) -> bool {
        true
    }
    fn supported(&self, host: &Host) -> bool {
        io_supported(host)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(format_uint_map(&ctx.ct.io_bps_limit))
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive()?;
        let map = parse_io_map(value)?;
        want_io_controllers(ctx, &map)?;
        ctx.ct.io_bps_limit = map;
        ctx.ct.set_prop(Prop::IoBpsLimit);
        Ok(())
    }
    fn get_indexed(&self, ctx: &mut PropCtx, index: &str) -> SteinResult<String> {
        ctx.ct
            .io_bps_limit
            .get(index)
            .map(u64::to_string)
            .ok_or_else(|| SteinError::invalid_value(format!("invalid index {index}")))
    }
    fn set_indexed(&self, ctx: &mut PropCtx, index: &str, value: &str) -> SteinResult<()> {
        ctx.alive()?;
        let limit = parse_size(value)
            .map_err(|_| SteinError::invalid_value(format!("Invalid value {value}")))?;
        let mut map = ctx.ct.io_bps_limit.clone();
        map.insert(index.to_string(), limit);
        want_io_controllers(ctx, &map)?;
        ctx.ct.io_bps_limit = map;
        ctx.ct.set_prop(Prop::IoBpsLimit);
        Ok(())
    }
}

struct IoOpsLimit;
static IO_OPS_LIMIT: IoOpsLimit = IoOpsLimit;

impl Property for IoOpsLimit {
    fn name(&self) -> &'static str {
        "io_ops_limit"
    }
    fn desc(&self) -> &'static str {
        "Disk IOPS limit: fs|<path>|<disk> [r|w]: <ops/s>;... (dynamic)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::IoOpsLimit)
    }
    fn indexable(&self) -> bool {
        true
    }
    fn supported(&self, host: &Host) -> bool {
        io_supported(host)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(format_uint_map(&ctx.ct.io_ops_limit))
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive()?;
        let map = parse_io_map(value)?;
        want_io_controllers(ctx, &map)?;
        ctx.ct.io_ops_limit = map;
        ctx.ct.set_prop(Prop::IoOpsLimit);
        Ok(())
    }
    fn get_indexed(&self, ctx: &mut PropCtx, index: &str) -> SteinResult<String> {
        ctx.ct
            .io_ops_limit
            .get(index)
            .map(u64::to_string)
            .ok_or_else(|| SteinError::invalid_value(format!("invalid index {index}")))
    }
    fn set_indexed(&self, ctx: &mut PropCtx, index: &str, value: &str) -> SteinResult<()> {
        ctx.alive()?;
        let limit = parse_size(value)
            .map_err(|_| SteinError::invalid_value(format!("Invalid value {value}")))?;
        let mut map = ctx.ct.io_ops_limit.clone();
        map.insert(index.to_string(), limit);
        want_io_controllers(ctx, &map)?;
        ctx.ct.io_ops_limit = map;
        ctx.ct.set_prop(Prop::IoOpsLimit);
        Ok(())
    }
}

pub(super) fn register(registry: &mut Registry) {
    registry.add(&IO_POLICY);
    registry.add(&IO_BPS_LIMIT);
    registry.add(&IO_OPS_LIMIT);
}

//! Network configuration and traffic shaping properties.

use std::collections::BTreeMap;

use stein_common::value::{format_uint_map, merge_escaped, parse_size, parse_uint_map,
                          split_escaped};
use stein_common::{SteinError, SteinResult};

use crate::cgroup::Controllers;
use crate::container::Prop;
use crate::net::{parse_gw_list, parse_ip_list, NetPlan};

use super::{PropCtx, Property, Registry};

struct Net;
static NET: Net = Net;

impl Property for Net {
    fn name(&self) -> &'static str {
        "net"
    }
    fn desc(&self) -> &'static str {
        "Container network settings: \
         none | inherited (default) | steal <name> | container <name> | \
         macvlan <master> <name> [bridge|private|vepa|passthru] [mtu] [hw] | \
         ipvlan <master> <name> [l2|l3] [mtu] | veth <name> <bridge> [mtu] [hw] | \
         L3 <name> [master] | NAT [name] | MTU <name> <mtu> | \
         autoconf <name> (SLAAC) | netns <name>"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::Net)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(merge_escaped(&ctx.ct.net_prop, ';'))
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive_and_stopped()?;
        let plan = NetPlan::parse(value)?;
        if !plan.inherited() {
            ctx.want_controllers(Controllers::NETCLS)?;
        }
        ctx.ct.net_prop = split_escaped(value, ';');
        ctx.ct.set_prop(Prop::Net);
        Ok(())
    }
}

struct Ip;
static IP: Ip = Ip;

impl Property for Ip {
    fn name(&self) -> &'static str {
        "ip"
    }
    fn desc(&self) -> &'static str {
        "IP configuration: <interface> <ip>/<prefix>; ..."
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::Ip)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(merge_escaped(&ctx.ct.ip_list, ';'))
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive_and_stopped()?;
        ctx.ct.ip_list = parse_ip_list(value)?;
        ctx.ct.set_prop(Prop::Ip);
        Ok(())
    }
}

struct DefaultGw;
static DEFAULT_GW: DefaultGw = DefaultGw;

impl Property for DefaultGw {
    fn name(&self) -> &'static str {
        "default_gw"
    }
    fn desc(&self) -> &'static str {
        "Default gateway: <interface> <ip>; ..."
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::DefaultGw)
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(merge_escaped(&ctx.ct.default_gw, ';'))
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        ctx.alive_and_stopped()?;
        ctx.ct.default_gw = parse_gw_list(value)?;
        ctx.ct.set_prop(Prop::DefaultGw);
        Ok(())
    }
}

/// Highest accepted `net_prio` value.
const NET_PRIO_MAX: u64 = 7;

fn check_prio_range(map: &BTreeMap<String, u64>) -> SteinResult<()> {
    for value in map.values() {
        if *value > NET_PRIO_MAX {
            return Err(SteinError::invalid_value(format!(
                "invalid value {value}, net priority must be 0..{NET_PRIO_MAX}"
            )));
        }
    }
    Ok(())
}

fn set_net_map(
    ctx: &mut PropCtx,
    value: &str,
    prio: bool,
    field: fn(&mut crate::container::Container) -> &mut BTreeMap<String, u64>,
    bit: Prop,
) -> SteinResult<()> {
    ctx.alive()?;
    let map = parse_uint_map(value)?;
    if prio {
        check_prio_range(&map)?;
    }
    ctx.want_controllers(Controllers::NETCLS)?;
    if *field(ctx.ct) != map {
        *field(ctx.ct) = map;
        ctx.ct.set_prop(bit);
    }
    Ok(())
}

fn set_net_map_indexed(
    ctx: &mut PropCtx,
    index: &str,
    value: &str,
    prio: bool,
    field: fn(&mut crate::container::Container) -> &mut BTreeMap<String, u64>,
    bit: Prop,
) -> SteinResult<()> {
    ctx.alive()?;
    let parsed =
        parse_size(value).map_err(|_| SteinError::invalid_value(format!("Invalid value {value}")))?;
    if prio && parsed > NET_PRIO_MAX {
        return Err(SteinError::invalid_value(format!(
            "invalid value {parsed}, net priority must be 0..{NET_PRIO_MAX}"
        )));
    }
    ctx.want_controllers(Controllers::NETCLS)?;
    if field(ctx.ct).get(index) != Some(&parsed) {
        field(ctx.ct).insert(index.to_string(), parsed);
        ctx.ct.set_prop(bit);
    }
    Ok(())
}

fn get_net_map_indexed(map: &BTreeMap<String, u64>, index: &str) -> SteinResult<String> {
    map.get(index)
        .map(u64::to_string)
        .ok_or_else(|| SteinError::invalid_value(format!("invalid index {index}")))
}

struct NetGuarantee;
static NET_GUARANTEE: NetGuarantee = NetGuarantee;

impl Property for NetGuarantee {
    fn name(&self) -> &'static str {
        "net_guarantee"
    }
    fn desc(&self) -> &'static str {
        "Guaranteed network bandwidth: <interface>|default: <Bps>;... (dynamic)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::NetGuarantee)
    }
    fn indexable(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(format_uint_map(&ctx.ct.net_guarantee))
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        set_net_map(ctx, value, false, |ct| &mut ct.net_guarantee, Prop::NetGuarantee)
    }
    fn get_indexed(&self, ctx: &mut PropCtx, index: &str) -> SteinResult<String> {
        get_net_map_indexed(&ctx.ct.net_guarantee, index)
    }
    fn set_indexed(&self, ctx: &mut PropCtx, index: &str, value: &str) -> SteinResult<()> {
        set_net_map_indexed(ctx, index, value, false, |ct| &mut ct.net_guarantee, Prop::NetGuarantee)
    }
}

struct NetLimit;
static NET_LIMIT: NetLimit = NetLimit;

impl Property for NetLimit {
    fn name(&self) -> &'static str {
        "net_limit"
    }
    fn desc(&self) -> &'static str {
        "Maximum network bandwidth: <interface>|default: <Bps>;... (dynamic)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::NetLimit)
    }
    fn indexable(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(format_uint_map(&ctx.ct.net_limit))
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        set_net_map(ctx, value, false, |ct| &mut ct.net_limit, Prop::NetLimit)
    }
    fn get_indexed(&self, ctx: &mut PropCtx, index: &str) -> SteinResult<String> {
        get_net_map_indexed(&ctx.ct.net_limit, index)
    }
    fn set_indexed(&self, ctx: &mut PropCtx, index: &str, value: &str) -> SteinResult<()> {
        set_net_map_indexed(ctx, index, value, false, |ct| &mut ct.net_limit, Prop::NetLimit)
    }
}

struct NetPriority;
static NET_PRIO: NetPriority = NetPriority;

impl Property for NetPriority {
    fn name(&self) -> &'static str {
        "net_priority"
    }
    fn desc(&self) -> &'static str {
        "Network priority: <interface>|default: 0-7;... (dynamic)"
    }
    fn prop(&self) -> Option<Prop> {
        Some(Prop::NetPrio)
    }
    fn indexable(&self) -> bool {
        true
    }
    fn get(&self, ctx: &mut PropCtx) -> SteinResult<String> {
        Ok(format_uint_map(&ctx.ct.net_priority))
    }
    fn set(&self, ctx: &mut PropCtx, value: &str) -> SteinResult<()> {
        set_net_map(ctx, value, true, |ct| &mut ct.net_priority, Prop::NetPrio)
    }
    fn get_indexed(&self, ctx: &mut PropCtx, index: &str) -> SteinResult<String> {
        get_net_map_indexed(&ctx.ct.net_priority, index)
    }
    fn set_indexed(&self, ctx: &mut PropCtx, index: &str, value: &str) -> SteinResult<()> {
        set_net_map_indexed(ctx, index, value, true, |ct| &mut ct.net_priority, Prop::NetPrio)
    }
}

struct NetTos;
static NET_TOS: NetTos = NetTos;

impl Property for NetTos {
    fn name(&self) -> &'static str {
        "net_tos"
    }
    fn desc(&self) -> &'static str {
        "IP TOS"
    }
    fn hidden(&self) -> bool {
        true
    }
    fn read_only(&self) -> bool {
        true
    }
    fn supported(&self, _host: &crate::host::Host) -> bool {
        false
    }
    fn get(&self, _ctx: &mut PropCtx) -> SteinResult<String> {
        Err(SteinError::not_supported("Not supported: net_tos"))
    }
    fn set(&self, _ctx: &mut PropCtx, _value: &str) -> SteinResult<()> {
        Err(SteinError::not_supported("net_tos is not supported"))
    }
}

pub(super) fn register(registry: &mut Registry) {
    registry.add(&NET);
    registry.add(&IP);
    registry.add(&DEFAULT_GW);
    registry.add(&NET_GUARANTEE);
    registry.add(&NET_LIMIT);
    registry.add(&NET_PRIO);
    registry.add(&NET_TOS);
}
